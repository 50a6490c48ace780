//! HTTP handlers for the asset proxy.
//!
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to the `Bucket` behind the router state.

use crate::{
    errors::AppError,
    handlers::AppState,
    services::bucket::{BucketError, ObjectMeta},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use tracing::error;

/// Fixed body served for the root path. A deliberate placeholder, not a
/// content index; the bucket is never consulted for it.
pub const ROOT_PLACEHOLDER: &str = "asset-gateway: up. Request an asset by its key.";

/// `GET /` — the root placeholder.
pub async fn root_placeholder() -> &'static str {
    ROOT_PLACEHOLDER
}

/// `GET /{*key}` — fetch an object and stream it back.
///
/// The Asset Key is the request path with at most one leading `/` stripped;
/// an empty key falls back to the root placeholder. Absent and invalid keys
/// are both a plain-text 404. Backend faults are logged with the key and
/// surface as a generic 500.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
) -> Result<Response, AppError> {
    let key = raw_key.strip_prefix('/').unwrap_or(&raw_key);
    if key.is_empty() {
        return Ok(Response::new(Body::from(ROOT_PLACEHOLDER)));
    }

    match state.bucket.get(key).await {
        Ok(Some(object)) => {
            let mut response = Response::new(Body::from_stream(object.body));
            *response.status_mut() = StatusCode::OK;
            set_object_headers(response.headers_mut(), &object.meta);
            Ok(response)
        }
        Ok(None) => Err(AppError::not_found("Not Found")),
        Err(BucketError::InvalidKey(_)) => Err(AppError::not_found("Not Found")),
        Err(err) => {
            error!("failed to fetch object `{}` from bucket: {}", key, err);
            Err(AppError::internal("Error fetching object"))
        }
    }
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMeta) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    let quoted = format!("\"{}\"", meta.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&meta.last_modified.to_rfc2822())
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::routes::routes;
    use crate::services::bucket::memory::{FailingBucket, MemoryBucket};
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with(bucket: Arc<dyn crate::services::bucket::Bucket>) -> axum::Router {
        routes().with_state(AppState { bucket })
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn hit_streams_body_with_etag_and_content_type() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.insert("images/logo.png", "image/png", b"pngbytes");
        let app = app_with(bucket);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/images/logo.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let expected_etag = format!("\"{:x}\"", md5::compute(b"pngbytes"));
        assert_eq!(
            response.headers().get(header::ETAG).unwrap(),
            expected_etag.as_str()
        );
        assert_eq!(body_bytes(response).await, b"pngbytes");
    }

    #[tokio::test]
    async fn miss_is_plain_404() {
        let app = app_with(Arc::new(MemoryBucket::new()));
        let response = app
            .oneshot(Request::builder().uri("/absent.md").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_bytes(response).await, b"Not Found");
    }

    #[tokio::test]
    async fn root_is_placeholder_regardless_of_bucket_contents() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.insert("index.html", "text/html", b"<html></html>");
        let app = app_with(bucket);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, ROOT_PLACEHOLDER.as_bytes());
    }

    #[tokio::test]
    async fn extra_leading_slash_is_stripped_once() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.insert("a.txt", "text/plain", b"a");
        let app = app_with(bucket);

        // an encoded second slash decodes to a key of "/a.txt"
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/%2Fa.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"a");
    }

    #[tokio::test]
    async fn traversal_key_is_404_not_500() {
        let app = app_with(Arc::new(MemoryBucket::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/a/../secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn backend_fault_is_generic_500() {
        let app = app_with(Arc::new(FailingBucket));
        let response = app
            .oneshot(Request::builder().uri("/any.png").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_bytes(response).await, b"Error fetching object");
    }

    #[tokio::test]
    async fn non_get_method_is_405() {
        let app = app_with(Arc::new(MemoryBucket::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/images/logo.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
