//! Bucket abstraction consumed by the proxy and the uploader.
//!
//! The production backend is [`DiskBucket`](super::disk_bucket::DiskBucket);
//! tests run against the in-memory implementation below. Writes are
//! whole-object overwrites: a reader sees either the previous object or the
//! fully written new one, never a mix.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Streamed object payload.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BucketResult<T> = Result<T, BucketError>;

/// HTTP-facing metadata stored alongside each object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// MIME type inferred at upload time.
    pub content_type: String,

    /// Hex MD5 digest of the payload, used as the ETag.
    pub etag: String,

    /// Payload size in bytes.
    pub size: u64,

    /// When the object was written.
    pub last_modified: DateTime<Utc>,
}

/// An object fetched from the bucket: metadata plus a body stream.
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub body: ByteStream,
}

/// Minimal object-store interface: `get`, `put`, `list`.
///
/// Every implementation must be safe to share across request handlers
/// without external locking; each `put` targets a distinct key and replaces
/// the whole object.
#[async_trait::async_trait]
pub trait Bucket: Send + Sync {
    /// Fetch an object. `Ok(None)` means the key is absent; `Err` is a
    /// backend fault.
    async fn get(&self, key: &str) -> BucketResult<Option<StoredObject>>;

    /// Write an object under `key`, replacing any previous one.
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        body: ByteStream,
    ) -> BucketResult<ObjectMeta>;

    /// All keys currently present, in no particular order.
    async fn list(&self) -> BucketResult<Vec<String>>;
}

const MAX_KEY_LEN: usize = 1024;

/// First path component reserved for backend bookkeeping (the disk backend
/// keeps metadata sidecars under it). No object key may start with it, so
/// that `put`/`get`/`list` all agree on the key namespace.
pub const RESERVED_PREFIX: &str = ".meta";

/// Reject keys that could escape the bucket namespace.
///
/// Keys must be non-empty, at most 1024 bytes, with no leading `/`, no `..`
/// component, no reserved first component, and no control or backslash
/// bytes.
pub fn ensure_key_safe(key: &str) -> BucketResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(BucketError::InvalidKey(key.to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|part| part == "..") {
        return Err(BucketError::InvalidKey(key.to_string()));
    }
    if key.split('/').next() == Some(RESERVED_PREFIX) {
        return Err(BucketError::InvalidKey(key.to_string()));
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(BucketError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Derive the Asset Key for `path` relative to `root`.
///
/// Platform separators are normalized to `/`. Returns `None` when `path` is
/// not under `root` or a component is not valid UTF-8. The result is exactly
/// the key the proxy derives from an inbound request path, which keeps the
/// uploader and the proxy contract-compatible by construction.
pub fn relative_key(root: &std::path::Path, path: &std::path::Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect();
    let parts = parts?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Wrap in-memory bytes as a [`ByteStream`].
#[cfg(test)]
pub fn bytes_stream(bytes: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move {
        Ok::<Bytes, io::Error>(bytes)
    }))
}

/// Drain a [`ByteStream`] into memory, also yielding its MD5 digest.
#[cfg(test)]
pub async fn collect_stream(mut body: ByteStream) -> io::Result<(Vec<u8>, String)> {
    use futures::StreamExt;

    let mut buf = Vec::new();
    let mut digest = md5::Context::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        digest.consume(&chunk);
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, format!("{:x}", digest.compute())))
}
