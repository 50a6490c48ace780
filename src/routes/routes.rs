//! Defines routes for the asset proxy.
//!
//! ## Structure
//! - `GET /healthz`  — liveness
//! - `GET /readyz`   — readiness (bucket probe)
//! - `GET /`         — fixed placeholder body, never hits the bucket
//! - `GET /{*key}`   — fetch the object stored under the derived Asset Key
//!
//! The wildcard `{*key}` allows nested keys like `banners/2025/summer.jpg`.
//! Only GET is routed; axum answers other methods with 405.

use crate::handlers::{
    AppState,
    asset_handlers::{get_asset, root_placeholder},
    health_handlers::{healthz, readyz},
};
use axum::{Router, routing::get};

/// Build the proxy router. The router carries shared state (the bucket
/// binding) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(root_placeholder))
        .route("/{*key}", get(get_asset))
}
