use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod content_type;
mod errors;
mod handlers;
mod migration;
mod routes;
mod services;
mod uploader;

use config::{AppConfig, MigrateConfig, ServeConfig, UploadConfig};
use handlers::AppState;
use services::disk_bucket::DiskBucket;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + dispatch subcommand ---
    match AppConfig::from_env_and_args()? {
        AppConfig::Serve(cfg) => run_serve(cfg).await,
        AppConfig::Upload(cfg) => run_upload(cfg).await,
        AppConfig::Migrate(cfg) => run_migrate(cfg).await,
    }
}

async fn run_serve(cfg: ServeConfig) -> Result<()> {
    tracing::info!("Starting asset-gateway proxy with config: {:?}", cfg);

    // --- Ensure the bucket root exists ---
    if !Path::new(&cfg.bucket_root).exists() {
        tokio::fs::create_dir_all(&cfg.bucket_root).await?;
        tracing::info!("Created bucket root at {}", cfg.bucket_root);
    }

    let state = AppState {
        bucket: Arc::new(DiskBucket::new(&cfg.bucket_root)),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_upload(cfg: UploadConfig) -> Result<()> {
    tracing::info!("Starting bulk upload with config: {:?}", cfg);

    let bucket = DiskBucket::new(&cfg.bucket_root);
    let report = uploader::upload_tree(&bucket, Path::new(&cfg.assets_root)).await?;

    if !report.is_clean() {
        anyhow::bail!(
            "{} of {} uploads failed: {}",
            report.failed.len(),
            report.succeeded + report.failed.len(),
            report.failed.join(", ")
        );
    }
    Ok(())
}

async fn run_migrate(cfg: MigrateConfig) -> Result<()> {
    tracing::info!("Starting legacy migration with config: {:?}", cfg);

    let report =
        migration::migrate_legacy(Path::new(&cfg.legacy_dir), Path::new(&cfg.assets_root)).await?;

    if !report.is_clean() {
        anyhow::bail!(
            "{} of {} moves failed: {}",
            report.failed.len(),
            report.moved + report.failed.len(),
            report.failed.join(", ")
        );
    }
    Ok(())
}
