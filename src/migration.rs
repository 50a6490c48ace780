//! Legacy migration tool: one-shot move of the old flat uploads directory
//! into the assets root that feeds the uploader.
//!
//! Idempotent by construction: an absent legacy directory is a successful
//! no-op, so repeated runs after the first migration are harmless. One bad
//! entry never blocks migration of the rest.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

/// Outcome of one migration run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub moved: usize,
    pub failed: Vec<String>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Move every entry directly inside `legacy_dir` to the same name under
/// `assets_root`.
///
/// Enumeration is deliberately non-recursive: the legacy uploads directory
/// is flat. Per-entry failures are logged with the file name and recorded;
/// failed entries stay behind in the legacy directory for a later retry.
pub async fn migrate_legacy(legacy_dir: &Path, assets_root: &Path) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    if !legacy_dir.exists() {
        info!(
            "legacy directory `{}` not present, nothing to do",
            legacy_dir.display()
        );
        return Ok(report);
    }

    fs::create_dir_all(assets_root)
        .await
        .with_context(|| format!("creating target directory `{}`", assets_root.display()))?;

    let mut entries = fs::read_dir(legacy_dir)
        .await
        .with_context(|| format!("reading legacy directory `{}`", legacy_dir.display()))?;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!("failed to read a legacy directory entry: {}", err);
                report.failed.push("<unreadable entry>".into());
                break;
            }
        };

        let name = entry.file_name();
        let target = assets_root.join(&name);
        match fs::rename(entry.path(), &target).await {
            Ok(()) => report.moved += 1,
            Err(err) => {
                warn!(
                    "failed to move `{}`: {}",
                    name.to_string_lossy(),
                    err
                );
                report.failed.push(name.to_string_lossy().into_owned());
            }
        }
    }

    info!(
        "migration complete: {} moved, {} failed",
        report.moved,
        report.failed.len()
    );
    Ok(report)
}
