//! Bulk asset uploader: pushes a local directory tree into the bucket.
//!
//! Walks the assets root depth-first and uploads every file under the key
//! derived from its relative path. Uploads are whole-object overwrites, so
//! re-running the tool is idempotent with respect to final bucket state.
//! A single file's failure is logged and recorded but never aborts the walk.

use crate::content_type::content_type_for;
use crate::services::bucket::{Bucket, relative_key};
use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of one uploader run. `failed` holds keys (or paths, when no key
/// could be derived) that did not make it into the bucket.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub succeeded: usize,
    pub failed: Vec<String>,
}

impl UploadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Upload every file under `assets_root` into `bucket`.
///
/// Sequential by design: one in-flight upload bounds resource usage and
/// keeps failure attribution unambiguous in logs. Fatal only when the root
/// itself is unusable; everything past that point is a per-file failure.
pub async fn upload_tree(bucket: &dyn Bucket, assets_root: &Path) -> Result<UploadReport> {
    if !assets_root.is_dir() {
        bail!(
            "assets root `{}` does not exist or is not a directory",
            assets_root.display()
        );
    }

    let mut report = UploadReport::default();
    for entry in WalkDir::new(assets_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let shown = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| assets_root.display().to_string());
                warn!("skipping unreadable entry `{}`: {}", shown, err);
                report.failed.push(shown);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(key) = relative_key(assets_root, path) else {
            warn!("skipping `{}`: cannot derive an asset key", path.display());
            report.failed.push(path.display().to_string());
            continue;
        };

        match upload_one(bucket, path, &key).await {
            Ok(()) => {
                debug!("uploaded `{}`", key);
                report.succeeded += 1;
            }
            Err(err) => {
                warn!("failed to upload `{}`: {:#}", key, err);
                report.failed.push(key);
            }
        }
    }

    info!(
        "upload complete: {} succeeded, {} failed",
        report.succeeded,
        report.failed.len()
    );
    Ok(report)
}

async fn upload_one(bucket: &dyn Bucket, path: &Path, key: &str) -> Result<()> {
    let content_type = content_type_for(path);
    let file = File::open(path)
        .await
        .with_context(|| format!("opening `{}`", path.display()))?;
    bucket
        .put(key, content_type, Box::pin(ReaderStream::new(file)))
        .await
        .context("bucket put")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bucket::memory::MemoryBucket;
    use crate::services::bucket::{
        BucketError, BucketResult, ByteStream, ObjectMeta, StoredObject,
    };
    use std::collections::HashSet;
    use std::io;
    use tempfile::tempdir;

    fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (rel, bytes) in files {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, bytes).unwrap();
        }
    }

    #[tokio::test]
    async fn uploads_every_file_under_its_normalized_key() {
        let dir = tempdir().unwrap();
        write_tree(
            dir.path(),
            &[
                ("logo.png", b"png".as_slice()),
                ("docs/guide.md", b"# guide".as_slice()),
                ("banners/2025/summer.jpeg", b"jpeg".as_slice()),
            ],
        );

        let bucket = MemoryBucket::new();
        let report = upload_tree(&bucket, dir.path()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.succeeded, 3);

        let keys: HashSet<String> = bucket.list().await.unwrap().into_iter().collect();
        let expected: HashSet<String> = ["logo.png", "docs/guide.md", "banners/2025/summer.jpeg"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keys, expected);
        assert_eq!(bucket.raw_bytes("docs/guide.md").unwrap(), b"# guide");

        let object = bucket.get("docs/guide.md").await.unwrap().unwrap();
        assert_eq!(object.meta.content_type, "text/markdown");
        let object = bucket.get("banners/2025/summer.jpeg").await.unwrap().unwrap();
        assert_eq!(object.meta.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn rerun_leaves_identical_key_set() {
        let dir = tempdir().unwrap();
        write_tree(dir.path(), &[("a.txt", b"a".as_slice()), ("b/c.txt", b"c".as_slice())]);

        let bucket = MemoryBucket::new();
        upload_tree(&bucket, dir.path()).await.unwrap();
        let mut first: Vec<String> = bucket.list().await.unwrap();
        first.sort();

        let report = upload_tree(&bucket, dir.path()).await.unwrap();
        assert!(report.is_clean());
        let mut second: Vec<String> = bucket.list().await.unwrap();
        second.sort();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_root_is_fatal() {
        let bucket = MemoryBucket::new();
        assert!(upload_tree(&bucket, Path::new("/no/such/dir")).await.is_err());
    }

    /// Delegates to an inner bucket but refuses one key, to simulate a
    /// backend fault mid-batch.
    struct RefusingBucket {
        inner: MemoryBucket,
        refuse: String,
    }

    #[async_trait::async_trait]
    impl Bucket for RefusingBucket {
        async fn get(&self, key: &str) -> BucketResult<Option<StoredObject>> {
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &str,
            content_type: &str,
            body: ByteStream,
        ) -> BucketResult<ObjectMeta> {
            if key == self.refuse {
                return Err(BucketError::Io(io::Error::other("simulated fault")));
            }
            self.inner.put(key, content_type, body).await
        }

        async fn list(&self) -> BucketResult<Vec<String>> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn one_failed_upload_does_not_halt_the_walk() {
        let dir = tempdir().unwrap();
        write_tree(
            dir.path(),
            &[
                ("bad.txt", b"bad".as_slice()),
                ("good.txt", b"good".as_slice()),
                ("sub/also-good.txt", b"ok".as_slice()),
            ],
        );

        let bucket = RefusingBucket {
            inner: MemoryBucket::new(),
            refuse: "bad.txt".into(),
        };
        let report = upload_tree(&bucket, dir.path()).await.unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, vec!["bad.txt".to_string()]);
        let keys: HashSet<String> = bucket.inner.list().await.unwrap().into_iter().collect();
        assert!(keys.contains("good.txt"));
        assert!(keys.contains("sub/also-good.txt"));
        assert!(!keys.contains("bad.txt"));
    }
}
