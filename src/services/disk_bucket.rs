//! Disk-backed bucket implementation.
//!
//! Payloads live at `root/<key>`; HTTP metadata lives in a JSON sidecar at
//! `root/.meta/<key>.json`. The `.meta` prefix is reserved in the key
//! namespace, so sidecars are never addressable as objects. Uploads stream
//! into a temporary file in the final parent directory, computing size and
//! MD5 incrementally, then rename into place so readers never observe a
//! partially written object.

use crate::content_type::content_type_for;
use crate::services::bucket::{
    Bucket, BucketError, BucketResult, ByteStream, ObjectMeta, RESERVED_PREFIX, StoredObject,
    ensure_key_safe, relative_key,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

const REBUILD_BUF_LEN: usize = 64 * 1024;

#[derive(Clone)]
pub struct DiskBucket {
    root: PathBuf,
}

impl DiskBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(RESERVED_PREFIX).join(format!("{key}.json"))
    }

    /// Write `bytes` to a temp file next to `path`, fsynced, ready to be
    /// renamed into place. Returns the temp path.
    async fn stage(path: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::other("path missing parent directory"))?;
        fs::create_dir_all(parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await
        {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        Ok(tmp_path)
    }

    /// Recover metadata for an object whose sidecar is missing or disagrees
    /// with the payload, e.g. a file placed in the bucket root by hand.
    /// Streams the payload once through the digest, then rewinds the handle
    /// so the caller can reuse it for the body.
    async fn rebuild_meta(
        &self,
        key: &str,
        file: &mut File,
        file_meta: &std::fs::Metadata,
    ) -> io::Result<ObjectMeta> {
        let mut digest = md5::Context::new();
        let mut buf = vec![0u8; REBUILD_BUF_LEN];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digest.consume(&buf[..n]);
        }
        file.rewind().await?;

        let modified = file_meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(ObjectMeta {
            content_type: content_type_for(Path::new(key)).to_string(),
            etag: format!("{:x}", digest.compute()),
            size: file_meta.len(),
            last_modified: modified,
        })
    }
}

/// Rename `from` onto `to`, replacing an existing file if the platform
/// reports `AlreadyExists` instead of overwriting.
async fn rename_replacing(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(to).await?;
            fs::rename(from, to).await
        }
        Err(err) => {
            let _ = fs::remove_file(from).await;
            Err(err)
        }
    }
}

#[async_trait::async_trait]
impl Bucket for DiskBucket {
    async fn get(&self, key: &str) -> BucketResult<Option<StoredObject>> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);

        let mut file = match File::open(&file_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(BucketError::Io(err)),
        };
        let file_meta = file.metadata().await?;
        // A key that names an intermediate directory is not an object.
        if !file_meta.is_file() {
            return Ok(None);
        }

        let meta = match fs::read(self.meta_path(key)).await {
            Ok(raw) => match serde_json::from_slice::<ObjectMeta>(&raw) {
                // A sidecar that disagrees with the payload length is stale,
                // e.g. from an overwrite caught between its two renames.
                Ok(meta) if meta.size == file_meta.len() => meta,
                Ok(_) => {
                    debug!("stale metadata sidecar for `{}`, rebuilding", key);
                    self.rebuild_meta(key, &mut file, &file_meta).await?
                }
                Err(err) => {
                    debug!("corrupt metadata sidecar for `{}`: {}", key, err);
                    self.rebuild_meta(key, &mut file, &file_meta).await?
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.rebuild_meta(key, &mut file, &file_meta).await?
            }
            Err(err) => return Err(BucketError::Io(err)),
        };

        Ok(Some(StoredObject {
            meta,
            body: Box::pin(ReaderStream::new(file)),
        }))
    }

    async fn put(
        &self,
        key: &str,
        content_type: &str,
        mut body: ByteStream,
    ) -> BucketResult<ObjectMeta> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BucketError::Io(io::Error::other("object path missing parent")))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: u64 = 0;
        let mut digest = md5::Context::new();
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(BucketError::Io(err));
                }
            };
            size += chunk.len() as u64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BucketError::Io(err));
            }
        }
        if let Err(err) = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await
        {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BucketError::Io(err));
        }

        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            etag: format!("{:x}", digest.compute()),
            size,
            last_modified: Utc::now(),
        };
        let raw =
            serde_json::to_vec(&meta).map_err(|err| BucketError::Io(io::Error::other(err)))?;

        // Stage the new sidecar before publishing the payload, then commit
        // it right after, so a reader can only pair mismatched payload and
        // sidecar in the gap between the two renames; get() cross-checks
        // sizes to close that gap.
        let meta_path = self.meta_path(key);
        let meta_tmp = match Self::stage(&meta_path, &raw).await {
            Ok(meta_tmp) => meta_tmp,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BucketError::Io(err));
            }
        };
        if let Err(err) = rename_replacing(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&meta_tmp).await;
            return Err(BucketError::Io(err));
        }
        rename_replacing(&meta_tmp, &meta_path).await?;

        Ok(meta)
    }

    async fn list(&self) -> BucketResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|err| {
                BucketError::Io(
                    err.into_io_error()
                        .unwrap_or_else(|| io::Error::other("unreadable directory entry")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            // skip the metadata tree and in-flight temp files
            if entry
                .path()
                .strip_prefix(&self.root)
                .ok()
                .is_some_and(|rel| rel.starts_with(RESERVED_PREFIX))
            {
                continue;
            }
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(".tmp-"))
            {
                continue;
            }
            if let Some(key) = relative_key(&self.root, entry.path()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
