//! # alifa-storage-local
//! alifa/crates/alifa-plugins/alifa-storage-local/src/lib.rs
//! Local filesystem implementation of `FileStore`.
//! Files live at `{root}/{bucket}/{path}` and are served from `{url_prefix}/{bucket}/{path}`.

use alifa_core::FileStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

pub struct LocalFileStore {
    /// Root directory for all buckets (e.g., "./media")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/media")
    url_prefix: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root_path: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolves `bucket/path` under the root. Both must be plain relative
    /// paths: no `..`, no absolute components.
    fn resolve(&self, bucket: &str, path: &str) -> anyhow::Result<PathBuf> {
        for part in [bucket, path] {
            let relative = Path::new(part);
            let plain = !part.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
            if !plain {
                anyhow::bail!("refusing storage path `{bucket}/{path}`");
            }
        }
        Ok(self.root_path.join(bucket).join(path))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.url_prefix, bucket, path)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    /// Writes the file, replacing any previous content at the same path.
    async fn upload_file(&self, bucket: &str, path: &str, bytes: Bytes) -> anyhow::Result<String> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &bytes).await?;

        tracing::debug!(bucket, path, size = bytes.len(), "stored file");
        Ok(self.public_url(bucket, path))
    }

    async fn remove_file(&self, bucket: &str, path: &str) -> anyhow::Result<()> {
        let target = self.resolve(bucket, path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
