//! The object-store side of the fetcher is deliberately small: cloud
//! infrastructure is an out-of-scope collaborator here, so rather than
//! depending on any one vendor's SDK, fetching from `object-store://` is
//! expressed against a narrow trait whose error shapes (`NoSuchKey`,
//! `AccessDenied`) mirror what every object-store API actually returns.
//! The only shipped implementation backs onto a local directory, which is
//! what the test suite and a single-host operator both need: a place that
//! holds byte blobs addressable by bucket+key.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("no such key: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },
    #[error("access denied: {bucket}/{key}")]
    AccessDenied { bucket: String, key: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Fetches the object at `bucket`/`key`, returning its full bytes.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// Parses an `object-store://bucket/key...` URL into its parts.
#[must_use]
pub fn split_bucket_key(url: &url::Url) -> Option<(String, String)> {
    let bucket = url.host_str()?.to_string();
    let key = url.path().trim_start_matches('/').to_string();
    if key.is_empty() {
        return None;
    }
    Some((bucket, key))
}

/// A local-disk-backed object store: `root/{bucket}/{key}`. Used by tests
/// and by operators who want `object-store://` semantics without standing
/// up a real cloud bucket.
pub struct LocalDiskObjectStore {
    root: PathBuf,
}

impl LocalDiskObjectStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStoreClient for LocalDiskObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path: PathBuf = self.root.join(bucket).join(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ObjectStoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(ObjectStoreError::AccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }
}

#[must_use]
pub fn bucket_root(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().to_path_buf()
}
