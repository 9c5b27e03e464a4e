//! Content-trust package cache: keyed by `(agentAppId, version)` for
//! human-readable file names, with integrity derived from an optional
//! fingerprint. This intentionally allows a same-version repush to be
//! re-verified rather than address-deduplicated away.

use crate::error::Result;
use agentrt_core::fingerprint::{sha256_hex_file, FingerprintIndex};
use agentrt_core::model::CachedPackage;
use agentrt_fetcher::Fetcher;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

/// Sanitizes `(agent_app_id, version)` into a stable, filesystem-safe file
/// name for the cache.
#[must_use]
pub fn cache_key(agent_app_id: &str, version: &str) -> String {
    fn sanitize(s: &str) -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect()
    }
    format!("{}__{}", sanitize(agent_app_id), sanitize(version))
}

pub struct PackageCache {
    cache_dir: PathBuf,
    fetcher: Arc<Fetcher>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    max_bytes: u64,
    fetch_timeout: Duration,
    /// Fingerprint → cached artifact directory index (spec §2 "Fingerprint
    /// Index"), shared across every `(agentAppId, version)` key so a
    /// byte-identical package re-pushed under a new key is copied locally
    /// rather than re-fetched from the origin.
    fingerprints: Arc<FingerprintIndex>,
}

impl PackageCache {
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher,
            locks: DashMap::new(),
            max_bytes: agentrt_fetcher::DEFAULT_MAX_BYTES,
            fetch_timeout: agentrt_fetcher::DEFAULT_TIMEOUT,
            fingerprints: Arc::new(FingerprintIndex::new()),
        }
    }

    #[must_use]
    pub fn with_fingerprint_index(mut self, index: Arc<FingerprintIndex>) -> Self {
        self.fingerprints = index;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, max_bytes: u64, fetch_timeout: Duration) -> Self {
        self.max_bytes = max_bytes;
        self.fetch_timeout = fetch_timeout;
        self
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.cache_dir.join(key)
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Looks up or fetches the package for `(agent_app_id, version)`.
    ///
    /// Algorithm:
    /// 1. `force_refresh` → delete any existing cached file and fetch.
    /// 2. Else if the cached file exists: with a fingerprint, revalidate
    ///    and refetch on mismatch; without one, trust the cache as a hit.
    /// 3. Else fetch.
    pub async fn get_or_fetch(
        &self,
        agent_app_id: &str,
        version: &str,
        source: &Url,
        expected_fingerprint: Option<&str>,
        force_refresh: bool,
    ) -> Result<CachedPackage> {
        let key = cache_key(agent_app_id, version);
        let path = self.path_for(&key);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        if force_refresh {
            let _ = tokio::fs::remove_file(&path).await;
            return self.fetch_into(source, &path, expected_fingerprint).await;
        }

        if path.exists() {
            if let Some(expected) = expected_fingerprint {
                let computed = sha256_hex_file(&path)?;
                if computed.eq_ignore_ascii_case(expected) {
                    return Ok(self.describe_existing(&path, computed).await?);
                }
                warn!(%key, "cached package fingerprint mismatch, refetching");
                let _ = tokio::fs::remove_file(&path).await;
                return self.fetch_into(source, &path, expected_fingerprint).await;
            }

            info!(%key, "package cache hit (no fingerprint supplied, trusting cache)");
            let computed = sha256_hex_file(&path)?;
            self.fingerprints.insert(computed.clone(), path.clone());
            return Ok(self.describe_existing(&path, computed).await?);
        }

        if let Some(expected) = expected_fingerprint {
            if let Some(known_path) = self.fingerprints.get(expected) {
                if known_path != path && tokio::fs::metadata(&known_path).await.is_ok() {
                    info!(%key, fingerprint = %expected, "fingerprint already cached under another key, copying locally");
                    if tokio::fs::copy(&known_path, &path).await.is_ok() {
                        let computed = sha256_hex_file(&path)?;
                        if computed.eq_ignore_ascii_case(expected) {
                            self.fingerprints.insert(computed.clone(), path.clone());
                            return Ok(self.describe_existing(&path, computed).await?);
                        }
                        let _ = tokio::fs::remove_file(&path).await;
                        self.fingerprints.remove(expected);
                    }
                }
            }
        }

        self.fetch_into(source, &path, expected_fingerprint).await
    }

    async fn describe_existing(&self, path: &Path, fingerprint: String) -> Result<CachedPackage> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(CachedPackage {
            path: path.to_path_buf(),
            fingerprint,
            size_bytes: meta.len(),
            fetched_at: meta
                .modified()
                .ok()
                .map(chrono::DateTime::<chrono::Utc>::from)
                .unwrap_or_else(chrono::Utc::now),
        })
    }

    async fn fetch_into(
        &self,
        source: &Url,
        path: &Path,
        expected_fingerprint: Option<&str>,
    ) -> Result<CachedPackage> {
        let cached = self
            .fetcher
            .fetch(source, path, self.max_bytes, self.fetch_timeout, expected_fingerprint)
            .await?;
        self.fingerprints.insert(cached.fingerprint.clone(), cached.path.clone());
        Ok(cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_core::fingerprint::sha256_hex;
    use agentrt_fetcher::object_store::LocalDiskObjectStore;

    #[test]
    fn cache_key_is_stable_and_safe() {
        assert_eq!(cache_key("a1", "1.0.0"), "a1__1.0.0");
        assert_eq!(cache_key("a/1", "v:1"), "a_1__v_1");
    }

    #[tokio::test]
    async fn fingerprint_index_avoids_refetch_for_a_new_key() {
        let cache_dir = tempfile::tempdir().unwrap();
        // Points at an object store with nothing in it: any call that
        // reaches the fetcher for this test fails with `NoSuchKey`, so a
        // passing assertion proves the fingerprint-index path was taken
        // instead of a network/object-store round trip.
        let empty_store = Arc::new(LocalDiskObjectStore::new(cache_dir.path().join("empty-store")));
        let fetcher = Arc::new(Fetcher::new(empty_store));
        let cache = PackageCache::new(cache_dir.path(), fetcher);

        let bytes = b"same package bytes, pushed under two different keys";
        let fingerprint = sha256_hex(bytes);
        let known_path = cache_dir.path().join("known-artifact.pkg");
        tokio::fs::write(&known_path, bytes).await.unwrap();
        cache.fingerprints.insert(fingerprint.clone(), known_path);

        let source = Url::parse("object-store://bucket/unreachable.pkg").unwrap();
        let result = cache
            .get_or_fetch("agent-b", "2.0.0", &source, Some(&fingerprint), false)
            .await
            .expect("fingerprint-index hit should avoid the failing fetch");

        assert_eq!(result.fingerprint, fingerprint);
        assert_eq!(tokio::fs::read(&result.path).await.unwrap(), bytes);
    }
}
