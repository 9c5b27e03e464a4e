//! Retrieves package bytes from an origin (object store or HTTPS) into a
//! local file with size/time limits and SHA-256 verification.

pub mod backoff;
pub mod error;
pub mod object_store;

use agentrt_core::model::CachedPackage;
use backoff::{retry_transient, BackoffPolicy};
use chrono::Utc;
use error::{Error, Result};
use futures_util::StreamExt;
use object_store::{split_bucket_key, ObjectStoreClient, ObjectStoreError};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Fetcher {
    http: reqwest::Client,
    object_store: Arc<dyn ObjectStoreClient>,
    backoff: BackoffPolicy,
}

impl Fetcher {
    #[must_use]
    pub fn new(object_store: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            http: reqwest::Client::new(),
            object_store,
            backoff: BackoffPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Downloads `source` to a temp path alongside `destination`, verifying
    /// SHA-256 as bytes stream in, and renames atomically into place on
    /// success. 5xx/network errors are retried with capped exponential
    /// back-off; 4xx/NoSuchKey/AccessDenied fail immediately as
    /// `FetchUnavailable`. A supplied `expected_fingerprint` that does not
    /// match the downloaded bytes fails as `IntegrityMismatch` without
    /// touching `destination`.
    pub async fn fetch(
        &self,
        source: &Url,
        destination: &Path,
        max_bytes: u64,
        timeout: Duration,
        expected_fingerprint: Option<&str>,
    ) -> Result<CachedPackage> {
        if !agentrt_core::model::ALLOWED_SOURCE_SCHEMES.contains(&source.scheme()) {
            return Err(Error::DisallowedScheme(source.scheme().to_string()));
        }

        let policy = self.backoff;
        let result = retry_transient(
            policy,
            Error::is_transient,
            || self.fetch_once(source, destination, max_bytes, timeout),
        )
        .await?;

        if let Some(expected) = expected_fingerprint {
            if !result.fingerprint.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(&result.path).await;
                return Err(Error::IntegrityMismatch {
                    expected: expected.to_string(),
                    actual: result.fingerprint,
                });
            }
        }

        Ok(result)
    }

    async fn fetch_once(
        &self,
        source: &Url,
        destination: &Path,
        max_bytes: u64,
        timeout: Duration,
    ) -> Result<CachedPackage> {
        tokio::time::timeout(timeout, async {
            match source.scheme() {
                "https" => self.fetch_https(source, destination, max_bytes).await,
                "object-store" => self.fetch_object_store(source, destination, max_bytes).await,
                scheme => Err(Error::DisallowedScheme(scheme.to_string())),
            }
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    async fn fetch_https(
        &self,
        source: &Url,
        destination: &Path,
        max_bytes: u64,
    ) -> Result<CachedPackage> {
        let response = self.http.get(source.clone()).send().await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::Unavailable(format!(
                "HTTP {status} fetching {source}"
            )));
        }

        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;
        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        let (std_file, tmp_path) = tmp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut hasher = Sha256::new();
        let mut total = 0_u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            if total > max_bytes {
                return Err(Error::TooLarge {
                    actual: total,
                    max: max_bytes,
                });
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let fingerprint = hex::encode(hasher.finalize());
        tmp_path.persist(destination).map_err(|e| Error::Io(e.error))?;

        Ok(CachedPackage {
            path: destination.to_path_buf(),
            fingerprint,
            size_bytes: total,
            fetched_at: Utc::now(),
        })
    }

    async fn fetch_object_store(
        &self,
        source: &Url,
        destination: &Path,
        max_bytes: u64,
    ) -> Result<CachedPackage> {
        let Some((bucket, key)) = split_bucket_key(source) else {
            return Err(Error::Unavailable(format!(
                "malformed object-store URL: {source}"
            )));
        };

        let bytes = self.object_store.get(&bucket, &key).await.map_err(|e| match e {
            ObjectStoreError::NoSuchKey { .. } | ObjectStoreError::AccessDenied { .. } => {
                Error::Unavailable(e.to_string())
            }
            ObjectStoreError::Io(io) => Error::Io(io),
        })?;

        if bytes.len() as u64 > max_bytes {
            return Err(Error::TooLarge {
                actual: bytes.len() as u64,
                max: max_bytes,
            });
        }

        let fingerprint = {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        };

        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(destination).map_err(|e| Error::Io(e.error))?;

        Ok(CachedPackage {
            path: destination.to_path_buf(),
            fingerprint,
            size_bytes: bytes.len() as u64,
            fetched_at: Utc::now(),
        })
    }
}

impl Error {
    fn is_transient(&self) -> bool {
        match self {
            Error::Request(e) => !e.is_status() || e.status().is_some_and(|s| s.as_u16() >= 500),
            Error::Timeout => true,
            Error::Io(_) => true,
            Error::Unavailable(_) | Error::DisallowedScheme(_) | Error::TooLarge { .. } => false,
            Error::IntegrityMismatch { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::LocalDiskObjectStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        let tmp = tempfile::tempdir().unwrap();
        Fetcher::new(Arc::new(LocalDiskObjectStore::new(tmp.path())))
    }

    #[tokio::test]
    async fn https_happy_path_verifies_fingerprint() {
        let server = MockServer::start().await;
        let body = b"hello agent package";
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(body);
            hex::encode(hasher.finalize())
        };

        Mock::given(method("GET"))
            .and(path("/pkg.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("pkg.tar.gz");
        let source: Url = format!("{}/pkg.tar.gz", server.uri()).parse().unwrap();

        let fetcher = fetcher();
        let result = fetcher
            .fetch(&source, &dest, 1024, Duration::from_secs(5), Some(&expected))
            .await
            .unwrap();

        assert_eq!(result.fingerprint, expected);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn bad_fingerprint_is_rejected_and_file_not_left_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"actual bytes".to_vec()))
            .mount(&server)
            .await;

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("pkg.tar.gz");
        let source: Url = format!("{}/pkg.tar.gz", server.uri()).parse().unwrap();

        let fetcher = fetcher();
        let err = fetcher
            .fetch(
                &source,
                &dest,
                1024,
                Duration::from_secs(5),
                Some("0".repeat(64).as_str()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::IntegrityMismatch { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn http_4xx_is_unavailable_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("missing");
        let source: Url = format!("{}/missing", server.uri()).parse().unwrap();

        let fetcher = fetcher();
        let err = fetcher
            .fetch(&source, &dest, 1024, Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0_u8; 2048]))
            .mount(&server)
            .await;

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("big");
        let source: Url = format!("{}/big", server.uri()).parse().unwrap();

        let fetcher = fetcher();
        let err = fetcher
            .fetch(&source, &dest, 100, Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TooLarge { .. }));
    }

    #[tokio::test]
    async fn disallowed_scheme_rejected_before_any_io() {
        let fetcher = fetcher();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("x");
        let source: Url = "file:///etc/passwd".parse().unwrap();
        let err = fetcher
            .fetch(&source, &dest, 1024, Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DisallowedScheme(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn object_store_no_such_key_is_unavailable() {
        let fetcher = fetcher();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("x");
        let source: Url = "object-store://bucket/missing-key".parse().unwrap();
        let err = fetcher
            .fetch(&source, &dest, 1024, Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }
}
