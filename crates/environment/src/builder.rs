//! Environment Builder: given an extracted package directory and the
//! `agentAppId`, produces a usable isolated dependency environment path,
//! reusing it across deployments whose dependency manifest is
//! byte-identical.

use crate::error::Result;
use crate::eviction::{plan_eviction, EvictionPolicy};
use crate::installer::DependencyInstaller;
use crate::metadata::EnvMetadata;
use agentrt_core::fingerprint::{sha256_hex, truncate_hex};
use agentrt_core::model::Environment;
use chrono::Utc;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
pub const NO_DEPS_FINGERPRINT: &str = "no-deps";

pub struct EnvironmentBuilder {
    envs_root: PathBuf,
    installer: Arc<dyn DependencyInstaller>,
    /// Per-fingerprint mutex serialising creation, so two concurrent
    /// deployments with the same dependency manifest build once, not twice.
    build_locks: DashMap<String, Arc<Mutex<()>>>,
    install_timeout: Duration,
    eviction_policy: EvictionPolicy,
    wheelhouse: Option<PathBuf>,
}

/// Computes `depFingerprint = sha256(dependency_manifest_bytes)[0..7]`, or
/// the literal `"no-deps"` when there is no dependency manifest.
pub async fn dependency_fingerprint(dependency_manifest: Option<&Path>) -> std::io::Result<String> {
    match dependency_manifest {
        None => Ok(NO_DEPS_FINGERPRINT.to_string()),
        Some(path) => {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Ok(NO_DEPS_FINGERPRINT.to_string());
            }
            let bytes = tokio::fs::read(path).await?;
            Ok(truncate_hex(&sha256_hex(&bytes), 7))
        }
    }
}

#[must_use]
pub fn env_name(agent_app_id: &str, dep_fingerprint: &str) -> String {
    format!("{agent_app_id}_{dep_fingerprint}")
}

impl EnvironmentBuilder {
    #[must_use]
    pub fn new(envs_root: impl Into<PathBuf>, installer: Arc<dyn DependencyInstaller>) -> Self {
        Self {
            envs_root: envs_root.into(),
            installer,
            build_locks: DashMap::new(),
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
            eviction_policy: EvictionPolicy::default(),
            wheelhouse: None,
        }
    }

    #[must_use]
    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    #[must_use]
    pub fn with_wheelhouse(mut self, wheelhouse: PathBuf) -> Self {
        self.wheelhouse = Some(wheelhouse);
        self
    }

    fn lock_for(&self, dep_fingerprint: &str) -> Arc<Mutex<()>> {
        self.build_locks
            .entry(dep_fingerprint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Produces a usable environment for `package_root`, reusing an
    /// existing one if its directory validates.
    pub async fn ensure_environment(
        &self,
        agent_app_id: &str,
        package_root: &Path,
        dependency_manifest: Option<&Path>,
    ) -> Result<Environment> {
        let dep_fingerprint = dependency_fingerprint(dependency_manifest).await?;
        let name = env_name(agent_app_id, &dep_fingerprint);
        let env_path = self.envs_root.join(&name);

        let lock = self.lock_for(&dep_fingerprint);
        let _guard = lock.lock().await;

        if tokio::fs::try_exists(&env_path).await.unwrap_or(false) {
            if self.installer.self_identifies_as(&env_path).await {
                EnvMetadata::touch_last_used(&env_path).await?;
                info!(env = %env_path.display(), "reusing validated environment");
                return self.describe(&env_path, &dep_fingerprint).await;
            }

            warn!(env = %env_path.display(), "environment failed validation, rebuilding");
            tokio::fs::remove_dir_all(&env_path).await.ok();
        }

        self.build(package_root, dependency_manifest, &env_path, &dep_fingerprint)
            .await?;

        self.run_eviction().await;

        self.describe(&env_path, &dep_fingerprint).await
    }

    async fn build(
        &self,
        package_root: &Path,
        dependency_manifest: Option<&Path>,
        env_path: &Path,
        dep_fingerprint: &str,
    ) -> Result<()> {
        tokio::fs::create_dir_all(env_path.parent().unwrap_or(env_path)).await?;

        let result = self
            .installer
            .install(
                package_root,
                dependency_manifest,
                env_path,
                self.wheelhouse.as_deref(),
                self.install_timeout,
            )
            .await;

        if let Err(err) = result {
            // Partial environments must not be left behind: a half-built
            // directory would otherwise look like a cache hit next time.
            let _ = tokio::fs::remove_dir_all(env_path).await;
            return Err(err);
        }

        if !self.installer.self_identifies_as(env_path).await {
            let _ = tokio::fs::remove_dir_all(env_path).await;
            return Err(crate::error::Error::InstallFailed(
                "environment failed post-install validation".into(),
            ));
        }

        let now = Utc::now();
        EnvMetadata::write(
            env_path,
            &EnvMetadata {
                dependency_fingerprint: dep_fingerprint.to_string(),
                installed_at: now,
                last_used_at: now,
            },
        )
        .await?;

        Ok(())
    }

    async fn describe(&self, env_path: &Path, dep_fingerprint: &str) -> Result<Environment> {
        let meta = EnvMetadata::read(env_path).await.unwrap_or(EnvMetadata {
            dependency_fingerprint: dep_fingerprint.to_string(),
            installed_at: Utc::now(),
            last_used_at: Utc::now(),
        });
        Ok(Environment {
            path: env_path.to_path_buf(),
            dependency_fingerprint: meta.dependency_fingerprint,
            created_at: meta.installed_at,
            last_used_at: meta.last_used_at,
        })
    }

    async fn run_eviction(&self) {
        let to_evict = plan_eviction(&self.envs_root, self.eviction_policy).await;
        for path in to_evict {
            info!(env = %path.display(), "evicting least-recently-used environment");
            let _ = tokio::fs::remove_dir_all(&path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_dependency_manifest_uses_literal_fingerprint() {
        let fp = dependency_fingerprint(None).await.unwrap();
        assert_eq!(fp, "no-deps");
    }

    #[tokio::test]
    async fn dependency_fingerprint_is_seven_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("requirements.txt");
        tokio::fs::write(&manifest, b"flask==3.0.0\n").await.unwrap();
        let fp = dependency_fingerprint(Some(&manifest)).await.unwrap();
        assert_eq!(fp.len(), 7);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn identical_manifests_yield_identical_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, b"numpy==1.0\n").await.unwrap();
        tokio::fs::write(&b, b"numpy==1.0\n").await.unwrap();
        assert_eq!(
            dependency_fingerprint(Some(&a)).await.unwrap(),
            dependency_fingerprint(Some(&b)).await.unwrap()
        );
    }

    #[tokio::test]
    async fn differing_manifests_yield_different_env_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, b"numpy==1.0\n").await.unwrap();
        tokio::fs::write(&b, b"numpy==2.0\n").await.unwrap();
        let fp_a = dependency_fingerprint(Some(&a)).await.unwrap();
        let fp_b = dependency_fingerprint(Some(&b)).await.unwrap();
        assert_ne!(env_name("app", &fp_a), env_name("app", &fp_b));
    }

    proptest::proptest! {
        /// Fingerprint/env-naming stability: byte-identical manifest
        /// contents always yield the same `envName` for the same
        /// `agentAppId`, regardless of what the bytes actually are.
        #[test]
        fn identical_bytes_always_name_the_same_env(
            agent_app_id in "[a-z][a-z0-9_-]{0,16}",
            contents in proptest::collection::vec(proptest::num::u8::ANY, 0..256),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let a = dir.path().join("a.manifest");
            let b = dir.path().join("b.manifest");
            std::fs::write(&a, &contents).unwrap();
            std::fs::write(&b, &contents).unwrap();

            let (fp_a, fp_b) = rt.block_on(async {
                (
                    dependency_fingerprint(Some(&a)).await.unwrap(),
                    dependency_fingerprint(Some(&b)).await.unwrap(),
                )
            });

            proptest::prop_assert_eq!(fp_a.len(), 7);
            proptest::prop_assert_eq!(&fp_a, &fp_b);
            proptest::prop_assert_eq!(
                env_name(&agent_app_id, &fp_a),
                env_name(&agent_app_id, &fp_b)
            );
        }
    }
}
