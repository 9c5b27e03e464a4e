use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Schemes a [`DeploymentRequest::package_source`] is allowed to use.
/// Any other scheme (in particular `file://`, which would let a caller
/// read arbitrary local paths through the host) is rejected before any
/// state is created.
pub const ALLOWED_SOURCE_SCHEMES: &[&str] = &["object-store", "https"];

/// Immutable intake for one deployment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Carried by the `Idempotency-Key` header at the Control API boundary;
    /// defaulted here so the header, not the body, is the single source of
    /// truth when both are present.
    #[serde(default)]
    pub request_id: String,
    pub deployment_id: String,
    pub agent_app_id: String,
    pub org_id: Option<String>,
    pub version: String,
    pub package_source: url::Url,
    pub package_fingerprint: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    pub base_path: Option<String>,
}

impl DeploymentRequest {
    /// Validates the request shape and returns a descriptive error if it
    /// would be rejected before any [`DeploymentRecord`] is created.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_app_id.trim().is_empty() {
            return Err("agentAppId must be non-empty".to_string());
        }
        if !ALLOWED_SOURCE_SCHEMES.contains(&self.package_source.scheme()) {
            return Err(format!(
                "packageSource scheme `{}` is not one of {:?}",
                self.package_source.scheme(),
                ALLOWED_SOURCE_SCHEMES
            ));
        }
        if let Some(fp) = &self.package_fingerprint {
            if fp.len() != 64 || !fp.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err("packageFingerprint must be a 64-hex-char SHA-256 digest".to_string());
            }
        }
        Ok(())
    }
}

/// The deployment state machine from the deployment manager design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Downloading,
    Loading,
    BuildingEnv,
    Starting,
    WaitingReady,
    Healthy,
    Draining,
    Stopped,
    Failed,
}

impl DeploymentStatus {
    /// True once a record has reached a state from which it only moves to
    /// `draining`/`stopped`, per the `DeploymentRecord` invariant.
    #[must_use]
    pub fn is_terminal_ish(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Healthy | DeploymentStatus::Failed | DeploymentStatus::Stopped
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentStatus::Failed | DeploymentStatus::Stopped)
    }
}

/// Mutable state for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployment_id: String,
    pub request_id: String,
    pub agent_app_id: String,
    pub version: String,
    pub status: DeploymentStatus,
    /// Which surfaces the package's manifest declares; all `false` until
    /// the Manifest Reader has run (§6 `GET /deployments/{id}/health`'s
    /// `surfaces` object).
    #[serde(default)]
    pub declared_surfaces: DeclaredSurfaces,
    pub rest_port: Option<u16>,
    pub rpc_port: Option<u16>,
    pub ui_port: Option<u16>,
    pub package_path: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
    pub child_pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<LastError>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DeploymentRecord {
    #[must_use]
    pub fn new(request: &DeploymentRequest) -> Self {
        let now = Utc::now();
        Self {
            deployment_id: request.deployment_id.clone(),
            request_id: request.request_id.clone(),
            agent_app_id: request.agent_app_id.clone(),
            version: request.version.clone(),
            status: DeploymentStatus::Pending,
            declared_surfaces: DeclaredSurfaces::default(),
            rest_port: None,
            rpc_port: None,
            ui_port: None,
            package_path: None,
            env_path: None,
            child_pid: None,
            created_at: now,
            updated_at: now,
            last_error: None,
            details: serde_json::Value::Null,
        }
    }

    /// Ports are either all unset or all distinct, per the record's invariant.
    #[must_use]
    pub fn ports_consistent(&self) -> bool {
        match (self.rest_port, self.rpc_port, self.ui_port) {
            (None, None, None) => true,
            (Some(r), Some(p), Some(u)) => r != p && p != u && r != u,
            _ => false,
        }
    }

    pub fn transition(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.last_error = Some(LastError {
            kind,
            message: message.into(),
        });
        self.transition(DeploymentStatus::Failed);
    }
}

/// A materialised package artifact on disk (§3 `CachedPackage`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPackage {
    pub path: PathBuf,
    pub fingerprint: String,
    pub size_bytes: u64,
    pub fetched_at: DateTime<Utc>,
}

/// One declared surface's entrypoint reference in a [`PackageManifest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestSurface {
    pub entry: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcSurface {
    pub service: Option<String>,
}

fn default_ui_base_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSurface {
    pub path: Option<String>,
    #[serde(default = "default_ui_base_path")]
    pub base_path: String,
}

impl Default for UiSurface {
    fn default() -> Self {
        Self {
            path: None,
            base_path: default_ui_base_path(),
        }
    }
}

/// The declarative description extracted from a package's manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub rest: RestSurface,
    #[serde(default)]
    pub rpc: RpcSurface,
    #[serde(default)]
    pub ui: UiSurface,
    /// Dependency manifest file name, relative to the package root, used by
    /// the environment builder to compute the dependency fingerprint.
    #[serde(default = "default_dependency_manifest")]
    pub dependency_manifest: String,
}

fn default_dependency_manifest() -> String {
    "requirements.txt".to_string()
}

impl PackageManifest {
    /// At least one surface must be declared, per the manifest's invariant.
    #[must_use]
    pub fn has_any_surface(&self) -> bool {
        self.rest.entry.is_some() || self.rpc.service.is_some() || self.ui.path.is_some()
    }

    #[must_use]
    pub fn declared_surfaces(&self) -> DeclaredSurfaces {
        DeclaredSurfaces {
            rest: self.rest.entry.is_some(),
            rpc: self.rpc.service.is_some(),
            ui: self.ui.path.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredSurfaces {
    pub rest: bool,
    pub rpc: bool,
    pub ui: bool,
}

/// An isolated per-package dependency closure (§3 `Environment`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub path: PathBuf,
    pub dependency_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// A port reservation for one deployment (§3 `PortAllocation`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortAllocation {
    pub rest_port: u16,
    pub rpc_port: u16,
    pub ui_port: u16,
}
