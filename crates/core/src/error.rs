use std::fmt;

/// The error taxonomy from the runtime's error handling design: a small,
/// closed set of *kinds* rather than one type per component. Every
/// component maps whatever concrete error it produced onto one of these
/// before recording it in a [`crate::model::DeploymentRecord::last_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorKind {
    /// Bad env var or missing required field. Fatal at startup.
    ConfigInvalid,
    /// Origin reachable but denied or missing. Terminal for the deployment.
    FetchUnavailable,
    /// Fetched/cached bytes do not match the expected fingerprint.
    IntegrityMismatch,
    /// Package shape rejected by the manifest reader.
    ManifestInvalid,
    /// Dependency install step exited non-zero.
    DependencyInstallFailed,
    /// Dependency install step exceeded its timeout.
    DependencyInstallTimeout,
    /// A port range was exhausted.
    NoPortsAvailable,
    /// The child process could not be spawned.
    ChildSpawnFailed,
    /// The child never reported healthy within the readiness window.
    NotReadyInTime,
    /// The child exited before becoming healthy, or crashed after.
    ChildCrashed,
    /// Graceful drain exceeded its budget; forceful termination was applied.
    ShutdownTimeout,
    /// Anything not covered above; always paired with a human-readable message.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::FetchUnavailable => "FetchUnavailable",
            ErrorKind::IntegrityMismatch => "IntegrityMismatch",
            ErrorKind::ManifestInvalid => "ManifestInvalid",
            ErrorKind::DependencyInstallFailed => "DependencyInstallFailed",
            ErrorKind::DependencyInstallTimeout => "DependencyInstallTimeout",
            ErrorKind::NoPortsAvailable => "NoPortsAvailable",
            ErrorKind::ChildSpawnFailed => "ChildSpawnFailed",
            ErrorKind::NotReadyInTime => "NotReadyInTime",
            ErrorKind::ChildCrashed => "ChildCrashed",
            ErrorKind::ShutdownTimeout => "ShutdownTimeout",
            ErrorKind::Other => "Other",
        };
        f.write_str(s)
    }
}

impl ErrorKind {
    /// Whether the kind is non-fatal, i.e. the failed phase may be retried
    /// by the caller without a new `requestId`.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::NoPortsAvailable | ErrorKind::ShutdownTimeout)
    }
}

/// An error carrying its classification, for attachment to a
/// [`crate::model::DeploymentRecord`].
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct KindedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl KindedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KindedError>;
