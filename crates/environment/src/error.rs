use agentrt_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("dependency install failed: {0}")]
    InstallFailed(String),
    #[error("dependency install timed out after {0:?}")]
    InstallTimeout(std::time::Duration),
    #[error("environment directory not writable: {0}")]
    Unwritable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InstallFailed(_) => ErrorKind::DependencyInstallFailed,
            Error::InstallTimeout(_) => ErrorKind::DependencyInstallTimeout,
            Error::Unwritable(_) | Error::Io(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
