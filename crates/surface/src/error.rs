use agentrt_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid runtime configuration: {0}")]
    ConfigInvalid(String),
    #[error("failed to materialise package from PACKAGE_URL: {0}")]
    Fetch(#[from] agentrt_fetcher::error::Error),
    #[error(transparent)]
    Manifest(#[from] agentrt_package::error::Error),
    #[error("boot budget of {budget_ms}ms exceeded ({elapsed_ms}ms elapsed)")]
    BootBudgetExceeded { budget_ms: u64, elapsed_ms: u64 },
    #[error("surface {0} failed to initialise: {1}")]
    SurfaceInitFailed(&'static str, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            Error::Fetch(e) => e.kind(),
            Error::Manifest(e) => e.kind(),
            Error::BootBudgetExceeded { .. } => ErrorKind::NotReadyInTime,
            Error::SurfaceInitFailed(..) => ErrorKind::NotReadyInTime,
            Error::Io(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
