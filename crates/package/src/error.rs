use agentrt_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fetch failed: {0}")]
    Fetch(#[from] agentrt_fetcher::error::Error),
    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),
    #[error("failed to extract package archive: {0}")]
    ExtractFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Fetch(e) => e.kind(),
            Error::ManifestInvalid(_) => ErrorKind::ManifestInvalid,
            Error::ExtractFailed(_) => ErrorKind::ManifestInvalid,
            Error::Io(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
