use agentrt_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scheme `{0}` is not an allowed package source scheme")]
    DisallowedScheme(String),
    #[error("origin unavailable: {0}")]
    Unavailable(String),
    #[error("fetched bytes ({actual} bytes) exceed the configured limit of {max} bytes")]
    TooLarge { actual: u64, max: u64 },
    #[error("fetch exceeded the configured timeout")]
    Timeout,
    #[error("integrity mismatch: expected {expected}, computed {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DisallowedScheme(_) | Error::Unavailable(_) | Error::TooLarge { .. } => {
                ErrorKind::FetchUnavailable
            }
            Error::Timeout => ErrorKind::FetchUnavailable,
            Error::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Error::Io(_) | Error::Request(_) => ErrorKind::FetchUnavailable,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
