use agentrt_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no free port in the {0} range")]
    NoPortsAvailable(&'static str),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoPortsAvailable(_) => ErrorKind::NoPortsAvailable,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
