use agentrt_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("deployment {0} not found")]
    NotFound(String),
    #[error("deployment {0} already has a task in flight")]
    AlreadyInFlight(String),
    #[error("invalid deployment request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Fetch(#[from] agentrt_fetcher::error::Error),
    #[error(transparent)]
    Package(#[from] agentrt_package::error::Error),
    #[error(transparent)]
    Environment(#[from] agentrt_environment::Error),
    #[error(transparent)]
    Ports(#[from] agentrt_ports::Error),
    #[error(transparent)]
    Supervisor(#[from] agentrt_supervisor::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::AlreadyInFlight(_) | Error::InvalidRequest(_) => ErrorKind::Other,
            Error::Fetch(e) => e.kind(),
            Error::Package(e) => e.kind(),
            Error::Environment(e) => e.kind(),
            Error::Ports(e) => e.kind(),
            Error::Supervisor(e) => e.kind(),
            Error::Io(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
