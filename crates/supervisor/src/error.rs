use agentrt_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn child process: {0}")]
    SpawnFailed(String),
    #[error("graceful shutdown timed out, forceful termination applied")]
    ShutdownTimeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SpawnFailed(_) => ErrorKind::ChildSpawnFailed,
            Error::ShutdownTimeout => ErrorKind::ShutdownTimeout,
            Error::Io(_) => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
