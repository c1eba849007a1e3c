use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type of the caller supplied transform and fold functions. The engine never inspects
/// it, it is carried unchanged to the caller.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transform Error - {0}")]
    Transform(#[source] BoxError),

    #[error("Fold Error - {0}")]
    Fold(#[source] BoxError),

    #[error("Worker Error - {0}")]
    Worker(String),

    #[error("Stream Error - {0}")]
    Stream(String),

    #[error("Config Error - {0}")]
    Config(String),
}

impl Error {
    /// Returns the error raised by the caller's transform or fold function, if this error
    /// originated there.
    pub fn into_source(self) -> Option<BoxError> {
        match self {
            Error::Transform(e) | Error::Fold(e) => Some(e),
            Error::Worker(_) | Error::Stream(_) | Error::Config(_) => None,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Error::Worker(format!("task failed to complete: {value}"))
    }
}
