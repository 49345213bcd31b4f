use thiserror::Error;

use crate::frontend::FrontendError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown device type: {0}")]
    UnknownDevice(String),

    #[error("Device acquisition failed: {0}")]
    Acquisition(#[from] FrontendError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already streaming: {0}")]
    AlreadyStreaming(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::SessionNotFound(token) => Self::not_found(format!("session not found: {token}")),
            Error::AlreadyStreaming(token) => {
                Self::already_exists(format!("session already streaming: {token}"))
            }
            Error::UnknownDevice(kind) => Self::invalid_argument(format!("unknown device type: {kind}")),
            Error::InvalidInput(msg) => Self::invalid_argument(msg),
            Error::Acquisition(e) => Self::unavailable(format!("device acquisition failed: {e}")),
            Error::SessionExpired(token) => Self::aborted(format!("session expired: {token}")),
            other => {
                tracing::error!("Internal error: {other}");
                Self::internal("Internal error")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
