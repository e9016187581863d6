//! Failures talking to the executor worker.

use std::io;
use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("cannot start executor worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("cannot send request to executor worker: {0}")]
    Send(#[source] io::Error),

    /// A request could not be encoded or a reply did not match its method.
    #[error("malformed worker message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("executor worker did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    /// The process went away with the request still outstanding.
    #[error("executor worker is no longer running")]
    Exited,

    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    /// The database refused the request; the message is the database's own.
    #[error("{0}")]
    Refused(String),

    #[error("worker error {code}: {message}")]
    Remote { code: String, message: String },
}

impl WorkerError {
    /// Map a worker failure reply to an error.
    pub fn from_reply(code: &str, message: &str) -> Self {
        let message = message.to_string();
        match code {
            "UNKNOWN_CONNECTION" => Self::UnknownConnection(message),
            "CONNECTION_FAILED" => Self::ConnectionFailed(message),
            "QUERY_REJECTED" | "INVALID_REQUEST" => Self::Refused(message),
            "WORKER_EXITED" => Self::Exited,
            _ => Self::Remote {
                code: code.to_string(),
                message,
            },
        }
    }

    /// True when the request never reached a database verdict.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Spawn(_) | Self::Send(_) | Self::Timeout(_) | Self::Exited | Self::ConnectionFailed(_)
        )
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for WorkerError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::Exited
    }
}
