use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid canonical id: {0:?}")]
    InvalidId(String),

    #[error("invalid object type tag: {0:?}")]
    InvalidObjectType(String),

    #[error("worker id {0} exceeds the 10-bit worker range")]
    WorkerOutOfRange(u16),

    #[error("unknown action: {0}")]
    UnknownAction(String),
}
