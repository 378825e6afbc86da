use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid status code: {0}")]
    InvalidStatusCode(u8),

    #[error("unknown status name: {0}")]
    UnknownStatus(String),

    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("malformed token id: {0}")]
    MalformedTokenId(String),
}
