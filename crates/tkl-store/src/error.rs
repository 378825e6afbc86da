use tkl_types::{TokenId, TxStatus, TypeError};

/// Coarse classification of a [`StoreError`].
///
/// `InvalidUsage` means the caller broke the contract (unit-of-work state,
/// write-once or lifecycle rules) and retrying the same call will fail
/// again. `Io` covers every operational failure; the only recovery is to
/// retry the whole unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUsage,
    Io,
}

/// Errors from store operations.
///
/// Lookups of unknown keys are never errors; they return zero values.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `begin_update` was called while a unit of work was already open.
    #[error("a unit of work is already open")]
    UnitAlreadyOpen,

    /// A write, commit, or discard was issued with no open unit of work.
    #[error("no unit of work is open")]
    NoOpenUnit,

    /// A certification proof was already stored for this token.
    #[error("certification already stored for token {0}")]
    CertificationExists(TokenId),

    /// The status lifecycle does not allow this change.
    #[error("invalid status transition for {tx_id}: {from} -> {to}")]
    InvalidStatusTransition {
        tx_id: String,
        from: TxStatus,
        to: TxStatus,
    },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding store state was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnitAlreadyOpen
            | Self::NoOpenUnit
            | Self::CertificationExists(_)
            | Self::InvalidStatusTransition { .. } => ErrorKind::InvalidUsage,
            Self::Io(_) | Self::Serialization(_) | Self::LockPoisoned(_) => ErrorKind::Io,
        }
    }

    pub fn is_invalid_usage(&self) -> bool {
        self.kind() == ErrorKind::InvalidUsage
    }
}

impl From<TypeError> for StoreError {
    fn from(e: TypeError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_classified() {
        assert_eq!(StoreError::UnitAlreadyOpen.kind(), ErrorKind::InvalidUsage);
        assert_eq!(StoreError::NoOpenUnit.kind(), ErrorKind::InvalidUsage);
        assert!(StoreError::CertificationExists(TokenId::new("tx", 0)).is_invalid_usage());
    }

    #[test]
    fn operational_errors_are_io() {
        let io = StoreError::from(std::io::Error::other("disk full"));
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(StoreError::Serialization("bad".into()).kind(), ErrorKind::Io);
        assert_eq!(StoreError::from(TypeError::InvalidStatusCode(9)).kind(), ErrorKind::Io);
    }
}
