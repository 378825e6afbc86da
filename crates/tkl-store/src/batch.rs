//! Buffered write operations and the commit hook for durable backends.

use serde::{Deserialize, Serialize};
use tkl_types::{MovementRecord, TransactionRecord, TxStatus, ValidationRecord};

use crate::error::StoreResult;

/// One buffered write inside a unit of work.
///
/// A committed batch is a `Vec<TxOp>` applied in order. Validation records
/// carry the timestamp assigned when they were written, so replaying a
/// batch reproduces the original state exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOp {
    AddTransaction(TransactionRecord),
    AddMovement(MovementRecord),
    AddValidationRecord(ValidationRecord),
    AddTokenRequest {
        tx_id: String,
        request: Vec<u8>,
    },
    SetStatus {
        tx_id: String,
        status: TxStatus,
        message: String,
    },
}

impl TxOp {
    /// Transaction id the operation refers to.
    pub fn tx_id(&self) -> &str {
        match self {
            Self::AddTransaction(r) => &r.tx_id,
            Self::AddMovement(r) => &r.tx_id,
            Self::AddValidationRecord(r) => &r.tx_id,
            Self::AddTokenRequest { tx_id, .. } | Self::SetStatus { tx_id, .. } => tx_id,
        }
    }
}

/// Persistence hook invoked on commit, before the batch becomes visible.
///
/// If `append` fails the batch is dropped and never published, so a
/// journal and the in-memory view cannot diverge.
pub trait BatchJournal: Send + Sync {
    fn append(&self, batch: &[TxOp]) -> StoreResult<()>;
}
