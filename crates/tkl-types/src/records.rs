//! Records materialized from ledger activity.
//!
//! These are the row shapes of the transaction log, the movement log, and
//! the validation (audit) log. Backends may store them however they like as
//! long as queries return them unchanged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{ActionType, TxStatus};

/// Opaque metadata attached to a validation record.
pub type Metadata = BTreeMap<String, Vec<u8>>;

/// One leg of a ledger transaction.
///
/// `tx_id` is not unique: a multi-party transfer produces one record per
/// leg (payment, change, ...), all sharing the same id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_id: String,
    pub action_type: ActionType,
    /// Enrollment id of the sender. Empty for issuance.
    pub sender_eid: String,
    /// Enrollment id of the recipient. Empty for redemption.
    pub recipient_eid: String,
    pub token_type: String,
    pub amount: u128,
    /// Caller-supplied time of the transaction.
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
}

/// Signed balance delta for one enrollment id and token type.
///
/// Positive amounts were received, negative amounts were sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub tx_id: String,
    pub enrollment_id: String,
    pub token_type: String,
    pub amount: i128,
    pub status: TxStatus,
}

impl MovementRecord {
    pub fn is_received(&self) -> bool {
        self.amount > 0
    }

    pub fn is_sent(&self) -> bool {
        self.amount < 0
    }
}

/// A raw token request paired with its processing outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub tx_id: String,
    /// Serialized token request, never interpreted by the store.
    pub token_request: Vec<u8>,
    pub metadata: Metadata,
    /// `Unknown` until a status is set for the transaction.
    pub status: TxStatus,
    /// Assigned by the store when the record is written.
    pub timestamp: DateTime<Utc>,
}
