use tkl_types::{Metadata, MovementRecord, TransactionRecord, TxStatus, ValidationRecord};

use crate::error::StoreResult;
use crate::iter::BoxedIterator;
use crate::params::{QueryMovementsParams, QueryTransactionsParams, QueryValidationRecordsParams};

/// Transactional write envelope shared by every store.
///
/// States: `Idle → Open → {Committed, Discarded} → Idle`. Writes are only
/// accepted while open and stay invisible to readers until `commit`
/// publishes the whole batch at once. The handle is reusable after either
/// terminal action.
///
/// All implementations must satisfy these invariants:
/// - `begin_update` while open fails with `UnitAlreadyOpen` (no nesting).
/// - writes, `commit`, and `discard` while idle fail with `NoOpenUnit`.
/// - a failed `commit` drops the batch; the caller retries the whole unit.
pub trait UnitOfWork: Send + Sync {
    fn begin_update(&self) -> StoreResult<()>;

    fn commit(&self) -> StoreResult<()>;

    fn discard(&self) -> StoreResult<()>;

    /// Returns `true` while a unit of work is open.
    fn is_open(&self) -> bool;
}

/// Append-style store of transaction records.
pub trait TransactionLedger: UnitOfWork {
    /// Buffer a transaction record. Records sharing a `tx_id` are all kept,
    /// in insertion order.
    fn add_transaction(&self, record: &TransactionRecord) -> StoreResult<()>;

    /// Buffer a status change for every record sharing `tx_id`.
    fn set_status(&self, tx_id: &str, status: TxStatus) -> StoreResult<()> {
        self.set_status_with_message(tx_id, status, "")
    }

    /// Like [`set_status`](Self::set_status), also recording a status
    /// message returned by [`get_status`](Self::get_status).
    fn set_status_with_message(&self, tx_id: &str, status: TxStatus, message: &str)
        -> StoreResult<()>;

    /// Committed status and message of a transaction.
    ///
    /// Returns `(Unknown, "")` for an unknown id.
    fn get_status(&self, tx_id: &str) -> StoreResult<(TxStatus, String)>;

    /// Lazily iterate committed records matching `params`, in storage order.
    fn query_transactions(
        &self,
        params: &QueryTransactionsParams,
    ) -> StoreResult<BoxedIterator<TransactionRecord>>;
}

/// Append-style store of signed per-party balance deltas.
pub trait MovementLedger: UnitOfWork {
    fn add_movement(&self, record: &MovementRecord) -> StoreResult<()>;

    /// Committed movements matching `params`, paged from the requested end.
    fn query_movements(&self, params: &QueryMovementsParams) -> StoreResult<Vec<MovementRecord>>;

    /// Sum of committed amounts for one party and token type.
    ///
    /// An empty `statuses` list counts movements in every status.
    fn balance(
        &self,
        enrollment_id: &str,
        token_type: &str,
        statuses: &[TxStatus],
    ) -> StoreResult<i128> {
        let records = self.query_movements(&QueryMovementsParams {
            tx_statuses: statuses.to_vec(),
            enrollment_ids: vec![enrollment_id.to_string()],
            token_types: vec![token_type.to_string()],
            ..Default::default()
        })?;
        Ok(records
            .iter()
            .fold(0i128, |acc, r| acc.saturating_add(r.amount)))
    }
}

/// Store of raw token requests and validation (audit) records.
pub trait ValidationRecordStore: UnitOfWork {
    /// Buffer a validation record. The timestamp is assigned by the store at
    /// call time and the status starts as `Unknown`.
    fn add_validation_record(
        &self,
        tx_id: &str,
        token_request: &[u8],
        metadata: &Metadata,
    ) -> StoreResult<()>;

    /// Lazily iterate committed validation records matching `params`.
    fn query_validations(
        &self,
        params: &QueryValidationRecordsParams,
    ) -> StoreResult<BoxedIterator<ValidationRecord>>;

    fn add_token_request(&self, tx_id: &str, request: &[u8]) -> StoreResult<()>;

    /// Committed token request for `tx_id`, or `None` if unknown.
    fn get_token_request(&self, tx_id: &str) -> StoreResult<Option<Vec<u8>>>;
}

/// A backend serving all three ledgers behind one unit of work.
pub trait TransactionDb: TransactionLedger + MovementLedger + ValidationRecordStore {}

impl<T> TransactionDb for T where T: TransactionLedger + MovementLedger + ValidationRecordStore {}
