use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::debug;

use tkl_types::{Metadata, MovementRecord, TransactionRecord, TxStatus, ValidationRecord};

use crate::batch::{BatchJournal, TxOp};
use crate::error::{StoreError, StoreResult};
use crate::iter::{BoxedIterator, SnapshotIter};
use crate::params::{QueryMovementsParams, QueryTransactionsParams, QueryValidationRecordsParams};
use crate::traits::{MovementLedger, TransactionLedger, UnitOfWork, ValidationRecordStore};

/// In-memory reference backend for the transaction, movement, and
/// validation ledgers.
///
/// Committed state is an immutable [`Snapshot`] behind an `Arc`. Readers
/// clone the `Arc` and never block on a writer; `commit` builds the next
/// snapshot copy-on-write and swaps it in one step, so a reader sees either
/// all of a batch or none of it. An optional [`BatchJournal`] is invoked
/// before the swap.
pub struct InMemoryTransactionDb {
    committed: RwLock<Arc<Snapshot>>,
    pending: Mutex<Option<Vec<TxOp>>>,
    journal: Option<Arc<dyn BatchJournal>>,
}

/// One committed version of every relation.
#[derive(Clone, Default)]
struct Snapshot {
    transactions: Arc<Vec<TransactionRecord>>,
    movements: Arc<Vec<MovementRecord>>,
    validations: Arc<Vec<ValidationRecord>>,
    token_requests: Arc<HashMap<String, Vec<u8>>>,
    messages: Arc<HashMap<String, String>>,
}

impl Snapshot {
    fn apply(&mut self, op: TxOp) {
        match op {
            TxOp::AddTransaction(record) => Arc::make_mut(&mut self.transactions).push(record),
            TxOp::AddMovement(record) => Arc::make_mut(&mut self.movements).push(record),
            TxOp::AddValidationRecord(record) => Arc::make_mut(&mut self.validations).push(record),
            TxOp::AddTokenRequest { tx_id, request } => {
                Arc::make_mut(&mut self.token_requests).insert(tx_id, request);
            }
            TxOp::SetStatus {
                tx_id,
                status,
                message,
            } => self.set_status(&tx_id, status, message),
        }
    }

    /// Relations are only copied when a row actually changes, so
    /// re-applying a status leaves the snapshot untouched.
    fn set_status(&mut self, tx_id: &str, status: TxStatus, message: String) {
        if self
            .transactions
            .iter()
            .any(|r| r.tx_id == tx_id && r.status != status)
        {
            Arc::make_mut(&mut self.transactions)
                .iter_mut()
                .filter(|r| r.tx_id == tx_id)
                .for_each(|r| r.status = status);
        }
        if self
            .movements
            .iter()
            .any(|r| r.tx_id == tx_id && r.status != status)
        {
            Arc::make_mut(&mut self.movements)
                .iter_mut()
                .filter(|r| r.tx_id == tx_id)
                .for_each(|r| r.status = status);
        }
        if self
            .validations
            .iter()
            .any(|r| r.tx_id == tx_id && r.status != status)
        {
            Arc::make_mut(&mut self.validations)
                .iter_mut()
                .filter(|r| r.tx_id == tx_id)
                .for_each(|r| r.status = status);
        }

        // An empty message keeps the current one. A message is only kept
        // for a transaction that get_status can report.
        if message.is_empty() || self.status_of(tx_id).is_none() {
            return;
        }
        if self.messages.get(tx_id) != Some(&message) {
            Arc::make_mut(&mut self.messages).insert(tx_id.to_string(), message);
        }
    }

    fn status_of(&self, tx_id: &str) -> Option<TxStatus> {
        self.transactions
            .iter()
            .find(|r| r.tx_id == tx_id)
            .map(|r| r.status)
            .or_else(|| {
                self.validations
                    .iter()
                    .find(|r| r.tx_id == tx_id)
                    .map(|r| r.status)
            })
    }
}

impl InMemoryTransactionDb {
    /// Create a new empty database.
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Arc::new(Snapshot::default())),
            pending: Mutex::new(None),
            journal: None,
        }
    }

    /// Rebuild a database by replaying committed batches in order.
    pub fn from_batches<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = Vec<TxOp>>,
    {
        let mut snapshot = Snapshot::default();
        let mut replayed = 0usize;
        for batch in batches {
            for op in batch {
                snapshot.apply(op);
            }
            replayed += 1;
        }
        debug!(batches = replayed, "replayed committed batches");
        Self {
            committed: RwLock::new(Arc::new(snapshot)),
            pending: Mutex::new(None),
            journal: None,
        }
    }

    /// Attach a journal that receives every batch before it is published.
    pub fn with_journal(mut self, journal: Arc<dyn BatchJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// A single batch that rebuilds the current committed state.
    ///
    /// Every record is added with the status it currently has; status
    /// messages come last, once their transactions exist.
    pub fn snapshot_ops(&self) -> StoreResult<Vec<TxOp>> {
        let snapshot = self.snapshot()?;
        let mut ops = Vec::new();

        ops.extend(snapshot.transactions.iter().cloned().map(TxOp::AddTransaction));
        ops.extend(snapshot.movements.iter().cloned().map(TxOp::AddMovement));
        ops.extend(
            snapshot
                .validations
                .iter()
                .cloned()
                .map(TxOp::AddValidationRecord),
        );
        let mut requests: Vec<_> = snapshot.token_requests.iter().collect();
        requests.sort();
        for (tx_id, request) in requests {
            ops.push(TxOp::AddTokenRequest {
                tx_id: tx_id.clone(),
                request: request.clone(),
            });
        }
        let mut messages: Vec<_> = snapshot.messages.iter().collect();
        messages.sort();
        for (tx_id, message) in messages {
            ops.push(TxOp::SetStatus {
                tx_id: tx_id.clone(),
                status: snapshot.status_of(tx_id).unwrap_or_default(),
                message: message.clone(),
            });
        }
        Ok(ops)
    }

    fn snapshot(&self) -> StoreResult<Arc<Snapshot>> {
        let guard = self.committed.read()?;
        Ok(Arc::clone(&*guard))
    }

    fn buffer(&self, op: TxOp) -> StoreResult<()> {
        let mut pending = self.pending.lock()?;
        pending.as_mut().ok_or(StoreError::NoOpenUnit)?.push(op);
        Ok(())
    }
}

impl Default for InMemoryTransactionDb {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitOfWork for InMemoryTransactionDb {
    fn begin_update(&self) -> StoreResult<()> {
        let mut pending = self.pending.lock()?;
        if pending.is_some() {
            return Err(StoreError::UnitAlreadyOpen);
        }
        *pending = Some(Vec::new());
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        // The pending lock is held until the new snapshot is published, so
        // commits are serialized.
        let mut pending = self.pending.lock()?;
        let batch = pending.take().ok_or(StoreError::NoOpenUnit)?;
        if batch.is_empty() {
            return Ok(());
        }

        if let Some(journal) = &self.journal {
            journal.append(&batch)?;
        }

        let ops = batch.len();
        let current = self.snapshot()?;
        let mut next = Snapshot::clone(&current);
        for op in batch {
            next.apply(op);
        }
        *self.committed.write()? = Arc::new(next);

        debug!(ops, "unit of work committed");
        Ok(())
    }

    fn discard(&self) -> StoreResult<()> {
        let mut pending = self.pending.lock()?;
        let batch = pending.take().ok_or(StoreError::NoOpenUnit)?;
        debug!(ops = batch.len(), "unit of work discarded");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.pending.lock().map(|p| p.is_some()).unwrap_or(false)
    }
}

impl TransactionLedger for InMemoryTransactionDb {
    fn add_transaction(&self, record: &TransactionRecord) -> StoreResult<()> {
        self.buffer(TxOp::AddTransaction(record.clone()))
    }

    fn set_status_with_message(
        &self,
        tx_id: &str,
        status: TxStatus,
        message: &str,
    ) -> StoreResult<()> {
        self.buffer(TxOp::SetStatus {
            tx_id: tx_id.to_string(),
            status,
            message: message.to_string(),
        })
    }

    fn get_status(&self, tx_id: &str) -> StoreResult<(TxStatus, String)> {
        let snapshot = self.snapshot()?;
        let Some(status) = snapshot.status_of(tx_id) else {
            return Ok((TxStatus::Unknown, String::new()));
        };
        let message = snapshot.messages.get(tx_id).cloned().unwrap_or_default();
        Ok((status, message))
    }

    fn query_transactions(
        &self,
        params: &QueryTransactionsParams,
    ) -> StoreResult<BoxedIterator<TransactionRecord>> {
        let rows = Arc::clone(&self.snapshot()?.transactions);
        let params = params.clone();
        Ok(Box::new(SnapshotIter::new(
            rows,
            move |r: &TransactionRecord| params.matches(r).then(|| r.clone()),
        )))
    }
}

impl MovementLedger for InMemoryTransactionDb {
    fn add_movement(&self, record: &MovementRecord) -> StoreResult<()> {
        self.buffer(TxOp::AddMovement(record.clone()))
    }

    fn query_movements(&self, params: &QueryMovementsParams) -> StoreResult<Vec<MovementRecord>> {
        let rows = Arc::clone(&self.snapshot()?.movements);
        Ok(params.page(rows.iter()))
    }
}

impl ValidationRecordStore for InMemoryTransactionDb {
    fn add_validation_record(
        &self,
        tx_id: &str,
        token_request: &[u8],
        metadata: &Metadata,
    ) -> StoreResult<()> {
        self.buffer(TxOp::AddValidationRecord(ValidationRecord {
            tx_id: tx_id.to_string(),
            token_request: token_request.to_vec(),
            metadata: metadata.clone(),
            status: TxStatus::Unknown,
            timestamp: Utc::now(),
        }))
    }

    fn query_validations(
        &self,
        params: &QueryValidationRecordsParams,
    ) -> StoreResult<BoxedIterator<ValidationRecord>> {
        let rows = Arc::clone(&self.snapshot()?.validations);
        let params = params.clone();
        Ok(Box::new(SnapshotIter::new(
            rows,
            move |r: &ValidationRecord| params.matches(r).then(|| r.clone()),
        )))
    }

    fn add_token_request(&self, tx_id: &str, request: &[u8]) -> StoreResult<()> {
        self.buffer(TxOp::AddTokenRequest {
            tx_id: tx_id.to_string(),
            request: request.to_vec(),
        })
    }

    fn get_token_request(&self, tx_id: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.snapshot()?.token_requests.get(tx_id).cloned())
    }
}

impl std::fmt::Debug for InMemoryTransactionDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("InMemoryTransactionDb");
        if let Ok(snapshot) = self.snapshot() {
            out.field("transactions", &snapshot.transactions.len())
                .field("movements", &snapshot.movements.len())
                .field("validations", &snapshot.validations.len());
        }
        out.field("open", &self.is_open())
            .field("journaled", &self.journal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::collect_records;
    use tkl_types::ActionType;

    crate::transaction_db_conformance!(Box::new(InMemoryTransactionDb::new()));

    fn record(tx_id: &str) -> TransactionRecord {
        TransactionRecord {
            tx_id: tx_id.into(),
            action_type: ActionType::Issue,
            sender_eid: String::new(),
            recipient_eid: "alice".into(),
            token_type: "magic".into(),
            amount: 5,
            timestamp: Utc::now(),
            status: TxStatus::Pending,
        }
    }

    fn all_transactions(db: &InMemoryTransactionDb) -> Vec<TransactionRecord> {
        let mut it = db
            .query_transactions(&QueryTransactionsParams::default())
            .unwrap();
        collect_records(it.as_mut()).unwrap()
    }

    struct FailingJournal;

    impl BatchJournal for FailingJournal {
        fn append(&self, _batch: &[TxOp]) -> StoreResult<()> {
            Err(StoreError::Io(std::io::Error::other("disk unavailable")))
        }
    }

    #[derive(Default)]
    struct RecordingJournal {
        batches: Mutex<Vec<Vec<TxOp>>>,
    }

    impl BatchJournal for RecordingJournal {
        fn append(&self, batch: &[TxOp]) -> StoreResult<()> {
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    #[test]
    fn failed_journal_append_drops_batch() {
        let db = InMemoryTransactionDb::new().with_journal(Arc::new(FailingJournal));
        db.begin_update().unwrap();
        db.add_transaction(&record("tx1")).unwrap();
        let err = db.commit().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);

        assert!(!db.is_open());
        assert!(all_transactions(&db).is_empty());
        // The handle is usable again for a retry.
        db.begin_update().unwrap();
        db.discard().unwrap();
    }

    #[test]
    fn journal_sees_each_committed_batch_once() {
        let journal = Arc::new(RecordingJournal::default());
        let db = InMemoryTransactionDb::new().with_journal(journal.clone());

        db.begin_update().unwrap();
        db.add_transaction(&record("tx1")).unwrap();
        db.set_status("tx1", TxStatus::Confirmed).unwrap();
        db.commit().unwrap();

        db.begin_update().unwrap();
        db.add_transaction(&record("tx2")).unwrap();
        db.discard().unwrap();

        let batches = journal.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn empty_commit_is_not_journaled() {
        let journal = Arc::new(RecordingJournal::default());
        let db = InMemoryTransactionDb::new().with_journal(journal.clone());
        db.begin_update().unwrap();
        db.commit().unwrap();
        assert!(journal.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn replaying_batches_restores_state() {
        let db = InMemoryTransactionDb::new();
        db.begin_update().unwrap();
        db.add_transaction(&record("tx1")).unwrap();
        db.add_validation_record("tx1", b"req", &Metadata::new())
            .unwrap();
        db.add_token_request("tx1", b"req").unwrap();
        db.set_status_with_message("tx1", TxStatus::Deleted, "endorsement failed")
            .unwrap();
        db.commit().unwrap();

        let restored = InMemoryTransactionDb::from_batches(vec![db.snapshot_ops().unwrap()]);
        assert_eq!(all_transactions(&restored), all_transactions(&db));
        assert_eq!(
            restored.get_status("tx1").unwrap(),
            (TxStatus::Deleted, "endorsement failed".to_string())
        );
        assert_eq!(
            restored.get_token_request("tx1").unwrap(),
            Some(b"req".to_vec())
        );
    }

    #[test]
    fn status_message_is_reported() {
        let db = InMemoryTransactionDb::new();
        db.begin_update().unwrap();
        db.add_transaction(&record("tx1")).unwrap();
        db.set_status_with_message("tx1", TxStatus::Deleted, "mvcc conflict")
            .unwrap();
        db.commit().unwrap();
        assert_eq!(
            db.get_status("tx1").unwrap(),
            (TxStatus::Deleted, "mvcc conflict".to_string())
        );
    }

    #[test]
    fn empty_message_keeps_the_current_one() {
        let db = InMemoryTransactionDb::new();
        db.begin_update().unwrap();
        db.add_transaction(&record("tx1")).unwrap();
        db.set_status_with_message("tx1", TxStatus::Confirmed, "finalized")
            .unwrap();
        db.commit().unwrap();

        db.begin_update().unwrap();
        db.set_status("tx1", TxStatus::Confirmed).unwrap();
        db.commit().unwrap();
        assert_eq!(
            db.get_status("tx1").unwrap(),
            (TxStatus::Confirmed, "finalized".to_string())
        );
    }

    #[test]
    fn message_for_unknown_tx_is_not_kept() {
        let db = InMemoryTransactionDb::new();
        db.begin_update().unwrap();
        db.set_status_with_message("tx1", TxStatus::Deleted, "stale")
            .unwrap();
        db.commit().unwrap();
        assert_eq!(
            db.get_status("tx1").unwrap(),
            (TxStatus::Unknown, String::new())
        );

        db.begin_update().unwrap();
        db.add_transaction(&record("tx1")).unwrap();
        db.commit().unwrap();
        assert_eq!(
            db.get_status("tx1").unwrap(),
            (TxStatus::Pending, String::new())
        );
        let ops = db.snapshot_ops().unwrap();
        assert!(!ops.iter().any(|op| matches!(op, TxOp::SetStatus { .. })));
    }

    #[test]
    fn get_status_falls_back_to_validation_records() {
        let db = InMemoryTransactionDb::new();
        db.begin_update().unwrap();
        db.add_validation_record("audit-1", b"req", &Metadata::new())
            .unwrap();
        db.set_status("audit-1", TxStatus::Confirmed).unwrap();
        db.commit().unwrap();
        assert_eq!(
            db.get_status("audit-1").unwrap(),
            (TxStatus::Confirmed, String::new())
        );
    }

    #[test]
    fn reapplied_status_does_not_copy_relations() {
        let db = InMemoryTransactionDb::new();
        db.begin_update().unwrap();
        db.add_transaction(&record("tx1")).unwrap();
        db.commit().unwrap();

        let before = Arc::clone(&db.snapshot().unwrap().transactions);
        db.begin_update().unwrap();
        db.set_status("tx1", TxStatus::Pending).unwrap();
        db.commit().unwrap();
        let after = Arc::clone(&db.snapshot().unwrap().transactions);
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn open_iterator_keeps_its_snapshot() {
        let db = InMemoryTransactionDb::new();
        db.begin_update().unwrap();
        db.add_transaction(&record("tx1")).unwrap();
        db.commit().unwrap();

        let mut it = db
            .query_transactions(&QueryTransactionsParams::default())
            .unwrap();

        db.begin_update().unwrap();
        db.add_transaction(&record("tx2")).unwrap();
        db.set_status("tx1", TxStatus::Confirmed).unwrap();
        db.commit().unwrap();

        let seen = collect_records(it.as_mut()).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, TxStatus::Pending);
        assert_eq!(all_transactions(&db).len(), 2);
    }

    #[test]
    fn debug_format() {
        let db = InMemoryTransactionDb::new();
        let debug = format!("{db:?}");
        assert!(debug.contains("InMemoryTransactionDb"));
        assert!(debug.contains("transactions"));
    }
}
