use std::sync::Arc;

use tracing::info;

use tkl_store::{
    BoxedIterator, InMemoryTransactionDb, MovementLedger, QueryMovementsParams,
    QueryTransactionsParams, QueryValidationRecordsParams, StoreResult, TransactionLedger,
    UnitOfWork, ValidationRecordStore,
};
use tkl_types::{Metadata, MovementRecord, TransactionRecord, TxStatus, ValidationRecord};

use crate::config::JournalConfig;
use crate::wal::WriteAheadLog;

/// Transaction store that survives restarts.
///
/// Reads are served from an [`InMemoryTransactionDb`] rebuilt from the
/// journal on open. Every commit appends its batch to the journal before it
/// becomes visible; a failed append fails the commit and nothing is
/// published.
pub struct JournaledTransactionDb {
    inner: InMemoryTransactionDb,
    wal: Arc<WriteAheadLog>,
    config: JournalConfig,
}

impl JournaledTransactionDb {
    /// Open the journal at `config.path`, creating it if needed, and replay it.
    pub fn open(config: JournalConfig) -> StoreResult<Self> {
        let wal = Arc::new(WriteAheadLog::open(&config.path, config.sync_mode)?);
        let batches = wal.recover()?;
        let replayed = batches.len();
        let inner = InMemoryTransactionDb::from_batches(batches).with_journal(wal.clone());
        info!(path = %config.path.display(), batches = replayed, "journal opened");

        let db = Self { inner, wal, config };
        if db.config.compact_on_open {
            db.compact()?;
        }
        Ok(db)
    }

    /// Rewrite the journal as one batch holding the current committed state.
    ///
    /// Claims the unit of work for the duration, so it fails with
    /// `UnitAlreadyOpen` while a writer is active.
    pub fn compact(&self) -> StoreResult<()> {
        self.inner.begin_update()?;
        let outcome = self
            .inner
            .snapshot_ops()
            .and_then(|ops| self.wal.rewrite(&ops).map(|()| ops.len()));
        self.inner.discard()?;
        let ops = outcome?;
        info!(path = %self.wal.path().display(), ops, "journal compacted");
        Ok(())
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }
}

impl UnitOfWork for JournaledTransactionDb {
    fn begin_update(&self) -> StoreResult<()> {
        self.inner.begin_update()
    }

    fn commit(&self) -> StoreResult<()> {
        self.inner.commit()
    }

    fn discard(&self) -> StoreResult<()> {
        self.inner.discard()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

impl TransactionLedger for JournaledTransactionDb {
    fn add_transaction(&self, record: &TransactionRecord) -> StoreResult<()> {
        self.inner.add_transaction(record)
    }

    fn set_status_with_message(
        &self,
        tx_id: &str,
        status: TxStatus,
        message: &str,
    ) -> StoreResult<()> {
        self.inner.set_status_with_message(tx_id, status, message)
    }

    fn get_status(&self, tx_id: &str) -> StoreResult<(TxStatus, String)> {
        self.inner.get_status(tx_id)
    }

    fn query_transactions(
        &self,
        params: &QueryTransactionsParams,
    ) -> StoreResult<BoxedIterator<TransactionRecord>> {
        self.inner.query_transactions(params)
    }
}

impl MovementLedger for JournaledTransactionDb {
    fn add_movement(&self, record: &MovementRecord) -> StoreResult<()> {
        self.inner.add_movement(record)
    }

    fn query_movements(&self, params: &QueryMovementsParams) -> StoreResult<Vec<MovementRecord>> {
        self.inner.query_movements(params)
    }
}

impl ValidationRecordStore for JournaledTransactionDb {
    fn add_validation_record(
        &self,
        tx_id: &str,
        token_request: &[u8],
        metadata: &Metadata,
    ) -> StoreResult<()> {
        self.inner.add_validation_record(tx_id, token_request, metadata)
    }

    fn query_validations(
        &self,
        params: &QueryValidationRecordsParams,
    ) -> StoreResult<BoxedIterator<ValidationRecord>> {
        self.inner.query_validations(params)
    }

    fn add_token_request(&self, tx_id: &str, request: &[u8]) -> StoreResult<()> {
        self.inner.add_token_request(tx_id, request)
    }

    fn get_token_request(&self, tx_id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get_token_request(tx_id)
    }
}

impl std::fmt::Debug for JournaledTransactionDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournaledTransactionDb")
            .field("path", &self.config.path)
            .field("sync_mode", &self.config.sync_mode)
            .field("inner", &self.inner)
            .finish()
    }
}
