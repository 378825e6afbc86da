//! Transactional store contract for the token ledger index.
//!
//! The store records what happened to a wallet's tokens: one
//! [`TransactionRecord`](tkl_types::TransactionRecord) per transaction leg,
//! one [`MovementRecord`](tkl_types::MovementRecord) per party balance delta,
//! and one [`ValidationRecord`](tkl_types::ValidationRecord) per raw token
//! request seen by an auditor. It serves filtered queries over them.
//!
//! # Unit of Work
//!
//! Every write goes through a [`UnitOfWork`]:
//!
//! ```text
//! Idle --begin_update--> Open --commit--> Idle   (batch published atomically)
//!                             --discard-> Idle   (batch dropped)
//! ```
//!
//! Readers only ever observe committed state, and a commit becomes visible
//! all at once.
//!
//! # Backends
//!
//! - [`InMemoryTransactionDb`] -- copy-on-write snapshot store, optionally
//!   fronted by a [`BatchJournal`] for durability
//!
//! Backends are checked against the shared suite in `conformance` (enable
//! the `conformance` feature) via [`transaction_db_conformance!`].

pub mod batch;
#[cfg(any(test, feature = "conformance"))]
pub mod conformance;
pub mod error;
pub mod iter;
pub mod memory;
pub mod params;
pub mod traits;

pub use batch::{BatchJournal, TxOp};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use iter::{collect_records, BoxedIterator, RecordIterator, SnapshotIter};
pub use memory::InMemoryTransactionDb;
pub use params::{
    MovementDirection, QueryMovementsParams, QueryTransactionsParams,
    QueryValidationRecordsParams, SearchDirection, ValidationFilter,
};
pub use traits::{MovementLedger, TransactionDb, TransactionLedger, UnitOfWork, ValidationRecordStore};
