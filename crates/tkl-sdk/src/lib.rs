//! Read facade for the token ledger index.
//!
//! [`QueryFacade`] answers wallet, auditor, and history questions by
//! combining a transaction database with a vault query engine. Results are
//! always materialized, so callers never hold an open iterator.

pub mod facade;

pub use facade::QueryFacade;

// Re-export key types
pub use tkl_store::{
    MovementDirection, QueryMovementsParams, QueryTransactionsParams,
    QueryValidationRecordsParams, SearchDirection, StoreError, StoreResult,
};
pub use tkl_types::{TokenId, TxStatus};
