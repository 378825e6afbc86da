//! Durable transaction store for the token ledger index.
//!
//! [`JournaledTransactionDb`] pairs the in-memory transaction store with a
//! crash-recoverable [`WriteAheadLog`]: each committed unit of work is one
//! CRC-framed journal entry, and opening the store replays the journal.
//! [`JournaledTransactionDb::compact`] rewrites the journal as a single
//! snapshot batch.
//!
//! ```no_run
//! use tkl_journal::{JournalConfig, JournaledTransactionDb};
//! use tkl_store::UnitOfWork;
//!
//! let config = JournalConfig::from_toml_str(r#"path = "/var/lib/tkl/ttx.journal""#)?;
//! let db = JournaledTransactionDb::open(config)?;
//! db.begin_update()?;
//! db.commit()?;
//! # Ok::<(), tkl_store::StoreError>(())
//! ```

pub mod config;
pub mod db;
pub mod wal;

pub use config::{JournalConfig, SyncMode};
pub use db::JournaledTransactionDb;
pub use wal::WriteAheadLog;
