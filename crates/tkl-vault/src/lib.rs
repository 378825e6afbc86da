//! Unspent-token vault for the token ledger index.
//!
//! The vault answers what a wallet owns: which tokens exist, which of them
//! are still spendable, who spent the others, and which proofs certify
//! them. It is written through its own [`UnitOfWork`](tkl_store::UnitOfWork)
//! and shares [`StoreError`](tkl_store::StoreError) with the transaction
//! store.
//!
//! # Token lifecycle
//!
//! A token's status is the status of the transaction that created it:
//!
//! ```text
//! Unknown --append_token--> Pending --set_status--> Confirmed | Deleted
//! ```
//!
//! `Confirmed` and `Deleted` are terminal. A token is *unspent* when a
//! local wallet owns it, its transaction is `Confirmed`, and no later
//! transaction has deleted it.
//!
//! # Modules
//!
//! - [`types`] -- [`TokenRecord`] and the bulk-resolution rows
//! - [`traits`] -- [`QueryEngine`], [`CertificationStorage`], [`VaultWriter`], [`Vault`]
//! - [`memory`] -- [`InMemoryVault`]

pub mod memory;
pub mod traits;
pub mod types;

pub use memory::InMemoryVault;
pub use traits::{CertificationStorage, QueryEngine, Vault, VaultWriter};
pub use types::{KeyedToken, TokenInfoAndOutput, TokenRecord};
