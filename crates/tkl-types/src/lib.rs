//! Foundation types for the token ledger index (TKL).
//!
//! This crate provides the identifiers, status codes, and record shapes
//! shared by every store in the workspace. Every other TKL crate depends on
//! `tkl-types`.
//!
//! # Key Types
//!
//! - [`TokenId`] — Identifier of one token instance (`tx_id:index`)
//! - [`Token`] / [`UnspentToken`] / [`IssuedToken`] — Token views
//! - [`TxStatus`] — Lifecycle status code (`Unknown=0 .. Deleted=3`)
//! - [`ActionType`] — Issue, transfer, or redeem
//! - [`TransactionRecord`] — One leg of a ledger transaction
//! - [`MovementRecord`] — Signed balance delta for one party
//! - [`ValidationRecord`] — Raw token request plus audit metadata

pub mod error;
pub mod records;
pub mod status;
pub mod token;

pub use error::TypeError;
pub use records::{Metadata, MovementRecord, TransactionRecord, ValidationRecord};
pub use status::{ActionType, TxStatus};
pub use token::{IssuedToken, IssuedTokens, Token, TokenId, UnspentToken, UnspentTokens};
