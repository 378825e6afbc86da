//! Rows held by the vault.

use serde::{Deserialize, Serialize};
use tkl_types::{Token, TokenId};

/// A token as registered in the vault.
///
/// `info` and `output` are opaque to the vault: `output` is the token as
/// serialized on the ledger, `info` the driver's private metadata for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: TokenId,
    pub token: Token,
    /// Local wallet owning the token, if any. Tokens without a wallet are
    /// tracked for auditing only and are never unspent.
    pub wallet_id: Option<String>,
    /// Issuer identity, set when the token was created by an issuance.
    pub issuer: Option<Vec<u8>>,
    pub info: Vec<u8>,
    pub output: Vec<u8>,
}

impl TokenRecord {
    /// A record owned by `wallet_id`, with no issuer and empty blobs.
    pub fn owned(id: TokenId, token: Token, wallet_id: impl Into<String>) -> Self {
        Self {
            id,
            token,
            wallet_id: Some(wallet_id.into()),
            issuer: None,
            info: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<Vec<u8>>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_info(mut self, info: impl Into<Vec<u8>>) -> Self {
        self.info = info.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = output.into();
        self
    }
}

/// A token together with its vault key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedToken {
    pub key: String,
    pub token: Token,
}

/// Both opaque blobs of a token, with its vault key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfoAndOutput {
    pub key: String,
    pub info: Vec<u8>,
    pub output: Vec<u8>,
}
