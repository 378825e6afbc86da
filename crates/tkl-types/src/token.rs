use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of one token instance: output `index` of transaction `tx_id`.
///
/// Immutable and used as the key for every per-token relation (status,
/// ownership, certification, deletion provenance).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId {
    /// Transaction that created the token.
    pub tx_id: String,
    /// Output position within that transaction.
    pub index: u64,
}

impl TokenId {
    pub fn new(tx_id: impl Into<String>, index: u64) -> Self {
        Self {
            tx_id: tx_id.into(),
            index,
        }
    }

    /// Key under which the token is stored in a vault.
    pub fn vault_key(&self) -> String {
        format!("token/{}/{}", self.tx_id, self.index)
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({}:{})", self.tx_id, self.index)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

impl FromStr for TokenId {
    type Err = TypeError;

    /// Parse `tx_id:index`. The split happens at the last `:` so that
    /// transaction ids containing colons survive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx_id, index) = s
            .rsplit_once(':')
            .ok_or_else(|| TypeError::MalformedTokenId(s.to_string()))?;
        if tx_id.is_empty() {
            return Err(TypeError::MalformedTokenId(s.to_string()));
        }
        let index = index
            .parse::<u64>()
            .map_err(|_| TypeError::MalformedTokenId(s.to_string()))?;
        Ok(Self::new(tx_id, index))
    }
}

/// A token as recorded on the ledger.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Opaque owner identity bytes.
    pub owner: Vec<u8>,
    pub token_type: String,
    pub quantity: u128,
}

impl Token {
    pub fn new(owner: impl Into<Vec<u8>>, token_type: impl Into<String>, quantity: u128) -> Self {
        Self {
            owner: owner.into(),
            token_type: token_type.into(),
            quantity,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("owner", &hex::encode(&self.owner))
            .field("token_type", &self.token_type)
            .field("quantity", &self.quantity)
            .finish()
    }
}

/// A token currently owned and not yet consumed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnspentToken {
    pub id: TokenId,
    pub owner: Vec<u8>,
    pub token_type: String,
    pub quantity: u128,
}

impl UnspentToken {
    pub fn from_token(id: TokenId, token: &Token) -> Self {
        Self {
            id,
            owner: token.owner.clone(),
            token_type: token.token_type.clone(),
            quantity: token.quantity,
        }
    }
}

/// Materialized list of unspent tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentTokens {
    pub tokens: Vec<UnspentToken>,
}

impl UnspentTokens {
    pub fn count(&self) -> usize {
        self.tokens.len()
    }

    /// Total quantity of the given type. Saturates instead of overflowing.
    pub fn sum(&self, token_type: &str) -> u128 {
        self.tokens
            .iter()
            .filter(|t| t.token_type == token_type)
            .fold(0u128, |acc, t| acc.saturating_add(t.quantity))
    }

    pub fn by_type(&self, token_type: &str) -> UnspentTokens {
        UnspentTokens {
            tokens: self
                .tokens
                .iter()
                .filter(|t| t.token_type == token_type)
                .cloned()
                .collect(),
        }
    }
}

/// A token issued by a local issuer wallet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuedToken {
    pub id: TokenId,
    pub owner: Vec<u8>,
    pub token_type: String,
    pub quantity: u128,
    /// Opaque issuer identity bytes.
    pub issuer: Vec<u8>,
}

/// Materialized issuance history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTokens {
    pub tokens: Vec<IssuedToken>,
}

impl IssuedTokens {
    pub fn count(&self) -> usize {
        self.tokens.len()
    }

    pub fn sum(&self, token_type: &str) -> u128 {
        self.tokens
            .iter()
            .filter(|t| t.token_type == token_type)
            .fold(0u128, |acc, t| acc.saturating_add(t.quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_display_and_parse() {
        let id = TokenId::new("tx1", 3);
        assert_eq!(id.to_string(), "tx1:3");
        assert_eq!("tx1:3".parse::<TokenId>().unwrap(), id);
    }

    #[test]
    fn token_id_parse_splits_on_last_colon() {
        let id: TokenId = "ns:tx:7".parse().unwrap();
        assert_eq!(id.tx_id, "ns:tx");
        assert_eq!(id.index, 7);
    }

    #[test]
    fn malformed_token_ids() {
        assert!("no-index".parse::<TokenId>().is_err());
        assert!(":1".parse::<TokenId>().is_err());
        assert!("tx:abc".parse::<TokenId>().is_err());
    }

    #[test]
    fn token_ids_order_by_tx_then_index() {
        let a = TokenId::new("a", 9);
        let b = TokenId::new("b", 0);
        let a2 = TokenId::new("a", 10);
        assert!(a < b);
        assert!(a < a2);
    }

    #[test]
    fn vault_key_format() {
        assert_eq!(TokenId::new("tx9", 0).vault_key(), "token/tx9/0");
    }

    #[test]
    fn unspent_sum_by_type() {
        let tokens = UnspentTokens {
            tokens: vec![
                UnspentToken::from_token(TokenId::new("t", 0), &Token::new(b"a".to_vec(), "USD", 10)),
                UnspentToken::from_token(TokenId::new("t", 1), &Token::new(b"a".to_vec(), "EUR", 5)),
                UnspentToken::from_token(TokenId::new("u", 0), &Token::new(b"b".to_vec(), "USD", 7)),
            ],
        };
        assert_eq!(tokens.count(), 3);
        assert_eq!(tokens.sum("USD"), 17);
        assert_eq!(tokens.by_type("EUR").count(), 1);
        assert_eq!(tokens.sum("GBP"), 0);
    }

    #[test]
    fn debug_hex_encodes_owner() {
        let token = Token::new(vec![0xab, 0xcd], "USD", 1);
        let debug = format!("{token:?}");
        assert!(debug.contains("abcd"));
    }
}
