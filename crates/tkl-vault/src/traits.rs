//! Read, write, and certification interfaces of the vault.

use tkl_store::{BoxedIterator, StoreResult, UnitOfWork};
use tkl_types::{IssuedTokens, Token, TokenId, TxStatus, UnspentToken, UnspentTokens};

use crate::types::{KeyedToken, TokenInfoAndOutput, TokenRecord};

/// Read surface over the tokens known to the vault.
///
/// Lookups of unknown ids are never errors. Per-id resolution returns a
/// vector parallel to the input with `None` for unknown ids.
pub trait QueryEngine: Send + Sync {
    /// Whether the transaction that created `id` is still pending.
    fn is_pending(&self, id: &TokenId) -> StoreResult<bool>;

    /// Status and status message of the transaction that created `id`.
    ///
    /// Returns `(Unknown, "")` for an unknown id.
    fn get_status(&self, id: &TokenId) -> StoreResult<(TxStatus, String)>;

    /// Whether `id` is owned by a local wallet and not yet spent.
    fn is_mine(&self, id: &TokenId) -> StoreResult<bool>;

    fn unspent_tokens_iterator(&self) -> StoreResult<BoxedIterator<UnspentToken>>;

    /// Unspent tokens of one wallet. An empty `token_type` matches any type.
    fn unspent_tokens_iterator_by(
        &self,
        wallet_id: &str,
        token_type: &str,
    ) -> StoreResult<BoxedIterator<UnspentToken>>;

    fn list_unspent_tokens(&self) -> StoreResult<UnspentTokens>;

    /// Stored tokens for the known ids, in input order. Unknown ids are
    /// skipped.
    fn list_audit_tokens(&self, ids: &[TokenId]) -> StoreResult<Vec<Token>>;

    /// Every token created by an issuance, spent or not.
    fn list_history_issued_tokens(&self) -> StoreResult<IssuedTokens>;

    fn public_params(&self) -> StoreResult<Option<Vec<u8>>>;

    fn get_token_infos(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    fn get_token_outputs(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    fn get_token_info_and_outputs(
        &self,
        ids: &[TokenId],
    ) -> StoreResult<Vec<Option<TokenInfoAndOutput>>>;

    fn get_tokens(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<KeyedToken>>>;

    /// Who spent each token, parallel to `ids`.
    ///
    /// The deleter is `""` and the flag `false` for tokens that are not
    /// deleted, including unknown ids.
    fn who_deleted_tokens(&self, ids: &[TokenId]) -> StoreResult<(Vec<String>, Vec<bool>)>;
}

/// Write-once storage of certification proofs.
///
/// `store` is a self-contained atomic write and does not take part in the
/// vault's unit of work.
pub trait CertificationStorage: Send + Sync {
    fn exists(&self, id: &TokenId) -> StoreResult<bool>;

    /// Store a batch of proofs, all or nothing.
    ///
    /// Fails with `CertificationExists` if any id already has a proof (or
    /// appears twice in the batch); nothing is stored in that case.
    fn store(&self, certifications: &[(TokenId, Vec<u8>)]) -> StoreResult<()>;

    fn get_certifications(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<Vec<u8>>>>;
}

/// Buffered writes to the vault, published on commit.
///
/// Status changes follow the lifecycle `Unknown -> Pending -> {Confirmed,
/// Deleted}`. A batch containing a disallowed change fails to commit with
/// `InvalidStatusTransition` and is dropped whole.
pub trait VaultWriter: UnitOfWork {
    /// Register a token. Its transaction moves to `Pending` if it was
    /// `Unknown`. Re-appending an id replaces the stored record but keeps
    /// its deletion state.
    fn append_token(&self, record: TokenRecord) -> StoreResult<()>;

    /// Mark tokens as spent by `deleted_by`. Unknown ids are ignored and an
    /// already deleted token keeps its first deleter.
    fn delete_tokens(&self, deleted_by: &str, ids: &[TokenId]) -> StoreResult<()>;

    fn set_status(&self, tx_id: &str, status: TxStatus) -> StoreResult<()> {
        self.set_status_with_message(tx_id, status, "")
    }

    fn set_status_with_message(&self, tx_id: &str, status: TxStatus, message: &str)
        -> StoreResult<()>;

    fn set_public_params(&self, params: &[u8]) -> StoreResult<()>;
}

/// A complete vault: writer plus its read and certification views.
pub trait Vault: VaultWriter {
    fn query_engine(&self) -> &dyn QueryEngine;

    fn certification_storage(&self) -> &dyn CertificationStorage;
}
