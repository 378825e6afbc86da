//! In-memory vault for tests and embedding.
//!
//! [`InMemoryVault`] keeps its committed state in an `Arc` snapshot behind a
//! `RwLock`, like the transaction store: queries clone the snapshot and
//! commits swap in a new one. Certifications live in a separate map guarded
//! by its own lock, since they are written outside the unit of work.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use tkl_store::{BoxedIterator, SnapshotIter, StoreError, StoreResult, UnitOfWork};
use tkl_types::{
    IssuedToken, IssuedTokens, Token, TokenId, TxStatus, UnspentToken, UnspentTokens,
};

use crate::traits::{CertificationStorage, QueryEngine, Vault, VaultWriter};
use crate::types::{KeyedToken, TokenInfoAndOutput, TokenRecord};

#[derive(Clone, Debug)]
struct StoredToken {
    record: TokenRecord,
    deleted_by: Option<String>,
}

impl StoredToken {
    fn is_unspent(&self, statuses: &HashMap<String, (TxStatus, String)>) -> bool {
        self.record.wallet_id.is_some()
            && self.deleted_by.is_none()
            && statuses
                .get(&self.record.id.tx_id)
                .is_some_and(|(status, _)| *status == TxStatus::Confirmed)
    }

    fn unspent(&self) -> UnspentToken {
        UnspentToken::from_token(self.record.id.clone(), &self.record.token)
    }
}

enum VaultOp {
    AppendToken(TokenRecord),
    DeleteTokens {
        deleted_by: String,
        ids: Vec<TokenId>,
    },
    SetStatus {
        tx_id: String,
        status: TxStatus,
        message: String,
    },
    SetPublicParams(Vec<u8>),
}

#[derive(Clone, Default)]
struct VaultState {
    tokens: Arc<Vec<StoredToken>>,
    index: Arc<HashMap<TokenId, usize>>,
    /// Status and message per transaction id.
    statuses: Arc<HashMap<String, (TxStatus, String)>>,
    public_params: Option<Arc<Vec<u8>>>,
}

impl VaultState {
    fn token(&self, id: &TokenId) -> Option<&StoredToken> {
        self.index.get(id).map(|&i| &self.tokens[i])
    }

    fn status(&self, tx_id: &str) -> (TxStatus, String) {
        self.statuses.get(tx_id).cloned().unwrap_or_default()
    }

    fn apply(&mut self, op: VaultOp) -> StoreResult<()> {
        match op {
            VaultOp::AppendToken(record) => {
                let tx_id = record.id.tx_id.clone();
                match self.index.get(&record.id).copied() {
                    Some(i) => {
                        let slot = &mut Arc::make_mut(&mut self.tokens)[i];
                        slot.record = record;
                    }
                    None => {
                        let i = self.tokens.len();
                        Arc::make_mut(&mut self.index).insert(record.id.clone(), i);
                        Arc::make_mut(&mut self.tokens).push(StoredToken {
                            record,
                            deleted_by: None,
                        });
                    }
                }
                if self.status(&tx_id).0 == TxStatus::Unknown {
                    Arc::make_mut(&mut self.statuses)
                        .insert(tx_id, (TxStatus::Pending, String::new()));
                }
            }
            VaultOp::DeleteTokens { deleted_by, ids } => {
                let live: Vec<usize> = ids
                    .iter()
                    .filter_map(|id| self.index.get(id).copied())
                    .filter(|&i| self.tokens[i].deleted_by.is_none())
                    .collect();
                if !live.is_empty() {
                    let tokens = Arc::make_mut(&mut self.tokens);
                    for i in live {
                        tokens[i].deleted_by = Some(deleted_by.clone());
                    }
                }
            }
            VaultOp::SetStatus {
                tx_id,
                status,
                message,
            } => {
                let (current, current_message) = self.status(&tx_id);
                if !current.can_transition_to(status) {
                    return Err(StoreError::InvalidStatusTransition {
                        tx_id,
                        from: current,
                        to: status,
                    });
                }
                let message_changed = !message.is_empty() && message != current_message;
                if current != status || message_changed {
                    let message = if message.is_empty() {
                        current_message
                    } else {
                        message
                    };
                    Arc::make_mut(&mut self.statuses).insert(tx_id, (status, message));
                }
            }
            VaultOp::SetPublicParams(params) => self.public_params = Some(Arc::new(params)),
        }
        Ok(())
    }
}

/// An in-memory implementation of [`Vault`].
///
/// All data lives in memory and is lost when the vault is dropped.
pub struct InMemoryVault {
    committed: RwLock<Arc<VaultState>>,
    pending: Mutex<Option<Vec<VaultOp>>>,
    certifications: RwLock<HashMap<TokenId, Vec<u8>>>,
}

impl InMemoryVault {
    /// Create a new empty vault.
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Arc::new(VaultState::default())),
            pending: Mutex::new(None),
            certifications: RwLock::new(HashMap::new()),
        }
    }

    fn state(&self) -> StoreResult<Arc<VaultState>> {
        let guard = self.committed.read()?;
        Ok(Arc::clone(&*guard))
    }

    fn buffer(&self, op: VaultOp) -> StoreResult<()> {
        let mut pending = self.pending.lock()?;
        pending.as_mut().ok_or(StoreError::NoOpenUnit)?.push(op);
        Ok(())
    }

    fn unspent_where<F>(&self, keep: F) -> StoreResult<BoxedIterator<UnspentToken>>
    where
        F: Fn(&TokenRecord) -> bool + Send + 'static,
    {
        let state = self.state()?;
        let statuses = Arc::clone(&state.statuses);
        Ok(Box::new(SnapshotIter::new(
            Arc::clone(&state.tokens),
            move |t: &StoredToken| (t.is_unspent(&statuses) && keep(&t.record)).then(|| t.unspent()),
        )))
    }

    fn resolve<T>(
        &self,
        ids: &[TokenId],
        project: impl Fn(&StoredToken) -> T,
    ) -> StoreResult<Vec<Option<T>>> {
        let state = self.state()?;
        Ok(ids.iter().map(|id| state.token(id).map(&project)).collect())
    }
}

impl Default for InMemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitOfWork for InMemoryVault {
    fn begin_update(&self) -> StoreResult<()> {
        let mut pending = self.pending.lock()?;
        if pending.is_some() {
            return Err(StoreError::UnitAlreadyOpen);
        }
        *pending = Some(Vec::new());
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let mut pending = self.pending.lock()?;
        let batch = pending.take().ok_or(StoreError::NoOpenUnit)?;
        if batch.is_empty() {
            return Ok(());
        }

        let ops = batch.len();
        let current = self.state()?;
        let mut next = VaultState::clone(&current);
        for op in batch {
            if let Err(e) = next.apply(op) {
                warn!(error = %e, "vault batch rejected");
                return Err(e);
            }
        }
        *self.committed.write()? = Arc::new(next);

        debug!(ops, "vault unit of work committed");
        Ok(())
    }

    fn discard(&self) -> StoreResult<()> {
        let mut pending = self.pending.lock()?;
        let batch = pending.take().ok_or(StoreError::NoOpenUnit)?;
        debug!(ops = batch.len(), "vault unit of work discarded");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.pending.lock().map(|p| p.is_some()).unwrap_or(false)
    }
}

impl VaultWriter for InMemoryVault {
    fn append_token(&self, record: TokenRecord) -> StoreResult<()> {
        self.buffer(VaultOp::AppendToken(record))
    }

    fn delete_tokens(&self, deleted_by: &str, ids: &[TokenId]) -> StoreResult<()> {
        self.buffer(VaultOp::DeleteTokens {
            deleted_by: deleted_by.to_string(),
            ids: ids.to_vec(),
        })
    }

    fn set_status_with_message(
        &self,
        tx_id: &str,
        status: TxStatus,
        message: &str,
    ) -> StoreResult<()> {
        self.buffer(VaultOp::SetStatus {
            tx_id: tx_id.to_string(),
            status,
            message: message.to_string(),
        })
    }

    fn set_public_params(&self, params: &[u8]) -> StoreResult<()> {
        self.buffer(VaultOp::SetPublicParams(params.to_vec()))
    }
}

impl QueryEngine for InMemoryVault {
    fn is_pending(&self, id: &TokenId) -> StoreResult<bool> {
        Ok(self.get_status(id)?.0 == TxStatus::Pending)
    }

    fn get_status(&self, id: &TokenId) -> StoreResult<(TxStatus, String)> {
        Ok(self.state()?.status(&id.tx_id))
    }

    fn is_mine(&self, id: &TokenId) -> StoreResult<bool> {
        let state = self.state()?;
        Ok(state
            .token(id)
            .is_some_and(|t| t.record.wallet_id.is_some() && t.deleted_by.is_none()))
    }

    fn unspent_tokens_iterator(&self) -> StoreResult<BoxedIterator<UnspentToken>> {
        self.unspent_where(|_| true)
    }

    fn unspent_tokens_iterator_by(
        &self,
        wallet_id: &str,
        token_type: &str,
    ) -> StoreResult<BoxedIterator<UnspentToken>> {
        let wallet_id = wallet_id.to_string();
        let token_type = token_type.to_string();
        self.unspent_where(move |r| {
            r.wallet_id.as_deref() == Some(wallet_id.as_str())
                && (token_type.is_empty() || r.token.token_type == token_type)
        })
    }

    fn list_unspent_tokens(&self) -> StoreResult<UnspentTokens> {
        let state = self.state()?;
        let tokens = state
            .tokens
            .iter()
            .filter(|t| t.is_unspent(&state.statuses))
            .map(StoredToken::unspent)
            .collect();
        Ok(UnspentTokens { tokens })
    }

    fn list_audit_tokens(&self, ids: &[TokenId]) -> StoreResult<Vec<Token>> {
        let state = self.state()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.token(id))
            .map(|t| t.record.token.clone())
            .collect())
    }

    fn list_history_issued_tokens(&self) -> StoreResult<IssuedTokens> {
        let state = self.state()?;
        let tokens = state
            .tokens
            .iter()
            .filter_map(|t| {
                let issuer = t.record.issuer.as_ref()?;
                Some(IssuedToken {
                    id: t.record.id.clone(),
                    owner: t.record.token.owner.clone(),
                    token_type: t.record.token.token_type.clone(),
                    quantity: t.record.token.quantity,
                    issuer: issuer.clone(),
                })
            })
            .collect();
        Ok(IssuedTokens { tokens })
    }

    fn public_params(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.state()?.public_params.as_ref().map(|p| p.to_vec()))
    }

    fn get_token_infos(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.resolve(ids, |t| t.record.info.clone())
    }

    fn get_token_outputs(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.resolve(ids, |t| t.record.output.clone())
    }

    fn get_token_info_and_outputs(
        &self,
        ids: &[TokenId],
    ) -> StoreResult<Vec<Option<TokenInfoAndOutput>>> {
        self.resolve(ids, |t| TokenInfoAndOutput {
            key: t.record.id.vault_key(),
            info: t.record.info.clone(),
            output: t.record.output.clone(),
        })
    }

    fn get_tokens(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<KeyedToken>>> {
        self.resolve(ids, |t| KeyedToken {
            key: t.record.id.vault_key(),
            token: t.record.token.clone(),
        })
    }

    fn who_deleted_tokens(&self, ids: &[TokenId]) -> StoreResult<(Vec<String>, Vec<bool>)> {
        let state = self.state()?;
        Ok(ids
            .iter()
            .map(|id| match state.token(id).and_then(|t| t.deleted_by.as_ref()) {
                Some(by) => (by.clone(), true),
                None => (String::new(), false),
            })
            .unzip())
    }
}

impl CertificationStorage for InMemoryVault {
    fn exists(&self, id: &TokenId) -> StoreResult<bool> {
        Ok(self.certifications.read()?.contains_key(id))
    }

    fn store(&self, certifications: &[(TokenId, Vec<u8>)]) -> StoreResult<()> {
        let mut stored = self.certifications.write()?;
        let mut batch = HashSet::with_capacity(certifications.len());
        for (id, _) in certifications {
            if stored.contains_key(id) || !batch.insert(id) {
                return Err(StoreError::CertificationExists(id.clone()));
            }
        }
        for (id, proof) in certifications {
            stored.insert(id.clone(), proof.clone());
        }
        debug!(count = certifications.len(), "certifications stored");
        Ok(())
    }

    fn get_certifications(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let stored = self.certifications.read()?;
        Ok(ids.iter().map(|id| stored.get(id).cloned()).collect())
    }
}

impl Vault for InMemoryVault {
    fn query_engine(&self) -> &dyn QueryEngine {
        self
    }

    fn certification_storage(&self) -> &dyn CertificationStorage {
        self
    }
}

impl std::fmt::Debug for InMemoryVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("InMemoryVault");
        if let Ok(state) = self.state() {
            out.field("tokens", &state.tokens.len())
                .field("transactions", &state.statuses.len());
        }
        if let Ok(certs) = self.certifications.read() {
            out.field("certifications", &certs.len());
        }
        out.field("open", &self.is_open()).finish()
    }
}
