use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use tkl_store::{
    collect_records, MovementLedger, QueryMovementsParams, QueryTransactionsParams,
    QueryValidationRecordsParams, StoreResult, TransactionDb, TransactionLedger,
    ValidationRecordStore,
};
use tkl_types::{
    IssuedTokens, MovementRecord, Token, TokenId, TransactionRecord, TxStatus, UnspentTokens,
    ValidationRecord,
};
use tkl_vault::{KeyedToken, QueryEngine, TokenInfoAndOutput};

/// Read-only view over the transaction store and the vault.
///
/// Every method returns a fully materialized result; iterators opened along
/// the way are closed before returning, on success and on error.
#[derive(Clone)]
pub struct QueryFacade {
    transactions: Arc<dyn TransactionLedger>,
    movements: Arc<dyn MovementLedger>,
    validations: Arc<dyn ValidationRecordStore>,
    vault: Arc<dyn QueryEngine>,
}

impl QueryFacade {
    /// Facade over one transaction database and one vault.
    pub fn new<D, Q>(db: Arc<D>, vault: Arc<Q>) -> Self
    where
        D: TransactionDb + 'static,
        Q: QueryEngine + 'static,
    {
        Self {
            transactions: db.clone(),
            movements: db.clone(),
            validations: db,
            vault,
        }
    }

    /// Facade over separately backed ledgers.
    pub fn from_parts(
        transactions: Arc<dyn TransactionLedger>,
        movements: Arc<dyn MovementLedger>,
        validations: Arc<dyn ValidationRecordStore>,
        vault: Arc<dyn QueryEngine>,
    ) -> Self {
        Self {
            transactions,
            movements,
            validations,
            vault,
        }
    }

    // ---- Wallet view ----

    pub fn list_unspent_tokens(&self) -> StoreResult<UnspentTokens> {
        self.vault.list_unspent_tokens()
    }

    /// Unspent tokens of `wallet_id`. An empty `token_type` matches any type.
    pub fn unspent_tokens_by(&self, wallet_id: &str, token_type: &str) -> StoreResult<UnspentTokens> {
        let mut it = self.vault.unspent_tokens_iterator_by(wallet_id, token_type)?;
        let tokens = collect_records(it.as_mut())?;
        Ok(UnspentTokens { tokens })
    }

    /// Unspent quantity per token type held by `wallet_id`.
    pub fn holdings(&self, wallet_id: &str) -> StoreResult<BTreeMap<String, u128>> {
        let unspent = self.unspent_tokens_by(wallet_id, "")?;
        let mut totals = BTreeMap::new();
        for token in unspent.tokens {
            let total: &mut u128 = totals.entry(token.token_type).or_default();
            *total = total.saturating_add(token.quantity);
        }
        debug!(wallet_id, types = totals.len(), "holdings computed");
        Ok(totals)
    }

    pub fn is_mine(&self, id: &TokenId) -> StoreResult<bool> {
        self.vault.is_mine(id)
    }

    pub fn is_pending(&self, id: &TokenId) -> StoreResult<bool> {
        self.vault.is_pending(id)
    }

    pub fn token_status(&self, id: &TokenId) -> StoreResult<(TxStatus, String)> {
        self.vault.get_status(id)
    }

    // ---- Auditor and issuer view ----

    pub fn list_issuance_history(&self) -> StoreResult<IssuedTokens> {
        self.vault.list_history_issued_tokens()
    }

    pub fn list_audited_tokens(&self, ids: &[TokenId]) -> StoreResult<Vec<Token>> {
        self.vault.list_audit_tokens(ids)
    }

    // ---- Bulk resolution ----

    pub fn token_infos(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.vault.get_token_infos(ids)
    }

    pub fn token_outputs(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.vault.get_token_outputs(ids)
    }

    pub fn token_info_and_outputs(
        &self,
        ids: &[TokenId],
    ) -> StoreResult<Vec<Option<TokenInfoAndOutput>>> {
        self.vault.get_token_info_and_outputs(ids)
    }

    pub fn tokens(&self, ids: &[TokenId]) -> StoreResult<Vec<Option<KeyedToken>>> {
        self.vault.get_tokens(ids)
    }

    pub fn who_deleted_tokens(&self, ids: &[TokenId]) -> StoreResult<(Vec<String>, Vec<bool>)> {
        self.vault.who_deleted_tokens(ids)
    }

    // ---- Transaction history ----

    pub fn transactions(&self, params: &QueryTransactionsParams) -> StoreResult<Vec<TransactionRecord>> {
        let mut it = self.transactions.query_transactions(params)?;
        collect_records(it.as_mut())
    }

    pub fn pending_transactions(&self) -> StoreResult<Vec<TransactionRecord>> {
        self.transactions(&QueryTransactionsParams {
            statuses: vec![TxStatus::Pending],
            ..Default::default()
        })
    }

    pub fn transaction_status(&self, tx_id: &str) -> StoreResult<(TxStatus, String)> {
        self.transactions.get_status(tx_id)
    }

    pub fn movements(&self, params: &QueryMovementsParams) -> StoreResult<Vec<MovementRecord>> {
        self.movements.query_movements(params)
    }

    /// Signed balance of `enrollment_id` in `token_type` over the given
    /// statuses (all statuses when empty).
    pub fn balance(
        &self,
        enrollment_id: &str,
        token_type: &str,
        statuses: &[TxStatus],
    ) -> StoreResult<i128> {
        self.movements.balance(enrollment_id, token_type, statuses)
    }

    // ---- Validation records ----

    pub fn validations(
        &self,
        params: &QueryValidationRecordsParams,
    ) -> StoreResult<Vec<ValidationRecord>> {
        let mut it = self.validations.query_validations(params)?;
        collect_records(it.as_mut())
    }

    pub fn token_request(&self, tx_id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.validations.get_token_request(tx_id)
    }
}

impl std::fmt::Debug for QueryFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryFacade").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;
    use tkl_journal::{JournalConfig, JournaledTransactionDb};
    use tkl_store::{
        BoxedIterator, InMemoryTransactionDb, MovementDirection, RecordIterator, StoreError,
        UnitOfWork,
    };
    use tkl_types::{ActionType, Metadata};
    use tkl_vault::{InMemoryVault, TokenRecord, VaultWriter};

    use super::*;

    fn id(tx: &str, index: u64) -> TokenId {
        TokenId::new(tx, index)
    }

    fn token(wallet: &str, token_type: &str, quantity: u128) -> Token {
        Token::new(wallet.as_bytes().to_vec(), token_type, quantity)
    }

    fn leg(
        tx_id: &str,
        action_type: ActionType,
        sender: &str,
        recipient: &str,
        amount: u128,
    ) -> TransactionRecord {
        TransactionRecord {
            tx_id: tx_id.into(),
            action_type,
            sender_eid: sender.into(),
            recipient_eid: recipient.into(),
            token_type: "magic".into(),
            amount,
            timestamp: Utc::now(),
            status: TxStatus::Pending,
        }
    }

    fn movement(tx_id: &str, eid: &str, amount: i128) -> MovementRecord {
        MovementRecord {
            tx_id: tx_id.into(),
            enrollment_id: eid.into(),
            token_type: "magic".into(),
            amount,
            status: TxStatus::Pending,
        }
    }

    /// Issue 100 magic to alice (tx1), then alice pays bob 30 (tx2).
    fn record_activity<D: TransactionDb>(db: &D, vault: &InMemoryVault) {
        db.begin_update().unwrap();
        db.add_transaction(&leg("tx1", ActionType::Issue, "", "alice", 100))
            .unwrap();
        db.add_movement(&movement("tx1", "alice", 100)).unwrap();
        db.add_token_request("tx1", b"issue-request").unwrap();
        db.set_status("tx1", TxStatus::Confirmed).unwrap();
        db.commit().unwrap();

        vault.begin_update().unwrap();
        vault
            .append_token(
                TokenRecord::owned(id("tx1", 0), token("alice", "magic", 100), "alice")
                    .with_issuer(b"issuer".to_vec())
                    .with_output(b"out-1-0".to_vec()),
            )
            .unwrap();
        vault.set_status("tx1", TxStatus::Confirmed).unwrap();
        vault.commit().unwrap();

        db.begin_update().unwrap();
        db.add_transaction(&leg("tx2", ActionType::Transfer, "alice", "bob", 30))
            .unwrap();
        db.add_transaction(&leg("tx2", ActionType::Transfer, "alice", "alice", 70))
            .unwrap();
        db.add_movement(&movement("tx2", "alice", -30)).unwrap();
        db.add_movement(&movement("tx2", "bob", 30)).unwrap();
        db.add_validation_record("tx2", b"transfer-request", &Metadata::new())
            .unwrap();
        db.commit().unwrap();

        vault.begin_update().unwrap();
        vault.delete_tokens("tx2", &[id("tx1", 0)]).unwrap();
        vault
            .append_token(TokenRecord::owned(id("tx2", 0), token("bob", "magic", 30), "bob"))
            .unwrap();
        vault
            .append_token(TokenRecord::owned(id("tx2", 1), token("alice", "magic", 70), "alice"))
            .unwrap();
        vault.commit().unwrap();
    }

    fn finalize_tx2<D: TransactionDb>(db: &D, vault: &InMemoryVault) {
        db.begin_update().unwrap();
        db.set_status("tx2", TxStatus::Confirmed).unwrap();
        db.commit().unwrap();
        vault.begin_update().unwrap();
        vault.set_status("tx2", TxStatus::Confirmed).unwrap();
        vault.commit().unwrap();
    }

    #[test]
    fn wallet_view_follows_finality() {
        let db = Arc::new(InMemoryTransactionDb::new());
        let vault = Arc::new(InMemoryVault::new());
        let facade = QueryFacade::new(db.clone(), vault.clone());
        record_activity(&*db, &vault);

        // tx1's output is spent, tx2's outputs are still pending.
        assert_eq!(facade.list_unspent_tokens().unwrap().count(), 0);
        assert!(facade.is_pending(&id("tx2", 0)).unwrap());
        assert_eq!(facade.pending_transactions().unwrap().len(), 2);

        finalize_tx2(&*db, &vault);
        assert_eq!(facade.list_unspent_tokens().unwrap().count(), 2);
        assert_eq!(facade.holdings("alice").unwrap().get("magic"), Some(&70));
        assert_eq!(facade.holdings("bob").unwrap().get("magic"), Some(&30));
        assert!(facade.holdings("carol").unwrap().is_empty());
        assert_eq!(facade.unspent_tokens_by("bob", "magic").unwrap().count(), 1);
        assert_eq!(facade.unspent_tokens_by("bob", "abc").unwrap().count(), 0);

        assert!(facade.is_mine(&id("tx2", 1)).unwrap());
        assert!(!facade.is_mine(&id("tx1", 0)).unwrap());
        assert_eq!(facade.token_status(&id("tx2", 0)).unwrap().0, TxStatus::Confirmed);
        assert!(facade.pending_transactions().unwrap().is_empty());
    }

    #[test]
    fn auditor_view() {
        let db = Arc::new(InMemoryTransactionDb::new());
        let vault = Arc::new(InMemoryVault::new());
        let facade = QueryFacade::new(db.clone(), vault.clone());
        record_activity(&*db, &vault);

        let issued = facade.list_issuance_history().unwrap();
        assert_eq!(issued.count(), 1);
        assert_eq!(issued.sum("magic"), 100);

        let audited = facade
            .list_audited_tokens(&[id("tx2", 0), id("missing", 0)])
            .unwrap();
        assert_eq!(audited, vec![token("bob", "magic", 30)]);

        let (by, deleted) = facade
            .who_deleted_tokens(&[id("tx1", 0), id("tx2", 0)])
            .unwrap();
        assert_eq!(by, vec!["tx2".to_string(), String::new()]);
        assert_eq!(deleted, vec![true, false]);

        let outputs = facade.token_outputs(&[id("tx1", 0), id("missing", 0)]).unwrap();
        assert_eq!(outputs, vec![Some(b"out-1-0".to_vec()), None]);
        let both = facade.token_info_and_outputs(&[id("tx1", 0)]).unwrap();
        assert_eq!(both[0].as_ref().unwrap().key, "token/tx1/0");
        assert_eq!(facade.token_infos(&[id("tx2", 1)]).unwrap(), vec![Some(vec![])]);
        assert_eq!(
            facade.tokens(&[id("tx2", 1)]).unwrap()[0].as_ref().unwrap().token,
            token("alice", "magic", 70)
        );

        let records = facade
            .validations(&QueryValidationRecordsParams::default())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token_request, b"transfer-request");
        assert_eq!(facade.token_request("tx1").unwrap(), Some(b"issue-request".to_vec()));
        assert_eq!(facade.token_request("tx9").unwrap(), None);
    }

    #[test]
    fn history_and_balances() {
        let db = Arc::new(InMemoryTransactionDb::new());
        let vault = Arc::new(InMemoryVault::new());
        let facade = QueryFacade::new(db.clone(), vault.clone());
        record_activity(&*db, &vault);

        let alice = facade
            .transactions(&QueryTransactionsParams {
                sender_wallet: "alice".into(),
                recipient_wallet: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(alice.len(), 3);
        assert_eq!(
            facade.transaction_status("tx1").unwrap(),
            (TxStatus::Confirmed, String::new())
        );

        assert_eq!(facade.balance("alice", "magic", &[]).unwrap(), 70);
        assert_eq!(facade.balance("alice", "magic", &[TxStatus::Confirmed]).unwrap(), 100);

        let sent = facade
            .movements(&QueryMovementsParams {
                movement_direction: MovementDirection::Sent,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sent, vec![movement("tx2", "alice", -30)]);
    }

    #[test]
    fn works_over_journaled_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = JournalConfig::new(dir.path().join("ttx.journal"));
        let vault = Arc::new(InMemoryVault::new());
        {
            let db = Arc::new(JournaledTransactionDb::open(config.clone()).unwrap());
            record_activity(&*db, &vault);
        }

        let db = Arc::new(JournaledTransactionDb::open(config).unwrap());
        let facade = QueryFacade::new(db, vault);
        assert_eq!(
            facade
                .transactions(&QueryTransactionsParams::default())
                .unwrap()
                .len(),
            3
        );
        assert_eq!(facade.balance("bob", "magic", &[]).unwrap(), 30);
    }

    // ---- Iterator hygiene ----

    struct FailingIter {
        served: usize,
        closed: Arc<AtomicBool>,
    }

    impl RecordIterator<TransactionRecord> for FailingIter {
        fn next(&mut self) -> StoreResult<Option<TransactionRecord>> {
            self.served += 1;
            if self.served > 1 {
                return Err(StoreError::Io(std::io::Error::other("backend went away")));
            }
            Ok(Some(leg("tx1", ActionType::Issue, "", "alice", 1)))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FailingLedger {
        closed: Arc<AtomicBool>,
    }

    impl UnitOfWork for FailingLedger {
        fn begin_update(&self) -> StoreResult<()> {
            Ok(())
        }
        fn commit(&self) -> StoreResult<()> {
            Ok(())
        }
        fn discard(&self) -> StoreResult<()> {
            Ok(())
        }
        fn is_open(&self) -> bool {
            false
        }
    }

    impl TransactionLedger for FailingLedger {
        fn add_transaction(&self, _record: &TransactionRecord) -> StoreResult<()> {
            Ok(())
        }
        fn set_status_with_message(&self, _: &str, _: TxStatus, _: &str) -> StoreResult<()> {
            Ok(())
        }
        fn get_status(&self, _tx_id: &str) -> StoreResult<(TxStatus, String)> {
            Ok((TxStatus::Unknown, String::new()))
        }
        fn query_transactions(
            &self,
            _params: &QueryTransactionsParams,
        ) -> StoreResult<BoxedIterator<TransactionRecord>> {
            Ok(Box::new(FailingIter {
                served: 0,
                closed: self.closed.clone(),
            }))
        }
    }

    #[test]
    fn iterator_is_closed_on_error() {
        let closed = Arc::new(AtomicBool::new(false));
        let db = Arc::new(InMemoryTransactionDb::new());
        let facade = QueryFacade::from_parts(
            Arc::new(FailingLedger {
                closed: closed.clone(),
            }),
            db.clone(),
            db,
            Arc::new(InMemoryVault::new()),
        );

        let err = facade
            .transactions(&QueryTransactionsParams::default())
            .unwrap_err();
        assert!(!err.is_invalid_usage());
        assert!(closed.load(Ordering::SeqCst));
    }
}
