//! Query parameters for the transaction, movement, and validation ledgers.
//!
//! Every criterion narrows the result only when it is set; an empty list,
//! an empty string, or `None` means "no constraint". The `matches` methods
//! hold the reference semantics that every backend must reproduce.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tkl_types::{ActionType, MovementRecord, TransactionRecord, TxStatus, ValidationRecord};

/// Parameters for querying transaction records.
#[derive(Clone, Debug, Default)]
pub struct QueryTransactionsParams {
    /// Only records with one of these statuses.
    pub statuses: Vec<TxStatus>,
    /// Only records with one of these action types.
    pub action_types: Vec<ActionType>,
    /// Inclusive lower bound on the record timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the record timestamp.
    pub to: Option<DateTime<Utc>>,
    /// Sender enrollment id.
    pub sender_wallet: String,
    /// Recipient enrollment id.
    pub recipient_wallet: String,
}

impl QueryTransactionsParams {
    /// Returns `true` if the record satisfies every set criterion.
    ///
    /// When both wallets are set the party filter is a union: the record
    /// matches if the sender is `sender_wallet` OR the recipient is
    /// `recipient_wallet`.
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if !self.action_types.is_empty() && !self.action_types.contains(&record.action_type) {
            return false;
        }
        if !within(record.timestamp, self.from, self.to) {
            return false;
        }
        let by_sender = !self.sender_wallet.is_empty();
        let by_recipient = !self.recipient_wallet.is_empty();
        match (by_sender, by_recipient) {
            (true, true) => {
                record.sender_eid == self.sender_wallet
                    || record.recipient_eid == self.recipient_wallet
            }
            (true, false) => record.sender_eid == self.sender_wallet,
            (false, true) => record.recipient_eid == self.recipient_wallet,
            (false, false) => true,
        }
    }
}

/// Which sign of movement amount to return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MovementDirection {
    /// Both directions.
    #[default]
    All,
    /// Negative amounts.
    Sent,
    /// Positive amounts.
    Received,
}

/// Which end of the time-ordered movement log a page is taken from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchDirection {
    /// Oldest first.
    #[default]
    FromBeginning,
    /// Newest first.
    FromLast,
}

/// Parameters for querying movement records.
#[derive(Clone, Debug, Default)]
pub struct QueryMovementsParams {
    pub tx_statuses: Vec<TxStatus>,
    pub enrollment_ids: Vec<String>,
    pub token_types: Vec<String>,
    pub movement_direction: MovementDirection,
    pub search_direction: SearchDirection,
    /// Page size, applied after every other filter. `0` means unbounded.
    pub num_records: usize,
}

impl QueryMovementsParams {
    /// Returns `true` if the record satisfies every criterion except paging.
    pub fn matches(&self, record: &MovementRecord) -> bool {
        if !self.tx_statuses.is_empty() && !self.tx_statuses.contains(&record.status) {
            return false;
        }
        if !self.enrollment_ids.is_empty() && !self.enrollment_ids.contains(&record.enrollment_id)
        {
            return false;
        }
        if !self.token_types.is_empty() && !self.token_types.contains(&record.token_type) {
            return false;
        }
        match self.movement_direction {
            MovementDirection::All => true,
            MovementDirection::Sent => record.is_sent(),
            MovementDirection::Received => record.is_received(),
        }
    }

    /// Select the qualifying page from records in storage order.
    pub fn page<'a, I>(&self, records: I) -> Vec<MovementRecord>
    where
        I: DoubleEndedIterator<Item = &'a MovementRecord>,
    {
        let limit = if self.num_records == 0 {
            usize::MAX
        } else {
            self.num_records
        };
        match self.search_direction {
            SearchDirection::FromBeginning => records
                .filter(|r| self.matches(r))
                .take(limit)
                .cloned()
                .collect(),
            SearchDirection::FromLast => records
                .rev()
                .filter(|r| self.matches(r))
                .take(limit)
                .cloned()
                .collect(),
        }
    }
}

/// Caller-supplied predicate over a validation record.
pub type ValidationFilter = Arc<dyn Fn(&ValidationRecord) -> bool + Send + Sync>;

/// Parameters for querying validation records.
#[derive(Clone, Default)]
pub struct QueryValidationRecordsParams {
    /// Inclusive lower bound on the store-assigned timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the store-assigned timestamp.
    pub to: Option<DateTime<Utc>>,
    pub statuses: Vec<TxStatus>,
    /// Extra AND-constraint, evaluated only on records that pass the
    /// structural filters.
    pub filter: Option<ValidationFilter>,
}

impl QueryValidationRecordsParams {
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ValidationRecord) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn matches(&self, record: &ValidationRecord) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if !within(record.timestamp, self.from, self.to) {
            return false;
        }
        match &self.filter {
            Some(filter) => filter(record),
            None => true,
        }
    }
}

impl fmt::Debug for QueryValidationRecordsParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryValidationRecordsParams")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("statuses", &self.statuses)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

fn within(ts: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    if let Some(from) = from {
        if ts < from {
            return false;
        }
    }
    if let Some(to) = to {
        if ts > to {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tx(sender: &str, recipient: &str, ts: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            tx_id: "tx".into(),
            action_type: ActionType::Transfer,
            sender_eid: sender.into(),
            recipient_eid: recipient.into(),
            token_type: "magic".into(),
            amount: 1,
            timestamp: ts,
            status: TxStatus::Confirmed,
        }
    }

    fn movement(amount: i128, status: TxStatus) -> MovementRecord {
        MovementRecord {
            tx_id: format!("tx{amount}"),
            enrollment_id: "alice".into(),
            token_type: "magic".into(),
            amount,
            status,
        }
    }

    #[test]
    fn empty_params_match_everything() {
        let now = Utc::now();
        assert!(QueryTransactionsParams::default().matches(&tx("a", "b", now)));
        assert!(QueryMovementsParams::default().matches(&movement(-5, TxStatus::Deleted)));
    }

    #[test]
    fn single_wallet_is_exact_match() {
        let now = Utc::now();
        let params = QueryTransactionsParams {
            sender_wallet: "alice".into(),
            ..Default::default()
        };
        assert!(params.matches(&tx("alice", "bob", now)));
        assert!(!params.matches(&tx("bob", "alice", now)));
    }

    #[test]
    fn both_wallets_is_union() {
        let now = Utc::now();
        let params = QueryTransactionsParams {
            sender_wallet: "alice".into(),
            recipient_wallet: "alice".into(),
            ..Default::default()
        };
        assert!(params.matches(&tx("alice", "bob", now)));
        assert!(params.matches(&tx("bob", "alice", now)));
        assert!(!params.matches(&tx("bob", "dan", now)));
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let now = Utc::now();
        let exact = QueryTransactionsParams {
            from: Some(now),
            to: Some(now),
            ..Default::default()
        };
        assert!(exact.matches(&tx("a", "b", now)));
        assert!(!exact.matches(&tx("a", "b", now + Duration::milliseconds(1))));
        assert!(!exact.matches(&tx("a", "b", now - Duration::milliseconds(1))));
    }

    #[test]
    fn page_from_last_takes_newest() {
        let records: Vec<_> = [1, 2, 3, 4]
            .into_iter()
            .map(|a| movement(a, TxStatus::Pending))
            .collect();
        let params = QueryMovementsParams {
            search_direction: SearchDirection::FromLast,
            num_records: 2,
            ..Default::default()
        };
        let page = params.page(records.iter());
        let amounts: Vec<_> = page.iter().map(|m| m.amount).collect();
        assert_eq!(amounts, vec![4, 3]);
    }

    #[test]
    fn page_limit_applies_after_filters() {
        let records = vec![
            movement(-1, TxStatus::Pending),
            movement(-2, TxStatus::Pending),
            movement(3, TxStatus::Pending),
        ];
        let params = QueryMovementsParams {
            movement_direction: MovementDirection::Received,
            num_records: 2,
            ..Default::default()
        };
        assert_eq!(params.page(records.iter()).len(), 1);
    }

    #[test]
    fn validation_filter_is_and_constraint() {
        let record = ValidationRecord {
            tx_id: "1".into(),
            token_request: vec![],
            metadata: Default::default(),
            status: TxStatus::Unknown,
            timestamp: Utc::now(),
        };
        let params = QueryValidationRecordsParams {
            statuses: vec![TxStatus::Confirmed],
            ..Default::default()
        }
        .with_filter(|_| true);
        assert!(!params.matches(&record));

        let params = QueryValidationRecordsParams::default()
            .with_filter(|r| r.status == TxStatus::Unknown);
        assert!(params.matches(&record));
        assert!(format!("{params:?}").contains("<fn>"));
    }
}
