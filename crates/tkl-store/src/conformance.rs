//! Backend conformance suite.
//!
//! Each function exercises one behavior every [`TransactionDb`] backend must
//! show, starting from an empty store. Backends wire the whole suite into
//! their tests with [`transaction_db_conformance!`](crate::transaction_db_conformance):
//!
//! ```ignore
//! #[cfg(test)]
//! mod tests {
//!     use super::*;
//!     tkl_store::transaction_db_conformance!(Box::new(MyBackend::new()));
//! }
//! ```
//!
//! The factory expression is evaluated once per case and must yield a value
//! that dereferences to the backend.

use std::thread;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use tkl_types::{ActionType, Metadata, MovementRecord, TransactionRecord, TxStatus};

use crate::error::ErrorKind;
use crate::iter::collect_records;
use crate::params::{
    MovementDirection, QueryMovementsParams, QueryTransactionsParams,
    QueryValidationRecordsParams, SearchDirection,
};
use crate::traits::TransactionDb;

pub use proptest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn tx_record(
    tx_id: &str,
    action_type: ActionType,
    sender: &str,
    recipient: &str,
    token_type: &str,
    amount: u128,
    timestamp: DateTime<Utc>,
    status: TxStatus,
) -> TransactionRecord {
    TransactionRecord {
        tx_id: tx_id.to_string(),
        action_type,
        sender_eid: sender.to_string(),
        recipient_eid: recipient.to_string(),
        token_type: token_type.to_string(),
        amount,
        timestamp,
        status,
    }
}

fn movement(tx_id: &str, eid: &str, token_type: &str, amount: i128, status: TxStatus) -> MovementRecord {
    MovementRecord {
        tx_id: tx_id.to_string(),
        enrollment_id: eid.to_string(),
        token_type: token_type.to_string(),
        amount,
        status,
    }
}

fn transactions<D: TransactionDb + ?Sized>(
    db: &D,
    params: &QueryTransactionsParams,
) -> Vec<TransactionRecord> {
    let mut it = db.query_transactions(params).expect("query transactions");
    collect_records(it.as_mut()).expect("iterate transactions")
}

fn validations<D: TransactionDb + ?Sized>(
    db: &D,
    params: &QueryValidationRecordsParams,
) -> Vec<tkl_types::ValidationRecord> {
    let mut it = db.query_validations(params).expect("query validations");
    collect_records(it.as_mut()).expect("iterate validations")
}

fn commit_movements<D: TransactionDb + ?Sized>(db: &D, records: &[MovementRecord]) {
    db.begin_update().expect("begin");
    for r in records {
        db.add_movement(r).expect("add movement");
    }
    db.commit().expect("commit");
}

fn within_seconds(a: DateTime<Utc>, b: DateTime<Utc>, secs: i64) -> bool {
    (a - b).num_seconds().abs() <= secs
}

// ---------------------------------------------------------------------------
// Example-based cases
// ---------------------------------------------------------------------------

/// Transactions keep their caller-supplied timestamp; validation records get
/// one assigned at write time.
pub fn stores_timestamp<D: TransactionDb + ?Sized>(db: &D) {
    db.begin_update().unwrap();
    db.add_transaction(&tx_record(
        "tx1",
        ActionType::Transfer,
        "bob",
        "alice",
        "magic",
        10,
        Utc::now(),
        TxStatus::Pending,
    ))
    .unwrap();
    db.add_validation_record("tx1", b"", &Metadata::new()).unwrap();
    db.commit().unwrap();

    let now = Utc::now();
    let txs = transactions(db, &QueryTransactionsParams::default());
    assert_eq!(txs.len(), 1);
    assert!(within_seconds(now, txs[0].timestamp, 3));

    let vrs = validations(db, &QueryValidationRecordsParams::default());
    assert_eq!(vrs.len(), 1);
    assert!(within_seconds(now, vrs[0].timestamp, 3));
}

/// Direction, paging, and idempotent status updates on movements.
pub fn movements<D: TransactionDb + ?Sized>(db: &D) {
    commit_movements(
        db,
        &[
            movement("0", "alice", "magic", 10, TxStatus::Pending),
            movement("1", "alice", "magic", 20, TxStatus::Pending),
            movement("2", "alice", "magic", -30, TxStatus::Pending),
        ],
    );

    let all_pending = db
        .query_movements(&QueryMovementsParams {
            tx_statuses: vec![TxStatus::Pending],
            search_direction: SearchDirection::FromLast,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all_pending.len(), 3);

    let received = db
        .query_movements(&QueryMovementsParams {
            tx_statuses: vec![TxStatus::Pending],
            movement_direction: MovementDirection::Received,
            num_records: 2,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(received.len(), 2);

    let one = db
        .query_movements(&QueryMovementsParams {
            tx_statuses: vec![TxStatus::Pending],
            num_records: 1,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(one.len(), 1);

    db.begin_update().unwrap();
    db.set_status("2", TxStatus::Confirmed).unwrap();
    db.commit().unwrap();

    let received = db
        .query_movements(&QueryMovementsParams {
            tx_statuses: vec![TxStatus::Pending],
            movement_direction: MovementDirection::Received,
            search_direction: SearchDirection::FromLast,
            num_records: 3,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(received.len(), 2);

    db.begin_update().unwrap();
    db.set_status("2", TxStatus::Confirmed).unwrap();
    db.commit().unwrap();

    let confirmed = db
        .query_movements(&QueryMovementsParams {
            tx_statuses: vec![TxStatus::Confirmed],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].amount, -30);
}

/// Time-window queries, status updates, and the unknown-id status.
pub fn transaction<D: TransactionDb + ?Sized>(db: &D) {
    let t0 = Utc::now();
    let last_year = t0 - Duration::days(365);

    db.begin_update().unwrap();
    let old = tx_record(
        "tx99",
        ActionType::Transfer,
        "bob",
        "alice",
        "magic",
        10,
        last_year,
        TxStatus::Pending,
    );
    db.add_transaction(&old).unwrap();
    let mut recent = Vec::new();
    for i in 0..20 {
        let record = tx_record(
            &format!("tx{i}"),
            ActionType::Issue,
            "",
            "alice",
            "magic",
            10,
            Utc::now(),
            TxStatus::Pending,
        );
        db.add_transaction(&record).unwrap();
        recent.push(record);
    }
    db.commit().unwrap();

    let window = transactions(
        db,
        &QueryTransactionsParams {
            from: Some(t0),
            to: Some(Utc::now() + Duration::seconds(3)),
            ..Default::default()
        },
    );
    assert_eq!(window, recent);

    let yesterday = t0 - Duration::days(1);
    let before = transactions(
        db,
        &QueryTransactionsParams {
            to: Some(yesterday),
            ..Default::default()
        },
    );
    assert_eq!(before, vec![old]);

    db.begin_update().unwrap();
    db.set_status("tx2", TxStatus::Confirmed).unwrap();
    db.set_status("tx3", TxStatus::Confirmed).unwrap();
    db.commit().unwrap();

    assert_eq!(db.get_status("tx2").unwrap().0, TxStatus::Confirmed);

    let pending = transactions(
        db,
        &QueryTransactionsParams {
            statuses: vec![TxStatus::Pending],
            ..Default::default()
        },
    );
    assert_eq!(pending.len(), 19);

    let confirmed = transactions(
        db,
        &QueryTransactionsParams {
            statuses: vec![TxStatus::Confirmed],
            ..Default::default()
        },
    );
    assert_eq!(confirmed.len(), 2);

    assert_eq!(
        db.get_status("nonexistenttx").unwrap(),
        (TxStatus::Unknown, String::new())
    );
}

/// Token requests round-trip; unknown ids resolve to `None`.
pub fn token_request<D: TransactionDb + ?Sized>(db: &D) {
    db.begin_update().unwrap();
    db.add_token_request("id1", b"arbitrary bytes").unwrap();
    db.commit().unwrap();

    assert_eq!(
        db.get_token_request("id1").unwrap(),
        Some(b"arbitrary bytes".to_vec())
    );
    assert_eq!(db.get_token_request("id2").unwrap(), None);
}

/// Records sharing a `tx_id` are all kept, in insertion order.
pub fn allows_same_tx_id<D: TransactionDb + ?Sized>(db: &D) {
    let payment = tx_record(
        "1",
        ActionType::Transfer,
        "bob",
        "alice",
        "magic",
        10,
        Utc::now(),
        TxStatus::Pending,
    );
    let change = tx_record(
        "1",
        ActionType::Transfer,
        "bob",
        "bob",
        "magic",
        1,
        Utc::now(),
        TxStatus::Pending,
    );
    db.begin_update().unwrap();
    db.add_transaction(&payment).unwrap();
    db.add_transaction(&change).unwrap();
    db.commit().unwrap();

    assert_eq!(
        transactions(db, &QueryTransactionsParams::default()),
        vec![payment, change]
    );
}

/// Nothing written under a discarded unit is ever visible.
pub fn rollback<D: TransactionDb + ?Sized>(db: &D) {
    db.begin_update().unwrap();
    db.add_token_request("id1", b"arbitrary bytes").unwrap();
    db.add_transaction(&tx_record(
        "1",
        ActionType::Transfer,
        "bob",
        "alice",
        "magic",
        10,
        Utc::now(),
        TxStatus::Pending,
    ))
    .unwrap();
    db.add_movement(&movement("1", "bob", "magic", 10, TxStatus::Pending))
        .unwrap();
    db.discard().unwrap();

    assert!(transactions(db, &QueryTransactionsParams::default()).is_empty());
    assert!(db
        .query_movements(&QueryMovementsParams::default())
        .unwrap()
        .is_empty());
    assert_eq!(db.get_token_request("id1").unwrap(), None);
}

/// Status, action, wallet, and time-window filters over a mixed ledger.
pub fn transaction_queries<D: TransactionDb + ?Sized>(db: &D) {
    use ActionType::{Issue, Redeem, Transfer};
    use TxStatus::{Confirmed, Deleted, Pending};

    let now = Utc::now();
    let just_before = now - Duration::milliseconds(1);
    let just_after = now + Duration::milliseconds(1);
    let last_year = now - Duration::days(365);
    let yesterday = now - Duration::days(1);
    let tomorrow = now + Duration::days(1);

    let records = [
        tx_record("1", Issue, "", "bob", "magic", 10, now, Confirmed),
        tx_record("2", Transfer, "bob", "alice", "magic", 10, just_before - Duration::milliseconds(1), Confirmed),
        tx_record("2", Transfer, "bob", "bob", "magic", 1, now, Confirmed),
        tx_record("3", Transfer, "bob", "alice", "magic", 1, now, Pending),
        tx_record("4", Transfer, "bob", "alice", "magic", 1, now, Confirmed),
        tx_record("5", Transfer, "bob", "alice", "magic", 1, now, Deleted),
        tx_record("6", Transfer, "alice", "bob", "abc", 1, now, Confirmed),
        tx_record("7", Transfer, "alice", "bob", "abc", 1, just_before, Confirmed),
        tx_record("7", Transfer, "alice", "dan", "abc", 1, yesterday, Confirmed),
        tx_record("8", Redeem, "dan", "carlos", "abc", 1, yesterday, Confirmed),
        tx_record("9", Transfer, "alice", "dan", "abc", 1, tomorrow, Confirmed),
        tx_record("10", Redeem, "alice", "", "abc", 1, tomorrow, Confirmed),
    ];
    db.begin_update().unwrap();
    for r in &records {
        db.add_transaction(r).unwrap();
    }
    db.commit().unwrap();

    let alice_either = QueryTransactionsParams {
        sender_wallet: "alice".into(),
        recipient_wallet: "alice".into(),
        ..Default::default()
    };
    let cases: Vec<(&str, QueryTransactionsParams, usize)> = vec![
        ("no params", QueryTransactionsParams::default(), records.len()),
        (
            "confirmed",
            QueryTransactionsParams {
                statuses: vec![Confirmed],
                ..Default::default()
            },
            10,
        ),
        (
            "pending and deleted",
            QueryTransactionsParams {
                statuses: vec![Pending, Deleted],
                ..Default::default()
            },
            2,
        ),
        (
            "confirmed sent by alice",
            QueryTransactionsParams {
                sender_wallet: "alice".into(),
                statuses: vec![Confirmed],
                ..Default::default()
            },
            5,
        ),
        (
            "received by alice",
            QueryTransactionsParams {
                recipient_wallet: "alice".into(),
                ..Default::default()
            },
            4,
        ),
        ("sent or received by alice", alice_either.clone(), 9),
        (
            "sent or received by alice since last year",
            QueryTransactionsParams {
                from: Some(last_year),
                ..alice_either.clone()
            },
            9,
        ),
        (
            "this millisecond",
            QueryTransactionsParams {
                from: Some(just_before),
                to: Some(just_after),
                ..Default::default()
            },
            7,
        ),
        (
            "this millisecond for alice",
            QueryTransactionsParams {
                from: Some(just_before),
                to: Some(just_after),
                ..alice_either.clone()
            },
            5,
        ),
        (
            "redemptions",
            QueryTransactionsParams {
                action_types: vec![Redeem],
                ..Default::default()
            },
            2,
        ),
    ];

    for (name, params, expected) in cases {
        let found = transactions(db, &params);
        assert_eq!(found.len(), expected, "{name}: {params:?}");
    }
}

/// Structural filters, the predicate escape hatch, and write timestamps.
pub fn validation_record_queries<D: TransactionDb + ?Sized>(db: &D) {
    let before = Utc::now() - Duration::seconds(1);
    let mut tagged = Metadata::new();
    tagged.insert("key".into(), b"value".to_vec());

    let expected: [(&str, &[u8], &Metadata); 4] = [
        ("1", b"tr1", &tagged),
        ("2", b"", &Metadata::new()),
        ("3", b"tr3", &tagged),
        ("4", b"tr4", &tagged),
    ];
    db.begin_update().unwrap();
    for (tx_id, request, metadata) in expected {
        db.add_validation_record(tx_id, request, metadata).unwrap();
    }
    db.commit().unwrap();

    db.begin_update().unwrap();
    db.set_status("4", TxStatus::Confirmed).unwrap();
    db.commit().unwrap();

    let all = validations(db, &QueryValidationRecordsParams::default());
    assert_eq!(all.len(), 4);
    for (record, (tx_id, request, metadata)) in all.iter().zip(expected) {
        assert_eq!(record.tx_id, tx_id);
        assert_eq!(record.token_request, request);
        assert_eq!(&record.metadata, metadata);
        assert!(within_seconds(before, record.timestamp, 5));
    }
    assert_eq!(all[3].status, TxStatus::Confirmed);

    let to = validations(
        db,
        &QueryValidationRecordsParams {
            to: Some(before),
            ..Default::default()
        },
    );
    assert!(to.is_empty());

    let from = validations(
        db,
        &QueryValidationRecordsParams {
            from: Some(before),
            ..Default::default()
        },
    );
    assert_eq!(from.len(), 4);

    let confirmed = validations(
        db,
        &QueryValidationRecordsParams {
            statuses: vec![TxStatus::Confirmed],
            ..Default::default()
        },
    );
    assert_eq!(confirmed.len(), 1);

    let unset = validations(
        db,
        &QueryValidationRecordsParams::default().with_filter(|r| r.status == TxStatus::Unknown),
    );
    assert_eq!(unset.len(), 3);
}

/// `Idle -> Open -> {Committed, Discarded} -> Idle`, and misuse errors.
pub fn unit_of_work_state<D: TransactionDb + ?Sized>(db: &D) {
    assert!(!db.is_open());
    assert_eq!(db.commit().unwrap_err().kind(), ErrorKind::InvalidUsage);
    assert_eq!(db.discard().unwrap_err().kind(), ErrorKind::InvalidUsage);

    let record = tx_record(
        "tx1",
        ActionType::Issue,
        "",
        "alice",
        "magic",
        1,
        Utc::now(),
        TxStatus::Pending,
    );
    assert!(db.add_transaction(&record).unwrap_err().is_invalid_usage());
    assert!(db
        .add_movement(&movement("tx1", "alice", "magic", 1, TxStatus::Pending))
        .unwrap_err()
        .is_invalid_usage());
    assert!(db
        .add_validation_record("tx1", b"", &Metadata::new())
        .unwrap_err()
        .is_invalid_usage());
    assert!(db.add_token_request("tx1", b"").unwrap_err().is_invalid_usage());
    assert!(db
        .set_status("tx1", TxStatus::Confirmed)
        .unwrap_err()
        .is_invalid_usage());

    db.begin_update().unwrap();
    assert!(db.is_open());
    assert!(db.begin_update().unwrap_err().is_invalid_usage());
    db.add_transaction(&record).unwrap();
    db.commit().unwrap();
    assert!(!db.is_open());

    // Reusable after commit and after discard.
    db.begin_update().unwrap();
    db.discard().unwrap();
    db.begin_update().unwrap();
    db.add_transaction(&record).unwrap();
    db.commit().unwrap();

    assert_eq!(transactions(db, &QueryTransactionsParams::default()).len(), 2);
}

/// Re-applying a status leaves every query result unchanged.
pub fn status_idempotent<D: TransactionDb + ?Sized>(db: &D) {
    db.begin_update().unwrap();
    db.add_transaction(&tx_record(
        "tx1",
        ActionType::Issue,
        "",
        "alice",
        "magic",
        5,
        Utc::now(),
        TxStatus::Pending,
    ))
    .unwrap();
    db.add_movement(&movement("tx1", "alice", "magic", 5, TxStatus::Pending))
        .unwrap();
    db.add_validation_record("tx1", b"req", &Metadata::new())
        .unwrap();
    db.set_status_with_message("tx1", TxStatus::Confirmed, "finalized")
        .unwrap();
    db.commit().unwrap();

    let snapshot = || {
        (
            transactions(db, &QueryTransactionsParams::default()),
            db.query_movements(&QueryMovementsParams::default()).unwrap(),
            validations(db, &QueryValidationRecordsParams::default()),
            db.get_status("tx1").unwrap(),
        )
    };
    let first = snapshot();
    assert_eq!(first.0[0].status, TxStatus::Confirmed);
    assert_eq!(first.1[0].status, TxStatus::Confirmed);
    assert_eq!(first.2[0].status, TxStatus::Confirmed);
    assert_eq!(first.3, (TxStatus::Confirmed, "finalized".to_string()));

    db.begin_update().unwrap();
    db.set_status("tx1", TxStatus::Confirmed).unwrap();
    db.commit().unwrap();
    assert_eq!(snapshot(), first);
}

/// Readers running beside a writer only ever see whole committed batches.
pub fn concurrent_readers<D: TransactionDb + ?Sized>(db: &D) {
    let leg = |tx_id: String| {
        tx_record(
            &tx_id,
            ActionType::Transfer,
            "bob",
            "alice",
            "magic",
            1,
            Utc::now(),
            TxStatus::Pending,
        )
    };

    db.begin_update().unwrap();
    db.add_transaction(&leg("base".into())).unwrap();
    db.add_transaction(&leg("base".into())).unwrap();
    db.commit().unwrap();

    // An open unit is invisible.
    db.begin_update().unwrap();
    db.add_transaction(&leg("open".into())).unwrap();
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                assert_eq!(transactions(db, &QueryTransactionsParams::default()).len(), 2);
            });
        }
    });
    db.discard().unwrap();

    // Batches of two legs are published whole.
    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..25 {
                db.begin_update().unwrap();
                db.add_transaction(&leg(format!("tx{i}"))).unwrap();
                db.add_transaction(&leg(format!("tx{i}"))).unwrap();
                db.commit().unwrap();
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..25 {
                    let n = transactions(db, &QueryTransactionsParams::default()).len();
                    assert_eq!(n % 2, 0, "observed a partial batch ({n} records)");
                }
            });
        }
    });
    assert_eq!(transactions(db, &QueryTransactionsParams::default()).len(), 52);
}

/// Enrollment-id and token-type filters, and the derived balance.
pub fn movement_filters_and_balance<D: TransactionDb + ?Sized>(db: &D) {
    commit_movements(
        db,
        &[
            movement("1", "alice", "magic", 100, TxStatus::Confirmed),
            movement("2", "alice", "magic", -40, TxStatus::Confirmed),
            movement("2", "bob", "magic", 40, TxStatus::Confirmed),
            movement("3", "alice", "abc", 7, TxStatus::Pending),
            movement("4", "alice", "magic", -10, TxStatus::Pending),
        ],
    );

    let alice_magic = db
        .query_movements(&QueryMovementsParams {
            enrollment_ids: vec!["alice".into()],
            token_types: vec!["magic".into()],
            ..Default::default()
        })
        .unwrap();
    let tx_ids: Vec<_> = alice_magic.iter().map(|m| m.tx_id.as_str()).collect();
    assert_eq!(tx_ids, vec!["1", "2", "4"]);

    let either = db
        .query_movements(&QueryMovementsParams {
            enrollment_ids: vec!["alice".into(), "bob".into()],
            movement_direction: MovementDirection::Received,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(either.len(), 3);

    assert_eq!(db.balance("alice", "magic", &[TxStatus::Confirmed]).unwrap(), 60);
    assert_eq!(db.balance("alice", "magic", &[]).unwrap(), 50);
    assert_eq!(db.balance("bob", "magic", &[]).unwrap(), 40);
    assert_eq!(db.balance("carol", "magic", &[]).unwrap(), 0);
}

/// `close` is idempotent and ends the sequence.
pub fn iterator_close<D: TransactionDb + ?Sized>(db: &D) {
    db.begin_update().unwrap();
    for i in 0..3 {
        db.add_transaction(&tx_record(
            &format!("tx{i}"),
            ActionType::Issue,
            "",
            "alice",
            "magic",
            1,
            Utc::now(),
            TxStatus::Pending,
        ))
        .unwrap();
        db.add_validation_record(&format!("tx{i}"), b"", &Metadata::new())
            .unwrap();
    }
    db.commit().unwrap();

    let mut txs = db
        .query_transactions(&QueryTransactionsParams::default())
        .unwrap();
    assert!(txs.next().unwrap().is_some());
    txs.close();
    txs.close();
    assert!(txs.next().unwrap().is_none());

    let mut vrs = db
        .query_validations(&QueryValidationRecordsParams::default())
        .unwrap();
    while vrs.next().unwrap().is_some() {}
    assert!(vrs.next().unwrap().is_none());
    vrs.close();
    assert!(vrs.next().unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Non-zero signed movement amounts paired with a status.
pub fn movement_inputs() -> impl Strategy<Value = Vec<(i128, TxStatus)>> {
    let amount = (1i128..1_000, any::<bool>()).prop_map(|(a, neg)| if neg { -a } else { a });
    let status = prop::sample::select(TxStatus::ALL.to_vec());
    prop::collection::vec((amount, status), 0..24)
}

/// A possibly empty status filter.
pub fn status_filter() -> impl Strategy<Value = Vec<TxStatus>> {
    prop::sample::subsequence(TxStatus::ALL.to_vec(), 0..=TxStatus::ALL.len())
}

fn seed_movements<D: TransactionDb + ?Sized>(db: &D, inputs: &[(i128, TxStatus)]) {
    let records: Vec<_> = inputs
        .iter()
        .enumerate()
        .map(|(i, (amount, status))| movement(&format!("m{i}"), "alice", "magic", *amount, *status))
        .collect();
    commit_movements(db, &records);
}

/// `Received` and `Sent` partition `All` for any status filter.
pub fn direction_partition<D: TransactionDb + ?Sized>(
    db: &D,
    inputs: &[(i128, TxStatus)],
    statuses: &[TxStatus],
) -> Result<(), TestCaseError> {
    seed_movements(db, inputs);
    let count = |direction| {
        db.query_movements(&QueryMovementsParams {
            tx_statuses: statuses.to_vec(),
            movement_direction: direction,
            ..Default::default()
        })
        .map(|r| r.len())
    };
    let all = count(MovementDirection::All).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let sent = count(MovementDirection::Sent).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let received =
        count(MovementDirection::Received).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(sent + received, all);
    Ok(())
}

/// `FromLast` with a page size returns exactly the newest qualifying records.
pub fn paging_from_last<D: TransactionDb + ?Sized>(
    db: &D,
    inputs: &[(i128, TxStatus)],
    page: usize,
) -> Result<(), TestCaseError> {
    seed_movements(db, inputs);
    let found = db
        .query_movements(&QueryMovementsParams {
            search_direction: SearchDirection::FromLast,
            num_records: page,
            ..Default::default()
        })
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    let expected: Vec<String> = (0..inputs.len())
        .rev()
        .take(page)
        .map(|i| format!("m{i}"))
        .collect();
    let found: Vec<String> = found.into_iter().map(|m| m.tx_id).collect();
    prop_assert_eq!(found, expected);
    Ok(())
}

/// A window bounded exactly at a record's timestamp includes that record.
pub fn inclusive_bounds<D: TransactionDb + ?Sized>(
    db: &D,
    offsets: &[i64],
    pick: prop::sample::Index,
) -> Result<(), TestCaseError> {
    let base = Utc::now();
    let stamps: Vec<_> = offsets.iter().map(|s| base + Duration::seconds(*s)).collect();
    db.begin_update()
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    for (i, ts) in stamps.iter().enumerate() {
        let record = tx_record(
            &format!("tx{i}"),
            ActionType::Issue,
            "",
            "alice",
            "magic",
            1,
            *ts,
            TxStatus::Pending,
        );
        db.add_transaction(&record)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
    }
    db.commit().map_err(|e| TestCaseError::fail(e.to_string()))?;

    let chosen = stamps[pick.index(stamps.len())];
    let exact = transactions(
        db,
        &QueryTransactionsParams {
            from: Some(chosen),
            to: Some(chosen),
            ..Default::default()
        },
    );
    prop_assert_eq!(exact.len(), stamps.iter().filter(|t| **t == chosen).count());

    let since = transactions(
        db,
        &QueryTransactionsParams {
            from: Some(chosen),
            ..Default::default()
        },
    );
    prop_assert_eq!(since.len(), stamps.iter().filter(|t| **t >= chosen).count());

    let until = transactions(
        db,
        &QueryTransactionsParams {
            to: Some(chosen),
            ..Default::default()
        },
    );
    prop_assert_eq!(until.len(), stamps.iter().filter(|t| **t <= chosen).count());
    Ok(())
}

/// Generate the full conformance suite for a backend.
///
/// `$factory` is evaluated afresh for every case and must produce a value
/// that dereferences to a [`TransactionDb`](crate::TransactionDb).
#[macro_export]
macro_rules! transaction_db_conformance {
    (@cases $factory:expr; $($name:ident),* $(,)?) => {
        $(
            #[test]
            fn $name() {
                let fixture = $factory;
                $crate::conformance::$name(&*fixture);
            }
        )*
    };
    ($factory:expr) => {
        mod transaction_db_conformance {
            use super::*;

            $crate::transaction_db_conformance!(@cases $factory;
                stores_timestamp,
                movements,
                transaction,
                token_request,
                allows_same_tx_id,
                rollback,
                transaction_queries,
                validation_record_queries,
                unit_of_work_state,
                status_idempotent,
                concurrent_readers,
                movement_filters_and_balance,
                iterator_close,
            );

            $crate::conformance::proptest::proptest! {
                #![proptest_config($crate::conformance::proptest::test_runner::Config::with_cases(32))]

                #[test]
                fn direction_partition(
                    inputs in $crate::conformance::movement_inputs(),
                    statuses in $crate::conformance::status_filter(),
                ) {
                    let fixture = $factory;
                    $crate::conformance::direction_partition(&*fixture, &inputs, &statuses)?;
                }

                #[test]
                fn paging_from_last(
                    inputs in $crate::conformance::movement_inputs(),
                    page in 1usize..10,
                ) {
                    let fixture = $factory;
                    $crate::conformance::paging_from_last(&*fixture, &inputs, page)?;
                }

                #[test]
                fn inclusive_bounds(
                    offsets in $crate::conformance::proptest::collection::vec(-5_000i64..5_000, 1..16),
                    pick in $crate::conformance::proptest::prelude::any::<$crate::conformance::proptest::sample::Index>(),
                ) {
                    let fixture = $factory;
                    $crate::conformance::inclusive_bounds(&*fixture, &offsets, pick)?;
                }
            }
        }
    };
}
