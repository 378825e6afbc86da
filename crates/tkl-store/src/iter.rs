//! Lazy record iterators over committed snapshots.

use std::sync::Arc;

use crate::error::StoreResult;

/// A lazy, finite sequence of records.
///
/// `next` returns `Ok(None)` at the end of the sequence, never an error.
/// Callers must `close` the iterator on every exit path; `close` is
/// idempotent and `next` after `close` returns `Ok(None)`.
pub trait RecordIterator<T>: Send {
    /// The next record, or `Ok(None)` when the sequence is exhausted.
    fn next(&mut self) -> StoreResult<Option<T>>;

    /// Release the resources held by the iterator.
    fn close(&mut self);
}

/// Boxed iterator returned by backend queries.
pub type BoxedIterator<T> = Box<dyn RecordIterator<T>>;

/// Iterator over an immutable snapshot of rows.
///
/// Holds an `Arc` of the rows that were committed when the query started, so
/// later commits never show up mid-iteration. `select` both filters and
/// projects: rows for which it returns `None` are skipped.
pub struct SnapshotIter<S, F> {
    rows: Option<Arc<Vec<S>>>,
    cursor: usize,
    select: F,
}

impl<S, F> SnapshotIter<S, F> {
    pub fn new(rows: Arc<Vec<S>>, select: F) -> Self {
        Self {
            rows: Some(rows),
            cursor: 0,
            select,
        }
    }
}

impl<S, T, F> RecordIterator<T> for SnapshotIter<S, F>
where
    S: Send + Sync,
    F: FnMut(&S) -> Option<T> + Send,
{
    fn next(&mut self) -> StoreResult<Option<T>> {
        let Some(rows) = self.rows.as_ref() else {
            return Ok(None);
        };
        while self.cursor < rows.len() {
            let row = &rows[self.cursor];
            self.cursor += 1;
            if let Some(item) = (self.select)(row) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.rows = None;
    }
}

/// Drain an iterator into a vector and close it, on success or failure.
pub fn collect_records<T>(iter: &mut dyn RecordIterator<T>) -> StoreResult<Vec<T>> {
    let mut records = Vec::new();
    let outcome = drain_into(iter, &mut records);
    iter.close();
    outcome.map(|()| records)
}

fn drain_into<T>(iter: &mut dyn RecordIterator<T>, out: &mut Vec<T>) -> StoreResult<()> {
    while let Some(record) = iter.next()? {
        out.push(record);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn evens() -> BoxedIterator<u32> {
        Box::new(SnapshotIter::new(
            Arc::new((0..10u32).collect::<Vec<_>>()),
            |n: &u32| (n % 2 == 0).then_some(*n),
        ))
    }

    #[test]
    fn filters_and_ends_with_none() {
        let mut it = evens();
        let mut seen = vec![];
        while let Some(n) = it.next().unwrap() {
            seen.push(n);
        }
        assert_eq!(seen, vec![0, 2, 4, 6, 8]);
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn close_is_idempotent_and_ends_sequence() {
        let mut it = evens();
        assert_eq!(it.next().unwrap(), Some(0));
        it.close();
        it.close();
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn close_releases_snapshot() {
        let rows = Arc::new(vec![1u32, 2, 3]);
        let mut it: BoxedIterator<u32> =
            Box::new(SnapshotIter::new(Arc::clone(&rows), |n: &u32| Some(*n)));
        assert_eq!(Arc::strong_count(&rows), 2);
        it.close();
        assert_eq!(Arc::strong_count(&rows), 1);
    }

    #[test]
    fn collect_closes_on_error() {
        struct Failing {
            calls: usize,
            closed: bool,
        }
        impl RecordIterator<u8> for Failing {
            fn next(&mut self) -> StoreResult<Option<u8>> {
                self.calls += 1;
                if self.calls > 2 {
                    Err(StoreError::Serialization("boom".into()))
                } else {
                    Ok(Some(1))
                }
            }
            fn close(&mut self) {
                self.closed = true;
            }
        }

        let mut it = Failing {
            calls: 0,
            closed: false,
        };
        assert!(collect_records::<u8>(&mut it).is_err());
        assert!(it.closed);
    }

    #[test]
    fn collect_returns_all_records() {
        let mut it = evens();
        assert_eq!(collect_records(it.as_mut()).unwrap(), vec![0, 2, 4, 6, 8]);
    }
}
