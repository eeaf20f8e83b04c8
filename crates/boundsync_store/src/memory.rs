//! In-memory store with transactional batch writes.

use crate::error::{StoreError, StoreResult};
use crate::record::{PagedResult, Record, RecordId, WriteBatch};
use crate::store::Store;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the commit notification channel.
const COMMIT_CHANNEL_CAPACITY: usize = 64;

/// An in-memory store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit and integration tests
/// - Caches that don't need to survive a restart
///
/// # Atomicity
///
/// A [`WriteBatch`] is staged outside the visible state and swapped in only
/// after every write in it has been applied. A failing batch leaves the
/// visible state untouched, and readers never observe a half-applied batch.
///
/// # Fault Injection
///
/// [`MemoryStore::fail_writes_after`] and [`MemoryStore::fail_next_reads`]
/// make upcoming operations fail, for exercising error paths.
///
/// # Example
///
/// ```rust
/// use boundsync_store::{MemoryStore, PagedResult, Record, RecordId, WriteBatch};
///
/// #[derive(Clone)]
/// struct Repo(RecordId);
/// impl Record for Repo {
///     fn id(&self) -> RecordId {
///         self.0
///     }
/// }
///
/// let store = MemoryStore::new();
/// let batch = WriteBatch::new()
///     .with_records(vec![Repo(1), Repo(2)])
///     .with_paged(PagedResult::new("rust", vec![1, 2], 2, None));
/// assert_eq!(store.apply(batch).unwrap(), 1);
/// assert_eq!(store.len(), 2);
/// ```
pub struct MemoryStore<R> {
    state: RwLock<State<R>>,
    faults: Mutex<Faults>,
    commits: broadcast::Sender<u64>,
}

struct State<R> {
    records: BTreeMap<RecordId, R>,
    paged: HashMap<String, PagedResult>,
    sequence: u64,
    closed: bool,
}

#[derive(Default)]
struct Faults {
    /// Fail the next batch after this many staged writes.
    write_after: Option<usize>,
    /// Number of upcoming reads to fail.
    reads: u32,
}

impl<R: Record> MemoryStore<R> {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        let (commits, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(State {
                records: BTreeMap::new(),
                paged: HashMap::new(),
                sequence: 0,
                closed: false,
            }),
            faults: Mutex::new(Faults::default()),
            commits,
        }
    }

    /// Applies a batch atomically and notifies subscribers.
    ///
    /// This is the synchronous form of [`Store::write_batch`], useful for
    /// seeding a store outside an async context.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or an injected fault fires.
    pub fn apply(&self, batch: WriteBatch<R>) -> StoreResult<u64> {
        let mut state = self.state.write();
        if state.closed {
            return Err(StoreError::Closed);
        }
        if batch.is_empty() {
            return Ok(state.sequence);
        }

        let fail_after = self.faults.lock().write_after.take();
        let mut staged_paged = HashMap::with_capacity(batch.paged.len());
        let mut staged_records = BTreeMap::new();
        let mut applied = 0usize;

        let check = |applied: usize| -> StoreResult<()> {
            match fail_after {
                Some(limit) if applied >= limit => Err(StoreError::write(format!(
                    "injected failure after {} writes",
                    applied
                ))),
                _ => Ok(()),
            }
        };

        for paged in batch.paged {
            check(applied)?;
            staged_paged.insert(paged.key.clone(), paged);
            applied += 1;
        }
        for record in batch.records {
            check(applied)?;
            staged_records.insert(record.id(), record);
            applied += 1;
        }

        state.paged.extend(staged_paged);
        state.records.extend(staged_records);
        state.sequence += 1;
        let sequence = state.sequence;
        drop(state);

        debug!(sequence, writes = applied, "committed batch");
        // No subscribers is not an error.
        let _ = self.commits.send(sequence);
        Ok(sequence)
    }

    /// Makes the next batch fail after `writes` of its writes were staged.
    ///
    /// `0` fails the batch before anything is staged.
    pub fn fail_writes_after(&self, writes: usize) {
        self.faults.lock().write_after = Some(writes);
    }

    /// Makes the next `count` reads fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.faults.lock().reads = count;
    }

    /// Closes the store. Every later operation fails with [`StoreError::Closed`].
    pub fn close(&self) {
        self.state.write().closed = true;
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sequence number of the last commit (0 before any commit).
    pub fn sequence(&self) -> u64 {
        self.state.read().sequence
    }

    /// Returns a copy of the paged result stored under `key`.
    pub fn paged_snapshot(&self, key: &str) -> Option<PagedResult> {
        self.state.read().paged.get(key).cloned()
    }

    /// Returns a copy of the record stored under `id`.
    pub fn record_snapshot(&self, id: RecordId) -> Option<R> {
        self.state.read().records.get(&id).cloned()
    }

    fn check_read(&self, state: &State<R>) -> StoreResult<()> {
        if state.closed {
            return Err(StoreError::Closed);
        }
        let mut faults = self.faults.lock();
        if faults.reads > 0 {
            faults.reads -= 1;
            return Err(StoreError::read("injected read failure"));
        }
        Ok(())
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> Store<R> for MemoryStore<R> {
    async fn get(&self, id: RecordId) -> StoreResult<Option<R>> {
        let state = self.state.read();
        self.check_read(&state)?;
        Ok(state.records.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[RecordId]) -> StoreResult<Vec<R>> {
        let state = self.state.read();
        self.check_read(&state)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect())
    }

    async fn query(
        &self,
        predicate: &(dyn for<'p> Fn(&'p R) -> bool + Send + Sync),
    ) -> StoreResult<Vec<R>> {
        let state = self.state.read();
        self.check_read(&state)?;
        Ok(state
            .records
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect())
    }

    async fn paged(&self, key: &str) -> StoreResult<Option<PagedResult>> {
        let state = self.state.read();
        self.check_read(&state)?;
        Ok(state.paged.get(key).cloned())
    }

    async fn write_batch(&self, batch: WriteBatch<R>) -> StoreResult<u64> {
        self.apply(batch)
    }

    fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.commits.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Cursor;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: RecordId,
        owner: &'static str,
    }

    impl Record for Item {
        fn id(&self) -> RecordId {
            self.id
        }
    }

    fn item(id: RecordId, owner: &'static str) -> Item {
        Item { id, owner }
    }

    #[test]
    fn memory_new_is_empty() {
        let store = MemoryStore::<Item>::new();
        assert!(store.is_empty());
        assert_eq!(store.sequence(), 0);
    }

    #[test]
    fn apply_assigns_increasing_sequences() {
        let store = MemoryStore::new();
        let first = store
            .apply(WriteBatch::new().with_records(vec![item(1, "a")]))
            .unwrap();
        let second = store
            .apply(WriteBatch::new().with_records(vec![item(2, "a")]))
            .unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn empty_batch_does_not_commit() {
        let store = MemoryStore::<Item>::new();
        assert_eq!(store.apply(WriteBatch::new()).unwrap(), 0);
        assert_eq!(store.sequence(), 0);
    }

    #[tokio::test]
    async fn get_many_preserves_order_and_duplicates() {
        let store = MemoryStore::new();
        store
            .apply(WriteBatch::new().with_records(vec![item(1, "a"), item(2, "b"), item(3, "c")]))
            .unwrap();

        let found = store.get_many(&[3, 1, 3, 99]).await.unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1, 3]);
    }

    #[tokio::test]
    async fn query_filters_by_predicate() {
        let store = MemoryStore::new();
        store
            .apply(WriteBatch::new().with_records(vec![item(1, "a"), item(2, "b"), item(3, "a")]))
            .unwrap();

        let owned = store.query(&|r: &Item| r.owner == "a").await.unwrap();
        assert_eq!(owned, vec![item(1, "a"), item(3, "a")]);
    }

    #[tokio::test]
    async fn query_through_trait_object_with_borrowed_predicate() {
        let store = MemoryStore::new();
        store
            .apply(WriteBatch::new().with_records(vec![item(1, "a"), item(2, "b"), item(3, "b")]))
            .unwrap();

        let owner = String::from("b");
        let dyn_store: &dyn Store<Item> = &store;
        let owned = dyn_store
            .query(&|r: &Item| r.owner == owner.as_str())
            .await
            .unwrap();
        assert_eq!(owned, vec![item(2, "b"), item(3, "b")]);

        store.fail_next_reads(1);
        assert!(dyn_store.query(&|_: &Item| true).await.is_err());
    }

    #[tokio::test]
    async fn failed_batch_leaves_state_unchanged() {
        let store = MemoryStore::new();
        let original = PagedResult::new("q", vec![1, 2], 4, Some(Cursor::page(2)));
        store
            .apply(
                WriteBatch::new()
                    .with_records(vec![item(1, "a"), item(2, "a")])
                    .with_paged(original.clone()),
            )
            .unwrap();

        // The paged result is staged, then the first record write fails.
        store.fail_writes_after(1);
        let result = store
            .write_batch(
                WriteBatch::new()
                    .with_records(vec![item(3, "a"), item(4, "a")])
                    .with_paged(original.extended(vec![3, 4], 4, None)),
            )
            .await;

        assert!(matches!(result, Err(StoreError::WriteFailed { .. })));
        assert_eq!(store.paged_snapshot("q"), Some(original));
        assert_eq!(store.len(), 2);
        assert_eq!(store.sequence(), 1);

        // The fault fires once.
        store
            .apply(WriteBatch::new().with_records(vec![item(3, "a")]))
            .unwrap();
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn injected_read_failures_are_consumed() {
        let store = MemoryStore::<Item>::new();
        store.fail_next_reads(1);
        assert!(store.get(1).await.is_err());
        assert_eq!(store.get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryStore::<Item>::new();
        store.close();
        assert_eq!(store.paged("q").await, Err(StoreError::Closed));
        assert_eq!(
            store.apply(WriteBatch::new().with_records(vec![item(1, "a")])),
            Err(StoreError::Closed)
        );
    }

    #[tokio::test]
    async fn subscribers_see_commit_sequences() {
        let store = MemoryStore::new();
        let mut commits = store.subscribe();
        store
            .write_batch(WriteBatch::new().with_records(vec![item(1, "a")]))
            .await
            .unwrap();
        assert_eq!(commits.recv().await.unwrap(), 1);
    }
}
