//! Incremental merge of remote pages into a stored paged result.

use crate::error::{SyncError, SyncResult};
use crate::resource::Resource;
use async_trait::async_trait;
use boundsync_store::{Cursor, PagedResult, Record, RecordId, Store, WriteBatch};
use std::sync::Arc;
use tracing::{debug, warn};

/// One page of remote results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    /// Records on this page, in remote order.
    pub items: Vec<R>,
    /// Total number of results reported by the remote side.
    pub total: u64,
    /// Cursor of the following page, if any.
    pub next: Option<Cursor>,
}

impl<R: Record> Page<R> {
    /// Creates a page.
    pub fn new(items: Vec<R>, total: u64, next: Option<Cursor>) -> Self {
        Self { items, total, next }
    }

    /// Ids of the records on this page, in order.
    pub fn member_ids(&self) -> Vec<RecordId> {
        self.items.iter().map(Record::id).collect()
    }

    /// Builds the paged result for a key whose first page this is.
    pub fn first_result(&self, key: impl Into<String>) -> PagedResult {
        PagedResult::new(key, self.member_ids(), self.total, self.next.clone())
    }

    /// Builds the batch that stores this page as the first page of `key`,
    /// replacing any previous result set for the key.
    pub fn into_write_batch(self, key: impl Into<String>) -> WriteBatch<R> {
        let paged = self.first_result(key);
        WriteBatch::new().with_paged(paged).with_records(self.items)
    }
}

/// Remote source of pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Record type on the pages.
    type Item: Record;

    /// Fetches the page of `key` that starts at `cursor`.
    async fn fetch_page(&self, key: &str, cursor: &Cursor) -> SyncResult<Page<Self::Item>>;
}

/// Extends a stored [`PagedResult`] with the next remote page.
///
/// # Invariants
///
/// - Member ids grow only by concatenation, in fetch order
/// - The merged result and the page's records are written in one batch
/// - A failed fetch or write leaves the stored result untouched, so a retry
///   requests the same page again
pub struct PaginationMerger<S: ?Sized, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
}

impl<S, F> PaginationMerger<S, F>
where
    S: Store<F::Item> + ?Sized,
    F: PageFetcher,
{
    /// Creates a merger over `store` and `fetcher`.
    pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
        Self { store, fetcher }
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fetches and merges the next page of `key`.
    ///
    /// Returns:
    /// - `None` if nothing is stored under `key` (there is nothing to page from)
    /// - `Success(false)` without any network access if the stored cursor is absent
    /// - `Success(has_more)` after a successful merge
    /// - `Error(message, false)` if reading, fetching or writing failed
    pub async fn fetch_next_page(&self, key: &str) -> Option<Resource<bool>> {
        let current = match self.store.paged(key).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                debug!(key, "no paged result stored");
                return None;
            }
            Err(e) => return Some(failure(key, SyncError::from(e))),
        };

        let Some(cursor) = current.next.clone() else {
            debug!(key, "paged result has no next cursor");
            return Some(Resource::success(Some(false)));
        };

        let page = match self.fetcher.fetch_page(key, &cursor).await {
            Ok(page) => page,
            Err(e) => return Some(failure(key, e)),
        };

        let has_more = page.next.is_some();
        let fetched = page.items.len();
        let merged = current.extended(page.member_ids(), page.total, page.next);
        let batch = WriteBatch::new().with_paged(merged).with_records(page.items);

        match self.store.write_batch(batch).await {
            Ok(sequence) => {
                debug!(key, %cursor, fetched, has_more, sequence, "merged next page");
                Some(Resource::success(Some(has_more)))
            }
            Err(e) => Some(failure(key, SyncError::from(e))),
        }
    }
}

fn failure(key: &str, error: SyncError) -> Resource<bool> {
    warn!(key, error = %error, "fetching next page failed");
    Resource::error(error.user_message(), Some(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundsync_store::MemoryStore;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    struct Repo(RecordId);

    impl Record for Repo {
        fn id(&self) -> RecordId {
            self.0
        }
    }

    #[derive(Default)]
    struct ScriptedPages {
        pages: Mutex<VecDeque<SyncResult<Page<Repo>>>>,
        requested: Mutex<Vec<Cursor>>,
    }

    impl ScriptedPages {
        fn new(pages: Vec<SyncResult<Page<Repo>>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedPages {
        type Item = Repo;

        async fn fetch_page(&self, _key: &str, cursor: &Cursor) -> SyncResult<Page<Repo>> {
            self.requested.lock().push(cursor.clone());
            self.pages
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(SyncError::transient("no page scripted")))
        }
    }

    fn repos(ids: &[RecordId]) -> Vec<Repo> {
        ids.iter().copied().map(Repo).collect()
    }

    fn seeded(ids: &[RecordId], next: Option<Cursor>) -> Arc<MemoryStore<Repo>> {
        let store = Arc::new(MemoryStore::new());
        store
            .apply(Page::new(repos(ids), 10, next).into_write_batch("rust"))
            .unwrap();
        store
    }

    #[test]
    fn first_page_batch() {
        let batch = Page::new(repos(&[4, 5]), 9, Some(Cursor::page(2))).into_write_batch("q");
        assert_eq!(batch.paged, vec![PagedResult::new("q", vec![4, 5], 9, Some(Cursor::page(2)))]);
        assert_eq!(batch.records, repos(&[4, 5]));
    }

    #[tokio::test]
    async fn nothing_stored_yields_nothing() {
        let merger = PaginationMerger::new(
            Arc::new(MemoryStore::<Repo>::new()),
            Arc::new(ScriptedPages::default()),
        );
        assert_eq!(merger.fetch_next_page("rust").await, None);
    }

    #[tokio::test]
    async fn missing_cursor_skips_network() {
        let fetcher = Arc::new(ScriptedPages::default());
        let merger = PaginationMerger::new(seeded(&[1], None), Arc::clone(&fetcher));

        assert_eq!(
            merger.fetch_next_page("rust").await,
            Some(Resource::success(Some(false)))
        );
        assert!(fetcher.requested.lock().is_empty());
    }

    #[tokio::test]
    async fn merge_appends_ids_and_records() {
        let store = seeded(&[1, 2], Some(Cursor::page(2)));
        let fetcher = Arc::new(ScriptedPages::new(vec![Ok(Page::new(
            repos(&[3, 4]),
            12,
            Some(Cursor::page(3)),
        ))]));
        let merger = PaginationMerger::new(Arc::clone(&store), Arc::clone(&fetcher));

        assert_eq!(
            merger.fetch_next_page("rust").await,
            Some(Resource::success(Some(true)))
        );

        let stored = store.paged_snapshot("rust").unwrap();
        assert_eq!(stored.member_ids, vec![1, 2, 3, 4]);
        assert_eq!(stored.total, 12);
        assert_eq!(stored.next, Some(Cursor::page(3)));
        assert_eq!(store.record_snapshot(4), Some(Repo(4)));
        assert_eq!(*fetcher.requested.lock(), vec![Cursor::page(2)]);
    }

    #[tokio::test]
    async fn empty_last_page_is_success() {
        let store = seeded(&[1], Some(Cursor::page(2)));
        let merger = PaginationMerger::new(
            Arc::clone(&store),
            Arc::new(ScriptedPages::new(vec![Ok(Page::new(vec![], 1, None))])),
        );

        assert_eq!(
            merger.fetch_next_page("rust").await,
            Some(Resource::success(Some(false)))
        );
        assert_eq!(store.paged_snapshot("rust").unwrap().member_ids, vec![1]);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_cursor_for_retry() {
        let store = seeded(&[1], Some(Cursor::page(2)));
        let fetcher = Arc::new(ScriptedPages::new(vec![
            Err(SyncError::application(503, "Service Unavailable")),
            Ok(Page::new(repos(&[2]), 2, None)),
        ]));
        let merger = PaginationMerger::new(Arc::clone(&store), Arc::clone(&fetcher));

        assert_eq!(
            merger.fetch_next_page("rust").await,
            Some(Resource::error("Service Unavailable", Some(false)))
        );
        assert_eq!(store.paged_snapshot("rust").unwrap().next, Some(Cursor::page(2)));

        assert_eq!(
            merger.fetch_next_page("rust").await,
            Some(Resource::success(Some(false)))
        );
        assert_eq!(
            *fetcher.requested.lock(),
            vec![Cursor::page(2), Cursor::page(2)]
        );
    }

    #[tokio::test]
    async fn works_through_a_store_trait_object() {
        let store: Arc<dyn Store<Repo>> = seeded(&[1], None);
        let merger = PaginationMerger::new(store, Arc::new(ScriptedPages::default()));
        assert_eq!(
            merger.fetch_next_page("rust").await,
            Some(Resource::success(Some(false)))
        );
    }
}
