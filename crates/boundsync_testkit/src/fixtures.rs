//! Test fixtures and store helpers.
//!
//! Provides a sample record type shaped like a hosted repository and
//! convenience functions for seeding in-memory stores.

use boundsync_engine::Page;
use boundsync_store::{Cursor, MemoryStore, PagedResult, Record, RecordId, WriteBatch};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Once};

/// A sample record: a hosted source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    /// Remote id.
    pub id: RecordId,
    /// Repository name.
    pub name: String,
    /// Owner login.
    pub owner: String,
    /// Star count.
    pub stars: u32,
}

impl Record for Repo {
    fn id(&self) -> RecordId {
        self.id
    }
}

/// Creates a repo with predictable fields derived from `id`.
pub fn repo(id: RecordId) -> Repo {
    Repo {
        id,
        name: format!("repo-{}", id),
        owner: "octocat".to_string(),
        stars: (id % 1_000) as u32 * 10,
    }
}

/// Creates one repo per id, in order.
pub fn repos(ids: &[RecordId]) -> Vec<Repo> {
    ids.iter().copied().map(repo).collect()
}

/// Creates a page of repos. `next` is the number of the following page.
pub fn page(ids: &[RecordId], total: u64, next: Option<u32>) -> Page<Repo> {
    Page::new(repos(ids), total, next.map(Cursor::page))
}

/// Creates a store holding `ids` as the first page of `key`.
pub fn seeded_store(key: &str, ids: &[RecordId], next: Option<u32>) -> Arc<MemoryStore<Repo>> {
    let store = Arc::new(MemoryStore::new());
    store
        .apply(page(ids, ids.len() as u64, next).into_write_batch(key))
        .expect("Failed to seed store");
    store
}

/// Creates a store holding `ids` as plain records, with no paged result.
pub fn store_with_repos(ids: &[RecordId]) -> Arc<MemoryStore<Repo>> {
    let store = Arc::new(MemoryStore::new());
    store
        .apply(WriteBatch::new().with_records(repos(ids)))
        .expect("Failed to seed store");
    store
}

/// Initializes a `tracing` subscriber for tests.
///
/// Honors `RUST_LOG`, defaults to `warn`, and writes through the test
/// harness so output is captured per test. Safe to call repeatedly.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store with `pages` search results of `per_page` repos each
    /// already merged under `key`, with a cursor to page `pages + 1`.
    pub fn partially_paged_store(
        key: &str,
        pages: u32,
        per_page: u64,
    ) -> Arc<MemoryStore<Repo>> {
        let ids: Vec<RecordId> = (1..=u64::from(pages) * per_page).collect();
        let store = Arc::new(MemoryStore::new());
        let paged = PagedResult::new(key, ids.clone(), ids.len() as u64 * 2, Some(Cursor::page(pages + 1)));
        store
            .apply(WriteBatch::new().with_paged(paged).with_records(repos(&ids)))
            .expect("Failed to seed store");
        store
    }
}
