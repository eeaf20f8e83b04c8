//! Scripted stand-ins for the network side.
//!
//! Each mock replays a queue of outcomes and counts how often it was asked,
//! so tests can assert both what was emitted and how much network traffic
//! it took.

use async_trait::async_trait;
use boundsync_engine::{HttpClient, Page, PageFetcher, RawResponse, SyncError, SyncResult};
use boundsync_store::{Cursor, Record};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Message returned when a mock runs out of scripted outcomes.
pub const UNSCRIPTED: &str = "no response scripted";

/// Replays a queue of fetch outcomes.
#[derive(Debug)]
pub struct ScriptedFetcher<T> {
    responses: Mutex<VecDeque<SyncResult<T>>>,
    calls: AtomicUsize,
}

impl<T> ScriptedFetcher<T> {
    /// Creates a fetcher that returns `responses` in order.
    pub fn new(responses: Vec<SyncResult<T>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Appends an outcome.
    pub fn push(&self, response: SyncResult<T>) {
        self.responses.lock().push_back(response);
    }

    /// Returns the next outcome. Runs out with a transient error.
    pub async fn fetch(&self) -> SyncResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::transient(UNSCRIPTED)))
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Replays a queue of pages and records the cursors it was asked for.
pub struct ScriptedPageFetcher<R> {
    pages: Mutex<VecDeque<SyncResult<Page<R>>>>,
    requested: Mutex<Vec<(String, Cursor)>>,
    gate: Option<Arc<Notify>>,
}

impl<R> ScriptedPageFetcher<R> {
    /// Creates a fetcher that returns `pages` in order.
    pub fn new(pages: Vec<SyncResult<Page<R>>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            requested: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Makes every fetch wait for a permit on `gate` before answering.
    #[must_use]
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Appends a page outcome.
    pub fn push(&self, page: SyncResult<Page<R>>) {
        self.pages.lock().push_back(page);
    }

    /// The `(key, cursor)` pairs requested so far.
    pub fn requested(&self) -> Vec<(String, Cursor)> {
        self.requested.lock().clone()
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.requested.lock().len()
    }
}

#[async_trait]
impl<R: Record> PageFetcher for ScriptedPageFetcher<R> {
    type Item = R;

    async fn fetch_page(&self, key: &str, cursor: &Cursor) -> SyncResult<Page<R>> {
        self.requested.lock().push((key.to_string(), cursor.clone()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::transient(UNSCRIPTED)))
    }
}

/// An [`HttpClient`] that replays raw responses and records requested URLs.
#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<SyncResult<RawResponse>>>,
    urls: Mutex<Vec<String>>,
}

impl ScriptedHttpClient {
    /// Creates a client that returns `responses` in order.
    pub fn new(responses: Vec<SyncResult<RawResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Appends a response.
    pub fn push(&self, response: SyncResult<RawResponse>) {
        self.responses.lock().push_back(response);
    }

    /// URLs requested so far.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn get(&self, url: &str) -> SyncResult<RawResponse> {
        self.urls.lock().push(url.to_string());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::transient(UNSCRIPTED)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{page, Repo};

    #[tokio::test]
    async fn test_fetcher_replays_then_runs_out() {
        let fetcher = ScriptedFetcher::new(vec![Ok(1u32), Err(SyncError::Timeout)]);
        assert_eq!(fetcher.fetch().await, Ok(1));
        assert_eq!(fetcher.fetch().await, Err(SyncError::Timeout));
        assert_eq!(fetcher.fetch().await, Err(SyncError::transient(UNSCRIPTED)));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_page_fetcher_records_cursors() {
        let fetcher = ScriptedPageFetcher::<Repo>::new(vec![Ok(page(&[3], 3, None))]);
        let fetched = fetcher.fetch_page("rust", &Cursor::page(2)).await.unwrap();
        assert_eq!(fetched.member_ids(), vec![3]);
        assert_eq!(fetcher.requested(), vec![("rust".to_string(), Cursor::page(2))]);
    }

    #[tokio::test]
    async fn test_http_client_records_urls() {
        let client = ScriptedHttpClient::new(vec![Ok(RawResponse::new(200, "{}"))]);
        let response = client.get("https://api.test/users/octocat").await.unwrap();
        assert!(response.is_successful());
        assert_eq!(client.urls(), vec!["https://api.test/users/octocat"]);
    }
}
