//! "Load more" coordination on top of [`PaginationMerger`].

use crate::pagination::{PageFetcher, PaginationMerger};
use crate::resource::{Resource, Status};
use boundsync_store::Store;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Observable state of a [`NextPageHandler`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadMoreState {
    running: bool,
    error_message: Option<String>,
}

impl LoadMoreState {
    fn idle() -> Self {
        Self::default()
    }

    fn running() -> Self {
        Self {
            running: true,
            error_message: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            running: false,
            error_message: Some(message),
        }
    }

    /// Returns true while a next-page request is in flight.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Returns the error of the last request, if it failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[derive(Debug)]
struct Progress {
    key: Option<String>,
    in_flight: bool,
    has_more: bool,
    error_taken: bool,
}

impl Progress {
    fn fresh() -> Self {
        Self {
            key: None,
            in_flight: false,
            has_more: true,
            error_taken: false,
        }
    }
}

/// Serializes next-page requests for a paginated view.
///
/// At most one request runs per key. Requests are ignored while one for the
/// same key is in flight, or once the key is known to have no more pages.
/// A failed request keeps `has_more` set so the user can try again.
///
/// State changes are published on a [`watch`] channel; see [`subscribe`].
///
/// [`subscribe`]: NextPageHandler::subscribe
pub struct NextPageHandler<S: ?Sized, F> {
    merger: PaginationMerger<S, F>,
    progress: Mutex<Progress>,
    state: watch::Sender<LoadMoreState>,
}

impl<S, F> NextPageHandler<S, F>
where
    S: Store<F::Item> + ?Sized,
    F: PageFetcher,
{
    /// Creates a handler over `store` and `fetcher`.
    pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
        Self::with_merger(PaginationMerger::new(store, fetcher))
    }

    /// Creates a handler around an existing merger.
    pub fn with_merger(merger: PaginationMerger<S, F>) -> Self {
        let (state, _) = watch::channel(LoadMoreState::idle());
        Self {
            merger,
            progress: Mutex::new(Progress::fresh()),
            state,
        }
    }

    /// Subscribes to state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<LoadMoreState> {
        self.state.subscribe()
    }

    /// Returns the current state.
    pub fn state(&self) -> LoadMoreState {
        self.state.borrow().clone()
    }

    /// Returns true unless the last completed request reported the end.
    pub fn has_more(&self) -> bool {
        self.progress.lock().has_more
    }

    /// Returns the current error message the first time it is asked for,
    /// `None` afterwards until a new error is published.
    pub fn take_error(&self) -> Option<String> {
        let mut progress = self.progress.lock();
        if progress.error_taken {
            return None;
        }
        let message = self.state.borrow().error_message.clone();
        if message.is_some() {
            progress.error_taken = true;
        }
        message
    }

    /// Requests the next page of `key`.
    ///
    /// Returns the outcome, or `None` if the request was ignored or nothing
    /// is stored under `key`.
    pub async fn query_next_page(&self, key: &str) -> Option<Resource<bool>> {
        {
            let mut progress = self.progress.lock();
            if progress.key.as_deref() != Some(key) {
                *progress = Progress {
                    key: Some(key.to_string()),
                    ..Progress::fresh()
                };
            } else if progress.in_flight {
                trace!(key, "next page already loading");
                return None;
            } else if !progress.has_more {
                trace!(key, "no more pages");
                return None;
            }
            progress.in_flight = true;
            progress.error_taken = false;
            self.state.send_replace(LoadMoreState::running());
        }

        let outcome = self.merger.fetch_next_page(key).await;

        let mut progress = self.progress.lock();
        if progress.key.as_deref() != Some(key) || !progress.in_flight {
            debug!(key, "discarding next page outcome after reset");
            return outcome;
        }
        progress.in_flight = false;

        let next = match &outcome {
            None => {
                progress.has_more = true;
                LoadMoreState::idle()
            }
            Some(resource) => match resource.status() {
                Status::Error => {
                    progress.has_more = true;
                    LoadMoreState::failed(
                        resource.message().unwrap_or_default().to_string(),
                    )
                }
                _ => {
                    progress.has_more = resource.data().copied().unwrap_or(false);
                    LoadMoreState::idle()
                }
            },
        };
        self.state.send_replace(next);
        outcome
    }

    /// Forgets the current key and any in-flight request, as when the user
    /// starts a new query.
    pub fn reset(&self) {
        *self.progress.lock() = Progress::fresh();
        self.state.send_replace(LoadMoreState::idle());
    }
}
