//! Network-bound resource state machine.
//!
//! A [`NetworkBoundResource`] mediates between the local store and a remote
//! fetch. Each call to [`NetworkBoundResource::load`] runs one independent
//! lifecycle:
//!
//! ```text
//! Start ──► Loading(None)
//!   │
//!   ▼ first store value v
//! should_fetch(v)? ──no──► Success(v), Success(..) for each later store value
//!   │yes
//!   ▼
//! Loading(v) ──► fetch (retry transient failures)
//!   │ ok                      │ failed
//!   ▼                         ▼
//! save_result ──► re-read   on_fetch_failed, Error(msg, v)
//!   │
//!   ▼
//! Success(..) for each value of the fresh store read
//! ```
//!
//! The store stays the single source of truth: fetched payloads are never
//! emitted directly, only what the store returns after the save.

use crate::config::{EngineConfig, RetryConfig};
use crate::error::{SyncError, SyncResult};
use crate::resource::Resource;
use async_trait::async_trait;
use boundsync_store::{StoreError, StoreResult, StoreStream};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

/// An ordered stream of envelopes produced by one `load()`.
pub type ResourceStream<T> = BoxStream<'static, Resource<T>>;

/// The capabilities a [`NetworkBoundResource`] is built from.
///
/// `Local` is what the store holds and consumers see; `Remote` is what the
/// network returns. A read that yields no value is `None`, not an error.
#[async_trait]
pub trait BoundSource: Send + Sync + 'static {
    /// Value read from the store.
    type Local: Clone + Send + Sync + 'static;
    /// Payload returned by the network.
    type Remote: Send + 'static;

    /// Opens a read of the store. Called once for the fetch decision and
    /// again, fresh, after a successful save.
    fn load_from_store(&self) -> StoreStream<Self::Local>;

    /// Decides whether to refresh, given the first value read from the store.
    fn should_fetch(&self, data: Option<&Self::Local>) -> bool;

    /// Performs one network request.
    async fn fetch_from_network(&self) -> SyncResult<Self::Remote>;

    /// Writes a fetched payload to the store. Completes before the store is
    /// read again.
    async fn save_result(&self, item: Self::Remote) -> SyncResult<()>;

    /// Notified once when the fetch has finally failed. Must not panic.
    fn on_fetch_failed(&self, _error: &SyncError) {}
}

/// A resource backed by both the local store and the network.
///
/// # Example
///
/// ```rust,ignore
/// let resource = NetworkBoundResource::new(UserSource::new(store, api, "octocat"));
/// let mut updates = resource.load();
/// while let Some(update) = updates.next().await {
///     render(update);
/// }
/// ```
pub struct NetworkBoundResource<S: BoundSource> {
    source: Arc<S>,
    config: EngineConfig,
    cancel: CancellationToken,
    label: Arc<str>,
}

impl<S: BoundSource> NetworkBoundResource<S> {
    /// Creates a resource with the default configuration.
    pub fn new(source: S) -> Self {
        Self::from_arc(Arc::new(source))
    }

    /// Creates a resource around a shared source.
    pub fn from_arc(source: Arc<S>) -> Self {
        Self {
            source,
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
            label: Arc::from("resource"),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Ties every load to `token`: cancelling it stops all of them.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sets the name used in log events.
    #[must_use]
    pub fn named(mut self, label: impl AsRef<str>) -> Self {
        self.label = Arc::from(label.as_ref());
        self
    }

    /// Returns the source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Starts a new lifecycle and returns its envelopes.
    ///
    /// Nothing happens until the stream is polled. Dropping the stream
    /// abandons the lifecycle: no further envelope is produced and a pending
    /// save is never applied.
    pub fn load(&self) -> ResourceStream<S::Local> {
        self.load_with(self.cancel.child_token())
    }

    /// Starts a new lifecycle on a background task.
    ///
    /// Store reads, fetches and saves run on the task; envelopes are delivered
    /// in order to the returned receiver. Dropping the receiver cancels the
    /// task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(&self) -> ResourceReceiver<S::Local> {
        let token = self.cancel.child_token();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let mut updates = self.load_with(token.clone());

        tokio::spawn(async move {
            while let Some(update) = updates.next().await {
                if tx.send(update).await.is_err() {
                    break;
                }
            }
        });

        ResourceReceiver {
            inner: ReceiverStream::new(rx),
            _guard: token.drop_guard(),
        }
    }

    fn load_with(&self, cancel: CancellationToken) -> ResourceStream<S::Local> {
        let machine = Machine {
            ctx: Context {
                source: Arc::clone(&self.source),
                retry: self.config.retry.clone(),
                fetch_timeout: self.config.fetch_timeout,
                cancel,
                label: Arc::clone(&self.label),
            },
            phase: Phase::Start,
            last: None,
        };

        stream::unfold(machine, |mut machine| async move {
            let update = machine.step().await?;
            Some((update, machine))
        })
        .boxed()
    }
}

/// Receiving half of a spawned load.
///
/// Dropping it cancels the background task.
pub struct ResourceReceiver<T> {
    inner: ReceiverStream<Resource<T>>,
    _guard: DropGuard,
}

impl<T> ResourceReceiver<T> {
    /// Receives the next envelope, or `None` once the lifecycle has ended.
    pub async fn recv(&mut self) -> Option<Resource<T>> {
        self.inner.next().await
    }
}

impl<T> Stream for ResourceReceiver<T> {
    type Item = Resource<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Immutable part of one lifecycle.
struct Context<S: BoundSource> {
    source: Arc<S>,
    retry: RetryConfig,
    fetch_timeout: Option<Duration>,
    cancel: CancellationToken,
    label: Arc<str>,
}

impl<S: BoundSource> Context<S> {
    /// Fetches with retries. Returns [`SyncError::Cancelled`] if the lifecycle
    /// was cancelled while waiting.
    async fn fetch_with_retry(&self) -> SyncResult<S::Remote> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                result = self.fetch_once() => result,
            };

            match result {
                Ok(item) => {
                    debug!(resource = %self.label, attempt, "fetch succeeded");
                    return Ok(item);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    debug!(resource = %self.label, attempt, error = %e, "fetch failed, retrying");
                }
                Err(e) if e.is_retryable() && max_attempts > 1 => {
                    return Err(SyncError::ExhaustedRetries {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self) -> SyncResult<S::Remote> {
        match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.source.fetch_from_network())
                .await
                .unwrap_or(Err(SyncError::Timeout)),
            None => self.source.fetch_from_network().await,
        }
    }

    /// Waits for the next store value unless the lifecycle is cancelled.
    async fn next_from_store(
        &self,
        stream: &mut StoreStream<S::Local>,
    ) -> Option<Option<StoreResult<Option<S::Local>>>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            next = stream.next() => Some(next),
        }
    }
}

enum Phase<T> {
    /// Nothing emitted yet.
    Start,
    /// Waiting for the first store value.
    Deciding(StoreStream<T>),
    /// Fetch decided; the first store read has been dropped.
    Fetching,
    /// Forwarding store values as successes.
    Tracking(StoreStream<T>),
    Done,
}

struct Machine<S: BoundSource> {
    ctx: Context<S>,
    phase: Phase<S::Local>,
    /// Most recent value read from the store.
    last: Option<S::Local>,
}

impl<S: BoundSource> Machine<S> {
    /// Advances to the next envelope. `None` ends the lifecycle.
    async fn step(&mut self) -> Option<Resource<S::Local>> {
        loop {
            if self.ctx.cancel.is_cancelled() {
                self.phase = Phase::Done;
                return None;
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Start => {
                    self.phase = Phase::Deciding(self.ctx.source.load_from_store());
                    return Some(Resource::loading(None));
                }

                Phase::Deciding(mut stream) => match self.ctx.next_from_store(&mut stream).await? {
                    None => {
                        debug!(resource = %self.ctx.label, "store read ended without a value");
                        return None;
                    }
                    Some(Err(e)) => return Some(self.store_failure(e)),
                    Some(Ok(value)) => {
                        self.last = value.clone();
                        if self.ctx.source.should_fetch(value.as_ref()) {
                            debug!(resource = %self.ctx.label, "refreshing from network");
                            self.phase = Phase::Fetching;
                            return Some(Resource::loading(value));
                        }
                        debug!(resource = %self.ctx.label, "serving from store");
                        self.phase = Phase::Tracking(stream);
                        return Some(Resource::success(value));
                    }
                },

                Phase::Fetching => {
                    let item = match self.ctx.fetch_with_retry().await {
                        Ok(item) => item,
                        Err(SyncError::Cancelled) => return None,
                        Err(e) => {
                            warn!(resource = %self.ctx.label, error = %e, "fetch failed");
                            self.ctx.source.on_fetch_failed(&e);
                            return Some(Resource::error(e.user_message(), self.last.clone()));
                        }
                    };

                    // Abandoned lifecycles never write.
                    if self.ctx.cancel.is_cancelled() {
                        return None;
                    }
                    if let Err(e) = self.ctx.source.save_result(item).await {
                        warn!(resource = %self.ctx.label, error = %e, "saving fetched data failed");
                        return Some(Resource::error(e.user_message(), self.last.clone()));
                    }

                    self.phase = Phase::Tracking(self.ctx.source.load_from_store());
                }

                Phase::Tracking(mut stream) => match self.ctx.next_from_store(&mut stream).await? {
                    None => return None,
                    Some(Err(e)) => return Some(self.store_failure(e)),
                    Some(Ok(value)) => {
                        self.last = value.clone();
                        self.phase = Phase::Tracking(stream);
                        return Some(Resource::success(value));
                    }
                },

                Phase::Done => return None,
            }
        }
    }

    fn store_failure(&mut self, error: StoreError) -> Resource<S::Local> {
        let error = SyncError::from(error);
        warn!(resource = %self.ctx.label, error = %error, "store read failed");
        Resource::error(error.user_message(), self.last.clone())
    }
}
