//! Store trait definition and store streams.

use crate::error::StoreResult;
use crate::record::{PagedResult, Record, RecordId, WriteBatch};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::debug;

/// A stream of store reads.
///
/// Each item is one observation of the queried value; `Ok(None)` means the
/// query currently yields no value.
pub type StoreStream<T> = BoxStream<'static, StoreResult<Option<T>>>;

/// The durable local store, treated as the single source of truth.
///
/// # Invariants
///
/// - `write_batch` is atomic: every record and paged result in the batch
///   becomes visible together, or none does
/// - A commit notification is sent only after the commit is visible to readers
/// - All methods are safe to call concurrently from background tasks
///
/// # Implementors
///
/// - [`super::MemoryStore`] - In-memory store with transactional batches
#[async_trait]
pub trait Store<R: Record>: Send + Sync {
    /// Reads a single record by id.
    async fn get(&self, id: RecordId) -> StoreResult<Option<R>>;

    /// Reads the listed records in the order given.
    ///
    /// Ids that are listed more than once yield the record more than once.
    /// Ids that are not stored are skipped.
    async fn get_many(&self, ids: &[RecordId]) -> StoreResult<Vec<R>>;

    /// Reads every record matching `predicate`, in id order.
    async fn query(
        &self,
        predicate: &(dyn for<'p> Fn(&'p R) -> bool + Send + Sync),
    ) -> StoreResult<Vec<R>>;

    /// Reads the paged result set stored under `key`.
    async fn paged(&self, key: &str) -> StoreResult<Option<PagedResult>>;

    /// Applies a batch of writes atomically.
    ///
    /// Returns the commit sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if any write in the batch fails. In that case the
    /// store is left exactly as it was before the call.
    async fn write_batch(&self, batch: WriteBatch<R>) -> StoreResult<u64>;

    /// Subscribes to commit notifications.
    ///
    /// Each committed batch sends its sequence number.
    fn subscribe(&self) -> broadcast::Receiver<u64>;
}

/// Builds a stream that performs `read` once.
pub fn once<T, Fut>(read: Fut) -> StoreStream<T>
where
    T: Send + 'static,
    Fut: Future<Output = StoreResult<Option<T>>> + Send + 'static,
{
    stream::once(read).boxed()
}

/// Builds a live stream that performs `read` immediately and again after
/// every commit announced on `commits`.
///
/// Commits that arrive while a read is in progress are coalesced into a
/// single re-read. The stream ends when the store drops its commit sender.
///
/// Subscribe before building the stream so that no commit between the
/// subscription and the first read is missed:
///
/// ```rust
/// use boundsync_store::{observe, MemoryStore, Record, RecordId, Store};
/// use std::sync::Arc;
///
/// #[derive(Clone)]
/// struct Note(RecordId);
/// impl Record for Note {
///     fn id(&self) -> RecordId {
///         self.0
///     }
/// }
///
/// let store = Arc::new(MemoryStore::<Note>::new());
/// let reader = Arc::clone(&store);
/// let _notes = observe(store.subscribe(), move || {
///     let reader = Arc::clone(&reader);
///     async move { reader.get(1).await }
/// });
/// ```
pub fn observe<T, F, Fut>(commits: broadcast::Receiver<u64>, read: F) -> StoreStream<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = StoreResult<Option<T>>> + Send + 'static,
{
    let observer = Observer {
        read,
        commits,
        primed: false,
    };

    stream::unfold(observer, |mut observer| async move {
        if observer.primed && !observer.wait_for_commit().await {
            return None;
        }
        observer.primed = true;
        let value = (observer.read)().await;
        Some((value, observer))
    })
    .boxed()
}

struct Observer<F> {
    read: F,
    commits: broadcast::Receiver<u64>,
    primed: bool,
}

impl<F> Observer<F> {
    /// Waits for the next commit. Returns false once the store is gone.
    async fn wait_for_commit(&mut self) -> bool {
        match self.commits.recv().await {
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "observer lagged behind commits");
            }
            Err(RecvError::Closed) => return false,
        }

        // Coalesce commits that are already queued.
        loop {
            match self.commits.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Closed) => return true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn once_reads_a_single_value() {
        let values: Vec<_> = once(async { Ok(Some(7u32)) }).collect().await;
        assert_eq!(values, vec![Ok(Some(7))]);
    }

    #[tokio::test]
    async fn observe_rereads_after_commit_and_ends_when_closed() {
        let (tx, rx) = broadcast::channel(8);
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let reads = std::sync::Arc::clone(&counter);

        let mut stream = observe(rx, move || {
            let reads = std::sync::Arc::clone(&reads);
            async move {
                Ok(Some(
                    reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst),
                ))
            }
        });

        assert_eq!(stream.next().await, Some(Ok(Some(0))));

        // Two queued commits collapse into one re-read.
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(stream.next().await, Some(Ok(Some(1))));

        drop(tx);
        assert_eq!(stream.next().await, None);
    }
}
