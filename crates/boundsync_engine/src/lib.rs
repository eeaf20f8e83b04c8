//! # boundsync Engine
//!
//! Offline-first data access for boundsync.
//!
//! This crate provides:
//! - Network-bound resources (store first, refresh from network, re-read)
//! - The `Resource` envelope that consumers observe
//! - Per-key refetch rate limiting
//! - Incremental pagination merged into the store
//! - "Load more" coordination for paginated views
//! - HTTP response classification and `Link` header parsing
//!
//! ## Architecture
//!
//! The store is the single source of truth. A [`NetworkBoundResource`]
//! reads the store, asks its source whether to refresh, fetches with retry,
//! saves through the store and then re-reads it:
//! 1. Emit `Loading(None)`
//! 2. Read the first store value and decide
//! 3. Fetch, save, re-read (or serve the store value as is)
//! 4. Emit every store value from then on as `Success`
//!
//! ## Key Invariants
//!
//! - Fetched payloads reach consumers only through the store
//! - A lifecycle never emits after it is dropped or cancelled
//! - An `Error` envelope always carries a non-empty message
//! - Paged results grow only by concatenation, atomically with their records
//!
//! ## Example
//!
//! ```rust,ignore
//! let resource = NetworkBoundResource::new(source)
//!     .with_config(EngineConfig::new().with_retry(RetryConfig::new(3)))
//!     .named("user");
//!
//! let mut updates = resource.load();
//! while let Some(update) = updates.next().await {
//!     println!("{:?}: {:?}", update.status(), update.data());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bound;
mod clock;
mod config;
mod error;
mod http;
mod load_more;
mod pagination;
mod rate_limiter;
mod resource;

pub use bound::{BoundSource, NetworkBoundResource, ResourceReceiver, ResourceStream};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, RetryConfig, DEFAULT_RATE_WINDOW};
pub use error::{SyncError, SyncResult, GENERIC_NETWORK_ERROR};
pub use http::{ApiClient, ApiResponse, HttpClient, Links, RawResponse, SUCCESS_RANGE};
pub use load_more::{LoadMoreState, NextPageHandler};
pub use pagination::{Page, PageFetcher, PaginationMerger};
pub use rate_limiter::RateLimiter;
pub use resource::{Resource, Status};

// Store types that appear in this crate's signatures.
pub use boundsync_store::{
    Cursor, PagedResult, Record, RecordId, Store, StoreError, StoreStream, WriteBatch,
};
