//! # boundsync Store
//!
//! Local store interface and implementations for boundsync.
//!
//! The store is the **single source of truth** for what consumers are shown.
//! The sync engine never hands network payloads to consumers directly; it
//! saves them through the store and re-reads.
//!
//! ## Design Principles
//!
//! - Records are opaque apart from their id
//! - Batch writes are atomic; readers never see half-applied batches
//! - Every commit is announced so live readers can re-read
//! - Stores must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral caches
//!
//! ## Example
//!
//! ```rust
//! use boundsync_store::{MemoryStore, PagedResult, Record, RecordId, WriteBatch};
//!
//! #[derive(Clone)]
//! struct Repo(RecordId);
//! impl Record for Repo {
//!     fn id(&self) -> RecordId {
//!         self.0
//!     }
//! }
//!
//! let store = MemoryStore::new();
//! store
//!     .apply(WriteBatch::new().with_paged(PagedResult::new("rust", vec![1], 1, None)))
//!     .unwrap();
//! assert!(!store.paged_snapshot("rust").unwrap().has_more());
//! # let _: &MemoryStore<Repo> = &store;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use record::{Cursor, PagedResult, Record, RecordId, WriteBatch};
pub use store::{observe, once, Store, StoreStream};
