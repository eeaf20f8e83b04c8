//! # boundsync Testkit
//!
//! Test utilities for boundsync.
//!
//! This crate provides:
//! - A sample record type and seeded in-memory stores
//! - Scripted fetchers and HTTP clients that count their calls
//! - Property-based test generators using proptest
//! - Stream collection helpers with a timeout
//! - Stress testing utilities for the concurrent components
//! - A `tracing` subscriber for test output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use boundsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_store() {
//!     init_tracing();
//!     let store = seeded_store("rust", &[1, 2], Some(2));
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;
pub mod streams;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::mocks::*;
    pub use crate::streams::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use mocks::*;
pub use streams::*;
pub use stress::*;
