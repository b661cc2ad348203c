//! # DocVault Testkit
//!
//! Test utilities for DocVault.
//!
//! This crate provides:
//! - Store fixtures on disk, in memory and on a fault-injecting filesystem
//! - A filesystem wrapper that fails or corrupts chosen operations
//! - Property-based test generators using proptest
//! - Concurrent save helpers for contention tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docvault_testkit::prelude::*;
//!
//! #[test]
//! fn saves_survive_a_failed_rename() {
//!     let store = TestStore::faulty();
//!     store.save("doc.md", b"v1".to_vec(), Metadata::new()).unwrap();
//!
//!     store.faults().inject(FaultRule::new(FaultOp::Rename).on_path("doc.md").once());
//!     assert!(store.save("doc.md", b"v2".to_vec(), Metadata::new()).is_err());
//!     assert_eq!(store.read("doc.md").unwrap(), b"v1");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fault;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fault::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::init_test_tracing;
    pub use docvault_core::{DocumentInput, DocumentManager, Metadata};
}

pub use fault::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;

/// Installs a tracing subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
