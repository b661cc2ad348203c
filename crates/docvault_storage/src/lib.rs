//! # DocVault Storage
//!
//! Filesystem abstraction and implementations for DocVault.
//!
//! This crate provides the lowest-level storage seam for DocVault.
//! Filesystems here are **opaque byte stores keyed by path** - they do not
//! know about transactions, backups or checksums.
//!
//! ## Design Principles
//!
//! - A filesystem exposes whole-file reads, synced writes, rename and removal
//! - `rename` is the only publishing primitive and must be atomic
//! - Must be `Send + Sync` for concurrent access
//! - DocVault owns staging, verification and rollback
//!
//! ## Available Filesystems
//!
//! - [`OsFs`] - The real filesystem through `std::fs`
//! - [`InMemoryFs`] - For testing and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use docvault_storage::{DocumentFs, InMemoryFs};
//! use std::path::Path;
//!
//! let fs = InMemoryFs::new();
//! fs.create_dir_all(Path::new("/root")).unwrap();
//! fs.write_synced(Path::new("/root/a.tmp"), b"hello world").unwrap();
//! fs.rename(Path::new("/root/a.tmp"), Path::new("/root/a.md")).unwrap();
//! assert_eq!(fs.read(Path::new("/root/a.md")).unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod fs;
mod memory;
mod os;

pub use error::{StorageError, StorageResult};
pub use fs::DocumentFs;
pub use memory::InMemoryFs;
pub use os::OsFs;
