//! A virtual hierarchical file system on top of a flat key-value store.
//!
//! ### Overview
//!
//! `kv-vfs` emulates directories and files in any store that can `get`, `set`, `remove`
//! and enumerate string keys: browser-style local storage, a map in memory, a directory of
//! files on the host. The path itself is the only identifier; every hierarchy query
//! (children, descendants) is a prefix scan over the stored keys, so there is no separate
//! tree that could drift away from what is persisted.
//!
//! **Key ideas**:
//! - **Injection**: The store is passed to [`VirtualFileSystem::new`]; implement [`KvStore`]
//!   to plug in your own.
//! - **Namespaces**: Every key is `namespace + path`, so several file systems can share one
//!   store.
//! - **Failure model**: The store is atomic per key only. Recursive delete removes children
//!   before their parent, recursive rename moves descendants before the directory, and an
//!   optional intent record lets an interrupted operation be finished on the next start.
//! - **Quota**: A write refused by the store is reported as
//!   [`VfsError::CapacityExceeded`] and as a [`VfsEvent`] to subscribers.
//!
//! ### Example
//!
//! ```
//! use kv_vfs::{MapStore, VirtualFileSystem};
//!
//! let mut fs = VirtualFileSystem::open(MapStore::new()).unwrap();
//! fs.write("/Documents/todo.txt", "buy milk", None).unwrap();
//!
//! let found = fs.search("TODO").unwrap();
//! assert_eq!(found[0].path(), "/Documents/todo.txt");
//! ```

mod config;
mod core;
mod error;
mod event;
mod store;
mod vfs;

pub use config::VfsConfig;
pub use crate::core::{KvStore, Result, StoreError, StoreResult, utils};
pub use error::{VfsError, VfsResult};
pub use event::VfsEvent;
pub use store::{DirStore, MapStore};
pub use vfs::{Entry, EntryType, MetaOverrides, Metadata, StorageUsage, VirtualFileSystem};
