//! # driftsync Store
//!
//! Persistent tables behind the sync engine: the mutation queue, the
//! dead-letter store, and a little sync metadata.
//!
//! The engine talks to storage only through the [`SyncStore`] trait. Every
//! method is a single atomic step, so an enqueue can safely interleave with
//! a running sync pass.
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral clients
//! - [`FileStore`] - Durable, journal-backed store in a directory
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use driftsync_protocol::{Fields, Operation};
//! use driftsync_store::{MemoryStore, SyncStore};
//!
//! let store = MemoryStore::new();
//! let m = store
//!     .append_mutation("task-1", Operation::Create, Fields::new(), Utc::now())
//!     .unwrap();
//! assert_eq!(m.id, 1);
//! assert!(store.remove_mutation(m.id).unwrap());
//! assert!(!store.remove_mutation(m.id).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod file;
mod memory;
mod store;
mod tables;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::SyncStore;
