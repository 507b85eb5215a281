//! # driftsync Engine
//!
//! Offline-first synchronization for a client and one remote authority.
//!
//! This crate provides:
//! - The durable mutation queue and dead-letter store
//! - Chronological, checksum-stamped batching
//! - Connectivity probing
//! - The sync pass state machine
//! - Last-write-wins conflict resolution
//! - Retry and escalation policy
//! - HTTP transport abstraction
//!
//! ## Sync pass
//!
//! 1. Probe the remote authority; stop early if it is unreachable
//! 2. Drain eligible mutations, grouped by entity in creation order
//! 3. Split them into batches
//! 4. Submit batches one at a time
//! 5. Apply each outcome: success removes the mutation, a conflict is
//!    resolved and removes it, an error consumes one retry or escalates
//!
//! ## Key Invariants
//!
//! - Mutations for one entity are dispatched in creation order
//! - At most one pass runs at a time
//! - Each store transition is a single atomic operation
//! - Dead-lettered mutations are never retried automatically
//!
//! ## Example
//!
//! ```rust
//! use driftsync_engine::{MemoryEntityService, MockTransport, SyncConfig, SyncEngine};
//! use driftsync_protocol::{Fields, Operation};
//! use driftsync_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let engine = SyncEngine::new(
//!     SyncConfig::new("https://sync.example.com"),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MockTransport::new()),
//!     Arc::new(MemoryEntityService::new()),
//! )
//! .unwrap();
//!
//! engine.enqueue("task-1", Operation::Create, Fields::new()).unwrap();
//! let result = engine.run_sync_pass().unwrap();
//! assert!(result.success);
//! assert_eq!(result.synced_items, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod batcher;
mod config;
mod dead_letter;
mod entity;
mod error;
mod http;
mod prober;
mod queue;
mod report;
mod resolver;
mod retry;
mod state;
mod transport;

pub use batcher::{make_batches, Batch};
pub use config::{BackoffConfig, SyncConfig};
pub use dead_letter::DeadLetterStore;
pub use entity::{EntityService, MemoryEntityService};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer, CBOR_CONTENT_TYPE,
};
pub use prober::{ConnectivityProber, Reachability};
pub use queue::MutationQueue;
pub use report::{PassError, PassErrorKind, SyncPassResult, SyncStats, SyncStatusReport};
pub use resolver::{ConflictResolver, Resolution, Winner};
pub use retry::{RetryDecision, RetryPolicy};
pub use state::{SyncEngine, SyncState};
pub use transport::{MockTransport, SyncTransport};
