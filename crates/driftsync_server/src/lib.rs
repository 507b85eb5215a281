//! # driftsync Server
//!
//! Reference remote authority for driftsync clients.
//!
//! This crate provides:
//! - The batch endpoint (`POST /sync/batch`) and health endpoint (`GET /health`)
//! - Batch checksum verification
//! - Per-mutation conflict detection against the stored version
//! - Remote identifier assignment
//!
//! # Protocol
//!
//! A client submits a CBOR-encoded batch of mutations with the batch
//! checksum repeated in the `X-Batch-Checksum` header. The server verifies
//! the checksum, then applies mutations in request order:
//! 1. A mutation older than the stored version of its entity is answered
//!    with a conflict carrying the stored state
//! 2. Otherwise it is applied and answered with the entity's remote id
//! 3. Updates to unknown entities are answered with an error
//!
//! Outcomes are returned in the same order as the submitted mutations.
//! Re-submitting a mutation already answered replays the first outcome.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod authority;
mod config;
mod error;
mod handler;
mod server;

pub use authority::Authority;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::BatchHandler;
pub use server::{Reply, SyncServer, BATCH_PATH, HEALTH_PATH};
