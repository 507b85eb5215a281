//! # driftsync Protocol
//!
//! Data model and wire types shared by the driftsync client engine, its
//! stores and the reference remote authority.
//!
//! This crate provides:
//! - [`QueuedMutation`] and [`DeadLetterEntry`], the rows of the durable queue
//! - [`EntityRecord`] and [`RemoteState`] for conflict resolution
//! - Batch messages ([`BatchRequest`], [`BatchResponse`], [`ItemOutcome`])
//! - The batch transport checksum
//! - CBOR encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod entity;
mod error;
mod messages;
mod mutation;

pub use checksum::{batch_checksum, fnv1a64, CHECKSUM_HEADER};
pub use entity::{EntityRecord, RemoteState, SyncStatus};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode_cbor, encode_cbor, BatchRequest, BatchResponse, ItemOutcome, NO_RESPONSE_REASON,
};
pub use mutation::{DeadLetterEntry, Fields, Operation, QueuedMutation};

/// Entity id used for pass-level errors that are not tied to one entity.
pub const GLOBAL_ENTITY: &str = "global";
