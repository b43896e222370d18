//! # CareLog Store
//!
//! Durable local record store with transactional change tracking.
//!
//! This crate provides:
//! - `RecordStore` for keyed record storage
//! - Change-log appends atomic with every record mutation
//! - Per-type download watermarks and the last-sync timestamp
//! - CBOR snapshot persistence
//!
//! The store is the only component allowed to mutate persisted records; every
//! create, update and delete records its corresponding local change in the
//! same critical section, so a sync run never observes one without the other.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod snapshot;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::RecordStore;
