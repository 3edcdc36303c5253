//! The Meridian metadata store (spec §4.1, component C2).
//!
//! A single logical key-value namespace with ordered prefix scans and
//! atomic batches. Every higher-level invariant in the system (bucket/tenant
//! counters, HEAD pointers, version ordering) is expressed as a batch over
//! the canonical keys documented in [`keys`].
//!
//! The store itself is intentionally opaque per the spec: "any
//! strictly-consistent K/V with prefix scans and atomic batches suffices".
//! [`InMemoryStore`] backs it with a single `RwLock<BTreeMap>`, which gives
//! both properties for free at the cost of whole-store write serialization —
//! acceptable for the reference implementation; a sharded or disk-backed
//! store could implement the same [`MetadataStore`] trait without touching
//! callers.

pub mod keys;
mod store;

pub use store::{BatchOp, InMemoryStore, MetadataStore, ScanResult};
