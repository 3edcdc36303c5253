//! Background workers: share links and presigned URLs, periodic lifecycle
//! sweeps, and cross-region replication (§4.6-§4.8 -- spec C8, C9, C10).
//!
//! # Modules
//!
//! - [`model`] - share/replication record types
//! - [`presign`] - presigned-URL generation, symmetric with `meridian_sigv4::verify_presigned`
//! - [`share`] - [`share::ShareManager`]
//! - [`lifecycle`] - [`lifecycle::LifecycleWorker`]
//! - [`replication`] - [`replication::ReplicationEngine`] and the [`replication::ReplicationTransport`] capability boundary

pub mod lifecycle;
pub mod model;
pub mod presign;
pub mod replication;
pub mod share;

pub use lifecycle::{LifecycleReport, LifecycleWorker};
pub use replication::{NullReplicationTransport, ReplicationEngine, ReplicationTransport};
pub use share::ShareManager;
