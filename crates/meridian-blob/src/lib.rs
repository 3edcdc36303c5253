//! Content-addressed blob storage and envelope encryption (spec C1, C3).
//!
//! [`BlobBackend`] is the capability boundary the object engine uses to
//! put/get/delete physical byte ranges; [`FilesystemBlobBackend`] is the one
//! concrete backend in scope (§1 Non-goals: "third-party object-store
//! backends" are out of scope). [`EncryptionLayer`] wraps any `BlobBackend`
//! with per-object AES-256-GCM envelope encryption (§6.3).

mod backend;
mod encryption;

pub use backend::{BlobBackend, FilesystemBlobBackend, PhysicalKey};
pub use encryption::EncryptionLayer;
