//! AWS SigV2/SigV4 request and presigned-URL signature verification (§4.6,
//! §6.1).
//!
//! This crate verifies that a request or presigned URL was produced by a
//! known access key's secret key. It supports header-based authentication
//! (the `Authorization` header), presigned URLs (query parameters, §4.6),
//! and legacy SigV2 (HMAC-SHA1) for older clients.
//!
//! Credential lookup is abstracted behind [`CredentialProvider`] so the
//! access-key store (owned by the auth component) can be swapped in without
//! this crate depending on it directly.
//!
//! # Modules
//!
//! - [`canonical`] - canonical request construction per the SigV4 spec
//! - [`credentials`] - credential provider trait and in-memory implementation
//! - [`error`] - authentication error types
//! - [`presigned`] - presigned URL verification
//! - [`sigv2`] - legacy SigV2 signature verification (HMAC-SHA1)
//! - [`sigv4`] - SigV4 signature verification

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod presigned;
pub mod sigv2;
pub mod sigv4;

pub use credentials::{CredentialProvider, StaticCredentialProvider};
pub use error::AuthError;
pub use presigned::verify_presigned;
pub use sigv2::{is_sigv2, verify_sigv2};
pub use sigv4::{AuthResult, hash_payload, verify_sigv4};
