//! Identifier newtypes shared across Meridian components.

use std::fmt;

use crate::error::CoreError;

/// A tenant identifier.
///
/// The empty tenant id (`TenantId::global()`) denotes the absence of a
/// tenant: a *global* bucket, or a *global admin* user (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Construct a tenant id from a non-empty string.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidInput`] if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::invalid_input("tenant id must not be empty"));
        }
        Ok(Self(id))
    }

    /// The sentinel tenant id used by global (non-tenant-scoped) resources.
    #[must_use]
    pub fn global() -> Self {
        Self(String::new())
    }

    /// Whether this is the global sentinel (empty) tenant id.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A globally-unique user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Construct a user id from a non-empty string.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidInput`] if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::invalid_input("user id must not be empty"));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random user id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque, 20-character access key id (§3 `AccessKey`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AccessKeyId(String);

impl AccessKeyId {
    /// Wrap a raw access key id string without validating its length.
    ///
    /// Used when reading a previously-generated id back out of storage.
    #[must_use]
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The composite key identifying a bucket: `TenantId "/" Name`, or bare
/// `Name` for global buckets (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BucketKey(String);

impl BucketKey {
    /// Build the canonical bucket key for a `(tenant, name)` pair.
    #[must_use]
    pub fn new(tenant: &TenantId, name: &str) -> Self {
        if tenant.is_global() {
            Self(name.to_owned())
        } else {
            Self(format!("{tenant}/{name}"))
        }
    }

    /// Borrow the key as a string slice, used as a `MetadataStore` prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
