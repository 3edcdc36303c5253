//! The Meridian error taxonomy (spec §7).
//!
//! Every component converges its domain errors onto [`CoreError`]. Each
//! variant is a *kind*, not a wire error code — mapping to HTTP status or to
//! an S3 error code is the responsibility of the (out-of-scope) transport
//! layer.

use chrono::{DateTime, Utc};

/// Object Lock retention mode (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RetentionMode {
    /// Retention can be shortened or bypassed by a global admin.
    Governance,
    /// Retention can never be shortened or bypassed by anyone.
    Compliance,
}

impl std::fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Governance => "GOVERNANCE",
            Self::Compliance => "COMPLIANCE",
        })
    }
}

/// The Meridian error taxonomy.
///
/// Variants correspond to the kinds enumerated in spec §7. `TransientStorage`
/// is retried by the caller per the propagation policy there; all other
/// kinds propagate unchanged.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A named resource (bucket/object/tenant/user/share/…) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A bucket delete was attempted while it still holds objects.
    #[error("not empty: {0}")]
    NotEmpty(String),

    /// No valid credentials/session were presented.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller is authenticated but not authorized for the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A retention/legal-hold rule blocked the operation.
    #[error("retention error: mode={mode} retain_until={retain_until} reason={reason}")]
    RetentionError {
        /// The retention mode in effect.
        mode: RetentionMode,
        /// The retain-until date that blocks the operation.
        retain_until: DateTime<Utc>,
        /// Human-readable reason (e.g. "legal hold is ON").
        reason: String,
    },

    /// The caller has exceeded a rate limit; retry after the given duration.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// A lower-level storage operation failed transiently.
    ///
    /// Retried up to 3 times with 50/100/200ms backoff by the operation
    /// that observed it (§7); surfaced only if retries are exhausted.
    #[error("transient storage error: {0}")]
    TransientStorage(String),

    /// The operation was cancelled before or after taking effect, never
    /// leaving a partial state (§5).
    #[error("cancelled")]
    Cancelled,

    /// Tenant or bucket quota was exceeded.
    #[error("quota exceeded: limit={limit} attempted={attempted}")]
    QuotaExceeded {
        /// The configured limit.
        limit: u64,
        /// The value that would have resulted had the operation proceeded.
        attempted: u64,
    },

    /// Catch-all for unexpected internal failures.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// Construct a [`CoreError::InvalidInput`] from any displayable reason.
    pub fn invalid_input(reason: impl std::fmt::Display) -> Self {
        Self::InvalidInput(reason.to_string())
    }

    /// Construct a [`CoreError::NotFound`] from any displayable reason.
    pub fn not_found(reason: impl std::fmt::Display) -> Self {
        Self::NotFound(reason.to_string())
    }

    /// Construct a [`CoreError::Forbidden`] from any displayable reason.
    pub fn forbidden(reason: impl std::fmt::Display) -> Self {
        Self::Forbidden(reason.to_string())
    }

    /// Whether this error kind is worth retrying per the §7 propagation
    /// policy (only `TransientStorage` is).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }
}

/// Convenience result type for Meridian operations.
pub type CoreResult<T> = Result<T, CoreError>;
