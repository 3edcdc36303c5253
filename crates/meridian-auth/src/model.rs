//! Persisted shapes for users, tenants, and access keys (§3, §4.1).

use chrono::{DateTime, Utc};
use meridian_core::{Role, TenantId, UserId};
use serde::{Deserialize, Serialize};

/// Tenant account status. A suspended tenant fails authorization for every
/// one of its users even with valid credentials (§4.5 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Normal operation.
    Active,
    /// All access denied; credentials still validate but authorization fails.
    Suspended,
}

/// Per-user account status (§4.1). Distinct from [`Status`] because a user
/// has three independently reachable states, not two: `Locked` is the
/// automatic outcome of repeated failed logins (§4.4) and clears once the
/// lockout window passes, while `Disabled` is a permanent admin action that
/// only another admin action reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Normal operation.
    Active,
    /// Locked out after too many failed login attempts (§4.4); temporary.
    Locked,
    /// Disabled by an administrator; does not clear on its own.
    Disabled,
}

/// A tenant: the top-level isolation unit with its own quotas and users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant identifier.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// `Active` or `Suspended` (§4.5 step 1).
    pub status: Status,
    /// Maximum number of buckets this tenant may own.
    pub max_buckets: u64,
    /// Maximum aggregate storage in bytes across all the tenant's buckets.
    pub max_storage_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant live counters, mutated only inside the same batch that changes
/// the underlying objects/buckets (§5).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TenantCounters {
    pub buckets: i64,
    pub storage_bytes: i64,
    pub access_keys: i64,
}

/// A user. `tenant_id` is the global sentinel for a global admin account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub username: String,
    /// bcrypt hash of the password, never the plaintext.
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    /// `None` until `enable_2fa` succeeds.
    pub totp_secret: Option<String>,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn is_global_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Lockout bookkeeping stored at `U/<user>/lockout` (§4.4).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LockoutState {
    pub failed_count: u32,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// 2FA state stored at `U/<user>/2fa`, separate from the user record so it
/// can be wiped independently of the rest of the profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwoFactorState {
    pub secret: Option<String>,
    pub enabled: bool,
    /// bcrypt hashes of unused backup codes.
    pub backup_code_hashes: Vec<String>,
}

/// A long-lived credential pair used to sign S3 requests.
///
/// The secret is written once at creation and never updated (§5: "Access
/// key secret table: write-once for the secret"). It must be retrievable in
/// plaintext internally so [`crate::access_keys::CredentialStore`] can hand
/// it to the SigV4 verifier; every *read-facing* API must expose only
/// [`AccessKey::secret_fingerprint`], never the secret itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
    /// Last time this key successfully authenticated a request, updated by
    /// [`crate::access_keys::CredentialStore::get_secret_key`]. `None` if the
    /// key has never been used.
    pub last_used: Option<DateTime<Utc>>,
}

impl AccessKey {
    /// A one-way fingerprint safe to return from list/describe APIs; never
    /// the secret itself (§5).
    #[must_use]
    pub fn secret_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.secret_access_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The redacted view returned by every read-facing API (§5: "all later
    /// reads return metadata only").
    #[must_use]
    pub fn to_summary(&self) -> AccessKeySummary {
        AccessKeySummary {
            access_key_id: self.access_key_id.clone(),
            secret_fingerprint: self.secret_fingerprint(),
            user_id: self.user_id.clone(),
            tenant_id: self.tenant_id.clone(),
            created_at: self.created_at,
            revoked: self.revoked,
            last_used: self.last_used,
        }
    }
}

/// Redacted view of an [`AccessKey`] with no `secret_access_key` field.
/// Returned by every listing/describe API; only
/// [`crate::access_keys::CredentialStore::get_secret_key`] ever sees the raw
/// secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeySummary {
    pub access_key_id: String,
    pub secret_fingerprint: String,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
    pub last_used: Option<DateTime<Utc>>,
}

/// A freshly minted credential pair, returned once from `create_access_key`.
#[derive(Debug, Clone)]
pub struct NewAccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}
