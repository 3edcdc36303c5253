//! Bucket and object record types (§3, §4.2, §4.3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use meridian_auth::acl::{AclConfig, Owner};
use meridian_auth::permission::BucketPermission;
use meridian_auth::policy::PolicyDocument;
use meridian_core::{RetentionMode, TenantId};
use serde::{Deserialize, Serialize};

/// Bucket versioning status (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningState {
    Unversioned,
    Enabled,
    Suspended,
}

/// The bucket's Object Lock configuration, set immutably at creation.
///
/// `mode` can never change once set (§3: "immutable once enabled"). `days`
/// xor `years` defines the default retention every new version inherits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectLockConfig {
    pub mode: RetentionMode,
    pub days: Option<u32>,
    pub years: Option<u32>,
}

impl ObjectLockConfig {
    /// The retain-until date a version created `now` inherits.
    #[must_use]
    pub fn default_retain_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(days) = self.days {
            now + chrono::Duration::days(i64::from(days))
        } else if let Some(years) = self.years {
            now + chrono::Duration::days(365 * i64::from(years))
        } else {
            now
        }
    }
}

/// A lifecycle rule (§4.7): expiration and noncurrent-version expiration
/// scoped to a key prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub id: String,
    pub enabled: bool,
    pub prefix: String,
    pub expiration_days: Option<u32>,
    pub noncurrent_expiration_days: Option<u32>,
    pub expired_object_delete_marker: bool,
}

/// One CORS rule, mirroring the S3 `CORSRule` XML shape (wire encoding is
/// out of scope, §1 — this is the data the rule carries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age_seconds: Option<u32>,
}

/// Server-side encryption configuration for a bucket's default (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub enabled: bool,
}

/// All per-bucket configuration subdocuments, stored individually under
/// `B/<BucketKey>/cfg/<name>` (§4.1) but grouped here for convenience.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketConfig {
    pub object_lock: Option<ObjectLockConfig>,
    pub encryption: EncryptionConfig,
    pub public_access_block: bool,
    pub lifecycle_rules: Vec<LifecycleRule>,
    pub cors_rules: Vec<CorsRule>,
    pub tags: HashMap<String, String>,
    pub acl: AclConfig,
    pub policy: Option<PolicyDocument>,
    pub permissions: Vec<BucketPermission>,
}

/// Live, incrementally-maintained bucket counters (§3, §4.3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BucketCounters {
    pub object_count: u64,
    pub total_size: u64,
    /// Whether any version in this bucket currently has unexpired retention
    /// or an active legal hold — the materialized flag §4.3 requires so
    /// bucket delete can check `no_locked_versions` without a full scan.
    pub has_locked_versions: bool,
}

/// A bucket record (§3). `name` is the S3-compatible local name; `tenant_id`
/// together with `name` forms the canonical [`meridian_core::BucketKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub tenant_id: TenantId,
    pub name: String,
    pub owner: Owner,
    pub versioning: VersioningState,
    pub created_at: DateTime<Utc>,
    pub config: BucketConfig,
    pub counters: BucketCounters,
}

/// Object Lock legal hold toggle, independent of retention (§3, Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegalHold {
    On,
    Off,
}

/// Retention carried by one object version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retention {
    pub mode: RetentionMode,
    pub retain_until: DateTime<Utc>,
}

/// User-supplied object metadata carried alongside the bytes (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
}

/// One immutable version of an object (§3). Delete markers are versions
/// with no payload; [`ObjectVersionRecord::is_delete_marker`] distinguishes
/// them without a separate type, since both share the same HEAD/V/ slots
/// and need to interleave in version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectVersionRecord {
    pub key: String,
    pub version_id: String,
    pub is_delete_marker: bool,
    pub etag: Option<String>,
    pub size: u64,
    pub content_hash: Option<String>,
    pub metadata: ObjectMetadata,
    pub last_modified: DateTime<Utc>,
    pub retention: Option<Retention>,
    pub legal_hold: LegalHold,
    pub acl: AclConfig,
    pub owner: Owner,
}

impl ObjectVersionRecord {
    /// Whether this version can be deleted right now: unexpired retention
    /// and an active legal hold both block deletion (§4.2, §8 properties
    /// 4-5).
    #[must_use]
    pub fn is_deletable(&self, now: DateTime<Utc>, bypass_governance: bool) -> bool {
        if self.legal_hold == LegalHold::On {
            return false;
        }
        let Some(retention) = &self.retention else {
            return true;
        };
        if now >= retention.retain_until {
            return true;
        }
        matches!(retention.mode, RetentionMode::Governance) && bypass_governance
    }

    /// Whether this version currently holds the bucket open against
    /// deletion (unexpired retention or an active legal hold).
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.legal_hold == LegalHold::On || self.retention.as_ref().is_some_and(|r| now < r.retain_until)
    }
}

/// Metadata returned to the caller from `put`/`get`/`head` (§4.2).
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub key: String,
    pub version_id: String,
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
}

impl From<&ObjectVersionRecord> for ObjectMeta {
    fn from(v: &ObjectVersionRecord) -> Self {
        Self {
            key: v.key.clone(),
            version_id: v.version_id.clone(),
            etag: v.etag.clone().unwrap_or_default(),
            size: v.size,
            last_modified: v.last_modified,
            content_type: v.metadata.content_type.clone(),
        }
    }
}

/// The outcome of [`crate::object::ObjectManager::delete`].
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    /// A delete marker was inserted and is now latest.
    DeleteMarkerCreated { version_id: String },
    /// The named version was permanently removed.
    VersionRemoved,
}

/// One entry returned by [`crate::object::ObjectManager::list`].
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub key: String,
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// The result of a [`crate::object::ObjectManager::list`] call.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub entries: Vec<ListEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// One entry returned by [`crate::object::ObjectManager::list_versions`].
#[derive(Debug, Clone)]
pub struct VersionEntry {
    pub version: ObjectVersionRecord,
    pub is_latest: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retention(mode: RetentionMode, retain_until: DateTime<Utc>) -> ObjectVersionRecord {
        ObjectVersionRecord {
            key: "k".to_owned(),
            version_id: "v1".to_owned(),
            is_delete_marker: false,
            etag: Some("abc".to_owned()),
            size: 5,
            content_hash: Some("hash".to_owned()),
            metadata: ObjectMetadata::default(),
            last_modified: Utc::now(),
            retention: Some(Retention { mode, retain_until }),
            legal_hold: LegalHold::Off,
            acl: AclConfig::default(),
            owner: Owner {
                owner_type: meridian_auth::acl::OwnerType::User,
                owner_id: "u1".to_owned(),
            },
        }
    }

    #[test]
    fn test_compliance_retention_blocks_deletion_even_with_bypass() {
        let v = retention(RetentionMode::Compliance, Utc::now() + chrono::Duration::days(1));
        assert!(!v.is_deletable(Utc::now(), true));
    }

    #[test]
    fn test_governance_retention_bypassable() {
        let v = retention(RetentionMode::Governance, Utc::now() + chrono::Duration::days(1));
        assert!(!v.is_deletable(Utc::now(), false));
        assert!(v.is_deletable(Utc::now(), true));
    }

    #[test]
    fn test_legal_hold_blocks_deletion_regardless_of_retention() {
        let mut v = retention(RetentionMode::Governance, Utc::now() - chrono::Duration::days(1));
        v.legal_hold = LegalHold::On;
        assert!(!v.is_deletable(Utc::now(), true));
    }

    #[test]
    fn test_expired_retention_is_deletable() {
        let v = retention(RetentionMode::Compliance, Utc::now() - chrono::Duration::days(1));
        assert!(v.is_deletable(Utc::now(), false));
    }

    #[test]
    fn test_default_retain_until_adds_days() {
        let cfg = ObjectLockConfig {
            mode: RetentionMode::Governance,
            days: Some(1),
            years: None,
        };
        let now = Utc::now();
        assert_eq!(cfg.default_retain_until(now), now + chrono::Duration::days(1));
    }
}
