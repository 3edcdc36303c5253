//! Record types for shares, presigned access, and replication (§3, §4.6,
//! §4.8).

use chrono::{DateTime, Utc};
use meridian_core::TenantId;
use serde::{Deserialize, Serialize};

/// A share grants anonymous, time-bounded access to one object version
/// through a signed URL. At most one active share exists per
/// `(bucket, object, tenant)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    /// Opaque share identifier, also the `S/<id>` record key's suffix.
    pub id: String,
    /// `BucketKey::as_str()` of the bucket the object lives in.
    pub bucket_key: String,
    /// The object key the share resolves to.
    pub object_key: String,
    /// Tenant that owns the share.
    pub tenant_id: TenantId,
    /// A snapshot of the access key used to sign URLs for this share, taken
    /// at creation time so the share keeps working even if the key is
    /// later rotated or revoked (§4.6).
    pub access_key_id: String,
    /// Secret half of the snapshot above.
    pub secret_access_key: String,
    /// The user who created the share.
    pub owner_user_id: String,
    /// When the share stops resolving. `None` means it never expires on
    /// its own (still subject to explicit deletion).
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Share {
    /// Whether `now` is past this share's expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}

/// A tenant's cross-region/cross-endpoint replication configuration for one
/// source bucket (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationRule {
    /// Opaque rule identifier, also the queue's partition key.
    pub rule_id: String,
    /// Tenant that owns the rule.
    pub tenant_id: TenantId,
    /// Source bucket key (`BucketKey::as_str()`).
    pub src_bucket: String,
    /// Destination endpoint, opaque to this crate -- interpreted by whatever
    /// [`crate::replication::ReplicationTransport`] is wired in.
    pub dest_endpoint: String,
    /// Destination bucket name at `dest_endpoint`.
    pub dest_bucket: String,
    /// Opaque destination credentials, passed through to the transport.
    pub dest_credentials: String,
    /// How many tasks for distinct objects may run concurrently; tasks for
    /// the same `(bucket, object)` are never reordered regardless of this
    /// setting (§4.8).
    pub parallelism: u32,
    /// Whether the rule is currently active.
    pub enabled: bool,
}

/// The operation a [`ReplicationTask`] replays on the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationOp {
    /// Replicate a `put` (the object's current bytes at `version_id`).
    Put,
    /// Replicate a `delete` (the destination should remove `version_id`, or
    /// its current object, at the remote end).
    Delete,
}

/// The lifecycle status of a queued replication task (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationStatus {
    /// Not yet attempted, or attempted and due for retry.
    Pending,
    /// The most recent attempt failed; `next_attempt_at` gates retry.
    Failed,
}

/// One unit of replication work, durably queued at `R/queue/<rule_id>/<seq>`
/// (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationTask {
    /// Opaque task identifier.
    pub task_id: String,
    /// Owning rule.
    pub rule_id: String,
    /// Monotonic sequence number within the rule's queue; preserves
    /// same-object ordering when combined with `object_key`.
    pub seq: u64,
    /// The object key to replicate.
    pub object_key: String,
    /// Which operation to replay remotely.
    pub op: ReplicationOp,
    /// The version id being replicated (empty string if not versioned).
    pub version_id: String,
    /// Content hash of the version's bytes, used by the remote endpoint to
    /// make replay of the same `(object, version_id, content_hash)` a
    /// no-op (§4.8's exactly-once note).
    pub content_hash: Option<String>,
    /// Number of attempts made so far.
    pub attempts: u32,
    /// Earliest time the next attempt may run.
    pub next_attempt_at: DateTime<Utc>,
    /// Current status.
    pub status: ReplicationStatus,
}
