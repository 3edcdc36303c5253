//! Canonical key construction (spec §4.1).
//!
//! ```text
//! T/<TenantID>                         tenant record
//! T/<TenantID>/counters.<field>        one atomic i64 per counter field (buckets, storage_bytes, access_keys)
//! U/<UserID>                           user record
//! U/<UserID>/2fa                       encrypted 2FA state
//! U/<UserID>/lockout                   {failed_count, locked_until}
//! K/<AccessKeyID>                      access key -> user
//! K/byuser/<UserID>/<AccessKeyID>      index
//! B/<BucketKey>                        bucket record (includes counters)
//! B/<BucketKey>/cfg/<config_name>      each configuration subdocument
//! O/<BucketKey>/<ObjectKey>/HEAD       pointer to latest version
//! O/<BucketKey>/<ObjectKey>/V/<VID>    version record (VID descending-sortable)
//! S/<ShareID>                          share record
//! S/byobj/<BucketKey>/<ObjectKey>      index -> ShareID
//! P/<BucketName>/<subject>             permission row
//! R/<RuleID>                           replication rule
//! R/queue/<peer>/<seq>                 replication task (seq is monotonic)
//! A/<ts>/<seq>                         audit event (composite sortable key)
//! ```

/// Encode a version id (or any monotonic sequence number) so that a
/// lexicographic prefix scan yields newest-first order: `MaxU64 -
/// unix_micros`, zero-padded big-endian hex, followed by a random suffix to
/// break ties between puts in the same microsecond.
#[must_use]
pub fn descending_sortable_id(unix_micros: u64, tiebreak: u32) -> String {
    format!("{:016x}-{:08x}", u64::MAX - unix_micros, tiebreak)
}

/// `T/<tenant>`
#[must_use]
pub fn tenant(tenant_id: &str) -> String {
    format!("T/{tenant_id}")
}

/// `T/<tenant>/counters.<field>` (§4.3: `atomic_add(T/<TenantID>/counters.buckets, +1)`).
#[must_use]
pub fn tenant_counter(tenant_id: &str, field: &str) -> String {
    format!("T/{tenant_id}/counters.{field}")
}

/// `U/<user>`
#[must_use]
pub fn user(user_id: &str) -> String {
    format!("U/{user_id}")
}

/// `U/<user>/2fa`
#[must_use]
pub fn user_2fa(user_id: &str) -> String {
    format!("U/{user_id}/2fa")
}

/// `U/<user>/lockout`
#[must_use]
pub fn user_lockout(user_id: &str) -> String {
    format!("U/{user_id}/lockout")
}

/// `K/<access_key_id>`
#[must_use]
pub fn access_key(access_key_id: &str) -> String {
    format!("K/{access_key_id}")
}

/// `K/byuser/<user>/<access_key_id>`
#[must_use]
pub fn access_key_by_user(user_id: &str, access_key_id: &str) -> String {
    format!("K/byuser/{user_id}/{access_key_id}")
}

/// `K/byuser/<user>/` prefix, for scanning a user's access keys.
#[must_use]
pub fn access_key_by_user_prefix(user_id: &str) -> String {
    format!("K/byuser/{user_id}/")
}

/// `B/<bucket_key>`
#[must_use]
pub fn bucket(bucket_key: &str) -> String {
    format!("B/{bucket_key}")
}

/// `B/<bucket_key>/cfg/<name>`
#[must_use]
pub fn bucket_config(bucket_key: &str, name: &str) -> String {
    format!("B/{bucket_key}/cfg/{name}")
}

/// `B/` prefix, for scanning all buckets.
#[must_use]
pub fn bucket_prefix() -> &'static str {
    "B/"
}

/// `O/<bucket_key>/<object_key>/HEAD`
#[must_use]
pub fn object_head(bucket_key: &str, object_key: &str) -> String {
    format!("O/{bucket_key}/{object_key}/HEAD")
}

/// `O/<bucket_key>/<object_key>/V/<version_id>`
#[must_use]
pub fn object_version(bucket_key: &str, object_key: &str, version_id: &str) -> String {
    format!("O/{bucket_key}/{object_key}/V/{version_id}")
}

/// `O/<bucket_key>/<object_key>/V/` prefix, for listing versions newest-first.
#[must_use]
pub fn object_version_prefix(bucket_key: &str, object_key: &str) -> String {
    format!("O/{bucket_key}/{object_key}/V/")
}

/// `O/<bucket_key>/` prefix, for scanning HEAD pointers in a bucket.
#[must_use]
pub fn object_bucket_prefix(bucket_key: &str) -> String {
    format!("O/{bucket_key}/")
}

/// `S/<share_id>`
#[must_use]
pub fn share(share_id: &str) -> String {
    format!("S/{share_id}")
}

/// `S/byobj/<bucket_key>/<object_key>`
#[must_use]
pub fn share_by_object(bucket_key: &str, object_key: &str) -> String {
    format!("S/byobj/{bucket_key}/{object_key}")
}

/// `S/` prefix, for sweeping all shares.
#[must_use]
pub fn share_prefix() -> &'static str {
    "S/"
}

/// `P/<bucket_name>/<subject>`
#[must_use]
pub fn permission(bucket_name: &str, subject: &str) -> String {
    format!("P/{bucket_name}/{subject}")
}

/// `P/<bucket_name>/` prefix, for scanning permissions on a bucket.
#[must_use]
pub fn permission_bucket_prefix(bucket_name: &str) -> String {
    format!("P/{bucket_name}/")
}

/// `R/<rule_id>`
#[must_use]
pub fn replication_rule(rule_id: &str) -> String {
    format!("R/{rule_id}")
}

/// `R/` prefix, for scanning all replication rules.
#[must_use]
pub fn replication_rule_prefix() -> &'static str {
    "R/"
}

/// `R/queue/<peer>/<seq>`
#[must_use]
pub fn replication_task(peer: &str, seq: u64) -> String {
    format!("R/queue/{peer}/{seq:016x}")
}

/// `R/queue/<peer>/` prefix, for draining one peer's queue in order.
#[must_use]
pub fn replication_queue_prefix(peer: &str) -> String {
    format!("R/queue/{peer}/")
}

/// `A/<ts>/<seq>`
#[must_use]
pub fn audit_event(ts_unix_micros: u64, seq: u64) -> String {
    format!("A/{ts_unix_micros:020}/{seq:016x}")
}

/// `A/` prefix, for scanning the audit log.
#[must_use]
pub fn audit_prefix() -> &'static str {
    "A/"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descending_sortable_id_orders_newest_first() {
        let older = descending_sortable_id(1_000, 0);
        let newer = descending_sortable_id(2_000, 0);
        // newest first means the newer timestamp sorts lexicographically smaller
        assert!(newer < older);
    }

    #[test]
    fn test_bucket_key_shape() {
        assert_eq!(bucket("t1/photos"), "B/t1/photos");
        assert_eq!(bucket_config("t1/photos", "versioning"), "B/t1/photos/cfg/versioning");
    }

    #[test]
    fn test_object_version_prefix_is_prefix_of_version_key() {
        let prefix = object_version_prefix("t1/photos", "a.jpg");
        let key = object_version("t1/photos", "a.jpg", "V1");
        assert!(key.starts_with(&prefix));
    }
}
