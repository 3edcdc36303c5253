//! `ObjectManager` (§4.2): versioned put/get/delete, retention and legal
//! hold, listing, and multipart composition.
//!
//! Authorization is the caller's job (`PermissionEvaluator`, evaluated
//! against the `Bucket` this manager hands back) -- this module only
//! concerns itself with the storage invariants: versioning, ETags, quota,
//! and retention.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use meridian_auth::acl::{AclConfig, Owner};
use meridian_auth::users;
use meridian_blob::{BlobBackend, PhysicalKey};
use meridian_core::{BucketKey, CoreError, CoreResult, TenantId};
use meridian_metadata::{MetadataStore, keys};

use crate::bucket::BucketManager;
use crate::etag;
use crate::list;
use crate::model::{
    Bucket, DeleteOutcome, LegalHold, ListEntry, ListResult, ObjectMetadata, ObjectVersionRecord, Retention, VersionEntry,
    VersioningState,
};

const UNVERSIONED_ID: &str = "null";

fn encode(record: &ObjectVersionRecord) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| CoreError::Internal(anyhow::anyhow!("encode version: {e}")))
}

fn decode(bytes: &[u8]) -> CoreResult<ObjectVersionRecord> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::Internal(anyhow::anyhow!("decode version: {e}")))
}

fn validate_key(key: &str) -> CoreResult<()> {
    if key.is_empty() || key.len() > 1024 {
        return Err(CoreError::invalid_input("object key must be 1-1024 characters"));
    }
    Ok(())
}

/// Owns object version history, content placement, and listing (spec C5).
pub struct ObjectManager {
    store: Arc<dyn MetadataStore>,
    blob: Arc<dyn BlobBackend>,
    buckets: Arc<BucketManager>,
}

impl ObjectManager {
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>, blob: Arc<dyn BlobBackend>, buckets: Arc<BucketManager>) -> Self {
        Self { store, blob, buckets }
    }

    fn next_version_id(&self, bucket: &Bucket) -> String {
        match bucket.versioning {
            VersioningState::Enabled => {
                let micros = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
                let tiebreak = uuid::Uuid::new_v4().as_u128() as u32;
                keys::descending_sortable_id(micros, tiebreak)
            }
            VersioningState::Unversioned | VersioningState::Suspended => UNVERSIONED_ID.to_owned(),
        }
    }

    fn head(&self, bucket_key: &BucketKey, key: &str) -> CoreResult<Option<ObjectVersionRecord>> {
        let head_key = keys::object_head(bucket_key.as_str(), key);
        let Some(vid_bytes) = self.store.get(&head_key)? else {
            return Ok(None);
        };
        let vid = String::from_utf8_lossy(&vid_bytes).into_owned();
        self.read_version(bucket_key, key, &vid)
    }

    fn read_version(&self, bucket_key: &BucketKey, key: &str, version_id: &str) -> CoreResult<Option<ObjectVersionRecord>> {
        let vkey = keys::object_version(bucket_key.as_str(), key, version_id);
        match self.store.get(&vkey)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store a new version of `key`, inheriting the bucket's default Object
    /// Lock retention if configured (§4.2).
    pub async fn put(&self, bucket: &Bucket, key: &str, body: &[u8], metadata: ObjectMetadata, owner: Owner) -> CoreResult<crate::model::ObjectMeta> {
        validate_key(key)?;
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        let previous = self.head(&bucket_key, key)?;
        let old_live_size = previous.as_ref().filter(|r| !r.is_delete_marker).map_or(0, |r| r.size);

        self.check_storage_quota(&bucket.tenant_id, old_live_size, body.len() as u64)?;

        let physical_key = PhysicalKey::of(body);
        self.blob.put(&physical_key, body).await?;

        let now = Utc::now();
        let retention = bucket.config.object_lock.as_ref().map(|lock| Retention {
            mode: lock.mode,
            retain_until: lock.default_retain_until(now),
        });

        let version_id = self.next_version_id(bucket);
        let record = ObjectVersionRecord {
            key: key.to_owned(),
            version_id: version_id.clone(),
            is_delete_marker: false,
            etag: Some(etag::single_part(body)),
            size: body.len() as u64,
            content_hash: Some(physical_key.as_str().to_owned()),
            metadata,
            last_modified: now,
            retention,
            legal_hold: LegalHold::Off,
            acl: AclConfig::default(),
            owner,
        };

        self.write_version_and_head(&bucket_key, key, &record, previous.as_ref())?;

        let delta_count = i64::from(previous.as_ref().is_none_or(|p| p.is_delete_marker));
        self.buckets.increment_counters(
            &bucket.tenant_id,
            &bucket.name,
            i64::try_from(record.size).unwrap_or(i64::MAX) - i64::try_from(old_live_size).unwrap_or(i64::MAX),
            delta_count,
        )?;

        Ok(crate::model::ObjectMeta::from(&record))
    }

    /// Compose a multipart upload: parts concatenate in order, the ETag is
    /// `md5(concat(md5(part)))-N` (§4.2, §8 property 9).
    pub async fn put_multipart(
        &self,
        bucket: &Bucket,
        key: &str,
        parts: Vec<Vec<u8>>,
        metadata: ObjectMetadata,
        owner: Owner,
    ) -> CoreResult<crate::model::ObjectMeta> {
        validate_key(key)?;
        if parts.is_empty() {
            return Err(CoreError::invalid_input("multipart upload must have at least one part"));
        }
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        let previous = self.head(&bucket_key, key)?;
        let old_live_size = previous.as_ref().filter(|r| !r.is_delete_marker).map_or(0, |r| r.size);

        let total_size: usize = parts.iter().map(Vec::len).sum();
        self.check_storage_quota(&bucket.tenant_id, old_live_size, total_size as u64)?;

        let digests: Vec<[u8; 16]> = parts.iter().map(|p| etag::part_digest(p)).collect();
        let composed: Vec<u8> = parts.into_iter().flatten().collect();
        let physical_key = PhysicalKey::of(&composed);
        self.blob.put(&physical_key, &composed).await?;

        let now = Utc::now();
        let retention = bucket.config.object_lock.as_ref().map(|lock| Retention {
            mode: lock.mode,
            retain_until: lock.default_retain_until(now),
        });
        let version_id = self.next_version_id(bucket);
        let record = ObjectVersionRecord {
            key: key.to_owned(),
            version_id: version_id.clone(),
            is_delete_marker: false,
            etag: Some(etag::multipart(&digests)),
            size: composed.len() as u64,
            content_hash: Some(physical_key.as_str().to_owned()),
            metadata,
            last_modified: now,
            retention,
            legal_hold: LegalHold::Off,
            acl: AclConfig::default(),
            owner,
        };

        self.write_version_and_head(&bucket_key, key, &record, previous.as_ref())?;

        let delta_count = i64::from(previous.as_ref().is_none_or(|p| p.is_delete_marker));
        self.buckets.increment_counters(
            &bucket.tenant_id,
            &bucket.name,
            i64::try_from(record.size).unwrap_or(i64::MAX) - i64::try_from(old_live_size).unwrap_or(i64::MAX),
            delta_count,
        )?;

        Ok(crate::model::ObjectMeta::from(&record))
    }

    fn check_storage_quota(&self, tenant_id: &TenantId, old_live_size: u64, new_size: u64) -> CoreResult<()> {
        if tenant_id.is_global() {
            return Ok(());
        }
        let tenant = users::get_tenant(self.store.as_ref(), tenant_id)?
            .ok_or_else(|| CoreError::not_found(format!("tenant {tenant_id}")))?;
        let counters = users::tenant_counters(self.store.as_ref(), tenant_id)?;
        let projected = counters.storage_bytes - i64::try_from(old_live_size).unwrap_or(0) + i64::try_from(new_size).unwrap_or(i64::MAX);
        if projected > i64::try_from(tenant.max_storage_bytes).unwrap_or(i64::MAX) {
            return Err(CoreError::QuotaExceeded {
                limit: tenant.max_storage_bytes,
                attempted: u64::try_from(projected).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    /// Write the version record and flip `HEAD` to it via compare-and-set
    /// against the previous pointer value (§4.2, §5).
    fn write_version_and_head(
        &self,
        bucket_key: &BucketKey,
        key: &str,
        record: &ObjectVersionRecord,
        previous: Option<&ObjectVersionRecord>,
    ) -> CoreResult<()> {
        let vkey = keys::object_version(bucket_key.as_str(), key, &record.version_id);
        self.store.put(&vkey, encode(record)?)?;

        let head_key = keys::object_head(bucket_key.as_str(), key);
        let expected = previous.map(|p| p.version_id.as_bytes().to_vec());
        let swapped = self
            .store
            .compare_and_set(&head_key, expected.as_deref(), record.version_id.as_bytes().to_vec())?;
        if !swapped {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }

    /// Fetch the latest (or a specific) version's bytes and metadata.
    pub async fn get(&self, bucket: &Bucket, key: &str, version_id: Option<&str>) -> CoreResult<(ObjectVersionRecord, Vec<u8>)> {
        let record = self.head_or_version(bucket, key, version_id)?;
        if record.is_delete_marker {
            return Err(CoreError::not_found(format!("{key} is a delete marker")));
        }
        let physical_key = PhysicalKey::from_hex(record.content_hash.clone().unwrap_or_default());
        let body = self.blob.get(&physical_key).await?;
        Ok((record, body))
    }

    /// HEAD semantics: metadata only, never the body.
    pub fn head_object(&self, bucket: &Bucket, key: &str, version_id: Option<&str>) -> CoreResult<ObjectVersionRecord> {
        let record = self.head_or_version(bucket, key, version_id)?;
        if record.is_delete_marker {
            return Err(CoreError::not_found(format!("{key} is a delete marker")));
        }
        Ok(record)
    }

    fn head_or_version(&self, bucket: &Bucket, key: &str, version_id: Option<&str>) -> CoreResult<ObjectVersionRecord> {
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        match version_id {
            Some(vid) => self
                .read_version(&bucket_key, key, vid)?
                .ok_or_else(|| CoreError::not_found(format!("{key} version {vid}"))),
            None => self.head(&bucket_key, key)?.ok_or_else(|| CoreError::not_found(key.to_owned())),
        }
    }

    /// Delete `key`: with no `version_id`, inserts a delete marker on a
    /// versioned/suspended bucket or removes the sole version on an
    /// unversioned one; with `version_id`, permanently removes that version
    /// after checking retention/legal hold (§4.2, §8 properties 4-5).
    pub async fn delete(
        &self,
        bucket: &Bucket,
        key: &str,
        version_id: Option<&str>,
        bypass_governance: bool,
    ) -> CoreResult<DeleteOutcome> {
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        let now = Utc::now();

        match version_id {
            None if bucket.versioning == VersioningState::Unversioned => {
                let Some(current) = self.head(&bucket_key, key)? else {
                    return Ok(DeleteOutcome::VersionRemoved);
                };
                self.purge_version(bucket, &bucket_key, key, &current, now, bypass_governance).await?;
                Ok(DeleteOutcome::VersionRemoved)
            }
            None => {
                let previous = self.head(&bucket_key, key)?;
                let previous_was_live = previous.as_ref().is_some_and(|p| !p.is_delete_marker);
                let marker = ObjectVersionRecord {
                    key: key.to_owned(),
                    version_id: self.next_version_id(bucket),
                    is_delete_marker: true,
                    etag: None,
                    size: 0,
                    content_hash: None,
                    metadata: ObjectMetadata::default(),
                    last_modified: now,
                    retention: None,
                    legal_hold: LegalHold::Off,
                    acl: AclConfig::default(),
                    owner: bucket.owner.clone(),
                };
                let marker_id = marker.version_id.clone();
                self.write_version_and_head(&bucket_key, key, &marker, previous.as_ref())?;
                if previous_was_live {
                    let old_size = previous.as_ref().map_or(0, |p| p.size);
                    self.buckets
                        .increment_counters(&bucket.tenant_id, &bucket.name, -i64::try_from(old_size).unwrap_or(0), -1)?;
                }
                Ok(DeleteOutcome::DeleteMarkerCreated { version_id: marker_id })
            }
            Some(vid) => {
                let target = self
                    .read_version(&bucket_key, key, vid)?
                    .ok_or_else(|| CoreError::not_found(format!("{key} version {vid}")))?;
                self.purge_version(bucket, &bucket_key, key, &target, now, bypass_governance).await?;
                Ok(DeleteOutcome::VersionRemoved)
            }
        }
    }

    async fn purge_version(
        &self,
        bucket: &Bucket,
        bucket_key: &BucketKey,
        key: &str,
        target: &ObjectVersionRecord,
        now: DateTime<Utc>,
        bypass_governance: bool,
    ) -> CoreResult<()> {
        if !target.is_deletable(now, bypass_governance) {
            let retention = target.retention.as_ref();
            return Err(CoreError::RetentionError {
                mode: retention.map_or(meridian_core::RetentionMode::Compliance, |r| r.mode),
                retain_until: retention.map_or(now, |r| r.retain_until),
                reason: if target.legal_hold == LegalHold::On {
                    "legal hold is ON".to_owned()
                } else {
                    "retention has not expired".to_owned()
                },
            });
        }

        let was_current_live = !target.is_delete_marker
            && self
                .head(bucket_key, key)?
                .is_some_and(|h| h.version_id == target.version_id);

        let vkey = keys::object_version(bucket_key.as_str(), key, &target.version_id);
        self.store.delete(&vkey)?;

        let head_key = keys::object_head(bucket_key.as_str(), key);
        if let Some(head_bytes) = self.store.get(&head_key)? {
            if String::from_utf8_lossy(&head_bytes) == target.version_id {
                let prefix = keys::object_version_prefix(bucket_key.as_str(), key);
                let next = self.store.scan(&prefix, None, 1)?;
                match next.items.into_iter().next() {
                    Some((vkey, _)) => {
                        let next_vid = vkey.rsplit('/').next().unwrap_or_default();
                        self.store.put(&head_key, next_vid.as_bytes().to_vec())?;
                    }
                    None => self.store.delete(&head_key)?,
                }
            }
        }

        if was_current_live {
            self.buckets
                .increment_counters(&bucket.tenant_id, &bucket.name, -i64::try_from(target.size).unwrap_or(0), -1)?;
        }
        if target.legal_hold == LegalHold::On || target.retention.is_some() {
            let still_locked = self.any_version_locked(bucket_key, now)?;
            self.buckets.set_locked_versions_flag(&bucket.tenant_id, &bucket.name, still_locked)?;
        }
        Ok(())
    }

    /// Scan every version record under `bucket_key` (HEAD pointers are
    /// skipped) and report whether any of them is still under legal hold or
    /// unexpired retention. Used after a purge to recompute
    /// `has_locked_versions` instead of assuming the bucket unlocked just
    /// because the purged version did.
    fn any_version_locked(&self, bucket_key: &BucketKey, now: DateTime<Utc>) -> CoreResult<bool> {
        let prefix = keys::object_bucket_prefix(bucket_key.as_str());
        let scan = self.store.scan(&prefix, None, usize::MAX)?;
        for (k, v) in &scan.items {
            if !k.contains("/V/") {
                continue;
            }
            if decode(v)?.is_locked(now) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// List current (non-delete-marker) objects in `bucket` (§4.2, §8
    /// property 10).
    pub fn list(&self, bucket: &Bucket, prefix: &str, delimiter: &str, marker: &str, max_keys: usize) -> CoreResult<ListResult> {
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        let head_prefix = keys::object_bucket_prefix(bucket_key.as_str());
        let scan = self.store.scan(&head_prefix, None, usize::MAX)?;

        let mut entries = Vec::new();
        for (k, v) in &scan.items {
            if !k.ends_with("/HEAD") {
                continue;
            }
            let object_key = k[head_prefix.len()..k.len() - "/HEAD".len()].to_owned();
            let vid = String::from_utf8_lossy(v).into_owned();
            let Some(record) = self.read_version(&bucket_key, &object_key, &vid)? else {
                continue;
            };
            if record.is_delete_marker {
                continue;
            }
            entries.push((
                object_key,
                ListEntry {
                    key: record.key.clone(),
                    etag: record.etag.clone().unwrap_or_default(),
                    size: record.size,
                    last_modified: record.last_modified,
                },
            ));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(list::fold(
            entries.iter().map(|(k, e)| (k.as_str(), e.clone())),
            prefix,
            delimiter,
            marker,
            max_keys,
        ))
    }

    /// List every object key with a `HEAD` pointer in `bucket`, including
    /// ones whose current version is a delete marker (unlike [`Self::list`],
    /// which is the customer-facing listing and excludes those). Used by
    /// background sweeps that need to see every key, not just live ones.
    pub fn list_object_keys(&self, bucket: &Bucket) -> CoreResult<Vec<String>> {
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        let head_prefix = keys::object_bucket_prefix(bucket_key.as_str());
        let scan = self.store.scan(&head_prefix, None, usize::MAX)?;
        Ok(scan
            .items
            .into_iter()
            .filter_map(|(k, _)| k.strip_suffix("/HEAD").map(|k| k[head_prefix.len()..].to_owned()))
            .collect())
    }

    /// List every version of `key`, newest first (§4.2).
    pub fn list_versions(&self, bucket: &Bucket, key: &str) -> CoreResult<Vec<VersionEntry>> {
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        let current_vid = self
            .store
            .get(&keys::object_head(bucket_key.as_str(), key))?
            .map(|b| String::from_utf8_lossy(&b).into_owned());

        let prefix = keys::object_version_prefix(bucket_key.as_str(), key);
        let scan = self.store.scan(&prefix, None, usize::MAX)?;
        scan.items
            .into_iter()
            .map(|(_, bytes)| {
                let version = decode(&bytes)?;
                let is_latest = current_vid.as_deref() == Some(version.version_id.as_str());
                Ok(VersionEntry { version, is_latest })
            })
            .collect()
    }

    /// Mutate the named version's retention under an optimistic-concurrency
    /// retry loop (§4.2). A `Compliance` retention can only ever be
    /// extended, never shortened or removed.
    pub fn set_retention(&self, bucket: &Bucket, key: &str, version_id: &str, retention: Retention, is_global_admin: bool) -> CoreResult<()> {
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        self.mutate_version(&bucket_key, key, version_id, |v| {
            if let Some(existing) = &v.retention {
                if matches!(existing.mode, meridian_core::RetentionMode::Compliance) && retention.retain_until < existing.retain_until {
                    return Err(CoreError::RetentionError {
                        mode: existing.mode,
                        retain_until: existing.retain_until,
                        reason: "compliance retention can only be extended".to_owned(),
                    });
                }
                if matches!(existing.mode, meridian_core::RetentionMode::Governance) && !is_global_admin && retention.retain_until < existing.retain_until {
                    return Err(CoreError::forbidden("only a global admin may shorten governance retention"));
                }
            }
            v.retention = Some(retention.clone());
            Ok(())
        })?;
        self.buckets.set_locked_versions_flag(&bucket.tenant_id, &bucket.name, true)?;
        Ok(())
    }

    /// Toggle legal hold on the named version (§3, independent of retention).
    pub fn set_legal_hold(&self, bucket: &Bucket, key: &str, version_id: &str, hold: LegalHold) -> CoreResult<()> {
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        self.mutate_version(&bucket_key, key, version_id, |v| {
            v.legal_hold = hold;
            Ok(())
        })?;
        if hold == LegalHold::On {
            self.buckets.set_locked_versions_flag(&bucket.tenant_id, &bucket.name, true)?;
        }
        Ok(())
    }

    /// Replace the named version's ACL.
    pub fn set_acl(&self, bucket: &Bucket, key: &str, version_id: &str, acl: AclConfig) -> CoreResult<()> {
        let bucket_key = BucketKey::new(&bucket.tenant_id, &bucket.name);
        self.mutate_version(&bucket_key, key, version_id, |v| {
            v.acl = acl.clone();
            Ok(())
        })
    }

    fn mutate_version(
        &self,
        bucket_key: &BucketKey,
        key: &str,
        version_id: &str,
        f: impl Fn(&mut ObjectVersionRecord) -> CoreResult<()>,
    ) -> CoreResult<()> {
        let vkey = keys::object_version(bucket_key.as_str(), key, version_id);
        loop {
            let Some(bytes) = self.store.get(&vkey)? else {
                return Err(CoreError::not_found(format!("{key} version {version_id}")));
            };
            let mut record = decode(&bytes)?;
            f(&mut record)?;
            if self.store.compare_and_set(&vkey, Some(&bytes), encode(&record)?)? {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use meridian_auth::acl::OwnerType;
    use meridian_blob::FilesystemBlobBackend;
    use meridian_core::RetentionMode;
    use meridian_metadata::InMemoryStore;

    use super::*;
    use crate::model::VersioningState;

    fn owner() -> Owner {
        Owner {
            owner_type: OwnerType::User,
            owner_id: "u1".to_owned(),
        }
    }

    async fn harness(versioning: VersioningState) -> (ObjectManager, Bucket) {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let blob: Arc<dyn BlobBackend> = Arc::new(FilesystemBlobBackend::new(dir.path()).unwrap());
        let bucket_mgr = Arc::new(BucketManager::new(store.clone()));
        let tenant_id = TenantId::global();
        let bucket = bucket_mgr.create(&tenant_id, "b", owner(), versioning, None).unwrap();
        (ObjectManager::new(store, blob, bucket_mgr), bucket)
    }

    #[tokio::test]
    async fn test_s1_versioned_put_delete_round_trip() {
        let (mgr, bucket) = harness(VersioningState::Enabled).await;
        let v1 = mgr.put(&bucket, "k", b"hello", ObjectMetadata::default(), owner()).await.unwrap();
        assert_eq!(v1.etag, "5d41402abc4b2a76b9719d911017c592");
        let v2 = mgr.put(&bucket, "k", b"world!", ObjectMetadata::default(), owner()).await.unwrap();
        assert_eq!(v2.etag, "fc3ff98e8c6a0d3087d515c0473f8677");
        assert_ne!(v1.version_id, v2.version_id);

        let (record, body) = mgr.get(&bucket, "k", None).await.unwrap();
        assert_eq!(body, b"world!");
        assert_eq!(record.version_id, v2.version_id);

        let outcome = mgr.delete(&bucket, "k", None, false).await.unwrap();
        assert!(matches!(outcome, DeleteOutcome::DeleteMarkerCreated { .. }));
        let err = mgr.get(&bucket, "k", None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let versions = mgr.list_versions(&bucket, "k").unwrap();
        assert_eq!(versions.len(), 3);
    }

    #[tokio::test]
    async fn test_s2_compliance_retention_blocks_delete() {
        let (mgr, mut bucket) = harness(VersioningState::Enabled).await;
        bucket.config.object_lock = Some(crate::model::ObjectLockConfig {
            mode: RetentionMode::Compliance,
            days: Some(1),
            years: None,
        });
        let v = mgr.put(&bucket, "locked.txt", b"secret", ObjectMetadata::default(), owner()).await.unwrap();
        let err = mgr.delete(&bucket, "locked.txt", Some(&v.version_id), true).await.unwrap_err();
        assert!(matches!(err, CoreError::RetentionError { .. }));
    }

    #[tokio::test]
    async fn test_s3_tenant_storage_quota_rejects_third_put() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let blob: Arc<dyn BlobBackend> = Arc::new(FilesystemBlobBackend::new(dir.path()).unwrap());
        let bucket_mgr = Arc::new(BucketManager::new(store.clone()));
        let tenant_id = TenantId::new("t1").unwrap();
        let tenant = meridian_auth::model::Tenant {
            id: tenant_id.clone(),
            name: "t".to_owned(),
            status: meridian_auth::model::Status::Active,
            max_buckets: 10,
            max_storage_bytes: 100,
            created_at: Utc::now(),
        };
        users::create_tenant(store.as_ref(), &tenant).unwrap();
        let bucket = bucket_mgr.create(&tenant_id, "b", owner(), VersioningState::Unversioned, None).unwrap();
        let mgr = ObjectManager::new(store, blob, bucket_mgr);

        mgr.put(&bucket, "a", &[0_u8; 40], ObjectMetadata::default(), owner()).await.unwrap();
        mgr.put(&bucket, "b", &[0_u8; 40], ObjectMetadata::default(), owner()).await.unwrap();
        let err = mgr.put(&bucket, "c", &[0_u8; 40], ObjectMetadata::default(), owner()).await.unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_unversioned_bucket_overwrites_in_place() {
        let (mgr, bucket) = harness(VersioningState::Unversioned).await;
        mgr.put(&bucket, "k", b"v1", ObjectMetadata::default(), owner()).await.unwrap();
        mgr.put(&bucket, "k", b"v2", ObjectMetadata::default(), owner()).await.unwrap();
        let versions = mgr.list_versions(&bucket, "k").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version.version_id, UNVERSIONED_ID);
    }

    #[tokio::test]
    async fn test_multipart_put_computes_compose_etag() {
        let (mgr, bucket) = harness(VersioningState::Unversioned).await;
        let parts = vec![b"part1".to_vec(), b"part2".to_vec()];
        let result = mgr.put_multipart(&bucket, "big", parts, ObjectMetadata::default(), owner()).await.unwrap();
        assert!(result.etag.ends_with("-2"));
    }

    #[tokio::test]
    async fn test_list_excludes_delete_markers() {
        let (mgr, bucket) = harness(VersioningState::Enabled).await;
        mgr.put(&bucket, "a", b"1", ObjectMetadata::default(), owner()).await.unwrap();
        mgr.put(&bucket, "b", b"2", ObjectMetadata::default(), owner()).await.unwrap();
        mgr.delete(&bucket, "a", None, false).await.unwrap();
        let result = mgr.list(&bucket, "", "", "", 10).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].key, "b");
    }

    #[tokio::test]
    async fn test_legal_hold_blocks_permanent_delete() {
        let (mgr, bucket) = harness(VersioningState::Enabled).await;
        let v = mgr.put(&bucket, "k", b"x", ObjectMetadata::default(), owner()).await.unwrap();
        mgr.set_legal_hold(&bucket, "k", &v.version_id, LegalHold::On).unwrap();
        let err = mgr.delete(&bucket, "k", Some(&v.version_id), true).await.unwrap_err();
        assert!(matches!(err, CoreError::RetentionError { .. }));
        mgr.set_legal_hold(&bucket, "k", &v.version_id, LegalHold::Off).unwrap();
        mgr.delete(&bucket, "k", Some(&v.version_id), false).await.unwrap();
    }
}
