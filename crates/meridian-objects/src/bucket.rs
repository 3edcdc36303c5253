//! `BucketManager` (§4.3): create/delete/list buckets, per-tenant quota
//! enforcement, and the config-subdocument get/set surface.

use std::sync::Arc;

use chrono::Utc;
use meridian_auth::acl::{AclConfig, Owner};
use meridian_auth::policy::PolicyDocument;
use meridian_auth::{permission::BucketPermission, users};
use meridian_core::{BucketKey, CoreError, CoreResult, TenantId};
use meridian_metadata::{MetadataStore, keys};

use crate::model::{Bucket, BucketConfig, CorsRule, LifecycleRule, ObjectLockConfig, VersioningState};

fn encode(bucket: &Bucket) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(bucket).map_err(|e| CoreError::Internal(anyhow::anyhow!("encode bucket: {e}")))
}

fn decode(bytes: &[u8]) -> CoreResult<Bucket> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::Internal(anyhow::anyhow!("decode bucket: {e}")))
}

fn validate_bucket_name(name: &str) -> CoreResult<()> {
    if !(3..=63).contains(&name.len()) || !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.') {
        return Err(CoreError::invalid_input(format!(
            "bucket name {name:?} must be 3-63 lowercase alphanumeric/.-characters"
        )));
    }
    Ok(())
}

/// Owns bucket lifecycle and per-bucket configuration (spec C4).
pub struct BucketManager {
    store: Arc<dyn MetadataStore>,
}

impl BucketManager {
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Create a bucket, enforcing the tenant's `max_buckets` quota (§4.3,
    /// §8 scenario S3's sibling invariant for bucket count).
    pub fn create(
        &self,
        tenant_id: &TenantId,
        name: &str,
        owner: Owner,
        versioning: VersioningState,
        object_lock: Option<ObjectLockConfig>,
    ) -> CoreResult<Bucket> {
        validate_bucket_name(name)?;
        if object_lock.is_some() && versioning != VersioningState::Enabled {
            return Err(CoreError::invalid_input("object lock requires versioning to be enabled"));
        }

        if !tenant_id.is_global() {
            let tenant = users::get_tenant(self.store.as_ref(), tenant_id)?
                .ok_or_else(|| CoreError::not_found(format!("tenant {tenant_id}")))?;
            let counters = users::tenant_counters(self.store.as_ref(), tenant_id)?;
            let projected = counters.buckets + 1;
            if projected > i64::try_from(tenant.max_buckets).unwrap_or(i64::MAX) {
                return Err(CoreError::QuotaExceeded {
                    limit: u64::from(tenant.max_buckets),
                    attempted: u64::try_from(projected).unwrap_or(u64::MAX),
                });
            }
        }

        let bucket = Bucket {
            tenant_id: tenant_id.clone(),
            name: name.to_owned(),
            owner,
            versioning,
            created_at: Utc::now(),
            config: BucketConfig {
                object_lock,
                ..BucketConfig::default()
            },
            counters: crate::model::BucketCounters::default(),
        };

        let key = keys::bucket(BucketKey::new(tenant_id, name).as_str());
        let inserted = self.store.compare_and_set(&key, None, encode(&bucket)?)?;
        if !inserted {
            return Err(CoreError::AlreadyExists(format!("bucket {name}")));
        }
        if !tenant_id.is_global() {
            self.store.atomic_add(&keys::tenant_counter(tenant_id.as_str(), "buckets"), 1)?;
        }
        Ok(bucket)
    }

    /// Fetch a bucket by `(tenant, name)`.
    pub fn get(&self, tenant_id: &TenantId, name: &str) -> CoreResult<Option<Bucket>> {
        let key = keys::bucket(BucketKey::new(tenant_id, name).as_str());
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn require(&self, tenant_id: &TenantId, name: &str) -> CoreResult<Bucket> {
        self.get(tenant_id, name)?
            .ok_or_else(|| CoreError::not_found(format!("bucket {name}")))
    }

    /// Delete an empty, unlocked bucket (§4.3: rejects when `object_count !=
    /// 0` or `has_locked_versions`).
    pub fn delete(&self, tenant_id: &TenantId, name: &str) -> CoreResult<()> {
        let bucket = self.require(tenant_id, name)?;
        if bucket.counters.object_count != 0 {
            return Err(CoreError::NotEmpty(format!("bucket {name}")));
        }
        if bucket.counters.has_locked_versions {
            return Err(CoreError::forbidden(format!("bucket {name} has locked versions")));
        }
        let key = keys::bucket(BucketKey::new(tenant_id, name).as_str());
        self.store.delete(&key)?;
        if !tenant_id.is_global() {
            self.store.atomic_add(&keys::tenant_counter(tenant_id.as_str(), "buckets"), -1)?;
        }
        Ok(())
    }

    /// List every bucket owned by `tenant_id`.
    pub fn list(&self, tenant_id: &TenantId) -> CoreResult<Vec<Bucket>> {
        let scan = self.store.scan(keys::bucket_prefix(), None, usize::MAX)?;
        scan.items
            .into_iter()
            .map(|(_, v)| decode(&v))
            .filter(|b| matches!(b, Ok(bucket) if &bucket.tenant_id == tenant_id))
            .collect()
    }

    /// List every bucket across every tenant, for background sweeps that
    /// have no single tenant scope (the lifecycle worker's tick, for one).
    pub fn list_all(&self) -> CoreResult<Vec<Bucket>> {
        let scan = self.store.scan(keys::bucket_prefix(), None, usize::MAX)?;
        scan.items.into_iter().map(|(_, v)| decode(&v)).collect()
    }

    /// Reassign a bucket's owner.
    pub fn update_owner(&self, tenant_id: &TenantId, name: &str, owner: Owner) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| b.owner = owner)
    }

    /// Atomically add `delta_size`/`delta_count` to a bucket's live
    /// counters, retrying on concurrent writers (§4.3's two counter
    /// primitives, applied here as one bucket-record CAS loop since both
    /// fields live in the same record).
    pub fn increment_counters(&self, tenant_id: &TenantId, name: &str, delta_size: i64, delta_count: i64) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| {
            b.counters.total_size = b.counters.total_size.saturating_add_signed(delta_size);
            b.counters.object_count = b.counters.object_count.saturating_add_signed(delta_count);
        })
    }

    /// Recompute and persist the `has_locked_versions` flag.
    pub fn set_locked_versions_flag(&self, tenant_id: &TenantId, name: &str, locked: bool) -> CoreResult<()> {
        self.mutate(tenant_id, name, |b| b.counters.has_locked_versions = locked)?;
        Ok(())
    }

    pub fn set_versioning(&self, tenant_id: &TenantId, name: &str, state: VersioningState) -> CoreResult<Bucket> {
        let bucket = self.require(tenant_id, name)?;
        if bucket.config.object_lock.is_some() && state != VersioningState::Enabled {
            return Err(CoreError::invalid_input("cannot suspend versioning on an Object Lock-enabled bucket"));
        }
        self.mutate(tenant_id, name, |b| b.versioning = state)
    }

    pub fn set_acl(&self, tenant_id: &TenantId, name: &str, acl: AclConfig) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| b.config.acl = acl)
    }

    pub fn set_policy(&self, tenant_id: &TenantId, name: &str, policy: Option<PolicyDocument>) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| b.config.policy = policy)
    }

    pub fn set_permissions(&self, tenant_id: &TenantId, name: &str, permissions: Vec<BucketPermission>) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| b.config.permissions = permissions)
    }

    pub fn set_lifecycle_rules(&self, tenant_id: &TenantId, name: &str, rules: Vec<LifecycleRule>) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| b.config.lifecycle_rules = rules)
    }

    pub fn set_cors_rules(&self, tenant_id: &TenantId, name: &str, rules: Vec<CorsRule>) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| b.config.cors_rules = rules)
    }

    pub fn set_tags(&self, tenant_id: &TenantId, name: &str, tags: std::collections::HashMap<String, String>) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| b.config.tags = tags)
    }

    pub fn set_public_access_block(&self, tenant_id: &TenantId, name: &str, blocked: bool) -> CoreResult<Bucket> {
        self.mutate(tenant_id, name, |b| b.config.public_access_block = blocked)
    }

    /// Read-modify-write a bucket record under optimistic concurrency,
    /// retrying on a lost race against another writer.
    fn mutate(&self, tenant_id: &TenantId, name: &str, f: impl Fn(&mut Bucket)) -> CoreResult<Bucket> {
        let key = keys::bucket(BucketKey::new(tenant_id, name).as_str());
        loop {
            let Some(bytes) = self.store.get(&key)? else {
                return Err(CoreError::not_found(format!("bucket {name}")));
            };
            let mut bucket = decode(&bytes)?;
            f(&mut bucket);
            if self.store.compare_and_set(&key, Some(&bytes), encode(&bucket)?)? {
                return Ok(bucket);
            }
        }
    }
}
