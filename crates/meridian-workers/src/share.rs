//! `ShareManager` (§4.6, spec C8): idempotent share creation, expiry-aware
//! resolution, and the garbage collection [`crate::lifecycle::LifecycleWorker`]
//! drives.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use meridian_core::{CoreError, CoreResult, TenantId};
use meridian_metadata::{BatchOp, MetadataStore, keys};

use crate::model::Share;

fn encode(share: &Share) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(share).map_err(|e| CoreError::Internal(anyhow::anyhow!("encode share: {e}")))
}

fn decode(bytes: &[u8]) -> CoreResult<Share> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::Internal(anyhow::anyhow!("decode share: {e}")))
}

/// Creates, resolves, and retires [`Share`] records (spec C8).
pub struct ShareManager {
    store: Arc<dyn MetadataStore>,
}

impl ShareManager {
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Create a share, or return the existing one if `(bucket, object,
    /// tenant)` already has an active share (§4.6: "create-share is
    /// idempotent ... lookup by index, return existing if found, else
    /// insert").
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        bucket_key: &str,
        object_key: &str,
        tenant_id: &TenantId,
        access_key_id: String,
        secret_access_key: String,
        owner_user_id: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> CoreResult<Share> {
        let index_key = keys::share_by_object(bucket_key, object_key);
        if let Some(id_bytes) = self.store.get(&index_key)? {
            let id = String::from_utf8_lossy(&id_bytes).into_owned();
            if let Some(existing) = self.get(&id)? {
                return Ok(existing);
            }
        }

        let share = Share {
            id: uuid::Uuid::new_v4().to_string(),
            bucket_key: bucket_key.to_owned(),
            object_key: object_key.to_owned(),
            tenant_id: tenant_id.clone(),
            access_key_id,
            secret_access_key,
            owner_user_id,
            expires_at,
            created_at: Utc::now(),
        };

        self.store.batch(vec![
            BatchOp::Put {
                key: keys::share(&share.id),
                value: encode(&share)?,
            },
            BatchOp::Put {
                key: index_key,
                value: share.id.as_bytes().to_vec(),
            },
        ])?;
        Ok(share)
    }

    /// Fetch a share by id, regardless of expiry.
    pub fn get(&self, share_id: &str) -> CoreResult<Option<Share>> {
        match self.store.get(&keys::share(share_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolve a share for access, honoring expiry at access time (§4.6:
    /// "Expiry is honored at access time").
    pub fn resolve(&self, share_id: &str, now: DateTime<Utc>) -> CoreResult<Share> {
        let share = self.get(share_id)?.ok_or_else(|| CoreError::not_found(format!("share {share_id}")))?;
        if share.is_expired(now) {
            return Err(CoreError::not_found(format!("share {share_id} has expired")));
        }
        Ok(share)
    }

    /// Delete a share and its object index entry.
    pub fn delete(&self, share_id: &str) -> CoreResult<()> {
        let Some(share) = self.get(share_id)? else {
            return Ok(());
        };
        self.store.batch(vec![
            BatchOp::Delete { key: keys::share(share_id) },
            BatchOp::Delete {
                key: keys::share_by_object(&share.bucket_key, &share.object_key),
            },
        ])
    }

    /// Garbage-collect every share expired as of `now` (§4.7: driven by
    /// `LifecycleWorker`'s tick). Returns the count removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let scan = self.store.scan(keys::share_prefix(), None, usize::MAX)?;
        let mut removed = 0;
        for (key, value) in scan.items {
            if key.starts_with("S/byobj/") {
                continue;
            }
            let share = decode(&value)?;
            if share.is_expired(now) {
                self.delete(&share.id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use meridian_metadata::InMemoryStore;

    use super::*;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    #[test]
    fn test_create_is_idempotent_on_bucket_object_tenant() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let mgr = ShareManager::new(store);
        let a = mgr.create("t1/b", "k", &tenant(), "AKID".into(), "secret".into(), "u1".into(), None).unwrap();
        let b = mgr.create("t1/b", "k", &tenant(), "AKID2".into(), "secret2".into(), "u2".into(), None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.access_key_id, "AKID");
    }

    #[test]
    fn test_resolve_rejects_expired_share() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let mgr = ShareManager::new(store);
        let now = Utc::now();
        let share = mgr
            .create("t1/b", "k", &tenant(), "AKID".into(), "secret".into(), "u1".into(), Some(now - Duration::seconds(1)))
            .unwrap();
        let err = mgr.resolve(&share.id, now).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_sweep_expired_removes_only_expired_shares() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let mgr = ShareManager::new(store);
        let now = Utc::now();
        let expired = mgr
            .create("t1/b", "a", &tenant(), "AKID".into(), "secret".into(), "u1".into(), Some(now - Duration::seconds(1)))
            .unwrap();
        let live = mgr
            .create("t1/b", "b", &tenant(), "AKID".into(), "secret".into(), "u1".into(), Some(now + Duration::hours(1)))
            .unwrap();
        assert_eq!(mgr.sweep_expired(now).unwrap(), 1);
        assert!(mgr.get(&expired.id).unwrap().is_none());
        assert!(mgr.get(&live.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_removes_index_too() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let mgr = ShareManager::new(store);
        let share = mgr.create("t1/b", "k", &tenant(), "AKID".into(), "secret".into(), "u1".into(), None).unwrap();
        mgr.delete(&share.id).unwrap();
        let recreated = mgr.create("t1/b", "k", &tenant(), "AKID2".into(), "secret2".into(), "u2".into(), None).unwrap();
        assert_ne!(share.id, recreated.id);
    }
}
