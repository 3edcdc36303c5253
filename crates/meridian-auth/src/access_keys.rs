//! Access key generation, storage, and the [`CredentialStore`] adapter that
//! lets `meridian-sigv4` resolve secret keys without depending on this
//! crate's storage layout (§4.4).

use std::sync::Arc;

use meridian_core::{CoreError, CoreResult, TenantId, UserId};
use meridian_metadata::{MetadataStore, keys};
use meridian_sigv4::AuthError;
use meridian_sigv4::credentials::CredentialProvider;
use rand::Rng;

use crate::model::{AccessKey, AccessKeySummary, NewAccessKey};

const ACCESS_KEY_ID_LEN: usize = 20;
const SECRET_KEY_BYTES: usize = 30; // base64url-encodes to 40 chars.
const BASE62_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn generate_access_key_id() -> String {
    let mut rng = rand::rng();
    (0..ACCESS_KEY_ID_LEN)
        .map(|_| {
            let idx = rng.random_range(0..BASE62_ALPHABET.len());
            BASE62_ALPHABET[idx] as char
        })
        .collect()
}

fn generate_secret_access_key() -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let mut bytes = [0_u8; SECRET_KEY_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Create and persist a new access key for `user_id`/`tenant_id`.
///
/// Returns the plaintext secret once; it is not retrievable afterward
/// through any read path other than internal signature verification.
pub fn create(
    store: &dyn MetadataStore,
    user_id: &UserId,
    tenant_id: &TenantId,
) -> CoreResult<NewAccessKey> {
    let access_key_id = generate_access_key_id();
    let secret_access_key = generate_secret_access_key();

    let record = AccessKey {
        access_key_id: access_key_id.clone(),
        secret_access_key: secret_access_key.clone(),
        user_id: user_id.clone(),
        tenant_id: tenant_id.clone(),
        created_at: chrono::Utc::now(),
        revoked: false,
        last_used: None,
    };

    let encoded = serde_json::to_vec(&record)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("encode access key: {e}")))?;
    store.put(&keys::access_key(&access_key_id), encoded)?;
    store.put(
        &keys::access_key_by_user(user_id.as_str(), &access_key_id),
        Vec::new(),
    )?;

    Ok(NewAccessKey {
        access_key_id,
        secret_access_key,
    })
}

/// Fetch an access key record, if present and not revoked.
pub fn get(store: &dyn MetadataStore, access_key_id: &str) -> CoreResult<Option<AccessKey>> {
    let Some(bytes) = store.get(&keys::access_key(access_key_id))? else {
        return Ok(None);
    };
    let record: AccessKey = serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("decode access key: {e}")))?;
    Ok(if record.revoked { None } else { Some(record) })
}

/// List every access key id belonging to `user_id`.
pub fn list_for_user(store: &dyn MetadataStore, user_id: &UserId) -> CoreResult<Vec<AccessKey>> {
    let prefix = keys::access_key_by_user_prefix(user_id.as_str());
    let scan = store.scan(&prefix, None, usize::MAX)?;
    let mut out = Vec::with_capacity(scan.items.len());
    for (key, _) in scan.items {
        let access_key_id = key
            .rsplit('/')
            .next()
            .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("malformed access key index entry")))?;
        if let Some(record) = get(store, access_key_id)? {
            out.push(record);
        }
    }
    Ok(out)
}

/// Revoke an access key. Idempotent: revoking an already-revoked or
/// nonexistent key is not an error.
pub fn revoke(store: &dyn MetadataStore, access_key_id: &str) -> CoreResult<()> {
    let key = keys::access_key(access_key_id);
    let Some(bytes) = store.get(&key)? else {
        return Ok(());
    };
    let mut record: AccessKey = serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("decode access key: {e}")))?;
    record.revoked = true;
    let encoded = serde_json::to_vec(&record)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("encode access key: {e}")))?;
    store.put(&key, encoded)
}

/// Adapts the access-key table to [`CredentialProvider`] so `meridian-sigv4`
/// can verify signatures without knowing how credentials are stored.
pub struct CredentialStore {
    store: Arc<dyn MetadataStore>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }
}

impl CredentialProvider for CredentialStore {
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, AuthError> {
        match get(self.store.as_ref(), access_key_id) {
            Ok(Some(record)) => {
                let secret = record.secret_access_key.clone();
                if let Err(error) = touch_last_used(self.store.as_ref(), access_key_id, record) {
                    tracing::warn!(%error, access_key_id, "failed to record access key last_used");
                }
                Ok(secret)
            }
            Ok(None) => Err(AuthError::AccessKeyNotFound(access_key_id.to_owned())),
            Err(_) => Err(AuthError::AccessKeyNotFound(access_key_id.to_owned())),
        }
    }
}

/// Stamp `last_used` on a successfully resolved access key.
fn touch_last_used(store: &dyn MetadataStore, access_key_id: &str, mut record: AccessKey) -> CoreResult<()> {
    record.last_used = Some(chrono::Utc::now());
    let encoded = serde_json::to_vec(&record)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("encode access key: {e}")))?;
    store.put(&keys::access_key(access_key_id), encoded)
}

/// List every access key belonging to `user_id`, redacted.
pub fn list_for_user_summaries(store: &dyn MetadataStore, user_id: &UserId) -> CoreResult<Vec<AccessKeySummary>> {
    Ok(list_for_user(store, user_id)?.iter().map(AccessKey::to_summary).collect())
}

#[cfg(test)]
mod tests {
    use meridian_metadata::InMemoryStore;

    use super::*;

    fn ids() -> (UserId, TenantId) {
        (UserId::new("u1").unwrap(), TenantId::new("t1").unwrap())
    }

    #[test]
    fn test_create_then_get_round_trips() {
        let store = InMemoryStore::new();
        let (user, tenant) = ids();
        let created = create(&store, &user, &tenant).unwrap();
        assert_eq!(created.access_key_id.len(), ACCESS_KEY_ID_LEN);

        let fetched = get(&store, &created.access_key_id).unwrap().unwrap();
        assert_eq!(fetched.secret_access_key, created.secret_access_key);
    }

    #[test]
    fn test_revoke_hides_key_from_get() {
        let store = InMemoryStore::new();
        let (user, tenant) = ids();
        let created = create(&store, &user, &tenant).unwrap();
        revoke(&store, &created.access_key_id).unwrap();
        assert!(get(&store, &created.access_key_id).unwrap().is_none());
    }

    #[test]
    fn test_revoke_is_idempotent_for_unknown_key() {
        let store = InMemoryStore::new();
        revoke(&store, "does-not-exist").unwrap();
    }

    #[test]
    fn test_list_for_user_finds_created_keys() {
        let store = InMemoryStore::new();
        let (user, tenant) = ids();
        create(&store, &user, &tenant).unwrap();
        create(&store, &user, &tenant).unwrap();
        assert_eq!(list_for_user(&store, &user).unwrap().len(), 2);
    }

    #[test]
    fn test_credential_store_resolves_secret() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let (user, tenant) = ids();
        let created = create(store.as_ref(), &user, &tenant).unwrap();

        let provider = CredentialStore::new(Arc::clone(&store));
        let secret = provider.get_secret_key(&created.access_key_id).unwrap();
        assert_eq!(secret, created.secret_access_key);
    }

    #[test]
    fn test_credential_store_resolution_stamps_last_used() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let (user, tenant) = ids();
        let created = create(store.as_ref(), &user, &tenant).unwrap();
        assert!(get(store.as_ref(), &created.access_key_id).unwrap().unwrap().last_used.is_none());

        let provider = CredentialStore::new(Arc::clone(&store));
        provider.get_secret_key(&created.access_key_id).unwrap();
        assert!(get(store.as_ref(), &created.access_key_id).unwrap().unwrap().last_used.is_some());
    }

    #[test]
    fn test_list_for_user_summaries_omits_secret() {
        let store = InMemoryStore::new();
        let (user, tenant) = ids();
        create(&store, &user, &tenant).unwrap();
        let summaries = list_for_user_summaries(&store, &user).unwrap();
        assert_eq!(summaries.len(), 1);
    }

    #[test]
    fn test_credential_store_rejects_unknown_key() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let provider = CredentialStore::new(store);
        assert!(matches!(
            provider.get_secret_key("nope"),
            Err(AuthError::AccessKeyNotFound(_))
        ));
    }
}
