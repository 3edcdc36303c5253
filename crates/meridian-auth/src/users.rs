//! Tenant and user CRUD against the [`MetadataStore`] (§3, §4.1).

use meridian_core::{CoreError, CoreResult, TenantId, UserId};
use meridian_metadata::{MetadataStore, keys};

use crate::model::{Status, Tenant, TenantCounters, User, UserStatus};

fn encode<T: serde::Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CoreError::Internal(anyhow::anyhow!("encode: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::Internal(anyhow::anyhow!("decode: {e}")))
}

/// Create a tenant. Fails with [`CoreError::AlreadyExists`] if the id is
/// taken.
pub fn create_tenant(store: &dyn MetadataStore, tenant: &Tenant) -> CoreResult<()> {
    let key = keys::tenant(tenant.id.as_str());
    let inserted = store.compare_and_set(&key, None, encode(tenant)?)?;
    if !inserted {
        return Err(CoreError::AlreadyExists(format!("tenant {}", tenant.id)));
    }
    Ok(())
}

/// Fetch a tenant by id.
pub fn get_tenant(store: &dyn MetadataStore, id: &TenantId) -> CoreResult<Option<Tenant>> {
    match store.get(&keys::tenant(id.as_str()))? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Set a tenant's status (`Active`/`Suspended`).
pub fn set_tenant_status(store: &dyn MetadataStore, id: &TenantId, status: Status) -> CoreResult<()> {
    let key = keys::tenant(id.as_str());
    let Some(bytes) = store.get(&key)? else {
        return Err(CoreError::not_found(format!("tenant {id}")));
    };
    let mut tenant: Tenant = decode(&bytes)?;
    tenant.status = status;
    store.put(&key, encode(&tenant)?)
}

/// Read a tenant's live counters by peeking each `counters.<field>` atomic
/// (an `atomic_add` of zero returns the current value unchanged).
pub fn tenant_counters(store: &dyn MetadataStore, id: &TenantId) -> CoreResult<TenantCounters> {
    Ok(TenantCounters {
        buckets: store.atomic_add(&keys::tenant_counter(id.as_str(), "buckets"), 0)?,
        storage_bytes: store.atomic_add(&keys::tenant_counter(id.as_str(), "storage_bytes"), 0)?,
        access_keys: store.atomic_add(&keys::tenant_counter(id.as_str(), "access_keys"), 0)?,
    })
}

/// List all tenants. Diagnostic/admin use only -- per §9's resolved open
/// question, this must never be the hot path for usage figures, which come
/// from [`tenant_counters`] instead.
pub fn list_tenants(store: &dyn MetadataStore) -> CoreResult<Vec<Tenant>> {
    let scan = store.scan("T/", None, usize::MAX)?;
    scan.items
        .into_iter()
        .filter(|(k, _)| !k.contains("/counters."))
        .map(|(_, v)| decode(&v))
        .collect()
}

/// Create a user. Fails with [`CoreError::AlreadyExists`] if the id is
/// taken.
pub fn create_user(store: &dyn MetadataStore, user: &User) -> CoreResult<()> {
    let key = keys::user(user.id.as_str());
    let inserted = store.compare_and_set(&key, None, encode(user)?)?;
    if !inserted {
        return Err(CoreError::AlreadyExists(format!("user {}", user.id)));
    }
    Ok(())
}

/// Fetch a user by id.
pub fn get_user(store: &dyn MetadataStore, id: &UserId) -> CoreResult<Option<User>> {
    match store.get(&keys::user(id.as_str()))? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Find a user by username, scanning all users. Acceptable here because
/// login is not a hot path the way object GET/PUT are; a real deployment
/// would add a secondary username index if this become a bottleneck.
pub fn find_user_by_username(store: &dyn MetadataStore, username: &str) -> CoreResult<Option<User>> {
    let scan = store.scan("U/", None, usize::MAX)?;
    for (key, value) in scan.items {
        // Skip `/2fa` and `/lockout` subkeys; only bare `U/<id>` records
        // decode as a `User`.
        if key.matches('/').count() != 1 {
            continue;
        }
        let user: User = decode(&value)?;
        if user.username == username {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

/// Persist an updated user record in place.
pub fn save_user(store: &dyn MetadataStore, user: &User) -> CoreResult<()> {
    store.put(&keys::user(user.id.as_str()), encode(user)?)
}

/// Set a user's status (`Active`/`Locked`/`Disabled`), an admin-facing
/// action independent of the automatic lockout counter in
/// [`crate::model::LockoutState`].
pub fn set_user_status(store: &dyn MetadataStore, id: &UserId, status: UserStatus) -> CoreResult<()> {
    let key = keys::user(id.as_str());
    let Some(bytes) = store.get(&key)? else {
        return Err(CoreError::not_found(format!("user {id}")));
    };
    let mut user: User = decode(&bytes)?;
    user.status = status;
    store.put(&key, encode(&user)?)
}
