//! `AuditLog` (§4.10, spec C12): append-only audit trail with filtered,
//! paged listing and a retention sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use meridian_core::{CoreError, CoreResult};
use meridian_metadata::{MetadataStore, keys};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_PAGE_SIZE: usize = 100;

/// One audit record (§3). `id` is monotonically increasing across the whole
/// log, independent of the composite `A/<ts>/<seq>` storage key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: u64,
    pub ts: DateTime<Utc>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub event_type: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub status: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<Value>,
}

/// Fields an audit event is appended with; `id`/`ts` are assigned by
/// [`AuditLog::append`].
#[derive(Debug, Clone, Default)]
pub struct AuditEventInput {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub event_type: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub status: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<Value>,
}

/// Filter predicates for [`AuditLog::list`]; every field is optional and
/// combined with logical AND.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub event_type: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<String>,
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        self.tenant_id.as_deref().is_none_or(|t| event.tenant_id.as_deref() == Some(t))
            && self.user_id.as_deref().is_none_or(|u| event.user_id.as_deref() == Some(u))
            && self.event_type.as_deref().is_none_or(|e| event.event_type == e)
            && self.resource_type.as_deref().is_none_or(|r| event.resource_type == r)
            && self.resource_id.as_deref().is_none_or(|r| event.resource_id == r)
            && self.action.as_deref().is_none_or(|a| event.action == a)
            && self.status.as_deref().is_none_or(|s| event.status == s)
            && self.since.is_none_or(|since| event.ts >= since)
            && self.until.is_none_or(|until| event.ts <= until)
    }
}

/// A page of [`AuditLog::list`] results.
#[derive(Debug, Clone, Default)]
pub struct AuditPage {
    pub events: Vec<AuditEvent>,
    pub has_more: bool,
}

fn encode(event: &AuditEvent) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(event).map_err(|e| CoreError::Internal(anyhow::anyhow!("encode audit event: {e}")))
}

fn decode(bytes: &[u8]) -> CoreResult<AuditEvent> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::Internal(anyhow::anyhow!("decode audit event: {e}")))
}

/// Append-only audit trail (spec C12). Storage order follows `A/<ts>/<seq>`
/// (plain, not descending-sortable, unlike object version ids), so a scan
/// yields events oldest-first.
pub struct AuditLog {
    store: Arc<dyn MetadataStore>,
}

impl AuditLog {
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Append one event at `now`, assigning it the next monotonic id
    /// (§3: "monotonically increasing id").
    pub fn append(&self, input: AuditEventInput, now: DateTime<Utc>) -> CoreResult<AuditEvent> {
        let id = u64::try_from(self.store.atomic_add("A/seq", 1)?).unwrap_or(0);
        let event = AuditEvent {
            id,
            ts: now,
            tenant_id: input.tenant_id,
            user_id: input.user_id,
            username: input.username,
            event_type: input.event_type,
            resource_type: input.resource_type,
            resource_id: input.resource_id,
            action: input.action,
            status: input.status,
            ip: input.ip,
            user_agent: input.user_agent,
            details: input.details,
        };
        let micros = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        self.store.put(&keys::audit_event(micros, id), encode(&event)?)?;
        Ok(event)
    }

    /// List events matching `filter`, paged with `page` (1-based) and
    /// `page_size` (clamped to 100, §4.10).
    pub fn list(&self, filter: &AuditFilter, page: u32, page_size: u32) -> CoreResult<AuditPage> {
        let page_size = (page_size.max(1) as usize).min(MAX_PAGE_SIZE);
        let page = page.max(1) as usize;
        let skip = (page - 1) * page_size;

        let scan = self.store.scan(keys::audit_prefix(), None, usize::MAX)?;
        let mut matched = Vec::new();
        for (key, bytes) in scan.items {
            if key == "A/seq" {
                continue;
            }
            let event = decode(&bytes)?;
            if filter.matches(&event) {
                matched.push(event);
            }
        }

        let has_more = matched.len() > skip + page_size;
        let events = matched.into_iter().skip(skip).take(page_size).collect();
        Ok(AuditPage { events, has_more })
    }

    /// Delete every event older than `retention_days`, relative to `now`
    /// (§4.10). Returns the count removed.
    pub fn sweep_retention(&self, retention_days: u32, now: DateTime<Utc>) -> CoreResult<usize> {
        let cutoff = now - Duration::days(i64::from(retention_days));
        let scan = self.store.scan(keys::audit_prefix(), None, usize::MAX)?;
        let mut removed = 0;
        for (key, bytes) in scan.items {
            if key == "A/seq" {
                continue;
            }
            let event = decode(&bytes)?;
            if event.ts < cutoff {
                self.store.delete(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_metadata::InMemoryStore;

    fn input(event_type: &str, status: &str) -> AuditEventInput {
        AuditEventInput {
            tenant_id: Some("t1".to_owned()),
            user_id: Some("u1".to_owned()),
            username: Some("alice".to_owned()),
            event_type: event_type.to_owned(),
            resource_type: "object".to_owned(),
            resource_id: "photos/a.jpg".to_owned(),
            action: "put".to_owned(),
            status: status.to_owned(),
            ip: None,
            user_agent: None,
            details: None,
        }
    }

    #[test]
    fn test_append_assigns_monotonic_ids() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let log = AuditLog::new(store);
        let now = Utc::now();
        let a = log.append(input("object.put", "ok"), now).unwrap();
        let b = log.append(input("object.put", "ok"), now).unwrap();
        assert_eq!(b.id, a.id + 1);
    }

    #[test]
    fn test_list_filters_by_event_type_and_status() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let log = AuditLog::new(store);
        let now = Utc::now();
        log.append(input("object.put", "ok"), now).unwrap();
        log.append(input("object.delete", "ok"), now).unwrap();
        log.append(input("object.put", "error"), now).unwrap();

        let filter = AuditFilter {
            event_type: Some("object.put".to_owned()),
            status: Some("ok".to_owned()),
            ..AuditFilter::default()
        };
        let page = log.list(&filter, 1, 10).unwrap();
        assert_eq!(page.events.len(), 1);
    }

    #[test]
    fn test_list_paginates_with_has_more() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let log = AuditLog::new(store);
        let now = Utc::now();
        for _ in 0..5 {
            log.append(input("object.put", "ok"), now).unwrap();
        }
        let page1 = log.list(&AuditFilter::default(), 1, 2).unwrap();
        assert_eq!(page1.events.len(), 2);
        assert!(page1.has_more);
        let page3 = log.list(&AuditFilter::default(), 3, 2).unwrap();
        assert_eq!(page3.events.len(), 1);
        assert!(!page3.has_more);
    }

    #[test]
    fn test_sweep_retention_removes_only_old_events() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let log = AuditLog::new(store);
        let now = Utc::now();
        log.append(input("object.put", "ok"), now - Duration::days(10)).unwrap();
        log.append(input("object.put", "ok"), now).unwrap();

        let removed = log.sweep_retention(7, now).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(log.list(&AuditFilter::default(), 1, 10).unwrap().events.len(), 1);
    }
}
