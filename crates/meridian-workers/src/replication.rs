//! `ReplicationEngine` (§4.8, spec C10): durable per-rule queues drained in
//! order, with exponential backoff on failure.
//!
//! The remote call itself is out of scope -- this crate only owns queueing,
//! ordering, and retry policy. [`ReplicationTransport`] is the capability
//! boundary a caller plugs a real HTTP client into, the same way
//! `meridian_blob::BlobBackend` is a capability boundary for object bytes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use meridian_blob::{BlobBackend, PhysicalKey};
use meridian_core::{CoreError, CoreResult};
use meridian_metadata::{MetadataStore, keys};

use crate::model::{ReplicationOp, ReplicationRule, ReplicationStatus, ReplicationTask};

const BASE_BACKOFF_SECS: i64 = 5;
const MAX_BACKOFF_SECS: i64 = 3600;

fn encode_rule(rule: &ReplicationRule) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(rule).map_err(|e| CoreError::Internal(anyhow::anyhow!("encode replication rule: {e}")))
}

fn decode_rule(bytes: &[u8]) -> CoreResult<ReplicationRule> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::Internal(anyhow::anyhow!("decode replication rule: {e}")))
}

fn encode_task(task: &ReplicationTask) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(task).map_err(|e| CoreError::Internal(anyhow::anyhow!("encode replication task: {e}")))
}

fn decode_task(bytes: &[u8]) -> CoreResult<ReplicationTask> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::Internal(anyhow::anyhow!("decode replication task: {e}")))
}

/// A peer replication endpoint, reached by whatever transport (HTTP client,
/// test double, ...) the caller wires in. One `put`/`delete` call replays
/// one [`ReplicationTask`] remotely.
#[async_trait]
pub trait ReplicationTransport: Send + Sync {
    /// Replicate an object's bytes to `(dest_endpoint, dest_bucket, key)`.
    /// Implementations should treat a replay of the same
    /// `(key, version_id, content_hash)` as a no-op (§4.8).
    async fn put(&self, dest_endpoint: &str, dest_bucket: &str, key: &str, version_id: &str, content_hash: &str, body: &[u8]) -> CoreResult<()>;

    /// Replicate a deletion to `(dest_endpoint, dest_bucket, key)`.
    async fn delete(&self, dest_endpoint: &str, dest_bucket: &str, key: &str, version_id: &str) -> CoreResult<()>;
}

/// Logs every call and succeeds without making a network call. The default
/// transport until a real HTTP client is wired in; keeps the queue draining
/// (and its backoff/retry bookkeeping) exercised even with no peer reachable.
#[derive(Debug, Default)]
pub struct NullReplicationTransport;

#[async_trait]
impl ReplicationTransport for NullReplicationTransport {
    async fn put(&self, dest_endpoint: &str, dest_bucket: &str, key: &str, version_id: &str, content_hash: &str, body: &[u8]) -> CoreResult<()> {
        tracing::debug!(dest_endpoint, dest_bucket, key, version_id, content_hash, bytes = body.len(), "replication transport not configured, dropping put");
        Ok(())
    }

    async fn delete(&self, dest_endpoint: &str, dest_bucket: &str, key: &str, version_id: &str) -> CoreResult<()> {
        tracing::debug!(dest_endpoint, dest_bucket, key, version_id, "replication transport not configured, dropping delete");
        Ok(())
    }
}

/// Owns replication rules and their durable task queues (spec C10).
pub struct ReplicationEngine {
    store: Arc<dyn MetadataStore>,
    blob: Arc<dyn BlobBackend>,
    transport: Arc<dyn ReplicationTransport>,
}

impl ReplicationEngine {
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>, blob: Arc<dyn BlobBackend>, transport: Arc<dyn ReplicationTransport>) -> Self {
        Self { store, blob, transport }
    }

    pub fn create_rule(&self, rule: ReplicationRule) -> CoreResult<()> {
        let key = keys::replication_rule(&rule.rule_id);
        let inserted = self.store.compare_and_set(&key, None, encode_rule(&rule)?)?;
        if !inserted {
            return Err(CoreError::AlreadyExists(format!("replication rule {}", rule.rule_id)));
        }
        Ok(())
    }

    pub fn get_rule(&self, rule_id: &str) -> CoreResult<Option<ReplicationRule>> {
        match self.store.get(&keys::replication_rule(rule_id))? {
            Some(bytes) => Ok(Some(decode_rule(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_rules(&self) -> CoreResult<Vec<ReplicationRule>> {
        let scan = self.store.scan(keys::replication_rule_prefix(), None, usize::MAX)?;
        scan.items
            .into_iter()
            .filter(|(k, _)| !k.starts_with("R/queue/") && !k.starts_with("R/seq/"))
            .map(|(_, v)| decode_rule(&v))
            .collect()
    }

    pub fn set_enabled(&self, rule_id: &str, enabled: bool) -> CoreResult<()> {
        let key = keys::replication_rule(rule_id);
        loop {
            let Some(bytes) = self.store.get(&key)? else {
                return Err(CoreError::not_found(format!("replication rule {rule_id}")));
            };
            let mut rule = decode_rule(&bytes)?;
            rule.enabled = enabled;
            if self.store.compare_and_set(&key, Some(&bytes), encode_rule(&rule)?)? {
                return Ok(());
            }
        }
    }

    /// Enqueue a task for `rule_id`. The queue's `seq` counter is private to
    /// this module (not part of the canonical key schema) since it only
    /// orders one rule's own queue.
    pub fn enqueue(&self, rule_id: &str, object_key: &str, op: ReplicationOp, version_id: &str, content_hash: Option<String>) -> CoreResult<()> {
        let seq = u64::try_from(self.store.atomic_add(&format!("R/seq/{rule_id}"), 1)?).unwrap_or(0);
        let task = ReplicationTask {
            task_id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule_id.to_owned(),
            seq,
            object_key: object_key.to_owned(),
            op,
            version_id: version_id.to_owned(),
            content_hash,
            attempts: 0,
            next_attempt_at: Utc::now(),
            status: ReplicationStatus::Pending,
        };
        self.store.put(&keys::replication_task(rule_id, seq), encode_task(&task)?)
    }

    /// Drain `rule_id`'s queue in order, skipping tasks whose backoff hasn't
    /// elapsed. Returns how many tasks were successfully applied and
    /// removed.
    pub async fn drain_rule(&self, rule_id: &str, now: DateTime<Utc>) -> CoreResult<usize> {
        let rule = self.get_rule(rule_id)?.ok_or_else(|| CoreError::not_found(format!("replication rule {rule_id}")))?;
        if !rule.enabled {
            return Ok(0);
        }

        let prefix = keys::replication_queue_prefix(rule_id);
        let scan = self.store.scan(&prefix, None, usize::MAX)?;
        let mut processed = 0;

        for (key, bytes) in scan.items {
            let mut task = decode_task(&bytes)?;
            if task.status == ReplicationStatus::Failed && task.next_attempt_at > now {
                continue;
            }

            let outcome = self.apply(&rule, &task).await;
            match outcome {
                Ok(()) => {
                    self.store.delete(&key)?;
                    processed += 1;
                }
                Err(_) => {
                    task.attempts += 1;
                    let backoff_secs = BASE_BACKOFF_SECS.saturating_mul(1_i64 << task.attempts.min(20)).min(MAX_BACKOFF_SECS);
                    task.next_attempt_at = now + Duration::seconds(backoff_secs);
                    task.status = ReplicationStatus::Failed;
                    self.store.put(&key, encode_task(&task)?)?;
                }
            }
        }
        Ok(processed)
    }

    /// Requeue every `Failed` task across every rule whose backoff has
    /// elapsed, for the lifecycle worker's tick (§4.7: "Replication tasks
    /// with `status=failed` and `next_attempt_at <= now`: re-enqueue").
    /// Because `drain_rule` already re-evaluates `next_attempt_at` itself,
    /// this simply drains every enabled rule.
    pub async fn requeue_due(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let mut total = 0;
        for rule in self.list_rules()? {
            total += self.drain_rule(&rule.rule_id, now).await?;
        }
        Ok(total)
    }

    async fn apply(&self, rule: &ReplicationRule, task: &ReplicationTask) -> CoreResult<()> {
        match task.op {
            ReplicationOp::Put => {
                let hash = task.content_hash.as_deref().ok_or_else(|| CoreError::invalid_input("put task missing content hash"))?;
                let body = self.blob.get(&PhysicalKey::from_hex(hash.to_owned())).await?;
                self.transport
                    .put(&rule.dest_endpoint, &rule.dest_bucket, &task.object_key, &task.version_id, hash, &body)
                    .await
            }
            ReplicationOp::Delete => self.transport.delete(&rule.dest_endpoint, &rule.dest_bucket, &task.object_key, &task.version_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use meridian_blob::FilesystemBlobBackend;
    use meridian_core::TenantId;
    use meridian_metadata::InMemoryStore;

    use super::*;

    struct FlakyTransport {
        fail_first_n: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReplicationTransport for FlakyTransport {
        async fn put(&self, _dest_endpoint: &str, _dest_bucket: &str, _key: &str, _version_id: &str, _content_hash: &str, _body: &[u8]) -> CoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first_n.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > 0).then_some(n - 1)).is_ok() {
                return Err(CoreError::TransientStorage("peer unreachable".into()));
            }
            Ok(())
        }

        async fn delete(&self, _dest_endpoint: &str, _dest_bucket: &str, _key: &str, _version_id: &str) -> CoreResult<()> {
            Ok(())
        }
    }

    fn rule() -> ReplicationRule {
        ReplicationRule {
            rule_id: "r1".to_owned(),
            tenant_id: TenantId::new("t1").unwrap(),
            src_bucket: "t1/b".to_owned(),
            dest_endpoint: "https://peer.example".to_owned(),
            dest_bucket: "b".to_owned(),
            dest_credentials: String::new(),
            parallelism: 1,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_drain_applies_and_removes_pending_task() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let blob: Arc<dyn BlobBackend> = Arc::new(FilesystemBlobBackend::new(dir.path()).unwrap());
        let key = PhysicalKey::of(b"payload");
        blob.put(&key, b"payload").await.unwrap();

        let transport = Arc::new(FlakyTransport {
            fail_first_n: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let engine = ReplicationEngine::new(store, blob, transport.clone());
        engine.create_rule(rule()).unwrap();
        engine.enqueue("r1", "k", ReplicationOp::Put, "v1", Some(key.as_str().to_owned())).unwrap();

        let processed = engine.drain_rule("r1", Utc::now()).await.unwrap();
        assert_eq!(processed, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_task_schedules_backoff_and_is_skipped_until_due() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let blob: Arc<dyn BlobBackend> = Arc::new(FilesystemBlobBackend::new(dir.path()).unwrap());
        let key = PhysicalKey::of(b"payload");
        blob.put(&key, b"payload").await.unwrap();

        let transport = Arc::new(FlakyTransport {
            fail_first_n: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
        });
        let engine = ReplicationEngine::new(store, blob, transport.clone());
        engine.create_rule(rule()).unwrap();
        engine.enqueue("r1", "k", ReplicationOp::Put, "v1", Some(key.as_str().to_owned())).unwrap();

        let now = Utc::now();
        assert_eq!(engine.drain_rule("r1", now).await.unwrap(), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        // Not due yet: draining again immediately makes no further call.
        assert_eq!(engine.drain_rule("r1", now).await.unwrap(), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        // Past the backoff window: retried and succeeds.
        let later = now + Duration::seconds(BASE_BACKOFF_SECS * 2 + 1);
        assert_eq!(engine.drain_rule("r1", later).await.unwrap(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_rule_does_not_drain() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let blob: Arc<dyn BlobBackend> = Arc::new(FilesystemBlobBackend::new(dir.path()).unwrap());
        let transport = Arc::new(FlakyTransport {
            fail_first_n: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let engine = ReplicationEngine::new(store, blob, transport.clone());
        let mut r = rule();
        r.enabled = false;
        engine.create_rule(r).unwrap();
        engine.enqueue("r1", "k", ReplicationOp::Delete, "v1", None).unwrap();
        assert_eq!(engine.drain_rule("r1", Utc::now()).await.unwrap(), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
