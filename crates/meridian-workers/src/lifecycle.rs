//! `LifecycleWorker` (§4.7, spec C9): the single wall-clock-tick scheduler
//! that sweeps object expiration, noncurrent-version expiration, delete
//! marker collapse, share expiry, and failed replication retry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use meridian_core::CoreResult;
use meridian_objects::model::Bucket;
use meridian_objects::{BucketManager, ObjectManager};
use tracing::{debug, info, warn};

use crate::replication::ReplicationEngine;
use crate::share::ShareManager;

/// Counts of work done in one [`LifecycleWorker::tick`], surfaced for
/// logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleReport {
    pub current_versions_expired: usize,
    pub noncurrent_versions_expired: usize,
    pub delete_markers_collapsed: usize,
    pub shares_swept: usize,
    pub replication_tasks_requeued: usize,
}

/// Drives every periodic sweep named in §4.7 on a single wall-clock tick
/// (default 60s).
pub struct LifecycleWorker {
    buckets: Arc<BucketManager>,
    objects: Arc<ObjectManager>,
    shares: Arc<ShareManager>,
    replication: Arc<ReplicationEngine>,
    tick_interval: StdDuration,
    /// Stands in for the distributed, cross-node lock §4.7 describes
    /// ("held for the duration of processing that bucket, to prevent
    /// overlap with concurrent ticks on peer nodes"). There's no clustering
    /// component in this workspace, so a single process's in-memory guard
    /// is the whole of what "distributed lock" reduces to here; documented
    /// as a simplification rather than a faithful redesign.
    bucket_locks: DashMap<String, ()>,
}

impl LifecycleWorker {
    #[must_use]
    pub fn new(buckets: Arc<BucketManager>, objects: Arc<ObjectManager>, shares: Arc<ShareManager>, replication: Arc<ReplicationEngine>, tick_interval: StdDuration) -> Self {
        Self {
            buckets,
            objects,
            shares,
            replication,
            tick_interval,
            bucket_locks: DashMap::new(),
        }
    }

    /// Default 60-second tick interval (§4.7).
    #[must_use]
    pub fn with_default_interval(buckets: Arc<BucketManager>, objects: Arc<ObjectManager>, shares: Arc<ShareManager>, replication: Arc<ReplicationEngine>) -> Self {
        Self::new(buckets, objects, shares, replication, StdDuration::from_secs(60))
    }

    /// Run the tick loop until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(report) => info!(?report, "lifecycle tick complete"),
                        Err(error) => warn!(%error, "lifecycle tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Run one sweep over every bucket, plus shares and replication.
    pub async fn tick(&self, now: DateTime<Utc>) -> CoreResult<LifecycleReport> {
        let mut report = LifecycleReport::default();

        for bucket in self.buckets.list_all()? {
            if bucket.config.lifecycle_rules.is_empty() {
                continue;
            }
            let bucket_key = format!("{}/{}", bucket.tenant_id.as_str(), bucket.name);
            if self.bucket_locks.insert(bucket_key.clone(), ()).is_some() {
                debug!(bucket = %bucket.name, "lifecycle lock already held, skipping this tick");
                continue;
            }
            let outcome = self.sweep_bucket(&bucket, now).await;
            self.bucket_locks.remove(&bucket_key);
            let (expired, noncurrent, collapsed) = outcome?;
            report.current_versions_expired += expired;
            report.noncurrent_versions_expired += noncurrent;
            report.delete_markers_collapsed += collapsed;
        }

        report.shares_swept = self.shares.sweep_expired(now)?;
        report.replication_tasks_requeued = self.replication.requeue_due(now).await?;
        Ok(report)
    }

    async fn sweep_bucket(&self, bucket: &Bucket, now: DateTime<Utc>) -> CoreResult<(usize, usize, usize)> {
        let mut expired = 0;
        let mut noncurrent_expired = 0;
        let mut collapsed = 0;

        let keys = self.objects.list_object_keys(bucket)?;
        let rules: Vec<_> = bucket.config.lifecycle_rules.iter().filter(|r| r.enabled).collect();

        let mut already_swept: HashSet<String> = HashSet::new();
        for key in keys {
            let Some(rule) = rules.iter().find(|r| key.starts_with(r.prefix.as_str())) else {
                continue;
            };
            if !already_swept.insert(key.clone()) {
                continue;
            }

            let versions = self.objects.list_versions(bucket, &key)?;
            let Some(current) = versions.iter().find(|v| v.is_latest) else {
                continue;
            };

            if let Some(days) = rule.expiration_days {
                if !current.version.is_delete_marker && now - current.version.last_modified >= Duration::days(i64::from(days)) {
                    match self.objects.delete(bucket, &key, None, false).await {
                        Ok(_) => {
                            expired += 1;
                            continue;
                        }
                        Err(error) => {
                            debug!(%error, key = %key, "current-version expiration skipped a locked object");
                            continue;
                        }
                    }
                }
            }

            if rule.expired_object_delete_marker && versions.len() == 1 && current.version.is_delete_marker {
                match self.objects.delete(bucket, &key, Some(&current.version.version_id), false).await {
                    Ok(_) => collapsed += 1,
                    Err(error) => debug!(%error, key = %key, "delete marker collapse failed"),
                }
                continue;
            }

            if let Some(days) = rule.noncurrent_expiration_days {
                for version in versions.iter().filter(|v| !v.is_latest) {
                    if now - version.version.last_modified < Duration::days(i64::from(days)) {
                        continue;
                    }
                    match self.objects.delete(bucket, &key, Some(&version.version.version_id), false).await {
                        Ok(_) => noncurrent_expired += 1,
                        Err(error) => debug!(%error, key = %key, version = %version.version.version_id, "noncurrent expiration skipped a locked version"),
                    }
                }
            }
        }

        Ok((expired, noncurrent_expired, collapsed))
    }
}
