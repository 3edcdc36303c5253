//! Meridian core process.
//!
//! Bootstraps the metadata store, blob backend, auth manager, and object
//! engine, then runs the background workers (lifecycle sweeps, replication
//! drain, metrics sampling, audit retention) until shutdown. There is no
//! wire protocol here: the S3 HTTP surface is an external collaborator
//! (`RequestBoundary` in the component model) that is out of scope.
//!
//! # Environment Variables
//!
//! See [`meridian_core::MeridianConfig`] for the full `MERIDIAN_*` key set.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use meridian_auth::AuthManager;
use meridian_blob::{BlobBackend, EncryptionLayer, FilesystemBlobBackend};
use meridian_core::MeridianConfig;
use meridian_metadata::{InMemoryStore, MetadataStore};
use meridian_metrics::{AuditLog, MetricsCore};
use meridian_metrics::metrics::NullResourceSampler;
use meridian_objects::{BucketManager, ObjectManager};
use meridian_workers::{LifecycleWorker, NullReplicationTransport, ReplicationEngine, ShareManager};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Server version reported in startup logs.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `MERIDIAN_LOG_LEVEL`
/// config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level).with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    Ok(())
}

/// Build the blob backend, wrapping it with [`EncryptionLayer`] when
/// `enable_encryption` is set.
fn build_blob_backend(config: &MeridianConfig) -> Result<Arc<dyn BlobBackend>> {
    let fs = FilesystemBlobBackend::new(&config.storage_root).with_context(|| format!("failed to open blob storage root: {}", config.storage_root))?;

    if !config.enable_encryption {
        return Ok(Arc::new(fs));
    }

    let master_key = config.master_key.as_deref().context("MERIDIAN_MASTER_KEY must be set when MERIDIAN_ENABLE_ENCRYPTION is true")?;
    let key_bytes = BASE64.decode(master_key).context("MERIDIAN_MASTER_KEY must be base64-encoded")?;
    let layer = EncryptionLayer::new(fs, &key_bytes)?;
    Ok(Arc::new(layer))
}

/// Periodically sample metrics and sweep expired audit events, on top of the
/// bucket/share/replication sweeps [`LifecycleWorker`] already drives.
async fn run_ambient_sweeps(metrics: Arc<MetricsCore>, audit: Arc<AuditLog>, config: MeridianConfig, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(StdDuration::from_secs(config.metrics_interval.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                if config.metrics_enable {
                    metrics.maybe_snapshot(now, &NullResourceSampler);
                }
                if config.audit_enable {
                    match audit.sweep_retention(config.audit_retention_days, now) {
                        Ok(removed) if removed > 0 => info!(removed, "swept expired audit events"),
                        Ok(_) => {}
                        Err(error) => warn!(%error, "audit retention sweep failed"),
                    }
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

#[tokio::main]
async fn main() -> Result<()> {
    let config = MeridianConfig::from_env()?;
    init_tracing(&config.log_level)?;

    info!(
        data_dir = %config.data_dir,
        storage_root = %config.storage_root,
        enable_encryption = config.enable_encryption,
        enable_object_lock = config.enable_object_lock,
        version = VERSION,
        "starting Meridian core",
    );

    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());
    let blob = build_blob_backend(&config)?;

    let auth = AuthManager::new(store.clone(), config.auth_jwt_secret.clone());
    if !config.auth_bootstrap_access_key.is_empty() && !config.auth_bootstrap_secret_key.is_empty() {
        auth.bootstrap(&config.auth_bootstrap_access_key, &config.auth_bootstrap_secret_key, "admin")?;
    }

    let buckets = Arc::new(BucketManager::new(store.clone()));
    let objects = Arc::new(ObjectManager::new(store.clone(), blob.clone(), buckets.clone()));
    let shares = Arc::new(ShareManager::new(store.clone()));
    let replication = Arc::new(ReplicationEngine::new(store.clone(), blob.clone(), Arc::new(NullReplicationTransport)));
    let metrics = Arc::new(MetricsCore::new());
    let audit = Arc::new(AuditLog::new(store.clone()));

    let lifecycle = Arc::new(LifecycleWorker::with_default_interval(buckets.clone(), objects.clone(), shares.clone(), replication.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let lifecycle_task = tokio::spawn(lifecycle.clone().run(shutdown_rx.clone()));
    let sweeps_task = tokio::spawn(run_ambient_sweeps(metrics.clone(), audit.clone(), config.clone(), shutdown_rx));

    tokio::signal::ctrl_c().await.ok();
    info!("received shutdown signal, stopping background workers");
    shutdown_tx.send(true).ok();

    let _ = tokio::join!(lifecycle_task, sweeps_task);
    info!("Meridian core stopped");

    Ok(())
}
