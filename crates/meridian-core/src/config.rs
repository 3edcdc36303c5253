//! Environment-driven configuration (spec §6.4).
//!
//! All configuration is env-var driven; no configuration file parsing is in
//! scope (§1 Non-goals). Every recognized key is listed in
//! [`MeridianConfig::RECOGNIZED_KEYS`]; `from_env` rejects any `MERIDIAN_*`
//! variable outside that set instead of silently ignoring it.

use crate::error::CoreError;

/// Backend used for blob storage. Only `filesystem` is implemented (§1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Local filesystem-backed blob storage.
    #[default]
    Filesystem,
}

/// Global configuration for Meridian, loaded once at process start.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeridianConfig {
    /// Filesystem root under which all persisted state lives.
    pub data_dir: String,
    /// Bind address for the S3 wire protocol surface (out of scope here;
    /// carried for completeness of the §6.4 key set).
    pub listen_s3_addr: String,
    /// Bind address for the console management API surface (out of scope).
    pub listen_console_addr: String,
    /// Public base URL of the S3 API, used when signing presigned URLs.
    pub public_api_url: String,
    /// Public base URL of the console, not used by the core.
    pub public_console_url: String,
    /// Whether TLS termination is enabled (handled outside the core).
    pub enable_tls: bool,
    /// Path to the TLS certificate, when `enable_tls` is set.
    pub tls_cert: Option<String>,
    /// Path to the TLS private key, when `enable_tls` is set.
    pub tls_key: Option<String>,
    /// The blob storage backend kind.
    pub storage_backend: StorageBackendKind,
    /// Root directory for blob storage (§6.3 layout).
    pub storage_root: String,
    /// Whether zstd compression of blobs is enabled.
    pub enable_compression: bool,
    /// Whether per-object envelope encryption is enabled (C3).
    pub enable_encryption: bool,
    /// Base64-encoded 256-bit master key for envelope encryption.
    pub master_key: Option<String>,
    /// Whether Object Lock is available to buckets at all.
    pub enable_object_lock: bool,
    /// HMAC secret used to sign/verify JWTs.
    pub auth_jwt_secret: String,
    /// Access key id materialized for the bootstrap global admin.
    pub auth_bootstrap_access_key: String,
    /// Secret access key materialized for the bootstrap global admin.
    pub auth_bootstrap_secret_key: String,
    /// Whether audit logging is enabled.
    pub audit_enable: bool,
    /// Number of days audit events are retained before sweep.
    pub audit_retention_days: u32,
    /// Whether the metrics core samples and snapshots.
    pub metrics_enable: bool,
    /// Seconds between metrics sampling ticks.
    pub metrics_interval: u64,
    /// Log verbosity passed to the tracing `EnvFilter`.
    pub log_level: String,
}

impl Default for MeridianConfig {
    fn default() -> Self {
        Self {
            data_dir: "/var/lib/meridian".to_owned(),
            listen_s3_addr: "0.0.0.0:9000".to_owned(),
            listen_console_addr: "0.0.0.0:9001".to_owned(),
            public_api_url: "http://localhost:9000".to_owned(),
            public_console_url: "http://localhost:9001".to_owned(),
            enable_tls: false,
            tls_cert: None,
            tls_key: None,
            storage_backend: StorageBackendKind::default(),
            storage_root: "/var/lib/meridian/blobs".to_owned(),
            enable_compression: false,
            enable_encryption: false,
            master_key: None,
            enable_object_lock: false,
            auth_jwt_secret: "change-me".to_owned(),
            auth_bootstrap_access_key: String::new(),
            auth_bootstrap_secret_key: String::new(),
            audit_enable: true,
            audit_retention_days: 90,
            metrics_enable: true,
            metrics_interval: 60,
            log_level: "info".to_owned(),
        }
    }
}

impl MeridianConfig {
    /// The full set of `MERIDIAN_*` environment variable suffixes this
    /// config recognizes. Anything else under the `MERIDIAN_` prefix is
    /// rejected at startup (§6.4: "only these keys are recognized").
    pub const RECOGNIZED_KEYS: &'static [&'static str] = &[
        "DATA_DIR",
        "LISTEN_S3_ADDR",
        "LISTEN_CONSOLE_ADDR",
        "PUBLIC_API_URL",
        "PUBLIC_CONSOLE_URL",
        "ENABLE_TLS",
        "TLS_CERT",
        "TLS_KEY",
        "STORAGE_BACKEND",
        "STORAGE_ROOT",
        "ENABLE_COMPRESSION",
        "ENABLE_ENCRYPTION",
        "MASTER_KEY",
        "ENABLE_OBJECT_LOCK",
        "AUTH_JWT_SECRET",
        "AUTH_BOOTSTRAP_ACCESS_KEY",
        "AUTH_BOOTSTRAP_SECRET_KEY",
        "AUDIT_ENABLE",
        "AUDIT_RETENTION_DAYS",
        "METRICS_ENABLE",
        "METRICS_INTERVAL",
        "LOG_LEVEL",
    ];

    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidInput`] listing every unrecognized
    /// `MERIDIAN_*` variable found, and every recognized boolean/integer
    /// variable that failed to parse.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_iter(std::env::vars())
    }

    /// Load configuration from an arbitrary iterator of `(key, value)`
    /// pairs, as if they were environment variables. Exposed for testing.
    ///
    /// # Errors
    /// See [`MeridianConfig::from_env`].
    pub fn from_iter(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, CoreError> {
        let mut config = Self::default();
        let mut unknown = Vec::new();
        let mut parse_errors = Vec::new();

        for (key, value) in vars {
            let Some(suffix) = key.strip_prefix("MERIDIAN_") else {
                continue;
            };
            if !Self::RECOGNIZED_KEYS.contains(&suffix) {
                unknown.push(key.clone());
                continue;
            }
            if let Err(e) = config.apply(suffix, &value) {
                parse_errors.push(format!("{key}: {e}"));
            }
        }

        if !unknown.is_empty() {
            unknown.sort();
            return Err(CoreError::invalid_input(format!(
                "unrecognized configuration keys: {}",
                unknown.join(", ")
            )));
        }
        if !parse_errors.is_empty() {
            return Err(CoreError::invalid_input(format!(
                "invalid configuration values: {}",
                parse_errors.join("; ")
            )));
        }

        Ok(config)
    }

    fn apply(&mut self, suffix: &str, value: &str) -> Result<(), String> {
        fn parse_bool(v: &str) -> Result<bool, String> {
            Ok(v == "1" || v.eq_ignore_ascii_case("true"))
        }

        match suffix {
            "DATA_DIR" => self.data_dir = value.to_owned(),
            "LISTEN_S3_ADDR" => self.listen_s3_addr = value.to_owned(),
            "LISTEN_CONSOLE_ADDR" => self.listen_console_addr = value.to_owned(),
            "PUBLIC_API_URL" => self.public_api_url = value.to_owned(),
            "PUBLIC_CONSOLE_URL" => self.public_console_url = value.to_owned(),
            "ENABLE_TLS" => self.enable_tls = parse_bool(value)?,
            "TLS_CERT" => self.tls_cert = Some(value.to_owned()),
            "TLS_KEY" => self.tls_key = Some(value.to_owned()),
            "STORAGE_BACKEND" => {
                if value != "filesystem" {
                    return Err(format!("unsupported storage backend: {value}"));
                }
                self.storage_backend = StorageBackendKind::Filesystem;
            }
            "STORAGE_ROOT" => self.storage_root = value.to_owned(),
            "ENABLE_COMPRESSION" => self.enable_compression = parse_bool(value)?,
            "ENABLE_ENCRYPTION" => self.enable_encryption = parse_bool(value)?,
            "MASTER_KEY" => self.master_key = Some(value.to_owned()),
            "ENABLE_OBJECT_LOCK" => self.enable_object_lock = parse_bool(value)?,
            "AUTH_JWT_SECRET" => self.auth_jwt_secret = value.to_owned(),
            "AUTH_BOOTSTRAP_ACCESS_KEY" => self.auth_bootstrap_access_key = value.to_owned(),
            "AUTH_BOOTSTRAP_SECRET_KEY" => self.auth_bootstrap_secret_key = value.to_owned(),
            "AUDIT_ENABLE" => self.audit_enable = parse_bool(value)?,
            "AUDIT_RETENTION_DAYS" => {
                self.audit_retention_days =
                    value.parse().map_err(|_| format!("not a u32: {value}"))?;
            }
            "METRICS_ENABLE" => self.metrics_enable = parse_bool(value)?,
            "METRICS_INTERVAL" => {
                self.metrics_interval =
                    value.parse().map_err(|_| format!("not a u64: {value}"))?;
            }
            "LOG_LEVEL" => self.log_level = value.to_owned(),
            _ => unreachable!("filtered by RECOGNIZED_KEYS"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = MeridianConfig::default();
        assert_eq!(config.listen_s3_addr, "0.0.0.0:9000");
        assert!(!config.enable_encryption);
    }

    #[test]
    fn test_should_apply_recognized_keys() {
        let config = MeridianConfig::from_iter(vec![
            ("MERIDIAN_DATA_DIR".to_owned(), "/data".to_owned()),
            ("MERIDIAN_ENABLE_ENCRYPTION".to_owned(), "true".to_owned()),
            ("MERIDIAN_AUDIT_RETENTION_DAYS".to_owned(), "30".to_owned()),
            ("UNRELATED_VAR".to_owned(), "ignored".to_owned()),
        ])
        .unwrap();
        assert_eq!(config.data_dir, "/data");
        assert!(config.enable_encryption);
        assert_eq!(config.audit_retention_days, 30);
    }

    #[test]
    fn test_should_reject_unknown_meridian_key() {
        let err = MeridianConfig::from_iter(vec![(
            "MERIDIAN_TOTALLY_MADE_UP".to_owned(),
            "x".to_owned(),
        )])
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_should_reject_unparseable_value() {
        let err = MeridianConfig::from_iter(vec![(
            "MERIDIAN_AUDIT_RETENTION_DAYS".to_owned(),
            "not-a-number".to_owned(),
        )])
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}
