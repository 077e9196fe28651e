use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use secrecy::SecretSlice;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::qr::signer::MIN_KEY_LEN;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub qr: QrConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// `SQLite` connection URL
    pub database_path: String,

    /// Default filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Tokio worker threads (0 = one per core)
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/clockin.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Base URL used to build scan and leave links. When unset the request
    /// `Host` header is used.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 6790,
            cors_allowed_origins: vec![
                "http://localhost:6790".to_string(),
                "http://127.0.0.1:6790".to_string(),
            ],
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayBackend {
    /// Process-local; single instance only.
    #[default]
    Memory,
    /// `qr_replay_marks` table, shared by every instance on the database.
    Database,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    /// Base64 HMAC key. The environment variable named by `hmac_key_env`
    /// takes precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac_key: Option<String>,

    pub hmac_key_env: String,

    pub standing_validity_days: u32,

    pub short_validity_minutes: u32,

    pub api_max_latency_seconds: u32,

    pub scan_max_latency_seconds: u32,

    pub replay_ttl_seconds: u32,

    pub enforce_payload_expiry_api: bool,

    pub enforce_payload_expiry_scan: bool,

    pub replay_backend: ReplayBackend,

    pub pixels_per_module: u32,

    pub create_retry_attempts: u32,

    pub create_retry_backoff_ms: u64,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            hmac_key: None,
            hmac_key_env: "CLOCKIN_QR_HMAC_KEY".to_string(),
            standing_validity_days: 7,
            short_validity_minutes: 10,
            api_max_latency_seconds: 120,
            scan_max_latency_seconds: 900,
            replay_ttl_seconds: 180,
            enforce_payload_expiry_api: true,
            enforce_payload_expiry_scan: false,
            replay_backend: ReplayBackend::Memory,
            pixels_per_module: 6,
            create_retry_attempts: 5,
            create_retry_backoff_ms: 25,
        }
    }
}

impl fmt::Debug for QrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QrConfig")
            .field("hmac_key", &self.hmac_key.as_ref().map(|_| "[REDACTED]"))
            .field("hmac_key_env", &self.hmac_key_env)
            .field("standing_validity_days", &self.standing_validity_days)
            .field("short_validity_minutes", &self.short_validity_minutes)
            .field("api_max_latency_seconds", &self.api_max_latency_seconds)
            .field("scan_max_latency_seconds", &self.scan_max_latency_seconds)
            .field("replay_ttl_seconds", &self.replay_ttl_seconds)
            .field("enforce_payload_expiry_api", &self.enforce_payload_expiry_api)
            .field("enforce_payload_expiry_scan", &self.enforce_payload_expiry_scan)
            .field("replay_backend", &self.replay_backend)
            .field("pixels_per_module", &self.pixels_per_module)
            .field("create_retry_attempts", &self.create_retry_attempts)
            .field("create_retry_backoff_ms", &self.create_retry_backoff_ms)
            .finish()
    }
}

impl QrConfig {
    /// Resolves the HMAC key: environment first, then the config file.
    pub fn load_hmac_key(&self) -> Result<SecretSlice<u8>> {
        let from_env = std::env::var(&self.hmac_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty());

        let (encoded, origin) = match (from_env, self.hmac_key.as_deref()) {
            (Some(value), _) => (value, self.hmac_key_env.as_str()),
            (None, Some(value)) => (value.to_string(), "qr.hmac_key"),
            (None, None) => anyhow::bail!(
                "No QR HMAC key configured: set {} or qr.hmac_key (run `clockin init` to generate one)",
                self.hmac_key_env
            ),
        };

        let key = decode_hmac_key(&encoded).with_context(|| format!("Invalid HMAC key in {origin}"))?;
        Ok(SecretSlice::from(key))
    }
}

fn decode_hmac_key(encoded: &str) -> Result<Vec<u8>> {
    let key = STANDARD
        .decode(encoded.trim())
        .context("HMAC key is not valid base64")?;

    if key.len() < MIN_KEY_LEN {
        anyhow::bail!(
            "HMAC key must decode to at least {MIN_KEY_LEN} bytes, got {}",
            key.len()
        );
    }

    Ok(key)
}

/// Fresh base64 key of 32 random bytes.
#[must_use]
pub fn generate_hmac_key() -> String {
    let mut bytes = [0u8; MIN_KEY_LEN];
    rand::rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "clockin".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("clockin").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".clockin").join("config.toml"));
        }

        paths
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        let qr = &self.qr;

        if qr.api_max_latency_seconds == 0 || qr.scan_max_latency_seconds == 0 {
            anyhow::bail!("QR latency windows must be > 0");
        }

        if qr.replay_ttl_seconds == 0 {
            anyhow::bail!("qr.replay_ttl_seconds must be > 0");
        }

        if qr.standing_validity_days == 0 || qr.short_validity_minutes == 0 {
            anyhow::bail!("QR validity periods must be > 0");
        }

        if qr.create_retry_attempts == 0 {
            anyhow::bail!("qr.create_retry_attempts must be at least 1");
        }

        if let Some(key) = &qr.hmac_key {
            decode_hmac_key(key).context("Invalid qr.hmac_key")?;
        }

        if self.general.min_db_connections > self.general.max_db_connections {
            anyhow::bail!("general.min_db_connections exceeds max_db_connections");
        }

        if let Some(base) = &self.server.public_base_url {
            url::Url::parse(base).context("Invalid server.public_base_url")?;
        }

        Ok(())
    }
}
