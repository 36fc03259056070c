//! TOML configuration for the anomaly gateway.
//!
//! Loaded once at start-up and shared read-only afterwards. Sections default
//! individually, so a partial file (or none at all) is valid.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ANOMALY_GATEWAY_CONFIG";

/// Standard system location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/anomaly-gateway/gateway.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded gateway configuration");
        Ok(config)
    }

    /// Resolve the configuration, in order:
    /// 1. `explicit` (the `--config` flag). A failure here is an error.
    /// 2. The path in the `ANOMALY_GATEWAY_CONFIG` environment variable.
    /// 3. `/etc/anomaly-gateway/gateway.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "ANOMALY_GATEWAY_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
    /// Value of `Access-Control-Allow-Origin`; `*` allows any origin.
    pub cors_allow_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            cors_allow_origin: "*".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub db_path: String,
    /// Project the records belong to; reported by the health endpoint.
    pub project_id: String,
    /// Dataset the records belong to; reported by the health endpoint.
    pub dataset_id: String,
    /// How analysis records are written relative to the response.
    pub persistence: PersistenceMode,
    /// Rolling window for the false-positive rate.
    pub false_positive_window_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "data/anomaly-gateway.db".to_string(),
            project_id: "local".to_string(),
            dataset_id: "anomaly_detection".to_string(),
            persistence: PersistenceMode::Sync,
            false_positive_window_days: 30,
        }
    }
}

/// When the analysis record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Before responding; a write failure fails the request.
    Sync,
    /// In the background; a write failure is logged and never fails the request.
    Async,
    /// Not written at all.
    Disabled,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identifier reported as `ai_model_used`.
    pub model_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_name: "rules-v1".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`). `RUST_LOG` wins.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    /// One JSON object per line.
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
