//! Relay Configuration - every tunable of the ingestion, dispatch and
//! broadcast paths as TOML values.
//!
//! Each struct implements `Default` with the values from [`super::defaults`],
//! so a missing file or a missing section behaves exactly like the built-ins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::aggregation::sectors::valid_boundaries;

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "RACEWIRE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "racewire.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a relay deployment.
///
/// Load with `RelayConfig::load()` which searches:
/// 1. `$RACEWIRE_CONFIG`
/// 2. `./racewire.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub consumer: ConsumerSettings,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    /// Per-track sector boundaries (metres from the start line), keyed by
    /// any alias of the track name. Overrides the built-in map.
    #[serde(default)]
    pub sectors: BTreeMap<String, Vec<f64>>,
}

impl RelayConfig {
    /// Load configuration using the standard search order:
    /// 1. `$RACEWIRE_CONFIG` environment variable
    /// 2. `./racewire.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded relay config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded relay config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate values for internal consistency.
    ///
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.ingest.buffer_capacity == 0 {
            errors.push("ingest.buffer_capacity must be > 0".to_string());
        }
        if self.ingest.batch_max_points == 0 {
            errors.push("ingest.batch_max_points must be > 0".to_string());
        }
        if self.ingest.batch_max_age_ms == 0 {
            errors.push("ingest.batch_max_age_ms must be > 0".to_string());
        }
        if self.aggregation.tick_ms == 0 {
            errors.push("aggregation.tick_ms must be > 0".to_string());
        }
        if self.aggregation.snapshot_points == 0 {
            errors.push("aggregation.snapshot_points must be > 0".to_string());
        }
        if self.aggregation.snapshot_points > self.ingest.buffer_capacity {
            errors.push(format!(
                "aggregation.snapshot_points ({}) must be <= ingest.buffer_capacity ({})",
                self.aggregation.snapshot_points, self.ingest.buffer_capacity
            ));
        }
        if self.registry.heartbeat_interval_secs == 0 {
            errors.push("registry.heartbeat_interval_secs must be > 0".to_string());
        }
        if self.registry.heartbeat_timeout_secs <= self.registry.heartbeat_interval_secs {
            errors.push(format!(
                "registry.heartbeat_timeout_secs ({}) must exceed heartbeat_interval_secs ({})",
                self.registry.heartbeat_timeout_secs, self.registry.heartbeat_interval_secs
            ));
        }
        if self.dispatch.max_attempts == 0 {
            errors.push("dispatch.max_attempts must be > 0".to_string());
        }
        if self.consumer.batch_size == 0 {
            errors.push("consumer.batch_size must be > 0".to_string());
        }
        if self.consumer.ping_every == 0 {
            errors.push("consumer.ping_every must be > 0".to_string());
        }
        if self.consumer.max_consecutive_errors < self.consumer.ping_every {
            errors.push(format!(
                "consumer.max_consecutive_errors ({}) must be >= ping_every ({})",
                self.consumer.max_consecutive_errors, self.consumer.ping_every
            ));
        }
        if self.consumer.backoff_cap_ms < self.consumer.backoff_step_ms {
            errors.push("consumer.backoff_cap_ms must be >= backoff_step_ms".to_string());
        }
        if self.broadcast.max_buffered_bytes == 0 {
            errors.push("broadcast.max_buffered_bytes must be > 0".to_string());
        }
        if self.broadcast.insight_cache_capacity == 0 {
            errors.push("broadcast.insight_cache_capacity must be > 0".to_string());
        }
        for (track, bounds) in &self.sectors {
            if !valid_boundaries(bounds) {
                errors.push(format!(
                    "sectors.{track}: boundaries must be finite, > 0 and strictly increasing"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP / WebSocket server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_server_addr() }
    }
}

/// UDP ingestion and raw-update batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub udp_bind: String,
    pub buffer_capacity: usize,
    pub recv_buffer_bytes: usize,
    pub parse_log_window_ms: u64,
    pub batch_max_points: usize,
    pub batch_max_age_ms: u64,
    pub raw_channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            udp_bind: defaults::UDP_BIND_ADDR.to_string(),
            buffer_capacity: defaults::RING_BUFFER_CAPACITY,
            recv_buffer_bytes: defaults::UDP_RECV_BUFFER_BYTES,
            parse_log_window_ms: defaults::PARSE_LOG_WINDOW_MS,
            batch_max_points: defaults::BATCH_MAX_POINTS,
            batch_max_age_ms: defaults::BATCH_MAX_AGE_MS,
            raw_channel_capacity: defaults::RAW_CHANNEL_CAPACITY,
        }
    }
}

impl IngestConfig {
    pub fn parse_log_window(&self) -> Duration {
        Duration::from_millis(self.parse_log_window_ms)
    }

    pub fn batch_max_age(&self) -> Duration {
        Duration::from_millis(self.batch_max_age_ms)
    }
}

/// Windowed aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub tick_ms: u64,
    pub snapshot_points: usize,
    pub evidence_points: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            tick_ms: defaults::AGGREGATION_TICK_MS,
            snapshot_points: defaults::AGGREGATION_SNAPSHOT_POINTS,
            evidence_points: defaults::EVIDENCE_POINTS,
        }
    }
}

/// Agent registry liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: defaults::HEARTBEAT_INTERVAL_SECS,
            heartbeat_timeout_secs: defaults::HEARTBEAT_TIMEOUT_SECS,
        }
    }
}

/// Task creation and placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub window_task_types: Vec<String>,
    pub max_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            window_task_types: defaults::WINDOW_TASK_TYPES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_attempts: defaults::TASK_MAX_ATTEMPTS,
        }
    }
}

/// Durable log storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub data_dir: String,
    pub visibility_timeout_secs: u64,
    pub stream_max_len: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::LOG_DATA_DIR.to_string(),
            visibility_timeout_secs: defaults::VISIBILITY_TIMEOUT_SECS,
            stream_max_len: defaults::STREAM_MAX_LEN,
        }
    }
}

/// Stream consumer loop tuning shared by every consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub batch_size: usize,
    pub block_ms: u64,
    pub ping_every: u32,
    pub max_consecutive_errors: u32,
    pub backoff_step_ms: u64,
    pub backoff_cap_ms: u64,
    pub max_deliveries: u32,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: defaults::CONSUMER_BATCH_SIZE,
            block_ms: defaults::CONSUMER_BLOCK_MS,
            ping_every: defaults::CONSUMER_PING_EVERY,
            max_consecutive_errors: defaults::CONSUMER_MAX_CONSECUTIVE_ERRORS,
            backoff_step_ms: defaults::CONSUMER_BACKOFF_STEP_MS,
            backoff_cap_ms: defaults::CONSUMER_BACKOFF_CAP_MS,
            max_deliveries: defaults::CONSUMER_MAX_DELIVERIES,
        }
    }
}

/// Broadcast fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub max_buffered_bytes: usize,
    pub insight_cache_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_buffered_bytes: defaults::MAX_BUFFERED_BYTES,
            insight_cache_capacity: defaults::INSIGHT_CACHE_CAPACITY,
        }
    }
}

/// In-process agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub builtin: bool,
    pub capacity: u32,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            builtin: true,
            capacity: defaults::AGENT_CAPACITY,
        }
    }
}
