//! Configuration loading and typed config structures for Voicepass.
//!
//! The canonical configuration lives in `voicepass.yaml` at the working
//! directory. Every section deserializes into a typed struct with defaults
//! for omitted keys, and [`VoicepassConfig::validate`] rejects values the
//! engines cannot run with.
//! The level table and item catalog are separate files; see
//! [`crate::catalog`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Why `voicepass.yaml` could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `voicepass.yaml`. All fields have defaults, so
/// an empty file (or no file) yields a runnable configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VoicepassConfig {
    /// Accrual rate and scheduler timing.
    #[serde(default)]
    pub accrual: AccrualConfig,

    /// Level table and item catalog locations.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Store and message bus connections.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// NATS subject layout and gateway request settings.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VoicepassConfig {
    /// Read, override and validate the file at `path`.
    ///
    /// Environment variables override YAML values for infrastructure:
    /// - `NATS_URL` overrides `infrastructure.nats_url`
    /// - `DRAGONFLY_URL` overrides `infrastructure.dragonfly_url`
    /// - `VOICEPASS_STORAGE` overrides `infrastructure.storage`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    ///
    /// Environment overrides apply in both cases.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        let mut config = Self::default();
        config.infrastructure.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.infrastructure.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let accrual = &self.accrual;
        if accrual.xp_per_minute == 0 {
            return Err(invalid("accrual.xp_per_minute", "must be at least 1"));
        }
        if accrual.flush_interval_secs == 0 {
            return Err(invalid("accrual.flush_interval_secs", "must be at least 1"));
        }
        if accrual.flush_concurrency == 0 {
            return Err(invalid("accrual.flush_concurrency", "must be at least 1"));
        }
        if accrual.drain_retry_attempts == 0 {
            return Err(invalid("accrual.drain_retry_attempts", "must be at least 1"));
        }
        if accrual.deferred_tick_ms == 0 {
            return Err(invalid("accrual.deferred_tick_ms", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_owned(),
    }
}

/// Accrual rate and scheduler timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccrualConfig {
    /// XP credited per minute of active presence.
    #[serde(default = "default_xp_per_minute")]
    pub xp_per_minute: u64,

    /// Seconds between periodic flushes of open sessions.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Maximum settles in flight during a flush or drain.
    #[serde(default = "default_flush_concurrency")]
    pub flush_concurrency: usize,

    /// Settle attempts per session during the shutdown drain.
    #[serde(default = "default_drain_retry_attempts")]
    pub drain_retry_attempts: u32,

    /// Delay between drain attempts, in milliseconds.
    #[serde(default = "default_drain_retry_backoff_ms")]
    pub drain_retry_backoff_ms: u64,

    /// Poll interval of the deferred-action loop, in milliseconds.
    #[serde(default = "default_deferred_tick_ms")]
    pub deferred_tick_ms: u64,
}

impl AccrualConfig {
    /// The periodic flush interval.
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// The delay between drain retries.
    pub const fn drain_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.drain_retry_backoff_ms)
    }

    /// The deferred-action poll interval.
    pub const fn deferred_tick(&self) -> Duration {
        Duration::from_millis(self.deferred_tick_ms)
    }
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            xp_per_minute: default_xp_per_minute(),
            flush_interval_secs: default_flush_interval_secs(),
            flush_concurrency: default_flush_concurrency(),
            drain_retry_attempts: default_drain_retry_attempts(),
            drain_retry_backoff_ms: default_drain_retry_backoff_ms(),
            deferred_tick_ms: default_deferred_tick_ms(),
        }
    }
}

/// Level table and item catalog file locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogConfig {
    /// Path of the level table YAML.
    #[serde(default = "default_levels_path")]
    pub levels_path: PathBuf,

    /// Path of the item catalog YAML.
    #[serde(default = "default_items_path")]
    pub items_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            levels_path: default_levels_path(),
            items_path: default_items_path(),
        }
    }
}

/// Which profile store backend to run with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// In-process map. Profiles are lost on restart.
    Memory,
    /// `Dragonfly` (Redis-compatible) server.
    #[default]
    Dragonfly,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "dragonfly" => Ok(Self::Dragonfly),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Infrastructure connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Profile store backend.
    #[serde(default)]
    pub storage: StorageKind,

    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,

    /// NATS messaging URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Per-call store timeout in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl InfrastructureConfig {
    /// Replace connection URLs with `NATS_URL` / `DRAGONFLY_URL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = val;
        }
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
        if let Ok(val) = std::env::var("VOICEPASS_STORAGE") {
            match val.parse() {
                Ok(kind) => self.storage = kind,
                Err(reason) => {
                    tracing::warn!(value = val, reason, "Ignoring VOICEPASS_STORAGE override");
                }
            }
        }
    }

    /// The per-call store timeout.
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::default(),
            dragonfly_url: default_dragonfly_url(),
            nats_url: default_nats_url(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// NATS subject layout and gateway request settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessagingConfig {
    /// Root of every subject (`<prefix>.presence`, `<prefix>.commands`, ...).
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Timeout for guild-action and roster requests, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Channel id carried on every announcement.
    #[serde(default)]
    pub announce_channel_id: u64,
}

impl MessagingConfig {
    /// Full subject name for `suffix` under the configured prefix.
    pub fn subject(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.subject_prefix)
    }

    /// The gateway request timeout.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            subject_prefix: default_subject_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
            announce_channel_id: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_xp_per_minute() -> u64 {
    10
}

const fn default_flush_interval_secs() -> u64 {
    300
}

const fn default_flush_concurrency() -> usize {
    8
}

const fn default_drain_retry_attempts() -> u32 {
    3
}

const fn default_drain_retry_backoff_ms() -> u64 {
    500
}

const fn default_deferred_tick_ms() -> u64 {
    1000
}

fn default_levels_path() -> PathBuf {
    PathBuf::from("levels.yaml")
}

fn default_items_path() -> PathBuf {
    PathBuf::from("items.yaml")
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

const fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_subject_prefix() -> String {
    "voicepass".to_owned()
}

const fn default_request_timeout_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_owned()
}
