//! Configuration loading and validation for the SAGE knowledge-loading core.
//!
//! Loads configuration from a TOML file with serde defaults for every
//! setting. Validates all settings at startup; a missing minimal-fallback
//! payload is a fatal misconfiguration here, never a request-time surprise.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sage_core::model::{MINIMAL_FALLBACK, TimeoutTier};

/// The root configuration structure for the loading core.
///
/// Every field has a default, so an empty TOML file (or no file at all)
/// yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Timeout tier durations
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Circuit breaker thresholds
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Event bus settings
    #[serde(default)]
    pub events: EventConfig,

    /// Degradation policy settings
    #[serde(default)]
    pub degradation: DegradationConfig,

    /// When true, deployments wire the strict (propagating) loader surface
    /// instead of the degrading one.
    #[serde(default)]
    pub strict: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            breaker: BreakerConfig::default(),
            events: EventConfig::default(),
            degradation: DegradationConfig::default(),
            strict: false,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;

        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Run at startup, before the first request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeouts.validate()?;

        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.breaker.half_open_request_limit == 0 {
            return Err(ConfigError::ValidationError(
                "breaker.half_open_request_limit must be at least 1".into(),
            ));
        }
        if self.events.handler_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "events.handler_timeout_ms must be positive".into(),
            ));
        }
        if self
            .degradation
            .fallback_content
            .as_deref()
            .is_some_and(str::is_empty)
        {
            return Err(ConfigError::ValidationError(
                "degradation.fallback_content must not be empty; omit it to use the bundled payload"
                    .into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Timeout tier durations in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_t1_ms")]
    pub t1_ms: u64,
    #[serde(default = "default_t2_ms")]
    pub t2_ms: u64,
    #[serde(default = "default_t3_ms")]
    pub t3_ms: u64,
    #[serde(default = "default_t4_ms")]
    pub t4_ms: u64,
    #[serde(default = "default_t5_ms")]
    pub t5_ms: u64,
}

fn default_t1_ms() -> u64 {
    100
}
fn default_t2_ms() -> u64 {
    500
}
fn default_t3_ms() -> u64 {
    2_000
}
fn default_t4_ms() -> u64 {
    5_000
}
fn default_t5_ms() -> u64 {
    10_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            t1_ms: default_t1_ms(),
            t2_ms: default_t2_ms(),
            t3_ms: default_t3_ms(),
            t4_ms: default_t4_ms(),
            t5_ms: default_t5_ms(),
        }
    }
}

impl TimeoutConfig {
    /// The configured duration for a tier.
    pub fn duration(&self, tier: TimeoutTier) -> Duration {
        let ms = match tier {
            TimeoutTier::T1 => self.t1_ms,
            TimeoutTier::T2 => self.t2_ms,
            TimeoutTier::T3 => self.t3_ms,
            TimeoutTier::T4 => self.t4_ms,
            TimeoutTier::T5 => self.t5_ms,
        };
        Duration::from_millis(ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let tiers = [self.t1_ms, self.t2_ms, self.t3_ms, self.t4_ms, self.t5_ms];
        if tiers.iter().any(|&ms| ms == 0) {
            return Err(ConfigError::ValidationError(
                "timeout tier durations must be positive".into(),
            ));
        }
        if tiers.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::ValidationError(
                "timeout tiers must be non-decreasing from t1 to t5".into(),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds, shared by every operation class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an open breaker rejects before probing for recovery.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// How many concurrent probes a half-open breaker admits.
    #[serde(default = "default_half_open_request_limit")]
    pub half_open_request_limit: u32,
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_reset_timeout_ms() -> u64 {
    30_000
}
fn default_half_open_request_limit() -> u32 {
    1
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            half_open_request_limit: default_half_open_request_limit(),
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Event bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Per-handler timeout. Defaults to the T2 tier duration.
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
}

fn default_handler_timeout_ms() -> u64 {
    default_t2_ms()
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: default_handler_timeout_ms(),
        }
    }
}

impl EventConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

/// Degradation policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationConfig {
    /// Maximum age of a cached entry that may serve a degraded load.
    #[serde(default = "default_staleness_bound_ms")]
    pub staleness_bound_ms: u64,

    /// Override for the bundled minimal fallback payload. Omit to use the
    /// payload shipped with the system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_content: Option<String>,
}

fn default_staleness_bound_ms() -> u64 {
    300_000
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            staleness_bound_ms: default_staleness_bound_ms(),
            fallback_content: None,
        }
    }
}

impl DegradationConfig {
    pub fn staleness_bound(&self) -> Duration {
        Duration::from_millis(self.staleness_bound_ms)
    }

    /// The effective fallback payload: the configured override, or the
    /// payload bundled with the system.
    pub fn fallback(&self) -> &str {
        self.fallback_content.as_deref().unwrap_or(MINIMAL_FALLBACK)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
