//! Configuration structures for the timing harness.
//!
//! Supports TOML deserialization with defaults matching the original
//! investigation setup, so an empty file reproduces the reference run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest supported sample buffer capacity.
///
/// Bounded by the retained-memory arena: the sampler needs two index words
/// plus three fragment words per slot, and the arena holds 2048 words.
pub const MAX_CAPACITY: usize = 512;

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Number of slots in the retained sample buffer.
    pub capacity: usize,

    /// Programmed sampler period (the wake timer of the coprocessor).
    #[serde(with = "humantime_serde")]
    pub sampler_period: Duration,

    /// How often the main loop polls the run counter.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How long the harness stays awake each boot before entering deep
    /// sleep, counted from boot rather than from the last sample.
    #[serde(with = "humantime_serde")]
    pub inactivity_threshold: Duration,

    /// Deep sleep duration before the timer wake fires.
    #[serde(with = "humantime_serde")]
    pub sleep_duration: Duration,

    /// Level that triggers the external wake line.
    pub wake_edge: WakeEdge,

    /// Slow clock model configuration.
    pub slow_clock: SlowClockConfig,

    /// Period statistics configuration.
    pub stats: StatsConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            sampler_period: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            inactivity_threshold: Duration::from_secs(60),
            sleep_duration: Duration::from_secs(60),
            wake_edge: WakeEdge::Low,
            slow_clock: SlowClockConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

/// Active level for the external wake line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WakeEdge {
    /// Wake when the line is pulled low.
    #[default]
    Low,
    /// Wake when the line is driven high.
    High,
}

impl WakeEdge {
    /// The line level that triggers a wake, as the hardware encodes it.
    #[must_use]
    pub fn trigger_level(self) -> u8 {
        match self {
            WakeEdge::Low => 0,
            WakeEdge::High => 1,
        }
    }
}

/// Slow clock model configuration.
///
/// The harness exists to measure how the realized sampler period shifts when
/// the external wake line is armed; `ext0_skew_ppm` is that shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowClockConfig {
    /// Nominal slow clock frequency in hertz.
    pub frequency_hz: u64,

    /// Period shift applied while the external wake line is armed,
    /// in parts per million. Positive slows the sampler down.
    pub ext0_skew_ppm: i64,

    /// Random jitter bound applied to each recalibration, in parts per
    /// million. Zero disables jitter for reproducible runs.
    pub recal_jitter_ppm: u32,
}

impl Default for SlowClockConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 150_000,
            ext0_skew_ppm: 40_000,
            recal_jitter_ppm: 0,
        }
    }
}

/// Period statistics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Enable period statistics collection.
    pub enabled: bool,

    /// Number of recent periods retained for the drift report.
    pub history_size: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_size: 64,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < 2 || self.capacity > MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "capacity must be in 2..={MAX_CAPACITY}, got {}",
                self.capacity
            )));
        }
        if self.sampler_period.is_zero() {
            return Err(ConfigError::Invalid("sampler_period must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be non-zero".into()));
        }
        if self.sleep_duration.is_zero() {
            return Err(ConfigError::Invalid("sleep_duration must be non-zero".into()));
        }
        if self.slow_clock.frequency_hz == 0 {
            return Err(ConfigError::Invalid(
                "slow_clock.frequency_hz must be non-zero".into(),
            ));
        }
        if self.slow_clock.ext0_skew_ppm.unsigned_abs() > 500_000 {
            return Err(ConfigError::Invalid(format!(
                "slow_clock.ext0_skew_ppm must stay within +/-500000, got {}",
                self.slow_clock.ext0_skew_ppm
            )));
        }
        if self.slow_clock.recal_jitter_ppm >= 1_000_000 {
            return Err(ConfigError::Invalid(format!(
                "slow_clock.recal_jitter_ppm must be below 1000000, got {}",
                self.slow_clock.recal_jitter_ppm
            )));
        }
        if self.stats.history_size == 0 {
            return Err(ConfigError::Invalid("stats.history_size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value violated a cross-field constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
