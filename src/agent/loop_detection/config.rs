//! Configuration for loop detection.

use super::detector::min_warning_buckets;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Loop detection configuration loaded from env/files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopDetectionConfig {
    /// Global toggle
    #[serde(rename = "loop_detection_enabled")]
    pub enabled: bool,

    /// Number of recent calls kept in the sliding window
    #[serde(rename = "loop_history_size")]
    pub history_size: usize,

    /// Occurrence count at which warnings start
    #[serde(rename = "loop_warning_threshold")]
    pub warning_threshold: usize,
    /// Occurrence count at which calls are blocked
    #[serde(rename = "loop_critical_threshold")]
    pub critical_threshold: usize,
    /// Identical no-progress outcomes before the circuit breaker trips
    #[serde(rename = "loop_global_circuit_breaker_threshold")]
    pub global_circuit_breaker_threshold: usize,

    /// Upper bound on tracked warning buckets
    #[serde(rename = "loop_max_warning_buckets")]
    pub max_warning_buckets: usize,

    /// Generic repeat detector toggle
    #[serde(rename = "loop_generic_repeat_enabled")]
    pub generic_repeat_enabled: bool,
    /// Ping-pong detector toggle
    #[serde(rename = "loop_ping_pong_enabled")]
    pub ping_pong_enabled: bool,
    /// No-progress and circuit breaker toggle
    #[serde(rename = "loop_no_progress_enabled")]
    pub no_progress_enabled: bool,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_size: 30,
            warning_threshold: 10,
            critical_threshold: 20,
            global_circuit_breaker_threshold: 30,
            max_warning_buckets: 512,
            generic_repeat_enabled: true,
            ping_pong_enabled: true,
            no_progress_enabled: true,
        }
    }
}

impl LoopDetectionConfig {
    /// Load loop detection settings from config files and environment variables.
    ///
    /// Priority: env vars → config files → defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            .set_default("loop_detection_enabled", defaults.enabled)
            .and_then(|b| b.set_default("loop_history_size", defaults.history_size as u64))
            .and_then(|b| {
                b.set_default("loop_warning_threshold", defaults.warning_threshold as u64)
            })
            .and_then(|b| {
                b.set_default("loop_critical_threshold", defaults.critical_threshold as u64)
            })
            .and_then(|b| {
                b.set_default(
                    "loop_global_circuit_breaker_threshold",
                    defaults.global_circuit_breaker_threshold as u64,
                )
            })
            .and_then(|b| {
                b.set_default(
                    "loop_max_warning_buckets",
                    defaults.max_warning_buckets as u64,
                )
            })
            .and_then(|b| {
                b.set_default("loop_generic_repeat_enabled", defaults.generic_repeat_enabled)
            })
            .and_then(|b| b.set_default("loop_ping_pong_enabled", defaults.ping_pong_enabled))
            .and_then(|b| b.set_default("loop_no_progress_enabled", defaults.no_progress_enabled))
            .map(|b| {
                b.add_source(File::with_name("config/default").required(false))
                    .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
                    .add_source(File::with_name("config/local").required(false))
                    .add_source(Environment::default().ignore_empty(true))
            });

        let config = match builder {
            Ok(builder) => builder.build(),
            Err(err) => return Self::warn_and_default(err),
        };

        let parsed: Result<Self, ConfigError> = config.and_then(Config::try_deserialize);
        match parsed {
            Ok(settings) => settings.normalized(),
            Err(err) => Self::warn_and_default(err),
        }
    }

    /// Clamp thresholds into a consistent ladder.
    ///
    /// Keeps `warning < critical < global` so each tier stays reachable, and
    /// sizes the warning table to hold every warning pattern for the window.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.history_size = self.history_size.max(1);
        self.warning_threshold = self.warning_threshold.max(1);
        if self.critical_threshold <= self.warning_threshold {
            self.critical_threshold = self.warning_threshold + 1;
        }
        if self.global_circuit_breaker_threshold <= self.critical_threshold {
            self.global_circuit_breaker_threshold = self.critical_threshold + 1;
        }
        self.max_warning_buckets = self
            .max_warning_buckets
            .max(min_warning_buckets(self.history_size));
        self
    }

    fn warn_and_default(err: ConfigError) -> Self {
        warn!(error = %err, "Failed to load loop detection config, using defaults");
        Self::default()
    }
}
