use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::RetryConfig;

fn default_workers() -> usize {
    4
}

fn default_pass_timeout_secs() -> u64 {
    30
}

fn default_metrics_port() -> u16 {
    9090
}

/// Runtime tunables. Fixed identities (names, label, key) are constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Concurrent reconciliation passes
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Deadline applied to each pass; 0 disables it
    #[serde(default = "default_pass_timeout_secs")]
    pub pass_timeout_secs: u64,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub retry: RetrySettings,
    /// PEM file used to seed the bundle in the demo binary
    #[serde(default)]
    pub bundle_file: Option<PathBuf>,
}

/// Conflict retry policy for target updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub max_elapsed_ms: Option<u64>,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryConfig::on_conflict();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_elapsed_ms: policy.max_elapsed.map(|d| d.as_millis() as u64),
            jitter: policy.jitter,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            pass_timeout_secs: default_pass_timeout_secs(),
            metrics_port: default_metrics_port(),
            retry: RetrySettings::default(),
            bundle_file: None,
        }
    }
}

impl ControllerConfig {
    pub const ENV_CONFIG_PATH: &'static str = "CA_INJECTOR_CONFIG";

    /// Load from the file named by `CA_INJECTOR_CONFIG`, or fall back to defaults
    pub fn load() -> Result<Self> {
        match std::env::var(Self::ENV_CONFIG_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(path),
            _ => {
                tracing::debug!("No config file set, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded controller config");
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        anyhow::ensure!(config.workers > 0, "workers must be at least 1");
        anyhow::ensure!(
            config.retry.max_attempts > 0,
            "retry.max_attempts must be at least 1"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&config.retry.jitter),
            "retry.jitter must be between 0 and 1"
        );
        Ok(config)
    }

    pub fn pass_timeout(&self) -> Option<Duration> {
        (self.pass_timeout_secs > 0).then(|| Duration::from_secs(self.pass_timeout_secs))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            multiplier: self.retry.multiplier,
            max_elapsed: self.retry.max_elapsed_ms.map(Duration::from_millis),
            jitter: self.retry.jitter,
        }
    }
}
