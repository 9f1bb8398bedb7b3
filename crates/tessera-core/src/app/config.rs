//! Engine configuration, loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::classify::DEFAULT_MAJOR_ERROR_PATTERNS;
use crate::custody::ShareScheme;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of pooled master signers; slots are numbered from 1.
    pub signer_slots: u32,
    /// Pause before re-driving a lane whose head task waits on a dependency.
    pub dependency_wait_ms: u64,
    pub retry: RetryConfig,
    /// Consecutive transient failures after which an operator is alerted.
    pub alert_after_failures: u32,
    /// Hard ceiling on attempts. `None` retries transient errors forever.
    pub max_attempts: Option<u32>,
    /// Wait for indexer notifications on deferred-finality chains. When off,
    /// every successful call is treated as final.
    pub indexer_webhooks: bool,
    /// Case-insensitive substrings that mark an unclassified chain error as permanent.
    pub major_error_patterns: Vec<String>,
    /// Scratch directory for staged media.
    pub media_dir: PathBuf,
    pub share_scheme: ShareScheme,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signer_slots: 5,
            dependency_wait_ms: 10_000,
            retry: RetryConfig::default(),
            alert_after_failures: 10,
            max_attempts: None,
            indexer_webhooks: true,
            major_error_patterns: DEFAULT_MAJOR_ERROR_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            media_dir: std::env::temp_dir().join("tessera-media"),
            share_scheme: ShareScheme::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signer_slots == 0 {
            return Err(ConfigError::Invalid("signer_slots must be at least 1".into()));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must not be below retry.base_delay_ms".into(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        self.share_scheme
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn dependency_wait(&self) -> Duration {
        Duration::from_millis(self.dependency_wait_ms)
    }
}
