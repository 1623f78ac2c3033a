//! Executor configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config and
//! `ExecutorConfig::default()` reproduces the stock polling behavior: a 1 µs
//! first sleep growing by 10% per round, now capped at 10 ms.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

/// Growth curve for one polling sleep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    /// First sleep, in microseconds.
    pub base_micros: u64,
    /// Multiplier applied after each sleep. Must be >= 1.0.
    pub growth: f64,
    /// Largest sleep, in microseconds.
    pub ceiling_micros: u64,
    /// Fraction in `[0, 1]` of each sleep that may be randomly shaved off.
    pub jitter: f64,
}

impl BackoffConfig {
    pub fn base(&self) -> Duration {
        Duration::from_micros(self.base_micros)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_micros(self.ceiling_micros)
    }

    fn validate(&self, which: &str) -> Result<(), ExecutorError> {
        if !(self.growth >= 1.0) {
            return Err(ExecutorError::Config(format!(
                "{which}.growth must be >= 1.0, got {}",
                self.growth
            )));
        }
        if self.base_micros > self.ceiling_micros {
            return Err(ExecutorError::Config(format!(
                "{which}.base_micros ({}) exceeds ceiling_micros ({})",
                self.base_micros, self.ceiling_micros
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ExecutorError::Config(format!(
                "{which}.jitter must be within [0, 1], got {}",
                self.jitter
            )));
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_micros: 1,
            growth: 1.1,
            ceiling_micros: 10_000,
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Sleep between outer poll rounds of the multiplexed executor.
    pub backoff: BackoffConfig,
    /// Sleep between consecutive `perform` calls within one round.
    pub inner_backoff: BackoffConfig,
    /// Reactor threads backing the multiplexer.
    pub worker_threads: usize,
    pub connect_timeout_ms: Option<u64>,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            inner_backoff: BackoffConfig {
                ceiling_micros: 1_000,
                ..BackoffConfig::default()
            },
            worker_threads: 1,
            connect_timeout_ms: None,
            user_agent: concat!("fanout/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 10,
        }
    }
}

impl ExecutorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ExecutorError> {
        let config: Self = toml::from_str(raw).map_err(|e| ExecutorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExecutorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ExecutorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        self.backoff.validate("backoff")?;
        self.inner_backoff.validate("inner_backoff")?;
        if self.worker_threads == 0 {
            return Err(ExecutorError::Config("worker_threads must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = ExecutorConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExecutorConfig::default());
        assert_eq!(config.backoff.base(), Duration::from_micros(1));
        assert_eq!(config.backoff.growth, 1.1);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = ExecutorConfig::from_toml_str(
            r#"
            worker_threads = 2
            connect_timeout_ms = 250

            [backoff]
            ceiling_micros = 500
            jitter = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.backoff.ceiling(), Duration::from_micros(500));
        assert_eq!(config.backoff.base_micros, 1);
        assert_eq!(config.inner_backoff.ceiling_micros, 1_000);
    }

    #[test]
    fn shrinking_growth_is_rejected() {
        let err = ExecutorConfig::from_toml_str("[backoff]\ngrowth = 0.5\n").unwrap_err();
        assert!(matches!(err, ExecutorError::Config(msg) if msg.contains("growth")));
    }

    #[test]
    fn base_above_ceiling_is_rejected() {
        let err = ExecutorConfig::from_toml_str("[inner_backoff]\nbase_micros = 50000\n").unwrap_err();
        assert!(matches!(err, ExecutorError::Config(msg) if msg.contains("inner_backoff")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ExecutorConfig::from_toml_str("threads = 4\n").is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(ExecutorConfig::from_toml_str("worker_threads = 0\n").is_err());
    }

    #[test]
    fn from_path_reads_and_validates_file() {
        let dir = std::env::temp_dir().join(format!("fanout-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.toml");
        std::fs::write(&good, "user_agent = \"from-file/1\"\nmax_redirects = 3\n").unwrap();
        let bad = dir.join("bad.toml");
        std::fs::write(&bad, "worker_threads = 0\n").unwrap();

        let config = ExecutorConfig::from_path(&good).unwrap();
        assert_eq!(config.user_agent, "from-file/1");
        assert_eq!(config.max_redirects, 3);
        assert!(matches!(ExecutorConfig::from_path(&bad), Err(ExecutorError::Config(_))));

        let missing = dir.join("missing.toml");
        let err = ExecutorConfig::from_path(&missing).unwrap_err();
        assert!(matches!(err, ExecutorError::Config(msg) if msg.contains("missing.toml")));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
