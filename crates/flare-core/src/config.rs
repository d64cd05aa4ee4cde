//! Orchestrator configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `FLARE_*`
//! environment variables.

use crate::error::{FlareError, FlareResult};
use flare_coldstart::ModelConfig;
use flare_scheduler::SchedulerConfig;
use flare_store::{QueryConfig, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlareConfig {
    /// Maximum simultaneously active functions
    pub throttle_limit: usize,
    /// Minimum load-test success rate
    pub success_threshold: f64,
    /// Query p99 target for the massive query scenario
    pub p99_target_ms: f64,
    /// Seed shared by generators, cost draws and model training
    pub random_seed: u64,
    /// Deadline of one job
    pub job_timeout_secs: u64,
    /// Bound on the load generator's drain
    pub drain_timeout_secs: u64,
    /// Extinguished functions kept per scheduler
    pub history_capacity: usize,
    /// Persist datasets under this directory instead of in memory
    pub data_dir: Option<PathBuf>,
    /// Partition store tuning; its seed is replaced by `random_seed`
    pub store: StoreConfig,
    /// Query engine tuning
    pub query: QueryConfig,
}

impl Default for FlareConfig {
    fn default() -> Self {
        Self {
            throttle_limit: 1_000,
            success_threshold: 0.95,
            p99_target_ms: 500.0,
            random_seed: 42,
            job_timeout_secs: 600,
            drain_timeout_secs: 30,
            history_capacity: 10_000,
            data_dir: None,
            store: StoreConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl FlareConfig {
    /// Defaults, then `path` if given, then the process environment
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Config` for malformed TOML, a bad override or a failed [`validate`](Self::validate)
    pub fn load(path: Option<&Path>) -> FlareResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; unspecified keys keep their defaults
    ///
    /// # Errors
    /// `Io` if unreadable, `Config` if not valid TOML for this struct
    pub fn from_file(path: &Path) -> FlareResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| FlareError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
            .map_err(|e| FlareError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `Config` if not valid TOML for this struct
    pub fn from_toml(content: &str) -> FlareResult<Self> {
        toml::from_str(content).map_err(|e| FlareError::Config(e.to_string()))
    }

    /// Apply `FLARE_*` overrides read through `lookup`
    ///
    /// # Errors
    /// `Config` naming the variable whose value does not parse
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> FlareResult<()> {
        fn parse<T: FromStr>(key: &str, raw: &str) -> FlareResult<T> {
            raw.trim()
                .parse()
                .map_err(|_| FlareError::Config(format!("{key}: cannot parse {raw:?}")))
        }

        if let Some(v) = lookup("FLARE_THROTTLE_LIMIT") {
            self.throttle_limit = parse("FLARE_THROTTLE_LIMIT", &v)?;
        }
        if let Some(v) = lookup("FLARE_SUCCESS_THRESHOLD") {
            self.success_threshold = parse("FLARE_SUCCESS_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("FLARE_P99_TARGET_MS") {
            self.p99_target_ms = parse("FLARE_P99_TARGET_MS", &v)?;
        }
        if let Some(v) = lookup("FLARE_RANDOM_SEED") {
            self.random_seed = parse("FLARE_RANDOM_SEED", &v)?;
        }
        if let Some(v) = lookup("FLARE_JOB_TIMEOUT_SECS") {
            self.job_timeout_secs = parse("FLARE_JOB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FLARE_DRAIN_TIMEOUT_SECS") {
            self.drain_timeout_secs = parse("FLARE_DRAIN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FLARE_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Check ranges
    ///
    /// # Errors
    /// `Config` describing the first bad field
    pub fn validate(&self) -> FlareResult<()> {
        if self.throttle_limit == 0 {
            return Err(FlareError::Config("throttle_limit must be at least 1".into()));
        }
        if !(self.success_threshold > 0.0 && self.success_threshold <= 1.0) {
            return Err(FlareError::Config(format!(
                "success_threshold must be in (0, 1], got {}",
                self.success_threshold
            )));
        }
        if !(self.p99_target_ms > 0.0) {
            return Err(FlareError::Config("p99_target_ms must be positive".into()));
        }
        if self.job_timeout_secs == 0 || self.drain_timeout_secs == 0 {
            return Err(FlareError::Config("timeouts must be at least 1s".into()));
        }
        if self.history_capacity == 0 {
            return Err(FlareError::Config("history_capacity must be at least 1".into()));
        }
        self.store
            .validate()
            .map_err(|e| FlareError::Config(e.to_string()))
    }

    /// Store settings with the shared seed applied
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            seed: self.random_seed,
            ..self.store.clone()
        }
    }

    /// Scheduler settings derived from this config
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            throttle_limit: self.throttle_limit,
            history_capacity: self.history_capacity,
            seed: self.random_seed,
        }
    }

    /// Model settings derived from this config
    #[must_use]
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::default().with_seed(self.random_seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = FlareConfig::default();
        config.validate().unwrap();
        assert_eq!(config.throttle_limit, 1_000);
        assert_eq!(config.random_seed, 42);
    }

    #[test]
    fn toml_overrides_some_keys() {
        let config = FlareConfig::from_toml(
            "throttle_limit = 50\np99_target_ms = 250.0\n\n[store]\nwrite_attempts = 5\n",
        )
        .unwrap();
        assert_eq!(config.throttle_limit, 50);
        assert_eq!(config.p99_target_ms, 250.0);
        assert_eq!(config.store.write_attempts, 5);
        assert_eq!(config.job_timeout_secs, 600);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [("FLARE_THROTTLE_LIMIT", "7"), ("FLARE_DATA_DIR", "/tmp/flare")]
            .into_iter()
            .collect();
        let mut config = FlareConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.throttle_limit, 7);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/flare")));
    }

    #[test]
    fn bad_override_is_config_error() {
        let mut config = FlareConfig::default();
        let err = config
            .apply_overrides(|k| (k == "FLARE_RANDOM_SEED").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, FlareError::Config(_)));
    }

    #[test]
    fn random_seed_reaches_store() {
        let mut config = FlareConfig::default();
        config
            .apply_overrides(|k| (k == "FLARE_RANDOM_SEED").then(|| "7".to_string()))
            .unwrap();
        assert_eq!(config.store_config().seed, 7);
        assert_eq!(config.scheduler_config().seed, 7);
        assert_eq!(config.store_config().write_attempts, config.store.write_attempts);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = FlareConfig {
            success_threshold: 1.5,
            ..FlareConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flare.toml");
        std::fs::write(&path, "drain_timeout_secs = 5\n").unwrap();
        let config = FlareConfig::from_file(&path).unwrap();
        assert_eq!(config.drain_timeout_secs, 5);
        assert!(FlareConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
