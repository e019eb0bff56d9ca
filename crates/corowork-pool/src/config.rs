//! Runtime configuration, loadable from a TOML file or constructed with
//! [`Config::default`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default number of entries a worker's local ring can hold before `write`
/// starts pushing to the global queue instead.
pub const DEFAULT_LOCAL_QUEUE_SIZE: usize = 1024;
/// Default worker thread count for the process-wide scheduler.
pub const DEFAULT_POOL_THREADS: usize = 8;
/// Default bound on how long a worker blocks waiting for new work before
/// retrying its acquisition sequence from the top.
pub const DEFAULT_WAKEUP_TIMEOUT_MS: u64 = 500;
/// Default initial bucket count for the sharded map of worker local queues.
pub const DEFAULT_MAP_INITIAL_BUCKETS: usize = 64;
/// Default maximum bucket count the sharded map will grow to.
pub const DEFAULT_MAP_MAX_BUCKETS: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, #[source] source: toml::de::Error },
    #[error("local_queue_size must be at least 2, got {0}")]
    LocalQueueTooSmall(usize),
    #[error("pool_threads must be at least 1, got {0}")]
    PoolThreadsZero(usize),
    #[error("map_initial_buckets ({initial}) must not exceed map_max_buckets ({max})")]
    BucketRangeInverted { initial: usize, max: usize },
}

/// Runtime-wide tunables for the thread pool and its backing structures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub local_queue_size: usize,
    pub pool_threads: usize,
    pub wakeup_timeout_ms: u64,
    pub map_initial_buckets: usize,
    pub map_max_buckets: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_queue_size: DEFAULT_LOCAL_QUEUE_SIZE,
            pool_threads: DEFAULT_POOL_THREADS,
            wakeup_timeout_ms: DEFAULT_WAKEUP_TIMEOUT_MS,
            map_initial_buckets: DEFAULT_MAP_INITIAL_BUCKETS,
            map_max_buckets: DEFAULT_MAP_MAX_BUCKETS,
        }
    }
}

impl Config {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_queue_size < 2 {
            return Err(ConfigError::LocalQueueTooSmall(self.local_queue_size));
        }
        if self.pool_threads == 0 {
            return Err(ConfigError::PoolThreadsZero(self.pool_threads));
        }
        if self.map_initial_buckets > self.map_max_buckets {
            return Err(ConfigError::BucketRangeInverted {
                initial: self.map_initial_buckets,
                max: self.map_max_buckets,
            });
        }
        Ok(())
    }

    pub fn wakeup_timeout(&self) -> Duration {
        Duration::from_millis(self.wakeup_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_pool_threads() {
        let mut cfg = Config::default();
        cfg.pool_threads = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::PoolThreadsZero(0))));
    }

    #[test]
    fn rejects_inverted_bucket_range() {
        let mut cfg = Config::default();
        cfg.map_initial_buckets = 2048;
        cfg.map_max_buckets = 1024;
        assert!(matches!(cfg.validate(), Err(ConfigError::BucketRangeInverted { .. })));
    }

    #[test]
    fn parses_toml_overrides() {
        let toml_text = "pool_threads = 4\nlocal_queue_size = 256\n";
        let cfg: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.pool_threads, 4);
        assert_eq!(cfg.local_queue_size, 256);
        // unset fields keep their defaults
        assert_eq!(cfg.wakeup_timeout_ms, DEFAULT_WAKEUP_TIMEOUT_MS);
    }
}
