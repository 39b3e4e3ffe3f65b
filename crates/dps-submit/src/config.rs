//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::submitters::topologies;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/dps";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default base URL of the remote representation store.
pub const DEFAULT_STORE_URL: &str = "http://localhost:8080/mcs";

/// Attempts per remote store call before the read is treated as fatal: the
/// first call plus three retries.
pub const DEFAULT_STORE_MAX_ATTEMPTS: u32 = 4;

/// Base delay between store retries, multiplied by the attempt number.
pub const DEFAULT_STORE_RETRY_DELAY_MS: u64 = 1000;

/// Default HTTP timeout for store calls in seconds.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Concurrent resolution workers per dataset revision scan.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Cloud ids handed to one worker at a time.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// How long a revision scan waits for straggling workers on exit.
pub const DEFAULT_POOL_SHUTDOWN_TIMEOUT_SECS: u64 = 60;

/// How long a negative kill-signal answer is trusted.
pub const DEFAULT_KILL_CHECK_INTERVAL_MS: u64 = 5000;

/// Submission progress is logged every this many records.
pub const DEFAULT_PROGRESS_LOG_FREQUENCY: u64 = 1000;

/// Public base URL under which unpacked repository files are served.
pub const DEFAULT_FILE_SERVICE_URL: &str = "http://localhost:8080/dps/files";

/// Submission service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub dispatch: DispatchConfig,
    pub topics: TopicsConfig,
    pub repository: RepositoryConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Remote representation store client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub base_url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fan-out, cancellation and progress settings for the dispatch engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub worker_count: usize,
    pub max_batch_size: usize,
    pub pool_shutdown_timeout_secs: u64,
    pub kill_check_interval_ms: u64,
    pub progress_log_frequency: u64,
}

impl DispatchConfig {
    pub fn pool_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_shutdown_timeout_secs)
    }

    pub fn kill_check_interval(&self) -> Duration {
        Duration::from_millis(self.kill_check_interval_ms)
    }

    /// Outstanding cloud ids that force a drain before the next page
    pub fn backpressure_threshold(&self) -> usize {
        self.worker_count * self.max_batch_size
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            pool_shutdown_timeout_secs: DEFAULT_POOL_SHUTDOWN_TIMEOUT_SECS,
            kill_check_interval_ms: DEFAULT_KILL_CHECK_INTERVAL_MS,
            progress_log_frequency: DEFAULT_PROGRESS_LOG_FREQUENCY,
        }
    }
}

/// Dispatch topics available to each topology
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicsConfig {
    pub by_topology: HashMap<String, Vec<String>>,
}

impl TopicsConfig {
    /// One topic per known topology, named after the topology
    pub fn defaults() -> Self {
        Self {
            by_topology: topologies::ALL
                .iter()
                .map(|name| (name.to_string(), vec![name.to_string()]))
                .collect(),
        }
    }
}

impl FromStr for TopicsConfig {
    type Err = anyhow::Error;

    /// Parse `oai_topology=oai_a;oai_b,http_topology=http_a`
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut by_topology = HashMap::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (topology, topics) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Invalid topic mapping '{}': expected topology=topics", entry))?;
            let topics: Vec<String> = topics
                .split(';')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if topics.is_empty() {
                anyhow::bail!("Topology {} has no topics", topology.trim());
            }
            by_topology.insert(topology.trim().to_string(), topics);
        }
        Ok(Self { by_topology })
    }
}

/// Settings for the direct file (repository archive) topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Archives are downloaded and unpacked under `<dir>/task_<id>`
    pub harvesting_tasks_dir: PathBuf,
    pub file_service_url: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            harvesting_tasks_dir: std::env::temp_dir().join("dps-harvesting"),
            file_service_url: DEFAULT_FILE_SERVICE_URL.to_string(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let topics = match std::env::var("DPS_TOPICS") {
            Ok(raw) => raw.parse()?,
            Err(_) => TopicsConfig::defaults(),
        };

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            store: StoreConfig {
                base_url: std::env::var("DPS_STORE_URL")
                    .unwrap_or_else(|_| DEFAULT_STORE_URL.to_string()),
                username: std::env::var("DPS_STORE_USERNAME").ok(),
                password: std::env::var("DPS_STORE_PASSWORD").ok(),
                max_attempts: env_or("DPS_STORE_MAX_ATTEMPTS", DEFAULT_STORE_MAX_ATTEMPTS),
                retry_delay_ms: env_or("DPS_STORE_RETRY_DELAY_MS", DEFAULT_STORE_RETRY_DELAY_MS),
                timeout_secs: env_or("DPS_STORE_TIMEOUT_SECS", DEFAULT_STORE_TIMEOUT_SECS),
            },
            dispatch: DispatchConfig {
                worker_count: env_or("DPS_WORKER_COUNT", DEFAULT_WORKER_COUNT),
                max_batch_size: env_or("DPS_MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE),
                pool_shutdown_timeout_secs: env_or(
                    "DPS_POOL_SHUTDOWN_TIMEOUT_SECS",
                    DEFAULT_POOL_SHUTDOWN_TIMEOUT_SECS,
                ),
                kill_check_interval_ms: env_or(
                    "DPS_KILL_CHECK_INTERVAL_MS",
                    DEFAULT_KILL_CHECK_INTERVAL_MS,
                ),
                progress_log_frequency: env_or(
                    "DPS_PROGRESS_LOG_FREQUENCY",
                    DEFAULT_PROGRESS_LOG_FREQUENCY,
                ),
            },
            topics,
            repository: RepositoryConfig {
                harvesting_tasks_dir: std::env::var("DPS_HARVESTING_TASKS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| RepositoryConfig::default().harvesting_tasks_dir),
                file_service_url: std::env::var("DPS_FILE_SERVICE_URL")
                    .unwrap_or_else(|_| DEFAULT_FILE_SERVICE_URL.to_string()),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.store.base_url.is_empty() {
            anyhow::bail!("Store URL cannot be empty");
        }

        if self.store.max_attempts == 0 {
            anyhow::bail!("Store max_attempts must be at least 1");
        }

        if self.dispatch.worker_count == 0 {
            anyhow::bail!("Dispatch worker_count must be greater than 0");
        }

        if self.dispatch.max_batch_size == 0 {
            anyhow::bail!("Dispatch max_batch_size must be greater than 0");
        }

        if self.dispatch.progress_log_frequency == 0 {
            anyhow::bail!("Dispatch progress_log_frequency must be greater than 0");
        }

        for topology in topologies::ALL {
            if !self.topics.by_topology.contains_key(*topology) {
                tracing::warn!(topology, "No dispatch topics configured, tasks for it will be dropped");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            store: StoreConfig {
                base_url: DEFAULT_STORE_URL.to_string(),
                username: None,
                password: None,
                max_attempts: DEFAULT_STORE_MAX_ATTEMPTS,
                retry_delay_ms: DEFAULT_STORE_RETRY_DELAY_MS,
                timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            },
            dispatch: DispatchConfig::default(),
            topics: TopicsConfig::defaults(),
            repository: RepositoryConfig::default(),
        }
    }
}
