//! Configuration for the transfer engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Transfer configuration
    pub transfer: TransferConfig,

    /// Account configuration
    pub account: AccountConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/transfer"),
            rocksdb: RocksDbConfig::default(),
            transfer: TransferConfig::default(),
            account: AccountConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
        }
    }
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Bounded attempt count for contention retries (version conflicts,
    /// lock timeouts)
    pub max_apply_attempts: u32,

    /// Bounded wait for account lock acquisition (milliseconds)
    pub lock_timeout_ms: u64,

    /// Default limit for recent-transaction queries
    pub default_history_limit: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_apply_attempts: 5,
            lock_timeout_ms: 500,
            default_history_limit: 20,
        }
    }
}

/// Account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Attempts at generating a unique account number before giving up
    pub number_attempts: u32,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self { number_attempts: 8 }
    }
}

impl Config {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("TRANSFER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(attempts) = std::env::var("TRANSFER_MAX_APPLY_ATTEMPTS") {
            config.transfer.max_apply_attempts = attempts
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid attempt count: {}", e)))?;
        }

        if let Ok(timeout) = std::env::var("TRANSFER_LOCK_TIMEOUT_MS") {
            config.transfer.lock_timeout_ms = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid lock timeout: {}", e)))?;
        }

        Ok(config)
    }
}
