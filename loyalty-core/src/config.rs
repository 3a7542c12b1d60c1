//! Configuration for the loyalty ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default platform fee rate (basis points, 500 = 5%)
pub const DEFAULT_INTEREST_RATE_BPS: i16 = 500;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Voucher configuration
    pub voucher: VoucherConfig,

    /// Platform fee rate used when `initialize_program` omits one
    pub default_interest_rate_bps: i16,

    /// Event broadcast channel capacity
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/loyalty"),
            service_name: "loyalty-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            voucher: VoucherConfig::default(),
            default_interest_rate_bps: DEFAULT_INTEREST_RATE_BPS,
            event_capacity: 1024,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
        }
    }
}

/// Voucher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherConfig {
    /// How long a voucher stays valid after redemption (seconds)
    pub validity_secs: i64,
}

impl Default for VoucherConfig {
    fn default() -> Self {
        Self {
            validity_secs: 30 * 24 * 60 * 60, // 30 days
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LOYALTY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(validity) = std::env::var("LOYALTY_VOUCHER_VALIDITY_SECS") {
            config.voucher.validity_secs = validity
                .parse()
                .map_err(|e| crate::Error::Config(format!("Bad voucher validity: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "loyalty-core");
        assert_eq!(config.default_interest_rate_bps, 500);
        assert_eq!(config.voucher.validity_secs, 2_592_000);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.voucher.validity_secs, config.voucher.validity_secs);
    }
}
