//! Command-line and environment configuration for the `pairforge` binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pairforge_instance::InstanceConfig;
use pairforge_session::LoopbackConfig;

/// Pairforge configuration.
///
/// Every flag can also be set through the environment; a `.env` file is
/// loaded before parsing.
#[derive(Parser, Debug, Clone)]
#[command(name = "pairforge")]
#[command(about = "HTTP service managing per-user messaging sessions")]
pub struct Config {
    /// Bearer token every endpoint except /health requires
    #[arg(long, env = "PAIRFORGE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Interface to listen on
    #[arg(long, env = "PAIRFORGE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// Device store: `memory`, or a directory for file-backed records
    #[arg(long, env = "PAIRFORGE_STORE", default_value = "sessions")]
    pub store: String,

    /// Seconds to wait for the first pairing code
    #[arg(long, env = "PAIRFORGE_PAIRING_TIMEOUT_SECS", default_value = "30")]
    pub pairing_timeout_secs: u64,

    /// Loopback backend: complete pairing automatically after this many seconds
    #[arg(long, env = "PAIRFORGE_LOOPBACK_AUTO_PAIR_SECS")]
    pub loopback_auto_pair_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Where device records are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// In process memory; lost on restart.
    Memory,
    /// One JSON file per device under this directory.
    Dir(PathBuf),
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("PAIRFORGE_API_KEY must not be empty".to_string());
        }
        if self.pairing_timeout_secs == 0 {
            return Err("PAIRFORGE_PAIRING_TIMEOUT_SECS must be at least 1".to_string());
        }
        if self.store.trim().is_empty() {
            return Err("PAIRFORGE_STORE must be `memory` or a directory".to_string());
        }
        Ok(())
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_location(&self) -> StoreLocation {
        match self.store.trim() {
            "memory" => StoreLocation::Memory,
            dir => StoreLocation::Dir(PathBuf::from(dir)),
        }
    }

    pub fn instance_config(&self) -> InstanceConfig {
        InstanceConfig {
            pairing_timeout: Duration::from_secs(self.pairing_timeout_secs),
        }
    }

    pub fn loopback_config(&self) -> LoopbackConfig {
        LoopbackConfig {
            auto_pair_after: self.loopback_auto_pair_secs.map(Duration::from_secs),
            ..LoopbackConfig::default()
        }
    }
}
