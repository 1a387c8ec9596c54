//! Feed client configuration
//!
//! Loaded from TOML, overridden by CLI/env in the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::recovery::GapRecoveryConfig;
use super::store::DuplicatePolicy;
use super::transport::TcpConnector;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedClientConfig {
    /// Feed server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Feed server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Pause between backfill attempts (ms)
    #[serde(default = "default_backfill_delay_ms")]
    pub backfill_delay_ms: u64,

    /// Read timeout (ms). Unset blocks indefinitely.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,

    /// Connect timeout (ms). Unset uses the OS default.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Where the exporter writes the dataset
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_backfill_delay_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output.json")
}

impl Default for FeedClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backfill_delay_ms: default_backfill_delay_ms(),
            read_timeout_ms: None,
            connect_timeout_ms: None,
            tcp_nodelay: true,
            duplicate_policy: DuplicatePolicy::default(),
            output_path: default_output_path(),
        }
    }
}

impl FeedClientConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connector(&self) -> TcpConnector {
        TcpConnector {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            tcp_nodelay: self.tcp_nodelay,
        }
    }

    pub fn gap_recovery(&self) -> GapRecoveryConfig {
        GapRecoveryConfig {
            backfill_delay: Duration::from_millis(self.backfill_delay_ms),
        }
    }
}
