//! Gateway settings
//!
//! Layered from defaults, an optional `gateway.toml` in the working directory,
//! and `EXCHANGE__*` environment variables (`EXCHANGE__ENGINE__PLATFORM_FEE_RATE`,
//! `EXCHANGE__LEDGER_URL`, ...). Any collaborator without a URL runs in-process.
//! The store is in memory unless `store_dir` is set; a real ledger requires it.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use settlement::store::DurableStoreConfig;
use settlement::EngineConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    pub engine: EngineConfig,
    /// Ledger bridge base URL
    pub ledger_url: Option<String>,
    pub oracle_url: Option<String>,
    pub audit_url: Option<String>,
    pub http_timeout_ms: u64,
    /// JSON reference data for a new store and the sandbox ledger
    pub seed_path: Option<PathBuf>,
    /// Directory for the store journal and snapshots
    pub store_dir: Option<PathBuf>,
    /// Journal appends between store snapshots
    pub snapshot_interval: u64,
    /// Fiat to settlement-currency rate served when no oracle URL is set
    pub sandbox_exchange_rate: Option<Decimal>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            engine: EngineConfig::default(),
            ledger_url: None,
            oracle_url: None,
            audit_url: None,
            http_timeout_ms: 10_000,
            seed_path: None,
            store_dir: None,
            snapshot_interval: 1_000,
            sandbox_exchange_rate: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("gateway").required(false))
            .add_source(
                Environment::with_prefix("EXCHANGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn durable_store(&self) -> Option<DurableStoreConfig> {
        self.store_dir.as_ref().map(|dir| DurableStoreConfig {
            dir: dir.clone(),
            snapshot_interval: self.snapshot_interval,
        })
    }
}
