//! Config loader using TOML and serde.
//!
//! Fractions are kept as strings here so that the chain crate can parse them
//! into exact fixed-point decimals. Nothing in this module interprets them.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable holding an explicit config file path.
pub const CONFIG_FILE_ENV: &str = "STAKEGUARD_CONFIG_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Gagal membaca file config
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File config bukan TOML yang valid
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Data directory where the ledger keeps its LMDB environment.
    pub data_dir: String,

    /// Consensus parameters of the staking and slashing ledger.
    pub params: ParamsConfig,

    /// Relay pipeline settings.
    pub bridge: BridgeConfig,
}

/// Ledger parameters.
///
/// CONSENSUS-CRITICAL: every node must run with identical values.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ParamsConfig {
    /// Fraction of a validator's own stake that, once buffered as slashes,
    /// gets the validator jailed.
    pub jail_fraction_limit: String,
    /// Fraction of total network stake that, once slashed in the current
    /// buffer period, triggers a slash-limit signal.
    pub slash_fraction_limit: String,
    /// Fraction slashed for a double-sign evidence.
    pub slash_fraction_double_sign: String,
    /// Sliding window (in blocks) for liveness tracking.
    pub signed_blocks_window: u64,
    /// Minimum fraction of the window that must be signed.
    pub min_signed_per_window: String,
    /// Token units per unit of voting power, as a decimal string.
    pub power_reduction: String,
    /// Upper bound of the active validator set.
    pub validator_set_max_size: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    pub ledger_poll_interval_ms: u64,
    pub root_poll_interval_ms: u64,
    pub task_retry_count: u32,
    pub task_retry_delay_ms: u64,
    /// Base delay multiplied by a validator's index before it submits a tick.
    pub tick_submit_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: "./data".to_string(),
            params: ParamsConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl Default for ParamsConfig {
    fn default() -> Self {
        ParamsConfig {
            jail_fraction_limit: "0.5".to_string(),
            slash_fraction_limit: "0.333333333333333333".to_string(),
            slash_fraction_double_sign: "0.05".to_string(),
            signed_blocks_window: 100,
            min_signed_per_window: "0.5".to_string(),
            power_reduction: "1000000000000000000".to_string(),
            validator_set_max_size: 100,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            ledger_poll_interval_ms: 5_000,
            root_poll_interval_ms: 15_000,
            task_retry_count: 3,
            task_retry_delay_ms: 10_000,
            tick_submit_delay_ms: 30_000,
        }
    }
}

/// Load config from a TOML file path.
/// Missing sections and fields fall back to their defaults.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let p = path.as_ref();
    let shown = p.display().to_string();
    let s = fs::read_to_string(p).map_err(|source| ConfigError::Read {
        path: shown.clone(),
        source,
    })?;
    let cfg: Config = toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: shown.clone(),
        source,
    })?;
    info!("loaded config from {}", shown);
    Ok(cfg)
}

/// Load config from the file named by `STAKEGUARD_CONFIG_FILE`, or return the
/// defaults when the variable is unset.
pub fn load_from_env() -> Result<Config, ConfigError> {
    match std::env::var(CONFIG_FILE_ENV) {
        Ok(path) if !path.is_empty() => load_from_file(path),
        _ => {
            debug!("{} not set, using default config", CONFIG_FILE_ENV);
            Ok(Config::default())
        }
    }
}
