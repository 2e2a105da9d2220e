//! # StakeGuard Common Crate
//!
//! Shared configuration for the ledger and the relay pipeline.
//!
//! ## Modules
//! - `config`: TOML configuration (ledger params, relay intervals)

pub mod config;

pub use config::{BridgeConfig, Config, ConfigError, ParamsConfig};
