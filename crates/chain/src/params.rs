//! Typed ledger parameters parsed from `stakeguard_common::ParamsConfig`.

use crate::amount::{Amount, Dec};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use stakeguard_common::ParamsConfig;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerParams {
    pub jail_fraction_limit: Dec,
    pub slash_fraction_limit: Dec,
    pub slash_fraction_double_sign: Dec,
    pub signed_blocks_window: u64,
    pub min_signed_per_window: Dec,
    pub power_reduction: Amount,
    pub validator_set_max_size: usize,
}

impl Default for LedgerParams {
    fn default() -> Self {
        LedgerParams {
            jail_fraction_limit: Dec::from_raw(500_000_000_000_000_000),
            slash_fraction_limit: Dec::from_raw(333_333_333_333_333_333),
            slash_fraction_double_sign: Dec::from_raw(50_000_000_000_000_000),
            signed_blocks_window: 100,
            min_signed_per_window: Dec::from_raw(500_000_000_000_000_000),
            power_reduction: Amount::from(1_000_000_000_000_000_000u64),
            validator_set_max_size: 100,
        }
    }
}

fn fraction(name: &str, raw: &str) -> Result<Dec> {
    let d = Dec::from_str(raw)
        .map_err(|e| LedgerError::invalid(format!("{}: {}", name, e)))?;
    if d > Dec::one() {
        return Err(LedgerError::invalid(format!("{} must not exceed 1, got {}", name, raw)));
    }
    Ok(d)
}

impl LedgerParams {
    /// Parse and bound-check every field.
    pub fn from_config(cfg: &ParamsConfig) -> Result<Self> {
        let power_reduction = Amount::from_str(&cfg.power_reduction)
            .map_err(|e| LedgerError::invalid(format!("power_reduction: {}", e)))?;
        if power_reduction.is_zero() {
            return Err(LedgerError::invalid("power_reduction must be positive"));
        }
        if cfg.signed_blocks_window == 0 {
            return Err(LedgerError::invalid("signed_blocks_window must be positive"));
        }
        if cfg.validator_set_max_size == 0 {
            return Err(LedgerError::invalid("validator_set_max_size must be positive"));
        }

        Ok(LedgerParams {
            jail_fraction_limit: fraction("jail_fraction_limit", &cfg.jail_fraction_limit)?,
            slash_fraction_limit: fraction("slash_fraction_limit", &cfg.slash_fraction_limit)?,
            slash_fraction_double_sign: fraction("slash_fraction_double_sign", &cfg.slash_fraction_double_sign)?,
            signed_blocks_window: cfg.signed_blocks_window,
            min_signed_per_window: fraction("min_signed_per_window", &cfg.min_signed_per_window)?,
            power_reduction,
            validator_set_max_size: cfg.validator_set_max_size,
        })
    }

    /// Blocks a validator must sign in every window.
    pub fn min_signed_blocks(&self) -> u64 {
        self.min_signed_per_window.mul_round_u64(self.signed_blocks_window)
    }

    /// Misses tolerated within one window.
    pub fn max_missed_blocks(&self) -> u64 {
        self.signed_blocks_window.saturating_sub(self.min_signed_blocks())
    }
}
