//! Slashing: liveness tracking and the buffer → tick → apply engine.

pub mod engine;
pub mod signing_info;
pub mod state;

pub use engine::{AppliedSlash, InterimSlash, SlashingKeeper};
pub use signing_info::{SigningInfoKeeper, ValidatorSigningInfo};
pub use state::{SlashStatus, ValidatorSlashingInfo};

use crate::amount::Amount;
use crate::error::Result;
use crate::staking::Validator;
use crate::types::ValidatorId;

/// What the slashing engine needs from the validator registry.
pub trait ValidatorRegistry {
    fn validator_by_id(&self, id: ValidatorId) -> Result<Validator>;

    /// Voting power of the current validator set.
    fn total_power(&self) -> Result<i64>;

    /// Reduce power by the power equivalent of `amount`, flooring at zero, and
    /// set the jailed flag when `jail` is true. Ok(false) if the validator is
    /// unknown.
    fn apply_slash(&self, id: ValidatorId, amount: &Amount, jail: bool) -> Result<bool>;

    /// Ok(false) when the flag already had that value.
    fn set_jailed(&self, id: ValidatorId, jailed: bool) -> Result<bool>;
}
