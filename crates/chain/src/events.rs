//! Events emitted by ledger transactions.
//!
//! The relay pipeline polls these by height and turns some of them into
//! follow-up transactions.

use crate::amount::Amount;
use crate::types::{Address, Hash, ValidatorId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashReason {
    DoubleSign,
    Manual,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    ValidatorJoined {
        id: ValidatorId,
        signer: Address,
        power: i64,
        activation_epoch: u64,
    },
    SignerChanged {
        id: ValidatorId,
        old_signer: Address,
        new_signer: Address,
    },
    StakeUpdated {
        id: ValidatorId,
        power: i64,
    },
    ValidatorExited {
        id: ValidatorId,
        deactivation_epoch: u64,
    },
    CheckpointAcked {
        number: u64,
        ack_count: u64,
    },
    /// Amount added to the slashing buffer.
    Slashed {
        id: ValidatorId,
        amount: Amount,
        reason: SlashReason,
    },
    Jailed {
        id: ValidatorId,
    },
    Unjailed {
        id: ValidatorId,
    },
    /// Total buffered slashes passed the network-wide limit.
    SlashLimitExceeded {
        validator_id: ValidatorId,
        amount: Amount,
    },
    TickConfirmed {
        tick_id: u64,
        slashing_info_hash: Hash,
    },
    /// A tick entry was applied to the validator record.
    SlashApplied {
        id: ValidatorId,
        amount: Amount,
        power: i64,
        jailed: bool,
    },
    TickCommitted {
        tick_id: u64,
        validators: usize,
    },
    FeeCredited {
        id: ValidatorId,
        fee: Amount,
    },
    LivenessFault {
        id: ValidatorId,
        missed_blocks: u64,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::ValidatorJoined { .. } => "validator_joined",
            LedgerEvent::SignerChanged { .. } => "signer_changed",
            LedgerEvent::StakeUpdated { .. } => "stake_updated",
            LedgerEvent::ValidatorExited { .. } => "validator_exited",
            LedgerEvent::CheckpointAcked { .. } => "checkpoint_acked",
            LedgerEvent::Slashed { .. } => "slashed",
            LedgerEvent::Jailed { .. } => "jailed",
            LedgerEvent::Unjailed { .. } => "unjailed",
            LedgerEvent::SlashLimitExceeded { .. } => "slash_limit_exceeded",
            LedgerEvent::TickConfirmed { .. } => "tick_confirmed",
            LedgerEvent::SlashApplied { .. } => "slash_applied",
            LedgerEvent::TickCommitted { .. } => "tick_committed",
            LedgerEvent::FeeCredited { .. } => "fee_credited",
            LedgerEvent::LivenessFault { .. } => "liveness_fault",
        }
    }
}

/// Event tagged with the height it was committed at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightEvent {
    pub height: u64,
    pub event: LedgerEvent,
}
