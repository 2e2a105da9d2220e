//! Inbound ledger transactions.
//!
//! `validate_basic` performs stateless checks only. Handlers repeat nothing
//! from here and run the stateful checks before their first write.

use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use crate::types::{sequence_id, Address, Hash, PubKey, ValidatorId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgValidatorJoin {
    pub from: Address,
    pub id: ValidatorId,
    pub activation_epoch: u64,
    pub amount: Amount,
    pub signer_pub_key: PubKey,
    pub signer: Address,
    pub tx_hash: Hash,
    pub log_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSignerUpdate {
    pub from: Address,
    pub id: ValidatorId,
    pub new_signer_pub_key: PubKey,
    /// Total stake after the update, decimal digits
    pub new_amount: String,
    pub tx_hash: Hash,
    pub log_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgValidatorExit {
    pub from: Address,
    pub id: ValidatorId,
    pub deactivation_epoch: u64,
    pub tx_hash: Hash,
    pub log_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCheckpointAck {
    pub from: Address,
    pub number: u64,
    pub tx_hash: Hash,
    pub log_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTick {
    pub from: Address,
    pub slashing_info_hash: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTickAck {
    pub from: Address,
    pub tick_id: u64,
    pub amount: Amount,
    pub tx_hash: Hash,
    pub log_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUnjail {
    pub from: Address,
    pub id: ValidatorId,
    pub tx_hash: Hash,
    pub log_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTopup {
    pub from: Address,
    pub validator_id: ValidatorId,
    pub fee: Amount,
    pub tx_hash: Hash,
    pub log_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Msg {
    ValidatorJoin(MsgValidatorJoin),
    SignerUpdate(MsgSignerUpdate),
    ValidatorExit(MsgValidatorExit),
    CheckpointAck(MsgCheckpointAck),
    Tick(MsgTick),
    TickAck(MsgTickAck),
    Unjail(MsgUnjail),
    Topup(MsgTopup),
}

fn require_from(from: &Address) -> Result<()> {
    if from.is_zero() {
        return Err(LedgerError::invalid("missing sender"));
    }
    Ok(())
}

fn require_id(id: ValidatorId) -> Result<()> {
    if id.0 == 0 {
        return Err(LedgerError::invalid("validator id must be positive"));
    }
    Ok(())
}

fn require_pub_key(pk: &PubKey) -> Result<()> {
    if !pk.is_valid() {
        return Err(LedgerError::invalid(format!("invalid public key {}", pk.to_hex())));
    }
    Ok(())
}

impl Msg {
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::ValidatorJoin(_) => "validator_join",
            Msg::SignerUpdate(_) => "signer_update",
            Msg::ValidatorExit(_) => "validator_exit",
            Msg::CheckpointAck(_) => "checkpoint_ack",
            Msg::Tick(_) => "tick",
            Msg::TickAck(_) => "tick_ack",
            Msg::Unjail(_) => "unjail",
            Msg::Topup(_) => "topup",
        }
    }

    pub fn sender(&self) -> &Address {
        match self {
            Msg::ValidatorJoin(m) => &m.from,
            Msg::SignerUpdate(m) => &m.from,
            Msg::ValidatorExit(m) => &m.from,
            Msg::CheckpointAck(m) => &m.from,
            Msg::Tick(m) => &m.from,
            Msg::TickAck(m) => &m.from,
            Msg::Unjail(m) => &m.from,
            Msg::Topup(m) => &m.from,
        }
    }

    /// Root-chain event sequence, for messages that carry one.
    pub fn sequence(&self) -> Option<String> {
        match self {
            Msg::ValidatorJoin(m) => Some(sequence_id(&m.tx_hash, m.log_index)),
            Msg::SignerUpdate(m) => Some(sequence_id(&m.tx_hash, m.log_index)),
            Msg::ValidatorExit(m) => Some(sequence_id(&m.tx_hash, m.log_index)),
            Msg::CheckpointAck(m) => Some(sequence_id(&m.tx_hash, m.log_index)),
            Msg::TickAck(m) => Some(sequence_id(&m.tx_hash, m.log_index)),
            Msg::Unjail(m) => Some(sequence_id(&m.tx_hash, m.log_index)),
            Msg::Topup(m) => Some(sequence_id(&m.tx_hash, m.log_index)),
            Msg::Tick(_) => None,
        }
    }

    pub fn validate_basic(&self) -> Result<()> {
        require_from(self.sender())?;
        match self {
            Msg::ValidatorJoin(m) => {
                require_id(m.id)?;
                require_pub_key(&m.signer_pub_key)?;
                if m.signer.is_zero() {
                    return Err(LedgerError::invalid("missing signer address"));
                }
                Ok(())
            }
            Msg::SignerUpdate(m) => {
                require_id(m.id)?;
                require_pub_key(&m.new_signer_pub_key)?;
                if m.new_amount.is_empty() || !m.new_amount.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(LedgerError::invalid(format!("invalid new amount {:?}", m.new_amount)));
                }
                Ok(())
            }
            Msg::ValidatorExit(m) => require_id(m.id),
            Msg::CheckpointAck(_) => Ok(()),
            Msg::Tick(m) => {
                if m.slashing_info_hash.is_zero() {
                    return Err(LedgerError::invalid("missing slashing info hash"));
                }
                Ok(())
            }
            Msg::TickAck(m) => {
                if m.tick_id == 0 {
                    return Err(LedgerError::invalid("tick id must be positive"));
                }
                Ok(())
            }
            Msg::Unjail(m) => require_id(m.id),
            Msg::Topup(m) => {
                require_id(m.validator_id)?;
                if m.fee.is_zero() {
                    return Err(LedgerError::invalid("top-up fee must be positive"));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> Address { Address([1u8; 20]) }

    fn pubkey() -> PubKey {
        let mut raw = vec![0x04u8];
        raw.extend([9u8; 64]);
        PubKey(raw)
    }

    #[test]
    fn test_join_rejects_zero_id_and_bad_key() {
        let pk = pubkey();
        let mut m = MsgValidatorJoin {
            from: from(),
            id: ValidatorId(0),
            activation_epoch: 1,
            amount: Amount::from(10u64),
            signer: pk.address(),
            signer_pub_key: pk,
            tx_hash: Hash::keccak(b"tx"),
            log_index: 0,
        };
        assert!(Msg::ValidatorJoin(m.clone()).validate_basic().is_err());
        m.id = ValidatorId(1);
        assert!(Msg::ValidatorJoin(m.clone()).validate_basic().is_ok());
        m.signer_pub_key = PubKey(vec![0u8; 65]);
        assert!(Msg::ValidatorJoin(m).validate_basic().is_err());
    }

    #[test]
    fn test_signer_update_amount_must_be_digits() {
        let mut m = MsgSignerUpdate {
            from: from(),
            id: ValidatorId(1),
            new_signer_pub_key: pubkey(),
            new_amount: "12a".into(),
            tx_hash: Hash::keccak(b"tx"),
            log_index: 0,
        };
        assert!(Msg::SignerUpdate(m.clone()).validate_basic().is_err());
        m.new_amount = "1200".into();
        assert!(Msg::SignerUpdate(m).validate_basic().is_ok());
    }

    #[test]
    fn test_missing_sender_rejected() {
        let m = Msg::Tick(MsgTick { from: Address::default(), slashing_info_hash: Hash::keccak(b"x") });
        assert!(m.validate_basic().is_err());
    }

    #[test]
    fn test_tick_has_no_sequence() {
        let m = Msg::Tick(MsgTick { from: from(), slashing_info_hash: Hash::keccak(b"x") });
        assert!(m.sequence().is_none());
    }
}
