//! Read-only query surface. Responses are JSON.

use crate::checkpoint::CheckpointKeeper;
use crate::error::LedgerError;
use crate::params::LedgerParams;
use crate::sequence::{SequenceIndex, SequenceKind};
use crate::slashing::{SigningInfoKeeper, SlashingKeeper};
use crate::staking::{AccountRootHasher, DividendKeeper, StakingKeeper};
use crate::store::KvStore;
use crate::types::{Address, ValidatorId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    ValidatorById(ValidatorId),
    ValidatorBySigner(Address),
    /// Whether the signer's validator is current at the present ack count
    ValidatorStatus(Address),
    CurrentProposer,
    NextProposer,
    CurrentValidatorSet,
    TotalPower,
    DividendAccount(ValidatorId),
    DividendAccounts,
    DividendRoot,
    StakingSequence(String),
    SlashingSequence(String),
    TopupSequence(String),
    BufferSlashingInfos,
    BufferSlashingInfo(ValidatorId),
    TickSlashingInfos,
    TotalSlashedAmount,
    SlashStatus(ValidatorId),
    SigningInfo(ValidatorId),
    TickCount,
    AckCount,
    Params,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for QueryError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound { .. } => QueryError::NotFound(e.to_string()),
            LedgerError::InvalidInput(msg) => QueryError::InvalidInput(msg),
            other => QueryError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ValidatorStatus {
    signer: Address,
    is_current: bool,
}

pub struct Querier<'a> {
    store: &'a dyn KvStore,
    params: &'a LedgerParams,
    hasher: &'a dyn AccountRootHasher,
}

fn json<T: Serialize>(value: &T) -> Result<Vec<u8>, QueryError> {
    serde_json::to_vec(value).map_err(|e| QueryError::Internal(e.to_string()))
}

impl<'a> Querier<'a> {
    pub fn new(store: &'a dyn KvStore, params: &'a LedgerParams, hasher: &'a dyn AccountRootHasher) -> Self {
        Querier { store, params, hasher }
    }

    pub fn query(&self, q: &Query) -> Result<Vec<u8>, QueryError> {
        let staking = StakingKeeper::new(self.store, self.params);
        let slashing = SlashingKeeper::new(self.store, self.params);
        let dividend = DividendKeeper::new(self.store);

        match q {
            Query::ValidatorById(id) => json(&staking.validator_by_id(*id)?),
            Query::ValidatorBySigner(signer) => json(&staking.validator_by_signer(signer)?),
            Query::ValidatorStatus(signer) => {
                let v = staking.validator_by_signer(signer)?;
                let ack = CheckpointKeeper::new(self.store).ack_count()?;
                json(&ValidatorStatus { signer: *signer, is_current: v.is_current_validator(ack) })
            }
            Query::CurrentProposer => match staking.current_proposer()? {
                Some(v) => json(&v),
                None => Err(QueryError::NotFound("no validator set".into())),
            },
            Query::NextProposer => match staking.next_proposer()? {
                Some(v) => json(&v),
                None => Err(QueryError::NotFound("no validator set".into())),
            },
            Query::CurrentValidatorSet => json(&staking.validator_set()?),
            Query::TotalPower => json(&staking.total_power()?),
            Query::DividendAccount(id) => json(&dividend.account(*id)?),
            Query::DividendAccounts => json(&dividend.all_accounts()?),
            Query::DividendRoot => json(&dividend.root(self.hasher)?),
            Query::StakingSequence(s) => json(&SequenceIndex::new(self.store, SequenceKind::Staking).has_seen(s)?),
            Query::SlashingSequence(s) => json(&SequenceIndex::new(self.store, SequenceKind::Slashing).has_seen(s)?),
            Query::TopupSequence(s) => json(&SequenceIndex::new(self.store, SequenceKind::Topup).has_seen(s)?),
            Query::BufferSlashingInfos => json(&slashing.buffer_infos()?),
            Query::BufferSlashingInfo(id) => match slashing.buffer_info(*id)? {
                Some(info) => json(&info),
                None => Err(QueryError::NotFound(format!("no buffered slash for validator {}", id))),
            },
            Query::TickSlashingInfos => json(&slashing.tick_infos()?),
            Query::TotalSlashedAmount => json(&slashing.total_slashed_amount()?),
            Query::SlashStatus(id) => json(&slashing.status(*id)?),
            Query::SigningInfo(id) => json(&SigningInfoKeeper::new(self.store, self.params).signing_info(*id)?),
            Query::TickCount => json(&slashing.tick_count()?),
            Query::AckCount => json(&CheckpointKeeper::new(self.store).ack_count()?),
            Query::Params => json(self.params),
        }
    }
}
