//! Task execution: tick debouncing, tick forwarding and root-chain relaying.

use crate::client::{LedgerClient, RootChainClient, RootChainEvent, RootChainLog};
use crate::error::BridgeError;
use crate::queue::{Task, TaskExecutor, TaskKind, TaskQueue};
use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use stakeguard_chain::msgs::*;
use stakeguard_chain::slashing::{SlashingKeeper, ValidatorSlashingInfo};
use stakeguard_chain::staking::ValidatorSet;
use stakeguard_chain::{Address, Hash, Msg, Query, TxOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Ledger message for a root-chain staking event.
pub fn root_event_to_msg(log: &RootChainLog, from: Address) -> Msg {
    let tx_hash = log.tx_hash;
    let log_index = log.log_index;
    match &log.event {
        RootChainEvent::Staked { id, activation_epoch, amount, signer_pub_key } => {
            Msg::ValidatorJoin(MsgValidatorJoin {
                from,
                id: *id,
                activation_epoch: *activation_epoch,
                amount: amount.clone(),
                signer: signer_pub_key.address(),
                signer_pub_key: signer_pub_key.clone(),
                tx_hash,
                log_index,
            })
        }
        RootChainEvent::SignerChange { id, new_signer_pub_key, new_amount } => Msg::SignerUpdate(MsgSignerUpdate {
            from,
            id: *id,
            new_signer_pub_key: new_signer_pub_key.clone(),
            new_amount: new_amount.to_string(),
            tx_hash,
            log_index,
        }),
        RootChainEvent::UnstakeInit { id, deactivation_epoch } => Msg::ValidatorExit(MsgValidatorExit {
            from,
            id: *id,
            deactivation_epoch: *deactivation_epoch,
            tx_hash,
            log_index,
        }),
        RootChainEvent::TopUpFee { validator_id, fee } => Msg::Topup(MsgTopup {
            from,
            validator_id: *validator_id,
            fee: fee.clone(),
            tx_hash,
            log_index,
        }),
        RootChainEvent::TickAck { tick_id, amount } => Msg::TickAck(MsgTickAck {
            from,
            tick_id: *tick_id,
            amount: amount.clone(),
            tx_hash,
            log_index,
        }),
        RootChainEvent::CheckpointAck { number } => Msg::CheckpointAck(MsgCheckpointAck {
            from,
            number: *number,
            tx_hash,
            log_index,
        }),
    }
}

pub struct TickProcessor {
    ledger: Arc<dyn LedgerClient>,
    root: Arc<dyn RootChainClient>,
    /// Signer this relay submits ledger transactions as
    signer: Address,
    submit_delay: Duration,
    last_submitted: Mutex<Option<Hash>>,
}

impl TickProcessor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        root: Arc<dyn RootChainClient>,
        signer: Address,
        submit_delay: Duration,
    ) -> Self {
        TickProcessor {
            ledger,
            root,
            signer,
            submit_delay,
            last_submitted: Mutex::new(None),
        }
    }

    pub fn last_submitted(&self) -> Option<Hash> {
        *self.last_submitted.lock()
    }

    async fn query<T: DeserializeOwned>(&self, query: Query) -> Result<T, BridgeError> {
        let body = self.ledger.query(query).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Hash of the buffer if a tick could be proposed now.
    async fn tick_candidate(&self) -> Result<Option<Hash>, BridgeError> {
        let pending: Vec<ValidatorSlashingInfo> = self.query(Query::TickSlashingInfos).await?;
        if !pending.is_empty() {
            debug!("tick already pending with {} entries", pending.len());
            return Ok(None);
        }
        let buffer: Vec<ValidatorSlashingInfo> = self.query(Query::BufferSlashingInfos).await?;
        if buffer.is_empty() {
            debug!("slashing buffer empty, no tick needed");
            return Ok(None);
        }
        let hash = SlashingKeeper::slashing_info_hash(&buffer);
        if self.last_submitted() == Some(hash) {
            debug!("tick for {} already submitted", hash);
            return Ok(None);
        }
        Ok(Some(hash))
    }

    /// Submission delay from this signer's position in the validator set.
    /// Signers outside the set wait behind every member.
    async fn submit_delay_for_self(&self) -> Result<Duration, BridgeError> {
        let set: ValidatorSet = self.query(Query::CurrentValidatorSet).await?;
        let position = set
            .validators
            .iter()
            .position(|v| v.signer == self.signer)
            .unwrap_or(set.validators.len());
        Ok(self.submit_delay * position as u32)
    }

    async fn prepare_tick(&self, queue: &TaskQueue) -> anyhow::Result<()> {
        let hash = match self.tick_candidate().await? {
            Some(h) => h,
            None => return Ok(()),
        };
        let delay = self.submit_delay_for_self().await?;
        info!("scheduling tick for {} in {:?}", hash, delay);
        queue.push_delayed(Task::new(TaskKind::SubmitTick { slashing_info_hash: hash }), delay);
        Ok(())
    }

    async fn submit_tick(&self, hash: Hash) -> anyhow::Result<()> {
        // another relay may have ticked, or the buffer grown, meanwhile
        if self.tick_candidate().await? != Some(hash) {
            debug!("tick for {} is stale, skipping", hash);
            return Ok(());
        }
        let msg = Msg::Tick(MsgTick { from: self.signer, slashing_info_hash: hash });
        self.ledger
            .broadcast(msg)
            .await
            .with_context(|| format!("broadcasting tick {}", hash))?;
        *self.last_submitted.lock() = Some(hash);
        info!("tick submitted for {}", hash);
        Ok(())
    }

    async fn send_to_ledger(&self, msg: &Msg) -> anyhow::Result<()> {
        let outcome = self
            .ledger
            .broadcast(msg.clone())
            .await
            .with_context(|| format!("broadcasting {}", msg.kind()))?;
        match outcome {
            TxOutcome::Duplicate => debug!("{} already applied", msg.kind()),
            TxOutcome::NoOp(reason) => debug!("{} had no effect: {}", msg.kind(), reason),
            TxOutcome::Applied => info!("{} relayed to ledger", msg.kind()),
        }
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for TickProcessor {
    async fn execute(&self, task: &Task, queue: &TaskQueue) -> anyhow::Result<()> {
        match &task.kind {
            TaskKind::PrepareTick { validator_id, total_slashed } => {
                debug!("slash limit exceeded by {} (total {})", validator_id, total_slashed);
                self.prepare_tick(queue).await
            }
            TaskKind::SubmitTick { slashing_info_hash } => self.submit_tick(*slashing_info_hash).await,
            TaskKind::SendTickToRootChain { tick_id, slashing_info_hash } => {
                let tx = self
                    .root
                    .submit_tick(*tick_id, *slashing_info_hash)
                    .await
                    .with_context(|| format!("submitting tick {} to root chain", tick_id))?;
                info!("tick {} sent to root chain in {}", tick_id, tx);
                Ok(())
            }
            TaskKind::SendToLedger(msg) => self.send_to_ledger(msg).await,
        }
    }
}
