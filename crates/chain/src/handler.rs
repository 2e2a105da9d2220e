//! Message router and per-message handlers.
//!
//! Every handler runs inside one [`Context`]. Stateful validation happens
//! before the first write, so a rejected message leaves nothing behind even
//! before the context is discarded. Events that may be redelivered from the
//! root chain are deduplicated here through the sequence index.

use crate::amount::{Amount, Dec};
use crate::context::Context;
use crate::error::{LedgerError, Result};
use crate::events::{LedgerEvent, SlashReason};
use crate::msgs::*;
use crate::sequence::SequenceKind;
use crate::slashing::{InterimSlash, SlashingKeeper};
use crate::staking::{SigningInfoWriter, Validator};
use crate::types::{sequence_id, Address, ValidatorId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Outcome of a successfully handled message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutcome {
    Applied,
    /// Root-chain event already applied; nothing changed
    Duplicate,
    /// Accepted but had no effect
    NoOp(String),
}

/// Liveness vote for one validator in the previous block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    pub signer: Address,
    pub signed: bool,
}

/// Double-sign evidence reported by consensus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub signer: Address,
    pub height: u64,
}

pub fn handle_msg(ctx: &mut Context<'_>, msg: &Msg) -> Result<TxOutcome> {
    match msg {
        Msg::ValidatorJoin(m) => handle_validator_join(ctx, m),
        Msg::SignerUpdate(m) => handle_signer_update(ctx, m),
        Msg::ValidatorExit(m) => handle_validator_exit(ctx, m),
        Msg::CheckpointAck(m) => handle_checkpoint_ack(ctx, m),
        Msg::Tick(m) => handle_tick(ctx, m),
        Msg::TickAck(m) => handle_tick_ack(ctx, m),
        Msg::Unjail(m) => handle_unjail(ctx, m),
        Msg::Topup(m) => handle_topup(ctx, m),
    }
}

fn already_seen(ctx: &Context<'_>, kind: SequenceKind, sequence: &str) -> Result<bool> {
    if ctx.sequences(kind).has_seen(sequence)? {
        debug!("{} sequence {} already processed", kind, sequence);
        return Ok(true);
    }
    Ok(false)
}

// ============================================================
// STAKING
// ============================================================

fn handle_validator_join(ctx: &mut Context<'_>, m: &MsgValidatorJoin) -> Result<TxOutcome> {
    let sequence = sequence_id(&m.tx_hash, m.log_index);
    if already_seen(ctx, SequenceKind::Staking, &sequence)? {
        return Ok(TxOutcome::Duplicate);
    }

    let staking = ctx.staking();
    if staking.has_validator_id(m.id)? {
        return Err(LedgerError::invalid(format!("validator {} already exists", m.id)));
    }
    let derived = m.signer_pub_key.address();
    if derived != m.signer {
        return Err(LedgerError::invalid(format!(
            "signer {} does not match public key (derives {})",
            m.signer, derived
        )));
    }
    if staking.has_signer(&m.signer)? {
        return Err(LedgerError::invalid(format!("signer {} already in use", m.signer)));
    }

    let power = m.amount.to_power(staking.power_reduction());
    let mut validator = Validator::new(m.id, m.activation_epoch, 0, power, m.signer_pub_key.clone(), m.signer);
    validator.last_updated = sequence.clone();
    staking.add_validator(&validator)?;

    let signing = ctx.signing_info();
    let writer: &dyn SigningInfoWriter = &signing;
    writer.create_signing_info(m.id, ctx.height())?;
    ctx.sequences(SequenceKind::Staking).mark_seen(&sequence)?;

    info!("validator {} joined with signer {} and power {}", m.id, m.signer, power);
    ctx.emit(LedgerEvent::ValidatorJoined {
        id: m.id,
        signer: m.signer,
        power,
        activation_epoch: m.activation_epoch,
    });
    Ok(TxOutcome::Applied)
}

fn handle_signer_update(ctx: &mut Context<'_>, m: &MsgSignerUpdate) -> Result<TxOutcome> {
    let sequence = sequence_id(&m.tx_hash, m.log_index);
    if already_seen(ctx, SequenceKind::Staking, &sequence)? {
        return Ok(TxOutcome::Duplicate);
    }

    let staking = ctx.staking();
    let mut validator = staking.validator_by_id(m.id)?;
    let new_amount = Amount::from_str(&m.new_amount)?;
    let new_power = new_amount.to_power(staking.power_reduction());
    let new_signer = m.new_signer_pub_key.address();
    let old_signer = validator.signer;
    let signer_changed = new_signer != old_signer;
    if signer_changed && staking.has_signer(&new_signer)? {
        return Err(LedgerError::invalid(format!("signer {} already in use", new_signer)));
    }

    let mut events = Vec::new();
    let power_changed = validator.voting_power != new_power;
    validator.voting_power = new_power;
    validator.last_updated = sequence.clone();
    staking.add_validator(&validator)?;
    if power_changed {
        events.push(LedgerEvent::StakeUpdated { id: m.id, power: new_power });
    }

    if signer_changed {
        staking.update_signer(new_signer, m.new_signer_pub_key.clone(), &old_signer)?;
        events.push(LedgerEvent::SignerChanged { id: m.id, old_signer, new_signer });
    }
    ctx.sequences(SequenceKind::Staking).mark_seen(&sequence)?;
    ctx.emit_all(events);
    Ok(TxOutcome::Applied)
}

fn handle_validator_exit(ctx: &mut Context<'_>, m: &MsgValidatorExit) -> Result<TxOutcome> {
    let sequence = sequence_id(&m.tx_hash, m.log_index);
    if already_seen(ctx, SequenceKind::Staking, &sequence)? {
        return Ok(TxOutcome::Duplicate);
    }

    let staking = ctx.staking();
    let mut validator = staking.validator_by_id(m.id)?;
    if validator.end_epoch != 0 {
        return Err(LedgerError::invalid(format!(
            "validator {} already exiting at epoch {}",
            m.id, validator.end_epoch
        )));
    }
    validator.end_epoch = m.deactivation_epoch;
    validator.last_updated = sequence.clone();
    staking.add_validator(&validator)?;
    ctx.sequences(SequenceKind::Staking).mark_seen(&sequence)?;

    info!("validator {} exits at epoch {}", m.id, m.deactivation_epoch);
    ctx.emit(LedgerEvent::ValidatorExited {
        id: m.id,
        deactivation_epoch: m.deactivation_epoch,
    });
    Ok(TxOutcome::Applied)
}

fn handle_topup(ctx: &mut Context<'_>, m: &MsgTopup) -> Result<TxOutcome> {
    let sequence = sequence_id(&m.tx_hash, m.log_index);
    if already_seen(ctx, SequenceKind::Topup, &sequence)? {
        return Ok(TxOutcome::Duplicate);
    }
    if !ctx.staking().has_validator_id(m.validator_id)? {
        return Err(LedgerError::not_found("validator", m.validator_id));
    }
    let account = ctx.dividend().credit_fee(m.validator_id, &m.fee)?;
    ctx.sequences(SequenceKind::Topup).mark_seen(&sequence)?;

    debug!("top-up {} for validator {}, fee balance {}", m.fee, m.validator_id, account.fee_amount);
    ctx.emit(LedgerEvent::FeeCredited { id: m.validator_id, fee: m.fee.clone() });
    Ok(TxOutcome::Applied)
}

// ============================================================
// CHECKPOINT
// ============================================================

fn handle_checkpoint_ack(ctx: &mut Context<'_>, m: &MsgCheckpointAck) -> Result<TxOutcome> {
    let sequence = sequence_id(&m.tx_hash, m.log_index);
    if already_seen(ctx, SequenceKind::Checkpoint, &sequence)? {
        return Ok(TxOutcome::Duplicate);
    }
    let checkpoint = ctx.checkpoint();
    let expected = checkpoint.ack_count()? + 1;
    if m.number != expected {
        return Err(LedgerError::invalid(format!(
            "checkpoint ack {} out of order, expected {}",
            m.number, expected
        )));
    }
    let ack_count = checkpoint.increment_ack_count()?;
    ctx.staking().increment_accum(1)?;
    ctx.sequences(SequenceKind::Checkpoint).mark_seen(&sequence)?;

    ctx.emit(LedgerEvent::CheckpointAcked { number: m.number, ack_count });
    Ok(TxOutcome::Applied)
}

// ============================================================
// SLASHING
// ============================================================

fn handle_tick(ctx: &mut Context<'_>, m: &MsgTick) -> Result<TxOutcome> {
    let slashing = ctx.slashing();
    if !slashing.tick_infos()?.is_empty() {
        return Err(LedgerError::invalid("previous tick not acknowledged yet"));
    }
    let buffer = slashing.buffer_infos()?;
    if buffer.is_empty() {
        return Err(LedgerError::invalid("slashing buffer is empty"));
    }
    let expected = SlashingKeeper::slashing_info_hash(&buffer);
    if expected != m.slashing_info_hash {
        return Err(LedgerError::invalid(format!(
            "slashing info hash mismatch: got {}, buffer hashes to {}",
            m.slashing_info_hash, expected
        )));
    }

    slashing.begin_tick()?;
    let tick_id = slashing.increment_tick_count()?;
    info!("tick {} confirmed with {} entries", tick_id, buffer.len());
    ctx.emit(LedgerEvent::TickConfirmed {
        tick_id,
        slashing_info_hash: expected,
    });
    Ok(TxOutcome::Applied)
}

fn handle_tick_ack(ctx: &mut Context<'_>, m: &MsgTickAck) -> Result<TxOutcome> {
    let sequence = sequence_id(&m.tx_hash, m.log_index);
    if already_seen(ctx, SequenceKind::Slashing, &sequence)? {
        return Ok(TxOutcome::Duplicate);
    }

    let slashing = ctx.slashing();
    let current = slashing.tick_count()?;
    if m.tick_id != current {
        return Err(LedgerError::invalid(format!("tick ack for {} but current tick is {}", m.tick_id, current)));
    }
    let pending = slashing.tick_infos()?;
    if pending.is_empty() {
        return Err(LedgerError::invalid(format!("tick {} has no pending entries", m.tick_id)));
    }
    let pending_total = pending
        .iter()
        .fold(Amount::zero(), |acc, i| &acc + &i.slashed_amount);
    if pending_total != m.amount {
        return Err(LedgerError::invalid(format!(
            "tick ack amount {} does not match pending total {}",
            m.amount, pending_total
        )));
    }

    let applied = slashing.commit_tick(&ctx.staking())?;
    ctx.sequences(SequenceKind::Slashing).mark_seen(&sequence)?;

    // reduced powers take effect on the set right away
    let ack_count = ctx.checkpoint().ack_count()?;
    ctx.staking().rebuild_validator_set(ack_count)?;

    let mut events = Vec::with_capacity(applied.len() + 1);
    for a in &applied {
        if let Some(power) = a.power {
            events.push(LedgerEvent::SlashApplied {
                id: a.info.id,
                amount: a.info.slashed_amount.clone(),
                power,
                jailed: a.jailed,
            });
        }
    }
    events.push(LedgerEvent::TickCommitted { tick_id: m.tick_id, validators: applied.len() });
    ctx.emit_all(events);
    Ok(TxOutcome::Applied)
}

fn handle_unjail(ctx: &mut Context<'_>, m: &MsgUnjail) -> Result<TxOutcome> {
    let sequence = sequence_id(&m.tx_hash, m.log_index);
    if already_seen(ctx, SequenceKind::Slashing, &sequence)? {
        return Ok(TxOutcome::Duplicate);
    }
    let staking = ctx.staking();
    let validator = staking.validator_by_id(m.id)?;
    if validator.signer != m.from {
        return Err(LedgerError::invalid(format!(
            "sender {} is not the signer of validator {}",
            m.from, m.id
        )));
    }
    let changed = ctx.slashing().unjail(&staking, m.id)?;
    ctx.sequences(SequenceKind::Slashing).mark_seen(&sequence)?;
    if !changed {
        return Ok(TxOutcome::NoOp(format!("validator {} is not jailed", m.id)));
    }
    ctx.emit(LedgerEvent::Unjailed { id: m.id });
    Ok(TxOutcome::Applied)
}

/// Events for one buffered slash.
fn interim_events(id: ValidatorId, slash: &InterimSlash, reason: SlashReason) -> Vec<LedgerEvent> {
    let mut events = vec![LedgerEvent::Slashed { id, amount: slash.amount.clone(), reason }];
    if slash.newly_jailed {
        events.push(LedgerEvent::Jailed { id });
    }
    if slash.limit_exceeded {
        events.push(LedgerEvent::SlashLimitExceeded {
            validator_id: id,
            amount: slash.total_slashed.clone(),
        });
    }
    events
}

/// Buffer a slash and emit its events.
pub fn slash(ctx: &mut Context<'_>, id: ValidatorId, fraction: &Dec, reason: SlashReason) -> Result<InterimSlash> {
    let result = ctx.slashing().slash_interim(&ctx.staking(), id, fraction)?;
    ctx.emit_all(interim_events(id, &result, reason));
    Ok(result)
}

// ============================================================
// BLOCK HOOKS
// ============================================================

fn resolve_signer(ctx: &Context<'_>, signer: &Address) -> Result<Option<Validator>> {
    match ctx.staking().validator_by_signer(signer) {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Liveness tracking and double-sign evidence for the block at `ctx.height()`.
pub fn handle_begin_block(ctx: &mut Context<'_>, votes: &[VoteInfo], evidence: &[Evidence]) -> Result<()> {
    let height = ctx.height();
    for vote in votes {
        let validator = match resolve_signer(ctx, &vote.signer)? {
            Some(v) => v,
            None => {
                warn!("vote from unknown signer {} ignored", vote.signer);
                continue;
            }
        };
        let fault = ctx.signing_info().handle_validator_signature(validator.id, vote.signed, height)?;
        if let Some(missed) = fault {
            ctx.emit(LedgerEvent::LivenessFault { id: validator.id, missed_blocks: missed });
        }
    }

    let fraction = ctx.params().slash_fraction_double_sign.clone();
    for ev in evidence {
        let validator = match resolve_signer(ctx, &ev.signer)? {
            Some(v) => v,
            None => {
                warn!("evidence against unknown signer {} at height {} ignored", ev.signer, ev.height);
                continue;
            }
        };
        info!("double-sign evidence against validator {} at height {}", validator.id, ev.height);
        slash(ctx, validator.id, &fraction, SlashReason::DoubleSign)?;
    }
    Ok(())
}
