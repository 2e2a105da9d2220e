//! Signing-Info Tracker: per-validator liveness over a sliding window.
//!
//! The missed-block bitmap is sparse. A key exists only for a window slot the
//! validator missed; signing the slot again removes it.

use crate::error::{LedgerError, Result};
use crate::keys;
use crate::params::LedgerParams;
use crate::staking::SigningInfoWriter;
use crate::store::{get_record, put_record, records_with_prefix, KvStore};
use crate::types::ValidatorId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSigningInfo {
    pub id: ValidatorId,
    pub start_height: u64,
    /// Blocks observed since start; slot = index_offset % window
    pub index_offset: u64,
    pub missed_blocks_counter: u64,
}

impl ValidatorSigningInfo {
    pub fn new(id: ValidatorId, start_height: u64) -> Self {
        ValidatorSigningInfo {
            id,
            start_height,
            index_offset: 0,
            missed_blocks_counter: 0,
        }
    }
}

pub struct SigningInfoKeeper<'a> {
    store: &'a dyn KvStore,
    params: &'a LedgerParams,
}

impl<'a> SigningInfoKeeper<'a> {
    pub fn new(store: &'a dyn KvStore, params: &'a LedgerParams) -> Self {
        SigningInfoKeeper { store, params }
    }

    pub fn signing_info(&self, id: ValidatorId) -> Result<ValidatorSigningInfo> {
        get_record(self.store, &keys::signing_info_key(id))?
            .ok_or_else(|| LedgerError::not_found("signing info", id))
    }

    pub fn has_signing_info(&self, id: ValidatorId) -> Result<bool> {
        self.store.has(&keys::signing_info_key(id))
    }

    pub fn set_signing_info(&self, info: &ValidatorSigningInfo) -> Result<()> {
        put_record(self.store, &keys::signing_info_key(info.id), info)
    }

    pub fn all_signing_infos(&self) -> Result<Vec<ValidatorSigningInfo>> {
        records_with_prefix(self.store, &[keys::SIGNING_INFO_PREFIX])
    }

    pub fn missed_block_bit(&self, id: ValidatorId, index: u64) -> Result<bool> {
        self.store.has(&keys::missed_block_key(id, index))
    }

    fn set_missed_block_bit(&self, id: ValidatorId, index: u64, missed: bool) -> Result<()> {
        let key = keys::missed_block_key(id, index);
        if missed {
            self.store.set(&key, &[0x01])
        } else {
            self.store.delete(&key)
        }
    }

    fn clear_missed_block_bits(&self, id: ValidatorId) -> Result<()> {
        for (k, _) in self.store.iter_prefix(&keys::missed_block_prefix(id))? {
            self.store.delete(&k)?;
        }
        Ok(())
    }

    /// Record one block's vote for a validator.
    ///
    /// Returns the missed-block count when the validator, past its first
    /// full window, missed more than the window allows. The record is then
    /// reset so a fault is reported once per window.
    pub fn handle_validator_signature(&self, id: ValidatorId, signed: bool, height: u64) -> Result<Option<u64>> {
        let mut info = match get_record::<ValidatorSigningInfo>(self.store, &keys::signing_info_key(id))? {
            Some(info) => info,
            None => {
                warn!("no signing info for validator {}, vote ignored", id);
                return Ok(None);
            }
        };

        let window = self.params.signed_blocks_window;
        if window == 0 {
            return Err(LedgerError::invalid("signed_blocks_window must be positive"));
        }
        let index = info.index_offset % window;
        info.index_offset += 1;

        let previous = self.missed_block_bit(id, index)?;
        let missed = !signed;
        if !previous && missed {
            self.set_missed_block_bit(id, index, true)?;
            info.missed_blocks_counter += 1;
        } else if previous && !missed {
            self.set_missed_block_bit(id, index, false)?;
            info.missed_blocks_counter = info.missed_blocks_counter.saturating_sub(1);
        }

        if missed {
            debug!(
                "validator {} missed block {} ({} of {} in window)",
                id, height, info.missed_blocks_counter, window
            );
        }

        let min_height = info.start_height.saturating_add(window);
        let max_missed = self.params.max_missed_blocks();
        let mut fault = None;
        if height > min_height && info.missed_blocks_counter > max_missed {
            warn!(
                "validator {} below signing threshold: missed {} > {}",
                id, info.missed_blocks_counter, max_missed
            );
            fault = Some(info.missed_blocks_counter);
            info.missed_blocks_counter = 0;
            info.index_offset = 0;
            info.start_height = height;
            self.clear_missed_block_bits(id)?;
        }

        self.set_signing_info(&info)?;
        Ok(fault)
    }
}

impl SigningInfoWriter for SigningInfoKeeper<'_> {
    fn create_signing_info(&self, id: ValidatorId, start_height: u64) -> Result<()> {
        if self.has_signing_info(id)? {
            return Ok(());
        }
        self.set_signing_info(&ValidatorSigningInfo::new(id, start_height))
    }
}
