//! Validator Registry.
//!
//! Validators are keyed by signer address with a stable ID → signer pointer
//! next to them. Records are never deleted: rotating a signer leaves the old
//! record behind with zero power.

use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use crate::keys::{self, CURRENT_VALIDATOR_SET_KEY, VALIDATOR_PREFIX};
use crate::params::LedgerParams;
use crate::slashing::ValidatorRegistry;
use crate::staking::validator::Validator;
use crate::staking::validator_set::ValidatorSet;
use crate::store::{get_record, put_record, records_with_prefix, KvStore};
use crate::types::{Address, PubKey, ValidatorId};
use tracing::{debug, info, warn};

/// Creates liveness records for newly joined validators.
pub trait SigningInfoWriter {
    fn create_signing_info(&self, id: ValidatorId, start_height: u64) -> Result<()>;
}

#[derive(Clone, Copy)]
pub struct StakingKeeper<'a> {
    store: &'a dyn KvStore,
    params: &'a LedgerParams,
}

impl<'a> StakingKeeper<'a> {
    pub fn new(store: &'a dyn KvStore, params: &'a LedgerParams) -> Self {
        StakingKeeper { store, params }
    }

    // ============================================================
    // RECORDS
    // ============================================================

    /// Store under the signer key and refresh the ID → signer pointer.
    pub fn add_validator(&self, validator: &Validator) -> Result<()> {
        put_record(self.store, &keys::validator_key(&validator.signer), validator)?;
        self.store.set(&keys::validator_map_key(validator.id), validator.signer.as_bytes())?;
        debug!(
            "stored validator {} signer={} power={} jailed={}",
            validator.id, validator.signer, validator.voting_power, validator.jailed
        );
        Ok(())
    }

    pub fn validator_by_signer(&self, signer: &Address) -> Result<Validator> {
        get_record(self.store, &keys::validator_key(signer))?
            .ok_or_else(|| LedgerError::not_found("validator", signer))
    }

    pub fn signer_by_id(&self, id: ValidatorId) -> Result<Address> {
        let raw = self
            .store
            .get(&keys::validator_map_key(id))?
            .ok_or_else(|| LedgerError::not_found("validator", id))?;
        let arr: [u8; 20] = raw
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::Codec(format!("signer pointer for {} has {} bytes", id, raw.len())))?;
        Ok(Address(arr))
    }

    pub fn validator_by_id(&self, id: ValidatorId) -> Result<Validator> {
        let signer = self.signer_by_id(id)?;
        self.validator_by_signer(&signer)
    }

    pub fn has_validator_id(&self, id: ValidatorId) -> Result<bool> {
        self.store.has(&keys::validator_map_key(id))
    }

    pub fn has_signer(&self, signer: &Address) -> Result<bool> {
        self.store.has(&keys::validator_key(signer))
    }

    /// Every record ever stored, tombstones included, in signer order.
    pub fn all_validators(&self) -> Result<Vec<Validator>> {
        records_with_prefix(self.store, &[VALIDATOR_PREFIX])
    }

    pub fn current_validators(&self, ack_count: u64) -> Result<Vec<Validator>> {
        Ok(self
            .all_validators()?
            .into_iter()
            .filter(|v| v.is_current_validator(ack_count))
            .collect())
    }

    pub fn span_eligible_validators(&self, ack_count: u64) -> Result<Vec<Validator>> {
        Ok(self
            .all_validators()?
            .into_iter()
            .filter(|v| v.is_span_eligible(ack_count))
            .collect())
    }

    /// Move a validator to a new signer key.
    ///
    /// The record under `prev_signer` keeps its data with power 0; the new
    /// record carries the original power and the new key.
    pub fn update_signer(&self, new_signer: Address, new_pub_key: PubKey, prev_signer: &Address) -> Result<Validator> {
        let mut validator = self.validator_by_signer(prev_signer)?;
        let power = validator.voting_power;

        validator.voting_power = 0;
        self.add_validator(&validator)?;

        validator.signer = new_signer;
        validator.pub_key = new_pub_key;
        validator.voting_power = power;
        self.add_validator(&validator)?;

        info!("validator {} signer rotated {} -> {}", validator.id, prev_signer, new_signer);
        Ok(validator)
    }

    // ============================================================
    // VALIDATOR SET
    // ============================================================

    /// Stored snapshot, empty when none was written yet.
    pub fn validator_set(&self) -> Result<ValidatorSet> {
        Ok(get_record(self.store, CURRENT_VALIDATOR_SET_KEY)?.unwrap_or_default())
    }

    pub fn update_validator_set(&self, set: &ValidatorSet) -> Result<()> {
        put_record(self.store, CURRENT_VALIDATOR_SET_KEY, set)
    }

    /// Recompute membership from the registry, keeping rotation state.
    ///
    /// Candidates are validators current at `ack_count`. Power, signer and
    /// jail status come from the registry records.
    pub fn rebuild_validator_set(&self, ack_count: u64) -> Result<ValidatorSet> {
        let current = self.validator_set()?;
        let candidates = self.current_validators(ack_count)?;
        let next = current.rebuild(candidates, self.params.validator_set_max_size);
        if next != current {
            info!(
                "validator set updated: {} -> {} members, total power {}",
                current.len(),
                next.len(),
                next.total_voting_power()
            );
            self.update_validator_set(&next)?;
        }
        Ok(next)
    }

    /// Advance proposer rotation and persist it.
    pub fn increment_accum(&self, times: u64) -> Result<()> {
        let mut set = self.validator_set()?;
        set.increment_proposer_priority(times);
        self.update_validator_set(&set)
    }

    pub fn current_proposer(&self) -> Result<Option<Validator>> {
        Ok(self.validator_set()?.proposer().cloned())
    }

    /// Proposer after one more round, without persisting anything.
    pub fn next_proposer(&self) -> Result<Option<Validator>> {
        let copied = self.validator_set()?.copy_increment_proposer_priority(1);
        Ok(copied.proposer().cloned())
    }

    pub fn total_power(&self) -> Result<i64> {
        Ok(self.validator_set()?.total_voting_power())
    }

    pub fn power_reduction(&self) -> &Amount {
        &self.params.power_reduction
    }
}

impl ValidatorRegistry for StakingKeeper<'_> {
    fn validator_by_id(&self, id: ValidatorId) -> Result<Validator> {
        StakingKeeper::validator_by_id(self, id)
    }

    fn total_power(&self) -> Result<i64> {
        StakingKeeper::total_power(self)
    }

    fn apply_slash(&self, id: ValidatorId, amount: &Amount, jail: bool) -> Result<bool> {
        let mut validator = match StakingKeeper::validator_by_id(self, id) {
            Ok(v) => v,
            Err(e) if e.is_not_found() => {
                warn!("slash for unknown validator {} skipped", id);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let slash_power = amount.to_power(&self.params.power_reduction);
        validator.voting_power = validator.voting_power.saturating_sub(slash_power).max(0);
        if jail {
            validator.jailed = true;
        }
        self.add_validator(&validator)?;
        info!(
            "validator {} slashed by {} power (now {}), jailed={}",
            id, slash_power, validator.voting_power, validator.jailed
        );
        Ok(true)
    }

    fn set_jailed(&self, id: ValidatorId, jailed: bool) -> Result<bool> {
        let mut validator = StakingKeeper::validator_by_id(self, id)?;
        if validator.jailed == jailed {
            return Ok(false);
        }
        validator.jailed = jailed;
        self.add_validator(&validator)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn pubkey(seed: u8) -> PubKey {
        let mut raw = vec![0x04u8];
        raw.extend([seed; 64]);
        PubKey(raw)
    }

    fn validator(id: u64, power: i64) -> Validator {
        let pk = pubkey(id as u8);
        let signer = pk.address();
        Validator::new(ValidatorId(id), 0, 0, power, pk, signer)
    }

    #[test]
    fn test_lookup_by_id_and_signer() {
        let store = MemStore::new();
        let params = LedgerParams::default();
        let sk = StakingKeeper::new(&store, &params);
        let v = validator(1, 10);
        sk.add_validator(&v).unwrap();
        assert_eq!(sk.validator_by_id(ValidatorId(1)).unwrap(), v);
        assert_eq!(sk.validator_by_signer(&v.signer).unwrap(), v);
        assert!(sk.validator_by_id(ValidatorId(2)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_signer_tombstones_old_record() {
        let store = MemStore::new();
        let params = LedgerParams::default();
        let sk = StakingKeeper::new(&store, &params);
        let v = validator(1, 100);
        sk.add_validator(&v).unwrap();

        let new_pk = pubkey(99);
        let new_signer = new_pk.address();
        sk.update_signer(new_signer, new_pk.clone(), &v.signer).unwrap();

        let old = sk.validator_by_signer(&v.signer).unwrap();
        assert_eq!(old.voting_power, 0);
        let current = sk.validator_by_id(ValidatorId(1)).unwrap();
        assert_eq!(current.signer, new_signer);
        assert_eq!(current.pub_key, new_pk);
        assert_eq!(current.voting_power, 100);
        assert_eq!(sk.all_validators().unwrap().len(), 2);
    }

    #[test]
    fn test_apply_slash_saturates_and_only_sets_jail() {
        let store = MemStore::new();
        let params = LedgerParams { power_reduction: Amount::from(1u64), ..LedgerParams::default() };
        let sk = StakingKeeper::new(&store, &params);
        let mut v = validator(1, 10);
        v.jailed = true;
        sk.add_validator(&v).unwrap();

        assert!(sk.apply_slash(ValidatorId(1), &Amount::from(25u64), false).unwrap());
        let after = sk.validator_by_id(ValidatorId(1)).unwrap();
        assert_eq!(after.voting_power, 0);
        assert!(after.jailed);
        assert!(!sk.apply_slash(ValidatorId(9), &Amount::from(1u64), true).unwrap());
    }

    #[test]
    fn test_next_proposer_does_not_persist() {
        let store = MemStore::new();
        let params = LedgerParams::default();
        let sk = StakingKeeper::new(&store, &params);
        sk.add_validator(&validator(1, 10)).unwrap();
        sk.add_validator(&validator(2, 30)).unwrap();
        sk.rebuild_validator_set(0).unwrap();

        let before = store.get(CURRENT_VALIDATOR_SET_KEY).unwrap();
        let next = sk.next_proposer().unwrap().unwrap();
        assert_eq!(store.get(CURRENT_VALIDATOR_SET_KEY).unwrap(), before);

        sk.increment_accum(1).unwrap();
        assert_eq!(sk.current_proposer().unwrap().unwrap().id, next.id);
    }
}
