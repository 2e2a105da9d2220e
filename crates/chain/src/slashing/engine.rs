//! Buffered slashing engine.
//!
//! Punishments are first accumulated in the **buffer** namespace. A tick
//! moves the whole buffer into the **tick** namespace and resets the running
//! total; the root chain acknowledges the tick and only then is each entry
//! applied to the validator record.

use crate::amount::{Amount, Dec};
use crate::error::{LedgerError, Result};
use crate::keys::{self, BUFFER_SLASHING_INFO_PREFIX, TICK_COUNT_KEY, TICK_SLASHING_INFO_PREFIX, TOTAL_SLASHED_AMOUNT_KEY};
use crate::params::LedgerParams;
use crate::slashing::state::{SlashStatus, ValidatorSlashingInfo, AMOUNT_WORD_BITS};
use crate::slashing::ValidatorRegistry;
use crate::staking::DividendKeeper;
use crate::store::{get_record, put_record, records_with_prefix, KvStore};
use crate::types::{Hash, ValidatorId};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Result of one `slash_interim` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterimSlash {
    /// Amount added to the buffer by this call
    pub amount: Amount,
    /// Buffer entry after the call
    pub info: ValidatorSlashingInfo,
    /// True when this call flipped the buffer entry to jailed
    pub newly_jailed: bool,
    /// Running total after the call
    pub total_slashed: Amount,
    /// Set when the total is above the network-wide limit
    pub limit_exceeded: bool,
}

/// Entry applied by `commit_tick`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedSlash {
    pub info: ValidatorSlashingInfo,
    /// Power after the slash, `None` when the validator was unknown
    pub power: Option<i64>,
    pub jailed: bool,
}

pub struct SlashingKeeper<'a> {
    store: &'a dyn KvStore,
    params: &'a LedgerParams,
}

impl<'a> SlashingKeeper<'a> {
    pub fn new(store: &'a dyn KvStore, params: &'a LedgerParams) -> Self {
        SlashingKeeper { store, params }
    }

    // ════════════════════════════════════════════════════════════════════════
    // BUFFER
    // ════════════════════════════════════════════════════════════════════════

    pub fn buffer_info(&self, id: ValidatorId) -> Result<Option<ValidatorSlashingInfo>> {
        get_record(self.store, &keys::buffer_slashing_info_key(id))
    }

    pub fn set_buffer_info(&self, info: &ValidatorSlashingInfo) -> Result<()> {
        put_record(self.store, &keys::buffer_slashing_info_key(info.id), info)
    }

    /// All buffer entries, ascending by ID.
    pub fn buffer_infos(&self) -> Result<Vec<ValidatorSlashingInfo>> {
        records_with_prefix(self.store, &[BUFFER_SLASHING_INFO_PREFIX])
    }

    pub fn total_slashed_amount(&self) -> Result<Amount> {
        match self.store.get(TOTAL_SLASHED_AMOUNT_KEY)? {
            Some(raw) => {
                let s = std::str::from_utf8(&raw)
                    .map_err(|e| LedgerError::Codec(format!("total slashed amount: {}", e)))?;
                Amount::from_str(s).map_err(|e| LedgerError::Codec(format!("total slashed amount: {}", e)))
            }
            None => Ok(Amount::zero()),
        }
    }

    fn set_total_slashed_amount(&self, amount: &Amount) -> Result<()> {
        self.store.set(TOTAL_SLASHED_AMOUNT_KEY, amount.to_string().as_bytes())
    }

    /// `trunc(powerAmount × JailFractionLimit) < buffered`
    pub fn is_jail_limit_exceeded(&self, registry: &dyn ValidatorRegistry, info: &ValidatorSlashingInfo) -> Result<bool> {
        let validator = registry.validator_by_id(info.id)?;
        let power_amount = validator.power_amount(&self.params.power_reduction);
        let limit = self.params.jail_fraction_limit.mul_trunc(&power_amount);
        debug!("jail limit for {}: {} (buffered {})", info.id, limit, info.slashed_amount);
        Ok(limit < info.slashed_amount)
    }

    /// `trunc(totalPowerAmount × SlashFractionLimit) < TotalSlashedAmount`
    pub fn is_slash_limit_exceeded(&self, registry: &dyn ValidatorRegistry) -> Result<bool> {
        let total = self.total_slashed_amount()?;
        let total_power = Amount::from_power(registry.total_power()?, &self.params.power_reduction);
        let limit = self.params.slash_fraction_limit.mul_trunc(&total_power);
        debug!("slash limit {} (slashed {})", limit, total);
        Ok(limit < total)
    }

    /// Buffer a slash of `fraction` of the validator's current stake.
    ///
    /// Accumulates into the validator's buffer entry, sets its jailed flag
    /// once the jail limit is crossed (never clears it) and adds to the
    /// running total. `limit_exceeded` is reported on every call that leaves
    /// the total above the network-wide limit.
    pub fn slash_interim(&self, registry: &dyn ValidatorRegistry, id: ValidatorId, fraction: &Dec) -> Result<InterimSlash> {
        let validator = registry.validator_by_id(id)?;
        let power_amount = validator.power_amount(&self.params.power_reduction);
        let amount = fraction.mul_trunc(&power_amount);

        let mut info = match self.buffer_info(id)? {
            Some(mut existing) => {
                existing.slashed_amount += &amount;
                existing
            }
            None => ValidatorSlashingInfo::new(id, amount.clone(), false),
        };

        if !info.amount_fits_word() {
            return Err(LedgerError::invalid(format!(
                "buffered slash for validator {} exceeds {} bits",
                id, AMOUNT_WORD_BITS
            )));
        }

        let mut newly_jailed = false;
        if !info.is_jailed && self.is_jail_limit_exceeded(registry, &info)? {
            info.is_jailed = true;
            newly_jailed = true;
        }
        self.set_buffer_info(&info)?;

        let total_slashed = &self.total_slashed_amount()? + &amount;
        self.set_total_slashed_amount(&total_slashed)?;
        debug!("buffered slash {} for validator {}, total {}", amount, id, total_slashed);

        let limit_exceeded = self.is_slash_limit_exceeded(registry)?;
        if limit_exceeded {
            info!("total slashed amount {} exceeded slash limit", total_slashed);
        }

        Ok(InterimSlash {
            amount,
            info,
            newly_jailed,
            total_slashed,
            limit_exceeded,
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // TICK
    // ════════════════════════════════════════════════════════════════════════

    pub fn tick_info(&self, id: ValidatorId) -> Result<Option<ValidatorSlashingInfo>> {
        get_record(self.store, &keys::tick_slashing_info_key(id))
    }

    pub fn tick_infos(&self) -> Result<Vec<ValidatorSlashingInfo>> {
        records_with_prefix(self.store, &[TICK_SLASHING_INFO_PREFIX])
    }

    pub fn tick_count(&self) -> Result<u64> {
        match self.store.get(TICK_COUNT_KEY)? {
            Some(raw) => {
                let arr: [u8; 8] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Codec(format!("tick count has {} bytes", raw.len())))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    pub fn increment_tick_count(&self) -> Result<u64> {
        let next = self.tick_count()?.saturating_add(1);
        self.store.set(TICK_COUNT_KEY, &next.to_be_bytes())?;
        Ok(next)
    }

    /// Move every buffer entry into the tick namespace unchanged, then clear
    /// the buffer and reset the running total.
    pub fn begin_tick(&self) -> Result<Vec<ValidatorSlashingInfo>> {
        let infos = self.buffer_infos()?;
        for info in &infos {
            put_record(self.store, &keys::tick_slashing_info_key(info.id), info)?;
            self.store.delete(&keys::buffer_slashing_info_key(info.id))?;
        }
        self.store.delete(TOTAL_SLASHED_AMOUNT_KEY)?;
        info!("tick started with {} slashing entries", infos.len());
        Ok(infos)
    }

    /// Apply every tick entry to its validator and empty the tick namespace.
    ///
    /// Unknown validators are skipped but their entry is still removed. The
    /// slashed amount is also recorded in the validator's dividend account.
    pub fn commit_tick(&self, registry: &dyn ValidatorRegistry) -> Result<Vec<AppliedSlash>> {
        let dividends = DividendKeeper::new(self.store);
        let mut applied = Vec::new();
        for info in self.tick_infos()? {
            let known = registry.apply_slash(info.id, &info.slashed_amount, info.is_jailed)?;
            let (power, jailed) = if known {
                dividends.record_slash(info.id, &info.slashed_amount)?;
                let v = registry.validator_by_id(info.id)?;
                (Some(v.voting_power), v.jailed)
            } else {
                warn!("tick entry for unknown validator {} dropped", info.id);
                (None, info.is_jailed)
            };
            self.store.delete(&keys::tick_slashing_info_key(info.id))?;
            applied.push(AppliedSlash { info, power, jailed });
        }
        info!("tick committed, {} entries applied", applied.len());
        Ok(applied)
    }

    /// Keccak-256 over the ID-sorted canonical encoding of `infos`.
    pub fn slashing_info_hash(infos: &[ValidatorSlashingInfo]) -> Hash {
        let mut sorted: Vec<&ValidatorSlashingInfo> = infos.iter().collect();
        sorted.sort_by_key(|i| i.id);
        let mut buf = Vec::with_capacity(sorted.len() * 41);
        for info in sorted {
            buf.extend_from_slice(&info.encode());
        }
        Hash::keccak(&buf)
    }

    // ════════════════════════════════════════════════════════════════════════
    // JAIL
    // ════════════════════════════════════════════════════════════════════════

    pub fn jail(&self, registry: &dyn ValidatorRegistry, id: ValidatorId) -> Result<bool> {
        let changed = registry.set_jailed(id, true)?;
        if changed {
            info!("validator {} jailed", id);
        }
        Ok(changed)
    }

    /// Returns false, without error, if the validator was not jailed.
    pub fn unjail(&self, registry: &dyn ValidatorRegistry, id: ValidatorId) -> Result<bool> {
        let changed = registry.set_jailed(id, false)?;
        if changed {
            info!("validator {} unjailed", id);
        } else {
            info!("validator {} already unjailed", id);
        }
        Ok(changed)
    }

    pub fn status(&self, id: ValidatorId) -> Result<SlashStatus> {
        let buffer = self.buffer_info(id)?;
        let tick = self.tick_info(id)?;
        Ok(SlashStatus::from_entries(buffer.as_ref(), tick.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::{StakingKeeper, Validator, ValidatorSet};
    use crate::store::MemStore;
    use crate::types::PubKey;

    fn unit_params() -> LedgerParams {
        LedgerParams {
            power_reduction: Amount::from(1u64),
            jail_fraction_limit: Dec::from_str("0.10").unwrap(),
            slash_fraction_limit: Dec::from_str("0.01").unwrap(),
            ..LedgerParams::default()
        }
    }

    fn setup_validator(sk: &StakingKeeper, id: u64, power: i64) {
        let mut raw = vec![0x04u8];
        raw.extend([id as u8; 64]);
        let pk = PubKey(raw);
        let v = Validator::new(ValidatorId(id), 0, 0, power, pk.clone(), pk.address());
        sk.add_validator(&v).unwrap();
        let mut all = sk.validator_set().unwrap().validators;
        all.push(v);
        sk.update_validator_set(&ValidatorSet::new(all, 100)).unwrap();
    }

    fn dec(s: &str) -> Dec { Dec::from_str(s).unwrap() }

    #[test]
    fn test_buffer_accumulates_exactly() {
        let store = MemStore::new();
        let p = unit_params();
        let sk = StakingKeeper::new(&store, &p);
        setup_validator(&sk, 1, 100);
        let sl = SlashingKeeper::new(&store, &p);

        sl.slash_interim(&sk, ValidatorId(1), &dec("0.05")).unwrap();
        sl.slash_interim(&sk, ValidatorId(1), &dec("0.08")).unwrap();
        let info = sl.buffer_info(ValidatorId(1)).unwrap().unwrap();
        assert_eq!(info.slashed_amount.to_string(), "13");
        assert_eq!(sl.total_slashed_amount().unwrap().to_string(), "13");
    }

    #[test]
    fn test_buffer_rejects_amount_wider_than_word() {
        let store = MemStore::new();
        let p = LedgerParams {
            power_reduction: Amount::from_str(&format!("1{}", "0".repeat(76))).unwrap(),
            ..unit_params()
        };
        let sk = StakingKeeper::new(&store, &p);
        setup_validator(&sk, 1, 100);
        let sl = SlashingKeeper::new(&store, &p);

        let err = sl.slash_interim(&sk, ValidatorId(1), &dec("0.5")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert!(sl.buffer_info(ValidatorId(1)).unwrap().is_none());
        assert!(sl.total_slashed_amount().unwrap().is_zero());
    }

    #[test]
    fn test_jail_threshold_is_strict() {
        let store = MemStore::new();
        let p = unit_params();
        let sk = StakingKeeper::new(&store, &p);
        setup_validator(&sk, 1, 100);
        let sl = SlashingKeeper::new(&store, &p);

        // exactly at the limit (10 of 100): not jailed
        let r = sl.slash_interim(&sk, ValidatorId(1), &dec("0.10")).unwrap();
        assert!(!r.info.is_jailed);
        let r = sl.slash_interim(&sk, ValidatorId(1), &dec("0.01")).unwrap();
        assert!(r.info.is_jailed);
        assert!(r.newly_jailed);
        // flag sticks
        let r = sl.slash_interim(&sk, ValidatorId(1), &dec("0")).unwrap();
        assert!(r.info.is_jailed);
        assert!(!r.newly_jailed);
    }

    #[test]
    fn test_slash_limit_reported_on_every_qualifying_call() {
        let store = MemStore::new();
        let p = unit_params();
        let sk = StakingKeeper::new(&store, &p);
        setup_validator(&sk, 1, 1000);
        let sl = SlashingKeeper::new(&store, &p);

        // limit = trunc(1000 × 0.01) = 10
        assert!(!sl.slash_interim(&sk, ValidatorId(1), &dec("0.01")).unwrap().limit_exceeded);
        assert!(sl.slash_interim(&sk, ValidatorId(1), &dec("0.001")).unwrap().limit_exceeded);
        assert!(sl.slash_interim(&sk, ValidatorId(1), &dec("0.001")).unwrap().limit_exceeded);
    }

    #[test]
    fn test_begin_and_commit_tick() {
        let store = MemStore::new();
        let p = unit_params();
        let sk = StakingKeeper::new(&store, &p);
        setup_validator(&sk, 1, 100);
        setup_validator(&sk, 2, 100);
        let sl = SlashingKeeper::new(&store, &p);

        sl.slash_interim(&sk, ValidatorId(1), &dec("0.2")).unwrap();
        sl.slash_interim(&sk, ValidatorId(2), &dec("0.05")).unwrap();
        let moved = sl.begin_tick().unwrap();
        assert_eq!(moved.len(), 2);
        assert!(sl.buffer_infos().unwrap().is_empty());
        assert!(sl.total_slashed_amount().unwrap().is_zero());
        assert_eq!(sl.tick_infos().unwrap(), moved);
        assert!(matches!(sl.status(ValidatorId(1)).unwrap(), SlashStatus::TickPending { jailed: true, .. }));

        let applied = sl.commit_tick(&sk).unwrap();
        assert_eq!(applied.len(), 2);
        assert!(sl.tick_infos().unwrap().is_empty());
        let v1 = sk.validator_by_id(ValidatorId(1)).unwrap();
        assert_eq!(v1.voting_power, 80);
        assert!(v1.jailed);
        let v2 = sk.validator_by_id(ValidatorId(2)).unwrap();
        assert_eq!(v2.voting_power, 95);
        assert!(!v2.jailed);
        assert!(sl.status(ValidatorId(1)).unwrap().is_clean());

        let acc = DividendKeeper::new(&store).account(ValidatorId(1)).unwrap();
        assert_eq!(acc.slashed_amount.to_string(), "20");
    }

    #[test]
    fn test_commit_tick_skips_unknown_validator() {
        let store = MemStore::new();
        let p = unit_params();
        let sk = StakingKeeper::new(&store, &p);
        let sl = SlashingKeeper::new(&store, &p);
        put_record(&store, &keys::tick_slashing_info_key(ValidatorId(42)),
            &ValidatorSlashingInfo::new(ValidatorId(42), Amount::from(5u64), false)).unwrap();

        let applied = sl.commit_tick(&sk).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].power, None);
        assert!(sl.tick_infos().unwrap().is_empty());
    }

    #[test]
    fn test_slashing_info_hash_is_order_independent() {
        let a = ValidatorSlashingInfo::new(ValidatorId(1), Amount::from(5u64), false);
        let b = ValidatorSlashingInfo::new(ValidatorId(2), Amount::from(7u64), true);
        let h1 = SlashingKeeper::slashing_info_hash(&[a.clone(), b.clone()]);
        let h2 = SlashingKeeper::slashing_info_hash(&[b, a.clone()]);
        assert_eq!(h1, h2);
        assert_ne!(h1, SlashingKeeper::slashing_info_hash(&[a]));
    }

    #[test]
    fn test_unjail_of_unjailed_is_noop() {
        let store = MemStore::new();
        let p = unit_params();
        let sk = StakingKeeper::new(&store, &p);
        setup_validator(&sk, 1, 100);
        let sl = SlashingKeeper::new(&store, &p);
        assert!(!sl.unjail(&sk, ValidatorId(1)).unwrap());
        assert!(sl.jail(&sk, ValidatorId(1)).unwrap());
        assert!(sl.unjail(&sk, ValidatorId(1)).unwrap());
    }
}
