//! Validator Set Snapshot and proposer rotation.
//!
//! Weighted round-robin with proposer priorities:
//!
//! 1. Before a batch of rounds, priorities are rescaled so that
//!    `max - min <= 2 * total_power`, then shifted so their average is zero.
//! 2. Each round adds every validator's voting power to its priority.
//! 3. The validator with the highest priority (lowest signer address on a
//!    tie) is that round's proposer and pays `total_power` back.
//!
//! The snapshot remembers the last round's pick. Before any round has run,
//! the proposer is the highest-priority validator.
//!
//! Over `total_power` rounds every validator proposes exactly as often as
//! its power. Arithmetic saturates at the `i64` bounds so no input can panic.

use crate::staking::validator::Validator;
use crate::types::ValidatorId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Bound on `max - min` priority, in multiples of total power.
pub const PRIORITY_WINDOW_SIZE_FACTOR: i64 = 2;

/// Total voting power is clipped here so priority sums stay in range.
pub const MAX_TOTAL_VOTING_POWER: i64 = i64::MAX / 8;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    /// Sorted by signer address
    pub validators: Vec<Validator>,
    /// Picked by the latest rotation round
    pub proposer: Option<ValidatorId>,
}

fn clip_add(a: i64, b: i64) -> i64 {
    a.saturating_add(b)
}

fn clip_sub(a: i64, b: i64) -> i64 {
    a.saturating_sub(b)
}

/// Higher priority wins; ties go to the lower signer address.
fn priority_order(a: &Validator, b: &Validator) -> Ordering {
    a.proposer_priority
        .cmp(&b.proposer_priority)
        .then_with(|| b.signer.cmp(&a.signer))
}

impl ValidatorSet {
    /// Build a set from candidate records.
    ///
    /// Zero-power and jailed validators are dropped. If more than `max_size`
    /// remain, the highest-powered ones are kept (ties by lower ID).
    /// Priorities carried by the records are kept as-is.
    pub fn new(candidates: Vec<Validator>, max_size: usize) -> Self {
        let mut vals: Vec<Validator> = candidates
            .into_iter()
            .filter(|v| v.voting_power > 0 && !v.jailed)
            .collect();
        vals.sort_by(|a, b| b.voting_power.cmp(&a.voting_power).then(a.id.cmp(&b.id)));
        vals.truncate(max_size);
        vals.sort_by(|a, b| a.signer.cmp(&b.signer));
        ValidatorSet { validators: vals, proposer: None }
    }

    pub fn is_empty(&self) -> bool { self.validators.is_empty() }

    pub fn len(&self) -> usize { self.validators.len() }

    pub fn contains(&self, id: ValidatorId) -> bool {
        self.validators.iter().any(|v| v.id == id)
    }

    pub fn get_by_id(&self, id: ValidatorId) -> Option<&Validator> {
        self.validators.iter().find(|v| v.id == id)
    }

    /// Position of a validator in signer order.
    pub fn index_of(&self, id: ValidatorId) -> Option<usize> {
        self.validators.iter().position(|v| v.id == id)
    }

    pub fn total_voting_power(&self) -> i64 {
        let mut sum: i64 = 0;
        for v in &self.validators {
            sum = clip_add(sum, v.voting_power.max(0));
        }
        sum.min(MAX_TOTAL_VOTING_POWER)
    }

    /// Current proposer: the last round's pick, else the highest priority.
    pub fn proposer(&self) -> Option<&Validator> {
        if let Some(v) = self.proposer.and_then(|id| self.get_by_id(id)) {
            return Some(v);
        }
        self.validators.iter().max_by(|a, b| priority_order(a, b))
    }

    /// Replace membership, keeping priorities of validators that stay.
    ///
    /// Newcomers start at `-1.125 * total_power` so a fresh join cannot
    /// jump the queue. The result is re-centred.
    pub fn rebuild(&self, candidates: Vec<Validator>, max_size: usize) -> ValidatorSet {
        let previous: HashMap<ValidatorId, i64> = self
            .validators
            .iter()
            .map(|v| (v.id, v.proposer_priority))
            .collect();

        let mut next = ValidatorSet::new(candidates, max_size);
        next.proposer = self.proposer.filter(|id| next.contains(*id));
        let total = next.total_voting_power();
        let newcomer = -clip_add(total, total / 8);
        for v in next.validators.iter_mut() {
            v.proposer_priority = match previous.get(&v.id) {
                Some(p) => *p,
                None => newcomer,
            };
        }
        if !next.is_empty() {
            next.rescale_priorities(PRIORITY_WINDOW_SIZE_FACTOR.saturating_mul(total));
            next.shift_by_avg_priority();
        }
        next
    }

    /// Advance the rotation `times` rounds in place.
    pub fn increment_proposer_priority(&mut self, times: u64) {
        if self.is_empty() || times == 0 {
            return;
        }
        let total = self.total_voting_power();
        self.rescale_priorities(PRIORITY_WINDOW_SIZE_FACTOR.saturating_mul(total));
        self.shift_by_avg_priority();
        for _ in 0..times {
            self.increment_once(total);
        }
    }

    /// Copy advanced by `times` rounds; `self` is untouched.
    pub fn copy_increment_proposer_priority(&self, times: u64) -> ValidatorSet {
        let mut copy = self.clone();
        copy.increment_proposer_priority(times);
        copy
    }

    fn increment_once(&mut self, total: i64) {
        for v in self.validators.iter_mut() {
            v.proposer_priority = clip_add(v.proposer_priority, v.voting_power);
        }
        let idx = self
            .validators
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| priority_order(a, b))
            .map(|(i, _)| i);
        if let Some(i) = idx {
            let v = &mut self.validators[i];
            v.proposer_priority = clip_sub(v.proposer_priority, total);
            self.proposer = Some(v.id);
        }
    }

    fn rescale_priorities(&mut self, diff_max: i64) {
        if diff_max <= 0 {
            return;
        }
        let max = self.validators.iter().map(|v| v.proposer_priority).max().unwrap_or(0);
        let min = self.validators.iter().map(|v| v.proposer_priority).min().unwrap_or(0);
        let diff = (max as i128) - (min as i128);
        let diff_max = diff_max as i128;
        if diff > diff_max {
            let ratio = (diff + diff_max - 1) / diff_max;
            for v in self.validators.iter_mut() {
                v.proposer_priority = ((v.proposer_priority as i128) / ratio) as i64;
            }
        }
    }

    fn shift_by_avg_priority(&mut self) {
        let n = self.validators.len() as i128;
        if n == 0 {
            return;
        }
        let sum: i128 = self.validators.iter().map(|v| v.proposer_priority as i128).sum();
        let avg = sum.div_euclid(n);
        let avg = avg.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        for v in self.validators.iter_mut() {
            v.proposer_priority = clip_sub(v.proposer_priority, avg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, PubKey};

    fn val(id: u64, power: i64) -> Validator {
        let mut raw = vec![0x04u8];
        raw.extend([id as u8; 64]);
        let pk = PubKey(raw);
        let mut signer = [0u8; 20];
        signer[19] = id as u8;
        Validator::new(ValidatorId(id), 0, 0, power, pk, Address(signer))
    }

    fn proposer_id(set: &ValidatorSet) -> u64 {
        set.proposer().map(|v| v.id.0).unwrap_or(0)
    }

    #[test]
    fn test_new_drops_zero_power_and_caps_size() {
        let mut jailed = val(5, 50);
        jailed.jailed = true;
        let set = ValidatorSet::new(vec![val(1, 10), val(2, 0), val(3, 30), val(4, 20), jailed], 2);
        let ids: Vec<u64> = set.validators.iter().map(|v| v.id.0).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(set.total_voting_power(), 50);
    }

    #[test]
    fn test_rotation_is_proportional_to_power() {
        let mut set = ValidatorSet::new(vec![val(1, 1), val(2, 2), val(3, 3)], 10);
        let mut counts = HashMap::new();
        for _ in 0..600 {
            set.increment_proposer_priority(1);
            *counts.entry(proposer_id(&set)).or_insert(0u32) += 1;
        }
        assert_eq!(counts[&1], 100);
        assert_eq!(counts[&2], 200);
        assert_eq!(counts[&3], 300);
    }

    #[test]
    fn test_equal_power_round_robin() {
        let mut set = ValidatorSet::new(vec![val(1, 10), val(2, 10), val(3, 10)], 10);
        let mut seen = Vec::new();
        for _ in 0..3 {
            set.increment_proposer_priority(1);
            seen.push(proposer_id(&set));
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_copy_increment_leaves_original() {
        let set = ValidatorSet::new(vec![val(1, 10), val(2, 20)], 10);
        let before = set.clone();
        let next = set.copy_increment_proposer_priority(1);
        assert_eq!(set, before);
        assert_ne!(next, before);
    }

    #[test]
    fn test_rotation_deterministic() {
        // candidate order must not matter
        let mut a = ValidatorSet::new(vec![val(1, 7), val(2, 3), val(3, 11)], 10);
        let mut b = ValidatorSet::new(vec![val(3, 11), val(1, 7), val(2, 3)], 10);
        for _ in 0..17 {
            a.increment_proposer_priority(1);
            b.increment_proposer_priority(1);
        }
        assert_eq!(bincode::serialize(&a).unwrap(), bincode::serialize(&b).unwrap());
    }

    #[test]
    fn test_rebuild_keeps_priorities_and_penalises_newcomer() {
        let mut set = ValidatorSet::new(vec![val(1, 10), val(2, 10)], 10);
        set.increment_proposer_priority(1);
        let rebuilt = set.rebuild(vec![val(1, 10), val(2, 10), val(3, 10)], 10);
        let p3 = rebuilt.get_by_id(ValidatorId(3)).unwrap().proposer_priority;
        for v in &rebuilt.validators {
            if v.id.0 != 3 {
                assert!(v.proposer_priority > p3);
            }
        }
    }

    #[test]
    fn test_empty_set_has_no_proposer() {
        let mut set = ValidatorSet::default();
        set.increment_proposer_priority(5);
        assert!(set.proposer().is_none());
    }

    #[test]
    fn test_extreme_power_does_not_panic() {
        let mut set = ValidatorSet::new(vec![val(1, i64::MAX), val(2, i64::MAX / 2)], 10);
        set.increment_proposer_priority(50);
        assert!(set.proposer().is_some());
    }
}
