use crate::amount::Amount;
use crate::types::{Address, PubKey, ValidatorId};
use serde::{Deserialize, Serialize};

/// Validator record persisted under its signer address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: ValidatorId,
    pub start_epoch: u64,
    /// 0 while the validator has not started unbonding
    pub end_epoch: u64,
    pub voting_power: i64,
    pub pub_key: PubKey,
    pub signer: Address,
    /// Sequence of the root-chain event that last touched this record
    pub last_updated: String,
    pub jailed: bool,
    pub proposer_priority: i64,
}

impl Validator {
    pub fn new(
        id: ValidatorId,
        start_epoch: u64,
        end_epoch: u64,
        voting_power: i64,
        pub_key: PubKey,
        signer: Address,
    ) -> Self {
        Validator {
            id,
            start_epoch,
            end_epoch,
            voting_power,
            pub_key,
            signer,
            last_updated: String::new(),
            jailed: false,
            proposer_priority: 0,
        }
    }

    /// Active at the given ack count.
    pub fn is_current_validator(&self, ack_count: u64) -> bool {
        self.start_epoch <= ack_count && (self.end_epoch == 0 || ack_count < self.end_epoch)
    }

    /// Active and not unbonding: may be picked for the next span.
    pub fn is_span_eligible(&self, ack_count: u64) -> bool {
        self.end_epoch == 0 && self.is_current_validator(ack_count)
    }

    /// Stake backing the current voting power.
    pub fn power_amount(&self, power_reduction: &Amount) -> Amount {
        Amount::from_power(self.voting_power, power_reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(start: u64, end: u64) -> Validator {
        let mut raw = vec![0x04u8];
        raw.extend([1u8; 64]);
        let pk = PubKey(raw);
        let signer = pk.address();
        Validator::new(ValidatorId(1), start, end, 10, pk, signer)
    }

    #[test]
    fn test_current_window() {
        let v = val(2, 5);
        assert!(!v.is_current_validator(1));
        assert!(v.is_current_validator(2));
        assert!(v.is_current_validator(4));
        assert!(!v.is_current_validator(5));
        assert!(!v.is_span_eligible(3));
    }

    #[test]
    fn test_open_ended_validator() {
        let v = val(0, 0);
        assert!(v.is_current_validator(1_000_000));
        assert!(v.is_span_eligible(0));
    }
}
