use crate::amount::Amount;
use crate::types::ValidatorId;
use serde::{Deserialize, Serialize};

/// Width of an amount on the root chain.
pub const AMOUNT_WORD_BITS: u64 = 256;

/// Pending punishment for one validator, in the buffer or tick namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSlashingInfo {
    pub id: ValidatorId,
    pub slashed_amount: Amount,
    pub is_jailed: bool,
}

impl ValidatorSlashingInfo {
    pub fn new(id: ValidatorId, slashed_amount: Amount, is_jailed: bool) -> Self {
        ValidatorSlashingInfo { id, slashed_amount, is_jailed }
    }

    /// Whether the amount fits the root chain's 256-bit word.
    pub fn amount_fits_word(&self) -> bool {
        self.slashed_amount.as_biguint().bits() <= AMOUNT_WORD_BITS
    }

    /// Canonical bytes used for the tick hash:
    /// id (8 bytes BE) ‖ amount (32-byte BE word) ‖ jailed (1 byte).
    /// Always 41 bytes; amounts wider than a word never reach the buffer.
    pub fn encode(&self) -> Vec<u8> {
        let amount = self.slashed_amount.as_biguint().to_bytes_be();
        let mut out = Vec::with_capacity(41);
        out.extend_from_slice(&self.id.to_be_bytes());
        if amount.len() < 32 {
            out.extend(std::iter::repeat(0u8).take(32 - amount.len()));
        }
        out.extend_from_slice(&amount);
        out.push(self.is_jailed as u8);
        out
    }
}

/// Where a validator sits in the slashing lifecycle.
///
/// CLEAN → BUFFERED → BUFFERED_JAILED → TICK_PENDING → (applied) → CLEAN.
/// A validator can pick up new buffered slashes while an older tick entry is
/// still pending; the pending tick takes precedence here and the buffered
/// amount is reported alongside.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashStatus {
    Clean,
    Buffered {
        amount: Amount,
    },
    BufferedJailed {
        amount: Amount,
    },
    TickPending {
        amount: Amount,
        jailed: bool,
        buffered: Option<Amount>,
    },
}

impl SlashStatus {
    pub fn from_entries(buffer: Option<&ValidatorSlashingInfo>, tick: Option<&ValidatorSlashingInfo>) -> Self {
        match (tick, buffer) {
            (Some(t), b) => SlashStatus::TickPending {
                amount: t.slashed_amount.clone(),
                jailed: t.is_jailed,
                buffered: b.map(|b| b.slashed_amount.clone()),
            },
            (None, Some(b)) if b.is_jailed => SlashStatus::BufferedJailed {
                amount: b.slashed_amount.clone(),
            },
            (None, Some(b)) => SlashStatus::Buffered {
                amount: b.slashed_amount.clone(),
            },
            (None, None) => SlashStatus::Clean,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, SlashStatus::Clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_precedence() {
        let b = ValidatorSlashingInfo::new(ValidatorId(1), Amount::from(3u64), false);
        let bj = ValidatorSlashingInfo::new(ValidatorId(1), Amount::from(3u64), true);
        let t = ValidatorSlashingInfo::new(ValidatorId(1), Amount::from(9u64), true);

        assert!(SlashStatus::from_entries(None, None).is_clean());
        assert_eq!(
            SlashStatus::from_entries(Some(&b), None),
            SlashStatus::Buffered { amount: Amount::from(3u64) }
        );
        assert!(matches!(SlashStatus::from_entries(Some(&bj), None), SlashStatus::BufferedJailed { .. }));
        assert_eq!(
            SlashStatus::from_entries(Some(&b), Some(&t)),
            SlashStatus::TickPending {
                amount: Amount::from(9u64),
                jailed: true,
                buffered: Some(Amount::from(3u64)),
            }
        );
    }

    #[test]
    fn test_encode_layout() {
        let info = ValidatorSlashingInfo::new(ValidatorId(2), Amount::from(256u64), true);
        let enc = info.encode();
        assert_eq!(enc.len(), 41);
        assert_eq!(&enc[..8], &2u64.to_be_bytes());
        assert_eq!(enc[38], 1);
        assert_eq!(enc[39], 0);
        assert_eq!(enc[40], 1);
    }
}
