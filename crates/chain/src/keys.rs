// ════════════════════════════════════════════════════════════════════════════
// STORE KEY LAYOUT
// ════════════════════════════════════════════════════════════════════════════
// Key formats are CONSENSUS-CRITICAL. Do not modify without hard fork.
// Every key starts with a 1-byte prefix; IDs are u64 big-endian.
// ════════════════════════════════════════════════════════════════════════════

use crate::types::{Address, ValidatorId};

/// Validator record
/// Key: 0x21 + signer (20 bytes)
pub const VALIDATOR_PREFIX: u8 = 0x21;
/// Key: 0x22 + validator id (8 bytes BE), value: signer (20 bytes)
pub const VALIDATOR_MAP_PREFIX: u8 = 0x22;
/// Singleton: bincode ValidatorSet
pub const CURRENT_VALIDATOR_SET_KEY: &[u8] = &[0x23];
/// Key: 0x24 + sequence string, value 0x01
pub const STAKING_SEQUENCE_PREFIX: u8 = 0x24;
/// Key: 0x25 + validator id (8 bytes BE)
pub const DIVIDEND_ACCOUNT_PREFIX: u8 = 0x25;

/// Key: 0x31 + validator id
pub const SIGNING_INFO_PREFIX: u8 = 0x31;
/// Key: 0x32 + validator id + window index (8 bytes BE); present = missed
pub const MISSED_BLOCK_PREFIX: u8 = 0x32;

pub const BUFFER_SLASHING_INFO_PREFIX: u8 = 0x41;
pub const TICK_SLASHING_INFO_PREFIX: u8 = 0x42;
/// Singleton: decimal string
pub const TOTAL_SLASHED_AMOUNT_KEY: &[u8] = &[0x43];
pub const SLASHING_SEQUENCE_PREFIX: u8 = 0x44;
/// Singleton: u64 BE
pub const TICK_COUNT_KEY: &[u8] = &[0x45];

/// Singleton: u64 BE
pub const ACK_COUNT_KEY: &[u8] = &[0x51];
pub const CHECKPOINT_SEQUENCE_PREFIX: u8 = 0x52;

pub const TOPUP_SEQUENCE_PREFIX: u8 = 0x61;

/// Marker value stored under every sequence key.
pub const SEQUENCE_MARKER: &[u8] = &[0x01];

fn with_prefix(prefix: u8, body: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + body.len());
    k.push(prefix);
    k.extend_from_slice(body);
    k
}

pub fn validator_key(signer: &Address) -> Vec<u8> {
    with_prefix(VALIDATOR_PREFIX, signer.as_bytes())
}

pub fn validator_map_key(id: ValidatorId) -> Vec<u8> {
    with_prefix(VALIDATOR_MAP_PREFIX, &id.to_be_bytes())
}

pub fn dividend_account_key(id: ValidatorId) -> Vec<u8> {
    with_prefix(DIVIDEND_ACCOUNT_PREFIX, &id.to_be_bytes())
}

pub fn signing_info_key(id: ValidatorId) -> Vec<u8> {
    with_prefix(SIGNING_INFO_PREFIX, &id.to_be_bytes())
}

pub fn missed_block_prefix(id: ValidatorId) -> Vec<u8> {
    with_prefix(MISSED_BLOCK_PREFIX, &id.to_be_bytes())
}

pub fn missed_block_key(id: ValidatorId, index: u64) -> Vec<u8> {
    let mut k = missed_block_prefix(id);
    k.extend_from_slice(&index.to_be_bytes());
    k
}

pub fn buffer_slashing_info_key(id: ValidatorId) -> Vec<u8> {
    with_prefix(BUFFER_SLASHING_INFO_PREFIX, &id.to_be_bytes())
}

pub fn tick_slashing_info_key(id: ValidatorId) -> Vec<u8> {
    with_prefix(TICK_SLASHING_INFO_PREFIX, &id.to_be_bytes())
}

pub fn sequence_key(prefix: u8, sequence: &str) -> Vec<u8> {
    with_prefix(prefix, sequence.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_sort_numerically() {
        let a = buffer_slashing_info_key(ValidatorId(2));
        let b = buffer_slashing_info_key(ValidatorId(256));
        assert!(a < b);
        assert_eq!(a.len(), 9);
    }

    #[test]
    fn test_missed_block_key_under_prefix() {
        let k = missed_block_key(ValidatorId(5), 7);
        assert!(k.starts_with(&missed_block_prefix(ValidatorId(5))));
        assert_eq!(k.len(), 17);
    }
}
