//! Dividend Ledger: per-validator fee and slash accounting.
//!
//! Accounts are created on first credit and never removed. Their ordered list
//! is the leaf set of an external Merkle tree (see [`AccountRootHasher`]).

use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use crate::keys::{self, DIVIDEND_ACCOUNT_PREFIX};
use crate::store::{get_record, put_record, records_with_prefix, KvStore};
use crate::types::{Hash, ValidatorId};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendAccount {
    pub id: ValidatorId,
    pub fee_amount: Amount,
    pub slashed_amount: Amount,
}

impl DividendAccount {
    pub fn new(id: ValidatorId) -> Self {
        DividendAccount {
            id,
            fee_amount: Amount::zero(),
            slashed_amount: Amount::zero(),
        }
    }

    /// Leaf hash: Keccak-256 over three 32-byte big-endian words.
    pub fn leaf_hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(&word(&Amount::from(self.id.0)));
        buf.extend_from_slice(&word(&self.fee_amount));
        buf.extend_from_slice(&word(&self.slashed_amount));
        Hash::keccak(&buf)
    }
}

fn word(a: &Amount) -> Vec<u8> {
    let bytes = a.as_biguint().to_bytes_be();
    if bytes.len() >= 32 {
        return bytes;
    }
    let mut out = vec![0u8; 32 - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}

/// Builds the dividend root from the ordered account list.
pub trait AccountRootHasher: Send + Sync {
    fn root(&self, accounts: &[DividendAccount]) -> Hash;
}

/// Binary Keccak-256 Merkle tree, odd node carried up unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeccakMerkleHasher;

impl AccountRootHasher for KeccakMerkleHasher {
    fn root(&self, accounts: &[DividendAccount]) -> Hash {
        if accounts.is_empty() {
            return Hash::default();
        }
        let mut level: Vec<Hash> = accounts.iter().map(|a| a.leaf_hash()).collect();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [l, r] => {
                        let mut h = Keccak256::new();
                        h.update(l.as_bytes());
                        h.update(r.as_bytes());
                        Hash(h.finalize().into())
                    }
                    [single] => *single,
                    _ => Hash::default(),
                })
                .collect();
        }
        level[0]
    }
}

pub struct DividendKeeper<'a> {
    store: &'a dyn KvStore,
}

impl<'a> DividendKeeper<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        DividendKeeper { store }
    }

    pub fn account(&self, id: ValidatorId) -> Result<DividendAccount> {
        get_record(self.store, &keys::dividend_account_key(id))?
            .ok_or_else(|| LedgerError::not_found("dividend account", id))
    }

    pub fn has_account(&self, id: ValidatorId) -> Result<bool> {
        self.store.has(&keys::dividend_account_key(id))
    }

    fn get_or_create(&self, id: ValidatorId) -> Result<DividendAccount> {
        Ok(get_record(self.store, &keys::dividend_account_key(id))?
            .unwrap_or_else(|| DividendAccount::new(id)))
    }

    pub fn set_account(&self, account: &DividendAccount) -> Result<()> {
        put_record(self.store, &keys::dividend_account_key(account.id), account)
    }

    /// Add `fee` to the account's fee balance, creating the account if needed.
    pub fn credit_fee(&self, id: ValidatorId, fee: &Amount) -> Result<DividendAccount> {
        let mut account = self.get_or_create(id)?;
        account.fee_amount += fee;
        self.set_account(&account)?;
        debug!("credited fee {} to dividend account {} (total {})", fee, id, account.fee_amount);
        Ok(account)
    }

    pub fn record_slash(&self, id: ValidatorId, amount: &Amount) -> Result<DividendAccount> {
        let mut account = self.get_or_create(id)?;
        account.slashed_amount += amount;
        self.set_account(&account)?;
        Ok(account)
    }

    /// Every account, ascending by ID.
    pub fn all_accounts(&self) -> Result<Vec<DividendAccount>> {
        records_with_prefix(self.store, &[DIVIDEND_ACCOUNT_PREFIX])
    }

    pub fn root(&self, hasher: &dyn AccountRootHasher) -> Result<Hash> {
        Ok(hasher.root(&self.all_accounts()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use std::str::FromStr;

    #[test]
    fn test_credit_creates_then_accumulates() {
        let store = MemStore::new();
        let dk = DividendKeeper::new(&store);
        assert!(dk.account(ValidatorId(1)).unwrap_err().is_not_found());
        dk.credit_fee(ValidatorId(1), &Amount::from(5u64)).unwrap();
        let acc = dk.credit_fee(ValidatorId(1), &Amount::from(8u64)).unwrap();
        assert_eq!(acc.fee_amount, Amount::from_str("13").unwrap());
        assert!(acc.slashed_amount.is_zero());
    }

    #[test]
    fn test_all_accounts_sorted_by_id() {
        let store = MemStore::new();
        let dk = DividendKeeper::new(&store);
        dk.credit_fee(ValidatorId(300), &Amount::from(1u64)).unwrap();
        dk.credit_fee(ValidatorId(2), &Amount::from(1u64)).unwrap();
        let ids: Vec<u64> = dk.all_accounts().unwrap().iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![2, 300]);
    }

    #[test]
    fn test_root_changes_with_balances() {
        let store = MemStore::new();
        let dk = DividendKeeper::new(&store);
        let hasher = KeccakMerkleHasher;
        assert_eq!(dk.root(&hasher).unwrap(), Hash::default());
        dk.credit_fee(ValidatorId(1), &Amount::from(1u64)).unwrap();
        let r1 = dk.root(&hasher).unwrap();
        dk.credit_fee(ValidatorId(2), &Amount::from(1u64)).unwrap();
        dk.credit_fee(ValidatorId(3), &Amount::from(1u64)).unwrap();
        let r2 = dk.root(&hasher).unwrap();
        assert_ne!(r1, r2);
        assert_eq!(r2, dk.root(&hasher).unwrap());
    }
}
