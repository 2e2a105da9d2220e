//! Sequence/dedup index.
//!
//! A sequence marker records that a root-chain event was applied. Markers are
//! never removed, so redelivery of the same event is detected forever.

use crate::error::Result;
use crate::keys::{
    self, CHECKPOINT_SEQUENCE_PREFIX, SEQUENCE_MARKER, SLASHING_SEQUENCE_PREFIX,
    STAKING_SEQUENCE_PREFIX, TOPUP_SEQUENCE_PREFIX,
};
use crate::store::KvStore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace a marker lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceKind {
    Staking,
    Slashing,
    Topup,
    Checkpoint,
}

impl SequenceKind {
    fn prefix(self) -> u8 {
        match self {
            SequenceKind::Staking => STAKING_SEQUENCE_PREFIX,
            SequenceKind::Slashing => SLASHING_SEQUENCE_PREFIX,
            SequenceKind::Topup => TOPUP_SEQUENCE_PREFIX,
            SequenceKind::Checkpoint => CHECKPOINT_SEQUENCE_PREFIX,
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SequenceKind::Staking => "staking",
            SequenceKind::Slashing => "slashing",
            SequenceKind::Topup => "topup",
            SequenceKind::Checkpoint => "checkpoint",
        };
        f.write_str(s)
    }
}

pub struct SequenceIndex<'a> {
    store: &'a dyn KvStore,
    kind: SequenceKind,
}

impl<'a> SequenceIndex<'a> {
    pub fn new(store: &'a dyn KvStore, kind: SequenceKind) -> Self {
        SequenceIndex { store, kind }
    }

    pub fn mark_seen(&self, sequence: &str) -> Result<()> {
        self.store.set(&keys::sequence_key(self.kind.prefix(), sequence), SEQUENCE_MARKER)
    }

    pub fn has_seen(&self, sequence: &str) -> Result<bool> {
        self.store.has(&keys::sequence_key(self.kind.prefix(), sequence))
    }

    /// Every marker in this namespace, in key order.
    pub fn all(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .iter_prefix(&[self.kind.prefix()])?
            .into_iter()
            .map(|(k, _)| String::from_utf8_lossy(&k[1..]).into_owned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    #[test]
    fn test_namespaces_are_independent() {
        let store = MemStore::new();
        let staking = SequenceIndex::new(&store, SequenceKind::Staking);
        let topup = SequenceIndex::new(&store, SequenceKind::Topup);
        staking.mark_seen("0xabc:1").unwrap();
        assert!(staking.has_seen("0xabc:1").unwrap());
        assert!(!topup.has_seen("0xabc:1").unwrap());
        assert!(!staking.has_seen("0xabc:2").unwrap());
        assert_eq!(staking.all().unwrap(), vec!["0xabc:1".to_string()]);
    }
}
