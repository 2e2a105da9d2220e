//! Checkpoint ack counter, the ledger's epoch clock.

use crate::error::{LedgerError, Result};
use crate::keys::ACK_COUNT_KEY;
use crate::store::KvStore;
use tracing::info;

pub struct CheckpointKeeper<'a> {
    store: &'a dyn KvStore,
}

impl<'a> CheckpointKeeper<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        CheckpointKeeper { store }
    }

    /// Confirmed checkpoints so far (0 before the first ack).
    pub fn ack_count(&self) -> Result<u64> {
        match self.store.get(ACK_COUNT_KEY)? {
            Some(raw) => {
                let arr: [u8; 8] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Codec(format!("ack count has {} bytes", raw.len())))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    pub fn increment_ack_count(&self) -> Result<u64> {
        let next = self.ack_count()?.saturating_add(1);
        self.store.set(ACK_COUNT_KEY, &next.to_be_bytes())?;
        info!("checkpoint ack count now {}", next);
        Ok(next)
    }
}
