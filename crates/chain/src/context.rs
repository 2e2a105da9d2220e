//! Per-transaction execution context.
//!
//! All keepers inside one context share a [`CacheStore`] overlay. The caller
//! commits the overlay as a single batch when the transaction succeeds and
//! drops it otherwise.

use crate::checkpoint::CheckpointKeeper;
use crate::events::LedgerEvent;
use crate::params::LedgerParams;
use crate::sequence::{SequenceIndex, SequenceKind};
use crate::slashing::{SigningInfoKeeper, SlashingKeeper};
use crate::staking::{DividendKeeper, StakingKeeper};
use crate::store::{Batch, CacheStore, KvStore};

pub struct Context<'a> {
    store: CacheStore<'a>,
    params: &'a LedgerParams,
    height: u64,
    events: Vec<LedgerEvent>,
}

impl<'a> Context<'a> {
    pub fn new(parent: &'a dyn KvStore, params: &'a LedgerParams, height: u64) -> Self {
        Context {
            store: CacheStore::new(parent),
            params,
            height,
            events: Vec::new(),
        }
    }

    pub fn height(&self) -> u64 { self.height }

    pub fn params(&self) -> &LedgerParams { self.params }

    pub fn store(&self) -> &dyn KvStore { &self.store }

    pub fn staking(&self) -> StakingKeeper<'_> {
        StakingKeeper::new(&self.store, self.params)
    }

    pub fn slashing(&self) -> SlashingKeeper<'_> {
        SlashingKeeper::new(&self.store, self.params)
    }

    pub fn signing_info(&self) -> SigningInfoKeeper<'_> {
        SigningInfoKeeper::new(&self.store, self.params)
    }

    pub fn dividend(&self) -> DividendKeeper<'_> {
        DividendKeeper::new(&self.store)
    }

    pub fn checkpoint(&self) -> CheckpointKeeper<'_> {
        CheckpointKeeper::new(&self.store)
    }

    pub fn sequences(&self, kind: SequenceKind) -> SequenceIndex<'_> {
        SequenceIndex::new(&self.store, kind)
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn emit_all(&mut self, events: impl IntoIterator<Item = LedgerEvent>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[LedgerEvent] { &self.events }

    /// Pending writes and emitted events, in emission order.
    pub fn into_parts(self) -> (Batch, Vec<LedgerEvent>) {
        (self.store.into_batch(), self.events)
    }
}
