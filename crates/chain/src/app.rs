//! Ledger application: block lifecycle, transaction delivery and queries.
//!
//! Each transaction and each block hook runs in its own [`Context`]. The
//! context's pending writes reach the underlying store as one batch when the
//! closure returns `Ok`, and are discarded otherwise.

use crate::amount::Dec;
use crate::context::Context;
use crate::error::{LedgerError, Result};
use crate::events::{HeightEvent, LedgerEvent, SlashReason};
use crate::handler::{self, Evidence, TxOutcome, VoteInfo};
use crate::msgs::Msg;
use crate::params::LedgerParams;
use crate::query::{Querier, Query, QueryError};
use crate::slashing::InterimSlash;
use crate::staking::{AccountRootHasher, KeccakMerkleHasher, ValidatorSet};
use crate::store::KvStore;
use crate::types::ValidatorId;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Heights of events kept for relay polling.
pub const DEFAULT_EVENT_RETENTION: u64 = 1024;

pub struct App<S: KvStore> {
    store: S,
    params: LedgerParams,
    root_hasher: Box<dyn AccountRootHasher>,
    height: u64,
    last_committed: u64,
    pending_events: Vec<LedgerEvent>,
    event_log: BTreeMap<u64, Vec<LedgerEvent>>,
    event_retention: u64,
}

impl<S: KvStore> App<S> {
    pub fn new(store: S, params: LedgerParams) -> Self {
        App {
            store,
            params,
            root_hasher: Box::new(KeccakMerkleHasher),
            height: 0,
            last_committed: 0,
            pending_events: Vec::new(),
            event_log: BTreeMap::new(),
            event_retention: DEFAULT_EVENT_RETENTION,
        }
    }

    pub fn with_root_hasher(mut self, hasher: Box<dyn AccountRootHasher>) -> Self {
        self.root_hasher = hasher;
        self
    }

    pub fn with_event_retention(mut self, heights: u64) -> Self {
        self.event_retention = heights.max(1);
        self
    }

    pub fn store(&self) -> &S { &self.store }

    pub fn params(&self) -> &LedgerParams { &self.params }

    /// Height of the block being built.
    pub fn height(&self) -> u64 { self.height }

    pub fn latest_height(&self) -> u64 { self.last_committed }

    /// Run `f` in a fresh context and commit its writes if it succeeds.
    ///
    /// A codec failure means the persisted state can no longer be decoded;
    /// the process stops rather than continue on corrupt state.
    pub fn execute<T>(&mut self, f: impl FnOnce(&mut Context<'_>) -> Result<T>) -> Result<T> {
        let mut ctx = Context::new(&self.store, &self.params, self.height);
        let result = f(&mut ctx);
        match result {
            Ok(value) => {
                let (batch, events) = ctx.into_parts();
                if !batch.is_empty() {
                    debug!("committing {} writes at height {}", batch.len(), self.height);
                    self.store.write_batch(batch).map_err(|e| self.check_fatal(e))?;
                }
                self.pending_events.extend(events);
                Ok(value)
            }
            Err(e) => Err(self.check_fatal(e)),
        }
    }

    fn check_fatal(&self, e: LedgerError) -> LedgerError {
        if e.is_fatal() {
            error!("storage corruption at height {}: {}", self.height, e);
            panic!("ledger storage corrupted: {}", e);
        }
        e
    }

    // ============================================================
    // BLOCK LIFECYCLE
    // ============================================================

    /// Start block `height`: liveness votes, then double-sign evidence.
    pub fn begin_block(&mut self, height: u64, votes: &[VoteInfo], evidence: &[Evidence]) -> Result<()> {
        if height <= self.last_committed && self.last_committed != 0 {
            return Err(LedgerError::invalid(format!(
                "block {} is not after last committed height {}",
                height, self.last_committed
            )));
        }
        self.height = height;
        self.execute(|ctx| handler::handle_begin_block(ctx, votes, evidence))
    }

    /// Validate and apply one message. Rejections leave no state behind.
    pub fn deliver(&mut self, msg: &Msg) -> Result<TxOutcome> {
        if let Err(e) = msg.validate_basic() {
            error!("rejected {} from {}: {}", msg.kind(), msg.sender(), e);
            return Err(e);
        }
        match self.execute(|ctx| handler::handle_msg(ctx, msg)) {
            Ok(outcome) => {
                debug!("{} from {} -> {:?}", msg.kind(), msg.sender(), outcome);
                Ok(outcome)
            }
            Err(e) => {
                error!("rejected {} from {}: {}", msg.kind(), msg.sender(), e);
                Err(e)
            }
        }
    }

    /// Buffer a slash outside of evidence handling.
    pub fn slash(&mut self, id: ValidatorId, fraction: &Dec) -> Result<InterimSlash> {
        self.execute(|ctx| handler::slash(ctx, id, fraction, SlashReason::Manual))
    }

    /// Recompute the validator set from the registry at the current ack count.
    pub fn end_block(&mut self) -> Result<ValidatorSet> {
        self.execute(|ctx| {
            let ack_count = ctx.checkpoint().ack_count()?;
            ctx.staking().rebuild_validator_set(ack_count)
        })
    }

    /// Seal the block: its events become visible to [`App::events`].
    pub fn commit(&mut self) {
        let events = std::mem::take(&mut self.pending_events);
        if !events.is_empty() {
            info!("height {} committed with {} events", self.height, events.len());
            self.event_log.entry(self.height).or_default().extend(events);
        }
        self.last_committed = self.height;

        let floor = self.height.saturating_sub(self.event_retention);
        self.event_log = self.event_log.split_off(&floor.saturating_add(1));
    }

    /// Committed events with `from <= height <= to`, in order.
    pub fn events(&self, from: u64, to: u64) -> Vec<HeightEvent> {
        if from > to {
            return Vec::new();
        }
        self.event_log
            .range(from..=to)
            .flat_map(|(height, events)| {
                events.iter().cloned().map(move |event| HeightEvent { height: *height, event })
            })
            .collect()
    }

    // ============================================================
    // QUERIES
    // ============================================================

    /// JSON response for `q`. Only the latest committed height is served.
    pub fn query(&self, height: Option<u64>, q: &Query) -> std::result::Result<Vec<u8>, QueryError> {
        if let Some(h) = height {
            if h != self.last_committed {
                return Err(QueryError::InvalidInput(format!(
                    "height {} not available, latest is {}",
                    h, self.last_committed
                )));
            }
        }
        Querier::new(&self.store, &self.params, self.root_hasher.as_ref()).query(q)
    }
}
