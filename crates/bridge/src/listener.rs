//! Polling listeners for the ledger and the root chain.
//!
//! A listener remembers the last height it processed, fetches everything
//! after it up to the source's latest height, and turns events into tasks.

use crate::client::{LedgerClient, RootChainClient, RootChainLog};
use crate::error::BridgeError;
use crate::queue::{Task, TaskKind, TaskQueue};
use crate::processor::root_event_to_msg;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use stakeguard_chain::{Address, HeightEvent, LedgerEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[async_trait]
pub trait EventSource: Send + Sync {
    type Event: Send;

    async fn latest_height(&self) -> Result<u64, BridgeError>;

    /// Events with `from <= height <= to`.
    async fn events(&self, from: u64, to: u64) -> Result<Vec<Self::Event>, BridgeError>;
}

pub struct LedgerEvents(pub Arc<dyn LedgerClient>);

#[async_trait]
impl EventSource for LedgerEvents {
    type Event = HeightEvent;

    async fn latest_height(&self) -> Result<u64, BridgeError> {
        self.0.latest_height().await
    }

    async fn events(&self, from: u64, to: u64) -> Result<Vec<HeightEvent>, BridgeError> {
        self.0.events(from, to).await
    }
}

pub struct RootChainEvents(pub Arc<dyn RootChainClient>);

#[async_trait]
impl EventSource for RootChainEvents {
    type Event = RootChainLog;

    async fn latest_height(&self) -> Result<u64, BridgeError> {
        self.0.latest_block().await
    }

    async fn events(&self, from: u64, to: u64) -> Result<Vec<RootChainLog>, BridgeError> {
        self.0.logs(from, to).await
    }
}

/// Maps one observed event to the tasks it triggers.
pub trait EventRouter<E>: Send + Sync {
    fn route(&self, event: &E) -> Vec<Task>;
}

/// Ledger events the relay acts on.
pub struct LedgerRouter;

impl EventRouter<HeightEvent> for LedgerRouter {
    fn route(&self, event: &HeightEvent) -> Vec<Task> {
        match &event.event {
            LedgerEvent::SlashLimitExceeded { validator_id, amount } => vec![Task::new(TaskKind::PrepareTick {
                validator_id: *validator_id,
                total_slashed: amount.clone(),
            })],
            LedgerEvent::TickConfirmed { tick_id, slashing_info_hash } => {
                vec![Task::new(TaskKind::SendTickToRootChain {
                    tick_id: *tick_id,
                    slashing_info_hash: *slashing_info_hash,
                })]
            }
            _ => Vec::new(),
        }
    }
}

/// Root-chain staking events become ledger messages signed by `from`.
pub struct RootChainRouter {
    pub from: Address,
}

impl EventRouter<RootChainLog> for RootChainRouter {
    fn route(&self, log: &RootChainLog) -> Vec<Task> {
        vec![Task::new(TaskKind::SendToLedger(root_event_to_msg(log, self.from)))]
    }
}

pub struct Listener<E: EventSource> {
    name: &'static str,
    source: E,
    router: Box<dyn EventRouter<E::Event>>,
    queue: TaskQueue,
    poll_interval: Duration,
    last_height: u64,
}

impl<E: EventSource> Listener<E> {
    pub fn new(
        name: &'static str,
        source: E,
        router: Box<dyn EventRouter<E::Event>>,
        queue: TaskQueue,
        poll_interval: Duration,
    ) -> Self {
        Listener { name, source, router, queue, poll_interval, last_height: 0 }
    }

    /// Lanjutkan setelah `height`, bukan dari awal.
    pub fn starting_after(mut self, height: u64) -> Self {
        self.last_height = height;
        self
    }

    pub fn last_height(&self) -> u64 {
        self.last_height
    }

    /// Process one polling round. Returns the number of tasks queued.
    ///
    /// The processed height only moves forward when the fetch succeeds, so a
    /// failed round is retried in full on the next poll.
    pub async fn poll_once(&mut self) -> Result<usize, BridgeError> {
        let latest = self.source.latest_height().await?;
        if latest <= self.last_height {
            return Ok(0);
        }
        let from = self.last_height + 1;
        let events = self.source.events(from, latest).await?;
        let mut queued = 0;
        for event in &events {
            for task in self.router.route(event) {
                debug!("{}: queueing {}", self.name, task.kind.name());
                self.queue.push(task);
                queued += 1;
            }
        }
        debug!("{}: processed heights {}..={} ({} events)", self.name, from, latest, events.len());
        self.last_height = latest;
        Ok(queued)
    }

    pub async fn run(mut self, shutdown: Shutdown) {
        info!("{} listener started, poll interval {:?}", self.name, self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(e) = self.poll_once().await {
                        warn!("{}: polling failed: {}", self.name, e);
                    }
                }
            }
        }
        info!("{} listener stopped at height {}", self.name, self.last_height);
    }
}
