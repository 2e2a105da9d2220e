//! # StakeGuard Bridge
//!
//! Relay between the ledger and the root chain.
//!
//! ```text
//! root chain ──(Listener)──> TaskQueue ──(TickProcessor)──> ledger
//! ledger     ──(Listener)──> TaskQueue ──(TickProcessor)──> root chain
//! ```
//!
//! One polling loop per chain and one queue consumer, all stopped through a
//! shared [`Shutdown`].

pub mod client;
pub mod error;
pub mod listener;
pub mod processor;
pub mod queue;
pub mod shutdown;

pub use client::{LedgerClient, LocalLedger, RootChainClient, RootChainEvent, RootChainLog};
pub use error::BridgeError;
pub use listener::{EventRouter, EventSource, LedgerEvents, LedgerRouter, Listener, RootChainEvents, RootChainRouter};
pub use processor::{root_event_to_msg, TickProcessor};
pub use queue::{Task, TaskExecutor, TaskKind, TaskQueue};
pub use shutdown::Shutdown;

use stakeguard_chain::Address;
use stakeguard_common::BridgeConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn both listeners and the task consumer on the current runtime.
pub fn spawn_bridge(
    cfg: &BridgeConfig,
    ledger: Arc<dyn LedgerClient>,
    root: Arc<dyn RootChainClient>,
    signer: Address,
    shutdown: Shutdown,
) -> Vec<JoinHandle<()>> {
    let queue = TaskQueue::new(cfg.task_retry_count, Duration::from_millis(cfg.task_retry_delay_ms));
    let processor = Arc::new(TickProcessor::new(
        ledger.clone(),
        root.clone(),
        signer,
        Duration::from_millis(cfg.tick_submit_delay_ms),
    ));

    let ledger_listener = Listener::new(
        "ledger",
        LedgerEvents(ledger),
        Box::new(LedgerRouter),
        queue.clone(),
        Duration::from_millis(cfg.ledger_poll_interval_ms),
    );
    let root_listener = Listener::new(
        "root_chain",
        RootChainEvents(root),
        Box::new(RootChainRouter { from: signer }),
        queue.clone(),
        Duration::from_millis(cfg.root_poll_interval_ms),
    );

    vec![
        tokio::spawn(ledger_listener.run(shutdown.clone())),
        tokio::spawn(root_listener.run(shutdown.clone())),
        tokio::spawn(queue.run(processor, shutdown)),
    ]
}
