//! Delayed task queue and its consumer loop.
//!
//! Tasks are ordered by ETA, then by insertion. A failed task is pushed
//! back with a linearly growing delay until its retry budget runs out.

use crate::shutdown::Shutdown;
use async_trait::async_trait;
use parking_lot::Mutex;
use stakeguard_chain::{Amount, Hash, Msg, ValidatorId};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Wait used when the queue is empty; pushes wake the consumer earlier.
const IDLE_WAIT: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Network slash limit crossed; consider proposing a tick.
    PrepareTick { validator_id: ValidatorId, total_slashed: Amount },
    /// Propose a tick for this buffer hash unless it became stale.
    SubmitTick { slashing_info_hash: Hash },
    /// Forward a confirmed tick to the root chain.
    SendTickToRootChain { tick_id: u64, slashing_info_hash: Hash },
    /// Deliver a message derived from a root-chain event.
    SendToLedger(Msg),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::PrepareTick { .. } => "prepare_tick",
            TaskKind::SubmitTick { .. } => "submit_tick",
            TaskKind::SendTickToRootChain { .. } => "send_tick_to_root_chain",
            TaskKind::SendToLedger(_) => "send_to_ledger",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    /// Failed attempts so far
    pub attempts: u32,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        Task { kind, attempts: 0 }
    }
}

/// Runs tasks taken off the queue.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, queue: &TaskQueue) -> anyhow::Result<()>;
}

struct Scheduled {
    eta: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.eta == other.eta && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// reversed: BinaryHeap is a max-heap and the earliest ETA must pop first
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other.eta.cmp(&self.eta).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

#[derive(Clone)]
pub struct TaskQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    retry_count: u32,
    retry_delay: Duration,
}

impl TaskQueue {
    pub fn new(retry_count: u32, retry_delay: Duration) -> Self {
        TaskQueue {
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            retry_count,
            retry_delay,
        }
    }

    pub fn push(&self, task: Task) {
        self.push_delayed(task, Duration::ZERO);
    }

    pub fn push_delayed(&self, task: Task, delay: Duration) {
        let eta = Instant::now() + delay;
        {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            debug!("queued {} (attempt {}) in {:?}", task.kind.name(), task.attempts + 1, delay);
            state.heap.push(Scheduled { eta, seq, task });
        }
        self.notify.notify_one();
    }

    /// Earliest task whose ETA has passed.
    pub fn pop_due(&self, now: Instant) -> Option<Task> {
        let mut state = self.state.lock();
        if state.heap.peek().map_or(false, |s| s.eta <= now) {
            return state.heap.pop().map(|s| s.task);
        }
        None
    }

    pub fn next_eta(&self) -> Option<Instant> {
        self.state.lock().heap.peek().map(|s| s.eta)
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Jadwalkan ulang task yang gagal. Return false kalau retry sudah habis.
    pub fn retry(&self, mut task: Task) -> bool {
        task.attempts += 1;
        if task.attempts > self.retry_count {
            return false;
        }
        let delay = self.retry_delay * task.attempts;
        self.push_delayed(task, delay);
        true
    }

    /// Consume tasks until shutdown.
    pub async fn run(self, executor: Arc<dyn TaskExecutor>, shutdown: Shutdown) {
        info!("task consumer started");
        while !shutdown.is_triggered() {
            if let Some(task) = self.pop_due(Instant::now()) {
                match executor.execute(&task, &self).await {
                    Ok(()) => debug!("{} done", task.kind.name()),
                    Err(e) => {
                        let name = task.kind.name();
                        warn!("{} failed (attempt {}): {:#}", name, task.attempts + 1, e);
                        if !self.retry(task) {
                            error!("{} dropped after {} retries", name, self.retry_count);
                        }
                    }
                }
                continue;
            }

            let wake_at = self.next_eta().unwrap_or_else(|| Instant::now() + IDLE_WAIT);
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
        info!("task consumer stopped");
    }
}
