//! Bounded, priority-ordered task scheduler.
//!
//! Tasks wait in a priority queue (lower value first, FIFO on ties) until the
//! dispatcher finds a free concurrency slot and room in the rolling rate
//! window. Each started task runs on its own tokio task, so a slow external
//! call only occupies its own slot.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use reel_core::defaults::{JOB_MAX_CONCURRENT, JOB_RATE_LIMIT, JOB_RATE_WINDOW_MS};
use reel_core::{Error, JobId, Result};

use crate::rate::RateWindow;

/// A unit of work owned by the scheduler until it starts or is cancelled.
pub trait ScheduledTask: Send + 'static {
    /// Execute the task. `cancel` is the task's own cancellation token.
    fn run(self: Box<Self>, cancel: CancellationToken) -> BoxFuture<'static, ()>;

    /// Called instead of [`run`](Self::run) when the task is cancelled
    /// before it started.
    fn cancelled(self: Box<Self>);
}

/// Configuration for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of tasks executing simultaneously.
    pub max_concurrent: usize,
    /// Maximum number of task starts per rate window.
    pub rate_limit: usize,
    /// Length of the rolling rate window.
    pub rate_window: Duration,
    /// Start with dispatch paused.
    pub start_paused: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: JOB_MAX_CONCURRENT,
            rate_limit: JOB_RATE_LIMIT,
            rate_window: Duration::from_millis(JOB_RATE_WINDOW_MS),
            start_paused: false,
        }
    }
}

impl SchedulerConfig {
    /// Set maximum concurrent tasks.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the start rate limit.
    pub fn with_rate_limit(mut self, limit: usize, window: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_window = window;
        self
    }

    /// Start with dispatch paused.
    pub fn with_start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }
}

/// Queue depth snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub queued: usize,
    pub active: usize,
    pub paused: bool,
}

/// What [`Scheduler::cancel`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was still queued and has been removed without running.
    Dequeued,
    /// The task is running and its token has been cancelled.
    Signalled,
    /// No queued or running task with that ID.
    NotFound,
}

impl CancelOutcome {
    pub fn dispatched(&self) -> bool {
        !matches!(self, CancelOutcome::NotFound)
    }
}

struct QueuedTask {
    job_id: JobId,
    priority: i32,
    seq: u64,
    cancel: CancellationToken,
    task: Box<dyn ScheduledTask>,
}

// BinaryHeap is a max-heap: the "greatest" entry is the lowest priority
// value, then the earliest sequence number.
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

struct QueueState {
    queue: BinaryHeap<QueuedTask>,
    running: HashMap<JobId, CancellationToken>,
    next_seq: u64,
    window: RateWindow,
    paused: bool,
    closed: bool,
}

struct Shared {
    config: SchedulerConfig,
    state: Mutex<QueueState>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
}

/// Handle to a running scheduler. Clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Start the dispatcher. Must be called from within a tokio runtime.
    pub fn start(config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            max_concurrent: config.max_concurrent.max(1),
            rate_limit: config.rate_limit.max(1),
            ..config
        };

        info!(
            max_concurrent = config.max_concurrent,
            rate_limit = config.rate_limit,
            rate_window_ms = config.rate_window.as_millis() as u64,
            paused = config.start_paused,
            "Scheduler started"
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                queue: BinaryHeap::new(),
                running: HashMap::new(),
                next_seq: 0,
                window: RateWindow::new(config.rate_limit, config.rate_window),
                paused: config.start_paused,
                closed: false,
            }),
            config,
            wake: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(dispatch_loop(
            Arc::downgrade(&shared),
            shared.wake.clone(),
            shared.shutdown.clone(),
        ));
        Self { shared }
    }

    /// Effective configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Enqueue a task. Fails once the scheduler has been shut down.
    #[instrument(skip(self, cancel, task))]
    pub fn submit(
        &self,
        job_id: JobId,
        priority: i32,
        cancel: CancellationToken,
        task: Box<dyn ScheduledTask>,
    ) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(Error::ShuttingDown);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(QueuedTask {
                job_id,
                priority,
                seq,
                cancel,
                task,
            });
            debug!(queued = state.queue.len(), "Task queued");
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Cancel a task by ID.
    ///
    /// A queued task is removed and its `cancelled` hook runs before this
    /// returns. A running task only has its token cancelled; it finishes on
    /// its own at its next checkpoint.
    pub fn cancel(&self, job_id: JobId) -> CancelOutcome {
        let removed = {
            let mut state = self.shared.state.lock();
            if let Some(token) = state.running.get(&job_id) {
                token.cancel();
                return CancelOutcome::Signalled;
            }
            let (mut matched, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.queue)
                .into_vec()
                .into_iter()
                .partition(|t| t.job_id == job_id);
            state.queue = BinaryHeap::from(rest);
            matched.pop()
        };

        match removed {
            Some(queued) => {
                debug!(%job_id, "Queued task cancelled before start");
                queued.cancel.cancel();
                queued.task.cancelled();
                CancelOutcome::Dequeued
            }
            None => CancelOutcome::NotFound,
        }
    }

    /// Current queue depth.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            queued: state.queue.len(),
            active: state.running.len(),
            paused: state.paused,
        }
    }

    /// Stop starting new tasks. Running tasks are unaffected.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
        info!("Scheduler PAUSED");
    }

    /// Resume starting tasks.
    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        info!("Scheduler RESUMED");
        self.shared.wake.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Stop the dispatcher, cancel every queued task and signal running ones.
    pub fn shutdown(&self) {
        let drained = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            for token in state.running.values() {
                token.cancel();
            }
            std::mem::take(&mut state.queue).into_sorted_vec()
        };
        self.shared.shutdown.cancel();

        info!(cancelled = drained.len(), "Scheduler shutting down");
        // into_sorted_vec is ascending by Ord, i.e. latest-scheduled first.
        for queued in drained.into_iter().rev() {
            queued.cancel.cancel();
            queued.task.cancelled();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().closed
    }
}

/// Runs until shutdown, or until every handle and running task has dropped
/// its `Arc<Shared>`.
async fn dispatch_loop(shared: Weak<Shared>, wake: Arc<Notify>, shutdown: CancellationToken) {
    loop {
        let rate_wait = match shared.upgrade() {
            Some(shared) => shared.dispatch_ready(),
            None => break,
        };
        let rate_timer = async move {
            match rate_wait {
                Some(wait) => sleep(wait).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = wake.notified() => {}
            _ = rate_timer => {}
        }
    }
    debug!("Scheduler dispatcher stopped");
}

impl Shared {
    /// Start every task that currently fits. Returns how long to wait when
    /// the rate window is the limiting factor.
    fn dispatch_ready(self: &Arc<Self>) -> Option<Duration> {
        let mut ready = Vec::new();
        let mut skipped = Vec::new();
        let mut rate_wait = None;

        {
            let mut state = self.state.lock();
            if state.closed || state.paused {
                return None;
            }
            while state.running.len() < self.config.max_concurrent {
                let Some(next) = state.queue.pop() else {
                    break;
                };
                if next.cancel.is_cancelled() {
                    skipped.push(next);
                    continue;
                }
                if let Err(wait) = state.window.try_acquire(Instant::now()) {
                    state.queue.push(next);
                    rate_wait = Some(wait);
                    break;
                }
                state.running.insert(next.job_id, next.cancel.clone());
                ready.push(next);
            }
        }

        for queued in skipped {
            debug!(job_id = %queued.job_id, "Skipping cancelled task");
            queued.task.cancelled();
        }
        for queued in ready {
            self.spawn(queued);
        }
        rate_wait
    }

    fn spawn(self: &Arc<Self>, queued: QueuedTask) {
        let QueuedTask {
            job_id,
            priority,
            cancel,
            task,
            ..
        } = queued;
        debug!(%job_id, priority, "Starting task");

        let slot = SlotGuard {
            shared: self.clone(),
            job_id,
        };
        tokio::spawn(async move {
            let _slot = slot;
            task.run(cancel).await;
        });
    }

    fn release(&self, job_id: JobId) {
        self.state.lock().running.remove(&job_id);
        self.wake.notify_one();
    }
}

// Reached when every handle and running task is gone without an explicit
// shutdown: queued tasks are cancelled and the dispatcher is stopped.
impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let state = self.state.get_mut();
        if state.closed {
            return;
        }
        state.closed = true;
        let drained = std::mem::take(&mut state.queue).into_sorted_vec();
        if !drained.is_empty() {
            info!(cancelled = drained.len(), "Scheduler dropped with queued tasks");
        }
        for queued in drained.into_iter().rev() {
            queued.cancel.cancel();
            queued.task.cancelled();
        }
    }
}

/// Frees the concurrency slot when the task ends, panics included.
struct SlotGuard {
    shared: Arc<Shared>,
    job_id: JobId,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(job_id = %self.job_id, "Scheduled task panicked");
        }
        self.shared.release(self.job_id);
    }
}
