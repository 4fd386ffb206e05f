//! Admission-controlled task pool.
//!
//! At most `max_concurrent` work items run at once. Submissions beyond that
//! park in a two-class pending queue and are woken, `High` before `Normal`,
//! as running items finish. Admission and queue mutation go through one
//! mutex; admitted work runs concurrently on the injected [`Spawn`] runtime.
//!
//! A periodic heartbeat sheds the newest pending work when the pool stays
//! saturated with a deep queue. Pending work can be cancelled in bulk;
//! running work is never preempted.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::core::pressure::{Feature, GateSet};
use crate::core::spawn::BoxFuture;
use crate::core::{GovernanceError, Spawn, TaskError};
use crate::infra::queue::ClassQueue;
use crate::runtime::TokioSpawner;
use crate::util::serde::{Priority, TaskId};

/// Snapshot returned by [`AdmissionPool::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Items currently running.
    pub active: usize,
    /// Items waiting for a slot.
    pub pending: usize,
}

/// Cumulative pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Items currently running.
    pub active: usize,
    /// Items waiting for a slot.
    pub pending: usize,
    /// Highest number of simultaneously running items observed.
    pub peak_active: usize,
    /// Items accepted into the pool.
    pub submitted: u64,
    /// Items that ran to success.
    pub completed: u64,
    /// Items that returned an error or panicked.
    pub failed: u64,
    /// Items dropped by congestion control.
    pub shed: u64,
    /// Items removed by `cancel_all_pending` or shutdown.
    pub cancelled: u64,
    /// Items refused at admission.
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    shed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

/// Result of running a work item, delivered only after its slot is released.
struct Completion {
    ok: bool,
    deliver: Option<Box<dyn FnOnce() + Send>>,
}

/// Type-erased work item owned by the pool between submission and completion.
trait Runnable: Send {
    /// Start the work. The outcome is handed back undelivered so the pool
    /// can account for the slot first.
    fn run(self: Box<Self>, id: TaskId) -> BoxFuture<Completion>;
    /// Resolve the item without running it.
    fn discard(self: Box<Self>, id: TaskId, reason: TaskError);
}

type WorkFn<T> = Box<dyn FnOnce() -> BoxFuture<anyhow::Result<T>> + Send>;

/// Work whose outcome is delivered through a [`TaskHandle`].
struct Awaited<T> {
    work: WorkFn<T>,
    tx: oneshot::Sender<Result<T, TaskError>>,
}

impl<T: Send + 'static> Runnable for Awaited<T> {
    fn run(self: Box<Self>, id: TaskId) -> BoxFuture<Completion> {
        let Self { work, tx } = *self;
        Box::pin(async move {
            let outcome = work().await.map_err(TaskError::Failed);
            let ok = outcome.is_ok();
            if let Err(e) = &outcome {
                debug!(task_id = id, error = %e, "work item failed");
            }
            Completion {
                ok,
                // The caller may have dropped its handle.
                deliver: Some(Box::new(move || {
                    let _ = tx.send(outcome);
                })),
            }
        })
    }

    fn discard(self: Box<Self>, _id: TaskId, reason: TaskError) {
        let _ = self.tx.send(Err(reason));
    }
}

/// Work whose failures are only logged.
struct Detached {
    work: WorkFn<()>,
}

impl Runnable for Detached {
    fn run(self: Box<Self>, id: TaskId) -> BoxFuture<Completion> {
        let work = self.work;
        Box::pin(async move {
            let ok = match work().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(task_id = id, error = %e, "fire-and-forget work item failed");
                    false
                }
            };
            Completion { ok, deliver: None }
        })
    }

    fn discard(self: Box<Self>, id: TaskId, reason: TaskError) {
        debug!(task_id = id, reason = %reason, "fire-and-forget work item dropped");
    }
}

struct QueuedItem {
    id: TaskId,
    work: Box<dyn Runnable>,
}

enum Admission {
    Run(QueuedItem),
    Queued,
    Refused(QueuedItem),
}

struct PoolState {
    active: usize,
    peak_active: usize,
    pending: ClassQueue<QueuedItem>,
}

struct PoolShared<S> {
    config: PoolConfig,
    state: Mutex<PoolState>,
    spawner: S,
    gates: Option<Arc<GateSet>>,
    next_id: AtomicU64,
    counters: PoolCounters,
    shutdown: AtomicBool,
    heartbeat_started: AtomicBool,
}

/// Awaitable outcome of a submitted work item.
///
/// Dropping the handle does not cancel the work.
#[must_use = "dropping a TaskHandle discards the work item's result"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Aborted)))
    }
}

/// Releases a running slot exactly once, on every exit path.
///
/// Dropped after the work future completes, or when the runtime tears the
/// task down (including panics inside the work item).
struct SlotGuard<S>
where
    S: Spawn + Send + Sync + 'static,
{
    pool: Arc<PoolShared<S>>,
    id: TaskId,
    finished: bool,
}

impl<S> SlotGuard<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Count the outcome and release the slot.
    fn finish(mut self, ok: bool) {
        self.finished = true;
        let counter = if ok {
            &self.pool.counters.completed
        } else {
            &self.pool.counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl<S> Drop for SlotGuard<S>
where
    S: Spawn + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.finished {
            warn!(task_id = self.id, "work item aborted before completion");
            self.pool.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        PoolShared::release(&self.pool, self.id);
    }
}

/// Bounded-concurrency executor with priority admission and congestion
/// shedding. Cloning yields another handle to the same pool.
pub struct AdmissionPool<S = TokioSpawner>
where
    S: Spawn + Send + Sync + 'static,
{
    shared: Arc<PoolShared<S>>,
}

impl<S> Clone for AdmissionPool<S>
where
    S: Spawn + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> AdmissionPool<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Create a pool. Call [`AdmissionPool::start_heartbeat`] to enable
    /// periodic congestion shedding.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::InvalidConfig`] when `config` fails
    /// validation.
    pub fn new(config: PoolConfig, spawner: S) -> Result<Self, GovernanceError> {
        Self::build(config, spawner, None)
    }

    /// Create a pool that consults `gates` before admitting normal-priority
    /// work (when `gate_normal_priority` is set).
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::InvalidConfig`] when `config` fails
    /// validation.
    pub fn with_gates(
        config: PoolConfig,
        spawner: S,
        gates: Arc<GateSet>,
    ) -> Result<Self, GovernanceError> {
        Self::build(config, spawner, Some(gates))
    }

    fn build(
        config: PoolConfig,
        spawner: S,
        gates: Option<Arc<GateSet>>,
    ) -> Result<Self, GovernanceError> {
        config
            .validate()
            .map_err(|e| GovernanceError::InvalidConfig(format!("pool: {e}")))?;
        info!(
            max_concurrent = config.max_concurrent,
            shed_threshold = config.shed_threshold,
            shed_keep = config.shed_keep,
            "admission pool initialized"
        );
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState {
                    active: 0,
                    peak_active: 0,
                    pending: ClassQueue::new(),
                }),
                spawner,
                gates,
                next_id: AtomicU64::new(0),
                counters: PoolCounters::default(),
                shutdown: AtomicBool::new(false),
                heartbeat_started: AtomicBool::new(false),
            }),
        })
    }

    /// Submit a work item and get a handle to await its result.
    ///
    /// Returns immediately. `work` is invoked once a slot is granted; its
    /// error, if any, comes back as [`TaskError::Failed`] through the handle.
    pub fn submit<F, Fut, T, E>(&self, work: F, priority: Priority) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let work: WorkFn<T> = Box::new(move || -> BoxFuture<anyhow::Result<T>> {
            Box::pin(async move { work().await.map_err(Into::into) })
        });
        self.shared.admit(priority, Box::new(Awaited { work, tx }));
        TaskHandle { rx }
    }

    /// Submit a work item whose failures are logged and otherwise ignored.
    pub fn submit_fire_and_forget<F, Fut, E>(&self, work: F, priority: Priority)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let work: WorkFn<()> = Box::new(move || -> BoxFuture<anyhow::Result<()>> {
            Box::pin(async move { work().await.map_err(Into::into) })
        });
        self.shared.admit(priority, Box::new(Detached { work }));
    }

    /// Drop every pending item; running items are unaffected.
    ///
    /// Returns the number of items removed. Their handles resolve to
    /// [`TaskError::Cancelled`].
    pub fn cancel_all_pending(&self) -> usize {
        let drained = self.shared.state.lock().pending.drain();
        let count = drained.len();
        for item in drained {
            item.work.discard(item.id, TaskError::Cancelled);
        }
        if count > 0 {
            self.shared
                .counters
                .cancelled
                .fetch_add(count as u64, Ordering::Relaxed);
            info!(cancelled = count, "pending work cancelled");
        }
        count
    }

    /// Running and pending counts.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            active: state.active,
            pending: state.pending.len(),
        }
    }

    /// Cumulative counters plus the current status.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (active, pending, peak_active) = {
            let state = self.shared.state.lock();
            (state.active, state.pending.len(), state.peak_active)
        };
        let counters = &self.shared.counters;
        PoolStats {
            active,
            pending,
            peak_active,
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            shed: counters.shed.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Configured concurrency limit.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.shared.config.max_concurrent
    }

    /// Run one congestion check.
    ///
    /// When every slot is busy and more than `shed_threshold` items are
    /// pending, keeps the first `shed_keep` in admission order and sheds the
    /// rest. Returns the number shed.
    pub fn heartbeat(&self) -> usize {
        self.shared.shed_congestion()
    }

    /// Spawn the periodic heartbeat. Idempotent; the loop stops once the pool
    /// is shut down or every handle is dropped.
    pub fn start_heartbeat(&self) {
        if self.shared.heartbeat_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let period = self.shared.config.heartbeat_interval();
        let weak = Arc::downgrade(&self.shared);
        self.shared.spawner.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                shared.shed_congestion();
            }
            debug!("pool heartbeat stopped");
        });
    }

    /// Refuse new work and cancel everything pending. Running items finish.
    pub fn shutdown(&self) {
        {
            // Admission re-checks the flag under this lock.
            let _state = self.shared.state.lock();
            if self.shared.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        let cancelled = self.cancel_all_pending();
        info!(cancelled, "admission pool shut down");
    }

    /// True once [`AdmissionPool::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }
}

impl<S> PoolShared<S>
where
    S: Spawn + Send + Sync + 'static,
{
    fn admit(self: &Arc<Self>, priority: Priority, work: Box<dyn Runnable>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if self.shutdown.load(Ordering::Acquire) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            work.discard(id, TaskError::PoolShutdown);
            return;
        }

        if priority == Priority::Normal && self.config.gate_normal_priority {
            if let Some(gates) = &self.gates {
                if gates.is_gated(Feature::BackgroundWork) {
                    debug!(task_id = id, "normal-priority work rejected under pressure");
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    work.discard(id, TaskError::Rejected(Feature::BackgroundWork));
                    return;
                }
            }
        }

        let item = QueuedItem { id, work };
        let admission = {
            let mut state = self.state.lock();
            if self.shutdown.load(Ordering::Acquire) {
                Admission::Refused(item)
            } else if state.active < self.config.max_concurrent {
                state.active += 1;
                state.peak_active = state.peak_active.max(state.active);
                Admission::Run(item)
            } else {
                state.pending.push(priority, item);
                debug!(
                    task_id = id,
                    %priority,
                    pending = state.pending.len(),
                    "pool saturated, work item queued"
                );
                Admission::Queued
            }
        };

        match admission {
            Admission::Run(item) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = id, %priority, "work item admitted");
                self.launch(item);
            }
            Admission::Queued => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Admission::Refused(item) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                item.work.discard(id, TaskError::PoolShutdown);
            }
        }
    }

    fn launch(self: &Arc<Self>, item: QueuedItem) {
        let QueuedItem { id, work } = item;
        let guard = SlotGuard {
            pool: Arc::clone(self),
            id,
            finished: false,
        };
        let fut = work.run(id);
        self.spawner.spawn(async move {
            let completion = fut.await;
            guard.finish(completion.ok);
            if let Some(deliver) = completion.deliver {
                deliver();
            }
        });
    }

    /// Free one slot, then wake pending items until the pool is saturated or
    /// the queue is empty.
    fn release(self: &Arc<Self>, id: TaskId) {
        let woken = {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            let mut woken = Vec::new();
            while state.active < self.config.max_concurrent {
                let Some(item) = state.pending.pop() else { break };
                state.active += 1;
                woken.push(item);
            }
            state.peak_active = state.peak_active.max(state.active);
            woken
        };

        debug!(task_id = id, woken = woken.len(), "slot released");
        for item in woken {
            debug!(task_id = item.id, "woke pending work item");
            self.launch(item);
        }
    }

    fn shed_congestion(&self) -> usize {
        let shed = {
            let mut state = self.state.lock();
            let saturated = state.active >= self.config.max_concurrent;
            if !saturated || state.pending.len() <= self.config.shed_threshold {
                return 0;
            }
            state.pending.truncate(self.config.shed_keep)
        };

        let count = shed.len();
        for item in shed {
            item.work.discard(item.id, TaskError::Shed);
        }
        self.counters.shed.fetch_add(count as u64, Ordering::Relaxed);
        info!(
            shed = count,
            kept = self.config.shed_keep,
            "congestion control shed pending work"
        );
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct InlineSpawner;

    impl Spawn for InlineSpawner {
        fn spawn<F>(&self, fut: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(fut);
        }
    }

    fn config(max_concurrent: usize) -> PoolConfig {
        PoolConfig {
            max_concurrent,
            ..PoolConfig::default()
        }
    }

    #[tokio::test]
    async fn submit_returns_value() {
        let pool = AdmissionPool::new(config(2), InlineSpawner).unwrap();
        let handle = pool.submit(|| async { Ok::<_, anyhow::Error>(41 + 1) }, Priority::Normal);
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn admission_is_synchronous() {
        let pool = AdmissionPool::new(config(1), InlineSpawner).unwrap();
        let (_tx, rx) = oneshot::channel::<()>();
        let _running = pool.submit(
            move || async move {
                let _ = rx.await;
                Ok::<_, anyhow::Error>(())
            },
            Priority::Normal,
        );
        let _queued = pool.submit(|| async { Ok::<_, anyhow::Error>(()) }, Priority::High);

        assert_eq!(pool.status(), PoolStatus { active: 1, pending: 1 });
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let pool = AdmissionPool::new(config(1), InlineSpawner).unwrap();
        pool.shutdown();
        let result = pool
            .submit(|| async { Ok::<_, anyhow::Error>(()) }, Priority::High)
            .await;
        assert!(matches!(result, Err(TaskError::PoolShutdown)));
        assert_eq!(pool.stats().rejected, 1);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = AdmissionPool::new(config(0), InlineSpawner);
        assert!(matches!(result, Err(GovernanceError::InvalidConfig(_))));
    }

    #[test]
    fn heartbeat_without_congestion_is_noop() {
        let pool = AdmissionPool::new(config(2), InlineSpawner).unwrap();
        assert_eq!(pool.heartbeat(), 0);
    }
}
