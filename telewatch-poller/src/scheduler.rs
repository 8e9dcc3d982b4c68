//! Fixed-interval task scheduling with skip-if-busy semantics.
//!
//! Each scheduled task gets a driver that ticks on a fixed period. On a tick the
//! driver starts one invocation of the task, unless the previous invocation is
//! still running, in which case the tick is skipped. Invocations of one task
//! therefore never overlap, and a slow upstream cannot queue up a backlog of
//! requests.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use telewatch_poller::Scheduler;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = Scheduler::new();
//!     scheduler
//!         .schedule("heartbeat", Duration::from_secs(1), || async {
//!             println!("tick");
//!         })
//!         .unwrap();
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     scheduler.shutdown();
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::error::ConfigError;

/// Counters for one scheduled task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    /// Ticks observed by the driver.
    pub ticks: u64,
    /// Invocations whose body was started.
    pub runs: u64,
    /// Ticks dropped because an invocation was still in flight.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct RunState {
    cancelled: bool,
    busy: bool,
    stats: ScheduleStats,
}

#[derive(Debug)]
struct Shared {
    name: String,
    state: Mutex<RunState>,
    stop_tx: watch::Sender<bool>,
}

impl Shared {
    fn cancel(&self) -> bool {
        let first = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.cancelled, true)
        };
        if first {
            let _ = self.stop_tx.send(true);
            debug!(task = %self.name, "Scheduled task cancelled");
        }
        first
    }
}

/// Clears the busy flag when an invocation finishes, even if it panicked.
struct BusyGuard(Arc<Shared>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.state.lock().busy = false;
    }
}

/// Cancels the task when the last handle goes away without an explicit cancel.
#[derive(Debug)]
struct DropGuard(Arc<Shared>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        if !self.0.state.lock().cancelled {
            warn!(task = %self.0.name, "Schedule handle dropped without cancel; stopping task");
            self.0.cancel();
        }
    }
}

/// Handle to a scheduled task.
///
/// Clones refer to the same task. Call [`CancelHandle::cancel`] to stop it;
/// dropping the last clone also stops it, with a warning.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
    _guard: Arc<DropGuard>,
}

impl CancelHandle {
    /// Stop the task. Idempotent.
    ///
    /// Once this returns no new invocation will start, including one whose
    /// tick fired but whose body has not been polled yet. An invocation
    /// already in flight is left to finish on its own.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state.lock().cancelled
    }

    /// Whether an invocation is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().busy
    }

    pub fn stats(&self) -> ScheduleStats {
        self.shared.state.lock().stats
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

/// Run `task` every `interval`, skipping ticks while a previous run is in flight.
///
/// The first tick fires immediately. Must be called from within a tokio
/// runtime.
pub fn schedule<F, Fut>(
    name: impl Into<String>,
    interval: Duration,
    mut task: F,
) -> Result<CancelHandle, ConfigError>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if interval.is_zero() {
        return Err(ConfigError::ZeroDuration("interval"));
    }

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let shared = Arc::new(Shared {
        name: name.into(),
        state: Mutex::new(RunState::default()),
        stop_tx,
    });

    let driver = shared.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let run = {
                        let mut state = driver.state.lock();
                        if state.cancelled {
                            break;
                        }
                        state.stats.ticks += 1;
                        if state.busy {
                            state.stats.skipped += 1;
                            debug!(task = %driver.name, "Previous run still in flight, skipping tick");
                            continue;
                        }
                        state.busy = true;
                        task()
                    };

                    // The run is committed under the lock; a cancel that wins
                    // the lock first means the body is dropped unpolled.
                    let guard = BusyGuard(driver.clone());
                    tokio::spawn(async move {
                        {
                            let mut state = guard.0.state.lock();
                            if state.cancelled {
                                trace!(task = %guard.0.name, "Cancelled before the run started");
                                return;
                            }
                            state.stats.runs += 1;
                        }
                        run.await;
                        drop(guard);
                    });
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        trace!(task = %driver.name, "Scheduler driver exited");
    });

    Ok(CancelHandle {
        _guard: Arc::new(DropGuard(shared.clone())),
        shared,
    })
}

/// Owns every task scheduled through it so they can be torn down together.
#[derive(Debug, Default)]
pub struct Scheduler {
    handles: Mutex<Vec<CancelHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a task and keep a handle to it. See [`schedule`].
    pub fn schedule<F, Fut>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        task: F,
    ) -> Result<CancelHandle, ConfigError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = schedule(name, interval, task)?;
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }

    /// Number of tasks still owned by this scheduler.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Cancel every task. Idempotent.
    pub fn shutdown(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in &handles {
            handle.cancel();
        }
        if !handles.is_empty() {
            debug!(tasks = handles.len(), "Scheduler shut down");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Workload {
        started: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl Workload {
        fn task(self: &Arc<Self>, work: Duration) -> impl FnMut() -> BoxedRun + Send + 'static {
            let workload = self.clone();
            move || -> BoxedRun {
                let workload = workload.clone();
                Box::pin(async move {
                    workload.started.fetch_add(1, Ordering::SeqCst);
                    let now = workload.active.fetch_add(1, Ordering::SeqCst) + 1;
                    workload.max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(work).await;
                    workload.active.fetch_sub(1, Ordering::SeqCst);
                })
            }
        }
    }

    type BoxedRun = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    #[tokio::test(start_paused = true)]
    async fn fast_task_runs_every_tick() {
        let workload = Arc::new(Workload::default());
        let handle = schedule("fast", Duration::from_millis(1_000), workload.task(Duration::from_millis(10)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        handle.cancel();

        let stats = handle.stats();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.runs, 5);
        assert_eq!(stats.skipped, 0);
        assert_eq!(workload.started.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_task_skips_overlapping_ticks() {
        let workload = Arc::new(Workload::default());
        let handle = schedule("slow", Duration::from_millis(1_000), workload.task(Duration::from_millis(1_500)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        handle.cancel();

        // Runs start at 0, 2, 4, 6, 8 and 10 seconds; the odd ticks find the
        // previous run still busy.
        let stats = handle.stats();
        assert_eq!(stats.ticks, 11);
        assert_eq!(stats.runs, 6);
        assert_eq!(stats.skipped, 5);
        assert_eq!(stats.runs + stats.skipped, stats.ticks);
        assert_eq!(workload.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_starts_after_cancel() {
        let workload = Arc::new(Workload::default());
        let handle = schedule("cancel", Duration::from_millis(1_000), workload.task(Duration::from_millis(10)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        handle.cancel();
        let started = workload.started.load(Ordering::SeqCst);
        assert_eq!(started, 3);

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(workload.started.load(Ordering::SeqCst), started);
        assert!(handle.is_cancelled());

        // A second cancel is a no-op.
        handle.cancel();
        assert_eq!(handle.stats().runs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_on_a_tick_deadline_starts_no_body() {
        let workload = Arc::new(Workload::default());
        let start = tokio::time::Instant::now();
        let handle = schedule("edge", Duration::from_millis(1_000), workload.task(Duration::from_millis(10)))
            .unwrap();

        // Wakes on the same deadline as the second tick.
        let canceller = handle.clone();
        let counter = workload.clone();
        let started_at_cancel = tokio::spawn(async move {
            tokio::time::sleep_until(start + Duration::from_millis(1_000)).await;
            canceller.cancel();
            counter.started.load(Ordering::SeqCst)
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(started_at_cancel, 1);
        assert_eq!(workload.started.load(Ordering::SeqCst), started_at_cancel);
        assert_eq!(handle.stats().runs, 1);
        assert!(!handle.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_run_finishes_after_cancel() {
        let workload = Arc::new(Workload::default());
        let handle = schedule("inflight", Duration::from_millis(1_000), workload.task(Duration::from_millis(800)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_busy());
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(!handle.is_busy());
        assert_eq!(workload.active.load(Ordering::SeqCst), 0);
        assert_eq!(workload.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_cancels() {
        let workload = Arc::new(Workload::default());
        let handle = schedule("dropped", Duration::from_millis(1_000), workload.task(Duration::from_millis(10)))
            .unwrap();
        let observer = handle.shared.clone();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        drop(handle);
        assert!(observer.state.lock().cancelled);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(workload.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_shutdown_cancels_everything() {
        let workload = Arc::new(Workload::default());
        let scheduler = Scheduler::new();
        let a = scheduler
            .schedule("a", Duration::from_millis(1_000), workload.task(Duration::from_millis(10)))
            .unwrap();
        let b = scheduler
            .schedule("b", Duration::from_millis(2_000), workload.task(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(scheduler.len(), 2);

        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.shutdown();
        assert!(scheduler.is_empty());
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(workload.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let err = schedule("zero", Duration::ZERO, || async {}).unwrap_err();
        assert_eq!(err, ConfigError::ZeroDuration("interval"));
    }
}
