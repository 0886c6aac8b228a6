use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Execution events emitted by the worker pool.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { files: usize },
    ThrottleWaited { duration: Duration },
    WorkerStarted { file: PathBuf },
    WorkerFinished { file: PathBuf, status: &'static str },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Logs execution events at debug level.
#[derive(Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        tracing::debug!(target: "sales_ingest::execution", ?event);
    }
}

/// Real-time metrics for a pipeline run.
///
/// The engine updates these counters while files are processed; callers can snapshot them at
/// any time.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    files_started: AtomicU64,
    files_finished: AtomicU64,
    archived: AtomicU64,
    quarantined: AtomicU64,
    load_failed: AtomicU64,
    rows_loaded: AtomicU64,
    rows_dropped: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_workers: AtomicUsize,
    max_active_workers: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            files_started: AtomicU64::new(0),
            files_finished: AtomicU64::new(0),
            archived: AtomicU64::new(0),
            quarantined: AtomicU64::new(0),
            load_failed: AtomicU64::new(0),
            rows_loaded: AtomicU64::new(0),
            rows_dropped: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            max_active_workers: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        for counter in [
            &self.files_started,
            &self.files_finished,
            &self.archived,
            &self.quarantined,
            &self.load_failed,
            &self.rows_loaded,
            &self.rows_dropped,
            &self.throttle_wait_ns,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.active_workers.store(0, Ordering::SeqCst);
        self.max_active_workers.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_worker_start(&self) {
        let _ = self.files_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_workers, now);
    }

    pub fn on_worker_end(&self) {
        let _ = self.files_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_archived(&self, rows: u64) {
        let _ = self.archived.fetch_add(1, Ordering::SeqCst);
        let _ = self.rows_loaded.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn on_quarantined(&self) {
        let _ = self.quarantined.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_load_failed(&self) {
        let _ = self.load_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_rows_dropped(&self, rows: u64) {
        let _ = self.rows_dropped.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let add = d.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.throttle_wait_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            files_started: self.files_started.load(Ordering::SeqCst),
            files_finished: self.files_finished.load(Ordering::SeqCst),
            archived: self.archived.load(Ordering::SeqCst),
            quarantined: self.quarantined.load(Ordering::SeqCst),
            load_failed: self.load_failed.load(Ordering::SeqCst),
            rows_loaded: self.rows_loaded.load(Ordering::SeqCst),
            rows_dropped: self.rows_dropped.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_workers: self.max_active_workers.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub files_started: u64,
    pub files_finished: u64,
    pub archived: u64,
    pub quarantined: u64,
    pub load_failed: u64,
    pub rows_loaded: u64,
    pub rows_dropped: u64,
    pub throttle_wait: Duration,
    pub max_active_workers: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, files={}/{}, archived={}, quarantined={}, load_failed={}, rows_loaded={}, rows_dropped={}, max_active_workers={}, throttle_wait={:?}, elapsed={:?}",
            self.run_id,
            self.files_finished,
            self.files_started,
            self.archived,
            self.quarantined,
            self.load_failed,
            self.rows_loaded,
            self.rows_dropped,
            self.max_active_workers,
            self.throttle_wait,
            self.elapsed
        )
    }
}
