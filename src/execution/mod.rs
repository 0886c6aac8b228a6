//! Bounded worker pool driving transform then load for each discovered file.
//!
//! This module sits "above" [`crate::processing`] and [`crate::loading`] and provides:
//!
//! - one independent task per file, at most `max_workers` running at once
//! - per-file isolation: a failure (or panic) in one file never stops the others
//! - real-time metrics + observer hooks for monitoring
//!
//! Scheduling, retries and run frequency belong to whatever invokes [`ExecutionEngine::run`].

mod observer;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::{LoadError, LoadResult, QuarantineReason};
use crate::ingestion::observability::{
    FileFailure, PipelineObserver, PipelineSeverity, report_failure, severity_for_transform,
};
use crate::loading::{self, LoadOutcome};
use crate::processing::{self, TransformedFile};

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, TracingExecutionObserver,
};

/// The load step of a worker.
///
/// Implemented for [`PgPool`]; other implementations stand in for the database in tests.
pub trait Loader: Send + Sync + 'static {
    fn load(
        &self,
        file: &TransformedFile,
        config: &PipelineConfig,
    ) -> impl Future<Output = LoadResult<LoadOutcome>> + Send;
}

impl Loader for PgPool {
    fn load(
        &self,
        file: &TransformedFile,
        config: &PipelineConfig,
    ) -> impl Future<Output = LoadResult<LoadOutcome>> + Send {
        loading::load(file, self, config)
    }
}

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Upper bound on files processed concurrently.
    pub max_workers: usize,
    /// Severity at which per-file failures are escalated to `on_alert`.
    pub alert_at_or_above: PipelineSeverity,
}

impl ExecutionOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            ..Self::default()
        }
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            max_workers: n.max(1),
            alert_at_or_above: PipelineSeverity::Critical,
        }
    }
}

/// Terminal state of one file after a run.
#[derive(Debug)]
pub enum FileStatus {
    /// Loaded and moved to the archive.
    Archived(LoadOutcome),
    /// Failed validation; moved to quarantine.
    Quarantined(QuarantineReason),
    /// Transformed but the load failed and was rolled back.
    LoadFailed(LoadError),
    /// The worker panicked or was cancelled; the file was not archived.
    Aborted(String),
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archived(_) => "archived",
            Self::Quarantined(_) => "quarantined",
            Self::LoadFailed(_) => "load_failed",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// Outcome for one file.
#[derive(Debug)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub status: FileStatus,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// One entry per input file, sorted by path.
    pub outcomes: Vec<FileOutcome>,
    pub metrics: ExecutionMetricsSnapshot,
}

/// Runs the per-file pipeline over a list of files with bounded concurrency.
pub struct ExecutionEngine<L: Loader = PgPool> {
    loader: Arc<L>,
    config: Arc<PipelineConfig>,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn PipelineObserver>>,
    events: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl<L: Loader> ExecutionEngine<L> {
    /// Create a new engine.
    ///
    /// A `max_workers` of zero is treated as one.
    pub fn new(loader: L, config: PipelineConfig, opts: ExecutionOptions) -> Self {
        Self {
            loader: Arc::new(loader),
            config: Arc::new(config),
            opts,
            observer: None,
            events: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }

    /// Attach an observer for per-file outcomes.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach an observer for execution events.
    pub fn with_execution_observer(mut self, events: Arc<dyn ExecutionObserver>) -> Self {
        self.events = Some(events);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process every file: transform, then load if the transform succeeded.
    ///
    /// Each file is an independent task. Dropping the returned future aborts in-flight loads,
    /// which rolls their transactions back and leaves their source files in place.
    pub async fn run(&self, files: Vec<PathBuf>) -> RunSummary {
        let start = Instant::now();
        self.metrics.begin_run();
        emit(&self.events, ExecutionEvent::RunStarted { files: files.len() });

        let sem = Arc::new(Semaphore::new(self.opts.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for file in files {
            let worker = Worker {
                loader: Arc::clone(&self.loader),
                config: Arc::clone(&self.config),
                observer: self.observer.clone(),
                events: self.events.clone(),
                metrics: Arc::clone(&self.metrics),
                alert_at_or_above: self.opts.alert_at_or_above,
            };
            let sem = Arc::clone(&sem);
            tasks.spawn(async move {
                let wait_start = Instant::now();
                // The semaphore is never closed.
                let _permit = sem.acquire_owned().await.ok();
                let waited = wait_start.elapsed();
                if waited > Duration::from_millis(1) {
                    worker.metrics.on_throttle_wait(waited);
                    emit(&worker.events, ExecutionEvent::ThrottleWaited { duration: waited });
                }

                let metrics = Arc::clone(&worker.metrics);
                let source = file.clone();
                match AssertUnwindSafe(worker.process(file)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(file = %source.display(), %message, "worker panicked");
                        metrics.on_worker_end();
                        FileOutcome {
                            source,
                            status: FileStatus::Aborted(message),
                        }
                    }
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // Tasks are only cancelled when this future is dropped.
                Err(e) => error!(error = %e, "worker task failed"),
            }
        }
        outcomes.sort_by(|a, b| a.source.cmp(&b.source));

        let elapsed = start.elapsed();
        self.metrics.end_run(elapsed);
        let metrics = self.metrics.snapshot();
        info!(%metrics, "run finished");
        emit(
            &self.events,
            ExecutionEvent::RunFinished {
                elapsed,
                metrics: metrics.clone(),
            },
        );

        RunSummary { outcomes, metrics }
    }
}

struct Worker<L: Loader> {
    loader: Arc<L>,
    config: Arc<PipelineConfig>,
    observer: Option<Arc<dyn PipelineObserver>>,
    events: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
    alert_at_or_above: PipelineSeverity,
}

impl<L: Loader> Worker<L> {
    async fn process(self, path: PathBuf) -> FileOutcome {
        self.metrics.on_worker_start();
        emit(&self.events, ExecutionEvent::WorkerStarted { file: path.clone() });

        let status = self.transform_then_load(&path).await;

        self.metrics.on_worker_end();
        emit(
            &self.events,
            ExecutionEvent::WorkerFinished {
                file: path.clone(),
                status: status.as_str(),
            },
        );
        FileOutcome {
            source: path,
            status,
        }
    }

    async fn transform_then_load(&self, path: &PathBuf) -> FileStatus {
        let config = Arc::clone(&self.config);
        let owned = path.clone();
        let transformed =
            match tokio::task::spawn_blocking(move || processing::transform(&owned, &config)).await {
                Ok(result) => result,
                Err(e) => return FileStatus::Aborted(format!("transform task failed: {e}")),
            };

        let transformed = match transformed {
            Ok(t) => t,
            Err(reason) => {
                self.metrics.on_quarantined();
                if let Some(obs) = &self.observer {
                    report_failure(
                        obs.as_ref(),
                        path,
                        FileFailure::Quarantined(&reason),
                        self.alert_at_or_above,
                    );
                }
                return FileStatus::Quarantined(reason);
            }
        };

        self.metrics.on_rows_dropped(transformed.report.dropped.len() as u64);
        if let Some(obs) = &self.observer {
            obs.on_transformed(&transformed, severity_for_transform(&transformed.report));
        }

        match self.loader.load(&transformed, &self.config).await {
            Ok(outcome) => {
                self.metrics.on_archived(outcome.rows_loaded);
                if let Some(obs) = &self.observer {
                    obs.on_loaded(path, &outcome);
                }
                FileStatus::Archived(outcome)
            }
            Err(err) => {
                self.metrics.on_load_failed();
                if let Some(obs) = &self.observer {
                    report_failure(
                        obs.as_ref(),
                        path,
                        FileFailure::LoadFailed(&err),
                        self.alert_at_or_above,
                    );
                }
                FileStatus::LoadFailed(err)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

fn emit(events: &Option<Arc<dyn ExecutionObserver>>, event: ExecutionEvent) {
    if let Some(obs) = events {
        obs.on_event(&event);
    }
}
