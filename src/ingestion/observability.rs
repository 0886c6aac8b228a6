use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::{LoadError, QuarantineReason};
use crate::loading::LoadOutcome;
use crate::processing::{TransformReport, TransformedFile};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineSeverity {
    /// File transformed with every row kept.
    Info,
    /// File transformed but some rows were dropped.
    Warning,
    /// A file was quarantined.
    Error,
    /// Infrastructure failure (database, timeout, filesystem).
    Critical,
}

/// Severity of a successful transform: [`PipelineSeverity::Warning`] once any row was dropped.
pub fn severity_for_transform(report: &TransformReport) -> PipelineSeverity {
    if report.dropped.is_empty() {
        PipelineSeverity::Info
    } else {
        PipelineSeverity::Warning
    }
}

/// Severity of a quarantine reason.
pub fn severity_for_quarantine(reason: &QuarantineReason) -> PipelineSeverity {
    match reason {
        QuarantineReason::Artifact { .. } => PipelineSeverity::Critical,
        _ => PipelineSeverity::Error,
    }
}

/// Severity of a load failure.
pub fn severity_for_load(err: &LoadError) -> PipelineSeverity {
    match err {
        LoadError::InvalidTableName(_) => PipelineSeverity::Error,
        _ => PipelineSeverity::Critical,
    }
}

/// A per-file failure handed to observers.
#[derive(Debug, Clone, Copy)]
pub enum FileFailure<'a> {
    Quarantined(&'a QuarantineReason),
    LoadFailed(&'a LoadError),
}

impl FileFailure<'_> {
    pub fn severity(&self) -> PipelineSeverity {
        match self {
            Self::Quarantined(r) => severity_for_quarantine(r),
            Self::LoadFailed(e) => severity_for_load(e),
        }
    }
}

impl fmt::Display for FileFailure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quarantined(r) => write!(f, "quarantined ({}): {r}", r.kind()),
            Self::LoadFailed(e) => write!(f, "load failed ({}): {e}", e.kind()),
        }
    }
}

/// Observer interface for per-file pipeline outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait PipelineObserver: Send + Sync {
    /// Called when a file passed validation and its artifact was written.
    fn on_transformed(&self, _file: &TransformedFile, _severity: PipelineSeverity) {}

    /// Called when a file was loaded and archived.
    fn on_loaded(&self, _source: &Path, _outcome: &LoadOutcome) {}

    /// Called when a file was quarantined or its load failed.
    fn on_failure(&self, _source: &Path, _severity: PipelineSeverity, _failure: FileFailure<'_>) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, source: &Path, severity: PipelineSeverity, failure: FileFailure<'_>) {
        self.on_failure(source, severity, failure)
    }
}

/// Report a failure, escalating to `on_alert` at or above `alert_at_or_above`.
pub fn report_failure(
    observer: &dyn PipelineObserver,
    source: &Path,
    failure: FileFailure<'_>,
    alert_at_or_above: PipelineSeverity,
) {
    let sev = failure.severity();
    observer.on_failure(source, sev, failure);
    if sev >= alert_at_or_above {
        observer.on_alert(source, sev, failure);
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_transformed(&self, file: &TransformedFile, severity: PipelineSeverity) {
        for o in &self.observers {
            o.on_transformed(file, severity);
        }
    }

    fn on_loaded(&self, source: &Path, outcome: &LoadOutcome) {
        for o in &self.observers {
            o.on_loaded(source, outcome);
        }
    }

    fn on_failure(&self, source: &Path, severity: PipelineSeverity, failure: FileFailure<'_>) {
        for o in &self.observers {
            o.on_failure(source, severity, failure);
        }
    }

    fn on_alert(&self, source: &Path, severity: PipelineSeverity, failure: FileFailure<'_>) {
        for o in &self.observers {
            o.on_alert(source, severity, failure);
        }
    }
}

/// Emits pipeline events as `tracing` events under the `sales_ingest::pipeline` target.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_transformed(&self, file: &TransformedFile, severity: PipelineSeverity) {
        if severity >= PipelineSeverity::Warning {
            tracing::warn!(
                target: "sales_ingest::pipeline",
                file = %file.source.display(),
                kept = file.report.kept,
                dropped = file.report.dropped.len(),
                reasons = ?file.report.drop_counts(),
                "transformed with dropped rows"
            );
        } else {
            tracing::info!(
                target: "sales_ingest::pipeline",
                file = %file.source.display(),
                kept = file.report.kept,
                "transformed"
            );
        }
    }

    fn on_loaded(&self, source: &Path, outcome: &LoadOutcome) {
        tracing::info!(
            target: "sales_ingest::pipeline",
            file = %source.display(),
            rows = outcome.rows_loaded,
            archived_to = %outcome.archived_to.display(),
            "loaded"
        );
    }

    fn on_failure(&self, source: &Path, severity: PipelineSeverity, failure: FileFailure<'_>) {
        tracing::warn!(
            target: "sales_ingest::pipeline",
            file = %source.display(),
            severity = ?severity,
            "{failure}"
        );
    }

    fn on_alert(&self, source: &Path, severity: PipelineSeverity, failure: FileFailure<'_>) {
        tracing::error!(
            target: "sales_ingest::pipeline",
            file = %source.display(),
            severity = ?severity,
            alert = true,
            "{failure}"
        );
    }
}

/// Appends pipeline events to a local log file, one line per event.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl PipelineObserver for FileObserver {
    fn on_transformed(&self, file: &TransformedFile, severity: PipelineSeverity) {
        self.append_line(&format!(
            "{} transformed severity={:?} path={} kept={} dropped={}",
            Utc::now().to_rfc3339(),
            severity,
            file.source.display(),
            file.report.kept,
            file.report.dropped.len()
        ));
    }

    fn on_loaded(&self, source: &Path, outcome: &LoadOutcome) {
        self.append_line(&format!(
            "{} loaded path={} rows={} archived_to={}",
            Utc::now().to_rfc3339(),
            source.display(),
            outcome.rows_loaded,
            outcome.archived_to.display()
        ));
    }

    fn on_failure(&self, source: &Path, severity: PipelineSeverity, failure: FileFailure<'_>) {
        self.append_line(&format!(
            "{} fail severity={:?} path={} err={}",
            Utc::now().to_rfc3339(),
            severity,
            source.display(),
            failure
        ));
    }

    fn on_alert(&self, source: &Path, severity: PipelineSeverity, failure: FileFailure<'_>) {
        self.append_line(&format!(
            "{} ALERT severity={:?} path={} err={}",
            Utc::now().to_rfc3339(),
            severity,
            source.display(),
            failure
        ));
    }
}
