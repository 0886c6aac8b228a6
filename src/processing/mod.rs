//! Validator/transformer stage.
//!
//! [`transform`] reads one spreadsheet, enforces the record contract and writes a load-ready
//! artifact, or quarantines the source file. It touches no state shared with other files, so
//! calls for different files may run concurrently.
//!
//! Row-level problems never fail a file: the row is dropped and reported in
//! [`TransformReport::dropped`]. File-level problems ([`QuarantineReason`]) move the source to
//! the error directory.
//!
//! ```no_run
//! use sales_ingest::config::PipelineConfig;
//! use sales_ingest::processing::transform;
//!
//! let config = PipelineConfig::from_base_dir("data");
//! match transform("data/incoming/sales_2025_01.xlsx", &config) {
//!     Ok(done) => println!("{} rows -> {}", done.report.kept, done.artifact.display()),
//!     Err(reason) => eprintln!("quarantined: {reason}"),
//! }
//! ```

pub mod artifact;
pub mod coerce;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::disposition;
use crate::error::{QuarantineReason, RowCoercionFailure, RowCoercionKind, TransformResult};
use crate::ingestion::excel::{SheetData, read_first_sheet};
use crate::types::{CleanDataset, KEY_COLUMN, SalesRecord, Stage};

pub use coerce::coerce_row;

/// Row accounting for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Non-empty data rows read from the sheet.
    pub total_rows: usize,
    /// Rows in the clean dataset.
    pub kept: usize,
    /// Every dropped row with its reason.
    pub dropped: Vec<RowCoercionFailure>,
}

impl TransformReport {
    /// Dropped-row counts grouped by reason.
    pub fn drop_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut out = BTreeMap::new();
        for f in &self.dropped {
            *out.entry(f.kind.as_str()).or_insert(0) += 1;
        }
        out
    }

    /// Fraction of rows dropped, `0.0` for an empty sheet.
    pub fn drop_ratio(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.dropped.len() as f64 / self.total_rows as f64
        }
    }
}

/// Successful transform: where the artifact is and what happened to the rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedFile {
    /// Source spreadsheet, still in incoming.
    pub source: PathBuf,
    /// Intermediate CSV for the loader.
    pub artifact: PathBuf,
    pub report: TransformReport,
}

/// Validate and transform one spreadsheet.
///
/// On success the artifact is written to `config.work_dir` and the source stays where it is.
/// On any file-level failure the source is moved to `config.error_dir` (with a reason sidecar)
/// and no artifact exists. Never both.
pub fn transform(path: impl AsRef<Path>, config: &PipelineConfig) -> TransformResult<TransformedFile> {
    let path = path.as_ref();
    match transform_inner(path, config) {
        Ok(done) => Ok(done),
        Err(reason) => {
            if let Err(e) =
                disposition::quarantine(path, config, Stage::Transform, reason.kind(), &reason.to_string())
            {
                tracing::error!(
                    file = %path.display(),
                    error = %e,
                    "failed to move file to quarantine"
                );
            }
            Err(reason)
        }
    }
}

fn transform_inner(path: &Path, config: &PipelineConfig) -> TransformResult<TransformedFile> {
    let (dataset, report) = validate(path, config.max_drop_ratio)?;

    let artifact = artifact::artifact_path(&config.work_dir, path);
    std::fs::create_dir_all(&config.work_dir)
        .map_err(|e| QuarantineReason::Artifact { message: e.to_string() })?;
    artifact::write_artifact(&artifact, &dataset)
        .map_err(|e| QuarantineReason::Artifact { message: e.to_string() })?;

    info!(
        file = %path.display(),
        artifact = %artifact.display(),
        rows = report.kept,
        dropped = report.dropped.len(),
        "transform ok"
    );
    Ok(TransformedFile {
        source: path.to_path_buf(),
        artifact,
        report,
    })
}

/// Read and validate a spreadsheet without touching the filesystem beyond reading it.
///
/// `max_drop_ratio` of `None` accepts any file with at least one surviving row.
pub fn validate(
    path: &Path,
    max_drop_ratio: Option<f64>,
) -> TransformResult<(CleanDataset, TransformReport)> {
    let sheet = read_first_sheet(path)?;
    debug!(
        file = %path.display(),
        sheet = %sheet.sheet,
        rows = sheet.rows.len(),
        "read sheet"
    );

    let (dataset, report) = clean_rows(&sheet);

    if !report.dropped.is_empty() {
        warn!(
            file = %path.display(),
            dropped = report.dropped.len(),
            total = report.total_rows,
            reasons = ?report.drop_counts(),
            "dropped invalid rows"
        );
        for f in &report.dropped {
            debug!(file = %path.display(), "{f}");
        }
    }

    if dataset.is_empty() {
        return Err(QuarantineReason::EmptyAfterValidation {
            total_rows: report.total_rows,
        });
    }
    if let Some(max) = max_drop_ratio {
        let ratio = report.drop_ratio();
        if ratio > max {
            return Err(QuarantineReason::DropRatioExceeded {
                dropped: report.dropped.len(),
                total_rows: report.total_rows,
                ratio,
                max,
            });
        }
    }
    Ok((dataset, report))
}

/// Coerce every row (in parallel, order preserved) and apply the drop policy.
///
/// When an identifier repeats inside the file the last occurrence wins and earlier ones are
/// reported as [`RowCoercionKind::DuplicateIdentifier`].
fn clean_rows(sheet: &SheetData) -> (CleanDataset, TransformReport) {
    let coerced: Vec<(usize, Result<SalesRecord, RowCoercionFailure>)> = sheet
        .rows
        .par_iter()
        .map(|raw| (raw.row, coerce_row(raw)))
        .collect();

    let mut dropped = Vec::new();
    let mut slots: Vec<Option<(usize, SalesRecord)>> = Vec::with_capacity(coerced.len());
    let mut by_id: HashMap<i64, usize> = HashMap::new();

    for (row, result) in coerced {
        match result {
            Ok(rec) => {
                if let Some(prev) = by_id.insert(rec.id, slots.len()) {
                    if let Some((prev_row, prev_rec)) = slots[prev].take() {
                        dropped.push(RowCoercionFailure {
                            row: prev_row,
                            column: KEY_COLUMN,
                            kind: RowCoercionKind::DuplicateIdentifier,
                            raw: prev_rec.id.to_string(),
                        });
                    }
                }
                slots.push(Some((row, rec)));
            }
            Err(f) => dropped.push(f),
        }
    }

    let rows: Vec<SalesRecord> = slots.into_iter().flatten().map(|(_, rec)| rec).collect();
    dropped.sort_by_key(|f| f.row);

    let report = TransformReport {
        total_rows: sheet.rows.len(),
        kept: rows.len(),
        dropped,
    };
    (CleanDataset::new(rows), report)
}
