use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience result type for discovery.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Convenience result type for the transform stage.
pub type TransformResult<T> = Result<T, QuarantineReason>;

/// Convenience result type for the load stage.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors returned by [`crate::ingestion::discover`].
///
/// These are run-level failures: they stop the whole run, never a single file.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No qualifying spreadsheet was found in the incoming directory.
    #[error("no input files: no .xlsx files found in {}", dir.display())]
    NoInputFiles { dir: PathBuf },

    /// The incoming directory could not be listed.
    #[error("failed to list {}: {source}", dir.display())]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File-level reason for routing a spreadsheet to quarantine.
///
/// Returned by [`crate::processing::transform`]; the source file has already been moved to the
/// error location when a caller sees one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuarantineReason {
    /// One or more required source columns are absent from the header row.
    #[error("missing columns: {missing:?} (found headers: {headers:?})")]
    MissingColumns {
        missing: Vec<String>,
        headers: Vec<String>,
    },

    /// The workbook could not be opened or its first sheet could not be read.
    #[error("unreadable workbook: {message}")]
    Unreadable { message: String },

    /// The first sheet contains no non-empty row to use as a header.
    #[error("no header row: first sheet has no non-empty rows")]
    NoHeaderRow,

    /// Every data row was dropped by row-level coercion.
    #[error("empty after validation: all {total_rows} row(s) dropped")]
    EmptyAfterValidation { total_rows: usize },

    /// Too many rows were dropped relative to the configured threshold.
    #[error("drop ratio {ratio:.3} exceeds configured maximum {max:.3} ({dropped}/{total_rows} rows dropped)")]
    DropRatioExceeded {
        dropped: usize,
        total_rows: usize,
        ratio: f64,
        max: f64,
    },

    /// The intermediate artifact could not be written.
    #[error("failed to write intermediate artifact: {message}")]
    Artifact { message: String },
}

impl QuarantineReason {
    /// Short machine-readable tag used in logs and quarantine sidecars.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingColumns { .. } => "missing_columns",
            Self::Unreadable { .. } => "unreadable",
            Self::NoHeaderRow => "no_header_row",
            Self::EmptyAfterValidation { .. } => "empty_after_validation",
            Self::DropRatioExceeded { .. } => "drop_ratio_exceeded",
            Self::Artifact { .. } => "artifact",
        }
    }
}

/// Why a single row was excluded from the clean dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowCoercionKind {
    /// `id` absent or not an integer.
    InvalidIdentifier,
    /// `name_sales_code` absent or blank after trimming.
    EmptySalesCode,
    /// `date_order` absent or not a date.
    InvalidOrderDate,
    /// `amount_total` does not fit the target's `NUMERIC(15,2)`.
    AmountOutOfRange,
    /// A later row in the same file carries the same `id`.
    DuplicateIdentifier,
}

impl RowCoercionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier => "invalid_identifier",
            Self::EmptySalesCode => "empty_sales_code",
            Self::InvalidOrderDate => "invalid_order_date",
            Self::AmountOutOfRange => "amount_out_of_range",
            Self::DuplicateIdentifier => "duplicate_identifier",
        }
    }
}

/// Row-level coercion failure.
///
/// These are absorbed by the transformer: the row is dropped, counted and logged, and the file
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}: {} in column '{column}' (raw='{raw}')", kind.as_str())]
pub struct RowCoercionFailure {
    /// 1-based sheet row number (Excel-like).
    pub row: usize,
    pub column: &'static str,
    pub kind: RowCoercionKind,
    pub raw: String,
}

/// File-level failure of [`crate::loading::load`].
///
/// The transaction has been rolled back by the time this is returned; the source file is never
/// archived.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Connection loss, constraint violation, COPY failure, etc.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The staging copy + upsert did not finish within the configured bound.
    #[error("load timed out after {after:?}")]
    Timeout { after: Duration },

    /// The intermediate artifact could not be read.
    #[error("failed to read artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The commit succeeded but the source file could not be moved to the archive.
    #[error("committed but failed to archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured target table is not a safe SQL identifier.
    #[error("invalid table name '{0}'")]
    InvalidTableName(String),
}

impl LoadError {
    /// Short machine-readable tag used in logs and quarantine sidecars.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Timeout { .. } => "timeout",
            Self::Artifact { .. } => "artifact",
            Self::Archive { .. } => "archive",
            Self::InvalidTableName(_) => "invalid_table_name",
        }
    }

    /// False for configuration errors that say nothing about the file itself; such files stay
    /// in incoming instead of being quarantined.
    pub fn quarantines_source(&self) -> bool {
        !matches!(self, Self::InvalidTableName(_))
    }

    /// True for failures that are likely to succeed on a later run without changing the file.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Archive { .. } => true,
            Self::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            Self::Artifact { .. } | Self::InvalidTableName(_) => false,
        }
    }
}

/// Invalid or unreadable [`crate::config::PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
