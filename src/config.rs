//! Explicit pipeline configuration.
//!
//! A [`PipelineConfig`] is built once (from a base directory, a TOML file, or the environment)
//! and handed to each operation. Nothing in the crate reads process-wide settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default target table.
pub const DEFAULT_TABLE: &str = "sales_daily";

/// Default bound on one file's staging copy + upsert.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Paths, target table and limits for one pipeline deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directory scanned by discovery. The pipeline never writes here.
    pub incoming_dir: PathBuf,
    /// Destination for successfully loaded source files.
    pub archive_dir: PathBuf,
    /// Quarantine destination for files that failed validation or loading.
    pub error_dir: PathBuf,
    /// Scratch directory for intermediate artifacts.
    pub work_dir: PathBuf,
    /// Target table, optionally schema-qualified (`schema.table`).
    pub target_table: String,
    /// Upper bound on staging copy + upsert + commit for one file.
    pub load_timeout: Duration,
    /// Quarantine a file when `dropped / total` exceeds this ratio.
    ///
    /// `None` keeps the permissive behavior: any file with at least one valid row proceeds.
    pub max_drop_ratio: Option<f64>,
    /// Number of files processed concurrently by the worker pool.
    pub max_workers: usize,
}

impl PipelineConfig {
    /// Derive the standard `incoming/`, `archive/`, `error/` and `work/` layout under `base`.
    pub fn from_base_dir(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            incoming_dir: base.join("incoming"),
            archive_dir: base.join("archive"),
            error_dir: base.join("error"),
            work_dir: base.join("work"),
            target_table: DEFAULT_TABLE.to_string(),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            max_drop_ratio: None,
            max_workers: default_workers(),
        }
    }

    /// Load a config from a TOML file.
    ///
    /// ```toml
    /// base_dir = "/opt/ingest/data"
    /// target_table = "sales_daily"
    /// load_timeout_secs = 120
    /// max_workers = 4
    /// # error_dir = "/mnt/quarantine"
    /// # max_drop_ratio = 0.5
    /// ```
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = file.into_config();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a config from `SALES_INGEST_*` environment variables.
    ///
    /// `SALES_INGEST_BASE_DIR` (default `./data`) sets the layout; `_INCOMING_DIR`,
    /// `_ARCHIVE_DIR`, `_ERROR_DIR`, `_WORK_DIR`, `_TABLE`, `_LOAD_TIMEOUT_SECS`,
    /// `_MAX_DROP_RATIO` and `_WORKERS` override individual values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base = lookup("SALES_INGEST_BASE_DIR").unwrap_or_else(|| "data".to_string());
        let mut cfg = Self::from_base_dir(base);

        if let Some(v) = lookup("SALES_INGEST_INCOMING_DIR") {
            cfg.incoming_dir = v.into();
        }
        if let Some(v) = lookup("SALES_INGEST_ARCHIVE_DIR") {
            cfg.archive_dir = v.into();
        }
        if let Some(v) = lookup("SALES_INGEST_ERROR_DIR") {
            cfg.error_dir = v.into();
        }
        if let Some(v) = lookup("SALES_INGEST_WORK_DIR") {
            cfg.work_dir = v.into();
        }
        if let Some(v) = lookup("SALES_INGEST_TABLE") {
            cfg.target_table = v;
        }
        if let Some(v) = lookup("SALES_INGEST_LOAD_TIMEOUT_SECS") {
            cfg.load_timeout = Duration::from_secs(parse_number("load_timeout_secs", &v)?);
        }
        if let Some(v) = lookup("SALES_INGEST_MAX_DROP_RATIO") {
            cfg.max_drop_ratio = Some(parse_number("max_drop_ratio", &v)?);
        }
        if let Some(v) = lookup("SALES_INGEST_WORKERS") {
            cfg.max_workers = parse_number("max_workers", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make an operation unsafe or meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_safe_table_name(&self.target_table) {
            return Err(ConfigError::Invalid {
                key: "target_table",
                message: format!(
                    "'{}' must be [A-Za-z_][A-Za-z0-9_]*, optionally schema-qualified",
                    self.target_table
                ),
            });
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid {
                key: "max_workers",
                message: "must be > 0".to_string(),
            });
        }
        if self.load_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "load_timeout",
                message: "must be > 0".to_string(),
            });
        }
        if let Some(r) = self.max_drop_ratio {
            if !(0.0..=1.0).contains(&r) {
                return Err(ConfigError::Invalid {
                    key: "max_drop_ratio",
                    message: format!("{r} is outside [0, 1]"),
                });
            }
        }
        Ok(())
    }

    /// Create every directory the pipeline reads from or writes to.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.incoming_dir,
            &self.archive_dir,
            &self.error_dir,
            &self.work_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Accepts `table` or `schema.table`, each part a plain unquoted identifier.
pub fn is_safe_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2 && parts.iter().all(|p| is_plain_identifier(p))
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        message: format!("'{raw}': {e}"),
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_dir: Option<PathBuf>,
    incoming_dir: Option<PathBuf>,
    archive_dir: Option<PathBuf>,
    error_dir: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    target_table: Option<String>,
    load_timeout_secs: Option<u64>,
    max_drop_ratio: Option<f64>,
    max_workers: Option<usize>,
}

impl ConfigFile {
    fn into_config(self) -> PipelineConfig {
        let base = self.base_dir.unwrap_or_else(|| PathBuf::from("data"));
        let mut cfg = PipelineConfig::from_base_dir(base);
        if let Some(p) = self.incoming_dir {
            cfg.incoming_dir = p;
        }
        if let Some(p) = self.archive_dir {
            cfg.archive_dir = p;
        }
        if let Some(p) = self.error_dir {
            cfg.error_dir = p;
        }
        if let Some(p) = self.work_dir {
            cfg.work_dir = p;
        }
        if let Some(t) = self.target_table {
            cfg.target_table = t;
        }
        if let Some(secs) = self.load_timeout_secs {
            cfg.load_timeout = Duration::from_secs(secs);
        }
        cfg.max_drop_ratio = self.max_drop_ratio;
        if let Some(n) = self.max_workers {
            cfg.max_workers = n;
        }
        cfg
    }
}
