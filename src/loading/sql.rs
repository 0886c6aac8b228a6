//! SQL for the staging-table load.
//!
//! Table names are interpolated, so every name passes [`is_safe_table_name`] or is built from
//! `[a-z0-9_]` only.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::is_safe_table_name;
use crate::error::LoadError;
use crate::types::{ColumnType, KEY_COLUMN, RECORD_SCHEMA, target_columns};

// Postgres truncates identifiers beyond this length.
const MAX_IDENTIFIER_LEN: usize = 63;

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Every statement one load runs, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStatements {
    pub staging_table: String,
    pub create_staging: String,
    pub copy_into_staging: String,
    pub upsert: String,
    pub drop_staging: String,
}

impl LoadStatements {
    /// Build the statements for loading `source` into `target_table`.
    pub fn new(target_table: &str, source: &Path) -> Result<Self, LoadError> {
        if !is_safe_table_name(target_table) {
            return Err(LoadError::InvalidTableName(target_table.to_string()));
        }
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let staging = staging_table_name(target_table, source, seq);
        Ok(Self {
            create_staging: create_staging_sql(&staging),
            copy_into_staging: copy_sql(&staging),
            upsert: upsert_sql(target_table, &staging),
            drop_staging: format!("DROP TABLE IF EXISTS {staging}"),
            staging_table: staging,
        })
    }
}

/// `stg_<table>_<file stem>_<pid>_<seq>`, lowercased with anything outside `[a-z0-9_]` replaced.
///
/// The pid/sequence suffix keeps concurrent loads of same-named files apart; temp tables are
/// session-local in any case.
pub fn staging_table_name(target_table: &str, source: &Path, seq: u64) -> String {
    let table = target_table.rsplit('.').next().unwrap_or(target_table);
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = format!("_{}_{seq}", std::process::id());

    let mut name = sanitize(&format!("stg_{table}_{stem}"));
    name.truncate(MAX_IDENTIFIER_LEN - suffix.len());
    name.push_str(&suffix);
    name
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }
        })
        .collect()
}

fn sql_type(t: ColumnType) -> &'static str {
    match t {
        ColumnType::Int64 => "BIGINT",
        ColumnType::Text => "TEXT",
        ColumnType::Date => "DATE",
        ColumnType::Decimal2 => "NUMERIC(15,2)",
    }
}

fn column_list() -> String {
    target_columns().collect::<Vec<_>>().join(", ")
}

/// Transaction-scoped staging table with the target's column shape.
pub fn create_staging_sql(staging: &str) -> String {
    let cols = RECORD_SCHEMA
        .iter()
        .map(|c| format!("{} {}", c.target, sql_type(c.column_type)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TEMP TABLE {staging} ({cols}) ON COMMIT DROP")
}

/// Bulk copy of the CSV artifact (header row included) into staging.
pub fn copy_sql(staging: &str) -> String {
    format!(
        "COPY {staging} ({}) FROM STDIN WITH (FORMAT csv, HEADER true)",
        column_list()
    )
}

/// Insert every staging row; on key conflict overwrite all non-key columns.
pub fn upsert_sql(target: &str, staging: &str) -> String {
    let cols = column_list();
    let updates = target_columns()
        .filter(|c| *c != KEY_COLUMN)
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {target} ({cols}) SELECT {cols} FROM {staging} \
         ON CONFLICT ({KEY_COLUMN}) DO UPDATE SET {updates}"
    )
}
