//! Core data model: the record contract between spreadsheet and table, the clean rows that
//! satisfy it, and the per-file processing record.
//!
//! The contract is static ([`RECORD_SCHEMA`]) and is checked at the top of every transform.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Logical type of a target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int64,
    /// Trimmed UTF-8 text.
    Text,
    /// Calendar date without time component.
    Date,
    /// Decimal with two fractional digits.
    Decimal2,
}

/// One column of the record contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Header name in the spreadsheet (exact, case-sensitive).
    pub source: &'static str,
    /// Column name in the target table.
    pub target: &'static str,
    pub column_type: ColumnType,
    /// Whether the source column must be present in the header row.
    pub required: bool,
    /// Whether the target column accepts null.
    pub nullable: bool,
}

/// Source -> target contract, in target column order.
pub const RECORD_SCHEMA: [ColumnSpec; 5] = [
    ColumnSpec {
        source: "id",
        target: "id",
        column_type: ColumnType::Int64,
        required: true,
        nullable: false,
    },
    ColumnSpec {
        source: "name_sales_code",
        target: "salescode",
        column_type: ColumnType::Text,
        required: true,
        nullable: false,
    },
    ColumnSpec {
        source: "date_order",
        target: "dateorder",
        column_type: ColumnType::Date,
        required: true,
        nullable: false,
    },
    ColumnSpec {
        source: "amount_total",
        target: "totalsales",
        column_type: ColumnType::Decimal2,
        required: true,
        nullable: false,
    },
    ColumnSpec {
        source: "brand",
        target: "brand",
        column_type: ColumnType::Text,
        required: false,
        nullable: true,
    },
];

/// Name of the natural key used for the upsert.
pub const KEY_COLUMN: &str = "id";

/// Source column names that must appear in the header row.
pub fn required_source_columns() -> impl Iterator<Item = &'static str> {
    RECORD_SCHEMA.iter().filter(|c| c.required).map(|c| c.source)
}

/// Target column names in table order.
pub fn target_columns() -> impl Iterator<Item = &'static str> {
    RECORD_SCHEMA.iter().map(|c| c.target)
}

/// A row that satisfies every constraint of [`RECORD_SCHEMA`].
///
/// Serialized with target column names; this is the header of the intermediate artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub id: i64,
    pub salescode: String,
    pub dateorder: NaiveDate,
    pub totalsales: Decimal,
    pub brand: Option<String>,
}

/// Rows that passed row- and file-level validation, ready for loading.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CleanDataset {
    pub rows: Vec<SalesRecord>,
}

impl CleanDataset {
    pub fn new(rows: Vec<SalesRecord>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Where a file currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Still in incoming.
    Pending,
    /// Loaded and moved to the archive.
    Archived,
    /// Moved to the error location.
    Quarantined,
}

/// Processing stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transform,
    Load,
}

/// Ephemeral per-file record, reconstructed from directory state.
///
/// See [`crate::disposition::scan_dispositions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Current location of the file.
    pub path: PathBuf,
    /// File modification time, used as the discovery timestamp.
    pub discovered_at: Option<DateTime<Utc>>,
    pub disposition: Disposition,
    /// Human-readable failure reason for quarantined files, when a sidecar is present.
    pub reason: Option<String>,
    pub failed_stage: Option<Stage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_columns_exclude_brand() {
        let required: Vec<_> = required_source_columns().collect();
        assert_eq!(required, vec!["id", "name_sales_code", "date_order", "amount_total"]);
    }

    #[test]
    fn target_columns_follow_table_order() {
        let cols: Vec<_> = target_columns().collect();
        assert_eq!(cols, vec!["id", "salescode", "dateorder", "totalsales", "brand"]);
        assert_eq!(RECORD_SCHEMA[0].target, KEY_COLUMN);
    }
}
