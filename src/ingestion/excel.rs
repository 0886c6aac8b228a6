use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};

use crate::error::{QuarantineReason, TransformResult};
use crate::types::{ColumnSpec, RECORD_SCHEMA};

/// First sheet of a workbook, with the header row located and projected onto
/// [`RECORD_SCHEMA`].
#[derive(Debug, Clone)]
pub struct SheetData {
    /// Name of the sheet that was read.
    pub sheet: String,
    /// Header cells as strings, in sheet order.
    pub headers: Vec<String>,
    /// Data rows below the header, projected to schema order.
    pub rows: Vec<RawRow>,
}

/// One data row, cells in [`RECORD_SCHEMA`] order.
///
/// Optional columns absent from the header are [`Data::Empty`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based sheet row number (Excel-like).
    pub row: usize,
    pub cells: Vec<Data>,
}

impl RawRow {
    /// Cell for a schema column.
    pub fn cell(&self, col: &ColumnSpec) -> &Data {
        RECORD_SCHEMA
            .iter()
            .position(|c| c.source == col.source)
            .and_then(|idx| self.cells.get(idx))
            .unwrap_or(&Data::Empty)
    }
}

/// Read the first sheet of the workbook at `path`.
///
/// Behavior:
/// - the first non-empty row is the header row
/// - every required source column must match a header cell exactly (case-sensitive)
/// - extra columns are ignored, `brand` may be absent
/// - rows whose projected cells are all empty are skipped
pub fn read_first_sheet(path: impl AsRef<Path>) -> TransformResult<SheetData> {
    let mut workbook = open_workbook_auto(path).map_err(unreadable)?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| QuarantineReason::Unreadable {
            message: "workbook has no sheets".to_string(),
        })?;
    let range = workbook.worksheet_range(&sheet).map_err(unreadable)?;

    let (header_row_idx, headers) = find_header_row(&range)?;
    let col_idxs = project_columns(&headers)?;

    let mut rows = Vec::new();
    for (idx0, row) in range.rows().enumerate() {
        if idx0 <= header_row_idx {
            continue;
        }
        let cells: Vec<Data> = col_idxs
            .iter()
            .map(|idx| {
                idx.and_then(|i| row.get(i))
                    .cloned()
                    .unwrap_or(Data::Empty)
            })
            .collect();
        if cells.iter().all(is_blank) {
            continue;
        }
        rows.push(RawRow {
            // `range.rows()` starts at the range origin, which is not always A1.
            row: range.start().map(|(r, _)| r as usize).unwrap_or(0) + idx0 + 1,
            cells,
        });
    }

    Ok(SheetData {
        sheet,
        headers,
        rows,
    })
}

fn unreadable(e: calamine::Error) -> QuarantineReason {
    QuarantineReason::Unreadable {
        message: e.to_string(),
    }
}

fn find_header_row(range: &Range<Data>) -> TransformResult<(usize, Vec<String>)> {
    range
        .rows()
        .enumerate()
        .find(|(_, row)| row.iter().any(|c| !is_blank(c)))
        .map(|(idx0, row)| (idx0, row.iter().map(cell_to_header_string).collect()))
        .ok_or(QuarantineReason::NoHeaderRow)
}

/// Map each schema column to its header index.
///
/// Missing required columns are collected so the error names all of them at once.
pub fn project_columns(headers: &[String]) -> TransformResult<Vec<Option<usize>>> {
    let mut col_idxs = Vec::with_capacity(RECORD_SCHEMA.len());
    let mut missing = Vec::new();
    for col in &RECORD_SCHEMA {
        let idx = headers.iter().position(|h| h == col.source);
        if idx.is_none() && col.required {
            missing.push(col.source.to_string());
        }
        col_idxs.push(idx);
    }

    if !missing.is_empty() {
        return Err(QuarantineReason::MissingColumns {
            missing,
            headers: headers.to_vec(),
        });
    }
    Ok(col_idxs)
}

fn is_blank(c: &Data) -> bool {
    match c {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn projection_tolerates_missing_brand_and_extra_columns() {
        let idxs = project_columns(&headers(&[
            "extra",
            "amount_total",
            "id",
            "date_order",
            "name_sales_code",
        ]))
        .unwrap();
        assert_eq!(idxs, vec![Some(2), Some(4), Some(3), Some(1), None]);
    }

    #[test]
    fn projection_reports_every_missing_column() {
        let err = project_columns(&headers(&["ID", "name_sales_code", "brand"])).unwrap_err();
        match err {
            QuarantineReason::MissingColumns { missing, .. } => {
                assert_eq!(missing, vec!["id", "date_order", "amount_total"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn raw_row_cell_lookup() {
        let row = RawRow {
            row: 2,
            cells: vec![
                Data::Int(7),
                Data::String("SC".into()),
                Data::Empty,
                Data::Float(1.5),
                Data::Empty,
            ],
        };
        assert_eq!(row.cell(&RECORD_SCHEMA[0]), &Data::Int(7));
        assert_eq!(row.cell(&RECORD_SCHEMA[3]), &Data::Float(1.5));
    }
}
