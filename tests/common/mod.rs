#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use sales_ingest::config::PipelineConfig;
use tempfile::TempDir;

/// One spreadsheet cell.
#[derive(Debug, Clone, Copy)]
pub enum Cell<'a> {
    Num(f64),
    Str(&'a str),
    Date(u16, u8, u8),
    Empty,
}

pub const HEADERS: [&str; 5] = ["id", "name_sales_code", "date_order", "amount_total", "brand"];

/// Scratch pipeline layout under a temp dir; directories are created.
pub fn layout() -> (TempDir, PipelineConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::from_base_dir(dir.path());
    config.ensure_dirs().unwrap();
    (dir, config)
}

/// Write a single-sheet workbook at `path` with `headers` on row 1.
pub fn write_xlsx(path: &Path, headers: &[&str], rows: &[Vec<Cell<'_>>]) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Sheet1").unwrap();
    let date_fmt = Format::new().set_num_format("yyyy-mm-dd");

    for (c, h) in headers.iter().enumerate() {
        ws.write_string(0, c as u16, *h).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        let r = r as u32 + 1;
        for (c, cell) in row.iter().enumerate() {
            let c = c as u16;
            match *cell {
                Cell::Num(v) => {
                    ws.write_number(r, c, v).unwrap();
                }
                Cell::Str(s) => {
                    ws.write_string(r, c, s).unwrap();
                }
                Cell::Date(y, m, d) => {
                    let dt = ExcelDateTime::from_ymd(y, m, d).unwrap();
                    ws.write_datetime_with_format(r, c, &dt, &date_fmt).unwrap();
                }
                Cell::Empty => {}
            }
        }
    }
    wb.save(path).unwrap();
}

/// The two-row workbook used by the end-to-end scenario: row `id=2` has a blank sales code.
pub fn write_scenario(path: &Path) {
    write_xlsx(
        path,
        &HEADERS,
        &[
            vec![
                Cell::Num(1.0),
                Cell::Str(" SC001 "),
                Cell::Date(2025, 1, 15),
                Cell::Num(15000.5),
                Cell::Str("BrandA"),
            ],
            vec![
                Cell::Num(2.0),
                Cell::Str(""),
                Cell::Date(2025, 1, 16),
                Cell::Num(22500.0),
                Cell::Str(""),
            ],
        ],
    );
}

/// A valid one-row workbook for `id`.
pub fn write_single(path: &Path, id: i64, code: &str) {
    write_xlsx(
        path,
        &HEADERS,
        &[vec![
            Cell::Num(id as f64),
            Cell::Str(code),
            Cell::Date(2025, 3, 1),
            Cell::Num(10.0),
            Cell::Empty,
        ]],
    );
}

/// File names directly inside `dir`, sorted.
pub fn names_in(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    out.sort();
    out
}

pub fn incoming(config: &PipelineConfig, name: &str) -> PathBuf {
    config.incoming_dir.join(name)
}
