//! Intermediate artifact: the clean dataset as CSV with a header of target column names.
//!
//! The loader streams this file verbatim into `COPY ... FROM STDIN WITH (FORMAT csv, HEADER true)`,
//! so the column order here must match [`crate::types::target_columns`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{CleanDataset, SalesRecord};

/// Artifact path for `source`: `<work_dir>/<source file name>.csv`.
///
/// The full file name (extension included) keeps `sales.xlsx` and `sales.XLSX` apart, so
/// concurrent transforms of different discovered files never share a path.
pub fn artifact_path(work_dir: &Path, source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    work_dir.join(format!("{name}.csv"))
}

/// Write `dataset` to `path`.
///
/// Data goes to a `.part` sibling first and is renamed into place, so a reader never sees a
/// half-written artifact. On error the `.part` file is removed.
pub fn write_artifact(path: &Path, dataset: &CleanDataset) -> csv::Result<()> {
    let mut part = path.as_os_str().to_os_string();
    part.push(".part");
    let part = PathBuf::from(part);

    let result = write_part(&part, dataset)
        .and_then(|()| fs::rename(&part, path).map_err(csv::Error::from));
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

fn write_part(part: &Path, dataset: &CleanDataset) -> csv::Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(part)?;
    if dataset.is_empty() {
        wtr.write_record(crate::types::target_columns())?;
    }
    for rec in &dataset.rows {
        wtr.serialize(rec)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read an artifact back into a [`CleanDataset`].
pub fn read_artifact(path: &Path) -> csv::Result<CleanDataset> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let rows = rdr
        .deserialize::<SalesRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CleanDataset::new(rows))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn artifact_path_uses_source_stem() {
        let p = artifact_path(Path::new("/work"), Path::new("/in/sales 2025-01.xlsx"));
        assert_eq!(p, PathBuf::from("/work/sales 2025-01.xlsx.csv"));
    }

    #[test]
    fn extension_case_variants_get_distinct_artifacts() {
        let lower = artifact_path(Path::new("/work"), Path::new("/in/sales.xlsx"));
        let upper = artifact_path(Path::new("/work"), Path::new("/in/sales.XLSX"));
        assert_ne!(lower, upper);
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        // The rename target is an existing directory, so the final step fails.
        let path = dir.path().join("a.xlsx.csv");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        assert!(write_artifact(&path, &CleanDataset::new(Vec::new())).is_err());
        assert!(!dir.path().join("a.xlsx.csv.part").exists());
    }

    #[test]
    fn header_and_null_brand_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        let ds = CleanDataset::new(vec![SalesRecord {
            id: 1,
            salescode: "SC001".into(),
            dateorder: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            totalsales: Decimal::new(1500050, 2),
            brand: None,
        }]);
        write_artifact(&path, &ds).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,salescode,dateorder,totalsales,brand"));
        assert_eq!(lines.next(), Some("1,SC001,2025-01-15,15000.50,"));
        assert!(!dir.path().join("a.csv.part").exists());

        assert_eq!(read_artifact(&path).unwrap(), ds);
    }
}
