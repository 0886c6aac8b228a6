//! Incoming-directory scan.

use std::path::{Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

use crate::error::{DiscoveryError, DiscoveryResult};

/// Spreadsheet extension accepted by discovery (matched case-insensitively).
pub const SPREADSHEET_EXTENSION: &str = "xlsx";

/// Filename prefix of the lock files spreadsheet editors keep next to an open workbook.
pub const LOCK_FILE_PREFIX: &str = "~$";

/// List the spreadsheets in `dir` that are ready for processing.
///
/// Rules:
///
/// - only regular files directly inside `dir` (no recursion)
/// - extension `.xlsx`, any case
/// - names starting with `~$` are skipped
/// - result is sorted lexicographically by path
///
/// Fails with [`DiscoveryError::NoInputFiles`] when nothing qualifies. Reads directory entries
/// only; nothing is created or moved.
pub fn discover(dir: impl AsRef<Path>) -> DiscoveryResult<Vec<PathBuf>> {
    let dir = dir.as_ref();

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| DiscoveryError::Io {
            dir: dir.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_candidate(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    files.dedup();

    info!(
        dir = %dir.display(),
        count = files.len(),
        files = ?files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        "discovered input files"
    );

    if files.is_empty() {
        return Err(DiscoveryError::NoInputFiles {
            dir: dir.to_path_buf(),
        });
    }
    Ok(files)
}

/// Filename filter applied by [`discover`].
pub fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with(LOCK_FILE_PREFIX) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SPREADSHEET_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::is_candidate;
    use std::path::Path;

    #[test]
    fn filename_filter() {
        assert!(is_candidate(Path::new("in/sales_2025.xlsx")));
        assert!(is_candidate(Path::new("in/SALES.XLSX")));
        assert!(!is_candidate(Path::new("in/~$sales_2025.xlsx")));
        assert!(!is_candidate(Path::new("in/sales.csv")));
        assert!(!is_candidate(Path::new("in/sales.xls")));
        assert!(!is_candidate(Path::new("in/xlsx")));
    }
}
