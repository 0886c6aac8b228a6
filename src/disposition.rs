//! Final placement of source files and reconstruction of their state.
//!
//! Directory membership is the durable record of each file's outcome: `archive/` means loaded,
//! `error/` means quarantined (with a `<file>.error.json` sidecar carrying the reason), and
//! anything still in `incoming/` is pending.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::ingestion::discovery::is_candidate;
use crate::types::{Disposition, FileRecord, Stage};

/// Suffix appended to a quarantined file's name for its reason sidecar.
pub const SIDECAR_SUFFIX: &str = ".error.json";

/// Contents of a quarantine sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineNote {
    /// Original file name.
    pub file: String,
    pub stage: Stage,
    /// Short machine-readable tag (e.g. `missing_columns`).
    pub kind: String,
    /// Human-readable reason.
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

/// Move a loaded source file into the archive directory.
pub fn archive(source: &Path, config: &PipelineConfig) -> io::Result<PathBuf> {
    let dest = move_into(source, &config.archive_dir)?;
    info!(file = %source.display(), dest = %dest.display(), "archived");
    Ok(dest)
}

/// Move a failed source file into the error directory and write its reason sidecar.
///
/// The sidecar is best-effort: failing to write it never undoes the move.
pub fn quarantine(
    source: &Path,
    config: &PipelineConfig,
    stage: Stage,
    kind: &str,
    reason: &str,
) -> io::Result<PathBuf> {
    let dest = move_into(source, &config.error_dir)?;

    let note = QuarantineNote {
        file: file_name(source),
        stage,
        kind: kind.to_string(),
        reason: reason.to_string(),
        quarantined_at: Utc::now(),
    };
    let sidecar = sidecar_path(&dest);
    match serde_json::to_vec_pretty(&note) {
        Ok(bytes) => {
            if let Err(e) = fs::write(&sidecar, bytes) {
                warn!(sidecar = %sidecar.display(), error = %e, "failed to write quarantine sidecar");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode quarantine sidecar"),
    }

    warn!(
        file = %source.display(),
        dest = %dest.display(),
        stage = ?stage,
        kind,
        reason,
        "quarantined"
    );
    Ok(dest)
}

/// Sidecar path for a quarantined file.
pub fn sidecar_path(quarantined: &Path) -> PathBuf {
    let mut name = quarantined
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(SIDECAR_SUFFIX);
    quarantined.with_file_name(name)
}

/// Read the sidecar written next to a quarantined file, if any.
pub fn read_note(quarantined: &Path) -> Option<QuarantineNote> {
    let bytes = fs::read(sidecar_path(quarantined)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Rebuild per-file records from the incoming, archive and error directories.
///
/// Missing directories contribute nothing. Records are sorted by path.
pub fn scan_dispositions(config: &PipelineConfig) -> io::Result<Vec<FileRecord>> {
    let mut out = Vec::new();
    for (dir, disposition) in [
        (&config.incoming_dir, Disposition::Pending),
        (&config.archive_dir, Disposition::Archived),
        (&config.error_dir, Disposition::Quarantined),
    ] {
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file() || !is_candidate(&path) {
                continue;
            }
            let discovered_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            let note = match disposition {
                Disposition::Quarantined => read_note(&path),
                _ => None,
            };
            out.push(FileRecord {
                path,
                discovered_at,
                disposition,
                reason: note.as_ref().map(|n| n.reason.clone()),
                failed_stage: note.map(|n| n.stage),
            });
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

/// Move `source` into `dir`, keeping its file name.
///
/// Same-filesystem moves are a single rename. Across filesystems the file is copied, then the
/// source removed; the copy is deleted again if the source cannot be removed, so the file never
/// ends up in both places.
fn move_into(source: &Path, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let dest = dir.join(source.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "source path has no file name")
    })?);

    match fs::rename(source, &dest) {
        Ok(()) => Ok(dest),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, &dest)?;
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(&dest);
                return Err(e);
            }
            Ok(dest)
        }
        Err(e) => Err(e),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
