//! Bulk loader stage: staging table, `COPY`, upsert, commit, archive.
//!
//! One [`load`] call is one transaction. Either every row of the file is applied or none is;
//! there is no transaction shared between files.

pub mod sql;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::disposition;
use crate::error::{LoadError, LoadResult};
use crate::processing::TransformedFile;
use crate::types::Stage;

pub use sql::LoadStatements;

/// Result of a committed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Rows bulk-copied into staging.
    pub rows_copied: u64,
    /// Rows inserted or updated in the target table.
    pub rows_loaded: u64,
    /// Where the source file was archived.
    pub archived_to: PathBuf,
    pub elapsed: Duration,
}

/// Postgres pool sized for `max_workers` concurrent loads.
pub async fn connect(database_url: &str, max_workers: usize) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_workers.max(1) as u32)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
}

/// Load a transformed file and archive its source.
pub async fn load(
    transformed: &TransformedFile,
    pool: &PgPool,
    config: &PipelineConfig,
) -> LoadResult<LoadOutcome> {
    load_artifact(&transformed.artifact, &transformed.source, pool, config).await
}

/// Load the CSV artifact at `artifact` into `config.target_table` and archive `source`.
///
/// Steps: temp staging table, `COPY` of the artifact, `INSERT ... ON CONFLICT (id) DO UPDATE`,
/// commit, all bounded by `config.load_timeout`. The artifact is deleted afterwards whatever
/// the outcome.
///
/// On failure the transaction is rolled back and the error is returned. Failures tied to the
/// file move the source to quarantine with a `load` sidecar; configuration errors
/// ([`LoadError::InvalidTableName`]) leave it in incoming. If the returned future is dropped
/// before completion the transaction rolls back and the source stays where it was.
pub async fn load_artifact(
    artifact: &Path,
    source: &Path,
    pool: &PgPool,
    config: &PipelineConfig,
) -> LoadResult<LoadOutcome> {
    let _cleanup = ArtifactGuard(artifact.to_path_buf());
    let start = Instant::now();

    let result = copy_and_upsert(artifact, source, pool, config).await;
    match result {
        Ok((rows_copied, rows_loaded)) => {
            let archived_to =
                disposition::archive(source, config).map_err(|e| LoadError::Archive {
                    path: source.to_path_buf(),
                    source: e,
                })?;
            let elapsed = start.elapsed();
            info!(
                file = %source.display(),
                table = %config.target_table,
                rows_copied,
                rows_loaded,
                elapsed_ms = elapsed.as_millis() as u64,
                "load ok"
            );
            Ok(LoadOutcome {
                rows_copied,
                rows_loaded,
                archived_to,
                elapsed,
            })
        }
        Err(err) => {
            warn!(
                file = %source.display(),
                error = %err,
                transient = err.is_transient(),
                "load failed; transaction rolled back"
            );
            if !err.quarantines_source() {
                warn!(file = %source.display(), "configuration error; source left in place");
            } else if let Err(e) =
                disposition::quarantine(source, config, Stage::Load, err.kind(), &err.to_string())
            {
                tracing::error!(file = %source.display(), error = %e, "failed to move file to quarantine");
            }
            Err(err)
        }
    }
}

async fn copy_and_upsert(
    artifact: &Path,
    source: &Path,
    pool: &PgPool,
    config: &PipelineConfig,
) -> LoadResult<(u64, u64)> {
    let statements = LoadStatements::new(&config.target_table, source)?;
    let data = tokio::fs::File::open(artifact)
        .await
        .map_err(|e| LoadError::Artifact {
            path: artifact.to_path_buf(),
            source: e,
        })?;

    match tokio::time::timeout(config.load_timeout, run_transaction(pool, &statements, data)).await {
        Ok(result) => Ok(result?),
        // The transaction future was dropped, which rolls it back.
        Err(_) => Err(LoadError::Timeout {
            after: config.load_timeout,
        }),
    }
}

async fn run_transaction(
    pool: &PgPool,
    statements: &LoadStatements,
    data: tokio::fs::File,
) -> Result<(u64, u64), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(&statements.create_staging)
        .persistent(false)
        .execute(&mut *tx)
        .await?;

    let mut copy = tx.copy_in_raw(&statements.copy_into_staging).await?;
    copy.read_from(data).await?;
    let rows_copied = copy.finish().await?;
    debug!(staging = %statements.staging_table, rows_copied, "copied into staging");

    let rows_loaded = sqlx::query(&statements.upsert)
        .persistent(false)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query(&statements.drop_staging)
        .persistent(false)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok((rows_copied, rows_loaded))
}

/// Deletes the intermediate artifact on drop, including when a load is cancelled.
struct ArtifactGuard(PathBuf);

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!(artifact = %self.0.display(), "artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(artifact = %self.0.display(), error = %e, "failed to remove artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::artifact::write_artifact;
    use crate::types::CleanDataset;

    #[tokio::test]
    async fn invalid_table_name_leaves_source_in_incoming() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::from_base_dir(dir.path());
        config.ensure_dirs().unwrap();
        config.target_table = "sales; drop table x".to_string();

        let source = config.incoming_dir.join("a.xlsx");
        std::fs::write(&source, b"x").unwrap();
        let artifact = config.work_dir.join("a.xlsx.csv");
        write_artifact(&artifact, &CleanDataset::new(Vec::new())).unwrap();
        // Never connects: the table name is rejected first.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();

        let err = load_artifact(&artifact, &source, &pool, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidTableName(_)));
        assert!(!err.quarantines_source());
        assert!(source.exists());
        assert!(!config.error_dir.join("a.xlsx").exists());
        assert!(!artifact.exists());
    }
}
