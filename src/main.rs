use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sales_ingest::config::PipelineConfig;
use sales_ingest::disposition::scan_dispositions;
use sales_ingest::execution::{ExecutionEngine, ExecutionOptions, FileStatus, TracingExecutionObserver};
use sales_ingest::ingestion::{self, CompositeObserver, FileObserver, PipelineObserver, TracingObserver};
use sales_ingest::{loading, processing};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load spreadsheets from a watched directory into PostgreSQL", long_about = None)]
struct Cli {
    /// TOML config file (otherwise SALES_INGEST_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base directory holding incoming/, archive/, error/ and work/
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the files a run would pick up
    Discover,
    /// Validate and transform one file without loading it
    Transform { file: PathBuf },
    /// Discover, then transform and load every file
    Run {
        /// Files processed concurrently
        #[arg(long)]
        workers: Option<usize>,
        /// Also append per-file events to this log file
        #[arg(long)]
        event_log: Option<PathBuf>,
    },
    /// Show per-file state reconstructed from the directories
    Status,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = load_config(&cli)?;

    match cli.command {
        Command::Discover => {
            let files = ingestion::discover(&config.incoming_dir)?;
            for f in files {
                println!("{}", f.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Transform { file } => {
            config.ensure_dirs().context("failed to create pipeline directories")?;
            match processing::transform(&file, &config) {
                Ok(done) => {
                    println!(
                        "ok {} rows={} dropped={} artifact={}",
                        done.source.display(),
                        done.report.kept,
                        done.report.dropped.len(),
                        done.artifact.display()
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(reason) => {
                    println!("quarantined {}: {reason}", file.display());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Run { workers, event_log } => {
            if let Some(n) = workers {
                config.max_workers = n;
            }
            config.validate()?;
            config.ensure_dirs().context("failed to create pipeline directories")?;

            let files = ingestion::discover(&config.incoming_dir)?;
            let pool = connect_pool(config.max_workers).await?;

            let mut observers: Vec<Arc<dyn PipelineObserver>> = vec![Arc::new(TracingObserver)];
            if let Some(path) = event_log {
                observers.push(Arc::new(FileObserver::new(path)));
            }
            let opts = ExecutionOptions::from_config(&config);
            let engine = ExecutionEngine::new(pool, config, opts)
                .with_observer(Arc::new(CompositeObserver::new(observers)))
                .with_execution_observer(Arc::new(TracingExecutionObserver));

            let summary = engine.run(files).await;
            for outcome in &summary.outcomes {
                match &outcome.status {
                    FileStatus::Archived(o) => {
                        println!("archived    {} rows={}", outcome.source.display(), o.rows_loaded)
                    }
                    FileStatus::Quarantined(r) => {
                        println!("quarantined {} {r}", outcome.source.display())
                    }
                    FileStatus::LoadFailed(e) => {
                        println!("load_failed {} {e}", outcome.source.display())
                    }
                    FileStatus::Aborted(m) => println!("aborted     {} {m}", outcome.source.display()),
                }
            }
            println!("{}", summary.metrics);
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            for rec in scan_dispositions(&config).context("failed to scan pipeline directories")? {
                let reason = rec.reason.as_deref().unwrap_or("");
                println!("{:<11} {} {reason}", format!("{:?}", rec.disposition).to_lowercase(), rec.path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let config = match (&cli.config, &cli.base_dir) {
        (Some(path), _) => PipelineConfig::from_toml_path(path)?,
        (None, Some(base)) => PipelineConfig::from_base_dir(base),
        (None, None) => PipelineConfig::from_env()?,
    };
    info!(
        incoming = %config.incoming_dir.display(),
        table = %config.target_table,
        workers = config.max_workers,
        "configuration loaded"
    );
    Ok(config)
}

async fn connect_pool(max_workers: usize) -> Result<sqlx::PgPool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    loading::connect(&database_url, max_workers)
        .await
        .context("failed to connect to Postgres")
}
