//! `sales-ingest` loads spreadsheets dropped into a watched directory into a PostgreSQL table.
//!
//! The pipeline has three operations that an external orchestrator (or the bundled
//! [`execution::ExecutionEngine`]) calls in order:
//!
//! 1. [`ingestion::discover`]: list the `.xlsx` files ready in the incoming directory
//! 2. [`processing::transform`]: validate one file against the record contract and write a
//!    load-ready CSV artifact, or quarantine the file
//! 3. [`loading::load`]: `COPY` the artifact into a temp staging table, upsert into the target
//!    table in one transaction, then archive the source file
//!
//! Each file is processed independently; one file's failure never affects another.
//!
//! ## Record contract
//!
//! | Source column | Target column | Type | Rule |
//! |---|---|---|---|
//! | `id` | `id` | `BIGINT` | required; row dropped if not an integer |
//! | `name_sales_code` | `salescode` | `TEXT` | required; trimmed; row dropped if blank |
//! | `date_order` | `dateorder` | `DATE` | required; row dropped if not a date |
//! | `amount_total` | `totalsales` | `NUMERIC(15,2)` | required column; blank/unparsable cell becomes `0.00` |
//! | `brand` | `brand` | `TEXT` | optional; trimmed; blank becomes `NULL` |
//!
//! A file missing any required column, or left with no valid rows, is moved to the error
//! directory with a `<file>.error.json` sidecar describing why.
//!
//! ## Example
//!
//! ```no_run
//! use sales_ingest::config::PipelineConfig;
//! use sales_ingest::execution::{ExecutionEngine, ExecutionOptions};
//! use sales_ingest::{ingestion, loading};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_base_dir("/opt/ingest/data");
//! config.ensure_dirs()?;
//!
//! let files = ingestion::discover(&config.incoming_dir)?;
//! let pool = loading::connect("postgres://localhost/dw", config.max_workers).await?;
//! let opts = ExecutionOptions::from_config(&config);
//! let summary = ExecutionEngine::new(pool, config, opts).run(files).await;
//! println!("{}", summary.metrics);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: record contract, clean rows, per-file records
//! - [`config`]: explicit pipeline configuration
//! - [`ingestion`]: discovery, spreadsheet reading, observers
//! - [`processing`]: coercion rules and the transform stage
//! - [`loading`]: staging + `COPY` + upsert
//! - [`disposition`]: archive/quarantine moves and status reconstruction
//! - [`execution`]: bounded worker pool
//! - [`error`]: error types for each stage

pub mod config;
pub mod disposition;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod loading;
pub mod processing;
pub mod types;

pub use error::{ConfigError, DiscoveryError, LoadError, QuarantineReason, RowCoercionFailure};
