//! Reading side of the pipeline.
//!
//! - [`discovery`]: which files in the incoming directory are ready ([`discover`])
//! - [`excel`]: first-sheet reading, header location and the column-contract check
//! - [`observability`]: per-file outcome observers and alert severities

pub mod discovery;
pub mod excel;
pub mod observability;

pub use discovery::{LOCK_FILE_PREFIX, SPREADSHEET_EXTENSION, discover};
pub use observability::{
    CompositeObserver, FileFailure, FileObserver, PipelineObserver, PipelineSeverity, TracingObserver,
};
