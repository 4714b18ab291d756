//! Output module for fetched pages and run summaries
//!
//! This module handles:
//! - Handing fetched page bodies to a pluggable sink
//! - Writing pages to a directory
//! - Rendering harvest summaries for the command line

mod directory;
mod summary;
mod traits;

pub use directory::DirectorySink;
pub use summary::{format_batch_failure, format_summary};
pub use traits::{NullSink, PageSink, SinkError, SinkResult};
