//! Page sink traits and types
//!
//! This module defines the trait interface for page sinks, the pluggable
//! destination for fetched page bodies.

use thiserror::Error;

/// Errors that can occur while storing pages
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write page '{name}': {source}")]
    Write {
        name: String,
        source: std::io::Error,
    },

    #[error("Invalid page name: '{0}'")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Trait for page sinks
///
/// Sinks receive decoded page bodies as they become available. A failing
/// sink never fails a harvest; callers log the error and continue.
/// Implementations must be thread-safe.
pub trait PageSink: Send + Sync {
    /// Stores one page body
    ///
    /// # Arguments
    ///
    /// * `name` - A flat file-like name such as `topic-3.html`
    /// * `body` - The decoded UTF-8 page body
    fn store(&self, name: &str, body: &str) -> SinkResult<()>;
}

/// A sink that discards every page
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PageSink for NullSink {
    fn store(&self, _name: &str, _body: &str) -> SinkResult<()> {
        Ok(())
    }
}
