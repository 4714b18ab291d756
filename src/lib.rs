//! forum-harvest: authenticated concurrent fetching from cookie-session forums
//!
//! This crate logs into a forum, fetches an index page, extracts the item
//! links it lists, and fetches every item page through a bounded worker pool,
//! transcoding windows-1251 pages to UTF-8 on the way.

pub mod config;
pub mod crawler;
pub mod output;

use thiserror::Error;

/// Main error type for forum-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Login failed: {0}")]
    Login(#[from] crawler::LoginError),

    #[error("Session error: {0}")]
    Session(#[from] crawler::SessionError),

    #[error("Index fetch failed: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("HTML parse error: {0}")]
    Parse(#[from] crawler::ParseError),

    #[error("Batch failed: {0}")]
    Batch(#[from] crawler::BatchFailure),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::SinkError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for forum-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    fetch_all, BatchOptions, FetchOutcomeSet, FetchResult, Fetcher, ForumHarvester,
    HarvestReport, SessionCredential, TargetDescriptor,
};
