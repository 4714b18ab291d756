//! Crawler module for authenticated page fetching and processing
//!
//! This module contains the core harvesting logic, including:
//! - Session login and per-worker credential snapshots
//! - HTTP fetching with cookie-carrying redirects and charset transcoding
//! - HTML parsing and link extraction
//! - Bounded-concurrency batch fetching
//! - Overall pipeline coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod session;

pub use coordinator::{topic_page_name, ForumHarvester, HarvestReport, TopicRecord, INDEX_PAGE_NAME};
pub use fetcher::{
    build_http_client, decode_body, FetchError, FetchErrorKind, FetchRequest, Fetcher,
    WINDOWS_1251_CONTENT_TYPE,
};
pub use parser::{parse_topic, LinkExtractor, ParseError, TargetDescriptor, TopicDetails};
pub use scheduler::{
    default_worker_count, fetch_all, worker_count, BatchFailure, BatchOptions, FetchOutcomeSet,
    FetchResult,
};
pub use session::{LoginError, SessionCookie, SessionCredential, SessionError, SessionManager};

use crate::config::Config;
use crate::HarvestError;

/// Runs a complete harvest
///
/// This is the main entry point for a harvest. It will:
/// 1. Log in and obtain the session credential
/// 2. Fetch the index page
/// 3. Extract topic links
/// 4. Fetch all topics concurrently
/// 5. Parse topic pages into records
///
/// # Arguments
///
/// * `config` - The harvester configuration
///
/// # Returns
///
/// * `Ok(HarvestReport)` - Every topic was fetched
/// * `Err(HarvestError)` - Login, index fetch, or at least one topic failed
pub async fn harvest(config: &Config) -> Result<HarvestReport, HarvestError> {
    ForumHarvester::new(config)?.run().await
}
