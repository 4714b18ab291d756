//! Harvest coordinator - end-to-end pipeline
//!
//! This module wires the components together:
//! - Logging in to obtain the session credential
//! - Fetching and storing the index page
//! - Extracting item links
//! - Fetching every item through the worker pool
//! - Storing fetched pages and parsing topic metadata

use crate::config::Config;
use crate::crawler::fetcher::{FetchRequest, Fetcher};
use crate::crawler::parser::{parse_topic, LinkExtractor};
use crate::crawler::scheduler::{fetch_all, BatchOptions, FetchOutcomeSet};
use crate::crawler::session::SessionManager;
use crate::output::{DirectorySink, NullSink, PageSink};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Name under which the index page is stored
pub const INDEX_PAGE_NAME: &str = "index.html";

/// Name under which the page of the `index`-th target is stored
pub fn topic_page_name(index: usize) -> String {
    format!("topic-{}.html", index)
}

/// Metadata for one fetched topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    /// Anchor text from the index page
    pub title: String,

    pub url: Url,

    /// `<title>` of the topic page
    pub page_title: Option<String>,

    pub downloads: Option<u64>,
}

/// Result of a successful harvest
#[derive(Debug)]
pub struct HarvestReport {
    pub index_url: Url,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// One record per fetched topic, in index order
    pub topics: Vec<TopicRecord>,

    /// The per-target outcomes the records were built from
    pub outcomes: FetchOutcomeSet,
}

/// Runs the login → index → extract → fetch pipeline
pub struct ForumHarvester {
    session: SessionManager,
    fetcher: Fetcher,
    extractor: LinkExtractor,
    index_url: Url,
    sink: Box<dyn PageSink>,
    options: BatchOptions,
}

impl ForumHarvester {
    /// Creates a harvester from configuration
    ///
    /// Pages are written to `output.directory` when it is set and discarded
    /// otherwise.
    pub fn new(config: &Config) -> Result<Self, HarvestError> {
        let sink: Box<dyn PageSink> = match &config.output.directory {
            Some(directory) => Box::new(DirectorySink::new(directory)?),
            None => Box::new(NullSink),
        };

        Ok(Self {
            session: SessionManager::from_config(config)?,
            fetcher: Fetcher::new(&config.http)?,
            extractor: LinkExtractor::new(
                config.site.base_url()?,
                config.site.topic_marker.clone(),
            )?,
            index_url: config.site.index_url()?,
            sink,
            options: BatchOptions {
                workers: config.fetch.workers,
                cancel: CancellationToken::new(),
                cancel_grace: config.fetch.cancel_grace(),
            },
        })
    }

    /// Replaces the page sink
    pub fn with_sink(mut self, sink: Box<dyn PageSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Token that cancels the item batch when raised
    pub fn cancellation_token(&self) -> CancellationToken {
        self.options.cancel.clone()
    }

    /// Runs the full pipeline
    ///
    /// # Errors
    ///
    /// - `Login` - no fetch is attempted
    /// - `Fetch` - the index page could not be fetched
    /// - `Batch` - at least one item failed; the error carries every outcome,
    ///   successful bodies included
    pub async fn run(&self) -> Result<HarvestReport, HarvestError> {
        let started_at = Utc::now();

        let credential = self.session.login(&self.fetcher).await?;
        tracing::info!("Logged in with {} session cookies", credential.len());

        tracing::info!("Fetching index page {}", self.index_url);
        let mut index_credential = credential.snapshot(&self.index_url)?;
        let index = self
            .fetcher
            .fetch(FetchRequest::get(self.index_url.clone()), &mut index_credential)
            .await?;
        self.store(INDEX_PAGE_NAME, &index);

        let targets = self.extractor.extract(&index);
        tracing::info!("Found {} topic links", targets.len());

        let outcomes = fetch_all(targets, &credential, &self.fetcher, &self.options).await;

        for result in outcomes.successes() {
            if let Some(body) = result.body() {
                self.store(&topic_page_name(result.index), body);
            }
        }

        let outcomes = outcomes.into_result()?;

        tracing::info!("Parsing {} topic pages", outcomes.len());
        let topics = outcomes
            .successes()
            .filter_map(|result| {
                let details = parse_topic(result.body()?);
                Some(TopicRecord {
                    title: result.target.title.clone(),
                    url: result.target.url.clone(),
                    page_title: details.page_title,
                    downloads: details.downloads,
                })
            })
            .collect();

        Ok(HarvestReport {
            index_url: self.index_url.clone(),
            started_at,
            finished_at: Utc::now(),
            topics,
            outcomes,
        })
    }

    fn store(&self, name: &str, body: &str) {
        if let Err(e) = self.sink.store(name, body) {
            tracing::warn!("Failed to store {}: {}", name, e);
        }
    }
}
