//! HTML parser for extracting item links and topic metadata
//!
//! This module handles parsing HTML content to extract:
//! - Item links from the index page (anchors whose href carries a marker)
//! - Topic page title and download counter

use scraper::{Html, Node, Selector};
use thiserror::Error;
use url::Url;

/// The text a download-counter span carries in its `title` attribute
const DOWNLOADS_TITLE_MARKER: &str = "Скачано";

/// Errors raised while setting up or running extraction
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Base URL '{0}' cannot be used to resolve links")]
    InvalidBase(String),

    #[error("Link marker cannot be empty")]
    EmptyMarker,
}

/// A discovered fetchable item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// Anchor text; empty when the anchor has no text child
    pub title: String,

    /// Absolute URL of the item page
    pub url: Url,
}

/// Extracts item links from an index page
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    base_url: Url,
    marker: String,
}

impl LinkExtractor {
    /// Creates an extractor resolving hrefs against `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - The forum base URL
    /// * `marker` - Substring an href must contain, e.g. `viewtopic.php?t=`
    pub fn new(base_url: Url, marker: impl Into<String>) -> Result<Self, ParseError> {
        if base_url.cannot_be_a_base() {
            return Err(ParseError::InvalidBase(base_url.to_string()));
        }

        let marker = marker.into();
        if marker.is_empty() {
            return Err(ParseError::EmptyMarker);
        }

        Ok(Self { base_url, marker })
    }

    /// Extracts all item links from an index page, in document order
    ///
    /// # Link Extraction Rules
    ///
    /// - Every `<a>` whose `href` contains the marker is taken, including
    ///   duplicates
    /// - The href is resolved against the base URL
    /// - The title is the anchor's first text child, or empty
    ///
    /// # Example
    ///
    /// ```
    /// use forum_harvest::crawler::LinkExtractor;
    /// use url::Url;
    ///
    /// let extractor = LinkExtractor::new(
    ///     Url::parse("https://forum.example.com/forum/").unwrap(),
    ///     "viewtopic.php?t=",
    /// )
    /// .unwrap();
    /// let html = r#"<a href="viewtopic.php?t=7">Seven</a><a href="faq.php">FAQ</a>"#;
    /// let targets = extractor.extract(html);
    /// assert_eq!(targets.len(), 1);
    /// assert_eq!(targets[0].url.as_str(), "https://forum.example.com/forum/viewtopic.php?t=7");
    /// ```
    pub fn extract(&self, html: &str) -> Vec<TargetDescriptor> {
        let document = Html::parse_document(html);
        let mut targets = Vec::new();

        // descendants() walks the tree depth-first, pre-order
        for node in document.tree.root().descendants() {
            let Some(element) = node.value().as_element() else {
                continue;
            };

            if element.name() != "a" {
                continue;
            }

            let Some(href) = element.attr("href") else {
                continue;
            };

            if !href.contains(&self.marker) {
                continue;
            }

            let url = match self.base_url.join(href) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping unresolvable link '{}': {}", href, e);
                    continue;
                }
            };

            let title = node
                .children()
                .find_map(|child| match child.value() {
                    Node::Text(text) => Some(text.to_string()),
                    _ => None,
                })
                .unwrap_or_default();

            targets.push(TargetDescriptor { title, url });
        }

        targets
    }
}

/// Metadata extracted from a fetched topic page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicDetails {
    /// The page title (from `<title>`)
    pub page_title: Option<String>,

    /// Download counter shown on the topic, if present and numeric
    pub downloads: Option<u64>,
}

/// Parses a topic page for its title and download counter
///
/// The counter is the first text child of a `<span>` whose `title`
/// attribute contains "Скачано"; its first whitespace-separated field is
/// read as an integer. A counter that does not parse is logged and left
/// empty.
pub fn parse_topic(html: &str) -> TopicDetails {
    let document = Html::parse_document(html);
    let mut details = TopicDetails {
        page_title: extract_title(&document),
        downloads: None,
    };

    for node in document.tree.root().descendants() {
        let Some(element) = node.value().as_element() else {
            continue;
        };

        if element.name() != "span" {
            continue;
        }

        if !element
            .attr("title")
            .is_some_and(|title| title.contains(DOWNLOADS_TITLE_MARKER))
        {
            continue;
        }

        let Some(text) = node.first_child().and_then(|c| c.value().as_text()) else {
            continue;
        };

        match parse_leading_count(text) {
            Some(count) => details.downloads = Some(count),
            None => tracing::warn!("Failed to read download count from '{}'", text.trim()),
        }
    }

    details
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Reads the first whitespace-separated field of `text` as an integer
fn parse_leading_count(text: &str) -> Option<u64> {
    text.split_whitespace().next()?.parse().ok()
}
