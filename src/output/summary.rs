//! Plain-text run summaries
//!
//! Renders harvest reports and batch failures for the command line.

use crate::crawler::{BatchFailure, FetchOutcomeSet, HarvestReport};
use std::collections::BTreeMap;

/// Formats a successful harvest
pub fn format_summary(report: &HarvestReport) -> String {
    let mut out = String::new();

    out.push_str("=== Harvest Summary ===\n\n");
    out.push_str(&format!("Index: {}\n", report.index_url));
    out.push_str(&format!("Started: {}\n", report.started_at.to_rfc3339()));
    out.push_str(&format!("Finished: {}\n", report.finished_at.to_rfc3339()));
    let elapsed = report.finished_at - report.started_at;
    out.push_str(&format!(
        "Duration: {:.2}s\n",
        elapsed.num_milliseconds() as f64 / 1000.0
    ));
    out.push_str(&format!("Topics fetched: {}\n\n", report.topics.len()));

    for (i, topic) in report.topics.iter().enumerate() {
        let downloads = topic
            .downloads
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let title = if topic.title.is_empty() {
            topic.page_title.as_deref().unwrap_or("(untitled)")
        } else {
            topic.title.as_str()
        };
        out.push_str(&format!(
            "{:>3}. {} [downloads: {}]\n     {}\n",
            i + 1,
            title,
            downloads,
            topic.url
        ));
    }

    out
}

/// Formats a failed batch: counts by error kind, then each failing target
pub fn format_batch_failure(failure: &BatchFailure) -> String {
    let mut out = String::new();

    out.push_str("=== Harvest Failed ===\n\n");
    out.push_str(&format!(
        "{} of {} topics failed ({} fetched successfully)\n\n",
        failure.failed(),
        failure.total(),
        failure.total() - failure.failed()
    ));

    out.push_str(&format_failure_kinds(failure.outcomes()));

    out.push_str("\nFailed topics:\n");
    for (target, error) in failure.errors() {
        out.push_str(&format!("  - {} ({})\n    {}\n", target.title, target.url, error));
    }

    out
}

fn format_failure_kinds(outcomes: &FetchOutcomeSet) -> String {
    let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
    for result in outcomes.failures() {
        if let Some(error) = result.error() {
            *kinds.entry(format!("{:?}", error.kind())).or_default() += 1;
        }
    }

    let mut out = String::from("| Error Kind | Count |\n|------------|-------|\n");
    for (kind, count) in kinds {
        out.push_str(&format!("| {} | {} |\n", kind, count));
    }
    out
}
