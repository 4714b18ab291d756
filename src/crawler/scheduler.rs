//! Concurrent fetch orchestration
//!
//! This module handles:
//! - Sizing the worker pool (twice the available parallelism by default)
//! - Dispatching targets to workers over a bounded channel
//! - Giving every target its own credential snapshot
//! - Collecting results through a single receiver
//! - Cancellation with a grace period for in-flight fetches

use crate::crawler::fetcher::{FetchError, FetchRequest, Fetcher};
use crate::crawler::parser::TargetDescriptor;
use crate::crawler::session::SessionCredential;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of fetching one target
#[derive(Debug)]
pub struct FetchResult {
    /// Position of the target in the batch input
    pub index: usize,

    pub target: TargetDescriptor,

    /// Decoded body, or why the fetch failed
    pub outcome: Result<String, FetchError>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn body(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.outcome.as_ref().err()
    }
}

/// All results of one batch, ordered by target index
#[derive(Debug, Default)]
pub struct FetchOutcomeSet {
    results: Vec<FetchResult>,
}

impl FetchOutcomeSet {
    fn from_results(mut results: Vec<FetchResult>) -> Self {
        results.sort_by_key(|r| r.index);
        Self { results }
    }

    /// True iff no target failed
    pub fn is_success(&self) -> bool {
        self.results.iter().all(FetchResult::is_success)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    pub fn results(&self) -> &[FetchResult] {
        &self.results
    }

    pub fn successes(&self) -> impl Iterator<Item = &FetchResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn into_results(self) -> Vec<FetchResult> {
        self.results
    }

    /// Turns the set into an error if any target failed
    ///
    /// The whole batch counts as failed as soon as one target fails; the
    /// returned [`BatchFailure`] still carries every successful body.
    pub fn into_result(self) -> Result<FetchOutcomeSet, BatchFailure> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BatchFailure { outcomes: self })
        }
    }
}

/// One or more targets of a batch failed
#[derive(Debug)]
pub struct BatchFailure {
    outcomes: FetchOutcomeSet,
}

impl BatchFailure {
    pub fn failed(&self) -> usize {
        self.outcomes.failure_count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// The failing targets with their errors
    pub fn errors(&self) -> impl Iterator<Item = (&TargetDescriptor, &FetchError)> {
        self.outcomes
            .failures()
            .filter_map(|r| r.error().map(|e| (&r.target, e)))
    }

    pub fn outcomes(&self) -> &FetchOutcomeSet {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> FetchOutcomeSet {
        self.outcomes
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} fetches failed",
            self.failed(),
            self.total()
        )?;
        for (target, error) in self.errors() {
            write!(f, "; {}: {}", target.url, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchFailure {}

/// Batch tuning and cancellation
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker pool size; 0 selects [`default_worker_count`]
    pub workers: usize,

    /// Raised to stop dispatching; in-flight fetches get `cancel_grace` to finish
    pub cancel: CancellationToken,

    pub cancel_grace: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            cancel: CancellationToken::new(),
            cancel_grace: Duration::from_secs(5),
        }
    }
}

/// Twice the available parallelism, the usual sizing for I/O-bound work
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

/// Number of workers to spawn for a batch of `targets` items
pub fn worker_count(requested: usize, targets: usize) -> usize {
    let wanted = if requested == 0 {
        default_worker_count()
    } else {
        requested
    };

    wanted.min(targets).max(1)
}

/// A target handed to a worker together with its private credential
struct Job {
    index: usize,
    target: TargetDescriptor,
    credential: SessionCredential,
}

/// Fetches every target through a bounded worker pool
///
/// Each target gets a snapshot of `credential` scoped to its URL, so cookie
/// changes made while following redirects stay private to that fetch. The
/// call returns only after every worker has finished, with exactly one
/// result per target.
///
/// # Arguments
///
/// * `targets` - The items to fetch
/// * `credential` - The canonical session credential; only read
/// * `fetcher` - The shared fetcher
/// * `options` - Pool size and cancellation
pub async fn fetch_all(
    targets: Vec<TargetDescriptor>,
    credential: &SessionCredential,
    fetcher: &Fetcher,
    options: &BatchOptions,
) -> FetchOutcomeSet {
    let total = targets.len();
    if total == 0 {
        return FetchOutcomeSet::default();
    }

    let workers = worker_count(options.workers, total);
    tracing::info!("Fetching {} pages with {} workers", total, workers);

    let (job_tx, job_rx) = mpsc::channel::<Job>(workers);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<FetchResult>(total);

    let mut pool = JoinSet::new();
    for _ in 0..workers {
        pool.spawn(run_worker(
            Arc::clone(&job_rx),
            result_tx.clone(),
            fetcher.clone(),
            options.cancel.clone(),
            options.cancel_grace,
        ));
    }

    // Targets are kept so that any without a reported result can be filled in
    let pending = targets.clone();

    for (index, target) in targets.into_iter().enumerate() {
        if options.cancel.is_cancelled() {
            let url = target.url.to_string();
            send_result(&result_tx, index, target, Err(FetchError::Cancelled { url })).await;
            continue;
        }

        let job = match credential.snapshot(&target.url) {
            Ok(credential) => Job {
                index,
                target,
                credential,
            },
            Err(source) => {
                let url = target.url.to_string();
                send_result(&result_tx, index, target, Err(FetchError::Session { url, source }))
                    .await;
                continue;
            }
        };

        if let Err(mpsc::error::SendError(job)) = job_tx.send(job).await {
            // Every worker is gone
            let url = job.target.url.to_string();
            send_result(&result_tx, job.index, job.target, Err(FetchError::WorkerLost { url }))
                .await;
        }
    }

    drop(job_tx);
    drop(result_tx);

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Fetch worker stopped abnormally: {}", e);
        }
    }

    let mut results = Vec::with_capacity(total);
    while let Some(result) = result_rx.recv().await {
        results.push(result);
    }

    // A worker that panicked mid-fetch leaves its target without a result
    let reported: HashSet<usize> = results.iter().map(|r| r.index).collect();
    for (index, target) in pending.into_iter().enumerate() {
        if !reported.contains(&index) {
            let url = target.url.to_string();
            results.push(FetchResult {
                index,
                target,
                outcome: Err(FetchError::WorkerLost { url }),
            });
        }
    }

    let outcomes = FetchOutcomeSet::from_results(results);
    tracing::info!(
        "Fetched {} pages, {} failed",
        outcomes.len(),
        outcomes.failure_count()
    );
    outcomes
}

async fn send_result(
    results: &mpsc::Sender<FetchResult>,
    index: usize,
    target: TargetDescriptor,
    outcome: Result<String, FetchError>,
) {
    if let Err(e) = &outcome {
        tracing::error!("Failed to fetch '{}' ({}): {}", target.title, target.url, e);
    }

    // Capacity equals the batch size and the receiver outlives all senders
    let _ = results
        .send(FetchResult {
            index,
            target,
            outcome,
        })
        .await;
}

async fn run_worker(
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<FetchResult>,
    fetcher: Fetcher,
    cancel: CancellationToken,
    grace: Duration,
) {
    loop {
        // The lock is held only while waiting for the next job
        let job = { jobs.lock().await.recv().await };
        let Some(Job {
            index,
            target,
            mut credential,
        }) = job
        else {
            break;
        };

        let url = target.url.to_string();

        if cancel.is_cancelled() {
            send_result(&results, index, target, Err(FetchError::Cancelled { url })).await;
            continue;
        }

        tracing::info!("Getting '{}' from {}", target.title, target.url);

        let request = FetchRequest::get(target.url.clone());
        let outcome = tokio::select! {
            outcome = fetcher.fetch(request, &mut credential) => outcome,
            _ = async {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            } => Err(FetchError::Cancelled { url }),
        };

        send_result(&results, index, target, outcome).await;
    }
}
