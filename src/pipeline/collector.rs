//! History collection and offline feature runs over the stored dataset

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::algo::{extract_features, Features};
use crate::config::PipelineConfig;
use crate::core::{Frequency, RunSummary};
use crate::error::CollectorError;

use super::market_data::{fetch_listing, MarketDataSource};
use super::storage::{DatasetLayout, RankedListing};

/// Result of one `(coin, frequency)` history task
#[derive(Debug)]
enum TaskOutcome {
    Saved(usize),
    Insufficient(usize),
    Failed(CollectorError),
    Skipped,
}

/// Settings of one history run, taken from `[pipeline]` plus CLI overrides
#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub count: i64,
    pub frequencies: Vec<Frequency>,
    pub resume: bool,
    pub workers: usize,
    pub min_samples: usize,
    pub collect_snapshots: bool,
}

impl HistoryRequest {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            count: config.count,
            frequencies: config.frequencies.clone(),
            resume: config.resume,
            workers: config.workers,
            min_samples: config.min_samples,
            collect_snapshots: config.collect_snapshots,
        }
    }
}

/// Fetches listing, optional snapshots and per-frequency history for the
/// top meme coins through a bounded pool of concurrent fetches.
pub struct HistoryCollector<'a, M: ?Sized> {
    source: &'a M,
    layout: DatasetLayout,
    request: HistoryRequest,
}

impl<'a, M: MarketDataSource + ?Sized> HistoryCollector<'a, M> {
    pub fn new(source: &'a M, layout: DatasetLayout, request: HistoryRequest) -> Self {
        Self { source, layout, request }
    }

    #[instrument(skip_all, fields(count = self.request.count, workers = self.request.workers))]
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<RunSummary, CollectorError> {
        self.layout.prepare()?;

        let listings = fetch_listing(self.source, self.request.count).await;
        let fetched_at = Utc::now();
        let ranked: Vec<RankedListing> = listings
            .into_iter()
            .enumerate()
            .map(|(fetch_rank, listing)| RankedListing { listing, fetch_rank, fetched_at })
            .collect();
        self.layout.write_listing(&ranked)?;

        if self.request.collect_snapshots {
            self.collect_snapshots(&ranked).await;
        }

        let tasks = self.pending_tasks(&ranked)?;
        info!(tasks = tasks.len(), "Total history tasks to process");

        let cancelled = AtomicBool::new(false);
        let mut results = stream::iter(tasks)
            .map(|(coin_id, frequency)| {
                let cancelled = &cancelled;
                async move {
                    if cancelled.load(Ordering::Relaxed) {
                        return (coin_id, frequency, TaskOutcome::Skipped);
                    }
                    let outcome = self.fetch_history(&coin_id, frequency).await;
                    (coin_id, frequency, outcome)
                }
            })
            .buffer_unordered(self.request.workers.max(1));

        let mut summary = RunSummary::default();
        let mut skipped = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv(), if !cancelled.load(Ordering::Relaxed) => {
                    warn!("Shutdown requested, finishing in-flight fetches");
                    cancelled.store(true, Ordering::Relaxed);
                }
                next = results.next() => {
                    let Some((coin_id, frequency, outcome)) = next else {
                        break;
                    };
                    match outcome {
                        TaskOutcome::Saved(rows) => {
                            debug!(coin = %coin_id, frequency = %frequency, rows = rows, "History saved");
                            summary.record_success();
                        }
                        TaskOutcome::Insufficient(rows) => {
                            warn!(coin = %coin_id, frequency = %frequency, rows = rows, "Insufficient or empty history");
                            summary.record_failure(coin_id);
                        }
                        TaskOutcome::Failed(e) => {
                            warn!(coin = %coin_id, frequency = %frequency, error = %e, "History fetch failed");
                            summary.record_failure(coin_id);
                        }
                        TaskOutcome::Skipped => skipped += 1,
                    }
                }
            }
        }
        drop(results);

        if let Some(path) = self.layout.write_missing(&summary.failed_ids)? {
            info!(path = %path.display(), "Failed coin ids saved for retry");
        }
        info!(
            succeeded = summary.succeeded,
            attempted = summary.attempted,
            skipped = skipped,
            "✅ History collection complete"
        );
        Ok(summary)
    }

    fn pending_tasks(&self, ranked: &[RankedListing]) -> Result<Vec<(String, Frequency)>, CollectorError> {
        let mut tasks = Vec::new();
        for &frequency in &self.request.frequencies {
            let processed = if self.request.resume {
                self.layout.processed_ids(frequency)?
            } else {
                Default::default()
            };
            if !processed.is_empty() {
                info!(frequency = %frequency, already = processed.len(), "Resuming from checkpoint");
            }
            tasks.extend(
                ranked
                    .iter()
                    .filter(|entry| !processed.contains(&entry.listing.id))
                    .map(|entry| (entry.listing.id.clone(), frequency)),
            );
        }
        Ok(tasks)
    }

    async fn fetch_history(&self, coin_id: &str, frequency: Frequency) -> TaskOutcome {
        let points = match self.source.coin_history(coin_id, frequency).await {
            Ok(points) => points,
            Err(e) => return TaskOutcome::Failed(e),
        };
        if points.len() < self.request.min_samples {
            return TaskOutcome::Insufficient(points.len());
        }
        match self.layout.write_history(coin_id, frequency, &points) {
            Ok(_) => TaskOutcome::Saved(points.len()),
            Err(e) => TaskOutcome::Failed(e),
        }
    }

    async fn collect_snapshots(&self, ranked: &[RankedListing]) {
        let mut failed = 0usize;
        for entry in ranked {
            let coin_id = &entry.listing.id;
            if self.request.resume && self.layout.has_snapshot(coin_id) {
                continue;
            }
            let saved = match self.source.coin_snapshot(coin_id).await {
                Ok(Value::Null) => Err(CollectorError::NotFound(coin_id.clone())),
                Ok(snapshot) => self.layout.write_snapshot(coin_id, &snapshot),
                Err(e) => Err(e),
            };
            if let Err(e) = saved {
                warn!(coin = %coin_id, error = %e, "Snapshot failed");
                failed += 1;
            }
        }
        if failed > 0 {
            warn!(failed = failed, "Some coin snapshots could not be saved");
        }
    }
}

/// Builds `features_{frequency}.jsonl` from the stored history series
pub fn build_feature_dataset(
    layout: &DatasetLayout,
    frequency: Frequency,
    early_window: usize,
    full_windows: &[usize],
) -> Result<RunSummary, CollectorError> {
    let symbols = layout.listing_symbols()?;
    let mut summary = RunSummary::default();
    let mut records = Vec::new();

    for (coin_id, path) in layout.history_files(frequency)? {
        let series = match layout.read_history(&path) {
            Ok(series) => series,
            Err(e) => {
                warn!(coin = %coin_id, error = %e, "Unreadable history file");
                summary.record_failure(coin_id);
                continue;
            }
        };

        let symbol = symbols.get(&coin_id).map(String::as_str).unwrap_or(&coin_id);
        match extract_features(Some(symbol), &series, early_window, full_windows, frequency) {
            Features::Ready(vector) => {
                let mut record = vector.to_record();
                record.insert("coin_id".to_string(), Value::String(coin_id));
                records.push(record);
                summary.record_success();
            }
            Features::InsufficientData { required, available } => {
                debug!(coin = %coin_id, required = required, available = available, "Not enough samples");
                summary.record_failure(coin_id);
            }
        }
    }

    let path = layout.write_features(frequency, &records)?;
    info!(records = records.len(), path = %path.display(), "📈 Feature dataset written");
    Ok(summary)
}
