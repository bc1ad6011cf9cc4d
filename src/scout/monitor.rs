use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::core::{RunSummary, Token};

use super::dedup::SignatureDeduplicator;
use super::metrics::{MetricSource, SnapshotSink};
use super::scanner::{DiscoveryScanner, TransactionFeed};
use super::scheduler::TieredScheduler;

/// Totals of one monitoring session
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSummary {
    pub polls: u64,
    pub sweeps: u64,
    pub discovered: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub aged_out: u64,
    pub refreshed: u64,
    pub fetches: RunSummary,
    /// Discovery transactions that could not be fetched
    pub failed_signatures: Vec<String>,
}

/// Single task owning discovery, scheduling and snapshot persistence.
///
/// Discovery polls and scheduler sweeps run on separate ticks multiplexed
/// with the shutdown signal; nothing here is shared across tasks.
pub struct TokenMonitor<F: ?Sized, S, K> {
    feed: Arc<F>,
    source: S,
    sink: K,
    scanners: Vec<DiscoveryScanner>,
    dedup: SignatureDeduplicator,
    scheduler: TieredScheduler,
    poll_interval: Duration,
    sweep_interval: Duration,
    fetch_initial_metrics: bool,
}

impl<F, S, K> TokenMonitor<F, S, K>
where
    F: TransactionFeed + ?Sized,
    S: MetricSource,
    K: SnapshotSink,
{
    pub fn new(config: &Config, feed: Arc<F>, source: S, sink: K, scanners: Vec<DiscoveryScanner>) -> Self {
        Self {
            feed,
            source,
            sink,
            scanners,
            dedup: SignatureDeduplicator::new(),
            scheduler: TieredScheduler::new(&config.scheduler),
            poll_interval: Duration::from_secs(config.discovery.poll_interval_secs),
            sweep_interval: Duration::from_secs(config.scheduler.sweep_interval_secs),
            fetch_initial_metrics: true,
        }
    }

    /// Skip the metric fetch at discovery time; liquidity change is then
    /// measured from the admission check onward.
    pub fn without_initial_metrics(mut self) -> Self {
        self.fetch_initial_metrics = false;
        self
    }

    pub fn scheduler(&self) -> &TieredScheduler {
        &self.scheduler
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    #[instrument(skip_all)]
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> MonitorSummary {
        let mut summary = MonitorSummary::default();
        let mut poll_tick = interval(self.poll_interval);
        let mut sweep_tick = interval(self.sweep_interval);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            platforms = ?self.scanners.iter().map(|s| s.platform()).collect::<Vec<_>>(),
            capacity = self.scheduler.monitored().capacity(),
            "👀 Token monitor started"
        );

        loop {
            tokio::select! {
                _ = poll_tick.tick() => {
                    summary.polls += 1;
                    summary.discovered += self.poll_discoveries().await;
                }
                _ = sweep_tick.tick() => {
                    summary.sweeps += 1;
                    self.sweep(&mut summary).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutdown requested, stopping monitor");
                    break;
                }
            }
        }

        summary.failed_signatures = self
            .scanners
            .iter()
            .flat_map(|s| s.stats().failed_signatures.iter().cloned())
            .collect();

        if let Err(e) = self.sink.flush() {
            warn!(error = %e, "Failed to flush metric snapshots");
        }

        info!(
            discovered = summary.discovered,
            admitted = summary.admitted,
            rejected = summary.rejected,
            monitored = self.scheduler.monitored().len(),
            "Token monitor stopped"
        );
        summary
    }

    async fn poll_discoveries(&mut self) -> u64 {
        let mut discovered = 0;

        for scanner in &mut self.scanners {
            let events = match scanner.poll_cycle(&*self.feed, &self.dedup).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(platform = %scanner.platform(), error = %e, "Discovery poll failed");
                    continue;
                }
            };

            for event in events {
                let initial = if self.fetch_initial_metrics {
                    match self.source.fetch_metrics(&event.mint).await {
                        Ok(metrics) => Some(metrics),
                        Err(e) => {
                            debug!(mint = %event.mint, error = %e, "No initial metrics");
                            None
                        }
                    }
                } else {
                    None
                };

                let token = Token::from_discovery(&event);
                if self.scheduler.discover(token, initial, Utc::now()) {
                    discovered += 1;
                    info!(
                        mint = %event.mint,
                        symbol = event.symbol.as_deref().unwrap_or("Unknown"),
                        platform = %event.platform,
                        "🎉 New token queued for observation"
                    );
                }
            }
        }

        discovered
    }

    async fn sweep(&mut self, summary: &mut MonitorSummary) {
        let report = self.scheduler.run_sweep(Utc::now(), &self.source, &mut self.sink).await;

        summary.admitted += report.admitted.len() as u64;
        summary.rejected += report.rejected.len() as u64;
        summary.evicted += report.evicted.len() as u64;
        summary.aged_out += report.aged_out.len() as u64;
        summary.refreshed += report.refreshed as u64;

        if report.fetches.attempted > 0 || !report.aged_out.is_empty() {
            debug!(
                admitted = report.admitted.len(),
                rejected = report.rejected.len(),
                refreshed = report.refreshed,
                failed = report.fetches.failed,
                pending = self.scheduler.pending_count(),
                monitored = self.scheduler.monitored().len(),
                "Sweep complete"
            );
        }
        summary.fetches.merge(report.fetches);
    }
}
