//! Tiered monitoring schedule for discovered tokens
//!
//! Tokens move `Pending -> Monitored(tier) | Rejected`. Monitored tokens are
//! rescored on every refresh and leave the set when they age out or when a
//! newer admission needs the room of an old tier-3 token. Planning a sweep is
//! pure; only `run_sweep` awaits, and only on metric fetches.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{SchedulerConfig, TierIntervals, MAX_INTERVAL_SECS, MAX_TOKEN_AGE_DAYS};
use crate::core::types::utils::shorten_pubkey;
use crate::core::{RunSummary, Tier, Token, TokenMetricSnapshot, TokenMetrics};

use super::admission::{AdmissionCriteria, AdmissionReport, TierScorer};
use super::metrics::{MetricSource, SnapshotSink};

/// Result of inserting into a `MonitoredSet`
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted { evicted: Option<Token> },
    Updated,
    /// Set is full and holds no tier-3 token
    Rejected,
}

/// Bounded mint → token map. `len() <= capacity()` always holds.
#[derive(Debug, Clone)]
pub struct MonitoredSet {
    capacity: usize,
    tokens: HashMap<String, Token>,
}

impl MonitoredSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tokens: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.tokens.contains_key(mint)
    }

    pub fn get(&self, mint: &str) -> Option<&Token> {
        self.tokens.get(mint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn remove(&mut self, mint: &str) -> Option<Token> {
        self.tokens.remove(mint)
    }

    /// Inserts `token`, evicting the oldest-created tier-3 token when full.
    pub fn insert(&mut self, token: Token) -> InsertOutcome {
        if let Some(existing) = self.tokens.get_mut(&token.mint) {
            *existing = token;
            return InsertOutcome::Updated;
        }

        let evicted = if self.tokens.len() >= self.capacity {
            match self.eviction_candidate() {
                Some(mint) => self.tokens.remove(&mint),
                None => return InsertOutcome::Rejected,
            }
        } else {
            None
        };

        self.tokens.insert(token.mint.clone(), token);
        InsertOutcome::Inserted { evicted }
    }

    fn eviction_candidate(&self) -> Option<String> {
        self.tokens
            .values()
            .filter(|t| t.monitoring_tier == Tier::Low)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.mint.cmp(&b.mint)))
            .map(|t| t.mint.clone())
    }
}

/// Token waiting out the observation delay
#[derive(Debug, Clone)]
pub struct PendingToken {
    pub token: Token,
    pub discovered_at: DateTime<Utc>,
    /// Admission metric fetches that failed so far
    pub failed_fetches: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Pending,
    Monitored(Tier),
    Rejected,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    Admitted { tier: Tier, evicted: Option<String> },
    /// Too few admission checks passed
    Rejected(AdmissionReport),
    /// Passed the checks but the set is full of higher-tier tokens
    CapacityFull,
}

/// Work due at one instant. Mints are listed in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    pub aged_out: Vec<String>,
    pub due_admissions: Vec<String>,
    pub due_refreshes: Vec<String>,
}

impl SweepPlan {
    pub fn is_empty(&self) -> bool {
        self.aged_out.is_empty() && self.due_admissions.is_empty() && self.due_refreshes.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub aged_out: Vec<String>,
    pub admitted: Vec<String>,
    pub rejected: Vec<String>,
    pub evicted: Vec<String>,
    pub refreshed: usize,
    /// Metric fetches of this sweep
    pub fetches: RunSummary,
}

pub struct TieredScheduler {
    criteria: AdmissionCriteria,
    scorer: TierScorer,
    intervals: TierIntervals,
    observation_delay: ChronoDuration,
    max_age: ChronoDuration,
    max_admission_attempts: u32,
    pending: HashMap<String, PendingToken>,
    rejected: HashSet<String>,
    monitored: MonitoredSet,
}

impl TieredScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            criteria: AdmissionCriteria::from_config(config),
            scorer: TierScorer::from_config(config),
            intervals: config.tier_intervals.clone(),
            observation_delay: seconds(config.observation_delay_secs),
            max_age: ChronoDuration::days(config.max_token_age_days.clamp(0, MAX_TOKEN_AGE_DAYS)),
            max_admission_attempts: config.max_admission_attempts.max(1),
            pending: HashMap::new(),
            rejected: HashSet::new(),
            monitored: MonitoredSet::new(config.capacity),
        }
    }

    pub fn monitored(&self) -> &MonitoredSet {
        &self.monitored
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn state(&self, mint: &str) -> TokenState {
        if let Some(token) = self.monitored.get(mint) {
            TokenState::Monitored(token.monitoring_tier)
        } else if self.pending.contains_key(mint) {
            TokenState::Pending
        } else if self.rejected.contains(mint) {
            TokenState::Rejected
        } else {
            TokenState::Unknown
        }
    }

    /// Queues a newly discovered token for admission. Returns `false` for
    /// mints already pending, monitored or rejected.
    pub fn discover(&mut self, mut token: Token, initial_metrics: Option<TokenMetrics>, now: DateTime<Utc>) -> bool {
        if self.state(&token.mint) != TokenState::Unknown {
            return false;
        }

        token.initial_metrics = initial_metrics.map(TokenMetrics::sanitized);
        debug!(mint = %shorten_pubkey(&token.mint), symbol = %token.symbol, "Token pending admission");
        self.pending.insert(
            token.mint.clone(),
            PendingToken {
                token,
                discovered_at: now,
                failed_fetches: 0,
            },
        );
        true
    }

    pub fn refresh_interval(&self, tier: Tier) -> ChronoDuration {
        let secs = match tier {
            Tier::High => self.intervals.high_secs,
            Tier::Medium => self.intervals.medium_secs,
            Tier::Low => self.intervals.low_secs,
        };
        seconds(secs)
    }

    pub fn is_refresh_due(&self, token: &Token, now: DateTime<Utc>) -> bool {
        match token.last_metric_check {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.refresh_interval(token.monitoring_tier),
        }
    }

    fn is_aged_out(&self, token: &Token, now: DateTime<Utc>) -> bool {
        token.age(now) > self.max_age
    }

    pub fn plan_sweep(&self, now: DateTime<Utc>) -> SweepPlan {
        let mut aged_out: Vec<String> = self
            .monitored
            .iter()
            .chain(self.pending.values().map(|p| &p.token))
            .filter(|t| self.is_aged_out(t, now))
            .map(|t| t.mint.clone())
            .collect();
        aged_out.sort();

        let mut admissions: Vec<&PendingToken> = self
            .pending
            .values()
            .filter(|p| !self.is_aged_out(&p.token, now))
            .filter(|p| now.signed_duration_since(p.discovered_at) >= self.observation_delay)
            .collect();
        admissions.sort_by(|a, b| a.discovered_at.cmp(&b.discovered_at).then_with(|| a.token.mint.cmp(&b.token.mint)));

        let mut refreshes: Vec<&Token> = self
            .monitored
            .iter()
            .filter(|t| !self.is_aged_out(t, now) && self.is_refresh_due(t, now))
            .collect();
        refreshes.sort_by(|a, b| a.monitoring_tier.cmp(&b.monitoring_tier).then_with(|| a.mint.cmp(&b.mint)));

        SweepPlan {
            aged_out,
            due_admissions: admissions.into_iter().map(|p| p.token.mint.clone()).collect(),
            due_refreshes: refreshes.into_iter().map(|t| t.mint.clone()).collect(),
        }
    }

    /// Drops an aged-out token from whichever state holds it
    pub fn retire(&mut self, mint: &str) -> bool {
        self.monitored.remove(mint).is_some() || self.pending.remove(mint).is_some()
    }

    /// Counts a failed admission fetch. Once the attempt budget is spent the
    /// token is rejected for good and `true` is returned.
    pub fn record_admission_failure(&mut self, mint: &str) -> bool {
        let Some(pending) = self.pending.get_mut(mint) else {
            return false;
        };
        pending.failed_fetches += 1;
        if pending.failed_fetches < self.max_admission_attempts {
            return false;
        }

        self.pending.remove(mint);
        self.rejected.insert(mint.to_string());
        true
    }

    /// Decides admission for a pending token. `None` if the mint is not
    /// pending.
    pub fn admit(&mut self, mint: &str, metrics: TokenMetrics, now: DateTime<Utc>) -> Option<AdmissionOutcome> {
        let PendingToken { mut token, .. } = self.pending.remove(mint)?;
        let metrics = with_liquidity_change(metrics.sanitized(), token.initial_metrics.as_ref());

        let report = self.criteria.evaluate(&metrics);
        if report.passed() < self.criteria.min_passed {
            info!(
                mint = %shorten_pubkey(mint),
                symbol = %token.symbol,
                passed = report.passed(),
                "❌ Token rejected"
            );
            self.rejected.insert(mint.to_string());
            return Some(AdmissionOutcome::Rejected(report));
        }

        let tier = self.scorer.tier(&metrics);
        token.monitoring_tier = tier;
        token.last_metric_check = Some(now);
        if token.initial_metrics.is_none() {
            token.initial_metrics = Some(metrics);
        }
        let symbol = token.symbol.clone();

        match self.monitored.insert(token) {
            InsertOutcome::Inserted { evicted } => {
                let evicted = evicted.map(|t| t.mint);
                info!(
                    mint = %shorten_pubkey(mint),
                    symbol = %symbol,
                    tier = tier.as_u8(),
                    passed = report.passed(),
                    evicted = ?evicted,
                    monitored = self.monitored.len(),
                    "📊 Token admitted to monitoring"
                );
                Some(AdmissionOutcome::Admitted { tier, evicted })
            }
            InsertOutcome::Updated => Some(AdmissionOutcome::Admitted { tier, evicted: None }),
            InsertOutcome::Rejected => {
                info!(mint = %shorten_pubkey(mint), "Monitoring set full of higher-tier tokens, rejecting");
                self.rejected.insert(mint.to_string());
                Some(AdmissionOutcome::CapacityFull)
            }
        }
    }

    /// Rescores a monitored token from fresh metrics and stamps the check.
    pub fn apply_refresh(
        &mut self,
        mint: &str,
        metrics: TokenMetrics,
        now: DateTime<Utc>,
    ) -> Option<TokenMetricSnapshot> {
        let metrics = metrics.sanitized();
        let tier = self.scorer.tier(&metrics);

        let token = self.monitored.tokens.get_mut(mint)?;
        if token.monitoring_tier != tier {
            debug!(
                mint = %shorten_pubkey(mint),
                from = token.monitoring_tier.as_u8(),
                to = tier.as_u8(),
                "Tier changed"
            );
        }
        token.monitoring_tier = tier;
        token.last_metric_check = Some(now);
        Some(TokenMetricSnapshot::new(token, &metrics, now))
    }

    /// Executes the plan for `now`: retires aged tokens, decides due
    /// admissions and refreshes due tokens, recording a snapshot for every
    /// successful metric check.
    pub async fn run_sweep<S, K>(&mut self, now: DateTime<Utc>, source: &S, sink: &mut K) -> SweepReport
    where
        S: MetricSource + ?Sized,
        K: SnapshotSink + ?Sized,
    {
        let plan = self.plan_sweep(now);
        let mut report = SweepReport::default();

        for mint in plan.aged_out {
            if self.retire(&mint) {
                info!(mint = %shorten_pubkey(&mint), "⌛ Token aged out of monitoring");
                report.aged_out.push(mint);
            }
        }

        for mint in plan.due_admissions {
            let metrics = match source.fetch_metrics(&mint).await {
                Ok(metrics) => metrics,
                Err(e) => {
                    report.fetches.record_failure(mint.as_str());
                    if self.record_admission_failure(&mint) {
                        warn!(mint = %shorten_pubkey(&mint), error = %e, "❌ Admission metrics unavailable, giving up");
                        report.rejected.push(mint);
                    } else {
                        // Stays pending, retried on the next sweep
                        warn!(mint = %shorten_pubkey(&mint), error = %e, "Admission metrics unavailable");
                    }
                    continue;
                }
            };
            report.fetches.record_success();

            match self.admit(&mint, metrics.clone(), now) {
                Some(AdmissionOutcome::Admitted { evicted, .. }) => {
                    if let Some(token) = self.monitored.get(&mint) {
                        record_snapshot(sink, &TokenMetricSnapshot::new(token, &metrics.sanitized(), now));
                    }
                    report.evicted.extend(evicted);
                    report.admitted.push(mint);
                }
                Some(AdmissionOutcome::Rejected(_)) | Some(AdmissionOutcome::CapacityFull) => report.rejected.push(mint),
                None => {}
            }
        }

        for mint in plan.due_refreshes {
            if !self.monitored.contains(&mint) {
                continue;
            }
            match source.fetch_metrics(&mint).await {
                Ok(metrics) => {
                    report.fetches.record_success();
                    if let Some(snapshot) = self.apply_refresh(&mint, metrics, now) {
                        record_snapshot(sink, &snapshot);
                        report.refreshed += 1;
                    }
                }
                Err(e) => {
                    warn!(mint = %shorten_pubkey(&mint), error = %e, "Metric refresh failed");
                    report.fetches.record_failure(mint);
                }
            }
        }

        report
    }
}

fn seconds(secs: u64) -> ChronoDuration {
    ChronoDuration::seconds(secs.min(MAX_INTERVAL_SECS) as i64)
}

fn record_snapshot<K: SnapshotSink + ?Sized>(sink: &mut K, snapshot: &TokenMetricSnapshot) {
    if let Err(e) = sink.record(snapshot) {
        warn!(mint = %shorten_pubkey(&snapshot.mint), error = %e, "Failed to persist metric snapshot");
    }
}

/// Fills the liquidity change relative to the metrics seen at discovery
fn with_liquidity_change(mut metrics: TokenMetrics, initial: Option<&TokenMetrics>) -> TokenMetrics {
    if let Some(initial) = initial {
        if initial.liquidity_sol > 0.0 {
            metrics.liquidity_change_pct = (metrics.liquidity_sol - initial.liquidity_sol) / initial.liquidity_sol * 100.0;
        }
    }
    metrics
}
