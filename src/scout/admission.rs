//! Admission checks and tier scoring for discovered tokens

use serde::Serialize;

use crate::config::{AdmissionThresholds, SchedulerConfig, TierThresholds};
use crate::core::{Tier, TokenMetrics};

pub const ADMISSION_CHECKS: usize = 5;

/// Five-check admission filter applied once the observation delay has passed
#[derive(Debug, Clone)]
pub struct AdmissionCriteria {
    pub min_liquidity_sol: f64,
    pub min_holders: u64,
    pub min_transactions: u64,
    pub min_liquidity_change_pct: f64,
    pub min_volume_1h_sol: f64,
    pub min_passed: usize,
}

impl Default for AdmissionCriteria {
    fn default() -> Self {
        Self::from_thresholds(&AdmissionThresholds::default())
    }
}

/// Outcome of each admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionReport {
    pub min_liquidity: bool,
    pub min_holders: bool,
    pub min_transactions: bool,
    pub not_rugged: bool,
    pub active_trading: bool,
}

impl AdmissionReport {
    pub fn passed(&self) -> usize {
        [
            self.min_liquidity,
            self.min_holders,
            self.min_transactions,
            self.not_rugged,
            self.active_trading,
        ]
        .iter()
        .filter(|&&ok| ok)
        .count()
    }
}

impl AdmissionCriteria {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::from_thresholds(&config.admission)
    }

    fn from_thresholds(t: &AdmissionThresholds) -> Self {
        Self {
            min_liquidity_sol: t.min_liquidity_sol,
            min_holders: t.min_holders,
            min_transactions: t.min_transactions,
            min_liquidity_change_pct: t.min_liquidity_change_pct,
            min_volume_1h_sol: t.min_volume_1h_sol,
            min_passed: t.min_passed,
        }
    }

    pub fn evaluate(&self, metrics: &TokenMetrics) -> AdmissionReport {
        AdmissionReport {
            min_liquidity: metrics.liquidity_sol >= self.min_liquidity_sol,
            min_holders: metrics.holder_count >= self.min_holders,
            min_transactions: metrics.tx_count >= self.min_transactions,
            not_rugged: metrics.liquidity_change_pct > self.min_liquidity_change_pct,
            active_trading: metrics.volume_1h_sol > self.min_volume_1h_sol,
        }
    }

    pub fn admits(&self, metrics: &TokenMetrics) -> bool {
        self.evaluate(metrics).passed() >= self.min_passed
    }
}

/// Maps metrics to a 0..=9 score and a monitoring tier
#[derive(Debug, Clone, Default)]
pub struct TierScorer {
    thresholds: TierThresholds,
}

impl TierScorer {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self { thresholds: config.tiers.clone() }
    }

    pub fn score(&self, metrics: &TokenMetrics) -> u8 {
        let t = &self.thresholds;
        band_points(metrics.liquidity_sol, &t.liquidity_sol)
            + band_points(metrics.holder_count as f64, &t.holders.map(|h| h as f64))
            + band_points(metrics.volume_1h_sol, &t.volume_1h_sol)
    }

    pub fn tier(&self, metrics: &TokenMetrics) -> Tier {
        Tier::from_score(self.score(metrics))
    }
}

/// 3, 2 or 1 points for exceeding the first, second or third band
fn band_points(value: f64, bands: &[f64; 3]) -> u8 {
    if value > bands[0] {
        3
    } else if value > bands[1] {
        2
    } else if value > bands[2] {
        1
    } else {
        0
    }
}
