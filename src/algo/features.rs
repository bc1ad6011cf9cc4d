//! Performance statistics and feature vectors over market history series

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::Frequency;

/// Guards growth and sharpe denominators against zero
const EPSILON: f64 = 1e-9;

/// One sample of a market history series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
}

/// Statistics over the first `early_window` samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarlyFeatures {
    pub total_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub market_cap_growth: f64,
    pub volume_growth: f64,
    pub avg_volume: f64,
    pub positive_periods: u64,
}

/// Statistics over the first `d` samples for one full window `d`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowFeatures {
    pub total_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub volume_growth: f64,
    pub market_cap_growth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub symbol: Option<String>,
    pub frequency: Frequency,
    pub early: EarlyFeatures,
    /// Keyed by window length; windows longer than the series are absent
    pub windows: BTreeMap<usize, WindowFeatures>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    Ready(FeatureVector),
    InsufficientData { required: usize, available: usize },
}

impl Features {
    pub fn ready(self) -> Option<FeatureVector> {
        match self {
            Features::Ready(vector) => Some(vector),
            Features::InsufficientData { .. } => None,
        }
    }
}

impl FeatureVector {
    /// Flattens into named columns, e.g. `early_return` or `sharpe_30d`
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert(
            "symbol".to_string(),
            self.symbol.clone().map(Value::String).unwrap_or(Value::Null),
        );

        let early = &self.early;
        for (name, value) in [
            ("early_return", early.total_return),
            ("early_volatility", early.volatility),
            ("early_sharpe", early.sharpe),
            ("early_max_drawdown", early.max_drawdown),
            ("early_marketcap_growth", early.market_cap_growth),
            ("early_volume_growth", early.volume_growth),
            ("early_avg_volume", early.avg_volume),
        ] {
            record.insert(name.to_string(), number(value));
        }
        record.insert("early_positive_periods".to_string(), Value::from(early.positive_periods));

        let suffix = self.frequency.suffix();
        for (window, features) in &self.windows {
            for (name, value) in [
                ("return", features.total_return),
                ("volatility", features.volatility),
                ("sharpe", features.sharpe),
                ("max_drawdown", features.max_drawdown),
                ("volume_growth", features.volume_growth),
                ("marketcap_growth", features.market_cap_growth),
            ] {
                record.insert(format!("{}_{}{}", name, window, suffix), number(value));
            }
        }

        record
    }
}

/// Return, volatility and max drawdown of a price series in sample order
pub fn compute_metrics(prices: &[f64]) -> PerformanceMetrics {
    let (first, last) = match (prices.first(), prices.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            return PerformanceMetrics { total_return: 0.0, volatility: 0.0, max_drawdown: 0.0 };
        }
    };

    let log_returns = log_returns(prices);
    PerformanceMetrics {
        total_return: finite((last - first) / first),
        volatility: finite(population_std(&log_returns)),
        max_drawdown: finite(max_drawdown(prices)),
    }
}

/// Builds the feature vector of a history series.
///
/// The series is sorted by timestamp before any window is taken. Fewer
/// samples than `early_window` yields `InsufficientData`; full windows the
/// series cannot fill are left out.
pub fn extract_features(
    symbol: Option<&str>,
    series: &[MarketPoint],
    early_window: usize,
    full_windows: &[usize],
    frequency: Frequency,
) -> Features {
    let required = early_window.max(1);
    if series.len() < required {
        return Features::InsufficientData { required, available: series.len() };
    }

    let mut sorted = series.to_vec();
    sorted.sort_by_key(|point| point.timestamp);

    let prices: Vec<f64> = sorted.iter().map(|p| p.price).collect();
    let market_caps: Vec<f64> = sorted.iter().map(|p| p.market_cap).collect();
    let volumes: Vec<f64> = sorted.iter().map(|p| p.volume).collect();

    let early = early_features(
        &prices[..required],
        &market_caps[..required],
        &volumes[..required],
    );

    let windows = full_windows
        .iter()
        .filter(|&&d| d > 0 && sorted.len() >= d)
        .map(|&d| (d, window_features(&prices[..d], &market_caps[..d], &volumes[..d])))
        .collect();

    Features::Ready(FeatureVector {
        symbol: symbol.map(str::to_string),
        frequency,
        early,
        windows,
    })
}

fn early_features(prices: &[f64], market_caps: &[f64], volumes: &[f64]) -> EarlyFeatures {
    let log_returns = log_returns(prices);
    let positive_periods = prices
        .windows(2)
        .filter(|pair| (pair[1] - pair[0]) / pair[0] > 0.0)
        .count() as u64;

    EarlyFeatures {
        total_return: finite(growth(prices)),
        volatility: finite(population_std(&log_returns)),
        sharpe: finite(sharpe(&log_returns)),
        max_drawdown: finite(max_drawdown(prices)),
        market_cap_growth: finite(growth(market_caps)),
        volume_growth: finite(growth(volumes)),
        avg_volume: finite(mean(volumes)),
        positive_periods,
    }
}

fn window_features(prices: &[f64], market_caps: &[f64], volumes: &[f64]) -> WindowFeatures {
    let log_returns = log_returns(prices);
    WindowFeatures {
        total_return: finite(growth(prices)),
        volatility: finite(population_std(&log_returns)),
        sharpe: finite(sharpe(&log_returns)),
        max_drawdown: finite(max_drawdown(prices)),
        volume_growth: finite(growth(volumes)),
        market_cap_growth: finite(growth(market_caps)),
    }
}

fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|pair| pair[1].ln() - pair[0].ln()).collect()
}

fn growth(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) => (last - first) / (first + EPSILON),
        _ => 0.0,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn sharpe(log_returns: &[f64]) -> f64 {
    mean(log_returns) / (population_std(log_returns) + EPSILON)
}

/// Deepest fall from the running peak, as a non-positive fraction
fn max_drawdown(prices: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &price in prices {
        peak = peak.max(price);
        let drawdown = (price - peak) / peak;
        if !drawdown.is_finite() {
            return f64::NAN;
        }
        worst = worst.min(drawdown);
    }
    worst
}

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map(Value::Number).unwrap_or_else(|| Value::from(0))
}
