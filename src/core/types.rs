use std::str::FromStr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Launch platforms we discover tokens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    PumpFun,
    Raydium,
}

impl Platform {
    pub fn from_program_id(program_id: &str) -> Option<Self> {
        match program_id {
            constants::PUMP_FUN_PROGRAM => Some(Platform::PumpFun),
            constants::RAYDIUM_AMM_PROGRAM => Some(Platform::Raydium),
            _ => None,
        }
    }

    pub fn program_id(&self) -> &'static str {
        match self {
            Platform::PumpFun => constants::PUMP_FUN_PROGRAM,
            Platform::Raydium => constants::RAYDIUM_AMM_PROGRAM,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::PumpFun => write!(f, "pump_fun"),
            Platform::Raydium => write!(f, "raydium"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pump-fun" | "pump_fun" | "pumpfun" | "pump" => Ok(Platform::PumpFun),
            "raydium" => Ok(Platform::Raydium),
            other => Err(format!("unknown platform '{}', expected pump-fun or raydium", other)),
        }
    }
}

/// Sampling frequency of a market history series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Hourly,
    Minute,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Hourly => "hourly",
            Frequency::Minute => "minute",
        }
    }

    /// Column suffix used in feature records (`return_30d`, `return_24h`, ...)
    pub fn suffix(&self) -> char {
        match self {
            Frequency::Daily => 'd',
            Frequency::Hourly => 'h',
            Frequency::Minute => 'm',
        }
    }

    /// Days of history the market API serves at this granularity
    pub fn history_days(&self) -> u32 {
        match self {
            Frequency::Daily => 365,
            Frequency::Hourly => 90,
            Frequency::Minute => 7,
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Frequency::Daily),
            "hourly" | "h" => Ok(Frequency::Hourly),
            "minute" | "m" => Ok(Frequency::Minute),
            other => Err(format!("unknown frequency '{}', expected daily, hourly or minute", other)),
        }
    }
}

/// One compiled instruction of a fetched transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Index of the invoked program in the transaction's account-key table
    pub program_index: usize,
    /// Indices of the instruction accounts in the same table
    pub account_indices: Vec<usize>,
    pub data: Vec<u8>,
}

/// A fetched transaction, reduced to what the classifier needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub account_keys: Vec<String>,
    pub instructions: Vec<Instruction>,
}

impl RawTransaction {
    pub fn account_key(&self, index: usize) -> Option<&str> {
        self.account_keys.get(index).map(String::as_str)
    }

    pub fn block_time_utc(&self) -> Option<DateTime<Utc>> {
        self.block_time.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
    }
}

/// Typed result of decoding one tracked instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodedEvent {
    TokenCreated {
        mint: String,
        name: String,
        symbol: String,
        metadata_uri: String,
    },
    PoolInitialized {
        token_a: String,
        token_b: String,
        new_token_mint: String,
    },
    Buy,
    Sell,
    Unknown,
}

/// Record emitted on the discovery stream for every novel token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    pub mint: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub metadata_uri: Option<String>,
    pub signature: String,
    pub slot: u64,
    pub platform: Platform,
    pub timestamp: DateTime<Utc>,
}

/// Monitoring priority. Lower number = refreshed more often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Tier {
    pub fn from_score(score: u8) -> Self {
        if score >= 7 {
            Tier::High
        } else if score >= 4 {
            Tier::Medium
        } else {
            Tier::Low
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Token under (or awaiting) monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub platform: Platform,
    pub creation_tx: String,
    pub monitoring_tier: Tier,
    pub last_metric_check: Option<DateTime<Utc>>,
    pub initial_metrics: Option<TokenMetrics>,
}

impl Token {
    pub fn from_discovery(event: &DiscoveryEvent) -> Self {
        Self {
            mint: event.mint.clone(),
            name: event.name.clone().unwrap_or_else(|| "Unknown".to_string()),
            symbol: event.symbol.clone().unwrap_or_else(|| "Unknown".to_string()),
            created_at: event.timestamp,
            platform: event.platform,
            creation_tx: event.signature.clone(),
            monitoring_tier: Tier::Low,
            last_metric_check: None,
            initial_metrics: None,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now.signed_duration_since(self.created_at)
    }
}

/// Point-in-time metrics for a token. Every field defaults to zero/absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenMetrics {
    pub liquidity_sol: f64,
    pub holder_count: u64,
    /// Transactions in the last hour
    pub tx_count: u64,
    /// Liquidity change since discovery, in percent (negative = withdrawn)
    pub liquidity_change_pct: f64,
    pub volume_1h_sol: f64,
    pub volume_24h_usd: f64,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
}

impl TokenMetrics {
    /// Normalizes values coming from external sources: non-finite and
    /// negative magnitudes become zero, non-positive prices become absent.
    pub fn sanitized(mut self) -> Self {
        fn non_negative(v: f64) -> f64 {
            if v.is_finite() && v > 0.0 { v } else { 0.0 }
        }
        self.liquidity_sol = non_negative(self.liquidity_sol);
        self.volume_1h_sol = non_negative(self.volume_1h_sol);
        self.volume_24h_usd = non_negative(self.volume_24h_usd);
        if !self.liquidity_change_pct.is_finite() {
            self.liquidity_change_pct = 0.0;
        }
        self.price_usd = self.price_usd.filter(|p| p.is_finite() && *p > 0.0);
        self.market_cap_usd = self.market_cap_usd.filter(|m| m.is_finite() && *m > 0.0);
        self
    }
}

/// Append-only metric sample tied to one token and one timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetricSnapshot {
    pub mint: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub monitoring_tier: Tier,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub volume_24h_usd: f64,
    pub liquidity_sol: f64,
    pub holder_count: u64,
}

impl TokenMetricSnapshot {
    pub fn new(token: &Token, metrics: &TokenMetrics, timestamp: DateTime<Utc>) -> Self {
        Self {
            mint: token.mint.clone(),
            symbol: token.symbol.clone(),
            timestamp,
            monitoring_tier: token.monitoring_tier,
            price_usd: metrics.price_usd.unwrap_or(0.0),
            market_cap_usd: metrics.market_cap_usd.unwrap_or(0.0),
            volume_24h_usd: metrics.volume_24h_usd,
            liquidity_sol: metrics.liquidity_sol,
            holder_count: metrics.holder_count,
        }
    }
}

/// Totals reported at the end of every collection run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_ids: Vec<String>,
}

impl RunSummary {
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    /// Counts a failed attempt. Each id is listed once however often it fails.
    pub fn record_failure(&mut self, id: impl Into<String>) {
        self.attempted += 1;
        self.failed += 1;
        self.push_failed_id(id.into());
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        for id in other.failed_ids {
            self.push_failed_id(id);
        }
    }

    fn push_failed_id(&mut self, id: String) {
        if !self.failed_ids.contains(&id) {
            self.failed_ids.push(id);
        }
    }
}

/// Program IDs and well-known mints
pub mod constants {
    pub const RAYDIUM_AMM_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
    pub const PUMP_FUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
    pub const SPL_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

    // Canonical wrapped-native-asset mint
    pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
}

/// Utility functions for Solana data
pub mod utils {
    /// Convert pubkey to shortened display format
    pub fn shorten_pubkey(pubkey: &str) -> String {
        let chars: Vec<char> = pubkey.chars().collect();
        if chars.len() >= 16 {
            let head: String = chars[..8].iter().collect();
            let tail: String = chars[chars.len() - 8..].iter().collect();
            format!("{}...{}", head, tail)
        } else {
            pubkey.to_string()
        }
    }

    /// Extract token amount considering decimals
    pub fn token_amount_to_ui(raw_amount: u64, decimals: u8) -> f64 {
        raw_amount as f64 / 10_f64.powi(decimals as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_program_roundtrip() {
        assert_eq!(Platform::from_program_id(constants::PUMP_FUN_PROGRAM), Some(Platform::PumpFun));
        assert_eq!(Platform::from_program_id(constants::RAYDIUM_AMM_PROGRAM), Some(Platform::Raydium));
        assert_eq!(Platform::from_program_id(constants::SPL_TOKEN_PROGRAM), None);
    }

    #[test]
    fn test_parse_cli_values() {
        assert_eq!("pump-fun".parse::<Platform>(), Ok(Platform::PumpFun));
        assert_eq!("Raydium".parse::<Platform>(), Ok(Platform::Raydium));
        assert!("orca".parse::<Platform>().is_err());
        assert_eq!("hourly".parse::<Frequency>(), Ok(Frequency::Hourly));
        assert_eq!(Frequency::Minute.suffix(), 'm');
        assert_eq!(Frequency::Daily.history_days(), 365);
    }

    #[test]
    fn test_tier_from_score() {
        assert_eq!(Tier::from_score(9), Tier::High);
        assert_eq!(Tier::from_score(7), Tier::High);
        assert_eq!(Tier::from_score(6), Tier::Medium);
        assert_eq!(Tier::from_score(4), Tier::Medium);
        assert_eq!(Tier::from_score(3), Tier::Low);
        assert_eq!(Tier::from_score(0), Tier::Low);
    }

    #[test]
    fn test_sanitized_metrics() {
        let metrics = TokenMetrics {
            liquidity_sol: f64::NAN,
            volume_1h_sol: -4.0,
            liquidity_change_pct: f64::NEG_INFINITY,
            price_usd: Some(0.0),
            market_cap_usd: Some(12_000.0),
            ..Default::default()
        }
        .sanitized();

        assert_eq!(metrics.liquidity_sol, 0.0);
        assert_eq!(metrics.volume_1h_sol, 0.0);
        assert_eq!(metrics.liquidity_change_pct, 0.0);
        assert_eq!(metrics.price_usd, None);
        assert_eq!(metrics.market_cap_usd, Some(12_000.0));
    }

    #[test]
    fn test_display_helpers() {
        assert_eq!(utils::token_amount_to_ui(1_500_000, 6), 1.5);
        assert_eq!(utils::shorten_pubkey(constants::SOL_MINT), "So111111...11111112");
        assert_eq!(utils::shorten_pubkey("short"), "short");
        // multi-byte characters are kept whole
        assert_eq!(utils::shorten_pubkey("ééééééééééééééééé"), "éééééééé...éééééééé");
        assert_eq!(utils::shorten_pubkey("🚀🚀🚀🚀🚀🚀🚀🚀🚀🚀🚀🚀🚀🚀🚀x"), "🚀🚀🚀🚀🚀🚀🚀🚀...🚀🚀🚀🚀🚀🚀🚀x");
    }

    #[test]
    fn test_run_summary_counts() {
        let mut summary = RunSummary::default();
        summary.record_success();
        summary.record_failure("bonk");
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed_ids, vec!["bonk".to_string()]);
    }

    #[test]
    fn test_run_summary_lists_each_failed_id_once() {
        let mut summary = RunSummary::default();
        summary.record_failure("bonk");
        summary.record_failure("bonk");

        let mut sweep = RunSummary::default();
        sweep.record_failure("bonk");
        sweep.record_failure("wif");
        summary.merge(sweep);

        assert_eq!(summary.failed, 4);
        assert_eq!(summary.failed_ids, vec!["bonk".to_string(), "wif".to_string()]);
    }
}
