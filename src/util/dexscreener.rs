//! DexScreener API client for live pair data of discovered tokens

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MarketApiConfig;
use crate::core::TokenMetrics;
use crate::error::CollectorError;
use crate::util::http::PacedClient;
use crate::util::retry::RetryPolicy;

const CACHE_DURATION_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DexScreenerResponse {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: String,
    pub pairs: Option<Vec<TokenPair>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: PairToken,
    #[serde(rename = "quoteToken")]
    pub quote_token: PairToken,
    #[serde(rename = "priceNative")]
    pub price_native: Option<String>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    pub txns: Option<Transactions>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    pub fdv: Option<f64>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    #[serde(rename = "pairCreatedAt")]
    pub pair_created_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairToken {
    pub address: String,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Transactions {
    pub m5: TransactionCount,
    pub h1: TransactionCount,
    pub h6: TransactionCount,
    pub h24: TransactionCount,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionCount {
    pub buys: u64,
    pub sells: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Volume {
    pub h24: f64,
    pub h6: f64,
    pub h1: f64,
    pub m5: f64,
}

/// Pool reserves. `base` is the token side, `quote` the paired asset.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Liquidity {
    pub usd: f64,
    pub base: f64,
    pub quote: f64,
}

impl TokenPair {
    pub fn price_usd(&self) -> Option<f64> {
        self.price_usd.as_deref().and_then(|p| p.parse().ok())
    }

    pub fn price_native(&self) -> Option<f64> {
        self.price_native.as_deref().and_then(|p| p.parse().ok())
    }

    pub fn is_sol_quoted(&self) -> bool {
        self.quote_token.address == crate::core::SOL_MINT
    }

    /// Converts pair data into token metrics. SOL-denominated values use the
    /// quote reserve directly for SOL pairs and the supplied SOL/USD rate
    /// otherwise. `tx_count` is the last hour's buys and sells. The holder
    /// count is not served by this API.
    pub fn to_metrics(&self, sol_usd: Option<f64>) -> TokenMetrics {
        let liquidity = self.liquidity.clone().unwrap_or_default();
        let volume = self.volume.clone().unwrap_or_default();
        let txns = self.txns.clone().unwrap_or_default();

        let usd_to_sol = |usd: f64| match sol_usd {
            Some(rate) if rate > 0.0 => usd / rate,
            _ => 0.0,
        };

        let liquidity_sol = if self.is_sol_quoted() {
            liquidity.quote
        } else {
            usd_to_sol(liquidity.usd)
        };

        TokenMetrics {
            liquidity_sol,
            holder_count: 0,
            tx_count: txns.h1.buys + txns.h1.sells,
            liquidity_change_pct: 0.0,
            volume_1h_sol: usd_to_sol(volume.h1),
            volume_24h_usd: volume.h24,
            price_usd: self.price_usd(),
            market_cap_usd: self.market_cap.or(self.fdv),
        }
        .sanitized()
    }
}

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub pairs: Vec<TokenPair>,
}

impl TokenInfo {
    /// Pair with the deepest liquidity
    pub fn primary_pair(&self) -> Option<&TokenPair> {
        self.pairs.iter().max_by(|a, b| {
            let la = a.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
            let lb = b.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
            la.total_cmp(&lb)
        })
    }
}

pub struct DexScreenerClient {
    http: PacedClient,
    cache: DashMap<String, (TokenInfo, Instant)>,
}

impl DexScreenerClient {
    pub fn new(config: &MarketApiConfig, retry: RetryPolicy) -> Result<Self, CollectorError> {
        Ok(Self {
            http: PacedClient::new(
                "dexscreener",
                &config.dexscreener_url,
                Duration::from_secs(config.timeout_secs),
                Duration::from_millis(config.min_request_interval_ms),
                retry,
            )?,
            cache: DashMap::new(),
        })
    }

    pub async fn get_token_info(&self, mint: &str) -> Result<TokenInfo, CollectorError> {
        if let Some(cached_info) = self.get_cached_token_info(mint) {
            return Ok(cached_info);
        }

        let token_info = self.fetch_token_info(mint).await?;
        self.cache.insert(mint.to_string(), (token_info.clone(), Instant::now()));
        Ok(token_info)
    }

    async fn fetch_token_info(&self, mint: &str) -> Result<TokenInfo, CollectorError> {
        debug!(mint = %mint, "Fetching token info from DexScreener");
        let data: DexScreenerResponse = self.http.get_json("dexscreener token", mint, &[]).await?;
        parse_pairs(data, mint)
    }

    fn get_cached_token_info(&self, mint: &str) -> Option<TokenInfo> {
        let entry = self.cache.get(mint)?;
        let (info, fetched_at) = entry.value();
        if fetched_at.elapsed().as_secs() < CACHE_DURATION_SECS {
            debug!(mint = %mint, "Using cached DexScreener data");
            Some(info.clone())
        } else {
            None
        }
    }
}

fn parse_pairs(data: DexScreenerResponse, mint: &str) -> Result<TokenInfo, CollectorError> {
    match data.pairs {
        Some(pairs) if !pairs.is_empty() => Ok(TokenInfo { pairs }),
        _ => Err(CollectorError::NotFound(format!("DexScreener pairs for {}", mint))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SOL_MINT;
    use crate::util::http::tests::{quick_retry, serve_fixed};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn pair_json(liquidity_usd: f64, quote: &str) -> serde_json::Value {
        json!({
            "chainId": "solana",
            "dexId": "raydium",
            "pairAddress": "Pair111",
            "baseToken": { "address": "Meme111", "name": "Meme", "symbol": "MEME" },
            "quoteToken": { "address": quote, "name": "Wrapped SOL", "symbol": "SOL" },
            "priceNative": "0.0000021",
            "priceUsd": "0.00031",
            "txns": { "h1": { "buys": 30, "sells": 12 }, "h24": { "buys": 400, "sells": 210 } },
            "volume": { "h24": 52000.0, "h1": 3000.0 },
            "liquidity": { "usd": liquidity_usd, "base": 1.0e9, "quote": 42.5 },
            "marketCap": 310000.0
        })
    }

    #[test]
    fn test_pair_to_metrics() {
        let pair: TokenPair = serde_json::from_value(pair_json(12_000.0, SOL_MINT)).unwrap();
        let metrics = pair.to_metrics(Some(150.0));

        assert_eq!(metrics.liquidity_sol, 42.5);
        // last hour only
        assert_eq!(metrics.tx_count, 42);
        assert_eq!(metrics.volume_1h_sol, 20.0);
        assert_eq!(metrics.volume_24h_usd, 52_000.0);
        assert_eq!(metrics.price_usd, Some(0.00031));
        assert_eq!(metrics.market_cap_usd, Some(310_000.0));
    }

    #[test]
    fn test_non_sol_pair_without_rate() {
        let pair: TokenPair = serde_json::from_value(pair_json(12_000.0, "USDC111")).unwrap();
        let metrics = pair.to_metrics(None);
        assert_eq!(metrics.liquidity_sol, 0.0);
        assert_eq!(metrics.volume_1h_sol, 0.0);
    }

    #[test]
    fn test_primary_pair_is_deepest() {
        let response: DexScreenerResponse = serde_json::from_value(json!({
            "schemaVersion": "1.0.0",
            "pairs": [pair_json(500.0, SOL_MINT), pair_json(90_000.0, "USDC111")]
        }))
        .unwrap();
        let info = parse_pairs(response, "Meme111").unwrap();
        assert_eq!(info.primary_pair().unwrap().quote_token.address, "USDC111");
    }

    #[tokio::test]
    async fn test_rate_limited_lookup_retries_with_backoff() {
        let (url, hits) = serve_fixed("429 Too Many Requests", "{}").await;
        let config = MarketApiConfig {
            dexscreener_url: url,
            min_request_interval_ms: 30,
            ..MarketApiConfig::default()
        };
        let client = DexScreenerClient::new(&config, quick_retry(3)).unwrap();

        let first = client.get_token_info("Meme111").await;
        let second = client.get_token_info("Meme222").await;

        assert!(matches!(first, Err(CollectorError::RetriesExhausted { attempts: 3, .. })));
        assert!(matches!(second, Err(CollectorError::RetriesExhausted { attempts: 3, .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_lookup_is_cached() {
        let body = r#"{"schemaVersion":"1.0.0","pairs":[{"chainId":"solana","dexId":"raydium","pairAddress":"P","baseToken":{"address":"Meme111","name":"Meme","symbol":"MEME"},"quoteToken":{"address":"So11111111111111111111111111111111111111112","name":"Wrapped SOL","symbol":"SOL"},"priceUsd":"0.5"}]}"#;
        let (url, hits) = serve_fixed("200 OK", body).await;
        let config = MarketApiConfig { dexscreener_url: url, ..MarketApiConfig::default() };
        let client = DexScreenerClient::new(&config, quick_retry(1)).unwrap();

        let info = client.get_token_info("Meme111").await.unwrap();
        assert_eq!(info.primary_pair().and_then(|p| p.price_usd()), Some(0.5));
        client.get_token_info("Meme111").await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_null_pairs_is_not_found() {
        let response: DexScreenerResponse =
            serde_json::from_value(json!({ "schemaVersion": "1.0.0", "pairs": null })).unwrap();
        assert!(matches!(parse_pairs(response, "x"), Err(CollectorError::NotFound(_))));
    }
}
