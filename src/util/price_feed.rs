//! Real-time price feed integration with Jupiter API primary and DexScreener fallback

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::MarketApiConfig;
use crate::core::SOL_MINT;
use crate::error::CollectorError;
use crate::util::dexscreener::DexScreenerClient;
use crate::util::http::PacedClient;
use crate::util::retry::RetryPolicy;

const CACHE_DURATION_SECS: u64 = 30;

pub struct PriceFeed {
    jupiter: PacedClient,
    token_cache: DashMap<String, (f64, Instant)>,
    sol_rate_cache: Mutex<Option<(f64, Instant)>>,
    dexscreener_client: DexScreenerClient,
}

impl PriceFeed {
    pub fn new(
        config: &MarketApiConfig,
        retry: RetryPolicy,
        dexscreener_client: DexScreenerClient,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            jupiter: PacedClient::new(
                "jupiter",
                &config.jupiter_url,
                Duration::from_secs(config.timeout_secs),
                Duration::from_millis(config.min_request_interval_ms),
                retry,
            )?,
            token_cache: DashMap::new(),
            sol_rate_cache: Mutex::new(None),
            dexscreener_client,
        })
    }

    pub fn dexscreener(&self) -> &DexScreenerClient {
        &self.dexscreener_client
    }

    pub async fn get_token_price(&self, mint: &str) -> Result<f64, CollectorError> {
        if let Some(cached_price) = self.get_cached_token_price(mint) {
            return Ok(cached_price);
        }

        match self.fetch_jupiter_price(mint).await {
            Ok(price) => {
                self.token_cache.insert(mint.to_string(), (price, Instant::now()));
                debug!(mint = %mint, price = price, "Jupiter price");
                Ok(price)
            }
            Err(jupiter_error) => {
                warn!(mint = %mint, error = %jupiter_error, "Jupiter price failed, falling back to DexScreener");

                let info = self.dexscreener_client.get_token_info(mint).await?;
                let price = info
                    .primary_pair()
                    .and_then(|pair| pair.price_usd())
                    .ok_or_else(|| CollectorError::NotFound(format!("price for {}", mint)))?;
                self.token_cache.insert(mint.to_string(), (price, Instant::now()));
                Ok(price)
            }
        }
    }

    pub async fn get_sol_usd_rate(&self) -> Result<f64, CollectorError> {
        let mut cache = self.sol_rate_cache.lock().await;
        if let Some((rate, fetched_at)) = *cache {
            if fetched_at.elapsed().as_secs() < CACHE_DURATION_SECS {
                return Ok(rate);
            }
        }

        let rate = self.fetch_jupiter_price(SOL_MINT).await?;
        *cache = Some((rate, Instant::now()));
        Ok(rate)
    }

    async fn fetch_jupiter_price(&self, mint: &str) -> Result<f64, CollectorError> {
        let data: Value = self
            .jupiter
            .get_json("jupiter price", "", &[("ids", mint.to_string())])
            .await?;
        parse_jupiter_price(&data, mint)
    }

    fn get_cached_token_price(&self, mint: &str) -> Option<f64> {
        let entry = self.token_cache.get(mint)?;
        let (price, fetched_at) = *entry.value();
        (fetched_at.elapsed().as_secs() < CACHE_DURATION_SECS).then_some(price)
    }
}

// V3 format: { "<mint>": { "usdPrice": 147.47, ... } }
fn parse_jupiter_price(data: &Value, mint: &str) -> Result<f64, CollectorError> {
    data.get(mint)
        .and_then(|entry| entry.get("usdPrice"))
        .and_then(Value::as_f64)
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| CollectorError::NotFound(format!("Jupiter price for {}", mint)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::http::tests::{quick_retry, serve_fixed};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_parse_jupiter_price() {
        let data = json!({ SOL_MINT: { "usdPrice": 147.47, "decimals": 9 } });
        assert_eq!(parse_jupiter_price(&data, SOL_MINT).unwrap(), 147.47);
        assert!(matches!(parse_jupiter_price(&data, "Other"), Err(CollectorError::NotFound(_))));

        let zero = json!({ "Meme": { "usdPrice": 0.0 } });
        assert!(parse_jupiter_price(&zero, "Meme").is_err());
    }

    #[tokio::test]
    async fn test_unavailable_jupiter_falls_back_after_retries() {
        let (jupiter_url, jupiter_hits) = serve_fixed("503 Service Unavailable", "{}").await;
        let body = r#"{"pairs":[{"chainId":"solana","dexId":"raydium","pairAddress":"P","baseToken":{"address":"Meme","name":"Meme","symbol":"MEME"},"quoteToken":{"address":"USDC","name":"USD Coin","symbol":"USDC"},"priceUsd":"0.0021"}]}"#;
        let (dex_url, dex_hits) = serve_fixed("200 OK", body).await;
        let config = MarketApiConfig {
            dexscreener_url: dex_url,
            jupiter_url,
            min_request_interval_ms: 0,
            ..MarketApiConfig::default()
        };

        let dexscreener = DexScreenerClient::new(&config, quick_retry(2)).unwrap();
        let feed = PriceFeed::new(&config, quick_retry(2), dexscreener).unwrap();

        assert_eq!(feed.get_token_price("Meme").await.unwrap(), 0.0021);
        assert_eq!(jupiter_hits.load(Ordering::SeqCst), 2);
        assert_eq!(dex_hits.load(Ordering::SeqCst), 1);

        // served from cache
        assert_eq!(feed.get_token_price("Meme").await.unwrap(), 0.0021);
        assert_eq!(jupiter_hits.load(Ordering::SeqCst), 2);
    }
}
