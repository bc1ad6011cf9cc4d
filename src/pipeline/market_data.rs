//! CoinGecko market API client for meme-token listings and history

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::algo::MarketPoint;
use crate::config::PipelineConfig;
use crate::core::Frequency;
use crate::error::CollectorError;
use crate::util::http::PacedClient;
use crate::util::retry::RetryPolicy;

pub const PER_PAGE: usize = 250;
const MEME_CATEGORY: &str = "meme-token";
/// Page budget when every listed coin is requested
const ALL_PAGES: usize = 100;
const API_TIMEOUT_SECS: u64 = 30;

/// One entry of the `coins/markets` listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemecoinListing {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub total_volume: Option<f64>,
}

/// `coins/{id}/market_chart` payload; each row is `[timestamp_ms, value]`
#[derive(Debug, Default, Deserialize)]
pub struct MarketChart {
    #[serde(default)]
    pub prices: Vec<[f64; 2]>,
    #[serde(default)]
    pub market_caps: Vec<[f64; 2]>,
    #[serde(default)]
    pub total_volumes: Vec<[f64; 2]>,
}

impl MarketChart {
    /// Joins the three series on timestamp. Rows missing from any series are
    /// dropped; the result is in timestamp order.
    pub fn into_points(self) -> Vec<MarketPoint> {
        let mut rows: BTreeMap<i64, (Option<f64>, Option<f64>, Option<f64>)> = BTreeMap::new();
        for [ts, price] in self.prices {
            rows.entry(ts as i64).or_default().0 = Some(price);
        }
        for [ts, market_cap] in self.market_caps {
            rows.entry(ts as i64).or_default().1 = Some(market_cap);
        }
        for [ts, volume] in self.total_volumes {
            rows.entry(ts as i64).or_default().2 = Some(volume);
        }

        rows.into_iter()
            .filter_map(|(ts, row)| match row {
                (Some(price), Some(market_cap), Some(volume)) => Some(MarketPoint {
                    timestamp: Utc.timestamp_millis_opt(ts).single()?,
                    price,
                    market_cap,
                    volume,
                }),
                _ => None,
            })
            .collect()
    }
}

/// Pages needed to list `count` coins; `-1` means every page
pub fn page_count(count: i64) -> usize {
    if count < 0 {
        ALL_PAGES
    } else {
        count as usize / PER_PAGE + 1
    }
}

/// Market data consumed by the history pipeline
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn list_memecoins(&self, page: usize) -> Result<Vec<MemecoinListing>, CollectorError>;

    async fn coin_snapshot(&self, coin_id: &str) -> Result<Value, CollectorError>;

    async fn coin_history(&self, coin_id: &str, frequency: Frequency) -> Result<Vec<MarketPoint>, CollectorError>;
}

/// Collects the first `count` listings page by page. A page that fails after
/// retries is logged and skipped; an empty page ends the listing.
pub async fn fetch_listing<M: MarketDataSource + ?Sized>(
    source: &M,
    count: i64,
) -> Vec<MemecoinListing> {
    let pages = page_count(count);
    let mut listings = Vec::new();

    for page in 1..=pages {
        match source.list_memecoins(page).await {
            Ok(batch) if batch.is_empty() => {
                debug!(page = page, "Listing exhausted");
                break;
            }
            Ok(batch) => listings.extend(batch),
            Err(e) => {
                error!(page = page, error = %e, "Listing page failed permanently");
            }
        }

        if count >= 0 && listings.len() >= count as usize {
            break;
        }
    }

    if count >= 0 {
        listings.truncate(count as usize);
    }
    info!(count = listings.len(), pages = pages, "📋 Memecoin listing fetched");
    listings
}

pub struct CoinGeckoClient {
    http: PacedClient,
    vs_currency: String,
}

impl CoinGeckoClient {
    pub fn new(config: &PipelineConfig, retry: RetryPolicy) -> Result<Self, CollectorError> {
        Ok(Self {
            http: PacedClient::new(
                "coingecko",
                &config.api_base,
                Duration::from_secs(API_TIMEOUT_SECS),
                Duration::from_millis(config.min_request_interval_ms),
                retry,
            )?,
            vs_currency: config.vs_currency.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CollectorError> {
        self.http.get_json(operation, path, query).await
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    #[instrument(skip(self), level = "debug")]
    async fn list_memecoins(&self, page: usize) -> Result<Vec<MemecoinListing>, CollectorError> {
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("category", MEME_CATEGORY.to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
            ("sparkline", "false".to_string()),
        ];
        self.get_json("coins/markets", "coins/markets", &query).await
    }

    async fn coin_snapshot(&self, coin_id: &str) -> Result<Value, CollectorError> {
        self.get_json("coin snapshot", &format!("coins/{}", coin_id), &[]).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn coin_history(&self, coin_id: &str, frequency: Frequency) -> Result<Vec<MarketPoint>, CollectorError> {
        let mut query = vec![
            ("vs_currency", self.vs_currency.clone()),
            ("days", frequency.history_days().to_string()),
        ];
        if frequency == Frequency::Daily {
            query.push(("interval", "daily".to_string()));
        }

        let chart: MarketChart = self
            .get_json("market chart", &format!("coins/{}/market_chart", coin_id), &query)
            .await?;
        Ok(chart.into_points())
    }
}
