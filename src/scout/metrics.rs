//! Live metric collection for monitored tokens

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::{TokenMetricSnapshot, TokenMetrics};
use crate::error::CollectorError;
use crate::ingest::SolanaRpcClient;
use crate::util::PriceFeed;

/// Source of point-in-time metrics for a mint
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch_metrics(&self, mint: &str) -> Result<TokenMetrics, CollectorError>;
}

/// Destination for metric snapshots
pub trait SnapshotSink: Send {
    fn record(&mut self, snapshot: &TokenMetricSnapshot) -> Result<(), CollectorError>;

    fn flush(&mut self) -> Result<(), CollectorError> {
        Ok(())
    }
}

impl SnapshotSink for Vec<TokenMetricSnapshot> {
    fn record(&mut self, snapshot: &TokenMetricSnapshot) -> Result<(), CollectorError> {
        self.push(snapshot.clone());
        Ok(())
    }
}

/// DexScreener pair data, with the Jupiter price as fallback and holder
/// counts from RPC.
pub struct MarketMetricSource {
    price_feed: PriceFeed,
    rpc: Option<Arc<SolanaRpcClient>>,
}

impl MarketMetricSource {
    pub fn new(price_feed: PriceFeed, rpc: Option<Arc<SolanaRpcClient>>) -> Self {
        Self { price_feed, rpc }
    }

    async fn holder_count(&self, mint: &str) -> Option<u64> {
        let rpc = self.rpc.as_ref()?;
        match rpc.get_token_account_count(mint).await {
            Ok(count) => Some(count),
            Err(e) => {
                debug!(mint = %mint, error = %e, "Holder count unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl MetricSource for MarketMetricSource {
    async fn fetch_metrics(&self, mint: &str) -> Result<TokenMetrics, CollectorError> {
        let sol_usd = self.price_feed.get_sol_usd_rate().await.ok();

        let mut metrics = match self.price_feed.dexscreener().get_token_info(mint).await {
            Ok(info) => match info.primary_pair() {
                Some(pair) => pair.to_metrics(sol_usd),
                None => TokenMetrics::default(),
            },
            Err(CollectorError::NotFound(_)) => {
                // Not indexed yet; a price alone still makes a snapshot
                let price = self.price_feed.get_token_price(mint).await?;
                TokenMetrics { price_usd: Some(price), ..Default::default() }
            }
            Err(e) => return Err(e),
        };

        if let Some(holders) = self.holder_count(mint).await {
            metrics.holder_count = holders;
        }

        Ok(metrics.sanitized())
    }
}
