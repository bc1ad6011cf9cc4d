use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::types::utils::{shorten_pubkey, token_amount_to_ui};
use crate::core::{DecodedEvent, DiscoveryEvent, Platform, RawTransaction};
use crate::error::CollectorError;
use crate::ingest::rpc::{SignatureInfo, TokenSupply};
use crate::ingest::{classify, pool_init_candidates, InstructionDecoder, SolanaRpcClient};

use super::dedup::SignatureDeduplicator;

/// Where the scanner reads recent program activity from
#[async_trait]
pub trait TransactionFeed: Send + Sync {
    async fn recent_signatures(&self, program_id: &str, limit: usize) -> Result<Vec<SignatureInfo>, CollectorError>;

    async fn transaction(&self, signature: &str) -> Result<Option<RawTransaction>, CollectorError>;

    async fn token_supply(&self, mint: &str) -> Result<TokenSupply, CollectorError>;
}

#[async_trait]
impl TransactionFeed for SolanaRpcClient {
    async fn recent_signatures(&self, program_id: &str, limit: usize) -> Result<Vec<SignatureInfo>, CollectorError> {
        self.get_signatures_for_address(program_id, limit).await
    }

    async fn transaction(&self, signature: &str) -> Result<Option<RawTransaction>, CollectorError> {
        self.get_transaction(signature).await
    }

    async fn token_supply(&self, mint: &str) -> Result<TokenSupply, CollectorError> {
        self.get_token_supply(mint).await
    }
}

/// Counters for one scanning session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub checks: u64,
    pub signatures_seen: u64,
    pub transactions_examined: u64,
    pub tokens_found: u64,
    pub decode_failures: u64,
    pub fetch_failures: u64,
    /// Signatures whose transaction could not be fetched. They are marked
    /// seen and will not be polled again.
    #[serde(default)]
    pub failed_signatures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub poll_interval: Duration,
    /// Stop after this long; run until shutdown when unset
    pub duration: Option<Duration>,
    /// Look up token supply for each discovery
    pub analyze: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSession {
    pub platform: Platform,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: ScanStats,
    pub tokens: Vec<DiscoveryEvent>,
}

/// Polls one launch platform for new tokens
pub struct DiscoveryScanner {
    platform: Platform,
    decoder: InstructionDecoder,
    signature_limit: usize,
    stats: ScanStats,
}

impl DiscoveryScanner {
    pub fn new(platform: Platform, signature_limit: usize) -> Self {
        Self::with_decoder(platform, signature_limit, InstructionDecoder::default())
    }

    pub fn with_decoder(platform: Platform, signature_limit: usize, decoder: InstructionDecoder) -> Self {
        Self {
            platform,
            decoder,
            signature_limit,
            stats: ScanStats::default(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Extracts discovery events from one transaction. Decode failures are
    /// counted and skipped; `observed_at` stands in for a missing block time.
    pub fn process_transaction(&mut self, tx: &RawTransaction, observed_at: DateTime<Utc>) -> Vec<DiscoveryEvent> {
        let program_id = self.platform.program_id();
        let mut instructions = classify(tx, program_id);
        if self.platform == Platform::Raydium {
            instructions = pool_init_candidates(instructions);
        }

        let timestamp = tx.block_time_utc().unwrap_or(observed_at);
        let mut events: Vec<DiscoveryEvent> = Vec::new();

        for ix in instructions {
            let decoded = match self.decoder.decode_event(program_id, &ix.accounts, &ix.data) {
                Ok(decoded) => decoded,
                Err(e) => {
                    self.stats.decode_failures += 1;
                    debug!(signature = %tx.signature, instruction = ix.index, error = %e, "Instruction decode failed");
                    continue;
                }
            };

            let event = match decoded {
                DecodedEvent::TokenCreated { mint, name, symbol, metadata_uri } => DiscoveryEvent {
                    mint,
                    name: Some(name),
                    symbol: Some(symbol),
                    metadata_uri: Some(metadata_uri),
                    signature: tx.signature.clone(),
                    slot: tx.slot,
                    platform: self.platform,
                    timestamp,
                },
                DecodedEvent::PoolInitialized { new_token_mint, .. } => DiscoveryEvent {
                    mint: new_token_mint,
                    name: None,
                    symbol: None,
                    metadata_uri: None,
                    signature: tx.signature.clone(),
                    slot: tx.slot,
                    platform: self.platform,
                    timestamp,
                },
                DecodedEvent::Buy | DecodedEvent::Sell | DecodedEvent::Unknown => continue,
            };

            if !events.iter().any(|e| e.mint == event.mint) {
                events.push(event);
            }
        }

        self.stats.tokens_found += events.len() as u64;
        events
    }

    /// Fetches recent signatures, skips those already seen, and decodes the
    /// rest. Events come back in feed order.
    pub async fn poll_cycle<F>(&mut self, feed: &F, dedup: &SignatureDeduplicator) -> Result<Vec<DiscoveryEvent>, CollectorError>
    where
        F: TransactionFeed + ?Sized,
    {
        self.stats.checks += 1;
        let signatures = feed
            .recent_signatures(self.platform.program_id(), self.signature_limit)
            .await?;

        let mut fresh = Vec::new();
        for info in signatures {
            if !dedup.observe(&info.signature) {
                continue;
            }
            self.stats.signatures_seen += 1;
            if info.succeeded() {
                fresh.push(info.signature);
            } else {
                debug!(signature = %info.signature, "Skipping failed transaction");
            }
        }

        let mut events = Vec::new();
        for signature in fresh {
            match feed.transaction(&signature).await {
                Ok(Some(tx)) => {
                    self.stats.transactions_examined += 1;
                    events.extend(self.process_transaction(&tx, Utc::now()));
                }
                Ok(None) => debug!(signature = %signature, "Transaction not available yet"),
                Err(e) => {
                    self.stats.fetch_failures += 1;
                    warn!(signature = %signature, error = %e, "Failed to fetch transaction");
                    self.stats.failed_signatures.push(signature);
                }
            }
        }

        Ok(events)
    }

    /// Polls until the session duration elapses or shutdown is signalled.
    #[instrument(skip_all, fields(platform = %self.platform))]
    pub async fn run<F>(
        &mut self,
        feed: &F,
        dedup: &SignatureDeduplicator,
        options: ScanOptions,
        mut shutdown: broadcast::Receiver<()>,
    ) -> ScanSession
    where
        F: TransactionFeed + ?Sized,
    {
        let started_at = Utc::now();
        let deadline = options.duration.map(|d| Instant::now() + d);
        let mut tokens = Vec::new();

        info!(
            duration = ?options.duration,
            poll_interval_ms = options.poll_interval.as_millis() as u64,
            "🚀 Scanning for new token launches"
        );

        loop {
            match self.poll_cycle(feed, dedup).await {
                Ok(events) => {
                    for event in events {
                        info!(
                            mint = %event.mint,
                            name = event.name.as_deref().unwrap_or("Unknown"),
                            symbol = event.symbol.as_deref().unwrap_or("Unknown"),
                            signature = %event.signature,
                            "🎉 New token detected"
                        );
                        if options.analyze {
                            analyze_token(feed, &event.mint).await;
                        }
                        tokens.push(event);
                    }
                }
                Err(e) => warn!(error = %e, "Poll failed"),
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    remaining.min(options.poll_interval)
                }
                None => options.poll_interval,
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.recv() => {
                    info!("Shutdown requested, stopping scan");
                    break;
                }
            }
        }

        ScanSession {
            platform: self.platform,
            started_at,
            finished_at: Utc::now(),
            stats: self.stats.clone(),
            tokens,
        }
    }
}

/// Logs supply details for a newly discovered mint
pub async fn analyze_token<F: TransactionFeed + ?Sized>(feed: &F, mint: &str) {
    match feed.token_supply(mint).await {
        Ok(supply) => {
            let ui_supply = supply.ui_amount.unwrap_or_else(|| {
                supply
                    .amount
                    .parse::<u64>()
                    .map(|raw| token_amount_to_ui(raw, supply.decimals))
                    .unwrap_or(0.0)
            });
            info!(
                mint = %shorten_pubkey(mint),
                supply = ui_supply,
                decimals = supply.decimals,
                "Token supply"
            );
        }
        Err(e) => debug!(mint = %shorten_pubkey(mint), error = %e, "Token supply unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{PUMP_FUN_PROGRAM, RAYDIUM_AMM_PROGRAM, SOL_MINT};
    use crate::core::Instruction;
    use crate::ingest::discriminators::{pump_fun, raydium_amm};
    use std::collections::HashMap;

    fn create_data(name: &str, symbol: &str, uri: &str) -> Vec<u8> {
        let mut data = pump_fun::CREATE.to_vec();
        for field in [name, symbol, uri] {
            data.extend_from_slice(&(field.len() as u32).to_le_bytes());
            data.extend_from_slice(field.as_bytes());
        }
        data
    }

    fn pump_create_tx(signature: &str, mint: &str) -> RawTransaction {
        RawTransaction {
            signature: signature.to_string(),
            slot: 7,
            block_time: Some(1_700_000_000),
            account_keys: vec![mint.to_string(), "Payer".to_string(), PUMP_FUN_PROGRAM.to_string()],
            instructions: vec![Instruction {
                program_index: 2,
                account_indices: vec![0, 1],
                data: create_data("Cat Coin", "CAT", "ipfs://cat"),
            }],
        }
    }

    struct FakeFeed {
        signatures: Vec<SignatureInfo>,
        transactions: HashMap<String, RawTransaction>,
        unavailable: Vec<String>,
    }

    #[async_trait]
    impl TransactionFeed for FakeFeed {
        async fn recent_signatures(&self, _program_id: &str, limit: usize) -> Result<Vec<SignatureInfo>, CollectorError> {
            Ok(self.signatures.iter().take(limit).cloned().collect())
        }

        async fn transaction(&self, signature: &str) -> Result<Option<RawTransaction>, CollectorError> {
            if self.unavailable.iter().any(|s| s == signature) {
                return Err(CollectorError::RetriesExhausted {
                    operation: "getTransaction".to_string(),
                    attempts: 5,
                    last_error: "HTTP 429".to_string(),
                });
            }
            Ok(self.transactions.get(signature).cloned())
        }

        async fn token_supply(&self, mint: &str) -> Result<TokenSupply, CollectorError> {
            Err(CollectorError::NotFound(mint.to_string()))
        }
    }

    fn sig(signature: &str, failed: bool) -> SignatureInfo {
        SignatureInfo {
            signature: signature.to_string(),
            slot: 7,
            err: failed.then(|| serde_json::json!({ "InstructionError": [0, "Custom"] })),
            block_time: None,
        }
    }

    #[test]
    fn test_process_pump_create() {
        let mut scanner = DiscoveryScanner::new(Platform::PumpFun, 20);
        let events = scanner.process_transaction(&pump_create_tx("s1", "MintA"), Utc::now());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].mint, "MintA");
        assert_eq!(events[0].symbol.as_deref(), Some("CAT"));
        assert_eq!(events[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(scanner.stats().tokens_found, 1);
    }

    #[test]
    fn test_truncated_create_counts_decode_failure() {
        let mut scanner = DiscoveryScanner::new(Platform::PumpFun, 20);
        let mut tx = pump_create_tx("s1", "MintA");
        tx.instructions[0].data.truncate(12);

        assert!(scanner.process_transaction(&tx, Utc::now()).is_empty());
        assert_eq!(scanner.stats().decode_failures, 1);
    }

    #[test]
    fn test_process_raydium_pool() {
        let mut keys: Vec<String> = (0..18).map(|i| format!("acct{}", i)).collect();
        keys[8] = "NewMint".to_string();
        keys[9] = SOL_MINT.to_string();
        keys[17] = RAYDIUM_AMM_PROGRAM.to_string();

        let tx = RawTransaction {
            signature: "pool".to_string(),
            slot: 9,
            block_time: None,
            account_keys: keys,
            instructions: vec![Instruction {
                program_index: 17,
                account_indices: (0..17).collect(),
                data: raydium_amm::INITIALIZE_POOL.to_vec(),
            }],
        };

        let observed = Utc::now();
        let mut scanner = DiscoveryScanner::new(Platform::Raydium, 20);
        let events = scanner.process_transaction(&tx, observed);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].mint, "NewMint");
        assert_eq!(events[0].name, None);
        assert_eq!(events[0].timestamp, observed);
    }

    #[tokio::test]
    async fn test_poll_cycle_skips_seen_and_failed() {
        let feed = FakeFeed {
            signatures: vec![sig("s3", false), sig("s2", true), sig("s1", false)],
            transactions: HashMap::from([
                ("s3".to_string(), pump_create_tx("s3", "MintC")),
                ("s1".to_string(), pump_create_tx("s1", "MintA")),
            ]),
            unavailable: Vec::new(),
        };
        let dedup = SignatureDeduplicator::new();
        let mut scanner = DiscoveryScanner::new(Platform::PumpFun, 20);

        let events = scanner.poll_cycle(&feed, &dedup).await.unwrap();
        let mints: Vec<_> = events.iter().map(|e| e.mint.as_str()).collect();
        assert_eq!(mints, vec!["MintC", "MintA"]);
        assert_eq!(scanner.stats().transactions_examined, 2);

        let again = scanner.poll_cycle(&feed, &dedup).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(scanner.stats().checks, 2);
        assert_eq!(scanner.stats().signatures_seen, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_after_duration() {
        let feed = FakeFeed {
            signatures: vec![sig("s1", false)],
            transactions: HashMap::from([("s1".to_string(), pump_create_tx("s1", "MintA"))]),
            unavailable: Vec::new(),
        };
        let dedup = SignatureDeduplicator::new();
        let mut scanner = DiscoveryScanner::new(Platform::PumpFun, 20);
        let (_tx, rx) = broadcast::channel(1);

        let options = ScanOptions {
            poll_interval: Duration::from_secs(5),
            duration: Some(Duration::from_secs(12)),
            analyze: true,
        };
        let session = scanner.run(&feed, &dedup, options, rx).await;

        assert_eq!(session.tokens.len(), 1);
        assert_eq!(session.stats.checks, 4);
    }

    #[tokio::test]
    async fn test_unfetchable_transactions_are_reported() {
        let feed = FakeFeed {
            signatures: vec![sig("s3", false), sig("s2", false), sig("s1", false)],
            transactions: HashMap::from([("s1".to_string(), pump_create_tx("s1", "MintA"))]),
            unavailable: vec!["s3".to_string(), "s2".to_string()],
        };
        let dedup = SignatureDeduplicator::new();
        let mut scanner = DiscoveryScanner::new(Platform::PumpFun, 20);

        let events = scanner.poll_cycle(&feed, &dedup).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(scanner.stats().fetch_failures, 2);
        assert_eq!(scanner.stats().failed_signatures, vec!["s3".to_string(), "s2".to_string()]);

        // already seen, so they are not fetched or reported again
        scanner.poll_cycle(&feed, &dedup).await.unwrap();
        assert_eq!(scanner.stats().fetch_failures, 2);
        assert_eq!(scanner.stats().failed_signatures.len(), 2);
    }
}
