use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;

use memescout::config::{Config, SchedulerConfig};
use memescout::core::constants::PUMP_FUN_PROGRAM;
use memescout::core::{DecodedEvent, Instruction, Platform, RawTransaction, Tier, Token, TokenMetricSnapshot, TokenMetrics};
use memescout::error::CollectorError;
use memescout::ingest::discriminators::pump_fun;
use memescout::ingest::rpc::{SignatureInfo, TokenSupply};
use memescout::ingest::{classify, InstructionDecoder};
use memescout::scout::{DiscoveryScanner, MetricSource, TieredScheduler, TokenMonitor, TokenState, TransactionFeed};

fn create_payload(name: &str, symbol: &str, uri: &str) -> Vec<u8> {
    let mut data = pump_fun::CREATE.to_vec();
    for field in [name, symbol, uri] {
        data.extend_from_slice(&(field.len() as u32).to_le_bytes());
        data.extend_from_slice(field.as_bytes());
    }
    data
}

/// 20 instruction accounts with the mint first; the program key sits last
fn create_transaction(signature: &str, mint: &str, block_time: i64) -> RawTransaction {
    let mut account_keys: Vec<String> = (0..20).map(|i| format!("Account{:02}", i)).collect();
    account_keys[0] = mint.to_string();
    account_keys.push(PUMP_FUN_PROGRAM.to_string());

    RawTransaction {
        signature: signature.to_string(),
        slot: 280_000_000,
        block_time: Some(block_time),
        account_keys,
        instructions: vec![Instruction {
            program_index: 20,
            account_indices: (0..20).collect(),
            data: create_payload("  Moon Cat  ", "\tMCAT ", " https://ipfs.io/ipfs/QmMoonCat\n"),
        }],
    }
}

fn strong_metrics() -> TokenMetrics {
    TokenMetrics {
        liquidity_sol: 30.0,
        holder_count: 250,
        tx_count: 900,
        volume_1h_sol: 150.0,
        price_usd: Some(0.0004),
        ..Default::default()
    }
}

#[test]
fn synthetic_create_transaction_yields_one_trimmed_event() {
    let tx = create_transaction("5synthetic", "MoonCatMint111", 1_700_000_000);
    let decoder = InstructionDecoder::default();

    let events: Vec<DecodedEvent> = classify(&tx, PUMP_FUN_PROGRAM)
        .into_iter()
        .filter_map(|ix| decoder.decode_event(&ix.program_id, &ix.accounts, &ix.data).ok())
        .collect();

    assert_eq!(
        events,
        vec![DecodedEvent::TokenCreated {
            mint: "MoonCatMint111".to_string(),
            name: "Moon Cat".to_string(),
            symbol: "MCAT".to_string(),
            metadata_uri: "https://ipfs.io/ipfs/QmMoonCat".to_string(),
        }]
    );

    // Untracked program yields nothing
    assert!(classify(&tx, "SomeOtherProgram1111111111111111111111111111").is_empty());
}

struct FixedSource(TokenMetrics);

#[async_trait]
impl MetricSource for FixedSource {
    async fn fetch_metrics(&self, _mint: &str) -> Result<TokenMetrics, CollectorError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn monitored_token_older_than_lifetime_is_evicted_on_next_sweep() {
    let now = Utc::now();
    let created = now - ChronoDuration::days(8);

    let mut scheduler = TieredScheduler::new(&SchedulerConfig::default());
    let token = Token {
        mint: "AncientMint".to_string(),
        name: "Ancient".to_string(),
        symbol: "OLD".to_string(),
        created_at: created,
        platform: Platform::PumpFun,
        creation_tx: "5ancient".to_string(),
        monitoring_tier: Tier::Low,
        last_metric_check: None,
        initial_metrics: None,
    };
    assert!(scheduler.discover(token, None, created));
    scheduler.admit("AncientMint", strong_metrics(), created + ChronoDuration::hours(1));
    assert_eq!(scheduler.state("AncientMint"), TokenState::Monitored(Tier::High));

    let mut sink: Vec<TokenMetricSnapshot> = Vec::new();
    let report = scheduler.run_sweep(now, &FixedSource(strong_metrics()), &mut sink).await;

    assert_eq!(report.aged_out, vec!["AncientMint".to_string()]);
    assert!(!scheduler.monitored().contains("AncientMint"));
    assert_eq!(report.refreshed, 0);
    assert!(sink.is_empty());
}

struct ReplayFeed {
    transaction: RawTransaction,
}

#[async_trait]
impl TransactionFeed for ReplayFeed {
    async fn recent_signatures(&self, program_id: &str, _limit: usize) -> Result<Vec<SignatureInfo>, CollectorError> {
        if program_id != PUMP_FUN_PROGRAM {
            return Ok(Vec::new());
        }
        Ok(vec![SignatureInfo {
            signature: self.transaction.signature.clone(),
            slot: self.transaction.slot,
            err: None,
            block_time: self.transaction.block_time,
        }])
    }

    async fn transaction(&self, signature: &str) -> Result<Option<RawTransaction>, CollectorError> {
        Ok((signature == self.transaction.signature).then(|| self.transaction.clone()))
    }

    async fn token_supply(&self, mint: &str) -> Result<TokenSupply, CollectorError> {
        Err(CollectorError::NotFound(mint.to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn monitor_discovers_admits_and_stops_on_shutdown() {
    let mut config = Config::default();
    config.scheduler.observation_delay_secs = 0;

    let feed = Arc::new(ReplayFeed {
        transaction: create_transaction("5live", "LiveMint", Utc::now().timestamp()),
    });
    let scanners = vec![DiscoveryScanner::new(Platform::PumpFun, config.discovery.signature_limit)];
    let sink: Vec<TokenMetricSnapshot> = Vec::new();
    let mut monitor = TokenMonitor::new(&config, feed, FixedSource(strong_metrics()), sink, scanners);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(100)).await;
        let _ = shutdown_tx.send(());
    });

    let summary = monitor.run(shutdown_rx).await;

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.admitted, 1);
    assert_eq!(summary.rejected, 0);
    assert!(summary.polls >= 20);
    assert_eq!(monitor.scheduler().state("LiveMint"), TokenState::Monitored(Tier::High));
    assert_eq!(monitor.sink().first().map(|s| s.mint.as_str()), Some("LiveMint"));
}
