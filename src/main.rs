use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use memescout::config::{Config, LoggingConfig};
use memescout::core::{Frequency, Platform};
use memescout::ingest::SolanaRpcClient;
use memescout::pipeline::{build_feature_dataset, CoinGeckoClient, DatasetLayout, HistoryCollector, HistoryRequest, JsonlSnapshotSink};
use memescout::scout::{DiscoveryScanner, MarketMetricSource, ScanOptions, SignatureDeduplicator, TokenMonitor};
use memescout::util::display::{print_monitor_summary, print_new_token, print_run_summary, print_scan_session};
use memescout::util::{DexScreenerClient, PriceFeed, RetryPolicy};

#[derive(Parser)]
#[command(name = "memescout")]
#[command(about = "Memecoin discovery, monitoring and market history collection")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "memescout.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch one launch platform for newly created tokens
    Scan {
        #[arg(long, default_value = "pump-fun")]
        platform: Platform,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Discover tokens on every platform and keep the best of them under tiered monitoring
    Monitor,

    /// Fetch meme coin listings and market history
    History {
        /// Number of coins to fetch, -1 for all
        #[arg(short = 'n', long = "num", allow_negative_numbers = true)]
        num: Option<i64>,

        /// Sampling frequencies (daily, hourly, minute)
        #[arg(short = 'f', long = "frequencies", num_args = 1..)]
        frequencies: Vec<Frequency>,

        #[arg(long)]
        output: Option<PathBuf>,

        /// Skip coins whose history file already exists
        #[arg(long)]
        resume: bool,

        #[arg(long)]
        workers: Option<usize>,
    },

    /// Compute feature vectors from stored history
    Features {
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, default_value = "daily")]
        frequency: Frequency,
    },
}

fn init_tracing(config: &LoggingConfig, level_override: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("Failed to create log directory {}", config.directory.display()))?;

    let file_appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .compact();

    let json_layer = config.json_file.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_file.clone())
            .json()
            .with_current_span(false)
            .with_span_list(true)
    });
    let plain_layer = (!config.json_file).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_file)
            .with_ansi(false)
    });

    // An explicit --log-level wins over RUST_LOG, which wins over the config file
    let filter = if level_override {
        EnvFilter::try_new(&config.level)?
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&config.level)?,
        }
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(json_layer)
        .with(plain_layer)
        .with(filter)
        .init();

    Ok(guard)
}

/// Broadcasts a single shutdown signal on Ctrl+C
fn shutdown_channel() -> broadcast::Sender<()> {
    let (shutdown_tx, _) = broadcast::channel(4);
    let tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown signal received");
                let _ = tx.send(());
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });
    shutdown_tx
}

async fn run_scan(config: &Config, platform: Platform, duration_secs: Option<u64>, shutdown: broadcast::Receiver<()>) -> Result<()> {
    let rpc = SolanaRpcClient::new(&config.rpc, RetryPolicy::from_config(&config.retry))
        .context("Failed to create RPC client")?;
    info!(platform = %platform, rpc = %rpc.url(), "🔍 Scanning for new tokens");

    let dedup = SignatureDeduplicator::new();
    let mut scanner = DiscoveryScanner::new(platform, config.discovery.signature_limit);
    let options = ScanOptions {
        poll_interval: Duration::from_secs(config.discovery.poll_interval_secs),
        duration: duration_secs.map(Duration::from_secs),
        analyze: config.discovery.analyze_new_tokens,
    };

    let session = scanner.run(&rpc, &dedup, options, shutdown).await;
    for token in &session.tokens {
        print_new_token(token);
    }
    print_scan_session(&session);
    Ok(())
}

async fn run_monitor(config: &Config, shutdown: broadcast::Receiver<()>) -> Result<()> {
    let rpc = Arc::new(
        SolanaRpcClient::new(&config.rpc, RetryPolicy::from_config(&config.retry))
            .context("Failed to create RPC client")?,
    );
    let retry = RetryPolicy::from_config(&config.retry);
    let dexscreener =
        DexScreenerClient::new(&config.market, retry.clone()).context("Failed to create DexScreener client")?;
    let price_feed = PriceFeed::new(&config.market, retry, dexscreener).context("Failed to create price feed")?;
    let source = MarketMetricSource::new(price_feed, Some(Arc::clone(&rpc)));
    let sink = JsonlSnapshotSink::open(&config.scheduler.snapshot_path)
        .with_context(|| format!("Failed to open {}", config.scheduler.snapshot_path.display()))?;

    let limit = config.discovery.signature_limit;
    let scanners = vec![
        DiscoveryScanner::new(Platform::PumpFun, limit),
        DiscoveryScanner::new(Platform::Raydium, limit),
    ];

    let mut monitor = TokenMonitor::new(config, rpc, source, sink, scanners);
    let summary = monitor.run(shutdown).await;
    info!(path = %monitor.sink().path().display(), snapshots = monitor.sink().written(), "Snapshots saved");
    print_monitor_summary(&summary);
    Ok(())
}

async fn run_history(config: &Config, shutdown: broadcast::Receiver<()>) -> Result<()> {
    let client = CoinGeckoClient::new(&config.pipeline, RetryPolicy::from_config(&config.retry))
        .context("Failed to create CoinGecko client")?;
    let layout = DatasetLayout::new(&config.pipeline.output_dir);
    info!(
        count = config.pipeline.count,
        frequencies = ?config.pipeline.frequencies,
        output = %layout.root().display(),
        "📥 Collecting memecoin history"
    );

    let collector = HistoryCollector::new(&client, layout, HistoryRequest::from_config(&config.pipeline));
    let summary = collector.run(shutdown).await.context("History collection failed")?;
    print_run_summary("History", &summary);
    Ok(())
}

fn run_features(config: &Config, frequency: Frequency) -> Result<()> {
    let layout = DatasetLayout::new(&config.pipeline.output_dir);
    let summary = build_feature_dataset(
        &layout,
        frequency,
        config.pipeline.early_window,
        &config.pipeline.full_windows,
    )
    .with_context(|| format!("Failed to build {} features", frequency))?;
    print_run_summary("Features", &summary);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let level_override = cli.log_level.is_some();
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    match &cli.command {
        Command::History { num, frequencies, output, resume, workers } => {
            if let Some(num) = num {
                config.pipeline.count = *num;
            }
            if !frequencies.is_empty() {
                config.pipeline.frequencies = frequencies.clone();
            }
            if let Some(output) = output {
                config.pipeline.output_dir = output.clone();
            }
            if *resume {
                config.pipeline.resume = true;
            }
            if let Some(workers) = workers {
                config.pipeline.workers = *workers;
            }
        }
        Command::Features { output: Some(output), .. } => {
            config.pipeline.output_dir = output.clone();
        }
        _ => {}
    }
    config.validate().context("Invalid configuration")?;

    let _guard = init_tracing(&config.logging, level_override)?;
    info!("🪙 memescout {}", env!("CARGO_PKG_VERSION"));
    if !cli.config.exists() {
        warn!("Config file not found, using defaults: {}", cli.config.display());
    }

    let shutdown_tx = shutdown_channel();

    match cli.command {
        Command::Scan { platform, duration_secs } => {
            run_scan(&config, platform, duration_secs, shutdown_tx.subscribe()).await?
        }
        Command::Monitor => run_monitor(&config, shutdown_tx.subscribe()).await?,
        Command::History { .. } => run_history(&config, shutdown_tx.subscribe()).await?,
        Command::Features { frequency, .. } => run_features(&config, frequency)?,
    }

    info!("👋 memescout finished");
    Ok(())
}
