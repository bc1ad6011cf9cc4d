//! Terminal summaries printed at the end of each command

use colored::Colorize;

use crate::core::utils::shorten_pubkey;
use crate::core::{DiscoveryEvent, RunSummary};
use crate::scout::{MonitorSummary, ScanSession};

pub fn print_new_token(event: &DiscoveryEvent) {
    println!(
        "\n{} {} ({}) on {}",
        "🎉",
        event.symbol.as_deref().unwrap_or("Unknown").bold(),
        event.name.as_deref().unwrap_or("Unknown"),
        event.platform
    );
    println!("   Mint: {}", event.mint);
    if let Some(uri) = &event.metadata_uri {
        println!("   Metadata: {}", uri);
    }
    println!("   Signature: {}", shorten_pubkey(&event.signature));
    println!("   Solscan: https://solscan.io/token/{}", event.mint);
}

pub fn print_scan_session(session: &ScanSession) {
    let elapsed = session.finished_at - session.started_at;
    println!("\n{}", "📊 SCAN SUMMARY".bold());
    println!("{}", "=".repeat(50));
    println!("   Platform: {}", session.platform);
    println!("   Duration: {}s", elapsed.num_seconds());
    println!("   Checks performed: {}", session.stats.checks);
    println!("   Signatures seen: {}", session.stats.signatures_seen);
    println!("   Transactions examined: {}", session.stats.transactions_examined);
    println!("   Tokens found: {}", session.stats.tokens_found.to_string().green().bold());
    if session.stats.decode_failures > 0 {
        println!("   Decode failures: {}", session.stats.decode_failures.to_string().yellow());
    }
    if session.stats.fetch_failures > 0 {
        println!("   Fetch failures: {}", session.stats.fetch_failures.to_string().yellow());
        print_failed_signatures(&session.stats.failed_signatures);
    }
    println!("{}", "=".repeat(50));
}

pub fn print_monitor_summary(summary: &MonitorSummary) {
    println!("\n{}", "👀 MONITOR SUMMARY".bold());
    println!("{}", "=".repeat(50));
    println!("   Polls: {}  Sweeps: {}", summary.polls, summary.sweeps);
    println!("   Discovered: {}", summary.discovered);
    println!(
        "   Admitted: {}  Rejected: {}",
        summary.admitted.to_string().green(),
        summary.rejected.to_string().red()
    );
    println!("   Evicted: {}  Aged out: {}", summary.evicted, summary.aged_out);
    println!("   Refreshes: {}", summary.refreshed);
    print_failed_signatures(&summary.failed_signatures);
    print_run_summary("Metric fetches", &summary.fetches);
}

fn print_failed_signatures(signatures: &[String]) {
    if signatures.is_empty() {
        return;
    }
    println!("   {} transactions could not be fetched:", signatures.len().to_string().red());
    for signature in signatures {
        println!("     - {}", signature);
    }
}

pub fn print_run_summary(title: &str, summary: &RunSummary) {
    let status = if summary.failed == 0 {
        format!("{}/{}", summary.succeeded, summary.attempted).green()
    } else {
        format!("{}/{}", summary.succeeded, summary.attempted).yellow()
    };
    println!("\n{} {}: {} succeeded", "✅", title.bold(), status);

    if !summary.failed_ids.is_empty() {
        println!("   {} failed:", summary.failed.to_string().red());
        for id in &summary.failed_ids {
            println!("     - {}", id);
        }
    }
}
