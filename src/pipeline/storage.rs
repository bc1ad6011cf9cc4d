//! On-disk layout of the collected dataset
//!
//! ```text
//! <root>/memecoins_list.json
//! <root>/missing_history.txt
//! <root>/features_<frequency>.jsonl
//! <root>/history/<coin>_<frequency>.jsonl
//! <root>/snapshots/<coin>_snapshot.json
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::algo::MarketPoint;
use crate::core::{Frequency, TokenMetricSnapshot};
use crate::error::CollectorError;
use crate::scout::SnapshotSink;

use super::market_data::MemecoinListing;

const HISTORY_DIR: &str = "history";
const SNAPSHOT_DIR: &str = "snapshots";
const LISTING_FILE: &str = "memecoins_list.json";
const MISSING_FILE: &str = "missing_history.txt";

/// Listing entry as persisted, with its position in the fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedListing {
    #[serde(flatten)]
    pub listing: MemecoinListing,
    pub fetch_rank: usize,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join(HISTORY_DIR)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOT_DIR)
    }

    pub fn history_path(&self, coin_id: &str, frequency: Frequency) -> PathBuf {
        self.history_dir().join(format!("{}{}", coin_id, history_suffix(frequency)))
    }

    pub fn snapshot_path(&self, coin_id: &str) -> PathBuf {
        self.snapshot_dir().join(format!("{}_snapshot.json", coin_id))
    }

    pub fn features_path(&self, frequency: Frequency) -> PathBuf {
        self.root.join(format!("features_{}.jsonl", frequency))
    }

    pub fn prepare(&self) -> Result<(), CollectorError> {
        fs::create_dir_all(self.history_dir())?;
        fs::create_dir_all(self.snapshot_dir())?;
        Ok(())
    }

    /// Coin ids that already have a `{id}_{frequency}` history file
    pub fn processed_ids(&self, frequency: Frequency) -> Result<HashSet<String>, CollectorError> {
        let processed: HashSet<String> = self
            .history_files(frequency)?
            .into_iter()
            .map(|(coin_id, _)| coin_id)
            .collect();
        debug!(frequency = %frequency, count = processed.len(), "Existing history files");
        Ok(processed)
    }

    /// `(coin_id, path)` of every stored history series for `frequency`,
    /// sorted by coin id
    pub fn history_files(&self, frequency: Frequency) -> Result<Vec<(String, PathBuf)>, CollectorError> {
        let dir = self.history_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let suffix = history_suffix(frequency);
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(coin_id) = name.to_str().and_then(|n| n.strip_suffix(suffix.as_str())) else {
                continue;
            };
            if !coin_id.is_empty() {
                files.push((coin_id.to_string(), entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn write_history(
        &self,
        coin_id: &str,
        frequency: Frequency,
        points: &[MarketPoint],
    ) -> Result<PathBuf, CollectorError> {
        let path = self.history_path(coin_id, frequency);
        write_jsonl(&path, points)?;
        Ok(path)
    }

    pub fn read_history(&self, path: &Path) -> Result<Vec<MarketPoint>, CollectorError> {
        read_jsonl(path)
    }

    pub fn write_snapshot(&self, coin_id: &str, snapshot: &Value) -> Result<(), CollectorError> {
        let file = File::create(self.snapshot_path(coin_id))?;
        serde_json::to_writer(BufWriter::new(file), snapshot)?;
        Ok(())
    }

    pub fn has_snapshot(&self, coin_id: &str) -> bool {
        self.snapshot_path(coin_id).exists()
    }

    pub fn write_listing(&self, listings: &[RankedListing]) -> Result<(), CollectorError> {
        let file = File::create(self.root.join(LISTING_FILE))?;
        serde_json::to_writer_pretty(BufWriter::new(file), listings)?;
        info!(count = listings.len(), path = %self.root.join(LISTING_FILE).display(), "Listing saved");
        Ok(())
    }

    /// Symbol per coin id from the stored listing; empty when no listing
    /// has been saved yet
    pub fn listing_symbols(&self) -> Result<HashMap<String, String>, CollectorError> {
        let path = self.root.join(LISTING_FILE);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let listings: Vec<RankedListing> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Ok(listings
            .into_iter()
            .map(|entry| (entry.listing.id, entry.listing.symbol))
            .collect())
    }

    /// Writes the sorted, deduplicated ids of failed coins. Nothing is
    /// written when there are none.
    pub fn write_missing(&self, failed_ids: &[String]) -> Result<Option<PathBuf>, CollectorError> {
        if failed_ids.is_empty() {
            return Ok(None);
        }
        let unique: BTreeSet<&String> = failed_ids.iter().collect();
        let path = self.root.join(MISSING_FILE);
        let mut writer = BufWriter::new(File::create(&path)?);
        for coin_id in unique {
            writeln!(writer, "{}", coin_id)?;
        }
        writer.flush()?;
        Ok(Some(path))
    }

    pub fn write_features(
        &self,
        frequency: Frequency,
        records: &[Map<String, Value>],
    ) -> Result<PathBuf, CollectorError> {
        let path = self.features_path(frequency);
        write_jsonl(&path, records)?;
        Ok(path)
    }
}

fn history_suffix(frequency: Frequency) -> String {
    format!("_{}.jsonl", frequency)
}

fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), CollectorError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, CollectorError> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(serde_json::from_str(&line)?);
    }
    Ok(rows)
}

/// Appends metric snapshots as JSON lines
pub struct JsonlSnapshotSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl JsonlSnapshotSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CollectorError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl SnapshotSink for JsonlSnapshotSink {
    fn record(&mut self, snapshot: &TokenMetricSnapshot) -> Result<(), CollectorError> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CollectorError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Tier;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn points(n: usize) -> Vec<MarketPoint> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| MarketPoint {
                timestamp: start + chrono::Duration::hours(i as i64),
                price: 1.0 + i as f64,
                market_cap: 1000.0,
                volume: 50.0,
            })
            .collect()
    }

    #[test]
    fn test_history_round_trip_and_processed_ids() {
        let dir = TempDir::new().unwrap();
        let layout = DatasetLayout::new(dir.path());
        layout.prepare().unwrap();

        let path = layout.write_history("pepe", Frequency::Hourly, &points(4)).unwrap();
        layout.write_history("bonk", Frequency::Daily, &points(3)).unwrap();
        fs::write(layout.history_dir().join("notes.txt"), "x").unwrap();

        assert_eq!(path.file_name().unwrap(), "pepe_hourly.jsonl");
        assert_eq!(layout.read_history(&path).unwrap(), points(4));

        let hourly = layout.processed_ids(Frequency::Hourly).unwrap();
        assert_eq!(hourly, HashSet::from(["pepe".to_string()]));
        assert!(layout.processed_ids(Frequency::Minute).unwrap().is_empty());
    }

    #[test]
    fn test_missing_history_sorted_and_unique() {
        let dir = TempDir::new().unwrap();
        let layout = DatasetLayout::new(dir.path());

        assert!(layout.write_missing(&[]).unwrap().is_none());

        let ids = vec!["wif".to_string(), "bonk".to_string(), "wif".to_string()];
        let path = layout.write_missing(&ids).unwrap().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "bonk\nwif\n");
    }

    #[test]
    fn test_listing_symbols() {
        let dir = TempDir::new().unwrap();
        let layout = DatasetLayout::new(dir.path());
        assert!(layout.listing_symbols().unwrap().is_empty());

        let entry = RankedListing {
            listing: MemecoinListing {
                id: "dogwifcoin".into(),
                symbol: "wif".into(),
                name: "dogwifhat".into(),
                current_price: Some(2.1),
                market_cap: None,
                market_cap_rank: Some(40),
                total_volume: None,
            },
            fetch_rank: 0,
            fetched_at: Utc::now(),
        };
        layout.write_listing(&[entry]).unwrap();

        let symbols = layout.listing_symbols().unwrap();
        assert_eq!(symbols["dogwifcoin"], "wif");
    }

    #[test]
    fn test_snapshot_sink_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("metrics.jsonl");

        let snapshot = TokenMetricSnapshot {
            mint: "Mint1".into(),
            symbol: "CAT".into(),
            timestamp: Utc::now(),
            monitoring_tier: Tier::Low,
            price_usd: 0.01,
            market_cap_usd: 0.0,
            volume_24h_usd: 100.0,
            liquidity_sol: 5.0,
            holder_count: 30,
        };

        {
            let mut sink = JsonlSnapshotSink::open(&path).unwrap();
            sink.record(&snapshot).unwrap();
            sink.flush().unwrap();
            assert_eq!(sink.written(), 1);
        }
        {
            let mut sink = JsonlSnapshotSink::open(&path).unwrap();
            sink.record(&snapshot).unwrap();
            sink.flush().unwrap();
        }

        let rows: Vec<TokenMetricSnapshot> = read_jsonl(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].mint, "Mint1");
    }
}
