pub mod admission;
pub mod dedup;
pub mod metrics;
pub mod monitor;
pub mod scanner;
pub mod scheduler;

pub use admission::{AdmissionCriteria, AdmissionReport, TierScorer};
pub use dedup::SignatureDeduplicator;
pub use metrics::{MarketMetricSource, MetricSource, SnapshotSink};
pub use monitor::{MonitorSummary, TokenMonitor};
pub use scanner::{DiscoveryScanner, ScanOptions, ScanSession, ScanStats, TransactionFeed};
pub use scheduler::{AdmissionOutcome, MonitoredSet, SweepPlan, SweepReport, TieredScheduler, TokenState};
