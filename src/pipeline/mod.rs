pub mod collector;
pub mod market_data;
pub mod storage;

pub use collector::{build_feature_dataset, HistoryCollector, HistoryRequest};
pub use market_data::{CoinGeckoClient, MarketDataSource, MemecoinListing};
pub use storage::{DatasetLayout, JsonlSnapshotSink, RankedListing};
