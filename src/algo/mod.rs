pub mod features;

pub use features::{
    compute_metrics, extract_features, FeatureVector, Features, MarketPoint, PerformanceMetrics,
    WindowFeatures,
};
