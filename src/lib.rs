// Core types shared by every component
pub mod core;
pub mod error;
pub mod config;

// Transaction fetching, classification and decoding
pub mod ingest;

// Discovery, admission and tiered monitoring
pub mod scout;

// Feature extraction over market history
pub mod algo;

// Market history collection and dataset storage
pub mod pipeline;

pub mod util;

// Re-export commonly used types for convenience
pub use crate::core::*;
pub use error::{CollectorError, ConfigError, DecodeError, LookupError};
