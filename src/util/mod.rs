pub mod dexscreener;
pub mod display;
pub mod http;
pub mod price_feed;
pub mod retry;

pub use dexscreener::DexScreenerClient;
pub use http::PacedClient;
pub use price_feed::PriceFeed;
pub use retry::{RateLimiter, RetryPolicy};
