pub mod types;

pub use types::*;
pub use types::constants::*;
