pub mod bridge;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod routing;
pub mod types;
pub mod utils;

pub use error::{Result, RouterError};
pub use routing::{QuoteAggregator, RouteServiceEnhancer};
pub use types::{ChainId, QuoteRequest, TokenAddress, UniversalRoute};
