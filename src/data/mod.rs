//! Liquidity data ingestion: external sources, the pair fetcher, and the graph
//! builder that is the only writer into a chain's liquidity graph.

pub mod fetcher;
pub mod graph_builder;
pub mod sources;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RouterError};
use crate::types::ChainId;

pub use fetcher::{BulkFetchResult, FetcherConfig, PairFetcher};
pub use graph_builder::{GraphBuildReport, GraphBuilder, GraphBuilderConfig};
pub use sources::{
    IndexedPair, IndexedToken, JsonRpcReader, OnChainReader, PairIndexer, PoolReserves,
    PriceOracle, StaticPriceOracle, SubgraphIndexer,
};

/// One AMM deployment on one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    pub chain_id: ChainId,
    pub factory: String,
    pub fee_bps: u32,
    #[serde(default)]
    pub subgraph_url: Option<String>,
}

/// Loads the venue list from a JSON array file.
pub fn load_venues(path: impl AsRef<Path>) -> Result<Vec<VenueConfig>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        RouterError::ConfigError(format!("Cannot read venues file {}: {}", path.display(), e))
    })?;
    let venues: Vec<VenueConfig> = serde_json::from_str(&raw)?;
    for venue in &venues {
        if venue.fee_bps >= 10_000 {
            return Err(RouterError::ConfigError(format!(
                "Venue {} on chain {} has fee_bps {} >= 10000",
                venue.name, venue.chain_id, venue.fee_bps
            )));
        }
    }
    Ok(venues)
}
