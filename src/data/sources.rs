// src/data/sources.rs
//! External data interfaces used to populate the liquidity graph, plus the
//! concrete implementations shipped with the crate: a Uniswap-V2-style subgraph
//! indexer, a contract reader over alloy providers and an in-process price table.

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;

use super::VenueConfig;
use crate::error::{Result, RetryPolicy, RouterError};
use crate::types::{ChainId, TokenAddress};

const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedToken {
    pub address: TokenAddress,
    pub symbol: String,
    pub decimals: u8,
}

/// One pair row from a bulk indexer query. Reserves are in token units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPair {
    pub pair_address: String,
    pub token0: IndexedToken,
    pub token1: IndexedToken,
    pub reserve0: f64,
    pub reserve1: f64,
    pub liquidity_usd: f64,
}

/// Raw reserves read on-chain, ordered by the pair's own `token0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReserves {
    pub token0: TokenAddress,
    pub reserve0: u128,
    pub reserve1: u128,
}

/// Paginated bulk query of a venue's pairs, liquidity-descending.
#[async_trait]
pub trait PairIndexer: Send + Sync {
    async fn fetch_pairs(
        &self,
        venue: &VenueConfig,
        min_liquidity_usd: f64,
        first: usize,
        skip: usize,
    ) -> Result<Vec<IndexedPair>>;
}

/// Targeted contract reads against a chain node.
#[async_trait]
pub trait OnChainReader: Send + Sync {
    /// Pair contract for `(a, b)` under `factory`; `None` when the factory has no such pair.
    async fn get_pair_address(
        &self,
        chain_id: ChainId,
        factory: &str,
        a: &TokenAddress,
        b: &TokenAddress,
    ) -> Result<Option<String>>;

    async fn get_reserves(&self, chain_id: ChainId, pair_address: &str)
        -> Result<Option<PoolReserves>>;

    async fn get_decimals(&self, chain_id: ChainId, token: &TokenAddress) -> Result<u8>;
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_price_usd(&self, chain_id: ChainId, token: &TokenAddress) -> Result<Option<f64>>;
}

fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent("universal-router/0.1")
        .build()
        .map_err(|e| RouterError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

// ---------------------------------------------------------------------------
// Subgraph indexer
// ---------------------------------------------------------------------------

const PAIRS_QUERY: &str = r#"query Pairs($first: Int!, $skip: Int!, $minLiquidity: BigDecimal!) {
  pairs(first: $first, skip: $skip, orderBy: reserveUSD, orderDirection: desc, where: { reserveUSD_gt: $minLiquidity }) {
    id
    token0 { id symbol decimals }
    token1 { id symbol decimals }
    reserve0
    reserve1
    reserveUSD
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PairsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PairsData {
    pairs: Vec<SubgraphPair>,
}

#[derive(Debug, Deserialize)]
struct SubgraphToken {
    id: String,
    symbol: String,
    decimals: String,
}

#[derive(Debug, Deserialize)]
struct SubgraphPair {
    id: String,
    token0: SubgraphToken,
    token1: SubgraphToken,
    reserve0: String,
    reserve1: String,
    #[serde(rename = "reserveUSD")]
    reserve_usd: String,
}

fn parse_decimal(field: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| RouterError::ParseError(format!("Invalid {} '{}': {}", field, raw, e)))
}

impl SubgraphToken {
    fn into_indexed(self) -> Result<IndexedToken> {
        let decimals = self.decimals.parse::<u8>().map_err(|e| {
            RouterError::ParseError(format!("Invalid decimals '{}' for {}: {}", self.decimals, self.id, e))
        })?;
        Ok(IndexedToken {
            address: TokenAddress::new(&self.id),
            symbol: self.symbol,
            decimals,
        })
    }
}

impl SubgraphPair {
    fn into_indexed(self) -> Result<IndexedPair> {
        Ok(IndexedPair {
            reserve0: parse_decimal("reserve0", &self.reserve0)?,
            reserve1: parse_decimal("reserve1", &self.reserve1)?,
            liquidity_usd: parse_decimal("reserveUSD", &self.reserve_usd)?,
            pair_address: self.id.to_lowercase(),
            token0: self.token0.into_indexed()?,
            token1: self.token1.into_indexed()?,
        })
    }
}

/// GraphQL client for Uniswap-V2-style subgraphs; the URL comes from the venue.
pub struct SubgraphIndexer {
    client: Client,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SubgraphIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubgraphIndexer")
            .field("retry", &self.retry)
            .finish()
    }
}

impl SubgraphIndexer {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            retry,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS), RetryPolicy::default())
    }

    async fn query_page(&self, url: &str, body: &Value) -> Result<Vec<SubgraphPair>> {
        let response = self.client.post(url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RouterError::NetworkError(format!(
                "Indexer returned {}: {}",
                status, text
            )));
        }

        let payload: GraphQlResponse = response.json().await?;
        if !payload.errors.is_empty() {
            let messages: Vec<String> = payload.errors.into_iter().map(|e| e.message).collect();
            return Err(RouterError::SourceFailure(format!(
                "Indexer query failed: {}",
                messages.join("; ")
            )));
        }

        payload
            .data
            .map(|d| d.pairs)
            .ok_or_else(|| RouterError::ParseError("Indexer response has no data".to_string()))
    }
}

#[async_trait]
impl PairIndexer for SubgraphIndexer {
    async fn fetch_pairs(
        &self,
        venue: &VenueConfig,
        min_liquidity_usd: f64,
        first: usize,
        skip: usize,
    ) -> Result<Vec<IndexedPair>> {
        let url = venue.subgraph_url.as_deref().ok_or_else(|| {
            RouterError::ConfigError(format!("Venue {} has no subgraph_url", venue.name))
        })?;

        let body = json!({
            "query": PAIRS_QUERY,
            "variables": {
                "first": first,
                "skip": skip,
                "minLiquidity": min_liquidity_usd.to_string(),
            }
        });

        debug!(
            "Querying {} on chain {} (first={}, skip={})",
            venue.name, venue.chain_id, first, skip
        );

        let rows = self.retry.execute(|| self.query_page(url, &body)).await?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match row.into_indexed() {
                Ok(pair) => pairs.push(pair),
                Err(e) => warn!("Skipping malformed pair {} from {}: {}", id, venue.name, e),
            }
        }
        Ok(pairs)
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC reader
// ---------------------------------------------------------------------------

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IUniswapV2Pair {
        function token0() external view returns (address);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IERC20 {
        function decimals() external view returns (uint8);
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| RouterError::InvalidInput(format!("Not an address {}: {}", raw, e)))
}

/// Reads factory, pair and token contracts through one HTTP provider per chain.
pub struct JsonRpcReader {
    providers: HashMap<ChainId, DynProvider>,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for JsonRpcReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcReader")
            .field("chains", &self.providers.keys().collect::<Vec<_>>())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl JsonRpcReader {
    pub fn new(rpc_urls: HashMap<ChainId, String>, call_timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let mut providers = HashMap::with_capacity(rpc_urls.len());
        for (chain_id, raw) in rpc_urls {
            let url = raw.parse::<Url>().map_err(|e| {
                RouterError::ConfigError(format!("Invalid RPC URL for chain {}: {}", chain_id, e))
            })?;
            providers.insert(chain_id, ProviderBuilder::new().connect_http(url).erased());
        }
        Ok(Self {
            providers,
            call_timeout,
            retry,
        })
    }

    fn provider(&self, chain_id: ChainId) -> Result<&DynProvider> {
        self.providers
            .get(&chain_id)
            .ok_or_else(|| RouterError::ConfigError(format!("No RPC URL for chain {}", chain_id)))
    }
}

#[async_trait]
impl OnChainReader for JsonRpcReader {
    async fn get_pair_address(
        &self,
        chain_id: ChainId,
        factory: &str,
        a: &TokenAddress,
        b: &TokenAddress,
    ) -> Result<Option<String>> {
        let (token_a, token_b) = (parse_address(a.as_str())?, parse_address(b.as_str())?);
        let factory = IUniswapV2Factory::new(parse_address(factory)?, self.provider(chain_id)?);
        let factory = &factory;
        let limit = self.call_timeout;

        let pair = self
            .retry
            .execute(|| async move {
                let pair = timeout(limit, factory.getPair(token_a, token_b).call()).await??;
                Ok::<_, RouterError>(pair)
            })
            .await?;

        if pair == Address::ZERO {
            return Ok(None);
        }
        Ok(Some(format!("{:#x}", pair)))
    }

    async fn get_reserves(
        &self,
        chain_id: ChainId,
        pair_address: &str,
    ) -> Result<Option<PoolReserves>> {
        let pair = IUniswapV2Pair::new(parse_address(pair_address)?, self.provider(chain_id)?);
        let pair = &pair;
        let limit = self.call_timeout;

        let (reserves, token0) = tokio::try_join!(
            self.retry.execute(|| async move {
                let reserves = timeout(limit, pair.getReserves().call()).await??;
                Ok::<_, RouterError>(reserves)
            }),
            self.retry.execute(|| async move {
                let token0 = timeout(limit, pair.token0().call()).await??;
                Ok::<_, RouterError>(token0)
            }),
        )?;

        debug!(
            "Pair {} on chain {} last synced at {}",
            pair_address, chain_id, reserves.blockTimestampLast
        );
        Ok(Some(PoolReserves {
            token0: TokenAddress::new(format!("{:#x}", token0)),
            reserve0: reserves.reserve0.to::<u128>(),
            reserve1: reserves.reserve1.to::<u128>(),
        }))
    }

    async fn get_decimals(&self, chain_id: ChainId, token: &TokenAddress) -> Result<u8> {
        let erc20 = IERC20::new(parse_address(token.as_str())?, self.provider(chain_id)?);
        let erc20 = &erc20;
        let limit = self.call_timeout;

        self.retry
            .execute(|| async move {
                let decimals = timeout(limit, erc20.decimals().call()).await??;
                Ok::<_, RouterError>(decimals)
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Static price table
// ---------------------------------------------------------------------------

/// In-process USD price table keyed by (chain, token).
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    prices: DashMap<(ChainId, TokenAddress), f64>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, chain_id: ChainId, token: impl Into<TokenAddress>, price_usd: f64) {
        self.prices.insert((chain_id, token.into()), price_usd);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn get_price_usd(&self, chain_id: ChainId, token: &TokenAddress) -> Result<Option<f64>> {
        Ok(self
            .prices
            .get(&(chain_id, token.clone()))
            .map(|p| *p)
            .filter(|p| p.is_finite() && *p > 0.0))
    }
}
