// src/data/fetcher.rs
//! Pair data fetcher: bulk indexer pagination and targeted on-chain pair reads.
//! Every external call runs under a timeout; failures degrade to "no data".

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::sources::{IndexedPair, IndexedToken, OnChainReader, PairIndexer, PriceOracle};
use super::VenueConfig;
use crate::error::{Result, RouterError};
use crate::types::{to_raw, to_units, ChainId, PairEdge, TokenAddress, TokenCategory, TokenNode};

const STABLE_SYMBOLS: &[&str] = &["USDC", "USDT", "DAI", "BUSD", "FRAX", "LUSD", "USDC.E", "TUSD"];
const NATIVE_SYMBOLS: &[&str] = &[
    "ETH", "WETH", "BNB", "WBNB", "MATIC", "WMATIC", "POL", "WPOL", "AVAX", "WAVAX", "FTM", "WFTM",
];
const BLUECHIP_SYMBOLS: &[&str] = &["WBTC", "BTCB", "CBBTC", "LINK", "UNI", "AAVE", "MKR", "STETH", "WSTETH"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    pub page_size: usize,
    pub max_pages: usize,
    pub min_liquidity_usd: f64,
    pub request_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_pages: 5,
            min_liquidity_usd: 10_000.0,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of one venue's bulk fetch. A failed fetch has no edges and at least one error.
#[derive(Debug, Clone, Default)]
pub struct BulkFetchResult {
    pub venue: String,
    pub edges: Vec<PairEdge>,
    pub nodes: Vec<TokenNode>,
    pub errors: Vec<String>,
}

impl BulkFetchResult {
    fn failed(venue: &VenueConfig, message: String) -> Self {
        Self {
            venue: venue.name.clone(),
            edges: Vec::new(),
            nodes: Vec::new(),
            errors: vec![message],
        }
    }
}

pub fn classify_token(symbol: &str) -> TokenCategory {
    let upper = symbol.to_uppercase();
    if STABLE_SYMBOLS.contains(&upper.as_str()) {
        TokenCategory::Stable
    } else if NATIVE_SYMBOLS.contains(&upper.as_str()) {
        TokenCategory::Native
    } else if BLUECHIP_SYMBOLS.contains(&upper.as_str()) {
        TokenCategory::Bluechip
    } else {
        TokenCategory::Other
    }
}

/// USD liquidity from per-side values. A single priced side is doubled.
pub fn liquidity_from_prices(
    amount0: f64,
    amount1: f64,
    price0: Option<f64>,
    price1: Option<f64>,
) -> f64 {
    match (price0, price1) {
        (Some(p0), Some(p1)) => amount0 * p0 + amount1 * p1,
        (Some(p0), None) => 2.0 * amount0 * p0,
        (None, Some(p1)) => 2.0 * amount1 * p1,
        (None, None) => 0.0,
    }
}

pub struct PairFetcher {
    indexer: Arc<dyn PairIndexer>,
    reader: Arc<dyn OnChainReader>,
    prices: Arc<dyn PriceOracle>,
    config: FetcherConfig,
}

impl std::fmt::Debug for PairFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairFetcher")
            .field("config", &self.config)
            .finish()
    }
}

impl PairFetcher {
    pub fn new(
        indexer: Arc<dyn PairIndexer>,
        reader: Arc<dyn OnChainReader>,
        prices: Arc<dyn PriceOracle>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            indexer,
            reader,
            prices,
            config,
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Pages through the venue's pairs, liquidity-descending, until a short page
    /// or the page cap. Any page failure discards the whole result.
    pub async fn fetch_bulk(&self, venue: &VenueConfig) -> BulkFetchResult {
        let mut rows: Vec<IndexedPair> = Vec::new();

        for page in 0..self.config.max_pages {
            let skip = page * self.config.page_size;
            let request = self.indexer.fetch_pairs(
                venue,
                self.config.min_liquidity_usd,
                self.config.page_size,
                skip,
            );

            let batch = match timeout(self.config.request_timeout, request).await {
                Ok(Ok(batch)) => batch,
                Ok(Err(e)) => {
                    let message = format!("Bulk fetch for {} failed on page {}: {}", venue.name, page, e);
                    error!("{}", message);
                    return BulkFetchResult::failed(venue, message);
                }
                Err(_) => {
                    let message = format!(
                        "Bulk fetch for {} timed out on page {} after {:?}",
                        venue.name, page, self.config.request_timeout
                    );
                    error!("{}", message);
                    return BulkFetchResult::failed(venue, message);
                }
            };

            let batch_len = batch.len();
            rows.extend(batch);
            if batch_len < self.config.page_size {
                break;
            }
        }

        let result = self.convert_rows(venue, rows);
        info!(
            "Bulk fetch for {} on chain {}: {} pairs, {} tokens",
            venue.name,
            venue.chain_id,
            result.edges.len(),
            result.nodes.len()
        );
        result
    }

    fn convert_rows(&self, venue: &VenueConfig, rows: Vec<IndexedPair>) -> BulkFetchResult {
        let now = Utc::now();
        let mut edges = Vec::with_capacity(rows.len());
        let mut tokens: HashMap<TokenAddress, (IndexedToken, f64)> = HashMap::new();

        for row in rows {
            if row.liquidity_usd < self.config.min_liquidity_usd {
                continue;
            }
            if row.token0.address == row.token1.address {
                continue;
            }
            let reserve0 = to_raw(row.reserve0, row.token0.decimals);
            let reserve1 = to_raw(row.reserve1, row.token1.decimals);
            if reserve0 == 0 || reserve1 == 0 {
                debug!("Skipping empty pair {} on {}", row.pair_address, venue.name);
                continue;
            }

            // Each side of the pool holds roughly half of its USD value.
            let half = row.liquidity_usd / 2.0;
            for token in [&row.token0, &row.token1] {
                tokens
                    .entry(token.address.clone())
                    .and_modify(|(_, liquidity)| *liquidity += half)
                    .or_insert_with(|| (token.clone(), half));
            }

            edges.push(PairEdge {
                token0: row.token0.address.clone(),
                token1: row.token1.address.clone(),
                decimals0: row.token0.decimals,
                decimals1: row.token1.decimals,
                chain_id: venue.chain_id,
                venue: venue.name.clone(),
                factory: venue.factory.clone(),
                pair_address: row.pair_address,
                liquidity_usd: row.liquidity_usd,
                reserve0,
                reserve1,
                fee_bps: venue.fee_bps,
                updated_at: now,
            });
        }

        let nodes = tokens
            .into_values()
            .map(|(token, liquidity_usd)| TokenNode {
                category: classify_token(&token.symbol),
                address: token.address,
                chain_id: venue.chain_id,
                symbol: token.symbol,
                decimals: token.decimals,
                liquidity_usd,
                updated_at: now,
            })
            .collect();

        BulkFetchResult {
            venue: venue.name.clone(),
            edges,
            nodes,
            errors: Vec::new(),
        }
    }

    /// Targeted on-chain read of one pair. Any failure or timeout yields `None`.
    pub async fn fetch_pair(
        &self,
        venue: &VenueConfig,
        a: &TokenAddress,
        b: &TokenAddress,
    ) -> Option<PairEdge> {
        match timeout(self.config.request_timeout, self.read_pair(venue, a, b)).await {
            Ok(Ok(Some(edge))) => Some(edge),
            Ok(Ok(None)) => {
                debug!("No {} pair for {}/{} on chain {}", venue.name, a, b, venue.chain_id);
                None
            }
            Ok(Err(e)) => {
                warn!("Pair fetch {}/{} on {} failed: {}", a, b, venue.name, e);
                None
            }
            Err(_) => {
                warn!(
                    "Pair fetch {}/{} on {} timed out after {:?}",
                    a, b, venue.name, self.config.request_timeout
                );
                None
            }
        }
    }

    async fn read_pair(
        &self,
        venue: &VenueConfig,
        a: &TokenAddress,
        b: &TokenAddress,
    ) -> Result<Option<PairEdge>> {
        let chain_id = venue.chain_id;
        let pair_address = match self
            .reader
            .get_pair_address(chain_id, &venue.factory, a, b)
            .await?
        {
            Some(address) => address,
            None => return Ok(None),
        };

        let reserves = match self.reader.get_reserves(chain_id, &pair_address).await? {
            Some(reserves) if reserves.reserve0 > 0 && reserves.reserve1 > 0 => reserves,
            _ => return Ok(None),
        };

        let token0 = reserves.token0.clone();
        let token1 = if &token0 == a {
            b.clone()
        } else if &token0 == b {
            a.clone()
        } else {
            return Err(RouterError::ParseError(format!(
                "Pair {} reports token0 {} outside {}/{}",
                pair_address, token0, a, b
            )));
        };

        let (decimals0, decimals1) = tokio::try_join!(
            self.reader.get_decimals(chain_id, &token0),
            self.reader.get_decimals(chain_id, &token1),
        )?;

        let (price0, price1) = tokio::join!(
            self.price_or_none(chain_id, &token0),
            self.price_or_none(chain_id, &token1),
        );

        let liquidity_usd = liquidity_from_prices(
            to_units(reserves.reserve0, decimals0),
            to_units(reserves.reserve1, decimals1),
            price0,
            price1,
        );

        Ok(Some(PairEdge {
            token0,
            token1,
            decimals0,
            decimals1,
            chain_id,
            venue: venue.name.clone(),
            factory: venue.factory.clone(),
            pair_address: pair_address.to_lowercase(),
            liquidity_usd,
            reserve0: reserves.reserve0,
            reserve1: reserves.reserve1,
            fee_bps: venue.fee_bps,
            updated_at: Utc::now(),
        }))
    }

    async fn price_or_none(&self, chain_id: ChainId, token: &TokenAddress) -> Option<f64> {
        match self.prices.get_price_usd(chain_id, token).await {
            Ok(price) => price,
            Err(e) => {
                debug!("No price for {} on chain {}: {}", token, chain_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory sources shared by the fetcher, graph builder and routing tests.
    use super::*;
    use crate::data::sources::PoolReserves;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn venue(name: &str, chain_id: ChainId) -> VenueConfig {
        VenueConfig {
            name: name.to_string(),
            chain_id,
            factory: format!("factory-{}", name),
            fee_bps: 30,
            subgraph_url: None,
        }
    }

    pub fn indexed(pair: &str, a: &str, b: &str, r0: f64, r1: f64, liquidity_usd: f64) -> IndexedPair {
        IndexedPair {
            pair_address: pair.to_string(),
            token0: IndexedToken {
                address: TokenAddress::new(a),
                symbol: a.trim_start_matches("0x").to_uppercase(),
                decimals: 18,
            },
            token1: IndexedToken {
                address: TokenAddress::new(b),
                symbol: b.trim_start_matches("0x").to_uppercase(),
                decimals: 18,
            },
            reserve0: r0,
            reserve1: r1,
            liquidity_usd,
        }
    }

    /// Serves a fixed list of pairs page by page, or fails every call.
    #[derive(Default)]
    pub struct MockIndexer {
        pub pairs: Vec<IndexedPair>,
        pub fail: bool,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl PairIndexer for MockIndexer {
        async fn fetch_pairs(
            &self,
            _venue: &VenueConfig,
            min_liquidity_usd: f64,
            first: usize,
            skip: usize,
        ) -> Result<Vec<IndexedPair>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(RouterError::NetworkError("indexer down".to_string()));
            }
            Ok(self
                .pairs
                .iter()
                .filter(|p| p.liquidity_usd >= min_liquidity_usd)
                .skip(skip)
                .take(first)
                .cloned()
                .collect())
        }
    }

    /// On-chain state keyed by pair contract; reserves are in 18-decimal token units.
    #[derive(Default)]
    pub struct MockReader {
        pub pairs: Mutex<Vec<(String, TokenAddress, TokenAddress, u128, u128)>>,
        pub fail: bool,
    }

    impl MockReader {
        pub fn add_pair(&self, pair: &str, token0: &str, token1: &str, r0: f64, r1: f64) {
            if let Ok(mut pairs) = self.pairs.lock() {
                pairs.push((
                    pair.to_string(),
                    TokenAddress::new(token0),
                    TokenAddress::new(token1),
                    to_raw(r0, 18),
                    to_raw(r1, 18),
                ));
            }
        }
    }

    #[async_trait]
    impl OnChainReader for MockReader {
        async fn get_pair_address(
            &self,
            _chain_id: ChainId,
            _factory: &str,
            a: &TokenAddress,
            b: &TokenAddress,
        ) -> Result<Option<String>> {
            if self.fail {
                return Err(RouterError::RpcError("node unavailable".to_string()));
            }
            let pairs = self.pairs.lock().map_err(|e| RouterError::Unknown(e.to_string()))?;
            Ok(pairs
                .iter()
                .find(|(_, t0, t1, _, _)| (t0 == a && t1 == b) || (t0 == b && t1 == a))
                .map(|(address, ..)| address.clone()))
        }

        async fn get_reserves(
            &self,
            _chain_id: ChainId,
            pair_address: &str,
        ) -> Result<Option<PoolReserves>> {
            let pairs = self.pairs.lock().map_err(|e| RouterError::Unknown(e.to_string()))?;
            Ok(pairs
                .iter()
                .find(|(address, ..)| address == pair_address)
                .map(|(_, t0, _, r0, r1)| PoolReserves {
                    token0: t0.clone(),
                    reserve0: *r0,
                    reserve1: *r1,
                }))
        }

        async fn get_decimals(&self, _chain_id: ChainId, _token: &TokenAddress) -> Result<u8> {
            Ok(18)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::data::sources::StaticPriceOracle;
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn fetcher(indexer: MockIndexer, reader: MockReader, oracle: StaticPriceOracle, config: FetcherConfig) -> PairFetcher {
        PairFetcher::new(Arc::new(indexer), Arc::new(reader), Arc::new(oracle), config)
    }

    #[test]
    fn test_liquidity_doubles_single_priced_side() {
        assert_approx_eq!(liquidity_from_prices(10.0, 500.0, Some(2.0), Some(1.0)), 520.0);
        assert_approx_eq!(liquidity_from_prices(10.0, 500.0, Some(2.0), None), 40.0);
        assert_approx_eq!(liquidity_from_prices(10.0, 500.0, None, Some(1.0)), 1000.0);
        assert_eq!(liquidity_from_prices(10.0, 500.0, None, None), 0.0);
    }

    #[test]
    fn test_classify_token() {
        assert_eq!(classify_token("usdc"), TokenCategory::Stable);
        assert_eq!(classify_token("WETH"), TokenCategory::Native);
        assert_eq!(classify_token("WBTC"), TokenCategory::Bluechip);
        assert_eq!(classify_token("PEPE"), TokenCategory::Other);
    }

    #[tokio::test]
    async fn test_bulk_fetch_paginates_until_short_page() {
        let indexer = MockIndexer {
            pairs: vec![
                indexed("0xp1", "0xa", "0xb", 100.0, 200.0, 90_000.0),
                indexed("0xp2", "0xb", "0xc", 100.0, 200.0, 80_000.0),
                indexed("0xp3", "0xa", "0xc", 100.0, 200.0, 70_000.0),
            ],
            ..Default::default()
        };
        let config = FetcherConfig {
            page_size: 2,
            ..Default::default()
        };
        let fetcher = fetcher(indexer, MockReader::default(), StaticPriceOracle::new(), config);

        let result = fetcher.fetch_bulk(&venue("uni", 1)).await;
        assert!(result.errors.is_empty());
        assert_eq!(result.edges.len(), 3);
        assert_eq!(result.nodes.len(), 3);
        let a = result
            .nodes
            .iter()
            .find(|n| n.address == TokenAddress::new("0xa"))
            .unwrap();
        assert_approx_eq!(a.liquidity_usd, 80_000.0);
        assert_eq!(result.edges[0].fee_bps, 30);
    }

    #[tokio::test]
    async fn test_bulk_fetch_respects_page_cap_and_floor() {
        let pairs = (0..10)
            .map(|i| indexed(&format!("0xp{}", i), &format!("0xa{}", i), "0xz", 1.0, 1.0, 50_000.0))
            .chain(std::iter::once(indexed("0xsmall", "0xq", "0xz", 1.0, 1.0, 10.0)))
            .collect();
        let indexer = MockIndexer {
            pairs,
            ..Default::default()
        };
        let config = FetcherConfig {
            page_size: 3,
            max_pages: 2,
            ..Default::default()
        };
        let fetcher = fetcher(indexer, MockReader::default(), StaticPriceOracle::new(), config);

        let result = fetcher.fetch_bulk(&venue("uni", 1)).await;
        assert_eq!(result.edges.len(), 6);
    }

    #[tokio::test]
    async fn test_bulk_fetch_failure_yields_empty_edges() {
        let indexer = MockIndexer {
            fail: true,
            ..Default::default()
        };
        let fetcher = fetcher(indexer, MockReader::default(), StaticPriceOracle::new(), FetcherConfig::default());

        let result = fetcher.fetch_bulk(&venue("uni", 1)).await;
        assert!(result.edges.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_fetch_timeout() {
        let indexer = Arc::new(MockIndexer {
            pairs: vec![indexed("0xp1", "0xa", "0xb", 1.0, 1.0, 90_000.0)],
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let config = FetcherConfig {
            request_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let fetcher = PairFetcher::new(
            indexer.clone(),
            Arc::new(MockReader::default()),
            Arc::new(StaticPriceOracle::new()),
            config,
        );

        let result = fetcher.fetch_bulk(&venue("uni", 1)).await;
        assert!(result.edges.is_empty());
        assert!(result.errors[0].contains("timed out"));
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_pair_orders_by_token0_and_prices_liquidity() {
        let reader = MockReader::default();
        reader.add_pair("0xPAIR", "0xb", "0xa", 50.0, 100.0);
        let oracle = StaticPriceOracle::new();
        oracle.set_price(1, "0xa", 3.0);

        let fetcher = fetcher(MockIndexer::default(), reader, oracle, FetcherConfig::default());
        let edge = fetcher
            .fetch_pair(&venue("uni", 1), &"0xa".into(), &"0xb".into())
            .await
            .unwrap();

        assert_eq!(edge.token0, TokenAddress::new("0xb"));
        assert_eq!(edge.token1, TokenAddress::new("0xa"));
        assert_eq!(edge.pair_address, "0xpair");
        // only token1 (0xa) is priced: 2 * 100 * 3
        assert_approx_eq!(edge.liquidity_usd, 600.0);
    }

    #[tokio::test]
    async fn test_fetch_pair_missing_or_failing_returns_none() {
        let fetcher_missing = fetcher(
            MockIndexer::default(),
            MockReader::default(),
            StaticPriceOracle::new(),
            FetcherConfig::default(),
        );
        assert!(fetcher_missing
            .fetch_pair(&venue("uni", 1), &"0xa".into(), &"0xb".into())
            .await
            .is_none());

        let failing = MockReader {
            fail: true,
            ..Default::default()
        };
        let fetcher_failing = fetcher(MockIndexer::default(), failing, StaticPriceOracle::new(), FetcherConfig::default());
        assert!(fetcher_failing
            .fetch_pair(&venue("uni", 1), &"0xa".into(), &"0xb".into())
            .await
            .is_none());
    }
}
