// src/data/graph_builder.rs
//! Builds and refreshes per-chain liquidity graphs from the pair fetcher.
//! This is the only component that writes into a `LiquidityGraph`.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::fetcher::PairFetcher;
use super::VenueConfig;
use crate::cache::CacheManager;
use crate::routing::aggregator::PairResolver;
use crate::routing::graph::{GraphRegistry, LiquidityGraph};
use crate::types::{ChainId, PairEdge, TokenAddress};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphBuilderConfig {
    /// Pairs re-read on-chain after each bulk build.
    pub verify_top_pairs: usize,
    pub verify_concurrency: usize,
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self {
            verify_top_pairs: 25,
            verify_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphBuildReport {
    pub chain_id: ChainId,
    pub pairs_updated: usize,
    pub pairs_verified: usize,
    pub pairs_total: usize,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

pub struct GraphBuilder {
    graphs: Arc<GraphRegistry>,
    fetcher: Arc<PairFetcher>,
    cache: Arc<CacheManager>,
    venues: Vec<VenueConfig>,
    config: GraphBuilderConfig,
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("venues", &self.venues.len())
            .field("chains", &self.configured_chains())
            .field("config", &self.config)
            .finish()
    }
}

impl GraphBuilder {
    pub fn new(
        graphs: Arc<GraphRegistry>,
        fetcher: Arc<PairFetcher>,
        cache: Arc<CacheManager>,
        venues: Vec<VenueConfig>,
        config: GraphBuilderConfig,
    ) -> Self {
        Self {
            graphs,
            fetcher,
            cache,
            venues,
            config,
        }
    }

    pub fn graphs(&self) -> &Arc<GraphRegistry> {
        &self.graphs
    }

    pub fn graph(&self, chain_id: ChainId) -> Arc<LiquidityGraph> {
        self.graphs.get_or_create(chain_id)
    }

    pub fn configured_chains(&self) -> Vec<ChainId> {
        self.venues.iter().map(|v| v.chain_id).unique().sorted().collect()
    }

    fn venues_for(&self, chain_id: ChainId) -> Vec<&VenueConfig> {
        self.venues.iter().filter(|v| v.chain_id == chain_id).collect()
    }

    fn venue_named(&self, chain_id: ChainId, name: &str) -> Option<&VenueConfig> {
        self.venues
            .iter()
            .find(|v| v.chain_id == chain_id && v.name.eq_ignore_ascii_case(name))
    }

    /// Bulk-loads every venue of the chain, then re-verifies the most liquid pairs on-chain.
    pub async fn build_graph(&self, chain_id: ChainId) -> GraphBuildReport {
        let started = Instant::now();
        let graph = self.graphs.get_or_create(chain_id);
        let venues = self.venues_for(chain_id);
        let mut errors = Vec::new();
        let mut pairs_updated = 0;

        if venues.is_empty() {
            warn!("No venues configured for chain {}", chain_id);
            errors.push(format!("No venues configured for chain {}", chain_id));
        }

        let bulk_results =
            futures::future::join_all(venues.iter().map(|venue| self.fetcher.fetch_bulk(venue))).await;

        let mut touched = Vec::new();
        for result in bulk_results {
            errors.extend(result.errors);
            for node in result.nodes {
                self.cache.put_node(&node).await;
                graph.add_or_update_node(node);
            }
            for edge in result.edges {
                touched.push((edge.token0.clone(), edge.token1.clone()));
                graph.add_or_update_edge(edge);
                pairs_updated += 1;
            }
        }
        for (a, b) in touched.iter().map(|(x, y)| if x <= y { (x, y) } else { (y, x) }).unique() {
            self.cache_best(&graph, a, b).await;
        }

        let pairs_verified = self.verify_top_pairs(&graph).await;

        let report = GraphBuildReport {
            chain_id,
            pairs_updated,
            pairs_verified,
            pairs_total: graph.edge_count(),
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
        };

        info!(
            "Graph build for chain {}: {} updated, {} verified, {} total pairs in {}ms ({} errors)",
            chain_id,
            report.pairs_updated,
            report.pairs_verified,
            report.pairs_total,
            report.duration_ms,
            report.errors.len()
        );
        report
    }

    async fn verify_top_pairs(&self, graph: &LiquidityGraph) -> usize {
        if self.config.verify_top_pairs == 0 {
            return 0;
        }

        let chain_id = graph.chain_id();
        let targets: Vec<(PairEdge, VenueConfig)> = graph
            .top_edges_by_liquidity(self.config.verify_top_pairs)
            .into_iter()
            .filter_map(|edge| {
                let venue = self.venue_named(chain_id, &edge.venue)?.clone();
                Some((edge, venue))
            })
            .collect();

        let fresh: Vec<Option<(PairEdge, PairEdge)>> = stream::iter(targets)
            .map(|(edge, venue)| async move {
                match self.fetcher.fetch_pair(&venue, &edge.token0, &edge.token1).await {
                    Some(fetched) => Some((edge, fetched)),
                    None => {
                        debug!("Keeping bulk snapshot of {} on {}", edge.pair_address, edge.venue);
                        None
                    }
                }
            })
            .buffer_unordered(self.config.verify_concurrency.max(1))
            .collect()
            .await;

        let mut verified = 0;
        for (bulk, edge) in fresh.into_iter().flatten() {
            let edge = carry_liquidity(&bulk, edge);
            let (a, b) = (edge.token0.clone(), edge.token1.clone());
            graph.add_or_update_edge(edge);
            self.cache_best(graph, &a, &b).await;
            verified += 1;
        }
        verified
    }

    /// Pair cache entries hold the most liquid edge across venues.
    async fn cache_best(&self, graph: &LiquidityGraph, a: &TokenAddress, b: &TokenAddress) {
        if let Some(best) = graph.get_edge(a, b) {
            self.cache.put_pair(&best).await;
        }
    }

    /// Rebuilds every chain that has configured venues.
    pub async fn build_all(&self) -> Vec<GraphBuildReport> {
        let mut reports = Vec::new();
        for chain_id in self.configured_chains() {
            reports.push(self.build_graph(chain_id).await);
        }
        reports
    }

    /// Resolves a pair through cache, then graph, then a targeted fetch across the
    /// chain's venues. Successful lookups populate the tiers they missed.
    pub async fn get_pair(
        &self,
        chain_id: ChainId,
        a: &TokenAddress,
        b: &TokenAddress,
    ) -> Option<PairEdge> {
        if a == b {
            return None;
        }
        let graph = self.graphs.get_or_create(chain_id);

        let cached = self.cache.get_pair(chain_id, a, b).await;
        match (cached, graph.get_edge(a, b)) {
            (Some(cached), Some(in_graph)) if in_graph.liquidity_usd > cached.liquidity_usd => {
                self.cache.put_pair(&in_graph).await;
                return Some(in_graph);
            }
            (Some(cached), in_graph) => {
                if in_graph.is_none() {
                    graph.add_or_update_edge(cached.clone());
                }
                return Some(cached);
            }
            (None, Some(in_graph)) => {
                self.cache.put_pair(&in_graph).await;
                return Some(in_graph);
            }
            (None, None) => {}
        }

        let venues = self.venues_for(chain_id);
        let fetched =
            futures::future::join_all(venues.iter().map(|venue| self.fetcher.fetch_pair(venue, a, b)))
                .await;

        let best = fetched
            .into_iter()
            .flatten()
            .max_by(|x, y| x.liquidity_usd.total_cmp(&y.liquidity_usd))?;

        self.cache.put_pair(&best).await;
        graph.add_or_update_edge(best.clone());
        Some(best)
    }
}

#[async_trait]
impl PairResolver for GraphBuilder {
    async fn resolve_pair(&self, chain_id: ChainId, a: &TokenAddress, b: &TokenAddress) -> Option<PairEdge> {
        self.get_pair(chain_id, a, b).await
    }
}

/// A re-read pair the oracle could not price keeps the indexer's liquidity,
/// scaled by the geometric mean of the reserve changes.
fn carry_liquidity(bulk: &PairEdge, mut fresh: PairEdge) -> PairEdge {
    if fresh.liquidity_usd > 0.0 {
        return fresh;
    }
    let scale = match (bulk.reserves_for(&bulk.token0), fresh.reserves_for(&bulk.token0)) {
        (Some((old0, old1)), Some((new0, new1))) if old0 > 0.0 && old1 > 0.0 => {
            ((new0 / old0) * (new1 / old1)).sqrt()
        }
        _ => 1.0,
    };
    fresh.liquidity_usd = if scale.is_finite() {
        bulk.liquidity_usd * scale
    } else {
        bulk.liquidity_usd
    };
    fresh
}
