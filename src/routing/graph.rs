// src/routing/graph.rs
//! Liquidity Graph
//!
//! In-memory, per-chain adjacency store of token nodes and venue pair edges.
//! Writes come only from the graph builder; pathfinding and scoring read it
//! concurrently. Each edge is replaced as a whole value, so readers never see a
//! half-written reserve pair.

use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::types::{ChainId, EdgeKey, PairEdge, TokenAddress, TokenNode};

/// Graph statistics for monitoring
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GraphStats {
    pub chain_id: ChainId,
    pub node_count: usize,
    pub edge_count: usize,
    pub total_liquidity_usd: f64,
}

/// Liquidity graph for one chain
pub struct LiquidityGraph {
    chain_id: ChainId,
    /// Token nodes indexed by address
    nodes: DashMap<TokenAddress, TokenNode>,
    /// Pair edges indexed by (unordered pair, venue)
    edges: DashMap<EdgeKey, PairEdge>,
    /// Adjacency list: token -> keys of edges touching it
    adjacency: DashMap<TokenAddress, HashSet<EdgeKey>>,
}

impl LiquidityGraph {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            nodes: DashMap::new(),
            edges: DashMap::new(),
            adjacency: DashMap::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Insert a node or refresh an existing one. Nodes are never removed.
    pub fn add_or_update_node(&self, node: TokenNode) {
        if node.chain_id != self.chain_id {
            debug!(
                "Ignoring node {} for chain {} in graph of chain {}",
                node.address, node.chain_id, self.chain_id
            );
            return;
        }
        self.nodes.insert(node.address.clone(), node);
    }

    /// Insert an edge or replace the stored snapshot for the same pair and venue.
    pub fn add_or_update_edge(&self, edge: PairEdge) {
        if edge.chain_id != self.chain_id || edge.token0 == edge.token1 {
            debug!(
                "Ignoring edge {} ({} / {}) for graph of chain {}",
                edge.pair_address, edge.token0, edge.token1, self.chain_id
            );
            return;
        }

        for (token, decimals) in [(&edge.token0, edge.decimals0), (&edge.token1, edge.decimals1)] {
            if !self.nodes.contains_key(token) {
                self.nodes.insert(
                    token.clone(),
                    TokenNode::placeholder(token.clone(), self.chain_id, decimals),
                );
            }
        }

        let key = edge.key();
        self.adjacency
            .entry(edge.token0.clone())
            .or_default()
            .insert(key.clone());
        self.adjacency
            .entry(edge.token1.clone())
            .or_default()
            .insert(key.clone());

        debug!(
            "Upserted {} pair {} ({} <-> {}) on chain {}",
            edge.venue, edge.pair_address, edge.token0, edge.token1, self.chain_id
        );
        self.edges.insert(key, edge);
    }

    /// Best (highest liquidity) edge between two tokens, in either direction.
    pub fn get_edge(&self, a: &TokenAddress, b: &TokenAddress) -> Option<PairEdge> {
        self.get_edges(a, b).into_iter().max_by(|x, y| {
            x.liquidity_usd
                .partial_cmp(&y.liquidity_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// All edges between two tokens across venues.
    pub fn get_edges(&self, a: &TokenAddress, b: &TokenAddress) -> Vec<PairEdge> {
        let Some(keys) = self.adjacency.get(a) else {
            return Vec::new();
        };
        keys.iter()
            .filter(|key| (&key.token_a == b || &key.token_b == b) && a != b)
            .filter_map(|key| self.edges.get(key).map(|edge| edge.value().clone()))
            .collect()
    }

    /// Tokens directly tradable against `token`, deduplicated across venues.
    pub fn get_neighbors(&self, token: &TokenAddress) -> Vec<TokenAddress> {
        let Some(keys) = self.adjacency.get(token) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut neighbors = Vec::new();
        for key in keys.iter() {
            let other = if &key.token_a == token {
                &key.token_b
            } else {
                &key.token_a
            };
            if seen.insert(other.clone()) {
                neighbors.push(other.clone());
            }
        }
        neighbors.sort();
        neighbors
    }

    pub fn get_node(&self, token: &TokenAddress) -> Option<TokenNode> {
        self.nodes.get(token).map(|node| node.value().clone())
    }

    pub fn get_all_nodes(&self) -> Vec<TokenNode> {
        self.nodes.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn get_all_edges(&self) -> Vec<PairEdge> {
        self.edges.iter().map(|entry| entry.value().clone()).collect()
    }

    /// The `limit` most liquid edges, highest first.
    pub fn top_edges_by_liquidity(&self, limit: usize) -> Vec<PairEdge> {
        let mut edges = self.get_all_edges();
        edges.sort_by(|a, b| b.liquidity_usd.total_cmp(&a.liquidity_usd));
        edges.truncate(limit);
        edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn get_stats(&self) -> GraphStats {
        GraphStats {
            chain_id: self.chain_id,
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            total_liquidity_usd: self.edges.iter().map(|e| e.value().liquidity_usd).sum(),
        }
    }
}

impl std::fmt::Debug for LiquidityGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidityGraph")
            .field("chain_id", &self.chain_id)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}

/// One lazily created graph per chain id, shared for the process lifetime.
#[derive(Debug, Default)]
pub struct GraphRegistry {
    graphs: DashMap<ChainId, Arc<LiquidityGraph>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, chain_id: ChainId) -> Arc<LiquidityGraph> {
        self.graphs
            .entry(chain_id)
            .or_insert_with(|| {
                info!("Creating liquidity graph for chain {}", chain_id);
                Arc::new(LiquidityGraph::new(chain_id))
            })
            .clone()
    }

    pub fn get(&self, chain_id: ChainId) -> Option<Arc<LiquidityGraph>> {
        self.graphs.get(&chain_id).map(|g| g.value().clone())
    }

    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.graphs.iter().map(|g| *g.key()).collect();
        chains.sort_unstable();
        chains
    }
}
