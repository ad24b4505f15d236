// src/routing/pathfinder.rs
//! Multi-hop path discovery over a chain's liquidity graph.
//!
//! Two strategies are available: breadth-first enumeration of every simple
//! path up to `max_hops`, and a cost-optimal Dijkstra search over
//! `(token, hops)` states whose edge cost combines the pool fee with a
//! liquidity penalty. `PathfinderAlgorithm::Auto` chooses between them.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use super::graph::LiquidityGraph;
use crate::types::{PairEdge, TokenAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathfinderAlgorithm {
    Auto,
    Bfs,
    Dijkstra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathfinderConfig {
    pub max_hops: usize,
    pub max_paths: usize,
    pub min_liquidity_usd: f64,
    /// Liquidity at and above which an edge carries no penalty.
    pub reference_liquidity_usd: f64,
    /// Penalty added to an edge with zero liquidity; scales linearly up to the reference.
    pub liquidity_penalty_weight: f64,
    pub small_graph_node_limit: usize,
    /// Upper bound on queue pops during enumeration.
    pub max_expansions: usize,
    pub algorithm: PathfinderAlgorithm,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_hops: 3,
            max_paths: 20,
            min_liquidity_usd: 1_000.0,
            reference_liquidity_usd: 1_000_000.0,
            liquidity_penalty_weight: 0.01,
            small_graph_node_limit: 200,
            max_expansions: 50_000,
            algorithm: PathfinderAlgorithm::Auto,
        }
    }
}

/// A token sequence and the edge used for each hop. `tokens.len() == edges.len() + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePath {
    pub tokens: Vec<TokenAddress>,
    pub edges: Vec<PairEdge>,
}

impl CandidatePath {
    pub fn hop_count(&self) -> usize {
        self.edges.len()
    }

    pub fn source(&self) -> Option<&TokenAddress> {
        self.tokens.first()
    }

    pub fn destination(&self) -> Option<&TokenAddress> {
        self.tokens.last()
    }

    pub fn min_liquidity_usd(&self) -> f64 {
        self.edges
            .iter()
            .map(|e| e.liquidity_usd)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Search state for the cost-optimal strategy.
#[derive(Debug, Clone)]
struct PathNode {
    token: TokenAddress,
    cost: f64,
    tokens: Vec<TokenAddress>,
    edges: Vec<PairEdge>,
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}

impl Eq for PathNode {}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost) // Reverse for min-heap
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PathfinderStats {
    pub total_searches: u64,
    pub successful_searches: u64,
    pub bfs_searches: u64,
    pub dijkstra_searches: u64,
    pub average_search_time: Duration,
}

#[derive(Debug, Default)]
struct StatCounters {
    total: AtomicU64,
    successful: AtomicU64,
    bfs: AtomicU64,
    dijkstra: AtomicU64,
    total_micros: AtomicU64,
}

#[derive(Debug)]
pub struct PathFinder {
    config: PathfinderConfig,
    counters: StatCounters,
}

impl PathFinder {
    pub fn new(config: PathfinderConfig) -> Self {
        Self {
            config,
            counters: StatCounters::default(),
        }
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    /// Edge cost: fee fraction plus a penalty that grows linearly as liquidity
    /// falls below the reference.
    pub fn edge_cost(&self, edge: &PairEdge) -> f64 {
        let fee = edge.fee_bps as f64 / 10_000.0;
        let reference = self.config.reference_liquidity_usd;
        let penalty = if reference > 0.0 && edge.liquidity_usd < reference {
            let shortfall = (reference - edge.liquidity_usd.max(0.0)) / reference;
            self.config.liquidity_penalty_weight * shortfall
        } else {
            0.0
        };
        fee + penalty
    }

    /// Strategy used for a search with `max_hops` on `graph`.
    pub fn select_algorithm(&self, graph: &LiquidityGraph, max_hops: usize) -> PathfinderAlgorithm {
        match self.config.algorithm {
            PathfinderAlgorithm::Auto => {
                if max_hops <= 2 || graph.node_count() <= self.config.small_graph_node_limit {
                    PathfinderAlgorithm::Dijkstra
                } else {
                    PathfinderAlgorithm::Bfs
                }
            }
            forced => forced,
        }
    }

    pub fn find_paths(
        &self,
        graph: &LiquidityGraph,
        from: &TokenAddress,
        to: &TokenAddress,
    ) -> Vec<CandidatePath> {
        self.find_paths_with_hops(graph, from, to, self.config.max_hops)
    }

    /// Finds candidate paths; an unreachable destination yields an empty list.
    pub fn find_paths_with_hops(
        &self,
        graph: &LiquidityGraph,
        from: &TokenAddress,
        to: &TokenAddress,
        max_hops: usize,
    ) -> Vec<CandidatePath> {
        let started = Instant::now();
        self.counters.total.fetch_add(1, AtomicOrdering::Relaxed);

        if from == to || max_hops == 0 || graph.get_node(from).is_none() || graph.get_node(to).is_none() {
            debug!("No search for {} -> {} on chain {}", from, to, graph.chain_id());
            return Vec::new();
        }

        let algorithm = self.select_algorithm(graph, max_hops);
        let paths = match algorithm {
            PathfinderAlgorithm::Dijkstra => {
                self.counters.dijkstra.fetch_add(1, AtomicOrdering::Relaxed);
                self.dijkstra_search(graph, from, to, max_hops).into_iter().collect()
            }
            _ => {
                self.counters.bfs.fetch_add(1, AtomicOrdering::Relaxed);
                self.bfs_search(graph, from, to, max_hops)
            }
        };

        let elapsed = started.elapsed();
        self.counters
            .total_micros
            .fetch_add(elapsed.as_micros() as u64, AtomicOrdering::Relaxed);
        if !paths.is_empty() {
            self.counters.successful.fetch_add(1, AtomicOrdering::Relaxed);
        }

        info!(
            "Found {} paths from {} to {} on chain {} ({:?}) in {:?}",
            paths.len(),
            from,
            to,
            graph.chain_id(),
            algorithm,
            elapsed
        );
        paths
    }

    /// Most liquid edge between two tokens that clears the liquidity floor.
    fn usable_edge(&self, graph: &LiquidityGraph, a: &TokenAddress, b: &TokenAddress) -> Option<PairEdge> {
        graph
            .get_edge(a, b)
            .filter(|edge| edge.has_reserves() && edge.liquidity_usd >= self.config.min_liquidity_usd)
    }

    /// Enumerates simple paths breadth-first, so shorter paths come out first.
    fn bfs_search(
        &self,
        graph: &LiquidityGraph,
        from: &TokenAddress,
        to: &TokenAddress,
        max_hops: usize,
    ) -> Vec<CandidatePath> {
        let mut queue: VecDeque<(Vec<TokenAddress>, Vec<PairEdge>)> = VecDeque::new();
        let mut paths = Vec::new();
        let mut expansions = 0usize;

        queue.push_back((vec![from.clone()], Vec::new()));

        while let Some((tokens, edges)) = queue.pop_front() {
            expansions += 1;
            if expansions > self.config.max_expansions {
                debug!("Enumeration stopped after {} expansions", self.config.max_expansions);
                break;
            }
            if edges.len() >= max_hops {
                continue;
            }
            let current = match tokens.last() {
                Some(token) => token.clone(),
                None => continue,
            };

            for neighbor in graph.get_neighbors(&current) {
                if tokens.contains(&neighbor) {
                    continue;
                }
                let edge = match self.usable_edge(graph, &current, &neighbor) {
                    Some(edge) => edge,
                    None => continue,
                };

                let mut next_tokens = tokens.clone();
                next_tokens.push(neighbor.clone());
                let mut next_edges = edges.clone();
                next_edges.push(edge);

                if &neighbor == to {
                    paths.push(CandidatePath {
                        tokens: next_tokens,
                        edges: next_edges,
                    });
                    if paths.len() >= self.config.max_paths {
                        return paths;
                    }
                } else {
                    queue.push_back((next_tokens, next_edges));
                }
            }
        }

        paths
    }

    /// Lowest-cost path within `max_hops`, if any.
    fn dijkstra_search(
        &self,
        graph: &LiquidityGraph,
        from: &TokenAddress,
        to: &TokenAddress,
        max_hops: usize,
    ) -> Option<CandidatePath> {
        let mut heap = BinaryHeap::new();
        let mut best: HashMap<(TokenAddress, usize), f64> = HashMap::new();

        heap.push(PathNode {
            token: from.clone(),
            cost: 0.0,
            tokens: vec![from.clone()],
            edges: Vec::new(),
        });
        best.insert((from.clone(), 0), 0.0);

        while let Some(current) = heap.pop() {
            if &current.token == to {
                return Some(CandidatePath {
                    tokens: current.tokens,
                    edges: current.edges,
                });
            }

            let hops = current.edges.len();
            if hops >= max_hops {
                continue;
            }
            if best
                .get(&(current.token.clone(), hops))
                .map(|cost| current.cost > *cost)
                .unwrap_or(false)
            {
                continue;
            }

            for neighbor in graph.get_neighbors(&current.token) {
                if current.tokens.contains(&neighbor) {
                    continue;
                }

                let cheapest = graph
                    .get_edges(&current.token, &neighbor)
                    .into_iter()
                    .filter(|e| e.has_reserves() && e.liquidity_usd >= self.config.min_liquidity_usd)
                    .map(|e| (self.edge_cost(&e), e))
                    .min_by(|x, y| x.0.total_cmp(&y.0));
                let (edge_cost, edge) = match cheapest {
                    Some(found) => found,
                    None => continue,
                };

                let cost = current.cost + edge_cost;
                let state = (neighbor.clone(), hops + 1);
                if cost < *best.get(&state).unwrap_or(&f64::INFINITY) {
                    best.insert(state, cost);

                    let mut tokens = current.tokens.clone();
                    tokens.push(neighbor.clone());
                    let mut edges = current.edges.clone();
                    edges.push(edge);

                    heap.push(PathNode {
                        token: neighbor,
                        cost,
                        tokens,
                        edges,
                    });
                }
            }
        }

        None
    }

    pub fn stats(&self) -> PathfinderStats {
        let total = self.counters.total.load(AtomicOrdering::Relaxed);
        let micros = self.counters.total_micros.load(AtomicOrdering::Relaxed);
        PathfinderStats {
            total_searches: total,
            successful_searches: self.counters.successful.load(AtomicOrdering::Relaxed),
            bfs_searches: self.counters.bfs.load(AtomicOrdering::Relaxed),
            dijkstra_searches: self.counters.dijkstra.load(AtomicOrdering::Relaxed),
            average_search_time: if total > 0 {
                Duration::from_micros(micros / total)
            } else {
                Duration::ZERO
            },
        }
    }
}

impl Default for PathFinder {
    fn default() -> Self {
        Self::new(PathfinderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::graph::test_support::pair;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn addr(s: &str) -> TokenAddress {
        TokenAddress::new(s)
    }

    /// A-B-C-D chain plus a direct A-D pool with thin liquidity and an A-C shortcut.
    fn create_test_graph() -> LiquidityGraph {
        let graph = LiquidityGraph::new(1);
        graph.add_or_update_edge(pair(1, "0xa", "0xb", "uni", 1_000.0, 1_000.0, 2_000_000.0, 30));
        graph.add_or_update_edge(pair(1, "0xb", "0xc", "uni", 1_000.0, 1_000.0, 2_000_000.0, 30));
        graph.add_or_update_edge(pair(1, "0xc", "0xd", "uni", 1_000.0, 1_000.0, 2_000_000.0, 30));
        graph.add_or_update_edge(pair(1, "0xa", "0xd", "sushi", 10.0, 10.0, 5_000.0, 30));
        graph.add_or_update_edge(pair(1, "0xa", "0xc", "uni", 1_000.0, 1_000.0, 2_000_000.0, 30));
        graph
    }

    fn finder(algorithm: PathfinderAlgorithm, max_hops: usize) -> PathFinder {
        PathFinder::new(PathfinderConfig {
            algorithm,
            max_hops,
            ..Default::default()
        })
    }

    #[test]
    fn test_bfs_enumerates_simple_paths_within_bound() {
        let graph = create_test_graph();
        let finder = finder(PathfinderAlgorithm::Bfs, 3);
        let paths = finder.find_paths(&graph, &addr("0xa"), &addr("0xd"));

        assert!(!paths.is_empty());
        for path in &paths {
            let unique: HashSet<_> = path.tokens.iter().collect();
            assert_eq!(unique.len(), path.tokens.len(), "token repeated in {:?}", path.tokens);
            assert!(path.tokens.len() <= 4);
            assert_eq!(path.tokens.len(), path.edges.len() + 1);
            assert_eq!(path.source(), Some(&addr("0xa")));
            assert_eq!(path.destination(), Some(&addr("0xd")));
        }
        // a-d, a-c-d, a-b-c-d
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0].hop_count(), 1);
    }

    #[test]
    fn test_bfs_respects_max_paths_and_liquidity_floor() {
        let graph = create_test_graph();
        let finder = PathFinder::new(PathfinderConfig {
            algorithm: PathfinderAlgorithm::Bfs,
            min_liquidity_usd: 10_000.0,
            ..Default::default()
        });
        let paths = finder.find_paths(&graph, &addr("0xa"), &addr("0xd"));
        assert!(paths.iter().all(|p| p.hop_count() > 1));

        let capped = PathFinder::new(PathfinderConfig {
            algorithm: PathfinderAlgorithm::Bfs,
            max_paths: 1,
            ..Default::default()
        });
        assert_eq!(capped.find_paths(&graph, &addr("0xa"), &addr("0xd")).len(), 1);
    }

    #[test]
    fn test_dijkstra_prefers_liquid_route() {
        let graph = create_test_graph();
        let finder = finder(PathfinderAlgorithm::Dijkstra, 3);
        let paths = finder.find_paths(&graph, &addr("0xa"), &addr("0xd"));

        assert_eq!(paths.len(), 1);
        // thin a-d pool costs ~0.003 + 0.00995; a-c-d costs 0.006
        assert_eq!(paths[0].tokens, vec![addr("0xa"), addr("0xc"), addr("0xd")]);
    }

    #[test]
    fn test_dijkstra_respects_hop_bound() {
        let graph = LiquidityGraph::new(1);
        graph.add_or_update_edge(pair(1, "0xa", "0xb", "uni", 100.0, 100.0, 2_000_000.0, 30));
        graph.add_or_update_edge(pair(1, "0xb", "0xc", "uni", 100.0, 100.0, 2_000_000.0, 30));
        graph.add_or_update_edge(pair(1, "0xc", "0xd", "uni", 100.0, 100.0, 2_000_000.0, 30));

        assert!(finder(PathfinderAlgorithm::Dijkstra, 2)
            .find_paths(&graph, &addr("0xa"), &addr("0xd"))
            .is_empty());
        assert_eq!(
            finder(PathfinderAlgorithm::Dijkstra, 3)
                .find_paths(&graph, &addr("0xa"), &addr("0xd"))[0]
                .hop_count(),
            3
        );
    }

    #[test]
    fn test_disconnected_and_same_token_are_empty() {
        let graph = create_test_graph();
        graph.add_or_update_edge(pair(1, "0xx", "0xy", "uni", 100.0, 100.0, 2_000_000.0, 30));
        let finder = PathFinder::default();

        assert!(finder.find_paths(&graph, &addr("0xa"), &addr("0xx")).is_empty());
        assert!(finder.find_paths(&graph, &addr("0xa"), &addr("0xa")).is_empty());
        assert!(finder.find_paths(&graph, &addr("0xa"), &addr("0xnothing")).is_empty());
        assert_eq!(finder.stats().total_searches, 3);
        assert_eq!(finder.stats().successful_searches, 0);
    }

    #[test]
    fn test_auto_selection() {
        let graph = create_test_graph();
        let auto = PathFinder::new(PathfinderConfig {
            small_graph_node_limit: 2,
            ..Default::default()
        });
        assert_eq!(auto.select_algorithm(&graph, 2), PathfinderAlgorithm::Dijkstra);
        assert_eq!(auto.select_algorithm(&graph, 3), PathfinderAlgorithm::Bfs);

        let small = PathFinder::default();
        assert_eq!(small.select_algorithm(&graph, 4), PathfinderAlgorithm::Dijkstra);

        let forced = finder(PathfinderAlgorithm::Bfs, 1);
        assert_eq!(forced.select_algorithm(&graph, 1), PathfinderAlgorithm::Bfs);
    }

    #[test]
    fn test_edge_cost_penalises_thin_liquidity() {
        let finder = PathFinder::default();
        let deep = pair(1, "0xa", "0xb", "uni", 1.0, 1.0, 5_000_000.0, 30);
        let thin = pair(1, "0xa", "0xb", "uni", 1.0, 1.0, 500_000.0, 30);
        assert!((finder.edge_cost(&deep) - 0.003).abs() < 1e-12);
        assert!((finder.edge_cost(&thin) - 0.008).abs() < 1e-12);
    }
}
