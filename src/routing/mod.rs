// src/routing/mod.rs
//! Universal routing engine
//!
//! - Per-chain liquidity graph
//! - Path discovery (breadth-first enumeration, cost-optimal search)
//! - Net-value route scoring and route building
//! - Quote aggregation across internal and external routers
//! - Structural validation and the route service enhancer

pub mod aggregator;
pub mod builder;
pub mod enhancer;
pub mod graph;
pub mod pathfinder;
pub mod scorer;
pub mod validator;

pub use graph::{GraphRegistry, GraphStats, LiquidityGraph};

pub use pathfinder::{CandidatePath, PathFinder, PathfinderAlgorithm, PathfinderConfig, PathfinderStats};

pub use scorer::{compound_price_impact, simulate_hop, HopSimulation, PathScore, RouteScorer, ScorerConfig};

pub use builder::{BuilderConfig, RouteBuilder, UNIVERSAL_SOURCE};

pub use aggregator::{
    compare_quotes, AggregateOptions, AggregatedQuote, AggregatorConfig, ExternalQuoteSource,
    PairResolver, QuoteAggregator, RouteCandidate,
};

pub use validator::{RouteValidator, ValidationResult, ValidatorConfig};

pub use enhancer::{
    EnhanceOptions, EnhancedRouteResponse, EnhancerConfig, ExistingRouteResponse,
    RouteServiceEnhancer, SelectedSource,
};
