// src/routing/aggregator.rs
//! Quote aggregation: internally discovered routes and external router quotes
//! are normalized onto one net-value scale and ranked together.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};

use super::builder::RouteBuilder;
use super::graph::GraphRegistry;
use super::pathfinder::PathFinder;
use super::scorer::RouteScorer;
use crate::error::Result;
use crate::types::{
    ChainId, ExternalRoute, FeeBreakdown, PairEdge, PricingContext, QuoteRequest, TokenAddress, UniversalRoute,
};

/// A venue router that can quote a swap in the common external shape.
#[async_trait]
pub trait ExternalQuoteSource: Send + Sync {
    fn name(&self) -> &str;

    async fn get_quote(&self, request: &QuoteRequest) -> Result<Option<ExternalRoute>>;
}

/// Fetches a single pair on demand and makes it visible in the shared graph
/// registry before a search runs.
#[async_trait]
pub trait PairResolver: Send + Sync {
    async fn resolve_pair(&self, chain_id: ChainId, a: &TokenAddress, b: &TokenAddress) -> Option<PairEdge>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "route", rename_all = "lowercase")]
pub enum RouteCandidate {
    Internal(UniversalRoute),
    External(ExternalRoute),
}

impl RouteCandidate {
    pub fn provider(&self) -> &str {
        match self {
            RouteCandidate::Internal(route) => &route.source,
            RouteCandidate::External(route) => &route.router,
        }
    }

    pub fn path(&self) -> &[TokenAddress] {
        match self {
            RouteCandidate::Internal(route) => &route.path,
            RouteCandidate::External(route) => &route.path,
        }
    }

    pub fn amount_out(&self) -> f64 {
        match self {
            RouteCandidate::Internal(route) => route.amount_out(),
            RouteCandidate::External(route) => route.amount_out(),
        }
    }

    pub fn price_impact(&self) -> f64 {
        match self {
            RouteCandidate::Internal(route) => route.price_impact,
            RouteCandidate::External(route) => route.price_impact,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, RouteCandidate::Internal(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedQuote {
    pub provider: String,
    pub candidate: RouteCandidate,
    pub amount_out: f64,
    pub score: f64,
    pub price_impact: f64,
    pub fees: FeeBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub max_quotes: usize,
    pub max_internal_routes: usize,
    pub internal_timeout: Duration,
    pub source_timeout: Duration,
    pub aggregate_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_quotes: 5,
            max_internal_routes: 5,
            internal_timeout: Duration::from_secs(2),
            source_timeout: Duration::from_secs(3),
            aggregate_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateOptions {
    pub enable_internal: bool,
    pub pricing: PricingContext,
    pub max_hops: Option<usize>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            enable_internal: true,
            pricing: PricingContext::default(),
            max_hops: None,
        }
    }
}

/// Sort order: score desc, then output desc, then price impact asc.
pub fn compare_quotes(a: &AggregatedQuote, b: &AggregatedQuote) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.amount_out.total_cmp(&a.amount_out))
        .then_with(|| a.price_impact.total_cmp(&b.price_impact))
}

pub struct QuoteAggregator {
    graphs: Arc<GraphRegistry>,
    pathfinder: Arc<PathFinder>,
    scorer: RouteScorer,
    builder: RouteBuilder,
    pair_resolver: Option<Arc<dyn PairResolver>>,
    config: AggregatorConfig,
}

impl std::fmt::Debug for QuoteAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteAggregator")
            .field("chains", &self.graphs.chains())
            .field("pair_resolver", &self.pair_resolver.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl QuoteAggregator {
    pub fn new(
        graphs: Arc<GraphRegistry>,
        pathfinder: Arc<PathFinder>,
        scorer: RouteScorer,
        builder: RouteBuilder,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            graphs,
            pathfinder,
            scorer,
            builder,
            pair_resolver: None,
            config,
        }
    }

    /// Resolves a missing direct pair through `resolver` before each internal search.
    /// The resolver must write into the same registry this aggregator reads.
    pub fn with_pair_resolver(mut self, resolver: Arc<dyn PairResolver>) -> Self {
        self.pair_resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Whether internal routing can run for the chain at all.
    pub fn has_graph(&self, chain_id: u64) -> bool {
        self.graphs
            .get(chain_id)
            .map(|graph| !graph.is_empty())
            .unwrap_or(false)
    }

    /// Pathfinder + scorer + builder under the internal timeout. Failures,
    /// timeouts and panics all yield an empty list.
    pub async fn find_internal_routes(
        &self,
        request: &QuoteRequest,
        options: &AggregateOptions,
    ) -> Vec<UniversalRoute> {
        self.resolve_direct_pair(request).await;

        let graph = match self.graphs.get(request.chain_id) {
            Some(graph) if !graph.is_empty() => graph,
            _ => {
                debug!("No liquidity graph for chain {}", request.chain_id);
                return Vec::new();
            }
        };

        let pathfinder = Arc::clone(&self.pathfinder);
        let scorer = self.scorer.clone();
        let builder = self.builder.clone();
        let request = request.clone();
        let pricing = options.pricing.clone();
        let max_hops = options.max_hops.unwrap_or(pathfinder.config().max_hops);
        let limit = self.config.max_internal_routes;

        let search = tokio::task::spawn_blocking(move || {
            let paths = pathfinder.find_paths_with_hops(&graph, &request.from_token, &request.to_token, max_hops);
            let mut routes: Vec<UniversalRoute> = paths
                .iter()
                .filter_map(|path| {
                    let score = scorer.score_path(path, request.amount_in, &pricing)?;
                    match builder.build(request.chain_id, path, request.amount_in, &score) {
                        Ok(route) => Some(route),
                        Err(e) => {
                            debug!("Dropping unbuildable path: {}", e);
                            None
                        }
                    }
                })
                .collect();
            routes.sort_by(|a, b| b.score.total_cmp(&a.score));
            routes.truncate(limit);
            routes
        });

        match timeout(self.config.internal_timeout, search).await {
            Ok(Ok(routes)) => routes,
            Ok(Err(e)) => {
                warn!("Internal route search failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Internal route search timed out after {:?}",
                    self.config.internal_timeout
                );
                Vec::new()
            }
        }
    }

    async fn resolve_direct_pair(&self, request: &QuoteRequest) {
        let Some(resolver) = &self.pair_resolver else {
            return;
        };
        if request.from_token == request.to_token {
            return;
        }
        let present = self
            .graphs
            .get(request.chain_id)
            .map(|graph| graph.get_edge(&request.from_token, &request.to_token).is_some())
            .unwrap_or(false);
        if present {
            return;
        }

        let lookup = resolver.resolve_pair(request.chain_id, &request.from_token, &request.to_token);
        match timeout(self.config.internal_timeout, lookup).await {
            Ok(Some(edge)) => debug!(
                "Resolved {} pair {} for {} -> {} on demand",
                edge.venue, edge.pair_address, request.from_token, request.to_token
            ),
            Ok(None) => debug!(
                "No direct pair for {} -> {} on chain {}",
                request.from_token, request.to_token, request.chain_id
            ),
            Err(_) => warn!(
                "On-demand pair lookup for {} -> {} timed out after {:?}",
                request.from_token, request.to_token, self.config.internal_timeout
            ),
        }
    }

    /// Puts any candidate on the common scale.
    pub fn normalize(&self, candidate: RouteCandidate, pricing: &PricingContext) -> AggregatedQuote {
        match candidate {
            RouteCandidate::Internal(route) => AggregatedQuote {
                provider: route.source.clone(),
                amount_out: route.amount_out(),
                score: route.score,
                price_impact: route.price_impact,
                fees: route.fees.clone(),
                candidate: RouteCandidate::Internal(route),
            },
            RouteCandidate::External(route) => {
                let score = self.scorer.score_external(&route, pricing);
                AggregatedQuote {
                    provider: route.router.clone(),
                    amount_out: score.amount_out,
                    score: score.score,
                    price_impact: score.price_impact,
                    fees: FeeBreakdown::new(score.protocol_fees_usd, score.gas_usd, 0.0),
                    candidate: RouteCandidate::External(route),
                }
            }
        }
    }

    fn accepts_external(&self, request: &QuoteRequest, route: &ExternalRoute) -> bool {
        let reason = if route.chain_id != request.chain_id {
            Some("wrong chain")
        } else if route.is_expired() {
            Some("expired")
        } else if route.path.first() != Some(&request.from_token)
            || route.path.last() != Some(&request.to_token)
        {
            Some("endpoints do not match request")
        } else if !(route.amount_out().is_finite() && route.amount_out() > 0.0) {
            Some("no output")
        } else {
            None
        };
        if let Some(reason) = reason {
            debug!("Ignoring external route from {}: {}", route.router, reason);
            return false;
        }
        true
    }

    fn rank(&self, mut quotes: Vec<AggregatedQuote>) -> Vec<AggregatedQuote> {
        quotes.sort_by(compare_quotes);
        quotes.truncate(self.config.max_quotes);
        quotes
    }

    /// Merges internal routes with externally supplied ones and returns the top quotes.
    pub async fn aggregate_quotes(
        &self,
        request: &QuoteRequest,
        external_routes: Vec<ExternalRoute>,
        options: &AggregateOptions,
    ) -> Vec<AggregatedQuote> {
        let internal = if options.enable_internal {
            self.find_internal_routes(request, options).await
        } else {
            Vec::new()
        };
        self.merge(request, internal, external_routes, options)
    }

    /// Like `aggregate_quotes`, additionally querying live sources concurrently with
    /// the internal search. Slow or failing sources contribute nothing.
    pub async fn aggregate_with_sources(
        &self,
        request: &QuoteRequest,
        sources: &[Arc<dyn ExternalQuoteSource>],
        external_routes: Vec<ExternalRoute>,
        options: &AggregateOptions,
    ) -> Vec<AggregatedQuote> {
        let internal = async {
            if options.enable_internal {
                self.find_internal_routes(request, options).await
            } else {
                Vec::new()
            }
        };
        let (internal, mut gathered) = tokio::join!(internal, self.gather_sources(request, sources));
        gathered.extend(external_routes);
        self.merge(request, internal, gathered, options)
    }

    async fn gather_sources(
        &self,
        request: &QuoteRequest,
        sources: &[Arc<dyn ExternalQuoteSource>],
    ) -> Vec<ExternalRoute> {
        let deadline = Instant::now() + self.config.aggregate_timeout;
        let source_timeout = self.config.source_timeout;

        let mut pending: FuturesUnordered<_> = sources
            .iter()
            .map(|source| async move {
                let outcome = timeout(source_timeout, source.get_quote(request)).await;
                (source.name().to_string(), outcome)
            })
            .collect();

        let mut routes = Vec::new();
        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some((name, Ok(Ok(Some(route)))))) => {
                    debug!("Quote from {}: {}", name, route.amount_out());
                    routes.push(route);
                }
                Ok(Some((name, Ok(Ok(None))))) => debug!("{} has no route", name),
                Ok(Some((name, Ok(Err(e))))) => warn!("Quote source {} failed: {}", name, e),
                Ok(Some((name, Err(_)))) => {
                    warn!("Quote source {} timed out after {:?}", name, source_timeout)
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Quote gathering hit {:?} with {} sources outstanding",
                        self.config.aggregate_timeout,
                        pending.len()
                    );
                    break;
                }
            }
        }
        routes
    }

    fn merge(
        &self,
        request: &QuoteRequest,
        internal: Vec<UniversalRoute>,
        external: Vec<ExternalRoute>,
        options: &AggregateOptions,
    ) -> Vec<AggregatedQuote> {
        let internal_count = internal.len();
        let mut quotes: Vec<AggregatedQuote> = internal
            .into_iter()
            .map(|route| self.normalize(RouteCandidate::Internal(route), &options.pricing))
            .collect();
        quotes.extend(
            external
                .into_iter()
                .filter(|route| self.accepts_external(request, route))
                .map(|route| self.normalize(RouteCandidate::External(route), &options.pricing)),
        );

        let total = quotes.len();
        let ranked = self.rank(quotes);
        info!(
            "Aggregated {} quotes ({} internal) for {} -> {} on chain {}, returning {}",
            total,
            internal_count,
            request.from_token,
            request.to_token,
            request.chain_id,
            ranked.len()
        );
        ranked
    }
}
