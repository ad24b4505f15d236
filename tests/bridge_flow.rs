// tests/bridge_flow.rs
//! Cross-chain flow: source swap, bridge selection and status tracking.

use assert_approx_eq::assert_approx_eq;
use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use universal_router::bridge::{
    BridgeAdapter, BridgeComparator, BridgeExecutionResult, BridgeFees, BridgeQuote, BridgeQuoteRequest,
    BridgeRegistry, BridgeState, BridgeStatus, BridgeStatusTracker, ComparatorConfig, CrossChainConfig,
    CrossChainRequest, CrossChainRouteBuilder, TrackerConfig, TrackingOutcome,
};
use universal_router::error::Result;
use universal_router::routing::{
    AggregatorConfig, GraphRegistry, PathFinder, QuoteAggregator, RouteBuilder, RouteScorer,
};
use universal_router::types::{expiry_from_now, to_raw, ChainId, PairEdge, PricingContext, TokenAddress};

const ETHEREUM: ChainId = 1;
const ARBITRUM: ChainId = 42161;

struct ScriptedBridge {
    name: String,
    priority: u32,
    rate: f64,
    fee: f64,
    ttl: Duration,
    states: Vec<BridgeState>,
    polls: AtomicUsize,
    seen: Mutex<Vec<BridgeQuoteRequest>>,
}

impl ScriptedBridge {
    fn new(name: &str, rate: f64, fee: f64) -> Self {
        Self {
            name: name.to_string(),
            priority: 0,
            rate,
            fee,
            ttl: Duration::from_secs(300),
            states: vec![BridgeState::Pending, BridgeState::Processing, BridgeState::Completed],
            polls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BridgeAdapter for ScriptedBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_chains(&self) -> Vec<ChainId> {
        vec![ETHEREUM, ARBITRUM]
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn get_quote(&self, request: &BridgeQuoteRequest) -> Result<Option<BridgeQuote>> {
        self.seen.lock().unwrap().push(request.clone());
        let amount_out = request.amount_in * self.rate;
        Ok(Some(BridgeQuote {
            id: Uuid::new_v4(),
            bridge: self.name.clone(),
            from_chain: request.from_chain,
            to_chain: request.to_chain,
            from_token: request.from_token.clone(),
            to_token: request
                .to_token
                .clone()
                .unwrap_or_else(|| TokenAddress::new("0xarb-usdc")),
            amount_in: request.amount_in,
            amount_out,
            min_amount_out: (amount_out - self.fee) * 0.995,
            fees: BridgeFees {
                fee_amount: self.fee,
                fee_usd: self.fee,
                gas_usd: 0.5,
            },
            estimated_duration: Duration::from_secs(600),
            expires_at: expiry_from_now(self.ttl),
        }))
    }

    async fn execute_bridge(&self, quote: &BridgeQuote, user_address: &str) -> Result<BridgeExecutionResult> {
        Ok(BridgeExecutionResult {
            quote_id: quote.id,
            bridge: self.name.clone(),
            sender: user_address.to_string(),
            source_tx_hash: "0xsource".to_string(),
            state: BridgeState::Pending,
            submitted_at: Utc::now(),
        })
    }

    async fn get_bridge_status(&self, source_tx_hash: &str, _from_chain: ChainId) -> Result<Option<BridgeStatus>> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        let state = self
            .states
            .get(n)
            .or_else(|| self.states.last())
            .copied()
            .unwrap_or(BridgeState::Pending);
        if source_tx_hash != "0xsource" {
            return Ok(None);
        }
        Ok(Some(BridgeStatus {
            state,
            source_tx_hash: source_tx_hash.to_string(),
            destination_tx_hash: None,
            amount_received: None,
            message: None,
            updated_at: Utc::now(),
        }))
    }
}

fn pair(chain_id: ChainId, a: &str, b: &str, reserve_a: f64, reserve_b: f64) -> PairEdge {
    PairEdge {
        token0: TokenAddress::new(a),
        token1: TokenAddress::new(b),
        decimals0: 18,
        decimals1: 18,
        chain_id,
        venue: "uniswap-v2".to_string(),
        factory: "0xfactory".to_string(),
        pair_address: format!("pool-{}-{}-{}", chain_id, a, b),
        liquidity_usd: 2e6,
        reserve0: to_raw(reserve_a, 18),
        reserve1: to_raw(reserve_b, 18),
        fee_bps: 30,
        updated_at: Utc::now(),
    }
}

fn unit_pricing() -> PricingContext {
    PricingContext {
        input_price_usd: 1.0,
        output_price_usd: 1.0,
        gas_price_gwei: 0.0,
        native_price_usd: 0.0,
    }
}

fn setup(bridges: Vec<Arc<ScriptedBridge>>) -> (CrossChainRouteBuilder, Arc<BridgeRegistry>) {
    let graphs = Arc::new(GraphRegistry::new());
    let eth = graphs.get_or_create(ETHEREUM);
    eth.add_or_update_edge(pair(ETHEREUM, "0xweth", "0xdai", 1e6, 1e6));
    eth.add_or_update_edge(pair(ETHEREUM, "0xdai", "0xeth-usdc", 1e6, 1e6));
    let arb = graphs.get_or_create(ARBITRUM);
    arb.add_or_update_edge(pair(ARBITRUM, "0xarb-usdc", "0xgmx", 1e6, 1e6));

    let aggregator = Arc::new(QuoteAggregator::new(
        graphs,
        Arc::new(PathFinder::default()),
        RouteScorer::default(),
        RouteBuilder::default(),
        AggregatorConfig::default(),
    ));

    let registry = Arc::new(BridgeRegistry::new());
    for bridge in bridges {
        registry.register(bridge);
    }

    let mut bridge_assets = HashMap::new();
    bridge_assets.insert(ETHEREUM, vec![TokenAddress::new("0xeth-usdc")]);
    bridge_assets.insert(ARBITRUM, vec![TokenAddress::new("0xarb-usdc")]);
    let builder = CrossChainRouteBuilder::new(
        aggregator,
        BridgeComparator::new(Arc::clone(&registry), ComparatorConfig::default()),
        CrossChainConfig {
            bridge_assets,
            slippage_bps: 50,
            max_hops: Some(3),
        },
    );
    (builder, registry)
}

fn request() -> CrossChainRequest {
    CrossChainRequest {
        from_chain: ETHEREUM,
        to_chain: ARBITRUM,
        from_token: TokenAddress::new("0xweth"),
        to_token: TokenAddress::new("0xgmx"),
        amount_in: 1_000.0,
        source_pricing: unit_pricing(),
        destination_pricing: unit_pricing(),
    }
}

#[tokio::test]
async fn bridge_input_is_last_token_of_source_route() {
    let bridge = Arc::new(ScriptedBridge::new("stargate", 1.0, 2.0));
    let (builder, _) = setup(vec![Arc::clone(&bridge)]);

    let route = builder.build(&request()).await.unwrap().expect("cross-chain route");

    let source = route.source_route.as_ref().expect("source leg");
    assert_eq!(source.path.len(), 3);
    assert_eq!(source.output_token(), Some(&TokenAddress::new("0xeth-usdc")));
    assert_eq!(route.bridged_token(), source.output_token().unwrap());

    let seen = bridge.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].from_token, TokenAddress::new("0xeth-usdc"));
    assert_approx_eq!(seen[0].amount_in, source.amount_out(), 1e-9);

    let dest = route.destination_route.as_ref().expect("destination leg");
    assert_eq!(dest.path.first(), Some(&TokenAddress::new("0xarb-usdc")));
    assert_eq!(dest.output_token(), Some(&TokenAddress::new("0xgmx")));
    assert!(route.expected_amount_out < route.amount_in);
    assert!(route.min_amount_out < route.expected_amount_out);
    assert_eq!(route.estimated_duration, Duration::from_secs(600));
}

#[tokio::test]
async fn best_bridge_wins_and_expired_quotes_are_ignored() {
    let cheap = Arc::new(ScriptedBridge::new("cheap", 1.0, 1.0));
    let pricey = Arc::new(ScriptedBridge::new("pricey", 1.0, 10.0));
    let mut stale = ScriptedBridge::new("stale", 1.5, 0.0);
    stale.ttl = Duration::ZERO;
    let (builder, registry) = setup(vec![cheap, pricey, Arc::new(stale)]);

    let comparator = BridgeComparator::new(registry, ComparatorConfig::default());
    let quotes = comparator
        .compare(&BridgeQuoteRequest {
            from_chain: ETHEREUM,
            to_chain: ARBITRUM,
            from_token: TokenAddress::new("0xeth-usdc"),
            to_token: None,
            amount_in: 500.0,
            slippage_bps: 50,
        })
        .await;
    let names: Vec<&str> = quotes.iter().map(|q| q.bridge.as_str()).collect();
    assert_eq!(names, vec!["cheap", "pricey"]);

    let route = builder.build(&request()).await.unwrap().expect("route");
    assert_eq!(route.bridge_quote.bridge, "cheap");
}

#[tokio::test]
async fn tracker_reports_completion_and_timeout() {
    let done = Arc::new(ScriptedBridge::new("across", 1.0, 0.0));
    let mut stuck = ScriptedBridge::new("stuck", 1.0, 0.0);
    stuck.states = vec![BridgeState::Processing];
    let (_, registry) = setup(vec![Arc::clone(&done), Arc::new(stuck)]);

    let tracker = BridgeStatusTracker::new(
        Arc::clone(&registry),
        TrackerConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        },
    );
    let (updates, handle) = tracker.spawn("across", "0xsource", ETHEREUM).unwrap();
    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, TrackingOutcome::Completed { .. }));
    assert_eq!(done.polls.load(Ordering::SeqCst), 3);
    assert_eq!(updates.borrow().as_ref().map(|s| s.state), Some(BridgeState::Completed));

    let impatient = BridgeStatusTracker::new(
        registry,
        TrackerConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        },
    );
    let outcome = impatient.track("stuck", "0xsource", ETHEREUM).await.unwrap();
    match outcome {
        TrackingOutcome::TimedOut { last } => {
            assert_eq!(last.map(|s| s.state), Some(BridgeState::Processing));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn executed_quote_is_tracked_by_its_source_tx() {
    let bridge = Arc::new(ScriptedBridge::new("stargate", 1.0, 1.0));
    let (builder, registry) = setup(vec![Arc::clone(&bridge)]);
    let route = builder.build(&request()).await.unwrap().expect("route");

    let user = "0x00000000000000000000000000000000000000aa";
    let adapter = registry.get(&route.bridge_quote.bridge).expect("registered");
    let execution = adapter.execute_bridge(&route.bridge_quote, user).await.unwrap();
    assert_eq!(execution.sender, user);
    assert_eq!(execution.quote_id, route.bridge_quote.id);

    let tracker = BridgeStatusTracker::new(
        registry,
        TrackerConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        },
    );
    let outcome = tracker
        .track(&execution.bridge, &execution.source_tx_hash, ETHEREUM)
        .await
        .unwrap();
    assert!(matches!(outcome, TrackingOutcome::Completed { .. }));
}
