// src/types.rs
//! Core routing data model shared by the graph, scorer, aggregator and bridge layers.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub type ChainId = u64;

/// Case-insensitive token (or contract) address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAddress(String);

impl TokenAddress {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TokenAddress {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCategory {
    Native,
    Stable,
    Bluechip,
    Other,
}

/// An asset on one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenNode {
    pub address: TokenAddress,
    pub chain_id: ChainId,
    pub symbol: String,
    pub decimals: u8,
    pub liquidity_usd: f64,
    pub category: TokenCategory,
    pub updated_at: DateTime<Utc>,
}

impl TokenNode {
    /// Node known only by address, created when an edge references an unseen token.
    pub fn placeholder(address: TokenAddress, chain_id: ChainId, decimals: u8) -> Self {
        Self {
            address,
            chain_id,
            symbol: String::new(),
            decimals,
            liquidity_usd: 0.0,
            category: TokenCategory::Other,
            updated_at: Utc::now(),
        }
    }
}

/// Undirected trading pair between two tokens on one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairEdge {
    pub token0: TokenAddress,
    pub token1: TokenAddress,
    pub decimals0: u8,
    pub decimals1: u8,
    pub chain_id: ChainId,
    pub venue: String,
    pub factory: String,
    pub pair_address: String,
    pub liquidity_usd: f64,
    pub reserve0: u128,
    pub reserve1: u128,
    pub fee_bps: u32,
    pub updated_at: DateTime<Utc>,
}

/// Identity of an edge: unordered token pair plus venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub token_a: TokenAddress,
    pub token_b: TokenAddress,
    pub venue: String,
}

impl EdgeKey {
    pub fn new(a: &TokenAddress, b: &TokenAddress, venue: &str) -> Self {
        let (token_a, token_b) = if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        Self {
            token_a,
            token_b,
            venue: venue.to_lowercase(),
        }
    }
}

impl PairEdge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(&self.token0, &self.token1, &self.venue)
    }

    pub fn contains(&self, token: &TokenAddress) -> bool {
        &self.token0 == token || &self.token1 == token
    }

    pub fn connects(&self, a: &TokenAddress, b: &TokenAddress) -> bool {
        (&self.token0 == a && &self.token1 == b) || (&self.token0 == b && &self.token1 == a)
    }

    /// The token on the other side of `token`, if `token` belongs to this pair.
    pub fn other_token(&self, token: &TokenAddress) -> Option<&TokenAddress> {
        if &self.token0 == token {
            Some(&self.token1)
        } else if &self.token1 == token {
            Some(&self.token0)
        } else {
            None
        }
    }

    /// Decimal-adjusted `(reserve_in, reserve_out)` when swapping out of `from`.
    pub fn reserves_for(&self, from: &TokenAddress) -> Option<(f64, f64)> {
        let r0 = to_units(self.reserve0, self.decimals0);
        let r1 = to_units(self.reserve1, self.decimals1);
        if &self.token0 == from {
            Some((r0, r1))
        } else if &self.token1 == from {
            Some((r1, r0))
        } else {
            None
        }
    }

    pub fn has_reserves(&self) -> bool {
        self.reserve0 > 0 && self.reserve1 > 0
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.updated_at);
        age.to_std().map(|age| age > max_age).unwrap_or(false)
    }
}

/// Converts raw base units into token units.
pub fn to_units(raw: u128, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Converts token units into raw base units, truncating.
pub fn to_raw(amount: f64, decimals: u8) -> u128 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    (amount * 10f64.powi(decimals as i32)) as u128
}

/// One atomic hop of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub from_token: TokenAddress,
    pub to_token: TokenAddress,
    pub venue: String,
    pub pair_address: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub fee_bps: u32,
    pub price_impact: f64,
    pub gas_estimate: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub protocol_usd: f64,
    pub gas_usd: f64,
    pub bridge_usd: f64,
    pub total_usd: f64,
}

impl FeeBreakdown {
    pub fn new(protocol_usd: f64, gas_usd: f64, bridge_usd: f64) -> Self {
        Self {
            protocol_usd,
            gas_usd,
            bridge_usd,
            total_usd: protocol_usd + gas_usd + bridge_usd,
        }
    }

    pub fn combine(&self, other: &FeeBreakdown) -> FeeBreakdown {
        FeeBreakdown::new(
            self.protocol_usd + other.protocol_usd,
            self.gas_usd + other.gas_usd,
            self.bridge_usd + other.bridge_usd,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteToken {
    pub address: TokenAddress,
    pub chain_id: ChainId,
    pub amount: f64,
    pub amount_usd: f64,
}

/// A fully built, steppable same-chain route. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalRoute {
    pub id: Uuid,
    pub chain_id: ChainId,
    pub path: Vec<TokenAddress>,
    pub steps: Vec<RouteStep>,
    pub from: RouteToken,
    pub to: RouteToken,
    pub price_impact: f64,
    pub gas_estimate: u64,
    pub fees: FeeBreakdown,
    pub score: f64,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UniversalRoute {
    pub fn amount_out(&self) -> f64 {
        self.to.amount
    }

    pub fn hop_count(&self) -> usize {
        self.steps.len()
    }

    pub fn output_token(&self) -> Option<&TokenAddress> {
        self.path.last()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn venues(&self) -> Vec<String> {
        let mut venues: Vec<String> = Vec::new();
        for step in &self.steps {
            if !venues.contains(&step.venue) {
                venues.push(step.venue.clone());
            }
        }
        venues
    }
}

/// Route produced by an external venue router, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRoute {
    pub router: String,
    pub chain_id: ChainId,
    pub path: Vec<TokenAddress>,
    /// `amounts[0]` is the input amount, the last entry the expected output.
    pub amounts: Vec<f64>,
    pub protocol_fee_usd: f64,
    pub gas_estimate: u64,
    pub gas_cost_usd: Option<f64>,
    pub price_impact: f64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ExternalRoute {
    pub fn amount_in(&self) -> f64 {
        self.amounts.first().copied().unwrap_or(0.0)
    }

    pub fn amount_out(&self) -> f64 {
        self.amounts.last().copied().unwrap_or(0.0)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }
}

/// Swap request on a single chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub chain_id: ChainId,
    pub from_token: TokenAddress,
    pub to_token: TokenAddress,
    pub amount_in: f64,
}

impl QuoteRequest {
    pub fn new(
        chain_id: ChainId,
        from_token: impl Into<TokenAddress>,
        to_token: impl Into<TokenAddress>,
        amount_in: f64,
    ) -> Self {
        Self {
            chain_id,
            from_token: from_token.into(),
            to_token: to_token.into(),
            amount_in,
        }
    }
}

/// Pricing inputs used to turn token amounts into USD for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingContext {
    pub input_price_usd: f64,
    pub output_price_usd: f64,
    pub gas_price_gwei: f64,
    pub native_price_usd: f64,
}

impl Default for PricingContext {
    fn default() -> Self {
        Self {
            input_price_usd: 0.0,
            output_price_usd: 0.0,
            gas_price_gwei: 0.0,
            native_price_usd: 0.0,
        }
    }
}

pub fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge() -> PairEdge {
        PairEdge {
            token0: TokenAddress::new("0xAAA"),
            token1: TokenAddress::new("0xbbb"),
            decimals0: 18,
            decimals1: 6,
            chain_id: 1,
            venue: "uniswap-v2".into(),
            factory: "0xf".into(),
            pair_address: "0xp".into(),
            liquidity_usd: 10_000.0,
            reserve0: 2_000_000_000_000_000_000,
            reserve1: 4_000_000_000,
            fee_bps: 30,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_address_is_case_insensitive() {
        assert_eq!(TokenAddress::new(" 0xAbC "), TokenAddress::new("0xabc"));
    }

    #[test]
    fn test_edge_key_is_unordered() {
        let a = TokenAddress::new("0xa");
        let b = TokenAddress::new("0xb");
        assert_eq!(EdgeKey::new(&a, &b, "Uni"), EdgeKey::new(&b, &a, "uni"));
    }

    #[test]
    fn test_reserves_for_direction() {
        let e = edge();
        let (r_in, r_out) = e.reserves_for(&TokenAddress::new("0xaaa")).unwrap();
        assert_eq!((r_in, r_out), (2.0, 4000.0));
        let (r_in, r_out) = e.reserves_for(&TokenAddress::new("0xBBB")).unwrap();
        assert_eq!((r_in, r_out), (4000.0, 2.0));
        assert!(e.reserves_for(&TokenAddress::new("0xccc")).is_none());
    }

    #[test]
    fn test_fee_breakdown_total() {
        let fees = FeeBreakdown::new(1.0, 2.0, 3.0).combine(&FeeBreakdown::new(1.0, 0.0, 0.0));
        assert_eq!(fees.total_usd, 7.0);
    }

    #[test]
    fn test_edge_membership_and_staleness() {
        let mut e = edge();
        let a = TokenAddress::new("0xaaa");
        let b = TokenAddress::new("0xbbb");
        assert!(e.connects(&b, &a));
        assert_eq!(e.other_token(&a), Some(&b));
        assert!(!e.is_stale(Duration::from_secs(60)));

        e.updated_at = Utc::now() - ChronoDuration::seconds(120);
        assert!(e.is_stale(Duration::from_secs(60)));
    }
}
