// src/routing/scorer.rs
//! Route scoring by realizable net USD value.
//!
//! Internal paths are simulated hop by hop with the constant-product formula;
//! external routes arrive with their amounts already computed. Both end up in
//! the same `score = output - input - gas - protocol fees - impact cost - hop penalty`
//! so they can be ranked on one scale.

use serde::{Deserialize, Serialize};

use super::pathfinder::CandidatePath;
use crate::types::{ExternalRoute, PricingContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub base_gas: u64,
    pub gas_per_hop: u64,
    /// Fraction of input value charged per hop beyond the first.
    pub hop_penalty_pct: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            base_gas: 50_000,
            gas_per_hop: 100_000,
            hop_penalty_pct: 0.001,
        }
    }
}

/// One constant-product swap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HopSimulation {
    pub amount_in: f64,
    pub amount_in_after_fee: f64,
    pub amount_out: f64,
    pub price_impact: f64,
}

/// Applies `out = in_after_fee * r_out / (r_in + in_after_fee)` once.
pub fn simulate_hop(amount_in: f64, reserve_in: f64, reserve_out: f64, fee_bps: u32) -> Option<HopSimulation> {
    if !(amount_in > 0.0) || !(reserve_in > 0.0) || !(reserve_out > 0.0) || fee_bps >= 10_000 {
        return None;
    }
    let amount_in_after_fee = amount_in * (1.0 - fee_bps as f64 / 10_000.0);
    let amount_out = amount_in_after_fee * reserve_out / (reserve_in + amount_in_after_fee);
    let price_impact = amount_in_after_fee / (reserve_in + amount_in_after_fee);
    if !amount_out.is_finite() {
        return None;
    }
    Some(HopSimulation {
        amount_in,
        amount_in_after_fee,
        amount_out,
        price_impact,
    })
}

/// Aggregate impact `1 - Π(1 - impact_i)`, capped at 1.
pub fn compound_price_impact(impacts: impl IntoIterator<Item = f64>) -> f64 {
    let retained: f64 = impacts
        .into_iter()
        .map(|impact| 1.0 - impact.clamp(0.0, 1.0))
        .product();
    (1.0 - retained).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathScore {
    pub amount_in: f64,
    pub amount_out: f64,
    pub input_usd: f64,
    pub output_usd: f64,
    pub price_impact: f64,
    pub gas_units: u64,
    pub gas_usd: f64,
    pub protocol_fees_usd: f64,
    pub impact_cost_usd: f64,
    pub hop_penalty_usd: f64,
    pub score: f64,
    pub hops: Vec<HopSimulation>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteScorer {
    config: ScorerConfig,
}

impl RouteScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn gas_units(&self, hops: usize) -> u64 {
        self.config.base_gas + self.config.gas_per_hop * hops as u64
    }

    pub fn gas_units_per_hop(&self) -> u64 {
        self.config.gas_per_hop
    }

    pub fn gas_cost_usd(&self, gas_units: u64, pricing: &PricingContext) -> f64 {
        gas_units as f64 * pricing.gas_price_gwei * 1e-9 * pricing.native_price_usd
    }

    pub fn hop_penalty_usd(&self, hops: usize, input_usd: f64) -> f64 {
        self.config.hop_penalty_pct * input_usd * hops.saturating_sub(1) as f64
    }

    /// Simulates `amount_in` along the path. `None` when any hop cannot be simulated.
    pub fn simulate(&self, path: &CandidatePath, amount_in: f64) -> Option<Vec<HopSimulation>> {
        if path.edges.is_empty() || path.tokens.len() != path.edges.len() + 1 {
            return None;
        }
        let mut amount = amount_in;
        let mut hops = Vec::with_capacity(path.edges.len());
        for (edge, from) in path.edges.iter().zip(path.tokens.iter()) {
            let (reserve_in, reserve_out) = edge.reserves_for(from)?;
            let hop = simulate_hop(amount, reserve_in, reserve_out, edge.fee_bps)?;
            amount = hop.amount_out;
            hops.push(hop);
        }
        Some(hops)
    }

    pub fn score_path(
        &self,
        path: &CandidatePath,
        amount_in: f64,
        pricing: &PricingContext,
    ) -> Option<PathScore> {
        let hops = self.simulate(path, amount_in)?;
        let amount_out = hops.last().map(|h| h.amount_out)?;
        let input_usd = amount_in * pricing.input_price_usd;

        let mut running_usd = input_usd;
        let mut protocol_fees_usd = 0.0;
        for edge in &path.edges {
            let fee = edge.fee_bps as f64 / 10_000.0;
            let fee_usd = fee * running_usd;
            protocol_fees_usd += fee_usd;
            running_usd -= fee_usd;
        }

        let price_impact = compound_price_impact(hops.iter().map(|h| h.price_impact));
        let gas_units = self.gas_units(hops.len());

        Some(self.assemble(
            amount_in,
            amount_out,
            price_impact,
            gas_units,
            None,
            protocol_fees_usd,
            hops,
            pricing,
        ))
    }

    /// Scores an external route with the same formula used for internal paths.
    pub fn score_external(&self, route: &ExternalRoute, pricing: &PricingContext) -> PathScore {
        let hop_count = route.path.len().saturating_sub(1).max(1);
        let gas_units = if route.gas_estimate > 0 {
            route.gas_estimate
        } else {
            self.gas_units(hop_count)
        };
        self.assemble(
            route.amount_in(),
            route.amount_out(),
            route.price_impact.clamp(0.0, 1.0),
            gas_units,
            route.gas_cost_usd,
            route.protocol_fee_usd.max(0.0),
            Vec::new(),
            pricing,
        )
        .with_hop_penalty(self.hop_penalty_usd(hop_count, route.amount_in() * pricing.input_price_usd))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        amount_in: f64,
        amount_out: f64,
        price_impact: f64,
        gas_units: u64,
        gas_usd_override: Option<f64>,
        protocol_fees_usd: f64,
        hops: Vec<HopSimulation>,
        pricing: &PricingContext,
    ) -> PathScore {
        let input_usd = amount_in * pricing.input_price_usd;
        let output_usd = amount_out * pricing.output_price_usd;
        let gas_usd = gas_usd_override.unwrap_or_else(|| self.gas_cost_usd(gas_units, pricing));
        let impact_cost_usd = price_impact * input_usd;
        let hop_penalty_usd = self.hop_penalty_usd(hops.len(), input_usd);

        let mut result = PathScore {
            amount_in,
            amount_out,
            input_usd,
            output_usd,
            price_impact,
            gas_units,
            gas_usd,
            protocol_fees_usd,
            impact_cost_usd,
            hop_penalty_usd,
            score: 0.0,
            hops,
        };
        result.score = net_score(&result);
        result
    }
}

impl PathScore {
    fn with_hop_penalty(mut self, hop_penalty_usd: f64) -> Self {
        self.hop_penalty_usd = hop_penalty_usd;
        self.score = net_score(&self);
        self
    }
}

fn net_score(s: &PathScore) -> f64 {
    s.output_usd - s.input_usd - s.gas_usd - s.protocol_fees_usd - s.impact_cost_usd - s.hop_penalty_usd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::graph::test_support::pair;
    use crate::types::TokenAddress;
    use assert_approx_eq::assert_approx_eq;

    fn path(tokens: &[&str], edges: Vec<crate::types::PairEdge>) -> CandidatePath {
        CandidatePath {
            tokens: tokens.iter().map(|t| TokenAddress::new(t)).collect(),
            edges,
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

    #[test]
    fn test_single_hop_matches_formula() {
        let scorer = RouteScorer::default();
        let p = path(&["0xa", "0xb"], vec![pair(1, "0xa", "0xb", "uni", 1_000.0, 2_000.0, 1e6, 30)]);
        let score = scorer.score_path(&p, 10.0, &unit_pricing()).unwrap();

        let in_after_fee = 10.0 * (1.0 - 0.003);
        let expected = in_after_fee * 2_000.0 / (1_000.0 + in_after_fee);
        assert_approx_eq!(score.amount_out, expected, 1e-9);
        assert_approx_eq!(score.price_impact, in_after_fee / (1_000.0 + in_after_fee), 1e-12);
    }

    #[test]
    fn test_reverse_direction_uses_swapped_reserves() {
        let scorer = RouteScorer::default();
        let p = path(&["0xb", "0xa"], vec![pair(1, "0xa", "0xb", "uni", 1_000.0, 2_000.0, 1e6, 30)]);
        let score = scorer.score_path(&p, 10.0, &unit_pricing()).unwrap();
        let in_after_fee = 10.0 * 0.997;
        assert_approx_eq!(score.amount_out, in_after_fee * 1_000.0 / (2_000.0 + in_after_fee), 1e-9);
    }

    #[test]
    fn test_multi_hop_is_fee_losing() {
        let scorer = RouteScorer::default();
        let p = path(
            &["0xa", "0xb", "0xc"],
            vec![
                pair(1, "0xa", "0xb", "uni", 1e9, 1e9, 1e9, 30),
                pair(1, "0xb", "0xc", "uni", 1e9, 1e9, 1e9, 25),
            ],
        );
        let score = scorer.score_path(&p, 100.0, &unit_pricing()).unwrap();
        assert!(score.amount_out <= 100.0 * (1.0 - 2.0 * 0.0025));
        assert_eq!(score.hops.len(), 2);
    }

    #[test]
    fn test_impact_compounds_multiplicatively() {
        assert_approx_eq!(compound_price_impact([0.1, 0.2]), 1.0 - 0.9 * 0.8, 1e-12);
        assert_approx_eq!(compound_price_impact([1.5, 0.2]), 1.0, 1e-12);
        assert_eq!(compound_price_impact(Vec::new()), 0.0);
    }

    #[test]
    fn test_score_components() {
        let scorer = RouteScorer::new(ScorerConfig {
            base_gas: 50_000,
            gas_per_hop: 100_000,
            hop_penalty_pct: 0.001,
        });
        let pricing = PricingContext {
            input_price_usd: 2.0,
            output_price_usd: 3.0,
            gas_price_gwei: 20.0,
            native_price_usd: 2_000.0,
        };
        let p = path(
            &["0xa", "0xb", "0xc"],
            vec![
                pair(1, "0xa", "0xb", "uni", 1e6, 1e6, 1e9, 30),
                pair(1, "0xb", "0xc", "uni", 1e6, 1e6, 1e9, 30),
            ],
        );
        let s = scorer.score_path(&p, 100.0, &pricing).unwrap();

        assert_eq!(s.gas_units, 250_000);
        assert_approx_eq!(s.gas_usd, 250_000.0 * 20.0 * 1e-9 * 2_000.0, 1e-9);
        assert_approx_eq!(s.protocol_fees_usd, 0.003 * 200.0 + 0.003 * 200.0 * 0.997, 1e-9);
        assert_approx_eq!(s.hop_penalty_usd, 0.001 * 200.0, 1e-12);
        let expected = s.output_usd - 200.0 - s.gas_usd - s.protocol_fees_usd - s.impact_cost_usd - s.hop_penalty_usd;
        assert_approx_eq!(s.score, expected, 1e-9);
    }

    #[test]
    fn test_unsimulatable_path_is_none() {
        let scorer = RouteScorer::default();
        let empty = pair(1, "0xa", "0xb", "uni", 0.0, 100.0, 1e6, 30);
        assert!(scorer.score_path(&path(&["0xa", "0xb"], vec![empty]), 1.0, &unit_pricing()).is_none());
        let wrong_token = pair(1, "0xa", "0xb", "uni", 10.0, 10.0, 1e6, 30);
        assert!(scorer.score_path(&path(&["0xc", "0xb"], vec![wrong_token]), 1.0, &unit_pricing()).is_none());
        assert!(simulate_hop(0.0, 1.0, 1.0, 30).is_none());
    }

    #[test]
    fn test_external_uses_same_formula() {
        let scorer = RouteScorer::default();
        let pricing = PricingContext {
            input_price_usd: 1.0,
            output_price_usd: 1.0,
            gas_price_gwei: 10.0,
            native_price_usd: 1_000.0,
        };
        let route = ExternalRoute {
            router: "ext".into(),
            chain_id: 1,
            path: vec!["0xa".into(), "0xb".into(), "0xc".into()],
            amounts: vec![100.0, 99.0, 98.0],
            protocol_fee_usd: 0.5,
            gas_estimate: 200_000,
            gas_cost_usd: None,
            price_impact: 0.01,
            expires_at: None,
        };
        let s = scorer.score_external(&route, &pricing);
        assert_approx_eq!(s.gas_usd, 200_000.0 * 10.0 * 1e-9 * 1_000.0, 1e-9);
        assert_approx_eq!(s.hop_penalty_usd, 0.1, 1e-12);
        assert_approx_eq!(s.score, 98.0 - 100.0 - 2.0 - 0.5 - 1.0 - 0.1, 1e-9);

        let quoted_gas = ExternalRoute {
            gas_cost_usd: Some(0.25),
            ..route
        };
        assert_approx_eq!(scorer.score_external(&quoted_gas, &pricing).gas_usd, 0.25, 1e-12);
    }
}
