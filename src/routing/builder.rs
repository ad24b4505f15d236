// src/routing/builder.rs
//! Turns a scored candidate path into an immutable, steppable `UniversalRoute`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::pathfinder::CandidatePath;
use super::scorer::{simulate_hop, PathScore, RouteScorer};
use crate::error::{Result, RouterError};
use crate::types::{
    expiry_from_now, ChainId, FeeBreakdown, RouteStep, RouteToken, UniversalRoute,
};

pub const UNIVERSAL_SOURCE: &str = "universal";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub route_ttl: Duration,
    pub source_tag: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            route_ttl: Duration::from_secs(60),
            source_tag: UNIVERSAL_SOURCE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteBuilder {
    config: BuilderConfig,
    scorer: RouteScorer,
}

impl RouteBuilder {
    pub fn new(config: BuilderConfig, scorer: RouteScorer) -> Self {
        Self { config, scorer }
    }

    pub fn route_ttl(&self) -> Duration {
        self.config.route_ttl
    }

    /// Re-walks the path hop by hop and packages the result with the score's
    /// fee, gas and impact figures.
    pub fn build(
        &self,
        chain_id: ChainId,
        path: &CandidatePath,
        amount_in: f64,
        score: &PathScore,
    ) -> Result<UniversalRoute> {
        if path.edges.is_empty() || path.tokens.len() != path.edges.len() + 1 {
            return Err(RouterError::InvalidInput(format!(
                "Path has {} tokens for {} edges",
                path.tokens.len(),
                path.edges.len()
            )));
        }

        let mut steps = Vec::with_capacity(path.edges.len());
        let mut amount = amount_in;
        for (i, edge) in path.edges.iter().enumerate() {
            let from = &path.tokens[i];
            let to = &path.tokens[i + 1];
            let (reserve_in, reserve_out) = edge.reserves_for(from).ok_or_else(|| {
                RouterError::InvalidInput(format!(
                    "Edge {} does not contain {}",
                    edge.pair_address, from
                ))
            })?;
            let hop = simulate_hop(amount, reserve_in, reserve_out, edge.fee_bps).ok_or_else(|| {
                RouterError::InvalidInput(format!("Cannot simulate hop through {}", edge.pair_address))
            })?;

            steps.push(RouteStep {
                from_token: from.clone(),
                to_token: to.clone(),
                venue: edge.venue.clone(),
                pair_address: edge.pair_address.clone(),
                amount_in: hop.amount_in,
                amount_out: hop.amount_out,
                fee_bps: edge.fee_bps,
                price_impact: hop.price_impact,
                gas_estimate: self.scorer.gas_units_per_hop(),
            });
            amount = hop.amount_out;
        }

        let (first, last) = match (path.tokens.first(), path.tokens.last()) {
            (Some(first), Some(last)) => (first.clone(), last.clone()),
            _ => return Err(RouterError::InvalidInput("Empty path".to_string())),
        };
        let created_at = Utc::now();

        Ok(UniversalRoute {
            id: Uuid::new_v4(),
            chain_id,
            path: path.tokens.clone(),
            steps,
            from: RouteToken {
                address: first,
                chain_id,
                amount: amount_in,
                amount_usd: score.input_usd,
            },
            to: RouteToken {
                address: last,
                chain_id,
                amount,
                amount_usd: score.output_usd,
            },
            price_impact: score.price_impact,
            gas_estimate: score.gas_units,
            fees: FeeBreakdown::new(score.protocol_fees_usd, score.gas_usd, 0.0),
            score: score.score,
            source: self.config.source_tag.clone(),
            created_at,
            expires_at: expiry_from_now(self.config.route_ttl),
        })
    }
}
