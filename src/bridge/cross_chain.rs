// src/bridge/cross_chain.rs
//! Cross-chain route assembly: optional source-chain swap into a bridge asset,
//! the best bridge transfer, and an optional destination-chain swap into the
//! requested token.

use futures::future::join_all;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{BridgeComparator, BridgeQuote, BridgeQuoteRequest};
use crate::error::{Result, RouterError};
use crate::routing::{AggregateOptions, QuoteAggregator};
use crate::types::{ChainId, FeeBreakdown, PricingContext, QuoteRequest, TokenAddress, UniversalRoute};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossChainConfig {
    /// Tokens bridges are expected to carry, per chain.
    pub bridge_assets: HashMap<ChainId, Vec<TokenAddress>>,
    pub slippage_bps: u32,
    pub max_hops: Option<usize>,
}

impl CrossChainConfig {
    pub fn is_bridge_asset(&self, chain_id: ChainId, token: &TokenAddress) -> bool {
        self.bridge_assets
            .get(&chain_id)
            .map(|assets| assets.contains(token))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossChainRequest {
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub from_token: TokenAddress,
    pub to_token: TokenAddress,
    pub amount_in: f64,
    pub source_pricing: PricingContext,
    pub destination_pricing: PricingContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossChainRoute {
    pub id: Uuid,
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub source_route: Option<UniversalRoute>,
    pub bridge_quote: BridgeQuote,
    pub destination_route: Option<UniversalRoute>,
    pub amount_in: f64,
    pub expected_amount_out: f64,
    pub min_amount_out: f64,
    pub fees: FeeBreakdown,
    pub estimated_duration: Duration,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl CrossChainRoute {
    /// Token actually handed to the bridge.
    pub fn bridged_token(&self) -> &TokenAddress {
        &self.bridge_quote.from_token
    }
}

pub struct CrossChainRouteBuilder {
    aggregator: Arc<QuoteAggregator>,
    comparator: BridgeComparator,
    config: CrossChainConfig,
}

impl std::fmt::Debug for CrossChainRouteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossChainRouteBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl CrossChainRouteBuilder {
    pub fn new(aggregator: Arc<QuoteAggregator>, comparator: BridgeComparator, config: CrossChainConfig) -> Self {
        Self {
            aggregator,
            comparator,
            config,
        }
    }

    /// Tries every bridge asset configured on the source chain and keeps the
    /// plan that delivers the most of the requested token.
    pub async fn build(&self, request: &CrossChainRequest) -> Result<Option<CrossChainRoute>> {
        Self::check_request(request)?;

        if self.config.is_bridge_asset(request.from_chain, &request.from_token) {
            return self.build_from_source_route(request, None).await;
        }

        let assets = self
            .config
            .bridge_assets
            .get(&request.from_chain)
            .cloned()
            .unwrap_or_default();
        if assets.is_empty() {
            debug!("No bridge assets configured for chain {}", request.from_chain);
            return Ok(None);
        }

        let source_routes = join_all(assets.iter().map(|asset| self.best_source_route(request, asset))).await;
        let plans = join_all(
            source_routes
                .into_iter()
                .flatten()
                .map(|route| self.build_from_source_route(request, Some(route))),
        )
        .await;

        let mut best: Option<CrossChainRoute> = None;
        for plan in plans {
            match plan {
                Ok(Some(route)) => {
                    if best
                        .as_ref()
                        .map(|b| route.expected_amount_out > b.expected_amount_out)
                        .unwrap_or(true)
                    {
                        best = Some(route);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Dropping cross-chain plan: {}", e),
            }
        }

        if let Some(route) = &best {
            info!(
                "Cross-chain route {} -> {} via {}: {:.6} out",
                request.from_chain, request.to_chain, route.bridge_quote.bridge, route.expected_amount_out
            );
        }
        Ok(best)
    }

    /// Bridges whatever the source route actually ends in (or the input token
    /// when there is no source route), then routes the delivered token to the
    /// requested one on the destination chain.
    pub async fn build_from_source_route(
        &self,
        request: &CrossChainRequest,
        source_route: Option<UniversalRoute>,
    ) -> Result<Option<CrossChainRoute>> {
        Self::check_request(request)?;

        let (bridge_token, bridge_amount) = match &source_route {
            Some(route) => {
                if route.chain_id != request.from_chain {
                    return Err(RouterError::InvalidInput(format!(
                        "Source route is on chain {}, expected {}",
                        route.chain_id, request.from_chain
                    )));
                }
                let token = route
                    .output_token()
                    .cloned()
                    .ok_or_else(|| RouterError::InvalidInput("Source route has an empty path".to_string()))?;
                (token, route.amount_out())
            }
            None => (request.from_token.clone(), request.amount_in),
        };

        let preferred = self
            .config
            .is_bridge_asset(request.to_chain, &request.to_token)
            .then(|| request.to_token.clone());
        let bridge_request = BridgeQuoteRequest {
            from_chain: request.from_chain,
            to_chain: request.to_chain,
            from_token: bridge_token,
            to_token: preferred,
            amount_in: bridge_amount,
            slippage_bps: self.config.slippage_bps,
        };

        let bridge_quote = match self.comparator.best(&bridge_request).await {
            Some(quote) => quote,
            None => {
                debug!(
                    "No bridge quote for {} on {} -> {}",
                    bridge_request.from_token, request.from_chain, request.to_chain
                );
                return Ok(None);
            }
        };

        let delivered = bridge_quote.net_output();
        let destination_route = if bridge_quote.to_token == request.to_token {
            None
        } else {
            let dest_request = QuoteRequest {
                chain_id: request.to_chain,
                from_token: bridge_quote.to_token.clone(),
                to_token: request.to_token.clone(),
                amount_in: delivered,
            };
            let options = AggregateOptions {
                enable_internal: true,
                pricing: request.destination_pricing.clone(),
                max_hops: self.config.max_hops,
            };
            match self.aggregator.find_internal_routes(&dest_request, &options).await.into_iter().next() {
                Some(route) => Some(route),
                None => {
                    debug!(
                        "No destination route {} -> {} on chain {}",
                        dest_request.from_token, dest_request.to_token, request.to_chain
                    );
                    return Ok(None);
                }
            }
        };

        Ok(Some(self.assemble(request, source_route, bridge_quote, destination_route)))
    }

    async fn best_source_route(&self, request: &CrossChainRequest, asset: &TokenAddress) -> Option<UniversalRoute> {
        let source_request = QuoteRequest {
            chain_id: request.from_chain,
            from_token: request.from_token.clone(),
            to_token: asset.clone(),
            amount_in: request.amount_in,
        };
        let options = AggregateOptions {
            enable_internal: true,
            pricing: request.source_pricing.clone(),
            max_hops: self.config.max_hops,
        };
        self.aggregator
            .find_internal_routes(&source_request, &options)
            .await
            .into_iter()
            .next()
    }

    fn assemble(
        &self,
        request: &CrossChainRequest,
        source_route: Option<UniversalRoute>,
        bridge_quote: BridgeQuote,
        destination_route: Option<UniversalRoute>,
    ) -> CrossChainRoute {
        let delivered = bridge_quote.net_output();
        let expected_amount_out = destination_route
            .as_ref()
            .map(|r| r.amount_out())
            .unwrap_or(delivered);

        // Bridge slippage carries through the destination swap proportionally.
        let floor_ratio = if delivered > 0.0 {
            (bridge_quote.min_amount_out / delivered).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let bridge_fees = FeeBreakdown::new(0.0, bridge_quote.fees.gas_usd, bridge_quote.fees.fee_usd);
        let fees = [source_route.as_ref(), destination_route.as_ref()]
            .into_iter()
            .flatten()
            .fold(bridge_fees, |acc, route| acc.combine(&route.fees));

        let expires_at = [
            source_route.as_ref().map(|r| r.expires_at),
            Some(bridge_quote.expires_at),
            destination_route.as_ref().map(|r| r.expires_at),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(bridge_quote.expires_at);

        CrossChainRoute {
            id: Uuid::new_v4(),
            from_chain: request.from_chain,
            to_chain: request.to_chain,
            amount_in: request.amount_in,
            expected_amount_out,
            min_amount_out: expected_amount_out * floor_ratio,
            fees,
            estimated_duration: bridge_quote.estimated_duration,
            expires_at,
            source_route,
            bridge_quote,
            destination_route,
        }
    }

    fn check_request(request: &CrossChainRequest) -> Result<()> {
        if request.from_chain == request.to_chain {
            return Err(RouterError::InvalidInput(format!(
                "Source and destination chain are both {}",
                request.from_chain
            )));
        }
        if !(request.amount_in > 0.0 && request.amount_in.is_finite()) {
            return Err(RouterError::InvalidInput(format!(
                "Amount must be positive, got {}",
                request.amount_in
            )));
        }
        Ok(())
    }
}
