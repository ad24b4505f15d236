// src/routing/enhancer.rs
//! Top-level entry point. Wraps an existing router's response and replaces its
//! route only when universal routing finds a clearly better, valid alternative.
//! Never turns a working request into a failed one.

use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::aggregator::{AggregateOptions, AggregatedQuote, ExternalQuoteSource, QuoteAggregator, RouteCandidate};
use super::validator::RouteValidator;
use crate::error::{Result, RouterError};
use crate::types::{ExternalRoute, PricingContext, QuoteRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancerConfig {
    /// Relative output gain required before replacing the existing route.
    pub min_improvement: f64,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            min_improvement: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceOptions {
    pub enable_internal: bool,
    pub prefer_internal: bool,
    pub gas_price_gwei: f64,
    pub native_price_usd: f64,
    pub input_price_usd: f64,
    pub output_price_usd: f64,
    pub max_hops: Option<usize>,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            enable_internal: true,
            prefer_internal: false,
            gas_price_gwei: 0.0,
            native_price_usd: 0.0,
            input_price_usd: 0.0,
            output_price_usd: 0.0,
            max_hops: None,
        }
    }
}

impl EnhanceOptions {
    fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            enable_internal: self.enable_internal,
            pricing: PricingContext {
                input_price_usd: self.input_price_usd,
                output_price_usd: self.output_price_usd,
                gas_price_gwei: self.gas_price_gwei,
                native_price_usd: self.native_price_usd,
            },
            max_hops: self.max_hops,
        }
    }
}

/// What the existing router returned for the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingRouteResponse {
    pub provider: String,
    pub route: Option<ExternalRoute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedSource {
    Existing,
    Universal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedRouteResponse {
    pub route: Option<RouteCandidate>,
    pub provider: String,
    pub amount_out: f64,
    pub quotes: Vec<AggregatedQuote>,
    pub sources: Vec<String>,
    pub universal_routing_enabled: bool,
    pub selected_source: SelectedSource,
    pub warnings: Vec<String>,
}

impl EnhancedRouteResponse {
    /// The existing response, unchanged.
    pub fn pass_through(existing: &ExistingRouteResponse) -> Self {
        let route = existing.route.clone().map(RouteCandidate::External);
        Self {
            amount_out: route.as_ref().map(|r| r.amount_out()).unwrap_or(0.0),
            sources: if route.is_some() {
                vec![existing.provider.clone()]
            } else {
                Vec::new()
            },
            route,
            provider: existing.provider.clone(),
            quotes: Vec::new(),
            universal_routing_enabled: false,
            selected_source: SelectedSource::Existing,
            warnings: Vec::new(),
        }
    }
}

pub struct RouteServiceEnhancer {
    aggregator: Arc<QuoteAggregator>,
    validator: RouteValidator,
    sources: Vec<Arc<dyn ExternalQuoteSource>>,
    config: EnhancerConfig,
}

impl std::fmt::Debug for RouteServiceEnhancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteServiceEnhancer")
            .field("sources", &self.sources.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl RouteServiceEnhancer {
    pub fn new(
        aggregator: Arc<QuoteAggregator>,
        validator: RouteValidator,
        sources: Vec<Arc<dyn ExternalQuoteSource>>,
        config: EnhancerConfig,
    ) -> Self {
        Self {
            aggregator,
            validator,
            sources,
            config,
        }
    }

    /// Improves on `existing` when possible. Errors and panics inside the
    /// enhancement fall back to the existing response.
    pub async fn enhance_route(
        &self,
        request: &QuoteRequest,
        existing: ExistingRouteResponse,
        options: &EnhanceOptions,
    ) -> EnhancedRouteResponse {
        if !options.enable_internal {
            debug!("Universal routing disabled, passing {} through", existing.provider);
            return EnhancedRouteResponse::pass_through(&existing);
        }

        let attempt = AssertUnwindSafe(self.try_enhance(request, &existing, options))
            .catch_unwind()
            .await;

        match attempt {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Route enhancement failed, keeping {}: {}", existing.provider, e);
                EnhancedRouteResponse::pass_through(&existing)
            }
            Err(_) => {
                error!("Route enhancement panicked, keeping {}", existing.provider);
                EnhancedRouteResponse::pass_through(&existing)
            }
        }
    }

    async fn try_enhance(
        &self,
        request: &QuoteRequest,
        existing: &ExistingRouteResponse,
        options: &EnhanceOptions,
    ) -> Result<EnhancedRouteResponse> {
        if !(request.amount_in > 0.0 && request.amount_in.is_finite()) {
            return Err(RouterError::InvalidInput(format!(
                "Amount {} is not positive",
                request.amount_in
            )));
        }
        if request.from_token == request.to_token {
            return Err(RouterError::InvalidInput("Source and destination token are equal".to_string()));
        }

        let universal_routing_enabled = self.aggregator.has_graph(request.chain_id);
        let existing_routes: Vec<ExternalRoute> = existing.route.iter().cloned().collect();
        let quotes = self
            .aggregator
            .aggregate_with_sources(request, &self.sources, existing_routes, &options.aggregate_options())
            .await;

        let mut sources: Vec<String> = Vec::new();
        for provider in std::iter::once(existing.provider.as_str())
            .filter(|_| existing.route.is_some())
            .chain(quotes.iter().map(|q| q.provider.as_str()))
        {
            if !sources.iter().any(|s| s == provider) {
                sources.push(provider.to_string());
            }
        }

        let mut winner = None;
        for quote in &quotes {
            let validation = self.validator.validate_candidate(&quote.candidate);
            if validation.is_valid {
                winner = Some((quote, validation.warnings));
                break;
            }
            debug!("Skipping {} quote: {}", quote.provider, validation.errors.join("; "));
        }

        let existing_candidate = existing.route.clone().map(RouteCandidate::External);
        let existing_out = existing.route.as_ref().map(|r| r.amount_out()).unwrap_or(0.0);
        let margin = if options.prefer_internal {
            0.0
        } else {
            self.config.min_improvement
        };

        let mut response = EnhancedRouteResponse {
            route: existing_candidate.clone(),
            provider: existing.provider.clone(),
            amount_out: existing_out,
            quotes: quotes.clone(),
            sources,
            universal_routing_enabled,
            selected_source: SelectedSource::Existing,
            warnings: Vec::new(),
        };

        let (quote, warnings) = match winner {
            Some(found) => found,
            None => {
                info!("No valid alternative for {} -> {}", request.from_token, request.to_token);
                return Ok(response);
            }
        };

        let is_existing = existing_candidate.as_ref() == Some(&quote.candidate);
        let beats_existing = existing.route.is_none() || quote.amount_out > existing_out * (1.0 + margin);

        if !is_existing && beats_existing {
            info!(
                "Replacing {} route ({}) with {} ({})",
                existing.provider, existing_out, quote.provider, quote.amount_out
            );
            response.route = Some(quote.candidate.clone());
            response.provider = quote.provider.clone();
            response.amount_out = quote.amount_out;
            response.selected_source = SelectedSource::Universal;
            response.warnings = warnings;
        } else {
            debug!(
                "Keeping {} route: best alternative {} from {} within {:.2}% margin",
                existing.provider,
                quote.amount_out,
                quote.provider,
                margin * 100.0
            );
            if is_existing {
                response.warnings = warnings;
            }
        }

        Ok(response)
    }
}
