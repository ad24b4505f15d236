// src/bridge/comparator.rs
//! Queries every capable bridge concurrently and ranks the usable quotes.

use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::{BridgeAdapter, BridgeQuote, BridgeQuoteRequest, BridgeRegistry};

/// Relative slack allowed between the quoted and requested input amount.
const AMOUNT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparatorConfig {
    pub quote_timeout: Duration,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            quote_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeComparator {
    registry: Arc<BridgeRegistry>,
    config: ComparatorConfig,
}

impl BridgeComparator {
    pub fn new(registry: Arc<BridgeRegistry>, config: ComparatorConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<BridgeRegistry> {
        &self.registry
    }

    /// Ranked by net delivery (`amount_out - fee`) desc, then adapter priority desc.
    /// Failed, timed-out, empty and expired quotes are dropped, as are quotes
    /// for another chain pair, input token or input amount.
    pub async fn compare(&self, request: &BridgeQuoteRequest) -> Vec<BridgeQuote> {
        let adapters = self.registry.adapters_for(request.from_chain, request.to_chain);
        if adapters.is_empty() {
            debug!(
                "No bridge supports {} -> {}",
                request.from_chain, request.to_chain
            );
            return Vec::new();
        }

        let queries = adapters.iter().map(|adapter| self.query(Arc::clone(adapter), request));
        let mut quotes: Vec<(BridgeQuote, u32)> = join_all(queries).await.into_iter().flatten().collect();

        quotes.sort_by(|(a, pa), (b, pb)| {
            b.net_output()
                .total_cmp(&a.net_output())
                .then_with(|| pb.cmp(pa))
        });

        info!(
            "{} of {} bridges quoted {} -> {}",
            quotes.len(),
            adapters.len(),
            request.from_chain,
            request.to_chain
        );
        quotes.into_iter().map(|(quote, _)| quote).collect()
    }

    pub async fn best(&self, request: &BridgeQuoteRequest) -> Option<BridgeQuote> {
        self.compare(request).await.into_iter().next()
    }

    async fn query(&self, adapter: Arc<dyn BridgeAdapter>, request: &BridgeQuoteRequest) -> Option<(BridgeQuote, u32)> {
        let quote = match timeout(self.config.quote_timeout, adapter.get_quote(request)).await {
            Ok(Ok(Some(quote))) => quote,
            Ok(Ok(None)) => {
                debug!("{} has no quote", adapter.name());
                return None;
            }
            Ok(Err(e)) => {
                warn!("{} quote failed: {}", adapter.name(), e);
                return None;
            }
            Err(_) => {
                warn!("{} quote timed out after {:?}", adapter.name(), self.config.quote_timeout);
                return None;
            }
        };

        if quote.is_expired() {
            debug!("{} returned an expired quote", adapter.name());
            return None;
        }
        if quote.from_chain != request.from_chain || quote.to_chain != request.to_chain {
            warn!("{} quoted the wrong chain pair", adapter.name());
            return None;
        }
        if quote.from_token != request.from_token {
            warn!(
                "{} quoted input {} instead of {}",
                adapter.name(),
                quote.from_token,
                request.from_token
            );
            return None;
        }
        if !amounts_match(quote.amount_in, request.amount_in) {
            warn!(
                "{} quoted amount {} instead of {}",
                adapter.name(),
                quote.amount_in,
                request.amount_in
            );
            return None;
        }
        if !(quote.net_output() > 0.0 && quote.net_output().is_finite()) {
            debug!("{} quote delivers nothing after fees", adapter.name());
            return None;
        }
        Some((quote, adapter.priority()))
    }
}

fn amounts_match(quoted: f64, requested: f64) -> bool {
    (quoted - requested).abs() <= requested.abs() * AMOUNT_TOLERANCE
}
