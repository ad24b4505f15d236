// src/bridge/adapter.rs
use async_trait::async_trait;

use super::{BridgeExecutionResult, BridgeQuote, BridgeQuoteRequest, BridgeStatus};
use crate::error::Result;
use crate::types::ChainId;

/// A bridge protocol integration.
#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supported_chains(&self) -> Vec<ChainId>;

    fn supports_chain_pair(&self, from_chain: ChainId, to_chain: ChainId) -> bool {
        let chains = self.supported_chains();
        from_chain != to_chain && chains.contains(&from_chain) && chains.contains(&to_chain)
    }

    /// Higher wins ties between otherwise equal quotes.
    fn priority(&self) -> u32 {
        0
    }

    /// `None` when the bridge cannot move this asset between these chains.
    async fn get_quote(&self, request: &BridgeQuoteRequest) -> Result<Option<BridgeQuote>>;

    /// Submits the source-chain leg on behalf of `user_address`.
    async fn execute_bridge(&self, quote: &BridgeQuote, user_address: &str) -> Result<BridgeExecutionResult>;

    /// `None` while the bridge does not know the transaction yet.
    async fn get_bridge_status(&self, source_tx_hash: &str, from_chain: ChainId) -> Result<Option<BridgeStatus>>;
}
