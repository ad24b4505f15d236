// src/bridge/mod.rs
//! Cross-chain bridging: adapter trait, registry, quote comparison, the
//! cross-chain route builder and transfer status tracking.

pub mod adapter;
pub mod comparator;
pub mod cross_chain;
pub mod registry;
pub mod tracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::types::{ChainId, TokenAddress};

pub use adapter::BridgeAdapter;
pub use comparator::{BridgeComparator, ComparatorConfig};
pub use cross_chain::{CrossChainConfig, CrossChainRequest, CrossChainRoute, CrossChainRouteBuilder};
pub use registry::BridgeRegistry;
pub use tracker::{BridgeStatusTracker, TrackerConfig, TrackingOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeQuoteRequest {
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub from_token: TokenAddress,
    /// Preferred delivered token; the adapter picks its canonical counterpart when `None`.
    pub to_token: Option<TokenAddress>,
    pub amount_in: f64,
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeFees {
    /// Charged in destination-token units.
    pub fee_amount: f64,
    pub fee_usd: f64,
    pub gas_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeQuote {
    pub id: Uuid,
    pub bridge: String,
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub from_token: TokenAddress,
    pub to_token: TokenAddress,
    pub amount_in: f64,
    /// Expected delivery before the bridge fee.
    pub amount_out: f64,
    /// Delivery floor after fee and slippage.
    pub min_amount_out: f64,
    pub fees: BridgeFees,
    pub estimated_duration: Duration,
    pub expires_at: DateTime<Utc>,
}

impl BridgeQuote {
    pub fn net_output(&self) -> f64 {
        self.amount_out - self.fees.fee_amount
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn total_fee_usd(&self) -> f64 {
        self.fees.fee_usd + self.fees.gas_usd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BridgeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BridgeState::Completed | BridgeState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub state: BridgeState,
    pub source_tx_hash: String,
    pub destination_tx_hash: Option<String>,
    pub amount_received: Option<f64>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeExecutionResult {
    pub quote_id: Uuid,
    pub bridge: String,
    pub sender: String,
    pub source_tx_hash: String,
    pub state: BridgeState,
    pub submitted_at: DateTime<Utc>,
}
