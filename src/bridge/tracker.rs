// src/bridge/tracker.rs
//! Polls a bridge for transfer status until it settles or the deadline passes.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};

use super::{BridgeAdapter, BridgeRegistry, BridgeState, BridgeStatus};
use crate::error::{Result, RouterError};
use crate::types::ChainId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrackingOutcome {
    Completed { status: BridgeStatus },
    Failed { status: BridgeStatus },
    TimedOut { last: Option<BridgeStatus> },
}

impl TrackingOutcome {
    pub fn last_status(&self) -> Option<&BridgeStatus> {
        match self {
            TrackingOutcome::Completed { status } | TrackingOutcome::Failed { status } => Some(status),
            TrackingOutcome::TimedOut { last } => last.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeStatusTracker {
    registry: Arc<BridgeRegistry>,
    config: TrackerConfig,
}

impl BridgeStatusTracker {
    pub fn new(registry: Arc<BridgeRegistry>, config: TrackerConfig) -> Self {
        Self { registry, config }
    }

    /// Blocks until the transfer completes, fails, or tracking times out.
    pub async fn track(&self, bridge: &str, source_tx_hash: &str, from_chain: ChainId) -> Result<TrackingOutcome> {
        let adapter = self.adapter(bridge)?;
        Ok(poll_until_settled(adapter, source_tx_hash.to_string(), from_chain, self.config.clone(), None).await)
    }

    /// Tracks in the background; every observed status is published on the
    /// returned channel.
    pub fn spawn(
        &self,
        bridge: &str,
        source_tx_hash: &str,
        from_chain: ChainId,
    ) -> Result<(watch::Receiver<Option<BridgeStatus>>, JoinHandle<TrackingOutcome>)> {
        let adapter = self.adapter(bridge)?;
        let (tx, rx) = watch::channel(None);
        let tx_hash = source_tx_hash.to_string();
        let config = self.config.clone();
        let handle = tokio::spawn(async move { poll_until_settled(adapter, tx_hash, from_chain, config, Some(tx)).await });
        Ok((rx, handle))
    }

    fn adapter(&self, bridge: &str) -> Result<Arc<dyn BridgeAdapter>> {
        self.registry
            .get(bridge)
            .ok_or_else(|| RouterError::BridgeError(format!("Unknown bridge {}", bridge)))
    }
}

async fn poll_until_settled(
    adapter: Arc<dyn BridgeAdapter>,
    tx_hash: String,
    from_chain: ChainId,
    config: TrackerConfig,
    publisher: Option<watch::Sender<Option<BridgeStatus>>>,
) -> TrackingOutcome {
    let deadline = Instant::now() + config.timeout;
    let mut ticker = interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<BridgeStatus> = None;

    loop {
        if timeout_at(deadline, ticker.tick()).await.is_err() {
            break;
        }

        let status = match timeout_at(deadline, adapter.get_bridge_status(&tx_hash, from_chain)).await {
            Ok(Ok(Some(status))) => status,
            Ok(Ok(None)) => {
                debug!("{} does not know transfer {} yet", adapter.name(), tx_hash);
                continue;
            }
            Ok(Err(e)) => {
                warn!("{} status poll for {} failed: {}", adapter.name(), tx_hash, e);
                continue;
            }
            Err(_) => break,
        };

        debug!("{} transfer {} is {:?}", adapter.name(), tx_hash, status.state);
        if let Some(publisher) = &publisher {
            let _ = publisher.send(Some(status.clone()));
        }

        match status.state {
            BridgeState::Completed => {
                info!("{} transfer {} completed", adapter.name(), tx_hash);
                return TrackingOutcome::Completed { status };
            }
            BridgeState::Failed => {
                warn!("{} transfer {} failed", adapter.name(), tx_hash);
                return TrackingOutcome::Failed { status };
            }
            BridgeState::Pending | BridgeState::Processing => last = Some(status),
        }
    }

    warn!(
        "Stopped tracking {} transfer {} after {:?}",
        adapter.name(),
        tx_hash,
        config.timeout
    );
    TrackingOutcome::TimedOut { last }
}
