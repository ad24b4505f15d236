// src/bridge/registry.rs
use dashmap::DashMap;
use log::{info, warn};
use std::sync::Arc;

use super::BridgeAdapter;
use crate::types::ChainId;

/// Bridge adapters by name.
#[derive(Default)]
pub struct BridgeRegistry {
    adapters: DashMap<String, Arc<dyn BridgeAdapter>>,
}

impl std::fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any adapter with the same name.
    pub fn register(&self, adapter: Arc<dyn BridgeAdapter>) {
        let name = adapter.name().to_lowercase();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            warn!("Replaced bridge adapter {}", name);
        } else {
            info!("Registered bridge adapter {}", name);
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.adapters.remove(&name.to_lowercase()).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BridgeAdapter>> {
        self.adapters.get(&name.to_lowercase()).map(|a| Arc::clone(a.value()))
    }

    /// Adapters able to bridge `from_chain -> to_chain`, highest priority first.
    pub fn adapters_for(&self, from_chain: ChainId, to_chain: ChainId) -> Vec<Arc<dyn BridgeAdapter>> {
        let mut adapters: Vec<Arc<dyn BridgeAdapter>> = self
            .adapters
            .iter()
            .filter(|entry| entry.value().supports_chain_pair(from_chain, to_chain))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        adapters.sort_by(|a, b| b.priority().cmp(&a.priority()).then_with(|| a.name().cmp(b.name())));
        adapters
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
