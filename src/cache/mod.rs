// src/cache/mod.rs
//! Tiered cache for pair and token lookups.
//!
//! hot (process-local LRU) -> warm (Redis) -> cold (disk). A hit in a lower tier
//! back-fills the enabled tiers above it. Tier failures are logged and treated
//! as misses: the cache can slow a route request down, never fail it.

pub mod disk;
pub mod hot;
pub mod redis_tier;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::types::{ChainId, PairEdge, TokenAddress, TokenNode};

pub use disk::DiskTier;
pub use hot::HotCache;
pub use redis_tier::RedisTier;

/// A single storage layer.
#[async_trait]
pub trait CacheTier: Send + Sync {
    fn name(&self) -> &str;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierKind {
    Hot,
    Warm,
    Cold,
}

/// How fast the cached data goes stale; decides which tiers a write lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    /// Pair reserves: hot + warm
    Reserves,
    /// Token metadata: warm + cold
    Metadata,
}

impl Volatility {
    fn tiers(&self) -> &'static [TierKind] {
        match self {
            Volatility::Reserves => &[TierKind::Hot, TierKind::Warm],
            Volatility::Metadata => &[TierKind::Warm, TierKind::Cold],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub key_prefix: String,
    pub hot: TierConfig,
    pub hot_max_entries: usize,
    pub warm: TierConfig,
    pub redis_url: Option<String>,
    pub cold: TierConfig,
    pub cold_dir: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "urouter".to_string(),
            hot: TierConfig {
                enabled: true,
                ttl_secs: 10,
            },
            hot_max_entries: 10_000,
            warm: TierConfig {
                enabled: true,
                ttl_secs: 60,
            },
            redis_url: None,
            cold: TierConfig {
                enabled: true,
                ttl_secs: 24 * 60 * 60,
            },
            cold_dir: None,
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub tier_errors: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hot_hits + self.warm_hits + self.cold_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hot_hits: AtomicU64,
    warm_hits: AtomicU64,
    cold_hits: AtomicU64,
    misses: AtomicU64,
    tier_errors: AtomicU64,
}

struct Tier {
    kind: TierKind,
    ttl: Duration,
    backend: Arc<dyn CacheTier>,
}

pub struct CacheManager {
    key_prefix: String,
    tiers: Vec<Tier>,
    counters: Counters,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("key_prefix", &self.key_prefix)
            .field(
                "tiers",
                &self.tiers.iter().map(|t| t.kind).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CacheManager {
    /// Build a manager from explicit backends. The hot tier is created here from
    /// the config; warm and cold are injected so tests can substitute them.
    pub fn new(
        config: &CacheConfig,
        warm: Option<Arc<dyn CacheTier>>,
        cold: Option<Arc<dyn CacheTier>>,
    ) -> Self {
        let mut tiers = Vec::new();
        if config.hot.enabled {
            tiers.push(Tier {
                kind: TierKind::Hot,
                ttl: Duration::from_secs(config.hot.ttl_secs),
                backend: Arc::new(HotCache::new(config.hot_max_entries)),
            });
        }
        if let (true, Some(backend)) = (config.warm.enabled, warm) {
            tiers.push(Tier {
                kind: TierKind::Warm,
                ttl: Duration::from_secs(config.warm.ttl_secs),
                backend,
            });
        }
        if let (true, Some(backend)) = (config.cold.enabled, cold) {
            tiers.push(Tier {
                kind: TierKind::Cold,
                ttl: Duration::from_secs(config.cold.ttl_secs),
                backend,
            });
        }
        Self {
            key_prefix: config.key_prefix.clone(),
            tiers,
            counters: Counters::default(),
        }
    }

    /// Connect the configured backends. An unreachable Redis or unusable cold
    /// directory disables that tier instead of failing startup.
    pub async fn connect(config: &CacheConfig) -> Self {
        let warm: Option<Arc<dyn CacheTier>> = match (&config.redis_url, config.warm.enabled) {
            (Some(url), true) => match RedisTier::connect(url).await {
                Ok(tier) => Some(Arc::new(tier)),
                Err(e) => {
                    warn!("Warm cache tier disabled: {}", e);
                    None
                }
            },
            _ => None,
        };
        let cold: Option<Arc<dyn CacheTier>> = match (&config.cold_dir, config.cold.enabled) {
            (Some(dir), true) => Some(Arc::new(DiskTier::new(dir))),
            _ => None,
        };
        Self::new(config, warm, cold)
    }

    /// Hot tier only.
    pub fn in_memory() -> Self {
        Self::new(&CacheConfig::default(), None, None)
    }

    pub fn enabled_tiers(&self) -> Vec<TierKind> {
        self.tiers.iter().map(|t| t.kind).collect()
    }

    pub fn generate_key(&self, prefix: &str, params: &[&str]) -> String {
        let mut key = format!("{}:{}", self.key_prefix, prefix);
        for param in params {
            key.push(':');
            key.push_str(param);
        }
        key
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        for (index, tier) in self.tiers.iter().enumerate() {
            let raw = match tier.backend.get(key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    self.counters.tier_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Cache tier {} GET failed for {}: {}", tier.backend.name(), key, e);
                    continue;
                }
            };
            let value = match serde_json::from_str::<T>(&raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Discarding undecodable {:?} cache entry {}: {}", tier.kind, key, e);
                    continue;
                }
            };

            self.record_hit(tier.kind);
            debug!("Cache HIT ({:?}) for {}", tier.kind, key);
            for upper in &self.tiers[..index] {
                if let Err(e) = upper.backend.set(key, &raw, upper.ttl).await {
                    self.counters.tier_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Back-fill of {:?} tier failed for {}: {}", upper.kind, key, e);
                }
            }
            return Some(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache MISS for {}", key);
        None
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, volatility: Volatility) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache value for {}: {}", key, e);
                return;
            }
        };
        let targets = volatility.tiers();
        for tier in self.tiers.iter().filter(|t| targets.contains(&t.kind)) {
            if let Err(e) = tier.backend.set(key, &raw, tier.ttl).await {
                self.counters.tier_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Cache tier {:?} SET failed for {}: {}", tier.kind, key, e);
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        for tier in &self.tiers {
            if let Err(e) = tier.backend.delete(key).await {
                warn!("Cache tier {:?} DEL failed for {}: {}", tier.kind, key, e);
            }
        }
    }

    fn pair_key(&self, chain_id: ChainId, a: &TokenAddress, b: &TokenAddress) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.generate_key("pair", &[&chain_id.to_string(), lo.as_str(), hi.as_str()])
    }

    fn node_key(&self, chain_id: ChainId, token: &TokenAddress) -> String {
        self.generate_key("node", &[&chain_id.to_string(), token.as_str()])
    }

    pub async fn get_pair(
        &self,
        chain_id: ChainId,
        a: &TokenAddress,
        b: &TokenAddress,
    ) -> Option<PairEdge> {
        self.get_json(&self.pair_key(chain_id, a, b)).await
    }

    pub async fn put_pair(&self, edge: &PairEdge) {
        let key = self.pair_key(edge.chain_id, &edge.token0, &edge.token1);
        self.set_json(&key, edge, Volatility::Reserves).await;
    }

    pub async fn get_node(&self, chain_id: ChainId, token: &TokenAddress) -> Option<TokenNode> {
        self.get_json(&self.node_key(chain_id, token)).await
    }

    pub async fn put_node(&self, node: &TokenNode) {
        let key = self.node_key(node.chain_id, &node.address);
        self.set_json(&key, node, Volatility::Metadata).await;
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hot_hits: self.counters.hot_hits.load(Ordering::Relaxed),
            warm_hits: self.counters.warm_hits.load(Ordering::Relaxed),
            cold_hits: self.counters.cold_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            tier_errors: self.counters.tier_errors.load(Ordering::Relaxed),
        }
    }

    fn record_hit(&self, kind: TierKind) {
        let counter = match kind {
            TierKind::Hot => &self.counters.hot_hits,
            TierKind::Warm => &self.counters.warm_hits,
            TierKind::Cold => &self.counters.cold_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;
    use crate::routing::graph::test_support::pair;

    /// Shared-tier stand-in backed by the hot cache implementation.
    fn memory_tier() -> Arc<dyn CacheTier> {
        Arc::new(HotCache::new(1_000))
    }

    struct FailingTier;

    #[async_trait]
    impl CacheTier for FailingTier {
        fn name(&self) -> &str {
            "failing"
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(RouterError::CacheError("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(RouterError::CacheError("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(RouterError::CacheError("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_lower_tier_hit_backfills_upper_tiers() {
        let warm = memory_tier();
        let cold = memory_tier();
        let cache = CacheManager::new(&CacheConfig::default(), Some(warm.clone()), Some(cold.clone()));

        let key = cache.generate_key("node", &["1", "0xabc"]);
        cold.set(&key, "42", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get_json::<u32>(&key).await, Some(42));
        assert_eq!(warm.get(&key).await.unwrap().as_deref(), Some("42"));

        // second read is served by the hot tier
        assert_eq!(cache.get_json::<u32>(&key).await, Some(42));
        let metrics = cache.metrics();
        assert_eq!(metrics.cold_hits, 1);
        assert_eq!(metrics.hot_hits, 1);
    }

    #[tokio::test]
    async fn test_volatility_selects_tiers() {
        let warm = memory_tier();
        let cold = memory_tier();
        let cache = CacheManager::new(&CacheConfig::default(), Some(warm.clone()), Some(cold.clone()));

        let edge = pair(1, "0xa", "0xb", "uni", 10.0, 10.0, 100.0, 30);
        cache.put_pair(&edge).await;
        let pair_key = cache.pair_key(1, &edge.token0, &edge.token1);
        assert!(warm.get(&pair_key).await.unwrap().is_some());
        assert!(cold.get(&pair_key).await.unwrap().is_none());

        let node = TokenNode::placeholder(TokenAddress::new("0xa"), 1, 18);
        cache.put_node(&node).await;
        let node_key = cache.node_key(1, &node.address);
        assert!(cold.get(&node_key).await.unwrap().is_some());

        // pair lookup is order-insensitive
        let fetched = cache.get_pair(1, &edge.token1, &edge.token0).await.unwrap();
        assert_eq!(fetched, edge);
    }

    #[tokio::test]
    async fn test_failing_tier_degrades_silently() {
        let cold = memory_tier();
        let failing: Arc<dyn CacheTier> = Arc::new(FailingTier);
        let cache = CacheManager::new(&CacheConfig::default(), Some(failing), Some(cold.clone()));

        let node = TokenNode::placeholder(TokenAddress::new("0xc"), 1, 6);
        cache.put_node(&node).await;
        assert_eq!(cache.get_node(1, &node.address).await, Some(node));
        assert!(cache.metrics().tier_errors >= 2);
    }

    #[tokio::test]
    async fn test_disabled_tiers_are_skipped() {
        let mut config = CacheConfig::default();
        config.hot.enabled = false;
        config.cold.enabled = false;
        let cache = CacheManager::new(&config, Some(memory_tier()), Some(memory_tier()));
        assert_eq!(cache.enabled_tiers(), vec![TierKind::Warm]);

        assert!(cache.get_json::<u32>("missing").await.is_none());
        assert_eq!(cache.metrics().misses, 1);
        assert_eq!(cache.metrics().hit_rate(), 0.0);
    }
}
