// src/config/settings.rs
use log::info;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::bridge::{ComparatorConfig, CrossChainConfig, TrackerConfig};
use crate::cache::{CacheConfig, TierConfig};
use crate::data::{FetcherConfig, GraphBuilderConfig};
use crate::error::{Result, RetryPolicy, RouterError};
use crate::routing::{
    AggregatorConfig, BuilderConfig, EnhancerConfig, PathfinderAlgorithm, PathfinderConfig, ValidatorConfig,
};
use crate::types::{ChainId, TokenAddress};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub venues_config_path: String,
    pub rpc_urls: HashMap<ChainId, String>,
    pub rpc_max_retries: u32,
    pub rpc_retry_delay_ms: u64,
    pub request_timeout_ms: u64,

    pub redis_url: Option<String>,
    pub cache_key_prefix: String,
    pub cache_hot_ttl_secs: u64,
    pub cache_hot_max_entries: usize,
    pub cache_warm_ttl_secs: u64,
    pub cache_cold_dir: Option<String>,
    pub cache_cold_ttl_secs: u64,

    pub fetch_page_size: usize,
    pub fetch_max_pages: usize,
    pub min_pair_liquidity_usd: f64,
    pub verify_top_pairs: usize,

    pub max_hops: usize,
    pub max_paths: usize,
    pub path_min_liquidity_usd: f64,
    pub pathfinder_algorithm: PathfinderAlgorithm,
    pub route_ttl_secs: u64,
    pub max_quotes: usize,
    pub internal_timeout_ms: u64,
    pub source_timeout_ms: u64,

    pub max_price_impact: f64,
    pub allow_high_impact: bool,
    pub min_improvement: f64,

    pub gas_price_gwei: f64,
    pub native_price_usd: f64,

    pub bridge_assets: HashMap<ChainId, Vec<TokenAddress>>,
    pub bridge_slippage_bps: u32,
    pub bridge_quote_timeout_ms: u64,
    pub bridge_poll_interval_secs: u64,
    pub bridge_tracking_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            venues_config_path: "config/venues.json".to_string(),
            rpc_urls: HashMap::new(),
            rpc_max_retries: 3,
            rpc_retry_delay_ms: 200,
            request_timeout_ms: 5_000,
            redis_url: None,
            cache_key_prefix: "urouter".to_string(),
            cache_hot_ttl_secs: 10,
            cache_hot_max_entries: 10_000,
            cache_warm_ttl_secs: 60,
            cache_cold_dir: None,
            cache_cold_ttl_secs: 24 * 60 * 60,
            fetch_page_size: 1000,
            fetch_max_pages: 5,
            min_pair_liquidity_usd: 10_000.0,
            verify_top_pairs: 25,
            max_hops: 3,
            max_paths: 20,
            path_min_liquidity_usd: 1_000.0,
            pathfinder_algorithm: PathfinderAlgorithm::Auto,
            route_ttl_secs: 60,
            max_quotes: 5,
            internal_timeout_ms: 2_000,
            source_timeout_ms: 3_000,
            max_price_impact: 0.5,
            allow_high_impact: false,
            min_improvement: 0.01,
            gas_price_gwei: 20.0,
            native_price_usd: 0.0,
            bridge_assets: HashMap::new(),
            bridge_slippage_bps: 50,
            bridge_quote_timeout_ms: 5_000,
            bridge_poll_interval_secs: 15,
            bridge_tracking_timeout_secs: 30 * 60,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// `1=https://a,10=https://b`
pub fn parse_chain_map(raw: &str) -> HashMap<ChainId, String> {
    raw.split(',')
        .filter_map(|part| {
            let (chain, value) = part.split_once('=')?;
            let chain = chain.trim().parse::<ChainId>().ok()?;
            let value = value.trim();
            (!value.is_empty()).then(|| (chain, value.to_string()))
        })
        .collect()
}

/// `1=0xa|0xb,10=0xc`
pub fn parse_bridge_assets(raw: &str) -> HashMap<ChainId, Vec<TokenAddress>> {
    parse_chain_map(raw)
        .into_iter()
        .map(|(chain, tokens)| {
            let tokens = tokens
                .split('|')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(TokenAddress::new)
                .collect();
            (chain, tokens)
        })
        .collect()
}

fn parse_algorithm(raw: &str) -> Option<PathfinderAlgorithm> {
    match raw.trim().to_lowercase().as_str() {
        "auto" => Some(PathfinderAlgorithm::Auto),
        "bfs" => Some(PathfinderAlgorithm::Bfs),
        "dijkstra" => Some(PathfinderAlgorithm::Dijkstra),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Config {
            log_level: env::var("LOG_LEVEL").unwrap_or(d.log_level),
            venues_config_path: env::var("VENUES_CONFIG_PATH").unwrap_or(d.venues_config_path),
            rpc_urls: env::var("RPC_URLS").map(|v| parse_chain_map(&v)).unwrap_or(d.rpc_urls),
            rpc_max_retries: env_parse("RPC_MAX_RETRIES", d.rpc_max_retries),
            rpc_retry_delay_ms: env_parse("RPC_RETRY_DELAY_MS", d.rpc_retry_delay_ms),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", d.request_timeout_ms),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            cache_key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(d.cache_key_prefix),
            cache_hot_ttl_secs: env_parse("CACHE_HOT_TTL_SECS", d.cache_hot_ttl_secs),
            cache_hot_max_entries: env_parse("CACHE_HOT_MAX_ENTRIES", d.cache_hot_max_entries),
            cache_warm_ttl_secs: env_parse("CACHE_WARM_TTL_SECS", d.cache_warm_ttl_secs),
            cache_cold_dir: env::var("CACHE_COLD_DIR").ok().filter(|v| !v.trim().is_empty()),
            cache_cold_ttl_secs: env_parse("CACHE_COLD_TTL_SECS", d.cache_cold_ttl_secs),
            fetch_page_size: env_parse("FETCH_PAGE_SIZE", d.fetch_page_size),
            fetch_max_pages: env_parse("FETCH_MAX_PAGES", d.fetch_max_pages),
            min_pair_liquidity_usd: env_parse("MIN_PAIR_LIQUIDITY_USD", d.min_pair_liquidity_usd),
            verify_top_pairs: env_parse("VERIFY_TOP_PAIRS", d.verify_top_pairs),
            max_hops: env_parse("MAX_HOPS", d.max_hops),
            max_paths: env_parse("MAX_PATHS", d.max_paths),
            path_min_liquidity_usd: env_parse("PATH_MIN_LIQUIDITY_USD", d.path_min_liquidity_usd),
            pathfinder_algorithm: env::var("PATHFINDER_ALGORITHM")
                .ok()
                .and_then(|v| parse_algorithm(&v))
                .unwrap_or(d.pathfinder_algorithm),
            route_ttl_secs: env_parse("ROUTE_TTL_SECS", d.route_ttl_secs),
            max_quotes: env_parse("MAX_QUOTES", d.max_quotes),
            internal_timeout_ms: env_parse("INTERNAL_ROUTING_TIMEOUT_MS", d.internal_timeout_ms),
            source_timeout_ms: env_parse("SOURCE_TIMEOUT_MS", d.source_timeout_ms),
            max_price_impact: env_parse("MAX_PRICE_IMPACT", d.max_price_impact),
            allow_high_impact: env_parse("ALLOW_HIGH_IMPACT", d.allow_high_impact),
            min_improvement: env_parse("MIN_IMPROVEMENT", d.min_improvement),
            gas_price_gwei: env_parse("GAS_PRICE_GWEI", d.gas_price_gwei),
            native_price_usd: env_parse("NATIVE_PRICE_USD", d.native_price_usd),
            bridge_assets: env::var("BRIDGE_ASSETS")
                .map(|v| parse_bridge_assets(&v))
                .unwrap_or(d.bridge_assets),
            bridge_slippage_bps: env_parse("BRIDGE_SLIPPAGE_BPS", d.bridge_slippage_bps),
            bridge_quote_timeout_ms: env_parse("BRIDGE_QUOTE_TIMEOUT_MS", d.bridge_quote_timeout_ms),
            bridge_poll_interval_secs: env_parse("BRIDGE_POLL_INTERVAL_SECS", d.bridge_poll_interval_secs),
            bridge_tracking_timeout_secs: env_parse("BRIDGE_TRACKING_TIMEOUT_SECS", d.bridge_tracking_timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.venues_config_path.trim().is_empty() {
            return Err(RouterError::ConfigError("VENUES_CONFIG_PATH cannot be empty".to_string()));
        }
        if self.max_hops == 0 {
            return Err(RouterError::ConfigError("MAX_HOPS must be at least 1".to_string()));
        }
        if self.fetch_page_size == 0 || self.cache_hot_max_entries == 0 {
            return Err(RouterError::ConfigError(
                "FETCH_PAGE_SIZE and CACHE_HOT_MAX_ENTRIES must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_price_impact) {
            return Err(RouterError::ConfigError(format!(
                "MAX_PRICE_IMPACT must be within [0, 1], got {}",
                self.max_price_impact
            )));
        }
        if self.min_improvement < 0.0 || !self.min_improvement.is_finite() {
            return Err(RouterError::ConfigError(format!(
                "MIN_IMPROVEMENT must be non-negative, got {}",
                self.min_improvement
            )));
        }
        if self.bridge_slippage_bps >= 10_000 {
            return Err(RouterError::ConfigError(format!(
                "BRIDGE_SLIPPAGE_BPS must be below 10000, got {}",
                self.bridge_slippage_bps
            )));
        }
        if self.bridge_poll_interval_secs == 0 {
            return Err(RouterError::ConfigError("BRIDGE_POLL_INTERVAL_SECS must be positive".to_string()));
        }
        Ok(())
    }

    pub fn log_settings(&self) {
        info!(
            "Configuration: venues={} chains_with_rpc={:?} redis={} cold_dir={:?} max_hops={} algorithm={:?}",
            self.venues_config_path,
            self.rpc_urls.keys().collect::<Vec<_>>(),
            self.redis_url.is_some(),
            self.cache_cold_dir,
            self.max_hops,
            self.pathfinder_algorithm
        );
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.rpc_max_retries.max(1),
            Duration::from_millis(self.rpc_retry_delay_ms),
            Duration::from_millis(self.rpc_retry_delay_ms.saturating_mul(10)),
        )
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            key_prefix: self.cache_key_prefix.clone(),
            hot: TierConfig {
                enabled: true,
                ttl_secs: self.cache_hot_ttl_secs,
            },
            hot_max_entries: self.cache_hot_max_entries,
            warm: TierConfig {
                enabled: self.redis_url.is_some(),
                ttl_secs: self.cache_warm_ttl_secs,
            },
            redis_url: self.redis_url.clone(),
            cold: TierConfig {
                enabled: self.cache_cold_dir.is_some(),
                ttl_secs: self.cache_cold_ttl_secs,
            },
            cold_dir: self.cache_cold_dir.clone(),
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            page_size: self.fetch_page_size,
            max_pages: self.fetch_max_pages,
            min_liquidity_usd: self.min_pair_liquidity_usd,
            request_timeout: self.request_timeout(),
        }
    }

    pub fn graph_builder_config(&self) -> GraphBuilderConfig {
        GraphBuilderConfig {
            verify_top_pairs: self.verify_top_pairs,
            ..Default::default()
        }
    }

    pub fn pathfinder_config(&self) -> PathfinderConfig {
        PathfinderConfig {
            max_hops: self.max_hops,
            max_paths: self.max_paths,
            min_liquidity_usd: self.path_min_liquidity_usd,
            algorithm: self.pathfinder_algorithm,
            ..Default::default()
        }
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            route_ttl: Duration::from_secs(self.route_ttl_secs),
            ..Default::default()
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            max_quotes: self.max_quotes,
            internal_timeout: Duration::from_millis(self.internal_timeout_ms),
            source_timeout: Duration::from_millis(self.source_timeout_ms),
            ..Default::default()
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_price_impact: self.max_price_impact,
            allow_high_impact: self.allow_high_impact,
            ..Default::default()
        }
    }

    pub fn enhancer_config(&self) -> EnhancerConfig {
        EnhancerConfig {
            min_improvement: self.min_improvement,
        }
    }

    pub fn comparator_config(&self) -> ComparatorConfig {
        ComparatorConfig {
            quote_timeout: Duration::from_millis(self.bridge_quote_timeout_ms),
        }
    }

    pub fn cross_chain_config(&self) -> CrossChainConfig {
        CrossChainConfig {
            bridge_assets: self.bridge_assets.clone(),
            slippage_bps: self.bridge_slippage_bps,
            max_hops: Some(self.max_hops),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_secs(self.bridge_poll_interval_secs),
            timeout: Duration::from_secs(self.bridge_tracking_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_chain_map() {
        let map = parse_chain_map("1=https://eth.example, 10 = https://op.example,bad,56=");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&10).map(String::as_str), Some("https://op.example"));
    }

    #[test]
    fn test_parse_bridge_assets() {
        let assets = parse_bridge_assets("1=0xA|0xb,10=0xC");
        assert_eq!(assets[&1], vec![TokenAddress::new("0xa"), TokenAddress::new("0xb")]);
        assert_eq!(assets[&10], vec![TokenAddress::new("0xc")]);
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("BFS"), Some(PathfinderAlgorithm::Bfs));
        assert_eq!(parse_algorithm("astar"), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::default().validate().is_ok());

        let config = Config {
            max_hops: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RouterError::ConfigError(_))));

        let config = Config {
            max_price_impact: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_component_configs_follow_settings() {
        let config = Config {
            redis_url: Some("redis://localhost".to_string()),
            max_hops: 2,
            min_improvement: 0.02,
            ..Default::default()
        };
        let cache = config.cache_config();
        assert!(cache.warm.enabled);
        assert!(!cache.cold.enabled);
        assert_eq!(config.pathfinder_config().max_hops, 2);
        assert_eq!(config.cross_chain_config().max_hops, Some(2));
        assert_eq!(config.enhancer_config().min_improvement, 0.02);
    }
}
