// src/cache/hot.rs
//! Process-local hot tier: bounded entry count, per-entry TTL, LRU eviction.

use async_trait::async_trait;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::CacheTier;
use crate::error::Result;

#[derive(Debug, Clone)]
struct HotEntry {
    value: String,
    cached_at: Instant,
    ttl: Duration,
}

impl HotEntry {
    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

#[derive(Debug, Default)]
struct HotStorage {
    entries: HashMap<String, HotEntry>,
    access_order: VecDeque<String>, // front = least recently used
}

impl HotStorage {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        self.access_order.push_back(key.to_string());
    }

    fn remove(&mut self, key: &str) -> bool {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        self.entries.remove(key).is_some()
    }
}

#[derive(Debug)]
pub struct HotCache {
    storage: Mutex<HotStorage>,
    max_entries: usize,
}

impl HotCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            storage: Mutex::new(HotStorage::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.storage.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheTier for HotCache {
    fn name(&self) -> &str {
        "hot"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut storage = self.storage.lock().await;
        let state = storage
            .entries
            .get(key)
            .map(|entry| (entry.is_valid(), entry.value.clone()));
        match state {
            Some((true, value)) => {
                storage.touch(key);
                Ok(Some(value))
            }
            Some((false, _)) => {
                storage.remove(key);
                debug!("Hot cache entry expired for {}", key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut storage = self.storage.lock().await;
        storage.remove(key);
        while storage.entries.len() >= self.max_entries {
            match storage.access_order.pop_front() {
                Some(lru_key) => {
                    storage.entries.remove(&lru_key);
                    debug!("Evicted LRU hot cache entry {}", lru_key);
                }
                None => break,
            }
        }
        storage.entries.insert(
            key.to_string(),
            HotEntry {
                value: value.to_string(),
                cached_at: Instant::now(),
                ttl,
            },
        );
        storage.access_order.push_back(key.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.storage.lock().await.remove(key))
    }
}
