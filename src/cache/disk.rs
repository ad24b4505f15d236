// src/cache/disk.rs
//! Cold tier: durable JSON files on local disk with an embedded expiry.

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use super::CacheTier;
use crate::error::{Result, RouterError};

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    expires_at_ms: i64,
    value: String,
}

#[derive(Debug, Clone)]
pub struct DiskTier {
    dir: PathBuf,
}

impl DiskTier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> RouterError {
    RouterError::CacheError(format!("{} {}: {}", action, path.display(), err))
}

#[async_trait]
impl CacheTier for DiskTier {
    fn name(&self) -> &str {
        "cold"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("reading", &path, e)),
        };
        let entry: DiskEntry = serde_json::from_str(&raw)?;
        if entry.expires_at_ms <= Utc::now().timestamp_millis() {
            debug!("Cold cache entry expired for {}", key);
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("creating", &self.dir, e))?;
        let entry = DiskEntry {
            expires_at_ms: Utc::now().timestamp_millis() + ttl.as_millis() as i64,
            value: value.to_string(),
        };
        let path = self.path_for(key);
        // unique per writer so concurrent sets of one key never share a temp file
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, serde_json::to_vec(&entry)?)
            .await
            .map_err(|e| io_error("writing", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("renaming", &path, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("removing", &path, e)),
        }
    }
}
