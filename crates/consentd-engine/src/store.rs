//! Key-value stores backing the persistence gateway
//!
//! A store holds opaque string blobs addressed by `(store name, key)`.

use async_trait::async_trait;
use consentd_core::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::warn;

#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn read(&self, store: &str, key: &str) -> Result<Option<String>>;
    async fn write(&self, store: &str, key: &str, value: String) -> Result<()>;
    async fn remove(&self, store: &str, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry before the store is handed to a service.
    pub fn with_entry(mut self, store: &str, key: &str, value: impl Into<String>) -> Self {
        self.entries
            .get_mut()
            .insert((store.to_string(), key.to_string()), value.into());
        self
    }
}

#[async_trait]
impl ConsentStore for MemoryStore {
    async fn read(&self, store: &str, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(store.to_string(), key.to_string())).cloned())
    }

    async fn write(&self, store: &str, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert((store.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn remove(&self, store: &str, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&(store.to_string(), key.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One JSON file per store name (`<dir>/<store>.json`) holding a key → blob map.
/// Writes go to a temp file first and are renamed into place.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, store: &str) -> PathBuf {
        self.dir.join(format!("{}.json", store))
    }

    async fn read_map(&self, store: &str) -> Result<Map<String, Value>> {
        let path = self.path_for(store);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::store(store, "*", format!("{} is not a JSON object", path.display()))),
        }
    }

    /// Current map for a read-modify-write. A corrupt file is replaced rather
    /// than blocking every later write; I/O failures are propagated so other
    /// keys are never dropped on a transient error.
    async fn read_map_for_update(&self, store: &str) -> Result<Map<String, Value>> {
        match self.read_map(store).await {
            Ok(map) => Ok(map),
            Err(e @ (Error::JsonError(_) | Error::Store { .. })) => {
                warn!("replacing corrupt consent store {}: {}", self.path_for(store).display(), e);
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn write_map(&self, store: &str, map: Map<String, Value>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(store);
        let json = serde_json::to_string_pretty(&Value::Object(map))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConsentStore for FileStore {
    async fn read(&self, store: &str, key: &str) -> Result<Option<String>> {
        let map = self.read_map(store).await?;
        match map.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(Error::store(store, key, "entry is not a string")),
        }
    }

    async fn write(&self, store: &str, key: &str, value: String) -> Result<()> {
        let mut map = self.read_map_for_update(store).await?;
        map.insert(key.to_string(), Value::String(value));
        self.write_map(store, map).await
    }

    async fn remove(&self, store: &str, key: &str) -> Result<()> {
        let mut map = self.read_map_for_update(store).await?;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_map(store, map).await
    }
}
