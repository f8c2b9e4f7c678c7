use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{AuthConfig, StorageKind};

/// String key/value storage for the session blob and the refresh flag
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// Build the storage backend selected by configuration
pub fn create_storage(config: &AuthConfig) -> Arc<dyn SessionStorage> {
    match config.session_storage {
        StorageKind::Local => Arc::new(FileStorage::new(&config.session_file)),
        StorageKind::Session => Arc::new(MemoryStorage::new()),
    }
}

/// Storage that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }
}

/// Storage persisted as a flat JSON object in one file.
///
/// The file is read once on first use and rewritten after every change.
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            items: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(items) => {
                    debug!(path = %self.path.display(), "Loaded session storage");
                    Ok(items)
                }
                Err(e) => {
                    // A corrupt file is treated like an empty one and overwritten on next write
                    warn!(path = %self.path.display(), error = %e, "Session storage file is corrupt, ignoring it");
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, items: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(items)?;
        tokio::fs::write(&self.path, contents)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Run `f` against the cached map, loading it first if needed. A change is
    /// written to disk before it reaches the cache, so a failed write leaves both untouched.
    async fn with_items<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> (R, bool),
    ) -> Result<R> {
        let mut guard = self.items.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let items = guard
            .as_mut()
            .ok_or_else(|| anyhow!("session storage not loaded"))?;

        let mut staged = items.clone();
        let (result, changed) = f(&mut staged);
        if changed {
            self.save(&staged).await?;
            *items = staged;
        }
        Ok(result)
    }
}

#[async_trait]
impl SessionStorage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.with_items(|items| (items.get(key).cloned(), false)).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.with_items(|items| {
            let changed = items.get(key).map(String::as_str) != Some(value);
            items.insert(key.to_string(), value.to_string());
            ((), changed)
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let removed = self
            .with_items(|items| {
                let removed = items.remove(key).is_some();
                (removed, removed)
            })
            .await?;
        if removed {
            info!(key, "Removed item from session storage");
        }
        Ok(())
    }
}
