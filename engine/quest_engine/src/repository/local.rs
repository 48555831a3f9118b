//! Quota-bounded local cache.
//!
//! Mirrors browser local storage: a flat map of string keys to JSON string
//! values, where the quota covers the byte length of every key and value.
//! The map can optionally be mirrored to a JSON file, rewritten through a
//! temporary file and a rename on every save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::QuestRepository;
use crate::errors::{EngineError, Result};
use crate::types::Quest;

/// Typical browser local-storage budget.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

const KEY_PREFIX: &str = "quest:";

type Entries = BTreeMap<String, String>;

pub struct LocalCacheRepository {
    entries: RwLock<Entries>,
    quota_bytes: usize,
    path: Option<PathBuf>,
}

impl LocalCacheRepository {
    /// Memory-only cache.
    pub fn in_memory(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::new()),
            quota_bytes,
            path: None,
        }
    }

    /// File-backed cache. A missing file starts empty.
    pub async fn open(path: impl AsRef<Path>, quota_bytes: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries: Entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e.into()),
        };

        let used = used_bytes(&entries);
        if used > quota_bytes {
            warn!(
                "Local cache {} holds {used} bytes, above its {quota_bytes} byte quota",
                path.display()
            );
        }
        info!(
            "Local cache opened at {} with {} record(s)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            entries: RwLock::new(entries),
            quota_bytes,
            path: Some(path),
        })
    }

    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    pub async fn used_bytes(&self) -> usize {
        used_bytes(&*self.entries.read().await)
    }

    fn check(&self, entries: &Entries, key: &str, value: &str) -> Result<()> {
        let required = required_bytes(entries, key, value);
        if required > self.quota_bytes {
            return Err(EngineError::QuotaExceeded {
                required,
                quota: self.quota_bytes,
            });
        }
        Ok(())
    }

    async fn flush(&self, entries: &Entries) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string(entries)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn storage_key(quest_id: &str) -> String {
    format!("{KEY_PREFIX}{quest_id}")
}

fn used_bytes(entries: &Entries) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Total footprint once `key` holds `value`.
fn required_bytes(entries: &Entries, key: &str, value: &str) -> usize {
    let existing = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
    used_bytes(entries) - existing + key.len() + value.len()
}

#[async_trait]
impl QuestRepository for LocalCacheRepository {
    async fn load(&self, quest_id: &str) -> Result<Option<Quest>> {
        let entries = self.entries.read().await;
        match entries.get(&storage_key(quest_id)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, quest: &Quest) -> Result<()> {
        let key = storage_key(&quest.id);
        let value = serde_json::to_string(quest)?;

        let mut entries = self.entries.write().await;
        self.check(&entries, &key, &value)?;
        let previous = entries.insert(key.clone(), value);

        if let Err(e) = self.flush(&entries).await {
            // Keep memory and file in agreement.
            match previous {
                Some(old) => entries.insert(key, old),
                None => entries.remove(&key),
            };
            return Err(e);
        }
        debug!("Local cache saved quest {} ({} bytes used)", quest.id, used_bytes(&entries));
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .keys()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX))
            .map(str::to_string)
            .collect())
    }

    async fn ensure_capacity(&self, quest: &Quest) -> Result<()> {
        let key = storage_key(&quest.id);
        let value = serde_json::to_string(quest)?;
        let entries = self.entries.read().await;
        self.check(&entries, &key, &value)
    }
}
