// core/tags.rs

// RFID tag registry. Maps tag identifiers to item names and persists the map as a
// flat JSON object keyed by tag id:
//   { "A1B2C3": { "name": "Caixa de Peças", "createdAt": 1700000000000, "updatedAt": ... } }

use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Stored data for one tag
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub name: String,
    pub created_at: i64, // Unix time, milliseconds
    pub updated_at: i64,
}

/// A tag as returned to API callers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub tag_id: String,
    pub item_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Tag {
    fn from_record(tag_id: &str, record: &TagRecord) -> Self {
        Tag {
            tag_id: tag_id.to_string(),
            item_name: record.name.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Tag registry error types
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Tag {0} not found")]
    NotFound(String),

    #[error("Tag {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Tag storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tag file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// File-backed tag registry
#[derive(Debug)]
pub struct TagRegistry {
    path: PathBuf,
    tags: BTreeMap<String, TagRecord>,
}

impl TagRegistry {
    /// Open the registry at `path`, creating the file (and its directory) if missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TagError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let registry = if path.exists() {
            let data = fs::read_to_string(&path)?;
            let tags: BTreeMap<String, TagRecord> = serde_json::from_str(&data)?;
            info!("Tag registry loaded: {} tags", tags.len());
            TagRegistry { path, tags }
        } else {
            let registry = TagRegistry {
                path,
                tags: BTreeMap::new(),
            };
            registry.save(&registry.tags)?;
            info!("Tag registry created at {}", registry.path.display());
            registry
        };

        Ok(registry)
    }

    /// Register a new tag
    pub fn register(&mut self, tag_id: &str, item_name: &str) -> Result<Tag, TagError> {
        if tag_id.is_empty() {
            return Err(TagError::MissingField("tagId"));
        }
        if item_name.is_empty() {
            return Err(TagError::MissingField("itemName"));
        }
        if self.tags.contains_key(tag_id) {
            return Err(TagError::AlreadyRegistered(tag_id.to_string()));
        }

        let now = Utc::now().timestamp_millis();
        let record = TagRecord {
            name: item_name.to_string(),
            created_at: now,
            updated_at: now,
        };
        let tag = Tag::from_record(tag_id, &record);
        let mut tags = self.tags.clone();
        tags.insert(tag_id.to_string(), record);
        self.save(&tags)?;
        self.tags = tags;

        info!("Tag registered: {} -> {}", tag_id, item_name);
        Ok(tag)
    }

    /// Look up a tag
    pub fn get(&self, tag_id: &str) -> Option<Tag> {
        self.tags.get(tag_id).map(|record| Tag::from_record(tag_id, record))
    }

    /// Item name for a tag, if registered
    pub fn item_name(&self, tag_id: &str) -> Option<&str> {
        self.tags.get(tag_id).map(|record| record.name.as_str())
    }

    /// All tags, ordered by id
    pub fn list(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .map(|(tag_id, record)| Tag::from_record(tag_id, record))
            .collect()
    }

    /// Change the item name of a registered tag
    pub fn rename(&mut self, tag_id: &str, new_name: &str) -> Result<Tag, TagError> {
        if new_name.is_empty() {
            return Err(TagError::MissingField("itemName"));
        }
        let mut tags = self.tags.clone();
        let record = tags
            .get_mut(tag_id)
            .ok_or_else(|| TagError::NotFound(tag_id.to_string()))?;

        record.name = new_name.to_string();
        record.updated_at = Utc::now().timestamp_millis();
        let tag = Tag::from_record(tag_id, record);
        self.save(&tags)?;
        self.tags = tags;

        info!("Tag renamed: {} -> {}", tag_id, new_name);
        Ok(tag)
    }

    /// Remove a tag, returning what was stored
    pub fn delete(&mut self, tag_id: &str) -> Result<Tag, TagError> {
        let mut tags = self.tags.clone();
        let record = tags
            .remove(tag_id)
            .ok_or_else(|| TagError::NotFound(tag_id.to_string()))?;
        self.save(&tags)?;
        self.tags = tags;

        info!("Tag deleted: {}", tag_id);
        Ok(Tag::from_record(tag_id, &record))
    }

    /// Whether a tag is registered
    pub fn exists(&self, tag_id: &str) -> bool {
        self.tags.contains_key(tag_id)
    }

    /// Number of registered tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether no tag is registered
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    // Writes `tags` to disk. Callers replace `self.tags` only once this succeeds,
    // so memory never runs ahead of the file.
    fn save(&self, tags: &BTreeMap<String, TagRecord>) -> Result<(), TagError> {
        let data = serde_json::to_string_pretty(tags)?;
        fs::write(&self.path, data).map_err(|e| {
            error!("Failed to save tag registry to {}: {}", self.path.display(), e);
            TagError::Io(e)
        })
    }
}
