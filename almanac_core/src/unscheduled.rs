//! Unscheduled items: names waiting to be placed on the calendar.
//!
//! Stored newest first in `unscheduled_events.json`, using the same locked
//! JSON array file as the series store.

use crate::store::JsonArrayFile;
use crate::{Error, Result, UnscheduledItem};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// File name of the unscheduled store inside the data directory
pub const UNSCHEDULED_FILE: &str = "unscheduled_events.json";

impl UnscheduledItem {
    /// A new item with a generated `us-` id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: format!("us-{}", uuid::Uuid::new_v4()),
            name: name.into().trim().to_string(),
            created_at: Some(Utc::now()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Result of [`UnscheduledStore::add`]
#[derive(Clone, Debug, PartialEq)]
pub enum AddOutcome {
    Added(UnscheduledItem),
    /// An item with this id already existed; nothing changed
    AlreadyPresent,
}

/// Storage interface for unscheduled items
pub trait UnscheduledStore {
    fn list(&self) -> Result<Vec<UnscheduledItem>>;

    /// Insert at the front of the list. Both id and name are required.
    fn add(&mut self, item: UnscheduledItem) -> Result<AddOutcome>;

    /// Remove an item, returning it if it existed
    fn delete(&mut self, id: &str) -> Result<Option<UnscheduledItem>>;

    fn get(&self, id: &str) -> Result<UnscheduledItem> {
        self.list()?
            .into_iter()
            .find(|item| item.id == id)
            .ok_or_else(|| Error::NotFound(format!("unscheduled item {}", id)))
    }
}

fn insert_front(items: &mut Vec<UnscheduledItem>, mut item: UnscheduledItem) -> Result<AddOutcome> {
    item.id = item.id.trim().to_string();
    item.name = item.name.trim().to_string();
    if item.id.is_empty() {
        return Err(Error::InvalidInput("unscheduled item id is required".into()));
    }
    if item.name.is_empty() {
        return Err(Error::InvalidInput("unscheduled item name is required".into()));
    }

    if items.iter().any(|existing| existing.id == item.id) {
        tracing::debug!("Unscheduled item {} already present", item.id);
        return Ok(AddOutcome::AlreadyPresent);
    }

    items.insert(0, item.clone());
    Ok(AddOutcome::Added(item))
}

fn take(items: &mut Vec<UnscheduledItem>, id: &str) -> Option<UnscheduledItem> {
    let idx = items.iter().position(|item| item.id == id)?;
    Some(items.remove(idx))
}

/// Unscheduled store backed by `unscheduled_events.json`
#[derive(Clone, Debug)]
pub struct JsonUnscheduledStore {
    file: JsonArrayFile,
}

impl JsonUnscheduledStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonArrayFile::new(path),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(UNSCHEDULED_FILE))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl UnscheduledStore for JsonUnscheduledStore {
    fn list(&self) -> Result<Vec<UnscheduledItem>> {
        self.file.load()
    }

    fn add(&mut self, item: UnscheduledItem) -> Result<AddOutcome> {
        self.file
            .update(|items: &mut Vec<UnscheduledItem>| insert_front(items, item))
    }

    fn delete(&mut self, id: &str) -> Result<Option<UnscheduledItem>> {
        let removed = self
            .file
            .update(|items: &mut Vec<UnscheduledItem>| Ok(take(items, id)))?;
        if removed.is_none() {
            tracing::debug!("No unscheduled item {} to delete", id);
        }
        Ok(removed)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryUnscheduledStore {
    items: Vec<UnscheduledItem>,
}

impl MemoryUnscheduledStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnscheduledStore for MemoryUnscheduledStore {
    fn list(&self) -> Result<Vec<UnscheduledItem>> {
        Ok(self.items.clone())
    }

    fn add(&mut self, item: UnscheduledItem) -> Result<AddOutcome> {
        insert_front(&mut self.items, item)
    }

    fn delete(&mut self, id: &str) -> Result<Option<UnscheduledItem>> {
        Ok(take(&mut self.items, id))
    }
}
