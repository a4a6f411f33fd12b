use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{ItemId, SupplyItem};

/// One item's available quantity at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub item_id: ItemId,
    pub name: String,
    pub available: u64,
}

/// Read-only, ordered copy of stock levels.
///
/// Order is the store's insertion order, which makes tie-breaking in the
/// matcher deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    entries: Vec<SnapshotEntry>,
    taken_at: DateTime<Utc>,
}

impl InventorySnapshot {
    pub fn new(entries: Vec<SnapshotEntry>, taken_at: DateTime<Utc>) -> Self {
        Self { entries, taken_at }
    }

    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a SupplyItem>) -> Self {
        let entries = items
            .into_iter()
            .map(|item| SnapshotEntry {
                item_id: item.id_typed(),
                name: item.name().to_string(),
                available: item.quantity(),
            })
            .collect();
        Self::new(entries, Utc::now())
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn get(&self, item_id: ItemId) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.item_id == item_id)
    }

    pub fn available(&self, item_id: ItemId) -> u64 {
        self.get(item_id).map_or(0, |e| e.available)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
