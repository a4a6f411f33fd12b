//! Inventory store abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use aidflow_core::DomainError;

use crate::item::{ItemId, SupplyItem};
use crate::snapshot::{InventorySnapshot, SnapshotEntry};

/// Inventory store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("supply item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("supply item already exists: {0}")]
    AlreadyExists(ItemId),

    /// Decrement would take stock below zero. Nothing was written.
    #[error("insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u64,
        available: u64,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Inventory store abstraction.
///
/// Implementations must make `decrement` a compare-and-decrement on a single
/// item: two callers racing for the last units of an item cannot both succeed.
pub trait InventoryStore: Send + Sync {
    /// Add a new item to the store.
    fn insert(&self, item: SupplyItem) -> Result<ItemId, InventoryError>;

    /// Current state of one item.
    fn get(&self, item_id: ItemId) -> Result<Option<SupplyItem>, InventoryError>;

    /// Read-only copy of every item's available quantity, in insertion order.
    fn snapshot(&self) -> Result<InventorySnapshot, InventoryError>;

    /// Atomically remove `quantity` units. Returns the remaining stock.
    fn decrement(&self, item_id: ItemId, quantity: u64) -> Result<u64, InventoryError>;

    /// Add `quantity` units (inventory maintenance). Returns the new stock.
    fn restock(&self, item_id: ItemId, quantity: u64) -> Result<u64, InventoryError>;

    /// Items whose name contains `text`, case-insensitively, in insertion order.
    fn find_by_name_contains(&self, text: &str) -> Result<Vec<SupplyItem>, InventoryError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn insert(&self, item: SupplyItem) -> Result<ItemId, InventoryError> {
        (**self).insert(item)
    }

    fn get(&self, item_id: ItemId) -> Result<Option<SupplyItem>, InventoryError> {
        (**self).get(item_id)
    }

    fn snapshot(&self) -> Result<InventorySnapshot, InventoryError> {
        (**self).snapshot()
    }

    fn decrement(&self, item_id: ItemId, quantity: u64) -> Result<u64, InventoryError> {
        (**self).decrement(item_id, quantity)
    }

    fn restock(&self, item_id: ItemId, quantity: u64) -> Result<u64, InventoryError> {
        (**self).restock(item_id, quantity)
    }

    fn find_by_name_contains(&self, text: &str) -> Result<Vec<SupplyItem>, InventoryError> {
        (**self).find_by_name_contains(text)
    }
}

type ItemCell = Arc<Mutex<SupplyItem>>;

#[derive(Debug, Default)]
struct Shelf {
    order: Vec<ItemId>,
    items: HashMap<ItemId, ItemCell>,
}

/// In-memory inventory store for tests/dev.
///
/// The shelf index sits behind a `RwLock` that is only write-locked on insert;
/// each item has its own `Mutex`, so stock changes on different items never
/// wait on each other.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    shelf: RwLock<Shelf>,
}

fn poisoned<T>(_: T) -> InventoryError {
    InventoryError::Storage("inventory lock poisoned".to_string())
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn cell(&self, item_id: ItemId) -> Result<ItemCell, InventoryError> {
        let shelf = self.shelf.read().map_err(poisoned)?;
        shelf
            .items
            .get(&item_id)
            .cloned()
            .ok_or(InventoryError::ItemNotFound(item_id))
    }

    fn cells_in_order(&self) -> Result<Vec<ItemCell>, InventoryError> {
        let shelf = self.shelf.read().map_err(poisoned)?;
        Ok(shelf
            .order
            .iter()
            .filter_map(|id| shelf.items.get(id).cloned())
            .collect())
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn insert(&self, item: SupplyItem) -> Result<ItemId, InventoryError> {
        let mut shelf = self.shelf.write().map_err(poisoned)?;
        let id = item.id_typed();
        if shelf.items.contains_key(&id) {
            return Err(InventoryError::AlreadyExists(id));
        }
        shelf.order.push(id);
        shelf.items.insert(id, Arc::new(Mutex::new(item)));
        Ok(id)
    }

    fn get(&self, item_id: ItemId) -> Result<Option<SupplyItem>, InventoryError> {
        let cell = match self.cell(item_id) {
            Ok(cell) => cell,
            Err(InventoryError::ItemNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let item = cell.lock().map_err(poisoned)?;
        Ok(Some(item.clone()))
    }

    fn snapshot(&self) -> Result<InventorySnapshot, InventoryError> {
        let mut entries = Vec::new();
        for cell in self.cells_in_order()? {
            let item = cell.lock().map_err(poisoned)?;
            entries.push(SnapshotEntry {
                item_id: item.id_typed(),
                name: item.name().to_string(),
                available: item.quantity(),
            });
        }
        Ok(InventorySnapshot::new(entries, Utc::now()))
    }

    fn decrement(&self, item_id: ItemId, quantity: u64) -> Result<u64, InventoryError> {
        if quantity == 0 {
            return Err(DomainError::validation("decrement quantity must be positive").into());
        }
        let cell = self.cell(item_id)?;
        let mut item = cell.lock().map_err(poisoned)?;
        let left = item
            .take(quantity)
            .map_err(|available| InventoryError::InsufficientStock {
                item_id,
                requested: quantity,
                available,
            })?;
        debug!(item_id = %item_id, quantity, left, "stock decremented");
        Ok(left)
    }

    fn restock(&self, item_id: ItemId, quantity: u64) -> Result<u64, InventoryError> {
        if quantity == 0 {
            return Err(DomainError::validation("restock quantity must be positive").into());
        }
        let cell = self.cell(item_id)?;
        let mut item = cell.lock().map_err(poisoned)?;
        let now = item.put(quantity)?;
        debug!(item_id = %item_id, quantity, now, "stock replenished");
        Ok(now)
    }

    fn find_by_name_contains(&self, text: &str) -> Result<Vec<SupplyItem>, InventoryError> {
        let mut found = Vec::new();
        for cell in self.cells_in_order()? {
            let item = cell.lock().map_err(poisoned)?;
            if item.name_contains(text) {
                found.push(item.clone());
            }
        }
        Ok(found)
    }
}
