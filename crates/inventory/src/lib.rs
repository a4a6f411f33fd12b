//! Inventory store: stocked supply items and their on-hand quantities.
//!
//! The store is the only place stock levels change. Reads go through
//! [`InventoryStore::snapshot`]; writes go through the per-item atomic
//! [`InventoryStore::decrement`] and [`InventoryStore::restock`].

pub mod item;
pub mod snapshot;
pub mod store;

pub use item::{ItemId, SupplyItem};
pub use snapshot::{InventorySnapshot, SnapshotEntry};
pub use store::{InMemoryInventoryStore, InventoryError, InventoryStore};
