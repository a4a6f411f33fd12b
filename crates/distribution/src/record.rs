//! Match records and their store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use aidflow_core::{DomainError, DomainResult, OperatorId};
use aidflow_inventory::ItemId;
use aidflow_needs::NeedId;

use crate::outcome::MatchOutcome;

aidflow_core::typed_id!(
    /// Match record identifier.
    MatchId
);

/// Durable result of allocating stock of one item to one need in one run.
///
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    id: MatchId,
    need_id: NeedId,
    item_id: ItemId,
    requested_quantity: u64,
    allocated_quantity: u64,
    outcome: MatchOutcome,
    allocated_at: DateTime<Utc>,
    allocated_by: OperatorId,
    note: String,
}

impl MatchRecord {
    /// Build a record for a quantity that was actually taken from stock.
    ///
    /// The outcome is derived from `requested` vs `allocated`.
    pub fn new(
        need_id: NeedId,
        item_id: ItemId,
        requested_quantity: u64,
        allocated_quantity: u64,
        allocated_by: OperatorId,
        note: impl Into<String>,
        allocated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if allocated_quantity == 0 {
            return Err(DomainError::validation(
                "match records are only written for non-zero allocations",
            ));
        }
        if allocated_quantity > requested_quantity {
            return Err(DomainError::invariant(format!(
                "allocated {allocated_quantity} exceeds requested {requested_quantity}"
            )));
        }
        Ok(Self {
            id: MatchId::generate(),
            need_id,
            item_id,
            requested_quantity,
            allocated_quantity,
            outcome: MatchOutcome::classify(requested_quantity, allocated_quantity),
            allocated_at,
            allocated_by,
            note: note.into(),
        })
    }

    pub fn id_typed(&self) -> MatchId {
        self.id
    }

    pub fn need_id(&self) -> NeedId {
        self.need_id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn requested_quantity(&self) -> u64 {
        self.requested_quantity
    }

    pub fn allocated_quantity(&self) -> u64 {
        self.allocated_quantity
    }

    pub fn outcome(&self) -> MatchOutcome {
        self.outcome
    }

    pub fn allocated_at(&self) -> DateTime<Utc> {
        self.allocated_at
    }

    pub fn allocated_by(&self) -> OperatorId {
        self.allocated_by
    }

    pub fn note(&self) -> &str {
        &self.note
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchStoreError {
    #[error("match record not found: {0}")]
    NotFound(MatchId),

    #[error("match record already exists: {0}")]
    AlreadyExists(MatchId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Append-only store of match records.
pub trait MatchStore: Send + Sync {
    fn insert(&self, record: MatchRecord) -> Result<MatchId, MatchStoreError>;

    fn get(&self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchStoreError>;

    /// Fetch several records, preserving the order of `ids`.
    ///
    /// Fails with `NotFound` on the first unknown id.
    fn get_many(&self, ids: &[MatchId]) -> Result<Vec<MatchRecord>, MatchStoreError>;

    /// Every record written for one need, oldest first.
    fn list_for_need(&self, need_id: NeedId) -> Result<Vec<MatchRecord>, MatchStoreError>;
}

impl<S> MatchStore for Arc<S>
where
    S: MatchStore + ?Sized,
{
    fn insert(&self, record: MatchRecord) -> Result<MatchId, MatchStoreError> {
        (**self).insert(record)
    }

    fn get(&self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchStoreError> {
        (**self).get(match_id)
    }

    fn get_many(&self, ids: &[MatchId]) -> Result<Vec<MatchRecord>, MatchStoreError> {
        (**self).get_many(ids)
    }

    fn list_for_need(&self, need_id: NeedId) -> Result<Vec<MatchRecord>, MatchStoreError> {
        (**self).list_for_need(need_id)
    }
}

/// In-memory match store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    records: RwLock<HashMap<MatchId, MatchRecord>>,
}

fn poisoned<T>(_: T) -> MatchStoreError {
    MatchStoreError::Storage("match store lock poisoned".to_string())
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl MatchStore for InMemoryMatchStore {
    fn insert(&self, record: MatchRecord) -> Result<MatchId, MatchStoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let id = record.id_typed();
        if records.contains_key(&id) {
            return Err(MatchStoreError::AlreadyExists(id));
        }
        records.insert(id, record);
        Ok(id)
    }

    fn get(&self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchStoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(&match_id).cloned())
    }

    fn get_many(&self, ids: &[MatchId]) -> Result<Vec<MatchRecord>, MatchStoreError> {
        let records = self.records.read().map_err(poisoned)?;
        ids.iter()
            .map(|id| records.get(id).cloned().ok_or(MatchStoreError::NotFound(*id)))
            .collect()
    }

    fn list_for_need(&self, need_id: NeedId) -> Result<Vec<MatchRecord>, MatchStoreError> {
        let records = self.records.read().map_err(poisoned)?;
        let mut out: Vec<_> = records
            .values()
            .filter(|r| r.need_id == need_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.allocated_at, r.id));
        Ok(out)
    }
}
