//! Distribution batch lifecycle: creation from match records, approval, and
//! the read side used for detail views and reports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use aidflow_core::{Aggregate, AggregateRoot, DomainError, OperatorId};
use aidflow_events::EventEnvelope;
use aidflow_inventory::{InventoryStore, ItemId};
use aidflow_needs::{NeedId, NeedRegistry};

use crate::batch::{
    ApproveBatch, BatchCommand, BatchEvent, BatchId, CreateBatch, DistributionBatch,
};
use crate::outcome::MatchOutcome;
use crate::record::{MatchId, MatchRecord, MatchStore, MatchStoreError};

const AGGREGATE_TYPE: &str = "distribution.batch";

pub type BatchEnvelope = EventEnvelope<BatchEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("invalid batch input: {0}")]
    InvalidBatchInput(String),

    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("batch already completed: {0}")]
    BatchAlreadyCompleted(BatchId),

    #[error("match record not found: {0}")]
    MatchRecordNotFound(MatchId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<MatchStoreError> for BatchError {
    fn from(value: MatchStoreError) -> Self {
        match value {
            MatchStoreError::NotFound(id) => BatchError::MatchRecordNotFound(id),
            other => BatchError::Storage(other.to_string()),
        }
    }
}

/// Persistence for batches and their event history.
///
/// `transition` runs a command against the stored batch under that batch's
/// lock, so two concurrent approvals can never both succeed.
pub trait BatchStore: Send + Sync {
    fn insert(
        &self,
        batch: DistributionBatch,
        history: Vec<BatchEnvelope>,
    ) -> Result<BatchId, BatchError>;

    fn get(&self, batch_id: BatchId) -> Result<Option<DistributionBatch>, BatchError>;

    /// All batches, newest first.
    fn list(&self) -> Result<Vec<DistributionBatch>, BatchError>;

    fn transition(
        &self,
        batch_id: BatchId,
        recorded_by: OperatorId,
        command: &BatchCommand,
    ) -> Result<DistributionBatch, BatchError>;

    fn history(&self, batch_id: BatchId) -> Result<Vec<BatchEnvelope>, BatchError>;
}

impl<S> BatchStore for Arc<S>
where
    S: BatchStore + ?Sized,
{
    fn insert(
        &self,
        batch: DistributionBatch,
        history: Vec<BatchEnvelope>,
    ) -> Result<BatchId, BatchError> {
        (**self).insert(batch, history)
    }

    fn get(&self, batch_id: BatchId) -> Result<Option<DistributionBatch>, BatchError> {
        (**self).get(batch_id)
    }

    fn list(&self) -> Result<Vec<DistributionBatch>, BatchError> {
        (**self).list()
    }

    fn transition(
        &self,
        batch_id: BatchId,
        recorded_by: OperatorId,
        command: &BatchCommand,
    ) -> Result<DistributionBatch, BatchError> {
        (**self).transition(batch_id, recorded_by, command)
    }

    fn history(&self, batch_id: BatchId) -> Result<Vec<BatchEnvelope>, BatchError> {
        (**self).history(batch_id)
    }
}

#[derive(Debug)]
struct BatchSlot {
    batch: DistributionBatch,
    history: Vec<BatchEnvelope>,
}

type BatchCell = Arc<Mutex<BatchSlot>>;

#[derive(Debug, Default)]
struct Shelf {
    order: Vec<BatchId>,
    slots: HashMap<BatchId, BatchCell>,
}

/// In-memory batch store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    shelf: RwLock<Shelf>,
}

fn poisoned<T>(_: T) -> BatchError {
    BatchError::Storage("batch store lock poisoned".to_string())
}

fn envelope(batch: &DistributionBatch, recorded_by: OperatorId, event: BatchEvent) -> BatchEnvelope {
    EventEnvelope::record(
        batch.id_typed().0,
        AGGREGATE_TYPE,
        batch.version(),
        recorded_by,
        event,
    )
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn cell(&self, batch_id: BatchId) -> Result<BatchCell, BatchError> {
        let shelf = self.shelf.read().map_err(poisoned)?;
        shelf
            .slots
            .get(&batch_id)
            .cloned()
            .ok_or(BatchError::BatchNotFound(batch_id))
    }
}

impl BatchStore for InMemoryBatchStore {
    fn insert(
        &self,
        batch: DistributionBatch,
        history: Vec<BatchEnvelope>,
    ) -> Result<BatchId, BatchError> {
        let id = batch.id_typed();
        let mut shelf = self.shelf.write().map_err(poisoned)?;
        if shelf.slots.contains_key(&id) {
            return Err(BatchError::Domain(DomainError::conflict(format!(
                "batch {id} already stored"
            ))));
        }
        shelf.order.push(id);
        shelf
            .slots
            .insert(id, Arc::new(Mutex::new(BatchSlot { batch, history })));
        Ok(id)
    }

    fn get(&self, batch_id: BatchId) -> Result<Option<DistributionBatch>, BatchError> {
        let cell = match self.cell(batch_id) {
            Ok(cell) => cell,
            Err(BatchError::BatchNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let slot = cell.lock().map_err(poisoned)?;
        Ok(Some(slot.batch.clone()))
    }

    fn list(&self) -> Result<Vec<DistributionBatch>, BatchError> {
        let cells: Vec<BatchCell> = {
            let shelf = self.shelf.read().map_err(poisoned)?;
            shelf
                .order
                .iter()
                .rev()
                .filter_map(|id| shelf.slots.get(id).cloned())
                .collect()
        };

        let mut out = Vec::with_capacity(cells.len());
        for cell in cells {
            out.push(cell.lock().map_err(poisoned)?.batch.clone());
        }
        // Stable: batches created in the same instant keep newest-inserted first.
        out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(out)
    }

    fn transition(
        &self,
        batch_id: BatchId,
        recorded_by: OperatorId,
        command: &BatchCommand,
    ) -> Result<DistributionBatch, BatchError> {
        let cell = self.cell(batch_id)?;
        let mut slot = cell.lock().map_err(poisoned)?;

        let mut draft = slot.batch.clone();
        let events = draft.handle(command)?;
        let mut recorded = Vec::with_capacity(events.len());
        for event in events {
            draft.apply(&event);
            recorded.push(envelope(&draft, recorded_by, event));
        }

        slot.batch = draft;
        slot.history.extend(recorded);
        Ok(slot.batch.clone())
    }

    fn history(&self, batch_id: BatchId) -> Result<Vec<BatchEnvelope>, BatchError> {
        let cell = self.cell(batch_id)?;
        let slot = cell.lock().map_err(poisoned)?;
        Ok(slot.history.clone())
    }
}

/// One match record of a batch, resolved for display.
///
/// `requester` and `item_name` are `None` when the need or item can no longer
/// be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLine {
    pub match_id: MatchId,
    pub need_id: NeedId,
    pub requester: Option<String>,
    pub item_id: ItemId,
    pub item_name: Option<String>,
    pub requested_quantity: u64,
    pub allocated_quantity: u64,
    pub outcome: MatchOutcome,
    pub allocated_at: DateTime<Utc>,
    pub allocated_by: OperatorId,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDetail {
    pub batch: DistributionBatch,
    pub lines: Vec<BatchLine>,
}

/// Creates, approves and reads distribution batches.
#[derive(Debug)]
pub struct BatchManager<B, M, N, I> {
    batches: B,
    matches: M,
    needs: N,
    inventory: I,
}

impl<B, M, N, I> BatchManager<B, M, N, I>
where
    B: BatchStore,
    M: MatchStore,
    N: NeedRegistry,
    I: InventoryStore,
{
    pub fn new(batches: B, matches: M, needs: N, inventory: I) -> Self {
        Self {
            batches,
            matches,
            needs,
            inventory,
        }
    }

    /// Group existing match records into a new `Pending` batch.
    pub fn create(
        &self,
        match_ids: &[MatchId],
        distribution_date: NaiveDate,
        notes: impl Into<String>,
        created_by: OperatorId,
    ) -> Result<DistributionBatch, BatchError> {
        if match_ids.is_empty() {
            return Err(BatchError::InvalidBatchInput(
                "at least one match record is required".to_string(),
            ));
        }

        let records = self.matches.get_many(match_ids)?;

        let mut batch = DistributionBatch::empty(BatchId::generate());
        let command = BatchCommand::CreateBatch(CreateBatch {
            batch_id: batch.id_typed(),
            matches: records,
            distribution_date,
            notes: notes.into(),
            created_by,
            occurred_at: Utc::now(),
        });

        let events = batch.handle(&command).map_err(|e| match e {
            DomainError::Validation(msg) => BatchError::InvalidBatchInput(msg),
            other => BatchError::Domain(other),
        })?;
        let mut history = Vec::with_capacity(events.len());
        for event in events {
            batch.apply(&event);
            history.push(envelope(&batch, created_by, event));
        }

        let batch_id = self.batches.insert(batch.clone(), history)?;
        info!(
            batch_id = %batch_id,
            case_count = batch.case_count(),
            total_supply_items = batch.total_supply_items(),
            created_by = %created_by,
            "distribution batch created"
        );
        Ok(batch)
    }

    /// Move a batch from `Pending` to `Completed`.
    ///
    /// A completed batch is left untouched and reported as
    /// `BatchAlreadyCompleted`.
    pub fn approve(
        &self,
        batch_id: BatchId,
        approved_by: OperatorId,
    ) -> Result<DistributionBatch, BatchError> {
        let command = BatchCommand::ApproveBatch(ApproveBatch {
            batch_id,
            approved_by,
            occurred_at: Utc::now(),
        });

        match self.batches.transition(batch_id, approved_by, &command) {
            Ok(batch) => {
                info!(batch_id = %batch_id, approved_by = %approved_by, "distribution batch approved");
                Ok(batch)
            }
            Err(BatchError::Domain(DomainError::Conflict(_))) => {
                warn!(batch_id = %batch_id, "approval refused, batch already completed");
                Err(BatchError::BatchAlreadyCompleted(batch_id))
            }
            Err(BatchError::Domain(DomainError::NotFound)) => Err(BatchError::BatchNotFound(batch_id)),
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, batch_id: BatchId) -> Result<DistributionBatch, BatchError> {
        self.batches
            .get(batch_id)?
            .ok_or(BatchError::BatchNotFound(batch_id))
    }

    pub fn list(&self) -> Result<Vec<DistributionBatch>, BatchError> {
        self.batches.list()
    }

    /// The batch plus its match lines in batch order.
    pub fn detail(&self, batch_id: BatchId) -> Result<BatchDetail, BatchError> {
        let batch = self.get(batch_id)?;
        let records = self.matches.get_many(batch.match_ids())?;

        let mut lines = Vec::with_capacity(records.len());
        for record in records {
            lines.push(self.resolve(record)?);
        }

        Ok(BatchDetail { batch, lines })
    }

    pub fn history(&self, batch_id: BatchId) -> Result<Vec<BatchEnvelope>, BatchError> {
        self.batches.history(batch_id)
    }

    fn resolve(&self, record: MatchRecord) -> Result<BatchLine, BatchError> {
        let requester = self
            .needs
            .get(record.need_id())
            .map_err(|e| BatchError::Storage(e.to_string()))?
            .map(|need| need.requester().to_string());
        let item_name = self
            .inventory
            .get(record.item_id())
            .map_err(|e| BatchError::Storage(e.to_string()))?
            .map(|item| item.name().to_string());

        Ok(BatchLine {
            match_id: record.id_typed(),
            need_id: record.need_id(),
            requester,
            item_id: record.item_id(),
            item_name,
            requested_quantity: record.requested_quantity(),
            allocated_quantity: record.allocated_quantity(),
            outcome: record.outcome(),
            allocated_at: record.allocated_at(),
            allocated_by: record.allocated_by(),
            note: record.note().to_string(),
        })
    }
}
