use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use aidflow_core::{Aggregate, AggregateRoot, DomainError, OperatorId};
use aidflow_events::Event;

use crate::record::{MatchId, MatchRecord};

aidflow_core::typed_id!(
    /// Distribution batch identifier.
    BatchId
);

/// Batch approval lifecycle. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Completed => "completed",
        }
    }
}

/// Aggregate root: DistributionBatch.
///
/// Groups the match records of one allocation run. The aggregates
/// (`case_count`, `total_supply_items`) are computed from the records when the
/// batch is created and never edited afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBatch {
    id: BatchId,
    distribution_date: Option<NaiveDate>,
    case_count: usize,
    total_supply_items: u64,
    status: BatchStatus,
    created_by: Option<OperatorId>,
    created_at: Option<DateTime<Utc>>,
    approved_by: Option<OperatorId>,
    approved_at: Option<DateTime<Utc>>,
    notes: String,
    match_ids: Vec<MatchId>,
    version: u64,
    created: bool,
}

impl DistributionBatch {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: BatchId) -> Self {
        Self {
            id,
            distribution_date: None,
            case_count: 0,
            total_supply_items: 0,
            status: BatchStatus::Pending,
            created_by: None,
            created_at: None,
            approved_by: None,
            approved_at: None,
            notes: String::new(),
            match_ids: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn distribution_date(&self) -> Option<NaiveDate> {
        self.distribution_date
    }

    pub fn case_count(&self) -> usize {
        self.case_count
    }

    pub fn total_supply_items(&self) -> u64 {
        self.total_supply_items
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn created_by(&self) -> Option<OperatorId> {
        self.created_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn approved_by(&self) -> Option<OperatorId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn match_ids(&self) -> &[MatchId] {
        &self.match_ids
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for DistributionBatch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub batch_id: BatchId,
    pub matches: Vec<MatchRecord>,
    pub distribution_date: NaiveDate,
    pub notes: String,
    pub created_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveBatch {
    pub batch_id: BatchId,
    pub approved_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchCommand {
    CreateBatch(CreateBatch),
    ApproveBatch(ApproveBatch),
}

/// Event: BatchCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreated {
    pub batch_id: BatchId,
    pub match_ids: Vec<MatchId>,
    pub case_count: usize,
    pub total_supply_items: u64,
    pub distribution_date: NaiveDate,
    pub notes: String,
    pub created_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchApproved {
    pub batch_id: BatchId,
    pub approved_by: OperatorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchEvent {
    BatchCreated(BatchCreated),
    BatchApproved(BatchApproved),
}

impl Event for BatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BatchEvent::BatchCreated(_) => "distribution.batch.created",
            BatchEvent::BatchApproved(_) => "distribution.batch.approved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BatchEvent::BatchCreated(e) => e.occurred_at,
            BatchEvent::BatchApproved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DistributionBatch {
    type Command = BatchCommand;
    type Event = BatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BatchEvent::BatchCreated(e) => {
                self.id = e.batch_id;
                self.distribution_date = Some(e.distribution_date);
                self.case_count = e.case_count;
                self.total_supply_items = e.total_supply_items;
                self.status = BatchStatus::Pending;
                self.created_by = Some(e.created_by);
                self.created_at = Some(e.occurred_at);
                self.notes = e.notes.clone();
                self.match_ids = e.match_ids.clone();
                self.created = true;
            }
            BatchEvent::BatchApproved(e) => {
                self.status = BatchStatus::Completed;
                self.approved_by = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BatchCommand::CreateBatch(cmd) => self.handle_create(cmd),
            BatchCommand::ApproveBatch(cmd) => self.handle_approve(cmd),
        }
    }
}

impl DistributionBatch {
    fn ensure_batch_id(&self, batch_id: BatchId) -> Result<(), DomainError> {
        if self.id != batch_id {
            return Err(DomainError::invariant("batch_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBatch) -> Result<Vec<BatchEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("batch already exists"));
        }
        self.ensure_batch_id(cmd.batch_id)?;

        if cmd.matches.is_empty() {
            return Err(DomainError::validation(
                "a batch needs at least one match record",
            ));
        }

        let mut match_ids = HashSet::with_capacity(cmd.matches.len());
        let mut needs = HashSet::new();
        let mut total_supply_items = 0u64;
        for record in &cmd.matches {
            if !match_ids.insert(record.id_typed()) {
                return Err(DomainError::validation(format!(
                    "match record {} listed twice",
                    record.id_typed()
                )));
            }
            needs.insert(record.need_id());
            total_supply_items = total_supply_items
                .checked_add(record.allocated_quantity())
                .ok_or_else(|| DomainError::invariant("batch total supply items overflows u64"))?;
        }

        Ok(vec![BatchEvent::BatchCreated(BatchCreated {
            batch_id: cmd.batch_id,
            match_ids: cmd.matches.iter().map(MatchRecord::id_typed).collect(),
            case_count: needs.len(),
            total_supply_items,
            distribution_date: cmd.distribution_date,
            notes: cmd.notes.clone(),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveBatch) -> Result<Vec<BatchEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_batch_id(cmd.batch_id)?;

        match self.status {
            BatchStatus::Pending => Ok(vec![BatchEvent::BatchApproved(BatchApproved {
                batch_id: cmd.batch_id,
                approved_by: cmd.approved_by,
                occurred_at: cmd.occurred_at,
            })]),
            BatchStatus::Completed => Err(DomainError::conflict(format!(
                "batch {} is already completed",
                self.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidflow_inventory::ItemId;
    use aidflow_needs::NeedId;

    fn record(need_id: NeedId, requested: u64, allocated: u64) -> MatchRecord {
        MatchRecord::new(
            need_id,
            ItemId::generate(),
            requested,
            allocated,
            OperatorId::new(),
            "",
            Utc::now(),
        )
        .unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn create(batch: &mut DistributionBatch, matches: Vec<MatchRecord>) -> Result<Vec<BatchEvent>, DomainError> {
        batch.execute(&BatchCommand::CreateBatch(CreateBatch {
            batch_id: batch.id_typed(),
            matches,
            distribution_date: date(),
            notes: "north district".to_string(),
            created_by: OperatorId::new(),
            occurred_at: Utc::now(),
        }))
    }

    fn approve(batch: &mut DistributionBatch, by: OperatorId) -> Result<Vec<BatchEvent>, DomainError> {
        batch.execute(&BatchCommand::ApproveBatch(ApproveBatch {
            batch_id: batch.id_typed(),
            approved_by: by,
            occurred_at: Utc::now(),
        }))
    }

    #[test]
    fn create_computes_aggregates_from_records() {
        let mut batch = DistributionBatch::empty(BatchId::generate());
        let shared = NeedId::generate();
        let events = create(
            &mut batch,
            vec![record(shared, 6, 6), record(NeedId::generate(), 8, 4), record(shared, 3, 1)],
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "distribution.batch.created");
        assert_eq!(batch.status(), BatchStatus::Pending);
        assert_eq!(batch.case_count(), 2);
        assert_eq!(batch.total_supply_items(), 11);
        assert_eq!(batch.match_ids().len(), 3);
        assert_eq!(batch.distribution_date(), Some(date()));
        assert_eq!(batch.version(), 1);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let mut batch = DistributionBatch::empty(BatchId::generate());
        let err = create(&mut batch, vec![]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(!batch.is_created());
    }

    #[test]
    fn overflowing_supply_total_is_rejected() {
        let mut batch = DistributionBatch::empty(BatchId::generate());
        let huge = || record(NeedId::generate(), u64::MAX, u64::MAX);
        let err = create(&mut batch, vec![huge(), huge()]).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(!batch.is_created());
    }

    #[test]
    fn duplicate_records_are_rejected() {
        let mut batch = DistributionBatch::empty(BatchId::generate());
        let r = record(NeedId::generate(), 2, 2);
        let err = create(&mut batch, vec![r.clone(), r]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn approve_twice_is_a_conflict_and_keeps_first_approval() {
        let mut batch = DistributionBatch::empty(BatchId::generate());
        create(&mut batch, vec![record(NeedId::generate(), 1, 1)]).unwrap();

        let first = OperatorId::new();
        approve(&mut batch, first).unwrap();
        assert_eq!(batch.status(), BatchStatus::Completed);
        let approved_at = batch.approved_at();

        let err = approve(&mut batch, OperatorId::new()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(batch.approved_by(), Some(first));
        assert_eq!(batch.approved_at(), approved_at);
        assert_eq!(batch.version(), 2);
    }

    #[test]
    fn approve_before_create_is_not_found() {
        let mut batch = DistributionBatch::empty(BatchId::generate());
        assert_eq!(approve(&mut batch, OperatorId::new()).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn create_twice_is_a_conflict() {
        let mut batch = DistributionBatch::empty(BatchId::generate());
        create(&mut batch, vec![record(NeedId::generate(), 1, 1)]).unwrap();
        let err = create(&mut batch, vec![record(NeedId::generate(), 1, 1)]).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: batch aggregates equal recomputation over its records.
            #[test]
            fn aggregates_match_records(
                lines in proptest::collection::vec((0usize..5, 1u64..20, 0u64..20), 1..12)
            ) {
                let needs: Vec<NeedId> = (0..5).map(|_| NeedId::generate()).collect();
                let records: Vec<MatchRecord> = lines
                    .iter()
                    .map(|(n, allocated, extra)| record(needs[*n], allocated + extra, *allocated))
                    .collect();

                let mut batch = DistributionBatch::empty(BatchId::generate());
                create(&mut batch, records.clone()).unwrap();

                let total: u64 = records.iter().map(|r| r.allocated_quantity()).sum();
                let distinct: HashSet<_> = records.iter().map(|r| r.need_id()).collect();
                prop_assert_eq!(batch.total_supply_items(), total);
                prop_assert_eq!(batch.case_count(), distinct.len());
            }
        }
    }
}
