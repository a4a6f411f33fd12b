//! Applies a matcher proposal to the live stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use aidflow_core::{DomainResult, OperatorId};
use aidflow_inventory::{InventoryError, InventoryStore, ItemId};
use aidflow_needs::{NeedId, NeedRegistry, NeedStatus};

use crate::matcher::{Proposal, ProposedAllocation, checked_total};
use crate::outcome::{MatchOutcome, OutcomeTally};
use crate::record::{MatchId, MatchRecord, MatchStore};

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How many times a decrement is retried with a clamped quantity after
    /// stock changed under the run.
    pub max_clamp_retries: u32,
    /// Note written on match records when the operator gives none.
    pub default_note: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_clamp_retries: 3,
            default_note: "automatic distribution".to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_clamp_retries(mut self, retries: u32) -> Self {
        self.max_clamp_retries = retries;
        self
    }

    pub fn with_default_note(mut self, note: impl Into<String>) -> Self {
        self.default_note = note.into();
        self
    }
}

/// Which part of processing one need failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStep {
    NeedHold,
    StockUpdate,
    MatchRecord,
    StockRollback,
    NeedRelease,
    NeedStatus,
}

/// One failed step; the run carried on after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub need_id: NeedId,
    pub step: AllocationStep,
    pub message: String,
}

/// What actually happened to one need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedAllocation {
    pub need_id: NeedId,
    pub item_id: Option<ItemId>,
    pub requested_quantity: u64,
    pub proposed_quantity: u64,
    pub allocated_quantity: u64,
    pub outcome: MatchOutcome,
    pub match_id: Option<MatchId>,
    /// `None` when the status refresh failed.
    pub need_status: Option<NeedStatus>,
}

/// Aggregate result of one executor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub executed_by: OperatorId,
    pub executed_at: DateTime<Utc>,
    pub allocations: Vec<ExecutedAllocation>,
    /// Match records written, in processing order.
    pub match_ids: Vec<MatchId>,
    pub match_records_created: usize,
    pub stock_updates_applied: usize,
    pub need_statuses_updated: usize,
    pub failures: Vec<StepFailure>,
}

impl ExecutionReport {
    fn new(executed_by: OperatorId) -> Self {
        Self {
            executed_by,
            executed_at: Utc::now(),
            allocations: Vec::new(),
            match_ids: Vec::new(),
            match_records_created: 0,
            stock_updates_applied: 0,
            need_statuses_updated: 0,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, need_id: NeedId, step: AllocationStep, message: impl Into<String>) {
        let message = message.into();
        warn!(need_id = %need_id, step = ?step, error = %message, "allocation step failed");
        self.failures.push(StepFailure {
            need_id,
            step,
            message,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Outcomes as actually executed (may differ from the proposal).
    pub fn tally(&self) -> OutcomeTally {
        self.allocations.iter().map(|a| a.outcome).collect()
    }

    pub fn total_allocated(&self) -> DomainResult<u64> {
        checked_total(self.allocations.iter().map(|a| a.allocated_quantity))
    }
}

/// Allocation executor.
///
/// The only writer of stock levels and match records. Needs are processed
/// sequentially; each need's steps are independent of the others, so one
/// failure never stops the rest of the run.
pub struct AllocationExecutor<I, N, M> {
    inventory: I,
    needs: N,
    matches: M,
    config: ExecutorConfig,
}

impl<I, N, M> AllocationExecutor<I, N, M>
where
    I: InventoryStore,
    N: NeedRegistry,
    M: MatchStore,
{
    pub fn new(inventory: I, needs: N, matches: M) -> Self {
        Self::with_config(inventory, needs, matches, ExecutorConfig::default())
    }

    pub fn with_config(inventory: I, needs: N, matches: M, config: ExecutorConfig) -> Self {
        Self {
            inventory,
            needs,
            matches,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn execute(&self, proposal: &Proposal, operator: OperatorId, note: Option<&str>) -> ExecutionReport {
        let note = note.unwrap_or(&self.config.default_note);
        let mut report = ExecutionReport::new(operator);

        for entry in proposal.entries() {
            let executed = self.execute_one(entry, operator, note, &mut report);
            report.allocations.push(executed);
        }

        info!(
            operator = %operator,
            needs = report.allocations.len(),
            match_records = report.match_records_created,
            stock_updates = report.stock_updates_applied,
            need_updates = report.need_statuses_updated,
            failures = report.failures.len(),
            "allocation run executed"
        );
        report
    }

    fn execute_one(
        &self,
        entry: &ProposedAllocation,
        operator: OperatorId,
        note: &str,
        report: &mut ExecutionReport,
    ) -> ExecutedAllocation {
        let need_id = entry.need_id;
        let mut requested = entry.requested_quantity;
        let mut allocated = 0;
        let mut match_id = None;

        if let (Some(item_id), true) = (entry.item_matched, entry.allocated_quantity > 0) {
            // Hold the units on the need first so a concurrent run cannot serve
            // them too. Another run may also have served part of it already.
            let held = match self.needs.hold(need_id, entry.allocated_quantity) {
                Ok(hold) => {
                    requested = requested.min(hold.outstanding);
                    hold.held
                }
                Err(e) => {
                    report.fail(need_id, AllocationStep::NeedHold, e.to_string());
                    requested = 0;
                    0
                }
            };

            if held > 0 {
                match self.take_stock(item_id, held) {
                    Ok(taken) => allocated = taken,
                    Err(e) => report.fail(need_id, AllocationStep::StockUpdate, e.to_string()),
                }
            }

            if allocated > 0 {
                report.stock_updates_applied += 1;
                match self.write_record(need_id, item_id, requested, allocated, operator, note) {
                    Ok(id) => {
                        report.match_records_created += 1;
                        report.match_ids.push(id);
                        match_id = Some(id);
                    }
                    Err(message) => {
                        report.fail(need_id, AllocationStep::MatchRecord, message);
                        // Put the stock back: nothing records that it left.
                        if let Err(e) = self.inventory.restock(item_id, allocated) {
                            report.fail(need_id, AllocationStep::StockRollback, e.to_string());
                        }
                        allocated = 0;
                    }
                }
            }

            if held > allocated {
                if let Err(e) = self.needs.release(need_id, held - allocated) {
                    report.fail(need_id, AllocationStep::NeedRelease, e.to_string());
                }
            }
        }

        let need_status = match self.needs.refresh_status(need_id, allocated) {
            Ok(status) => {
                report.need_statuses_updated += 1;
                Some(status)
            }
            Err(e) => {
                report.fail(need_id, AllocationStep::NeedStatus, e.to_string());
                None
            }
        };

        ExecutedAllocation {
            need_id,
            item_id: entry.item_matched,
            requested_quantity: requested,
            proposed_quantity: entry.allocated_quantity,
            allocated_quantity: allocated,
            outcome: MatchOutcome::classify(requested, allocated),
            match_id,
            need_status,
        }
    }

    /// Compare-and-decrement against live stock, clamping to what is left when
    /// the snapshot was stale. Returns the quantity actually taken.
    fn take_stock(&self, item_id: ItemId, wanted: u64) -> Result<u64, InventoryError> {
        let mut quantity = wanted;
        let mut retries = 0;
        loop {
            match self.inventory.decrement(item_id, quantity) {
                Ok(left) => {
                    debug!(item_id = %item_id, taken = quantity, left, "stock taken");
                    return Ok(quantity);
                }
                Err(InventoryError::InsufficientStock { available, .. }) if available == 0 => {
                    warn!(item_id = %item_id, wanted, "item ran out before allocation");
                    return Ok(0);
                }
                Err(InventoryError::InsufficientStock { available, .. })
                    if retries < self.config.max_clamp_retries =>
                {
                    warn!(item_id = %item_id, wanted = quantity, available, "clamping allocation to live stock");
                    quantity = available.min(quantity);
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_record(
        &self,
        need_id: NeedId,
        item_id: ItemId,
        requested: u64,
        allocated: u64,
        operator: OperatorId,
        note: &str,
    ) -> Result<MatchId, String> {
        let record = MatchRecord::new(need_id, item_id, requested, allocated, operator, note, Utc::now())
            .map_err(|e| e.to_string())?;
        self.matches.insert(record).map_err(|e| e.to_string())
    }
}
