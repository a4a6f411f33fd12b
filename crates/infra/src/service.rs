//! Operator-facing distribution workflow.
//!
//! ```text
//! run_automatic_distribution   approved needs + inventory snapshot → proposal (no writes)
//!   ↓ operator reviews
//! confirm_distribution         executor applies the proposal, then a batch is created
//!   ↓
//! approve_batch                pending → completed
//! ```

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use aidflow_core::{DomainError, OperatorId};
use aidflow_distribution::{
    AllocationExecutor, BatchDetail, BatchEnvelope, BatchError, BatchId, BatchManager, BatchStore,
    DistributionBatch, ExecutionReport, InMemoryBatchStore, InMemoryMatchStore, MatchStore,
    Matcher, Proposal, ReportConfig, ReportError, prioritize, render_batch_report,
};
use aidflow_inventory::{InMemoryInventoryStore, InventoryError, InventorySnapshot, InventoryStore};
use aidflow_needs::{InMemoryNeedRegistry, NeedRegistry, NeedRegistryError, PriorityClass};

use crate::config::EngineConfig;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Needs(#[from] NeedRegistryError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// The stores the service runs against.
#[derive(Clone)]
pub struct Stores {
    pub inventory: Arc<dyn InventoryStore>,
    pub needs: Arc<dyn NeedRegistry>,
    pub matches: Arc<dyn MatchStore>,
    pub batches: Arc<dyn BatchStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            inventory: InMemoryInventoryStore::arc(),
            needs: InMemoryNeedRegistry::arc(),
            matches: InMemoryMatchStore::arc(),
            batches: InMemoryBatchStore::arc(),
        }
    }
}

/// A computed, not yet applied, allocation run.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationRun {
    pub run_id: Uuid,
    pub priority: PriorityClass,
    pub computed_at: DateTime<Utc>,
    pub snapshot: InventorySnapshot,
    pub proposal: Proposal,
}

/// Result of confirming a run.
///
/// `batch` is `None` when nothing was allocated or batch creation failed; in
/// the latter case `batch_error` says why. Stock and need changes made by the
/// executor stand either way.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub execution: ExecutionReport,
    pub batch: Option<DistributionBatch>,
    pub batch_error: Option<BatchError>,
}

type Executor = AllocationExecutor<Arc<dyn InventoryStore>, Arc<dyn NeedRegistry>, Arc<dyn MatchStore>>;
type Batches = BatchManager<
    Arc<dyn BatchStore>,
    Arc<dyn MatchStore>,
    Arc<dyn NeedRegistry>,
    Arc<dyn InventoryStore>,
>;

pub struct DistributionService {
    stores: Stores,
    matcher: Matcher,
    executor: Executor,
    batches: Batches,
    report: ReportConfig,
}

impl DistributionService {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        let executor = AllocationExecutor::with_config(
            stores.inventory.clone(),
            stores.needs.clone(),
            stores.matches.clone(),
            config.executor,
        );
        let batches = BatchManager::new(
            stores.batches.clone(),
            stores.matches.clone(),
            stores.needs.clone(),
            stores.inventory.clone(),
        );
        Self {
            matcher: Matcher::new(config.matching),
            executor,
            batches,
            report: config.report,
            stores,
        }
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Stores::in_memory(), config)
    }

    pub fn inventory(&self) -> &Arc<dyn InventoryStore> {
        &self.stores.inventory
    }

    pub fn needs(&self) -> &Arc<dyn NeedRegistry> {
        &self.stores.needs
    }

    pub fn matches(&self) -> &Arc<dyn MatchStore> {
        &self.stores.matches
    }

    /// Compute a proposal for every approved need of `priority`.
    ///
    /// Emergency needs are ordered by urgency first. Nothing is written.
    #[instrument(skip(self), err)]
    pub fn run_automatic_distribution(&self, priority: PriorityClass) -> Result<AllocationRun, ServiceError> {
        let mut needs = self.stores.needs.list_approved(priority)?;
        if priority == PriorityClass::Emergency {
            needs = prioritize(needs);
        }
        let snapshot = self.stores.inventory.snapshot()?;
        let proposal = self.matcher.propose(&needs, &snapshot);

        let tally = proposal.tally();
        let total_allocated = proposal.total_allocated()?;
        info!(
            needs = proposal.len(),
            fully_matched = tally.fully_matched,
            partially_matched = tally.partially_matched,
            not_matched = tally.not_matched,
            total_allocated,
            "allocation run proposed"
        );

        Ok(AllocationRun {
            run_id: Uuid::now_v7(),
            priority,
            computed_at: Utc::now(),
            snapshot,
            proposal,
        })
    }

    /// Apply a reviewed run and package its match records into a batch.
    #[instrument(skip_all, fields(run_id = %run.run_id, operator = %operator))]
    pub fn confirm_distribution(
        &self,
        run: &AllocationRun,
        operator: OperatorId,
        distribution_date: NaiveDate,
        notes: &str,
    ) -> Confirmation {
        let execution = self.executor.execute(&run.proposal, operator, None);

        if execution.match_ids.is_empty() {
            info!("nothing allocated, no batch created");
            return Confirmation {
                execution,
                batch: None,
                batch_error: None,
            };
        }

        match self
            .batches
            .create(&execution.match_ids, distribution_date, notes, operator)
        {
            Ok(batch) => Confirmation {
                execution,
                batch: Some(batch),
                batch_error: None,
            },
            Err(e) => {
                warn!(error = %e, match_records = execution.match_ids.len(), "batch creation failed after allocation");
                Confirmation {
                    execution,
                    batch: None,
                    batch_error: Some(e),
                }
            }
        }
    }

    #[instrument(skip_all, fields(batch_id = %batch_id, operator = %operator), err)]
    pub fn approve_batch(&self, batch_id: BatchId, operator: OperatorId) -> Result<DistributionBatch, ServiceError> {
        Ok(self.batches.approve(batch_id, operator)?)
    }

    /// Newest first.
    pub fn list_batches(&self) -> Result<Vec<DistributionBatch>, ServiceError> {
        Ok(self.batches.list()?)
    }

    pub fn batch_detail(&self, batch_id: BatchId) -> Result<BatchDetail, ServiceError> {
        Ok(self.batches.detail(batch_id)?)
    }

    pub fn batch_history(&self, batch_id: BatchId) -> Result<Vec<BatchEnvelope>, ServiceError> {
        Ok(self.batches.history(batch_id)?)
    }

    #[instrument(skip_all, fields(batch_id = %batch_id), err)]
    pub fn download_batch_report(&self, batch_id: BatchId) -> Result<String, ServiceError> {
        let detail = self.batches.detail(batch_id)?;
        Ok(render_batch_report(&detail, &self.report)?)
    }
}
