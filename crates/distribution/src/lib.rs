//! Supply matching and distribution batching.
//!
//! ## Flow
//!
//! 1. [`Matcher`] computes a [`Proposal`] from approved needs and an inventory
//!    snapshot (pure, no side effects).
//! 2. [`AllocationExecutor`] applies the proposal against the live stores:
//!    stock decrements, match records, need status refresh. Best-effort; every
//!    failed step is reported in the [`ExecutionReport`].
//! 3. [`BatchManager`] packages the created match records into a
//!    [`DistributionBatch`] and drives its `pending → completed` approval.

pub mod batch;
pub mod executor;
pub mod manager;
pub mod matcher;
pub mod outcome;
pub mod record;
pub mod report;

pub use batch::{
    ApproveBatch, BatchApproved, BatchCommand, BatchCreated, BatchEvent, BatchId, BatchStatus,
    CreateBatch, DistributionBatch,
};
pub use executor::{
    AllocationExecutor, AllocationStep, ExecutedAllocation, ExecutionReport, ExecutorConfig,
    StepFailure,
};
pub use manager::{
    BatchDetail, BatchEnvelope, BatchError, BatchLine, BatchManager, BatchStore, InMemoryBatchStore,
};
pub use matcher::{Matcher, MatchingPolicy, Proposal, ProposedAllocation, prioritize};
pub use outcome::{MatchOutcome, OutcomeTally};
pub use record::{InMemoryMatchStore, MatchId, MatchRecord, MatchStore, MatchStoreError};
pub use report::{ReportConfig, ReportError, render_batch_report};
