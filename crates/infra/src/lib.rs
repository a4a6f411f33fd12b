//! Application layer: wires the in-memory stores, matcher, executor and batch
//! manager into the operator-facing distribution workflow.

pub mod config;
pub mod service;


pub use config::EngineConfig;
pub use service::{AllocationRun, Confirmation, DistributionService, ServiceError, Stores};
