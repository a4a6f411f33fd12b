//! Shared building blocks for the distribution engine.
//!
//! This crate contains **pure domain** primitives (no storage, no IO).

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, OperatorId};
