//! Need registry: material requests and their review/fulfilment lifecycle.
//!
//! Only `approved` needs are eligible for matching. The registry is the sole
//! writer of need status; the allocation executor holds quantity with
//! [`NeedRegistry::hold`] before taking stock and reports fulfilment through
//! [`NeedRegistry::refresh_status`].

pub mod need;
pub mod registry;

pub use need::{Hold, NeedId, NeedStatus, PriorityClass, SupplyNeed, Urgency};
pub use registry::{InMemoryNeedRegistry, NeedRegistry, NeedRegistryError};
