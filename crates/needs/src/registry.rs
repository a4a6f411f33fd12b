//! Need registry abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::debug;

use aidflow_core::DomainError;

use crate::need::{Hold, NeedId, NeedStatus, PriorityClass, SupplyNeed};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NeedRegistryError {
    #[error("supply need not found: {0}")]
    NeedNotFound(NeedId),

    #[error("supply need already exists: {0}")]
    AlreadyExists(NeedId),

    /// The requested status change is not allowed from the current status.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Need registry abstraction.
///
/// Status changes are atomic per need; changes to different needs do not
/// serialize against each other.
pub trait NeedRegistry: Send + Sync {
    /// Register a new need (request intake).
    fn insert(&self, need: SupplyNeed) -> Result<NeedId, NeedRegistryError>;

    fn get(&self, need_id: NeedId) -> Result<Option<SupplyNeed>, NeedRegistryError>;

    /// All needs in registration order.
    fn list(&self) -> Result<Vec<SupplyNeed>, NeedRegistryError>;

    /// Approved needs of one priority class that still have quantity
    /// outstanding, in registration order.
    fn list_approved(&self, priority: PriorityClass) -> Result<Vec<SupplyNeed>, NeedRegistryError>;

    /// Review action: `pending → approved`.
    fn approve(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError>;

    /// Review action: `pending → rejected`.
    fn reject(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError>;

    /// Close an approved need without serving the rest: `approved → completed`.
    fn close(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError>;

    /// Hold up to `quantity` outstanding units for an allocation in flight.
    fn hold(&self, need_id: NeedId, quantity: u64) -> Result<Hold, NeedRegistryError>;

    /// Return held units that were not allocated.
    fn release(&self, need_id: NeedId, quantity: u64) -> Result<(), NeedRegistryError>;

    /// Record what an allocation run actually served and return the new status.
    fn refresh_status(&self, need_id: NeedId, allocated: u64) -> Result<NeedStatus, NeedRegistryError>;
}

impl<S> NeedRegistry for Arc<S>
where
    S: NeedRegistry + ?Sized,
{
    fn insert(&self, need: SupplyNeed) -> Result<NeedId, NeedRegistryError> {
        (**self).insert(need)
    }

    fn get(&self, need_id: NeedId) -> Result<Option<SupplyNeed>, NeedRegistryError> {
        (**self).get(need_id)
    }

    fn list(&self) -> Result<Vec<SupplyNeed>, NeedRegistryError> {
        (**self).list()
    }

    fn list_approved(&self, priority: PriorityClass) -> Result<Vec<SupplyNeed>, NeedRegistryError> {
        (**self).list_approved(priority)
    }

    fn approve(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError> {
        (**self).approve(need_id)
    }

    fn reject(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError> {
        (**self).reject(need_id)
    }

    fn close(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError> {
        (**self).close(need_id)
    }

    fn hold(&self, need_id: NeedId, quantity: u64) -> Result<Hold, NeedRegistryError> {
        (**self).hold(need_id, quantity)
    }

    fn release(&self, need_id: NeedId, quantity: u64) -> Result<(), NeedRegistryError> {
        (**self).release(need_id, quantity)
    }

    fn refresh_status(&self, need_id: NeedId, allocated: u64) -> Result<NeedStatus, NeedRegistryError> {
        (**self).refresh_status(need_id, allocated)
    }
}

type NeedCell = Arc<Mutex<SupplyNeed>>;

#[derive(Debug, Default)]
struct Ledger {
    order: Vec<NeedId>,
    needs: HashMap<NeedId, NeedCell>,
}

/// In-memory need registry for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNeedRegistry {
    ledger: RwLock<Ledger>,
}

fn poisoned<T>(_: T) -> NeedRegistryError {
    NeedRegistryError::Storage("need registry lock poisoned".to_string())
}

impl InMemoryNeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn cell(&self, need_id: NeedId) -> Result<NeedCell, NeedRegistryError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        ledger
            .needs
            .get(&need_id)
            .cloned()
            .ok_or(NeedRegistryError::NeedNotFound(need_id))
    }

    fn collect(&self, keep: impl Fn(&SupplyNeed) -> bool) -> Result<Vec<SupplyNeed>, NeedRegistryError> {
        let cells: Vec<NeedCell> = {
            let ledger = self.ledger.read().map_err(poisoned)?;
            ledger
                .order
                .iter()
                .filter_map(|id| ledger.needs.get(id).cloned())
                .collect()
        };

        let mut out = Vec::new();
        for cell in cells {
            let need = cell.lock().map_err(poisoned)?;
            if keep(&*need) {
                out.push(need.clone());
            }
        }
        Ok(out)
    }

    fn mutate<T>(
        &self,
        need_id: NeedId,
        f: impl FnOnce(&mut SupplyNeed) -> Result<T, DomainError>,
    ) -> Result<T, NeedRegistryError> {
        let cell = self.cell(need_id)?;
        let mut need = cell.lock().map_err(poisoned)?;
        // Work on a copy so a rejected transition leaves the stored need untouched.
        let mut draft = need.clone();
        let out = f(&mut draft)?;
        *need = draft;
        Ok(out)
    }
}

impl NeedRegistry for InMemoryNeedRegistry {
    fn insert(&self, need: SupplyNeed) -> Result<NeedId, NeedRegistryError> {
        let mut ledger = self.ledger.write().map_err(poisoned)?;
        let id = need.id_typed();
        if ledger.needs.contains_key(&id) {
            return Err(NeedRegistryError::AlreadyExists(id));
        }
        ledger.order.push(id);
        ledger.needs.insert(id, Arc::new(Mutex::new(need)));
        Ok(id)
    }

    fn get(&self, need_id: NeedId) -> Result<Option<SupplyNeed>, NeedRegistryError> {
        let cell = match self.cell(need_id) {
            Ok(cell) => cell,
            Err(NeedRegistryError::NeedNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let need = cell.lock().map_err(poisoned)?;
        Ok(Some(need.clone()))
    }

    fn list(&self) -> Result<Vec<SupplyNeed>, NeedRegistryError> {
        self.collect(|_| true)
    }

    fn list_approved(&self, priority: PriorityClass) -> Result<Vec<SupplyNeed>, NeedRegistryError> {
        self.collect(|n| n.priority() == priority && n.is_eligible())
    }

    fn approve(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError> {
        self.mutate(need_id, |n| {
            n.approve()?;
            Ok(n.clone())
        })
    }

    fn reject(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError> {
        self.mutate(need_id, |n| {
            n.reject()?;
            Ok(n.clone())
        })
    }

    fn close(&self, need_id: NeedId) -> Result<SupplyNeed, NeedRegistryError> {
        self.mutate(need_id, |n| {
            n.close()?;
            Ok(n.clone())
        })
    }

    fn hold(&self, need_id: NeedId, quantity: u64) -> Result<Hold, NeedRegistryError> {
        let hold = self.mutate(need_id, |n| n.hold(quantity))?;
        debug!(need_id = %need_id, wanted = quantity, held = hold.held, "need quantity held");
        Ok(hold)
    }

    fn release(&self, need_id: NeedId, quantity: u64) -> Result<(), NeedRegistryError> {
        self.mutate(need_id, |n| n.release(quantity))
    }

    fn refresh_status(&self, need_id: NeedId, allocated: u64) -> Result<NeedStatus, NeedRegistryError> {
        let status = self.mutate(need_id, |n| n.record_fulfilment(allocated))?;
        debug!(need_id = %need_id, allocated, status = %status, "need status refreshed");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn register(registry: &InMemoryNeedRegistry, item: &str, qty: u64, priority: PriorityClass) -> NeedId {
        let need = SupplyNeed::new(NeedId::generate(), item, qty, "Case 1", priority, Utc::now()).unwrap();
        registry.insert(need).unwrap()
    }

    #[test]
    fn list_approved_filters_by_status_and_class() {
        let registry = InMemoryNeedRegistry::new();
        let a = register(&registry, "Rice", 5, PriorityClass::Regular);
        let _pending = register(&registry, "Beans", 5, PriorityClass::Regular);
        let c = register(&registry, "Tent", 1, PriorityClass::Emergency);
        let d = register(&registry, "Soap", 2, PriorityClass::Regular);

        registry.approve(a).unwrap();
        registry.approve(c).unwrap();
        registry.approve(d).unwrap();

        let regular: Vec<_> = registry
            .list_approved(PriorityClass::Regular)
            .unwrap()
            .iter()
            .map(|n| n.id_typed())
            .collect();
        assert_eq!(regular, vec![a, d]);

        let emergency = registry.list_approved(PriorityClass::Emergency).unwrap();
        assert_eq!(emergency.len(), 1);
        assert_eq!(emergency[0].id_typed(), c);
    }

    #[test]
    fn completed_needs_drop_out_of_approved_list() {
        let registry = InMemoryNeedRegistry::new();
        let a = register(&registry, "Rice", 5, PriorityClass::Regular);
        registry.approve(a).unwrap();

        assert_eq!(registry.refresh_status(a, 5).unwrap(), NeedStatus::Completed);
        assert!(registry.list_approved(PriorityClass::Regular).unwrap().is_empty());
    }

    #[test]
    fn failed_refresh_leaves_need_unchanged() {
        let registry = InMemoryNeedRegistry::new();
        let a = register(&registry, "Rice", 5, PriorityClass::Regular);

        // Still pending: fulfilment is not allowed.
        let err = registry.refresh_status(a, 2).unwrap_err();
        assert!(matches!(err, NeedRegistryError::Domain(DomainError::Conflict(_))));

        let stored = registry.get(a).unwrap().unwrap();
        assert_eq!(stored.status(), NeedStatus::Pending);
        assert_eq!(stored.fulfilled_quantity(), 0);
    }

    #[test]
    fn unknown_need_is_not_found() {
        let registry = InMemoryNeedRegistry::new();
        let missing = NeedId::generate();
        assert_eq!(
            registry.refresh_status(missing, 1).unwrap_err(),
            NeedRegistryError::NeedNotFound(missing)
        );
        assert!(registry.get(missing).unwrap().is_none());
    }

    #[test]
    fn close_completes_an_approved_need() {
        let registry = InMemoryNeedRegistry::new();
        let a = register(&registry, "Rice", 5, PriorityClass::Regular);
        registry.approve(a).unwrap();
        registry.refresh_status(a, 2).unwrap();

        let closed = registry.close(a).unwrap();
        assert_eq!(closed.status(), NeedStatus::Completed);
        assert_eq!(closed.fulfilled_quantity(), 2);
        assert!(registry.list_approved(PriorityClass::Regular).unwrap().is_empty());
    }

    #[test]
    fn close_waits_for_held_units() {
        let registry = InMemoryNeedRegistry::new();
        let a = register(&registry, "Rice", 5, PriorityClass::Regular);
        registry.approve(a).unwrap();
        assert_eq!(registry.hold(a, 3).unwrap().held, 3);

        assert!(matches!(
            registry.close(a).unwrap_err(),
            NeedRegistryError::Domain(DomainError::Conflict(_))
        ));
        registry.release(a, 3).unwrap();
        assert_eq!(registry.close(a).unwrap().status(), NeedStatus::Completed);
    }

    #[test]
    fn competing_holds_never_exceed_outstanding() {
        let registry = InMemoryNeedRegistry::arc();
        let a = register(&registry, "Rice", 6, PriorityClass::Regular);
        registry.approve(a).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.hold(a, 6).map_or(0, |h| h.held))
            })
            .collect();
        let held: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(held, 6);
        assert_eq!(registry.get(a).unwrap().unwrap().outstanding_quantity(), 0);
    }

    #[test]
    fn reject_is_recorded() {
        let registry = InMemoryNeedRegistry::new();
        let a = register(&registry, "Rice", 5, PriorityClass::Regular);
        let rejected = registry.reject(a).unwrap();
        assert_eq!(rejected.status(), NeedStatus::Rejected);
        assert!(registry.approve(a).is_err());
        assert_eq!(registry.list().unwrap().len(), 1);
    }
}
