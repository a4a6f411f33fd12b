use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aidflow_core::{DomainError, DomainResult};
use aidflow_inventory::ItemId;

aidflow_core::typed_id!(
    /// Supply need identifier.
    NeedId
);

/// Need lifecycle.
///
/// `Pending → Approved → Completed`, or `Pending → Rejected`. An approved need
/// that was only partly served stays `Approved` and is matched again on the
/// next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl NeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NeedStatus::Pending => "pending",
            NeedStatus::Approved => "approved",
            NeedStatus::Rejected => "rejected",
            NeedStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NeedStatus::Rejected | NeedStatus::Completed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: NeedStatus) -> bool {
        match (self, next) {
            (NeedStatus::Pending, NeedStatus::Approved | NeedStatus::Rejected) => true,
            (NeedStatus::Approved, NeedStatus::Approved | NeedStatus::Completed) => true,
            (NeedStatus::Pending, NeedStatus::Pending | NeedStatus::Completed) => false,
            (NeedStatus::Approved, NeedStatus::Pending | NeedStatus::Rejected) => false,
            (NeedStatus::Rejected | NeedStatus::Completed, _) => false,
        }
    }
}

impl core::fmt::Display for NeedStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regular operations supply vs. emergency relief.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Regular,
    Emergency,
}

/// Urgency tier of an emergency need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    /// Higher is served first.
    pub fn rank(&self) -> u8 {
        match self {
            Urgency::High => 3,
            Urgency::Medium => 2,
            Urgency::Low => 1,
        }
    }
}

/// Quantity held on a need by one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Outstanding just before the hold was taken.
    pub outstanding: u64,
    pub held: u64,
}

/// A request for a quantity of a named supply item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyNeed {
    id: NeedId,
    item_name: String,
    category: Option<String>,
    /// Explicit binding to a stocked item, when intake recorded one.
    supply_id: Option<ItemId>,
    requested_quantity: u64,
    fulfilled_quantity: u64,
    /// Held for allocations that have not been recorded yet.
    #[serde(default)]
    held_quantity: u64,
    requester: String,
    priority: PriorityClass,
    urgency: Option<Urgency>,
    status: NeedStatus,
    created_at: DateTime<Utc>,
}

impl SupplyNeed {
    pub fn new(
        id: NeedId,
        item_name: impl Into<String>,
        requested_quantity: u64,
        requester: impl Into<String>,
        priority: PriorityClass,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let item_name = item_name.into();
        if item_name.trim().is_empty() {
            return Err(DomainError::validation("requested item name cannot be empty"));
        }
        if requested_quantity == 0 {
            return Err(DomainError::validation("requested quantity must be positive"));
        }
        Ok(Self {
            id,
            item_name,
            category: None,
            supply_id: None,
            requested_quantity,
            fulfilled_quantity: 0,
            held_quantity: 0,
            requester: requester.into(),
            priority,
            urgency: None,
            status: NeedStatus::Pending,
            created_at,
        })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_supply_id(mut self, supply_id: ItemId) -> Self {
        self.supply_id = Some(supply_id);
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    pub fn id_typed(&self) -> NeedId {
        self.id
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn supply_id(&self) -> Option<ItemId> {
        self.supply_id
    }

    pub fn requested_quantity(&self) -> u64 {
        self.requested_quantity
    }

    pub fn fulfilled_quantity(&self) -> u64 {
        self.fulfilled_quantity
    }

    pub fn held_quantity(&self) -> u64 {
        self.held_quantity
    }

    /// Quantity still to be served across future runs, net of holds.
    pub fn outstanding_quantity(&self) -> u64 {
        self.requested_quantity - self.fulfilled_quantity - self.held_quantity
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn priority(&self) -> PriorityClass {
        self.priority
    }

    pub fn urgency(&self) -> Option<Urgency> {
        self.urgency
    }

    pub fn status(&self) -> NeedStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Only approved needs with something left to serve are matched.
    pub fn is_eligible(&self) -> bool {
        self.status == NeedStatus::Approved && self.outstanding_quantity() > 0
    }

    fn transition(&mut self, next: NeedStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::conflict(format!(
                "need {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Review action: accept the request for matching.
    pub fn approve(&mut self) -> DomainResult<()> {
        if self.status != NeedStatus::Pending {
            return Err(DomainError::conflict(format!(
                "only pending needs can be approved (need {} is {})",
                self.id, self.status
            )));
        }
        self.transition(NeedStatus::Approved)
    }

    /// Review action: decline the request. Terminal.
    pub fn reject(&mut self) -> DomainResult<()> {
        self.transition(NeedStatus::Rejected)
    }

    /// Hold up to `quantity` of the outstanding amount for an allocation in
    /// flight. Less is held when the need has less left. Held units are not
    /// offered to any other run.
    pub fn hold(&mut self, quantity: u64) -> DomainResult<Hold> {
        if !self.is_eligible() {
            return Err(DomainError::conflict(format!(
                "need {} is {} with {} outstanding and cannot be served",
                self.id,
                self.status,
                self.outstanding_quantity()
            )));
        }
        let outstanding = self.outstanding_quantity();
        let held = quantity.min(outstanding);
        self.held_quantity += held;
        Ok(Hold { outstanding, held })
    }

    /// Give back held units that were not allocated.
    pub fn release(&mut self, quantity: u64) -> DomainResult<()> {
        self.held_quantity = self.held_quantity.checked_sub(quantity).ok_or_else(|| {
            DomainError::invariant(format!(
                "need {} releases {} but holds only {}",
                self.id, quantity, self.held_quantity
            ))
        })?;
        Ok(())
    }

    /// Record `quantity` units served by an allocation run and derive the new
    /// status: `Completed` once everything requested is served, `Approved`
    /// otherwise.
    ///
    /// Units are drawn from the hold first; anything beyond it must still be
    /// outstanding.
    pub fn record_fulfilment(&mut self, quantity: u64) -> DomainResult<NeedStatus> {
        if self.status != NeedStatus::Approved {
            return Err(DomainError::conflict(format!(
                "only approved needs can be fulfilled (need {} is {})",
                self.id, self.status
            )));
        }
        let from_hold = quantity.min(self.held_quantity);
        if quantity - from_hold > self.outstanding_quantity() {
            return Err(DomainError::invariant(format!(
                "need {} was allocated {} but only {} is outstanding",
                self.id,
                quantity,
                self.outstanding_quantity() + self.held_quantity
            )));
        }
        let fulfilled = self.fulfilled_quantity + quantity;
        let next = if fulfilled == self.requested_quantity {
            NeedStatus::Completed
        } else {
            NeedStatus::Approved
        };
        self.transition(next)?;
        self.held_quantity -= from_hold;
        self.fulfilled_quantity = fulfilled;
        Ok(next)
    }

    /// Close an approved need without serving the rest.
    ///
    /// Refused while an allocation holds part of it.
    pub fn close(&mut self) -> DomainResult<()> {
        if self.held_quantity > 0 {
            return Err(DomainError::conflict(format!(
                "need {} has {} held by an allocation in flight",
                self.id, self.held_quantity
            )));
        }
        self.transition(NeedStatus::Completed)
    }
}
