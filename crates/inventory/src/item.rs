use serde::{Deserialize, Serialize};

use aidflow_core::{DomainError, DomainResult};

aidflow_core::typed_id!(
    /// Supply item identifier.
    ItemId
);

/// A stocked good.
///
/// `quantity` is unsigned, so "stock never goes negative" holds by
/// construction; [`SupplyItem::take`] refuses to underflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyItem {
    id: ItemId,
    name: String,
    unit: String,
    quantity: u64,
    /// Cost per unit in minor currency units.
    unit_cost: i64,
    location: Option<String>,
    supplier: Option<String>,
    category: Option<String>,
}

impl SupplyItem {
    pub fn new(id: ItemId, name: impl Into<String>, quantity: u64) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            unit: "unit".to_string(),
            quantity,
            unit_cost: 0,
            location: None,
            supplier: None,
            category: None,
        })
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: i64) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn unit_cost(&self) -> i64 {
        self.unit_cost
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn supplier(&self) -> Option<&str> {
        self.supplier.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Case-insensitive substring match on the display name.
    pub fn name_contains(&self, text: &str) -> bool {
        self.name.to_lowercase().contains(&text.to_lowercase())
    }

    /// Remove `quantity` units. Returns the stock left, or `Err(available)`
    /// without changing anything when there is not enough on hand.
    pub(crate) fn take(&mut self, quantity: u64) -> Result<u64, u64> {
        match self.quantity.checked_sub(quantity) {
            Some(left) => {
                self.quantity = left;
                Ok(left)
            }
            None => Err(self.quantity),
        }
    }

    pub(crate) fn put(&mut self, quantity: u64) -> DomainResult<u64> {
        self.quantity = self
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant("stock level overflow"))?;
        Ok(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rice(quantity: u64) -> SupplyItem {
        SupplyItem::new(ItemId::generate(), "Rice 5kg", quantity).unwrap()
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = SupplyItem::new(ItemId::generate(), "   ", 1).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn name_match_ignores_case() {
        let item = rice(1);
        assert!(item.name_contains("rice"));
        assert!(item.name_contains("E 5K"));
        assert!(!item.name_contains("beans"));
    }

    #[test]
    fn take_refuses_to_underflow() {
        let mut item = rice(3);
        assert_eq!(item.take(2), Ok(1));
        assert_eq!(item.take(2), Err(1));
        assert_eq!(item.quantity(), 1);
    }

    #[test]
    fn builder_sets_descriptive_fields() {
        let item = rice(0)
            .with_unit("bag")
            .with_unit_cost(1250)
            .with_location("Shelf A3")
            .with_supplier("Local Coop")
            .with_category("food");
        assert_eq!(item.unit(), "bag");
        assert_eq!(item.unit_cost(), 1250);
        assert_eq!(item.location(), Some("Shelf A3"));
        assert_eq!(item.supplier(), Some("Local Coop"));
        assert_eq!(item.category(), Some("food"));
    }
}
