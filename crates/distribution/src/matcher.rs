//! Pure allocation of snapshot stock to approved needs.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aidflow_core::{DomainError, DomainResult};
use aidflow_inventory::{InventorySnapshot, ItemId, SnapshotEntry};
use aidflow_needs::{NeedId, SupplyNeed};

use crate::outcome::{MatchOutcome, OutcomeTally};

/// How needs are bound to stocked items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingPolicy {
    /// When a need carries a `supply_id` that exists in the snapshot, allocate
    /// from that item only. Needs without one (or with an unknown one) fall
    /// back to name matching.
    pub prefer_supply_id: bool,
}

impl Default for MatchingPolicy {
    fn default() -> Self {
        Self {
            prefer_supply_id: true,
        }
    }
}

impl MatchingPolicy {
    /// Name matching only, ignoring any recorded `supply_id`.
    pub fn name_only() -> Self {
        Self {
            prefer_supply_id: false,
        }
    }
}

/// The matcher's decision for one need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAllocation {
    pub need_id: NeedId,
    pub item_matched: Option<ItemId>,
    pub item_name: Option<String>,
    pub requested_quantity: u64,
    pub allocated_quantity: u64,
    pub outcome: MatchOutcome,
}

/// Output of one matcher run: one entry per distinct input need, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    entries: Vec<ProposedAllocation>,
    snapshot_taken_at: DateTime<Utc>,
}

impl Proposal {
    pub fn entries(&self) -> &[ProposedAllocation] {
        &self.entries
    }

    pub fn snapshot_taken_at(&self) -> DateTime<Utc> {
        self.snapshot_taken_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tally(&self) -> OutcomeTally {
        self.entries.iter().map(|e| e.outcome).collect()
    }

    pub fn total_allocated(&self) -> DomainResult<u64> {
        checked_total(self.entries.iter().map(|e| e.allocated_quantity))
    }

    /// Sum allocated against one item across all needs.
    pub fn allocated_against(&self, item_id: ItemId) -> DomainResult<u64> {
        checked_total(
            self.entries
                .iter()
                .filter(|e| e.item_matched == Some(item_id))
                .map(|e| e.allocated_quantity),
        )
    }
}

/// Sum of quantities, refusing to wrap.
pub(crate) fn checked_total(quantities: impl IntoIterator<Item = u64>) -> DomainResult<u64> {
    quantities.into_iter().try_fold(0u64, |total, q| {
        total
            .checked_add(q)
            .ok_or_else(|| DomainError::invariant("allocated quantity total overflows u64"))
    })
}

/// Pure matcher.
///
/// For each need, in input order:
/// - pick the item (see [`MatchingPolicy`]); by name this is the item whose name
///   contains the requested name (case-insensitive) with the most stock left,
///   first one in snapshot order on ties;
/// - allocate `min(outstanding, available)`;
/// - deplete the working copy before the next need is considered.
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    policy: MatchingPolicy,
}

impl Matcher {
    pub fn new(policy: MatchingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MatchingPolicy {
        self.policy
    }

    pub fn propose(&self, needs: &[SupplyNeed], snapshot: &InventorySnapshot) -> Proposal {
        let mut working: Vec<SnapshotEntry> = snapshot.entries().to_vec();
        let mut seen: HashSet<NeedId> = HashSet::with_capacity(needs.len());
        let mut entries = Vec::with_capacity(needs.len());

        for need in needs {
            // Repeated ids are matched once; later copies are ignored.
            if !seen.insert(need.id_typed()) {
                continue;
            }

            let requested = need.outstanding_quantity();
            let chosen = if need.is_eligible() {
                self.select(&working, need)
            } else {
                None
            };

            let entry = match chosen {
                Some(idx) => {
                    let stock = &mut working[idx];
                    let allocated = requested.min(stock.available);
                    stock.available -= allocated;
                    ProposedAllocation {
                        need_id: need.id_typed(),
                        item_matched: Some(stock.item_id),
                        item_name: Some(stock.name.clone()),
                        requested_quantity: requested,
                        allocated_quantity: allocated,
                        outcome: MatchOutcome::classify(requested, allocated),
                    }
                }
                None => ProposedAllocation {
                    need_id: need.id_typed(),
                    item_matched: None,
                    item_name: None,
                    requested_quantity: requested,
                    allocated_quantity: 0,
                    outcome: MatchOutcome::NotMatched,
                },
            };
            entries.push(entry);
        }

        Proposal {
            entries,
            snapshot_taken_at: snapshot.taken_at(),
        }
    }

    fn select(&self, working: &[SnapshotEntry], need: &SupplyNeed) -> Option<usize> {
        if self.policy.prefer_supply_id {
            if let Some(supply_id) = need.supply_id() {
                if let Some(idx) = working.iter().position(|e| e.item_id == supply_id) {
                    return (working[idx].available > 0).then_some(idx);
                }
            }
        }

        let wanted = need.item_name().to_lowercase();
        let mut best: Option<usize> = None;
        for (idx, entry) in working.iter().enumerate() {
            if entry.available == 0 || !entry.name.to_lowercase().contains(&wanted) {
                continue;
            }
            if best.is_none_or(|b| entry.available > working[b].available) {
                best = Some(idx);
            }
        }
        best
    }
}

/// Order needs for a run: higher urgency first, then oldest first.
///
/// Needs without an urgency tier (regular supplies) rank below every tier.
pub fn prioritize(mut needs: Vec<SupplyNeed>) -> Vec<SupplyNeed> {
    needs.sort_by(|a, b| {
        let rank = |n: &SupplyNeed| n.urgency().map_or(0, |u| u.rank());
        rank(b)
            .cmp(&rank(a))
            .then_with(|| a.created_at().cmp(&b.created_at()))
    });
    needs
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidflow_needs::{PriorityClass, Urgency};
    use chrono::Duration;

    fn entry(name: &str, available: u64) -> SnapshotEntry {
        SnapshotEntry {
            item_id: ItemId::generate(),
            name: name.to_string(),
            available,
        }
    }

    fn snapshot(entries: Vec<SnapshotEntry>) -> InventorySnapshot {
        InventorySnapshot::new(entries, Utc::now())
    }

    fn approved(item: &str, qty: u64) -> SupplyNeed {
        let mut need = SupplyNeed::new(
            NeedId::generate(),
            item,
            qty,
            "Case 3",
            PriorityClass::Regular,
            Utc::now(),
        )
        .unwrap();
        need.approve().unwrap();
        need
    }

    #[test]
    fn rice_scenario_depletes_between_needs() {
        let rice = entry("Rice", 10);
        let rice_id = rice.item_id;
        let snap = snapshot(vec![rice]);
        let needs = vec![approved("Rice", 6), approved("Rice", 8)];

        let proposal = Matcher::default().propose(&needs, &snap);
        let e = proposal.entries();

        assert_eq!(e[0].allocated_quantity, 6);
        assert_eq!(e[0].outcome, MatchOutcome::FullyMatched);
        assert_eq!(e[1].allocated_quantity, 4);
        assert_eq!(e[1].outcome, MatchOutcome::PartiallyMatched);
        assert_eq!(proposal.allocated_against(rice_id).unwrap(), 10);
        // The snapshot itself is untouched.
        assert_eq!(snap.available(rice_id), 10);
    }

    #[test]
    fn missing_item_is_not_matched() {
        let snap = snapshot(vec![entry("Rice", 10)]);
        let needs = vec![approved("Bandage", 3)];

        let proposal = Matcher::default().propose(&needs, &snap);
        let e = &proposal.entries()[0];
        assert_eq!(e.item_matched, None);
        assert_eq!(e.allocated_quantity, 0);
        assert_eq!(e.outcome, MatchOutcome::NotMatched);
    }

    #[test]
    fn picks_largest_stock_among_name_matches() {
        let small = entry("Brown rice", 4);
        let large = entry("White Rice 5kg", 9);
        let large_id = large.item_id;
        let snap = snapshot(vec![small, large, entry("Beans", 50)]);

        let proposal = Matcher::default().propose(&[approved("RICE", 2)], &snap);
        assert_eq!(proposal.entries()[0].item_matched, Some(large_id));
    }

    #[test]
    fn ties_go_to_first_in_snapshot_order() {
        let first = entry("Soap bar", 5);
        let first_id = first.item_id;
        let snap = snapshot(vec![first, entry("Liquid soap", 5)]);

        let proposal = Matcher::default().propose(&[approved("soap", 1)], &snap);
        assert_eq!(proposal.entries()[0].item_matched, Some(first_id));
    }

    #[test]
    fn empty_items_are_skipped() {
        let empty = entry("Rice", 0);
        let other = entry("Rice flour", 1);
        let other_id = other.item_id;
        let snap = snapshot(vec![empty, other]);

        let proposal = Matcher::default().propose(&[approved("rice", 3)], &snap);
        let e = &proposal.entries()[0];
        assert_eq!(e.item_matched, Some(other_id));
        assert_eq!(e.allocated_quantity, 1);
        assert_eq!(e.outcome, MatchOutcome::PartiallyMatched);
    }

    #[test]
    fn second_need_moves_to_next_best_item_after_depletion() {
        let a = entry("Water 1L", 5);
        let b = entry("Water 5L", 3);
        let (a_id, b_id) = (a.item_id, b.item_id);
        let snap = snapshot(vec![a, b]);

        let proposal = Matcher::default().propose(&[approved("water", 5), approved("water", 2)], &snap);
        assert_eq!(proposal.entries()[0].item_matched, Some(a_id));
        assert_eq!(proposal.entries()[1].item_matched, Some(b_id));
    }

    #[test]
    fn supply_id_binding_wins_over_name() {
        let bound = entry("Tarp", 2);
        let bound_id = bound.item_id;
        let snap = snapshot(vec![entry("Tarpaulin XL", 40), bound]);
        let need = approved("tarp", 2).with_supply_id(bound_id);

        let proposal = Matcher::default().propose(std::slice::from_ref(&need), &snap);
        assert_eq!(proposal.entries()[0].item_matched, Some(bound_id));

        let by_name = Matcher::new(MatchingPolicy::name_only()).propose(&[need], &snap);
        assert_ne!(by_name.entries()[0].item_matched, Some(bound_id));
    }

    #[test]
    fn bound_item_out_of_stock_is_not_matched() {
        let bound = entry("Tarp", 0);
        let bound_id = bound.item_id;
        let snap = snapshot(vec![entry("Tarp", 40), bound]);
        let need = approved("tarp", 2).with_supply_id(bound_id);

        let proposal = Matcher::default().propose(&[need], &snap);
        assert_eq!(proposal.entries()[0].outcome, MatchOutcome::NotMatched);
    }

    #[test]
    fn unknown_supply_id_falls_back_to_name() {
        let snap = snapshot(vec![entry("Tarp", 4)]);
        let need = approved("tarp", 2).with_supply_id(ItemId::generate());

        let proposal = Matcher::default().propose(&[need], &snap);
        assert_eq!(proposal.entries()[0].outcome, MatchOutcome::FullyMatched);
    }

    #[test]
    fn duplicate_needs_are_matched_once() {
        let snap = snapshot(vec![entry("Rice", 10)]);
        let need = approved("Rice", 4);

        let proposal = Matcher::default().propose(&[need.clone(), need], &snap);
        assert_eq!(proposal.len(), 1);
        assert_eq!(proposal.total_allocated().unwrap(), 4);
    }

    #[test]
    fn ineligible_needs_get_nothing() {
        let snap = snapshot(vec![entry("Rice", 10)]);
        let pending = SupplyNeed::new(
            NeedId::generate(),
            "Rice",
            4,
            "Case 9",
            PriorityClass::Regular,
            Utc::now(),
        )
        .unwrap();

        let proposal = Matcher::default().propose(&[pending], &snap);
        assert_eq!(proposal.entries()[0].outcome, MatchOutcome::NotMatched);
        assert_eq!(proposal.total_allocated().unwrap(), 0);
    }

    #[test]
    fn partially_served_need_asks_for_outstanding_only() {
        let snap = snapshot(vec![entry("Rice", 10)]);
        let mut need = approved("Rice", 8);
        need.record_fulfilment(5).unwrap();

        let proposal = Matcher::default().propose(&[need], &snap);
        let e = &proposal.entries()[0];
        assert_eq!(e.requested_quantity, 3);
        assert_eq!(e.allocated_quantity, 3);
        assert_eq!(e.outcome, MatchOutcome::FullyMatched);
    }

    #[test]
    fn overflowing_total_is_an_invariant_violation() {
        let huge = |need_id| ProposedAllocation {
            need_id,
            item_matched: None,
            item_name: None,
            requested_quantity: u64::MAX,
            allocated_quantity: u64::MAX,
            outcome: MatchOutcome::FullyMatched,
        };
        let proposal = Proposal {
            entries: vec![huge(NeedId::generate()), huge(NeedId::generate())],
            snapshot_taken_at: Utc::now(),
        };

        assert!(matches!(
            proposal.total_allocated(),
            Err(DomainError::InvariantViolation(_))
        ));
        assert_eq!(checked_total([u64::MAX, 0]).unwrap(), u64::MAX);
    }

    #[test]
    fn prioritize_orders_by_urgency_then_age() {
        let t0 = Utc::now();
        let make = |urgency: Option<Urgency>, offset: i64| {
            let need = SupplyNeed::new(
                NeedId::generate(),
                "Tent",
                1,
                "Shelter",
                PriorityClass::Emergency,
                t0 + Duration::seconds(offset),
            )
            .unwrap();
            match urgency {
                Some(u) => need.with_urgency(u),
                None => need,
            }
        };

        let low = make(Some(Urgency::Low), 0);
        let high_late = make(Some(Urgency::High), 20);
        let high_early = make(Some(Urgency::High), 10);
        let medium = make(Some(Urgency::Medium), 5);
        let none = make(None, 1);

        let ordered: Vec<_> = prioritize(vec![
            low.clone(),
            high_late.clone(),
            none.clone(),
            medium.clone(),
            high_early.clone(),
        ])
        .into_iter()
        .map(|n| n.id_typed())
        .collect();

        assert_eq!(
            ordered,
            vec![
                high_early.id_typed(),
                high_late.id_typed(),
                medium.id_typed(),
                low.id_typed(),
                none.id_typed(),
            ]
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        const NAMES: [&str; 4] = ["rice", "beans", "rice flour", "soap"];

        fn inputs() -> impl Strategy<Value = (Vec<(usize, u64)>, Vec<(usize, u64)>)> {
            (
                proptest::collection::vec((0..NAMES.len(), 0u64..30), 0..8),
                proptest::collection::vec((0..NAMES.len(), 1u64..25), 0..16),
            )
        }

        fn build(stock: &[(usize, u64)], needs: &[(usize, u64)]) -> (InventorySnapshot, Vec<SupplyNeed>) {
            let snap = snapshot(stock.iter().map(|(n, q)| entry(NAMES[*n], *q)).collect());
            let needs = needs.iter().map(|(n, q)| approved(NAMES[*n], *q)).collect();
            (snap, needs)
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: no item is allocated beyond its snapshot quantity.
            #[test]
            fn allocation_is_conserved((stock, needs) in inputs()) {
                let (snap, needs) = build(&stock, &needs);
                let proposal = Matcher::default().propose(&needs, &snap);

                for e in snap.entries() {
                    prop_assert!(proposal.allocated_against(e.item_id).unwrap() <= e.available);
                }
            }

            /// Property: same needs + same snapshot = same proposal.
            #[test]
            fn propose_is_deterministic((stock, needs) in inputs()) {
                let (snap, needs) = build(&stock, &needs);
                let matcher = Matcher::default();
                prop_assert_eq!(matcher.propose(&needs, &snap), matcher.propose(&needs, &snap));
            }

            /// Property: outcome agrees with allocated vs requested.
            #[test]
            fn outcome_is_consistent((stock, needs) in inputs()) {
                let (snap, needs) = build(&stock, &needs);
                let proposal = Matcher::default().propose(&needs, &snap);

                prop_assert_eq!(proposal.len(), needs.len());
                for e in proposal.entries() {
                    prop_assert!(e.allocated_quantity <= e.requested_quantity);
                    prop_assert_eq!(
                        e.outcome == MatchOutcome::FullyMatched,
                        e.allocated_quantity == e.requested_quantity
                    );
                    prop_assert_eq!(
                        e.outcome == MatchOutcome::NotMatched,
                        e.allocated_quantity == 0
                    );
                }
            }
        }
    }
}
