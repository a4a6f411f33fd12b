use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, Utc};
use aidflow_distribution::{Matcher, MatchingPolicy, prioritize};
use aidflow_inventory::{InventorySnapshot, ItemId, SupplyItem};
use aidflow_needs::{NeedId, PriorityClass, SupplyNeed, Urgency};

const NAMES: [&str; 8] = [
    "Rice", "Bandage", "Blanket", "Water", "Soap", "Flour", "Tarp", "Lentils",
];

fn inventory(items: usize) -> InventorySnapshot {
    let items: Vec<SupplyItem> = (0..items)
        .map(|i| {
            let name = format!("{} lot {i}", NAMES[i % NAMES.len()]);
            SupplyItem::new(ItemId::generate(), name, 20 + (i as u64 * 7) % 50).unwrap()
        })
        .collect();
    InventorySnapshot::from_items(&items)
}

fn needs(count: usize, priority: PriorityClass) -> Vec<SupplyNeed> {
    let start = Utc::now();
    (0..count)
        .map(|i| {
            let mut need = SupplyNeed::new(
                NeedId::generate(),
                NAMES[i % NAMES.len()],
                1 + (i as u64 * 3) % 15,
                format!("case {i}"),
                priority,
                start + Duration::seconds(i as i64),
            )
            .unwrap();
            if priority == PriorityClass::Emergency {
                need = need.with_urgency(match i % 3 {
                    0 => Urgency::Low,
                    1 => Urgency::Medium,
                    _ => Urgency::High,
                });
            }
            need.approve().unwrap();
            need
        })
        .collect()
}

/// One full proposal over growing need lists against a fixed inventory.
fn bench_propose(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher_propose");
    let snapshot = inventory(200);
    let matcher = Matcher::new(MatchingPolicy::default());

    for count in [10usize, 100, 1_000].iter() {
        let needs = needs(*count, PriorityClass::Regular);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &needs, |b, needs| {
            b.iter(|| black_box(matcher.propose(black_box(needs), black_box(&snapshot))));
        });
    }

    group.finish();
}

fn bench_emergency_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher_emergency");
    let snapshot = inventory(200);
    let matcher = Matcher::new(MatchingPolicy::default());
    let needs = needs(1_000, PriorityClass::Emergency);

    group.bench_function("prioritize_then_propose", |b| {
        b.iter(|| {
            let ordered = prioritize(needs.clone());
            black_box(matcher.propose(&ordered, &snapshot))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_propose, bench_emergency_ordering);
criterion_main!(benches);
