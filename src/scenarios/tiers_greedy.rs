/// Tier phase on layers with a hundred tiers, 1000 slots at 9000 desired impressions each.
///
/// Two variants:
///
/// - Three valuable but slow tiers, one mid tier (value 20, rate 1000) and 96 fast dummies
///   (value 1, rate 10000). The slow tiers can never keep the average rate up; every eight
///   dummy slots free enough volume for one mid slot, and equal dummy scores all land on the
///   first dummy: [0, 0, 0, 111, 889, 0, ...]
///
/// - Four real tiers and 96 small dummies. Only the two highest-reach tiers keep the average
///   rate up, so the allocator alternates between them until the 8000-rate tier runs out of
///   eligible nodes; from then on every four slots on the 10000-rate tier free enough volume
///   for one slot on the more valuable 5000-rate tier

use exportalloc::allocation_node::AllocationNode;
use exportalloc::orchestrator::AllocationOrchestrator;
use exportalloc::price_cascade::{is_budget_balanced, PricingOutcome};
use exportalloc::feasibility;
use exportalloc::logger::{LogEvent, Logger};
use exportalloc::logln;
use std::sync::atomic::Ordering;

use crate::scenarios::{Validation, TOTAL_ALLOCATION_RUNS};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "tiers_greedy",
    run,
});

const DUMMY_TIERS: usize = 96;

/// Layer of 1000 slots over the given tiers (name, value, max rate, eligible nodes) plus 96 dummies
fn prepare_layer(tiers: &[(&str, f64, f64, f64)], dummy: (f64, f64, f64)) -> Result<AllocationNode, Box<dyn std::error::Error>> {
    let mut children = Vec::with_capacity(tiers.len() + DUMMY_TIERS);
    for &(name, value, rate, eligible) in tiers {
        children.push(AllocationNode::new(name, value, rate, 1.0, 20.0, eligible)?);
    }
    let (dummy_value, dummy_rate, dummy_eligible) = dummy;
    for i in 0..DUMMY_TIERS {
        children.push(AllocationNode::new(format!("dummy {}", i), dummy_value, dummy_rate, 1.0, 20.0, dummy_eligible)?);
    }

    Ok(AllocationNode::container("layer")
        .with_export_slots(1000)
        .with_desired_avg_impression_rate(9000.0)?
        .with_avg_cost_per_mille(5.0)?
        .with_children(children))
}

fn allocate(layer: &mut AllocationNode, label: &str, logger: &mut Logger) -> Result<PricingOutcome, Box<dyn std::error::Error>> {
    let outcome = AllocationOrchestrator::default().allocate_resources_to_tiers(layer, logger)?;
    TOTAL_ALLOCATION_RUNS.fetch_add(1, Ordering::Relaxed);
    logln!(logger, LogEvent::Scenario, "{} pricing: {:?}", label, outcome);
    logln!(logger, LogEvent::Scenario, "{} partition head: {:?}", label, &layer.partition()[..8]);
    Ok(outcome)
}

/// Checks every allocated layer must pass, whatever its expected partition
fn check_common(layer: &AllocationNode, label: &str, validation: &mut Validation, logger: &mut Logger) {
    let partition = layer.partition();
    validation.check(logger, partition.iter().sum::<u32>() == layer.export_slots(),
        format!("{}: slots sum to {}", label, layer.export_slots()));
    validation.check(logger, feasibility::check_capacity(&partition, layer).is_ok(),
        format!("{}: no tier exceeds its eligible nodes", label));
    validation.check(logger, feasibility::check_volume(&partition, layer, layer.export_slots()).is_ok(),
        format!("{}: allocated tiers can deliver the desired volume", label));

    let children_volume: f64 = layer.children().iter().map(|c| c.total_desired_impression_rate()).sum();
    validation.check(logger, (children_volume - layer.total_desired_impression_rate()).abs() < 1e-6,
        format!("{}: desired volume conserved: {:.2} == {:.2}", label, children_volume, layer.total_desired_impression_rate()));
    validation.check(logger, is_budget_balanced(layer),
        format!("{}: children's spend matches the layer's {:.2}", label, layer.total_desired_spend_rate()));
    for child in layer.children().iter().filter(|c| c.export_slots() > 0) {
        validation.check(logger, child.floor_price() <= child.avg_cost_per_mille() && child.avg_cost_per_mille() <= child.price_cap(),
            format!("{}: {} priced {:.4} within [{:.2}, {:.2}]", label, child.name(), child.avg_cost_per_mille(), child.floor_price(), child.price_cap()));
    }
}

pub fn run(_scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut validation = Validation::new();

    // Variant A: slow valuable tiers, mid tier, fast dummies
    let mut layer_a = prepare_layer(&[
        ("slow 0", 100.0, 1.0, 1000.0),
        ("slow 1", 90.0, 1.0, 1000.0),
        ("slow 2", 80.0, 1.0, 1000.0),
        ("mid", 20.0, 1000.0, 1000.0),
    ], (1.0, 10000.0, 1000.0))?;
    allocate(&mut layer_a, "Variant A", logger)?;

    let partition_a = layer_a.partition();
    validation.check(logger, partition_a[..6].to_vec() == vec![0, 0, 0, 111, 889, 0],
        format!("Variant A partition begins [0, 0, 0, 111, 889, 0]: {:?}", &partition_a[..6]));
    validation.check(logger, partition_a[5..].iter().all(|&s| s == 0),
        "Variant A: only the first dummy receives slots".to_string());
    check_common(&layer_a, "Variant A", &mut validation, logger);

    // Variant B: four real tiers with growing reach, small dummies
    logln!(logger, LogEvent::Scenario, "");
    let mut layer_b = prepare_layer(&[
        ("tier A", 10.0, 1000.0, 100.0),
        ("tier B", 8.0, 5000.0, 150.0),
        ("tier C", 5.0, 8000.0, 300.0),
        ("tier D", 1.0, 10000.0, 1000.0),
    ], (0.5, 100.0, 10.0))?;
    allocate(&mut layer_b, "Variant B", logger)?;

    let partition_b = layer_b.partition();
    validation.check(logger, partition_b[..4].to_vec() == vec![0, 80, 300, 620],
        format!("Variant B real tiers receive [0, 80, 300, 620]: {:?}", &partition_b[..4]));
    validation.check(logger, partition_b[4..].iter().all(|&s| s == 0),
        "Variant B: dummy tiers receive nothing".to_string());
    // Tier B is too valuable to absorb the residual within its cap
    let tier_b = &layer_b.children()[1];
    validation.check(logger, tier_b.avg_cost_per_mille() == tier_b.price_cap(),
        format!("Variant B: {} pinned to its cap: {:.4}", tier_b.name(), tier_b.avg_cost_per_mille()));
    check_common(&layer_b, "Variant B", &mut validation, logger);

    validation.finish("tiers_greedy")
}
