/// Layer phase on three layers of decreasing value and increasing reach.
///
/// Two variants:
///
/// - A small budget of 10 slots where the middle layer is not worth a slot at all
///
/// - A large budget of 100 slots where all three layers are used and the most valuable layer
///   cannot absorb the residual spend, so it ends priced at its cap

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
    short_name: "layers_exact",
    run,
});

/// Root with three layers: (value, max rate, floor, cap) with half a million eligible nodes each
fn prepare_root(values: [f64; 3], export_slots: u32, desired_rate: f64, cpm: f64) -> Result<AllocationNode, Box<dyn std::error::Error>> {
    let layers = vec![
        AllocationNode::new("layer 0", values[0], 10.0, 5.0, 15.0, 500000.0)?,
        AllocationNode::new("layer 1", values[1], 100.0, 3.0, 5.0, 500000.0)?,
        AllocationNode::new("layer 2", values[2], 1000.0, 1.0, 2.0, 500000.0)?,
    ];
    Ok(AllocationNode::container("root")
        .with_export_slots(export_slots)
        .with_desired_avg_impression_rate(desired_rate)?
        .with_avg_cost_per_mille(cpm)?
        .with_children(layers))
}

/// Checks every allocated tree must pass, whatever its expected partition
fn check_common(root: &AllocationNode, label: &str, validation: &mut Validation, logger: &mut Logger) {
    let partition = root.partition();
    validation.check(logger, partition.iter().sum::<u32>() == root.export_slots(),
        format!("{}: slots sum to the parent's {} ({:?})", label, root.export_slots(), partition));
    validation.check(logger, feasibility::is_feasible(&partition, root, root.export_slots()),
        format!("{}: partition {:?} is feasible", label, partition));
    validation.check(logger, is_budget_balanced(root),
        format!("{}: children's spend matches the parent's {:.2}", label, root.total_desired_spend_rate()));
    for child in root.children().iter().filter(|c| c.export_slots() > 0) {
        validation.check(logger, child.floor_price() <= child.avg_cost_per_mille() && child.avg_cost_per_mille() <= child.price_cap(),
            format!("{}: {} priced {:.4} within [{:.2}, {:.2}]", label, child.name(), child.avg_cost_per_mille(), child.floor_price(), child.price_cap()));
    }
}

pub fn run(_scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = AllocationOrchestrator::default();
    let mut validation = Validation::new();

    // Variant A: small budget
    let mut root_a = prepare_root([1.0, 0.0, 0.0], 10, 200.0, 2.0)?;
    let outcome_a = orchestrator.allocate_resources_to_layers(&mut root_a, logger)?;
    TOTAL_ALLOCATION_RUNS.fetch_add(1, Ordering::Relaxed);
    logln!(logger, LogEvent::Scenario, "Variant A pricing: {:?}", outcome_a);
    root_a.printout(logger, LogEvent::Scenario);

    validation.check(logger, root_a.partition() == vec![8, 0, 2],
        format!("Variant A partition is [8, 0, 2]: {:?}", root_a.partition()));
    check_common(&root_a, "Variant A", &mut validation, logger);

    // Variant B: large budget with layer values spread apart
    logln!(logger, LogEvent::Scenario, "");
    let mut root_b = prepare_root([200.0, 20.0, 1.0], 100, 110.0, 3.0)?;
    let outcome_b = orchestrator.allocate_resources_to_layers(&mut root_b, logger)?;
    TOTAL_ALLOCATION_RUNS.fetch_add(1, Ordering::Relaxed);
    logln!(logger, LogEvent::Scenario, "Variant B pricing: {:?}", outcome_b);
    root_b.printout(logger, LogEvent::Scenario);

    validation.check(logger, root_b.partition() == vec![8, 90, 2],
        format!("Variant B partition is [8, 90, 2]: {:?}", root_b.partition()));
    let top = &root_b.children()[0];
    validation.check(logger, top.avg_cost_per_mille() == top.price_cap(),
        format!("Variant B most valuable layer is priced at its cap: {:.4} == {:.2}", top.avg_cost_per_mille(), top.price_cap()));
    validation.check(logger, matches!(outcome_b, PricingOutcome::Balanced { marginal: 1, .. }),
        format!("Variant B residual price is taken by layer 1: {:?}", outcome_b));
    check_common(&root_b, "Variant B", &mut validation, logger);

    validation.finish("layers_exact")
}
