/// Node phase: a tier's slots are split between reexports and new experiments.
///
/// The tier holds six previously exported nodes and six never exported ones, interleaved in
/// value order. Runs with the whole campaign left (all slots to experiments), half of it, and
/// none (all slots to reexports). A separate check ranks ten candidates by priority alone.

use std::collections::BTreeSet;

use exportalloc::allocation_node::AllocationNode;
use exportalloc::allocator::PartitionAllocatorTrait;
use exportalloc::allocator_ranking::ExperimentRankingAllocator;
use exportalloc::orchestrator::{AllocationOrchestrator, NodeSplit};
use exportalloc::logger::{LogEvent, Logger};
use exportalloc::logln;
use std::sync::atomic::Ordering;

use crate::scenarios::{Validation, TOTAL_ALLOCATION_RUNS};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "nodes_split",
    run,
});

fn leaf(name: &str, value: f64, priority: f64, export_count: f64) -> Result<AllocationNode, Box<dyn std::error::Error>> {
    Ok(AllocationNode::new(name, value, 110.0, 1.0, 10.0, 1.0)?
        .with_experimental_priority_score(priority)?
        .with_export_count(export_count)?)
}

fn prepare_tier() -> Result<AllocationNode, Box<dyn std::error::Error>> {
    let children = vec![
        leaf("r0", 12.0, 0.0, 4.0)?,
        leaf("r1", 10.0, 0.0, 1.0)?,
        leaf("r2", 8.0, 0.0, 2.0)?,
        leaf("r3", 6.0, 0.0, 1.0)?,
        leaf("r4", 4.0, 0.0, 3.0)?,
        leaf("r5", 2.0, 0.0, 1.0)?,
        leaf("n0", 11.0, 0.3, 0.0)?,
        leaf("n1", 9.0, 0.8, 0.0)?,
        leaf("n2", 7.0, 0.1, 0.0)?,
        leaf("n3", 5.0, 0.9, 0.0)?,
        leaf("n4", 3.0, 0.5, 0.0)?,
        leaf("n5", 1.0, 0.7, 0.0)?,
    ];
    Ok(AllocationNode::container("tier")
        .with_export_slots(6)
        .with_desired_avg_impression_rate(100.0)?
        .with_avg_cost_per_mille(5.0)?
        .with_children(children))
}

fn selected_names(tier: &AllocationNode) -> BTreeSet<String> {
    tier.children().iter()
        .filter(|c| c.export_slots() > 0)
        .map(|c| c.name().to_string())
        .collect()
}

fn expected_names(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

pub fn run(_scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = AllocationOrchestrator::default();
    let mut validation = Validation::new();

    let variants: [(f64, NodeSplit, &[&str]); 3] = [
        (1.0, NodeSplit { reexport_slots: 0, new_export_slots: 6 }, &["n0", "n1", "n2", "n3", "n4", "n5"]),
        (0.5, NodeSplit { reexport_slots: 3, new_export_slots: 3 }, &["r0", "r1", "r2", "n1", "n3", "n5"]),
        (0.0, NodeSplit { reexport_slots: 6, new_export_slots: 0 }, &["r0", "r1", "r2", "r3", "r4", "r5"]),
    ];

    for (fraction, expected_split, expected) in variants {
        let mut tier = prepare_tier()?;
        let names_before: Vec<String> = tier.children().iter().map(|c| c.name().to_string()).collect();

        let split = orchestrator.allocate_resources_to_nodes(&mut tier, fraction, logger)?;
        TOTAL_ALLOCATION_RUNS.fetch_add(1, Ordering::Relaxed);
        logln!(logger, LogEvent::Scenario, "Campaign left {:.1}: {:?}, selected {:?}", fraction, split, selected_names(&tier));

        validation.check(logger, split == expected_split,
            format!("Campaign left {:.1}: split {:?}", fraction, split));
        validation.check(logger, selected_names(&tier) == expected_names(expected),
            format!("Campaign left {:.1}: selected nodes are {:?}", fraction, expected));

        let names_after: Vec<String> = tier.children().iter().map(|c| c.name().to_string()).collect();
        validation.check(logger, names_before == names_after && tier.export_slots() == 6,
            format!("Campaign left {:.1}: tier keeps its {} children and 6 slots", fraction, names_after.len()));
        validation.check(logger, tier.children().iter().all(|c| c.export_slots() <= 1),
            format!("Campaign left {:.1}: no node gets more than one slot", fraction));
    }

    // Ranking on its own: priorities 0..9 spread over value order, four slots
    logln!(logger, LogEvent::Scenario, "");
    let priorities = [3.0, 8.0, 0.0, 6.0, 1.0, 9.0, 4.0, 7.0, 2.0, 5.0];
    let mut candidates = Vec::with_capacity(priorities.len());
    for (i, &priority) in priorities.iter().enumerate() {
        candidates.push(leaf(&format!("candidate {}", i), 10.0 - i as f64, priority, 0.0)?);
    }
    let mut tier = AllocationNode::container("experiments")
        .with_export_slots(4)
        .with_children(candidates);
    ExperimentRankingAllocator.allocate(&mut tier, logger)?;
    TOTAL_ALLOCATION_RUNS.fetch_add(1, Ordering::Relaxed);

    let winners: BTreeSet<u64> = tier.children().iter()
        .filter(|c| c.export_slots() == 1)
        .map(|c| c.experimental_priority_score() as u64)
        .collect();
    validation.check(logger, winners == BTreeSet::from([6, 7, 8, 9]),
        format!("Ranking selects priorities {{6, 7, 8, 9}}: {:?}", winners));
    validation.check(logger, tier.partition().iter().sum::<u32>() == 4,
        "Ranking hands out exactly four slots".to_string());

    validation.finish("nodes_split")
}
