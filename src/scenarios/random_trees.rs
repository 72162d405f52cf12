/// Full three-phase allocation over randomly generated supply trees.
///
/// There is no known optimum for these trees, so the scenario checks the structural guarantees
/// instead: slots are conserved wherever a phase succeeded, no child exceeds its eligible nodes,
/// prices never exceed caps, and leaves get at most one slot each. Infeasible nodes are kept at
/// zero slots rather than aborting the tree.

use rand::{rngs::StdRng, Rng, SeedableRng};

use exportalloc::allocation_node::AllocationNode;
use exportalloc::errors::InfeasiblePolicy;
use exportalloc::orchestrator::{AllocationConfig, AllocationOrchestrator, AllocationSummary};
use exportalloc::supply::SupplyTreeGenerator;
use exportalloc::utils::get_seed;
use exportalloc::logger::{LogEvent, Logger};
use exportalloc::logln;
use std::sync::atomic::Ordering;

use crate::scenarios::{Validation, TOTAL_ALLOCATION_RUNS};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "random_trees",
    run,
});

const TREES_PER_RUN: usize = 5;
const PRICE_TOLERANCE: f64 = 1e-9;

/// Conservation, capacity and cap checks for one priced parent
fn check_priced_parent(parent: &AllocationNode, validation: &mut Validation, logger: &mut Logger) {
    let allocated: u32 = parent.partition().iter().sum();
    validation.check(logger, allocated == 0 || allocated == parent.export_slots(),
        format!("{}: {} of {} slots handed out", parent.name(), allocated, parent.export_slots()));

    let over_capacity = parent.children().iter()
        .filter(|c| c.export_slots() as f64 > c.number_of_eligible_nodes())
        .count();
    let over_cap = parent.children().iter()
        .filter(|c| c.export_slots() > 0 && c.avg_cost_per_mille() > c.price_cap() + PRICE_TOLERANCE)
        .count();
    validation.check(logger, over_capacity == 0 && over_cap == 0,
        format!("{}: {} children over capacity, {} priced above cap", parent.name(), over_capacity, over_cap));
}

fn validate_tree(root: &AllocationNode, summary: &AllocationSummary, validation: &mut Validation, logger: &mut Logger) {
    check_priced_parent(root, validation, logger);

    let mut reexport_slots: u64 = 0;
    let mut new_export_slots: u64 = 0;
    for layer in root.children() {
        check_priced_parent(layer, validation, logger);
        for tier in layer.children() {
            let leaves = tier.partition();
            let handed_out: u32 = leaves.iter().sum();
            validation.check(logger, handed_out <= tier.export_slots() && leaves.iter().all(|&s| s <= 1),
                format!("{}: {} of {} slots on single-slot leaves", tier.name(), handed_out, tier.export_slots()));
            for leaf in tier.children().iter().filter(|l| l.export_slots() > 0) {
                if leaf.export_count() > 0.0 {
                    reexport_slots += 1;
                } else {
                    new_export_slots += 1;
                }
            }
        }
    }

    // Leaves can only hold fewer slots than planned, where a split half was infeasible
    validation.check(logger, reexport_slots <= summary.reexport_slots && new_export_slots <= summary.new_export_slots,
        format!("Leaf slots (reexport/new) {} / {} within planned {} / {}",
            reexport_slots, new_export_slots, summary.reexport_slots, summary.new_export_slots));
}

pub fn run(_scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(get_seed(4321));
    let generator = SupplyTreeGenerator::default();
    let orchestrator = AllocationOrchestrator::new(AllocationConfig {
        infeasible_policy: InfeasiblePolicy::ZeroAllocation,
        ..AllocationConfig::default()
    });
    let mut validation = Validation::new();

    for tree in 0..TREES_PER_RUN {
        let mut root = generator.generate(&mut rng)?;
        let fraction_of_campaign_left: f64 = rng.gen();
        let summary = orchestrator.allocate_tree(&mut root, fraction_of_campaign_left, logger)?;
        TOTAL_ALLOCATION_RUNS.fetch_add(1, Ordering::Relaxed);

        logln!(logger, LogEvent::Scenario, "Tree {} (campaign left {:.2}):", tree, fraction_of_campaign_left);
        summary.printout(logger, LogEvent::Scenario);
        validate_tree(&root, &summary, &mut validation, logger);
        logln!(logger, LogEvent::Scenario, "");
    }

    validation.finish("random_trees")
}
