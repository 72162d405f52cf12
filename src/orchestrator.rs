use crate::allocation_node::AllocationNode;
use crate::allocator::PartitionAllocatorTrait;
use crate::allocator_exact::{ExactPartitionAllocator, DEFAULT_MAX_COMPOSITIONS};
use crate::allocator_greedy::GreedyPartitionAllocator;
use crate::allocator_ranking::ExperimentRankingAllocator;
use crate::errors::{AllocationError, InfeasiblePolicy};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::price_cascade::{price, PricingOutcome};
use crate::schedule::{NewExportScheduleTrait, ScheduleEchoFraction};

/// Knobs for the orchestrator
pub struct AllocationConfig {
    pub infeasible_policy: InfeasiblePolicy,
    pub max_compositions: u64,
    pub schedule: Box<dyn NewExportScheduleTrait>,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            infeasible_policy: InfeasiblePolicy::Error,
            max_compositions: DEFAULT_MAX_COMPOSITIONS,
            schedule: Box::new(ScheduleEchoFraction),
        }
    }
}

/// How a tier's slots were split in the node phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSplit {
    pub reexport_slots: u32,
    pub new_export_slots: u32,
}

/// Totals gathered while walking a whole tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationSummary {
    pub layers: usize,
    pub tiers: usize,
    pub layer_slots: u64,
    pub tier_slots: u64,
    pub reexport_slots: u64,
    pub new_export_slots: u64,
    pub caps_exhausted: usize,
}

impl AllocationSummary {
    fn record_pricing(&mut self, outcome: &PricingOutcome) {
        if matches!(outcome, PricingOutcome::CapsExhausted { .. }) {
            self.caps_exhausted += 1;
        }
    }

    pub fn printout(&self, logger: &mut Logger, event: LogEvent) {
        logln!(logger, event, "Layers: {} (slots allocated: {})", self.layers, self.layer_slots);
        logln!(logger, event, "Tiers: {} (slots allocated: {})", self.tiers, self.tier_slots);
        logln!(logger, event, "Node slots (reexport/new): {} / {}", self.reexport_slots, self.new_export_slots);
        logln!(logger, event, "Price cascades ending with all caps hit: {}", self.caps_exhausted);
    }
}

/// Top-level driver with one entry point per tree level
///
/// Layers use exhaustive search, tiers the greedy allocator, both followed by the price
/// cascade. Leaf nodes split their tier's slots between reexports (greedy) and new
/// experiments (ranking).
pub struct AllocationOrchestrator {
    exact: ExactPartitionAllocator,
    greedy: GreedyPartitionAllocator,
    ranking: ExperimentRankingAllocator,
    schedule: Box<dyn NewExportScheduleTrait>,
}

impl AllocationOrchestrator {
    pub fn new(config: AllocationConfig) -> Self {
        Self {
            exact: ExactPartitionAllocator {
                max_compositions: config.max_compositions,
                infeasible_policy: config.infeasible_policy,
            },
            greedy: GreedyPartitionAllocator::new(config.infeasible_policy),
            ranking: ExperimentRankingAllocator,
            schedule: config.schedule,
        }
    }

    /// Exact allocation of the root's slots among its layers, then pricing
    pub fn allocate_resources_to_layers(&self, root: &mut AllocationNode, logger: &mut Logger) -> Result<PricingOutcome, AllocationError> {
        self.exact.allocate(root, logger)?;
        Ok(price(root, logger))
    }

    /// Greedy allocation of a layer's slots among its tiers, then pricing
    pub fn allocate_resources_to_tiers(&self, layer: &mut AllocationNode, logger: &mut Logger) -> Result<PricingOutcome, AllocationError> {
        self.greedy.allocate(layer, logger)?;
        Ok(price(layer, logger))
    }

    pub fn calculate_fraction_that_are_new_exports(&self, fraction_of_campaign_left: f64) -> f64 {
        self.schedule.fraction_that_are_new_exports(fraction_of_campaign_left)
    }

    /// Slots of a tier going to already exported nodes
    ///
    /// Rounds half-slot splits away from zero (`f64::round`), so 2.5 reexport slots become 3.
    pub fn reexport_slot_count(&self, tier_slots: u32, fraction_of_campaign_left: f64) -> u32 {
        let reexport_fraction = 1.0 - self.calculate_fraction_that_are_new_exports(fraction_of_campaign_left);
        ((reexport_fraction * tier_slots as f64).round() as u32).min(tier_slots)
    }

    /// Split a tier's slots between reexport candidates and new experiments
    ///
    /// Nodes with a positive export count compete through the greedy allocator for the reexport
    /// share; never-exported nodes are ranked for the rest. The tier keeps its full set of
    /// children, in their original order, and its own slot count.
    pub fn allocate_resources_to_nodes(&self, tier: &mut AllocationNode, fraction_of_campaign_left: f64, logger: &mut Logger) -> Result<NodeSplit, AllocationError> {
        let reexport_slots = self.reexport_slot_count(tier.export_slots(), fraction_of_campaign_left);
        let split = NodeSplit {
            reexport_slots,
            new_export_slots: tier.export_slots() - reexport_slots,
        };

        let children = tier.take_children();
        let total = children.len();
        let (reexport, fresh): (Vec<_>, Vec<_>) = children.into_iter()
            .enumerate()
            .partition(|(_, child)| child.export_count() > 0.0);
        let (reexport_indices, reexport_children): (Vec<usize>, Vec<AllocationNode>) = reexport.into_iter().unzip();
        let (fresh_indices, fresh_children): (Vec<usize>, Vec<AllocationNode>) = fresh.into_iter().unzip();

        // Both subsets are subsequences of a sorted list, so they are sorted too
        let mut reexport_tier = tier.clone().with_export_slots(split.reexport_slots);
        reexport_tier.restore_children(reexport_children);
        let mut fresh_tier = tier.clone().with_export_slots(split.new_export_slots);
        fresh_tier.restore_children(fresh_children);

        logln!(logger, LogEvent::Level, "{}: {} slots -> {} reexport over {} candidates, {} new over {} candidates",
            tier.name(), tier.export_slots(), split.reexport_slots, reexport_indices.len(), split.new_export_slots, fresh_indices.len());

        let result = self.greedy.allocate(&mut reexport_tier, logger)
            .and_then(|()| self.ranking.allocate(&mut fresh_tier, logger));
        if result.is_err() {
            // Slots from an earlier cycle must not survive a failed split
            reexport_tier.assign_partition(&vec![0; reexport_tier.children().len()]);
            fresh_tier.assign_partition(&vec![0; fresh_tier.children().len()]);
        }

        let mut merged: Vec<Option<AllocationNode>> = vec![None; total];
        for (index, child) in reexport_indices.into_iter().zip(reexport_tier.take_children()) {
            merged[index] = Some(child);
        }
        for (index, child) in fresh_indices.into_iter().zip(fresh_tier.take_children()) {
            merged[index] = Some(child);
        }
        tier.restore_children(merged.into_iter().flatten().collect());

        result.map(|()| split)
    }

    /// Run all three phases over a root → layers → tiers → nodes tree
    pub fn allocate_tree(&self, root: &mut AllocationNode, fraction_of_campaign_left: f64, logger: &mut Logger) -> Result<AllocationSummary, AllocationError> {
        let mut summary = AllocationSummary::default();

        let outcome = self.allocate_resources_to_layers(root, logger)?;
        summary.record_pricing(&outcome);
        summary.layers = root.children().len();
        summary.layer_slots = root.partition().iter().map(|&s| s as u64).sum();
        logln!(logger, LogEvent::Level, "{}: layers allocated {:?}", root.name(), root.partition());

        for layer_index in 0..root.children().len() {
            let Some(layer) = root.child_mut(layer_index) else { continue };
            let outcome = self.allocate_resources_to_tiers(layer, logger)?;
            summary.record_pricing(&outcome);
            summary.tiers += layer.children().len();
            summary.tier_slots += layer.partition().iter().map(|&s| s as u64).sum::<u64>();
            logln!(logger, LogEvent::Level, "{}: tiers allocated {:?}", layer.name(), layer.partition());

            for tier_index in 0..layer.children().len() {
                let Some(tier) = layer.child_mut(tier_index) else { continue };
                let split = self.allocate_resources_to_nodes(tier, fraction_of_campaign_left, logger)?;
                summary.reexport_slots += split.reexport_slots as u64;
                summary.new_export_slots += split.new_export_slots as u64;
            }
        }
        Ok(summary)
    }
}

impl Default for AllocationOrchestrator {
    fn default() -> Self {
        Self::new(AllocationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_cascade::is_budget_balanced;
    use crate::schedule::ScheduleConstant;

    fn layer_root() -> AllocationNode {
        AllocationNode::container("root")
            .with_export_slots(100)
            .with_desired_avg_impression_rate(110.0).unwrap()
            .with_avg_cost_per_mille(3.0).unwrap()
            .with_children(vec![
                AllocationNode::new("layer 0", 200.0, 10.0, 5.0, 15.0, 500000.0).unwrap(),
                AllocationNode::new("layer 1", 20.0, 100.0, 3.0, 5.0, 500000.0).unwrap(),
                AllocationNode::new("layer 2", 1.0, 1000.0, 1.0, 2.0, 500000.0).unwrap(),
            ])
    }

    /// A leaf candidate: value, priority score and export count
    fn leaf(name: &str, value: f64, priority: f64, export_count: f64) -> AllocationNode {
        AllocationNode::new(name, value, 110.0, 1.0, 10.0, 1.0).unwrap()
            .with_experimental_priority_score(priority).unwrap()
            .with_export_count(export_count).unwrap()
    }

    fn leaf_tier(slots: u32) -> AllocationNode {
        AllocationNode::container("tier")
            .with_export_slots(slots)
            .with_desired_avg_impression_rate(100.0).unwrap()
            .with_avg_cost_per_mille(5.0).unwrap()
            .with_children(vec![
                leaf("r0", 9.0, 0.0, 3.0),
                leaf("n0", 8.0, 0.2, 0.0),
                leaf("r1", 7.0, 0.0, 1.0),
                leaf("n1", 6.0, 0.9, 0.0),
                leaf("r2", 5.0, 0.0, 2.0),
                leaf("n2", 4.0, 0.5, 0.0),
                leaf("n3", 3.0, 0.1, 0.0),
            ])
    }

    #[test]
    fn test_layer_phase() {
        let mut root = layer_root();
        let outcome = AllocationOrchestrator::default().allocate_resources_to_layers(&mut root, &mut Logger::new()).unwrap();

        assert_eq!(root.partition(), vec![8, 90, 2]);
        assert_eq!(outcome, PricingOutcome::Balanced { marginal: 1, price: root.children()[1].avg_cost_per_mille() });
        // The most valuable layer cannot absorb the residual and is pinned to its cap
        assert_eq!(root.children()[0].avg_cost_per_mille(), 15.0);
        for child in root.children() {
            assert!(child.floor_price() <= child.avg_cost_per_mille() && child.avg_cost_per_mille() <= child.price_cap());
        }
        assert!(is_budget_balanced(&root));
    }

    #[test]
    fn test_tier_phase() {
        let mut layer = AllocationNode::container("layer")
            .with_export_slots(10)
            .with_desired_avg_impression_rate(100.0).unwrap()
            .with_avg_cost_per_mille(4.0).unwrap()
            .with_children(vec![
                AllocationNode::new("a", 30.0, 50.0, 1.0, 10.0, 5.0).unwrap(),
                AllocationNode::new("b", 5.0, 200.0, 1.0, 10.0, 1000.0).unwrap(),
                AllocationNode::new("c", 0.5, 1000.0, 1.0, 10.0, 1000.0).unwrap(),
            ]);
        AllocationOrchestrator::default().allocate_resources_to_tiers(&mut layer, &mut Logger::new()).unwrap();

        assert_eq!(layer.partition(), vec![5, 5, 0]);
        // a: (4000 - 750) / 250 = 13 > 10 -> cap; b: (4000 - 2500) / 750 = 2
        assert_eq!(layer.children()[0].avg_cost_per_mille(), 10.0);
        assert!((layer.children()[1].avg_cost_per_mille() - 2.0).abs() < 1e-12);
        assert!(is_budget_balanced(&layer));
    }

    #[test]
    fn test_reexport_slot_count_rounds() {
        let orchestrator = AllocationOrchestrator::default();
        assert_eq!(orchestrator.reexport_slot_count(4, 0.25), 3);
        // 2.5 rounds away from zero
        assert_eq!(orchestrator.reexport_slot_count(5, 0.5), 3);
        assert_eq!(orchestrator.reexport_slot_count(5, 0.0), 5);
        assert_eq!(orchestrator.reexport_slot_count(5, 1.0), 0);
    }

    #[test]
    fn test_node_phase_splits_and_restores() {
        let mut tier = leaf_tier(4);
        let before_names: Vec<String> = tier.children().iter().map(|c| c.name().to_string()).collect();

        let split = AllocationOrchestrator::default()
            .allocate_resources_to_nodes(&mut tier, 0.5, &mut Logger::new())
            .unwrap();
        assert_eq!(split, NodeSplit { reexport_slots: 2, new_export_slots: 2 });

        let after_names: Vec<String> = tier.children().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(before_names, after_names);
        assert_eq!(tier.export_slots(), 4);

        // Reexports: greedy puts one slot on each of the two most valuable (eligible = 1)
        // New experiments: n1 (0.9) and n2 (0.5)
        assert_eq!(tier.partition(), vec![1, 0, 1, 1, 0, 1, 0]);
    }

    #[test]
    fn test_node_phase_with_schedule_strategy() {
        let config = AllocationConfig {
            schedule: Box::new(ScheduleConstant::new(1.0)),
            ..AllocationConfig::default()
        };
        let mut tier = leaf_tier(3);
        let split = AllocationOrchestrator::new(config)
            .allocate_resources_to_nodes(&mut tier, 0.0, &mut Logger::new())
            .unwrap();
        assert_eq!(split, NodeSplit { reexport_slots: 0, new_export_slots: 3 });
        assert_eq!(tier.partition(), vec![0, 1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_node_phase_restores_children_on_error() {
        // Three reexport candidates with one eligible node each cannot take four slots
        let mut tier = leaf_tier(4);
        let err = AllocationOrchestrator::default()
            .allocate_resources_to_nodes(&mut tier, 0.0, &mut Logger::new())
            .unwrap_err();
        assert!(matches!(err, AllocationError::Infeasible { .. }));
        assert_eq!(tier.children().len(), 7);
        assert_eq!(tier.partition(), vec![0; 7]);
    }

    #[test]
    fn test_failed_split_clears_earlier_slots() {
        let orchestrator = AllocationOrchestrator::default();
        let mut tier = leaf_tier(4);
        orchestrator.allocate_resources_to_nodes(&mut tier, 0.5, &mut Logger::new()).unwrap();
        assert_eq!(tier.partition(), vec![1, 0, 1, 1, 0, 1, 0]);

        // Second cycle wants all four slots on three reexport candidates
        let err = orchestrator
            .allocate_resources_to_nodes(&mut tier, 0.0, &mut Logger::new())
            .unwrap_err();
        assert!(matches!(err, AllocationError::Infeasible { .. }));
        assert_eq!(tier.partition(), vec![0; 7]);
        assert_eq!(tier.export_slots(), 4);
    }

    #[test]
    fn test_allocate_tree() {
        let tier = |name: &str, value: f64| {
            let mut tier = leaf_tier(0);
            let children = tier.take_children();
            AllocationNode::new(name, value, 300.0, 1.0, 10.0, 7.0).unwrap().with_children(children)
        };
        let layer = |name: &str, value: f64| {
            AllocationNode::new(name, value, 300.0, 1.0, 10.0, 14.0).unwrap()
                .with_children(vec![tier(&format!("{} tier a", name), 2.0), tier(&format!("{} tier b", name), 1.0)])
        };
        let mut root = AllocationNode::container("root")
            .with_export_slots(6)
            .with_desired_avg_impression_rate(100.0).unwrap()
            .with_avg_cost_per_mille(5.0).unwrap()
            .with_children(vec![layer("layer x", 2.0), layer("layer y", 1.0)]);

        let summary = AllocationOrchestrator::default().allocate_tree(&mut root, 0.5, &mut Logger::new()).unwrap();

        assert_eq!(summary.layers, 2);
        assert_eq!(summary.tiers, 4);
        assert_eq!(summary.layer_slots, 6);
        assert_eq!(summary.tier_slots, 6);
        assert_eq!(summary.reexport_slots + summary.new_export_slots, 6);
        // Everything fits into the most valuable layer and its most valuable tier
        assert_eq!(root.partition(), vec![6, 0]);
        assert_eq!(root.children()[0].partition(), vec![6, 0]);
        let busy_tier = &root.children()[0].children()[0];
        assert_eq!(busy_tier.partition().iter().sum::<u32>(), 6);
    }
}
