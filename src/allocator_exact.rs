use crate::allocation_node::{AllocationNode, Money};
use crate::allocator::{resolve_infeasible, PartitionAllocatorTrait};
use crate::compositions::Compositions;
use crate::errors::{AllocationError, InfeasiblePolicy};
use crate::feasibility::is_feasible;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::score::score;
use crate::volume_budget::rebalance;

/// Default ceiling on the number of compositions the exhaustive search may visit
pub const DEFAULT_MAX_COMPOSITIONS: u64 = 5_000_000;

/// Exhaustive search over every composition of the node's slots among its children
///
/// The number of compositions grows as C(slots + children - 1, children - 1), so this is only
/// meant for nodes with a handful of children (layers).
pub struct ExactPartitionAllocator {
    pub max_compositions: u64,
    pub infeasible_policy: InfeasiblePolicy,
}

impl ExactPartitionAllocator {
    pub fn new(infeasible_policy: InfeasiblePolicy) -> Self {
        Self {
            max_compositions: DEFAULT_MAX_COMPOSITIONS,
            infeasible_policy,
        }
    }

    /// Highest scoring feasible composition; on equal scores the one enumerated first wins
    pub fn best_partition(&self, node: &AllocationNode) -> Option<(Vec<u32>, Money)> {
        let total = node.export_slots();
        let mut best: Option<(Vec<u32>, Money)> = None;
        for candidate in Compositions::new(total, node.children().len()) {
            let candidate_score = score(&candidate, node);
            let improves = match &best {
                Some((_, best_score)) => candidate_score > *best_score,
                None => true,
            };
            // Scoring is cheap; only candidates that would win are checked for feasibility
            if improves && is_feasible(&candidate, node, total) {
                best = Some((candidate, candidate_score));
            }
        }
        best
    }
}

impl Default for ExactPartitionAllocator {
    fn default() -> Self {
        Self::new(InfeasiblePolicy::default())
    }
}

impl PartitionAllocatorTrait for ExactPartitionAllocator {
    fn allocate(&self, node: &mut AllocationNode, logger: &mut Logger) -> Result<(), AllocationError> {
        let compositions = Compositions::total_count(node.export_slots(), node.children().len());
        if compositions > self.max_compositions {
            return Err(AllocationError::SearchTooLarge {
                node: node.name().to_string(),
                compositions,
            });
        }
        logln!(logger, LogEvent::Step, "{}: searching {} compositions of {} slots over {} children",
            node.name(), compositions, node.export_slots(), node.children().len());

        match self.best_partition(node) {
            Some((partition, best_score)) => {
                node.assign_partition(&partition);
                logln!(logger, LogEvent::Allocation, "{} ({}): partition {:?}, score {:.4}",
                    node.name(), self.get_allocator_type(), partition, best_score);
                rebalance(node, logger);
                Ok(())
            }
            None => resolve_infeasible(self.infeasible_policy, node, &self.get_allocator_type(), logger),
        }
    }

    fn get_allocator_type(&self) -> String {
        "Exact".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Layers as (value, max rate, floor, cap), all with 500000 eligible nodes
    fn root(slots: u32, desired_rate: f64, cpm: f64, layers: &[(f64, f64, f64, f64)]) -> AllocationNode {
        let children = layers.iter().enumerate()
            .map(|(i, &(value, rate, floor, cap))| {
                AllocationNode::new(format!("layer {}", i), value, rate, floor, cap, 500000.0).unwrap()
            })
            .collect();
        AllocationNode::container("root")
            .with_export_slots(slots)
            .with_desired_avg_impression_rate(desired_rate).unwrap()
            .with_avg_cost_per_mille(cpm).unwrap()
            .with_children(children)
    }

    #[test]
    fn test_ten_slots_three_layers() {
        let mut node = root(10, 200.0, 2.0, &[(1.0, 10.0, 5.0, 15.0), (0.0, 100.0, 3.0, 5.0), (0.0, 1000.0, 1.0, 2.0)]);
        ExactPartitionAllocator::default().allocate(&mut node, &mut Logger::new()).unwrap();
        assert_eq!(node.partition(), vec![8, 0, 2]);
    }

    #[test]
    fn test_hundred_slots_volume_and_floor_select_unique_partition() {
        // Layers 0 and 1 are worth the same per slot (2000); volume forces two slots into
        // layer 2 and caps layer 0 at eight slots
        let mut node = root(100, 110.0, 3.0, &[(200.0, 10.0, 5.0, 15.0), (20.0, 100.0, 3.0, 5.0), (1.0, 1000.0, 1.0, 2.0)]);
        ExactPartitionAllocator::default().allocate(&mut node, &mut Logger::new()).unwrap();
        assert_eq!(node.partition(), vec![8, 90, 2]);
        assert_eq!(node.partition().iter().sum::<u32>(), 100);

        // 80 + 9000 run at max, layer 2 absorbs 11000 - 9080 - 2000
        let children = node.children();
        assert_eq!(children[0].desired_avg_impression_rate(), 10.0);
        assert_eq!(children[1].desired_avg_impression_rate(), 100.0);
        assert_eq!(children[2].desired_avg_impression_rate(), 960.0);
    }

    #[test]
    fn test_infeasible_reports_error_and_zeroes() {
        // 2 slots can deliver at most 2000, 5000 requested
        let mut node = root(2, 2500.0, 2.0, &[(1.0, 10.0, 5.0, 15.0), (0.0, 1000.0, 1.0, 2.0)]);
        node.assign_partition(&[1, 1]);
        let err = ExactPartitionAllocator::default().allocate(&mut node, &mut Logger::new()).unwrap_err();
        assert_eq!(err, AllocationError::Infeasible { node: "root".to_string(), export_slots: 2 });
        assert_eq!(node.partition(), vec![0, 0]);
    }

    #[test]
    fn test_infeasible_zero_allocation_policy() {
        let mut node = root(2, 2500.0, 2.0, &[(1.0, 10.0, 5.0, 15.0), (0.0, 1000.0, 1.0, 2.0)]);
        let allocator = ExactPartitionAllocator::new(InfeasiblePolicy::ZeroAllocation);
        assert_eq!(allocator.allocate(&mut node, &mut Logger::new()), Ok(()));
        assert_eq!(node.partition(), vec![0, 0]);
    }

    #[test]
    fn test_search_too_large() {
        let layers = vec![(1.0, 10.0, 1.0, 2.0); 12];
        let mut node = root(1000, 1.0, 2.0, &layers);
        let mut allocator = ExactPartitionAllocator::default();
        allocator.max_compositions = 1000;
        assert!(matches!(
            allocator.allocate(&mut node, &mut Logger::new()),
            Err(AllocationError::SearchTooLarge { .. })
        ));
    }

    #[test]
    fn test_zero_slots() {
        let mut node = root(0, 200.0, 2.0, &[(1.0, 10.0, 5.0, 15.0), (0.0, 1000.0, 1.0, 2.0)]);
        ExactPartitionAllocator::default().allocate(&mut node, &mut Logger::new()).unwrap();
        assert_eq!(node.partition(), vec![0, 0]);
    }
}
