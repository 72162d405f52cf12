use crate::allocation_node::{AllocationNode, Money};
use crate::allocator::{resolve_infeasible, PartitionAllocatorTrait};
use crate::errors::{AllocationError, InfeasiblePolicy};
use crate::feasibility::is_feasible;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::score::score;
use crate::volume_budget::rebalance;

/// Adds one slot at a time to whichever child gives the best feasible score
///
/// Locally optimal only: an increment is never taken back. Used for nodes with many children
/// (tiers, leaf nodes) where exhaustive search is out of reach.
pub struct GreedyPartitionAllocator {
    pub infeasible_policy: InfeasiblePolicy,
}

impl GreedyPartitionAllocator {
    pub fn new(infeasible_policy: InfeasiblePolicy) -> Self {
        Self { infeasible_policy }
    }

    /// Grow a partition one slot per step, or `None` as soon as a step has no feasible child
    ///
    /// At step `s` the feasibility checks are evaluated for a parent total of `s + 1` slots.
    pub fn greedy_partition(&self, node: &AllocationNode, logger: &mut Logger) -> Option<Vec<u32>> {
        let mut partition = vec![0u32; node.children().len()];
        let log_steps = logger.is_enabled(LogEvent::Step);

        for step in 0..node.export_slots() {
            let candidate_total = step + 1;
            let mut best: Option<(usize, Money)> = None;
            for index in 0..partition.len() {
                partition[index] += 1;
                if is_feasible(&partition, node, candidate_total) {
                    let candidate_score = score(&partition, node);
                    if best.map_or(true, |(_, best_score)| candidate_score > best_score) {
                        best = Some((index, candidate_score));
                    }
                }
                partition[index] -= 1;
            }

            let (index, best_score) = best?;
            partition[index] += 1;
            if log_steps {
                logln!(logger, LogEvent::Step, "{}: step {} adds to '{}' (score {:.4})",
                    node.name(), candidate_total, node.children()[index].name(), best_score);
            }
        }
        Some(partition)
    }
}

impl Default for GreedyPartitionAllocator {
    fn default() -> Self {
        Self::new(InfeasiblePolicy::default())
    }
}

impl PartitionAllocatorTrait for GreedyPartitionAllocator {
    fn allocate(&self, node: &mut AllocationNode, logger: &mut Logger) -> Result<(), AllocationError> {
        match self.greedy_partition(node, logger) {
            Some(partition) => {
                node.assign_partition(&partition);
                let allocated = partition.iter().filter(|&&slots| slots > 0).count();
                logln!(logger, LogEvent::Allocation, "{} ({}): {} slots over {} of {} children, score {:.4}",
                    node.name(), self.get_allocator_type(), node.export_slots(), allocated, partition.len(), score(&partition, node));
                rebalance(node, logger);
                Ok(())
            }
            None => resolve_infeasible(self.infeasible_policy, node, &self.get_allocator_type(), logger),
        }
    }

    fn get_allocator_type(&self) -> String {
        "Greedy".to_string()
    }
}
