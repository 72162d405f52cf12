use crate::allocation_node::AllocationNode;
use crate::allocator::PartitionAllocatorTrait;
use crate::errors::AllocationError;
use crate::logger::{LogEvent, Logger};
use crate::logln;

/// Grants one slot each to the children with the highest experimental priority
///
/// Meant for leaf tiers of never-exported candidates: no feasibility, volume or pricing logic.
/// The children keep their value order; ranking works on indices. Equal scores go to the child
/// that comes first in value order.
pub struct ExperimentRankingAllocator;

impl ExperimentRankingAllocator {
    /// Child indices by descending experimental priority
    pub fn ranking(node: &AllocationNode) -> Vec<usize> {
        let children = node.children();
        let mut order: Vec<usize> = (0..children.len()).collect();
        order.sort_by(|&a, &b| {
            children[b].experimental_priority_score().total_cmp(&children[a].experimental_priority_score())
        });
        order
    }
}

impl PartitionAllocatorTrait for ExperimentRankingAllocator {
    fn allocate(&self, node: &mut AllocationNode, logger: &mut Logger) -> Result<(), AllocationError> {
        let mut partition = vec![0u32; node.children().len()];
        let selected = (node.export_slots() as usize).min(partition.len());
        for &index in Self::ranking(node).iter().take(selected) {
            partition[index] = 1;
        }
        node.assign_partition(&partition);

        logln!(logger, LogEvent::Allocation, "{} ({}): {} of {} candidates selected for {} slots",
            node.name(), self.get_allocator_type(), selected, partition.len(), node.export_slots());
        Ok(())
    }

    fn get_allocator_type(&self) -> String {
        "ExperimentRanking".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(scores: &[f64], slots: u32) -> AllocationNode {
        let children = scores.iter().enumerate()
            .map(|(i, &s)| {
                AllocationNode::new(format!("node {}", i), 1.0, 10.0, 1.0, 2.0, 1.0).unwrap()
                    .with_experimental_priority_score(s).unwrap()
            })
            .collect();
        AllocationNode::container("tier").with_export_slots(slots).with_children(children)
    }

    #[test]
    fn test_top_four_of_ten() {
        let scores: Vec<f64> = (0..10).map(|s| s as f64).collect();
        let mut node = candidates(&scores, 4);
        ExperimentRankingAllocator.allocate(&mut node, &mut Logger::new()).unwrap();

        let winners: Vec<f64> = node.children().iter()
            .filter(|c| c.export_slots() == 1)
            .map(|c| c.experimental_priority_score())
            .collect();
        assert_eq!(winners, vec![6.0, 7.0, 8.0, 9.0]);
        assert!(node.children().iter().all(|c| c.export_slots() <= 1));
    }

    #[test]
    fn test_more_slots_than_candidates() {
        let mut node = candidates(&[0.3, 0.1], 5);
        ExperimentRankingAllocator.allocate(&mut node, &mut Logger::new()).unwrap();
        assert_eq!(node.partition(), vec![1, 1]);
    }

    #[test]
    fn test_ties_go_to_earlier_child() {
        let mut node = candidates(&[0.5, 0.9, 0.5, 0.5], 2);
        ExperimentRankingAllocator.allocate(&mut node, &mut Logger::new()).unwrap();
        assert_eq!(node.partition(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_previous_allocation_cleared() {
        let mut node = candidates(&[0.1, 0.2, 0.3], 1);
        node.assign_partition(&[1, 1, 0]);
        ExperimentRankingAllocator.allocate(&mut node, &mut Logger::new()).unwrap();
        assert_eq!(node.partition(), vec![0, 0, 1]);
    }
}
