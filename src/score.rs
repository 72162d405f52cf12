use crate::allocation_node::{AllocationNode, Money};

/// Total expected value of a partition: Σ slots · max rate · average value
pub fn score(partition: &[u32], parent: &AllocationNode) -> Money {
    partition.iter()
        .zip(parent.children())
        .map(|(&slots, child)| slots as f64 * child.historical_max_impression_rate() * child.average_value())
        .sum()
}
