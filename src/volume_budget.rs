use crate::allocation_node::{AllocationNode, Money};
use crate::logger::{LogEvent, Logger};
use crate::{logln, warnln};

/// Set the children's desired rates so that their total desired volume equals the parent's
///
/// Allocated children are assumed to run at their historical maximum; the least valuable
/// allocated child takes the whole difference, spread over its slots.
pub fn rebalance(node: &mut AllocationNode, logger: &mut Logger) {
    let Some(marginal) = node.marginal_child_index() else {
        return;
    };
    let parent_volume = node.total_desired_impression_rate();
    let node_name = node.name().to_string();

    let children = node.children_mut();
    let mut children_volume: Money = 0.0;
    for child in children.iter_mut().filter(|c| c.export_slots() > 0) {
        child.set_desired_avg_impression_rate(child.historical_max_impression_rate());
        children_volume += child.total_desired_impression_rate();
    }

    let child = &mut children[marginal];
    let correction = (parent_volume - children_volume) / child.export_slots() as f64;
    let adjusted = child.desired_avg_impression_rate() + correction;
    child.set_desired_avg_impression_rate(adjusted);

    logln!(logger, LogEvent::Allocation, "{}: volume slack {:.4} absorbed by '{}' (desired rate now {:.4})",
        node_name, parent_volume - children_volume, child.name(), adjusted);
    if adjusted < 0.0 {
        warnln!(logger, LogEvent::Allocation, "{}: '{}' ends with negative desired rate {:.4}",
            node_name, child.name(), adjusted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slack_goes_to_least_valuable_allocated_child() {
        let mut node = AllocationNode::container("root")
            .with_export_slots(10)
            .with_desired_avg_impression_rate(200.0).unwrap()
            .with_children(vec![
                AllocationNode::new("a", 1.0, 10.0, 5.0, 15.0, 100.0).unwrap(),
                AllocationNode::new("b", 0.5, 100.0, 3.0, 5.0, 100.0).unwrap(),
                AllocationNode::new("c", 0.1, 1000.0, 1.0, 2.0, 100.0).unwrap(),
            ]);
        node.assign_partition(&[8, 0, 2]);

        let mut logger = Logger::new();
        rebalance(&mut node, &mut logger);

        let children = node.children();
        assert_eq!(children[0].desired_avg_impression_rate(), 10.0);
        // Untouched: no slots
        assert_eq!(children[1].desired_avg_impression_rate(), 0.0);
        // 1000 + (2000 - 80 - 2000) / 2
        assert_eq!(children[2].desired_avg_impression_rate(), 960.0);

        let total: f64 = children.iter().map(|c| c.total_desired_impression_rate()).sum();
        assert!((total - node.total_desired_impression_rate()).abs() < 1e-9);
    }

    #[test]
    fn test_nothing_allocated_is_noop() {
        let mut node = AllocationNode::container("root")
            .with_children(vec![AllocationNode::new("a", 1.0, 10.0, 5.0, 15.0, 100.0).unwrap()]);
        let before = node.clone();
        rebalance(&mut node, &mut Logger::new());
        assert_eq!(node, before);
    }
}
