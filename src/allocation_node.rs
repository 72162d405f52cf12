use crate::errors::NodeError;
use crate::logger::{LogEvent, Logger};
use crate::logln;

/// Monetary and rate quantities (values, impression rates, CPMs)
pub type Money = f64;

/// One segment of supply at any level of the tree (root, layer, tier or leaf node)
///
/// Inputs (values, rates, price bounds, eligible-node counts, ranking data) are fixed at
/// construction. Allocators only write `export_slots`, `desired_avg_impression_rate` and
/// `avg_cost_per_mille`.
///
/// Children are always kept sorted by `average_value` descending. The collection can only be
/// replaced as a whole, which re-sorts it; in-place access never allows reordering.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationNode {
    name: String,
    average_value: Money,
    export_slots: u32,
    historical_max_impression_rate: Money,
    desired_avg_impression_rate: Money,
    avg_cost_per_mille: Money,
    floor_price: Money,
    price_cap: Money,
    number_of_eligible_nodes: Money,
    experimental_priority_score: f64,
    export_count: f64,
    children: Vec<AllocationNode>,
}

fn check_finite(field: &'static str, value: f64) -> Result<(), NodeError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NodeError::NonFinite { field })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), NodeError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(NodeError::Negative { field, value });
    }
    Ok(())
}

impl AllocationNode {
    /// Create a node with zero slots, zero desired rate, zero price and no children
    ///
    /// # Arguments
    /// * `name` - Label used in logs and charts
    /// * `average_value` - Relative value score of one unit of this segment's volume
    /// * `historical_max_impression_rate` - Highest sustainable impression rate per slot
    /// * `floor_price` - Lowest acceptable CPM
    /// * `price_cap` - Highest acceptable CPM, must not be below `floor_price`
    /// * `number_of_eligible_nodes` - Ceiling on the slots this node can hold
    pub fn new(
        name: impl Into<String>,
        average_value: Money,
        historical_max_impression_rate: Money,
        floor_price: Money,
        price_cap: Money,
        number_of_eligible_nodes: Money,
    ) -> Result<Self, NodeError> {
        check_finite("average_value", average_value)?;
        check_non_negative("historical_max_impression_rate", historical_max_impression_rate)?;
        check_non_negative("floor_price", floor_price)?;
        check_non_negative("price_cap", price_cap)?;
        check_non_negative("number_of_eligible_nodes", number_of_eligible_nodes)?;
        if floor_price > price_cap {
            return Err(NodeError::FloorAboveCap { floor: floor_price, cap: price_cap });
        }

        Ok(Self {
            name: name.into(),
            average_value,
            export_slots: 0,
            historical_max_impression_rate,
            desired_avg_impression_rate: 0.0,
            avg_cost_per_mille: 0.0,
            floor_price,
            price_cap,
            number_of_eligible_nodes,
            experimental_priority_score: 0.0,
            export_count: 0.0,
            children: Vec::new(),
        })
    }

    /// Node used purely as a container (root or tier) whose own price bounds are irrelevant
    pub fn container(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            average_value: 0.0,
            export_slots: 0,
            historical_max_impression_rate: 0.0,
            desired_avg_impression_rate: 0.0,
            avg_cost_per_mille: 0.0,
            floor_price: 0.0,
            price_cap: 0.0,
            number_of_eligible_nodes: 0.0,
            experimental_priority_score: 0.0,
            export_count: 0.0,
            children: Vec::new(),
        }
    }

    pub fn with_export_slots(mut self, export_slots: u32) -> Self {
        self.export_slots = export_slots;
        self
    }

    pub fn with_desired_avg_impression_rate(mut self, rate: Money) -> Result<Self, NodeError> {
        check_non_negative("desired_avg_impression_rate", rate)?;
        self.desired_avg_impression_rate = rate;
        Ok(self)
    }

    pub fn with_avg_cost_per_mille(mut self, cpm: Money) -> Result<Self, NodeError> {
        check_non_negative("avg_cost_per_mille", cpm)?;
        self.avg_cost_per_mille = cpm;
        Ok(self)
    }

    pub fn with_experimental_priority_score(mut self, score: f64) -> Result<Self, NodeError> {
        check_finite("experimental_priority_score", score)?;
        self.experimental_priority_score = score;
        Ok(self)
    }

    pub fn with_export_count(mut self, export_count: f64) -> Result<Self, NodeError> {
        check_non_negative("export_count", export_count)?;
        self.export_count = export_count;
        Ok(self)
    }

    pub fn with_children(mut self, children: Vec<AllocationNode>) -> Self {
        self.set_children(children);
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn average_value(&self) -> Money { self.average_value }
    pub fn export_slots(&self) -> u32 { self.export_slots }
    pub fn historical_max_impression_rate(&self) -> Money { self.historical_max_impression_rate }
    pub fn desired_avg_impression_rate(&self) -> Money { self.desired_avg_impression_rate }
    pub fn avg_cost_per_mille(&self) -> Money { self.avg_cost_per_mille }
    pub fn floor_price(&self) -> Money { self.floor_price }
    pub fn price_cap(&self) -> Money { self.price_cap }
    pub fn number_of_eligible_nodes(&self) -> Money { self.number_of_eligible_nodes }
    pub fn experimental_priority_score(&self) -> f64 { self.experimental_priority_score }
    pub fn export_count(&self) -> f64 { self.export_count }

    /// Slot budget handed down by the caller (or by the allocation of the parent level)
    pub fn set_export_slots(&mut self, export_slots: u32) {
        self.export_slots = export_slots;
    }

    pub fn set_desired_avg_impression_rate(&mut self, rate: Money) {
        self.desired_avg_impression_rate = rate;
    }

    pub fn set_avg_cost_per_mille(&mut self, cpm: Money) {
        self.avg_cost_per_mille = cpm;
    }

    /// Children, most valuable first
    pub fn children(&self) -> &[AllocationNode] {
        &self.children
    }

    /// Replace the children collection, re-establishing the descending value order
    /// The sort is stable, so equally valued children keep the caller's order
    pub fn set_children(&mut self, mut children: Vec<AllocationNode>) {
        children.sort_by(|a, b| b.average_value.total_cmp(&a.average_value));
        self.children = children;
    }

    /// In-place access for allocators; a slice cannot grow, shrink or be re-sorted by value
    pub(crate) fn children_mut(&mut self) -> &mut [AllocationNode] {
        &mut self.children
    }

    pub(crate) fn take_children(&mut self) -> Vec<AllocationNode> {
        std::mem::take(&mut self.children)
    }

    /// Put back children that were taken out with `take_children`, without re-sorting
    pub(crate) fn restore_children(&mut self, children: Vec<AllocationNode>) {
        debug_assert!(children.windows(2).all(|w| w[0].average_value >= w[1].average_value));
        self.children = children;
    }

    /// Mutable access to a whole subtree level, for the orchestrator to walk down the tree
    pub fn child_mut(&mut self, index: usize) -> Option<&mut AllocationNode> {
        self.children.get_mut(index)
    }

    pub fn total_desired_impression_rate(&self) -> Money {
        self.export_slots as f64 * self.desired_avg_impression_rate
    }

    pub fn max_achievable_total_impression_rate(&self) -> Money {
        self.export_slots as f64 * self.historical_max_impression_rate
    }

    pub fn total_desired_spend_rate(&self) -> Money {
        self.total_desired_impression_rate() * self.avg_cost_per_mille
    }

    /// Current slot count of every child, in child order
    pub fn partition(&self) -> Vec<u32> {
        self.children.iter().map(|c| c.export_slots).collect()
    }

    /// Write a partition onto the children's slot counts
    pub(crate) fn assign_partition(&mut self, partition: &[u32]) {
        assert_eq!(partition.len(), self.children.len(), "partition length must match children count");
        for (child, &slots) in self.children.iter_mut().zip(partition) {
            child.export_slots = slots;
        }
    }

    /// Index of the least valuable child holding any slots
    pub fn marginal_child_index(&self) -> Option<usize> {
        self.children.iter().rposition(|c| c.export_slots > 0)
    }

    /// Output one line per child with allocation and pricing fields
    pub fn printout(&self, logger: &mut Logger, event: LogEvent) {
        logln!(logger, event, "{} - slots: {}, desired rate: {:.2}, cpm: {:.4}, children: {}",
            self.name, self.export_slots, self.desired_avg_impression_rate, self.avg_cost_per_mille, self.children.len());
        for (index, child) in self.children.iter().enumerate() {
            if child.export_slots == 0 {
                continue;
            }
            logln!(logger, event, "  [{}] {} value: {:.2}, slots: {} / {}, rate (desired/max): {:.2} / {:.2}, cpm: {:.4} in [{:.2}, {:.2}]",
                index,
                child.name,
                child.average_value,
                child.export_slots,
                child.number_of_eligible_nodes,
                child.desired_avg_impression_rate,
                child.historical_max_impression_rate,
                child.avg_cost_per_mille,
                child.floor_price,
                child.price_cap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, value: f64) -> AllocationNode {
        AllocationNode::new(name, value, 10.0, 1.0, 2.0, 5.0).unwrap()
    }

    #[test]
    fn test_new_rejects_floor_above_cap() {
        let err = AllocationNode::new("bad", 1.0, 10.0, 3.0, 2.0, 1.0).unwrap_err();
        assert_eq!(err, NodeError::FloorAboveCap { floor: 3.0, cap: 2.0 });
    }

    #[test]
    fn test_new_rejects_negative_and_non_finite() {
        assert!(matches!(
            AllocationNode::new("bad", 1.0, -1.0, 1.0, 2.0, 1.0),
            Err(NodeError::Negative { field: "historical_max_impression_rate", .. })
        ));
        assert!(matches!(
            AllocationNode::new("bad", f64::NAN, 1.0, 1.0, 2.0, 1.0),
            Err(NodeError::NonFinite { field: "average_value" })
        ));
        assert!(matches!(
            AllocationNode::container("tier").with_desired_avg_impression_rate(-5.0),
            Err(NodeError::Negative { .. })
        ));
    }

    #[test]
    fn test_children_sorted_on_assignment() {
        let node = AllocationNode::container("root")
            .with_children(vec![leaf("low", 1.0), leaf("high", 9.0), leaf("mid", 5.0)]);
        let names: Vec<&str> = node.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_values() {
        let node = AllocationNode::container("root")
            .with_children(vec![leaf("a", 0.0), leaf("b", 3.0), leaf("c", 0.0)]);
        let names: Vec<&str> = node.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_derived_quantities() {
        let node = AllocationNode::new("n", 1.0, 50.0, 1.0, 4.0, 10.0).unwrap()
            .with_export_slots(4)
            .with_desired_avg_impression_rate(20.0).unwrap()
            .with_avg_cost_per_mille(3.0).unwrap();
        assert_eq!(node.total_desired_impression_rate(), 80.0);
        assert_eq!(node.max_achievable_total_impression_rate(), 200.0);
        assert_eq!(node.total_desired_spend_rate(), 240.0);
    }

    #[test]
    fn test_marginal_child_index() {
        let mut node = AllocationNode::container("root")
            .with_children(vec![leaf("a", 3.0), leaf("b", 2.0), leaf("c", 1.0)]);
        assert_eq!(node.marginal_child_index(), None);
        node.assign_partition(&[2, 1, 0]);
        assert_eq!(node.marginal_child_index(), Some(1));
        assert_eq!(node.partition(), vec![2, 1, 0]);
    }
}
