use crate::allocation_node::AllocationNode;
use crate::errors::{AllocationError, InfeasiblePolicy};
use crate::logger::{LogEvent, Logger};
use crate::warnln;

/// Trait for strategies that split a node's export slots among its children
pub trait PartitionAllocatorTrait {
    /// Write a slot count onto every child of `node`
    ///
    /// On success the children's slots sum to `node.export_slots()`. On failure every child is
    /// left at zero slots.
    fn allocate(&self, node: &mut AllocationNode, logger: &mut Logger) -> Result<(), AllocationError>;

    /// Get the name/type of this allocator
    fn get_allocator_type(&self) -> String;
}

/// Reset the node to the all-zero partition and report infeasibility according to `policy`
pub(crate) fn resolve_infeasible(policy: InfeasiblePolicy, node: &mut AllocationNode, allocator_type: &str, logger: &mut Logger) -> Result<(), AllocationError> {
    let zeros = vec![0; node.children().len()];
    node.assign_partition(&zeros);
    match policy {
        InfeasiblePolicy::Error => Err(AllocationError::Infeasible {
            node: node.name().to_string(),
            export_slots: node.export_slots(),
        }),
        InfeasiblePolicy::ZeroAllocation => {
            warnln!(logger, LogEvent::Allocation, "{} ({}): no feasible partition of {} slots among {} children, keeping zero allocation",
                node.name(), allocator_type, node.export_slots(), node.children().len());
            Ok(())
        }
    }
}
