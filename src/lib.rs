//! Hierarchical export-slot allocation for a tree of supply segments
//! (root → layers → tiers → nodes): how many slots each segment receives and at what price.

pub mod allocation_node;
pub mod allocator;
pub mod allocator_exact;
pub mod allocator_greedy;
pub mod allocator_ranking;
pub mod compositions;
pub mod errors;
pub mod feasibility;
pub mod logger;
pub mod orchestrator;
pub mod price_cascade;
pub mod schedule;
pub mod score;
pub mod supply;
pub mod utils;
pub mod volume_budget;

pub use allocation_node::{AllocationNode, Money};
pub use allocator::PartitionAllocatorTrait;
pub use errors::{AllocationError, InfeasiblePolicy, NodeError};
pub use orchestrator::{AllocationConfig, AllocationOrchestrator, AllocationSummary, NodeSplit};
pub use price_cascade::PricingOutcome;
