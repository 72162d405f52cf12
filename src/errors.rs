use thiserror::Error;

/// Rejected node attributes, reported at construction time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("floor price {floor} is above price cap {cap}")]
    FloorAboveCap { floor: f64, cap: f64 },
}

/// Failures surfaced by the allocators
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    /// No partition of the slots satisfies capacity, volume and floor-price constraints
    #[error("no feasible partition of {export_slots} export slots among the children of '{node}'")]
    Infeasible { node: String, export_slots: u32 },

    /// Exhaustive search would have to score more compositions than allowed
    #[error("exhaustive search for '{node}' needs {compositions} compositions, above the configured limit")]
    SearchTooLarge { node: String, compositions: u64 },
}

/// What to do when no feasible partition exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfeasiblePolicy {
    /// Return `AllocationError::Infeasible`
    #[default]
    Error,
    /// Log a warning and leave every child at zero slots
    ZeroAllocation,
}
