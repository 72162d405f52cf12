use crate::allocation_node::{AllocationNode, Money};
use crate::logger::{LogEvent, Logger};
use crate::{logln, warnln};

/// Tolerance when comparing the children's spend with the parent's
pub const BUDGET_TOLERANCE: Money = 0.01;

/// How a price cascade ended
#[derive(Debug, Clone, PartialEq)]
pub enum PricingOutcome {
    /// No child holds slots; nothing was priced
    NothingAllocated,
    /// Child `marginal` took the residual price; every more valuable child sits at its cap
    Balanced { marginal: usize, price: Money },
    /// Every allocated child is at its cap and the parent's spend is still not reached
    CapsExhausted { shortfall: Money },
}

/// Assign `avg_cost_per_mille` to every allocated child so the children's spend matches the parent's
///
/// All allocated children start at their floor. Going from the most valuable child down, each
/// child is asked to carry the spend that the others do not; a child that would need more than
/// its cap is pinned to the cap and the next child is tried.
///
/// Panics if an allocated child has zero desired volume.
pub fn price(node: &mut AllocationNode, logger: &mut Logger) -> PricingOutcome {
    let allocated: Vec<usize> = node.children().iter()
        .enumerate()
        .filter(|(_, c)| c.export_slots() > 0)
        .map(|(i, _)| i)
        .collect();
    if allocated.is_empty() {
        return PricingOutcome::NothingAllocated;
    }

    let total_spend_rate = node.total_desired_spend_rate();
    let node_name = node.name().to_string();
    let children = node.children_mut();

    for &i in &allocated {
        let floor = children[i].floor_price();
        children[i].set_avg_cost_per_mille(floor);
    }

    for &i in &allocated {
        let others: Money = allocated.iter()
            .filter(|&&j| j != i)
            .map(|&j| children[j].total_desired_spend_rate())
            .sum();
        let child = &mut children[i];
        let volume = child.total_desired_impression_rate();
        assert!(volume != 0.0, "allocated child '{}' has zero desired impression rate", child.name());

        let price_required = (total_spend_rate - others) / volume;
        if price_required > child.price_cap() {
            let cap = child.price_cap();
            child.set_avg_cost_per_mille(cap);
            logln!(logger, LogEvent::Pricing, "{}: '{}' needs {:.4}, pinned to cap {:.4}",
                node_name, child.name(), price_required, cap);
            continue;
        }

        child.set_avg_cost_per_mille(price_required);
        logln!(logger, LogEvent::Pricing, "{}: '{}' priced at {:.4} (floor {:.4}, cap {:.4})",
            node_name, child.name(), price_required, child.floor_price(), child.price_cap());
        if price_required < child.floor_price() {
            warnln!(logger, LogEvent::Pricing, "{}: '{}' priced below its floor ({:.4} < {:.4})",
                node_name, child.name(), price_required, child.floor_price());
        }
        return PricingOutcome::Balanced { marginal: i, price: price_required };
    }

    let children_spend: Money = allocated.iter().map(|&j| children[j].total_desired_spend_rate()).sum();
    let shortfall = total_spend_rate - children_spend;
    warnln!(logger, LogEvent::Pricing, "{}: all allocated children at cap, spend short by {:.4}", node_name, shortfall);
    PricingOutcome::CapsExhausted { shortfall }
}

/// Children's total spend matches the parent's within `BUDGET_TOLERANCE`
pub fn is_budget_balanced(node: &AllocationNode) -> bool {
    let children_spend: Money = node.children().iter().map(|c| c.total_desired_spend_rate()).sum();
    (children_spend - node.total_desired_spend_rate()).abs() <= BUDGET_TOLERANCE
}
