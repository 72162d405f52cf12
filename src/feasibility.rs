use crate::allocation_node::{AllocationNode, Money};

/// Slack allowed on the volume and spend comparisons to absorb floating point noise
const FEASIBILITY_EPSILON: f64 = 1e-9;

/// The first constraint a candidate partition breaks
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// A child would receive more slots than it has eligible nodes
    Capacity { child: usize, slots: u32, eligible: Money },
    /// Even at their maximum rates the children cannot deliver the parent's desired volume
    Volume { achievable: Money, required: Money },
    /// Pricing every child at its floor already exceeds the parent's spend
    FloorPrice { floor_spend: Money, budget: Money },
}

fn within(lhs: Money, rhs: Money) -> bool {
    lhs <= rhs + FEASIBILITY_EPSILON * rhs.abs().max(1.0)
}

/// Every child's slot count is within its eligible-node ceiling
pub fn check_capacity(partition: &[u32], parent: &AllocationNode) -> Result<(), Violation> {
    for (index, (&slots, child)) in partition.iter().zip(parent.children()).enumerate() {
        if slots as f64 > child.number_of_eligible_nodes() {
            return Err(Violation::Capacity { child: index, slots, eligible: child.number_of_eligible_nodes() });
        }
    }
    Ok(())
}

/// Children running at their historical maximum can cover the parent's desired volume
pub fn check_volume(partition: &[u32], parent: &AllocationNode, candidate_total: u32) -> Result<(), Violation> {
    let required = candidate_total as f64 * parent.desired_avg_impression_rate();
    let achievable: Money = partition.iter()
        .zip(parent.children())
        .map(|(&slots, child)| slots as f64 * child.historical_max_impression_rate())
        .sum();
    if within(required, achievable) {
        Ok(())
    } else {
        Err(Violation::Volume { achievable, required })
    }
}

/// Floor pricing fits the parent's spend
///
/// Walking from the least valuable child upwards, the first child holding slots is the marginal
/// child. Every more valuable child runs at its maximum rate priced at its floor; the marginal
/// child absorbs whatever volume remains, also at its floor.
pub fn check_floor_price(partition: &[u32], parent: &AllocationNode, candidate_total: u32) -> Result<(), Violation> {
    let required_volume = candidate_total as f64 * parent.desired_avg_impression_rate();
    let budget = required_volume * parent.avg_cost_per_mille();

    let mut volume: Money = 0.0;
    let mut spend: Money = 0.0;
    let mut marginal_floor: Option<Money> = None;
    for (&slots, child) in partition.iter().zip(parent.children()).rev() {
        if slots == 0 {
            continue;
        }
        if marginal_floor.is_none() {
            marginal_floor = Some(child.floor_price());
            continue;
        }
        let child_volume = slots as f64 * child.historical_max_impression_rate();
        volume += child_volume;
        spend += child_volume * child.floor_price();
    }

    let floor_spend = match marginal_floor {
        Some(floor) => spend + (required_volume - volume) * floor,
        // Nothing allocated: only an empty demand is affordable
        None if required_volume > 0.0 => f64::INFINITY,
        None => 0.0,
    };
    if within(floor_spend, budget) {
        Ok(())
    } else {
        Err(Violation::FloorPrice { floor_spend, budget })
    }
}

/// Run all three checks, returning the first violation
///
/// `candidate_total` is the slot total the parent is being evaluated for; it stands in for the
/// parent's own `export_slots` so that incremental searches need not mutate the parent.
/// Volume and spend comparisons allow a relative slack of `FEASIBILITY_EPSILON` (1e-9, at least
/// 1e-9 absolute), so a bound missed only by floating point noise still counts as met.
pub fn check(partition: &[u32], parent: &AllocationNode, candidate_total: u32) -> Result<(), Violation> {
    debug_assert_eq!(partition.len(), parent.children().len());
    check_capacity(partition, parent)?;
    check_volume(partition, parent, candidate_total)?;
    check_floor_price(partition, parent, candidate_total)
}

pub fn is_feasible(partition: &[u32], parent: &AllocationNode, candidate_total: u32) -> bool {
    check(partition, parent, candidate_total).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The three-layer setup: (value, max rate, floor, cap, eligible)
    fn layers(slots: u32, desired_rate: f64, cpm: f64) -> AllocationNode {
        AllocationNode::container("root")
            .with_export_slots(slots)
            .with_desired_avg_impression_rate(desired_rate).unwrap()
            .with_avg_cost_per_mille(cpm).unwrap()
            .with_children(vec![
                AllocationNode::new("layer 0", 1.0, 10.0, 5.0, 15.0, 500000.0).unwrap(),
                AllocationNode::new("layer 1", 0.0, 100.0, 3.0, 5.0, 500000.0).unwrap(),
                AllocationNode::new("layer 2", 0.0, 1000.0, 1.0, 2.0, 500000.0).unwrap(),
            ])
    }

    #[test]
    fn test_capacity_violation() {
        let parent = AllocationNode::container("tier").with_children(vec![
            AllocationNode::new("a", 2.0, 100.0, 1.0, 2.0, 3.0).unwrap(),
            AllocationNode::new("b", 1.0, 100.0, 1.0, 2.0, 3.0).unwrap(),
        ]);
        assert_eq!(check_capacity(&[3, 3], &parent), Ok(()));
        assert_eq!(check_capacity(&[4, 0], &parent), Err(Violation::Capacity { child: 0, slots: 4, eligible: 3.0 }));
    }

    #[test]
    fn test_volume_uses_max_rate() {
        let parent = layers(10, 200.0, 2.0);
        // 80 + 2000 covers 2000
        assert!(check_volume(&[8, 0, 2], &parent, 10).is_ok());
        // 90 + 1000 does not
        assert_eq!(
            check_volume(&[9, 0, 1], &parent, 10),
            Err(Violation::Volume { achievable: 1090.0, required: 2000.0 })
        );
    }

    #[test]
    fn test_floor_price_marginal_child_absorbs_residual() {
        // Layer 0 at floor: 80 * 5 = 400; layer 2 absorbs 1920 at floor 1 => 2320
        let affordable = layers(10, 200.0, 1.2);
        assert!(check_floor_price(&[8, 0, 2], &affordable, 10).is_ok());

        let too_cheap = layers(10, 200.0, 1.1);
        assert_eq!(
            check_floor_price(&[8, 0, 2], &too_cheap, 10),
            Err(Violation::FloorPrice { floor_spend: 2320.0, budget: 2000.0 * 1.1 })
        );
    }

    #[test]
    fn test_candidate_total_replaces_parent_slots() {
        let parent = layers(0, 200.0, 2.0);
        assert!(is_feasible(&[8, 0, 2], &parent, 10));
        assert!(!is_feasible(&[8, 0, 2], &parent, 11));
    }

    #[test]
    fn test_volume_slack_absorbs_rounding_noise() {
        // [8, 0, 2] delivers exactly 2080 at max rates
        let exact = layers(0, 208.0, 2.0);
        assert!(check_volume(&[8, 0, 2], &exact, 10).is_ok());

        let noisy = layers(0, 208.0 * (1.0 + 1e-12), 2.0);
        assert!(check_volume(&[8, 0, 2], &noisy, 10).is_ok());

        let short = layers(0, 208.0 * (1.0 + 1e-6), 2.0);
        assert!(check_volume(&[8, 0, 2], &short, 10).is_err());
    }

    #[test]
    fn test_empty_partition() {
        let parent = layers(0, 200.0, 2.0);
        assert!(is_feasible(&[0, 0, 0], &parent, 0));
        assert!(!is_feasible(&[0, 0, 0], &parent, 1));
    }
}
