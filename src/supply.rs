use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::Distribution;

use crate::allocation_node::{AllocationNode, Money};
use crate::errors::NodeError;
use crate::utils::lognormal_dist;

/// Builds synthetic root → layers → tiers → nodes trees
///
/// Trees are generated bottom-up so that parent attributes follow from their children:
/// - a parent's value is the mean of its children's values
/// - a parent's max rate is 90% of its children's mean max rate
/// - a parent's floor is the highest child floor, its cap the lowest child cap (never below
///   the floor)
/// - a parent's eligible count is the sum over its children; each leaf counts as one
pub struct SupplyTreeGenerator {
    pub layers: usize,
    pub tiers_per_layer: usize,
    pub nodes_per_tier: usize,
    pub root_slots: u32,
    /// Share of leaves that were exported in an earlier cycle
    pub reexport_probability: f64,
    /// Root desired rate as a fraction of the layers' mean max rate
    pub root_rate_fraction: f64,
}

impl Default for SupplyTreeGenerator {
    fn default() -> Self {
        Self {
            layers: 3,
            tiers_per_layer: 6,
            nodes_per_tier: 20,
            root_slots: 40,
            reexport_probability: 0.6,
            root_rate_fraction: 0.5,
        }
    }
}

fn mean(values: impl Iterator<Item = Money>) -> Money {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Parent node summarising `children`
fn parent_of(name: String, children: Vec<AllocationNode>) -> Result<AllocationNode, NodeError> {
    let value = mean(children.iter().map(|c| c.average_value()));
    let rate = 0.9 * mean(children.iter().map(|c| c.historical_max_impression_rate()));
    let floor = children.iter().map(|c| c.floor_price()).fold(0.0, f64::max);
    let cap = children.iter().map(|c| c.price_cap()).fold(f64::INFINITY, f64::min).max(floor);
    let eligible: Money = children.iter().map(|c| c.number_of_eligible_nodes()).sum();
    Ok(AllocationNode::new(name, value, rate, floor, cap, eligible)?.with_children(children))
}

impl SupplyTreeGenerator {
    fn generate_leaf(&self, name: String, tier_rate: Money, rng: &mut StdRng) -> Result<AllocationNode, NodeError> {
        let value = lognormal_dist(10.0, 5.0).sample(rng);
        let rate = lognormal_dist(tier_rate, tier_rate * 0.1).sample(rng);
        let floor = lognormal_dist(2.0, 0.5).sample(rng);
        let cap = floor * (1.0 + lognormal_dist(2.0, 0.5).sample(rng));
        let export_count = if rng.gen_bool(self.reexport_probability) {
            rng.gen_range(1..=5) as f64
        } else {
            0.0
        };
        AllocationNode::new(name, value, rate, floor, cap, 1.0)?
            .with_export_count(export_count)?
            .with_experimental_priority_score(rng.gen::<f64>())
    }

    /// Generate a full tree; the root carries the slot budget, desired rate and spend
    pub fn generate(&self, rng: &mut StdRng) -> Result<AllocationNode, NodeError> {
        let tier_rate_dist = lognormal_dist(100.0, 40.0);

        let mut layers = Vec::with_capacity(self.layers);
        for l in 0..self.layers {
            let mut tiers = Vec::with_capacity(self.tiers_per_layer);
            for t in 0..self.tiers_per_layer {
                let tier_rate = tier_rate_dist.sample(rng);
                let nodes = (0..self.nodes_per_tier)
                    .map(|n| self.generate_leaf(format!("node {}.{}.{}", l, t, n), tier_rate, rng))
                    .collect::<Result<Vec<_>, _>>()?;
                tiers.push(parent_of(format!("tier {}.{}", l, t), nodes)?);
            }
            layers.push(parent_of(format!("layer {}", l), tiers)?);
        }

        let layer_rate = mean(layers.iter().map(|l| l.historical_max_impression_rate()));
        let cpm = mean(layers.iter().map(|l| 0.5 * (l.floor_price() + l.price_cap())));
        Ok(AllocationNode::container("root")
            .with_export_slots(self.root_slots)
            .with_desired_avg_impression_rate(layer_rate * self.root_rate_fraction)?
            .with_avg_cost_per_mille(cpm)?
            .with_children(layers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_shape_and_derived_attributes() {
        let generator = SupplyTreeGenerator {
            layers: 2,
            tiers_per_layer: 3,
            nodes_per_tier: 4,
            ..SupplyTreeGenerator::default()
        };
        let root = generator.generate(&mut StdRng::seed_from_u64(11)).unwrap();

        assert_eq!(root.children().len(), 2);
        for layer in root.children() {
            assert_eq!(layer.children().len(), 3);
            assert_eq!(layer.number_of_eligible_nodes(), 12.0);
            assert!(layer.floor_price() <= layer.price_cap());
            for tier in layer.children() {
                assert_eq!(tier.children().len(), 4);
                assert_eq!(tier.number_of_eligible_nodes(), 4.0);
                let floors = tier.children().iter().map(|n| n.floor_price()).fold(0.0, f64::max);
                assert_eq!(tier.floor_price(), floors);
                assert!(tier.children().windows(2).all(|w| w[0].average_value() >= w[1].average_value()));
            }
        }
    }

    #[test]
    fn test_same_seed_same_tree() {
        let generator = SupplyTreeGenerator::default();
        let a = generator.generate(&mut StdRng::seed_from_u64(5)).unwrap();
        let b = generator.generate(&mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a, b);
    }
}
