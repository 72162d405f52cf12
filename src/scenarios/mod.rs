use std::error::Error;
use std::sync::atomic::AtomicU64;
use exportalloc::logger::{LogEvent, Logger};
use exportalloc::{errln, logln};

/// Number of allocations run by scenarios since the runner started
pub static TOTAL_ALLOCATION_RUNS: AtomicU64 = AtomicU64::new(0);

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

// Create an inventory collection for scenario entries
inventory::collect!(ScenarioEntry);

/// Get all registered scenarios from the catalog, sorted by name
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut entries: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>
        .into_iter()
        .cloned()
        .collect();
    entries.sort_by_key(|entry| entry.short_name);
    entries
}

/// Collects the outcome of each property check a scenario makes
pub struct Validation {
    errors: Vec<String>,
}

impl Validation {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Log a passing check with a tick, or record a failing one
    pub fn check(&mut self, logger: &mut Logger, passed: bool, msg: String) {
        if passed {
            logln!(logger, LogEvent::Scenario, "✓ {}", msg);
        } else {
            errln!(logger, LogEvent::Scenario, "{}", msg);
            self.errors.push(msg);
        }
    }

    pub fn finish(self, scenario_name: &str) -> Result<(), Box<dyn Error>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, self.errors.join("\n")).into())
        }
    }
}

// Scenario modules
pub mod layers_exact;
pub mod tiers_greedy;
pub mod nodes_split;
pub mod random_trees;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_catalog_sorted_and_complete() {
        let names: Vec<&str> = get_scenario_catalog().iter().map(|s| s.short_name).collect();
        assert_eq!(names, vec!["layers_exact", "nodes_split", "random_trees", "tiers_greedy"]);
    }

    #[test]
    fn test_scenario_runs_are_counted() {
        let before = TOTAL_ALLOCATION_RUNS.load(Ordering::Relaxed);
        layers_exact::run("layers_exact", &mut Logger::new()).unwrap();
        // Other tests may run scenarios concurrently, so only a lower bound holds
        assert!(TOTAL_ALLOCATION_RUNS.load(Ordering::Relaxed) >= before + 2);
    }
}
