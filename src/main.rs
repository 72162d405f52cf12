mod scenarios;
mod charts;

use exportalloc::logger::{Logger, LogEvent, ConsoleReceiver, FileReceiver, LogReceiver, sanitize_filename};
use exportalloc::utils::RAND_SEED;
use exportalloc::{log, logln};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use scenarios::{get_scenario_catalog, TOTAL_ALLOCATION_RUNS};

/// Open a file receiver, falling back to no receiver when the log file cannot be created
fn file_receiver(path: &str, events: Vec<LogEvent>) -> Option<Box<dyn LogReceiver>> {
    match FileReceiver::new(&PathBuf::from(path), events) {
        Ok(receiver) => Some(receiver),
        Err(e) => {
            eprintln!("Warning: cannot open log file '{}': {}", path, e);
            None
        }
    }
}

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();

    // Parse and filter out --verbose and --fastbreak arguments
    let mut args = Vec::new();
    let mut fastbreak = false;
    let mut verbose = false;
    for arg in raw_args.iter() {
        if arg == "--verbose" {
            verbose = true;
            continue;
        }
        if arg == "--fastbreak" {
            fastbreak = true;
            continue;
        }
        args.push(arg.clone());
    }

    // Check if "charts" argument is provided
    if args.len() > 1 && args[1] == "charts" {
        match charts::generate_allocation_charts() {
            Ok(()) => {
                println!("Allocation chart generation completed successfully.");
            }
            Err(e) => {
                eprintln!("Error generating charts: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if args.len() > 1 {
        let scenario_arg = &args[1];

        // Parse iterations parameter if present
        let iterations = if args.len() > 2 {
            match args[2].parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!("Error: Invalid iterations parameter '{}'. Expected a number.", args[2]);
                    std::process::exit(1);
                }
            }
        } else {
            1
        };

        // Parse optional starting seed if present
        let start_iteration = if args.len() > 3 {
            match args[3].parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!("Error: Invalid start iteration parameter '{}'. Expected a number.", args[3]);
                    std::process::exit(1);
                }
            }
        } else {
            0
        };

        let all_scenarios = get_scenario_catalog();

        let scenarios: Vec<_> = if scenario_arg == "all" {
            all_scenarios.clone()
        } else {
            let found = all_scenarios.iter().find(|s| s.short_name == scenario_arg);
            match found {
                Some(scenario) => vec![scenario.clone()],
                None => {
                    eprintln!("Error: Scenario '{}' not found.", scenario_arg);
                    eprintln!("Available scenarios:");
                    for s in &all_scenarios {
                        eprintln!("  - {}", s.short_name);
                    }
                    std::process::exit(1);
                }
            }
        };

        // Scenario-level detail only for a single run of a single scenario
        let mut logger = Logger::new();
        let mut console_events = vec![LogEvent::Validation];
        if scenario_arg != "all" && iterations == 1 {
            console_events.push(LogEvent::Scenario);
        }
        if verbose {
            console_events.extend([LogEvent::Level, LogEvent::Pricing, LogEvent::Allocation, LogEvent::Step]);
        }
        logger.add_receiver(ConsoleReceiver::new(console_events));

        let summary_receiver_id = file_receiver("log/summary.log", vec![LogEvent::Validation])
            .map(|receiver| logger.add_receiver(receiver));

        TOTAL_ALLOCATION_RUNS.store(0, Ordering::Relaxed);

        if scenario_arg == "all" {
            logln!(&mut logger, LogEvent::Validation, "Running all scenarios {} time(s)...\n", iterations);
        } else {
            logln!(&mut logger, LogEvent::Validation, "Running scenario '{}' {} time(s)...\n", scenario_arg, iterations);
        }

        let mut failures = 0u64;
        'scenarios: for scenario in &scenarios {
            log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

            let scenario_log = format!("log/{}/scenario.log", sanitize_filename(scenario.short_name));
            let scenario_receiver_id = file_receiver(&scenario_log, vec![LogEvent::Scenario, LogEvent::Level])
                .map(|receiver| logger.add_receiver(receiver));

            for i in start_iteration..(start_iteration + iterations) {
                if iterations > 1 {
                    let iteration_num = i - start_iteration + 1;
                    log!(&mut logger, LogEvent::Validation, "[{}/{}] ", iteration_num, iterations);
                }

                RAND_SEED.store(i, Ordering::Relaxed);

                match (scenario.run)(scenario.short_name, &mut logger) {
                    Ok(()) => {
                        if iterations > 1 {
                            logln!(&mut logger, LogEvent::Validation, "✓");
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        if iterations > 1 {
                            logln!(&mut logger, LogEvent::Validation, "✗");
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                        }

                        if fastbreak {
                            if let Some(id) = scenario_receiver_id {
                                logger.remove_receiver(id);
                            }
                            logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                            logln!(&mut logger, LogEvent::Validation, "Error at seed {}: {}", i, e);
                            break 'scenarios;
                        }
                    }
                }

                let _ = logger.flush();
            }

            if let Some(id) = scenario_receiver_id {
                logger.remove_receiver(id);
            }
        }

        let final_count = TOTAL_ALLOCATION_RUNS.load(Ordering::Relaxed);
        logln!(&mut logger, LogEvent::Validation, "\nTotal allocation runs completed: {}", final_count);

        if let Some(id) = summary_receiver_id {
            logger.remove_receiver(id);
        }
        if failures > 0 {
            std::process::exit(1);
        }
    } else {
        // Default: the layer phase scenario with allocation-level detail
        let mut logger = Logger::new();
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Scenario, LogEvent::Level, LogEvent::Pricing, LogEvent::Allocation]));
        if let Err(e) = scenarios::layers_exact::run("layers_exact", &mut logger) {
            eprintln!("Error running scenario: {}", e);
            std::process::exit(1);
        }
    }
}
