//! Command-line interface for the colony simulation.

use crate::scenario::{Scenario, create_standard_scenarios};
use lexopt::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;

/// Command-line arguments for the simulation.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub command: Command,
    pub scenario_name: String,
    pub scenario_file: Option<PathBuf>,
    pub ticks: usize,
    pub dt: Decimal,
    pub random_seed: Option<u64>,
    pub verbose: bool,
    pub quiet: bool,
    pub output_file: Option<PathBuf>,
    pub snapshot_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run,
    Scenarios,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            command: Command::Run,
            scenario_name: "bakery".to_string(),
            scenario_file: None,
            ticks: 2000,
            dt: dec!(1),
            random_seed: None,
            verbose: false,
            quiet: false,
            output_file: None,
            snapshot_file: None,
        }
    }
}

pub fn parse_args() -> Result<CliArgs, lexopt::Error> {
    parse_from(std::env::args_os().skip(1))
}

pub fn parse_from<I>(args: I) -> Result<CliArgs, lexopt::Error>
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString>,
{
    let mut args = lexopt::Parser::from_args(args);
    let mut cli_args = CliArgs::default();
    let mut subcommand = None;

    while let Some(arg) = args.next()? {
        match arg {
            Value(val) if subcommand.is_none() => {
                subcommand = Some(val.string()?);
            }
            Long("scenario") => {
                cli_args.scenario_name = args.value()?.string()?;
            }
            Long("file") | Short('f') => {
                cli_args.scenario_file = Some(PathBuf::from(args.value()?));
            }
            Long("ticks") | Short('t') => {
                cli_args.ticks = args.value()?.parse()?;
            }
            Long("dt") => {
                let dt: Decimal = args.value()?.parse()?;
                if dt <= Decimal::ZERO {
                    return Err(lexopt::Error::from("--dt must be positive"));
                }
                cli_args.dt = dt;
            }
            Long("seed") => {
                cli_args.random_seed = Some(args.value()?.parse()?);
            }
            Long("output") | Short('o') => {
                cli_args.output_file = Some(PathBuf::from(args.value()?));
            }
            Long("snapshot") => {
                cli_args.snapshot_file = Some(PathBuf::from(args.value()?));
            }
            Long("verbose") | Short('v') => cli_args.verbose = true,
            Long("quiet") | Short('q') => cli_args.quiet = true,
            Long("help") | Short('h') => {
                print_help();
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    cli_args.command = match subcommand.as_deref() {
        Some("run") | None => Command::Run,
        Some("scenarios") => Command::Scenarios,
        Some(cmd) => return Err(lexopt::Error::from(format!("Unknown command: {}", cmd))),
    };

    Ok(cli_args)
}

/// Resolve the scenario to run: a file if one was given, otherwise a built-in one.
pub fn load_scenario(args: &CliArgs) -> Result<Scenario, String> {
    let mut scenario = match &args.scenario_file {
        Some(path) => {
            let path = path.to_string_lossy();
            Scenario::load_from_file(&path).map_err(|e| format!("Error reading scenario file {}: {}", path, e))?
        }
        None => {
            let scenarios = create_standard_scenarios();
            scenarios.get(&args.scenario_name).cloned().ok_or_else(|| {
                let mut names: Vec<_> = scenarios.keys().cloned().collect();
                names.sort();
                format!(
                    "Unknown scenario: {} (available: {})",
                    args.scenario_name,
                    names.join(", ")
                )
            })?
        }
    };
    if let Some(seed) = args.random_seed {
        scenario.random_seed = Some(seed);
    }
    scenario.validate()?;
    Ok(scenario)
}

/// Default log filter for the chosen verbosity; `RUST_LOG` still wins.
pub fn log_level(args: &CliArgs) -> &'static str {
    if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    }
}

pub fn print_help() {
    println!("\nColony Simulation\n");
    println!("USAGE:");
    println!("    colony-sim [COMMAND] [OPTIONS]\n");

    println!("COMMANDS:");
    println!("    run              Run the simulation (default)");
    println!("    scenarios        List the built-in scenarios\n");

    println!("SIMULATION OPTIONS:");
    println!("    --scenario <NAME>          Use a built-in scenario (default: bakery)");
    println!("    -f, --file <FILE>          Load scenario from a JSON or YAML file");
    println!("    -t, --ticks <N>            Number of ticks to run (default: 2000)");
    println!("    --dt <SECONDS>             Simulated seconds per tick (default: 1)");
    println!("    --seed <N>                 Random seed for reproducible runs\n");

    println!("OUTPUT OPTIONS:");
    println!("    -o, --output <FILE>        Write events to the specified file");
    println!("    --snapshot <FILE>          Write the final world state as JSON");
    println!("    -v, --verbose              Debug logging");
    println!("    -q, --quiet                Warnings only");
    println!("    -h, --help                 Print help information\n");

    println!("EXAMPLES:");
    println!("    colony-sim run --scenario lumber --ticks 5000 --seed 7");
    println!("    RUST_LOG=colony_sim::market=debug colony-sim run -o events.json");
}
