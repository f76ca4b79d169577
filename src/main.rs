use std::process;
use std::sync::Arc;

use colony_sim::catalog::Catalog;
use colony_sim::cli::{self, CliArgs, Command};
use colony_sim::scenario::create_standard_scenarios;

fn main() {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            eprintln!("Use --help for usage information");
            process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli::log_level(&args))).init();

    match args.command {
        Command::Run => run_simulation(&args),
        Command::Scenarios => list_scenarios(),
    }
}

fn run_simulation(args: &CliArgs) {
    let scenario = match cli::load_scenario(args) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if !args.quiet {
        println!("{}", scenario);
    }

    let seed = scenario.random_seed.unwrap_or(0);
    let mut world = match scenario.build_world(Arc::new(Catalog::build()), seed) {
        Ok(world) => world,
        Err(e) => {
            eprintln!("Error building world: {}", e);
            process::exit(1);
        }
    };

    log::info!(
        "Running {} for {} ticks of {}s (seed {})",
        scenario.name,
        args.ticks,
        args.dt,
        seed
    );
    for _ in 0..args.ticks {
        world.tick(args.dt);
        if world.agents().is_empty() {
            log::warn!("Everyone is gone after {} ticks", world.tick_count);
            break;
        }
    }

    println!("{}", world.summary());

    if let Some(path) = &args.output_file {
        let path = path.to_string_lossy();
        match world.events.save_to_file(&path) {
            Ok(()) => println!("Saved {} events to {}", world.events.len(), path),
            Err(e) => eprintln!("Error writing events to {}: {}", path, e),
        }
    }

    if let Some(path) = &args.snapshot_file {
        let written = world
            .snapshot_json()
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(path, json));
        match written {
            Ok(()) => println!("Saved world snapshot to {}", path.display()),
            Err(e) => eprintln!("Error writing snapshot to {}: {}", path.display(), e),
        }
    }
}

fn list_scenarios() {
    let scenarios = create_standard_scenarios();
    let mut names: Vec<_> = scenarios.keys().collect();
    names.sort();

    println!("Built-in scenarios:");
    for name in names {
        let scenario = &scenarios[name];
        println!(
            "  {:<10} {} ({} agents, {} buildings)",
            name,
            scenario.description,
            scenario.agents.len(),
            scenario.buildings.len()
        );
    }
}
