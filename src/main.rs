use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;

use rail_sim::simulation::{OfflineOracle, PriorityOracle, Scenario, SimWorld};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OracleKind {
    /// Lower-priority train yields
    Priority,
    /// Every request fails; conflicting trains stay stopped
    Offline,
}

#[derive(Parser)]
#[command(name = "rail_sim")]
#[command(about = "Headless railway network simulation")]
struct Cli {
    /// Load stations, tracks and trains from a JSON scenario instead of the demo network
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of simulation ticks to run
    #[arg(long, default_value = "1000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f64,

    /// Seed for reproducible random trains
    #[arg(long)]
    seed: Option<u64>,

    /// Spawn this many extra trains between random stations
    #[arg(long, default_value = "0")]
    random_trains: usize,

    /// Minimum separation in metres
    #[arg(long)]
    separation: Option<f64>,

    /// Simulated seconds per tick second
    #[arg(long)]
    time_scale: Option<f64>,

    /// Decision oracle consulted on conflicts
    #[arg(long, value_enum, default_value = "priority")]
    oracle: OracleKind,

    /// Print a summary every N ticks
    #[arg(long, default_value = "100")]
    report_every: u32,

    /// Dump the final feature vector as JSON
    #[arg(long)]
    features: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,rail_sim=info"),
    )
    .init();

    let cli = Cli::parse();
    let mut world = build_world(&cli)?;
    run_headless(&mut world, &cli);

    if cli.features {
        let features = world.features();
        let json =
            serde_json::to_string_pretty(&features).context("Failed to serialize features")?;
        println!("{json}");
    }

    Ok(())
}

fn build_world(cli: &Cli) -> Result<SimWorld> {
    let mut world = match (&cli.scenario, cli.seed) {
        (Some(path), seed) => {
            let scenario = Scenario::load(path)?;
            let mut world = SimWorld::from_scenario(scenario)?;
            info!("Loaded scenario from {}", path.display());
            if let Some(seed) = seed {
                world.reseed(seed);
            }
            world
        }
        (None, Some(seed)) => SimWorld::create_demo_world_with_seed(seed),
        (None, None) => SimWorld::create_demo_world(),
    };

    let mut config = world.config().clone();
    if let Some(separation) = cli.separation {
        config.min_separation_m = separation;
    }
    if let Some(time_scale) = cli.time_scale {
        config.time_scale = time_scale;
    }
    world.set_config(config);

    match cli.oracle {
        OracleKind::Priority => world.set_oracle(Box::new(PriorityOracle)),
        OracleKind::Offline => world.set_oracle(Box::new(OfflineOracle)),
    }

    if cli.random_trains > 0 {
        let spawned = world.spawn_random_trains(cli.random_trains);
        info!("Spawned {} random trains", spawned.len());
    }

    Ok(world)
}

/// Run the simulation in headless mode
fn run_headless(world: &mut SimWorld, cli: &Cli) {
    println!("Running rail simulation in headless mode...");
    println!("Ticks: {}, Delta: {}s", cli.ticks, cli.delta);
    println!();

    println!("Initial state:");
    world.print_summary();
    println!();

    let report_every = cli.report_every.max(1);
    for tick in 1..=cli.ticks {
        let report = world.tick(cli.delta);

        if tick % report_every == 0 && tick < cli.ticks {
            println!("--- After tick {} ({:.1}s simulated time) ---", tick, report.time);
            world.print_summary();
            println!();
        }

        if world.active_train_count() == 0 {
            println!("All trains arrived after tick {tick}");
            break;
        }
    }

    println!("=== Final State ===");
    world.print_summary();
}
