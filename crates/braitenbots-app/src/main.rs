use anyhow::Result;
use braitenbots_app::{
    InteractionSubmit, Scenario, create_interaction_bus, drain_pending_interactions,
    make_interaction_submit,
};
use braitenbots_core::{Interaction, KeyState, Tick, VehicleId, World};
use clap::Parser;
use std::thread;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "braitenbots",
    version,
    about = "Headless Braitenberg vehicle simulation"
)]
struct Cli {
    /// Scenario to run.
    #[arg(long, value_enum, default_value = "fear-aggression")]
    scenario: Scenario,

    /// Number of ticks to simulate; runs until interrupted when omitted.
    #[arg(long)]
    ticks: Option<u64>,

    /// RNG seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Simulation rate in ticks per second.
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f32,

    /// Run as fast as possible instead of pacing to the tick rate.
    #[arg(long)]
    fast: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = cli.scenario.config(cli.seed, cli.tick_rate);
    let mut world = World::new(config)?;
    let driven = cli.scenario.populate(&mut world);
    info!(
        scenario = ?cli.scenario,
        vehicles = world.vehicle_count(),
        lights = world.lights().len(),
        "world ready"
    );

    let (sender, receiver) = create_interaction_bus(64);
    let submit = make_interaction_submit(sender);

    let frame_period = Duration::from_secs_f32(world.config().tick_seconds());
    loop {
        scripted_input(&submit, cli.scenario, world.tick(), driven);
        drain_pending_interactions(&receiver, &mut world);
        let events = world.step();

        if events.tick.0 % 300 == 0 {
            let poses = world.vehicles().poses();
            let average_speed = if poses.is_empty() {
                0.0
            } else {
                poses.iter().map(|pose| pose.speed).sum::<f32>() / poses.len() as f32
            };
            info!(
                tick = events.tick.0,
                vehicles = world.vehicle_count(),
                lights = world.lights().len(),
                average_speed,
                "tick summary"
            );
        }

        if cli.ticks.is_some_and(|limit| events.tick.0 >= limit) {
            break;
        }
        if !cli.fast {
            thread::sleep(frame_period);
        }
    }

    info!(tick = world.tick().0, "simulation finished");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Stand-in for the interactive surfaces: replays the clicks and key
/// presses each experiment expects so headless runs still exercise them.
fn scripted_input(
    submit: &InteractionSubmit,
    scenario: Scenario,
    tick: Tick,
    driven: Option<VehicleId>,
) {
    match scenario {
        Scenario::Obstacle => {
            if tick.0 % 300 == 150
                && let Some(vehicle) = driven
            {
                submit(Interaction::Boost {
                    vehicle,
                    duration: 60,
                });
            }
        }
        Scenario::Manual => {
            if let Some(vehicle) = driven {
                // Hold the accelerator and weave left and right.
                let keys = KeyState {
                    up: true,
                    left: tick.0 % 240 < 60,
                    right: (120..180).contains(&(tick.0 % 240)),
                    down: false,
                };
                submit(Interaction::SetKeys { vehicle, keys });
            }
        }
        _ => {}
    }
}
