//! Canned world setups for the headless runner.

use braitenbots_core::{
    BraitenbotsConfig, Pose, Position, VehicleId, VehicleRuntime, WiringMode, World,
};
use clap::ValueEnum;
use rand::Rng;

/// Selectable experiment reproduced by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// One fear and one aggression vehicle circling two lights.
    FearAggression,
    /// Fear and aggression wiring modulated by adaptive memory.
    Memory,
    /// A love vehicle that parks at a light next to a restless explorer.
    LoveExplorer,
    /// Nine vehicles (love, explorer, figure-8) over five lights.
    Flock,
    /// A sensorless wanderer that refuses to drive into lights.
    Obstacle,
    /// A single keyboard-driven vehicle.
    Manual,
}

impl Scenario {
    /// World configuration matching the experiment's arena.
    #[must_use]
    pub fn config(self, seed: Option<u64>, tick_rate_hz: f32) -> BraitenbotsConfig {
        let (world_width, world_height) = match self {
            Self::Flock => (900, 650),
            Self::Obstacle => (600, 600),
            _ => (800, 600),
        };
        BraitenbotsConfig {
            world_width,
            world_height,
            tick_rate_hz,
            rng_seed: seed,
            ..BraitenbotsConfig::default()
        }
    }

    /// Spawn the experiment's lights and vehicles into a fresh world.
    ///
    /// Returns the handle of the directly drivable vehicle (keyboard or
    /// boost target) when the scenario has one.
    pub fn populate(self, world: &mut World) -> Option<VehicleId> {
        match self {
            Self::FearAggression => {
                world.add_light(Position::new(400.0, 200.0));
                world.add_light(Position::new(400.0, 400.0));
                spawn(world, 400.0, 300.0, VehicleRuntime::fear());
                spawn(world, 600.0, 300.0, VehicleRuntime::aggression());
                None
            }
            Self::Memory => {
                world.add_light(Position::new(400.0, 200.0));
                world.add_light(Position::new(400.0, 400.0));
                spawn(
                    world,
                    350.0,
                    300.0,
                    VehicleRuntime::memory_modulated(WiringMode::Direct),
                );
                spawn(
                    world,
                    550.0,
                    300.0,
                    VehicleRuntime::memory_modulated(WiringMode::Cross),
                );
                None
            }
            Self::LoveExplorer => {
                world.add_light(Position::new(266.0, 200.0));
                world.add_light(Position::new(533.0, 400.0));
                spawn(world, 200.0, 300.0, VehicleRuntime::love());
                spawn(world, 400.0, 300.0, VehicleRuntime::explorer());
                None
            }
            Self::Flock => {
                for (x, y) in [
                    (200.0, 150.0),
                    (450.0, 150.0),
                    (700.0, 150.0),
                    (300.0, 450.0),
                    (600.0, 450.0),
                ] {
                    world.add_light(Position::new(x, y));
                }
                for _ in 0..3 {
                    let runtime = flock_tuned(VehicleRuntime::love());
                    spawn_scattered(world, runtime);
                }
                for _ in 0..3 {
                    let runtime = flock_tuned(VehicleRuntime::explorer());
                    spawn_scattered(world, runtime);
                }
                for _ in 0..3 {
                    let runtime = VehicleRuntime::figure8(world.rng());
                    spawn_scattered(world, runtime);
                }
                None
            }
            Self::Obstacle => {
                world.add_light(Position::new(200.0, 300.0));
                world.add_light(Position::new(400.0, 300.0));
                let runtime = VehicleRuntime::random_avoidant(world.rng());
                Some(spawn(world, 300.0, 300.0, runtime))
            }
            Self::Manual => {
                let id = spawn(world, 400.0, 300.0, VehicleRuntime::manual());
                Some(id)
            }
        }
    }
}

/// Crowded-arena sensor tuning shared by the flock vehicles.
fn flock_tuned(mut runtime: VehicleRuntime) -> VehicleRuntime {
    runtime.profile.sensor_offset = 20.0;
    runtime.profile.sensor_angle = std::f32::consts::FRAC_PI_4;
    runtime.profile.sensor_gain = 5_000.0;
    runtime
}

fn spawn(world: &mut World, x: f32, y: f32, runtime: VehicleRuntime) -> VehicleId {
    let heading = world.rng().random_range(0.0..std::f32::consts::TAU);
    world.spawn_vehicle(Pose::new(Position::new(x, y), heading, 0.0), runtime)
}

fn spawn_scattered(world: &mut World, runtime: VehicleRuntime) -> VehicleId {
    let x = world.rng().random_range(100.0..800.0);
    let y = world.rng().random_range(100.0..500.0);
    spawn(world, x, y, runtime)
}
