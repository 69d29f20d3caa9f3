//! Core simulation types shared across the Braitenbots workspace.
//!
//! The engine models small reactive vehicles steered by distance-weighted
//! stimulus from point light sources. Each tick the world drains queued
//! interaction commands, snapshots the light field, evaluates every
//! vehicle's sensors and behavior policy, and integrates the resulting
//! motor commands into new poses on a toroidal plane. Rendering and input
//! capture live outside this crate; the world exposes a [`FrameSnapshot`]
//! per tick through the [`FrameSink`] seam.

use ordered_float::OrderedFloat;
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::fmt;
use thiserror::Error;

new_key_type! {
    /// Stable handle for vehicles backed by a generational slot map.
    pub struct VehicleId;
}

new_key_type! {
    /// Stable handle for light sources.
    pub struct LightId;
}

/// Convenience alias for associating side data with vehicles.
pub type VehicleMap<T> = SecondaryMap<VehicleId, T>;

const FULL_TURN: f32 = std::f32::consts::TAU;
const HALF_TURN: f32 = std::f32::consts::PI;

/// Additive term keeping the inverse-square stimulus finite at zero range.
pub const INTENSITY_EPSILON: f32 = 1.0;

/// Lower clamp for the adaptive memory gain.
pub const MEMORY_FLOOR: f32 = 0.1;
/// Upper clamp for the adaptive memory gain.
pub const MEMORY_CEIL: f32 = 2.0;

fn wrap_signed_angle(mut angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    while angle <= -HALF_TURN {
        angle += FULL_TURN;
    }
    while angle > HALF_TURN {
        angle -= FULL_TURN;
    }
    angle
}

/// True-modulo wrap of a coordinate into `[0, extent)`.
fn wrap_position(value: f32, extent: f32) -> f32 {
    if extent <= 0.0 {
        return 0.0;
    }
    let mut v = value % extent;
    if v < 0.0 {
        v += extent;
    }
    v
}

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Axis-aligned 2D position in world units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to `other`.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_sq(other).sqrt()
    }
}

/// Kinematic state of a single vehicle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub position: Position,
    /// Heading in radians. Unbounded; consumed only through trig.
    pub heading: f32,
    pub speed: f32,
}

impl Pose {
    /// Construct a pose at `position` with the given heading and speed.
    #[must_use]
    pub const fn new(position: Position, heading: f32, speed: f32) -> Self {
        Self {
            position,
            heading,
            speed,
        }
    }
}

/// Pressed-key state consumed by manually steered vehicles.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

/// Whether a sensor drives the motor on the same or the opposite side.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum WiringMode {
    /// Same-side wiring; stronger stimulus turns the vehicle away (fear).
    #[default]
    Direct,
    /// Crossed wiring; stronger stimulus turns the vehicle toward (aggression).
    Cross,
}

/// How a computed target speed is folded into the current speed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SpeedResponse {
    /// Snap directly to the target each tick.
    Snap,
    /// Exponential blend toward the target.
    Smooth { factor: f32 },
}

impl Default for SpeedResponse {
    fn default() -> Self {
        Self::Smooth { factor: 0.1 }
    }
}

/// Behavior law applied when mapping stimulus to motor commands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BehaviorVariant {
    /// Direct wiring; net motion away from the source.
    Fear,
    /// Crossed wiring; net motion toward the source.
    Aggression,
    /// Inhibitory wiring; approaches and stops close to the source.
    Love,
    /// Weaker inhibitory wiring with wander jitter; never fully stops.
    Explorer,
    /// Time-driven heading oscillator layered on light seeking.
    Figure8,
    /// Fear or aggression wiring modulated by a slow adaptive memory.
    MemoryModulated,
    /// No sensors; straight-line wander that refuses to enter lights.
    RandomAvoidant,
    /// Driven by [`KeyState`] instead of stimulus.
    Manual,
}

/// Which virtual sensor of a vehicle to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSide {
    Left,
    Right,
}

/// Stimulus intensities sampled for one vehicle during a tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    /// Intensity at the left sensor point.
    pub left: f32,
    /// Intensity at the right sensor point.
    pub right: f32,
    /// Intensity at the vehicle body itself.
    pub ambient: f32,
}

/// Every tunable used by the behavior policies.
///
/// The per-variant constructors carry the constants of the classic
/// experiments; callers may override individual fields before spawning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SteeringProfile {
    /// Radius at which the two virtual sensors sit ahead of the body.
    pub sensor_offset: f32,
    /// Half-angle between heading and each sensor.
    pub sensor_angle: f32,
    /// Gain `k` of the inverse-square stimulus model.
    pub sensor_gain: f32,
    /// Scale applied to the motor difference when turning.
    pub turn_gain: f32,
    /// Scale applied to the motor sum when computing target speed.
    pub speed_gain: f32,
    /// Speed contribution independent of stimulus.
    pub base_speed: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub speed_response: SpeedResponse,
    /// Inhibitory gain for love/explorer wiring.
    pub inhibit_gain: f32,
    /// Body-to-light distance below which a love vehicle halts.
    pub stop_distance: f32,
    /// Half-range of the explorer's per-tick heading jitter.
    pub jitter: f32,
    /// Heading oscillation amplitude (radians per tick).
    pub osc_amplitude: f32,
    /// Heading oscillation frequency in Hz.
    pub osc_frequency: f32,
    /// Proportional steering gain toward the nearest light.
    pub correction_gain: f32,
    /// Ambient intensity at which the figure-8 vehicle is fully inhibited.
    pub ambient_threshold: f32,
    /// Memory growth per unit of total stimulus.
    pub memory_gain: f32,
    /// Multiplicative memory decay per tick.
    pub memory_decay: f32,
    /// Collision radius of the avoidant body.
    pub body_radius: f32,
    /// Half-range of the periodic wander turn.
    pub wander_kick: f32,
    /// Half-range of the heading kick applied when a move is suppressed.
    pub avoid_kick: f32,
    /// Bounds (ticks) for reseeding the wander countdown.
    pub wander_min: u32,
    pub wander_max: u32,
    /// Heading change per tick while a turn key is held.
    pub manual_turn: f32,
    /// Speed change per tick while an accelerator key is held.
    pub manual_accel: f32,
    /// Passive speed retention when no accelerator key is held.
    pub manual_drag: f32,
}

impl Default for SteeringProfile {
    fn default() -> Self {
        Self::fear()
    }
}

impl SteeringProfile {
    /// Shared baseline for the two-sensor variants.
    fn sensor_base() -> Self {
        Self {
            sensor_offset: 25.0,
            sensor_angle: std::f32::consts::FRAC_PI_6,
            sensor_gain: 8_000.0,
            turn_gain: 0.007,
            speed_gain: 0.05,
            base_speed: 2.0,
            min_speed: 0.0,
            max_speed: 100.0,
            speed_response: SpeedResponse::Smooth { factor: 0.1 },
            inhibit_gain: 0.0,
            stop_distance: 0.0,
            jitter: 0.0,
            osc_amplitude: 0.0,
            osc_frequency: 0.0,
            correction_gain: 0.0,
            ambient_threshold: 1.0,
            memory_gain: 0.0,
            memory_decay: 1.0,
            body_radius: 0.0,
            wander_kick: 0.0,
            avoid_kick: 0.0,
            wander_min: 0,
            wander_max: 0,
            manual_turn: 0.0,
            manual_accel: 0.0,
            manual_drag: 1.0,
        }
    }

    /// Constants for the fear experiment.
    #[must_use]
    pub fn fear() -> Self {
        Self::sensor_base()
    }

    /// Constants for the aggression experiment (same law, crossed wiring).
    #[must_use]
    pub fn aggression() -> Self {
        Self::sensor_base()
    }

    /// Constants for the love experiment: inhibitory motors, hard stop.
    #[must_use]
    pub fn love() -> Self {
        Self {
            turn_gain: 0.05,
            speed_gain: 0.5,
            base_speed: 0.0,
            max_speed: 4.0,
            speed_response: SpeedResponse::Snap,
            inhibit_gain: 0.05,
            stop_distance: 15.0,
            ..Self::sensor_base()
        }
    }

    /// Constants for the explorer: weaker inhibition, jitter, speed floor.
    #[must_use]
    pub fn explorer() -> Self {
        Self {
            turn_gain: 0.05,
            speed_gain: 0.5,
            base_speed: 0.0,
            min_speed: 0.5,
            max_speed: 2.0,
            speed_response: SpeedResponse::Snap,
            inhibit_gain: 0.02,
            jitter: 0.02,
            ..Self::sensor_base()
        }
    }

    /// Constants for the figure-8 oscillator.
    #[must_use]
    pub fn figure8() -> Self {
        Self {
            sensor_offset: 20.0,
            sensor_angle: std::f32::consts::FRAC_PI_4,
            sensor_gain: 5_000.0,
            max_speed: 6.0,
            speed_response: SpeedResponse::Snap,
            osc_amplitude: 0.12,
            osc_frequency: 0.6,
            correction_gain: 0.03,
            ambient_threshold: 50.0,
            ..Self::sensor_base()
        }
    }

    /// Constants for the memory-modulated vehicles.
    #[must_use]
    pub fn memory_modulated() -> Self {
        Self {
            turn_gain: 0.006,
            speed_gain: 0.04,
            base_speed: 1.5,
            max_speed: 120.0,
            speed_response: SpeedResponse::Snap,
            memory_gain: 0.000_8,
            memory_decay: 0.995,
            ..Self::sensor_base()
        }
    }

    /// Constants for the sensorless light-avoider.
    #[must_use]
    pub fn random_avoidant() -> Self {
        Self {
            base_speed: 2.0,
            max_speed: 6.0,
            speed_response: SpeedResponse::Snap,
            body_radius: 20.0,
            wander_kick: 0.5,
            avoid_kick: 1.0,
            wander_min: 30,
            wander_max: 120,
            ..Self::sensor_base()
        }
    }

    /// Constants for keyboard steering.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            base_speed: 0.0,
            min_speed: -2.5,
            max_speed: 5.0,
            speed_response: SpeedResponse::Snap,
            manual_turn: 0.07,
            manual_accel: 0.1,
            manual_drag: 0.95,
            ..Self::sensor_base()
        }
    }
}

/// Place a virtual sensor relative to a vehicle pose.
#[must_use]
pub fn sensor_position(pose: &Pose, profile: &SteeringProfile, side: SensorSide) -> Position {
    let angle = match side {
        SensorSide::Left => pose.heading + profile.sensor_angle,
        SensorSide::Right => pose.heading - profile.sensor_angle,
    };
    Position::new(
        pose.position.x + angle.cos() * profile.sensor_offset,
        pose.position.y + angle.sin() * profile.sensor_offset,
    )
}

/// Summed inverse-square stimulus at `point` over all lights.
///
/// Strictly positive for any finite distance and monotonically decreasing
/// in distance; the additive epsilon keeps it finite at zero range.
#[must_use]
pub fn intensity(point: Position, gain: f32, lights: &[LightSample]) -> f32 {
    lights
        .iter()
        .map(|light| gain / (point.distance_sq(light.position) + INTENSITY_EPSILON))
        .sum()
}

/// Nearest light sample by squared distance, first-encountered on ties.
#[must_use]
pub fn nearest_sample(lights: &[LightSample], point: Position) -> Option<&LightSample> {
    lights
        .iter()
        .min_by_key(|light| OrderedFloat(point.distance_sq(light.position)))
}

/// Behavioral state carried by a vehicle beyond its pose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleRuntime {
    pub behavior: BehaviorVariant,
    pub wiring: WiringMode,
    pub profile: SteeringProfile,
    /// Slow adaptive gain; `Some` only for [`BehaviorVariant::MemoryModulated`].
    pub memory: Option<f32>,
    /// Oscillator time in seconds, advanced each tick.
    pub clock: f32,
    /// Countdown until the next wander turn.
    pub turn_timer: u32,
    /// Remaining ticks of a triggered speed boost.
    pub boost_timer: u32,
    pub keys: KeyState,
    /// Whether a love vehicle halted inside its stop distance this tick.
    pub stopped: bool,
    /// Last sampled stimulus, refreshed every tick before steering.
    pub sensors: SensorReading,
}

impl VehicleRuntime {
    fn with_profile(behavior: BehaviorVariant, wiring: WiringMode, profile: SteeringProfile) -> Self {
        Self {
            behavior,
            wiring,
            profile,
            memory: None,
            clock: 0.0,
            turn_timer: 0,
            boost_timer: 0,
            keys: KeyState::default(),
            stopped: false,
            sensors: SensorReading::default(),
        }
    }

    #[must_use]
    pub fn fear() -> Self {
        Self::with_profile(BehaviorVariant::Fear, WiringMode::Direct, SteeringProfile::fear())
    }

    #[must_use]
    pub fn aggression() -> Self {
        Self::with_profile(
            BehaviorVariant::Aggression,
            WiringMode::Cross,
            SteeringProfile::aggression(),
        )
    }

    #[must_use]
    pub fn love() -> Self {
        Self::with_profile(BehaviorVariant::Love, WiringMode::Direct, SteeringProfile::love())
    }

    #[must_use]
    pub fn explorer() -> Self {
        Self::with_profile(
            BehaviorVariant::Explorer,
            WiringMode::Direct,
            SteeringProfile::explorer(),
        )
    }

    /// Figure-8 vehicle with a randomized oscillator phase.
    #[must_use]
    pub fn figure8(rng: &mut dyn RngCore) -> Self {
        let mut runtime = Self::with_profile(
            BehaviorVariant::Figure8,
            WiringMode::Direct,
            SteeringProfile::figure8(),
        );
        runtime.clock = rng.random_range(0.0..10.0);
        runtime
    }

    /// Memory-modulated vehicle in either fear or aggression wiring.
    #[must_use]
    pub fn memory_modulated(wiring: WiringMode) -> Self {
        let mut runtime = Self::with_profile(
            BehaviorVariant::MemoryModulated,
            wiring,
            SteeringProfile::memory_modulated(),
        );
        runtime.memory = Some(0.5);
        runtime
    }

    /// Sensorless avoidant vehicle with a randomized wander countdown.
    #[must_use]
    pub fn random_avoidant(rng: &mut dyn RngCore) -> Self {
        let profile = SteeringProfile::random_avoidant();
        let mut runtime =
            Self::with_profile(BehaviorVariant::RandomAvoidant, WiringMode::Direct, profile);
        runtime.turn_timer = rng.random_range(profile.wander_min..=profile.wander_max);
        runtime
    }

    #[must_use]
    pub fn manual() -> Self {
        Self::with_profile(BehaviorVariant::Manual, WiringMode::Direct, SteeringProfile::manual())
    }
}

/// Dense vehicle storage addressed by generational handles.
///
/// Poses live in a dense row per vehicle so the per-tick stages can walk
/// slices; the slot map maps handles to row indices and survives removals
/// via swap-remove with index fixup.
#[derive(Debug, Default)]
pub struct VehicleArena {
    slots: SlotMap<VehicleId, usize>,
    handles: Vec<VehicleId>,
    poses: Vec<Pose>,
}

impl VehicleArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live vehicles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Returns true when no vehicles are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Returns true if `id` refers to a live vehicle.
    #[must_use]
    pub fn contains(&self, id: VehicleId) -> bool {
        self.slots.contains_key(id)
    }

    /// Returns the dense row index for `id`, if present.
    #[must_use]
    pub fn index_of(&self, id: VehicleId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Iterate over live handles in dense row order.
    pub fn iter_handles(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.handles.iter().copied()
    }

    /// Immutable access to the pose rows.
    #[must_use]
    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    /// Mutable access to the pose rows.
    #[must_use]
    pub fn poses_mut(&mut self) -> &mut [Pose] {
        &mut self.poses
    }

    /// Insert a new vehicle and return its handle.
    pub fn insert(&mut self, pose: Pose) -> VehicleId {
        let index = self.poses.len();
        self.poses.push(pose);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    /// Remove `id`, returning its last pose if it was present.
    pub fn remove(&mut self, id: VehicleId) -> Option<Pose> {
        let index = self.slots.remove(id)?;
        let removed = self.poses.swap_remove(index);
        let removed_handle = self.handles.swap_remove(index);
        debug_assert_eq!(removed_handle, id);
        if index < self.handles.len() {
            let moved = self.handles[index];
            if let Some(slot) = self.slots.get_mut(moved) {
                *slot = index;
            }
        }
        Some(removed)
    }

    /// Copy of the pose for `id`.
    #[must_use]
    pub fn snapshot(&self, id: VehicleId) -> Option<Pose> {
        self.index_of(id).map(|index| self.poses[index])
    }

    /// Remove all vehicles.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.handles.clear();
        self.poses.clear();
    }
}

/// A stationary or draggable point stimulus source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LightSource {
    pub position: Position,
    /// Collision/visual radius; does not affect stimulus intensity.
    pub radius: f32,
    pub draggable: bool,
}

/// Read-only per-tick view of one light.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LightSample {
    pub position: Position,
    pub radius: f32,
}

/// Ordered collection of lights with drag bookkeeping.
///
/// Insertion order is preserved and doubles as the deterministic
/// tie-break for nearest-light queries. Lights are never destroyed and
/// never wrapped; they may sit outside the world bounds until dragged
/// back.
#[derive(Debug, Clone, Default)]
pub struct LightField {
    slots: SlotMap<LightId, LightSource>,
    handles: Vec<LightId>,
    held: Option<LightId>,
}

impl LightField {
    /// Create an empty field.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true when the field holds no lights.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Add a light, returning its handle.
    pub fn add(&mut self, light: LightSource) -> LightId {
        let id = self.slots.insert(light);
        self.handles.push(id);
        id
    }

    /// Immutable access to a light.
    #[must_use]
    pub fn get(&self, id: LightId) -> Option<&LightSource> {
        self.slots.get(id)
    }

    /// Mutable access to a light.
    #[must_use]
    pub fn get_mut(&mut self, id: LightId) -> Option<&mut LightSource> {
        self.slots.get_mut(id)
    }

    /// Iterate lights in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (LightId, &LightSource)> + '_ {
        self.handles
            .iter()
            .filter_map(|id| self.slots.get(*id).map(|light| (*id, light)))
    }

    /// Immutable per-tick snapshot of positions and radii.
    #[must_use]
    pub fn samples(&self) -> Vec<LightSample> {
        self.iter()
            .map(|(_, light)| LightSample {
                position: light.position,
                radius: light.radius,
            })
            .collect()
    }

    /// Nearest light to `point` by squared distance.
    ///
    /// Ties resolve to the earliest-added light.
    #[must_use]
    pub fn nearest(&self, point: Position) -> Option<LightId> {
        self.iter()
            .min_by_key(|(_, light)| OrderedFloat(point.distance_sq(light.position)))
            .map(|(id, _)| id)
    }

    /// Teleport the nearest light to `point`. No-op on an empty field.
    pub fn move_nearest(&mut self, point: Position) -> Option<LightId> {
        let id = self.nearest(point)?;
        if let Some(light) = self.slots.get_mut(id) {
            light.position = point;
        }
        Some(id)
    }

    /// Mark the draggable light under `point` as held, if any.
    pub fn grab(&mut self, point: Position) -> Option<LightId> {
        let id = self
            .iter()
            .find(|(_, light)| light.draggable && point.distance(light.position) < light.radius)
            .map(|(id, _)| id)?;
        self.held = Some(id);
        Some(id)
    }

    /// Move the held light to `point`, if one is held.
    pub fn drag(&mut self, point: Position) {
        if let Some(id) = self.held
            && let Some(light) = self.slots.get_mut(id)
        {
            light.position = point;
        }
    }

    /// Release any held light.
    pub fn release(&mut self) {
        self.held = None;
    }

    /// Currently held light, if any.
    #[must_use]
    pub fn held(&self) -> Option<LightId> {
        self.held
    }
}

/// Discrete interaction commands applied atomically at the start of a tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Interaction {
    /// Teleport the nearest light to the pointer position.
    MoveNearestLight { position: Position },
    /// Create a new light at the pointer position.
    AddLight { position: Position },
    /// Mark the draggable light under the pointer as held.
    GrabLight { position: Position },
    /// Move the held light while the pointer drags.
    DragLight { position: Position },
    /// Drop the held light.
    ReleaseLight,
    /// Grant a vehicle its boosted speed for `duration` ticks.
    Boost { vehicle: VehicleId, duration: u32 },
    /// Replace the key state of a manually steered vehicle.
    SetKeys { vehicle: VehicleId, keys: KeyState },
}

/// Per-vehicle row of a frame snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VehicleFrame {
    pub id: VehicleId,
    pub position: Position,
    pub heading: f32,
    pub speed: f32,
    pub memory: Option<f32>,
}

/// Per-light row of a frame snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LightFrame {
    pub id: LightId,
    pub position: Position,
    pub radius: f32,
}

/// Everything a renderer needs to draw one tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FrameSnapshot {
    pub tick: Tick,
    pub vehicles: Vec<VehicleFrame>,
    pub lights: Vec<LightFrame>,
}

/// Rendering collaborator invoked after each tick.
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: &FrameSnapshot);
}

/// No-op frame sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn on_frame(&mut self, _frame: &FrameSnapshot) {}
}

/// Events emitted after processing a world tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    /// Number of interaction commands drained at the start of the tick.
    pub interactions_applied: usize,
}

/// Errors that can occur when constructing world state.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for a Braitenbots world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BraitenbotsConfig {
    /// Width of the world in world units.
    pub world_width: u32,
    /// Height of the world in world units.
    pub world_height: u32,
    /// Nominal simulation rate; drives the figure-8 oscillator clock.
    pub tick_rate_hz: f32,
    /// Radius assigned to lights created through interactions.
    pub light_radius: f32,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
}

impl Default for BraitenbotsConfig {
    fn default() -> Self {
        Self {
            world_width: 800,
            world_height: 600,
            tick_rate_hz: 60.0,
            light_radius: 15.0,
            rng_seed: None,
        }
    }
}

impl BraitenbotsConfig {
    fn validate(&self) -> Result<(), WorldError> {
        if self.world_width == 0 || self.world_height == 0 {
            return Err(WorldError::InvalidConfig(
                "world dimensions must be non-zero",
            ));
        }
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err(WorldError::InvalidConfig("tick_rate_hz must be positive"));
        }
        if !self.light_radius.is_finite() || self.light_radius <= 0.0 {
            return Err(WorldError::InvalidConfig("light_radius must be positive"));
        }
        Ok(())
    }

    /// Seconds advanced per tick.
    #[must_use]
    pub fn tick_seconds(&self) -> f32 {
        self.tick_rate_hz.recip()
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Aggregate world state owning all vehicles, lights, and pending input.
pub struct World {
    config: BraitenbotsConfig,
    tick: Tick,
    rng: SmallRng,
    vehicles: VehicleArena,
    runtime: VehicleMap<VehicleRuntime>,
    lights: LightField,
    pending: Vec<Interaction>,
    sink: Box<dyn FrameSink>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("vehicle_count", &self.vehicles.len())
            .field("light_count", &self.lights.len())
            .finish()
    }
}

impl World {
    /// Instantiate a new world using the supplied configuration.
    pub fn new(config: BraitenbotsConfig) -> Result<Self, WorldError> {
        Self::with_sink(config, Box::new(NullSink))
    }

    /// Instantiate a new world with an attached frame sink.
    pub fn with_sink(
        config: BraitenbotsConfig,
        sink: Box<dyn FrameSink>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            vehicles: VehicleArena::new(),
            runtime: VehicleMap::new(),
            lights: LightField::new(),
            pending: Vec::new(),
            sink,
        })
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &BraitenbotsConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Borrow the world RNG mutably for deterministic sampling.
    #[must_use]
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Read-only access to the vehicle arena.
    #[must_use]
    pub fn vehicles(&self) -> &VehicleArena {
        &self.vehicles
    }

    /// Read-only access to the light field.
    #[must_use]
    pub fn lights(&self) -> &LightField {
        &self.lights
    }

    /// Mutable access to the light field.
    #[must_use]
    pub fn lights_mut(&mut self) -> &mut LightField {
        &mut self.lights
    }

    /// Number of live vehicles.
    #[must_use]
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Spawn a vehicle with the given pose and behavior state.
    pub fn spawn_vehicle(&mut self, pose: Pose, runtime: VehicleRuntime) -> VehicleId {
        let id = self.vehicles.insert(pose);
        self.runtime.insert(id, runtime);
        id
    }

    /// Remove a vehicle by handle, returning its last pose.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> Option<Pose> {
        self.runtime.remove(id);
        self.vehicles.remove(id)
    }

    /// Add a light at `position` using the configured interaction radius.
    pub fn add_light(&mut self, position: Position) -> LightId {
        self.lights.add(LightSource {
            position,
            radius: self.config.light_radius,
            draggable: true,
        })
    }

    /// Borrow runtime state for a specific vehicle.
    #[must_use]
    pub fn vehicle_runtime(&self, id: VehicleId) -> Option<&VehicleRuntime> {
        self.runtime.get(id)
    }

    /// Mutably borrow runtime state for a specific vehicle.
    #[must_use]
    pub fn vehicle_runtime_mut(&mut self, id: VehicleId) -> Option<&mut VehicleRuntime> {
        self.runtime.get_mut(id)
    }

    /// Combined pose and memory snapshot for one vehicle.
    #[must_use]
    pub fn snapshot_vehicle(&self, id: VehicleId) -> Option<VehicleFrame> {
        let pose = self.vehicles.snapshot(id)?;
        let runtime = self.runtime.get(id)?;
        Some(VehicleFrame {
            id,
            position: pose.position,
            heading: pose.heading,
            speed: pose.speed,
            memory: runtime.memory,
        })
    }

    /// Queue an interaction for the start of the next tick.
    pub fn queue_interaction(&mut self, command: Interaction) {
        self.pending.push(command);
    }

    /// Apply a single interaction command immediately.
    pub fn apply_interaction(&mut self, command: Interaction) {
        match command {
            Interaction::MoveNearestLight { position } => {
                self.lights.move_nearest(position);
            }
            Interaction::AddLight { position } => {
                self.add_light(position);
            }
            Interaction::GrabLight { position } => {
                self.lights.grab(position);
            }
            Interaction::DragLight { position } => {
                self.lights.drag(position);
            }
            Interaction::ReleaseLight => {
                self.lights.release();
            }
            Interaction::Boost { vehicle, duration } => {
                if let Some(state) = self.runtime.get_mut(vehicle) {
                    state.boost_timer = duration;
                }
            }
            Interaction::SetKeys { vehicle, keys } => {
                if let Some(state) = self.runtime.get_mut(vehicle) {
                    state.keys = keys;
                }
            }
        }
    }

    /// Replace the frame sink.
    pub fn set_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = sink;
    }

    /// Build the render-facing snapshot of the current tick.
    #[must_use]
    pub fn frame(&self) -> FrameSnapshot {
        let vehicles = self
            .vehicles
            .iter_handles()
            .filter_map(|id| self.snapshot_vehicle(id))
            .collect();
        let lights = self
            .lights
            .iter()
            .map(|(id, light)| LightFrame {
                id,
                position: light.position,
                radius: light.radius,
            })
            .collect();
        FrameSnapshot {
            tick: self.tick,
            vehicles,
            lights,
        }
    }

    fn stage_interactions(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let applied = pending.len();
        for command in pending {
            self.apply_interaction(command);
        }
        applied
    }

    fn stage_sense(&mut self, lights: &[LightSample]) {
        if self.vehicles.is_empty() {
            return;
        }
        let handles: Vec<VehicleId> = self.vehicles.iter_handles().collect();
        let profiles: Vec<SteeringProfile> = handles
            .iter()
            .map(|id| {
                self.runtime
                    .get(*id)
                    .map_or_else(SteeringProfile::default, |state| state.profile)
            })
            .collect();
        let poses = self.vehicles.poses();

        let readings: Vec<SensorReading> = poses
            .par_iter()
            .enumerate()
            .map(|(idx, pose)| {
                let profile = &profiles[idx];
                SensorReading {
                    left: intensity(
                        sensor_position(pose, profile, SensorSide::Left),
                        profile.sensor_gain,
                        lights,
                    ),
                    right: intensity(
                        sensor_position(pose, profile, SensorSide::Right),
                        profile.sensor_gain,
                        lights,
                    ),
                    ambient: intensity(pose.position, profile.sensor_gain, lights),
                }
            })
            .collect();

        for (idx, id) in handles.iter().enumerate() {
            if let Some(state) = self.runtime.get_mut(*id) {
                state.sensors = readings[idx];
            }
        }
    }

    /// Evaluate every behavior policy, writing headings and speeds.
    ///
    /// Returns, per dense row, whether the pending move must be suppressed
    /// (the avoidant variant predicting an overlap with a light).
    fn stage_steer(&mut self, lights: &[LightSample]) -> Vec<bool> {
        let dt = self.config.tick_seconds();
        let handles: Vec<VehicleId> = self.vehicles.iter_handles().collect();
        let mut holds = vec![false; handles.len()];
        let rng = &mut self.rng;
        let runtime = &mut self.runtime;
        let poses = self.vehicles.poses_mut();

        for (idx, id) in handles.iter().enumerate() {
            let Some(state) = runtime.get_mut(*id) else {
                continue;
            };
            let pose = &mut poses[idx];
            let profile = state.profile;
            let reading = state.sensors;

            match state.behavior {
                BehaviorVariant::Fear
                | BehaviorVariant::Aggression
                | BehaviorVariant::MemoryModulated => {
                    let scale = if state.behavior == BehaviorVariant::MemoryModulated {
                        let total = reading.left + reading.right;
                        let memory = state.memory.get_or_insert(0.5);
                        *memory = ((*memory + total * profile.memory_gain)
                            * profile.memory_decay)
                            .clamp(MEMORY_FLOOR, MEMORY_CEIL);
                        *memory
                    } else {
                        1.0
                    };
                    let (left_motor, right_motor) = match state.wiring {
                        WiringMode::Direct => (reading.left, reading.right),
                        WiringMode::Cross => (reading.right, reading.left),
                    };
                    pose.heading += (right_motor - left_motor) * profile.turn_gain * scale;
                    let target = ((left_motor + right_motor) * profile.speed_gain * scale
                        + profile.base_speed)
                        .min(profile.max_speed);
                    steer_speed(pose, &profile, target);
                }
                BehaviorVariant::Love | BehaviorVariant::Explorer => {
                    let left_motor =
                        (profile.max_speed - reading.left * profile.inhibit_gain).max(0.0);
                    let right_motor =
                        (profile.max_speed - reading.right * profile.inhibit_gain).max(0.0);
                    let mut turn = (right_motor - left_motor) * profile.turn_gain;
                    if state.behavior == BehaviorVariant::Explorer {
                        turn += rng.random_range(-profile.jitter..=profile.jitter);
                    }
                    pose.heading += turn;
                    let target = ((left_motor + right_motor) * profile.speed_gain
                        + profile.base_speed)
                        .min(profile.max_speed);
                    steer_speed(pose, &profile, target);
                    state.stopped = false;
                    if state.behavior == BehaviorVariant::Love {
                        if let Some(nearest) = nearest_sample(lights, pose.position) {
                            if pose.position.distance(nearest.position) < profile.stop_distance {
                                pose.speed = 0.0;
                                state.stopped = true;
                            }
                        }
                    }
                }
                BehaviorVariant::Figure8 => {
                    state.clock += dt;
                    pose.heading += profile.osc_amplitude
                        * (FULL_TURN * profile.osc_frequency * state.clock).sin();
                    if let Some(nearest) = nearest_sample(lights, pose.position) {
                        let bearing = (nearest.position.y - pose.position.y)
                            .atan2(nearest.position.x - pose.position.x);
                        pose.heading +=
                            profile.correction_gain * wrap_signed_angle(bearing - pose.heading);
                    }
                    let target = profile.max_speed
                        * (1.0 - reading.ambient / profile.ambient_threshold).max(0.0);
                    steer_speed(pose, &profile, target);
                }
                BehaviorVariant::RandomAvoidant => {
                    if state.turn_timer == 0 {
                        pose.heading +=
                            rng.random_range(-profile.wander_kick..=profile.wander_kick);
                        state.turn_timer =
                            rng.random_range(profile.wander_min..=profile.wander_max);
                    } else {
                        state.turn_timer -= 1;
                    }
                    pose.speed = if state.boost_timer > 0 {
                        state.boost_timer -= 1;
                        profile.max_speed
                    } else {
                        profile.base_speed
                    };
                    let predicted = Position::new(
                        pose.position.x + pose.heading.cos() * pose.speed,
                        pose.position.y + pose.heading.sin() * pose.speed,
                    );
                    let blocked = lights.iter().any(|light| {
                        predicted.distance(light.position) < profile.body_radius + light.radius
                    });
                    if blocked {
                        holds[idx] = true;
                        pose.heading +=
                            rng.random_range(-profile.avoid_kick..=profile.avoid_kick);
                    }
                }
                BehaviorVariant::Manual => {
                    if state.keys.left {
                        pose.heading -= profile.manual_turn;
                    }
                    if state.keys.right {
                        pose.heading += profile.manual_turn;
                    }
                    if state.keys.up {
                        pose.speed = (pose.speed + profile.manual_accel).min(profile.max_speed);
                    } else if state.keys.down {
                        pose.speed = (pose.speed - profile.manual_accel).max(profile.min_speed);
                    } else {
                        pose.speed *= profile.manual_drag;
                    }
                }
            }
        }
        holds
    }

    fn stage_integrate(&mut self, holds: &[bool]) {
        let width = self.config.world_width as f32;
        let height = self.config.world_height as f32;
        for (idx, pose) in self.vehicles.poses_mut().iter_mut().enumerate() {
            if holds.get(idx).copied().unwrap_or(false) {
                continue;
            }
            pose.position.x =
                wrap_position(pose.position.x + pose.heading.cos() * pose.speed, width);
            pose.position.y =
                wrap_position(pose.position.y + pose.heading.sin() * pose.speed, height);
        }
    }

    /// Execute one simulation tick pipeline returning emitted events.
    pub fn step(&mut self) -> TickEvents {
        let interactions_applied = self.stage_interactions();
        let lights = self.lights.samples();
        self.stage_sense(&lights);
        let holds = self.stage_steer(&lights);
        self.stage_integrate(&holds);
        self.tick = self.tick.next();

        let frame = self.frame();
        self.sink.on_frame(&frame);

        TickEvents {
            tick: self.tick,
            interactions_applied,
        }
    }
}

/// Fold a bounded target speed into the pose per the profile's response.
fn steer_speed(pose: &mut Pose, profile: &SteeringProfile, target: f32) {
    let bounded = target.clamp(profile.min_speed, profile.max_speed);
    pose.speed = match profile.speed_response {
        SpeedResponse::Snap => bounded,
        SpeedResponse::Smooth { factor } => (pose.speed + (bounded - pose.speed) * factor)
            .clamp(profile.min_speed, profile.max_speed),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_world(seed: u64) -> World {
        let config = BraitenbotsConfig {
            rng_seed: Some(seed),
            ..BraitenbotsConfig::default()
        };
        World::new(config).expect("world")
    }

    fn single_light(world: &mut World, x: f32, y: f32) -> LightId {
        world.add_light(Position::new(x, y))
    }

    #[test]
    fn intensity_is_positive_and_decreasing_in_distance() {
        let lights = [LightSample {
            position: Position::new(0.0, 0.0),
            radius: 15.0,
        }];
        let mut previous = f32::INFINITY;
        for step in 0..50 {
            let point = Position::new(step as f32 * 3.0, 0.0);
            let value = intensity(point, 8_000.0, &lights);
            assert!(value > 0.0);
            assert!(value < previous);
            previous = value;
        }
    }

    #[test]
    fn intensity_is_finite_at_zero_range() {
        let lights = [LightSample {
            position: Position::new(5.0, 5.0),
            radius: 15.0,
        }];
        let value = intensity(Position::new(5.0, 5.0), 8_000.0, &lights);
        assert!((value - 8_000.0).abs() < f32::EPSILON);
    }

    #[test]
    fn sensors_are_mirrored_about_heading() {
        let pose = Pose::new(Position::new(100.0, 200.0), 0.0, 0.0);
        let profile = SteeringProfile::fear();
        let left = sensor_position(&pose, &profile, SensorSide::Left);
        let right = sensor_position(&pose, &profile, SensorSide::Right);
        assert!((left.x - right.x).abs() < 1e-4);
        assert!((left.y - pose.position.y - (pose.position.y - right.y)).abs() < 1e-4);
    }

    #[test]
    fn head_on_approach_yields_no_turn() {
        let mut world = seeded_world(1);
        single_light(&mut world, 100.0, 100.0);
        let id = world.spawn_vehicle(
            Pose::new(Position::new(100.0, 200.0), std::f32::consts::FRAC_PI_2, 0.0),
            VehicleRuntime::fear(),
        );
        let before = world.vehicles().snapshot(id).expect("pose").heading;
        world.step();
        let after = world.vehicles().snapshot(id).expect("pose").heading;
        assert!((after - before).abs() < 1e-6);
    }

    #[test]
    fn aggression_turn_negates_fear_turn() {
        let mut world = seeded_world(2);
        single_light(&mut world, 300.0, 250.0);
        let start = Pose::new(Position::new(400.0, 300.0), 0.0, 0.0);
        let fear = world.spawn_vehicle(start, VehicleRuntime::fear());
        let aggr = world.spawn_vehicle(start, VehicleRuntime::aggression());
        world.step();
        let fear_delta = world.vehicles().snapshot(fear).expect("pose").heading - start.heading;
        let aggr_delta = world.vehicles().snapshot(aggr).expect("pose").heading - start.heading;
        assert!(fear_delta.abs() > 0.0);
        assert!((fear_delta + aggr_delta).abs() < 1e-6);
    }

    #[test]
    fn fear_speed_blends_smoothly_toward_target() {
        let mut world = seeded_world(3);
        single_light(&mut world, 700.0, 500.0);
        let id = world.spawn_vehicle(
            Pose::new(Position::new(100.0, 100.0), 0.0, 0.0),
            VehicleRuntime::fear(),
        );
        world.step();
        let speed = world.vehicles().snapshot(id).expect("pose").speed;
        // Far from the light the target is close to base_speed; one smoothing
        // step covers a tenth of the gap.
        assert!(speed > 0.0);
        assert!(speed < 1.0);
    }

    #[test]
    fn memory_stays_clamped_under_saturating_stimulus() {
        let mut world = seeded_world(4);
        let light = single_light(&mut world, 400.0, 300.0);
        let id = world.spawn_vehicle(
            Pose::new(Position::new(400.0, 300.0), 0.0, 0.0),
            VehicleRuntime::memory_modulated(WiringMode::Cross),
        );
        for _ in 0..600 {
            // Keep the light pinned to the vehicle to maximise stimulus.
            let position = world.vehicles().snapshot(id).expect("pose").position;
            world
                .lights_mut()
                .get_mut(light)
                .expect("light")
                .position = position;
            world.step();
            let memory = world
                .vehicle_runtime(id)
                .and_then(|state| state.memory)
                .expect("memory");
            assert!((MEMORY_FLOOR..=MEMORY_CEIL).contains(&memory));
        }
    }

    #[test]
    fn memory_decays_toward_floor_without_stimulus() {
        let mut world = seeded_world(5);
        let id = world.spawn_vehicle(
            Pose::new(Position::new(400.0, 300.0), 0.0, 0.0),
            VehicleRuntime::memory_modulated(WiringMode::Direct),
        );
        for _ in 0..4_000 {
            world.step();
        }
        let memory = world
            .vehicle_runtime(id)
            .and_then(|state| state.memory)
            .expect("memory");
        assert!((memory - MEMORY_FLOOR).abs() < 1e-3);
    }

    #[test]
    fn love_vehicle_stops_inside_stop_distance() {
        let mut world = seeded_world(6);
        single_light(&mut world, 200.0, 200.0);
        let id = world.spawn_vehicle(
            Pose::new(Position::new(205.0, 200.0), 0.0, 4.0),
            VehicleRuntime::love(),
        );
        world.step();
        let pose = world.vehicles().snapshot(id).expect("pose");
        assert_eq!(pose.speed, 0.0);
        assert!(world.vehicle_runtime(id).expect("runtime").stopped);
    }

    #[test]
    fn explorer_speed_never_drops_below_floor() {
        let mut world = seeded_world(7);
        single_light(&mut world, 300.0, 300.0);
        let id = world.spawn_vehicle(
            Pose::new(Position::new(300.0, 300.0), 0.0, 0.0),
            VehicleRuntime::explorer(),
        );
        for _ in 0..120 {
            world.step();
            let pose = world.vehicles().snapshot(id).expect("pose");
            assert!(pose.speed >= 0.5 - f32::EPSILON);
            assert!(pose.speed <= 2.0 + f32::EPSILON);
        }
    }

    #[test]
    fn figure8_is_inhibited_on_top_of_a_light() {
        let mut world = seeded_world(8);
        single_light(&mut world, 450.0, 325.0);
        let mut runtime = VehicleRuntime::figure8(&mut rand::rngs::SmallRng::seed_from_u64(8));
        runtime.clock = 0.0;
        let id = world.spawn_vehicle(
            Pose::new(Position::new(450.0, 325.0), 0.0, 3.0),
            runtime,
        );
        world.step();
        let pose = world.vehicles().snapshot(id).expect("pose");
        // Ambient intensity at zero range is 5000, far above the threshold.
        assert_eq!(pose.speed, 0.0);
    }

    #[test]
    fn avoidant_holds_position_and_kicks_heading_when_blocked() {
        let mut world = seeded_world(9);
        single_light(&mut world, 105.0, 100.0);
        let mut runtime = VehicleRuntime::random_avoidant(&mut rand::rngs::SmallRng::seed_from_u64(9));
        runtime.turn_timer = 1_000; // keep the wander turn out of the way
        let id = world.spawn_vehicle(
            Pose::new(Position::new(100.0, 100.0), 0.0, 0.0),
            runtime,
        );
        let before = world.vehicles().snapshot(id).expect("pose");
        world.step();
        let after = world.vehicles().snapshot(id).expect("pose");
        assert_eq!(after.position, before.position);
        let kick = after.heading - before.heading;
        assert!(kick.abs() <= 1.0 + f32::EPSILON);
    }

    #[test]
    fn boost_raises_avoidant_speed_for_its_duration() {
        let mut world = seeded_world(10);
        let mut runtime = VehicleRuntime::random_avoidant(&mut rand::rngs::SmallRng::seed_from_u64(10));
        runtime.turn_timer = 1_000;
        let id = world.spawn_vehicle(
            Pose::new(Position::new(400.0, 300.0), 0.0, 0.0),
            runtime,
        );
        world.queue_interaction(Interaction::Boost {
            vehicle: id,
            duration: 3,
        });
        for _ in 0..3 {
            world.step();
            assert_eq!(world.vehicles().snapshot(id).expect("pose").speed, 6.0);
        }
        world.step();
        assert_eq!(world.vehicles().snapshot(id).expect("pose").speed, 2.0);
    }

    #[test]
    fn manual_vehicle_accelerates_and_coasts() {
        let mut world = seeded_world(11);
        let id = world.spawn_vehicle(
            Pose::new(Position::new(400.0, 300.0), 0.0, 0.0),
            VehicleRuntime::manual(),
        );
        world.queue_interaction(Interaction::SetKeys {
            vehicle: id,
            keys: KeyState {
                up: true,
                ..KeyState::default()
            },
        });
        world.step();
        let accelerated = world.vehicles().snapshot(id).expect("pose").speed;
        assert!((accelerated - 0.1).abs() < 1e-6);

        world.queue_interaction(Interaction::SetKeys {
            vehicle: id,
            keys: KeyState::default(),
        });
        world.step();
        let coasting = world.vehicles().snapshot(id).expect("pose").speed;
        assert!(coasting < accelerated);
        assert!(coasting > 0.0);
    }

    #[test]
    fn integration_moves_and_wraps_on_the_torus() {
        let config = BraitenbotsConfig {
            world_width: 100,
            world_height: 100,
            rng_seed: Some(12),
            ..BraitenbotsConfig::default()
        };
        let mut world = World::new(config).expect("world");
        let id = world.spawn_vehicle(
            Pose::new(Position::new(0.0, 0.0), 0.0, 5.0),
            VehicleRuntime::manual(),
        );
        world.queue_interaction(Interaction::SetKeys {
            vehicle: id,
            keys: KeyState {
                up: true,
                ..KeyState::default()
            },
        });
        world.step();
        let pose = world.vehicles().snapshot(id).expect("pose");
        assert!((pose.position.x - 5.0).abs() < 1e-4);
        assert!(pose.position.y.abs() < 1e-4);

        for _ in 0..19 {
            world.step();
        }
        let pose = world.vehicles().snapshot(id).expect("pose");
        // 20 steps at the capped speed of 5 land exactly on the seam.
        assert!(pose.position.x >= 0.0);
        assert!(pose.position.x < 100.0);
        assert!(pose.position.x < 5.0 + 1e-3);
    }

    #[test]
    fn wrap_position_handles_negative_coordinates() {
        assert!((wrap_position(-3.0, 100.0) - 97.0).abs() < 1e-6);
        assert!((wrap_position(103.0, 100.0) - 3.0).abs() < 1e-6);
        assert_eq!(wrap_position(0.0, 100.0), 0.0);
        assert_eq!(wrap_position(42.0, 0.0), 0.0);
    }

    #[test]
    fn positions_stay_inside_bounds_for_all_variants() {
        let mut world = seeded_world(13);
        single_light(&mut world, 400.0, 300.0);
        single_light(&mut world, 200.0, 150.0);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(99);
        let runtimes = vec![
            VehicleRuntime::fear(),
            VehicleRuntime::aggression(),
            VehicleRuntime::love(),
            VehicleRuntime::explorer(),
            VehicleRuntime::figure8(&mut rng),
            VehicleRuntime::memory_modulated(WiringMode::Cross),
            VehicleRuntime::random_avoidant(&mut rng),
        ];
        for (slot, runtime) in runtimes.into_iter().enumerate() {
            world.spawn_vehicle(
                Pose::new(
                    Position::new(100.0 + slot as f32 * 90.0, 200.0),
                    0.7 * slot as f32,
                    0.0,
                ),
                runtime,
            );
        }
        for _ in 0..500 {
            world.step();
            for pose in world.vehicles().poses() {
                assert!(pose.position.x >= 0.0 && pose.position.x < 800.0);
                assert!(pose.position.y >= 0.0 && pose.position.y < 600.0);
            }
        }
    }

    #[test]
    fn nearest_light_tie_breaks_to_first_added() {
        let mut world = seeded_world(14);
        let first = single_light(&mut world, 100.0, 200.0);
        let second = single_light(&mut world, 300.0, 200.0);
        world.queue_interaction(Interaction::MoveNearestLight {
            position: Position::new(200.0, 200.0),
        });
        world.step();
        let moved = world.lights().get(first).expect("first light");
        let untouched = world.lights().get(second).expect("second light");
        assert_eq!(moved.position, Position::new(200.0, 200.0));
        assert_eq!(untouched.position, Position::new(300.0, 200.0));
    }

    #[test]
    fn add_light_interaction_grows_the_field() {
        let mut world = seeded_world(15);
        assert!(world.lights().is_empty());
        world.queue_interaction(Interaction::AddLight {
            position: Position::new(640.0, 480.0),
        });
        world.step();
        assert_eq!(world.lights().len(), 1);
        let (_, light) = world.lights().iter().next().expect("light");
        assert_eq!(light.position, Position::new(640.0, 480.0));
        assert!(light.draggable);
    }

    #[test]
    fn grab_drag_release_moves_only_the_held_light() {
        let mut world = seeded_world(16);
        let held = single_light(&mut world, 100.0, 100.0);
        let other = single_light(&mut world, 500.0, 500.0);
        world.queue_interaction(Interaction::GrabLight {
            position: Position::new(104.0, 100.0),
        });
        world.queue_interaction(Interaction::DragLight {
            position: Position::new(250.0, 260.0),
        });
        world.step();
        assert_eq!(
            world.lights().get(held).expect("held").position,
            Position::new(250.0, 260.0)
        );
        assert_eq!(
            world.lights().get(other).expect("other").position,
            Position::new(500.0, 500.0)
        );

        world.queue_interaction(Interaction::ReleaseLight);
        world.queue_interaction(Interaction::DragLight {
            position: Position::new(10.0, 10.0),
        });
        world.step();
        assert_eq!(
            world.lights().get(held).expect("held").position,
            Position::new(250.0, 260.0)
        );
    }

    #[test]
    fn grab_misses_when_pointer_is_outside_the_radius() {
        let mut world = seeded_world(17);
        single_light(&mut world, 100.0, 100.0);
        world.queue_interaction(Interaction::GrabLight {
            position: Position::new(140.0, 100.0),
        });
        world.step();
        assert!(world.lights().held().is_none());
    }

    #[test]
    fn out_of_bounds_light_coordinates_are_accepted() {
        let mut world = seeded_world(18);
        world.queue_interaction(Interaction::AddLight {
            position: Position::new(-250.0, 900.0),
        });
        world.step();
        let (_, light) = world.lights().iter().next().expect("light");
        assert_eq!(light.position, Position::new(-250.0, 900.0));
    }

    #[test]
    fn vehicle_arena_keeps_dense_rows_coherent() {
        let mut arena = VehicleArena::new();
        let a = arena.insert(Pose::new(Position::new(0.0, 1.0), 0.0, 0.0));
        let b = arena.insert(Pose::new(Position::new(1.0, 2.0), 0.5, 1.0));
        let c = arena.insert(Pose::new(Position::new(2.0, 3.0), 1.0, 2.0));
        assert_eq!(arena.len(), 3);

        let removed = arena.remove(b).expect("vehicle removed");
        assert_eq!(removed.position, Position::new(1.0, 2.0));
        assert_eq!(arena.len(), 2);
        assert!(arena.contains(a));
        assert!(arena.contains(c));
        assert!(!arena.contains(b));
        assert_eq!(arena.index_of(c), Some(1));

        let d = arena.insert(Pose::default());
        assert_ne!(b, d, "generational handles must not be reused immediately");
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let zero_width = BraitenbotsConfig {
            world_width: 0,
            ..BraitenbotsConfig::default()
        };
        assert!(World::new(zero_width).is_err());

        let bad_rate = BraitenbotsConfig {
            tick_rate_hz: 0.0,
            ..BraitenbotsConfig::default()
        };
        assert!(World::new(bad_rate).is_err());

        let bad_radius = BraitenbotsConfig {
            light_radius: -1.0,
            ..BraitenbotsConfig::default()
        };
        assert!(World::new(bad_radius).is_err());
    }

    #[test]
    fn step_reports_drained_interactions() {
        let mut world = seeded_world(19);
        world.queue_interaction(Interaction::AddLight {
            position: Position::new(10.0, 10.0),
        });
        world.queue_interaction(Interaction::AddLight {
            position: Position::new(20.0, 20.0),
        });
        let events = world.step();
        assert_eq!(events.tick, Tick(1));
        assert_eq!(events.interactions_applied, 2);

        let events = world.step();
        assert_eq!(events.tick, Tick(2));
        assert_eq!(events.interactions_applied, 0);
    }

    #[test]
    fn frames_reach_the_attached_sink() {
        use std::sync::{Arc, Mutex};

        #[derive(Default)]
        struct SpySink {
            frames: Arc<Mutex<Vec<FrameSnapshot>>>,
        }

        impl FrameSink for SpySink {
            fn on_frame(&mut self, frame: &FrameSnapshot) {
                self.frames.lock().unwrap().push(frame.clone());
            }
        }

        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = SpySink {
            frames: Arc::clone(&frames),
        };
        let config = BraitenbotsConfig {
            rng_seed: Some(20),
            ..BraitenbotsConfig::default()
        };
        let mut world = World::with_sink(config, Box::new(sink)).expect("world");
        single_light(&mut world, 50.0, 60.0);
        world.spawn_vehicle(
            Pose::new(Position::new(400.0, 300.0), 0.0, 0.0),
            VehicleRuntime::fear(),
        );
        world.step();
        world.step();

        let captured = frames.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].tick, Tick(1));
        assert_eq!(captured[0].vehicles.len(), 1);
        assert_eq!(captured[0].lights.len(), 1);
        assert!(captured[0].vehicles[0].memory.is_none());
    }
}
