//! Core simulation for the forager arena.
//!
//! A single kinematic agent roams a bounded floor collecting good and bad
//! markers that a timer-driven spawner scatters across the arena. Episodes
//! are fixed-tick windows ended by timeout, by the agent falling off the
//! floor, or externally. The caller owns the loop: it supplies one discrete
//! action per [`ForagerWorld::step`] call and consumes the emitted events,
//! observations, and rewards.

use forager_sense::{FanRaySensor, ProximitySensor, RayHit, RayTarget, SenseError};
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::collections::VecDeque;
use thiserror::Error;

new_key_type! {
    /// Stable handle for markers backed by a generational slot map.
    pub struct MarkerId;
}

/// Number of scalar observations produced each tick.
pub const OBSERVATION_SIZE: usize = 12;
/// Number of discrete actions understood by the agent.
pub const ACTION_COUNT: usize = 5;

/// Reward applied when the agent chooses to do nothing.
pub const IDLE_PENALTY: f32 = -0.01;
/// Reward for collecting a good marker.
pub const GOOD_COLLECT_REWARD: f32 = 3.0;
/// Reward for collecting a bad marker.
pub const BAD_COLLECT_REWARD: f32 = -3.0;
/// Reward applied when the agent falls off the arena.
pub const FALL_PENALTY: f32 = -10.0;
/// Per-ray reward scale for proximity sensing.
pub const PROXIMITY_REWARD_SCALE: f32 = 0.005;

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
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

/// World-space position; `y` is the vertical axis, movement happens in XZ.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Velocity vector matching the [`Position`] axis convention.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
}

impl Velocity {
    /// Construct a new velocity vector.
    #[must_use]
    pub const fn new(vx: f32, vy: f32, vz: f32) -> Self {
        Self { vx, vy, vz }
    }
}

/// Marker classification driving reward sign.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Good,
    Bad,
}

impl MarkerKind {
    /// Whether collecting this marker yields a positive reward.
    #[must_use]
    pub const fn is_good(self) -> bool {
        matches!(self, Self::Good)
    }
}

/// A collectible placed by the spawner. The kind is fixed at creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub position: Position,
}

/// Axis-aligned rectangular arena with a fixed floor height.
///
/// Immutable after construction; the spawner that owns it uses the bounds
/// both for placement and for scoping arena-wide clears.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ArenaBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
    pub floor_y: f32,
}

impl ArenaBounds {
    /// Construct bounds without validation; [`ForagerConfig::validate`]
    /// checks extents for world-owned arenas.
    #[must_use]
    pub const fn new(min_x: f32, max_x: f32, min_z: f32, max_z: f32, floor_y: f32) -> Self {
        Self {
            min_x,
            max_x,
            min_z,
            max_z,
            floor_y,
        }
    }

    /// Extent along the X axis.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    /// Extent along the Z axis.
    #[must_use]
    pub fn depth(&self) -> f32 {
        self.max_z - self.min_z
    }

    /// Planar containment check; the vertical coordinate is ignored.
    #[must_use]
    pub fn contains_xz(&self, x: f32, z: f32) -> bool {
        x >= self.min_x && x <= self.max_x && z >= self.min_z && z <= self.max_z
    }

    /// Sample a uniform planar point, inset from every edge by `margin`.
    pub fn random_xz(&self, rng: &mut dyn RngCore, margin: f32) -> (f32, f32) {
        let x = rng.random_range(self.min_x + margin..self.max_x - margin);
        let z = rng.random_range(self.min_z + margin..self.max_z - margin);
        (x, z)
    }
}

impl Default for ArenaBounds {
    fn default() -> Self {
        Self::new(-5.0, 5.0, -5.0, 5.0, 0.0)
    }
}

/// Registry of live markers keyed by generational handles.
///
/// This is the whole "scene": multiple spawners may share one board, each
/// clearing only the markers inside its own arena bounds.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MarkerBoard {
    markers: SlotMap<MarkerId, Marker>,
}

impl MarkerBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live markers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Returns true when no markers are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Insert a marker and return its handle.
    pub fn insert(&mut self, marker: Marker) -> MarkerId {
        self.markers.insert(marker)
    }

    /// Remove `id` returning its data if it was live.
    pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        self.markers.remove(id)
    }

    /// Returns true if `id` refers to a live marker.
    #[must_use]
    pub fn contains(&self, id: MarkerId) -> bool {
        self.markers.contains_key(id)
    }

    /// Borrow the marker behind `id`, if live.
    #[must_use]
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(id)
    }

    /// Iterate over live markers.
    pub fn iter(&self) -> impl Iterator<Item = (MarkerId, &Marker)> {
        self.markers.iter()
    }

    /// Count live markers of the given kind.
    #[must_use]
    pub fn count_of(&self, kind: MarkerKind) -> usize {
        self.markers.values().filter(|m| m.kind == kind).count()
    }

    /// Remove every marker whose planar position falls inside `bounds`,
    /// returning how many were removed. Markers in other arenas survive.
    pub fn clear_within(&mut self, bounds: &ArenaBounds) -> usize {
        let before = self.markers.len();
        self.markers
            .retain(|_, marker| !bounds.contains_xz(marker.position.x, marker.position.z));
        before - self.markers.len()
    }

    /// Project live markers into ray targets with the given hit radius.
    #[must_use]
    pub fn ray_targets(&self, radius: f32) -> Vec<RayTarget<MarkerKind>> {
        self.markers
            .values()
            .map(|marker| RayTarget {
                x: marker.position.x,
                z: marker.position.z,
                radius,
                tag: marker.kind,
            })
            .collect()
    }
}

/// Timer-driven marker spawner scoped to one arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spawner {
    bounds: ArenaBounds,
    frequency: f32,
    spawn_height: f32,
    timer: f32,
    auto_spawning: bool,
}

impl Spawner {
    /// Create a spawner. A non-positive `frequency` permanently disables the
    /// timer path; explicit spawns keep working.
    #[must_use]
    pub fn new(bounds: ArenaBounds, frequency: f32, spawn_height: f32) -> Self {
        let auto_spawning = frequency > 0.0;
        Self {
            bounds,
            frequency,
            spawn_height,
            timer: if auto_spawning { frequency } else { 0.0 },
            auto_spawning,
        }
    }

    /// Arena this spawner owns.
    #[must_use]
    pub const fn bounds(&self) -> &ArenaBounds {
        &self.bounds
    }

    /// Remaining time until the next automatic spawn.
    #[must_use]
    pub const fn timer(&self) -> f32 {
        self.timer
    }

    /// Whether the timer path is enabled.
    #[must_use]
    pub const fn auto_spawning(&self) -> bool {
        self.auto_spawning
    }

    /// Advance the spawn timer by `dt`, spawning one marker when it expires.
    pub fn tick(
        &mut self,
        dt: f32,
        rng: &mut dyn RngCore,
        board: &mut MarkerBoard,
    ) -> Option<MarkerId> {
        if !self.auto_spawning || self.timer <= 0.0 {
            return None;
        }
        self.timer -= dt;
        if self.timer <= 0.0 {
            let id = self.spawn_one(rng, board);
            self.timer = self.frequency;
            return Some(id);
        }
        None
    }

    /// Spawn one marker at a uniform planar position inside the arena.
    ///
    /// Kind is drawn from {0, 1, 2}: good on 1 or 2, bad on 0 (a 2:1 ratio).
    pub fn spawn_one(&self, rng: &mut dyn RngCore, board: &mut MarkerBoard) -> MarkerId {
        let x = rng.random_range(self.bounds.min_x..self.bounds.max_x);
        let z = rng.random_range(self.bounds.min_z..self.bounds.max_z);
        let kind = if rng.random_range(0..3) > 0 {
            MarkerKind::Good
        } else {
            MarkerKind::Bad
        };
        board.insert(Marker {
            kind,
            position: Position::new(x, self.bounds.floor_y + self.spawn_height, z),
        })
    }

    /// Spawn `count` markers in one burst (episode seeding).
    pub fn spawn_burst(&self, count: u32, rng: &mut dyn RngCore, board: &mut MarkerBoard) {
        for _ in 0..count {
            self.spawn_one(rng, board);
        }
    }

    /// Remove every live marker inside this spawner's arena bounds.
    pub fn clear_arena(&self, board: &mut MarkerBoard) -> usize {
        board.clear_within(&self.bounds)
    }

    /// Full spawn-state reset: clear the arena, then rearm the timer if the
    /// timer path is enabled. Idempotent on the timer value.
    pub fn reset_for_episode(&mut self, board: &mut MarkerBoard) -> usize {
        let cleared = self.clear_arena(board);
        if self.auto_spawning {
            self.timer = self.frequency;
        }
        cleared
    }
}

/// Discrete actions understood by the agent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    #[default]
    Nothing,
    Left,
    Right,
    Forward,
    Back,
}

impl Action {
    /// Map a raw action index to an action. Out-of-range indices yield
    /// `None` and are treated by the world as penalty-free no-ops.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nothing),
            1 => Some(Self::Left),
            2 => Some(Self::Right),
            3 => Some(Self::Forward),
            4 => Some(Self::Back),
            _ => None,
        }
    }

    /// Raw index of this action.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Nothing => 0,
            Self::Left => 1,
            Self::Right => 2,
            Self::Forward => 3,
            Self::Back => 4,
        }
    }

    /// Unit movement vector along the arena axes as (x, z).
    #[must_use]
    pub const fn movement(self) -> (f32, f32) {
        match self {
            Self::Nothing => (0.0, 0.0),
            Self::Left => (-1.0, 0.0),
            Self::Right => (1.0, 0.0),
            Self::Forward => (0.0, 1.0),
            Self::Back => (0.0, -1.0),
        }
    }

    /// Yaw the agent snaps to when moving, in degrees wrapped to [0, 360).
    /// The source environment assigns -90 for left, which reads back as 270.
    #[must_use]
    pub const fn yaw(self) -> Option<f32> {
        match self {
            Self::Nothing => None,
            Self::Left => Some(270.0),
            Self::Right => Some(90.0),
            Self::Forward => Some(0.0),
            Self::Back => Some(180.0),
        }
    }
}

/// Pressed-key snapshot for manual control.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeySet {
    pub left: bool,
    pub right: bool,
    pub forward: bool,
    pub back: bool,
}

/// Map pressed keys to a discrete action; first match wins with priority
/// left > right > forward > back, defaulting to doing nothing.
#[must_use]
pub fn heuristic_action(keys: KeySet) -> Action {
    if keys.left {
        Action::Left
    } else if keys.right {
        Action::Right
    } else if keys.forward {
        Action::Forward
    } else if keys.back {
        Action::Back
    } else {
        Action::Nothing
    }
}

/// Movement intent derived from continuous input axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveIntent {
    /// Normalized planar movement as (x, z).
    pub movement: (f32, f32),
    /// Yaw to face, or `None` to keep the current heading.
    pub yaw_degrees: Option<f32>,
    /// Whether the walk animation flag should be raised.
    pub is_walking: bool,
}

/// Map keyboard axes in [-1, 1] to a movement intent, mirroring the manual
/// controller: horizontal input wins the facing direction over vertical.
#[must_use]
pub fn axis_drive(horizontal: f32, vertical: f32) -> DriveIntent {
    let magnitude = (horizontal * horizontal + vertical * vertical).sqrt();
    let movement = if magnitude > 0.0 {
        (horizontal / magnitude, vertical / magnitude)
    } else {
        (0.0, 0.0)
    };
    let yaw_degrees = if horizontal > 0.0 {
        Some(90.0)
    } else if horizontal < 0.0 {
        Some(270.0)
    } else if vertical > 0.0 {
        Some(0.0)
    } else if vertical < 0.0 {
        Some(180.0)
    } else {
        None
    };
    DriveIntent {
        movement,
        yaw_degrees,
        is_walking: magnitude > 0.1,
    }
}

/// Kinematic state of the foraging agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentBody {
    pub position: Position,
    pub velocity: Velocity,
    /// Heading in degrees, always one of {0, 90, 180, 270} once an action
    /// has moved the agent.
    pub yaw_degrees: f32,
    pub is_walking: bool,
}

impl Default for AgentBody {
    fn default() -> Self {
        Self {
            position: Position::default(),
            velocity: Velocity::default(),
            yaw_degrees: 0.0,
            is_walking: false,
        }
    }
}

/// Episode lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EpisodePhase {
    Active,
    /// No episode in flight; [`ForagerWorld::step`] is a no-op until
    /// [`ForagerWorld::begin_episode`] runs.
    #[default]
    Terminated,
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EpisodeEnd {
    /// The fixed tick budget elapsed; no extra reward.
    Timeout,
    /// The agent dropped below the fall threshold; [`FALL_PENALTY`] applied.
    Fell,
    /// Terminated by the caller.
    External,
}

/// Events emitted after processing a world tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickEvents {
    pub tick: Tick,
    /// Reward delta accumulated over this tick.
    pub reward: f32,
    pub collected_good: u32,
    pub collected_bad: u32,
    pub spawned: Option<MarkerId>,
    pub ended: Option<EpisodeEnd>,
}

/// Summary recorded when an episode terminates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EpisodeSummary {
    /// 1-based episode counter over the world's lifetime.
    pub episode: u64,
    pub ticks: u64,
    pub reward: f32,
    pub collected_good: u32,
    pub collected_bad: u32,
    pub end: EpisodeEnd,
}

/// Observer notified whenever the agent collects a marker, decoupled from
/// the reward path.
pub trait CollectionObserver: Send {
    fn on_collected(&mut self, kind: MarkerKind);
}

/// No-op observer.
#[derive(Debug, Default)]
pub struct NullObserver;

impl CollectionObserver for NullObserver {
    fn on_collected(&mut self, _kind: MarkerKind) {}
}

/// Errors that can occur when constructing world state.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Sensor construction failed.
    #[error(transparent)]
    Sense(#[from] SenseError),
}

/// Static configuration for a forager world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForagerConfig {
    /// Arena bounds owned by the world's spawner.
    pub arena: ArenaBounds,
    /// Seconds between automatic spawns; non-positive disables the timer.
    pub spawn_frequency: f32,
    /// Marker height above the floor.
    pub spawn_height: f32,
    /// Markers seeded into the arena at episode start.
    pub burst_count: u32,
    /// Marker hit radius used by the proximity rays.
    pub marker_radius: f32,
    /// Planar distance at which the agent collects a marker.
    pub collect_radius: f32,
    /// Planar speed applied while a movement action is held.
    pub move_speed: f32,
    /// Inset from the arena edges when placing the agent.
    pub agent_spawn_margin: f32,
    /// Height above the floor the agent is dropped from at episode start.
    pub agent_drop_height: f32,
    /// Episode length in seconds of fixed-tick time.
    pub episode_timeout: f32,
    /// Fixed tick duration in seconds.
    pub fixed_dt: f32,
    /// Vertical position below which the agent counts as fallen.
    pub fall_threshold: f32,
    /// Downward acceleration applied to the agent.
    pub gravity: f32,
    /// Number of proximity rays in the fan.
    pub sensor_rays: usize,
    /// Half-arc of the ray fan in degrees.
    pub sensor_half_arc: f32,
    /// Ray length in world units.
    pub sensor_range: f32,
    /// Maximum number of episode summaries retained in memory.
    pub history_capacity: usize,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
}

impl Default for ForagerConfig {
    fn default() -> Self {
        Self {
            arena: ArenaBounds::default(),
            spawn_frequency: 5.0,
            spawn_height: 1.0,
            burst_count: 80,
            marker_radius: 0.5,
            collect_radius: 1.0,
            move_speed: 5.0,
            agent_spawn_margin: 1.5,
            agent_drop_height: 1.0,
            episode_timeout: 40.0,
            fixed_dt: 0.02,
            fall_threshold: 0.0,
            gravity: 9.81,
            sensor_rays: 7,
            sensor_half_arc: 70.0,
            sensor_range: 10.0,
            history_capacity: 256,
            rng_seed: None,
        }
    }
}

impl ForagerConfig {
    /// Validate scalar parameters, returning the episode tick budget.
    fn validate(&self) -> Result<u64, WorldError> {
        if !(self.arena.width() > 0.0) || !(self.arena.depth() > 0.0) {
            return Err(WorldError::InvalidConfig(
                "arena extents must be positive along both axes",
            ));
        }
        if self.agent_spawn_margin < 0.0
            || self.agent_spawn_margin * 2.0 >= self.arena.width()
            || self.agent_spawn_margin * 2.0 >= self.arena.depth()
        {
            return Err(WorldError::InvalidConfig(
                "agent spawn margin must be non-negative and leave interior room",
            ));
        }
        if self.fixed_dt <= 0.0 || !self.fixed_dt.is_finite() {
            return Err(WorldError::InvalidConfig("fixed_dt must be positive"));
        }
        if self.episode_timeout <= 0.0 || !self.episode_timeout.is_finite() {
            return Err(WorldError::InvalidConfig(
                "episode_timeout must be positive",
            ));
        }
        if self.move_speed <= 0.0 {
            return Err(WorldError::InvalidConfig("move_speed must be positive"));
        }
        if self.marker_radius <= 0.0 || self.collect_radius <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "marker and collect radii must be positive",
            ));
        }
        if self.gravity < 0.0 {
            return Err(WorldError::InvalidConfig("gravity must be non-negative"));
        }
        if self.history_capacity == 0 {
            return Err(WorldError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        // Fixed-tick schedule: 40 s at 0.02 s/tick is exactly 2000 ticks.
        let ticks = (f64::from(self.episode_timeout) / f64::from(self.fixed_dt)).round();
        if !(ticks >= 1.0) {
            return Err(WorldError::InvalidConfig(
                "episode_timeout must cover at least one tick",
            ));
        }
        Ok(ticks as u64)
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
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

/// Aggregate world state: arena, marker registry, spawner, and agent.
pub struct ForagerWorld {
    config: ForagerConfig,
    tick: Tick,
    rng: SmallRng,
    markers: MarkerBoard,
    spawner: Spawner,
    agent: AgentBody,
    sensor: FanRaySensor,
    phase: EpisodePhase,
    timeout_ticks: u64,
    episode_ticks: u64,
    episode_reward: f32,
    episode_good: u32,
    episode_bad: u32,
    episodes_completed: u64,
    observer: Box<dyn CollectionObserver>,
    last_rays: Vec<Option<RayHit<MarkerKind>>>,
    history: VecDeque<EpisodeSummary>,
}

impl std::fmt::Debug for ForagerWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForagerWorld")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("phase", &self.phase)
            .field("marker_count", &self.markers.len())
            .field("episodes_completed", &self.episodes_completed)
            .finish()
    }
}

impl ForagerWorld {
    /// Instantiate a new world using the supplied configuration.
    pub fn new(config: ForagerConfig) -> Result<Self, WorldError> {
        Self::with_observer(config, Box::new(NullObserver))
    }

    /// Instantiate a new world with a collection observer attached.
    pub fn with_observer(
        config: ForagerConfig,
        observer: Box<dyn CollectionObserver>,
    ) -> Result<Self, WorldError> {
        let timeout_ticks = config.validate()?;
        let sensor = FanRaySensor::new(
            config.sensor_rays,
            config.sensor_half_arc,
            config.sensor_range,
        )?;
        let rng = config.seeded_rng();
        let spawner = Spawner::new(config.arena, config.spawn_frequency, config.spawn_height);
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            markers: MarkerBoard::new(),
            spawner,
            agent: AgentBody::default(),
            sensor,
            phase: EpisodePhase::Terminated,
            timeout_ticks,
            episode_ticks: 0,
            episode_reward: 0.0,
            episode_good: 0,
            episode_bad: 0,
            episodes_completed: 0,
            observer,
            last_rays: Vec::new(),
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Begin a fresh episode: random interior agent placement, physics and
    /// timer reset, then a full spawner reset plus seeding burst.
    pub fn begin_episode(&mut self) {
        let bounds = *self.spawner.bounds();
        let (x, z) = bounds.random_xz(&mut self.rng, self.config.agent_spawn_margin);
        self.agent.position = Position::new(x, bounds.floor_y + self.config.agent_drop_height, z);
        self.agent.velocity = Velocity::default();
        self.agent.is_walking = false;
        // Heading is deliberately carried over from the previous episode.
        self.episode_ticks = 0;
        self.episode_reward = 0.0;
        self.episode_good = 0;
        self.episode_bad = 0;
        self.last_rays.clear();
        self.phase = EpisodePhase::Active;
        self.spawner.reset_for_episode(&mut self.markers);
        self.spawner
            .spawn_burst(self.config.burst_count, &mut self.rng, &mut self.markers);
    }

    /// Execute one fixed tick with the supplied raw action index.
    ///
    /// A tick in the terminated phase is not observed: the call is a no-op
    /// until [`Self::begin_episode`] runs again.
    pub fn step(&mut self, action_index: usize) -> TickEvents {
        if self.phase == EpisodePhase::Terminated {
            return TickEvents {
                tick: self.tick,
                ..TickEvents::default()
            };
        }

        let next_tick = self.tick.next();
        let spawned = self
            .spawner
            .tick(self.config.fixed_dt, &mut self.rng, &mut self.markers);

        let mut reward = self.stage_action(action_index);
        self.stage_physics();
        let (collect_reward, good, bad) = self.stage_collection();
        reward += collect_reward;
        reward += self.stage_proximity();

        let mut ended = None;
        if self.agent.position.y < self.config.fall_threshold {
            reward += FALL_PENALTY;
            ended = Some(EpisodeEnd::Fell);
        }

        self.episode_ticks += 1;
        if ended.is_none() && self.episode_ticks >= self.timeout_ticks {
            ended = Some(EpisodeEnd::Timeout);
        }

        self.episode_reward += reward;
        self.episode_good += good;
        self.episode_bad += bad;
        if let Some(end) = ended {
            self.finish_episode(end);
        }
        self.tick = next_tick;

        TickEvents {
            tick: next_tick,
            reward,
            collected_good: good,
            collected_bad: bad,
            spawned,
            ended,
        }
    }

    /// Terminate the in-flight episode externally, if one is active.
    pub fn end_episode(&mut self) {
        if self.phase == EpisodePhase::Active {
            self.finish_episode(EpisodeEnd::External);
        }
    }

    fn finish_episode(&mut self, end: EpisodeEnd) {
        self.phase = EpisodePhase::Terminated;
        self.episodes_completed += 1;
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(EpisodeSummary {
            episode: self.episodes_completed,
            ticks: self.episode_ticks,
            reward: self.episode_reward,
            collected_good: self.episode_good,
            collected_bad: self.episode_bad,
            end,
        });
    }

    /// Map the action to movement and heading, set planar velocity directly,
    /// and return the action's reward contribution.
    fn stage_action(&mut self, action_index: usize) -> f32 {
        let action = Action::from_index(action_index);
        let mut reward = 0.0;
        if action == Some(Action::Nothing) {
            reward += IDLE_PENALTY;
        }
        let movement = action.map_or((0.0, 0.0), Action::movement);
        if let Some(yaw) = action.and_then(Action::yaw) {
            self.agent.yaw_degrees = yaw;
        }
        self.agent.velocity.vx = movement.0 * self.config.move_speed;
        self.agent.velocity.vz = movement.1 * self.config.move_speed;
        self.agent.is_walking =
            (movement.0 * movement.0 + movement.1 * movement.1).sqrt() > 0.1;
        reward
    }

    /// Integrate gravity and velocity; the floor supports the agent only
    /// while its planar position stays inside the arena.
    fn stage_physics(&mut self) {
        let dt = self.config.fixed_dt;
        self.agent.velocity.vy -= self.config.gravity * dt;
        self.agent.position.x += self.agent.velocity.vx * dt;
        self.agent.position.y += self.agent.velocity.vy * dt;
        self.agent.position.z += self.agent.velocity.vz * dt;

        let bounds = self.spawner.bounds();
        if bounds.contains_xz(self.agent.position.x, self.agent.position.z)
            && self.agent.position.y < bounds.floor_y
        {
            self.agent.position.y = bounds.floor_y;
            self.agent.velocity.vy = 0.0;
        }
    }

    /// Collect every marker overlapping the agent: reward, notify the
    /// observer, and remove the marker unconditionally.
    fn stage_collection(&mut self) -> (f32, u32, u32) {
        let radius_sq = self.config.collect_radius * self.config.collect_radius;
        let (px, pz) = (self.agent.position.x, self.agent.position.z);
        let overlapping: Vec<MarkerId> = self
            .markers
            .iter()
            .filter(|(_, marker)| {
                let dx = marker.position.x - px;
                let dz = marker.position.z - pz;
                dx * dx + dz * dz <= radius_sq
            })
            .map(|(id, _)| id)
            .collect();

        let mut reward = 0.0;
        let mut good = 0;
        let mut bad = 0;
        for id in overlapping {
            if let Some(marker) = self.markers.remove(id) {
                if marker.kind.is_good() {
                    reward += GOOD_COLLECT_REWARD;
                    good += 1;
                } else {
                    reward += BAD_COLLECT_REWARD;
                    bad += 1;
                }
                self.observer.on_collected(marker.kind);
            }
        }
        (reward, good, bad)
    }

    /// Cast the proximity fan and score tagged hits by closeness.
    fn stage_proximity(&mut self) -> f32 {
        let targets = self.markers.ray_targets(self.config.marker_radius);
        let origin = (self.agent.position.x, self.agent.position.z);
        let hits = self.sensor.cast(origin, self.agent.yaw_degrees, &targets);
        let mut reward = 0.0;
        for hit in hits.iter().flatten() {
            let proximity = 1.0 - hit.fraction;
            reward += match hit.tag {
                MarkerKind::Good => PROXIMITY_REWARD_SCALE * proximity,
                MarkerKind::Bad => -PROXIMITY_REWARD_SCALE * proximity,
            };
        }
        self.last_rays = hits;
        reward
    }

    /// Produce the fixed-size observation vector.
    ///
    /// Layout: normalized planar position (2), normalized distances to the
    /// top/bottom/right/left edges (4), planar velocity over move speed (2),
    /// one-hot heading forward/backward/left/right (4). The one-hot is keyed
    /// by exact yaw equality, so a heading the actions never assign reads as
    /// all zeros.
    #[must_use]
    pub fn observe(&self) -> [f32; OBSERVATION_SIZE] {
        let bounds = self.spawner.bounds();
        let width = bounds.width();
        let depth = bounds.depth();
        let p = self.agent.position;
        let v = self.agent.velocity;

        let mut obs = [0.0; OBSERVATION_SIZE];
        obs[0] = (p.x - bounds.min_x) / width;
        obs[1] = (p.z - bounds.min_z) / depth;
        obs[2] = (bounds.max_z - p.z) / depth;
        obs[3] = (p.z - bounds.min_z) / depth;
        obs[4] = (bounds.max_x - p.x) / width;
        obs[5] = (p.x - bounds.min_x) / width;
        obs[6] = v.vx / self.config.move_speed;
        obs[7] = v.vz / self.config.move_speed;
        let yaw = self.agent.yaw_degrees;
        if yaw == 0.0 {
            obs[8] = 1.0;
        } else if yaw == 180.0 {
            obs[9] = 1.0;
        } else if yaw == 270.0 {
            obs[10] = 1.0;
        } else if yaw == 90.0 {
            obs[11] = 1.0;
        }
        obs
    }

    /// Ray records from the most recent tick, one per ray.
    #[must_use]
    pub fn ray_records(&self) -> &[Option<RayHit<MarkerKind>>] {
        &self.last_rays
    }

    /// Spawn one marker immediately, bypassing the timer.
    pub fn spawn_one(&mut self) -> MarkerId {
        self.spawner.spawn_one(&mut self.rng, &mut self.markers)
    }

    /// Spawn `count` markers immediately.
    pub fn spawn_burst(&mut self, count: u32) {
        self.spawner
            .spawn_burst(count, &mut self.rng, &mut self.markers);
    }

    /// Clear every marker inside the world's arena, returning the count.
    pub fn clear_arena(&mut self) -> usize {
        self.spawner.clear_arena(&mut self.markers)
    }

    /// Reset the spawner's episode state (clear plus timer rearm).
    pub fn reset_spawner(&mut self) -> usize {
        self.spawner.reset_for_episode(&mut self.markers)
    }

    /// Replace the collection observer.
    pub fn set_observer(&mut self, observer: Box<dyn CollectionObserver>) {
        self.observer = observer;
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &ForagerConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Current episode phase.
    #[must_use]
    pub const fn phase(&self) -> EpisodePhase {
        self.phase
    }

    /// Ticks processed in the current episode.
    #[must_use]
    pub const fn episode_ticks(&self) -> u64 {
        self.episode_ticks
    }

    /// Seconds elapsed in the current episode on the fixed-tick schedule.
    #[must_use]
    pub fn episode_elapsed(&self) -> f32 {
        self.episode_ticks as f32 * self.config.fixed_dt
    }

    /// Cumulative reward for the current episode.
    #[must_use]
    pub const fn episode_reward(&self) -> f32 {
        self.episode_reward
    }

    /// Number of episodes terminated so far.
    #[must_use]
    pub const fn episodes_completed(&self) -> u64 {
        self.episodes_completed
    }

    /// Iterate over retained episode summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &EpisodeSummary> {
        self.history.iter()
    }

    /// Read-only access to the marker registry.
    #[must_use]
    pub fn markers(&self) -> &MarkerBoard {
        &self.markers
    }

    /// Mutable access to the marker registry.
    #[must_use]
    pub fn markers_mut(&mut self) -> &mut MarkerBoard {
        &mut self.markers
    }

    /// Read-only access to the world's spawner.
    #[must_use]
    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    /// Read-only access to the agent body.
    #[must_use]
    pub fn agent(&self) -> &AgentBody {
        &self.agent
    }

    /// Mutable access to the agent body (tests and host adapters).
    #[must_use]
    pub fn agent_mut(&mut self) -> &mut AgentBody {
        &mut self.agent
    }

    /// Borrow the world RNG mutably for deterministic sampling.
    #[must_use]
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}
