//! Tunable constants of the canvas.

use crate::work::{Work, WorkTag};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Maintenance (wreck removal, shot pruning) runs when `tick % this == 0`.
/// Fixed; saved games and replays depend on it.
pub const MAINTENANCE_INTERVAL: u64 = 39;

/// Whether maintenance runs on `tick`.
#[inline]
pub fn is_maintenance_tick(tick: u64) -> bool {
    tick % MAINTENANCE_INTERVAL == 0
}

/// Canvas configuration. Also inserted into the ECS world as a resource so
/// systems can read it.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub none_cadence: u64,
    pub attack_cadence: u64,
    pub follow_cadence: u64,
    pub constructed_cadence: u64,
    /// Maintenance passes a wreck stays on the canvas.
    pub wreckage_removal_time: u32,
    /// Seconds added to not-yet-started effects per tick.
    pub effect_time_delta: f32,
    /// Idle units look for targets once per this many ticks.
    pub idle_scan_interval: u64,
    /// Destroyed units update their sinking velocity once per this many ticks.
    pub destroyed_sink_interval: u64,
    /// Ticks between a unit's destruction and its explosion going off.
    pub explosion_delay: i32,
    /// Delivery delay of the GameOver event, in ticks.
    pub game_over_delay: u32,
    /// Seed of the canvas RNG (fragment trajectories).
    pub rng_seed: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            none_cadence: 10,
            attack_cadence: 5,
            follow_cadence: 5,
            constructed_cadence: 20,
            wreckage_removal_time: 30, // ~1 minute at 20 ticks/s
            effect_time_delta: 0.05,   // one tick at 20 Hz
            idle_scan_interval: 40,
            destroyed_sink_interval: 10,
            explosion_delay: 10,
            game_over_delay: 100,
            rng_seed: 0x0B05_0B05,
        }
    }
}

impl CanvasConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Skip cadence of a bucket; `1` means every tick.
    pub fn cadence(&self, tag: WorkTag) -> u64 {
        match tag {
            WorkTag::Always => 1,
            WorkTag::Work(work) => match work {
                Work::None => self.none_cadence,
                Work::Attack => self.attack_cadence,
                Work::Follow => self.follow_cadence,
                Work::Constructed => self.constructed_cadence,
                Work::Idle
                | Work::Move
                | Work::Destroyed
                | Work::Plugin
                | Work::Turn => 1,
            },
        }
    }

    /// Whether the bucket `tag` runs on `tick`.
    #[inline]
    pub fn bucket_runs(&self, tag: WorkTag, tick: u64) -> bool {
        let n = self.cadence(tag).max(1);
        tick % n == 0
    }
}

/// Tick currently being advanced, for systems.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);
