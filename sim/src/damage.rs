//! Explosion damage and unit damage resolution.
//!
//! ## Falloff
//!
//! An explosion hits every unit whose footprint reaches into its sphere. The
//! distance used is the center distance shrunk by half the unit's smaller
//! side, so big units are hit harder at the same center distance. Inside
//! `full_range` the full damage applies, beyond it the damage falls off
//! linearly to zero at `range`.
//!
//! ## Parallel feature
//!
//! With `--features parallel` the per-unit damage values are computed with
//! rayon. Applying them stays sequential and in id order, so both builds
//! produce identical results.

use crate::canvas::Canvas;
use crate::components::{ItemId, UnitStats, Vec3};
use crate::effects::Effect;
use crate::player::PlayerId;
use crate::shots::Shot;
use crate::spatial::SpatialEntry;
use tracing::{debug, trace, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Damage an explosion deals at `dist` (already corrected for unit size).
/// Truncates towards zero.
pub fn falloff_damage(dist: f32, damage: i64, range: f32, full_range: f32) -> i64 {
    if dist <= full_range || range == full_range {
        damage
    } else {
        ((1.0 - (dist - full_range) / (range - full_range)) * damage as f32) as i64
    }
}

/// Armor left working at the current health: none at 10% or less, half at
/// 40% or less, full otherwise.
pub fn effective_armor(health: u32, max_health: u32, armor: u32) -> i64 {
    let health = health as i64;
    if health <= (max_health as f64 / 10.0) as i64 {
        0
    } else if health <= (max_health as f64 / 2.5) as i64 {
        (armor as f64 / 2.0) as i64
    } else {
        armor as i64
    }
}

/// Apply `damage` to `stats`. Shields take positive damage first, negative
/// damage heals up to the maximum.
pub fn apply_damage(stats: &mut UnitStats, mut damage: i64) {
    if damage > 0 && stats.shields > 0 {
        if i64::from(stats.shields) >= damage {
            stats.shields -= damage as u32;
            return;
        }
        damage -= i64::from(stats.shields);
        stats.shields = 0;
    }

    if damage < 0 {
        let healed = i64::from(stats.health) - damage;
        stats.health = healed.min(i64::from(stats.max_health)) as u32;
        return;
    }

    let damage = (damage - effective_armor(stats.health, stats.max_health, stats.armor)).max(0);
    stats.health = (i64::from(stats.health) - damage).max(0) as u32;
}

fn damage_for(entry: &SpatialEntry, pos: Vec3, damage: i64, range: f32, full_range: f32) -> (ItemId, i64) {
    let dist = entry.corrected_distance(pos);
    (entry.id, falloff_damage(dist, damage, range, full_range))
}

impl Canvas {
    /// Damage every unit within `range` of `pos`. Units destroyed by this
    /// explosion are credited to `source`.
    pub fn explosion(
        &mut self,
        pos: Vec3,
        damage: i64,
        range: f32,
        full_range: f32,
        source: Option<PlayerId>,
    ) {
        let entries: Vec<SpatialEntry> = self
            .grid
            .unit_collisions_in_sphere(pos, range)
            .into_iter()
            .filter_map(|id| self.grid.entry(id).copied())
            .collect();

        #[cfg(feature = "parallel")]
        let hits: Vec<(ItemId, i64)> = entries
            .par_iter()
            .map(|e| damage_for(e, pos, damage, range, full_range))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let hits: Vec<(ItemId, i64)> = entries
            .iter()
            .map(|e| damage_for(e, pos, damage, range, full_range))
            .collect();

        trace!(x = pos.x, y = pos.y, damage, range, hits = hits.len(), "explosion");
        for (id, d) in hits {
            let was_alive = self.is_alive_unit(id);
            self.unit_damaged(id, d);
            if !was_alive || self.is_alive_unit(id) {
                continue;
            }
            let Some(source) = source else {
                continue;
            };
            let is_facility = self.unit_properties(id).is_some_and(|p| p.is_facility());
            if let Some(player) = self.players.get_mut(source) {
                player.statistics_mut().add_destroyed(is_facility);
            }
        }
    }

    /// Apply `damage` to a unit and destroy it when its health reaches 0.
    pub fn unit_damaged(&mut self, id: ItemId, damage: i64) {
        let destroyed = match self.get_mut::<UnitStats>(id) {
            Some(mut stats) => {
                apply_damage(&mut stats, damage);
                stats.is_destroyed()
            }
            None => {
                warn!(item = %id, "damage for an item that is not a unit");
                return;
            }
        };
        if destroyed {
            self.destroy_unit(id);
        }
    }

    /// A shot went off: damage its surroundings and start its hit effects.
    pub(crate) fn shot_hit(&mut self, id: ItemId) {
        let Some(shot) = self.get::<Shot>(id) else {
            warn!(item = %id, "shot_hit on an item that is not a shot");
            return;
        };
        let (damage, range, full_range) = (shot.damage, shot.damage_range, shot.full_damage_range);
        let hit_effects = shot.hit_effects.clone();
        let Some(center) = self.center(id) else {
            return;
        };
        let owner = self.owner_of(id);
        debug!(item = %id, damage, range, "shot hit");

        self.explosion(center, damage, range, full_range, owner);
        self.spawn_effects(&hit_effects, center, None);
    }

    /// Start the effects with the given property ids at `position`.
    pub(crate) fn spawn_effects(&mut self, ids: &[u32], position: Vec3, owner: Option<ItemId>) {
        for &effect_id in ids {
            match self.effect_properties.get(effect_id) {
                Some(props) => self.effects.add(Effect::new(props, position, owner)),
                None => warn!(effect = effect_id, "unknown effect properties"),
            }
        }
    }
}
