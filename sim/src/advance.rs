//! The tick driver.
//!
//! [`Canvas::slot_advance`] runs one tick in four fixed phases:
//!
//! 1. item advance: the bevy schedule over unit components (weapon reload);
//! 2. function+move: the work buckets in tag order, each with its cadence,
//!    calling the advance function of every member and integrating its
//!    velocity;
//! 3. sync: commit advance-slot changes made during phase 2;
//! 4. reclassify: move queued items into the bucket of their current work.
//!
//! Maintenance (wreck removal, shot pruning) and effect aging follow. The
//! canvas is locked for the whole call; deletes are refused and bucket moves
//! are queued until phase 4.

use crate::canvas::{AdvanceLock, Canvas};
use crate::components::*;
use crate::config::{is_maintenance_tick, SimTick};
use crate::error::CanvasError;
use crate::shots::{clamp_to_map, Shot, ShotMotion, ShotStep, ShotSurroundings};
use crate::spatial::Rect;
use crate::work::{Work, WorkTag};
use tracing::{debug, error, trace};

impl Canvas {
    /// Advance the canvas by one tick. `flag` must alternate between calls;
    /// it selects the advance slot read in this tick.
    pub fn slot_advance(&mut self, tick: u64, flag: bool) -> Result<(), CanvasError> {
        if self.lock.locked {
            error!(tick, running = self.lock.tick, "slot_advance while another advance is running");
            return Err(CanvasError::Locked);
        }
        self.lock = AdvanceLock {
            locked: true,
            flag,
            tick,
        };
        if let Some(mut current) = self.world.get_resource_mut::<SimTick>() {
            current.0 = tick;
        }
        self.profiler.begin_section("advance");

        self.profiler.begin_section("advance_items");
        self.item_advance.run(&mut self.world);
        self.profiler.end_section();

        self.profiler.begin_section("advance_functions");
        self.advance_functions(tick, flag);
        self.profiler.end_section();

        self.profiler.begin_section("sync_advance");
        self.sync_advance(flag);
        self.profiler.end_section();

        self.profiler.begin_section("reclassify");
        self.reclassify();
        self.profiler.end_section();

        if is_maintenance_tick(tick) {
            self.profiler.begin_section("maintenance");
            self.maintenance();
            self.profiler.end_section();
        }

        self.profiler.begin_section("effects");
        let dropped = self.effects.advance(self.config.effect_time_delta);
        self.profiler.end_section();
        if dropped > 0 {
            trace!(tick, dropped, "effects finished");
        }

        self.profiler.end_section();
        self.profiler.tick();
        self.lock.locked = false;
        Ok(())
    }

    fn advance_functions(&mut self, tick: u64, flag: bool) {
        for tag in self.buckets.tags() {
            if !self.config.bucket_runs(tag, tick) {
                continue;
            }
            for id in self.buckets.ids(tag) {
                match tag {
                    WorkTag::Always => {
                        if !self.get::<Shot>(id).is_some_and(|s| s.active) {
                            continue;
                        }
                        self.advance_shot(id);
                    }
                    WorkTag::Work(bucket) => {
                        if bucket != Work::Destroyed && self.is_destroyed(id) {
                            continue;
                        }
                        let Some(work) = self.get::<UnitWork>(id).map(|w| w.slots.step(flag)) else {
                            continue;
                        };
                        self.profiler.begin_section(work.profile_section());
                        self.advance_work(id, work, tick);
                        self.profiler.end_section();
                    }
                }
                let velocity = self
                    .get::<Velocity>(id)
                    .filter(|v| !v.is_zero())
                    .map(|v| v.to_vec3());
                if let Some(velocity) = velocity {
                    self.move_item_by(id, velocity);
                }
            }
        }
    }

    fn sync_advance(&mut self, flag: bool) {
        let mut query = self.world.query::<&mut UnitWork>();
        for mut unit_work in query.iter_mut(&mut self.world) {
            if !unit_work.slots.is_synced() {
                unit_work.slots.sync(flag);
            }
        }
    }

    fn reclassify(&mut self) {
        for id in self.buckets.take_pending() {
            if !self.contains(id) {
                continue;
            }
            let tag = self.work(id).map_or(WorkTag::Always, WorkTag::Work);
            self.buckets.insert(id, tag);
        }
    }

    /// Age the wrecks, delete the ones that are due and prune dead shots.
    fn maintenance(&mut self) {
        let threshold = self.config.wreckage_removal_time;
        let mut due = Vec::new();
        for (id, timer) in self.destroyed.iter_mut() {
            *timer += 1;
            if *timer >= threshold {
                due.push(*id);
            }
        }
        for id in &due {
            self.destroyed.remove(id);
        }
        if !due.is_empty() {
            debug!(count = due.len(), "removing wrecks");
            self.remove_items(&due);
        }

        let mut shots = self.world.query::<(&ItemId, &Shot)>();
        let dead: Vec<ItemId> = shots
            .iter(&self.world)
            .filter(|(_, shot)| !shot.active)
            .map(|(id, _)| *id)
            .collect();
        if !dead.is_empty() {
            trace!(count = dead.len(), "pruning inactive shots");
            self.remove_items(&dead);
        }
    }

    /// One flight step of an active shot.
    pub(crate) fn advance_shot(&mut self, id: ItemId) {
        let (Some(pos), Some(size)) = (self.position(id), self.get::<ItemSize>(id).copied()) else {
            return;
        };
        let center = pos.center(&size);
        let rect = Rect::of_item(&pos, &size);
        let contact = self
            .grid
            .collisions(&rect, Some(id), true)
            .into_iter()
            .any(|other| {
                self.grid
                    .entry(other)
                    .is_some_and(|e| e.is_unit && !e.destroyed)
            });
        let target_center = match self.get::<Shot>(id).map(|s| s.motion) {
            Some(ShotMotion::Missile(missile)) => missile
                .target
                .filter(|t| self.is_alive_unit(*t))
                .and_then(|t| self.center(t)),
            _ => None,
        };
        let surroundings = ShotSurroundings {
            center,
            ground_height: self.map.height_at_point(center.x, center.y),
            contact,
            target_center,
        };

        let (step, heading) = match self.get_mut::<Shot>(id) {
            Some(mut shot) => {
                let step = shot.step(&surroundings);
                (step, shot.heading())
            }
            None => return,
        };
        match step {
            ShotStep::Explode => self.explode_shot(id),
            ShotStep::Fly(velocity) => {
                let velocity = clamp_to_map(
                    center,
                    velocity,
                    self.map.width as f32,
                    self.map.height as f32,
                );
                self.set_velocity(id, velocity);
                if let Some(heading) = heading {
                    self.set_rotation(id, heading);
                }
            }
        }
    }

    /// Let a shot go off. It stays on the canvas, inactive and hidden, until
    /// the next maintenance pass.
    pub(crate) fn explode_shot(&mut self, id: ItemId) {
        let Some(center) = self.center(id) else {
            return;
        };
        let hit_at = {
            let Some(mut shot) = self.get_mut::<Shot>(id) else {
                return;
            };
            if !shot.active {
                return;
            }
            shot.active = false;
            shot.explosion_center(center)
        };
        self.set_velocity(id, Vec3::ZERO);
        self.move_center_to(id, hit_at);
        self.set_visible(id, false);
        self.grid.remove(id);
        self.shot_hit(id);
    }
}
