//! Work advance functions of units.
//!
//! The function+move phase calls [`Canvas::advance_work`] with the work the
//! unit's advance slot selects. The functions only set velocities and
//! rotations; the position is integrated by the phase right after.

use crate::canvas::Canvas;
use crate::components::*;
use crate::events::Event;
use crate::orders::UnitOrder;
use crate::plugins::UnitPlugins;
use crate::work::Work;
use tracing::{debug, trace};

/// Headings closer than this (in degrees) count as facing.
const FACING_TOLERANCE: f32 = 1.0;

/// Result of one steering step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Steering {
    Moving,
    Arrived,
    /// The next step would leave the map.
    Blocked,
}

/// Signed shortest turn from `from` to `to`, in (-180, 180].
pub fn angle_diff(from: f32, to: f32) -> f32 {
    let mut diff = (to - from) % 360.0;
    if diff <= -180.0 {
        diff += 360.0;
    } else if diff > 180.0 {
        diff -= 360.0;
    }
    diff
}

fn normalize_degrees(deg: f32) -> f32 {
    let d = deg % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

impl Canvas {
    /// Run the advance function of `work` for a unit.
    pub(crate) fn advance_work(&mut self, id: ItemId, work: Work, tick: u64) {
        match work {
            Work::Idle => self.advance_idle(id, tick),
            Work::Move => self.advance_move(id),
            Work::Attack => self.advance_attack(id),
            Work::Follow => self.advance_follow(id),
            Work::Constructed => self.advance_construction(id),
            Work::Destroyed => self.advance_destroyed(id, tick),
            Work::Plugin => self.advance_plugin(id),
            Work::Turn => self.advance_turn(id),
            Work::None => {}
        }
    }

    /// Head towards `dest` (a center) until within `stop_distance`. With a
    /// stop distance of 0 the unit snaps onto `dest` once it is within one
    /// step.
    pub(crate) fn steer_to(
        &mut self,
        id: ItemId,
        dest: Vec3,
        stop_distance: f32,
        speed: f32,
    ) -> Steering {
        let (Some(center), Some(pos), Some(size)) = (
            self.center(id),
            self.position(id),
            self.get::<ItemSize>(id).copied(),
        ) else {
            return Steering::Blocked;
        };
        let (dx, dy) = (dest.x - center.x, dest.y - center.y);
        let dist = (dx * dx + dy * dy).sqrt();

        if dist <= stop_distance {
            self.set_velocity(id, Vec3::ZERO);
            return Steering::Arrived;
        }
        if stop_distance <= 0.0 && dist <= speed {
            self.move_center_to(id, Vec3::new(dest.x, dest.y, center.z));
            self.set_velocity(id, Vec3::ZERO);
            return Steering::Arrived;
        }
        if speed <= 0.0 {
            self.set_velocity(id, Vec3::ZERO);
            return Steering::Blocked;
        }

        let velocity = Vec3::new(dx / dist * speed, dy / dist * speed, 0.0);
        if !self.map.rect_on_map(
            pos.x + velocity.x,
            pos.y + velocity.y,
            size.width,
            size.height,
        ) {
            self.set_velocity(id, Vec3::ZERO);
            return Steering::Blocked;
        }
        self.set_velocity(id, velocity);
        self.set_rotation(id, rotation_to_point(dx, dy));
        Steering::Moving
    }

    /// Look for enemies in weapon range now and then.
    fn advance_idle(&mut self, id: ItemId, tick: u64) {
        let interval = self.config.idle_scan_interval.max(1);
        if tick % interval != u64::from(id.0) % interval {
            return;
        }
        let Some(props) = self.unit_properties(id) else {
            return;
        };
        if !props.can_shoot() {
            if self.get::<UnitPlugins>(id).map_or(true, UnitPlugins::is_empty) {
                trace!(item = %id, "nothing to do, going to sleep");
                self.set_work(id, Work::None);
            }
            return;
        }
        let (Some(center), Some(owner)) = (self.center(id), self.owner_of(id)) else {
            return;
        };

        let mut best: Option<(ItemId, f32)> = None;
        for other in self.grid.units_in_range(center, props.max_weapon_range()) {
            let Some(other_owner) = self.owner_of(other) else {
                continue;
            };
            if !self.players.is_enemy(owner, other_owner) {
                continue;
            }
            let Some(other_center) = self.center(other) else {
                continue;
            };
            let dist = center.distance_to(&other_center);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((other, dist));
            }
        }
        if let Some((target, _)) = best {
            debug!(item = %id, target = %target, "enemy in range");
            self.push_suborder(
                id,
                UnitOrder::Attack {
                    target,
                    can_move: false,
                },
            );
        }
    }

    fn advance_move(&mut self, id: ItemId) {
        let speed = self.unit_properties(id).map_or(0.0, |p| p.speed);
        let (dest, stop_distance) = match self.current_order(id) {
            Some(UnitOrder::Move { x, y }) => (Vec3::new(x, y, 0.0), 0.0),
            Some(UnitOrder::MoveToUnit { target, range }) => match self.center(target) {
                Some(center) if target.is_valid() => (center, range),
                _ => {
                    self.current_order_done(id);
                    return;
                }
            },
            _ => {
                self.current_order_done(id);
                return;
            }
        };
        match self.steer_to(id, dest, stop_distance, speed) {
            Steering::Moving => {}
            Steering::Arrived | Steering::Blocked => self.current_order_done(id),
        }
    }

    fn advance_attack(&mut self, id: ItemId) {
        let Some(UnitOrder::Attack { target, can_move }) = self.current_order(id) else {
            self.current_order_done(id);
            return;
        };
        if !target.is_valid() || !self.is_alive_unit(target) {
            debug!(item = %id, target = %target, "attack target gone");
            self.current_order_done(id);
            return;
        }
        let (Some(props), Some(center), Some(target_center)) = (
            self.unit_properties(id),
            self.center(id),
            self.center(target),
        ) else {
            return;
        };
        let (dx, dy) = (target_center.x - center.x, target_center.y - center.y);
        let dist = (dx * dx + dy * dy).sqrt();
        let range = props.max_weapon_range();

        if dist > range {
            if can_move && props.is_mobile && props.speed > 0.0 {
                self.push_suborder(id, UnitOrder::MoveToUnit { target, range });
            } else {
                self.current_order_done(id);
            }
            return;
        }

        let needs_facing = props.is_mobile && props.weapons.iter().any(|w| w.auto_use && !w.turret);
        if needs_facing {
            let rotation = self.get::<Rotation>(id).map_or(0.0, |r| r.0);
            if angle_diff(rotation, rotation_to_point(dx, dy)).abs() > FACING_TOLERANCE {
                self.push_suborder(id, UnitOrder::TurnToUnit { target });
                return;
            }
        }

        let ready: Vec<u32> = match self.get::<Weapons>(id) {
            Some(weapons) => weapons
                .0
                .iter()
                .filter(|w| w.reloaded())
                .filter(|w| {
                    props
                        .weapon(w.weapon_id)
                        .is_some_and(|p| p.auto_use && p.range >= dist)
                })
                .map(|w| w.weapon_id)
                .collect(),
            None => Vec::new(),
        };
        for weapon in ready {
            if let Err(err) = self.fire_weapon(id, weapon, Some(target)) {
                debug!(item = %id, weapon, %err, "weapon did not fire");
            }
        }
    }

    fn advance_follow(&mut self, id: ItemId) {
        let Some(UnitOrder::Follow { target, distance }) = self.current_order(id) else {
            self.current_order_done(id);
            return;
        };
        if !target.is_valid() || !self.is_alive_unit(target) {
            self.current_order_done(id);
            return;
        }
        let Some(dest) = self.center(target) else {
            return;
        };
        let speed = self.unit_properties(id).map_or(0.0, |p| p.speed);
        // Arriving or hitting the edge just waits for the target to move on.
        self.steer_to(id, dest, distance, speed);
    }

    fn advance_construction(&mut self, id: ItemId) {
        let done = match self.get_mut::<Construction>(id) {
            Some(mut construction) => {
                if !construction.is_complete() {
                    construction.step += 1;
                }
                construction.is_complete()
            }
            None => true,
        };
        if !done {
            return;
        }
        self.set_work(id, Work::Idle);
        if let (Some(owner), Some(info)) = (self.owner_of(id), self.get::<ItemTypeInfo>(id).copied()) {
            self.queue_event(
                Event::new("FacilityWithTypeConstructed")
                    .with_data1(info.item_type.type_id.to_string())
                    .with_unit(id)
                    .with_player(owner),
            );
        }
        debug!(item = %id, "construction completed");
    }

    /// Let the wreck sink into the ground.
    fn advance_destroyed(&mut self, id: ItemId, tick: u64) {
        let interval = self.config.destroyed_sink_interval.max(1);
        let visible = self.get::<Visible>(id).is_some_and(|v| v.0);
        if tick % interval != 0 || !visible {
            self.set_velocity(id, Vec3::ZERO);
            return;
        }
        let depth = self.get::<ItemSize>(id).map_or(1.0, |s| s.depth);
        let wreck_time = self.config.wreckage_removal_time.max(1) as f32;
        let vz = -(depth / (wreck_time * 19.0)) * 1.2;
        self.set_velocity(id, Vec3::new(0.0, 0.0, vz));
    }

    fn advance_turn(&mut self, id: ItemId) {
        let wanted = match self.current_order(id) {
            Some(UnitOrder::Turn { direction }) => direction,
            Some(UnitOrder::TurnToUnit { target }) => {
                match (self.center(id), self.center(target)) {
                    (Some(c), Some(t)) if target.is_valid() => rotation_to_point(t.x - c.x, t.y - c.y),
                    _ => {
                        self.current_order_done(id);
                        return;
                    }
                }
            }
            _ => {
                self.current_order_done(id);
                return;
            }
        };
        let rotation_speed = self.unit_properties(id).map_or(0.0, |p| p.rotation_speed);
        let current = self.get::<Rotation>(id).map_or(0.0, |r| r.0);
        let diff = angle_diff(current, wanted);

        if rotation_speed <= 0.0 || diff.abs() <= rotation_speed {
            self.set_rotation(id, normalize_degrees(wanted));
            self.current_order_done(id);
        } else {
            self.set_rotation(id, normalize_degrees(current + rotation_speed * diff.signum()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::tests::*;
    use crate::work::WorkTag;

    #[test]
    fn test_angle_diff() {
        assert_eq!(angle_diff(10.0, 30.0), 20.0);
        assert_eq!(angle_diff(350.0, 10.0), 20.0);
        assert_eq!(angle_diff(10.0, 350.0), -20.0);
        assert_eq!(angle_diff(0.0, 180.0), 180.0);
        assert_eq!(angle_diff(180.0, 0.0), 180.0);
    }

    #[test]
    fn test_steer_snaps_on_arrival() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        // Center (5.5, 5.5); target 0.3 away with speed 0.5.
        let steering = canvas.steer_to(tank, Vec3::new(5.8, 5.5, 0.0), 0.0, 0.5);
        assert_eq!(steering, Steering::Arrived);
        let center = canvas.center(tank).unwrap();
        assert!((center.x - 5.8).abs() < 1e-5 && (center.y - 5.5).abs() < 1e-5);
        assert!(canvas.get::<Velocity>(tank).unwrap().is_zero());
    }

    #[test]
    fn test_steer_blocked_at_map_edge() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(0.2, 5.0, 0.0))
            .unwrap();
        let steering = canvas.steer_to(tank, Vec3::new(-10.0, 5.5, 0.0), 0.0, 0.5);
        assert_eq!(steering, Steering::Blocked);
    }

    #[test]
    fn test_turn_limited_by_rotation_speed() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        canvas.give_order(tank, UnitOrder::Turn { direction: 100.0 });
        canvas.advance_turn(tank);
        assert_eq!(canvas.get::<Rotation>(tank).unwrap().0, 45.0);
        canvas.advance_turn(tank);
        assert_eq!(canvas.get::<Rotation>(tank).unwrap().0, 90.0);
        canvas.advance_turn(tank);
        assert_eq!(canvas.get::<Rotation>(tank).unwrap().0, 100.0);
        assert_eq!(canvas.work(tank), Some(Work::Idle));
    }

    #[test]
    fn test_idle_without_weapons_sleeps() {
        let mut canvas = test_canvas();
        let rock = canvas
            .create_unit(NEUTRAL, MINE_FIELD, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        let harvester = canvas
            .create_unit(BLUE, HARVESTER, Position::new(8.0, 5.0, 0.0))
            .unwrap();
        let interval = canvas.config().idle_scan_interval;
        canvas.advance_idle(rock, u64::from(rock.0) % interval);
        canvas.advance_idle(harvester, u64::from(harvester.0) % interval);
        assert_eq!(canvas.work(rock), Some(Work::None));
        assert_eq!(canvas.work(harvester), Some(Work::Idle));
    }

    #[test]
    fn test_idle_attacks_nearest_enemy() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(10.0, 10.0, 0.0))
            .unwrap();
        let far = canvas
            .create_unit(RED, TANK, Position::new(13.0, 10.0, 0.0))
            .unwrap();
        let near = canvas
            .create_unit(RED, TANK, Position::new(12.0, 10.0, 0.0))
            .unwrap();
        canvas
            .create_unit(BLUE, TANK, Position::new(11.0, 10.0, 0.0))
            .unwrap();

        let interval = canvas.config().idle_scan_interval;
        // Off-phase ticks don't scan.
        canvas.advance_idle(tank, u64::from(tank.0) % interval + 1);
        assert_eq!(canvas.work(tank), Some(Work::Idle));

        canvas.advance_idle(tank, u64::from(tank.0) % interval);
        assert_eq!(
            canvas.current_order(tank),
            Some(UnitOrder::Attack {
                target: near,
                can_move: false
            })
        );
        assert_ne!(canvas.current_order(tank).and_then(|o| o.target()), Some(far));
        assert_eq!(
            canvas.work_buckets().tag_of(tank),
            Some(WorkTag::Work(Work::Attack))
        );
    }

    #[test]
    fn test_construction_completes() {
        let mut canvas = test_canvas();
        let factory = canvas
            .create_unit(BLUE, FACTORY, Position::new(10.0, 10.0, 0.0))
            .unwrap();
        for _ in 0..2 {
            canvas.advance_construction(factory);
            assert_eq!(canvas.work(factory), Some(Work::Constructed));
        }
        canvas.advance_construction(factory);
        assert_eq!(canvas.work(factory), Some(Work::Idle));
        assert_eq!(canvas.events().count("FacilityWithTypeConstructed"), 1);
    }

    #[test]
    fn test_wreck_sinks_every_tenth_tick() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(10.0, 10.0, 0.0))
            .unwrap();
        canvas.destroy_unit(tank);

        canvas.advance_destroyed(tank, 10);
        let v = canvas.get::<Velocity>(tank).unwrap().to_vec3();
        let expected = -(1.0 / (30.0 * 19.0)) * 1.2;
        assert!((v.z - expected).abs() < 1e-6);

        canvas.advance_destroyed(tank, 11);
        assert!(canvas.get::<Velocity>(tank).unwrap().is_zero());
    }

    #[test]
    fn test_attack_out_of_range_moves_closer() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(10.0, 10.0, 0.0))
            .unwrap();
        let enemy = canvas
            .create_unit(RED, TANK, Position::new(30.0, 10.0, 0.0))
            .unwrap();
        canvas.give_order(
            tank,
            UnitOrder::Attack {
                target: enemy,
                can_move: true,
            },
        );
        canvas.advance_attack(tank);
        assert_eq!(
            canvas.current_order(tank),
            Some(UnitOrder::MoveToUnit {
                target: enemy,
                range: 4.0
            })
        );
        assert_eq!(canvas.work(tank), Some(Work::Move));
    }

    #[test]
    fn test_attack_turns_then_fires() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(10.0, 10.0, 0.0))
            .unwrap();
        let enemy = canvas
            .create_unit(RED, TANK, Position::new(13.0, 10.0, 0.0))
            .unwrap();
        canvas.give_order(
            tank,
            UnitOrder::Attack {
                target: enemy,
                can_move: true,
            },
        );
        canvas.advance_attack(tank);
        assert_eq!(canvas.work(tank), Some(Work::Turn));
        canvas.advance_turn(tank);
        canvas.advance_turn(tank);
        assert_eq!(canvas.work(tank), Some(Work::Attack));

        canvas.advance_attack(tank);
        // Bullet: 20 damage - 10 armor.
        assert_eq!(canvas.get::<UnitStats>(enemy).unwrap().health, 90);
        assert!(!canvas.get::<Weapons>(tank).unwrap().0[0].reloaded());
    }

    #[test]
    fn test_attack_work_runs_whenever_dispatched() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(10.0, 10.0, 0.0))
            .unwrap();
        let enemy = canvas
            .create_unit(RED, TANK, Position::new(13.0, 10.0, 0.0))
            .unwrap();
        canvas.order_attack(tank, enemy).unwrap();

        // Off the attack cadence: the bucket decides when to call, not the work.
        canvas.advance_work(tank, Work::Attack, 3);
        assert_eq!(canvas.work(tank), Some(Work::Turn));

        canvas.order_attack(tank, enemy).unwrap();
        canvas.destroy_unit(enemy);
        canvas.advance_work(tank, Work::Attack, 7);
        assert_eq!(canvas.current_order(tank), None);
        assert_eq!(canvas.work(tank), Some(Work::Idle));
    }
}
