//! Shot state and per-subtype flight physics.
//!
//! Shots only decide their own velocity (or that they explode). Moving them,
//! collision lookups and the explosion itself are done by the canvas, which
//! hands each step a [`ShotSurroundings`] describing what the shot can see.

use crate::components::{rotation_to_point, ItemId, Vec3};
use crate::item_type::ShotType;
use crate::species::WeaponProperties;
use bevy_ecs::prelude::*;
use rand::Rng;

/// Footprint of every shot, in cells.
pub const SHOT_SIZE: f32 = 0.5;

const FRAGMENT_MIN_SPEED: f32 = 3.0 / 48.0;
const FRAGMENT_MAX_SPEED: f32 = 8.0 / 48.0;
const FRAGMENT_MIN_Z_SPEED: f32 = 0.03;
const FRAGMENT_MAX_Z_SPEED: f32 = 0.1;
const FRAGMENT_GRAVITY: f32 = -0.006;
/// Fragments start this high above the wreck so they don't hit the ground at
/// once.
pub const FRAGMENT_START_HEIGHT: f32 = 0.2;

/// What a shot sees at the start of its step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotSurroundings {
    pub center: Vec3,
    /// Terrain height below the center.
    pub ground_height: f32,
    /// Whether a unit overlaps the shot's rectangle.
    pub contact: bool,
    /// Center of a missile's target, if the target is still alive.
    pub target_center: Option<Vec3>,
}

/// Outcome of one flight step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShotStep {
    /// Keep flying with this velocity.
    Fly(Vec3),
    Explode,
}

/// Speed that grows by `acceleration` per tick up to `max_speed`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Thrust {
    pub speed: f32,
    pub max_speed: f32,
    pub acceleration: f32,
}

impl Thrust {
    pub fn from_weapon(weapon: Option<&WeaponProperties>) -> Self {
        weapon.map_or_else(Self::default, |w| Self {
            speed: 0.0,
            max_speed: w.speed,
            acceleration: w.acceleration,
        })
    }

    pub fn accelerate(&mut self) {
        self.speed = (self.speed + self.acceleration).min(self.max_speed);
    }
}

/// Parabolic rocket flight towards a fixed point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RocketFlight {
    /// Per-unit-of-speed velocity; the horizontal part has length 1.
    pub direction: Vec3,
    pub target: Vec3,
    pub thrust: Thrust,
    pub total_distance: f32,
    pub passed_distance: f32,
    /// Height added by the parabola so far.
    pub z_offset: f32,
    pub max_height: f32,
    /// Squared distance to the target after the last step.
    pub last_distance_sq: f32,
    /// Apex height as a factor of the flight distance.
    pub height_factor: f32,
}

impl RocketFlight {
    pub fn launch(&mut self, from: Vec3, target: Vec3) {
        let mut horizontal = target - from;
        horizontal.z = 0.0;
        self.total_distance = horizontal.length();
        self.max_height = self.height_factor * self.total_distance;
        self.target = target;
        self.direction = if self.total_distance > 0.0 {
            Vec3::new(horizontal.x, horizontal.y, target.z - from.z) * (1.0 / self.total_distance)
        } else {
            Vec3::ZERO
        };
        self.z_offset = 0.0;
        self.passed_distance = 0.0;
        self.last_distance_sq = (target - from).length_squared();
    }

    fn step(&mut self, center: Vec3) -> ShotStep {
        // Target straight above or below the launcher: nothing to fly.
        if self.total_distance == 0.0 {
            return ShotStep::Explode;
        }
        self.thrust.accelerate();
        let speed = self.thrust.speed;
        self.passed_distance += speed;

        let f = self.passed_distance / self.total_distance - 0.5;
        let factor = -4.0 * f * f + 1.0;
        let add_z = self.max_height * factor;
        let velocity = Vec3::new(
            self.direction.x * speed,
            self.direction.y * speed,
            self.direction.z * speed + (add_z - self.z_offset),
        );
        self.z_offset = add_z;

        let distance_sq = (self.target - (center + velocity)).length_squared();
        if distance_sq > self.last_distance_sq {
            return ShotStep::Explode;
        }
        self.last_distance_sq = distance_sq;
        ShotStep::Fly(velocity)
    }
}

/// Homing missile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MissileFlight {
    /// Normalized flight direction.
    pub direction: Vec3,
    pub target: Option<ItemId>,
    /// Last known target center.
    pub target_position: Vec3,
    pub thrust: Thrust,
    pub passed_distance: f32,
    pub max_fly_distance: f32,
    /// Largest change of the direction vector per tick.
    pub turning_speed: f32,
}

impl MissileFlight {
    /// `start_angle` in degrees above the horizon; `-1` aims straight at the
    /// target.
    pub fn launch(&mut self, from: Vec3, target: ItemId, target_center: Vec3, start_angle: f32) {
        self.target = Some(target);
        self.target_position = target_center;
        self.passed_distance = 0.0;
        let to_target = target_center - from;
        self.direction = if start_angle == -1.0 {
            to_target.normalized()
        } else {
            let rad = start_angle.to_radians();
            let flat = Vec3::new(to_target.x, to_target.y, 0.0).normalized() * rad.cos();
            Vec3::new(flat.x, flat.y, rad.sin())
        };
    }

    fn step(&mut self, center: Vec3, target_center: Option<Vec3>) -> ShotStep {
        if let Some(pos) = target_center {
            self.target_position = pos;
        }
        self.thrust.accelerate();
        let speed = self.thrust.speed;
        self.passed_distance += speed;
        if self.passed_distance > self.max_fly_distance {
            return ShotStep::Explode;
        }

        let to_target = self.target_position - center;
        let length = to_target.length();
        if length <= speed {
            return ShotStep::Explode;
        }
        let wanted = to_target * (1.0 / length);
        let mut diff = wanted - self.direction;
        let diff_len = diff.length();
        if diff_len != 0.0 {
            if self.turning_speed < diff_len {
                diff = diff * (self.turning_speed / diff_len);
            }
            self.direction = (self.direction + diff).normalized();
        }
        ShotStep::Fly(self.direction * speed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BombFall {
    pub activated: bool,
    pub thrust: Thrust,
    pub horizontal: (f32, f32),
}

/// Subtype-specific state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShotMotion {
    Bullet { target: Vec3 },
    Rocket(RocketFlight),
    Missile(MissileFlight),
    Explosion { delay: i32 },
    Mine { activated: bool },
    Bomb(BombFall),
    /// `unit_type` is the type of the unit whose wreck threw the fragment.
    Fragment { velocity: Vec3, unit_type: u32 },
}

impl ShotMotion {
    /// Fresh, not yet launched state of a `shot_type` shot.
    pub fn new(shot_type: ShotType, weapon: Option<&WeaponProperties>) -> Self {
        match shot_type {
            ShotType::Bullet => ShotMotion::Bullet { target: Vec3::ZERO },
            ShotType::Rocket => ShotMotion::Rocket(RocketFlight {
                thrust: Thrust::from_weapon(weapon),
                height_factor: weapon.map_or(0.0, |w| w.height),
                ..RocketFlight::default()
            }),
            ShotType::Missile => ShotMotion::Missile(MissileFlight {
                thrust: Thrust::from_weapon(weapon),
                max_fly_distance: weapon.map_or(0.0, |w| w.max_fly_distance),
                turning_speed: weapon.map_or(0.0, |w| w.turning_speed),
                ..MissileFlight::default()
            }),
            ShotType::Explosion => ShotMotion::Explosion { delay: 0 },
            ShotType::Mine => ShotMotion::Mine { activated: false },
            ShotType::Bomb => ShotMotion::Bomb(BombFall {
                thrust: Thrust::from_weapon(weapon),
                ..BombFall::default()
            }),
            ShotType::Fragment => ShotMotion::Fragment {
                velocity: Vec3::ZERO,
                unit_type: 0,
            },
        }
    }
}

/// Shot component.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct Shot {
    pub shot_type: ShotType,
    /// Inactive shots are dead and wait for the maintenance pass.
    pub active: bool,
    pub damage: i64,
    pub damage_range: f32,
    pub full_damage_range: f32,
    pub hit_effects: Vec<u32>,
    pub motion: ShotMotion,
}

impl Shot {
    pub fn new(shot_type: ShotType, weapon: Option<&WeaponProperties>) -> Self {
        Self {
            shot_type,
            active: true,
            damage: weapon.map_or(0, |w| w.damage),
            damage_range: weapon.map_or(0.0, |w| w.damage_range),
            full_damage_range: weapon.map_or(0.0, |w| w.full_damage_range),
            hit_effects: weapon.map(|w| w.hit_effects.clone()).unwrap_or_default(),
            motion: ShotMotion::new(shot_type, weapon),
        }
    }

    /// Delayed explosion with explicit damage values.
    pub fn explosion(damage: i64, range: f32, full_range: f32, delay: i32) -> Self {
        Self {
            damage,
            damage_range: range,
            full_damage_range: full_range,
            motion: ShotMotion::Explosion { delay },
            ..Self::new(ShotType::Explosion, None)
        }
    }

    /// Fragment thrown from a wreck in a random horizontal direction.
    pub fn fragment<R: Rng>(rng: &mut R, unit_type: u32, damage: i64, range: f32) -> Self {
        let mut velocity = Vec3::new(rng.gen::<f32>() - 0.5, rng.gen::<f32>() - 0.5, 0.0).normalized();
        let speed = FRAGMENT_MIN_SPEED + rng.gen::<f32>() * (FRAGMENT_MAX_SPEED - FRAGMENT_MIN_SPEED);
        velocity = velocity * speed;
        velocity.z = FRAGMENT_MIN_Z_SPEED + rng.gen::<f32>() * (FRAGMENT_MAX_Z_SPEED - FRAGMENT_MIN_Z_SPEED);
        Self {
            damage,
            damage_range: range,
            full_damage_range: 0.25 * range,
            motion: ShotMotion::Fragment {
                velocity,
                unit_type,
            },
            ..Self::new(ShotType::Fragment, None)
        }
    }

    /// Shots that are saved in savegames. Bullets hit at once and never are.
    pub fn is_persistent(&self) -> bool {
        self.active && self.shot_type != ShotType::Bullet
    }

    /// Heading to show for the current flight direction, if the shot flies.
    pub fn heading(&self) -> Option<f32> {
        let dir = match &self.motion {
            ShotMotion::Rocket(r) => r.direction,
            ShotMotion::Missile(m) => m.direction,
            ShotMotion::Fragment { velocity, .. } => *velocity,
            _ => return None,
        };
        Some(rotation_to_point(dir.x, dir.y))
    }

    /// Point the shot moves to when it explodes. Only bullets jump.
    pub fn explosion_center(&self, center: Vec3) -> Vec3 {
        match self.motion {
            ShotMotion::Bullet { target } => target,
            _ => center,
        }
    }

    /// Advance the flight by one tick.
    pub fn step(&mut self, s: &ShotSurroundings) -> ShotStep {
        match &mut self.motion {
            ShotMotion::Bullet { .. } => ShotStep::Explode,
            ShotMotion::Rocket(rocket) => rocket.step(s.center),
            ShotMotion::Missile(missile) => missile.step(s.center, s.target_center),
            ShotMotion::Explosion { delay } => {
                *delay -= 1;
                if *delay <= 0 {
                    ShotStep::Explode
                } else {
                    ShotStep::Fly(Vec3::ZERO)
                }
            }
            ShotMotion::Mine { activated } => {
                if s.contact {
                    if *activated {
                        return ShotStep::Explode;
                    }
                } else {
                    *activated = true;
                }
                ShotStep::Fly(Vec3::ZERO)
            }
            ShotMotion::Bomb(bomb) => {
                if s.center.z <= s.ground_height {
                    return ShotStep::Explode;
                }
                // Same trigger as a mine, so the dropping unit can't set it off.
                if s.contact {
                    if bomb.activated {
                        return ShotStep::Explode;
                    }
                } else {
                    bomb.activated = true;
                }
                bomb.thrust.accelerate();
                ShotStep::Fly(Vec3::new(
                    bomb.horizontal.0,
                    bomb.horizontal.1,
                    -bomb.thrust.speed,
                ))
            }
            ShotMotion::Fragment { velocity, .. } => {
                if s.center.z <= s.ground_height {
                    return ShotStep::Explode;
                }
                velocity.z += FRAGMENT_GRAVITY;
                ShotStep::Fly(*velocity)
            }
        }
    }
}

/// Keep the next center on the map by dropping the offending velocity axis.
pub fn clamp_to_map(center: Vec3, mut velocity: Vec3, width: f32, height: f32) -> Vec3 {
    if velocity.x == 0.0 && velocity.y == 0.0 {
        return velocity;
    }
    let x = center.x + velocity.x;
    if x < 0.0 || x >= width {
        velocity.x = 0.0;
    }
    let y = center.y + velocity.y;
    if y < 0.0 || y >= height {
        velocity.y = 0.0;
    }
    velocity
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn surroundings(center: Vec3) -> ShotSurroundings {
        ShotSurroundings {
            center,
            ground_height: 0.0,
            contact: false,
            target_center: None,
        }
    }

    fn weapon(shot_type: ShotType) -> WeaponProperties {
        WeaponProperties {
            shot_type,
            speed: 0.5,
            acceleration: 0.5,
            height: 0.25,
            ..WeaponProperties::default()
        }
    }

    #[test]
    fn test_explosion_delay() {
        let mut shot = Shot::explosion(50, 5.0, 2.0, 2);
        let s = surroundings(Vec3::ZERO);
        assert_eq!(shot.step(&s), ShotStep::Fly(Vec3::ZERO));
        assert_eq!(shot.step(&s), ShotStep::Explode);
    }

    #[test]
    fn test_mine_arms_then_triggers() {
        let mut shot = Shot::new(ShotType::Mine, Some(&weapon(ShotType::Mine)));
        let mut s = surroundings(Vec3::ZERO);

        // Touched by the layer: stays unarmed.
        s.contact = true;
        assert_eq!(shot.step(&s), ShotStep::Fly(Vec3::ZERO));
        s.contact = false;
        assert_eq!(shot.step(&s), ShotStep::Fly(Vec3::ZERO));
        assert_eq!(shot.motion, ShotMotion::Mine { activated: true });
        s.contact = true;
        assert_eq!(shot.step(&s), ShotStep::Explode);
    }

    #[test]
    fn test_rocket_reaches_target() {
        let mut shot = Shot::new(ShotType::Rocket, Some(&weapon(ShotType::Rocket)));
        let from = Vec3::new(1.0, 1.0, 0.0);
        let target = Vec3::new(6.0, 1.0, 0.0);
        if let ShotMotion::Rocket(r) = &mut shot.motion {
            r.launch(from, target);
            assert!((r.max_height - 1.25).abs() < 1e-5);
        }

        let mut center = from;
        let mut peak: f32 = 0.0;
        let mut steps = 0;
        while let ShotStep::Fly(v) = shot.step(&surroundings(center)) {
            center += v;
            peak = peak.max(center.z);
            steps += 1;
            assert!(steps < 100);
        }
        assert!((center.x - 6.0).abs() <= 0.5);
        assert!(peak > 1.0);
    }

    #[test]
    fn test_rocket_with_target_straight_below_explodes() {
        let mut shot = Shot::new(ShotType::Rocket, Some(&weapon(ShotType::Rocket)));
        let from = Vec3::new(4.0, 4.0, 1.0);
        if let ShotMotion::Rocket(r) = &mut shot.motion {
            r.launch(from, Vec3::new(4.0, 4.0, 0.0));
            assert_eq!(r.total_distance, 0.0);
        }
        assert_eq!(shot.step(&surroundings(from)), ShotStep::Explode);
    }

    #[test]
    fn test_missile_turns_limited() {
        let mut w = weapon(ShotType::Missile);
        w.turning_speed = 0.1;
        let mut shot = Shot::new(ShotType::Missile, Some(&w));
        if let ShotMotion::Missile(m) = &mut shot.motion {
            m.launch(Vec3::ZERO, ItemId(9), Vec3::new(10.0, 0.0, 0.0), -1.0);
            // Target jumps sideways; direction may only change by 0.1.
            m.direction = Vec3::new(1.0, 0.0, 0.0);
        }
        let mut s = surroundings(Vec3::ZERO);
        s.target_center = Some(Vec3::new(0.0, 10.0, 0.0));
        let ShotStep::Fly(_) = shot.step(&s) else {
            panic!("missile exploded early");
        };
        if let ShotMotion::Missile(m) = &shot.motion {
            assert!(m.direction.y > 0.0 && m.direction.y < 0.11);
            assert_eq!(m.target_position, Vec3::new(0.0, 10.0, 0.0));
        }
    }

    #[test]
    fn test_missile_out_of_fuel() {
        let mut w = weapon(ShotType::Missile);
        w.max_fly_distance = 0.4;
        let mut shot = Shot::new(ShotType::Missile, Some(&w));
        if let ShotMotion::Missile(m) = &mut shot.motion {
            m.launch(Vec3::ZERO, ItemId(9), Vec3::new(10.0, 0.0, 0.0), -1.0);
        }
        assert_eq!(shot.step(&surroundings(Vec3::ZERO)), ShotStep::Explode);
    }

    #[test]
    fn test_fragment_falls_to_ground() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut shot = Shot::fragment(&mut rng, 3, 20, 2.0);
        assert_eq!(shot.full_damage_range, 0.5);
        let ShotMotion::Fragment { velocity, .. } = shot.motion else {
            panic!("not a fragment");
        };
        let horizontal = (velocity.x * velocity.x + velocity.y * velocity.y).sqrt();
        assert!(horizontal >= FRAGMENT_MIN_SPEED - 1e-5 && horizontal <= FRAGMENT_MAX_SPEED + 1e-5);
        assert!(velocity.z >= FRAGMENT_MIN_Z_SPEED && velocity.z <= FRAGMENT_MAX_Z_SPEED);

        let mut center = Vec3::new(5.0, 5.0, FRAGMENT_START_HEIGHT);
        let mut steps = 0;
        while let ShotStep::Fly(v) = shot.step(&surroundings(center)) {
            center += v;
            steps += 1;
            assert!(steps < 1000);
        }
        assert!(center.z <= 0.0);
    }

    #[test]
    fn test_bomb_hits_ground() {
        let mut shot = Shot::new(ShotType::Bomb, Some(&weapon(ShotType::Bomb)));
        let mut center = Vec3::new(5.0, 5.0, 2.0);
        let mut steps = 0;
        while let ShotStep::Fly(v) = shot.step(&surroundings(center)) {
            assert!(v.z < 0.0);
            center += v;
            steps += 1;
            assert!(steps < 100);
        }
        assert!(center.z <= 0.0);
    }

    #[test]
    fn test_clamp_to_map() {
        let v = clamp_to_map(Vec3::new(9.8, 5.0, 0.0), Vec3::new(0.5, 0.5, 0.1), 10.0, 10.0);
        assert_eq!(v, Vec3::new(0.0, 0.5, 0.1));
    }
}
