//! ECS components carried by canvas items.
//!
//! Every unit and shot on the canvas is one entity. Components are pure data;
//! the canvas and the systems in [`crate::systems`] hold the behavior.
//! Cross-item references are always [`ItemId`]s resolved through the registry,
//! never entities or pointers.

use crate::item_type::{ItemKind, ItemType};
use crate::player::PlayerId;
use crate::work::{AdvanceSlots, Work};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

// ============================================================================
// MATH
// ============================================================================

/// Plain 3D vector used for positions, directions and velocities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector.
    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len < 0.0001 {
            Self::ZERO
        } else {
            *self * (1.0 / len)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    pub fn distance_to(&self, other: &Vec3) -> f32 {
        (*self - *other).length()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Heading in degrees (0 = north, clockwise) pointing along `(dx, dy)`.
pub fn rotation_to_point(dx: f32, dy: f32) -> f32 {
    let deg = dx.atan2(-dy).to_degrees();
    if deg < 0.0 {
        deg + 360.0
    } else {
        deg
    }
}

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Position of the item's bounding box: `x`/`y` is the top-left corner on the
/// map plane, `z` is the bottom.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Center of an item of `size` placed at this position.
    pub fn center(&self, size: &ItemSize) -> Vec3 {
        Vec3::new(
            self.x + size.width / 2.0,
            self.y + size.height / 2.0,
            self.z,
        )
    }

    /// Position that puts the center of an item of `size` at `center`.
    pub fn from_center(center: Vec3, size: &ItemSize) -> Self {
        Self::new(
            center.x - size.width / 2.0,
            center.y - size.height / 2.0,
            center.z,
        )
    }
}

/// Per-tick displacement, integrated by the function+move phase.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Velocity {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn from_vec3(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

/// Bounding box extents in cells.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemSize {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
}

impl ItemSize {
    pub fn new(width: f32, height: f32, depth: f32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

impl Default for ItemSize {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// Heading in degrees around the z axis.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation(pub f32);

/// Whether a renderer should draw the item. Hidden items still simulate.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visible(pub bool);

impl Default for Visible {
    fn default() -> Self {
        Self(true)
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Canvas-wide unique item id. `0` is reserved and never assigned.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ItemId(pub u32);

impl ItemId {
    pub const INVALID: ItemId = ItemId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning player (lookup only).
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner(pub PlayerId);

/// What the item is: kind tag plus the type/group/group-type triple.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTypeInfo {
    pub kind: ItemKind,
    pub item_type: ItemType,
}

// ============================================================================
// UNIT COMPONENTS
// ============================================================================

/// Hitpoints, shields and armor of a unit.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub health: u32,
    pub max_health: u32,
    pub shields: u32,
    pub max_shields: u32,
    pub armor: u32,
    pub sight_range: f32,
}

impl UnitStats {
    pub fn is_destroyed(&self) -> bool {
        self.health == 0
    }
}

/// Current work plus the two advance slots the scheduler reads.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct UnitWork {
    pub work: Work,
    pub slots: AdvanceSlots,
}

impl UnitWork {
    pub fn new(work: Work) -> Self {
        Self {
            work,
            slots: AdvanceSlots::new(work),
        }
    }
}

/// Reload state of one mounted weapon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponState {
    pub weapon_id: u32,
    /// Ticks until the weapon can fire again.
    pub reload_left: u32,
}

impl WeaponState {
    pub fn reloaded(&self) -> bool {
        self.reload_left == 0
    }
}

#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct Weapons(pub Vec<WeaponState>);

/// Construction progress. Completed units carry `step == steps`.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Construction {
    pub step: u32,
    pub steps: u32,
}

impl Construction {
    pub fn completed() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.step >= self.steps
    }
}

/// Id under which the owner keeps this unit's data handler.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHandlerId(pub u32);

// ============================================================================
// BUNDLES
// ============================================================================

/// Components shared by every canvas item.
#[derive(Bundle)]
pub struct ItemBundle {
    pub id: ItemId,
    pub info: ItemTypeInfo,
    pub owner: Owner,
    pub position: Position,
    pub velocity: Velocity,
    pub size: ItemSize,
    pub rotation: Rotation,
    pub visible: Visible,
}
