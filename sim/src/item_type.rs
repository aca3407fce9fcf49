//! Item kind tags and type descriptors.
//!
//! An [`ItemType`] names what to instantiate. For units only `type_id` (the
//! unit type) matters. For shots `type_id` is the [`ShotType`], `group` the
//! unit type that carries the weapon and `group_type` the weapon id; shots
//! that do not come from a weapon (explosions, fragments) use `0` for both.

use serde::{Deserialize, Serialize};

/// Savegame kind code of shots.
pub const RTTI_SHOT: u32 = 1;
/// Savegame kind codes of units start here; the unit type is added on top.
pub const RTTI_UNIT_START: u32 = 200;

/// Closed set of item kinds on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Unit,
    Shot,
}

impl ItemKind {
    /// Decode the `Rtti` savegame attribute.
    pub fn from_rtti(rtti: u32) -> Option<ItemKind> {
        if rtti >= RTTI_UNIT_START {
            Some(ItemKind::Unit)
        } else if rtti == RTTI_SHOT {
            Some(ItemKind::Shot)
        } else {
            None
        }
    }

    /// Encode the `Rtti` savegame attribute for an item of this kind.
    pub fn rtti(&self, item_type: &ItemType) -> u32 {
        match self {
            ItemKind::Unit => RTTI_UNIT_START + item_type.type_id,
            ItemKind::Shot => RTTI_SHOT,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, ItemKind::Unit)
    }

    pub fn is_shot(&self) -> bool {
        matches!(self, ItemKind::Shot)
    }
}

/// Value-type descriptor of an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemType {
    pub type_id: u32,
    pub group: u32,
    pub group_type: u32,
}

impl ItemType {
    pub fn unit(unit_type: u32) -> Self {
        Self {
            type_id: unit_type,
            group: 0,
            group_type: 0,
        }
    }

    pub fn shot(shot_type: ShotType, unit_type: u32, weapon_id: u32) -> Self {
        Self {
            type_id: shot_type as u32,
            group: unit_type,
            group_type: weapon_id,
        }
    }

    /// Shot subtype, if `type_id` is a valid one.
    pub fn shot_type(&self) -> Option<ShotType> {
        ShotType::from_code(self.type_id)
    }
}

/// Shot subtypes. The discriminants are the savegame `Type` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ShotType {
    Bullet = 0,
    Rocket = 1,
    Explosion = 2,
    Mine = 3,
    Bomb = 4,
    Fragment = 5,
    Missile = 6,
}

impl ShotType {
    pub fn from_code(code: u32) -> Option<ShotType> {
        match code {
            0 => Some(ShotType::Bullet),
            1 => Some(ShotType::Rocket),
            2 => Some(ShotType::Explosion),
            3 => Some(ShotType::Mine),
            4 => Some(ShotType::Bomb),
            5 => Some(ShotType::Fragment),
            6 => Some(ShotType::Missile),
            _ => None,
        }
    }

    /// Whether shots of this type are fired by a weapon (and thus carry
    /// weapon properties in their group/group-type).
    pub fn needs_weapon(&self) -> bool {
        !matches!(self, ShotType::Explosion | ShotType::Fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtti_roundtrip() {
        let unit = ItemType::unit(12);
        let rtti = ItemKind::Unit.rtti(&unit);
        assert_eq!(rtti, 212);
        assert_eq!(ItemKind::from_rtti(rtti), Some(ItemKind::Unit));

        let shot = ItemType::shot(ShotType::Missile, 12, 3);
        assert_eq!(ItemKind::from_rtti(ItemKind::Shot.rtti(&shot)), Some(ItemKind::Shot));
        assert_eq!(ItemKind::from_rtti(0), None);
    }

    #[test]
    fn test_shot_type_codes() {
        for code in 0..7 {
            let t = ShotType::from_code(code).unwrap();
            assert_eq!(t as u32, code);
        }
        assert_eq!(ShotType::from_code(7), None);
        assert!(!ShotType::Fragment.needs_weapon());
        assert!(ShotType::Bomb.needs_weapon());
    }
}
