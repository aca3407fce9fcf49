//! Read-only unit, weapon and effect property tables.
//!
//! These are supplied by the host (usually parsed from species data files
//! elsewhere) and only looked up by the simulation. Tables deserialize from
//! JSON so tests and tools can describe a species inline.

use crate::item_type::ShotType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Static stats of one weapon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponProperties {
    pub id: u32,
    pub shot_type: ShotType,
    pub damage: i64,
    pub damage_range: f32,
    pub full_damage_range: f32,
    /// Maximum distance to the target, in cells.
    pub range: f32,
    /// Ticks between two shots.
    pub reload: u32,
    pub speed: f32,
    pub acceleration: f32,
    /// Rocket apex height as a factor of the flight distance.
    pub height: f32,
    pub max_fly_distance: f32,
    pub turning_speed: f32,
    /// Missile launch angle in degrees, `-1` to fly straight at the target.
    pub start_angle: f32,
    pub turret: bool,
    pub auto_use: bool,
    pub hit_effects: Vec<u32>,
}

impl Default for WeaponProperties {
    fn default() -> Self {
        Self {
            id: 1,
            shot_type: ShotType::Bullet,
            damage: 10,
            damage_range: 1.0,
            full_damage_range: 0.25,
            range: 5.0,
            reload: 10,
            speed: 0.5,
            acceleration: 0.05,
            height: 0.25,
            max_fly_distance: 30.0,
            turning_speed: 0.2,
            start_angle: -1.0,
            turret: true,
            auto_use: true,
            hit_effects: Vec::new(),
        }
    }
}

/// Static stats of one unit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitProperties {
    pub type_id: u32,
    pub name: String,
    pub health: u32,
    pub shields: u32,
    pub armor: u32,
    pub sight_range: f32,
    /// Cells per tick.
    pub speed: f32,
    /// Degrees per tick.
    pub rotation_speed: f32,
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub is_mobile: bool,
    /// Construction steps a freshly built unit needs; `0` means instantly ready.
    pub construction_steps: u32,
    pub exploding_damage: i64,
    pub exploding_damage_range: f32,
    pub exploding_fragment_count: u32,
    pub exploding_fragment_damage: i64,
    pub exploding_fragment_damage_range: f32,
    pub remove_wreckage_immediately: bool,
    pub destroyed_effects: Vec<u32>,
    pub weapons: Vec<WeaponProperties>,
    /// Unit types this unit can produce.
    pub producible: Vec<u32>,
    /// Ticks (plugin advance calls) needed to produce this type.
    pub production_time: u32,
    pub harvester: Option<HarvesterProperties>,
}

impl Default for UnitProperties {
    fn default() -> Self {
        Self {
            type_id: 0,
            name: String::new(),
            health: 100,
            shields: 0,
            armor: 0,
            sight_range: 8.0,
            speed: 0.1,
            rotation_speed: 15.0,
            width: 1.0,
            height: 1.0,
            depth: 1.0,
            is_mobile: true,
            construction_steps: 0,
            exploding_damage: 0,
            exploding_damage_range: 0.0,
            exploding_fragment_count: 0,
            exploding_fragment_damage: 0,
            exploding_fragment_damage_range: 0.0,
            remove_wreckage_immediately: false,
            destroyed_effects: Vec::new(),
            weapons: Vec::new(),
            producible: Vec::new(),
            production_time: 100,
            harvester: None,
        }
    }
}

impl UnitProperties {
    pub fn weapon(&self, id: u32) -> Option<&WeaponProperties> {
        self.weapons.iter().find(|w| w.id == id)
    }

    pub fn can_shoot(&self) -> bool {
        self.weapons.iter().any(|w| w.auto_use)
    }

    pub fn is_facility(&self) -> bool {
        !self.is_mobile
    }

    /// Longest range of the automatically used weapons.
    pub fn max_weapon_range(&self) -> f32 {
        self.weapons
            .iter()
            .filter(|w| w.auto_use)
            .map(|w| w.range)
            .fold(0.0, f32::max)
    }
}

/// Resource gathering stats of a harvester unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarvesterProperties {
    pub capacity: u32,
    /// Amount loaded or unloaded per plugin advance.
    pub rate: u32,
    /// Distance (center to center) at which it can work a mine or refinery.
    pub range: f32,
}

/// Unit table of one species.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SpeciesFile", into = "SpeciesFile")]
pub struct SpeciesTheme {
    pub name: String,
    units: BTreeMap<u32, Arc<UnitProperties>>,
}

#[derive(Serialize, Deserialize)]
struct SpeciesFile {
    name: String,
    #[serde(default)]
    units: Vec<UnitProperties>,
}

impl From<SpeciesFile> for SpeciesTheme {
    fn from(file: SpeciesFile) -> Self {
        let mut theme = SpeciesTheme::new(file.name);
        for unit in file.units {
            theme.insert(unit);
        }
        theme
    }
}

impl From<SpeciesTheme> for SpeciesFile {
    fn from(theme: SpeciesTheme) -> Self {
        Self {
            name: theme.name,
            units: theme.units.into_values().map(Arc::unwrap_or_clone).collect(),
        }
    }
}

impl SpeciesTheme {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert(&mut self, unit: UnitProperties) {
        self.units.insert(unit.type_id, Arc::new(unit));
    }

    pub fn unit(&self, type_id: u32) -> Option<&UnitProperties> {
        self.units.get(&type_id).map(Arc::as_ref)
    }

    /// Shared handle on a unit type, for holders that outlive the borrow of
    /// the theme.
    pub fn unit_shared(&self, type_id: u32) -> Option<Arc<UnitProperties>> {
        self.units.get(&type_id).cloned()
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitProperties> {
        self.units.values().map(Arc::as_ref)
    }
}

/// Static description of a visual effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectProperties {
    pub id: u32,
    /// Seconds before the effect starts.
    pub delay: f32,
    /// Seconds the effect stays active once started; `None` runs until
    /// made obsolete.
    pub lifetime: Option<f32>,
}

impl Default for EffectProperties {
    fn default() -> Self {
        Self {
            id: 0,
            delay: 0.0,
            lifetime: Some(1.0),
        }
    }
}

/// Lookup table for effect properties, shared by all players.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<EffectProperties>", into = "Vec<EffectProperties>")]
pub struct EffectPropertiesTable {
    effects: BTreeMap<u32, EffectProperties>,
}

impl From<Vec<EffectProperties>> for EffectPropertiesTable {
    fn from(list: Vec<EffectProperties>) -> Self {
        let mut table = EffectPropertiesTable::default();
        for props in list {
            table.insert(props);
        }
        table
    }
}

impl From<EffectPropertiesTable> for Vec<EffectProperties> {
    fn from(table: EffectPropertiesTable) -> Self {
        table.effects.into_values().collect()
    }
}

impl EffectPropertiesTable {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert(&mut self, props: EffectProperties) {
        self.effects.insert(props.id, props);
    }

    pub fn get(&self, id: u32) -> Option<&EffectProperties> {
        self.effects.get(&id)
    }
}
