//! Players as seen by the canvas: unit bookkeeping, alliances and statistics.
//!
//! The host owns the player list and hands it to the canvas. The last player
//! of the list is the neutral player (mines, oil fields, scenery); it never
//! wins or loses and is nobody's enemy.

use crate::components::ItemId;
use crate::species::SpeciesTheme;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters shown on the end-of-game screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatistics {
    pub destroyed_mobiles: u32,
    pub destroyed_facilities: u32,
    pub produced_mobiles: u32,
    pub produced_facilities: u32,
    pub shots_fired: u32,
    pub minerals_refined: u64,
}

impl PlayerStatistics {
    /// Credit the destruction of an enemy unit.
    pub fn add_destroyed(&mut self, is_facility: bool) {
        if is_facility {
            self.destroyed_facilities += 1;
        } else {
            self.destroyed_mobiles += 1;
        }
    }

    pub fn add_produced(&mut self, is_facility: bool) {
        if is_facility {
            self.produced_facilities += 1;
        } else {
            self.produced_mobiles += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Players on the same team are allies.
    pub team: u32,
    pub species: Arc<SpeciesTheme>,
    pub minerals: u64,
    pub has_won: bool,
    pub has_lost: bool,
    units: BTreeSet<ItemId>,
    mobiles: u32,
    facilities: u32,
    statistics: PlayerStatistics,
    last_data_handler_id: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, team: u32, species: Arc<SpeciesTheme>) -> Self {
        Self {
            id,
            name: name.into(),
            team,
            species,
            minerals: 0,
            has_won: false,
            has_lost: false,
            units: BTreeSet::new(),
            mobiles: 0,
            facilities: 0,
            statistics: PlayerStatistics::default(),
            last_data_handler_id: 0,
        }
    }

    /// Register a live unit. Returns the data handler id assigned to it.
    pub fn add_unit(&mut self, id: ItemId, is_mobile: bool) -> u32 {
        self.last_data_handler_id += 1;
        let handler = self.last_data_handler_id;
        self.register_unit(id, is_mobile, handler);
        handler
    }

    /// Register a unit restored from a savegame with its saved handler id.
    pub fn register_unit(&mut self, id: ItemId, is_mobile: bool, data_handler_id: u32) {
        self.last_data_handler_id = self.last_data_handler_id.max(data_handler_id);
        if self.units.insert(id) {
            if is_mobile {
                self.mobiles += 1;
            } else {
                self.facilities += 1;
            }
        }
    }

    /// A unit left play (destroyed). No-op for units this player does not own.
    pub fn unit_destroyed(&mut self, id: ItemId, is_mobile: bool) {
        if self.units.remove(&id) {
            if is_mobile {
                self.mobiles = self.mobiles.saturating_sub(1);
            } else {
                self.facilities = self.facilities.saturating_sub(1);
            }
        }
    }

    pub fn units(&self) -> &BTreeSet<ItemId> {
        &self.units
    }

    pub fn has_units(&self) -> bool {
        !self.units.is_empty()
    }

    pub fn mobiles_count(&self) -> u32 {
        self.mobiles
    }

    pub fn facilities_count(&self) -> u32 {
        self.facilities
    }

    pub fn statistics(&self) -> &PlayerStatistics {
        &self.statistics
    }

    pub fn statistics_mut(&mut self) -> &mut PlayerStatistics {
        &mut self.statistics
    }
}

/// The session's player list. The last entry is the neutral player.
#[derive(Debug, Clone, Default)]
pub struct Players {
    list: Vec<Player>,
}

impl Players {
    pub fn new(list: Vec<Player>) -> Self {
        Self { list }
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.list.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.list.iter_mut().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.list.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.list.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn neutral(&self) -> Option<PlayerId> {
        self.list.last().map(|p| p.id)
    }

    pub fn is_neutral(&self, id: PlayerId) -> bool {
        self.neutral() == Some(id)
    }

    /// Players that take part in the game (everyone but the neutral slot and
    /// players that already lost).
    pub fn active(&self) -> impl Iterator<Item = &Player> {
        let neutral = self.neutral();
        self.list
            .iter()
            .filter(move |p| Some(p.id) != neutral && !p.has_lost)
    }

    pub fn is_enemy(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b || self.is_neutral(a) || self.is_neutral(b) {
            return false;
        }
        match (self.get(a), self.get(b)) {
            (Some(pa), Some(pb)) => pa.team != pb.team,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players() -> Players {
        let species = Arc::new(SpeciesTheme::new("test"));
        Players::new(vec![
            Player::new(PlayerId(128), "blue", 0, species.clone()),
            Player::new(PlayerId(129), "red", 1, species.clone()),
            Player::new(PlayerId(130), "green", 0, species.clone()),
            Player::new(PlayerId(131), "neutral", 99, species),
        ])
    }

    #[test]
    fn test_enemies_and_neutral() {
        let players = players();
        assert!(players.is_enemy(PlayerId(128), PlayerId(129)));
        assert!(!players.is_enemy(PlayerId(128), PlayerId(130)));
        assert!(!players.is_enemy(PlayerId(128), PlayerId(131)));
        assert!(players.is_neutral(PlayerId(131)));
        assert_eq!(players.active().count(), 3);
    }

    #[test]
    fn test_unit_bookkeeping() {
        let mut players = players();
        let blue = players.get_mut(PlayerId(128)).unwrap();

        let h1 = blue.add_unit(ItemId(1), true);
        let h2 = blue.add_unit(ItemId(2), false);
        assert!(h2 > h1);
        assert_eq!(blue.mobiles_count(), 1);
        assert_eq!(blue.facilities_count(), 1);

        blue.unit_destroyed(ItemId(1), true);
        blue.unit_destroyed(ItemId(1), true);
        assert_eq!(blue.mobiles_count(), 0);
        assert_eq!(blue.facilities_count(), 1);
        assert!(blue.has_units());
    }
}
