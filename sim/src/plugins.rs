//! Unit plugins: production and harvesting.
//!
//! Plugins are optional per-unit capabilities derived from the unit's
//! properties. A unit runs its plugins through the `Plugin` work, driven by a
//! `Produce` or `Harvest` order.

use crate::canvas::Canvas;
use crate::components::{ItemId, Position};
use crate::events::Event;
use crate::item_type::{ItemKind, ItemType};
use crate::orders::UnitOrder;
use crate::player::PlayerId;
use crate::species::{HarvesterProperties, UnitProperties};
use crate::units::Steering;
use bevy_ecs::prelude::*;
use std::collections::VecDeque;
use tracing::{debug, info, trace, warn};

/// Farthest ring (in cells) searched for a free spot next to a factory.
const MAX_PLACEMENT_RING: i32 = 8;

/// Queue of unit types a factory builds, one after the other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductionPlugin {
    queue: VecDeque<u32>,
    progress: u32,
}

impl ProductionPlugin {
    pub fn add(&mut self, unit_type: u32) {
        self.queue.push_back(unit_type);
    }

    /// Unit type currently being built.
    pub fn current(&self) -> Option<u32> {
        self.queue.front().copied()
    }

    pub fn queued(&self) -> impl Iterator<Item = u32> + '_ {
        self.queue.iter().copied()
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// One production step. Returns `true` once the current unit is ready to
    /// be placed; it stays ready until [`finish_current`](Self::finish_current).
    pub fn advance(&mut self, production_time: u32) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        if self.progress < production_time {
            self.progress += 1;
        }
        self.progress >= production_time
    }

    pub fn finish_current(&mut self) -> Option<u32> {
        self.progress = 0;
        self.queue.pop_front()
    }
}

/// Mining shuttle between a mine and a refinery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarvesterPlugin {
    pub mine: Option<ItemId>,
    pub refinery: Option<ItemId>,
    pub cargo: u32,
    /// Set while the cargo is brought to the refinery.
    pub unloading: bool,
    pub properties: HarvesterProperties,
}

impl HarvesterPlugin {
    pub fn new(properties: HarvesterProperties) -> Self {
        Self {
            mine: None,
            refinery: None,
            cargo: 0,
            unloading: false,
            properties,
        }
    }

    pub fn is_full(&self) -> bool {
        self.cargo >= self.properties.capacity
    }

    /// Load one batch. Returns the amount loaded.
    pub fn load(&mut self) -> u32 {
        let amount = self
            .properties
            .rate
            .min(self.properties.capacity.saturating_sub(self.cargo));
        self.cargo += amount;
        if self.is_full() {
            self.unloading = true;
        }
        amount
    }

    /// Unload one batch. Returns the amount unloaded.
    pub fn unload(&mut self) -> u32 {
        let amount = self.properties.rate.min(self.cargo);
        self.cargo -= amount;
        if self.cargo == 0 {
            self.unloading = false;
        }
        amount
    }
}

#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct UnitPlugins {
    pub production: Option<ProductionPlugin>,
    pub harvester: Option<HarvesterPlugin>,
}

impl UnitPlugins {
    pub fn for_unit(props: &UnitProperties) -> Self {
        Self {
            production: (!props.producible.is_empty()).then(ProductionPlugin::default),
            harvester: props.harvester.map(HarvesterPlugin::new),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.production.is_none() && self.harvester.is_none()
    }

    /// Drop references to a removed item.
    pub fn forget_item(&mut self, id: ItemId) {
        if let Some(harvester) = self.harvester.as_mut() {
            if harvester.mine == Some(id) {
                harvester.mine = None;
            }
            if harvester.refinery == Some(id) {
                harvester.refinery = None;
            }
        }
    }
}

enum ProductionStep {
    Idle,
    Working,
    Ready(u32),
}

impl Canvas {
    pub(crate) fn advance_plugin(&mut self, id: ItemId) {
        match self.current_order(id) {
            Some(UnitOrder::Produce) => self.advance_production(id),
            Some(UnitOrder::Harvest) => self.advance_harvester(id),
            other => {
                warn!(item = %id, order = ?other, "plugin work without a plugin order");
                self.current_order_done(id);
            }
        }
    }

    fn advance_production(&mut self, id: ItemId) {
        let Some(owner) = self.owner_of(id) else {
            return;
        };
        let Some(species) = self.species_of(owner) else {
            warn!(item = %id, player = %owner, "producer without species");
            return;
        };
        let step = {
            let mut plugins = self.get_mut::<UnitPlugins>(id);
            match plugins.as_mut().and_then(|p| p.production.as_mut()) {
                None => None,
                Some(production) => Some(match production.current() {
                    None => ProductionStep::Idle,
                    Some(unit_type) => {
                        let time = species.unit(unit_type).map_or(0, |p| p.production_time);
                        if production.advance(time) {
                            ProductionStep::Ready(unit_type)
                        } else {
                            ProductionStep::Working
                        }
                    }
                }),
            }
        };

        let unit_type = match step {
            None => {
                warn!(item = %id, "produce order on a unit without production plugin");
                self.current_order_done(id);
                return;
            }
            Some(ProductionStep::Idle) => {
                self.current_order_done(id);
                return;
            }
            Some(ProductionStep::Working) => return,
            Some(ProductionStep::Ready(unit_type)) => unit_type,
        };

        let Some((x, y)) = self.find_placement(id, unit_type, owner) else {
            debug!(item = %id, unit_type, "no free spot for produced unit, retrying");
            return;
        };
        let Some(props) = species.unit(unit_type) else {
            warn!(item = %id, unit_type, "producing unknown unit type");
            self.finish_production(id);
            return;
        };
        let z = self
            .map
            .height_at_point(x + props.width / 2.0, y + props.height / 2.0);
        match self.create_new_item(
            ItemKind::Unit,
            owner,
            ItemType::unit(unit_type),
            Position::new(x, y, z),
        ) {
            Ok(unit) => {
                if let Some(player) = self.players.get_mut(owner) {
                    player.statistics_mut().add_produced(props.is_facility());
                }
                self.queue_event(
                    Event::new("UnitWithTypeProduced")
                        .with_data1(unit_type.to_string())
                        .with_unit(unit)
                        .with_player(owner),
                );
                info!(factory = %id, unit = %unit, unit_type, "unit produced");
                self.finish_production(id);
            }
            Err(err) => warn!(item = %id, unit_type, %err, "placing produced unit failed"),
        }
    }

    fn finish_production(&mut self, id: ItemId) {
        let done = match self.get_mut::<UnitPlugins>(id) {
            Some(mut plugins) => match plugins.production.as_mut() {
                Some(production) => {
                    production.finish_current();
                    production.is_empty()
                }
                None => true,
            },
            None => true,
        };
        if done {
            self.current_order_done(id);
        }
    }

    /// First free spot for a `unit_type` around the factory, searching rings
    /// of growing radius.
    pub(crate) fn find_placement(
        &self,
        factory: ItemId,
        unit_type: u32,
        owner: PlayerId,
    ) -> Option<(f32, f32)> {
        let pos = self.position(factory)?;
        let (fx, fy) = (pos.x.floor() as i32, pos.y.floor() as i32);
        for ring in 1..=MAX_PLACEMENT_RING {
            for dy in -ring..=ring {
                for dx in -ring..=ring {
                    if dx.abs() != ring && dy.abs() != ring {
                        continue;
                    }
                    let (x, y) = ((fx + dx) as f32, (fy + dy) as f32);
                    if self.can_place_unit_at(unit_type, owner, x, y) {
                        return Some((x, y));
                    }
                }
            }
        }
        None
    }

    fn advance_harvester(&mut self, id: ItemId) {
        let Some(harvester) = self.get::<UnitPlugins>(id).and_then(|p| p.harvester) else {
            warn!(item = %id, "harvest order on a unit without harvester plugin");
            self.current_order_done(id);
            return;
        };
        let speed = self.unit_properties(id).map_or(0.0, |p| p.speed);
        let range = harvester.properties.range;
        let mine = harvester.mine.filter(|m| self.contains(*m));
        let refinery = harvester.refinery.filter(|r| self.is_alive_unit(*r));

        let unloading = harvester.unloading || (mine.is_none() && harvester.cargo > 0);
        let goal = if unloading { refinery } else { mine };
        let Some(goal) = goal else {
            debug!(item = %id, cargo = harvester.cargo, "harvesting finished");
            self.current_order_done(id);
            return;
        };
        let Some(goal_center) = self.center(goal) else {
            return;
        };
        match self.steer_to(id, goal_center, range, speed) {
            Steering::Moving => {}
            Steering::Blocked => self.current_order_done(id),
            Steering::Arrived => {
                let owner = self.owner_of(id);
                let refined = {
                    let Some(mut plugins) = self.get_mut::<UnitPlugins>(id) else {
                        return;
                    };
                    let Some(h) = plugins.harvester.as_mut() else {
                        return;
                    };
                    if unloading {
                        h.unloading = true;
                        h.unload()
                    } else {
                        h.load();
                        0
                    }
                };
                if refined > 0 {
                    if let Some(player) = owner.and_then(|o| self.players.get_mut(o)) {
                        player.minerals += u64::from(refined);
                        player.statistics_mut().minerals_refined += u64::from(refined);
                    }
                    trace!(item = %id, refined, "minerals unloaded");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::tests::*;
    use crate::work::Work;

    #[test]
    fn test_production_queue() {
        let mut production = ProductionPlugin::default();
        assert!(!production.advance(2));
        production.add(1);
        production.add(2);
        assert!(!production.advance(2));
        assert!(production.advance(2));
        // Stays ready until placed.
        assert!(production.advance(2));
        assert_eq!(production.finish_current(), Some(1));
        assert_eq!(production.current(), Some(2));
        assert_eq!(production.progress(), 0);
    }

    #[test]
    fn test_harvester_load_unload() {
        let mut h = HarvesterPlugin::new(HarvesterProperties {
            capacity: 10,
            rate: 4,
            range: 1.0,
        });
        assert_eq!(h.load(), 4);
        assert_eq!(h.load(), 4);
        assert!(!h.unloading);
        assert_eq!(h.load(), 2);
        assert!(h.is_full() && h.unloading);
        assert_eq!(h.unload(), 4);
        assert_eq!(h.unload(), 4);
        assert_eq!(h.unload(), 2);
        assert!(!h.unloading);
    }

    #[test]
    fn test_plugins_for_unit() {
        let species = test_species();
        assert!(UnitPlugins::for_unit(species.unit(FACTORY).unwrap())
            .production
            .is_some());
        assert!(UnitPlugins::for_unit(species.unit(HARVESTER).unwrap())
            .harvester
            .is_some());
        assert!(UnitPlugins::for_unit(species.unit(TANK).unwrap()).is_empty());
    }

    #[test]
    fn test_find_placement_skips_occupied() {
        let mut canvas = test_canvas();
        let factory = canvas
            .create_unit(BLUE, FACTORY, Position::new(10.0, 10.0, 0.0))
            .unwrap();
        let spot = canvas.find_placement(factory, TANK, BLUE).unwrap();
        assert_eq!(spot, (9.0, 9.0));
        canvas
            .create_unit(BLUE, TANK, Position::new(9.0, 9.0, 0.0))
            .unwrap();
        assert_eq!(canvas.find_placement(factory, TANK, BLUE), Some((10.0, 9.0)));
    }

    #[test]
    fn test_plugin_work_without_order_finishes() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        canvas.set_work(tank, Work::Plugin);
        canvas.advance_plugin(tank);
        assert_eq!(canvas.work(tank), Some(Work::Idle));
    }
}
