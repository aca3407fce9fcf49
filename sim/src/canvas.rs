//! The canvas: owner of every simulated item.
//!
//! The canvas holds the ECS world (one entity per item) and every index over
//! it: the id registry, the work buckets, the spatial grid and the
//! destroyed-units list. It is the only way to create or delete items, so it
//! can keep those indexes consistent.
//!
//! The tick driver lives in [`crate::advance`], damage in [`crate::damage`]
//! and destruction in [`crate::destruction`]; they are all `impl Canvas`
//! blocks over the state defined here.
//!
//! ## Locking
//!
//! While [`Canvas::slot_advance`] runs the canvas is locked. Items created in
//! that window (shots fired, units produced) are registered at once but join
//! their work bucket in the reclassification phase. Deleting items is
//! refused with [`CanvasError::Locked`].

use crate::components::*;
use crate::config::{CanvasConfig, SimTick};
use crate::data_handler::DataHandler;
use crate::effects::EffectList;
use crate::error::CanvasError;
use crate::events::{CanvasEventListener, Event, EventQueue};
use crate::item_type::{ItemKind, ItemType, ShotType};
use crate::map::BosonMap;
use crate::orders::{UnitOrder, UnitOrders};
use crate::player::{PlayerId, Players};
use crate::plugins::UnitPlugins;
use crate::profiler::Profiler;
use crate::registry::ItemRegistry;
use crate::shots::{Shot, ShotMotion, SHOT_SIZE};
use crate::spatial::{Rect, SpatialEntry, SpatialGrid};
use crate::species::{EffectPropertiesTable, SpeciesTheme, UnitProperties};
use crate::systems::weapon_reload_system;
use crate::work::{Work, WorkBuckets, WorkTag};
use bevy_ecs::prelude::*;
use bevy_ecs::world::Mut;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Receives item lifecycle notifications (renderer, minimap, sound).
pub trait CanvasObserver {
    fn item_added(&mut self, _id: ItemId, _kind: ItemKind) {}
    fn item_removed(&mut self, _id: ItemId) {}
    fn item_moved(&mut self, _id: ItemId, _from: Vec3, _to: Vec3) {}
    /// A unit was destroyed; it stays on the canvas as a wreck for a while.
    fn unit_destroyed(&mut self, _id: ItemId) {}
}

/// Re-entrancy guard and the state of the running advance call.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AdvanceLock {
    pub locked: bool,
    pub flag: bool,
    pub tick: u64,
}

pub struct Canvas {
    pub(crate) world: World,
    /// Phase 1 systems.
    pub(crate) item_advance: Schedule,
    pub(crate) registry: ItemRegistry,
    pub(crate) buckets: WorkBuckets,
    /// Destroyed units waiting for removal, with their deletion timer.
    pub(crate) destroyed: BTreeMap<ItemId, u32>,
    pub(crate) effects: EffectList,
    pub(crate) grid: SpatialGrid,
    pub(crate) map: BosonMap,
    pub(crate) players: Players,
    pub(crate) events: EventQueue,
    pub(crate) listener: CanvasEventListener,
    pub(crate) data: DataHandler,
    pub(crate) effect_properties: EffectPropertiesTable,
    pub(crate) config: CanvasConfig,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) profiler: Profiler,
    pub(crate) lock: AdvanceLock,
    observers: Vec<Box<dyn CanvasObserver + Send>>,
}

impl Canvas {
    pub fn new(
        map: BosonMap,
        players: Players,
        effect_properties: EffectPropertiesTable,
        config: CanvasConfig,
    ) -> Self {
        let mut world = World::new();
        world.insert_resource(config.clone());
        world.insert_resource(SimTick(0));

        let mut item_advance = Schedule::default();
        item_advance.add_systems(weapon_reload_system);

        Self {
            world,
            item_advance,
            registry: ItemRegistry::new(),
            buckets: WorkBuckets::new(),
            destroyed: BTreeMap::new(),
            effects: EffectList::new(),
            grid: SpatialGrid::default(),
            map,
            players,
            events: EventQueue::new(),
            listener: CanvasEventListener::new(),
            data: DataHandler::new(),
            effect_properties,
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            config,
            profiler: Profiler::new(),
            lock: AdvanceLock::default(),
            observers: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn map(&self) -> &BosonMap {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut BosonMap {
        &mut self.map
    }

    pub fn players(&self) -> &Players {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut Players {
        &mut self.players
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    pub fn listener(&self) -> &CanvasEventListener {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut CanvasEventListener {
        &mut self.listener
    }

    pub fn effects(&self) -> &EffectList {
        &self.effects
    }

    pub fn effect_properties(&self) -> &EffectPropertiesTable {
        &self.effect_properties
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn work_buckets(&self) -> &WorkBuckets {
        &self.buckets
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn data_handler(&self) -> &DataHandler {
        &self.data
    }

    pub fn data_handler_mut(&mut self) -> &mut DataHandler {
        &mut self.data
    }

    pub fn is_locked(&self) -> bool {
        self.lock.locked
    }

    pub fn add_observer(&mut self, observer: Box<dyn CanvasObserver + Send>) {
        self.observers.push(observer);
    }

    pub fn item_count(&self) -> usize {
        self.registry.len()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.registry.contains(id)
    }

    /// All live item ids, ascending.
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.registry.ids()
    }

    /// Destroyed units awaiting removal, with their deletion timers.
    pub fn destroyed_units(&self) -> impl Iterator<Item = (ItemId, u32)> + '_ {
        self.destroyed.iter().map(|(id, timer)| (*id, *timer))
    }

    pub fn is_destroyed(&self, id: ItemId) -> bool {
        self.destroyed.contains_key(&id)
    }

    /// Component of an item.
    pub fn get<T: Component>(&self, id: ItemId) -> Option<&T> {
        self.registry.entity(id).and_then(|e| self.world.get::<T>(e))
    }

    pub(crate) fn get_mut<T: Component>(&mut self, id: ItemId) -> Option<Mut<'_, T>> {
        let entity = self.registry.entity(id)?;
        self.world.get_mut::<T>(entity)
    }

    pub fn kind_of(&self, id: ItemId) -> Option<ItemKind> {
        self.get::<ItemTypeInfo>(id).map(|info| info.kind)
    }

    pub fn owner_of(&self, id: ItemId) -> Option<PlayerId> {
        self.get::<Owner>(id).map(|o| o.0)
    }

    pub fn position(&self, id: ItemId) -> Option<Position> {
        self.get::<Position>(id).copied()
    }

    /// Center of the item's footprint, at its z.
    pub fn center(&self, id: ItemId) -> Option<Vec3> {
        let entity = self.registry.entity(id)?;
        let pos = self.world.get::<Position>(entity)?;
        let size = self.world.get::<ItemSize>(entity)?;
        Some(pos.center(size))
    }

    pub fn work(&self, id: ItemId) -> Option<Work> {
        self.get::<UnitWork>(id).map(|w| w.work)
    }

    /// Whether `id` is a unit that is still alive.
    pub fn is_alive_unit(&self, id: ItemId) -> bool {
        self.get::<UnitStats>(id)
            .is_some_and(|stats| !stats.is_destroyed())
    }

    pub(crate) fn species_of(&self, player: PlayerId) -> Option<Arc<SpeciesTheme>> {
        self.players.get(player).map(|p| p.species.clone())
    }

    /// Static properties of a unit.
    pub fn unit_properties(&self, id: ItemId) -> Option<Arc<UnitProperties>> {
        let info = self.get::<ItemTypeInfo>(id)?;
        if !info.kind.is_unit() {
            return None;
        }
        let owner = self.owner_of(id)?;
        self.species_of(owner)?.unit_shared(info.item_type.type_id)
    }

    // ------------------------------------------------------------------
    // Item factory
    // ------------------------------------------------------------------

    /// Create an item without any gameplay setup. Used by the loader and by
    /// [`create_new_item`](Self::create_new_item).
    ///
    /// `id` 0 assigns a fresh id. Fails if the position is off the map, the
    /// type is unknown or the item's init hook fails; nothing is left behind
    /// in that case.
    pub fn create_item(
        &mut self,
        kind: ItemKind,
        owner: PlayerId,
        item_type: ItemType,
        position: Position,
        id: ItemId,
    ) -> Result<ItemId, CanvasError> {
        let species = self
            .species_of(owner)
            .ok_or(CanvasError::UnknownPlayer(owner))?;

        let size = match kind {
            ItemKind::Unit => {
                let props = species.unit(item_type.type_id).ok_or(CanvasError::UnknownUnitType {
                    unit_type: item_type.type_id,
                    player: owner,
                })?;
                ItemSize::new(props.width, props.height, props.depth)
            }
            ItemKind::Shot => {
                item_type
                    .shot_type()
                    .ok_or(CanvasError::UnknownShotType(item_type.type_id))?;
                ItemSize::new(SHOT_SIZE, SHOT_SIZE, SHOT_SIZE)
            }
        };

        if !self.map.on_map(position.x, position.y) || !position.z.is_finite() {
            return Err(CanvasError::InvalidPosition {
                x: position.x,
                y: position.y,
                z: position.z,
            });
        }

        let id = self.registry.claim(id)?;
        let bundle = ItemBundle {
            id,
            info: ItemTypeInfo { kind, item_type },
            owner: Owner(owner),
            position,
            velocity: Velocity::default(),
            size,
            rotation: Rotation::default(),
            visible: Visible(true),
        };
        let mut entity = self.world.spawn(bundle);
        let tag = match kind {
            ItemKind::Unit => {
                if let Some(props) = species.unit(item_type.type_id) {
                    entity.insert(unit_components(props));
                }
                WorkTag::Work(Work::Idle)
            }
            ItemKind::Shot => {
                if let Some(shot_type) = item_type.shot_type() {
                    let weapon = species
                        .unit(item_type.group)
                        .and_then(|u| u.weapon(item_type.group_type));
                    entity.insert(Shot::new(shot_type, weapon));
                    if shot_type == ShotType::Bullet {
                        entity.insert(Visible(false));
                    }
                }
                WorkTag::Always
            }
        };
        let entity = entity.id();
        self.registry.insert(id, entity);
        if self.lock.locked {
            self.buckets.queue_reclassification(id);
        } else {
            self.buckets.insert(id, tag);
        }

        if let Err(reason) = self.init_item(id, &species) {
            warn!(item = %id, reason, "item init failed, rolling back");
            self.buckets.remove(id);
            self.registry.remove(id);
            self.world.despawn(entity);
            return Err(CanvasError::InitFailed { id, reason });
        }

        self.refresh_grid(id);
        trace!(item = %id, ?kind, ?item_type, "item created");
        for observer in self.observers.iter_mut() {
            observer.item_added(id, kind);
        }
        Ok(id)
    }

    fn init_item(&self, id: ItemId, species: &SpeciesTheme) -> Result<(), &'static str> {
        let info = self.get::<ItemTypeInfo>(id).ok_or("item has no type")?;
        match info.kind {
            ItemKind::Unit => {
                let stats = self.get::<UnitStats>(id).ok_or("unit has no stats")?;
                if stats.max_health == 0 {
                    return Err("unit type has no health");
                }
            }
            ItemKind::Shot => {
                let shot = self.get::<Shot>(id).ok_or("shot has no state")?;
                let has_weapon = species
                    .unit(info.item_type.group)
                    .and_then(|u| u.weapon(info.item_type.group_type))
                    .is_some();
                if shot.shot_type.needs_weapon() && !has_weapon {
                    return Err("missing weapon properties");
                }
            }
        }
        Ok(())
    }

    /// Create an item for live gameplay: units are registered with their
    /// owner and start their construction if their type needs one.
    pub fn create_new_item(
        &mut self,
        kind: ItemKind,
        owner: PlayerId,
        item_type: ItemType,
        position: Position,
    ) -> Result<ItemId, CanvasError> {
        let id = self.create_item(kind, owner, item_type, position, ItemId::INVALID)?;
        if kind.is_unit() {
            let props = self.unit_properties(id).ok_or(CanvasError::UnknownUnitType {
                unit_type: item_type.type_id,
                player: owner,
            })?;
            let handler = match self.players.get_mut(owner) {
                Some(player) => player.add_unit(id, props.is_mobile),
                None => return Err(CanvasError::UnknownPlayer(owner)),
            };
            if let Some(mut handler_id) = self.get_mut::<DataHandlerId>(id) {
                handler_id.0 = handler;
            }
            if let Some(mut stats) = self.get_mut::<UnitStats>(id) {
                *stats = default_stats(&props);
            }
            if props.construction_steps > 0 {
                if let Some(mut construction) = self.get_mut::<Construction>(id) {
                    *construction = Construction {
                        step: 0,
                        steps: props.construction_steps,
                    };
                }
                self.set_work(id, Work::Constructed);
            }
            debug!(item = %id, unit_type = item_type.type_id, player = %owner, "unit created");
        }
        Ok(id)
    }

    /// Create a fully set up unit.
    pub fn create_unit(
        &mut self,
        owner: PlayerId,
        unit_type: u32,
        position: Position,
    ) -> Result<ItemId, CanvasError> {
        self.create_new_item(ItemKind::Unit, owner, ItemType::unit(unit_type), position)
    }

    /// Create a shot centered on `center`. It still has to be launched.
    pub fn create_shot(
        &mut self,
        owner: PlayerId,
        shot_type: ShotType,
        unit_type: u32,
        weapon_id: u32,
        center: Vec3,
    ) -> Result<ItemId, CanvasError> {
        let size = ItemSize::new(SHOT_SIZE, SHOT_SIZE, SHOT_SIZE);
        self.create_new_item(
            ItemKind::Shot,
            owner,
            ItemType::shot(shot_type, unit_type, weapon_id),
            Position::from_center(center, &size),
        )
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    pub fn delete_item(&mut self, id: ItemId) -> Result<bool, CanvasError> {
        self.delete_items(&[id]).map(|n| n == 1)
    }

    /// Delete a batch of items. Refused while an advance call is running.
    pub fn delete_items(&mut self, ids: &[ItemId]) -> Result<usize, CanvasError> {
        if self.lock.locked {
            error!(count = ids.len(), "delete requested while the canvas is locked");
            return Err(CanvasError::Locked);
        }
        Ok(self.remove_items(ids))
    }

    /// Unchecked batch delete, for the maintenance pass.
    pub(crate) fn remove_items(&mut self, ids: &[ItemId]) -> usize {
        let mut removed = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(entity) = self.registry.remove(id) else {
                continue;
            };
            self.buckets.remove(id);
            self.grid.remove(id);
            self.destroyed.remove(&id);
            removed.push((id, entity));
        }

        for &(id, entity) in &removed {
            // A unit deleted while alive leaves its owner's list here.
            let alive = self
                .world
                .get::<UnitStats>(entity)
                .is_some_and(|s| !s.is_destroyed());
            if alive {
                let owner = self.world.get::<Owner>(entity).map(|o| o.0);
                let info = self.world.get::<ItemTypeInfo>(entity).copied();
                if let (Some(owner), Some(info)) = (owner, info) {
                    let mobile = self
                        .species_of(owner)
                        .and_then(|s| s.unit(info.item_type.type_id).map(|p| p.is_mobile))
                        .unwrap_or(true);
                    if let Some(player) = self.players.get_mut(owner) {
                        player.unit_destroyed(id, mobile);
                    }
                }
            }
            self.item_removed(id);
        }

        for &(id, entity) in &removed {
            self.world.despawn(entity);
            trace!(item = %id, "item deleted");
        }
        removed.len()
    }

    /// Clear every reference the remaining items hold to `id`.
    fn item_removed(&mut self, id: ItemId) {
        let mut orders = self.world.query::<&mut UnitOrders>();
        for mut o in orders.iter_mut(&mut self.world) {
            o.forget_item(id);
        }
        let mut plugins = self.world.query::<&mut UnitPlugins>();
        for mut p in plugins.iter_mut(&mut self.world) {
            p.forget_item(id);
        }
        let mut shots = self.world.query::<&mut Shot>();
        for mut shot in shots.iter_mut(&mut self.world) {
            if let ShotMotion::Missile(missile) = &mut shot.motion {
                if missile.target == Some(id) {
                    missile.target = None;
                }
            }
        }
        self.effects.forget_owner(id);
        for observer in self.observers.iter_mut() {
            observer.item_removed(id);
        }
    }

    // ------------------------------------------------------------------
    // Work, orders and movement helpers
    // ------------------------------------------------------------------

    /// Change a unit's work. The bucket follows immediately when the canvas
    /// is idle, otherwise in the reclassification phase.
    pub(crate) fn set_work(&mut self, id: ItemId, work: Work) {
        let AdvanceLock { locked, flag, .. } = self.lock;
        let Some(mut unit_work) = self.get_mut::<UnitWork>(id) else {
            warn!(item = %id, ?work, "set_work on an item without work");
            return;
        };
        unit_work.work = work;
        unit_work.slots.set(work, flag, locked);
        if locked {
            self.buckets.queue_reclassification(id);
        } else {
            self.buckets.insert(id, WorkTag::Work(work));
        }
    }

    /// Replace all orders of a unit with `order`.
    pub(crate) fn give_order(&mut self, id: ItemId, order: UnitOrder) {
        let work = order.work();
        if let Some(mut orders) = self.get_mut::<UnitOrders>(id) {
            orders.replace(order);
        }
        self.set_work(id, work);
    }

    /// Push a suborder on top of the current order.
    pub(crate) fn push_suborder(&mut self, id: ItemId, order: UnitOrder) {
        let work = order.work();
        if let Some(mut orders) = self.get_mut::<UnitOrders>(id) {
            orders.push_suborder(order);
        }
        self.set_work(id, work);
    }

    /// Finish the current (sub)order and continue with the next one.
    pub(crate) fn current_order_done(&mut self, id: ItemId) {
        let next = match self.get_mut::<UnitOrders>(id) {
            Some(mut orders) => orders.current_done(),
            None => Work::Idle,
        };
        self.set_velocity(id, Vec3::ZERO);
        self.set_work(id, next);
    }

    pub(crate) fn current_order(&self, id: ItemId) -> Option<UnitOrder> {
        self.get::<UnitOrders>(id).and_then(|o| o.current().copied())
    }

    pub(crate) fn set_velocity(&mut self, id: ItemId, v: Vec3) {
        if let Some(mut velocity) = self.get_mut::<Velocity>(id) {
            *velocity = Velocity::from_vec3(v);
        }
    }

    pub(crate) fn set_rotation(&mut self, id: ItemId, degrees: f32) {
        if let Some(mut rotation) = self.get_mut::<Rotation>(id) {
            rotation.0 = degrees;
        }
    }

    pub(crate) fn set_visible(&mut self, id: ItemId, visible: bool) {
        if let Some(mut v) = self.get_mut::<Visible>(id) {
            v.0 = visible;
        }
    }

    /// Move an item by `delta` and keep the grid in sync.
    pub(crate) fn move_item_by(&mut self, id: ItemId, delta: Vec3) {
        let Some(mut pos) = self.get_mut::<Position>(id) else {
            return;
        };
        let from = pos.to_vec3();
        pos.x += delta.x;
        pos.y += delta.y;
        pos.z += delta.z;
        let to = pos.to_vec3();
        self.refresh_grid(id);
        for observer in self.observers.iter_mut() {
            observer.item_moved(id, from, to);
        }
    }

    pub(crate) fn notify_unit_destroyed(&mut self, id: ItemId) {
        for observer in self.observers.iter_mut() {
            observer.unit_destroyed(id);
        }
    }

    pub(crate) fn move_center_to(&mut self, id: ItemId, center: Vec3) {
        if let Some(current) = self.center(id) {
            self.move_item_by(id, center - current);
        }
    }

    /// Re-enter an item into the grid from its components. Inactive shots
    /// are taken out.
    pub(crate) fn refresh_grid(&mut self, id: ItemId) {
        let Some(entity) = self.registry.entity(id) else {
            return;
        };
        let (Some(pos), Some(size), Some(info)) = (
            self.world.get::<Position>(entity),
            self.world.get::<ItemSize>(entity),
            self.world.get::<ItemTypeInfo>(entity),
        ) else {
            return;
        };
        if self.world.get::<Shot>(entity).is_some_and(|s| !s.active) {
            self.grid.remove(id);
            return;
        }
        let destroyed = self
            .world
            .get::<UnitStats>(entity)
            .is_some_and(UnitStats::is_destroyed);
        self.grid.insert(SpatialEntry {
            id,
            rect: Rect::of_item(pos, size),
            z: pos.z,
            depth: size.depth,
            is_unit: info.kind.is_unit(),
            destroyed,
        });
    }

    // ------------------------------------------------------------------
    // Placement and events
    // ------------------------------------------------------------------

    /// Whether a unit of `unit_type` fits with its top-left corner at
    /// `(x, y)`: on the map and on cells no other unit stands on.
    pub fn can_place_unit_at(&self, unit_type: u32, owner: PlayerId, x: f32, y: f32) -> bool {
        let Some(species) = self.species_of(owner) else {
            return false;
        };
        let Some(props) = species.unit(unit_type) else {
            return false;
        };
        self.map.rect_on_map(x, y, props.width, props.height)
            && !self
                .grid
                .cells_occupied(&Rect::new(x, y, props.width, props.height))
    }

    /// Deliver every due event to the canvas listener. Returns the delivered
    /// events so the host can react to them as well.
    pub fn process_events(&mut self) -> Vec<Event> {
        let due = self.events.take_due();
        for event in &due {
            self.listener.process_event(
                event,
                &mut self.players,
                &mut self.events,
                self.config.game_over_delay,
            );
        }
        due
    }

    pub(crate) fn queue_event(&mut self, event: Event) {
        self.events.queue_event(event);
    }
}

/// Unit stats at full health for `props`.
pub(crate) fn default_stats(props: &UnitProperties) -> UnitStats {
    UnitStats {
        health: props.health,
        max_health: props.health,
        shields: props.shields,
        max_shields: props.shields,
        armor: props.armor,
        sight_range: props.sight_range,
    }
}

fn unit_components(props: &UnitProperties) -> impl Bundle {
    (
        default_stats(props),
        UnitWork::new(Work::Idle),
        UnitOrders::new(),
        Weapons(
            props
                .weapons
                .iter()
                .map(|w| WeaponState {
                    weapon_id: w.id,
                    reload_left: 0,
                })
                .collect(),
        ),
        Construction::completed(),
        UnitPlugins::for_unit(props),
        DataHandlerId::default(),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::player::Player;
    use crate::species::{EffectProperties, WeaponProperties};
    use std::sync::Mutex;

    pub const BLUE: PlayerId = PlayerId(1);
    pub const RED: PlayerId = PlayerId(2);
    pub const NEUTRAL: PlayerId = PlayerId(3);

    pub const TANK: u32 = 1;
    pub const FACTORY: u32 = 2;
    pub const HARVESTER: u32 = 3;
    pub const MINE_FIELD: u32 = 4;
    pub const TURRET: u32 = 5;
    pub const BOMBER: u32 = 6;

    pub fn test_species() -> SpeciesTheme {
        let mut species = SpeciesTheme::new("test");
        species.insert(UnitProperties {
            type_id: TANK,
            name: "tank".into(),
            health: 100,
            armor: 10,
            speed: 0.5,
            rotation_speed: 45.0,
            exploding_damage: 30,
            exploding_damage_range: 2.0,
            exploding_fragment_count: 3,
            exploding_fragment_damage: 5,
            exploding_fragment_damage_range: 1.0,
            destroyed_effects: vec![1],
            weapons: vec![WeaponProperties {
                id: 1,
                damage: 20,
                range: 4.0,
                reload: 10,
                turret: false,
                ..WeaponProperties::default()
            }],
            ..UnitProperties::default()
        });
        species.insert(UnitProperties {
            type_id: FACTORY,
            name: "factory".into(),
            health: 500,
            width: 2.0,
            height: 2.0,
            is_mobile: false,
            construction_steps: 3,
            producible: vec![TANK],
            production_time: 4,
            ..UnitProperties::default()
        });
        species.insert(UnitProperties {
            type_id: HARVESTER,
            name: "harvester".into(),
            health: 80,
            speed: 0.5,
            harvester: Some(crate::species::HarvesterProperties {
                capacity: 10,
                rate: 5,
                range: 2.0,
            }),
            ..UnitProperties::default()
        });
        species.insert(UnitProperties {
            type_id: MINE_FIELD,
            name: "minerals".into(),
            health: 1000,
            is_mobile: false,
            ..UnitProperties::default()
        });
        species.insert(UnitProperties {
            type_id: TURRET,
            name: "turret".into(),
            health: 100,
            is_mobile: false,
            weapons: vec![WeaponProperties {
                id: 1,
                shot_type: ShotType::Rocket,
                damage: 40,
                damage_range: 1.0,
                full_damage_range: 0.5,
                range: 6.0,
                speed: 0.5,
                acceleration: 0.5,
                ..WeaponProperties::default()
            }],
            ..UnitProperties::default()
        });
        species.insert(UnitProperties {
            type_id: BOMBER,
            name: "bomber".into(),
            health: 60,
            weapons: vec![
                WeaponProperties {
                    id: 1,
                    shot_type: ShotType::Mine,
                    damage: 50,
                    damage_range: 1.0,
                    auto_use: false,
                    ..WeaponProperties::default()
                },
                WeaponProperties {
                    id: 2,
                    shot_type: ShotType::Bomb,
                    damage: 50,
                    damage_range: 1.0,
                    speed: 0.5,
                    acceleration: 0.5,
                    auto_use: false,
                    ..WeaponProperties::default()
                },
            ],
            ..UnitProperties::default()
        });
        species
    }

    pub fn test_canvas() -> Canvas {
        let species = Arc::new(test_species());
        let players = Players::new(vec![
            Player::new(BLUE, "blue", 0, species.clone()),
            Player::new(RED, "red", 1, species.clone()),
            Player::new(NEUTRAL, "neutral", 99, species),
        ]);
        let mut effects = EffectPropertiesTable::default();
        effects.insert(EffectProperties {
            id: 1,
            delay: 0.0,
            lifetime: Some(0.5),
        });
        Canvas::new(
            BosonMap::new(64, 64),
            players,
            effects,
            CanvasConfig::default(),
        )
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl CanvasObserver for Recorder {
        fn item_added(&mut self, id: ItemId, _kind: ItemKind) {
            self.0.lock().unwrap().push(format!("added {id}"));
        }
        fn item_removed(&mut self, id: ItemId) {
            self.0.lock().unwrap().push(format!("removed {id}"));
        }
        fn item_moved(&mut self, id: ItemId, _from: Vec3, _to: Vec3) {
            self.0.lock().unwrap().push(format!("moved {id}"));
        }
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let mut canvas = test_canvas();
        let mut last = 0;
        for i in 0..20 {
            let id = canvas
                .create_unit(BLUE, TANK, Position::new(i as f32, 1.0, 0.0))
                .unwrap();
            assert!(id.is_valid());
            assert!(id.0 > last);
            last = id.0;
        }
        canvas.delete_item(ItemId(last)).unwrap();
        let next = canvas
            .create_unit(BLUE, TANK, Position::new(30.0, 30.0, 0.0))
            .unwrap();
        assert!(next.0 > last, "deleted ids are never reused");
    }

    #[test]
    fn test_create_item_rejects_bad_input() {
        let mut canvas = test_canvas();
        assert_eq!(
            canvas.create_unit(BLUE, TANK, Position::new(-1.0, 3.0, 0.0)),
            Err(CanvasError::InvalidPosition {
                x: -1.0,
                y: 3.0,
                z: 0.0
            })
        );
        assert!(matches!(
            canvas.create_unit(BLUE, 99, Position::new(1.0, 1.0, 0.0)),
            Err(CanvasError::UnknownUnitType { unit_type: 99, .. })
        ));
        assert_eq!(
            canvas.create_unit(PlayerId(42), TANK, Position::new(1.0, 1.0, 0.0)),
            Err(CanvasError::UnknownPlayer(PlayerId(42)))
        );
        assert_eq!(canvas.item_count(), 0);
    }

    #[test]
    fn test_failed_init_rolls_back() {
        let mut canvas = test_canvas();
        // Rockets need a weapon; the tank's weapon 7 does not exist.
        let err = canvas
            .create_shot(BLUE, ShotType::Rocket, TANK, 7, Vec3::new(5.0, 5.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, CanvasError::InitFailed { .. }));
        assert_eq!(canvas.item_count(), 0);
        assert!(canvas.work_buckets().is_empty());
        assert!(canvas.grid().is_empty());
        let mut items = canvas.world.query::<&ItemId>();
        assert_eq!(items.iter(&canvas.world).count(), 0);
    }

    #[test]
    fn test_explicit_and_duplicate_ids() {
        let mut canvas = test_canvas();
        let pos = Position::new(1.0, 1.0, 0.0);
        let id = canvas
            .create_item(ItemKind::Unit, BLUE, ItemType::unit(TANK), pos, ItemId(50))
            .unwrap();
        assert_eq!(id, ItemId(50));
        assert_eq!(
            canvas.create_item(ItemKind::Unit, BLUE, ItemType::unit(TANK), pos, ItemId(50)),
            Err(CanvasError::DuplicateId(ItemId(50)))
        );
        let fresh = canvas.create_unit(BLUE, TANK, pos).unwrap();
        assert!(fresh.0 > 50);
    }

    #[test]
    fn test_new_unit_registration() {
        let mut canvas = test_canvas();
        let tank = canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        let factory = canvas
            .create_unit(BLUE, FACTORY, Position::new(10.0, 10.0, 0.0))
            .unwrap();

        let blue = canvas.players().get(BLUE).unwrap();
        assert_eq!(blue.mobiles_count(), 1);
        assert_eq!(blue.facilities_count(), 1);
        assert_eq!(canvas.work(tank), Some(Work::Idle));
        assert_eq!(canvas.work(factory), Some(Work::Constructed));
        assert_eq!(
            canvas.work_buckets().tag_of(factory),
            Some(WorkTag::Work(Work::Constructed))
        );
        assert!(canvas.get::<DataHandlerId>(tank).unwrap().0 > 0);
        assert!(canvas
            .grid()
            .cells_occupied(&Rect::new(10.5, 10.5, 1.0, 1.0)));
    }

    #[test]
    fn test_delete_clears_indexes_and_references() {
        let mut canvas = test_canvas();
        let a = canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        let b = canvas
            .create_unit(RED, TANK, Position::new(6.0, 5.0, 0.0))
            .unwrap();
        canvas.give_order(
            a,
            UnitOrder::Attack {
                target: b,
                can_move: true,
            },
        );

        assert_eq!(canvas.delete_items(&[b]), Ok(1));
        assert!(!canvas.contains(b));
        assert_eq!(canvas.work_buckets().tag_of(b), None);
        assert!(!canvas.grid().contains(b));
        assert_eq!(canvas.players().get(RED).unwrap().mobiles_count(), 0);
        assert_eq!(
            canvas.current_order(a).and_then(|o| o.target()),
            Some(ItemId::INVALID)
        );
        // Deleting again is a no-op.
        assert_eq!(canvas.delete_items(&[b]), Ok(0));
    }

    #[test]
    fn test_delete_refused_while_locked() {
        let mut canvas = test_canvas();
        let a = canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        canvas.lock.locked = true;
        assert_eq!(canvas.delete_item(a), Err(CanvasError::Locked));
        canvas.lock.locked = false;
        assert_eq!(canvas.delete_item(a), Ok(true));
    }

    #[test]
    fn test_creation_while_locked_is_deferred() {
        let mut canvas = test_canvas();
        canvas.lock.locked = true;
        let id = canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        assert!(canvas.contains(id));
        assert_eq!(canvas.work_buckets().tag_of(id), None);
        assert!(canvas.work_buckets().is_pending(id));
    }

    #[test]
    fn test_can_place_unit_at() {
        let mut canvas = test_canvas();
        assert!(canvas.can_place_unit_at(FACTORY, BLUE, 0.0, 0.0));
        assert!(!canvas.can_place_unit_at(FACTORY, BLUE, 63.0, 0.0));
        canvas
            .create_unit(BLUE, TANK, Position::new(1.0, 1.0, 0.0))
            .unwrap();
        assert!(!canvas.can_place_unit_at(FACTORY, BLUE, 0.0, 0.0));
        assert!(canvas.can_place_unit_at(FACTORY, BLUE, 2.0, 0.0));
        assert!(!canvas.can_place_unit_at(99, BLUE, 10.0, 10.0));
    }

    #[test]
    fn test_observers_notified() {
        let mut canvas = test_canvas();
        let log = Arc::new(Mutex::new(Vec::new()));
        canvas.add_observer(Box::new(Recorder(log.clone())));

        let id = canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        canvas.move_item_by(id, Vec3::new(1.0, 0.0, 0.0));
        canvas.delete_item(id).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                format!("added {id}"),
                format!("moved {id}"),
                format!("removed {id}")
            ]
        );
    }

    #[test]
    fn test_process_events_game_over() {
        let mut canvas = test_canvas();
        canvas
            .create_unit(BLUE, TANK, Position::new(5.0, 5.0, 0.0))
            .unwrap();
        canvas.queue_event(Event::new("AllUnitsDestroyed").with_player(RED));

        let delivered = canvas.process_events();
        assert_eq!(delivered.len(), 1);
        let delivered = canvas.process_events();
        let names: Vec<&str> = delivered.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["PlayerWon", "PlayerLost"]);
        assert!(canvas.players().get(BLUE).unwrap().has_won);
        assert!(canvas.players().get(RED).unwrap().has_lost);
        assert_eq!(canvas.events().count("GameOver"), 1);
    }
}
