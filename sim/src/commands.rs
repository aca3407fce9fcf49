//! Order API for the host, and weapon firing.
//!
//! Every order call validates the unit first and fails with a
//! [`CanvasError`] without touching anything when the unit can't take it.
//! Accepted orders replace whatever the unit was doing.

use crate::canvas::Canvas;
use crate::components::*;
use crate::error::CanvasError;
use crate::item_type::ShotType;
use crate::orders::{UnitOrder, UnitOrders};
use crate::plugins::UnitPlugins;
use crate::shots::{Shot, ShotMotion};
use crate::species::UnitProperties;
use crate::work::Work;
use std::sync::Arc;
use tracing::{debug, trace};

impl Canvas {
    /// Properties of a unit that can take orders: alive and fully built.
    fn commandable(&self, id: ItemId) -> Result<Arc<UnitProperties>, CanvasError> {
        if !self.contains(id) {
            return Err(CanvasError::NoSuchItem(id));
        }
        let props = self.unit_properties(id).ok_or(CanvasError::NotAUnit(id))?;
        if !self.is_alive_unit(id) || self.is_destroyed(id) {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "unit is destroyed",
            });
        }
        if self.get::<Construction>(id).is_some_and(|c| !c.is_complete()) {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "unit is under construction",
            });
        }
        Ok(props)
    }

    fn mobile(&self, id: ItemId) -> Result<Arc<UnitProperties>, CanvasError> {
        let props = self.commandable(id)?;
        if !props.is_mobile {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "facilities can't move",
            });
        }
        Ok(props)
    }

    fn live_target(&self, target: ItemId) -> Result<(), CanvasError> {
        if !self.contains(target) {
            return Err(CanvasError::NoSuchItem(target));
        }
        if self.kind_of(target).is_some_and(|k| !k.is_unit()) {
            return Err(CanvasError::NotAUnit(target));
        }
        if !self.is_alive_unit(target) {
            return Err(CanvasError::InvalidOrder {
                id: target,
                reason: "target is destroyed",
            });
        }
        Ok(())
    }

    /// Move the unit's center to `(x, y)`.
    pub fn order_move(&mut self, id: ItemId, x: f32, y: f32) -> Result<(), CanvasError> {
        self.mobile(id)?;
        if !self.map.on_map(x, y) {
            return Err(CanvasError::InvalidPosition { x, y, z: 0.0 });
        }
        debug!(item = %id, x, y, "move order");
        self.give_order(id, UnitOrder::Move { x, y });
        Ok(())
    }

    /// Attack `target`. Mobile units chase it when it is out of range.
    pub fn order_attack(&mut self, id: ItemId, target: ItemId) -> Result<(), CanvasError> {
        let props = self.commandable(id)?;
        self.live_target(target)?;
        if target == id {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "unit can't attack itself",
            });
        }
        if !props.can_shoot() {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "unit has no weapons",
            });
        }
        debug!(item = %id, target = %target, "attack order");
        self.give_order(
            id,
            UnitOrder::Attack {
                target,
                can_move: props.is_mobile,
            },
        );
        Ok(())
    }

    pub fn order_follow(
        &mut self,
        id: ItemId,
        target: ItemId,
        distance: f32,
    ) -> Result<(), CanvasError> {
        self.mobile(id)?;
        self.live_target(target)?;
        if target == id {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "unit can't follow itself",
            });
        }
        self.give_order(
            id,
            UnitOrder::Follow {
                target,
                distance: distance.max(0.0),
            },
        );
        Ok(())
    }

    /// Turn to `direction` degrees (0 = north, clockwise).
    pub fn order_turn(&mut self, id: ItemId, direction: f32) -> Result<(), CanvasError> {
        self.mobile(id)?;
        self.give_order(
            id,
            UnitOrder::Turn {
                direction: direction.rem_euclid(360.0),
            },
        );
        Ok(())
    }

    /// Queue a `unit_type` in a factory. A factory that is already producing
    /// just gets a longer queue.
    pub fn order_produce(&mut self, factory: ItemId, unit_type: u32) -> Result<(), CanvasError> {
        let props = self.commandable(factory)?;
        if !props.producible.contains(&unit_type) {
            return Err(CanvasError::InvalidOrder {
                id: factory,
                reason: "unit type can't be produced here",
            });
        }
        {
            let mut plugins = self.get_mut::<UnitPlugins>(factory);
            let Some(production) = plugins.as_mut().and_then(|p| p.production.as_mut()) else {
                return Err(CanvasError::InvalidOrder {
                    id: factory,
                    reason: "unit has no production plugin",
                });
            };
            production.add(unit_type);
        }
        if self.current_order(factory) != Some(UnitOrder::Produce) {
            self.give_order(factory, UnitOrder::Produce);
        }
        debug!(item = %factory, unit_type, "production queued");
        Ok(())
    }

    /// Shuttle minerals from `mine` to `refinery`.
    pub fn order_harvest(
        &mut self,
        id: ItemId,
        mine: ItemId,
        refinery: ItemId,
    ) -> Result<(), CanvasError> {
        self.mobile(id)?;
        if !self.contains(mine) {
            return Err(CanvasError::NoSuchItem(mine));
        }
        self.live_target(refinery)?;
        {
            let mut plugins = self.get_mut::<UnitPlugins>(id);
            let Some(harvester) = plugins.as_mut().and_then(|p| p.harvester.as_mut()) else {
                return Err(CanvasError::InvalidOrder {
                    id,
                    reason: "unit has no harvester plugin",
                });
            };
            harvester.mine = Some(mine);
            harvester.refinery = Some(refinery);
        }
        debug!(item = %id, mine = %mine, refinery = %refinery, "harvest order");
        self.give_order(id, UnitOrder::Harvest);
        Ok(())
    }

    /// Drop all orders and stand still.
    pub fn order_stop(&mut self, id: ItemId) -> Result<(), CanvasError> {
        self.commandable(id)?;
        if let Some(mut orders) = self.get_mut::<UnitOrders>(id) {
            orders.clear();
        }
        self.set_velocity(id, Vec3::ZERO);
        self.set_work(id, Work::Idle);
        Ok(())
    }

    pub fn lay_mine(&mut self, id: ItemId, weapon_id: u32) -> Result<ItemId, CanvasError> {
        self.fire_typed(id, weapon_id, ShotType::Mine)
    }

    pub fn drop_bomb(&mut self, id: ItemId, weapon_id: u32) -> Result<ItemId, CanvasError> {
        self.fire_typed(id, weapon_id, ShotType::Bomb)
    }

    fn fire_typed(
        &mut self,
        id: ItemId,
        weapon_id: u32,
        shot_type: ShotType,
    ) -> Result<ItemId, CanvasError> {
        let props = self.commandable(id)?;
        let weapon = props
            .weapon(weapon_id)
            .ok_or(CanvasError::UnknownWeapon {
                unit_type: props.type_id,
                weapon: weapon_id,
            })?;
        if weapon.shot_type != shot_type {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "weapon fires a different shot type",
            });
        }
        self.fire_weapon(id, weapon_id, None)
    }

    /// Fire one weapon of a unit. Bullets hit at once; every other shot is
    /// launched and flies from the next tick on. Mines and bombs don't need a
    /// target.
    pub fn fire_weapon(
        &mut self,
        id: ItemId,
        weapon_id: u32,
        target: Option<ItemId>,
    ) -> Result<ItemId, CanvasError> {
        let props = self.unit_properties(id).ok_or(CanvasError::NotAUnit(id))?;
        let weapon = props
            .weapon(weapon_id)
            .ok_or(CanvasError::UnknownWeapon {
                unit_type: props.type_id,
                weapon: weapon_id,
            })?;
        let reloaded = self
            .get::<Weapons>(id)
            .and_then(|w| w.0.iter().find(|s| s.weapon_id == weapon_id))
            .is_some_and(WeaponState::reloaded);
        if !reloaded {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "weapon is reloading",
            });
        }
        let owner = self.owner_of(id).ok_or(CanvasError::NoSuchItem(id))?;
        let center = self.center(id).ok_or(CanvasError::NoSuchItem(id))?;
        let target_center = target.and_then(|t| self.center(t));
        let needs_target = matches!(
            weapon.shot_type,
            ShotType::Bullet | ShotType::Rocket | ShotType::Missile
        );
        if needs_target && target_center.is_none() {
            return Err(CanvasError::InvalidOrder {
                id,
                reason: "weapon needs a target",
            });
        }

        let start = match weapon.shot_type {
            // Dropped from the top of the unit.
            ShotType::Bomb => Vec3::new(center.x, center.y, center.z + props.depth),
            _ => center,
        };
        let horizontal = self
            .get::<Velocity>(id)
            .map_or((0.0, 0.0), |v| (v.x, v.y));
        let shot = self.create_shot(owner, weapon.shot_type, props.type_id, weapon_id, start)?;

        let heading = {
            let Some(mut state) = self.get_mut::<Shot>(shot) else {
                return Err(CanvasError::InitFailed {
                    id: shot,
                    reason: "shot has no state",
                });
            };
            match (&mut state.motion, target, target_center) {
                (ShotMotion::Bullet { target }, _, Some(tc)) => *target = tc,
                (ShotMotion::Rocket(rocket), _, Some(tc)) => rocket.launch(start, tc),
                (ShotMotion::Missile(missile), Some(t), Some(tc)) => {
                    missile.launch(start, t, tc, weapon.start_angle)
                }
                (ShotMotion::Bomb(bomb), _, _) => bomb.horizontal = horizontal,
                _ => {}
            }
            state.heading()
        };
        let rotation = heading.unwrap_or_else(|| self.get::<Rotation>(id).map_or(0.0, |r| r.0));
        self.set_rotation(shot, rotation);

        if let Some(mut weapons) = self.get_mut::<Weapons>(id) {
            if let Some(state) = weapons.0.iter_mut().find(|s| s.weapon_id == weapon_id) {
                state.reload_left = weapon.reload;
            }
        }
        if let Some(player) = self.players.get_mut(owner) {
            player.statistics_mut().shots_fired += 1;
        }
        trace!(item = %id, weapon = weapon_id, shot = %shot, shot_type = ?weapon.shot_type, "weapon fired");

        if weapon.shot_type == ShotType::Bullet {
            self.explode_shot(shot);
        }
        Ok(shot)
    }
}
