//! Unit destruction: wreck, explosion, fragments and the events that go with
//! them.
//!
//! A destroyed unit is never deleted here. It becomes a wreck in the
//! `Destroyed` work and waits in the destroyed set until the maintenance pass
//! removes it.

use crate::canvas::Canvas;
use crate::components::*;
use crate::events::Event;
use crate::item_type::ShotType;
use crate::orders::UnitOrders;
use crate::shots::{Shot, FRAGMENT_START_HEIGHT};
use crate::work::Work;
use tracing::{debug, warn};

impl Canvas {
    /// Turn a unit into a wreck. Calling it again for the same unit does
    /// nothing.
    pub fn destroy_unit(&mut self, id: ItemId) {
        if self.destroyed.contains_key(&id) {
            return;
        }
        let (Some(props), Some(owner)) = (self.unit_properties(id), self.owner_of(id)) else {
            warn!(item = %id, "destroy_unit on an item that is not a unit");
            return;
        };
        self.destroyed.insert(id, 0);

        if let Some(mut orders) = self.get_mut::<UnitOrders>(id) {
            orders.clear();
        }
        self.set_velocity(id, Vec3::ZERO);
        let detached = self.effects.detach_owner(id);

        self.remove_unit(id);

        let Some(center) = self.center(id) else {
            return;
        };
        self.spawn_effects(&props.destroyed_effects, center, None);

        if props.exploding_damage > 0 {
            let delay = self.config.explosion_delay;
            match self.create_shot(owner, ShotType::Explosion, 0, 0, center) {
                Ok(shot) => {
                    if let Some(mut state) = self.get_mut::<Shot>(shot) {
                        *state = Shot::explosion(
                            props.exploding_damage,
                            props.exploding_damage_range,
                            0.0,
                            delay,
                        );
                    }
                }
                Err(err) => warn!(item = %id, %err, "wreck explosion not created"),
            }
        }

        let fragment_center = Vec3::new(center.x, center.y, center.z + FRAGMENT_START_HEIGHT);
        for _ in 0..props.exploding_fragment_count {
            let fragment = Shot::fragment(
                &mut self.rng,
                props.type_id,
                props.exploding_fragment_damage,
                props.exploding_fragment_damage_range,
            );
            match self.create_shot(owner, ShotType::Fragment, 0, 0, fragment_center) {
                Ok(shot) => {
                    if let Some(mut state) = self.get_mut::<Shot>(shot) {
                        *state = fragment;
                    }
                }
                Err(err) => warn!(item = %id, %err, "fragment not created"),
            }
        }

        if props.remove_wreckage_immediately {
            self.set_visible(id, false);
        }

        self.queue_event(
            Event::new("UnitWithTypeDestroyed")
                .with_data1(props.type_id.to_string())
                .with_unit(id)
                .with_player(owner),
        );
        if !self.players.is_neutral(owner) {
            if let Some(player) = self.players.get(owner) {
                let (mobiles, facilities, any) =
                    (player.mobiles_count(), player.facilities_count(), player.has_units());
                if mobiles == 0 {
                    self.queue_event(Event::new("AllMobileUnitsDestroyed").with_player(owner));
                }
                if facilities == 0 {
                    self.queue_event(Event::new("AllFacilitiesDestroyed").with_player(owner));
                }
                if !any {
                    self.queue_event(Event::new("AllUnitsDestroyed").with_player(owner));
                }
            }
        }
        debug!(item = %id, player = %owner, detached, "unit destroyed");
    }

    /// Take a unit out of play without deleting it: health 0, `Destroyed`
    /// work and gone from its owner's unit list.
    pub(crate) fn remove_unit(&mut self, id: ItemId) {
        if let Some(mut stats) = self.get_mut::<UnitStats>(id) {
            stats.health = 0;
        }
        self.set_work(id, Work::Destroyed);
        let mobile = self.unit_properties(id).map_or(true, |p| p.is_mobile);
        if let Some(owner) = self.owner_of(id) {
            if let Some(player) = self.players.get_mut(owner) {
                player.unit_destroyed(id, mobile);
            }
        }
        self.grid.mark_destroyed(id);
        self.notify_unit_destroyed(id);
    }
}
