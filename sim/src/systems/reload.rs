//! Weapon reload: counts every mounted weapon's reload timer down once per
//! tick.

use crate::components::*;
use bevy_ecs::prelude::*;

/// Phase 1 system. Never moves an item and never adds or removes one.
pub fn weapon_reload_system(mut query: Query<&mut Weapons>) {
    for mut weapons in query.iter_mut() {
        if weapons.0.iter().all(WeaponState::reloaded) {
            continue;
        }
        for weapon in weapons.0.iter_mut() {
            weapon.reload_left = weapon.reload_left.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_counts_down_to_zero() {
        let mut world = World::new();
        let entity = world
            .spawn(Weapons(vec![
                WeaponState {
                    weapon_id: 1,
                    reload_left: 2,
                },
                WeaponState {
                    weapon_id: 2,
                    reload_left: 0,
                },
            ]))
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems(weapon_reload_system);
        for _ in 0..3 {
            schedule.run(&mut world);
        }

        let weapons = world.get::<Weapons>(entity).unwrap();
        assert!(weapons.0.iter().all(WeaponState::reloaded));
    }
}
