//! Canonical set of live items and the item id counter.

use crate::components::ItemId;
use crate::error::CanvasError;
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;
use tracing::error;

/// Maps live item ids to their entities, in id order.
///
/// Id order doubles as the deterministic iteration order of the "animated
/// set" for every phase that walks all items.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    last_id: u32,
    items: BTreeMap<ItemId, Entity>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused id. Strictly increasing, starts at 1, never returns 0.
    /// Fails once `u32::MAX` has been handed out; ids never wrap.
    pub fn next_item_id(&mut self) -> Result<ItemId, CanvasError> {
        let Some(next) = self.last_id.checked_add(1) else {
            error!(last_id = self.last_id, "item id counter exhausted");
            return Err(CanvasError::IdsExhausted);
        };
        self.last_id = next;
        Ok(ItemId(next))
    }

    /// Last id handed out (or restored from a savegame).
    pub fn last_id(&self) -> u32 {
        self.last_id
    }

    /// Make sure later calls to [`next_item_id`](Self::next_item_id) return
    /// ids above `id`. Used when items arrive with explicit ids.
    pub fn reserve(&mut self, id: ItemId) {
        self.last_id = self.last_id.max(id.0);
    }

    /// Resolve the id a new item gets: a fresh one for `0`, `id` otherwise.
    pub fn claim(&mut self, id: ItemId) -> Result<ItemId, CanvasError> {
        if !id.is_valid() {
            return self.next_item_id();
        }
        if self.items.contains_key(&id) {
            return Err(CanvasError::DuplicateId(id));
        }
        self.reserve(id);
        Ok(id)
    }

    pub fn insert(&mut self, id: ItemId, entity: Entity) {
        self.items.insert(id, entity);
    }

    pub fn remove(&mut self, id: ItemId) -> Option<Entity> {
        self.items.remove(&id)
    }

    pub fn entity(&self, id: ItemId) -> Option<Entity> {
        self.items.get(&id).copied()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    /// Snapshot of all live ids in ascending order.
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, Entity)> + '_ {
        self.items.iter().map(|(id, e)| (*id, *e))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase_from_one() {
        let mut registry = ItemRegistry::new();
        let ids: Vec<ItemId> = (0..1000).map(|_| registry.next_item_id().unwrap()).collect();

        assert_eq!(ids[0], ItemId(1));
        assert!(ids.iter().all(|id| id.is_valid()));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_claim_explicit_id_bumps_counter() {
        let mut registry = ItemRegistry::new();
        let id = registry.claim(ItemId(50)).unwrap();
        registry.insert(id, Entity::from_raw(1));

        assert_eq!(registry.next_item_id(), Ok(ItemId(51)));
        assert_eq!(
            registry.claim(ItemId(50)),
            Err(CanvasError::DuplicateId(ItemId(50)))
        );
    }

    #[test]
    fn test_claim_zero_assigns_fresh_id() {
        let mut registry = ItemRegistry::new();
        registry.reserve(ItemId(7));
        assert_eq!(registry.claim(ItemId::INVALID).unwrap(), ItemId(8));
    }

    #[test]
    fn test_exhausted_counter_errors_instead_of_repeating() {
        let mut registry = ItemRegistry::new();
        registry.reserve(ItemId(u32::MAX - 1));
        assert_eq!(registry.next_item_id(), Ok(ItemId(u32::MAX)));
        assert_eq!(registry.next_item_id(), Err(CanvasError::IdsExhausted));
        assert_eq!(registry.claim(ItemId::INVALID), Err(CanvasError::IdsExhausted));
        assert_eq!(registry.last_id(), u32::MAX);
    }
}
