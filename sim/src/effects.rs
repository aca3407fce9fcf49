//! Visual effects (smoke, fire, explosions) tracked by the canvas.
//!
//! Effects are not gameplay-authoritative. They only exist so a renderer
//! knows what to show and so savegames restore them. An effect may belong to
//! an item; the link is a weak [`ItemId`] that the canvas clears when the
//! item is destroyed.

use crate::components::{ItemId, Vec3};
use crate::species::EffectProperties;

#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub properties_id: u32,
    pub owner: Option<ItemId>,
    pub position: Vec3,
    pub rotation: f32,
    active: bool,
    started: bool,
    /// Seconds left before the effect starts.
    delay: f32,
    lifetime: Option<f32>,
    /// Ticks since the effect started.
    updates: u32,
    time_per_update: f32,
}

impl Effect {
    pub fn new(props: &EffectProperties, position: Vec3, owner: Option<ItemId>) -> Self {
        Self {
            properties_id: props.id,
            owner,
            position,
            rotation: 0.0,
            active: true,
            started: false,
            delay: props.delay,
            lifetime: props.lifetime,
            updates: 0,
            time_per_update: 0.05,
        }
    }

    /// Restore the saved state of an effect.
    pub fn restore(&mut self, active: bool, started: bool, delay: f32) {
        self.active = active;
        self.started = started;
        self.delay = delay;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn delay(&self) -> f32 {
        self.delay
    }

    pub fn updates(&self) -> u32 {
        self.updates
    }

    /// Count down the start delay by `delta` seconds; starts the effect once
    /// the delay is used up.
    pub fn update(&mut self, delta: f32) {
        if self.started {
            return;
        }
        self.time_per_update = delta;
        self.delay -= delta;
        if self.delay <= 0.0 {
            self.delay = 0.0;
            self.started = true;
        }
    }

    /// Record one tick of a running effect. Deactivates it once its lifetime
    /// is over.
    pub fn mark_update(&mut self) {
        self.updates += 1;
        if let Some(lifetime) = self.lifetime {
            if self.updates as f32 * self.time_per_update >= lifetime {
                self.active = false;
            }
        }
    }

    /// Stop the effect; it is dropped on the next aging pass.
    pub fn make_obsolete(&mut self) {
        self.active = false;
    }
}

/// All effects on the canvas, in creation order.
#[derive(Debug, Default)]
pub struct EffectList {
    effects: Vec<Effect>,
}

impl EffectList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// One aging step: not-started effects count down their delay by
    /// `delta`, running ones are marked updated, inactive ones are dropped.
    /// Returns the number of dropped effects.
    pub fn advance(&mut self, delta: f32) -> usize {
        for effect in self.effects.iter_mut().filter(|e| e.is_active()) {
            if effect.has_started() {
                effect.mark_update();
            } else {
                effect.update(delta);
            }
        }
        let before = self.effects.len();
        self.effects.retain(Effect::is_active);
        before - self.effects.len()
    }

    /// Make every effect owned by `owner` obsolete and detach it.
    pub fn detach_owner(&mut self, owner: ItemId) -> usize {
        let mut count = 0;
        for effect in self.effects.iter_mut().filter(|e| e.owner == Some(owner)) {
            effect.make_obsolete();
            effect.owner = None;
            count += 1;
        }
        count
    }

    /// Drop the back-reference to a deleted item without stopping the effect.
    pub fn forget_owner(&mut self, owner: ItemId) {
        for effect in self.effects.iter_mut().filter(|e| e.owner == Some(owner)) {
            effect.owner = None;
        }
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(delay: f32, lifetime: Option<f32>) -> EffectProperties {
        EffectProperties {
            id: 1,
            delay,
            lifetime,
        }
    }

    #[test]
    fn test_delay_then_start() {
        let mut list = EffectList::new();
        list.add(Effect::new(&props(0.1, None), Vec3::ZERO, None));

        list.advance(0.05);
        assert!(!list.iter().next().unwrap().has_started());
        list.advance(0.05);
        assert!(list.iter().next().unwrap().has_started());

        // Started effects are only marked.
        list.advance(0.05);
        assert_eq!(list.iter().next().unwrap().updates(), 1);
    }

    #[test]
    fn test_lifetime_expires() {
        let mut list = EffectList::new();
        list.add(Effect::new(&props(0.0, Some(0.1)), Vec3::ZERO, None));

        assert_eq!(list.advance(0.05), 0); // starts
        assert_eq!(list.advance(0.05), 0); // 1 update
        assert_eq!(list.advance(0.05), 1); // 2 updates = 0.1s, dropped
        assert!(list.is_empty());
    }

    #[test]
    fn test_detach_owner_obsoletes() {
        let mut list = EffectList::new();
        list.add(Effect::new(&props(0.0, None), Vec3::ZERO, Some(ItemId(5))));
        list.add(Effect::new(&props(0.0, None), Vec3::ZERO, Some(ItemId(6))));

        assert_eq!(list.detach_owner(ItemId(5)), 1);
        list.advance(0.05);
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().owner, Some(ItemId(6)));
    }
}
