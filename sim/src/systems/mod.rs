//! ECS systems of the item-advance phase.
//!
//! These run once per tick, before any work advance function, as one bevy
//! [`Schedule`](bevy_ecs::schedule::Schedule) owned by the canvas. They may
//! change an item's internal state but never its position, and they never
//! create or delete items.

pub mod reload;

pub use reload::*;
