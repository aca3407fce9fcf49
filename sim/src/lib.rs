//! Boson - Canvas Simulation Core
//!
//! The deterministic heart of a real-time strategy game: the canvas owns
//! every unit and shot, advances them once per tick through work buckets,
//! resolves damage and destruction, and saves or loads itself as XML.
//! Uses `bevy_ecs` for item storage and the per-tick item systems.

pub mod advance;
pub mod canvas;
pub mod commands;
pub mod components;
pub mod config;
pub mod damage;
pub mod data_handler;
pub mod destruction;
pub mod effects;
pub mod error;
pub mod events;
pub mod item_type;
pub mod map;
pub mod orders;
pub mod persistence;
pub mod player;
pub mod plugins;
pub mod profiler;
pub mod registry;
pub mod shots;
pub mod snapshot;
pub mod spatial;
pub mod species;
pub mod systems;
pub mod units;
pub mod work;

pub use canvas::Canvas;
pub use components::*;
pub use config::CanvasConfig;
pub use data_handler::DataHandler;
pub use effects::{Effect, EffectList};
pub use error::{CanvasError, LoadError, SaveError};
pub use events::{CanvasEventListener, Condition, Event};
pub use item_type::{ItemKind, ItemType, ShotType};
pub use map::BosonMap;
pub use persistence::XmlElement;
pub use player::{Player, PlayerId, Players};
pub use profiler::{Profiler, SectionStats};
pub use shots::{Shot, ShotMotion};
pub use snapshot::{CanvasSnapshot, ItemSnapshot};
pub use spatial::{SpatialEntry, SpatialGrid};
pub use species::{EffectProperties, EffectPropertiesTable, SpeciesTheme, UnitProperties, WeaponProperties};
pub use work::{Work, WorkTag};
