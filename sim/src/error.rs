//! Error types for the canvas and the savegame codec.

use crate::components::ItemId;
use crate::player::PlayerId;
use thiserror::Error;

/// Errors raised by the item factory, the order API and other canvas mutations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CanvasError {
    #[error("invalid position ({x}, {y}, {z}): outside of the map")]
    InvalidPosition { x: f32, y: f32, z: f32 },
    #[error("unit type {unit_type} is unknown to the species of player {player}")]
    UnknownUnitType { unit_type: u32, player: PlayerId },
    #[error("weapon {weapon} of unit type {unit_type} is unknown")]
    UnknownWeapon { unit_type: u32, weapon: u32 },
    #[error("no such player {0}")]
    UnknownPlayer(PlayerId),
    #[error("item id {0} is already in use")]
    DuplicateId(ItemId),
    #[error("item {id} failed to initialize: {reason}")]
    InitFailed { id: ItemId, reason: &'static str },
    #[error("canvas is locked by a running advance call")]
    Locked,
    #[error("item ids exhausted")]
    IdsExhausted,
    #[error("item {0} is not a unit")]
    NotAUnit(ItemId),
    #[error("no such item {0}")]
    NoSuchItem(ItemId),
    #[error("unknown shot type {0}")]
    UnknownShotType(u32),
    #[error("unit {id} can't do that: {reason}")]
    InvalidOrder { id: ItemId, reason: &'static str },
}

/// Errors raised while loading a savegame. Any of them aborts the whole load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed xml: {0}")]
    Xml(String),
    #[error("missing <{0}> root element")]
    MissingRoot(&'static str),
    #[error("missing attribute {attribute} on <{element}>")]
    MissingAttribute { element: String, attribute: String },
    #[error("invalid value {value:?} for attribute {attribute} on <{element}>")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },
    #[error("unknown rtti {0}")]
    UnknownRtti(u32),
    #[error("unknown shot type {0}")]
    UnknownShotType(u32),
    #[error("unknown effect properties id {0}")]
    UnknownEffectProperties(u32),
    #[error("owner item {0} of effect could not be found")]
    UnresolvedEffectOwner(ItemId),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// Errors raised while writing a savegame.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("xml write failed: {0}")]
    Xml(String),
    #[error("saved document is not valid utf-8")]
    Encoding,
}
