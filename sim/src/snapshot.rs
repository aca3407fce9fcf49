//! Serializable, render-facing view of the canvas.

use crate::canvas::Canvas;
use crate::components::*;
use crate::config::SimTick;
use crate::item_type::ItemKind;
use crate::work::Work;
use serde::{Deserialize, Serialize};

/// One item as a renderer needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: u32,
    pub kind: ItemKind,
    pub type_id: u32,
    pub owner: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation: f32,
    /// `None` for shots.
    pub health: Option<u32>,
    pub work: Option<Work>,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    /// Last advance tick.
    pub tick: u64,
    pub items: Vec<ItemSnapshot>,
    pub effects: usize,
}

impl CanvasSnapshot {
    pub fn from_canvas(canvas: &Canvas) -> Self {
        let items = canvas
            .item_ids()
            .into_iter()
            .filter_map(|id| item_snapshot(canvas, id))
            .collect();
        Self {
            tick: canvas.world.get_resource::<SimTick>().map_or(0, |t| t.0),
            items,
            effects: canvas.effects().len(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn item_snapshot(canvas: &Canvas, id: ItemId) -> Option<ItemSnapshot> {
    let info = canvas.get::<ItemTypeInfo>(id)?;
    let pos = canvas.position(id)?;
    Some(ItemSnapshot {
        id: id.0,
        kind: info.kind,
        type_id: info.item_type.type_id,
        owner: canvas.owner_of(id)?.0,
        x: pos.x,
        y: pos.y,
        z: pos.z,
        rotation: canvas.get::<Rotation>(id).map_or(0.0, |r| r.0),
        health: canvas.get::<UnitStats>(id).map(|s| s.health),
        work: canvas.work(id),
        visible: canvas.get::<Visible>(id).map_or(true, |v| v.0),
    })
}

impl Canvas {
    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot::from_canvas(self)
    }
}
