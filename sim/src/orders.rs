//! Unit orders.
//!
//! A unit works on one order at a time: the innermost suborder if there is
//! one, otherwise the front of its top-level queue. Suborders are pushed by
//! the advance functions themselves (an attack that first has to move into
//! range, a turn before firing) and are always finished before the order
//! that pushed them continues.

use crate::components::ItemId;
use crate::work::Work;
use bevy_ecs::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitOrder {
    /// Move the unit's center to a point.
    Move { x: f32, y: f32 },
    /// Move until the target is within `range`.
    MoveToUnit { target: ItemId, range: f32 },
    /// `can_move` allows chasing a target that is out of range.
    Attack { target: ItemId, can_move: bool },
    Follow { target: ItemId, distance: f32 },
    /// Turn to a heading in degrees.
    Turn { direction: f32 },
    TurnToUnit { target: ItemId },
    Produce,
    Harvest,
}

impl UnitOrder {
    /// Work a unit does while executing this order.
    pub fn work(&self) -> Work {
        match self {
            UnitOrder::Move { .. } | UnitOrder::MoveToUnit { .. } => Work::Move,
            UnitOrder::Attack { .. } => Work::Attack,
            UnitOrder::Follow { .. } => Work::Follow,
            UnitOrder::Turn { .. } | UnitOrder::TurnToUnit { .. } => Work::Turn,
            UnitOrder::Produce | UnitOrder::Harvest => Work::Plugin,
        }
    }

    pub fn target(&self) -> Option<ItemId> {
        match *self {
            UnitOrder::MoveToUnit { target, .. }
            | UnitOrder::Attack { target, .. }
            | UnitOrder::Follow { target, .. }
            | UnitOrder::TurnToUnit { target } => Some(target),
            _ => None,
        }
    }

    fn target_mut(&mut self) -> Option<&mut ItemId> {
        match self {
            UnitOrder::MoveToUnit { target, .. }
            | UnitOrder::Attack { target, .. }
            | UnitOrder::Follow { target, .. }
            | UnitOrder::TurnToUnit { target } => Some(target),
            _ => None,
        }
    }
}

#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct UnitOrders {
    queue: VecDeque<UnitOrder>,
    suborders: Vec<UnitOrder>,
}

impl UnitOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order currently executed.
    pub fn current(&self) -> Option<&UnitOrder> {
        self.suborders.last().or_else(|| self.queue.front())
    }

    pub fn current_mut(&mut self) -> Option<&mut UnitOrder> {
        match self.suborders.last_mut() {
            Some(order) => Some(order),
            None => self.queue.front_mut(),
        }
    }

    /// Work that matches the current order; `Idle` without orders.
    pub fn current_work(&self) -> Work {
        self.current().map_or(Work::Idle, UnitOrder::work)
    }

    /// Drop everything and start `order`.
    pub fn replace(&mut self, order: UnitOrder) {
        self.clear();
        self.queue.push_back(order);
    }

    /// Append a top-level order after the queued ones.
    pub fn enqueue(&mut self, order: UnitOrder) {
        self.queue.push_back(order);
    }

    pub fn push_suborder(&mut self, order: UnitOrder) {
        self.suborders.push(order);
    }

    /// Finish the current order. Returns the work of the next one.
    pub fn current_done(&mut self) -> Work {
        if self.suborders.pop().is_none() {
            self.queue.pop_front();
        }
        self.current_work()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.suborders.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.suborders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len() + self.suborders.len()
    }

    /// Invalidate every reference to a removed item. The orders stay and
    /// finish on their next advance since their target is gone.
    pub fn forget_item(&mut self, id: ItemId) -> bool {
        let mut changed = false;
        for order in self.queue.iter_mut().chain(self.suborders.iter_mut()) {
            if let Some(target) = order.target_mut() {
                if *target == id {
                    *target = ItemId::INVALID;
                    changed = true;
                }
            }
        }
        changed
    }
}
