//! Unit work states, the per-unit advance slots and the work buckets.
//!
//! The scheduler does not iterate items directly. It walks [`WorkBuckets`]
//! in tag order and applies each bucket's cadence. Bucket membership only
//! changes in two places: the factory/delete paths and the reclassification
//! phase that drains the pending queue once per tick. Everything else queues.

use crate::components::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What a unit is currently doing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Work {
    #[default]
    Idle,
    Move,
    Attack,
    Constructed,
    Destroyed,
    Follow,
    Plugin,
    Turn,
    None,
}

impl Work {
    pub const ALL: [Work; 9] = [
        Work::Idle,
        Work::Move,
        Work::Attack,
        Work::Constructed,
        Work::Destroyed,
        Work::Follow,
        Work::Plugin,
        Work::Turn,
        Work::None,
    ];

    /// Savegame code. Codes are append-only, old savegames reference them.
    pub fn code(self) -> u32 {
        match self {
            Work::Idle => 0,
            Work::Move => 2,
            Work::Attack => 4,
            Work::Constructed => 5,
            Work::Destroyed => 6,
            Work::Follow => 8,
            Work::Plugin => 9,
            Work::Turn => 10,
            Work::None => 11,
        }
    }

    pub fn from_code(code: u32) -> Option<Work> {
        Work::ALL.iter().copied().find(|w| w.code() == code)
    }

    /// Profiler section name of the advance function for this work.
    pub fn profile_section(self) -> &'static str {
        match self {
            Work::Idle => "advance_idle",
            Work::Move => "advance_move",
            Work::Attack => "advance_attack",
            Work::Constructed => "advance_construction",
            Work::Destroyed => "advance_destroyed",
            Work::Follow => "advance_follow",
            Work::Plugin => "advance_plugin",
            Work::Turn => "advance_turn",
            Work::None => "advance_none",
        }
    }
}

/// Bucket key. `Always` is the "-1" bucket: non-units live there and it runs
/// every tick. It sorts before every work tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkTag {
    Always,
    Work(Work),
}

impl WorkTag {
    /// Numeric form used in logs: `-1` for `Always`, the work code otherwise.
    pub fn code(self) -> i32 {
        match self {
            WorkTag::Always => -1,
            WorkTag::Work(w) => w.code() as i32,
        }
    }
}

/// Two-slot "next advance function" state machine.
///
/// The function+move phase reads `slots[flag]`. A work change made while the
/// canvas is locked only writes the other slot, so the running iteration
/// keeps its target; the sync phase then copies it over. Outside of a tick
/// both slots always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceSlots {
    slots: [Work; 2],
}

impl AdvanceSlots {
    pub fn new(work: Work) -> Self {
        Self {
            slots: [work, work],
        }
    }

    /// Advance function to run this tick for `flag`.
    #[inline]
    pub fn step(&self, flag: bool) -> Work {
        self.slots[flag as usize]
    }

    pub fn set(&mut self, work: Work, flag: bool, locked: bool) {
        if locked {
            self.slots[(!flag) as usize] = work;
        } else {
            self.slots = [work, work];
        }
    }

    /// Commit a change made during the tick that ran with `flag`.
    pub fn sync(&mut self, flag: bool) {
        self.slots[flag as usize] = self.slots[(!flag) as usize];
    }

    pub fn is_synced(&self) -> bool {
        self.slots[0] == self.slots[1]
    }
}

/// Work-tag to item-id index. Holds ids only; the registry owns the items.
#[derive(Debug, Default)]
pub struct WorkBuckets {
    buckets: BTreeMap<WorkTag, BTreeSet<ItemId>>,
    membership: HashMap<ItemId, WorkTag>,
    pending: BTreeSet<ItemId>,
}

impl WorkBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `id` into `tag`, leaving whatever bucket it was in before.
    pub fn insert(&mut self, id: ItemId, tag: WorkTag) {
        self.remove(id);
        self.buckets.entry(tag).or_default().insert(id);
        self.membership.insert(id, tag);
    }

    /// Drop `id` from its bucket and from the pending queue.
    pub fn remove(&mut self, id: ItemId) -> Option<WorkTag> {
        self.pending.remove(&id);
        let tag = self.membership.remove(&id)?;
        if let Some(bucket) = self.buckets.get_mut(&tag) {
            bucket.remove(&id);
            if bucket.is_empty() {
                self.buckets.remove(&tag);
            }
        }
        Some(tag)
    }

    pub fn tag_of(&self, id: ItemId) -> Option<WorkTag> {
        self.membership.get(&id).copied()
    }

    /// Non-empty bucket tags in iteration order.
    pub fn tags(&self) -> Vec<WorkTag> {
        self.buckets.keys().copied().collect()
    }

    /// Snapshot of a bucket's members, safe to hold while items are created.
    pub fn ids(&self, tag: WorkTag) -> Vec<ItemId> {
        self.buckets
            .get(&tag)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn bucket_len(&self, tag: WorkTag) -> usize {
        self.buckets.get(&tag).map_or(0, |b| b.len())
    }

    /// Number of buckets that contain `id` (0 or 1 unless the index is broken).
    pub fn count_memberships(&self, id: ItemId) -> usize {
        self.buckets.values().filter(|b| b.contains(&id)).count()
    }

    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    /// Ask for `id` to be moved to the bucket of its current work during the
    /// next reclassification phase.
    pub fn queue_reclassification(&mut self, id: ItemId) {
        self.pending.insert(id);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_pending(&self, id: ItemId) -> bool {
        self.pending.contains(&id)
    }

    /// Take the pending queue, leaving it empty.
    pub fn take_pending(&mut self) -> Vec<ItemId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.membership.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_codes_are_stable() {
        assert_eq!(Work::Idle.code(), 0);
        assert_eq!(Work::None.code(), 11);
        for w in Work::ALL {
            assert_eq!(Work::from_code(w.code()), Some(w));
        }
        assert_eq!(Work::from_code(1), None);
    }

    #[test]
    fn test_always_bucket_sorts_first() {
        assert!(WorkTag::Always < WorkTag::Work(Work::Idle));
        assert_eq!(WorkTag::Always.code(), -1);
    }

    #[test]
    fn test_advance_slots_locked_change_waits_for_sync() {
        let mut slots = AdvanceSlots::new(Work::Idle);

        // Changed while phase 2 runs with flag = true.
        slots.set(Work::Attack, true, true);
        assert_eq!(slots.step(true), Work::Idle);
        assert!(!slots.is_synced());

        slots.sync(true);
        assert!(slots.is_synced());
        assert_eq!(slots.step(true), Work::Attack);
        assert_eq!(slots.step(false), Work::Attack);
    }

    #[test]
    fn test_advance_slots_unlocked_change_is_immediate() {
        let mut slots = AdvanceSlots::new(Work::Idle);
        slots.set(Work::Move, false, false);
        assert_eq!(slots.step(false), Work::Move);
        assert_eq!(slots.step(true), Work::Move);
    }

    #[test]
    fn test_bucket_insert_moves_item() {
        let mut buckets = WorkBuckets::new();
        let id = ItemId(1);
        buckets.insert(id, WorkTag::Work(Work::Idle));
        buckets.insert(id, WorkTag::Work(Work::Attack));

        assert_eq!(buckets.count_memberships(id), 1);
        assert_eq!(buckets.tag_of(id), Some(WorkTag::Work(Work::Attack)));
        assert_eq!(buckets.bucket_len(WorkTag::Work(Work::Idle)), 0);
        assert_eq!(buckets.tags(), vec![WorkTag::Work(Work::Attack)]);
    }

    #[test]
    fn test_pending_queue_drains_once() {
        let mut buckets = WorkBuckets::new();
        buckets.insert(ItemId(3), WorkTag::Always);
        buckets.queue_reclassification(ItemId(3));
        buckets.queue_reclassification(ItemId(3));

        assert_eq!(buckets.take_pending(), vec![ItemId(3)]);
        assert!(!buckets.has_pending());

        buckets.queue_reclassification(ItemId(3));
        buckets.remove(ItemId(3));
        assert!(!buckets.has_pending());
    }
}
