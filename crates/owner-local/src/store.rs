//! Per-owner slot tables.
//!
//! An `OwnerStore` is a linear-probing hash table keyed by handle identity.
//! It is only ever touched by its owner, so nothing here synchronizes.
//! Staleness (the last facade clone of a handle was dropped) is discovered
//! lazily: probes expunge stale slots they run into, inserts run a short
//! heuristic scan, and a full sweep happens before any capacity doubling.

use std::sync::Arc;

use crate::handle::{HandleCore, SlotValue};
use crate::metrics::StoreMetrics;
use crate::slot::WeakSlot;

/// Capacity of a freshly materialized store. Must be a power of two.
pub(crate) const INITIAL_CAPACITY: usize = 16;

/// Inserts rehash once occupancy reaches two thirds of capacity.
const fn threshold_for(capacity: usize) -> usize {
    capacity * 2 / 3
}

fn empty_slots(capacity: usize) -> Box<[Option<WeakSlot>]> {
    (0..capacity).map(|_| None).collect()
}

/// Home cell of a scatter code. The mask keeps only the low bits, so the
/// truncating cast is deliberate.
#[allow(clippy::cast_possible_truncation)]
#[inline]
const fn home_index(scatter: u64, len: usize) -> usize {
    (scatter as usize) & (len - 1)
}

#[inline]
const fn next_index(index: usize, len: usize) -> usize {
    if index + 1 < len {
        index + 1
    } else {
        0
    }
}

#[inline]
const fn prev_index(index: usize, len: usize) -> usize {
    if index == 0 {
        len - 1
    } else {
        index - 1
    }
}

/// Outcome of inspecting one cell during a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// The cell is empty; the run ends here.
    Empty,
    /// The cell holds the live slot for the probing key.
    Hit,
    /// The cell holds a slot whose handle is gone.
    Stale,
    /// The cell holds a live slot for some other key.
    Mismatch,
}

/// Open-addressing table of weak-keyed slots, owned by a single owner.
pub(crate) struct OwnerStore {
    /// Power-of-two array of cells. A run is a maximal stretch of occupied
    /// cells; probing never crosses an empty cell.
    slots: Box<[Option<WeakSlot>]>,
    /// Occupied cells, live and stale alike.
    entries: usize,
    /// Occupancy at which the next insert triggers a rehash.
    threshold: usize,
    /// Stale slots reclaimed over the store's lifetime.
    expunged: u64,
    /// Capacity doublings over the store's lifetime.
    resizes: u64,
}

impl std::fmt::Debug for OwnerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerStore")
            .field("capacity", &self.slots.len())
            .field("entries", &self.entries)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl OwnerStore {
    pub(crate) fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            slots: empty_slots(capacity),
            entries: 0,
            threshold: threshold_for(capacity),
            expunged: 0,
            resizes: 0,
        }
    }

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub(crate) fn metrics(&self) -> StoreMetrics {
        StoreMetrics {
            capacity: self.slots.len(),
            entries: self.entries,
            threshold: self.threshold,
            expunged: self.expunged,
            resizes: self.resizes,
        }
    }

    fn probe_state(&self, index: usize, key: &Arc<HandleCore>) -> Probe {
        match &self.slots[index] {
            None => Probe::Empty,
            Some(slot) if slot.refers_to(key) => Probe::Hit,
            Some(slot) if slot.is_stale() => Probe::Stale,
            Some(_) => Probe::Mismatch,
        }
    }

    fn is_stale_at(&self, index: usize) -> bool {
        self.slots[index].as_ref().is_some_and(WeakSlot::is_stale)
    }

    fn slot_ref(&self, index: usize) -> &WeakSlot {
        self.slots[index].as_ref().expect("indexed cell holds a slot")
    }

    fn slot_mut(&mut self, index: usize) -> &mut WeakSlot {
        self.slots[index].as_mut().expect("indexed cell holds a slot")
    }

    /// Borrow the value at a cell returned by [`Self::find`].
    pub(crate) fn value(&self, index: usize) -> &SlotValue {
        self.slot_ref(index).value()
    }

    /// Mutably borrow the value at a cell returned by [`Self::find`].
    pub(crate) fn value_mut(&mut self, index: usize) -> &mut SlotValue {
        self.slot_mut(index).value_mut()
    }

    /// Locate the live slot for `key`.
    ///
    /// Probes from the key's home cell to the end of its run. Any stale slot
    /// met on the way is expunged in place; because compaction can pull a
    /// later entry of the run into the freed cell, the probe re-inspects the
    /// same cell instead of advancing past it.
    pub(crate) fn find(&mut self, key: &Arc<HandleCore>) -> Option<usize> {
        let len = self.slots.len();
        let mut i = home_index(key.scatter(), len);
        loop {
            match self.probe_state(i, key) {
                Probe::Empty => return None,
                Probe::Hit => return Some(i),
                Probe::Stale => {
                    self.expunge(i);
                }
                Probe::Mismatch => i = next_index(i, len),
            }
        }
    }

    /// Bind `key` to `value`, overwriting any existing binding.
    ///
    /// A stale slot met while probing is taken over via [`Self::replace_stale`].
    /// On appending to an empty cell, a short heuristic scan runs; if it
    /// reclaims nothing and occupancy has reached the threshold, the table
    /// is rehashed.
    pub(crate) fn insert(&mut self, key: &Arc<HandleCore>, value: SlotValue) {
        let len = self.slots.len();
        let mut i = home_index(key.scatter(), len);
        loop {
            match self.probe_state(i, key) {
                Probe::Hit => {
                    self.slot_mut(i).set_value(value);
                    return;
                }
                Probe::Stale => {
                    self.replace_stale(key, value, i);
                    return;
                }
                Probe::Mismatch => i = next_index(i, len),
                Probe::Empty => break,
            }
        }

        self.slots[i] = Some(WeakSlot::new(key, value));
        self.entries += 1;
        let entries = self.entries;
        if !self.clean_some(i, entries) && entries >= self.threshold {
            self.rehash();
        }
    }

    /// Unbind `key` if present, compacting the remainder of its run.
    pub(crate) fn remove(&mut self, key: &Arc<HandleCore>) {
        let len = self.slots.len();
        let mut i = home_index(key.scatter(), len);
        loop {
            match self.probe_state(i, key) {
                Probe::Empty => return,
                Probe::Hit => {
                    self.slots[i] = None;
                    self.entries -= 1;
                    self.compact_run(i);
                    return;
                }
                Probe::Stale | Probe::Mismatch => i = next_index(i, len),
            }
        }
    }

    /// Take over the stale slot at `stale_slot` for `key`.
    ///
    /// If the key already lives later in the run, its slot is pulled back
    /// into the stale position so later probes find it nearer its home.
    /// Either way, every stale slot discovered in the run is expunged.
    fn replace_stale(&mut self, key: &Arc<HandleCore>, value: SlotValue, stale_slot: usize) {
        let len = self.slots.len();

        // Earliest stale slot in the run, scanning backward from the one
        // being replaced.
        let mut slot_to_expunge = stale_slot;
        let mut i = prev_index(stale_slot, len);
        while self.slots[i].is_some() {
            if self.is_stale_at(i) {
                slot_to_expunge = i;
            }
            i = prev_index(i, len);
        }

        i = next_index(stale_slot, len);
        while self.slots[i].is_some() {
            match self.probe_state(i, key) {
                Probe::Hit => {
                    self.slot_mut(i).set_value(value);
                    self.slots.swap(i, stale_slot);

                    if slot_to_expunge == stale_slot {
                        slot_to_expunge = i;
                    }
                    let tail = self.expunge(slot_to_expunge);
                    self.clean_some(tail, len);
                    return;
                }
                Probe::Stale if slot_to_expunge == stale_slot => {
                    slot_to_expunge = i;
                }
                _ => {}
            }
            i = next_index(i, len);
        }

        // Key absent from the run: the stale slot becomes its new home.
        self.slots[stale_slot] = Some(WeakSlot::new(key, value));

        if slot_to_expunge != stale_slot {
            let tail = self.expunge(slot_to_expunge);
            self.clean_some(tail, len);
        }
    }

    /// Drop the stale slot at `stale_slot` and compact the rest of its run.
    /// Returns the index of the empty cell that ends the run.
    fn expunge(&mut self, stale_slot: usize) -> usize {
        let reclaimed_before = self.expunged;
        self.slots[stale_slot] = None;
        self.entries -= 1;
        self.expunged += 1;

        let tail = self.compact_run(stale_slot);
        crate::tracing::internal::stale_expunged(self.expunged - reclaimed_before);
        tail
    }

    /// Walk the run following a just-emptied cell: drop stale slots, move
    /// displaced live slots back toward their home cells. Returns the index
    /// of the trailing empty cell.
    fn compact_run(&mut self, emptied: usize) -> usize {
        let len = self.slots.len();
        let mut i = next_index(emptied, len);
        while let Some(slot) = self.slots[i].take() {
            if slot.is_stale() {
                self.entries -= 1;
                self.expunged += 1;
            } else {
                let mut target = home_index(slot.scatter(), len);
                while self.slots[target].is_some() {
                    target = next_index(target, len);
                }
                self.slots[target] = Some(slot);
            }
            i = next_index(i, len);
        }
        i
    }

    /// Heuristic stale scan starting after cell `i`: log2(`n`) cells,
    /// escalated to a log2(capacity) pass once staleness is found.
    /// Returns whether anything was expunged.
    fn clean_some(&mut self, mut i: usize, mut n: usize) -> bool {
        let len = self.slots.len();
        let mut removed = false;
        loop {
            i = next_index(i, len);
            if self.is_stale_at(i) {
                n = len;
                removed = true;
                i = self.expunge(i);
            }
            n >>= 1;
            if n == 0 {
                break;
            }
        }
        removed
    }

    /// Full stale sweep, then double if the surviving population still
    /// crowds the table. The doubling bar sits below the insert threshold.
    fn rehash(&mut self) {
        self.expunge_all();
        if self.entries >= self.threshold - self.threshold / 4 {
            self.resize();
        }
    }

    /// Expunge every stale slot in the table.
    fn expunge_all(&mut self) {
        for i in 0..self.slots.len() {
            if self.is_stale_at(i) {
                self.expunge(i);
            }
        }
    }

    /// Double the table, dropping stale slots and rehashing live ones.
    /// Capacity never shrinks.
    fn resize(&mut self) {
        let old_len = self.slots.len();
        let new_len = old_len * 2;
        let old = std::mem::replace(&mut self.slots, empty_slots(new_len));

        let mut live = 0_usize;
        for slot in old.into_vec() {
            let Some(slot) = slot else { continue };
            if slot.is_stale() {
                self.expunged += 1;
                continue;
            }
            let mut target = home_index(slot.scatter(), new_len);
            while self.slots[target].is_some() {
                target = next_index(target, new_len);
            }
            self.slots[target] = Some(slot);
            live += 1;
        }

        self.entries = live;
        self.threshold = threshold_for(new_len);
        self.resizes += 1;
        crate::tracing::internal::store_resized(old_len, new_len, live);
    }

    /// Build a child store from a parent's live inheritable bindings.
    ///
    /// The child starts at the parent's capacity and holds one slot per live
    /// parent slot, its value produced by the handle's child transform.
    /// Stale parent slots are skipped. The result shares nothing with the
    /// parent; later parent mutations are invisible to it.
    pub(crate) fn inherit(parent: &Self) -> Self {
        let len = parent.slots.len();
        let mut child = Self::with_capacity(len);

        for slot in parent.slots.iter().flatten() {
            let Some(handle) = slot.handle() else { continue };
            let transform = handle
                .child_value()
                .expect("slots of an inheritable store always carry a child transform");
            let value = transform(slot.value().as_ref());

            let mut target = home_index(slot.scatter(), len);
            while child.slots[target].is_some() {
                target = next_index(target, len);
            }
            child.slots[target] = Some(WeakSlot::new(&handle, value));
            child.entries += 1;
        }

        crate::tracing::internal::snapshot_taken(child.entries, len);
        child
    }
}

// ============================================================================
// Tests
// ============================================================================
