//! Weak-keyed store slots.

use std::sync::{Arc, Weak};

use crate::handle::{HandleCore, SlotValue};

/// One occupied cell of an owner store.
///
/// The handle reference is non-owning: dropping the last facade clone severs
/// it between any two owner operations, and the slot becomes stale. The
/// scatter code is cached so compaction and resize can rehash live entries
/// without upgrading the weak reference.
pub(crate) struct WeakSlot {
    scatter: u64,
    handle: Weak<HandleCore>,
    value: SlotValue,
}

impl WeakSlot {
    pub(crate) fn new(handle: &Arc<HandleCore>, value: SlotValue) -> Self {
        Self {
            scatter: handle.scatter(),
            handle: Arc::downgrade(handle),
            value,
        }
    }

    #[inline]
    pub(crate) const fn scatter(&self) -> u64 {
        self.scatter
    }

    /// A slot is stale once no facade clone holds the handle any more.
    /// Stale is terminal: the slot never becomes live again.
    #[inline]
    pub(crate) fn is_stale(&self) -> bool {
        self.handle.strong_count() == 0
    }

    /// Identity match against a probing key.
    ///
    /// Compares allocation addresses. The slot's own weak reference pins the
    /// handle allocation, so the address cannot have been reused for a new
    /// handle while this slot exists.
    #[inline]
    pub(crate) fn refers_to(&self, key: &Arc<HandleCore>) -> bool {
        std::ptr::eq(self.handle.as_ptr(), Arc::as_ptr(key))
    }

    #[inline]
    pub(crate) fn value(&self) -> &SlotValue {
        &self.value
    }

    #[inline]
    pub(crate) fn value_mut(&mut self) -> &mut SlotValue {
        &mut self.value
    }

    pub(crate) fn set_value(&mut self, value: SlotValue) {
        self.value = value;
    }

    /// Upgrade the key for snapshotting. `None` once stale.
    pub(crate) fn handle(&self) -> Option<Arc<HandleCore>> {
        self.handle.upgrade()
    }
}
