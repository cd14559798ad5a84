//! Spawn-time inheritance of owner-local bindings.
//!
//! Inheritance is a one-shot snapshot: the spawning owner's live
//! inheritable bindings are passed through their child transforms into a
//! fresh store, the snapshot crosses the spawn boundary, and the child
//! starts from it. Nothing ties parent and child together afterwards.

use std::thread::{self, JoinHandle};

use crate::owner::{self, OwnerRecord, StoreKind};
use crate::store::OwnerStore;

/// A snapshot of the spawning owner's inheritable bindings, ready to cross
/// to a child owner.
///
/// Built by [`capture`](Self::capture) on the parent and consumed by
/// [`install`](Self::install) on the child. [`spawn`] does both; use the
/// halves directly when handing work to an executor or thread pool that
/// this crate has no integration for:
///
/// ```
/// use owner_local::{InheritableBindings, InheritableLocal};
/// use std::sync::LazyLock;
///
/// static TENANT: LazyLock<InheritableLocal<u32>> = LazyLock::new(InheritableLocal::new);
///
/// TENANT.set(12);
/// let bindings = InheritableBindings::capture();
/// std::thread::spawn(move || {
///     bindings.install();
///     assert_eq!(TENANT.get(), 12);
/// })
/// .join()
/// .unwrap();
/// ```
#[derive(Debug)]
pub struct InheritableBindings {
    store: Option<OwnerStore>,
}

impl InheritableBindings {
    /// Snapshot the calling owner's live inheritable bindings, applying
    /// each binding's child transform.
    ///
    /// An owner with no inheritable store yields an empty snapshot.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down, or if a
    /// child transform itself accesses owner-local storage.
    #[must_use]
    pub fn capture() -> Self {
        let store = owner::with_record(|record| {
            record.store(StoreKind::Inheritable).map(OwnerStore::inherit)
        });
        Self { store }
    }

    /// Install the snapshot into the calling owner, replacing whatever
    /// inheritable bindings it already had.
    ///
    /// Call this on the child before it runs user code.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down. Replaced
    /// bindings are dropped while the record is locked, so their `Drop`
    /// must not access owner-local storage.
    pub fn install(self) {
        owner::with_record(|record| self.install_into(record));
    }

    /// Install directly into a detached record, as the task integrations
    /// do before the record is first swapped in.
    pub(crate) fn install_into(self, record: &mut OwnerRecord) {
        record.set_inheritable(self.store);
    }

    /// Whether the snapshot carries any bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.as_ref().is_none_or(OwnerStore::is_empty)
    }
}

/// Spawn a thread whose owner starts from the calling owner's inheritable
/// bindings.
///
/// A drop-in replacement for [`std::thread::spawn`] that captures an
/// [`InheritableBindings`] snapshot before the thread starts and installs
/// it in the child before `f` runs.
///
/// # Panics
///
/// Panics if the thread cannot be spawned, as [`std::thread::spawn`] does.
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let bindings = InheritableBindings::capture();
    thread::spawn(move || {
        bindings.install();
        f()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InheritableLocal;

    #[test]
    fn test_capture_on_a_fresh_owner_is_empty() {
        let bindings = InheritableBindings::capture();
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_capture_after_a_binding_is_not_empty() {
        let tenant: InheritableLocal<u32> = InheritableLocal::new();
        tenant.set(1);

        assert!(!InheritableBindings::capture().is_empty());
    }

    #[test]
    fn test_capture_skips_bindings_of_dropped_facades() {
        let kept: InheritableLocal<u32> = InheritableLocal::new();
        let dropped: InheritableLocal<u32> = InheritableLocal::new();
        kept.set(1);
        dropped.set(2);
        drop(dropped);

        let bindings = InheritableBindings::capture();
        assert!(!bindings.is_empty());
        assert_eq!(bindings.store.as_ref().unwrap().metrics().entries, 1);
    }

    #[test]
    fn test_install_replaces_previous_inheritable_bindings() {
        let tenant: InheritableLocal<u32> = InheritableLocal::new();
        tenant.set(1);
        let snapshot_of_one = InheritableBindings::capture();

        tenant.set(2);
        snapshot_of_one.install();

        assert_eq!(tenant.get(), 1);
    }
}
