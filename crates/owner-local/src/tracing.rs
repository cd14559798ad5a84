//! Store maintenance tracing support.
//!
//! When the `tracing` feature is enabled, this module emits structured
//! events for table maintenance: capacity doublings, stale-slot
//! reclamation, and inheritance snapshots. Without the feature every hook
//! compiles to nothing.

#[cfg(feature = "tracing")]
pub(crate) mod internal {
    /// Emitted when a store doubles its capacity.
    pub fn store_resized(old_capacity: usize, new_capacity: usize, live_entries: usize) {
        tracing::debug!(old_capacity, new_capacity, live_entries, "store_resized");
    }

    /// Emitted at the end of an expunge run.
    pub fn stale_expunged(reclaimed: u64) {
        tracing::trace!(reclaimed, "stale_expunged");
    }

    /// Emitted after an inheritance snapshot is built.
    pub fn snapshot_taken(entries: usize, capacity: usize) {
        tracing::debug!(entries, capacity, "inheritance_snapshot");
    }
}

#[cfg(not(feature = "tracing"))]
pub(crate) mod internal {
    pub fn store_resized(_old_capacity: usize, _new_capacity: usize, _live_entries: usize) {}

    pub fn stale_expunged(_reclaimed: u64) {}

    pub fn snapshot_taken(_entries: usize, _capacity: usize) {}
}
