//! Store statistics for the calling owner.
//!
//! Counters are per store and cumulative over the store's lifetime; they
//! reset when the owner's record is replaced or destroyed. Reading metrics
//! never materializes a store.

use crate::owner::{self, StoreKind};
use crate::store::OwnerStore;

/// Point-in-time statistics of one owner store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreMetrics {
    /// Length of the slot array. Always a power of two; never shrinks.
    pub capacity: usize,
    /// Occupied slots, live and stale alike.
    pub entries: usize,
    /// Occupancy at which the next insert triggers a rehash. Two thirds of
    /// the capacity.
    pub threshold: usize,
    /// Stale slots reclaimed so far.
    pub expunged: u64,
    /// Capacity doublings so far.
    pub resizes: u64,
}

/// Statistics of the calling owner's plain store, if it has been
/// materialized.
///
/// # Examples
///
/// ```
/// use owner_local::{metrics, Local};
///
/// let depth: Local<u32> = Local::new();
/// assert!(metrics::local_metrics().is_none());
///
/// depth.set(1);
/// let stats = metrics::local_metrics().unwrap();
/// assert_eq!(stats.capacity, 16);
/// assert_eq!(stats.entries, 1);
/// ```
#[must_use]
pub fn local_metrics() -> Option<StoreMetrics> {
    owner::with_record(|record| record.store(StoreKind::Plain).map(OwnerStore::metrics))
}

/// Statistics of the calling owner's inheritable store, if it has been
/// materialized.
#[must_use]
pub fn inheritable_metrics() -> Option<StoreMetrics> {
    owner::with_record(|record| record.store(StoreKind::Inheritable).map(OwnerStore::metrics))
}
