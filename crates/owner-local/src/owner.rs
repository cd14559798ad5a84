//! Owner records and thread attachment.
//!
//! Every thread carries one lazily materialized `OwnerRecord` in
//! thread-local storage. Task integrations swap their own record into the
//! thread slot around each poll, so "the calling owner" is always whatever
//! record currently sits in the slot.

use std::cell::RefCell;

use thiserror::Error;

use crate::store::OwnerStore;

/// Which of an owner's two stores an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreKind {
    /// Bindings private to the owner, never inherited.
    Plain,
    /// Bindings snapshotted into children at spawn.
    Inheritable,
}

/// The per-owner pair of binding stores.
///
/// Both stores start out absent and are materialized by the first write
/// against them. Dropping the record drops both stores and every value they
/// own in one stroke.
#[derive(Debug, Default)]
pub(crate) struct OwnerRecord {
    plain: Option<OwnerStore>,
    inheritable: Option<OwnerStore>,
}

impl OwnerRecord {
    pub(crate) const fn new() -> Self {
        Self {
            plain: None,
            inheritable: None,
        }
    }

    pub(crate) fn store(&self, kind: StoreKind) -> Option<&OwnerStore> {
        match kind {
            StoreKind::Plain => self.plain.as_ref(),
            StoreKind::Inheritable => self.inheritable.as_ref(),
        }
    }

    pub(crate) fn store_mut(&mut self, kind: StoreKind) -> Option<&mut OwnerStore> {
        match kind {
            StoreKind::Plain => self.plain.as_mut(),
            StoreKind::Inheritable => self.inheritable.as_mut(),
        }
    }

    /// Materialize the store on first write.
    pub(crate) fn store_or_init(&mut self, kind: StoreKind) -> &mut OwnerStore {
        let slot = match kind {
            StoreKind::Plain => &mut self.plain,
            StoreKind::Inheritable => &mut self.inheritable,
        };
        slot.get_or_insert_with(OwnerStore::new)
    }

    /// Replace the inheritable store wholesale, as spawn installation does.
    pub(crate) fn set_inheritable(&mut self, store: Option<OwnerStore>) {
        self.inheritable = store;
    }
}

thread_local! {
    static OWNER: RefCell<OwnerRecord> = const { RefCell::new(OwnerRecord::new()) };
}

/// Run `f` against the calling owner's record.
///
/// # Panics
///
/// Panics if called from a thread destructor after the record has been torn
/// down, or re-entrantly from inside another record access.
pub(crate) fn with_record<R>(f: impl FnOnce(&mut OwnerRecord) -> R) -> R {
    OWNER.with(|record| f(&mut record.borrow_mut()))
}

/// Fallible variant of [`with_record`] backing the `try_` operations.
///
/// Reports [`AccessError`] instead of panicking when the record is gone;
/// re-entrant access still panics.
pub(crate) fn try_with_record<R>(f: impl FnOnce(&mut OwnerRecord) -> R) -> Result<R, AccessError> {
    OWNER
        .try_with(|record| f(&mut record.borrow_mut()))
        .map_err(|_| AccessError(()))
}

/// Error returned by the `try_` operations when the calling owner's record
/// has already been destroyed.
///
/// Observable only from late thread destructors, after thread-local storage
/// teardown has passed the record.
#[derive(Error, Debug)]
#[error("owner-local storage accessed after its owner's record was destroyed")]
pub struct AccessError(pub(crate) ());
