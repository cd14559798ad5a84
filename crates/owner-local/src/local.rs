//! Public local-variable facades.
//!
//! A facade is a cheap token; the values live in per-owner stores keyed by
//! the facade's handle. Dropping the last facade severs the handle from
//! every owner's store at once, and the orphaned slots are reclaimed lazily
//! by later store operations on each owner.

use std::fmt;
use std::sync::Arc;

use crate::handle::{ChildValueFn, HandleCore, SlotValue};
use crate::owner::{self, AccessError, StoreKind};

type InitFn<T> = Box<dyn Fn() -> T + Send + Sync>;

/// An owner-local variable.
///
/// Each owner (thread, or task when polled through
/// [`OwnerScope`](crate::tokio::OwnerScope)) observes its own independent
/// binding. A binding is created the first time the owner reads or writes
/// the variable and lives until the owner removes it, the owner itself goes
/// away, or the last facade for the variable is dropped.
///
/// `Local` is not `Clone`; share one facade by putting it in a `static`.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
/// use owner_local::Local;
///
/// static DEPTH: LazyLock<Local<u32>> = LazyLock::new(Local::new);
///
/// DEPTH.set(3);
/// assert_eq!(DEPTH.get(), 3);
///
/// std::thread::spawn(|| {
///     // Bindings are per owner: this thread sees the default.
///     assert_eq!(DEPTH.get(), 0);
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(DEPTH.get(), 3);
/// ```
pub struct Local<T: Send + 'static> {
    handle: Arc<HandleCore>,
    init: InitFn<T>,
}

impl<T: Send + 'static> Local<T> {
    /// Declare a variable whose per-owner initial value is `T::default()`.
    #[must_use]
    pub fn new() -> Self
    where
        T: Default,
    {
        Self::with_initial(T::default)
    }

    /// Declare a variable with an initial-value producer.
    ///
    /// The producer runs at most once per owner, on that owner, the first
    /// time the owner reads the variable without having set it. Removing
    /// the binding re-arms it. The producer may read or write other
    /// owner-local variables; if it writes *this* variable, the value it
    /// returns still wins.
    ///
    /// # Examples
    ///
    /// ```
    /// use owner_local::Local;
    ///
    /// let name = Local::with_initial(|| String::from("unnamed"));
    /// assert_eq!(name.get(), "unnamed");
    /// ```
    pub fn with_initial<F>(init: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            handle: HandleCore::new(None),
            init: Box::new(init),
        }
    }

    /// Return a clone of the calling owner's binding, initializing it first
    /// if the owner has none.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down (see
    /// [`Self::try_get`]), or if `T::clone` itself accesses owner-local
    /// storage.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(Clone::clone)
    }

    /// Run `f` with a shared borrow of the calling owner's binding,
    /// initializing it first if the owner has none.
    ///
    /// The borrow is handed out while the owner's record is locked, so `f`
    /// must not touch any owner-local variable of the same owner.
    ///
    /// # Panics
    ///
    /// Panics if `f` accesses owner-local storage, or if called after the
    /// owner's record was torn down.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        with_value(StoreKind::Plain, &self.handle, &self.init, f)
    }

    /// Run `f` with a mutable borrow of the calling owner's binding,
    /// initializing it first if the owner has none.
    ///
    /// # Panics
    ///
    /// Panics if `f` accesses owner-local storage, or if called after the
    /// owner's record was torn down.
    ///
    /// # Examples
    ///
    /// ```
    /// use owner_local::Local;
    ///
    /// let visits: Local<Vec<&str>> = Local::new();
    /// visits.with_mut(|v| v.push("a"));
    /// visits.with_mut(|v| v.push("b"));
    /// assert_eq!(visits.with(Vec::len), 2);
    /// ```
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        with_value_mut(StoreKind::Plain, &self.handle, &self.init, f)
    }

    /// Bind the calling owner to `value`, replacing any current binding.
    ///
    /// The initial-value producer does not run for an owner that sets
    /// before its first read.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down. The
    /// replaced value is dropped while the record is locked, so its `Drop`
    /// must not access owner-local storage.
    pub fn set(&self, value: T) {
        set_value(StoreKind::Plain, &self.handle, value);
    }

    /// Drop the calling owner's binding, if any.
    ///
    /// A later read re-runs the initial-value producer.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down. The removed
    /// value is dropped while the record is locked, so its `Drop` must not
    /// access owner-local storage.
    pub fn remove(&self) {
        remove_value(StoreKind::Plain, &self.handle);
    }

    /// Whether the calling owner currently holds a binding.
    ///
    /// Never materializes a store and never runs the initial-value
    /// producer.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down.
    #[must_use]
    pub fn is_set(&self) -> bool {
        is_bound(StoreKind::Plain, &self.handle)
    }

    /// Fallible [`Self::get`] for use where the owner's record may already
    /// be gone, such as late thread destructors.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if the record was torn down.
    pub fn try_get(&self) -> Result<T, AccessError>
    where
        T: Clone,
    {
        self.try_with(Clone::clone)
    }

    /// Fallible [`Self::with`].
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if the record was torn down.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, AccessError> {
        try_with_value(StoreKind::Plain, &self.handle, &self.init, f)
    }

    /// Fallible [`Self::set`].
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if the record was torn down.
    pub fn try_set(&self, value: T) -> Result<(), AccessError> {
        try_set_value(StoreKind::Plain, &self.handle, value)
    }

    /// Fallible [`Self::is_set`].
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if the record was torn down.
    pub fn try_is_set(&self) -> Result<bool, AccessError> {
        try_is_bound(StoreKind::Plain, &self.handle)
    }
}

impl<T: Default + Send + 'static> Default for Local<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> fmt::Debug for Local<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Local").finish_non_exhaustive()
    }
}

/// An owner-local variable whose bindings flow to spawned children.
///
/// Behaves exactly like [`Local`] for the owner's own reads and writes, but
/// lives in the owner's inheritable store: when the owner spawns a child
/// through [`spawn`](crate::spawn) (or the task integrations), every live
/// binding is passed through its child transform and installed in the child
/// before the child runs. The snapshot is one-shot; afterwards parent and
/// child diverge freely.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
/// use owner_local::InheritableLocal;
///
/// static TRACE_ID: LazyLock<InheritableLocal<u64>> = LazyLock::new(InheritableLocal::new);
///
/// TRACE_ID.set(7);
/// let seen = owner_local::spawn(|| TRACE_ID.get()).join().unwrap();
/// assert_eq!(seen, 7);
/// ```
pub struct InheritableLocal<T: Send + 'static> {
    handle: Arc<HandleCore>,
    init: InitFn<T>,
}

impl<T: Send + 'static> InheritableLocal<T> {
    /// Declare an inheritable variable whose per-owner initial value is
    /// `T::default()` and whose child transform is a plain clone.
    #[must_use]
    pub fn new() -> Self
    where
        T: Clone + Default,
    {
        Self::with_initial(T::default)
    }

    /// Declare an inheritable variable with an initial-value producer; the
    /// child transform is a plain clone.
    pub fn with_initial<F>(init: F) -> Self
    where
        T: Clone,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_child_value(init, T::clone)
    }

    /// Declare an inheritable variable with an explicit child transform.
    ///
    /// `child` runs on the spawning owner, once per live binding, while the
    /// spawn snapshot is built; its result becomes the child's starting
    /// binding. It must not access owner-local storage.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::LazyLock;
    /// use owner_local::InheritableLocal;
    ///
    /// static SPAN: LazyLock<InheritableLocal<Vec<u32>>> = LazyLock::new(|| {
    ///     InheritableLocal::with_child_value(Vec::new, |parent| {
    ///         let mut path = parent.clone();
    ///         path.push(0);
    ///         path
    ///     })
    /// });
    ///
    /// SPAN.set(vec![7]);
    /// let child_path = owner_local::spawn(|| SPAN.get()).join().unwrap();
    /// assert_eq!(child_path, [7, 0]);
    /// ```
    pub fn with_child_value<F, C>(init: F, child: C) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        C: Fn(&T) -> T + Send + Sync + 'static,
    {
        let transform: ChildValueFn = Box::new(move |value| {
            let parent = value
                .downcast_ref::<T>()
                .expect("inheritable binding holds the facade's value type");
            Box::new(child(parent))
        });
        Self {
            handle: HandleCore::new(Some(transform)),
            init: Box::new(init),
        }
    }

    /// Return a clone of the calling owner's binding, initializing it first
    /// if the owner has none.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down, or if
    /// `T::clone` itself accesses owner-local storage.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(Clone::clone)
    }

    /// Run `f` with a shared borrow of the calling owner's binding,
    /// initializing it first if the owner has none.
    ///
    /// # Panics
    ///
    /// Panics if `f` accesses owner-local storage, or if called after the
    /// owner's record was torn down.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        with_value(StoreKind::Inheritable, &self.handle, &self.init, f)
    }

    /// Run `f` with a mutable borrow of the calling owner's binding,
    /// initializing it first if the owner has none.
    ///
    /// # Panics
    ///
    /// Panics if `f` accesses owner-local storage, or if called after the
    /// owner's record was torn down.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        with_value_mut(StoreKind::Inheritable, &self.handle, &self.init, f)
    }

    /// Bind the calling owner to `value`, replacing any current binding.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down. The
    /// replaced value is dropped while the record is locked, so its `Drop`
    /// must not access owner-local storage.
    pub fn set(&self, value: T) {
        set_value(StoreKind::Inheritable, &self.handle, value);
    }

    /// Drop the calling owner's binding, if any.
    ///
    /// Children spawned afterwards do not inherit it.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down. The removed
    /// value is dropped while the record is locked, so its `Drop` must not
    /// access owner-local storage.
    pub fn remove(&self) {
        remove_value(StoreKind::Inheritable, &self.handle);
    }

    /// Whether the calling owner currently holds a binding.
    ///
    /// # Panics
    ///
    /// Panics if called after the owner's record was torn down.
    #[must_use]
    pub fn is_set(&self) -> bool {
        is_bound(StoreKind::Inheritable, &self.handle)
    }

    /// Fallible [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if the record was torn down.
    pub fn try_get(&self) -> Result<T, AccessError>
    where
        T: Clone,
    {
        self.try_with(Clone::clone)
    }

    /// Fallible [`Self::with`].
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if the record was torn down.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, AccessError> {
        try_with_value(StoreKind::Inheritable, &self.handle, &self.init, f)
    }

    /// Fallible [`Self::set`].
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if the record was torn down.
    pub fn try_set(&self, value: T) -> Result<(), AccessError> {
        try_set_value(StoreKind::Inheritable, &self.handle, value)
    }

    /// Fallible [`Self::is_set`].
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if the record was torn down.
    pub fn try_is_set(&self) -> Result<bool, AccessError> {
        try_is_bound(StoreKind::Inheritable, &self.handle)
    }
}

impl<T: Clone + Default + Send + 'static> Default for InheritableLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> fmt::Debug for InheritableLocal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InheritableLocal").finish_non_exhaustive()
    }
}

// ============================================================================
// Store-level plumbing shared by both facades
// ============================================================================

fn downcast<T: 'static>(value: &SlotValue) -> &T {
    value
        .downcast_ref::<T>()
        .expect("binding holds the facade's value type")
}

fn downcast_mut<T: 'static>(value: &mut SlotValue) -> &mut T {
    value
        .downcast_mut::<T>()
        .expect("binding holds the facade's value type")
}

fn with_value<T, R>(
    kind: StoreKind,
    handle: &Arc<HandleCore>,
    init: &InitFn<T>,
    f: impl FnOnce(&T) -> R,
) -> R
where
    T: Send + 'static,
{
    let mut f = Some(f);
    let hit = owner::with_record(|record| {
        let store = record.store_mut(kind)?;
        let index = store.find(handle)?;
        let read = f.take().expect("read closure is consumed at most once");
        Some(read(downcast(store.value(index))))
    });
    if let Some(result) = hit {
        return result;
    }

    // First read: run the producer outside the record borrow so it may
    // itself touch owner-local variables.
    let value = init();
    owner::with_record(|record| {
        let store = record.store_or_init(kind);
        store.insert(handle, Box::new(value));
        let index = store
            .find(handle)
            .expect("freshly inserted binding is present");
        let read = f.take().expect("read closure is consumed at most once");
        read(downcast(store.value(index)))
    })
}

fn with_value_mut<T, R>(
    kind: StoreKind,
    handle: &Arc<HandleCore>,
    init: &InitFn<T>,
    f: impl FnOnce(&mut T) -> R,
) -> R
where
    T: Send + 'static,
{
    let mut f = Some(f);
    let hit = owner::with_record(|record| {
        let store = record.store_mut(kind)?;
        let index = store.find(handle)?;
        let write = f.take().expect("write closure is consumed at most once");
        Some(write(downcast_mut(store.value_mut(index))))
    });
    if let Some(result) = hit {
        return result;
    }

    let value = init();
    owner::with_record(|record| {
        let store = record.store_or_init(kind);
        store.insert(handle, Box::new(value));
        let index = store
            .find(handle)
            .expect("freshly inserted binding is present");
        let write = f.take().expect("write closure is consumed at most once");
        write(downcast_mut(store.value_mut(index)))
    })
}

fn set_value<T: Send + 'static>(kind: StoreKind, handle: &Arc<HandleCore>, value: T) {
    owner::with_record(|record| record.store_or_init(kind).insert(handle, Box::new(value)));
}

fn remove_value(kind: StoreKind, handle: &Arc<HandleCore>) {
    owner::with_record(|record| {
        if let Some(store) = record.store_mut(kind) {
            store.remove(handle);
        }
    });
}

fn is_bound(kind: StoreKind, handle: &Arc<HandleCore>) -> bool {
    owner::with_record(|record| {
        record
            .store_mut(kind)
            .is_some_and(|store| store.find(handle).is_some())
    })
}

fn try_with_value<T, R>(
    kind: StoreKind,
    handle: &Arc<HandleCore>,
    init: &InitFn<T>,
    f: impl FnOnce(&T) -> R,
) -> Result<R, AccessError>
where
    T: Send + 'static,
{
    let mut f = Some(f);
    let hit = owner::try_with_record(|record| {
        let store = record.store_mut(kind)?;
        let index = store.find(handle)?;
        let read = f.take().expect("read closure is consumed at most once");
        Some(read(downcast(store.value(index))))
    })?;
    if let Some(result) = hit {
        return Ok(result);
    }

    let value = init();
    owner::try_with_record(|record| {
        let store = record.store_or_init(kind);
        store.insert(handle, Box::new(value));
        let index = store
            .find(handle)
            .expect("freshly inserted binding is present");
        let read = f.take().expect("read closure is consumed at most once");
        read(downcast(store.value(index)))
    })
}

fn try_set_value<T: Send + 'static>(
    kind: StoreKind,
    handle: &Arc<HandleCore>,
    value: T,
) -> Result<(), AccessError> {
    owner::try_with_record(|record| record.store_or_init(kind).insert(handle, Box::new(value)))
}

fn try_is_bound(kind: StoreKind, handle: &Arc<HandleCore>) -> Result<bool, AccessError> {
    owner::try_with_record(|record| {
        record
            .store_mut(kind)
            .is_some_and(|store| store.find(handle).is_some())
    })
}
