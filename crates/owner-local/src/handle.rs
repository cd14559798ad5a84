//! Handle identity and scatter-code assignment.
//!
//! Every declared local variable is backed by exactly one `HandleCore`
//! allocation. Facades hold the core strongly (`Arc`); owner stores hold it
//! weakly, so dropping the last facade clone is what turns store slots stale.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Type-erased value owned by an owner-store slot.
pub(crate) type SlotValue = Box<dyn Any + Send>;

/// Type-erased child transform carried by inheritable handles.
///
/// Invoked only while building an inheritance snapshot, on the spawning
/// owner, once per live slot.
pub(crate) type ChildValueFn = Box<dyn Fn(&(dyn Any + Send)) -> SlotValue + Send + Sync>;

/// Scatter-code increment: 2^64 divided by the golden ratio, rounded to odd.
///
/// Because the increment is odd, consecutive codes visit every residue of
/// any power-of-two modulus before repeating, which keeps home slots spread
/// even for handles created in a burst.
const SCATTER_INCREMENT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Source of scatter codes. The only state shared between owners.
static NEXT_SCATTER: AtomicU64 = AtomicU64::new(0);

fn next_scatter() -> u64 {
    NEXT_SCATTER.fetch_add(SCATTER_INCREMENT, Ordering::Relaxed)
}

/// Identity core of one declared local variable.
///
/// Identity is the allocation itself: stores compare slot keys by address,
/// never by value. The scatter code is fixed at construction.
pub(crate) struct HandleCore {
    scatter: u64,
    child_value: Option<ChildValueFn>,
}

impl HandleCore {
    pub(crate) fn new(child_value: Option<ChildValueFn>) -> Arc<Self> {
        Arc::new(Self {
            scatter: next_scatter(),
            child_value,
        })
    }

    #[inline]
    pub(crate) const fn scatter(&self) -> u64 {
        self.scatter
    }

    /// Child transform for inheritable handles.
    ///
    /// `None` for plain handles, which never enter an inheritable store.
    #[inline]
    pub(crate) fn child_value(&self) -> Option<&ChildValueFn> {
        self.child_value.as_ref()
    }
}

impl std::fmt::Debug for HandleCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleCore")
            .field("scatter", &self.scatter)
            .field("inheritable", &self.child_value.is_some())
            .finish()
    }
}
