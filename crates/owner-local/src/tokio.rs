//! Tokio async/await integration.
//!
//! A spawned task is its own owner. [`OwnerScope`] gives the wrapped future
//! a private owner record and swaps it into the worker thread's slot around
//! every poll, so bindings follow the task wherever the scheduler moves it
//! and never leak into the worker thread or sibling tasks.
//!
//! # Enabling Tokio Support
//!
//! ```toml
//! [dependencies]
//! owner-local = { version = "0.4", features = ["tokio"] }
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::LazyLock;
//! use owner_local::InheritableLocal;
//!
//! static TENANT: LazyLock<InheritableLocal<u32>> = LazyLock::new(InheritableLocal::new);
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     TENANT.set(7);
//!
//!     // The task starts from the spawner's inheritable bindings.
//!     let seen = owner_local::tokio::spawn(async { TENANT.get() })
//!         .await
//!         .unwrap();
//!     assert_eq!(seen, 7);
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::owner::{self, OwnerRecord};
use crate::spawn::InheritableBindings;

/// Future wrapper that makes the wrapped future its own owner.
///
/// The scope carries the task's record inline; each poll swaps it into the
/// polling thread's owner slot and swaps it back out when the poll returns,
/// panics included. Dropping the scope drops the record and every binding
/// it holds.
///
/// [`spawn`] builds one automatically. Wrap futures by hand when handing
/// them to another executor:
///
/// ```
/// use owner_local::{tokio::OwnerScope, InheritableBindings};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scoped = OwnerScope::new(async { 2 + 2 }, InheritableBindings::capture());
/// assert_eq!(scoped.await, 4);
/// # }
/// ```
pub struct OwnerScope<F> {
    future: F,
    record: OwnerRecord,
}

impl<F> OwnerScope<F> {
    /// Wrap `future` with a fresh owner record seeded from `bindings`.
    #[must_use]
    pub fn new(future: F, bindings: InheritableBindings) -> Self {
        let mut record = OwnerRecord::new();
        bindings.install_into(&mut record);
        Self { future, record }
    }
}

impl<F> std::fmt::Debug for OwnerScope<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerScope")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl<F: Future> Future for OwnerScope<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `future` is structurally pinned; it is never moved out of
        // the scope. `record` is only mutated in place by the swap guard.
        let this = unsafe { self.get_unchecked_mut() };
        let future = unsafe { Pin::new_unchecked(&mut this.future) };

        let _swap = RecordSwap::enter(&mut this.record);
        future.poll(cx)
    }
}

/// Swaps a task's record into the polling thread's owner slot, restoring
/// the thread's own record on drop.
struct RecordSwap<'a> {
    task_record: &'a mut OwnerRecord,
}

impl<'a> RecordSwap<'a> {
    fn enter(task_record: &'a mut OwnerRecord) -> Self {
        owner::with_record(|thread_record| std::mem::swap(thread_record, task_record));
        Self { task_record }
    }
}

impl Drop for RecordSwap<'_> {
    fn drop(&mut self) {
        owner::with_record(|thread_record| std::mem::swap(thread_record, self.task_record));
    }
}

/// Spawn a task whose owner starts from the calling owner's inheritable
/// bindings.
///
/// A drop-in replacement for [`tokio::task::spawn`]: the snapshot is
/// captured before this function returns, and the task polls inside an
/// [`OwnerScope`].
///
/// # Panics
///
/// Panics if called outside a tokio runtime, as [`tokio::task::spawn`]
/// does.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let scope = OwnerScope::new(future, InheritableBindings::capture());
    tokio::task::spawn(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InheritableLocal, Local};
    use std::sync::LazyLock;

    static TENANT: LazyLock<InheritableLocal<u32>> = LazyLock::new(InheritableLocal::new);
    static SCRATCH: LazyLock<Local<u32>> = LazyLock::new(Local::new);

    #[tokio::test]
    async fn test_task_inherits_spawner_bindings() {
        TENANT.set(42);

        let seen = spawn(async { TENANT.get() }).await.unwrap();

        assert_eq!(seen, 42);
    }

    #[tokio::test]
    async fn test_task_bindings_do_not_leak_into_the_worker() {
        let worker_before = SCRATCH.get();
        assert_eq!(worker_before, 0);

        spawn(async {
            SCRATCH.set(9);
            assert_eq!(SCRATCH.get(), 9);
        })
        .await
        .unwrap();

        // The task's record was swapped out with the task; the thread's own
        // binding is untouched.
        assert_eq!(SCRATCH.get(), 0);
    }

    #[tokio::test]
    async fn test_bindings_survive_across_polls() {
        spawn(async {
            SCRATCH.set(3);
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(SCRATCH.get(), 3);
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_interleaved_tasks_stay_isolated() {
        // On a current-thread runtime every task polls on the same thread;
        // only the per-poll record swap keeps their bindings apart.
        let tasks: Vec<_> = (0..8_u32)
            .map(|n| {
                spawn(async move {
                    SCRATCH.set(n);
                    tokio::task::yield_now().await;
                    assert_eq!(SCRATCH.get(), n);
                    tokio::task::yield_now().await;
                    SCRATCH.get()
                })
            })
            .collect();

        for (n, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap(), u32::try_from(n).unwrap());
        }
    }

    #[tokio::test]
    async fn test_nested_spawn_inherits_from_the_task() {
        TENANT.set(1);

        let seen = spawn(async {
            TENANT.set(2);
            spawn(async { TENANT.get() }).await.unwrap()
        })
        .await
        .unwrap();

        assert_eq!(seen, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bindings_follow_the_task_across_worker_threads() {
        TENANT.set(5);

        let tasks: Vec<_> = (0..16_u32)
            .map(|n| {
                spawn(async move {
                    SCRATCH.set(n);
                    tokio::task::yield_now().await;
                    (TENANT.get(), SCRATCH.get())
                })
            })
            .collect();

        for (n, task) in tasks.into_iter().enumerate() {
            let (tenant, scratch) = task.await.unwrap();
            assert_eq!(tenant, 5);
            assert_eq!(scratch, u32::try_from(n).unwrap());
        }
    }

    #[tokio::test]
    async fn test_manual_scope_wraps_an_arbitrary_future() {
        TENANT.set(11);

        let scoped = OwnerScope::new(async { TENANT.get() }, InheritableBindings::capture());

        assert_eq!(scoped.await, 11);
    }
}
