//! Per-owner local variables with weak-keyed slot tables.
//!
//! `owner-local` provides [`Local<T>`], a variable with one independent
//! binding per *owner* (a thread, or a task when combined with the
//! [`tokio`] integration), and [`InheritableLocal<T>`], whose bindings
//! additionally flow to spawned children as a one-shot snapshot.
//!
//! # Model
//!
//! - A facade ([`Local`]/[`InheritableLocal`]) is a token identifying one
//!   variable. The values live with the owners, in small open-addressing
//!   **slot tables** keyed by the facade's identity.
//! - Tables reference facades **weakly**: dropping the last facade severs
//!   its slots in every owner's table at once. Orphaned slots are reclaimed
//!   lazily by whatever table operations run later, so an unused binding
//!   may retain its value for a bounded while, never forever.
//! - Each owner mutates only its own tables. There are no locks; the only
//!   shared state in the crate is the counter handing out table hash codes.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::LazyLock;
//! use owner_local::Local;
//!
//! static REQUEST_DEPTH: LazyLock<Local<u32>> = LazyLock::new(Local::new);
//!
//! REQUEST_DEPTH.set(3);
//! assert_eq!(REQUEST_DEPTH.get(), 3);
//!
//! REQUEST_DEPTH.remove();
//! assert_eq!(REQUEST_DEPTH.get(), 0); // re-initialized from the default
//! ```
//!
//! # Inheritance
//!
//! ```
//! use std::sync::LazyLock;
//! use owner_local::InheritableLocal;
//!
//! static TRACE_ID: LazyLock<InheritableLocal<u64>> = LazyLock::new(InheritableLocal::new);
//!
//! TRACE_ID.set(7);
//!
//! // The child starts from a snapshot taken at spawn; later divergence is
//! // invisible in both directions.
//! let seen = owner_local::spawn(|| {
//!     let inherited = TRACE_ID.get();
//!     TRACE_ID.set(99);
//!     inherited
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(seen, 7);
//! assert_eq!(TRACE_ID.get(), 7);
//! ```
//!
//! # Feature Flags
//!
//! - `tokio` — the [`tokio`] module: task-scoped owners and an inheriting
//!   [`tokio::spawn`](crate::tokio::spawn).
//! - `tracing` — structured events for table maintenance (resizes,
//!   stale-slot reclamation, inheritance snapshots).

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod handle;
mod local;
mod owner;
mod slot;
mod spawn;
mod store;
mod tracing;

/// Store statistics for the calling owner.
pub mod metrics;

/// Tokio async/await integration.
#[cfg(feature = "tokio")]
pub mod tokio;

// Re-export public API
pub use local::{InheritableLocal, Local};
pub use owner::AccessError;
pub use spawn::{spawn, InheritableBindings};
