//! Integration tests for the `tracing` feature.
//!
//! Table maintenance emits debug/trace events while stores double,
//! expunge stale slots, and build inheritance snapshots. These tests
//! capture the events with a collecting layer scoped to the test thread.

#![cfg(feature = "tracing")]

use std::sync::{Arc, Mutex};

use owner_local::{InheritableBindings, InheritableLocal, Local};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

/// Collects the message of every event seen on this thread.
#[derive(Clone, Default)]
struct MessageLog(Arc<Mutex<Vec<String>>>);

impl MessageLog {
    fn contains(&self, needle: &str) -> bool {
        self.0.lock().unwrap().iter().any(|m| m == needle)
    }
}

impl<S: tracing::Subscriber> Layer<S> for MessageLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Grab(Option<String>);
        impl Visit for Grab {
            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = Some(format!("{value:?}"));
                }
            }
        }

        let mut grab = Grab(None);
        event.record(&mut grab);
        if let Some(message) = grab.0 {
            self.0.lock().unwrap().push(message);
        }
    }
}

fn with_log<R>(f: impl FnOnce() -> R) -> (MessageLog, R) {
    let log = MessageLog::default();
    let subscriber = tracing_subscriber::registry().with(log.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (log, result)
}

#[test]
fn test_maintenance_without_a_subscriber_does_not_panic() {
    let locals: Vec<Local<u64>> = (0..12).map(|_| Local::new()).collect();
    for (n, slot) in locals.iter().enumerate() {
        slot.set(n as u64);
    }
}

#[test]
fn test_doubling_emits_store_resized() {
    let (log, ()) = with_log(|| {
        let locals: Vec<Local<u64>> = (0..10).map(|_| Local::new()).collect();
        for (n, slot) in locals.iter().enumerate() {
            slot.set(n as u64);
        }
    });
    assert!(log.contains("store_resized"));
}

#[test]
fn test_snapshot_emits_inheritance_snapshot() {
    static TENANT: std::sync::LazyLock<InheritableLocal<u32>> =
        std::sync::LazyLock::new(InheritableLocal::new);

    let (log, bindings) = with_log(|| {
        TENANT.set(4);
        InheritableBindings::capture()
    });
    assert!(!bindings.is_empty());
    assert!(log.contains("inheritance_snapshot"));
}

#[test]
fn test_churn_emits_stale_expunged() {
    let (log, ()) = with_log(|| {
        for _ in 0..50 {
            let slot = Local::<u64>::with_initial(|| 1);
            slot.set(2);
        }
    });
    assert!(log.contains("stale_expunged"));
}
