//! Inheritance across thread spawns: snapshot timing, child transforms,
//! one-shot divergence, and manual capture/install.

use std::sync::LazyLock;
use std::thread;

use crossbeam::channel;
use owner_local::metrics::inheritable_metrics;
use owner_local::{InheritableBindings, InheritableLocal, Local};

static REQUEST_ID: LazyLock<InheritableLocal<u64>> = LazyLock::new(InheritableLocal::new);

#[test]
fn test_spawned_thread_sees_the_spawner_bindings() {
    static TENANT: LazyLock<InheritableLocal<String>> = LazyLock::new(InheritableLocal::new);

    TENANT.set("acme".to_string());
    let inherited = owner_local::spawn(|| TENANT.get()).join().unwrap();
    assert_eq!(inherited, "acme");
}

#[test]
fn test_snapshot_is_taken_at_spawn_not_at_first_read() {
    REQUEST_ID.set(1);

    let (resume_tx, resume_rx) = channel::bounded::<()>(0);
    let child = owner_local::spawn(move || {
        // Read only after the spawner has overwritten its own binding.
        resume_rx.recv().unwrap();
        REQUEST_ID.get()
    });

    REQUEST_ID.set(2);
    resume_tx.send(()).unwrap();
    assert_eq!(child.join().unwrap(), 1);
}

#[test]
fn test_child_divergence_is_invisible_to_the_parent() {
    static PATH: LazyLock<InheritableLocal<String>> = LazyLock::new(InheritableLocal::new);

    PATH.set("root".to_string());
    let child_view = owner_local::spawn(|| {
        PATH.with_mut(|p| p.push_str("/child"));
        PATH.get()
    })
    .join()
    .unwrap();

    assert_eq!(child_view, "root/child");
    assert_eq!(PATH.get(), "root");
}

#[test]
fn test_transforms_compound_across_spawn_generations() {
    static DEPTH: LazyLock<InheritableLocal<u32>> =
        LazyLock::new(|| InheritableLocal::with_child_value(|| 0, |d| d + 1));

    DEPTH.set(0);
    let (child_depth, grandchild_depth) = owner_local::spawn(|| {
        let mine = DEPTH.get();
        let below = owner_local::spawn(|| DEPTH.get()).join().unwrap();
        (mine, below)
    })
    .join()
    .unwrap();

    assert_eq!(child_depth, 1);
    assert_eq!(grandchild_depth, 2);
}

#[test]
fn test_non_clone_values_inherit_through_the_transform() {
    struct RequestTag(u32);

    static TAG: LazyLock<InheritableLocal<RequestTag>> = LazyLock::new(|| {
        InheritableLocal::with_child_value(|| RequestTag(0), |t| RequestTag(t.0 + 100))
    });

    TAG.set(RequestTag(7));
    let child_tag = owner_local::spawn(|| TAG.with(|t| t.0)).join().unwrap();
    assert_eq!(child_tag, 107);
    assert_eq!(TAG.with(|t| t.0), 7);
}

#[test]
fn test_plain_locals_do_not_cross_spawn() {
    static SCRATCH: LazyLock<Local<u32>> = LazyLock::new(Local::new);

    SCRATCH.set(3);
    let (bound, value) = owner_local::spawn(|| (SCRATCH.is_set(), SCRATCH.get()))
        .join()
        .unwrap();

    assert!(!bound);
    assert_eq!(value, 0);
}

#[test]
fn test_spawn_without_inheritable_bindings_creates_no_child_table() {
    let child_has_table = owner_local::spawn(|| inheritable_metrics().is_some())
        .join()
        .unwrap();
    assert!(!child_has_table);
}

#[test]
fn test_bindings_of_dropped_facades_are_not_inherited() {
    static KEEP: LazyLock<InheritableLocal<u32>> = LazyLock::new(InheritableLocal::new);

    KEEP.set(1);
    let short_lived = InheritableLocal::<u32>::new();
    short_lived.set(6);
    drop(short_lived);

    let (value, entries) = owner_local::spawn(|| {
        let value = KEEP.get();
        (value, inheritable_metrics().unwrap().entries)
    })
    .join()
    .unwrap();

    assert_eq!(value, 1);
    assert_eq!(entries, 1);
}

#[test]
fn test_child_table_starts_at_the_spawner_capacity() {
    let locals: Vec<InheritableLocal<u32>> =
        (0..11).map(|_| InheritableLocal::with_initial(|| 0)).collect();
    for (n, slot) in (0_u32..).zip(locals.iter()) {
        slot.set(n);
    }

    let parent = inheritable_metrics().unwrap();
    assert_eq!(parent.capacity, 32);
    assert_eq!(parent.entries, 11);

    let child = owner_local::spawn(|| inheritable_metrics().unwrap())
        .join()
        .unwrap();
    assert_eq!(child.capacity, 32);
    assert_eq!(child.entries, 11);
}

#[test]
fn test_spawn_returns_the_closure_result() {
    assert_eq!(owner_local::spawn(|| 6 * 7).join().unwrap(), 42);
}

#[test]
fn test_manual_capture_reports_emptiness() {
    let bindings = InheritableBindings::capture();
    assert!(bindings.is_empty());
}

#[test]
fn test_manual_install_replaces_previous_bindings_wholesale() {
    static TENANT: LazyLock<InheritableLocal<u32>> = LazyLock::new(InheritableLocal::new);
    static REGION: LazyLock<InheritableLocal<String>> = LazyLock::new(InheritableLocal::new);

    TENANT.set(7);
    let bindings = InheritableBindings::capture();
    assert!(!bindings.is_empty());

    let (tenant, region_bound) = thread::spawn(move || {
        REGION.set("eu".to_string());
        bindings.install();
        (TENANT.get(), REGION.is_set())
    })
    .join()
    .unwrap();

    assert_eq!(tenant, 7);
    assert!(!region_bound);
}
