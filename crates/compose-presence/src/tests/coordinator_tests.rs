use super::*;
use crate::{NodeLayout, PresenceRegistration};
use compose_core::{Runtime, RuntimeScheduler};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct CountingScheduler {
    frames: AtomicUsize,
}

impl RuntimeScheduler for CountingScheduler {
    fn schedule_frame(&self) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    runtime: Runtime,
    coordinator: PresenceCoordinator<&'static str>,
    exits: Rc<Cell<usize>>,
    spec: PresenceSpec,
}

impl Fixture {
    fn new() -> Self {
        Self::with_mode(PresenceMode::Sync)
    }

    fn with_mode(mode: PresenceMode) -> Self {
        let runtime = Runtime::new(Arc::new(CountingScheduler::default()));
        let coordinator = PresenceCoordinator::new(runtime.handle());
        let exits = Rc::new(Cell::new(0));
        let counter = exits.clone();
        let spec = PresenceSpec::new(mode).on_exit_complete(move || counter.set(counter.get() + 1));
        Self {
            runtime,
            coordinator,
            exits,
            spec,
        }
    }

    /// Runs a pass and consumes the frame request it produced, like a host
    /// that just rendered.
    fn render(&self, keys: &[&'static str]) -> Vec<PresenceNode<&'static str>> {
        let nodes = self.coordinator.evaluate(children(keys), &self.spec);
        self.runtime.set_needs_frame(false);
        nodes
    }

    /// Gives queued presence work its scheduling opportunity.
    fn settle(&self) {
        let handle = self.runtime.handle();
        while handle.has_pending_tasks() {
            handle.drain_tasks();
        }
    }

    fn committed(&self) -> Vec<PresenceKey> {
        self.coordinator.committed_keys()
    }
}

fn children(keys: &[&'static str]) -> Vec<PresenceChild<&'static str>> {
    keys.iter().map(|key| PresenceChild::new(*key, *key)).collect()
}

fn rendered(nodes: &[PresenceNode<&'static str>]) -> Vec<(&'static str, bool)> {
    nodes
        .iter()
        .map(|node| (*node.content(), node.is_present()))
        .collect()
}

fn keys(keys: &[&'static str]) -> Vec<PresenceKey> {
    keys.iter().map(|key| PresenceKey::from(*key)).collect()
}

#[test]
fn first_pass_renders_everything_present() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a", "b"]);
    assert_eq!(rendered(&nodes), vec![("a", true), ("b", true)]);
    assert!(nodes.iter().all(|node| node.context().initial().is_none()));
    assert!(fixture.coordinator.is_mounted());
    assert_eq!(fixture.committed(), keys(&["a", "b"]));
}

#[test]
fn initial_false_only_applies_to_the_first_pass() {
    let mut fixture = Fixture::new();
    fixture.spec = fixture.spec.clone().initial(false);
    let nodes = fixture.render(&["a"]);
    assert_eq!(nodes[0].context().initial(), Some(false));

    let nodes = fixture.render(&["a", "b"]);
    assert_eq!(nodes[0].context().initial(), None);
    assert_eq!(nodes[1].context().initial(), None);
}

#[test]
fn stable_key_set_never_exits() {
    let fixture = Fixture::new();
    fixture.render(&["a", "b"]);
    fixture.render(&["a", "b"]);
    let nodes = fixture.render(&["b", "a"]);
    fixture.settle();

    assert_eq!(rendered(&nodes), vec![("b", true), ("a", true)]);
    assert!(fixture.coordinator.exiting_keys().is_empty());
    assert_eq!(fixture.exits.get(), 0);
    assert!(!fixture.runtime.needs_frame());
}

#[test]
fn removed_middle_child_exits_in_place_then_leaves() {
    let fixture = Fixture::new();
    fixture.render(&["a", "b", "c"]);

    let nodes = fixture.render(&["a", "c"]);
    assert_eq!(rendered(&nodes), vec![("a", true), ("b", false), ("c", true)]);
    assert!(fixture.coordinator.is_exiting(&PresenceKey::from("b")));
    assert_eq!(fixture.committed(), keys(&["a", "b", "c"]));

    fixture.settle();
    assert_eq!(fixture.exits.get(), 1);
    assert!(fixture.runtime.needs_frame(), "drained exit asks for a pass");
    assert_eq!(fixture.committed(), keys(&["a", "c"]));

    let nodes = fixture.render(&["a", "c"]);
    assert_eq!(rendered(&nodes), vec![("a", true), ("c", true)]);
}

#[test]
fn exit_waits_for_every_registrant() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a", "b"]);
    let context = nodes[1].context().clone();
    let _fade = context.register(1);
    let _slide = context.register(2);

    fixture.render(&["a"]);
    fixture.settle();
    assert_eq!(fixture.exits.get(), 0);
    assert_eq!(fixture.coordinator.exiting_keys(), keys(&["b"]));

    context.report_done(1);
    assert_eq!(fixture.exits.get(), 0);
    context.report_done(2);
    assert_eq!(fixture.exits.get(), 1);
    assert_eq!(fixture.committed(), keys(&["a"]));
    assert!(fixture.coordinator.context(&PresenceKey::from("b")).is_none());

    context.report_done(2);
    assert_eq!(fixture.exits.get(), 1);
}

#[test]
fn double_report_counts_once() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a"]);
    let context = nodes[0].context().clone();
    let _first = context.register(1);
    let _second = context.register(2);

    fixture.render(&[]);
    context.report_done(1);
    context.report_done(1);
    fixture.settle();
    assert_eq!(fixture.exits.get(), 0);
    assert_eq!(context.pending_registrants(), 1);
}

#[test]
fn reappearing_child_cancels_its_exit() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a"]);
    let context = nodes[0].context().clone();
    let _fade = context.register(1);

    let nodes = fixture.render(&[]);
    assert_eq!(rendered(&nodes), vec![("a", false)]);

    let nodes = fixture.render(&["a"]);
    assert_eq!(rendered(&nodes), vec![("a", true)]);
    assert!(fixture.coordinator.exiting_keys().is_empty());

    context.report_done(1);
    fixture.settle();
    assert_eq!(fixture.exits.get(), 0);
    assert!(!fixture.runtime.needs_frame());
    assert_eq!(fixture.committed(), keys(&["a"]));
}

#[test]
fn reappearing_before_the_empty_exit_check_cancels_it() {
    let fixture = Fixture::new();
    fixture.render(&["a"]);
    fixture.render(&[]);
    fixture.render(&["a"]);
    fixture.settle();

    assert_eq!(fixture.exits.get(), 0);
    assert_eq!(fixture.committed(), keys(&["a"]));
}

type Held = Option<PresenceRegistration>;

fn holding(key: &'static str, registration: Held) -> PresenceChild<Held> {
    PresenceChild::new(key, registration)
}

#[test]
fn completion_deferred_from_an_earlier_exit_cycle_is_ignored() {
    let runtime = Runtime::new(Arc::new(CountingScheduler::default()));
    let handle = runtime.handle();
    let coordinator: PresenceCoordinator<Held> = PresenceCoordinator::new(handle.clone());
    let spec = PresenceSpec::default();

    let a = coordinator.evaluate([holding("a", None), holding("b", None)], &spec)[0]
        .context()
        .clone();
    // "b" owns the only registration on "a".
    coordinator.evaluate([holding("b", Some(a.register(1)))], &spec);
    assert!(coordinator.is_exiting(&PresenceKey::from("a")));

    // Replacing b's content releases the registration in the middle of a
    // pass, so a's completion waits for the next drain.
    coordinator.evaluate([holding("b", None)], &spec);
    assert!(handle.has_pending_tasks());

    // "a" comes back, then leaves again with a participant still running.
    coordinator.evaluate([holding("a", None), holding("b", None)], &spec);
    let _stuck = a.register(2);
    coordinator.evaluate([holding("b", None)], &spec);

    while handle.has_pending_tasks() {
        handle.drain_tasks();
    }
    assert!(coordinator.is_exiting(&PresenceKey::from("a")));
    assert_eq!(coordinator.committed_keys(), keys(&["a", "b"]));
    assert_eq!(a.pending_registrants(), 1);
}

#[test]
fn wait_mode_forgets_children_that_were_never_rendered() {
    let fixture = Fixture::with_mode(PresenceMode::Wait);
    let nodes = fixture.render(&["a"]);
    let _stuck = nodes[0].context().register(1);
    fixture.render(&[]);

    for key in ["k0", "k1", "k2", "k3"] {
        let nodes = fixture.render(&[key]);
        assert_eq!(rendered(&nodes), vec![("a", false)]);
    }
    fixture.render(&[]);

    let state = fixture.coordinator.state.borrow();
    assert_eq!(state.known.len(), 1);
    assert!(state.known.contains_key(&PresenceKey::from("a")));
}

#[test]
fn resurrected_child_rearms_registrants_on_next_exit() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a"]);
    let context = nodes[0].context().clone();
    let _first = context.register(1);
    let _second = context.register(2);

    fixture.render(&[]);
    context.report_done(1);
    fixture.render(&["a"]);
    fixture.render(&[]);

    context.report_done(2);
    assert_eq!(fixture.exits.get(), 0, "registrant 1 must finish again");
    context.report_done(1);
    assert_eq!(fixture.exits.get(), 1);
}

#[test]
fn global_exit_waits_for_the_slowest_child() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["x", "y"]);
    let x = nodes[0].context().clone();
    let _stuck = x.register(1);

    let nodes = fixture.render(&[]);
    assert_eq!(rendered(&nodes), vec![("x", false), ("y", false)]);

    fixture.settle();
    assert_eq!(fixture.committed(), keys(&["x"]));
    assert_eq!(fixture.exits.get(), 0);
    assert!(!fixture.runtime.needs_frame());

    let nodes = fixture.render(&[]);
    assert_eq!(rendered(&nodes), vec![("x", false)]);

    x.report_done(1);
    assert_eq!(fixture.exits.get(), 1);
    assert!(fixture.committed().is_empty());
    assert!(fixture.render(&[]).is_empty());
}

#[test]
fn exiting_child_keeps_its_index_among_new_siblings() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a", "b", "c"]);
    let _hold = nodes[1].context().register(1);

    let nodes = fixture.render(&["d", "a", "c"]);
    assert_eq!(
        rendered(&nodes),
        vec![("d", true), ("b", false), ("a", true), ("c", true)]
    );
}

#[test]
fn exiting_children_splice_in_committed_order() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a", "b", "c", "d"]);
    let _holds: Vec<_> = nodes
        .iter()
        .map(|node| node.context().register(1))
        .collect();

    let nodes = fixture.render(&["c"]);
    assert_eq!(
        rendered(&nodes),
        vec![("a", false), ("b", false), ("c", true), ("d", false)]
    );
    assert_eq!(fixture.coordinator.exiting_keys(), keys(&["a", "b", "d"]));
}

#[test]
fn still_exiting_child_is_not_rearmed_by_later_passes() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a", "b"]);
    let context = nodes[1].context().clone();
    let _first = context.register(1);
    let _second = context.register(2);

    fixture.render(&["a"]);
    context.report_done(1);

    let nodes = fixture.render(&["a", "c"]);
    assert_eq!(
        rendered(&nodes),
        vec![("a", true), ("b", false), ("c", true)]
    );
    assert_eq!(context.pending_registrants(), 1);

    context.report_done(2);
    assert_eq!(fixture.exits.get(), 1);
    assert_eq!(fixture.committed(), keys(&["a", "c"]));
}

#[test]
fn exiting_child_renders_its_latest_descriptor() {
    let fixture = Fixture::new();
    fixture
        .coordinator
        .evaluate([PresenceChild::new("a", "first")], &fixture.spec);
    fixture
        .coordinator
        .evaluate([PresenceChild::new("a", "second")], &fixture.spec);
    let nodes = fixture.coordinator.evaluate([], &fixture.spec);
    assert_eq!(rendered(&nodes), vec![("second", false)]);
}

#[test]
fn wait_mode_holds_entering_children_until_exits_drain() {
    let fixture = Fixture::with_mode(PresenceMode::Wait);
    fixture.render(&["a"]);

    let nodes = fixture.render(&["b"]);
    assert_eq!(rendered(&nodes), vec![("a", false)]);

    fixture.settle();
    assert_eq!(fixture.exits.get(), 1);
    assert!(fixture.runtime.needs_frame());

    let nodes = fixture.render(&["b"]);
    assert_eq!(rendered(&nodes), vec![("b", true)]);
}

#[test]
fn pop_layout_wraps_every_node() {
    let fixture = Fixture::with_mode(PresenceMode::PopLayout);
    fixture.render(&["a", "b"]);
    let nodes = fixture.render(&["a"]);
    assert!(nodes
        .iter()
        .all(|node| node.layout() == NodeLayout::PopLayout));

    let fixture = Fixture::new();
    let nodes = fixture.render(&["a"]);
    assert_eq!(nodes[0].layout(), NodeLayout::InPlace);
}

#[test]
fn custom_value_reaches_exiting_children() {
    let mut fixture = Fixture::new();
    fixture.render(&["a"]);
    fixture.spec = fixture.spec.clone().custom(String::from("left"));
    let nodes = fixture.render(&[]);
    assert_eq!(
        nodes[0].context().custom_as::<String>().as_deref(),
        Some(&String::from("left"))
    );
}

#[test]
fn latest_global_exit_callback_is_used() {
    let mut fixture = Fixture::new();
    fixture.render(&["a"]);
    let late = Rc::new(Cell::new(0));
    let counter = late.clone();
    fixture.spec = fixture
        .spec
        .clone()
        .on_exit_complete(move || counter.set(counter.get() + 1));
    fixture.render(&[]);
    fixture.settle();
    assert_eq!(late.get(), 1);
    assert_eq!(fixture.exits.get(), 0);
}

#[test]
fn dropping_a_registration_mid_exit_unblocks_removal() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a"]);
    let registration = nodes[0].context().register(9);

    fixture.render(&[]);
    fixture.settle();
    assert_eq!(fixture.exits.get(), 0);

    drop(registration);
    assert_eq!(fixture.exits.get(), 1);
}

#[test]
fn teardown_resets_and_ignores_late_completions() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a"]);
    let context = nodes[0].context().clone();
    let _fade = context.register(1);
    fixture.render(&[]);

    fixture.coordinator.teardown();
    assert!(!fixture.coordinator.is_mounted());
    assert!(fixture.committed().is_empty());

    context.report_done(1);
    assert_eq!(fixture.exits.get(), 0);
    assert!(!fixture.runtime.needs_frame());

    let nodes = fixture.render(&["b"]);
    assert_eq!(rendered(&nodes), vec![("b", true)]);
    assert_eq!(fixture.committed(), keys(&["b"]));
}

#[test]
fn completion_after_coordinator_drop_is_ignored() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a"]);
    let context = nodes[0].context().clone();
    let _fade = context.register(1);
    fixture.render(&[]);

    let Fixture {
        runtime,
        coordinator,
        exits,
        ..
    } = fixture;
    drop(nodes);
    drop(coordinator);
    context.report_done(1);
    assert_eq!(exits.get(), 0);
    assert!(!runtime.needs_frame());
}

#[test]
fn drained_exit_after_host_teardown_skips_reevaluation() {
    let fixture = Fixture::new();
    let nodes = fixture.render(&["a"]);
    let context = nodes[0].context().clone();
    let _fade = context.register(1);
    fixture.render(&[]);

    let Fixture {
        runtime,
        coordinator,
        exits,
        ..
    } = fixture;
    drop(runtime);
    context.report_done(1);
    assert_eq!(exits.get(), 0);
    assert!(coordinator.committed_keys().is_empty());
}

#[test]
fn duplicate_keys_do_not_panic() {
    let fixture = Fixture::new();
    fixture.render(&["a", "a"]);
    let nodes = fixture.render(&["a", "b", "a"]);
    assert!(!nodes.is_empty());
}

#[test]
fn integer_keys_participate_like_strings() {
    let runtime = Runtime::new(Arc::new(CountingScheduler::default()));
    let coordinator: PresenceCoordinator<u32> = PresenceCoordinator::new(runtime.handle());
    let spec = PresenceSpec::default();
    coordinator.evaluate((1u32..=3).map(|id| PresenceChild::new(id, id)), &spec);
    let nodes = coordinator.evaluate([1u32, 3].map(|id| PresenceChild::new(id, id)), &spec);
    let presence: Vec<(u32, bool)> = nodes
        .iter()
        .map(|node| (*node.content(), node.is_present()))
        .collect();
    assert_eq!(presence, vec![(1, true), (2, false), (3, true)]);
}
