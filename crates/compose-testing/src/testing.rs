use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use compose_core::{Runtime, RuntimeHandle, RuntimeScheduler};
use compose_presence::{
    PresenceChild, PresenceContext, PresenceCoordinator, PresenceKey, PresenceNode, PresenceSpec,
};

/// Scheduler that only counts frame requests.
#[derive(Debug, Default)]
pub struct CountingScheduler {
    requests: AtomicUsize,
}

impl CountingScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl RuntimeScheduler for CountingScheduler {
    fn schedule_frame(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Headless harness for exercising a [`PresenceCoordinator`] in tests.
///
/// The rule plays the host: it owns the runtime, keeps the requested child
/// keys, renders them on demand and drains queued presence work. Each child's
/// content is its key rendered as a string.
pub struct PresenceTestRule {
    scheduler: Arc<CountingScheduler>,
    runtime: Option<Runtime>,
    coordinator: PresenceCoordinator<String>,
    spec: PresenceSpec,
    target: Vec<PresenceKey>,
    nodes: Vec<PresenceNode<String>>,
    renders: usize,
    exit_completions: Rc<Cell<usize>>,
}

impl PresenceTestRule {
    /// Create a rule with the default [`PresenceSpec`].
    pub fn new() -> Self {
        Self::with_spec(PresenceSpec::default())
    }

    /// Create a rule evaluating with `spec`. Exit-cycle completions are
    /// counted before `spec`'s own callback runs.
    pub fn with_spec(spec: PresenceSpec) -> Self {
        let scheduler = Arc::new(CountingScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        let coordinator = PresenceCoordinator::new(runtime.handle());
        let exit_completions = Rc::new(Cell::new(0));
        let mut rule = Self {
            scheduler,
            runtime: Some(runtime),
            coordinator,
            spec: PresenceSpec::default(),
            target: Vec::new(),
            nodes: Vec::new(),
            renders: 0,
            exit_completions,
        };
        rule.set_spec(spec);
        rule
    }

    /// Replace the spec used by later renders.
    pub fn set_spec(&mut self, spec: PresenceSpec) {
        let counter = self.exit_completions.clone();
        let user = spec.on_exit_complete.clone();
        self.spec = spec.on_exit_complete(move || {
            counter.set(counter.get() + 1);
            if let Some(callback) = &user {
                callback();
            }
        });
    }

    /// Request `keys` as the children and render them once.
    pub fn set_children<K: Into<PresenceKey>>(&mut self, keys: impl IntoIterator<Item = K>) {
        self.target = keys.into_iter().map(Into::into).collect();
        self.render();
    }

    /// Run one evaluation pass over the current children. The frame request
    /// this pass produced counts as consumed.
    pub fn render(&mut self) {
        let children = self
            .target
            .iter()
            .map(|key| PresenceChild::new(key.clone(), key.to_string()));
        self.nodes = self.coordinator.evaluate(children, &self.spec);
        self.renders += 1;
        if let Some(runtime) = &self.runtime {
            runtime.set_needs_frame(false);
        }
    }

    /// Run the presence work queued so far and return how many tasks ran.
    pub fn advance(&mut self) -> usize {
        self.runtime_handle().drain_tasks()
    }

    /// Drain queued work and honour re-evaluation requests until nothing is
    /// left to do.
    pub fn pump_until_idle(&mut self) {
        loop {
            let mut progressed = false;

            if self.advance() > 0 {
                progressed = true;
            }

            let wants_frame = self
                .runtime
                .as_ref()
                .map(Runtime::take_needs_frame)
                .unwrap_or(false);
            if wants_frame {
                log::trace!("presence test rule: re-rendering on request");
                self.render();
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    /// Drop the runtime as if the host went away.
    pub fn shutdown_host(&mut self) {
        self.runtime = None;
    }

    pub fn teardown(&mut self) {
        self.coordinator.teardown();
        self.nodes.clear();
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime
            .as_ref()
            .map(Runtime::handle)
            .unwrap_or_else(RuntimeHandle::detached)
    }

    pub fn coordinator(&self) -> &PresenceCoordinator<String> {
        &self.coordinator
    }

    pub fn nodes(&self) -> &[PresenceNode<String>] {
        &self.nodes
    }

    /// Keys of the last render, exiting children included.
    pub fn rendered_keys(&self) -> Vec<PresenceKey> {
        self.nodes.iter().map(|node| node.key().clone()).collect()
    }

    /// `(key, is_present)` for every node of the last render.
    pub fn presence(&self) -> Vec<(PresenceKey, bool)> {
        self.nodes
            .iter()
            .map(|node| (node.key().clone(), node.is_present()))
            .collect()
    }

    pub fn exiting_keys(&self) -> Vec<PresenceKey> {
        self.coordinator.exiting_keys()
    }

    pub fn context(&self, key: impl Into<PresenceKey>) -> Option<PresenceContext> {
        let key = key.into();
        self.nodes
            .iter()
            .find(|node| node.key() == &key)
            .map(|node| node.context().clone())
    }

    /// Number of drained exit cycles seen so far.
    pub fn exit_completions(&self) -> usize {
        self.exit_completions.get()
    }

    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn frame_requests(&self) -> usize {
        self.scheduler.requests()
    }
}

impl Default for PresenceTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects keys for assertions against the rule's accessors.
pub fn keys<K: Into<PresenceKey>>(keys: impl IntoIterator<Item = K>) -> Vec<PresenceKey> {
    keys.into_iter().map(Into::into).collect()
}

/// Convenience helper for tests that only need temporary access to a
/// `PresenceTestRule`.
pub fn run_test_presence<R>(f: impl FnOnce(&mut PresenceTestRule) -> R) -> R {
    let mut rule = PresenceTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compose_presence::PresenceMode;

    #[test]
    fn rule_renders_children_and_removes_finished_exits() {
        run_test_presence(|rule| {
            rule.set_children(["a", "b"]);
            assert_eq!(
                rule.presence(),
                vec![(PresenceKey::from("a"), true), (PresenceKey::from("b"), true)]
            );

            rule.set_children(["a"]);
            assert_eq!(rule.exiting_keys(), keys(["b"]));
            assert_eq!(rule.nodes()[1].content(), "\"b\"");

            rule.pump_until_idle();
            assert_eq!(rule.rendered_keys(), keys(["a"]));
            assert_eq!(rule.exit_completions(), 1);
        });
    }

    #[test]
    fn pump_stops_while_a_participant_is_pending() {
        let mut rule = PresenceTestRule::new();
        rule.set_children(["a"]);
        let participant = rule.context("a").map(|context| context.use_presence());

        rule.set_children(Vec::<PresenceKey>::new());
        let renders = rule.renders();
        rule.pump_until_idle();
        assert_eq!(rule.renders(), renders);
        assert_eq!(rule.rendered_keys(), keys(["a"]));

        if let Some(participant) = &participant {
            participant.safe_to_remove();
        }
        rule.pump_until_idle();
        assert!(rule.rendered_keys().is_empty());
    }

    #[test]
    fn user_exit_callback_still_runs() {
        let seen = Rc::new(Cell::new(false));
        let flag = seen.clone();
        let mut rule = PresenceTestRule::with_spec(
            PresenceSpec::new(PresenceMode::Sync).on_exit_complete(move || flag.set(true)),
        );
        rule.set_children([1, 2]);
        rule.set_children([2]);
        rule.pump_until_idle();
        assert!(seen.get());
        assert_eq!(rule.exit_completions(), 1);
    }

    #[test]
    fn shut_down_host_has_a_dead_handle() {
        let mut rule = PresenceTestRule::new();
        rule.shutdown_host();
        assert!(!rule.runtime_handle().is_alive());
        assert_eq!(rule.advance(), 0);
    }
}
