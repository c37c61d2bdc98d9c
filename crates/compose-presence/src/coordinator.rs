//! Keyed presence reconciliation.
//!
//! [`PresenceCoordinator`] diffs each requested child sequence against the
//! sequence it rendered last and keeps children that disappeared on screen,
//! flagged as exiting, until their [`PresenceContext`] reports that every
//! nested participant is done. The whole living record sits in a single
//! [`PresenceState`] that is only touched by two entry points: an evaluation
//! pass and an exit completion.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use compose_core::collections::map::{HashMap, HashSet};
use compose_core::RuntimeHandle;

use crate::aggregator::{AggregatorInner, CompletionCallback, PresenceAggregator};
use crate::key::{child_keys, ensure_unique_keys};
use crate::node::{PresenceMode, PresenceNode, PresenceSpec};
use crate::{PresenceChild, PresenceContext, PresenceKey};

struct PresenceState<C> {
    /// Most recent descriptor per key. Every exiting key has an entry.
    known: HashMap<PresenceKey, PresenceChild<C>>,
    /// What the last pass rendered, exiting children included.
    committed: Vec<PresenceChild<C>>, // FUTURE(no_std): replace Vec with bounded ordering buffer.
    latest_target: Vec<PresenceChild<C>>,
    exiting: HashSet<PresenceKey>,
    aggregators: HashMap<PresenceKey, PresenceAggregator>,
    first_pass: bool,
    mounted: bool,
    on_exit_complete: Option<Rc<dyn Fn()>>,
}

struct Pass<C> {
    nodes: Vec<PresenceNode<C>>,
    newly_exiting: Vec<PresenceAggregator>,
}

impl<C> PresenceState<C> {
    fn new() -> Self {
        Self {
            known: HashMap::default(),
            committed: Vec::new(),
            latest_target: Vec::new(),
            exiting: HashSet::default(),
            aggregators: HashMap::default(),
            first_pass: true,
            mounted: false,
            on_exit_complete: None,
        }
    }

    fn aggregator(&mut self, key: &PresenceKey) -> PresenceAggregator {
        self.aggregators
            .entry(key.clone())
            .or_insert_with(|| PresenceAggregator::new(key.clone()))
            .clone()
    }

    /// First pass: everything is present, nothing is diffed.
    fn mount(&mut self, target: Vec<PresenceChild<C>>, spec: &PresenceSpec) -> Pass<C> {
        let initial = if spec.initial { None } else { Some(false) };
        let mut nodes = Vec::with_capacity(target.len());
        for child in &target {
            let aggregator = self.aggregator(child.key());
            aggregator.enter();
            aggregator.update(spec.custom.clone(), initial);
            nodes.push(PresenceNode::new(
                child.clone(),
                PresenceContext::new(aggregator),
                spec.mode,
            ));
        }
        self.first_pass = false;
        self.commit(&nodes, target);
        Pass {
            nodes,
            newly_exiting: Vec::new(),
        }
    }

    fn reconcile(
        &mut self,
        target: Vec<PresenceChild<C>>,
        spec: &PresenceSpec,
        exit_callback: impl Fn(&PresenceAggregator) -> CompletionCallback,
    ) -> Pass<C> {
        let present_keys = child_keys(&self.committed);
        let target_keys: HashSet<PresenceKey> =
            target.iter().map(|child| child.key().clone()).collect();

        for key in &present_keys {
            if !target_keys.contains(key) && self.exiting.insert(key.clone()) {
                log::debug!("presence {key}: exiting");
            }
        }

        let resurrected: Vec<PresenceKey> = self
            .exiting
            .iter()
            .filter(|key| target_keys.contains(*key))
            .cloned()
            .collect();
        for key in resurrected {
            self.exiting.remove(&key);
            log::debug!("presence {key}: back before its exit finished");
        }

        let missing: Vec<PresenceKey> = self
            .exiting
            .iter()
            .filter(|key| !self.known.contains_key(*key))
            .cloned()
            .collect();
        for key in missing {
            log::warn!("presence {key}: exiting without a known descriptor, dropping it");
            self.exiting.remove(&key);
        }

        let mut rendered: Vec<(PresenceChild<C>, bool)> =
            if spec.mode == PresenceMode::Wait && !self.exiting.is_empty() {
                Vec::new()
            } else {
                target.iter().map(|child| (child.clone(), true)).collect()
            };

        let positions: HashMap<&PresenceKey, usize> = present_keys
            .iter()
            .enumerate()
            .map(|(index, key)| (key, index))
            .collect();
        let mut exiting: Vec<(usize, PresenceChild<C>)> = self
            .exiting
            .iter()
            .filter_map(|key| {
                let index = positions.get(key).copied().unwrap_or(usize::MAX);
                self.known.get(key).map(|child| (index, child.clone()))
            })
            .collect();
        exiting.sort_by_key(|(index, _)| *index);
        for (index, child) in exiting {
            let at = index.min(rendered.len());
            rendered.insert(at, (child, false));
        }

        let mut nodes = Vec::with_capacity(rendered.len());
        let mut newly_exiting = Vec::new();
        for (child, present) in rendered {
            let aggregator = self.aggregator(child.key());
            if present {
                aggregator.enter();
            } else if aggregator.begin_exit(exit_callback(&aggregator)) {
                newly_exiting.push(aggregator.clone());
            }
            aggregator.update(spec.custom.clone(), None);
            nodes.push(PresenceNode::new(
                child,
                PresenceContext::new(aggregator),
                spec.mode,
            ));
        }

        {
            let live: HashSet<&PresenceKey> = nodes.iter().map(|node| node.key()).collect();
            self.aggregators.retain(|key, aggregator| {
                let keep = live.contains(key);
                if !keep {
                    aggregator.detach();
                }
                keep
            });
        }

        self.commit(&nodes, target);
        Pass {
            nodes,
            newly_exiting,
        }
    }

    fn commit(&mut self, nodes: &[PresenceNode<C>], target: Vec<PresenceChild<C>>) {
        for child in &target {
            self.known.insert(child.key().clone(), child.clone());
        }
        {
            // Keys that were requested but never rendered have no further use.
            let wanted: HashSet<&PresenceKey> = target.iter().map(|child| child.key()).collect();
            let exiting = &self.exiting;
            self.known.retain(|key, _| wanted.contains(key) || exiting.contains(key));
        }
        self.committed = nodes.iter().map(|node| node.child().clone()).collect();
        self.latest_target = target;
    }

    /// Returns the global exit callback when this completion drained the
    /// exit cycle, `None` otherwise.
    ///
    /// Only the aggregator that fired `exit`, still sitting in the exit cycle
    /// that fired, may remove `key`. Completions from an earlier cycle, or from
    /// before a teardown, are ignored.
    fn finish_exit(
        &mut self,
        key: &PresenceKey,
        exit: &Weak<AggregatorInner>,
    ) -> Option<Option<Rc<dyn Fn()>>> {
        let current = self
            .aggregators
            .get(key)
            .is_some_and(|aggregator| aggregator.is(exit) && aggregator.exit_fired());
        if !self.mounted || !current || !self.exiting.remove(key) {
            log::trace!("presence {key}: ignoring stale exit completion");
            return None;
        }
        self.known.remove(key);
        self.committed.retain(|child| child.key() != key);
        if let Some(aggregator) = self.aggregators.remove(key) {
            aggregator.detach();
        }
        log::debug!(
            "presence {key}: exit finished, {} still exiting",
            self.exiting.len()
        );
        if !self.exiting.is_empty() {
            return None;
        }
        self.committed = self.latest_target.clone();
        Some(self.on_exit_complete.clone())
    }
}

/// Keeps removed children rendered until their exit finished.
///
/// Drive it with [`evaluate`](Self::evaluate) on every render of the
/// surrounding tree. When the last exiting child finishes, the coordinator
/// asks the host for another pass through its [`RuntimeHandle`] and calls the
/// global exit callback.
///
/// The coordinator is single threaded and must not be re-entered: the host
/// serializes evaluation passes and completion signals.
pub struct PresenceCoordinator<C> {
    state: Rc<RefCell<PresenceState<C>>>,
    runtime: RuntimeHandle,
}

impl<C: 'static> PresenceCoordinator<C> {
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self {
            state: Rc::new(RefCell::new(PresenceState::new())),
            runtime,
        }
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.clone()
    }

    /// Runs one evaluation pass and returns the nodes to render, exiting
    /// children included at the position they last held.
    ///
    /// Children must carry unique keys. A pass with duplicate keys is logged
    /// and its outcome is unspecified.
    pub fn evaluate(
        &self,
        children: impl IntoIterator<Item = PresenceChild<C>>,
        spec: &PresenceSpec,
    ) -> Vec<PresenceNode<C>> {
        let target: Vec<PresenceChild<C>> = children.into_iter().collect();
        if let Err(err) = ensure_unique_keys(&target) {
            log::warn!("presence children must be uniquely keyed: {err}");
        }

        let pass = {
            let mut state = self.state.borrow_mut();
            state.mounted = true;
            state.on_exit_complete = spec.on_exit_complete.clone();
            if state.first_pass {
                state.mount(target, spec)
            } else {
                let weak = Rc::downgrade(&self.state);
                let runtime = self.runtime.clone();
                state.reconcile(target, spec, |aggregator: &PresenceAggregator| {
                    let (weak, runtime) = (weak.clone(), runtime.clone());
                    let (exit, key) = (aggregator.downgrade(), aggregator.key().clone());
                    let callback: CompletionCallback =
                        Rc::new(move || complete_exit(&weak, &runtime, &exit, &key));
                    callback
                })
            }
        };

        for aggregator in pass.newly_exiting {
            log::trace!(
                "presence {}: checking for an empty exit at the next opportunity",
                aggregator.key()
            );
            self.runtime
                .spawn_task(Box::new(move || aggregator.complete_if_settled()));
        }
        pass.nodes
    }

    /// Unmounts the coordinator. All tracking is dropped and pending
    /// completions are ignored; the next pass starts from scratch.
    pub fn teardown(&self) {
        let retired = mem::replace(&mut *self.state.borrow_mut(), PresenceState::new());
        for aggregator in retired.aggregators.values() {
            aggregator.detach();
        }
        log::debug!(
            "presence coordinator torn down with {} exiting",
            retired.exiting.len()
        );
    }

    pub fn is_mounted(&self) -> bool {
        self.state.borrow().mounted
    }

    /// Keys of the last committed pass, in render order.
    pub fn committed_keys(&self) -> Vec<PresenceKey> {
        child_keys(&self.state.borrow().committed)
    }

    /// Exiting keys in render order.
    pub fn exiting_keys(&self) -> Vec<PresenceKey> {
        let state = self.state.borrow();
        let mut keys: Vec<PresenceKey> = state
            .committed
            .iter()
            .map(|child| child.key())
            .filter(|key| state.exiting.contains(*key))
            .cloned()
            .collect();
        for key in &state.exiting {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    pub fn is_exiting(&self, key: &PresenceKey) -> bool {
        self.state.borrow().exiting.contains(key)
    }

    pub fn context(&self, key: &PresenceKey) -> Option<PresenceContext> {
        self.state
            .borrow()
            .aggregators
            .get(key)
            .cloned()
            .map(PresenceContext::new)
    }
}

impl<C> fmt::Debug for PresenceCoordinator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => f
                .debug_struct("PresenceCoordinator")
                .field("committed", &child_keys(&state.committed))
                .field("exiting", &state.exiting)
                .field("mounted", &state.mounted)
                .finish(),
            Err(_) => f.write_str("PresenceCoordinator { <busy> }"),
        }
    }
}

fn complete_exit<C: 'static>(
    state: &Weak<RefCell<PresenceState<C>>>,
    runtime: &RuntimeHandle,
    exit: &Weak<AggregatorInner>,
    key: &PresenceKey,
) {
    let Some(shared) = state.upgrade() else {
        log::trace!("presence {key}: exit finished after its coordinator was dropped");
        return;
    };
    let drained = match shared.try_borrow_mut() {
        Ok(mut state) => state.finish_exit(key, exit),
        Err(_) => {
            if runtime.is_alive() {
                log::trace!("presence {key}: coordinator busy, deferring exit completion");
                let (state, retry_runtime) = (state.clone(), runtime.clone());
                let (exit, key) = (exit.clone(), key.clone());
                runtime.spawn_task(Box::new(move || {
                    complete_exit(&state, &retry_runtime, &exit, &key)
                }));
            }
            return;
        }
    };
    let Some(on_exit_complete) = drained else {
        return;
    };
    if !runtime.is_alive() {
        log::trace!("presence exit cycle drained after host teardown");
        return;
    }
    log::debug!("presence exit cycle drained, requesting re-evaluation");
    runtime.schedule();
    if let Some(callback) = on_exit_complete {
        callback();
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
