//! Completion aggregation for a single tracked child.
//!
//! One aggregator lives for as long as its key is present or exiting. Nested
//! participants register with it through a [`PresenceContext`]; the
//! coordinator flips it between present and exiting. While exiting it fires
//! its completion callback exactly once, the first time every registered
//! participant is done.
//!
//! [`PresenceContext`]: crate::PresenceContext

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use compose_core::{next_instance_id, InstanceId};

use crate::registry::PendingSet;
use crate::PresenceKey;

/// Opaque value forwarded from the caller to every tracked child.
pub type Custom = Rc<dyn Any>;

/// Identifier of a nested participant inside one aggregator.
pub type RegistrantId = InstanceId;

pub(crate) type CompletionCallback = Rc<dyn Fn()>;

pub(crate) struct AggregatorInner {
    id: InstanceId,
    key: PresenceKey,
    is_present: Cell<bool>,
    custom: RefCell<Option<Custom>>,
    initial: Cell<Option<bool>>,
    registry: RefCell<PendingSet<RegistrantId>>,
    on_complete: RefCell<Option<CompletionCallback>>,
    fired: Cell<bool>,
}

#[derive(Clone)]
pub(crate) struct PresenceAggregator {
    inner: Rc<AggregatorInner>,
}

impl PresenceAggregator {
    pub(crate) fn new(key: PresenceKey) -> Self {
        Self {
            inner: Rc::new(AggregatorInner {
                id: next_instance_id(),
                key,
                is_present: Cell::new(true),
                custom: RefCell::new(None),
                initial: Cell::new(None),
                registry: RefCell::new(PendingSet::new()),
                on_complete: RefCell::new(None),
                fired: Cell::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<AggregatorInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<AggregatorInner> {
        Rc::downgrade(&self.inner)
    }

    /// Whether `other` points at this aggregator.
    pub(crate) fn is(&self, other: &Weak<AggregatorInner>) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.inner), other.as_ptr())
    }

    /// True between this exit cycle's completion firing and the next
    /// transition.
    pub(crate) fn exit_fired(&self) -> bool {
        !self.inner.is_present.get() && self.inner.fired.get()
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.inner.id
    }

    pub(crate) fn key(&self) -> &PresenceKey {
        &self.inner.key
    }

    pub(crate) fn is_present(&self) -> bool {
        self.inner.is_present.get()
    }

    pub(crate) fn custom(&self) -> Option<Custom> {
        self.inner.custom.borrow().clone()
    }

    pub(crate) fn initial(&self) -> Option<bool> {
        self.inner.initial.get()
    }

    pub(crate) fn pending_registrants(&self) -> usize {
        self.inner.registry.borrow().pending()
    }

    pub(crate) fn registrant_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Refreshes the values nested participants read on every pass.
    pub(crate) fn update(&self, custom: Option<Custom>, initial: Option<bool>) {
        *self.inner.custom.borrow_mut() = custom;
        self.inner.initial.set(initial);
    }

    /// Marks the child present and cancels any pending exit without firing.
    pub(crate) fn enter(&self) {
        self.inner.is_present.set(true);
        self.inner.fired.set(false);
        self.inner.on_complete.borrow_mut().take();
    }

    /// Present to exiting transition. Re-arms the registry for a fresh exit
    /// cycle. Returns `false` when the child was already exiting.
    pub(crate) fn begin_exit(&self, on_complete: CompletionCallback) -> bool {
        if !self.inner.is_present.replace(false) {
            return false;
        }
        self.inner.registry.borrow_mut().reset();
        self.inner.fired.set(false);
        *self.inner.on_complete.borrow_mut() = Some(on_complete);
        true
    }

    /// Disarms the aggregator for good; later signals are ignored.
    pub(crate) fn detach(&self) {
        self.inner.on_complete.borrow_mut().take();
    }

    pub(crate) fn register(&self, id: RegistrantId) {
        self.inner.registry.borrow_mut().add(id);
    }

    pub(crate) fn unregister(&self, id: RegistrantId) {
        let removed = self.inner.registry.borrow_mut().remove(&id);
        if removed && !self.is_present() {
            self.complete_if_settled();
        }
    }

    pub(crate) fn report_done(&self, id: RegistrantId) {
        if !self.inner.registry.borrow_mut().mark_done(&id) {
            log::trace!(
                "presence {}: done signal from unregistered participant {id}",
                self.inner.key
            );
        }
        self.complete_if_settled();
    }

    /// Fires the completion callback if the child is exiting, armed, not yet
    /// fired this cycle, and no registered participant is pending.
    pub(crate) fn complete_if_settled(&self) {
        if self.inner.is_present.get() || self.inner.fired.get() {
            return;
        }
        if !self.inner.registry.borrow().all_done() {
            return;
        }
        let callback = self.inner.on_complete.borrow().clone();
        if let Some(callback) = callback {
            self.inner.fired.set(true);
            callback();
        }
    }
}

impl fmt::Debug for PresenceAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceAggregator")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("is_present", &self.inner.is_present.get())
            .field("registry", &*self.inner.registry.borrow())
            .field("armed", &self.inner.on_complete.borrow().is_some())
            .field("fired", &self.inner.fired.get())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod tests;
