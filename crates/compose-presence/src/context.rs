//! The per-child surface handed down to nested participants.

use std::fmt;
use std::rc::{Rc, Weak};

use compose_core::{next_instance_id, InstanceId};

use crate::aggregator::{AggregatorInner, Custom, PresenceAggregator, RegistrantId};
use crate::PresenceKey;

/// Read and signal access to the presence of one tracked child.
///
/// Contexts are cheap to clone. A context outlives its child safely: once the
/// child is removed every signal sent through it is ignored.
#[derive(Clone)]
pub struct PresenceContext {
    aggregator: PresenceAggregator,
}

impl PresenceContext {
    pub(crate) fn new(aggregator: PresenceAggregator) -> Self {
        Self { aggregator }
    }

    pub fn key(&self) -> &PresenceKey {
        self.aggregator.key()
    }

    /// Stable identifier of this child instance. Usable as a default
    /// registration id.
    pub fn id(&self) -> InstanceId {
        self.aggregator.id()
    }

    /// `false` from the moment the child is classified exiting.
    pub fn is_present(&self) -> bool {
        self.aggregator.is_present()
    }

    pub fn custom(&self) -> Option<Custom> {
        self.aggregator.custom()
    }

    pub fn custom_as<T: 'static>(&self) -> Option<Rc<T>> {
        self.custom().and_then(|custom| Rc::downcast::<T>(custom).ok())
    }

    /// `Some(false)` when the entry transition should be skipped because the
    /// child was part of the first pass of a coordinator created with
    /// `initial == false`.
    pub fn initial(&self) -> Option<bool> {
        self.aggregator.initial()
    }

    /// Registers a participant that delays removal until it reports done.
    pub fn register(&self, id: RegistrantId) -> PresenceRegistration {
        self.aggregator.register(id);
        PresenceRegistration {
            aggregator: Some(self.aggregator.downgrade()),
            id,
        }
    }

    /// Marks participant `id` as finished with its exit transition.
    pub fn report_done(&self, id: RegistrantId) {
        self.aggregator.report_done(id);
    }

    pub fn pending_registrants(&self) -> usize {
        self.aggregator.pending_registrants()
    }

    pub fn registrant_count(&self) -> usize {
        self.aggregator.registrant_count()
    }

    /// Registers a fresh participant and returns its handle.
    pub fn use_presence(&self) -> PresenceParticipant {
        let id = next_instance_id();
        PresenceParticipant {
            context: self.clone(),
            registration: self.register(id),
        }
    }
}

impl fmt::Debug for PresenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PresenceContext")
            .field(&self.aggregator)
            .finish()
    }
}

/// Capability returned by [`PresenceContext::register`].
///
/// Unregistering (explicitly or by dropping) removes the participant entirely,
/// so a participant that disappears mid-exit never blocks removal.
#[must_use = "dropping a registration unregisters the participant"]
pub struct PresenceRegistration {
    aggregator: Option<Weak<AggregatorInner>>,
    id: RegistrantId,
}

impl PresenceRegistration {
    pub fn id(&self) -> RegistrantId {
        self.id
    }

    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(inner) = self.aggregator.take().and_then(|weak| weak.upgrade()) {
            PresenceAggregator::from_inner(inner).unregister(self.id);
        }
    }
}

impl Drop for PresenceRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for PresenceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceRegistration")
            .field("id", &self.id)
            .field("active", &self.aggregator.is_some())
            .finish()
    }
}

/// A nested participant with its own registration.
#[derive(Debug)]
pub struct PresenceParticipant {
    context: PresenceContext,
    registration: PresenceRegistration,
}

impl PresenceParticipant {
    pub fn id(&self) -> RegistrantId {
        self.registration.id()
    }

    pub fn is_present(&self) -> bool {
        self.context.is_present()
    }

    pub fn context(&self) -> &PresenceContext {
        &self.context
    }

    /// Signals that this participant finished its exit and the child may be
    /// removed as far as it is concerned.
    pub fn safe_to_remove(&self) {
        self.context.report_done(self.registration.id());
    }
}

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod tests;
