//! Exit presence for keyed children in Compose-RS.
//!
//! A [`PresenceCoordinator`] keeps children that the caller stopped
//! requesting on screen, flagged as exiting, until every nested participant
//! registered through the child's [`PresenceContext`] reports done.
//!
//! ```
//! use std::sync::Arc;
//!
//! use compose_core::{DefaultScheduler, Runtime};
//! use compose_presence::{PresenceChild, PresenceCoordinator, PresenceSpec};
//!
//! let runtime = Runtime::new(Arc::new(DefaultScheduler));
//! let coordinator = PresenceCoordinator::new(runtime.handle());
//! let spec = PresenceSpec::default();
//!
//! coordinator.evaluate(["a", "b"].map(|key| PresenceChild::new(key, ())), &spec);
//! let nodes = coordinator.evaluate([PresenceChild::new("a", ())], &spec);
//! assert_eq!(nodes.len(), 2);
//! assert!(!nodes[1].is_present());
//!
//! // Nothing inside "b" registered, so it leaves at the next opportunity.
//! runtime.handle().drain_tasks();
//! assert_eq!(coordinator.evaluate([PresenceChild::new("a", ())], &spec).len(), 1);
//! ```

pub mod aggregator;
pub mod context;
pub mod coordinator;
pub mod key;
pub mod node;
pub mod registry;

pub use aggregator::{Custom, RegistrantId};
pub use context::{PresenceContext, PresenceParticipant, PresenceRegistration};
pub use coordinator::PresenceCoordinator;
pub use key::{child_keys, ensure_unique_keys, PresenceChild, PresenceKey};
pub use node::{NodeLayout, PresenceMode, PresenceNode, PresenceSpec};
pub use registry::PendingSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceError {
    DuplicateKey {
        key: PresenceKey,
        first: usize,
        second: usize,
    },
}

impl std::fmt::Display for PresenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceError::DuplicateKey { key, first, second } => {
                write!(f, "key {key} used by children {first} and {second}")
            }
        }
    }
}

impl std::error::Error for PresenceError {}

#[cfg(test)]
#[path = "tests/key_tests.rs"]
mod key_tests;
