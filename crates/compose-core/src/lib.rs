#![doc = r"Host runtime primitives shared by the Compose-RS crates."]

pub mod collections;
pub mod hash;
pub mod platform;
pub mod runtime;

pub use platform::RuntimeScheduler;
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle, Task};

#[cfg(test)]
pub use runtime::TestScheduler;

use std::sync::atomic::{AtomicUsize, Ordering};

/// Group key in the host's key space.
pub type Key = u64;

/// Stable identifier of a runtime object instance.
pub type InstanceId = usize;

static NEXT_INSTANCE_ID: AtomicUsize = AtomicUsize::new(1);

/// Returns a process-unique id. Ids are never reused.
pub fn next_instance_id() -> InstanceId {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}
