//! Testing utilities and harness for Compose-RS presence

pub mod testing;

// Re-export testing utilities
pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use compose_presence::{PresenceKey, PresenceMode, PresenceSpec};
}
