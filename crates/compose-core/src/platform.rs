//! Platform abstraction traits for Compose runtime services.
//!
//! The presence engine never drives frames itself. It asks the host to run
//! another evaluation pass through a [`RuntimeScheduler`], which keeps the
//! engine independent from any particular event loop.

/// Schedules work for the Compose runtime.
///
/// Implementations must be safe to call from any thread; the request only
/// needs to be observed by the thread that drives evaluation.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host run another evaluation pass.
    fn schedule_frame(&self);
}
