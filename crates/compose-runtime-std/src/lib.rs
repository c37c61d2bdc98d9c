//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides a concrete implementation of the scheduler trait
//! defined in `compose-core`. Hosts construct a [`StdRuntime`], hand its
//! [`RuntimeHandle`] to presence coordinators and poll
//! [`StdRuntime::take_frame_request`] from their event loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use compose_core::{Runtime, RuntimeHandle, RuntimeScheduler};

type FrameWaker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that delegates work to Rust's threading primitives.
pub struct StdScheduler {
    frame_requested: AtomicBool,
    frame_waker: RwLock<Option<FrameWaker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            frame_requested: AtomicBool::new(false),
            frame_waker: RwLock::new(None),
        }
    }

    /// Returns whether a frame has been requested since the last call.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker that will be invoked whenever a new frame is scheduled.
    pub fn set_frame_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.replace_waker(Some(Arc::new(waker)));
    }

    /// Clears any registered frame waker.
    pub fn clear_frame_waker(&self) {
        self.replace_waker(None);
    }

    fn replace_waker(&self, waker: Option<FrameWaker>) {
        match self.frame_waker.write() {
            Ok(mut slot) => *slot = waker,
            Err(poisoned) => *poisoned.into_inner() = waker,
        }
    }

    fn wake(&self) {
        let waker = match self.frame_waker.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => {
                log::warn!("frame waker lock poisoned, waking anyway");
                poisoned.into_inner().clone()
            }
        };
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field(
                "frame_requested",
                &self.frame_requested.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl RuntimeScheduler for StdScheduler {
    fn schedule_frame(&self) {
        self.frame_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Convenience container bundling the standard scheduler and the runtime it
/// drives.
///
/// Dropping the last clone tears the host down; coordinators holding its
/// handle stop requesting passes.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    runtime: Runtime,
}

impl StdRuntime {
    /// Creates a new standard runtime instance.
    pub fn new() -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        Self { scheduler, runtime }
    }

    /// Returns a [`compose_core::Runtime`] configured with the standard scheduler.
    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    /// Returns a handle to the runtime.
    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    /// Returns the scheduler implementation.
    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Returns whether a frame was requested since the last poll.
    pub fn take_frame_request(&self) -> bool {
        self.runtime.take_needs_frame();
        self.scheduler.take_frame_request()
    }

    /// Registers a waker to be called when the runtime schedules a new frame.
    pub fn set_frame_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_frame_waker(waker);
    }

    /// Clears any previously registered frame waker.
    pub fn clear_frame_waker(&self) {
        self.scheduler.clear_frame_waker();
    }

    /// Runs tasks queued for this scheduling opportunity, such as pending
    /// presence exit checks. Returns how many ran.
    pub fn drain_tasks(&self) -> usize {
        self.runtime_handle().drain_tasks()
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.runtime.has_pending_tasks()
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("pending_tasks", &self.runtime.has_pending_tasks())
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}
