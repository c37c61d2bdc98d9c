use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::platform::RuntimeScheduler;

pub type Task = Box<dyn FnOnce() + 'static>;

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    needs_frame: Cell<bool>,
    pending_tasks: RefCell<VecDeque<Task>>, // FUTURE(no_std): migrate to ring buffer.
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            scheduler,
            needs_frame: Cell::new(false),
            pending_tasks: RefCell::new(VecDeque::new()),
        }
    }

    fn schedule(&self) {
        self.needs_frame.set(true);
        self.scheduler.schedule_frame();
    }

    fn enqueue_task(&self, task: Task) {
        self.pending_tasks.borrow_mut().push_back(task);
        self.schedule();
    }

    fn drain_tasks(&self) -> usize {
        let tasks: Vec<Task> = {
            let mut pending = self.pending_tasks.borrow_mut();
            pending.drain(..).collect()
        };
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    fn has_tasks(&self) -> bool {
        !self.pending_tasks.borrow().is_empty()
    }
}

/// Owning side of the host runtime.
///
/// Dropping the last [`Runtime`] tears the host down: every outstanding
/// [`RuntimeHandle`] turns into a no-op and reports `is_alive() == false`.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>, // FUTURE(no_std): replace Rc with arena-managed runtime storage.
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn needs_frame(&self) -> bool {
        self.inner.needs_frame.get()
    }

    pub fn set_needs_frame(&self, value: bool) {
        self.inner.needs_frame.set(value);
    }

    /// Returns and clears the pending frame request.
    pub fn take_needs_frame(&self) -> bool {
        self.inner.needs_frame.replace(false)
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.inner.has_tasks()
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_frame(&self) {}
}

#[cfg(test)]
#[derive(Default)]
pub struct TestScheduler {
    requests: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl TestScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl RuntimeScheduler for TestScheduler {
    fn schedule_frame(&self) {
        self.requests.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Weak handle to the host runtime, cheap to clone into callbacks.
#[derive(Clone)]
pub struct RuntimeHandle(pub(crate) Weak<RuntimeInner>);

impl RuntimeHandle {
    /// Handle that is already dead. Useful for hosts without a runtime.
    pub fn detached() -> Self {
        RuntimeHandle(Weak::new())
    }

    /// Request another evaluation pass. Does nothing once the host is gone.
    pub fn schedule(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.schedule();
        } else {
            log::trace!("schedule ignored: runtime dropped");
        }
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Queue `task` for the host's next scheduling opportunity.
    ///
    /// Without a live runtime there is no later opportunity, so the task runs
    /// immediately.
    pub fn spawn_task(&self, task: Task) {
        if let Some(inner) = self.0.upgrade() {
            inner.enqueue_task(task);
        } else {
            task();
        }
    }

    /// Runs the tasks queued so far and returns how many ran. Tasks queued
    /// while draining wait for the next call.
    pub fn drain_tasks(&self) -> usize {
        self.0
            .upgrade()
            .map(|inner| inner.drain_tasks())
            .unwrap_or(0)
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_tasks())
            .unwrap_or(false)
    }

    pub fn needs_frame(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.needs_frame.get())
            .unwrap_or(false)
    }

    pub fn set_needs_frame(&self, value: bool) {
        if let Some(inner) = self.0.upgrade() {
            inner.needs_frame.set(value);
        }
    }
}
