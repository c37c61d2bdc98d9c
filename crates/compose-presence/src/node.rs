use std::fmt;
use std::rc::Rc;

use crate::aggregator::Custom;
use crate::{PresenceChild, PresenceContext, PresenceKey};

/// How entering and exiting children share the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceMode {
    /// Exiting and entering children render side by side.
    #[default]
    Sync,
    /// While anything is exiting only the exiting children render; entering
    /// children appear once the exit cycle drains.
    Wait,
    /// Like `Sync`, but every child is wrapped for the layout collaborator so
    /// an exiting child can be popped out of the flow while keeping its box.
    PopLayout,
}

/// Layout wrapping requested for a rendered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLayout {
    InPlace,
    PopLayout,
}

/// Inputs of one evaluation pass besides the children themselves.
#[derive(Clone)]
pub struct PresenceSpec {
    pub mode: PresenceMode,
    /// When `false`, children of the very first pass skip their entry
    /// transition.
    pub initial: bool,
    pub custom: Option<Custom>,
    /// Fires once every currently exiting child finished.
    pub on_exit_complete: Option<Rc<dyn Fn()>>,
}

impl PresenceSpec {
    pub fn new(mode: PresenceMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn initial(mut self, initial: bool) -> Self {
        self.initial = initial;
        self
    }

    pub fn custom<T: 'static>(mut self, custom: T) -> Self {
        self.custom = Some(Rc::new(custom));
        self
    }

    pub fn on_exit_complete(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_exit_complete = Some(Rc::new(callback));
        self
    }
}

impl Default for PresenceSpec {
    fn default() -> Self {
        Self {
            mode: PresenceMode::Sync,
            initial: true,
            custom: None,
            on_exit_complete: None,
        }
    }
}

impl fmt::Debug for PresenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceSpec")
            .field("mode", &self.mode)
            .field("initial", &self.initial)
            .field("custom", &self.custom.is_some())
            .field("on_exit_complete", &self.on_exit_complete.is_some())
            .finish()
    }
}

/// A child as it should be rendered this pass.
pub struct PresenceNode<C> {
    child: PresenceChild<C>,
    context: PresenceContext,
    layout: NodeLayout,
}

impl<C> PresenceNode<C> {
    pub(crate) fn new(
        child: PresenceChild<C>,
        context: PresenceContext,
        mode: PresenceMode,
    ) -> Self {
        let layout = match mode {
            PresenceMode::PopLayout => NodeLayout::PopLayout,
            PresenceMode::Sync | PresenceMode::Wait => NodeLayout::InPlace,
        };
        Self {
            child,
            context,
            layout,
        }
    }

    pub fn key(&self) -> &PresenceKey {
        self.child.key()
    }

    pub fn child(&self) -> &PresenceChild<C> {
        &self.child
    }

    pub fn content(&self) -> &C {
        self.child.content()
    }

    pub fn context(&self) -> &PresenceContext {
        &self.context
    }

    pub fn is_present(&self) -> bool {
        self.context.is_present()
    }

    pub fn layout(&self) -> NodeLayout {
        self.layout
    }
}

impl<C> Clone for PresenceNode<C> {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            context: self.context.clone(),
            layout: self.layout,
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for PresenceNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceNode")
            .field("key", self.key())
            .field("content", self.content())
            .field("is_present", &self.is_present())
            .field("layout", &self.layout)
            .finish()
    }
}
