//! Keys and keyed child descriptors.
//!
//! Identity of a child across evaluation passes is defined solely by its
//! [`PresenceKey`]. Callers must keep keys unique among siblings; see
//! [`ensure_unique_keys`].

use std::fmt;
use std::rc::Rc;

use compose_core::collections::map::HashMap;
use compose_core::{hash, Key};

use crate::PresenceError;

/// Caller supplied identity of a child.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PresenceKey {
    Int(i64),
    Str(Rc<str>),
}

impl PresenceKey {
    /// Hashes the key into the host's group key space.
    pub fn group_key(&self) -> Key {
        hash::hash_one(self)
    }
}

impl fmt::Display for PresenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceKey::Int(value) => write!(f, "{value}"),
            PresenceKey::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<i64> for PresenceKey {
    fn from(value: i64) -> Self {
        PresenceKey::Int(value)
    }
}

impl From<i32> for PresenceKey {
    fn from(value: i32) -> Self {
        PresenceKey::Int(value.into())
    }
}

impl From<u32> for PresenceKey {
    fn from(value: u32) -> Self {
        PresenceKey::Int(value.into())
    }
}

impl From<&str> for PresenceKey {
    fn from(value: &str) -> Self {
        PresenceKey::Str(Rc::from(value))
    }
}

impl From<String> for PresenceKey {
    fn from(value: String) -> Self {
        PresenceKey::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for PresenceKey {
    fn from(value: Rc<str>) -> Self {
        PresenceKey::Str(value)
    }
}

/// Opaque caller content tagged with a key.
///
/// The content is shared, never copied or mutated by the coordinator.
pub struct PresenceChild<C> {
    key: PresenceKey,
    content: Rc<C>,
}

impl<C> PresenceChild<C> {
    pub fn new(key: impl Into<PresenceKey>, content: C) -> Self {
        Self::from_rc(key, Rc::new(content))
    }

    pub fn from_rc(key: impl Into<PresenceKey>, content: Rc<C>) -> Self {
        Self {
            key: key.into(),
            content,
        }
    }

    pub fn key(&self) -> &PresenceKey {
        &self.key
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn content_rc(&self) -> Rc<C> {
        Rc::clone(&self.content)
    }
}

impl<C> Clone for PresenceChild<C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            content: Rc::clone(&self.content),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for PresenceChild<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceChild")
            .field("key", &self.key)
            .field("content", &self.content)
            .finish()
    }
}

pub fn child_keys<C>(children: &[PresenceChild<C>]) -> Vec<PresenceKey> {
    children.iter().map(|child| child.key.clone()).collect()
}

/// Reports the first key that appears twice in `children`.
pub fn ensure_unique_keys<C>(children: &[PresenceChild<C>]) -> Result<(), PresenceError> {
    let mut seen: HashMap<&PresenceKey, usize> = HashMap::default();
    for (index, child) in children.iter().enumerate() {
        if let Some(first) = seen.insert(&child.key, index) {
            return Err(PresenceError::DuplicateKey {
                key: child.key.clone(),
                first,
                second: index,
            });
        }
    }
    Ok(())
}
