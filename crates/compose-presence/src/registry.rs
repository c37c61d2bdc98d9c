//! Outstanding-work bookkeeping.
//!
//! A [`PendingSet`] tracks a dynamic number of tokens, each either pending or
//! done. It knows nothing about presence; the aggregator layers exit cycles on
//! top of it.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;

pub struct PendingSet<T> {
    tokens: IndexMap<T, bool>,
}

impl<T> Default for PendingSet<T> {
    fn default() -> Self {
        Self {
            tokens: IndexMap::new(),
        }
    }
}

impl<T: Hash + Eq> PendingSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `token` as pending. Re-adding a done token makes it pending again.
    pub fn add(&mut self, token: T) {
        self.tokens.insert(token, false);
    }

    /// Forgets `token`. Returns whether it was registered.
    pub fn remove(&mut self, token: &T) -> bool {
        self.tokens.shift_remove(token).is_some()
    }

    /// Marks a registered token done. Unknown tokens are left alone and
    /// reported with `false`.
    pub fn mark_done(&mut self, token: &T) -> bool {
        match self.tokens.get_mut(token) {
            Some(done) => {
                *done = true;
                true
            }
            None => false,
        }
    }

    /// Marks every token pending again.
    pub fn reset(&mut self) {
        for done in self.tokens.values_mut() {
            *done = false;
        }
    }

    /// True once no token is pending. An empty set is trivially done.
    pub fn all_done(&self) -> bool {
        self.tokens.values().all(|done| *done)
    }

    pub fn contains(&self, token: &T) -> bool {
        self.tokens.contains_key(token)
    }

    pub fn pending(&self) -> usize {
        self.tokens.values().filter(|done| !**done).count()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for PendingSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.tokens.iter()).finish()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
