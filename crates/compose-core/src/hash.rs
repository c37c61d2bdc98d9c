use core::hash::Hash;
use std::hash::Hasher;

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::DefaultHasher;
    pub use std::collections::hash_map::RandomState as DefaultBuildHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    pub use ahash::AHasher as DefaultHasher;
    pub use ahash::RandomState as DefaultBuildHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

pub use default::DefaultBuildHasher;

/// Hash a single value with whichever default hasher is active.
///
/// The hasher is constructed with fixed keys, so the result is stable for
/// the lifetime of the process.
#[inline]
pub fn hash_one<T: Hash + ?Sized>(v: &T) -> u64 {
    let mut h = default::new();
    v.hash(&mut h);
    h.finish()
}
