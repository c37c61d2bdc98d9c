#[cfg(feature = "std-hash")]
pub mod map {
    use crate::hash::DefaultBuildHasher;

    pub type HashMap<K, V> = std::collections::HashMap<K, V, DefaultBuildHasher>;
    pub type HashSet<K> = std::collections::HashSet<K, DefaultBuildHasher>;
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    use crate::hash::DefaultBuildHasher;

    pub type HashMap<K, V> = hashbrown::HashMap<K, V, DefaultBuildHasher>;
    pub type HashSet<K> = hashbrown::HashSet<K, DefaultBuildHasher>;
}
