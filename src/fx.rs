//! Fast, non-DoS-resistant hash map/set aliases for internal bookkeeping.
//!
//! None of the keys used here (entity indices, byte offsets) are
//! attacker-controlled, so the `FxHash` trade-off (speed over
//! HashDoS-resistance) is the right default, matching
//! `cranelift_codegen::fx`.

#[cfg(feature = "std")]
pub use rustc_hash::{FxHashMap, FxHashSet};

#[cfg(not(feature = "std"))]
pub type FxHashMap<K, V> =
    hashbrown::HashMap<K, V, core::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

#[cfg(not(feature = "std"))]
pub type FxHashSet<V> = hashbrown::HashSet<V, core::hash::BuildHasherDefault<rustc_hash::FxHasher>>;
