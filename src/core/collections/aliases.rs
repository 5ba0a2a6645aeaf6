//! Type aliases for the collections used throughout the crate.

use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use slotmap::SlotMap;
use smallvec::SmallVec;

/// Primary key-value storage for vertices and triangles.
pub type StorageMap<K, V> = SlotMap<K, V>;

/// Hash map with the `FxHash` hasher.
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// Hash set with the `FxHash` hasher.
pub type FastHashSet<T> = FxHashSet<T>;

/// Build-hasher of [`FastHashMap`] and [`FastHashSet`].
pub type FastBuildHasher = FxBuildHasher;

/// Stack-allocated buffer that spills to the heap beyond `N` items.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Inline capacity for per-vertex triangle fans.
///
/// Interior vertices of a Delaunay mesh have six neighbours on average;
/// sixteen covers nearly all fans without spilling.
pub const FAN_INLINE_CAPACITY: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_collections_basic_operations() {
        let mut map: FastHashMap<u64, usize> = FastHashMap::default();
        assert!(map.is_empty());
        map.insert(123, 456);
        assert_eq!(map.get(&123), Some(&456));

        let mut set: FastHashSet<u64> = FastHashSet::default();
        set.insert(789);
        assert!(set.contains(&789));

        let mut buffer: SmallBuffer<u8, 4> = SmallBuffer::new();
        buffer.extend([1, 2, 3, 4]);
        assert!(!buffer.spilled());
        buffer.push(5);
        assert!(buffer.spilled());
    }
}
