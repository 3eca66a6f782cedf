//! Hash map keyed by string contents, probed without materializing keys.
//!
//! Lookups and removals take any `&str`, typically a subslice of a larger
//! buffer, and compare it byte-for-byte against stored keys, so the hot read
//! path never allocates. Only `insert` owns its key.
//!
//! # Algorithm
//! - 32-bit FNV-1a over the key bytes, XORed with a per-instance random seed.
//! - Open addressing: collisions probe by incrementing the hash value by 1
//!   and re-masking, until an empty slot or a byte-identical stored key.
//! - `remove` leaves a tombstone so later probe chains stay intact;
//!   tombstones are reclaimed by `insert` and discarded on resize.
//!
//! # Invariants
//! - `slots.len()` is a power of two and `mask == slots.len() - 1`.
//! - An occupied slot's cached `hash` equals the seeded FNV-1a of its key.
//! - `live + tombstones < slots.len()` (the probe loop always terminates at
//!   an empty slot).
//!
//! # Design Notes
//! - The seed makes hash order non-deterministic across instances, so no two
//!   processes (or two maps) share a collision pattern an adversary could
//!   precompute. Nothing about iteration or numeric hashing is stable.
//! - This type is not synchronized; it assumes single-threaded usage.

use std::fmt;

use crate::InsertPolicy;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

const INITIAL_SLOTS: usize = 8;

/// Errors returned by [`SubstringMap::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubdictError {
    /// Zero-length keys are not representable.
    EmptyKey,
    /// The key is already present and the policy was [`InsertPolicy::Reject`].
    DuplicateKey,
}

impl fmt::Display for SubdictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "key must be non-empty"),
            Self::DuplicateKey => write!(f, "key is already present"),
        }
    }
}

impl std::error::Error for SubdictError {}

/// One table slot.
///
/// `Tombstone` marks a removed entry that probe chains must walk through;
/// `Empty` terminates a probe.
enum Slot<V> {
    Empty,
    Tombstone,
    Occupied {
        /// Seeded hash of `key`, cached so probes can reject mismatches
        /// without a byte comparison.
        hash: u32,
        key: Box<str>,
        value: V,
    },
}

/// Hash map from owned string keys to `V`, with allocation-free region reads.
///
/// # Examples
/// ```
/// use compact_collections::{InsertPolicy, SubstringMap};
///
/// let mut map = SubstringMap::new();
/// map.insert("needle", 7u32, InsertPolicy::Reject).unwrap();
///
/// let haystack = "a needle in here";
/// assert_eq!(map.get(&haystack[2..8]), Some(&7));
/// ```
pub struct SubstringMap<V> {
    slots: Vec<Slot<V>>,
    mask: usize,
    /// Occupied slot count (tombstones excluded).
    live: usize,
    tombstones: usize,
    seed: u32,
}

impl<V> SubstringMap<V> {
    /// Creates an empty map with a fresh random seed.
    pub fn new() -> Self {
        Self::with_seed(rand::random::<u32>())
    }

    /// Creates an empty map with an explicit seed.
    ///
    /// Exposed for deterministic tests; production callers should prefer
    /// [`SubstringMap::new`].
    pub fn with_seed(seed: u32) -> Self {
        let mut slots = Vec::with_capacity(INITIAL_SLOTS);
        slots.resize_with(INITIAL_SLOTS, || Slot::Empty);

        Self {
            slots,
            mask: INITIAL_SLOTS - 1,
            live: 0,
            tombstones: 0,
            seed,
        }
    }

    /// Number of stored entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true when no entries are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Seeded 32-bit FNV-1a of `key`'s UTF-8 bytes.
    #[inline]
    fn hash_of(&self, key: &str) -> u32 {
        let mut h = FNV_OFFSET;
        for &b in key.as_bytes() {
            h ^= b as u32;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h ^ self.seed
    }

    /// Finds the slot holding `key`, walking the probe chain from its hash.
    fn find(&self, key: &str) -> Option<usize> {
        if key.is_empty() || self.live == 0 {
            return None;
        }

        let hash = self.hash_of(key);
        let mut probe = hash;
        loop {
            let idx = probe as usize & self.mask;
            match &self.slots[idx] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied {
                    hash: stored_hash,
                    key: stored_key,
                    ..
                } => {
                    if *stored_hash == hash && stored_key.as_bytes() == key.as_bytes() {
                        return Some(idx);
                    }
                }
            }
            probe = probe.wrapping_add(1);
        }
    }

    /// Borrows the value stored under `key`, if any.
    ///
    /// `key` may be any string region; no allocation is performed.
    pub fn get(&self, key: &str) -> Option<&V> {
        let idx = self.find(key)?;
        match &self.slots[idx] {
            Slot::Occupied { value, .. } => Some(value),
            _ => unreachable!("find returned a non-occupied slot"),
        }
    }

    /// Mutably borrows the value stored under `key`, if any.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let idx = self.find(key)?;
        match &mut self.slots[idx] {
            Slot::Occupied { value, .. } => Some(value),
            _ => unreachable!("find returned a non-occupied slot"),
        }
    }

    /// Returns true when `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Inserts `key -> value`.
    ///
    /// # Effects
    /// - Fails with [`SubdictError::EmptyKey`] on a zero-length key.
    /// - On an existing key: `Reject` fails with
    ///   [`SubdictError::DuplicateKey`], `Overwrite` replaces the value and
    ///   returns true, `Skip` returns false.
    /// - Returns true when the map was modified.
    pub fn insert(
        &mut self,
        key: &str,
        value: V,
        policy: InsertPolicy,
    ) -> Result<bool, SubdictError> {
        if key.is_empty() {
            return Err(SubdictError::EmptyKey);
        }

        self.grow_if_needed();

        let hash = self.hash_of(key);
        let mut probe = hash;
        let mut reuse: Option<usize> = None;
        loop {
            let idx = probe as usize & self.mask;
            match &mut self.slots[idx] {
                Slot::Empty => {
                    let target = reuse.unwrap_or(idx);
                    if reuse.take().is_some() {
                        debug_assert!(self.tombstones > 0);
                        self.tombstones -= 1;
                    }
                    self.slots[target] = Slot::Occupied {
                        hash,
                        key: Box::from(key),
                        value,
                    };
                    self.live += 1;
                    return Ok(true);
                }
                Slot::Tombstone => {
                    // First tombstone on the chain is the insertion point if
                    // the key turns out to be absent.
                    if reuse.is_none() {
                        reuse = Some(idx);
                    }
                }
                Slot::Occupied {
                    hash: stored_hash,
                    key: stored_key,
                    value: stored_value,
                } => {
                    if *stored_hash == hash && stored_key.as_bytes() == key.as_bytes() {
                        return match policy {
                            InsertPolicy::Reject => Err(SubdictError::DuplicateKey),
                            InsertPolicy::Overwrite => {
                                *stored_value = value;
                                Ok(true)
                            }
                            InsertPolicy::Skip => Ok(false),
                        };
                    }
                }
            }
            probe = probe.wrapping_add(1);
        }
    }

    /// Removes the entry stored under `key`, returning its value.
    ///
    /// Leaves a tombstone so probe chains through this slot keep working.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.find(key)?;
        let slot = std::mem::replace(&mut self.slots[idx], Slot::Tombstone);
        self.live -= 1;
        self.tombstones += 1;

        match slot {
            Slot::Occupied { value, .. } => Some(value),
            _ => unreachable!("find returned a non-occupied slot"),
        }
    }

    /// Resizes when live entries plus tombstones pass 3/4 occupancy.
    ///
    /// Tombstones are discarded by the rehash, so a remove-heavy workload
    /// reclaims its slots here.
    fn grow_if_needed(&mut self) {
        let used = self.live + self.tombstones;
        if (used + 1) * 4 <= self.slots.len() * 3 {
            return;
        }

        // Size for live entries only; tombstones do not survive the rehash.
        let mut new_len = self.slots.len();
        while (self.live + 1) * 4 > new_len * 3 {
            new_len *= 2;
        }

        let mut new_slots = Vec::with_capacity(new_len);
        new_slots.resize_with(new_len, || Slot::Empty);
        let new_mask = new_len - 1;

        for slot in self.slots.drain(..) {
            if let Slot::Occupied { hash, key, value } = slot {
                let mut probe = hash;
                loop {
                    let idx = probe as usize & new_mask;
                    if matches!(new_slots[idx], Slot::Empty) {
                        new_slots[idx] = Slot::Occupied { hash, key, value };
                        break;
                    }
                    probe = probe.wrapping_add(1);
                }
            }
        }

        self.slots = new_slots;
        self.mask = new_mask;
        self.tombstones = 0;

        assert!(self.slots.len().is_power_of_two());
        assert!((self.live + 1) * 4 <= self.slots.len() * 3);
    }
}

impl<V> Default for SubstringMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init() {
        let map: SubstringMap<u32> = SubstringMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.get("anything"), None);
    }

    // ==================== Region lookups ====================

    #[test]
    fn lookup_by_subslice() {
        let mut map = SubstringMap::new();
        map.insert("worl", 1u32, InsertPolicy::Reject).unwrap();
        map.insert("hello", 2, InsertPolicy::Reject).unwrap();

        let text = "hello world";
        assert_eq!(map.get(&text[..5]), Some(&2));
        assert_eq!(map.get(&text[6..10]), Some(&1));
        assert_eq!(map.get(&text[6..11]), None);
    }

    #[test]
    fn lookup_is_exact_bytes() {
        let mut map = SubstringMap::new();
        map.insert("abc", 1u32, InsertPolicy::Reject).unwrap();

        assert_eq!(map.get("ABC"), None);
        assert_eq!(map.get("ab"), None);
        assert_eq!(map.get("abcd"), None);
        assert_eq!(map.get("abc"), Some(&1));
    }

    // ==================== Insert policies ====================

    #[test]
    fn empty_key_rejected() {
        let mut map = SubstringMap::new();
        assert_eq!(
            map.insert("", 1u32, InsertPolicy::Reject).unwrap_err(),
            SubdictError::EmptyKey
        );
        assert_eq!(map.get(""), None);
    }

    #[test]
    fn duplicate_reject() {
        let mut map = SubstringMap::new();
        assert!(map.insert("k", 1u32, InsertPolicy::Reject).unwrap());
        assert_eq!(
            map.insert("k", 2, InsertPolicy::Reject).unwrap_err(),
            SubdictError::DuplicateKey
        );
        assert_eq!(map.get("k"), Some(&1));
    }

    #[test]
    fn duplicate_overwrite() {
        let mut map = SubstringMap::new();
        map.insert("k", 1u32, InsertPolicy::Reject).unwrap();
        assert!(map.insert("k", 2, InsertPolicy::Overwrite).unwrap());
        assert_eq!(map.get("k"), Some(&2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn duplicate_skip() {
        let mut map = SubstringMap::new();
        map.insert("k", 1u32, InsertPolicy::Reject).unwrap();
        assert!(!map.insert("k", 2, InsertPolicy::Skip).unwrap());
        assert_eq!(map.get("k"), Some(&1));
    }

    // ==================== Removal and tombstones ====================

    #[test]
    fn remove_returns_value() {
        let mut map = SubstringMap::new();
        map.insert("k", 41u32, InsertPolicy::Reject).unwrap();

        assert_eq!(map.remove("k"), Some(41));
        assert_eq!(map.remove("k"), None);
        assert!(map.is_empty());
    }

    #[test]
    fn probe_chain_survives_removal() {
        // Force every key onto the same probe chain by fixing the seed and
        // a table small enough that collisions are guaranteed.
        let mut map = SubstringMap::with_seed(0);
        for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            map.insert(key, i as u32, InsertPolicy::Reject).unwrap();
        }

        map.remove("b").unwrap();
        map.remove("d").unwrap();

        assert_eq!(map.get("a"), Some(&0));
        assert_eq!(map.get("c"), Some(&2));
        assert_eq!(map.get("e"), Some(&4));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn reinsert_after_remove_reuses_tombstone() {
        let mut map = SubstringMap::with_seed(7);
        map.insert("key", 1u32, InsertPolicy::Reject).unwrap();
        map.remove("key").unwrap();

        assert!(map.insert("key", 2, InsertPolicy::Reject).unwrap());
        assert_eq!(map.get("key"), Some(&2));
        assert_eq!(map.len(), 1);
    }

    // ==================== Growth ====================

    #[test]
    fn survives_growth() {
        let mut map = SubstringMap::new();
        let keys: Vec<String> = (0..200).map(|i| format!("key-{i}")).collect();
        for (i, key) in keys.iter().enumerate() {
            map.insert(key, i as u32, InsertPolicy::Reject).unwrap();
        }

        assert_eq!(map.len(), 200);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(map.get(key), Some(&(i as u32)));
        }
    }

    #[test]
    fn churn_reclaims_tombstones() {
        // Insert/remove far more entries than any one table generation holds;
        // rehashing must keep the chain walkable and the table non-saturated.
        let mut map = SubstringMap::with_seed(3);
        for round in 0..50u32 {
            let key = format!("round-{round}");
            map.insert(&key, round, InsertPolicy::Reject).unwrap();
            if round % 2 == 0 {
                assert_eq!(map.remove(&key), Some(round));
            }
        }
        assert_eq!(map.len(), 25);
    }

    // ==================== Seed independence ====================

    #[test]
    fn seed_does_not_change_observable_contents() {
        let mut a = SubstringMap::with_seed(0x1111);
        let mut b = SubstringMap::with_seed(0xffff_0000);
        for (i, key) in ["x", "yy", "zzz"].iter().enumerate() {
            a.insert(key, i as u32, InsertPolicy::Reject).unwrap();
            b.insert(key, i as u32, InsertPolicy::Reject).unwrap();
        }

        for key in ["x", "yy", "zzz"] {
            assert_eq!(a.get(key), b.get(key));
        }
    }
}
