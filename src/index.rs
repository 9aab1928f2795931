//! The public key-to-slot index.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::fmt::Display;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::mem;

use crate::pool::BufferPool;
use crate::pool::POOLING_FLOOR;
use crate::table::Probe;
use crate::table::Table;

/// Probe distance past which the table is grown ahead of the next insert.
/// Chains this long mean the table is too dense (or the hash too weak) for
/// the jump strides to spread keys out.
const COLLISION_TOLERANCE: u32 = 32;

/// Key capacity granted by the first insertion into an empty index.
const MIN_KEY_CAPACITY: usize = 8;

/// Largest key capacity the packed metadata can address: the table sized
/// for it lands exactly on the 2^31-slot ceiling, and every key slot still
/// fits an `i32`.
pub const MAX_CAPACITY: usize = (u32::MAX / 3) as usize;

/// Metadata table length for a given key capacity: half again the key
/// count plus a sentinel slot, rounded up to a power of two. The slack
/// keeps chains statistically far from the collision tolerance between
/// growths.
fn table_len_for(key_capacity: usize) -> usize {
    // Clamp first: over-ceiling requests are rejected by `grow`, and the
    // clamped value keeps this arithmetic from overflowing meanwhile.
    let key_capacity = key_capacity.min(MAX_CAPACITY);
    (key_capacity + key_capacity / 2 + 1)
        .next_power_of_two()
        .max(POOLING_FLOOR)
}

/// Folds a full 64-bit hash into the 32 bits the packed metadata consumes.
#[inline(always)]
fn fold_hash(hash: u64) -> u32 {
    (hash ^ (hash >> 32)) as u32
}

/// Error returned when a requested capacity exceeds [`MAX_CAPACITY`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityError {
    requested: usize,
}

impl CapacityError {
    /// The capacity that was asked for.
    pub fn requested(&self) -> usize {
        self.requested
    }
}

impl Display for CapacityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "requested capacity {} exceeds the slot index ceiling of {}",
            self.requested, MAX_CAPACITY
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CapacityError {}

/// An associative index mapping keys to stable integer slots.
///
/// `SlotIndex<K, S>` assigns each distinct key a slot number, counting up
/// from zero in insertion order, and finds it again on every later sight of
/// the key. It is the indexing half of a map: callers keep their values in
/// plain slices or `Vec`s addressed by slot, and the index never touches
/// them.
///
/// Slots are stable until [`clear`](Self::clear); keys are never removed
/// individually. Clearing is O(1): the metadata table advances an internal
/// epoch instead of wiping its memory, and the table's backing buffer can
/// be recycled through a shared [`BufferPool`] when many short-lived
/// indexes come and go.
///
/// # Example
///
/// ```rust
/// use slot_index::SlotIndex;
///
/// let mut index: SlotIndex<&str> = SlotIndex::new();
/// let (a, existed) = index.get_or_insert("apple");
/// assert_eq!((a, existed), (0, false));
/// assert_eq!(index.get_or_insert("banana"), (1, false));
/// // Re-inserting finds the assigned slot.
/// assert_eq!(index.get_or_insert("apple"), (0, true));
///
/// assert_eq!(index.find(&"banana"), Some(1));
/// assert_eq!(index.find(&"cherry"), None);
/// assert_eq!(index.keys(), &["apple", "banana"]);
/// ```
pub struct SlotIndex<K, S = crate::DefaultHashBuilder> {
    table: Table,
    keys: Vec<K>,
    key_capacity: usize,
    max_distance: u32,
    pool: BufferPool,
    hash_builder: S,
}

impl<K, S> SlotIndex<K, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty index. No memory is allocated until the first
    /// insertion.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use slot_index::SlotIndex;
    ///
    /// let index: SlotIndex<u64> = SlotIndex::new();
    /// assert!(index.is_empty());
    /// assert_eq!(index.capacity(), 0);
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an index that can hold at least `capacity` keys without
    /// growing.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`]; use
    /// [`try_with_capacity`](Self::try_with_capacity) to handle that case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use slot_index::SlotIndex;
    ///
    /// let index: SlotIndex<u64> = SlotIndex::with_capacity(100);
    /// assert!(index.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }

    /// Fallible [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        Self::try_with_capacity_and_hasher(capacity, S::default())
    }

    /// Creates an index whose metadata buffers are rented from (and
    /// returned to) `pool` instead of a private pool.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use slot_index::BufferPool;
    /// use slot_index::SlotIndex;
    ///
    /// let pool = BufferPool::new();
    /// let mut index: SlotIndex<u64> = SlotIndex::with_pool(100, pool.clone());
    /// index.get_or_insert(7);
    /// drop(index);
    ///
    /// // The dropped index parked its table buffer for the next one.
    /// assert_eq!(pool.parked(), 1);
    /// ```
    pub fn with_pool(capacity: usize, pool: BufferPool) -> Self {
        Self::with_pool_and_hasher(capacity, pool, S::default())
    }
}

impl<K, S> SlotIndex<K, S> {
    /// Creates an empty index with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        SlotIndex {
            table: Table::empty(),
            keys: Vec::new(),
            key_capacity: 0,
            max_distance: 0,
            pool: BufferPool::new(),
            hash_builder,
        }
    }

    /// Number of keys in the index.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use slot_index::SlotIndex;
    ///
    /// let mut index: SlotIndex<u64> = SlotIndex::new();
    /// assert_eq!(index.len(), 0);
    /// index.get_or_insert(1);
    /// assert_eq!(index.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of keys the index can hold before its next growth.
    pub fn capacity(&self) -> usize {
        self.key_capacity
    }

    /// Number of slots in the metadata table. Always a power of two (or
    /// zero before the first insertion).
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// The stored keys in slot order: `keys()[slot]` is the key that was
    /// assigned `slot`.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// The key assigned to `slot`, if any.
    pub fn get_key(&self, slot: usize) -> Option<&K> {
        self.keys.get(slot)
    }

    /// Iterates over the stored keys in slot order.
    pub fn iter(&self) -> core::slice::Iter<'_, K> {
        self.keys.iter()
    }

    /// An opaque stamp that changes on every clear and every rehash.
    ///
    /// Holders of slot numbers can remember the token they were issued
    /// under and detect that the index has since been cleared.
    pub fn version_token(&self) -> u32 {
        self.table.version().raw()
    }

    /// Removes every key. Slots restart at zero.
    ///
    /// This is O(1) in the size of the metadata table: the table advances
    /// its epoch and the old entries become invisible where they lie. The
    /// stored keys are dropped; with `keep_key_storage` the key allocation
    /// is retained for reuse, otherwise it is released along with the
    /// index's reserved capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use slot_index::SlotIndex;
    ///
    /// let mut index: SlotIndex<u64> = SlotIndex::new();
    /// index.get_or_insert(1);
    /// index.clear(true);
    /// assert!(index.is_empty());
    /// assert_eq!(index.find(&1), None);
    /// // Slots restart from zero.
    /// assert_eq!(index.get_or_insert(2), (0, false));
    /// ```
    pub fn clear(&mut self, keep_key_storage: bool) {
        self.table.clear();
        self.keys.clear();
        if !keep_key_storage {
            self.keys = Vec::new();
            self.key_capacity = 0;
        }
    }

    /// Consumes the index, returning its metadata buffer to the pool.
    ///
    /// Dropping the index does the same; `dispose` exists to make the
    /// hand-back explicit at call sites that recycle a shared pool. Because
    /// it takes the index by value, use-after-dispose is a compile error.
    pub fn dispose(self) {}
}

impl<K, S> SlotIndex<K, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an index with the given capacity and hasher builder.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`].
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        match Self::try_with_capacity_and_hasher(capacity, hash_builder) {
            Ok(index) => index,
            Err(error) => panic!("{error}"),
        }
    }

    /// Fallible [`with_capacity_and_hasher`](Self::with_capacity_and_hasher).
    pub fn try_with_capacity_and_hasher(
        capacity: usize,
        hash_builder: S,
    ) -> Result<Self, CapacityError> {
        let mut index = Self::with_hasher(hash_builder);
        if capacity > 0 {
            index.grow(capacity, table_len_for(capacity))?;
        }
        Ok(index)
    }

    /// Creates an index with the given capacity, pool, and hasher builder.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`].
    pub fn with_pool_and_hasher(capacity: usize, pool: BufferPool, hash_builder: S) -> Self {
        let mut index = SlotIndex {
            table: Table::empty(),
            keys: Vec::new(),
            key_capacity: 0,
            max_distance: 0,
            pool,
            hash_builder,
        };
        if capacity > 0 {
            match index.grow(capacity, table_len_for(capacity)) {
                Ok(()) => {}
                Err(error) => panic!("{error}"),
            }
        }
        index
    }

    #[inline(always)]
    fn hash_of(&self, key: &K) -> u32 {
        fold_hash(self.hash_builder.hash_one(key))
    }

    /// Returns the slot assigned to `key`, inserting it if absent. The
    /// second component is `true` if the key already existed.
    ///
    /// This is the dominant operation: one probe walk resolves both the
    /// hit and the miss, and a miss appends the key and installs its
    /// metadata without rewalking.
    ///
    /// # Panics
    ///
    /// Panics if growth would exceed [`MAX_CAPACITY`]; use
    /// [`try_get_or_insert`](Self::try_get_or_insert) to handle that case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use slot_index::SlotIndex;
    ///
    /// let mut index: SlotIndex<&str> = SlotIndex::new();
    /// assert_eq!(index.get_or_insert("a"), (0, false));
    /// assert_eq!(index.get_or_insert("b"), (1, false));
    /// assert_eq!(index.get_or_insert("a"), (0, true));
    /// ```
    pub fn get_or_insert(&mut self, key: K) -> (usize, bool) {
        match self.try_get_or_insert(key) {
            Ok(result) => result,
            Err(error) => panic!("{error}"),
        }
    }

    /// Fallible [`get_or_insert`](Self::get_or_insert): reports rather
    /// than panics when growth would exceed [`MAX_CAPACITY`].
    pub fn try_get_or_insert(&mut self, key: K) -> Result<(usize, bool), CapacityError> {
        self.ensure_room()?;

        let hash = self.hash_of(&key);
        let keys = &self.keys;
        match self
            .table
            .walk(hash, |slot| keys.get(slot).is_some_and(|stored| *stored == key))
        {
            Probe::Found(slot) => Ok((slot, true)),
            Probe::Vacant(vacant) => {
                let slot = self.keys.len();
                self.keys.push(key);
                let distance = self.table.install(vacant, slot);
                self.max_distance = self.max_distance.max(distance);
                Ok((slot, false))
            }
        }
    }

    /// Returns the slot assigned to `key`, or `None` if the key has never
    /// been inserted (or not since the last clear).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use slot_index::SlotIndex;
    ///
    /// let mut index: SlotIndex<&str> = SlotIndex::new();
    /// index.get_or_insert("a");
    /// assert_eq!(index.find(&"a"), Some(0));
    /// assert_eq!(index.find(&"b"), None);
    /// ```
    pub fn find(&self, key: &K) -> Option<usize> {
        if self.keys.is_empty() {
            return None;
        }
        let hash = self.hash_of(key);
        self.table
            .find(hash, |slot| self.keys.get(slot).is_some_and(|stored| stored == key))
    }

    /// Returns `true` if `key` has been assigned a slot.
    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Reserves capacity for at least `additional` more keys.
    ///
    /// # Panics
    ///
    /// Panics if the resulting capacity exceeds [`MAX_CAPACITY`].
    pub fn reserve(&mut self, additional: usize) {
        match self.try_reserve(additional) {
            Ok(()) => {}
            Err(error) => panic!("{error}"),
        }
    }

    /// Fallible [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), CapacityError> {
        let required = self.keys.len().saturating_add(additional);
        if required > self.key_capacity {
            self.grow(required, table_len_for(required))?;
        }
        Ok(())
    }

    /// Applies the growth policy ahead of an insertion. Growth never
    /// happens mid-walk: by the time the probe starts, the table is sized
    /// for it.
    fn ensure_room(&mut self) -> Result<(), CapacityError> {
        if self.keys.len() >= self.key_capacity {
            let new_capacity = (self.key_capacity * 2).max(MIN_KEY_CAPACITY);
            self.grow(new_capacity, table_len_for(new_capacity))?;
        } else if self.max_distance > COLLISION_TOLERANCE
            && self.table.len() < table_len_for(self.key_capacity).saturating_mul(4)
        {
            // Keys still fit, but some chain has grown long: double the
            // table alone to spread the keys back out. Capped at 4x the
            // base size for this capacity; past that the chain length is
            // the hash function's fault, and the saturated linear fallback
            // already keeps every key reachable.
            self.grow(self.key_capacity, self.table.len() * 2)?;
        }
        Ok(())
    }

    /// Grows key storage and/or the metadata table. Replacing the table
    /// rehashes every key; the old buffer goes back to the pool first so a
    /// later, smaller index can pick it up.
    fn grow(&mut self, new_key_capacity: usize, new_table_len: usize) -> Result<(), CapacityError> {
        if new_key_capacity > MAX_CAPACITY {
            return Err(CapacityError {
                requested: new_key_capacity,
            });
        }
        if new_key_capacity > self.key_capacity {
            self.keys.reserve_exact(new_key_capacity - self.keys.len());
            self.key_capacity = new_key_capacity;
        }
        if new_table_len > self.table.len() {
            let old = mem::replace(&mut self.table, Table::empty());
            let prior = old.version();
            old.release(&self.pool);

            let mut table = Table::rent(&self.pool, new_table_len);
            table.set_version(prior.reuse_epoch(table.version()));
            self.table = table;
            self.rehash();
        }
        Ok(())
    }

    /// Reinserts every key into the (fresh) table in slot order. Panics on
    /// a duplicate key, which would mean the caller's `Eq`/`Hash` contract
    /// broke between insertions.
    fn rehash(&mut self) {
        self.max_distance = 0;
        let keys = &self.keys;
        for (slot, key) in keys.iter().enumerate() {
            let hash = fold_hash(self.hash_builder.hash_one(key));
            let distance = self
                .table
                .reinsert(hash, slot, |other| keys[other] == *key);
            self.max_distance = self.max_distance.max(distance);
        }
    }
}

impl<K, S> Drop for SlotIndex<K, S> {
    fn drop(&mut self) {
        let table = mem::replace(&mut self.table, Table::empty());
        table.release(&self.pool);
    }
}

impl<K, S> Default for SlotIndex<K, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> Debug for SlotIndex<K, S>
where
    K: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlotIndex")
            .field("len", &self.len())
            .field("capacity", &self.key_capacity)
            .field("max_distance", &self.max_distance)
            .field("keys", &self.keys)
            .field("table", &self.table)
            .finish()
    }
}

impl<K, S> Clone for SlotIndex<K, S>
where
    K: Clone + Hash + Eq,
    S: Clone + BuildHasher,
{
    fn clone(&self) -> Self {
        // The metadata buffer is not shareable, so a clone rebuilds its own
        // table from the key list.
        let mut clone = SlotIndex {
            table: Table::empty(),
            keys: self.keys.clone(),
            key_capacity: 0,
            max_distance: 0,
            pool: self.pool.clone(),
            hash_builder: self.hash_builder.clone(),
        };
        let capacity = self.key_capacity.max(clone.keys.len());
        if capacity > 0 {
            clone.key_capacity = capacity;
            clone.keys.reserve_exact(capacity - clone.keys.len());
            clone.table = Table::rent(&clone.pool, table_len_for(capacity));
            clone.rehash();
        }
        clone
    }
}

impl<K, S> Extend<K> for SlotIndex<K, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for key in iter {
            self.get_or_insert(key);
        }
    }
}

impl<K, S> FromIterator<K> for SlotIndex<K, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut index = Self::new();
        index.extend(iter);
        index
    }
}

impl<'a, K, S> IntoIterator for &'a SlotIndex<K, S> {
    type Item = &'a K;
    type IntoIter = core::slice::Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipState {
        k0: u64,
        k1: u64,
    }

    impl SipState {
        fn random() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }
    }

    impl BuildHasher for SipState {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    /// Sends every key to the same home slot; lets tests force collisions.
    struct Colliding;

    struct ConstHasher(u64);

    impl Hasher for ConstHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, _bytes: &[u8]) {}
    }

    impl BuildHasher for Colliding {
        type Hasher = ConstHasher;

        fn build_hasher(&self) -> ConstHasher {
            ConstHasher(0)
        }
    }

    #[test]
    fn round_trip_many_keys() {
        let mut index: SlotIndex<u64, SipState> = SlotIndex::with_hasher(SipState::random());
        let mut slots = Vec::new();
        for key in 0..10_000u64 {
            let (slot, existed) = index.get_or_insert(key);
            assert!(!existed);
            assert_eq!(slot, key as usize);
            slots.push(slot);
        }
        assert_eq!(index.len(), 10_000);
        for key in 0..10_000u64 {
            assert_eq!(index.find(&key), Some(slots[key as usize]));
        }
        assert_eq!(index.find(&99_999), None);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut index: SlotIndex<String, SipState> = SlotIndex::with_hasher(SipState::random());
        let (slot, existed) = index.get_or_insert("key".to_string());
        assert!(!existed);
        let (again, existed) = index.get_or_insert("key".to_string());
        assert!(existed);
        assert_eq!(slot, again);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn keys_are_stored_in_slot_order() {
        let mut index: SlotIndex<String, SipState> = SlotIndex::with_hasher(SipState::random());
        for word in ["zebra", "apple", "mango"] {
            index.get_or_insert(word.to_string());
        }
        assert_eq!(index.keys(), &["zebra", "apple", "mango"]);
        assert_eq!(index.get_key(1).map(String::as_str), Some("apple"));
        assert_eq!(index.get_key(3), None);
        assert_eq!(index.iter().count(), 3);
    }

    #[test]
    fn colliding_keys_get_distinct_slots() {
        // Capacity 4 with every hash landing on one home slot: the
        // displacement chain must still hand out slots 0, 1, 2.
        let mut index: SlotIndex<&str, Colliding> =
            SlotIndex::with_capacity_and_hasher(4, Colliding);
        assert_eq!(index.get_or_insert("a"), (0, false));
        assert_eq!(index.get_or_insert("b"), (1, false));
        assert_eq!(index.get_or_insert("c"), (2, false));
        assert_eq!(index.len(), 3);
        assert_eq!(index.find(&"a"), Some(0));
        assert_eq!(index.find(&"b"), Some(1));
        assert_eq!(index.find(&"c"), Some(2));
    }

    #[test]
    fn clear_resets_occupancy_without_touching_memory() {
        let mut index: SlotIndex<u64, SipState> = SlotIndex::with_hasher(SipState::random());
        for key in 0..100u64 {
            index.get_or_insert(key);
        }
        let table_len = index.table_len();
        let token = index.version_token();

        index.clear(true);
        assert_eq!(index.len(), 0);
        assert_eq!(index.table_len(), table_len);
        assert_ne!(index.version_token(), token);
        for key in 0..100u64 {
            assert_eq!(index.find(&key), None);
        }

        // Slots restart at zero and the index is fully usable.
        assert_eq!(index.get_or_insert(42), (0, false));
    }

    #[test]
    fn clear_can_release_key_storage() {
        let mut index: SlotIndex<u64, SipState> = SlotIndex::with_hasher(SipState::random());
        for key in 0..100u64 {
            index.get_or_insert(key);
        }
        index.clear(false);
        assert_eq!(index.capacity(), 0);
        assert_eq!(index.len(), 0);
        assert_eq!(index.get_or_insert(1), (0, false));
    }

    #[test]
    fn epoch_rollover_keeps_all_properties() {
        let mut index: SlotIndex<u64, SipState> = SlotIndex::with_hasher(SipState::random());
        for round in 0..(u16::MAX as u64 + 16) {
            let (slot, existed) = index.get_or_insert(round);
            assert_eq!((slot, existed), (0, false));
            assert_eq!(index.get_or_insert(round), (0, true));
            assert_eq!(index.find(&round), Some(0));
            index.clear(true);
            assert_eq!(index.len(), 0);
            assert_eq!(index.find(&round), None);
        }
    }

    #[test]
    fn growth_preserves_content() {
        let mut index: SlotIndex<u64, SipState> = SlotIndex::with_hasher(SipState::random());
        let mut grown = false;
        let mut table_len = index.table_len();
        for key in 0..5_000u64 {
            index.get_or_insert(key);
            if index.table_len() != table_len {
                grown = true;
                table_len = index.table_len();
                for old in 0..=key {
                    assert_eq!(index.find(&old), Some(old as usize), "after growth to {table_len}");
                }
            }
        }
        assert!(grown);
        assert_eq!(index.keys().len(), 5_000);
    }

    #[test]
    fn collision_pressure_grows_the_table_alone() {
        let mut index: SlotIndex<u64, Colliding> =
            SlotIndex::with_capacity_and_hasher(64, Colliding);
        let capacity = index.capacity();
        let table_len = index.table_len();
        // Identical hashes build one long chain; once it passes the
        // tolerance the table doubles while the key capacity stands.
        for key in 0..64u64 {
            index.get_or_insert(key);
        }
        assert_eq!(index.capacity(), capacity);
        assert!(index.table_len() > table_len);
        for key in 0..64u64 {
            assert_eq!(index.find(&key), Some(key as usize));
        }
    }

    #[test]
    fn pool_reuse_never_leaks_old_keys() {
        let pool = BufferPool::new();
        let mut first: SlotIndex<u64, SipState> =
            SlotIndex::with_pool_and_hasher(100, pool.clone(), SipState::random());
        for key in 0..100u64 {
            first.get_or_insert(key);
        }
        first.dispose();
        assert_eq!(pool.parked(), 1);

        let mut second: SlotIndex<u64, SipState> =
            SlotIndex::with_pool_and_hasher(100, pool.clone(), SipState::random());
        assert_eq!(pool.parked(), 0);
        assert_eq!(second.len(), 0);
        // A few live keys force real probe walks over the recycled buffer;
        // none of the first index's keys may surface.
        for key in 1_000..1_010u64 {
            second.get_or_insert(key);
        }
        for key in 0..100u64 {
            assert_eq!(second.find(&key), None);
        }
        for key in 1_000..1_010u64 {
            assert_eq!(second.find(&key), Some((key - 1_000) as usize));
        }
    }

    #[test]
    fn version_token_tracks_clears_and_rehashes() {
        let mut index: SlotIndex<u64, SipState> = SlotIndex::with_hasher(SipState::random());
        let mut seen = Vec::new();
        seen.push(index.version_token());
        for round in 0..10 {
            for key in 0..(round * 50) {
                index.get_or_insert(key);
            }
            index.clear(true);
            let token = index.version_token();
            assert!(!seen.contains(&token));
            seen.push(token);
        }
    }

    #[test]
    fn capacity_overflow_is_reported_not_fatal() {
        let error = SlotIndex::<u64, SipState>::try_with_capacity_and_hasher(
            MAX_CAPACITY + 1,
            SipState::random(),
        )
        .unwrap_err();
        assert_eq!(error.requested(), MAX_CAPACITY + 1);

        let mut index: SlotIndex<u64, SipState> = SlotIndex::with_hasher(SipState::random());
        index.get_or_insert(1);
        assert!(index.try_reserve(MAX_CAPACITY).is_err());
        // The failed reservation left the index untouched.
        assert_eq!(index.len(), 1);
        assert_eq!(index.find(&1), Some(0));
    }

    #[test]
    fn clone_rebuilds_an_equivalent_index() {
        let mut index: SlotIndex<u64, SipState> = SlotIndex::with_hasher(SipState::random());
        for key in 0..500u64 {
            index.get_or_insert(key);
        }
        let clone = index.clone();
        assert_eq!(clone.len(), index.len());
        for key in 0..500u64 {
            assert_eq!(clone.find(&key), index.find(&key));
        }
    }

    #[test]
    fn extend_and_from_iterator() {
        let index: SlotIndex<u64, SipState> = {
            let mut index = SlotIndex::with_hasher(SipState::random());
            index.extend(0..100u64);
            index.extend(50..150u64);
            index
        };
        assert_eq!(index.len(), 150);
        for key in 0..150u64 {
            assert_eq!(index.find(&key), Some(key as usize));
        }
    }
}
