//! MutableHashTable: open-addressing map with tombstone deletion.
//!
//! Storage is a power-of-two slice of [`Slot`]s. Small tables (storage of at
//! most [`LINEAR_SEARCH_LIMIT`] slots) keep their entries packed at the front
//! and are searched linearly; removal swaps the last entry into the hole.
//! Larger tables use the golden-ratio probe sequence and leave a tombstone
//! on removal. Growth only happens on insertion.

use crate::probe::{empty_slots, probe_overflow, Geometry, Slot};
use crate::strategy::{KeyStrategy, StandardStrategy};
use core::borrow::Borrow;
use core::fmt;
use core::mem;

/// Storage sizes up to this many slots are searched linearly instead of hashed.
pub const LINEAR_SEARCH_LIMIT: usize = 16;

/// Four slots, three usable.
const MIN_BITS: u32 = 2;

enum Lookup {
    Found(usize),
    Vacant(usize),
}

#[derive(Clone)]
pub struct MutableHashTable<K, V, H = StandardStrategy> {
    strategy: H,
    slots: Box<[Slot<(K, V)>]>,
    // Meaningful once `slots` is allocated; until then, the size to allocate.
    geometry: Geometry,
    initial: Geometry,
    count: usize,
    // Occupied plus tombstones.
    total_count: usize,
}

impl<K, V> MutableHashTable<K, V> {
    pub fn new() -> Self {
        Self::with_strategy(StandardStrategy::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_strategy(capacity, StandardStrategy::default())
    }
}

impl<K, V> Default for MutableHashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H> MutableHashTable<K, V, H> {
    pub fn with_strategy(strategy: H) -> Self {
        Self::with_capacity_and_strategy(0, strategy)
    }

    /// Storage is not allocated until the first insertion.
    pub fn with_capacity_and_strategy(capacity: usize, strategy: H) -> Self {
        let initial = Geometry::for_count(capacity, MIN_BITS);
        Self {
            strategy,
            slots: Box::new([]),
            geometry: initial,
            initial,
            count: 0,
            total_count: 0,
        }
    }

    pub fn strategy(&self) -> &H {
        &self.strategy
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Entries the current storage accepts before it grows; 0 while unallocated.
    pub fn capacity(&self) -> usize {
        if self.slots.is_empty() {
            0
        } else {
            self.geometry.capacity()
        }
    }

    /// Drop every entry and release the storage.
    pub fn clear(&mut self) {
        self.slots = Box::new([]);
        self.geometry = self.initial;
        self.count = 0;
        self.total_count = 0;
    }

    #[cfg(test)]
    pub(crate) fn tombstones(&self) -> usize {
        self.total_count - self.count
    }

    #[inline]
    fn is_linear(&self) -> bool {
        self.slots.len() <= LINEAR_SEARCH_LIMIT
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots.iter(),
            remaining: self.count,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            slots: self.slots.iter_mut(),
            remaining: self.count,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> + '_ {
        self.iter_mut().map(|(_, v)| v)
    }
}

impl<K, V, H> MutableHashTable<K, V, H> {
    fn lookup<Q>(&self, q: &Q) -> Lookup
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        if self.is_linear() {
            let found = self.slots[..self.count].iter().position(|slot| {
                slot.as_occupied()
                    .is_some_and(|(k, _)| self.strategy.keys_equal(k.borrow(), q))
            });
            return match found {
                Some(index) => Lookup::Found(index),
                None => Lookup::Vacant(self.count),
            };
        }

        let bound = self.total_count + 1;
        let mut tombstone = None;
        for index in self.geometry.probe(self.strategy.hash_key(q)).take(bound) {
            match &self.slots[index] {
                Slot::Empty => return Lookup::Vacant(tombstone.unwrap_or(index)),
                Slot::Tombstone => {
                    tombstone.get_or_insert(index);
                }
                Slot::Occupied((k, _)) => {
                    if self.strategy.keys_equal(k.borrow(), q) {
                        return Lookup::Found(index);
                    }
                }
            }
        }
        probe_overflow(bound)
    }

    fn find<Q>(&self, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        if self.count == 0 {
            return None;
        }
        match self.lookup(q) {
            Lookup::Found(index) => Some(index),
            Lookup::Vacant(_) => None,
        }
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        let index = self.find(q)?;
        self.slots[index].as_occupied().map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        let index = self.find(q)?;
        self.slots[index].as_occupied().map(|(k, v)| (k, v))
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        let index = self.find(q)?;
        self.slots[index].as_occupied_mut().map(|(_, v)| v)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.find(q).is_some()
    }

    /// Insert or replace; returns the previous value for `key`.
    pub fn put(&mut self, key: K, value: V) -> Option<V>
    where
        H: KeyStrategy<K>,
    {
        match self.lookup(&key) {
            Lookup::Found(index) => self.slots[index]
                .as_occupied_mut()
                .map(|(_, v)| mem::replace(v, value)),
            Lookup::Vacant(index) => {
                self.insert_vacant(index, key, value);
                None
            }
        }
    }

    /// Insert only when `key` is absent. Returns the existing value otherwise,
    /// leaving it untouched and dropping `value`.
    pub fn put_if_absent(&mut self, key: K, value: V) -> Option<&V>
    where
        H: KeyStrategy<K>,
    {
        match self.lookup(&key) {
            Lookup::Found(index) => self.slots[index].as_occupied().map(|(_, v)| v),
            Lookup::Vacant(index) => {
                self.insert_vacant(index, key, value);
                None
            }
        }
    }

    fn insert_vacant(&mut self, index: usize, key: K, value: V)
    where
        H: KeyStrategy<K>,
    {
        // A reused tombstone is already counted in `total_count`.
        let index = if self.slots.get(index).is_some_and(Slot::is_tombstone) {
            index
        } else if self.slots.is_empty() || self.total_count >= self.geometry.capacity() {
            self.grow();
            self.empty_slot_for(&key)
        } else {
            self.total_count += 1;
            index
        };
        self.slots[index] = Slot::Occupied((key, value));
        self.count += 1;
    }

    /// Rehash live entries into fresh storage. Doubles the size unless the
    /// live entries fill less than half the threshold, in which case only the
    /// tombstones are purged.
    fn grow(&mut self)
    where
        H: KeyStrategy<K>,
    {
        let geometry = if self.slots.is_empty() {
            self.geometry
        } else if self.count * 2 < self.geometry.capacity() {
            self.geometry
        } else {
            self.geometry.doubled()
        };
        log::trace!(
            "rehashing table: {} -> {} slots, {} live, {} tombstones",
            self.slots.len(),
            geometry.size(),
            self.count,
            self.total_count - self.count
        );
        let old = mem::replace(&mut self.slots, empty_slots(geometry.size()));
        self.geometry = geometry;
        self.total_count = 0;
        for (key, value) in old.into_vec().into_iter().filter_map(Slot::into_occupied) {
            let index = self.empty_slot_for(&key);
            self.slots[index] = Slot::Occupied((key, value));
        }
    }

    /// Claim the slot a key without duplicates or tombstones would occupy,
    /// counting it in `total_count`.
    fn empty_slot_for(&mut self, key: &K) -> usize
    where
        H: KeyStrategy<K>,
    {
        let index = if self.is_linear() {
            self.total_count
        } else {
            let bound = self.total_count + 1;
            self.geometry
                .probe(self.strategy.hash_key(key))
                .take(bound)
                .find(|&index| matches!(self.slots[index], Slot::Empty))
                .unwrap_or_else(|| probe_overflow(bound))
        };
        self.total_count += 1;
        index
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        let index = self.find(q)?;
        let removed = if self.is_linear() {
            let last = self.count - 1;
            self.slots.swap(index, last);
            self.total_count -= 1;
            mem::replace(&mut self.slots[last], Slot::Empty)
        } else {
            mem::replace(&mut self.slots[index], Slot::Tombstone)
        };
        self.count -= 1;
        removed.into_occupied()
    }
}

/// Iterator over entries in slot order.
pub struct Iter<'a, K, V> {
    slots: core::slice::Iter<'a, Slot<(K, V)>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let (k, v) = self.slots.find_map(Slot::as_occupied)?;
        self.remaining -= 1;
        Some((k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Iterator over entries with mutable values, in slot order.
pub struct IterMut<'a, K, V> {
    slots: core::slice::IterMut<'a, Slot<(K, V)>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let (k, v) = self.slots.find_map(Slot::as_occupied_mut)?;
        self.remaining -= 1;
        Some((&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// Owning iterator over entries in slot order.
pub struct IntoIter<K, V> {
    slots: std::vec::IntoIter<Slot<(K, V)>>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    #[inline]
    fn next(&mut self) -> Option<(K, V)> {
        self.slots.find_map(Slot::into_occupied)
    }
}

impl<'a, K, V, H> IntoIterator for &'a MutableHashTable<K, V, H> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, H> IntoIterator for &'a mut MutableHashTable<K, V, H> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, H> IntoIterator for MutableHashTable<K, V, H> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            slots: self.slots.into_vec().into_iter(),
        }
    }
}

impl<K, V, H: KeyStrategy<K>> Extend<(K, V)> for MutableHashTable<K, V, H> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.put(k, v);
        }
    }
}

impl<K, V, H> FromIterator<(K, V)> for MutableHashTable<K, V, H>
where
    H: KeyStrategy<K> + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut table = Self::with_strategy(H::default());
        table.extend(iter);
        table
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H> fmt::Debug for MutableHashTable<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
