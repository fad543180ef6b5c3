//! MultiKeyTable: fixed-arity composite keys mapped to one value.
//!
//! Tuple `i` keeps its components in `keys[i * arity .. i * arity + arity]`
//! of a flat array; `values[i]` holds its slot. The bucket is the composite
//! hash modulo the table size and collisions probe linearly. A removed tuple
//! clears all of its key components and leaves a tombstone in `values`.
//!
//! Lookups take a slice of borrowed components (`&[&Q]`); writes take any
//! `IntoIterator<Item = K>` such as `[K; N]`. Tuples are staged in a
//! per-call stack buffer, so shared lookups never touch common scratch space.

use crate::probe::{empty_slots, probe_overflow, Geometry, Slot};
use crate::strategy::{KeyStrategy, StandardStrategy};
use core::borrow::Borrow;
use core::fmt;
use core::mem;
use core::slice::ChunksExact;

pub const MIN_ARITY: usize = 2;
pub const MAX_ARITY: usize = 4;

/// Eight slots, six usable.
const MIN_BITS: u32 = 3;

type TupleBuf<K> = [Option<K>; MAX_ARITY];

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("multi-key table arity must be between 2 and 4, got {0}")]
pub struct ArityError(pub usize);

enum Lookup {
    /// `tombstone` is the first tombstone passed on the way to `index`.
    Found {
        index: usize,
        tombstone: Option<usize>,
    },
    Vacant(usize),
}

#[derive(Clone)]
pub struct MultiKeyTable<K, V, H = StandardStrategy> {
    strategy: H,
    arity: usize,
    keys: Box<[Option<K>]>,
    values: Box<[Slot<V>]>,
    geometry: Geometry,
    initial: Geometry,
    count: usize,
    // Occupied plus tombstones.
    total_count: usize,
}

impl<K, V> MultiKeyTable<K, V> {
    /// Panics when `arity` is outside `2..=4`.
    #[track_caller]
    pub fn new(arity: usize) -> Self {
        Self::with_capacity(arity, 0)
    }

    pub fn try_new(arity: usize) -> Result<Self, ArityError> {
        Self::try_with_capacity_and_strategy(arity, 0, StandardStrategy::default())
    }

    /// Panics when `arity` is outside `2..=4`.
    #[track_caller]
    pub fn with_capacity(arity: usize, capacity: usize) -> Self {
        match Self::try_with_capacity_and_strategy(arity, capacity, StandardStrategy::default()) {
            Ok(table) => table,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<K, V, H> MultiKeyTable<K, V, H> {
    /// Storage is not allocated until the first insertion.
    pub fn try_with_capacity_and_strategy(
        arity: usize,
        capacity: usize,
        strategy: H,
    ) -> Result<Self, ArityError> {
        if !(MIN_ARITY..=MAX_ARITY).contains(&arity) {
            return Err(ArityError(arity));
        }
        let initial = Geometry::for_count(capacity, MIN_BITS);
        Ok(Self {
            strategy,
            arity,
            keys: Box::new([]),
            values: Box::new([]),
            geometry: initial,
            initial,
            count: 0,
            total_count: 0,
        })
    }

    pub fn arity(&self) -> usize {
        self.arity
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

    /// Drop every entry and release the storage.
    pub fn clear(&mut self) {
        self.keys = Box::new([]);
        self.values = Box::new([]);
        self.geometry = self.initial;
        self.count = 0;
        self.total_count = 0;
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            keys: self.keys.chunks_exact(self.arity),
            values: self.values.iter(),
            remaining: self.count,
        }
    }

    #[track_caller]
    fn check_len(&self, len: usize) {
        assert!(
            len == self.arity,
            "tuple length mismatch: table arity is {}, got {} keys",
            self.arity,
            len
        );
    }

    #[track_caller]
    fn stage<I>(&self, tuple: I) -> TupleBuf<K>
    where
        I: IntoIterator<Item = K>,
    {
        let mut buf: TupleBuf<K> = Default::default();
        let mut len = 0;
        for key in tuple {
            if let Some(slot) = buf.get_mut(len) {
                *slot = Some(key);
            }
            len += 1;
        }
        self.check_len(len);
        buf
    }

    #[inline]
    fn tuple_range(&self, index: usize) -> core::ops::Range<usize> {
        index * self.arity..(index + 1) * self.arity
    }

    /// `(hash << 1) ^ component` over the tuple, absolute value, modulo size.
    fn bucket<'q, Q>(&self, tuple: impl Iterator<Item = &'q Q>) -> usize
    where
        Q: ?Sized + 'q,
        H: KeyStrategy<Q>,
    {
        let hash = tuple.fold(0i32, |hash, part| {
            hash.wrapping_shl(1) ^ self.strategy.hash_key(part) as i32
        });
        hash.unsigned_abs() as usize % self.values.len()
    }

    fn matches<'q, Q>(&self, index: usize, tuple: impl Iterator<Item = &'q Q>) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + 'q,
        H: KeyStrategy<Q>,
    {
        self.keys[self.tuple_range(index)]
            .iter()
            .zip(tuple)
            .all(|(stored, q)| {
                stored
                    .as_ref()
                    .is_some_and(|k| self.strategy.keys_equal(k.borrow(), q))
            })
    }

    /// Storage must be allocated.
    fn lookup<'q, Q, I>(&self, tuple: I) -> Lookup
    where
        K: Borrow<Q>,
        Q: ?Sized + 'q,
        H: KeyStrategy<Q>,
        I: Iterator<Item = &'q Q> + Clone,
    {
        let size = self.values.len();
        let mut index = self.bucket(tuple.clone());
        let mut tombstone = None;
        for _ in 0..size {
            match &self.values[index] {
                Slot::Empty => return Lookup::Vacant(tombstone.unwrap_or(index)),
                Slot::Tombstone => {
                    tombstone.get_or_insert(index);
                }
                Slot::Occupied(_) => {
                    if self.matches(index, tuple.clone()) {
                        return Lookup::Found { index, tombstone };
                    }
                }
            }
            index = (index + 1) % size;
        }
        probe_overflow(size)
    }

    #[track_caller]
    fn find<Q>(&self, tuple: &[&Q]) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.check_len(tuple.len());
        if self.count == 0 {
            return None;
        }
        match self.lookup(tuple.iter().copied()) {
            Lookup::Found { index, .. } => Some(index),
            Lookup::Vacant(_) => None,
        }
    }

    /// Panics when `tuple.len()` differs from the arity.
    #[track_caller]
    pub fn get<Q>(&self, tuple: &[&Q]) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        let index = self.find(tuple)?;
        self.values[index].as_occupied()
    }

    #[track_caller]
    pub fn get_mut<Q>(&mut self, tuple: &[&Q]) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        let index = self.find(tuple)?;
        self.values[index].as_occupied_mut()
    }

    #[track_caller]
    pub fn contains_key<Q>(&self, tuple: &[&Q]) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.find(tuple).is_some()
    }

    /// Insert or replace; returns the previous value.
    ///
    /// When an earlier tombstone sits on the probe chain of an existing
    /// tuple, the entry moves into the tombstone and its old slot becomes one.
    ///
    /// Panics when the tuple length differs from the arity.
    #[track_caller]
    pub fn put<I>(&mut self, tuple: I, value: V) -> Option<V>
    where
        I: IntoIterator<Item = K>,
        H: KeyStrategy<K>,
    {
        let buf = self.stage(tuple);
        self.ensure_allocated();
        match self.lookup(buf.iter().flatten()) {
            Lookup::Found {
                index,
                tombstone: Some(hole),
            } => {
                let previous = mem::replace(&mut self.values[index], Slot::Tombstone);
                self.clear_keys(index);
                self.store(hole, buf, value);
                previous.into_occupied()
            }
            Lookup::Found {
                index,
                tombstone: None,
            } => self.values[index]
                .as_occupied_mut()
                .map(|v| mem::replace(v, value)),
            Lookup::Vacant(index) => {
                self.insert_vacant(index, buf, value);
                None
            }
        }
    }

    /// Insert only when the tuple is absent; otherwise returns the existing
    /// value untouched.
    #[track_caller]
    pub fn put_if_absent<I>(&mut self, tuple: I, value: V) -> Option<&V>
    where
        I: IntoIterator<Item = K>,
        H: KeyStrategy<K>,
    {
        let buf = self.stage(tuple);
        self.ensure_allocated();
        match self.lookup(buf.iter().flatten()) {
            Lookup::Found { index, .. } => self.values[index].as_occupied(),
            Lookup::Vacant(index) => {
                self.insert_vacant(index, buf, value);
                None
            }
        }
    }

    #[track_caller]
    pub fn remove<Q>(&mut self, tuple: &[&Q]) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        let index = self.find(tuple)?;
        let removed = mem::replace(&mut self.values[index], Slot::Tombstone);
        self.clear_keys(index);
        self.count -= 1;
        removed.into_occupied()
    }

    fn ensure_allocated(&mut self)
    where
        H: KeyStrategy<K>,
    {
        if self.values.is_empty() {
            self.rehash(self.geometry);
        }
    }

    fn insert_vacant(&mut self, index: usize, buf: TupleBuf<K>, value: V)
    where
        H: KeyStrategy<K>,
    {
        // A reused tombstone is already counted in `total_count`.
        let index = if self.values[index].is_tombstone() {
            index
        } else if self.total_count >= self.geometry.capacity() {
            self.grow();
            let index = self.empty_slot_for(self.bucket(buf.iter().flatten()));
            self.total_count += 1;
            index
        } else {
            self.total_count += 1;
            index
        };
        self.store(index, buf, value);
        self.count += 1;
    }

    fn store(&mut self, index: usize, buf: TupleBuf<K>, value: V) {
        let range = self.tuple_range(index);
        for (slot, key) in self.keys[range].iter_mut().zip(buf) {
            *slot = key;
        }
        self.values[index] = Slot::Occupied(value);
    }

    fn clear_keys(&mut self, index: usize) {
        let range = self.tuple_range(index);
        self.keys[range].fill_with(|| None);
    }

    fn empty_slot_for(&self, bucket: usize) -> usize {
        let size = self.values.len();
        (0..size)
            .map(|step| (bucket + step) % size)
            .find(|&index| matches!(self.values[index], Slot::Empty))
            .unwrap_or_else(|| probe_overflow(size))
    }

    /// Double the size, or only purge tombstones while live tuples fill less
    /// than half the threshold.
    fn grow(&mut self)
    where
        H: KeyStrategy<K>,
    {
        let geometry = if self.count * 2 < self.geometry.capacity() {
            self.geometry
        } else {
            self.geometry.doubled()
        };
        self.rehash(geometry);
    }

    fn rehash(&mut self, geometry: Geometry)
    where
        H: KeyStrategy<K>,
    {
        log::trace!(
            "rehashing multi-key table: {} -> {} slots, {} live, {} tombstones",
            self.values.len(),
            geometry.size(),
            self.count,
            self.total_count - self.count
        );
        let size = geometry.size();
        let old_keys = mem::replace(
            &mut self.keys,
            (0..size * self.arity).map(|_| None).collect(),
        );
        let old_values = mem::replace(&mut self.values, empty_slots(size));
        self.geometry = geometry;
        self.total_count = self.count;

        let mut old_keys = old_keys.into_vec().into_iter();
        for slot in old_values.into_vec() {
            let mut buf: TupleBuf<K> = Default::default();
            for part in buf.iter_mut().take(self.arity) {
                *part = old_keys.next().flatten();
            }
            if let Slot::Occupied(value) = slot {
                let index = self.empty_slot_for(self.bucket(buf.iter().flatten()));
                self.store(index, buf, value);
            }
        }
    }
}

/// Fixed-arity conveniences over the slice and array forms.
impl<K, V, H> MultiKeyTable<K, V, H> {
    #[track_caller]
    pub fn get2<Q>(&self, k0: &Q, k1: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.get(&[k0, k1])
    }

    #[track_caller]
    pub fn get3<Q>(&self, k0: &Q, k1: &Q, k2: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.get(&[k0, k1, k2])
    }

    #[track_caller]
    pub fn get4<Q>(&self, k0: &Q, k1: &Q, k2: &Q, k3: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.get(&[k0, k1, k2, k3])
    }

    #[track_caller]
    pub fn put2(&mut self, k0: K, k1: K, value: V) -> Option<V>
    where
        H: KeyStrategy<K>,
    {
        self.put([k0, k1], value)
    }

    #[track_caller]
    pub fn put3(&mut self, k0: K, k1: K, k2: K, value: V) -> Option<V>
    where
        H: KeyStrategy<K>,
    {
        self.put([k0, k1, k2], value)
    }

    #[track_caller]
    pub fn put4(&mut self, k0: K, k1: K, k2: K, k3: K, value: V) -> Option<V>
    where
        H: KeyStrategy<K>,
    {
        self.put([k0, k1, k2, k3], value)
    }

    #[track_caller]
    pub fn remove2<Q>(&mut self, k0: &Q, k1: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.remove(&[k0, k1])
    }

    #[track_caller]
    pub fn remove3<Q>(&mut self, k0: &Q, k1: &Q, k2: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.remove(&[k0, k1, k2])
    }

    #[track_caller]
    pub fn remove4<Q>(&mut self, k0: &Q, k1: &Q, k2: &Q, k3: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.remove(&[k0, k1, k2, k3])
    }
}

/// Borrowed key tuple of a live entry.
#[derive(Clone, Copy)]
pub struct TupleRef<'a, K> {
    keys: &'a [Option<K>],
}

impl<'a, K> TupleRef<'a, K> {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&'a K> {
        self.keys.get(i)?.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a K> + 'a {
        self.keys.iter().flatten()
    }

    pub fn to_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.iter().cloned().collect()
    }
}

impl<K: fmt::Debug> fmt::Debug for TupleRef<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over entries in slot order.
pub struct Iter<'a, K, V> {
    keys: ChunksExact<'a, Option<K>>,
    values: core::slice::Iter<'a, Slot<V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (TupleRef<'a, K>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            let keys = self.keys.next()?;
            if let Slot::Occupied(value) = self.values.next()? {
                self.remaining -= 1;
                return Some((TupleRef { keys }, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'a, K, V, H> IntoIterator for &'a MultiKeyTable<K, V, H> {
    type Item = (TupleRef<'a, K>, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H> fmt::Debug for MultiKeyTable<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
