//! GrowOnlyTable: insert/update-only map with lock-free reads.
//!
//! Writers serialize on a mutex. Readers take no lock: they load the
//! current snapshot pointer and probe it.
//!
//! Publication rules
//! - A new entry stores its value pointer before its key pointer, both with
//!   release ordering. A reader that observes a key therefore observes a value.
//! - Growth builds a complete snapshot under the writer lock and publishes it
//!   with one atomic swap. A reader holds either the old or the new snapshot,
//!   never a partially rehashed one.
//! - Nothing a reader may still reference is freed while the table is shared:
//!   retired snapshots and replaced values are kept until `reclaim(&mut self)`
//!   or drop.
//!
//! Every occupied cell of the current snapshot owns its key and value.
//! Retired snapshots alias those allocations and own only their cell array.

use crate::probe::{probe_overflow, Geometry};
use crate::reentrancy::DebugReentrancy;
use crate::strategy::{KeyStrategy, StandardStrategy};
use core::borrow::Borrow;
use core::convert::Infallible;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use parking_lot::Mutex;

/// Eight slots, six usable.
const MIN_BITS: u32 = 3;

struct Cell<K, V> {
    key: AtomicPtr<K>,
    value: AtomicPtr<V>,
}

struct Snapshot<K, V> {
    geometry: Geometry,
    cells: Box<[Cell<K, V>]>,
}

impl<K, V> Snapshot<K, V> {
    fn new(geometry: Geometry) -> Box<Self> {
        let cells = (0..geometry.size())
            .map(|_| Cell {
                key: AtomicPtr::new(ptr::null_mut()),
                value: AtomicPtr::new(ptr::null_mut()),
            })
            .collect();
        Box::new(Self { geometry, cells })
    }

    /// `Ok(index)` of the matching cell, or `Err(index)` of the empty cell
    /// that ends the probe chain.
    ///
    /// A snapshot never holds more than its capacity, so a quarter of the
    /// cells stay empty and the walk over `size` cells always ends.
    fn probe(&self, hash: u32, mut matches: impl FnMut(&K) -> bool) -> Result<usize, usize> {
        let bound = self.geometry.size();
        for index in self.geometry.probe(hash).take(bound) {
            let key = self.cells[index].key.load(Ordering::Acquire);
            // SAFETY: published keys live until the table is dropped.
            match unsafe { key.as_ref() } {
                None => return Err(index),
                Some(k) if matches(k) => return Ok(index),
                Some(_) => {}
            }
        }
        probe_overflow(bound)
    }

    fn vacant_for(&self, hash: u32) -> usize {
        let (Ok(index) | Err(index)) = self.probe(hash, |_| false);
        index
    }

    /// Key and value of a cell, if the cell is published.
    fn entry<'a>(&self, index: usize) -> Option<(&'a K, &'a V)> {
        let cell = &self.cells[index];
        // SAFETY: published keys and values live until the table is dropped
        // or reclaimed through `&mut`, which outlives every `&self` borrow.
        let key = unsafe { cell.key.load(Ordering::Acquire).as_ref()? };
        let value = unsafe { cell.value.load(Ordering::Acquire).as_ref()? };
        Some((key, value))
    }
}

struct Writer<K, V> {
    retired: Vec<NonNull<Snapshot<K, V>>>,
    replaced: Vec<NonNull<V>>,
}

enum Outcome<'a, V> {
    Inserted(&'a V),
    Present(&'a V),
    Replaced(&'a V),
}

pub struct GrowOnlyTable<K, V, H = StandardStrategy> {
    strategy: H,
    // Null until the first write.
    current: AtomicPtr<Snapshot<K, V>>,
    count: AtomicUsize,
    initial: Geometry,
    writer: Mutex<Writer<K, V>>,
    reentrancy: DebugReentrancy,
    _owns: PhantomData<(Box<K>, Box<V>)>,
}

// SAFETY: the table owns its keys and values; moving it moves them.
unsafe impl<K: Send, V: Send, H: Send> Send for GrowOnlyTable<K, V, H> {}
// SAFETY: shared readers hand out `&K`/`&V` (needs `Sync`); shared writers
// move keys and values in from other threads (needs `Send`).
unsafe impl<K: Send + Sync, V: Send + Sync, H: Sync> Sync for GrowOnlyTable<K, V, H> {}

impl<K, V> GrowOnlyTable<K, V> {
    pub fn new() -> Self {
        Self::with_strategy(StandardStrategy::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_strategy(capacity, StandardStrategy::default())
    }
}

impl<K, V> Default for GrowOnlyTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H> GrowOnlyTable<K, V, H> {
    pub fn with_strategy(strategy: H) -> Self {
        Self::with_capacity_and_strategy(0, strategy)
    }

    /// Storage is not allocated until the first write.
    pub fn with_capacity_and_strategy(capacity: usize, strategy: H) -> Self {
        Self {
            strategy,
            current: AtomicPtr::new(ptr::null_mut()),
            count: AtomicUsize::new(0),
            initial: Geometry::for_count(capacity, MIN_BITS),
            writer: Mutex::new(Writer {
                retired: Vec::new(),
                replaced: Vec::new(),
            }),
            reentrancy: DebugReentrancy::new(),
            _owns: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Option<&Snapshot<K, V>> {
        // SAFETY: snapshots are freed only through `&mut self`.
        unsafe { self.current.load(Ordering::Acquire).as_ref() }
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.get_key_value(q).map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        let snapshot = self.snapshot()?;
        let hash = self.strategy.hash_key(q);
        let index = snapshot
            .probe(hash, |k| self.strategy.keys_equal(k.borrow(), q))
            .ok()?;
        snapshot.entry(index)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        H: KeyStrategy<Q>,
    {
        self.get_key_value(q).is_some()
    }

    /// Iterate the snapshot current at the time of the call, in slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            snapshot: self.snapshot(),
            index: 0,
            _items: PhantomData,
        }
    }

    /// Insert or replace; returns the previous value. The previous value
    /// stays readable until the table is reclaimed or dropped.
    ///
    /// Every replacement keeps one old value allocated until
    /// [`reclaim`](Self::reclaim), which needs `&mut self`. A table that is
    /// never exclusively borrowed again (a `static`, or an `Arc` that is
    /// never unwrapped) grows with each update; such tables should prefer
    /// [`put_if_absent`](Self::put_if_absent) or
    /// [`get_or_insert_with`](Self::get_or_insert_with).
    pub fn put(&self, key: K, value: V) -> Option<&V>
    where
        H: KeyStrategy<K>,
    {
        match self.write(key, true, || Ok::<V, Infallible>(value)) {
            Ok(Outcome::Replaced(previous)) => Some(previous),
            Ok(Outcome::Inserted(_) | Outcome::Present(_)) => None,
            Err(never) => match never {},
        }
    }

    /// Insert only when `key` is absent; otherwise returns the existing value.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<&V>
    where
        H: KeyStrategy<K>,
    {
        match self.write(key, false, || Ok::<V, Infallible>(value)) {
            Ok(Outcome::Present(existing)) => Some(existing),
            Ok(Outcome::Inserted(_) | Outcome::Replaced(_)) => None,
            Err(never) => match never {},
        }
    }

    /// Value for `key`, building it with `make` on a miss. `make` runs at
    /// most once, under the writer lock.
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> &V
    where
        H: KeyStrategy<K>,
        F: FnOnce() -> V,
    {
        match self.get_or_try_insert_with(key, || Ok::<V, Infallible>(make())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with) with a fallible
    /// constructor. Nothing is inserted when `make` fails.
    pub fn get_or_try_insert_with<F, E>(&self, key: K, make: F) -> Result<&V, E>
    where
        H: KeyStrategy<K>,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        match self.write(key, false, make)? {
            Outcome::Inserted(value) | Outcome::Present(value) | Outcome::Replaced(value) => {
                Ok(value)
            }
        }
    }

    fn write<F, E>(&self, key: K, overwrite: bool, make: F) -> Result<Outcome<'_, V>, E>
    where
        H: KeyStrategy<K>,
        F: FnOnce() -> Result<V, E>,
    {
        self.reentrancy.check();
        let mut writer = self.writer.lock();
        let _g = self.reentrancy.enter();

        let mut snapshot = match self.snapshot() {
            Some(snapshot) => snapshot,
            None => {
                let fresh = Box::into_raw(Snapshot::new(self.initial));
                self.current.store(fresh, Ordering::Release);
                // SAFETY: just allocated; freed only through `&mut self`.
                unsafe { &*fresh }
            }
        };

        let hash = self.strategy.hash_key(&key);
        let vacant = match snapshot.probe(hash, |k| self.strategy.keys_equal(k, &key)) {
            Ok(index) => {
                let cell = &snapshot.cells[index];
                if !overwrite {
                    // SAFETY: published values live until reclaim or drop.
                    return Ok(match unsafe { cell.value.load(Ordering::Acquire).as_ref() } {
                        Some(existing) => Outcome::Present(existing),
                        None => unreachable!("published key without a value"),
                    });
                }
                let fresh = Box::into_raw(Box::new(make()?));
                let previous = cell.value.swap(fresh, Ordering::AcqRel);
                let Some(previous) = NonNull::new(previous) else {
                    unreachable!("published key without a value");
                };
                writer.replaced.push(previous);
                // SAFETY: kept alive in `replaced` until reclaim or drop.
                return Ok(Outcome::Replaced(unsafe { previous.as_ref() }));
            }
            Err(index) => index,
        };

        let value = make()?;
        let count = self.count.load(Ordering::Relaxed);
        let index = if count >= snapshot.geometry.capacity() {
            snapshot = self.grow(snapshot, &mut writer);
            snapshot.vacant_for(hash)
        } else {
            vacant
        };

        let cell = &snapshot.cells[index];
        let value = Box::into_raw(Box::new(value));
        cell.value.store(value, Ordering::Release);
        cell.key.store(Box::into_raw(Box::new(key)), Ordering::Release);
        self.count.store(count + 1, Ordering::Release);
        // SAFETY: owned by the current snapshot until drop.
        Ok(Outcome::Inserted(unsafe { &*value }))
    }

    /// Publish a doubled copy of `old` and retire `old`. Caller holds the
    /// writer lock.
    fn grow<'s>(&'s self, old: &Snapshot<K, V>, writer: &mut Writer<K, V>) -> &'s Snapshot<K, V>
    where
        H: KeyStrategy<K>,
    {
        let fresh = Snapshot::new(old.geometry.doubled());
        log::trace!(
            "growing grow-only table: {} -> {} slots",
            old.geometry.size(),
            fresh.geometry.size()
        );
        for cell in old.cells.iter() {
            let key = cell.key.load(Ordering::Relaxed);
            // SAFETY: published keys live until drop.
            let Some(k) = (unsafe { key.as_ref() }) else {
                continue;
            };
            let target = &fresh.cells[fresh.vacant_for(self.strategy.hash_key(k))];
            target
                .value
                .store(cell.value.load(Ordering::Relaxed), Ordering::Relaxed);
            target.key.store(key, Ordering::Relaxed);
        }
        let fresh = Box::into_raw(fresh);
        let old = self.current.swap(fresh, Ordering::AcqRel);
        if let Some(old) = NonNull::new(old) {
            writer.retired.push(old);
        }
        // SAFETY: just published; freed only through `&mut self`.
        unsafe { &*fresh }
    }

    /// Replaced values and retired snapshots waiting for [`reclaim`](Self::reclaim).
    pub fn unreclaimed(&self) -> usize {
        let writer = self.writer.lock();
        writer.retired.len() + writer.replaced.len()
    }

    /// Free retired snapshots and replaced values. Exclusive access proves no
    /// reader still holds them.
    pub fn reclaim(&mut self) {
        let writer = self.writer.get_mut();
        for snapshot in writer.retired.drain(..) {
            // SAFETY: retired snapshots own only their cell array.
            drop(unsafe { Box::from_raw(snapshot.as_ptr()) });
        }
        for value in writer.replaced.drain(..) {
            // SAFETY: replaced values are referenced by no current cell.
            drop(unsafe { Box::from_raw(value.as_ptr()) });
        }
    }
}

impl<K, V, H> Drop for GrowOnlyTable<K, V, H> {
    fn drop(&mut self) {
        self.reclaim();
        let current = *self.current.get_mut();
        if current.is_null() {
            return;
        }
        // SAFETY: the current snapshot owns every published key and value.
        let snapshot = unsafe { Box::from_raw(current) };
        for cell in snapshot.cells.iter() {
            let key = cell.key.load(Ordering::Relaxed);
            if !key.is_null() {
                // SAFETY: each key and value is owned by exactly one current cell.
                unsafe {
                    drop(Box::from_raw(key));
                    drop(Box::from_raw(cell.value.load(Ordering::Relaxed)));
                }
            }
        }
    }
}

/// Iterator over one snapshot of a [`GrowOnlyTable`].
pub struct Iter<'a, K, V> {
    snapshot: Option<&'a Snapshot<K, V>>,
    index: usize,
    _items: PhantomData<(&'a K, &'a V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let snapshot = self.snapshot?;
        while self.index < snapshot.cells.len() {
            let index = self.index;
            self.index += 1;
            if let Some(entry) = snapshot.entry(index) {
                return Some(entry);
            }
        }
        None
    }
}

impl<'a, K, V, H> IntoIterator for &'a GrowOnlyTable<K, V, H> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H> fmt::Debug for GrowOnlyTable<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::hash::{Hash, Hasher};
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicBool;

    /// Invariant: a new table allocates nothing and answers lookups as absent.
    #[test]
    fn empty_table_reads() {
        let t: GrowOnlyTable<String, i32> = GrowOnlyTable::new();
        assert!(t.is_empty());
        assert_eq!(t.get("x"), None);
        assert_eq!(t.iter().count(), 0);
        assert!(t.current.load(Ordering::Relaxed).is_null());
    }

    /// Invariant: `put` returns the previous value, which stays readable.
    #[test]
    fn put_returns_previous() {
        let t = GrowOnlyTable::new();
        assert_eq!(t.put("k".to_string(), 1), None);
        let previous = t.put("k".to_string(), 2);
        assert_eq!(previous, Some(&1));
        assert_eq!(t.get("k"), Some(&2));
        assert_eq!(t.len(), 1);
    }

    /// Invariant: `put_if_absent` never replaces.
    #[test]
    fn put_if_absent_keeps_existing() {
        let t = GrowOnlyTable::new();
        assert_eq!(t.put_if_absent(1, "a"), None);
        assert_eq!(t.put_if_absent(1, "b"), Some(&"a"));
        assert_eq!(t.get(&1), Some(&"a"));
    }

    /// Invariant: references obtained before growth remain valid after it,
    /// because retired snapshots are kept until reclaim.
    #[test]
    fn references_survive_growth() {
        let t = GrowOnlyTable::new();
        let first = t.get_or_insert_with(0u32, || "zero".to_string());
        for i in 1..1000u32 {
            t.put(i, i.to_string());
        }
        assert_eq!(first, "zero");
        assert_eq!(t.len(), 1000);
        for i in 1..1000u32 {
            assert_eq!(t.get(&i).map(String::as_str), Some(i.to_string().as_str()));
        }
    }

    /// Invariant: `get_or_insert_with` builds the value once.
    #[test]
    fn get_or_insert_with_is_lazy() {
        let t = GrowOnlyTable::new();
        let mut calls = 0;
        assert_eq!(*t.get_or_insert_with("k", || { calls += 1; 7 }), 7);
        assert_eq!(*t.get_or_insert_with("k", || { calls += 1; 8 }), 7);
        assert_eq!(calls, 1);
    }

    /// Invariant: a failing constructor inserts nothing.
    #[test]
    fn try_insert_failure_leaves_table_unchanged() {
        let t: GrowOnlyTable<&str, i32> = GrowOnlyTable::new();
        let r: Result<&i32, &str> = t.get_or_try_insert_with("k", || Err("nope"));
        assert_eq!(r, Err("nope"));
        assert!(t.is_empty());
        assert_eq!(t.get_or_try_insert_with("k", || Ok::<_, &str>(3)), Ok(&3));
    }

    /// Invariant: `reclaim` frees superseded storage without touching live entries.
    #[test]
    fn reclaim_keeps_live_entries() {
        let mut t = GrowOnlyTable::new();
        for i in 0..100 {
            t.put(i, vec![i]);
            t.put(i, vec![i, i]);
        }
        assert!(!t.writer.get_mut().retired.is_empty());
        assert_eq!(t.writer.get_mut().replaced.len(), 100);
        t.reclaim();
        assert!(t.writer.get_mut().retired.is_empty());
        assert!(t.writer.get_mut().replaced.is_empty());
        for i in 0..100 {
            assert_eq!(t.get(&i), Some(&vec![i, i]));
        }
    }

    /// Invariant: readers running alongside writers only ever observe
    /// complete entries, and every write is visible once writers finish.
    #[test]
    fn concurrent_readers_and_writers() {
        let t: GrowOnlyTable<u64, u64> = GrowOnlyTable::new();
        let done = AtomicBool::new(false);
        std::thread::scope(|s| {
            let writers: Vec<_> = (0..2u64)
                .map(|w| {
                    let t = &t;
                    s.spawn(move || {
                        for i in 0..5_000u64 {
                            let k = i * 2 + w;
                            t.put(k, k * 10);
                        }
                    })
                })
                .collect();
            for _ in 0..4 {
                s.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        for k in 0..10_000u64 {
                            if let Some(v) = t.get(&k) {
                                assert_eq!(*v, k * 10);
                            }
                        }
                        for (k, v) in t.iter() {
                            assert_eq!(*v, *k * 10);
                        }
                    }
                });
            }
            for w in writers {
                w.join().unwrap();
            }
            done.store(true, Ordering::Release);
        });
        assert_eq!(t.len(), 10_000);
        let keys: BTreeSet<u64> = t.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (0..10_000).collect::<BTreeSet<_>>());
    }

    /// Invariant: shared writers may race on the same keys; the final value
    /// is one of the written ones and no key is duplicated.
    #[test]
    fn racing_writers_same_keys() {
        let t: GrowOnlyTable<u32, u32> = GrowOnlyTable::new();
        std::thread::scope(|s| {
            for w in 0..4u32 {
                let t = &t;
                s.spawn(move || {
                    for k in 0..500u32 {
                        t.put(k, w);
                    }
                });
            }
        });
        assert_eq!(t.len(), 500);
        assert_eq!(t.iter().count(), 500);
        assert!(t.iter().all(|(_, v)| *v < 4));
    }

    struct ReentryKey {
        id: u32,
        table: *const GrowOnlyTable<ReentryKey, i32>,
    }
    impl PartialEq for ReentryKey {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }
    impl Eq for ReentryKey {}
    impl Hash for ReentryKey {
        fn hash<S: Hasher>(&self, state: &mut S) {
            self.id.hash(state);
            if !self.table.is_null() {
                // Attempt to write into the same table while it is locked.
                unsafe {
                    let t = &*self.table;
                    t.put(
                        ReentryKey {
                            id: self.id + 1,
                            table: ptr::null(),
                        },
                        0,
                    );
                }
            }
        }
    }

    /// Invariant (debug-only): a write issued from inside a key's `Hash`
    /// during a write panics instead of deadlocking on the writer mutex.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrant_write_panics() {
        let t: GrowOnlyTable<ReentryKey, i32> = GrowOnlyTable::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            t.put(
                ReentryKey {
                    id: 1,
                    table: &t as *const _,
                },
                1,
            );
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
        // The table stays usable after the aborted write.
        t.put(
            ReentryKey {
                id: 9,
                table: ptr::null(),
            },
            9,
        );
        assert_eq!(t.len(), 1);
    }
}
