#![cfg(test)]

// Property tests for the tables kept inside the crate so they can inspect
// internal storage.

use crate::grow_only_table::GrowOnlyTable;
use crate::hash_table::MutableHashTable;
use crate::strategy::StandardStrategy;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Hasher that sends every key to the same probe chain.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl Hasher for ConstHasher {
    fn finish(&self) -> u64 {
        0
    }
    fn write(&mut self, _bytes: &[u8]) {}
}
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> ConstHasher {
        ConstHasher
    }
}

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Put(usize, i32),
    PutIfAbsent(usize, i32),
    Remove(usize),
    Get(usize),
    Contains(String),
    Mutate(usize, i32),
    Iterate,
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario(max_pool: usize) -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=max_pool).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Put(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::PutIfAbsent(i, v)),
            4 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Get),
            1 => prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s)
            ]
            .prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Iterate),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..200).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn run_state_machine<S>(
    mut sut: MutableHashTable<Key, i32, StandardStrategy<S>>,
    pool: Vec<String>,
    ops: Vec<OpI>,
) -> Result<(), TestCaseError>
where
    S: BuildHasher,
{
    let mut model: HashMap<Key, i32> = HashMap::new();
    for op in ops {
        match op {
            OpI::Put(i, v) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.put(k.clone(), v), model.insert(k, v));
            }
            OpI::PutIfAbsent(i, v) => {
                let k = key_from(&pool, i);
                let expected = model.get(&k).copied();
                prop_assert_eq!(sut.put_if_absent(k.clone(), v).copied(), expected);
                model.entry(k).or_insert(v);
            }
            OpI::Remove(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.remove(k.0.as_str()), model.remove(&k));
                prop_assert!(!sut.contains_key(k.0.as_str()), "no phantom entry after remove");
            }
            OpI::Get(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.get(&k), model.get(&k));
            }
            OpI::Contains(s) => {
                prop_assert_eq!(sut.contains_key(s.as_str()), model.contains_key(&Key(s)));
            }
            OpI::Mutate(i, d) => {
                let k = key_from(&pool, i);
                if let Some(v) = sut.get_mut(&k) {
                    *v = v.wrapping_add(d);
                }
                if let Some(v) = model.get_mut(&k) {
                    *v = v.wrapping_add(d);
                }
            }
            OpI::Iterate => {
                let seen: Vec<&Key> = sut.keys().collect();
                let unique: BTreeSet<&Key> = seen.iter().copied().collect();
                prop_assert_eq!(seen.len(), unique.len(), "iteration yields each entry once");
                let expected: BTreeSet<&Key> = model.keys().collect();
                prop_assert_eq!(unique, expected);
            }
            OpI::Clear => {
                sut.clear();
                model.clear();
            }
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }
    let mut got: Vec<(Key, i32)> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
    let mut want: Vec<(Key, i32)> = model.into_iter().collect();
    got.sort();
    want.sort();
    prop_assert_eq!(got, want);
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - `put` returns the previous value; `put_if_absent` never replaces.
// - `remove` returns the owned value and leaves no phantom entry behind.
// - Borrowed (`&str`) lookups agree with owned ones.
// - `iter` yields each live entry exactly once; `len`/`is_empty` parity.
// - Pools larger than the linear-search limit cross into hashed mode and back.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario(40)) {
        run_state_machine(MutableHashTable::new(), pool, ops)?;
    }

    // Every key collides: one probe chain carries all entries and tombstones.
    #[test]
    fn prop_state_machine_colliding((pool, ops) in arb_scenario(40)) {
        let sut = MutableHashTable::with_strategy(StandardStrategy::with_hasher(ConstBuildHasher));
        run_state_machine(sut, pool, ops)?;
    }

    // Tombstones plus live entries never exceed the growth threshold.
    #[test]
    fn prop_total_count_bounded(ops in proptest::collection::vec((any::<bool>(), 0u16..64), 1..400)) {
        let mut sut: MutableHashTable<u16, ()> = MutableHashTable::new();
        for (insert, k) in ops {
            if insert {
                sut.put(k, ());
            } else {
                sut.remove(&k);
            }
            if sut.capacity() > 0 {
                prop_assert!(sut.len() + sut.tombstones() <= sut.capacity());
            }
        }
    }

    // Grow-only table agrees with a model under puts, including across growth.
    #[test]
    fn prop_grow_only_matches_model(ops in proptest::collection::vec((0u32..500, any::<i32>(), any::<bool>()), 1..300)) {
        let sut: GrowOnlyTable<u32, i32> = GrowOnlyTable::new();
        let mut model: HashMap<u32, i32> = HashMap::new();
        for (k, v, replace) in ops {
            if replace {
                prop_assert_eq!(sut.put(k, v).copied(), model.insert(k, v));
            } else {
                prop_assert_eq!(sut.put_if_absent(k, v).copied(), model.get(&k).copied());
                model.entry(k).or_insert(v);
            }
            prop_assert_eq!(sut.len(), model.len());
        }
        for (k, v) in &model {
            prop_assert_eq!(sut.get(k), Some(v));
        }
        prop_assert_eq!(sut.iter().count(), model.len());
    }
}
