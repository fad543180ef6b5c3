// MultiKeyTable integration suite.
//
// Core invariants exercised:
// - Arity is fixed at construction: 1 and 5 are rejected, and tuples of
//   the wrong length panic on get and put.
// - Tuples round-trip through growth for every supported arity.
// - Removal frees the tuple; reinserting it starts fresh.
use probe_util::{ArityError, MultiKeyTable};

// Test: arity enforcement at construction.
#[test]
fn arity_one_and_five_are_rejected() {
    assert_eq!(MultiKeyTable::<u32, u32>::try_new(1).err(), Some(ArityError(1)));
    assert_eq!(MultiKeyTable::<u32, u32>::try_new(5).err(), Some(ArityError(5)));
    let r = std::panic::catch_unwind(|| MultiKeyTable::<u32, u32>::new(1));
    assert!(r.is_err());
    let r = std::panic::catch_unwind(|| MultiKeyTable::<u32, u32>::new(5));
    assert!(r.is_err());
}

// Test: arity enforcement on access.
#[test]
#[should_panic(expected = "tuple length mismatch")]
fn put_with_wrong_arity_panics() {
    let mut m = MultiKeyTable::new(2);
    m.put3(1, 2, 3, "x");
}

#[test]
#[should_panic(expected = "tuple length mismatch")]
fn get_with_wrong_arity_panics() {
    let m: MultiKeyTable<u32, &str> = MultiKeyTable::new(4);
    m.get2(&1u32, &2u32);
}

// Test: round trip through growth for each arity.
#[test]
fn round_trip_every_arity() {
    for arity in 2..=4usize {
        let mut m = MultiKeyTable::new(arity);
        for i in 0..300u32 {
            let tuple: Vec<u32> = (0..arity as u32).map(|c| i * 10 + c).collect();
            assert_eq!(m.put(tuple, i), None);
        }
        assert_eq!(m.len(), 300);
        for i in 0..300u32 {
            let owned: Vec<u32> = (0..arity as u32).map(|c| i * 10 + c).collect();
            let parts: Vec<&u32> = owned.iter().collect();
            assert_eq!(m.get(parts.as_slice()), Some(&i));
        }
    }
}

// Test: remove then reinsert.
#[test]
fn remove_then_reinsert() {
    let mut m = MultiKeyTable::new(2);
    m.put2("user".to_string(), "alice".to_string(), 1);
    assert_eq!(m.remove2("user", "alice"), Some(1));
    assert_eq!(m.remove2("user", "alice"), None);
    assert!(!m.contains_key::<str>(&["user", "alice"]));
    assert_eq!(m.put_if_absent(["user".to_string(), "alice".to_string()], 2), None);
    assert_eq!(m.get2("user", "alice"), Some(&2));
    assert_eq!(m.len(), 1);
}

// Test: iteration exposes each live tuple once.
#[test]
fn iter_yields_live_tuples() {
    let mut m = MultiKeyTable::new(3);
    for i in 0..20u8 {
        m.put3(i, i, i, u32::from(i));
    }
    for i in (0..20u8).step_by(2) {
        m.remove3(&i, &i, &i);
    }
    let mut odd: Vec<u8> = m
        .iter()
        .map(|(t, v)| {
            assert_eq!(t.len(), 3);
            assert_eq!(u32::from(*t.get(0).unwrap()), *v);
            *t.get(2).unwrap()
        })
        .collect();
    odd.sort_unstable();
    assert_eq!(odd, (1..20).step_by(2).collect::<Vec<u8>>());
}
