use probe_util::MultiKeyTable;
use proptest::prelude::*;
use std::collections::HashMap;

// Model MultiKeyTable against a HashMap keyed by the tuple as a Vec.
// Small component ranges force repeated tuples, removals of live tuples and
// tombstone reuse along shared chains.
proptest! {
    #[test]
    fn prop_multi_key_matches_model(
        arity in 2usize..=4,
        ops in proptest::collection::vec((0u8..=3u8, proptest::collection::vec(0u8..3, 4), any::<i16>()), 1..300),
    ) {
        let mut m: MultiKeyTable<u8, i16> = MultiKeyTable::new(arity);
        let mut model: HashMap<Vec<u8>, i16> = HashMap::new();
        for (op, parts, v) in ops {
            let tuple = parts[..arity].to_vec();
            let refs: Vec<&u8> = tuple.iter().collect();
            match op {
                0 => prop_assert_eq!(m.put(tuple.clone(), v), model.insert(tuple, v)),
                1 => {
                    let expected = model.get(&tuple).copied();
                    prop_assert_eq!(m.put_if_absent(tuple.clone(), v).copied(), expected);
                    model.entry(tuple).or_insert(v);
                }
                2 => prop_assert_eq!(m.remove(refs.as_slice()), model.remove(&tuple)),
                _ => prop_assert_eq!(m.get(refs.as_slice()), model.get(&tuple)),
            }
            prop_assert_eq!(m.len(), model.len());
        }
        let mut got: Vec<(Vec<u8>, i16)> = m.iter().map(|(t, v)| (t.to_vec(), *v)).collect();
        let mut want: Vec<(Vec<u8>, i16)> = model.into_iter().collect();
        got.sort();
        want.sort();
        prop_assert_eq!(got, want);
    }
}
