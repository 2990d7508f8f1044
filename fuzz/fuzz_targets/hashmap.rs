#![no_main]

use std::collections::HashMap as NatMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use compact_hamt::{HashMap, TransientHashMap};

#[derive(Arbitrary, Debug)]
enum Action<K, V> {
    Insert(K, V),
    Remove(K),
    Freeze,
}

fuzz_target!(|actions: Vec<Action<u16, u8>>| {
    let mut map = HashMap::new();
    let mut transient = TransientHashMap::new();
    let mut nat = NatMap::new();
    for action in actions {
        match action {
            Action::Insert(key, value) => {
                let previous = nat.insert(key, value);
                map = map.update(key, value);
                assert_eq!(Ok(previous), transient.insert(key, value));
            }
            Action::Remove(key) => {
                let previous = nat.remove(&key);
                map = map.without(&key);
                assert_eq!(Ok(previous), transient.remove(&key));
            }
            Action::Freeze => {
                let frozen = transient.freeze().unwrap();
                assert_eq!(map, frozen);
                transient = frozen.transient();
            }
        }
        assert_eq!(nat.len(), map.len());
        assert_eq!(nat.len(), transient.len());
    }
    let frozen = transient.into_persistent();
    assert_eq!(map, frozen);
    assert_eq!(HashMap::from(nat.clone()), map);
    assert_eq!(map.iter().map(|(k, v)| (*k, *v)).collect::<NatMap<_, _>>(), nat);
    assert_eq!(map.into_iter().count(), nat.len());
});
