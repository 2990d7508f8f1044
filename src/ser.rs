// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use archery::SharedPointerKind;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::hashmap::GenericHashMap;
use crate::transient::TransientHashMap;

struct MapVisitor<'de, K, V, S, P> {
    phantom: PhantomData<(K, V, S, P)>,
    phantom_lifetime: PhantomData<&'de ()>,
}

impl<'de, K, V, S, P> MapVisitor<'de, K, V, S, P> {
    fn new() -> Self {
        MapVisitor {
            phantom: PhantomData,
            phantom_lifetime: PhantomData,
        }
    }
}

impl<'de, K, V, S, P> Visitor<'de> for MapVisitor<'de, K, V, S, P>
where
    K: Deserialize<'de> + Hash + Eq + Clone,
    V: Deserialize<'de> + Hash + PartialEq + Clone,
    S: BuildHasher + Default + Clone,
    P: SharedPointerKind,
{
    type Value = GenericHashMap<K, V, S, P>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<Access>(self, mut access: Access) -> Result<Self::Value, Access::Error>
    where
        Access: MapAccess<'de>,
    {
        let mut transient = TransientHashMap::with_hasher(S::default());
        while let Some((key, value)) = access.next_entry()? {
            transient.put(key, value);
        }
        Ok(transient.into_persistent())
    }
}

impl<'de, K, V, S, P> Deserialize<'de> for GenericHashMap<K, V, S, P>
where
    K: Deserialize<'de> + Hash + Eq + Clone,
    V: Deserialize<'de> + Hash + PartialEq + Clone,
    S: BuildHasher + Default + Clone,
    P: SharedPointerKind,
{
    fn deserialize<D>(des: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        des.deserialize_map(MapVisitor::<'de, K, V, S, P>::new())
    }
}

impl<K, V, S, P> Serialize for GenericHashMap<K, V, S, P>
where
    K: Serialize,
    V: Serialize,
    P: SharedPointerKind,
{
    fn serialize<Ser>(&self, ser: Ser) -> Result<Ser::Ok, Ser::Error>
    where
        Ser: Serializer,
    {
        let mut s = ser.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            s.serialize_entry(k, v)?;
        }
        s.end()
    }
}

#[cfg(test)]
mod test {
    use crate::{proptest::hash_map, HashMap};
    use ::proptest::num::i32;
    use ::proptest::proptest;
    use serde_json::{from_str, to_string};

    proptest! {
        #[test]
        fn ser_hashmap(ref v in hash_map(i32::ANY, i32::ANY, 0..100)) {
            assert_eq!(v, &from_str::<HashMap<i32, i32>>(&to_string(&v).unwrap()).unwrap());
        }

        #[test]
        fn de_keeps_last_duplicate(k in i32::ANY, a in i32::ANY, b in i32::ANY) {
            let json = format!("{{\"{k}\":{a},\"{k}\":{b}}}");
            let map: HashMap<String, i32> = from_str(&json).unwrap();
            assert_eq!(1, map.len());
            assert_eq!(Some(&b), map.get(&k.to_string()));
        }
    }
}
