// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A persistent hash map.
//!
//! An immutable hash map using [compressed hash array mapped tries][1].
//! Every write returns a new map, and the new map shares every subtree the
//! write didn't touch with the map it came from.
//!
//! Most operations on this map are O(log<sub>32</sub> n), which is to say
//! nearly O(1) for any map that fits in memory. Keys need to implement
//! [`Hash`][std::hash::Hash] and [`Eq`][std::cmp::Eq], and values need
//! [`Hash`][std::hash::Hash] and [`PartialEq`][std::cmp::PartialEq] so the
//! map can keep a content hash and skip writes that change nothing.
//!
//! Entries come out in an order determined by their hashes. Unless
//! otherwise specified, the hasher is the standard
//! [`RandomState`][std::collections::hash_map::RandomState].
//!
//! Loading many entries at once is cheaper through
//! [`update_all`][GenericHashMap::update_all] or a
//! [`TransientHashMap`][crate::transient::TransientHashMap], which edit the
//! nodes they create in place instead of copying them on every write.
//!
//! [1]: https://michael.steindorfer.name/publications/oopsla15.pdf
//! [std::cmp::Eq]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
//! [std::cmp::PartialEq]: https://doc.rust-lang.org/std/cmp/trait.PartialEq.html
//! [std::hash::Hash]: https://doc.rust-lang.org/std/hash/trait.Hash.html
//! [std::collections::hash_map::RandomState]: https://doc.rust-lang.org/std/collections/hash_map/struct.RandomState.html

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections;
use std::collections::hash_map::RandomState;
use std::fmt::{Debug, Error as FmtError, Formatter};
use std::hash::{BuildHasher, Hash, Hasher};
use std::iter::{FromIterator, FusedIterator};
use std::ops::Index;

use archery::{SharedPointer, SharedPointerKind};
use tracing::trace;

use crate::error::{Error, Result};
use crate::hash::transient::TransientHashMap;
use crate::hash::{checksum, entry_hash, mix};
use crate::nodes::hamt::{
    hash_key, mask, Drain as NodeDrain, Iter as NodeIter, Node, NodeRef, SizePredicate,
    SnapshotIter, Update,
};
use crate::shared_ptr::DefaultSharedPtr;
use crate::sync::Owner;

/// Construct a hash map from a sequence of key/value pairs.
///
/// # Examples
///
/// ```
/// # #[macro_use] extern crate compact_hamt;
/// # use compact_hamt::HashMap;
/// # fn main() {
/// assert_eq!(
///   hashmap!{
///     1 => 11,
///     2 => 22,
///     3 => 33
///   },
///   HashMap::from(vec![(1, 11), (2, 22), (3, 33)])
/// );
/// # }
/// ```
#[macro_export]
macro_rules! hashmap {
    () => { $crate::hashmap::HashMap::new() };

    ( $( $key:expr => $value:expr ),* $(,)? ) => {{
        let entries = ::std::vec![$(($key, $value)),*];
        <$crate::hashmap::HashMap<_, _> as ::std::iter::FromIterator<_>>::from_iter(entries)
    }};
}

/// Type alias for [`GenericHashMap`] that uses [`std::hash::RandomState`] as the default hasher and [`DefaultSharedPtr`] as the pointer type.
///
/// [GenericHashMap]: ./struct.GenericHashMap.html
/// [`std::hash::RandomState`]: https://doc.rust-lang.org/stable/std/collections/hash_map/struct.RandomState.html
/// [DefaultSharedPtr]: ../shared_ptr/type.DefaultSharedPtr.html
pub type HashMap<K, V> = GenericHashMap<K, V, RandomState, DefaultSharedPtr>;

/// A persistent hash map.
///
/// Cloning is O(1). Writes never touch the nodes of the map they're called
/// on: they copy the path from the root to the changed entry and share
/// everything else. A write that would change nothing returns a map
/// sharing the very same root, which [`ptr_eq`][GenericHashMap::ptr_eq]
/// can detect.
///
/// The map caches its size and a content hash, an XOR over all entries of
/// a fixed hash of each key/value pair. The content hash doesn't depend on
/// the hasher `S` or on insertion order, so it backs both [`Hash`] and a
/// quick inequality test in [`PartialEq`].
pub struct GenericHashMap<K, V, S, P: SharedPointerKind> {
    size: usize,
    checksum: u64,
    root: Option<NodeRef<K, V, P>>,
    hasher: S,
}

/// Key equality through [`Borrow`], used by every operation without a comparator.
#[inline]
pub(crate) fn borrow_eq<K, BK>(key: &K, other: &BK) -> bool
where
    K: Borrow<BK>,
    BK: Eq + ?Sized,
{
    key.borrow() == other
}

impl<K, V, P> GenericHashMap<K, V, RandomState, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    P: SharedPointerKind,
{
    /// Construct a hash map with a single mapping.
    ///
    /// # Examples
    ///
    /// ```
    /// # use compact_hamt::HashMap;
    /// let map = HashMap::unit(123, "onetwothree");
    /// assert_eq!(
    ///   map.get(&123),
    ///   Some(&"onetwothree")
    /// );
    /// ```
    #[inline]
    #[must_use]
    pub fn unit(k: K, v: V) -> GenericHashMap<K, V, RandomState, P> {
        GenericHashMap::new().update(k, v)
    }
}

impl<K, V, S, P: SharedPointerKind> GenericHashMap<K, V, S, P> {
    /// Construct an empty hash map.
    #[inline]
    #[must_use]
    pub fn new() -> Self
    where
        S: Default,
    {
        Self::default()
    }

    /// Construct an empty hash map using the provided hasher.
    #[inline]
    #[must_use]
    pub fn with_hasher(hasher: S) -> Self {
        GenericHashMap {
            size: 0,
            checksum: 0,
            root: None,
            hasher,
        }
    }

    /// Test whether a hash map is empty.
    ///
    /// Time: O(1)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// assert!(
    ///   !hashmap!{1 => 2}.is_empty()
    /// );
    /// assert!(
    ///   HashMap::<i32, i32>::new().is_empty()
    /// );
    /// ```
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the size of a hash map.
    ///
    /// Time: O(1)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// assert_eq!(3, hashmap!{
    ///   1 => 11,
    ///   2 => 22,
    ///   3 => 33
    /// }.len());
    /// ```
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Test whether two maps refer to the same content in memory.
    ///
    /// This is true if the two sides are references to the same map,
    /// or if the two maps refer to the same root node.
    ///
    /// This would return true if you're comparing a map to itself, or
    /// if you're comparing a map to a fresh clone of itself, or to a
    /// map that a write which changed nothing was called on.
    ///
    /// Time: O(1)
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => SharedPointer::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Get a reference to the map's [`BuildHasher`][BuildHasher].
    ///
    /// [BuildHasher]: https://doc.rust-lang.org/std/hash/trait.BuildHasher.html
    #[must_use]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// The map's content hash: an XOR over all entries of a fixed hash of
    /// each key/value pair.
    ///
    /// Maps with equal contents have equal content hashes, whatever their
    /// hashers or histories.
    ///
    /// Time: O(1)
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        self.checksum
    }

    /// Get an iterator over the key/value pairs of a hash map.
    ///
    /// Please note that the order is consistent between maps using
    /// the same hasher, but no other ordering guarantee is offered.
    /// Items will not come out in insertion order or sort order.
    /// They will, however, come out in the same order every time for
    /// the same map.
    #[inline]
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V, P> {
        Iter {
            it: NodeIter::new(self.root.as_deref(), self.size),
        }
    }

    /// Get an iterator over a hash map's keys.
    ///
    /// Please note that the order is consistent between maps using
    /// the same hasher, but no other ordering guarantee is offered.
    /// Items will not come out in insertion order or sort order.
    /// They will, however, come out in the same order every time for
    /// the same map.
    #[inline]
    #[must_use]
    pub fn keys(&self) -> Keys<'_, K, V, P> {
        Keys {
            it: NodeIter::new(self.root.as_deref(), self.size),
        }
    }

    /// Get an iterator over a hash map's values.
    ///
    /// Please note that the order is consistent between maps using
    /// the same hasher, but no other ordering guarantee is offered.
    /// Items will not come out in insertion order or sort order.
    /// They will, however, come out in the same order every time for
    /// the same map.
    #[inline]
    #[must_use]
    pub fn values(&self) -> Values<'_, K, V, P> {
        Values {
            it: NodeIter::new(self.root.as_deref(), self.size),
        }
    }

    /// Test whether two maps have identical tries: the same nodes with the
    /// same entries in the same slots.
    ///
    /// The trie is a function of the set of key hashes alone, so two maps
    /// with the same hasher and the same contents are always structurally
    /// equal, no matter how they were built.
    ///
    /// Time: O(n)
    #[must_use]
    pub fn structural_eq(&self, other: &Self) -> bool
    where
        K: PartialEq,
        V: PartialEq,
    {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => SharedPointer::ptr_eq(a, b) || a.structural_eq(b),
            (None, None) => true,
            _ => false,
        }
    }

    /// An iterator over clones of the current entries, independent of any
    /// later edit to this map.
    pub(crate) fn snapshot(&self) -> SnapshotIter<K, V, P> {
        SnapshotIter::new(self.root.clone(), self.size)
    }

    #[cfg(test)]
    pub(crate) fn root_addr(&self) -> Option<*const ()> {
        self.root
            .as_ref()
            .map(|root| &**root as *const Node<K, V, P> as *const ())
    }
}

impl<K, V, S, P> GenericHashMap<K, V, S, P>
where
    K: Hash + Eq,
    S: BuildHasher,
    P: SharedPointerKind,
{
    fn test_eq<S2: BuildHasher, P2: SharedPointerKind>(
        &self,
        other: &GenericHashMap<K, V, S2, P2>,
    ) -> bool
    where
        V: PartialEq,
    {
        if self.len() != other.len() || self.checksum != other.checksum {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.root, &other.root) {
            let a: *const () = &**a as *const Node<K, V, P> as *const ();
            let b: *const () = &**b as *const Node<K, V, P2> as *const ();
            if std::ptr::eq(a, b) {
                return true;
            }
        }
        // Equal sizes, so every key of ours found in the other map with an
        // equal value covers all of the other map too.
        self.iter().all(|(key, value)| other.get(key) == Some(value))
    }

    /// Get the value for a key from a hash map.
    ///
    /// Time: O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map = hashmap!{123 => "lol"};
    /// assert_eq!(
    ///   map.get(&123),
    ///   Some(&"lol")
    /// );
    /// ```
    #[must_use]
    pub fn get<BK>(&self, key: &BK) -> Option<&V>
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Get the key/value pair for a key from a hash map.
    ///
    /// Time: O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map = hashmap!{123 => "lol"};
    /// assert_eq!(
    ///   map.get_key_value(&123),
    ///   Some((&123, &"lol"))
    /// );
    /// ```
    #[must_use]
    pub fn get_key_value<BK>(&self, key: &BK) -> Option<(&K, &V)>
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        let root = self.root.as_ref()?;
        root.get(hash_key(&self.hasher, key), 0, key, &borrow_eq::<K, BK>)
    }

    /// Test for the presence of a key in a hash map.
    ///
    /// Time: O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map = hashmap!{123 => "lol"};
    /// assert!(
    ///   map.contains_key(&123)
    /// );
    /// assert!(
    ///   !map.contains_key(&321)
    /// );
    /// ```
    #[inline]
    #[must_use]
    pub fn contains_key<BK>(&self, k: &BK) -> bool
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        self.get(k).is_some()
    }

    /// Get the value for a key, deciding key equality with `cmp`.
    ///
    /// Only [`Ordering::Equal`] is significant. Keys that `cmp` considers
    /// equal must hash alike, or they won't be found.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn get_by<F>(&self, key: &K, cmp: F) -> Option<&V>
    where
        F: Fn(&K, &K) -> Ordering,
    {
        self.get_key_value_by(key, cmp).map(|(_, v)| v)
    }

    /// Get the stored key/value pair for a key, deciding key equality
    /// with `cmp`.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn get_key_value_by<F>(&self, key: &K, cmp: F) -> Option<(&K, &V)>
    where
        F: Fn(&K, &K) -> Ordering,
    {
        let root = self.root.as_ref()?;
        let eq = |a: &K, b: &K| cmp(a, b) == Ordering::Equal;
        root.get(hash_key(&self.hasher, key), 0, key, &eq)
    }

    /// Test for the presence of a key, deciding key equality with `cmp`.
    ///
    /// Time: O(log n)
    #[inline]
    #[must_use]
    pub fn contains_key_by<F>(&self, key: &K, cmp: F) -> bool
    where
        F: Fn(&K, &K) -> Ordering,
    {
        let Some(root) = &self.root else {
            return false;
        };
        let eq = |a: &K, b: &K| cmp(a, b) == Ordering::Equal;
        root.contains_key(hash_key(&self.hasher, key), 0, key, &eq)
    }

    /// Test whether a map is a submap of another map, meaning that
    /// all keys in our map must also be in the other map, with the
    /// same values.
    ///
    /// Use the provided function to decide whether values are equal.
    ///
    /// Time: O(n log n)
    #[must_use]
    pub fn is_submap_by<B, RM, F, P2: SharedPointerKind>(&self, other: RM, mut cmp: F) -> bool
    where
        F: FnMut(&V, &B) -> bool,
        RM: Borrow<GenericHashMap<K, B, S, P2>>,
    {
        self.iter()
            .all(|(k, v)| other.borrow().get(k).map(|ov| cmp(v, ov)).unwrap_or(false))
    }

    /// Test whether a map is a submap of another map, meaning that
    /// all keys in our map must also be in the other map, with the
    /// same values.
    ///
    /// Time: O(n log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map1 = hashmap!{1 => 1, 2 => 2};
    /// let map2 = hashmap!{1 => 1, 2 => 2, 3 => 3};
    /// assert!(map1.is_submap(map2));
    /// ```
    #[inline]
    #[must_use]
    pub fn is_submap<RM>(&self, other: RM) -> bool
    where
        V: PartialEq,
        RM: Borrow<Self>,
    {
        self.is_submap_by(other.borrow(), PartialEq::eq)
    }

    /// Walk the whole trie and panic if any structural invariant is
    /// broken, or if the cached size or content hash is stale.
    #[cfg(any(test, feature = "debug"))]
    pub fn assert_invariants(&self)
    where
        V: Hash,
    {
        let (size, checksum) = match &self.root {
            None => (0, 0),
            Some(root) => {
                assert_ne!(
                    SizePredicate::Empty,
                    root.size_predicate(),
                    "an empty map should have no root"
                );
                root.check_invariants(&self.hasher, 0, 0, true)
            }
        };
        assert_eq!(self.size, size, "cached size is stale");
        assert_eq!(self.checksum, checksum, "cached content hash is stale");
    }
}

impl<K, V, S, P> GenericHashMap<K, V, S, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S: BuildHasher + Clone,
    P: SharedPointerKind,
{
    /// Insert or replace an entry, editing in place whatever nodes `owner`
    /// is allowed to edit and copying the rest.
    pub(crate) fn insert_owned<E>(&mut self, owner: Owner, key: K, value: V, eq: &E) -> Update<V>
    where
        E: Fn(&K, &K) -> bool,
    {
        let hash = hash_key(&self.hasher, &key);
        let key_sum = checksum(&key);
        let added = mix(key_sum, checksum(&value));
        let result = match self.root.as_mut() {
            Some(root) => Node::update(root, owner, &self.hasher, hash, 0, key, value, eq),
            None => {
                self.root = Some(SharedPointer::new(Node::unit(
                    owner,
                    mask(hash, 0),
                    key,
                    value,
                )));
                Update::Inserted
            }
        };
        match &result {
            Update::Unchanged(_) => {}
            Update::Inserted => {
                self.size += 1;
                self.checksum ^= added;
            }
            Update::Replaced(old) => {
                self.checksum ^= mix(key_sum, checksum(old)) ^ added;
            }
        }
        #[cfg(feature = "debug")]
        self.assert_invariants();
        result
    }

    /// Remove an entry, editing in place whatever nodes `owner` is allowed
    /// to edit and copying the rest. Nothing is copied if the key is absent.
    pub(crate) fn remove_owned<BK, E>(&mut self, owner: Owner, key: &BK, eq: &E) -> Option<(K, V)>
    where
        BK: Hash + ?Sized,
        E: Fn(&K, &BK) -> bool,
    {
        let hash = hash_key(&self.hasher, key);
        let root = self.root.as_mut()?;
        let removed = Node::remove(root, owner, hash, 0, key, eq)?;
        if root.size_predicate() == SizePredicate::Empty {
            self.root = None;
        }
        self.size -= 1;
        self.checksum ^= entry_hash(&removed.0, &removed.1);
        #[cfg(feature = "debug")]
        self.assert_invariants();
        Some(removed)
    }

    /// Construct a new hash map by inserting a key/value mapping into a map.
    ///
    /// If the map already has a mapping for the given key, the previous value
    /// is overwritten and the stored key is kept. If the previous value is
    /// equal to the new one, the result shares its root with `self`.
    ///
    /// Time: O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map = hashmap!{};
    /// assert_eq!(
    ///   map.update(123, "123"),
    ///   hashmap!{123 => "123"}
    /// );
    /// ```
    #[must_use]
    pub fn update(&self, k: K, v: V) -> Self {
        let mut out = self.clone();
        out.insert_owned(Owner::NONE, k, v, &borrow_eq::<K, K>);
        out
    }

    /// Construct a new hash map by inserting a key/value mapping, deciding
    /// key equality with `cmp`.
    ///
    /// Only [`Ordering::Equal`] is significant. Keys that `cmp` considers
    /// equal must hash alike.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn update_by<F>(&self, k: K, v: V, cmp: F) -> Self
    where
        F: Fn(&K, &K) -> Ordering,
    {
        let mut out = self.clone();
        out.insert_owned(Owner::NONE, k, v, &|a: &K, b: &K| {
            cmp(a, b) == Ordering::Equal
        });
        out
    }

    /// Construct a new hash map by inserting a key/value mapping into
    /// a map.
    ///
    /// If the map already has a mapping for the given key, we call
    /// the provided function with the old value and the new value,
    /// and insert the result as the new value.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn update_with<F>(&self, k: K, v: V, f: F) -> Self
    where
        F: FnOnce(V, V) -> V,
    {
        match self.extract_with_key(&k) {
            None => self.update(k, v),
            Some((_, v2, m)) => m.update(k, f(v2, v)),
        }
    }

    /// Update the value for a given key by calling a function with
    /// the current value and overwriting it with the function's
    /// return value.
    ///
    /// The function gets an [`Option<V>`][std::option::Option] and
    /// returns the same, so that it can decide to delete a mapping
    /// instead of updating the value, and decide what to do if the
    /// key isn't in the map.
    ///
    /// Time: O(log n)
    ///
    /// [std::option::Option]: https://doc.rust-lang.org/std/option/enum.Option.html
    #[must_use]
    pub fn alter<F>(&self, f: F, k: K) -> Self
    where
        F: FnOnce(Option<V>) -> Option<V>,
    {
        let pop = self.extract_with_key(&k);
        match (f(pop.as_ref().map(|(_, v, _)| v.clone())), pop) {
            (None, None) => self.clone(),
            (Some(v), None) => self.update(k, v),
            (None, Some((_, _, m))) => m,
            (Some(v), Some((_, _, m))) => m.update(k, v),
        }
    }

    /// Construct a new map without the given key.
    ///
    /// Construct a map that's a copy of the current map, absent the
    /// mapping for `key` if it's present. If it isn't, the result shares
    /// its root with `self`.
    ///
    /// Time: O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map = hashmap!{"a" => 1, "b" => 2};
    /// let smaller = map.without("a");
    /// assert_eq!(None, smaller.get("a"));
    /// assert_eq!(Some(&1), map.get("a"));
    /// assert!(map.without("c").ptr_eq(&map));
    /// ```
    #[must_use]
    pub fn without<BK>(&self, k: &BK) -> Self
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        match self.extract_with_key(k) {
            None => self.clone(),
            Some((_, _, map)) => map,
        }
    }

    /// Construct a new map without the given key, deciding key equality
    /// with `cmp`.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn without_by<F>(&self, k: &K, cmp: F) -> Self
    where
        F: Fn(&K, &K) -> Ordering,
    {
        let mut out = self.clone();
        out.remove_owned(Owner::NONE, k, &|a: &K, b: &K| cmp(a, b) == Ordering::Equal);
        out
    }

    /// Remove a key/value pair from a map, if it exists, and return
    /// the removed value as well as the updated map.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn extract<BK>(&self, k: &BK) -> Option<(V, Self)>
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        self.extract_with_key(k).map(|(_, v, m)| (v, m))
    }

    /// Remove a key/value pair from a map, if it exists, and return
    /// the removed key and value as well as the updated map.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn extract_with_key<BK>(&self, k: &BK) -> Option<(K, V, Self)>
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        let mut out = self.clone();
        out.remove_owned(Owner::NONE, k, &borrow_eq::<K, BK>)
            .map(|(k, v)| (k, v, out))
    }

    /// Construct a new map with all the given entries inserted, later
    /// entries winning over earlier ones with the same key.
    ///
    /// The entries are loaded through a transient, so each new node is
    /// allocated once rather than copied on every insert.
    ///
    /// Time: O(n log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map = hashmap!{1 => 1};
    /// let bigger = map.update_all((2..5).map(|i| (i, i * 10)));
    /// assert_eq!(4, bigger.len());
    /// assert_eq!(1, map.len());
    /// ```
    #[must_use]
    pub fn update_all<I>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut transient = self.transient();
        for (key, value) in entries {
            transient.put(key, value);
        }
        let out = transient.into_persistent();
        trace!(before = self.size, after = out.size, "bulk update");
        out
    }

    /// Construct the union of two maps, keeping the values in the
    /// current map when keys exist in both maps.
    ///
    /// Time: O(n log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map1 = hashmap!{1 => 1, 3 => 3};
    /// let map2 = hashmap!{2 => 2, 3 => 4};
    /// let expected = hashmap!{1 => 1, 2 => 2, 3 => 3};
    /// assert_eq!(expected, map1.union(map2));
    /// ```
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let (to_mutate, to_consume, use_to_consume) = if self.len() >= other.len() {
            (self, other, false)
        } else {
            (other, self, true)
        };
        let mut transient = to_mutate.transient();
        for (k, v) in to_consume {
            if use_to_consume || !transient.contains_key(&k) {
                transient.put(k, v);
            }
        }
        transient.into_persistent()
    }

    /// Construct the union of a sequence of maps, selecting the value
    /// of the leftmost when a key appears in more than one map.
    ///
    /// Time: O(n log n)
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate compact_hamt;
    /// # use compact_hamt::hashmap::HashMap;
    /// let map1 = hashmap!{1 => 1, 3 => 3};
    /// let map2 = hashmap!{2 => 2};
    /// let expected = hashmap!{1 => 1, 2 => 2, 3 => 3};
    /// assert_eq!(expected, HashMap::unions(vec![map1, map2]));
    /// ```
    #[must_use]
    pub fn unions<I>(i: I) -> Self
    where
        S: Default,
        I: IntoIterator<Item = Self>,
    {
        i.into_iter().fold(Self::default(), Self::union)
    }

    /// Open a transient over this map's contents.
    ///
    /// The transient starts out sharing every node with this map, and
    /// copies a node the first time it edits it. This map is never
    /// affected.
    ///
    /// Time: O(1)
    #[must_use]
    pub fn transient(&self) -> TransientHashMap<K, V, S, P> {
        TransientHashMap::from_persistent(self.clone())
    }
}

impl<T, S, P> GenericHashMap<T, T, S, P>
where
    T: Hash + Eq + Clone,
    S: BuildHasher + Default + Clone,
    P: SharedPointerKind,
{
    /// Construct a map from a flat sequence of alternating keys and values.
    ///
    /// Fails without building anything if the sequence has an odd number
    /// of elements.
    ///
    /// # Examples
    ///
    /// ```
    /// # use compact_hamt::{Error, HashMap};
    /// let map: HashMap<&str, &str> =
    ///     HashMap::from_alternating(vec!["a", "1", "b", "2"]).unwrap();
    /// assert_eq!(Some(&"2"), map.get("b"));
    ///
    /// let odd = HashMap::<&str, &str>::from_alternating(vec!["a", "1", "b"]);
    /// assert_eq!(Err(Error::OddKeyValueCount(3)), odd);
    /// ```
    pub fn from_alternating<I>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        if items.len() % 2 != 0 {
            return Err(Error::OddKeyValueCount(items.len()));
        }
        trace!(entries = items.len() / 2, "building from alternating keys and values");
        let mut items = items.into_iter();
        let mut transient = TransientHashMap::with_hasher(S::default());
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            transient.put(key, value);
        }
        Ok(transient.into_persistent())
    }
}

// Core traits

impl<K, V, S, P> Clone for GenericHashMap<K, V, S, P>
where
    S: Clone,
    P: SharedPointerKind,
{
    /// Clone a map.
    ///
    /// Time: O(1)
    #[inline]
    fn clone(&self) -> Self {
        GenericHashMap {
            size: self.size,
            checksum: self.checksum,
            root: self.root.clone(),
            hasher: self.hasher.clone(),
        }
    }
}

impl<K, V, S1, S2, P1, P2> PartialEq<GenericHashMap<K, V, S2, P2>> for GenericHashMap<K, V, S1, P1>
where
    K: Hash + Eq,
    V: PartialEq,
    S1: BuildHasher,
    S2: BuildHasher,
    P1: SharedPointerKind,
    P2: SharedPointerKind,
{
    fn eq(&self, other: &GenericHashMap<K, V, S2, P2>) -> bool {
        self.test_eq(other)
    }
}

impl<K, V, S, P> Eq for GenericHashMap<K, V, S, P>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
    P: SharedPointerKind,
{
}

impl<K, V, S, P> Hash for GenericHashMap<K, V, S, P>
where
    K: Hash,
    V: Hash,
    P: SharedPointerKind,
{
    /// Time: O(1)
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size.hash(state);
        self.checksum.hash(state);
    }
}

impl<K, V, S, P> Default for GenericHashMap<K, V, S, P>
where
    S: Default,
    P: SharedPointerKind,
{
    #[inline]
    fn default() -> Self {
        GenericHashMap::with_hasher(S::default())
    }
}

impl<K, V, S, RK, RV, P> Extend<(RK, RV)> for GenericHashMap<K, V, S, P>
where
    K: Hash + Eq + Clone + From<RK>,
    V: Hash + PartialEq + Clone + From<RV>,
    S: BuildHasher + Clone,
    P: SharedPointerKind,
{
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (RK, RV)>,
    {
        *self = self.update_all(
            iter.into_iter()
                .map(|(key, value)| (From::from(key), From::from(value))),
        );
    }
}

impl<BK, K, V, S, P> Index<&BK> for GenericHashMap<K, V, S, P>
where
    BK: Hash + Eq + ?Sized,
    K: Hash + Eq + Borrow<BK>,
    S: BuildHasher,
    P: SharedPointerKind,
{
    type Output = V;

    fn index(&self, key: &BK) -> &Self::Output {
        match self.get(key) {
            None => panic!("HashMap::index: invalid key"),
            Some(value) => value,
        }
    }
}

impl<K, V, S, P> Debug for GenericHashMap<K, V, S, P>
where
    K: Debug,
    V: Debug,
    P: SharedPointerKind,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), FmtError> {
        let mut d = f.debug_map();
        for (k, v) in self {
            d.entry(k, v);
        }
        d.finish()
    }
}

// Iterators

/// An iterator over the elements of a map.
pub struct Iter<'a, K, V, P: SharedPointerKind> {
    it: NodeIter<'a, K, V, P>,
}

// We impl Clone instead of deriving it, because we want Clone even if K and V aren't.
impl<'a, K, V, P: SharedPointerKind> Clone for Iter<'a, K, V, P> {
    fn clone(&self) -> Self {
        Iter {
            it: self.it.clone(),
        }
    }
}

impl<'a, K, V, P: SharedPointerKind> Iterator for Iter<'a, K, V, P> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.it.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<'a, K, V, P: SharedPointerKind> ExactSizeIterator for Iter<'a, K, V, P> {}

impl<'a, K, V, P: SharedPointerKind> FusedIterator for Iter<'a, K, V, P> {}

/// A consuming iterator over the elements of a map.
///
/// Entries are moved out of nodes this map holds the only reference to,
/// and cloned out of nodes it shares.
pub struct ConsumingIter<K, V, P: SharedPointerKind> {
    it: NodeDrain<K, V, P>,
}

impl<K, V, P> Iterator for ConsumingIter<K, V, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.it.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K: Clone, V: Clone, P: SharedPointerKind> ExactSizeIterator for ConsumingIter<K, V, P> {}

impl<K: Clone, V: Clone, P: SharedPointerKind> FusedIterator for ConsumingIter<K, V, P> {}

/// An iterator over the keys of a map.
pub struct Keys<'a, K, V, P: SharedPointerKind> {
    it: NodeIter<'a, K, V, P>,
}

impl<'a, K, V, P: SharedPointerKind> Iterator for Keys<'a, K, V, P> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<'a, K, V, P: SharedPointerKind> ExactSizeIterator for Keys<'a, K, V, P> {}

impl<'a, K, V, P: SharedPointerKind> FusedIterator for Keys<'a, K, V, P> {}

/// An iterator over the values of a map.
pub struct Values<'a, K, V, P: SharedPointerKind> {
    it: NodeIter<'a, K, V, P>,
}

impl<'a, K, V, P: SharedPointerKind> Iterator for Values<'a, K, V, P> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<'a, K, V, P: SharedPointerKind> ExactSizeIterator for Values<'a, K, V, P> {}

impl<'a, K, V, P: SharedPointerKind> FusedIterator for Values<'a, K, V, P> {}

impl<'a, K, V, S, P: SharedPointerKind> IntoIterator for &'a GenericHashMap<K, V, S, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, P>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S, P> IntoIterator for GenericHashMap<K, V, S, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    type Item = (K, V);
    type IntoIter = ConsumingIter<K, V, P>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        ConsumingIter {
            it: NodeDrain::new(self.root, self.size),
        }
    }
}

// Conversions

impl<K, V, S, P> FromIterator<(K, V)> for GenericHashMap<K, V, S, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S: BuildHasher + Default + Clone,
    P: SharedPointerKind,
{
    fn from_iter<T>(i: T) -> Self
    where
        T: IntoIterator<Item = (K, V)>,
    {
        Self::default().update_all(i)
    }
}

impl<K, V, S, P: SharedPointerKind> AsRef<GenericHashMap<K, V, S, P>>
    for GenericHashMap<K, V, S, P>
{
    #[inline]
    fn as_ref(&self) -> &Self {
        self
    }
}

impl<K, V, OK, OV, SA, SB, P1, P2> From<&GenericHashMap<&K, &V, SA, P1>>
    for GenericHashMap<OK, OV, SB, P2>
where
    K: Hash + Eq + ToOwned<Owned = OK> + ?Sized,
    V: ToOwned<Owned = OV> + ?Sized,
    OK: Hash + Eq + Clone + Borrow<K>,
    OV: Hash + PartialEq + Clone + Borrow<V>,
    SA: BuildHasher + Clone,
    SB: BuildHasher + Default + Clone,
    P1: SharedPointerKind,
    P2: SharedPointerKind,
{
    fn from(m: &GenericHashMap<&K, &V, SA, P1>) -> Self {
        m.iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }
}

impl<'a, K, V, S, P> From<&'a [(K, V)]> for GenericHashMap<K, V, S, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S: BuildHasher + Default + Clone,
    P: SharedPointerKind,
{
    fn from(m: &'a [(K, V)]) -> Self {
        m.iter().cloned().collect()
    }
}

impl<K, V, S, P> From<Vec<(K, V)>> for GenericHashMap<K, V, S, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S: BuildHasher + Default + Clone,
    P: SharedPointerKind,
{
    fn from(m: Vec<(K, V)>) -> Self {
        m.into_iter().collect()
    }
}

impl<K, V, S1, S2, P> From<collections::HashMap<K, V, S2>> for GenericHashMap<K, V, S1, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S1: BuildHasher + Default + Clone,
    S2: BuildHasher,
    P: SharedPointerKind,
{
    fn from(m: collections::HashMap<K, V, S2>) -> Self {
        m.into_iter().collect()
    }
}

impl<'a, K, V, S1, S2, P> From<&'a collections::HashMap<K, V, S2>> for GenericHashMap<K, V, S1, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S1: BuildHasher + Default + Clone,
    S2: BuildHasher,
    P: SharedPointerKind,
{
    fn from(m: &'a collections::HashMap<K, V, S2>) -> Self {
        m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K, V, S, P> From<collections::BTreeMap<K, V>> for GenericHashMap<K, V, S, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S: BuildHasher + Default + Clone,
    P: SharedPointerKind,
{
    fn from(m: collections::BTreeMap<K, V>) -> Self {
        m.into_iter().collect()
    }
}

impl<'a, K, V, S, P> From<&'a collections::BTreeMap<K, V>> for GenericHashMap<K, V, S, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S: BuildHasher + Default + Clone,
    P: SharedPointerKind,
{
    fn from(m: &'a collections::BTreeMap<K, V>) -> Self {
        m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

// Tests
