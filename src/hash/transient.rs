// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A transient hash map.
//!
//! A [`TransientHashMap`] is a mutable view of a persistent map's contents
//! that edits its own nodes in place. Each transient mints an owner token
//! when it's opened, and stamps it on every node it creates or copies.
//! After the first write to a node, later writes to the same node through
//! the same transient reuse it instead of copying it again, so loading `n`
//! entries allocates each node once instead of once per write.
//!
//! [`freeze`][TransientHashMap::freeze] retires the owner token and hands
//! back a persistent map sharing the transient's nodes. No node stamped
//! with a retired token can be edited in place again.
//!
//! # Examples
//!
//! ```
//! # use compact_hamt::{Error, TransientHashMap};
//! let mut transient = TransientHashMap::new();
//! for i in 0..100 {
//!     transient.insert(i, i * 2).unwrap();
//! }
//! let map = transient.freeze().unwrap();
//! assert_eq!(Some(&20), map.get(&10));
//! assert_eq!(Err(Error::Frozen), transient.insert(1, 1));
//! ```

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::hash_map::RandomState;
use std::fmt::{Debug, Error as FmtError, Formatter};
use std::hash::{BuildHasher, Hash};
use std::iter::FusedIterator;

use archery::SharedPointerKind;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::hash::map::{borrow_eq, GenericHashMap, Iter};
use crate::nodes::hamt::{SnapshotIter, Update};
use crate::shared_ptr::DefaultSharedPtr;
use crate::sync::Owner;

/// A hash map that edits its own nodes in place until it's frozen.
///
/// Writes return a [`Result`], failing with [`Error::Frozen`] once the
/// transient has been frozen. Reads keep working after a freeze and see
/// the frozen contents.
pub struct TransientHashMap<K, V, S = RandomState, P: SharedPointerKind = DefaultSharedPtr> {
    map: GenericHashMap<K, V, S, P>,
    owner: Owner,
}

impl<K, V> TransientHashMap<K, V, RandomState, DefaultSharedPtr> {
    /// Construct an empty transient with the default hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V, S, P: SharedPointerKind> TransientHashMap<K, V, S, P> {
    /// Construct an empty transient using the provided hasher.
    #[must_use]
    pub fn with_hasher(hasher: S) -> Self {
        Self::from_persistent(GenericHashMap::with_hasher(hasher))
    }

    pub(crate) fn from_persistent(map: GenericHashMap<K, V, S, P>) -> Self {
        let owner = Owner::mint();
        trace!(?owner, size = map.len(), "opened transient");
        TransientHashMap { map, owner }
    }

    /// Get the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Test whether the transient is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Test whether [`freeze`][TransientHashMap::freeze] has been called.
    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.owner.is_none()
    }

    /// Get an iterator over the current key/value pairs.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V, P> {
        self.map.iter()
    }

    fn check_live(&self) -> Result<()> {
        if self.is_frozen() {
            debug!(size = self.len(), "write to a frozen transient rejected");
            return Err(Error::Frozen);
        }
        Ok(())
    }

    /// Retire this transient and return a persistent map with its contents.
    ///
    /// The returned map shares every node with the transient. Later writes
    /// to the transient, and later calls to `freeze`, fail with
    /// [`Error::Frozen`].
    ///
    /// Time: O(1)
    pub fn freeze(&mut self) -> Result<GenericHashMap<K, V, S, P>>
    where
        S: Clone,
    {
        self.check_live()?;
        debug!(owner = ?self.owner, size = self.len(), "froze transient");
        self.owner = Owner::NONE;
        Ok(self.map.clone())
    }

    /// Consume this transient and return a persistent map with its contents.
    ///
    /// Unlike [`freeze`][TransientHashMap::freeze] this can't fail: a
    /// transient that was already frozen hands back its frozen contents.
    ///
    /// Time: O(1)
    #[must_use]
    pub fn into_persistent(self) -> GenericHashMap<K, V, S, P> {
        if !self.is_frozen() {
            trace!(owner = ?self.owner, size = self.len(), "closed transient");
        }
        self.map
    }
}

impl<K, V, S, P> TransientHashMap<K, V, S, P>
where
    K: Hash + Eq,
    S: BuildHasher,
    P: SharedPointerKind,
{
    /// Get the value for a key.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn get<BK>(&self, key: &BK) -> Option<&V>
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        self.map.get(key)
    }

    /// Test for the presence of a key.
    ///
    /// Time: O(log n)
    #[must_use]
    pub fn contains_key<BK>(&self, key: &BK) -> bool
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        self.map.contains_key(key)
    }

    /// Get the value for a key, deciding key equality with `cmp`.
    #[must_use]
    pub fn get_by<F>(&self, key: &K, cmp: F) -> Option<&V>
    where
        F: Fn(&K, &K) -> Ordering,
    {
        self.map.get_by(key, cmp)
    }

    /// Test for the presence of a key, deciding key equality with `cmp`.
    #[must_use]
    pub fn contains_key_by<F>(&self, key: &K, cmp: F) -> bool
    where
        F: Fn(&K, &K) -> Ordering,
    {
        self.map.contains_key_by(key, cmp)
    }

    /// Walk the whole trie and panic if any structural invariant is
    /// broken, or if the cached size or content hash is stale.
    #[cfg(any(test, feature = "debug"))]
    pub fn assert_invariants(&self)
    where
        V: Hash,
    {
        self.map.assert_invariants()
    }
}

impl<K, V, S, P> TransientHashMap<K, V, S, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S: BuildHasher + Clone,
    P: SharedPointerKind,
{
    /// Write without checking for a freeze, for callers that own a fresh transient.
    pub(crate) fn put(&mut self, key: K, value: V) -> Update<V> {
        self.map
            .insert_owned(self.owner, key, value, &borrow_eq::<K, K>)
    }

    /// Insert a key/value mapping, returning the previous value for the key.
    ///
    /// If the key is already present, the stored key is kept and only the
    /// value is replaced.
    ///
    /// Time: O(log n)
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.check_live()?;
        Ok(previous(self.put(key, value)))
    }

    /// Insert a key/value mapping, deciding key equality with `cmp`.
    ///
    /// Only [`Ordering::Equal`] is significant. Keys that `cmp` considers
    /// equal must hash alike.
    pub fn insert_by<F>(&mut self, key: K, value: V, cmp: F) -> Result<Option<V>>
    where
        F: Fn(&K, &K) -> Ordering,
    {
        self.check_live()?;
        let eq = |a: &K, b: &K| cmp(a, b) == Ordering::Equal;
        Ok(previous(self.map.insert_owned(self.owner, key, value, &eq)))
    }

    /// Remove a key, returning its value if it was present.
    ///
    /// Time: O(log n)
    pub fn remove<BK>(&mut self, key: &BK) -> Result<Option<V>>
    where
        BK: Hash + Eq + ?Sized,
        K: Borrow<BK>,
    {
        self.check_live()?;
        Ok(self
            .map
            .remove_owned(self.owner, key, &borrow_eq::<K, BK>)
            .map(|(_, value)| value))
    }

    /// Remove a key, deciding key equality with `cmp`.
    pub fn remove_by<F>(&mut self, key: &K, cmp: F) -> Result<Option<V>>
    where
        F: Fn(&K, &K) -> Ordering,
    {
        self.check_live()?;
        let eq = |a: &K, b: &K| cmp(a, b) == Ordering::Equal;
        Ok(self
            .map
            .remove_owned(self.owner, key, &eq)
            .map(|(_, value)| value))
    }

    /// Insert every entry of `entries`, later entries winning over earlier
    /// ones with the same key.
    pub fn insert_all<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.check_live()?;
        for (key, value) in entries {
            self.put(key, value);
        }
        Ok(())
    }

    /// Remove every entry for which `f` returns false.
    pub fn retain<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.check_live()?;
        let doomed: Vec<K> = self
            .iter()
            .filter(|(key, value)| !f(key, value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            self.map.remove_owned(self.owner, &key, &borrow_eq::<K, K>);
        }
        Ok(())
    }

    /// Get a cursor over a snapshot of the current entries, which can
    /// remove the entry it last yielded from this transient.
    ///
    /// Nothing else can change the transient while the cursor borrows it.
    pub fn cursor(&mut self) -> Cursor<'_, K, V, S, P> {
        Cursor {
            entries: self.map.snapshot(),
            map: self,
            current: None,
        }
    }
}

fn previous<V>(update: Update<V>) -> Option<V> {
    match update {
        Update::Inserted => None,
        Update::Replaced(old) => Some(old),
        // An equal value was already stored.
        Update::Unchanged(value) => Some(value),
    }
}

impl<K, V, S, P> Default for TransientHashMap<K, V, S, P>
where
    S: Default,
    P: SharedPointerKind,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S, P> Debug for TransientHashMap<K, V, S, P>
where
    K: Debug,
    V: Debug,
    P: SharedPointerKind,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), FmtError> {
        f.debug_struct("TransientHashMap")
            .field("owner", &self.owner)
            .field("entries", &self.map)
            .finish()
    }
}

impl<'a, K, V, S, P: SharedPointerKind> IntoIterator for &'a TransientHashMap<K, V, S, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A cursor over a transient's entries that can remove the current one.
///
/// Yields owned clones of the entries present when it was created.
pub struct Cursor<'a, K, V, S, P: SharedPointerKind> {
    map: &'a mut TransientHashMap<K, V, S, P>,
    entries: SnapshotIter<K, V, P>,
    current: Option<K>,
}

impl<'a, K, V, S, P> Cursor<'a, K, V, S, P>
where
    K: Hash + Eq + Clone,
    V: Hash + PartialEq + Clone,
    S: BuildHasher + Clone,
    P: SharedPointerKind,
{
    /// Step to the next entry, failing with [`Error::Exhausted`] past the end.
    pub fn advance(&mut self) -> Result<(K, V)> {
        self.next().ok_or(Error::Exhausted)
    }

    /// Remove the entry the cursor last yielded from the transient, and
    /// return its value.
    ///
    /// Fails with [`Error::NoCurrentEntry`] before the first step, or if
    /// the current entry was already removed.
    pub fn remove_current(&mut self) -> Result<V> {
        let key = self.current.take().ok_or(Error::NoCurrentEntry)?;
        self.map.remove(&key)?.ok_or(Error::NoCurrentEntry)
    }
}

impl<'a, K, V, S, P> Iterator for Cursor<'a, K, V, S, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.entries.next()?;
        self.current = Some(key.clone());
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<'a, K: Clone, V: Clone, P: SharedPointerKind, S> ExactSizeIterator
    for Cursor<'a, K, V, S, P>
{
}

impl<'a, K: Clone, V: Clone, P: SharedPointerKind, S> FusedIterator for Cursor<'a, K, V, S, P> {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hash::map::HashMap;
    use crate::test::{Colliding, LolState};
    use ::proptest::collection;
    use ::proptest::prelude::{any, proptest};
    use pretty_assertions::assert_eq;
    use proptest_derive::Arbitrary;
    use static_assertions::assert_impl_all;

    assert_impl_all!(TransientHashMap<i32, i32>: Send, Sync);

    type LolTransient<K, V> = TransientHashMap<K, V, LolState, DefaultSharedPtr>;

    #[test]
    fn insert_get_remove() {
        let mut map = TransientHashMap::new();
        assert_eq!(Ok(None), map.insert("a", 1));
        assert_eq!(Ok(None), map.insert("b", 2));
        assert_eq!(Ok(Some(1)), map.insert("a", 10));
        assert_eq!(Ok(Some(2)), map.insert("b", 2));
        assert_eq!(2, map.len());
        assert_eq!(Some(&10), map.get("a"));
        assert_eq!(Ok(Some(10)), map.remove("a"));
        assert_eq!(Ok(None), map.remove("a"));
        assert!(!map.contains_key("a"));
        assert_eq!(1, map.len());
        map.assert_invariants();
    }

    #[test]
    fn writes_after_freeze_fail() {
        let mut map = TransientHashMap::new();
        map.insert(1, 1).unwrap();
        let frozen: HashMap<i32, i32> = map.freeze().unwrap();
        assert!(map.is_frozen());
        assert_eq!(Err(Error::Frozen), map.insert(2, 2));
        assert_eq!(Err(Error::Frozen), map.remove(&1));
        assert_eq!(Err(Error::Frozen), map.insert_all(vec![(3, 3)]));
        assert_eq!(Err(Error::Frozen), map.retain(|_, _| false));
        assert_eq!(Err(Error::Frozen), map.freeze().map(|_| ()));
        // Reads still work.
        assert_eq!(Some(&1), map.get(&1));
        assert_eq!(frozen, map.into_persistent());
    }

    #[test]
    fn edits_own_nodes_in_place() {
        let mut map: LolTransient<u32, u32> = TransientHashMap::default();
        map.insert(1, 1).unwrap();
        let root = map.map.root_addr();
        for i in 2..20 {
            map.insert(i, i).unwrap();
        }
        map.remove(&7).unwrap();
        assert_eq!(root, map.map.root_addr());
        map.assert_invariants();
    }

    #[test]
    fn never_edits_the_source_map() {
        let source: HashMap<i32, i32> = (0..1000).map(|i| (i, i)).collect();
        let mut transient = source.transient();
        for i in 0..1000 {
            transient.insert(i, -i).unwrap();
        }
        transient.remove(&5).unwrap();
        for i in 0..1000 {
            assert_eq!(Some(&i), source.get(&i));
        }
        let result = transient.into_persistent();
        assert_eq!(Some(&-6), result.get(&6));
        assert_eq!(None, result.get(&5));
        source.assert_invariants();
        result.assert_invariants();
    }

    #[test]
    fn frozen_nodes_are_not_reused_by_later_transients() {
        let mut first = TransientHashMap::new();
        first.insert_all((0..500).map(|i| (i, i))).unwrap();
        let frozen: HashMap<i32, i32> = first.freeze().unwrap();
        let mut second = frozen.transient();
        for i in 0..500 {
            second.insert(i, 0).unwrap();
        }
        for i in 0..500 {
            assert_eq!(Some(&i), frozen.get(&i));
            assert_eq!(Some(&i), first.get(&i));
            assert_eq!(Some(&0), second.get(&i));
        }
    }

    #[test]
    fn cursor_removes_current_entry() {
        let mut map = TransientHashMap::new();
        map.insert_all((0..100).map(|i| (i, i))).unwrap();
        let mut cursor = map.cursor();
        assert_eq!(Err(Error::NoCurrentEntry), cursor.remove_current());
        let mut seen = 0;
        while let Ok((key, value)) = cursor.advance() {
            assert_eq!(key, value);
            seen += 1;
            if key % 2 == 0 {
                assert_eq!(Ok(key), cursor.remove_current());
                assert_eq!(Err(Error::NoCurrentEntry), cursor.remove_current());
            }
        }
        assert_eq!(100, seen);
        assert_eq!(Err(Error::Exhausted), cursor.advance());
        assert_eq!(None, cursor.next());
        assert_eq!(50, map.len());
        assert!(map.iter().all(|(k, _)| k % 2 == 1));
        map.assert_invariants();
    }

    #[test]
    fn cursor_on_frozen_transient_cannot_remove() {
        let mut map = TransientHashMap::new();
        map.insert(1, "one").unwrap();
        let _ = map.freeze().unwrap();
        let mut cursor = map.cursor();
        assert_eq!(Ok((1, "one")), cursor.advance());
        assert_eq!(Err(Error::Frozen), cursor.remove_current());
    }

    #[test]
    fn retain_keeps_matching_entries() {
        let mut map = TransientHashMap::new();
        map.insert_all((0..1000).map(|i| (i, i * 3))).unwrap();
        map.retain(|k, _| k % 10 == 0).unwrap();
        assert_eq!(100, map.len());
        assert_eq!(Some(&30), map.get(&10));
        assert_eq!(None, map.get(&11));
        map.assert_invariants();
    }

    #[test]
    fn comparator_variants() {
        let by_value = |a: &Colliding, b: &Colliding| a.cmp(b);
        let a = Colliding::new(1, 3);
        let b = Colliding::new(2, 3);
        let mut map: LolTransient<Colliding, i32> = TransientHashMap::default();
        assert_eq!(Ok(None), map.insert_by(a.clone(), 1, by_value));
        assert_eq!(Ok(None), map.insert_by(b.clone(), 2, by_value));
        assert_eq!(Some(&2), map.get_by(&b, by_value));
        assert!(map.contains_key_by(&a, by_value));
        assert_eq!(Ok(Some(1)), map.remove_by(&a, by_value));
        assert!(!map.contains_key_by(&a, by_value));
        map.assert_invariants();
    }

    #[derive(Arbitrary, Clone, Debug)]
    enum Action {
        Insert(i16, i16),
        Remove(i16),
    }

    #[derive(Arbitrary, Clone, Debug)]
    enum CollidingAction {
        Insert(u8, u8),
        Remove(u8),
    }

    proptest! {
        #[test]
        fn transient_matches_persistent(ref actions in collection::vec(any::<Action>(), 0..500)) {
            let mut persistent: GenericHashMap<i16, i16, LolState, DefaultSharedPtr> = Default::default();
            let mut transient: LolTransient<i16, i16> = TransientHashMap::default();
            for action in actions {
                match action {
                    Action::Insert(k, v) => {
                        let expected = persistent.get(k).cloned();
                        persistent = persistent.update(*k, *v);
                        assert_eq!(Ok(expected), transient.insert(*k, *v));
                    }
                    Action::Remove(k) => {
                        let expected = persistent.get(k).cloned();
                        persistent = persistent.without(k);
                        assert_eq!(Ok(expected), transient.remove(k));
                    }
                }
                assert_eq!(persistent.len(), transient.len());
            }
            let frozen = transient.freeze().unwrap();
            frozen.assert_invariants();
            assert_eq!(persistent, frozen);
            assert!(persistent.structural_eq(&frozen));
        }

        #[test]
        fn transient_handles_collisions(ref actions in collection::vec(any::<CollidingAction>(), 0..300)) {
            let key = |id: u8| Colliding::new(u32::from(id), u32::from(id % 4));
            let mut persistent: GenericHashMap<Colliding, u8, LolState, DefaultSharedPtr> = Default::default();
            let mut transient: LolTransient<Colliding, u8> = TransientHashMap::default();
            for action in actions {
                match action {
                    CollidingAction::Insert(id, v) => {
                        persistent = persistent.update(key(*id), *v);
                        transient.insert(key(*id), *v).unwrap();
                    }
                    CollidingAction::Remove(id) => {
                        persistent = persistent.without(&key(*id));
                        transient.remove(&key(*id)).unwrap();
                    }
                }
            }
            persistent.assert_invariants();
            transient.assert_invariants();
            let frozen = transient.into_persistent();
            assert_eq!(persistent, frozen);
            assert!(persistent.structural_eq(&frozen));
        }
    }
}
