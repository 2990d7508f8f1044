// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Compressed hash array mapped trie nodes.
//!
//! A [`Node`] is either a bitmap node or a collision node. A bitmap node
//! keeps two bitmaps over the digits of its level: `datamap` marks digits
//! holding an inline key/value pair, `nodemap` marks digits holding a child
//! node. Pairs and children live in two packed slices sized exactly to
//! their bitmaps, ordered by ascending digit, so a node holding `p` pairs
//! and `c` children owns exactly `2p + c` slots.
//!
//! Nodes are shared between map versions through [`SharedPointer`]. A node
//! is only ever edited in place when it carries the [`Owner`] of the
//! transient performing the edit; everything else is copied first.

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::iter::FusedIterator;
use std::mem;
use std::slice::Iter as SliceIter;
use std::vec::IntoIter as VecIntoIter;

use archery::{SharedPointer, SharedPointerKind};
use bitmaps::Bitmap;

use crate::sync::Owner;
use crate::util::{clone_ref, insert_at, remove_at};

pub(crate) use crate::config::HASH_LEVEL_SIZE as HASH_SHIFT;
pub(crate) const HASH_WIDTH: usize = 2_usize.pow(HASH_SHIFT as u32);
pub(crate) type HashBits = u32;
pub(crate) const HASH_BITS: usize = HashBits::BITS as usize;
/// Deepest level a key can reach before every digit of its hash is spent.
pub(crate) const MAX_DEPTH: usize = HASH_BITS.div_ceil(HASH_SHIFT);
const HASH_MASK: HashBits = (HASH_WIDTH - 1) as HashBits;

type SlotMap = Bitmap<HASH_WIDTH>;

pub(crate) type NodeRef<K, V, P> = SharedPointer<Node<K, V, P>, P>;

pub(crate) fn hash_key<K: Hash + ?Sized, S: BuildHasher>(bh: &S, key: &K) -> HashBits {
    let mut hasher = bh.build_hasher();
    key.hash(&mut hasher);
    hasher.finish() as HashBits
}

#[inline]
pub(crate) fn mask(hash: HashBits, shift: usize) -> usize {
    debug_assert!(shift < HASH_BITS);
    (hash >> shift & HASH_MASK) as usize
}

/// Number of occupied digits below `digit`, ie. the packed index of `digit`.
#[inline]
fn rank(map: SlotMap, digit: usize) -> usize {
    (map & SlotMap::mask(digit)).len()
}

/// Coarse arity of a node, as seen by its parent after an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SizePredicate {
    Empty,
    One,
    MoreThanOne,
}

/// What an update did at the level it was applied to.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Update<V> {
    /// The key was present with an equal value. Nothing was copied; the
    /// new value is handed back.
    Unchanged(V),
    /// A new key was added.
    Inserted,
    /// The key was present; its previous value is returned.
    Replaced(V),
}

impl<V> Update<V> {
    #[inline]
    pub(crate) fn is_changed(&self) -> bool {
        !matches!(self, Update::Unchanged(_))
    }
}

pub(crate) enum Node<K, V, P: SharedPointerKind> {
    Bitmap(BitmapNode<K, V, P>),
    Collision(CollisionNode<K, V>),
}

pub(crate) struct BitmapNode<K, V, P: SharedPointerKind> {
    owner: Owner,
    datamap: SlotMap,
    nodemap: SlotMap,
    payload: Box<[(K, V)]>,
    children: Box<[NodeRef<K, V, P>]>,
}

/// Entries whose full hashes are identical. No digit can tell them apart,
/// so they are kept in a flat list and searched linearly.
pub(crate) struct CollisionNode<K, V> {
    owner: Owner,
    hash: HashBits,
    entries: Box<[(K, V)]>,
}

// We impl Clone instead of deriving it, because P doesn't need to be Clone.
impl<K: Clone, V: Clone, P: SharedPointerKind> Clone for Node<K, V, P> {
    fn clone(&self) -> Self {
        match self {
            Node::Bitmap(node) => Node::Bitmap(BitmapNode {
                owner: node.owner,
                datamap: node.datamap,
                nodemap: node.nodemap,
                payload: node.payload.clone(),
                children: node.children.clone(),
            }),
            Node::Collision(node) => Node::Collision(CollisionNode {
                owner: node.owner,
                hash: node.hash,
                entries: node.entries.clone(),
            }),
        }
    }
}

/// Where a hash lands in a bitmap node: `(digit, packed index)`.
enum Slot {
    Empty(usize),
    Payload(usize, usize),
    Child(usize, usize),
}

impl<K, V, P: SharedPointerKind> BitmapNode<K, V, P> {
    fn empty(owner: Owner) -> Self {
        BitmapNode {
            owner,
            datamap: SlotMap::new(),
            nodemap: SlotMap::new(),
            payload: Box::new([]),
            children: Box::new([]),
        }
    }

    fn pair(owner: Owner, digit1: usize, entry1: (K, V), digit2: usize, entry2: (K, V)) -> Self {
        debug_assert_ne!(digit1, digit2);
        let mut datamap = SlotMap::new();
        datamap.set(digit1, true);
        datamap.set(digit2, true);
        let payload: Box<[(K, V)]> = if digit1 < digit2 {
            Box::new([entry1, entry2])
        } else {
            Box::new([entry2, entry1])
        };
        BitmapNode {
            owner,
            datamap,
            nodemap: SlotMap::new(),
            payload,
            children: Box::new([]),
        }
    }

    fn single_child(owner: Owner, digit: usize, child: NodeRef<K, V, P>) -> Self {
        let mut node = Self::empty(owner);
        node.insert_child(digit, child);
        node
    }

    fn locate(&self, hash: HashBits, shift: usize) -> Slot {
        let digit = mask(hash, shift);
        if self.datamap.get(digit) {
            Slot::Payload(digit, rank(self.datamap, digit))
        } else if self.nodemap.get(digit) {
            Slot::Child(digit, rank(self.nodemap, digit))
        } else {
            Slot::Empty(digit)
        }
    }

    fn insert_payload(&mut self, digit: usize, key: K, value: V) {
        debug_assert!(!self.datamap.get(digit) && !self.nodemap.get(digit));
        self.datamap.set(digit, true);
        insert_at(&mut self.payload, rank(self.datamap, digit), (key, value));
    }

    fn remove_payload(&mut self, digit: usize) -> (K, V) {
        let index = rank(self.datamap, digit);
        self.datamap.set(digit, false);
        remove_at(&mut self.payload, index)
    }

    fn insert_child(&mut self, digit: usize, child: NodeRef<K, V, P>) {
        debug_assert!(!self.datamap.get(digit) && !self.nodemap.get(digit));
        self.nodemap.set(digit, true);
        insert_at(&mut self.children, rank(self.nodemap, digit), child);
    }

    fn remove_child(&mut self, digit: usize) -> NodeRef<K, V, P> {
        let index = rank(self.nodemap, digit);
        self.nodemap.set(digit, false);
        remove_at(&mut self.children, index)
    }
}

impl<K, V> CollisionNode<K, V> {
    fn new(owner: Owner, hash: HashBits, entry1: (K, V), entry2: (K, V)) -> Self {
        CollisionNode {
            owner,
            hash,
            entries: Box::new([entry1, entry2]),
        }
    }

    fn position<Q, E>(&self, key: &Q, eq: &E) -> Option<usize>
    where
        Q: ?Sized,
        E: Fn(&K, &Q) -> bool,
    {
        self.entries.iter().position(|(k, _)| eq(k, key))
    }
}

// Accessors, no bounds.

impl<K, V, P: SharedPointerKind> Node<K, V, P> {
    /// A root node holding a single pair at `digit`.
    pub(crate) fn unit(owner: Owner, digit: usize, key: K, value: V) -> Self {
        let mut node = BitmapNode::empty(owner);
        node.insert_payload(digit, key, value);
        Node::Bitmap(node)
    }

    #[inline]
    pub(crate) fn owner(&self) -> Owner {
        match self {
            Node::Bitmap(node) => node.owner,
            Node::Collision(node) => node.owner,
        }
    }

    fn set_owner(&mut self, owner: Owner) {
        match self {
            Node::Bitmap(node) => node.owner = owner,
            Node::Collision(node) => node.owner = owner,
        }
    }

    fn as_bitmap(&self) -> &BitmapNode<K, V, P> {
        match self {
            Node::Bitmap(node) => node,
            Node::Collision(_) => panic!("nodes::hamt::Node::as_bitmap: not a bitmap node"),
        }
    }

    fn bitmap_mut(&mut self) -> &mut BitmapNode<K, V, P> {
        match self {
            Node::Bitmap(node) => node,
            Node::Collision(_) => panic!("nodes::hamt::Node::bitmap_mut: not a bitmap node"),
        }
    }

    fn collision_mut(&mut self) -> &mut CollisionNode<K, V> {
        match self {
            Node::Collision(node) => node,
            Node::Bitmap(_) => panic!("nodes::hamt::Node::collision_mut: not a collision node"),
        }
    }

    /// The inline pairs of this node, in slot order.
    #[inline]
    pub(crate) fn payload(&self) -> &[(K, V)] {
        match self {
            Node::Bitmap(node) => &node.payload,
            Node::Collision(node) => &node.entries,
        }
    }

    /// The child nodes of this node, in slot order.
    #[inline]
    pub(crate) fn children(&self) -> &[NodeRef<K, V, P>] {
        match self {
            Node::Bitmap(node) => &node.children,
            Node::Collision(_) => &[],
        }
    }

    #[inline]
    pub(crate) fn payload_arity(&self) -> usize {
        self.payload().len()
    }

    #[inline]
    pub(crate) fn node_arity(&self) -> usize {
        self.children().len()
    }

    pub(crate) fn size_predicate(&self) -> SizePredicate {
        match (self.payload_arity(), self.node_arity()) {
            (0, 0) => SizePredicate::Empty,
            (1, 0) => SizePredicate::One,
            _ => SizePredicate::MoreThanOne,
        }
    }

    /// The only thing below a bitmap node with no pairs and a single
    /// collision child.
    fn lone_collision(&self) -> Option<NodeRef<K, V, P>> {
        match self {
            Node::Bitmap(node) if node.payload.is_empty() && node.children.len() == 1 => {
                match &*node.children[0] {
                    Node::Collision(_) => Some(node.children[0].clone()),
                    Node::Bitmap(_) => None,
                }
            }
            _ => None,
        }
    }

    fn into_head(self) -> (K, V) {
        let entries = match self {
            Node::Bitmap(node) => node.payload,
            Node::Collision(node) => node.entries,
        };
        match entries.into_vec().into_iter().next() {
            Some(entry) => entry,
            None => panic!("nodes::hamt::Node::into_head: node has no payload"),
        }
    }

    pub(crate) fn payload_iter(&self) -> SliceIter<'_, (K, V)> {
        self.payload().iter()
    }

    pub(crate) fn child_iter(&self) -> SliceIter<'_, NodeRef<K, V, P>> {
        self.children().iter()
    }

    /// Look up `key`, returning the stored pair.
    pub(crate) fn get<Q, E>(&self, hash: HashBits, shift: usize, key: &Q, eq: &E) -> Option<(&K, &V)>
    where
        Q: ?Sized,
        E: Fn(&K, &Q) -> bool,
    {
        let mut node = self;
        let mut shift = shift;
        loop {
            match node {
                Node::Bitmap(bitmap) => match bitmap.locate(hash, shift) {
                    Slot::Payload(_, index) => {
                        let (k, v) = &bitmap.payload[index];
                        return if eq(k, key) { Some((k, v)) } else { None };
                    }
                    Slot::Child(_, index) => {
                        node = &*bitmap.children[index];
                        shift += HASH_SHIFT;
                    }
                    Slot::Empty(_) => return None,
                },
                Node::Collision(coll) => {
                    if coll.hash != hash {
                        return None;
                    }
                    return coll
                        .position(key, eq)
                        .map(|index| (&coll.entries[index].0, &coll.entries[index].1));
                }
            }
        }
    }

    pub(crate) fn contains_key<Q, E>(&self, hash: HashBits, shift: usize, key: &Q, eq: &E) -> bool
    where
        Q: ?Sized,
        E: Fn(&K, &Q) -> bool,
    {
        self.get(hash, shift, key, eq).is_some()
    }

    /// Two tries are structurally equal when they have the same shape and
    /// the same pairs in the same slots. Collision entries compare as sets.
    pub(crate) fn structural_eq(&self, other: &Self) -> bool
    where
        K: PartialEq,
        V: PartialEq,
    {
        match (self, other) {
            (Node::Bitmap(left), Node::Bitmap(right)) => {
                left.datamap == right.datamap
                    && left.nodemap == right.nodemap
                    && left.payload == right.payload
                    && left
                        .children
                        .iter()
                        .zip(right.children.iter())
                        .all(|(l, r)| SharedPointer::ptr_eq(l, r) || l.structural_eq(r))
            }
            (Node::Collision(left), Node::Collision(right)) => {
                left.hash == right.hash
                    && left.entries.len() == right.entries.len()
                    && left.entries.iter().all(|entry| right.entries.contains(entry))
            }
            _ => false,
        }
    }
}

// Positional access by slot index rather than by digit.

impl<K, V, P: SharedPointerKind> Node<K, V, P> {
    /// Physical slot count: a key and a value per pair, one per child.
    #[cfg(any(test, feature = "debug"))]
    pub(crate) fn slot_count(&self) -> usize {
        2 * self.payload_arity() + self.node_arity()
    }
}

#[cfg(test)]
impl<K, V, P: SharedPointerKind> Node<K, V, P> {
    pub(crate) fn get_key(&self, index: usize) -> &K {
        match self.payload().get(index) {
            Some((key, _)) => key,
            None => panic!("nodes::hamt::Node::get_key: no payload slot {}", index),
        }
    }

    pub(crate) fn get_value(&self, index: usize) -> &V {
        match self.payload().get(index) {
            Some((_, value)) => value,
            None => panic!("nodes::hamt::Node::get_value: no payload slot {}", index),
        }
    }

    pub(crate) fn get_child(&self, index: usize) -> &NodeRef<K, V, P> {
        match self.children().get(index) {
            Some(child) => child,
            None => panic!("nodes::hamt::Node::get_child: no child slot {}", index),
        }
    }

    pub(crate) fn head_key(&self) -> &K {
        match self.payload().first() {
            Some((key, _)) => key,
            None => panic!("nodes::hamt::Node::head_key: node has no payload"),
        }
    }

    pub(crate) fn head_value(&self) -> &V {
        match self.payload().first() {
            Some((_, value)) => value,
            None => panic!("nodes::hamt::Node::head_value: node has no payload"),
        }
    }
}

// Merging

impl<K, V, P: SharedPointerKind> Node<K, V, P> {
    /// Build the smallest subtree at `shift` that tells two different keys apart.
    pub(crate) fn merge_values(
        owner: Owner,
        (key1, value1, hash1): (K, V, HashBits),
        (key2, value2, hash2): (K, V, HashBits),
        shift: usize,
    ) -> Self {
        if hash1 == hash2 {
            return Node::Collision(CollisionNode::new(
                owner,
                hash1,
                (key1, value1),
                (key2, value2),
            ));
        }
        let digit1 = mask(hash1, shift);
        let digit2 = mask(hash2, shift);
        if digit1 != digit2 {
            Node::Bitmap(BitmapNode::pair(
                owner,
                digit1,
                (key1, value1),
                digit2,
                (key2, value2),
            ))
        } else {
            let child = Self::merge_values(
                owner,
                (key1, value1, hash1),
                (key2, value2, hash2),
                shift + HASH_SHIFT,
            );
            Node::Bitmap(BitmapNode::single_child(
                owner,
                digit1,
                SharedPointer::new(child),
            ))
        }
    }

    /// Split an existing subtree whose entries all hash to `node_hash` from
    /// a new pair with a different hash.
    pub(crate) fn merge_node_and_value(
        owner: Owner,
        node: NodeRef<K, V, P>,
        node_hash: HashBits,
        (key, value, hash): (K, V, HashBits),
        shift: usize,
    ) -> Self {
        debug_assert_ne!(node_hash, hash);
        let node_digit = mask(node_hash, shift);
        let digit = mask(hash, shift);
        let mut result = BitmapNode::empty(owner);
        if node_digit != digit {
            result.insert_payload(digit, key, value);
            result.insert_child(node_digit, node);
        } else {
            let child =
                Self::merge_node_and_value(owner, node, node_hash, (key, value, hash), shift + HASH_SHIFT);
            result.insert_child(node_digit, SharedPointer::new(child));
        }
        Node::Bitmap(result)
    }
}

// Updates

impl<K, V, P> Node<K, V, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    /// Get the node behind `this` for editing, copying it first unless
    /// `owner` is allowed to edit it in place.
    fn edit(this: &mut NodeRef<K, V, P>, owner: Owner) -> &mut Self {
        if !this.owner().authorizes(owner) {
            let mut copy = (**this).clone();
            copy.set_owner(owner);
            *this = SharedPointer::new(copy);
        }
        SharedPointer::make_mut(this)
    }

    /// Insert or replace `key` in the subtree behind `this`.
    ///
    /// `this` is left pointing at the updated subtree. Unless the update is
    /// [`Update::Unchanged`], nodes on the path that `owner` doesn't own
    /// have been replaced by copies; the originals are untouched.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn update<S, E>(
        this: &mut NodeRef<K, V, P>,
        owner: Owner,
        hasher: &S,
        hash: HashBits,
        shift: usize,
        key: K,
        value: V,
        eq: &E,
    ) -> Update<V>
    where
        K: Hash,
        V: PartialEq,
        S: BuildHasher,
        E: Fn(&K, &K) -> bool,
    {
        let slot = match &**this {
            Node::Bitmap(node) => node.locate(hash, shift),
            Node::Collision(_) => {
                return Self::update_collision(this, owner, hash, shift, key, value, eq)
            }
        };
        match slot {
            Slot::Empty(digit) => {
                Self::edit(this, owner)
                    .bitmap_mut()
                    .insert_payload(digit, key, value);
                Update::Inserted
            }
            Slot::Payload(digit, index) => {
                let current_hash = {
                    let (current_key, current_value) = &this.as_bitmap().payload[index];
                    if eq(current_key, &key) {
                        if *current_value == value {
                            return Update::Unchanged(value);
                        }
                        let node = Self::edit(this, owner).bitmap_mut();
                        return Update::Replaced(mem::replace(&mut node.payload[index].1, value));
                    }
                    hash_key(hasher, current_key)
                };
                // Two different keys want this digit: push both one level down.
                let node = Self::edit(this, owner).bitmap_mut();
                let (current_key, current_value) = node.remove_payload(digit);
                let child = Self::merge_values(
                    owner,
                    (current_key, current_value, current_hash),
                    (key, value, hash),
                    shift + HASH_SHIFT,
                );
                node.insert_child(digit, SharedPointer::new(child));
                Update::Inserted
            }
            Slot::Child(_, index) => {
                if this.owner().authorizes(owner) {
                    let node = Self::edit(this, owner).bitmap_mut();
                    Self::update(
                        &mut node.children[index],
                        owner,
                        hasher,
                        hash,
                        shift + HASH_SHIFT,
                        key,
                        value,
                        eq,
                    )
                } else {
                    let mut child = this.as_bitmap().children[index].clone();
                    let result = Self::update(
                        &mut child,
                        owner,
                        hasher,
                        hash,
                        shift + HASH_SHIFT,
                        key,
                        value,
                        eq,
                    );
                    if result.is_changed() {
                        Self::edit(this, owner).bitmap_mut().children[index] = child;
                    }
                    result
                }
            }
        }
    }

    fn update_collision<E>(
        this: &mut NodeRef<K, V, P>,
        owner: Owner,
        hash: HashBits,
        shift: usize,
        key: K,
        value: V,
        eq: &E,
    ) -> Update<V>
    where
        V: PartialEq,
        E: Fn(&K, &K) -> bool,
    {
        let (node_hash, found) = match &**this {
            Node::Collision(coll) => (coll.hash, coll.position(&key, eq)),
            Node::Bitmap(_) => unreachable!(),
        };
        if node_hash != hash {
            // The new key only shares a digit prefix with the collision,
            // so split them like any other diverging pair.
            let existing = this.clone();
            *this = SharedPointer::new(Self::merge_node_and_value(
                owner,
                existing,
                node_hash,
                (key, value, hash),
                shift,
            ));
            return Update::Inserted;
        }
        match found {
            Some(index) => {
                if this.payload()[index].1 == value {
                    return Update::Unchanged(value);
                }
                let coll = Self::edit(this, owner).collision_mut();
                Update::Replaced(mem::replace(&mut coll.entries[index].1, value))
            }
            None => {
                let coll = Self::edit(this, owner).collision_mut();
                let end = coll.entries.len();
                insert_at(&mut coll.entries, end, (key, value));
                Update::Inserted
            }
        }
    }

    /// Remove `key` from the subtree behind `this`, returning the removed pair.
    ///
    /// Nothing is copied when the key is absent. The node left behind may be
    /// empty or hold a single pair; the caller decides what to do with it
    /// by looking at its [`SizePredicate`].
    pub(crate) fn remove<Q, E>(
        this: &mut NodeRef<K, V, P>,
        owner: Owner,
        hash: HashBits,
        shift: usize,
        key: &Q,
        eq: &E,
    ) -> Option<(K, V)>
    where
        Q: ?Sized,
        E: Fn(&K, &Q) -> bool,
    {
        let slot = match &**this {
            Node::Bitmap(node) => node.locate(hash, shift),
            Node::Collision(_) => return Self::remove_collision(this, owner, hash, key, eq),
        };
        match slot {
            Slot::Empty(_) => None,
            Slot::Payload(digit, index) => {
                if !eq(&this.as_bitmap().payload[index].0, key) {
                    return None;
                }
                Some(Self::edit(this, owner).bitmap_mut().remove_payload(digit))
            }
            Slot::Child(digit, index) => {
                let removed;
                let node = if this.owner().authorizes(owner) {
                    let node = Self::edit(this, owner).bitmap_mut();
                    removed = Self::remove(
                        &mut node.children[index],
                        owner,
                        hash,
                        shift + HASH_SHIFT,
                        key,
                        eq,
                    )?;
                    node
                } else {
                    let mut child = this.as_bitmap().children[index].clone();
                    removed = Self::remove(&mut child, owner, hash, shift + HASH_SHIFT, key, eq)?;
                    let node = Self::edit(this, owner).bitmap_mut();
                    node.children[index] = child;
                    node
                };
                node.compact_child(digit, index);
                Some(removed)
            }
        }
    }

    fn remove_collision<Q, E>(
        this: &mut NodeRef<K, V, P>,
        owner: Owner,
        hash: HashBits,
        key: &Q,
        eq: &E,
    ) -> Option<(K, V)>
    where
        Q: ?Sized,
        E: Fn(&K, &Q) -> bool,
    {
        let index = match &**this {
            Node::Collision(coll) if coll.hash == hash => coll.position(key, eq)?,
            _ => return None,
        };
        let coll = Self::edit(this, owner).collision_mut();
        let removed = remove_at(&mut coll.entries, index);
        if coll.entries.len() == 1 {
            // A lone survivor is no collision: turn it back into an
            // ordinary single pair node, which the parent will inline.
            let node_hash = coll.hash;
            let (key, value) = remove_at(&mut coll.entries, 0);
            *this = SharedPointer::new(Node::unit(owner, mask(node_hash, 0), key, value));
        }
        Some(removed)
    }
}

impl<K, V, P> BitmapNode<K, V, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    /// Restore canonical form after the child at `digit` lost an entry:
    /// an empty child is dropped, a child with one pair is inlined here.
    fn compact_child(&mut self, digit: usize, index: usize) {
        match self.children[index].size_predicate() {
            SizePredicate::MoreThanOne => {
                // Collision nodes don't depend on their depth, so one left
                // alone under a path of its own moves up to this level.
                if let Some(collision) = self.children[index].lone_collision() {
                    self.children[index] = collision;
                }
            }
            SizePredicate::Empty => {
                self.remove_child(digit);
            }
            SizePredicate::One => {
                let child = self.remove_child(digit);
                let (key, value) = clone_ref(child).into_head();
                self.insert_payload(digit, key, value);
            }
        }
    }
}

// Invariants

#[cfg(any(test, feature = "debug"))]
impl<K, V, P: SharedPointerKind> Node<K, V, P> {
    /// Walk the subtree and panic on any broken invariant. `prefix` holds
    /// the digits consumed above `shift`. Returns the number of entries and
    /// their combined content hash.
    pub(crate) fn check_invariants<S: BuildHasher>(
        &self,
        hasher: &S,
        shift: usize,
        prefix: HashBits,
        is_root: bool,
    ) -> (usize, u64)
    where
        K: Hash + Eq,
        V: Hash,
    {
        let path_mask: HashBits = if shift >= HASH_BITS {
            HashBits::MAX
        } else {
            (1 << shift) - 1
        };
        if !is_root {
            assert_eq!(
                SizePredicate::MoreThanOne,
                self.size_predicate(),
                "non-root node at shift {} should have been inlined into its parent",
                shift
            );
        }
        let mut count = 0;
        let mut content = 0;
        match self {
            Node::Bitmap(node) => {
                assert!(shift < HASH_BITS, "bitmap node below the last hash digit");
                assert!(
                    is_root || self.lone_collision().is_none(),
                    "collision node left under a path of its own"
                );
                assert!(
                    (node.datamap & node.nodemap).is_empty(),
                    "digit used both as payload and child"
                );
                assert_eq!(node.payload.len(), node.datamap.len());
                assert_eq!(node.children.len(), node.nodemap.len());
                assert_eq!(
                    self.slot_count(),
                    2 * node.datamap.len() + node.nodemap.len()
                );
                for digit in 0..HASH_WIDTH {
                    if node.datamap.get(digit) {
                        let (key, value) = &node.payload[rank(node.datamap, digit)];
                        let hash = hash_key(hasher, key);
                        assert_eq!(digit, mask(hash, shift), "payload in the wrong slot");
                        assert_eq!(prefix, hash & path_mask, "payload under the wrong prefix");
                        count += 1;
                        content ^= crate::hash::entry_hash(key, value);
                    }
                    if node.nodemap.get(digit) {
                        let child = &node.children[rank(node.nodemap, digit)];
                        let (child_count, child_content) = child.check_invariants(
                            hasher,
                            shift + HASH_SHIFT,
                            prefix | (digit as HashBits) << shift,
                            false,
                        );
                        count += child_count;
                        content ^= child_content;
                    }
                }
            }
            Node::Collision(node) => {
                assert!(node.entries.len() >= 2, "collision node with a single entry");
                for (index, (key, value)) in node.entries.iter().enumerate() {
                    let hash = hash_key(hasher, key);
                    assert_eq!(node.hash, hash, "collision entry with a foreign hash");
                    assert_eq!(prefix, hash & path_mask, "collision under the wrong prefix");
                    assert!(
                        node.entries[index + 1..].iter().all(|(other, _)| other != key),
                        "duplicate key in collision node"
                    );
                    count += 1;
                    content ^= crate::hash::entry_hash(key, value);
                }
            }
        }
        (count, content)
    }

    /// Number of levels below and including this node.
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(|child| child.depth())
            .max()
            .unwrap_or(0)
    }
}

// Ref iterator

struct Frame<'a, K, V, P: SharedPointerKind> {
    payload: SliceIter<'a, (K, V)>,
    children: SliceIter<'a, NodeRef<K, V, P>>,
}

impl<'a, K, V, P: SharedPointerKind> Frame<'a, K, V, P> {
    fn new(node: &'a Node<K, V, P>) -> Self {
        Frame {
            payload: node.payload_iter(),
            children: node.child_iter(),
        }
    }
}

impl<'a, K, V, P: SharedPointerKind> Clone for Frame<'a, K, V, P> {
    fn clone(&self) -> Self {
        Frame {
            payload: self.payload.clone(),
            children: self.children.clone(),
        }
    }
}

/// Walks a trie depth first: a node's own pairs, then its children in
/// digit order.
pub(crate) struct Iter<'a, K, V, P: SharedPointerKind> {
    count: usize,
    stack: Vec<Frame<'a, K, V, P>>,
}

// We impl Clone instead of deriving it, because we want Clone even if K and V aren't.
impl<'a, K, V, P: SharedPointerKind> Clone for Iter<'a, K, V, P> {
    fn clone(&self) -> Self {
        Iter {
            count: self.count,
            stack: self.stack.clone(),
        }
    }
}

impl<'a, K, V, P: SharedPointerKind> Iter<'a, K, V, P> {
    pub(crate) fn new(root: Option<&'a Node<K, V, P>>, size: usize) -> Self {
        let mut stack = Vec::with_capacity(MAX_DEPTH + 1);
        if let Some(root) = root {
            stack.push(Frame::new(root));
        }
        Iter { count: size, stack }
    }
}

impl<'a, K, V, P: SharedPointerKind> Iterator for Iter<'a, K, V, P> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.last_mut() {
            if let Some((key, value)) = frame.payload.next() {
                self.count -= 1;
                return Some((key, value));
            }
            match frame.children.next() {
                Some(child) => {
                    debug_assert!(self.stack.len() <= MAX_DEPTH);
                    self.stack.push(Frame::new(child));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.count, Some(self.count))
    }
}

impl<'a, K, V, P: SharedPointerKind> ExactSizeIterator for Iter<'a, K, V, P> {}

impl<'a, K, V, P: SharedPointerKind> FusedIterator for Iter<'a, K, V, P> {}

// Snapshot iterator

/// Like [`Iter`], but holds its own references to the nodes it walks and
/// yields clones, so the map it came from can be edited meanwhile.
pub(crate) struct SnapshotIter<K, V, P: SharedPointerKind> {
    count: usize,
    stack: Vec<(NodeRef<K, V, P>, usize, usize)>,
}

impl<K, V, P: SharedPointerKind> SnapshotIter<K, V, P> {
    pub(crate) fn new(root: Option<NodeRef<K, V, P>>, size: usize) -> Self {
        let mut stack = Vec::with_capacity(MAX_DEPTH + 1);
        if let Some(root) = root {
            stack.push((root, 0, 0));
        }
        SnapshotIter { count: size, stack }
    }
}

impl<K, V, P> Iterator for SnapshotIter<K, V, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node, payload_pos, child_pos) = self.stack.last_mut()?;
            if let Some((key, value)) = node.payload().get(*payload_pos) {
                *payload_pos += 1;
                self.count -= 1;
                return Some((key.clone(), value.clone()));
            }
            match node.children().get(*child_pos).cloned() {
                Some(child) => {
                    *child_pos += 1;
                    self.stack.push((child, 0, 0));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.count, Some(self.count))
    }
}

impl<K: Clone, V: Clone, P: SharedPointerKind> ExactSizeIterator for SnapshotIter<K, V, P> {}

impl<K: Clone, V: Clone, P: SharedPointerKind> FusedIterator for SnapshotIter<K, V, P> {}

// Consuming iterator

pub(crate) struct Drain<K, V, P: SharedPointerKind> {
    count: usize,
    stack: Vec<(VecIntoIter<(K, V)>, VecIntoIter<NodeRef<K, V, P>>)>,
}

impl<K, V, P> Drain<K, V, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    pub(crate) fn new(root: Option<NodeRef<K, V, P>>, size: usize) -> Self {
        let mut result = Drain {
            count: size,
            stack: Vec::with_capacity(MAX_DEPTH + 1),
        };
        if let Some(root) = root {
            result.push(root);
        }
        result
    }

    fn push(&mut self, node: NodeRef<K, V, P>) {
        // Moves the entries out when we hold the last reference.
        let frame = match clone_ref(node) {
            Node::Bitmap(node) => (
                node.payload.into_vec().into_iter(),
                node.children.into_vec().into_iter(),
            ),
            Node::Collision(node) => (node.entries.into_vec().into_iter(), Vec::new().into_iter()),
        };
        self.stack.push(frame);
    }
}

impl<K, V, P> Iterator for Drain<K, V, P>
where
    K: Clone,
    V: Clone,
    P: SharedPointerKind,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((payload, children)) = self.stack.last_mut() {
            if let Some(entry) = payload.next() {
                self.count -= 1;
                return Some(entry);
            }
            match children.next() {
                Some(child) => self.push(child),
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.count, Some(self.count))
    }
}

impl<K: Clone, V: Clone, P: SharedPointerKind> ExactSizeIterator for Drain<K, V, P> {}

impl<K: Clone, V: Clone, P: SharedPointerKind> FusedIterator for Drain<K, V, P> {}

impl<K: fmt::Debug, V: fmt::Debug, P: SharedPointerKind> fmt::Debug for Node<K, V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Node::Bitmap(node) => {
                write!(f, "Node[ ")?;
                for digit in 0..HASH_WIDTH {
                    if node.datamap.get(digit) {
                        let (k, v) = &node.payload[rank(node.datamap, digit)];
                        write!(f, "{}: {:?} => {:?}, ", digit, k, v)?;
                    } else if node.nodemap.get(digit) {
                        write!(f, "{}: {:?}, ", digit, node.children[rank(node.nodemap, digit)])?;
                    }
                }
                write!(f, "]")
            }
            Node::Collision(node) => write!(f, "Coll{:?} :: {}", node.entries, node.hash),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::LolState;
    use archery::RcK;
    use pretty_assertions::assert_eq;

    type TestNode = Node<u32, &'static str, RcK>;
    type TestRef = NodeRef<u32, &'static str, RcK>;

    fn eq(a: &u32, b: &u32) -> bool {
        a == b
    }

    fn hash(key: u32) -> HashBits {
        hash_key(&LolState::default(), &key)
    }

    fn root(key: u32, value: &'static str) -> TestRef {
        SharedPointer::new(Node::unit(Owner::NONE, mask(hash(key), 0), key, value))
    }

    fn put(node: &mut TestRef, owner: Owner, key: u32, value: &'static str) -> Update<&'static str> {
        Node::update(node, owner, &LolState::default(), hash(key), 0, key, value, &eq)
    }

    fn del(node: &mut TestRef, owner: Owner, key: u32) -> Option<(u32, &'static str)> {
        Node::remove(node, owner, hash(key), 0, &key, &eq)
    }

    fn check(node: &TestRef) -> usize {
        node.check_invariants(&LolState::default(), 0, 0, true).0
    }

    #[test]
    fn lol_hash_is_identity() {
        assert_eq!(12345, hash(12345));
    }

    #[test]
    fn merge_orders_payload_by_digit() {
        let node: TestNode = Node::merge_values(
            Owner::NONE,
            (5, "five", 5),
            (2, "two", 2),
            0,
        );
        assert_eq!(2, node.payload_arity());
        assert_eq!(0, node.node_arity());
        assert_eq!(&2, node.get_key(0));
        assert_eq!(&"five", node.get_value(1));
        assert_eq!(&2, node.head_key());
        assert_eq!(&"two", node.head_value());
    }

    #[test]
    fn merge_shared_digit_builds_single_child_chain() {
        let far = 1 + (1 << (HASH_SHIFT * 2));
        let node: TestNode = Node::merge_values(
            Owner::NONE,
            (1, "near", 1),
            (far as u32, "far", far as HashBits),
            0,
        );
        // Digits agree at levels 0 and 1, diverge at level 2.
        assert_eq!(0, node.payload_arity());
        assert_eq!(1, node.node_arity());
        let level1 = node.get_child(0);
        assert_eq!(0, level1.payload_arity());
        assert_eq!(1, level1.node_arity());
        let level2 = level1.get_child(0);
        assert_eq!(2, level2.payload_arity());
        assert_eq!(3, node.depth());
    }

    #[test]
    fn merge_equal_hashes_builds_collision() {
        let node: TestNode = Node::merge_values(
            Owner::NONE,
            (1, "one", 77),
            (2, "two", 77),
            0,
        );
        assert!(matches!(node, Node::Collision(_)));
        assert_eq!(2, node.payload_arity());
        assert_eq!(0, node.node_arity());
        assert_eq!(SizePredicate::MoreThanOne, node.size_predicate());
    }

    #[test]
    fn size_predicate_follows_arity() {
        let mut node = root(1, "one");
        assert_eq!(SizePredicate::One, node.size_predicate());
        del(&mut node, Owner::NONE, 1);
        assert_eq!(SizePredicate::Empty, node.size_predicate());
        put(&mut node, Owner::NONE, 1, "one");
        put(&mut node, Owner::NONE, 2, "two");
        assert_eq!(SizePredicate::MoreThanOne, node.size_predicate());
    }

    #[test]
    #[should_panic(expected = "head_key: node has no payload")]
    fn head_key_of_payloadless_node_panics() {
        let far = 1 + (1 << HASH_SHIFT);
        let node: TestNode = Node::merge_values(
            Owner::NONE,
            (1, "a", 1),
            (far as u32, "b", far as HashBits),
            0,
        );
        node.head_key();
    }

    #[test]
    #[should_panic(expected = "get_child: no child slot 0")]
    fn get_child_out_of_range_panics() {
        root(1, "one").get_child(0);
    }

    #[test]
    fn persistent_update_never_touches_original() {
        let original = root(1, "one");
        let mut updated = original.clone();
        assert_eq!(Update::Inserted, put(&mut updated, Owner::NONE, 2, "two"));
        assert!(!SharedPointer::ptr_eq(&original, &updated));
        assert_eq!(1, original.payload_arity());
        assert_eq!(2, updated.payload_arity());
        assert_eq!(None, original.get(2, 0, &2, &eq));
        assert_eq!(Some((&2, &"two")), updated.get(2, 0, &2, &eq));
    }

    #[test]
    fn unchanged_update_keeps_pointer() {
        let original = root(1, "one");
        let mut same = original.clone();
        assert_eq!(Update::Unchanged("one"), put(&mut same, Owner::NONE, 1, "one"));
        assert!(SharedPointer::ptr_eq(&original, &same));
        assert_eq!(None, del(&mut same, Owner::NONE, 9));
        assert!(SharedPointer::ptr_eq(&original, &same));
    }

    #[test]
    fn owned_nodes_are_edited_in_place() {
        let owner = Owner::mint();
        let mut node = root(1, "one");
        put(&mut node, owner, 2, "two");
        // The first edit copied the node and stamped it.
        assert_eq!(owner, node.owner());
        let stamped: *const TestNode = &*node;
        assert_eq!(Update::Replaced("two"), put(&mut node, owner, 2, "deux"));
        put(&mut node, owner, 3, "three");
        assert_eq!(stamped, &*node as *const TestNode);
        // A different owner must copy.
        let other = Owner::mint();
        put(&mut node, other, 4, "four");
        assert_ne!(stamped, &*node as *const TestNode);
        assert_eq!(other, node.owner());
    }

    #[test]
    fn shared_owned_node_is_still_copied() {
        let owner = Owner::mint();
        let mut node = root(1, "one");
        put(&mut node, owner, 2, "two");
        let snapshot = node.clone();
        put(&mut node, owner, 2, "deux");
        assert_eq!(Some((&2, &"two")), snapshot.get(2, 0, &2, &eq));
        assert_eq!(Some((&2, &"deux")), node.get(2, 0, &2, &eq));
    }

    #[test]
    fn remove_inlines_single_entry_child() {
        let far = 1 + (1 << (HASH_SHIFT * 3));
        let mut node = root(1, "near");
        put(&mut node, Owner::NONE, far, "far");
        assert_eq!(4, node.depth());
        assert_eq!(2, check(&node));
        assert_eq!(Some((far, "far")), del(&mut node, Owner::NONE, far));
        assert_eq!(1, node.depth());
        assert_eq!(1, node.payload_arity());
        assert_eq!(0, node.node_arity());
        assert_eq!(&1, node.head_key());
        check(&node);
    }

    #[test]
    fn collision_grows_and_collapses() {
        let mut coll: TestRef = SharedPointer::new(Node::merge_values(
            Owner::NONE,
            (10, "ten", 99),
            (20, "twenty", 99),
            HASH_SHIFT,
        ));
        assert_eq!(
            Update::Inserted,
            Node::update(&mut coll, Owner::NONE, &LolState::default(), 99, HASH_SHIFT, 30, "thirty", &eq)
        );
        assert_eq!(3, coll.payload_arity());
        assert_eq!(
            Update::Replaced("thirty"),
            Node::update(&mut coll, Owner::NONE, &LolState::default(), 99, HASH_SHIFT, 30, "trente", &eq)
        );
        assert_eq!(Some((30, "trente")), Node::remove(&mut coll, Owner::NONE, 99, HASH_SHIFT, &30, &eq));
        assert_eq!(Some((10, "ten")), Node::remove(&mut coll, Owner::NONE, 99, HASH_SHIFT, &10, &eq));
        // The survivor became an ordinary one pair node.
        assert!(matches!(*coll, Node::Bitmap(_)));
        assert_eq!(SizePredicate::One, coll.size_predicate());
        assert_eq!(&20, coll.head_key());
    }

    #[test]
    fn collision_splits_on_different_hash() {
        let base = 5;
        let other = base + (1 << (HASH_SHIFT * 2));
        let mut coll: TestRef = SharedPointer::new(Node::merge_values(
            Owner::NONE,
            (100, "a", base),
            (200, "b", base),
            HASH_SHIFT,
        ));
        let result = Node::update(
            &mut coll,
            Owner::NONE,
            &LolState::default(),
            other,
            HASH_SHIFT,
            300,
            "c",
            &eq,
        );
        assert_eq!(Update::Inserted, result);
        // Digits at HASH_SHIFT agree, so the split happens one level lower.
        assert_eq!(0, coll.payload_arity());
        assert_eq!(1, coll.node_arity());
        let split = coll.get_child(0);
        assert_eq!(1, split.payload_arity());
        assert_eq!(1, split.node_arity());
        assert_eq!(Some((&300, &"c")), coll.get(other, HASH_SHIFT, &300, &eq));
        assert_eq!(Some((&200, &"b")), coll.get(base, HASH_SHIFT, &200, &eq));
    }

    #[test]
    fn iterators_agree() {
        let mut node = root(1, "a");
        for key in [2, 33, 65, 1 + (1 << 20), 7] {
            put(&mut node, Owner::NONE, key, "x");
        }
        let count = check(&node);
        let borrowed: Vec<u32> = Iter::new(Some(&*node), count).map(|(k, _)| *k).collect();
        let snapshot: Vec<u32> = SnapshotIter::new(Some(node.clone()), count)
            .map(|(k, _)| k)
            .collect();
        let drained: Vec<u32> = Drain::new(Some(node), count).map(|(k, _)| k).collect();
        assert_eq!(count, borrowed.len());
        assert_eq!(borrowed, snapshot);
        assert_eq!(borrowed, drained);
    }

    #[test]
    fn iteration_yields_payload_before_children() {
        let far = 1 + (1 << HASH_SHIFT);
        let mut node = root(1, "deep");
        put(&mut node, Owner::NONE, far, "deep");
        put(&mut node, Owner::NONE, 2, "shallow");
        let values: Vec<&str> = Iter::new(Some(&*node), 3).map(|(_, v)| *v).collect();
        assert_eq!(vec!["shallow", "deep", "deep"], values);
    }
}
