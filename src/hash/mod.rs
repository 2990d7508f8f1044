// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub(crate) mod map;
pub(crate) mod transient;

/// Hash `value` with a fixed, deterministic hasher.
pub(crate) fn checksum<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Combine the checksums of a key and its value into the entry's share
/// of a map's content hash.
///
/// An entry whose key and value hash alike contributes nothing, so maps
/// differing only in such entries share a content hash. Equality still
/// tells them apart.
#[inline]
pub(crate) fn mix(key_sum: u64, value_sum: u64) -> u64 {
    key_sum ^ value_sum
}

/// The contribution of one entry to a map's content hash.
///
/// A map's content hash is the XOR of this over all its entries, so it can
/// be kept up to date one entry at a time. It uses a fixed hasher rather
/// than the map's own, so equal contents give equal hashes across hashers.
pub(crate) fn entry_hash<K, V>(key: &K, value: &V) -> u64
where
    K: Hash + ?Sized,
    V: Hash + ?Sized,
{
    mix(checksum(key), checksum(value))
}
