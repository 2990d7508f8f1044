// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Compact persistent hash maps
//!
//! This crate provides a persistent hash map built on a compressed hash
//! array mapped trie (CHAMP), and a transient companion for cheap bulk
//! edits.
//!
//! ## Persistent maps
//!
//! A [`HashMap`] never changes once built. Every write returns a new map,
//! and the new map shares with the old one every subtree the write didn't
//! touch, so keeping old versions around is cheap and cloning a map is
//! O(1).
//!
//! Each trie node stores its inline entries and its child pointers in two
//! slices sized exactly to what the node holds, indexed through a pair of
//! bitmaps. Deleting an entry collapses chains of single-entry nodes back
//! into their parents, so a map's shape depends only on its contents and
//! never on the order of the writes that built it.
//!
//! ```
//! # #[macro_use] extern crate compact_hamt;
//! # use compact_hamt::HashMap;
//! # fn main() {
//! let map = hashmap! {1 => "one", 2 => "two"};
//! let bigger = map.update(3, "three");
//! assert_eq!(2, map.len());
//! assert_eq!(3, bigger.len());
//! assert_eq!(Some(&"three"), bigger.get(&3));
//! # }
//! ```
//!
//! ## Transient maps
//!
//! A [`TransientHashMap`] edits nodes it has created or copied in place,
//! instead of copying them again on every write. Bulk builds like
//! [`GenericHashMap::update_all`], [`FromIterator`][std::iter::FromIterator]
//! and [`GenericHashMap::from_alternating`] use one internally.
//! [`TransientHashMap::freeze`] turns it back into a persistent map in
//! O(1), after which every write to the transient fails with
//! [`Error::Frozen`].
//!
//! ```
//! # use compact_hamt::HashMap;
//! let map: HashMap<i32, i32> = (0..1000).map(|i| (i, i)).collect();
//! let mut transient = map.transient();
//! transient.retain(|k, _| k % 2 == 0).unwrap();
//! let evens = transient.freeze().unwrap();
//! assert_eq!(500, evens.len());
//! assert_eq!(1000, map.len());
//! ```
//!
//! ## Hashing
//!
//! Trie digits are taken from the low 32 bits of the map's
//! [`BuildHasher`][std::hash::BuildHasher], which defaults to
//! [`RandomState`][std::collections::hash_map::RandomState]. Separately,
//! each map keeps a content hash that doesn't depend on its hasher, so
//! [`Hash`][std::hash::Hash] on a map is O(1) and maps with different
//! contents usually compare unequal without a traversal.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! | ------- | ----------- |
//! | [`serde`](https://crates.io/crates/serde) | [`Serialize`](https://docs.rs/serde/latest/serde/trait.Serialize.html) and [`Deserialize`](https://docs.rs/serde/latest/serde/trait.Deserialize.html) implementations |
//! | [`proptest`](https://crates.io/crates/proptest) | A [`hash_map`](proptest/fn.hash_map.html) strategy |
//! | [`quickcheck`](https://crates.io/crates/quickcheck) | [`quickcheck::Arbitrary`](https://docs.rs/quickcheck/latest/quickcheck/trait.Arbitrary.html) implementation |
//! | [`arbitrary`](https://crates.io/crates/arbitrary/) | [`arbitrary::Arbitrary`](https://docs.rs/arbitrary/latest/arbitrary/trait.Arbitrary.html) implementation |
//! | [`triomphe`](https://crates.io/crates/triomphe/) | Use [`triomphe::Arc`](https://docs.rs/triomphe/latest/triomphe/struct.Arc.html) as the default shared pointer |
//! | `small-chunks` | Two hash bits per trie level instead of five, to exercise deep tries in tests |
//! | `debug` | Check the trie's invariants after every write. Slow. |

#![forbid(rust_2018_idioms)]
#![deny(unsafe_code, nonstandard_style)]
#![warn(unreachable_pub, missing_docs)]

#[macro_use]
mod util;

mod config;
mod error;
mod hash;
mod nodes;
mod sync;

pub mod shared_ptr;

#[cfg(any(test, feature = "proptest"))]
pub mod proptest;

#[cfg(feature = "serde")]
#[doc(hidden)]
pub mod ser;

#[cfg(feature = "arbitrary")]
#[doc(hidden)]
pub mod arbitrary;

#[cfg(feature = "quickcheck")]
#[doc(hidden)]
pub mod quickcheck;

/// The persistent hash map and its iterators.
pub mod hashmap {
    pub use crate::hash::map::*;
}

/// The transient hash map and its cursor.
pub mod transient {
    pub use crate::hash::transient::*;
}

pub use crate::error::{Error, Result};
pub use crate::hashmap::{GenericHashMap, HashMap};
pub use crate::transient::TransientHashMap;
