//! About shared pointers. Re-export the [`archery`] crate.
//!
//! Trie nodes are reference counted through [`SharedPointer`], so that a
//! persistent map and every map derived from it share all the subtrees an
//! update didn't touch.
//!
//! [`archery`]: https://docs.rs/archery/latest/

pub use archery::{ArcK, RcK, SharedPointer, SharedPointerKind};

#[cfg(feature = "triomphe")]
pub use archery::ArcTK;

#[cfg(not(feature = "triomphe"))]
/// Default shared pointer used by [`HashMap`] and [`TransientHashMap`]. This alias points to [`ArcK`] if `triomphe` is disabled, [`ArcTK`] otherwise.
///
/// [`HashMap`]: ../hashmap/type.HashMap.html
/// [`TransientHashMap`]: ../transient/struct.TransientHashMap.html
/// [`ArcK`]: https://docs.rs/archery/latest/archery/shared_pointer/kind/struct.ArcK.html
/// [`ArcTK`]: https://docs.rs/archery/latest/archery/shared_pointer/kind/struct.ArcTK.html
pub type DefaultSharedPtr = ArcK;

#[cfg(feature = "triomphe")]
/// Default shared pointer used by [`HashMap`] and [`TransientHashMap`]. This alias points to [`ArcK`] if `triomphe` is disabled, [`ArcTK`] otherwise.
///
/// [`HashMap`]: ../hashmap/type.HashMap.html
/// [`TransientHashMap`]: ../transient/struct.TransientHashMap.html
/// [`ArcK`]: https://docs.rs/archery/latest/archery/shared_pointer/kind/struct.ArcK.html
/// [`ArcTK`]: https://docs.rs/archery/latest/archery/shared_pointer/kind/struct.ArcTK.html
pub type DefaultSharedPtr = ArcTK;
