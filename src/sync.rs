// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub(crate) use self::owner::Owner;

mod owner {
    use std::fmt;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

    /// Identity of the single context allowed to edit a node in place.
    ///
    /// Every transient mints a fresh owner, and stamps it on each node it
    /// creates or copies. Ids are never reused, so a node stamped by a
    /// transient that has since been frozen can never be edited in place
    /// again. [`Owner::NONE`] authorizes nothing.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct Owner(u64);

    impl Owner {
        pub(crate) const NONE: Owner = Owner(0);

        pub(crate) fn mint() -> Self {
            Owner(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
        }

        #[inline]
        pub(crate) fn is_none(self) -> bool {
            self == Self::NONE
        }

        /// Whether a node stamped with `self` may be edited in place by `editor`.
        #[inline]
        pub(crate) fn authorizes(self, editor: Owner) -> bool {
            !editor.is_none() && self == editor
        }
    }

    impl fmt::Debug for Owner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.is_none() {
                write!(f, "Owner(none)")
            } else {
                write!(f, "Owner({})", self.0)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minted_owners_are_distinct() {
        let a = Owner::mint();
        let b = Owner::mint();
        assert_ne!(a, b);
        assert!(!a.is_none());
        assert!(a.authorizes(a));
        assert!(!a.authorizes(b));
    }

    #[test]
    fn none_authorizes_nothing() {
        assert!(!Owner::NONE.authorizes(Owner::NONE));
        assert!(!Owner::mint().authorizes(Owner::NONE));
        assert_eq!("Owner(none)", format!("{:?}", Owner::NONE));
    }
}
