// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Every codebase needs a `util` module.

use std::mem;

use archery::{SharedPointer, SharedPointerKind};

pub(crate) fn clone_ref<A, P>(r: SharedPointer<A, P>) -> A
where
    A: Clone,
    P: SharedPointerKind,
{
    SharedPointer::try_unwrap(r).unwrap_or_else(|r| (*r).clone())
}

/// Insert `item` at `index`, reallocating the slice at exactly one more
/// element.
///
/// Elements are moved, never cloned.
pub(crate) fn insert_at<A>(slots: &mut Box<[A]>, index: usize, item: A) {
    let old = mem::take(slots).into_vec();
    assert!(
        index <= old.len(),
        "util::insert_at: index {} out of bounds for length {}",
        index,
        old.len()
    );
    let mut out = Vec::with_capacity(old.len() + 1);
    let mut rest = old.into_iter();
    out.extend(rest.by_ref().take(index));
    out.push(item);
    out.extend(rest);
    *slots = out.into_boxed_slice();
}

/// Remove and return the element at `index`, reallocating the slice at
/// exactly one less element.
pub(crate) fn remove_at<A>(slots: &mut Box<[A]>, index: usize) -> A {
    let old = mem::take(slots).into_vec();
    assert!(
        index < old.len(),
        "util::remove_at: index {} out of bounds for length {}",
        index,
        old.len()
    );
    let mut out = Vec::with_capacity(old.len() - 1);
    let mut removed = None;
    for (i, item) in old.into_iter().enumerate() {
        if i == index {
            removed = Some(item);
        } else {
            out.push(item);
        }
    }
    *slots = out.into_boxed_slice();
    match removed {
        Some(item) => item,
        None => unreachable!(),
    }
}

#[cfg(test)]
macro_rules! assert_covariant {
    ($name:ident<$($gen:tt),*> in $param:ident) => {
        #[allow(dead_code, unused_assignments, unused_variables)]
        const _: () = {
            type Tmp<$param> = $name<$($gen),*>;
            fn assign<'a, 'b: 'a>(src: Tmp<&'b i32>, mut dst: Tmp<&'a i32>) {
                dst = src;
            }
        };
    }
}
