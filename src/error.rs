// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors reported by the map facades.

use thiserror::Error;

/// Contract violations a caller can trigger through the public API.
///
/// None of these are retryable: each one means the call itself was wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A flat key/value sequence had an odd number of elements.
    #[error("expected alternating keys and values, got an odd number of elements ({0})")]
    OddKeyValueCount(usize),
    /// A transient map was used after it was frozen.
    #[error("transient map has already been frozen")]
    Frozen,
    /// An iterator was asked for an element past its end.
    #[error("iterator is exhausted")]
    Exhausted,
    /// `remove_current` was called with no current entry to remove.
    #[error("cursor has no current entry")]
    NoCurrentEntry,
}

/// A `Result` carrying this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
