// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Small data structures shared by the regex engine and the allocator.
//!
//! Most of the original sources' hand-rolled containers (linked lists,
//! hash tables) are better served by `Vec`/`BTreeMap`/`HashMap` here; the
//! one structure worth keeping as its own type is the fixed-size bitset,
//! used both for extent-allocation bitmaps and for regex firstpos/lastpos
//! sets, where a dense bit vector is both the natural representation and
//! noticeably cheaper than a `HashSet<usize>`.

mod bitset;

pub use bitset::BitSet;
