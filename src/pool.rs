// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A chunked arena with an "object builder" on top, modeled on
//! `lib/mm/pool-fast.c`.
//!
//! The C pool hands out raw pointers into growable chunks and exposes
//! `pool_begin_object`/`pool_grow_object`/`pool_end_object` so a caller can
//! accumulate a value of unknown final size (a line of text, a path) a few
//! bytes at a time without reallocating on every append. Here the same
//! shape is built from a `Vec<Vec<u8>>` of chunks plus one in-progress
//! builder buffer; `end_object` commits the builder into its own chunk and
//! hands back a slice borrowed from the pool, so everything built still
//! lives as long as the pool itself.

const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A growable arena used to batch many small, variable-length allocations.
pub struct Pool {
    chunk_size: usize,
    chunks: Vec<Vec<u8>>,
    building: Option<Vec<u8>>,
}

impl Pool {
    /// `chunk_hint` is rounded up to the next power of two, as
    /// `pool_create` does.
    pub fn new(chunk_hint: usize) -> Pool {
        let mut size = DEFAULT_CHUNK_SIZE;
        while size < chunk_hint {
            size <<= 1;
        }
        Pool {
            chunk_size: size,
            chunks: Vec::new(),
            building: None,
        }
    }

    /// Allocate `s` bytes as their own chunk and return a handle to them,
    /// zero-initialized.
    pub fn alloc(&mut self, s: usize) -> PoolRef {
        self.chunks.push(vec![0u8; s]);
        PoolRef {
            chunk: self.chunks.len() - 1,
        }
    }

    pub fn get(&self, r: PoolRef) -> &[u8] {
        &self.chunks[r.chunk]
    }

    pub fn get_mut(&mut self, r: PoolRef) -> &mut [u8] {
        &mut self.chunks[r.chunk]
    }

    /// Start building an object of roughly `hint` bytes. Any object
    /// already in progress is discarded, matching `pool_begin_object`
    /// always starting from a clean slate.
    pub fn begin_object(&mut self, hint: usize) {
        self.building = Some(Vec::with_capacity(hint));
    }

    /// Append more bytes to the object under construction.
    ///
    /// # Panics
    /// Panics if no object is being built; callers must bracket this with
    /// [`begin_object`](Pool::begin_object).
    pub fn grow_object(&mut self, extra: &[u8]) {
        self.building
            .as_mut()
            .expect("grow_object called with no object in progress")
            .extend_from_slice(extra);
    }

    /// Commit the object under construction into its own chunk and return
    /// a reference to it.
    pub fn end_object(&mut self) -> PoolRef {
        let buf = self
            .building
            .take()
            .expect("end_object called with no object in progress");
        self.chunks.push(buf);
        PoolRef {
            chunk: self.chunks.len() - 1,
        }
    }

    /// Discard the object under construction without committing it.
    pub fn abandon_object(&mut self) {
        self.building = None;
    }

    /// Number of chunks committed so far, mostly useful for tests.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// A handle to a chunk previously allocated or built by a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRef {
    chunk: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_rounds_up_to_power_of_two() {
        assert_eq!(Pool::new(0).chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(Pool::new(1025).chunk_size(), 2048);
        assert_eq!(Pool::new(1024).chunk_size(), 1024);
    }

    #[test]
    fn alloc_returns_zeroed_chunk_of_requested_size() {
        let mut pool = Pool::new(0);
        let r = pool.alloc(16);
        assert_eq!(pool.get(r).len(), 16);
        assert!(pool.get(r).iter().all(|&b| b == 0));
    }

    #[test]
    fn object_builder_accumulates_and_commits() {
        let mut pool = Pool::new(0);
        pool.begin_object(4);
        pool.grow_object(b"hel");
        pool.grow_object(b"lo");
        let r = pool.end_object();
        assert_eq!(pool.get(r), b"hello");
        assert_eq!(pool.chunk_count(), 1);
    }

    #[test]
    fn abandoned_object_is_not_committed() {
        let mut pool = Pool::new(0);
        pool.begin_object(4);
        pool.grow_object(b"discard me");
        pool.abandon_object();
        assert_eq!(pool.chunk_count(), 0);
    }

    #[test]
    #[should_panic]
    fn grow_without_begin_panics() {
        let mut pool = Pool::new(0);
        pool.grow_object(b"oops");
    }
}
