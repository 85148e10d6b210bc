//! Process-wide cache of fixed-size byte chunks.
//!
//! Every [`ChunkStream`](super::ChunkStream) in the process draws its backing
//! storage from one shared pool, so a server handling a steady stream of small
//! requests allocates almost nothing per request once warmed up.
//!
//! The cache is strictly an optimization: it may be empty (or reclaimed) at
//! any moment, and callers must never depend on getting a previously released
//! chunk back. A chunk handed out is exclusively owned until released.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use once_cell::sync::Lazy;

/// Size in bytes of every pooled chunk.
pub const CHUNK_SIZE: usize = 512;

/// Upper bound of chunks the shared cache retains (128 KiB total).
const MAX_POOLED: usize = 256;

/// A fixed-size byte chunk owned by exactly one consumer at a time.
///
/// Chunks are only minted by a [`ChunkPool`], which guarantees that every
/// chunk released back has exactly [`CHUNK_SIZE`] bytes.
pub struct Chunk(Box<[u8; CHUNK_SIZE]>);

impl Chunk {
    fn allocate() -> Self {
        Chunk(Box::new([0u8; CHUNK_SIZE]))
    }
}

impl Deref for Chunk {
    type Target = [u8; CHUNK_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Chunk {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Chunk").field(&CHUNK_SIZE).finish()
    }
}

/// Thread-shared cache of [`Chunk`]s.
///
/// `acquire` serves from the cache when possible and allocates otherwise.
/// `release` returns chunks to the cache; if the cache was reclaimed in the
/// meantime, the released chunks seed a fresh one, so no release is ever
/// lost — but retention is still bounded and may be dropped under memory
/// pressure via [`reclaim`](ChunkPool::reclaim).
///
/// Reuse order is unspecified and chunk contents are not cleared between
/// consumers.
#[derive(Debug)]
pub struct ChunkPool {
    cache: Mutex<Option<Vec<Chunk>>>,
    capacity: usize,
}

impl ChunkPool {
    pub fn new(capacity: usize) -> Self {
        Self { cache: Mutex::new(Some(Vec::new())), capacity }
    }

    /// Returns a chunk from the cache, or a freshly allocated one.
    pub fn acquire(&self) -> Chunk {
        let mut cache = self.cache.lock().expect("chunk pool poisoned");

        match cache.as_mut().and_then(Vec::pop) {
            Some(chunk) => chunk,
            None => Chunk::allocate(),
        }
    }

    /// Returns chunks to the cache.
    ///
    /// A reclaimed cache is recreated and seeded with the released chunks;
    /// chunks beyond the retention bound are dropped.
    pub fn release(&self, chunks: impl IntoIterator<Item = Chunk>) {
        let mut cache = self.cache.lock().expect("chunk pool poisoned");
        let cache = cache.get_or_insert_with(Vec::new);

        for chunk in chunks {
            if cache.len() < self.capacity {
                cache.push(chunk);
            }
        }
    }

    pub fn release_one(&self, chunk: Chunk) {
        self.release(std::iter::once(chunk));
    }

    /// Drops the whole cache. Subsequent releases seed a fresh one.
    pub fn reclaim(&self) {
        let mut cache = self.cache.lock().expect("chunk pool poisoned");
        *cache = None;
    }

    /// Number of chunks currently cached.
    pub fn pooled(&self) -> usize {
        let cache = self.cache.lock().expect("chunk pool poisoned");
        cache.as_ref().map_or(0, Vec::len)
    }
}

static POOL: Lazy<ChunkPool> = Lazy::new(|| ChunkPool::new(MAX_POOLED));

/// The process-wide chunk pool shared by all streams and connections.
pub fn pool() -> &'static ChunkPool {
    &POOL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_round_trip() {
        let pool = ChunkPool::new(8);

        let mut chunk = pool.acquire();
        chunk[0] = 42;
        assert_eq!(pool.pooled(), 0);

        pool.release_one(chunk);
        assert_eq!(pool.pooled(), 1);

        // contents of a reused chunk are unspecified, only its size is
        let chunk = pool.acquire();
        assert_eq!(chunk.len(), CHUNK_SIZE);
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn release_after_reclaim_seeds_new_cache() {
        let pool = ChunkPool::new(8);
        let a = pool.acquire();
        let b = pool.acquire();

        pool.reclaim();
        assert_eq!(pool.pooled(), 0);

        pool.release([a, b]);
        assert_eq!(pool.pooled(), 2);
    }

    #[test]
    fn retention_is_bounded() {
        let pool = ChunkPool::new(2);
        let chunks: Vec<Chunk> = (0..4).map(|_| pool.acquire()).collect();

        pool.release(chunks);
        assert_eq!(pool.pooled(), 2);
    }
}
