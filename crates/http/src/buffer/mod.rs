//! Pooled byte storage.
//!
//! [`pool`] hands out fixed 512-byte [`Chunk`]s that [`ChunkStream`] strings
//! together into an append-only sequence with zero-copy range access. The
//! preamble parser and request bodies are built on top of these pieces.

pub mod pool;
pub mod stream;

use std::io::{self, Read, Write};

pub use pool::{pool, Chunk, ChunkPool, CHUNK_SIZE};
pub use stream::{ChunkReader, ChunkStream};

/// Copies `reader` to `writer` until EOF through a pooled scratch chunk,
/// returning the number of bytes moved.
pub fn pump<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut scratch = pool().acquire();
    let mut moved = 0u64;

    let outcome = loop {
        match reader.read(&mut scratch[..]) {
            Ok(0) => break Ok(moved),
            Ok(n) => match writer.write_all(&scratch[..n]) {
                Ok(()) => moved += n as u64,
                Err(e) => break Err(e),
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => break Err(e),
        }
    };

    pool().release_one(scratch);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_moves_everything() {
        let source: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
        let mut sink = Vec::new();

        let moved = pump(&mut &source[..], &mut sink).unwrap();
        assert_eq!(moved, 3000);
        assert_eq!(sink, source);
    }
}
