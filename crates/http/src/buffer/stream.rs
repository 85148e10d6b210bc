//! Append-only byte stream backed by pooled chunks.

use std::io::{self, Read, Write};

use crate::buffer::pool::{pool, Chunk, CHUNK_SIZE};

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "chunk stream is closed")
}

/// A growable byte sequence stored as a list of pooled chunks.
///
/// Bytes are only ever appended; any written range can then be visited,
/// copied or read through [`reader`](ChunkStream::reader) without moving the
/// bytes again. Closing the stream returns every chunk to the shared pool and
/// invalidates all further access.
///
/// A close can be deferred: [`defer_close`](ChunkStream::defer_close) turns
/// the next [`close`](ChunkStream::close) into a no-op, and
/// [`defer_next_close`](ChunkStream::defer_next_close) re-arms that latch
/// once more. This lets an owner hand the stream to a consumer that closes
/// unconditionally while keeping the bytes alive for one more round.
#[derive(Debug)]
pub struct ChunkStream {
    /// `None` once closed.
    chunks: Option<Vec<Chunk>>,
    /// Total bytes written.
    length: usize,
    not_close: bool,
    not_close_next: bool,
}

impl Default for ChunkStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStream {
    pub fn new() -> Self {
        Self { chunks: Some(Vec::new()), length: 0, not_close: false, not_close_next: false }
    }

    /// Total bytes written so far.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn is_closed(&self) -> bool {
        self.chunks.is_none()
    }

    /// Makes the next [`close`](ChunkStream::close) a no-op.
    pub fn defer_close(&mut self) {
        self.not_close = true;
    }

    /// Re-arms the close latch after the next deferred close fires.
    pub fn defer_next_close(&mut self) {
        self.not_close_next = true;
    }

    /// Appends bytes, drawing chunks from the shared pool as needed.
    pub fn append(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        let Some(chunks) = self.chunks.as_mut() else {
            return Err(closed_error());
        };

        while !bytes.is_empty() {
            let fill = self.length % CHUNK_SIZE;
            if fill == 0 {
                chunks.push(pool().acquire());
            }
            let last = chunks.len() - 1;
            let tail = &mut chunks[last];

            let take = bytes.len().min(CHUNK_SIZE - fill);
            tail[fill..fill + take].copy_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            self.length += take;
        }
        Ok(())
    }

    /// Drains `reader` to the end of the stream, returning the byte count.
    pub fn append_reader<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<u64> {
        let mut scratch = pool().acquire();
        let mut copied = 0u64;

        let outcome = loop {
            match reader.read(&mut scratch[..]) {
                Ok(0) => break Ok(copied),
                Ok(n) => {
                    if let Err(e) = self.append(&scratch[..n]) {
                        break Err(e);
                    }
                    copied += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };

        pool().release_one(scratch);
        outcome
    }

    /// Visits the written bytes in `[offset, offset + len)` slice by slice.
    ///
    /// The range is clamped to the written length, so overruns are legal and
    /// simply visit less (possibly nothing). The visitor returns `false` to
    /// stop early.
    pub fn each<F>(&self, offset: usize, len: usize, mut visit: F) -> io::Result<()>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let Some(chunks) = self.chunks.as_ref() else {
            return Err(closed_error());
        };

        let mut remaining = len.min(self.length.saturating_sub(offset));
        let mut index = offset / CHUNK_SIZE;
        let mut at = offset % CHUNK_SIZE;

        while remaining > 0 {
            let take = remaining.min(CHUNK_SIZE - at);
            if !visit(&chunks[index][at..at + take]) {
                break;
            }
            remaining -= take;
            index += 1;
            at = 0;
        }
        Ok(())
    }

    /// A [`Read`] view over the written bytes in `[offset, offset + len)`,
    /// clamped like [`each`](ChunkStream::each).
    pub fn reader(&self, offset: usize, len: usize) -> ChunkReader<'_> {
        let end = offset.saturating_add(len).min(self.length);
        ChunkReader { stream: self, position: offset.min(end), end }
    }

    /// Copies the clamped range into `out`, returning the bytes copied.
    pub fn copy_to<W: Write + ?Sized>(
        &self,
        out: &mut W,
        offset: usize,
        len: usize,
    ) -> io::Result<usize> {
        let mut failure = None;
        let mut copied = 0;
        self.each(offset, len, |slice| match out.write_all(slice) {
            Ok(()) => {
                copied += slice.len();
                true
            }
            Err(e) => {
                failure = Some(e);
                false
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(copied),
        }
    }

    /// The clamped range as a freshly allocated vector.
    pub fn to_vec(&self, offset: usize, len: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(self.length.saturating_sub(offset)));
        self.each(offset, len, |slice| {
            out.extend_from_slice(slice);
            true
        })?;
        Ok(out)
    }

    /// Discards all written bytes, returning the chunks to the pool.
    /// The stream stays open and writable.
    pub fn erase(&mut self) {
        if let Some(chunks) = self.chunks.as_mut() {
            pool().release(chunks.drain(..));
            self.length = 0;
        }
    }

    /// Closes the stream unless a deferred-close latch absorbs this call.
    pub fn close(&mut self) {
        if self.not_close {
            self.not_close = self.not_close_next;
            self.not_close_next = false;
            return;
        }
        self.close_always();
    }

    /// Closes the stream regardless of latches.
    pub fn close_always(&mut self) {
        if let Some(chunks) = self.chunks.take() {
            pool().release(chunks);
        }
    }
}

impl Write for ChunkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.close_always();
    }
}

/// Borrowed [`Read`] view over a range of a [`ChunkStream`].
#[derive(Debug)]
pub struct ChunkReader<'a> {
    stream: &'a ChunkStream,
    position: usize,
    end: usize,
}

impl Read for ChunkReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunks) = self.stream.chunks.as_ref() else {
            return Err(closed_error());
        };
        if self.position >= self.end || buf.is_empty() {
            return Ok(0);
        }

        let at = self.position % CHUNK_SIZE;
        let take = buf.len().min(CHUNK_SIZE - at).min(self.end - self.position);
        let chunk = &chunks[self.position / CHUNK_SIZE];
        buf[..take].copy_from_slice(&chunk[at..at + take]);
        self.position += take;
        Ok(take)
    }
}
