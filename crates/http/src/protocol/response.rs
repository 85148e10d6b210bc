//! Response model.
//!
//! Status and headers are buffered until the first body write commits them
//! to the wire in one piece. After that the response is dirty: the preamble
//! is gone and can no longer be changed, only body bytes may follow.

use std::io::{self, Read, Write};

use bytes::{BufMut, BytesMut};
use http::StatusCode;

use crate::buffer;
use crate::ensure;
use crate::protocol::error::SendError;

/// A buffered-preamble response over any byte sink.
#[derive(Debug)]
pub struct Response<W: Write> {
    output: W,
    status: StatusCode,
    headers: Vec<(String, String)>,
    /// Set on the first write attempt, successful or not.
    dirty: bool,
}

impl<W: Write> Response<W> {
    /// A clean `200 OK` response with no headers.
    pub fn new(output: W) -> Self {
        Self { output, status: StatusCode::OK, headers: Vec::new(), dirty: false }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether the preamble has been committed to the wire.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replaces the status; fails once the preamble is committed.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), SendError> {
        ensure!(!self.dirty, SendError::AlreadyCommitted);
        self.status = status;
        Ok(())
    }

    /// Appends a header, keeping the order of addition; duplicates are sent
    /// as separate lines. Fails once the preamble is committed.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), SendError> {
        ensure!(!self.dirty, SendError::AlreadyCommitted);
        self.headers.push((name.into(), value.into()));
        Ok(())
    }

    /// Writes body bytes, committing the preamble first when still clean.
    pub fn write(&mut self, body: &[u8]) -> Result<(), SendError> {
        self.commit()?;
        self.output.write_all(body)?;
        Ok(())
    }

    /// Streams `reader` to the body, returning the bytes moved.
    pub fn write_reader<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<u64, SendError> {
        self.commit()?;
        Ok(buffer::pump(reader, &mut self.output)?)
    }

    /// Flushes the response, committing the preamble if nothing was written.
    pub fn finish(&mut self) -> Result<(), SendError> {
        self.commit()?;
        self.output.flush()?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SendError> {
        if self.dirty {
            return Ok(());
        }
        // dirty even when the write fails, the wire state is unknown then
        self.dirty = true;

        let mut preamble = BytesMut::with_capacity(64 + self.headers.len() * 32);
        let reason = self.status.canonical_reason().unwrap_or("Unknown");
        preamble.put_slice(format!("HTTP/1.1 {} {reason}\r\n", self.status.as_u16()).as_bytes());
        for (name, value) in &self.headers {
            preamble.put_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        preamble.put_slice(b"\r\n");

        self.output.write_all(&preamble)?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.output
    }
}

/// Writes a bare `HTTP/1.1 <code> <reason>` preamble with no headers and no
/// body. Used for canned refusals outside any handler.
pub fn write_status_line<W: Write + ?Sized>(out: &mut W, status: StatusCode) -> io::Result<()> {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    write!(out, "HTTP/1.1 {} {reason}\r\n\r\n", status.as_u16())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_is_buffered_until_first_write() {
        let mut response = Response::new(Vec::new());
        response.set_status(StatusCode::CREATED).unwrap();
        response.add_header("Content-Type", "text/plain").unwrap();
        response.add_header("X-One", "1").unwrap();
        assert!(!response.is_dirty());

        response.write(b"made").unwrap();
        response.write(b" it").unwrap();
        response.finish().unwrap();

        let wire = String::from_utf8(response.get_ref().clone()).unwrap();
        assert_eq!(
            wire,
            "HTTP/1.1 201 Created\r\nContent-Type: text/plain\r\nX-One: 1\r\n\r\nmade it"
        );
    }

    #[test]
    fn committed_preamble_rejects_changes() {
        let mut response = Response::new(Vec::new());
        response.write(b"x").unwrap();

        assert!(matches!(
            response.set_status(StatusCode::NOT_FOUND),
            Err(SendError::AlreadyCommitted)
        ));
        assert!(matches!(response.add_header("a", "b"), Err(SendError::AlreadyCommitted)));
    }

    #[test]
    fn finish_alone_sends_the_preamble() {
        let mut response = Response::new(Vec::new());
        response.finish().unwrap();

        assert_eq!(response.get_ref().as_slice(), b"HTTP/1.1 200 OK\r\n\r\n");
        assert!(response.is_dirty());
    }

    #[test]
    fn write_reader_streams_the_body() {
        let mut response = Response::new(Vec::new());
        let moved = response.write_reader(&mut &b"streamed"[..]).unwrap();

        assert_eq!(moved, 8);
        assert!(response.get_ref().ends_with(b"\r\n\r\nstreamed"));
    }

    #[test]
    fn status_line_helper_is_bare() {
        let mut wire = Vec::new();
        write_status_line(&mut wire, StatusCode::SERVICE_UNAVAILABLE).unwrap();

        assert_eq!(wire, b"HTTP/1.1 503 Service Unavailable\r\n\r\n");
    }
}
