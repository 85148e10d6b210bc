//! Byte-level decoding of the request preamble.
//!
//! Decoding happens in place: the parser records *where* things are as
//! [`Span`]s over the buffered bytes and leaves all text decoding to the
//! request model.

pub mod preamble;

pub use preamble::{Preamble, DEFAULT_PREAMBLE_LIMIT};

/// Half-open byte range `[begin, end)` over the preamble buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Begin offset, inclusive.
    pub begin: usize,
    /// End offset, exclusive.
    pub end: usize,
}

impl Span {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}
