//! Preamble parser.
//!
//! Three linked passes over the connection bytes:
//!
//! 1. [`BlankLineScan`] pulls bytes from the socket into a [`ChunkStream`]
//!    until it sees the blank line that ends the preamble;
//! 2. [`RequestLineScan`] splits the first line into method, path, optional
//!    query and protocol;
//! 3. [`HeaderScan`] splits the remaining lines into header name/value pairs.
//!
//! All three record positions only. Nothing is copied or decoded here; the
//! results are [`Span`]s into the buffered bytes, and any bytes read past the
//! blank line stay in the buffer as the beginning of the body.

use std::io::Read;

use tracing::trace;

use crate::buffer::{pool, ChunkStream};
use crate::codec::Span;
use crate::protocol::error::ParseError;

/// Default upper bound on the preamble size: 128 KiB.
///
/// The scan may overrun the bound by less than one chunk before it gives up.
pub const DEFAULT_PREAMBLE_LIMIT: usize = 128 * 1024;

/// A scanned request preamble: the buffered bytes plus spans locating the
/// request-line parts and the header lines within them.
#[derive(Debug)]
pub struct Preamble {
    /// Every byte read from the connection, preamble first, then possibly
    /// the start of the body.
    pub(crate) bytes: ChunkStream,
    /// The whole preamble including its terminating blank line.
    pub(crate) whole: Span,
    /// The request line, line break excluded.
    pub(crate) first: Span,
    pub(crate) method: Span,
    pub(crate) path: Span,
    /// Query text between `?` and the following space, absent when the
    /// request line carries no `?`.
    pub(crate) query: Option<Span>,
    pub(crate) protocol: Span,
    /// Name/value span pairs, one per header line. Names exclude the `:`,
    /// values exclude leading spaces and the line break.
    pub(crate) headers: Vec<(Span, Span)>,
}

impl Preamble {
    /// Reads one preamble off `input`, buffering every byte it consumes.
    ///
    /// Stops with [`ParseError::PreambleTooLarge`] once more than `limit`
    /// bytes arrive without a blank line, and with
    /// [`ParseError::InvalidPreamble`] when the input ends first or the line
    /// structure is broken.
    pub fn read_from<R: Read + ?Sized>(input: &mut R, limit: usize) -> Result<Self, ParseError> {
        let mut bytes = ChunkStream::new();
        let whole = scan(input, &mut bytes, limit)?;

        let mut request_line = RequestLineScan::new();
        bytes.each(0, whole.end, |slice| request_line.feed(slice))?;
        let (first, method, path, query, protocol) = request_line.finish()?;

        let mut header_lines = HeaderScan::new(first.end);
        bytes.each(first.end, whole.end - first.end, |slice| header_lines.feed(slice))?;
        let headers = header_lines.finish()?;

        trace!(
            preamble = whole.end,
            buffered = bytes.len(),
            headers = headers.len(),
            "preamble scanned"
        );
        Ok(Self { bytes, whole, first, method, path, query, protocol, headers })
    }

    /// The whole preamble span; bytes buffered past its end belong to the
    /// body.
    pub fn whole(&self) -> Span {
        self.whole
    }

    /// Offset of the first body byte.
    pub fn body_offset(&self) -> usize {
        self.whole.end
    }
}

/// Pass 1: find the blank line.
///
/// `\r\n\r\n` and `\n\n` both terminate; a bare `\r` not followed by `\n`
/// and a `\r\n` directly followed by a stray `\n` are malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlankLineScan {
    Plain,
    Cr,
    Lf,
    CrLf,
    CrLfCr,
}

impl BlankLineScan {
    /// Advances over `buf`; `Ok(Some(n))` reports the preamble ending `n`
    /// bytes into this buffer.
    fn feed(&mut self, buf: &[u8]) -> Result<Option<usize>, ParseError> {
        use BlankLineScan::{Cr, CrLf, CrLfCr, Lf, Plain};

        for (i, &c) in buf.iter().enumerate() {
            *self = match (*self, c) {
                (Plain, b'\r') => Cr,
                (CrLf, b'\r') => CrLfCr,
                (Plain, b'\n') => Lf,
                (Cr, b'\n') => CrLf,
                (Lf | CrLfCr, b'\n') => return Ok(Some(i + 1)),
                (_, b'\r' | b'\n') | (Cr | CrLfCr, _) => return Err(ParseError::InvalidPreamble),
                (_, _) => Plain,
            };
        }
        Ok(None)
    }
}

fn scan<R: Read + ?Sized>(
    input: &mut R,
    bytes: &mut ChunkStream,
    limit: usize,
) -> Result<Span, ParseError> {
    let mut scratch = pool().acquire();
    let mut state = BlankLineScan::Plain;
    let mut budget = limit;
    let mut offset = 0;

    let outcome = loop {
        if budget == 0 {
            break Err(ParseError::preamble_too_large(limit));
        }

        let read = match input.read(&mut scratch[..]) {
            Ok(0) => break Err(ParseError::InvalidPreamble),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(e.into()),
        };
        if let Err(e) = bytes.append(&scratch[..read]) {
            break Err(e.into());
        }
        budget = budget.saturating_sub(read);

        match state.feed(&scratch[..read]) {
            Ok(Some(past)) => break Ok(Span::new(0, offset + past)),
            Ok(None) => offset += read,
            Err(e) => break Err(e),
        }
    };

    pool().release_one(scratch);
    outcome
}

/// Pass 2: split the request line.
///
/// Sections are numbered the way they appear: 1 method, 2 path, 3 query,
/// 4 protocol. Spaces separate sections (runs of them are fine); the first
/// `?` inside the path starts the query.
#[derive(Debug)]
struct RequestLineScan {
    offset: usize,
    begin: usize,
    section: usize,
    in_section: bool,
    method: Option<Span>,
    path: Option<Span>,
    query: Option<Span>,
    protocol: Option<Span>,
    first: Option<Span>,
}

impl RequestLineScan {
    fn new() -> Self {
        Self {
            offset: 0,
            begin: 0,
            section: 1,
            in_section: false,
            method: None,
            path: None,
            query: None,
            protocol: None,
            first: None,
        }
    }

    /// Visitor for [`ChunkStream::each`]; `false` stops the visit.
    fn feed(&mut self, buf: &[u8]) -> bool {
        for (i, &c) in buf.iter().enumerate() {
            let at = self.offset + i;
            match c {
                b' ' => {
                    if !self.in_section {
                        continue;
                    }
                    if self.section != 4 {
                        self.in_section = false;
                    }
                    match self.section {
                        1 => {
                            self.section = 2;
                            self.method = Some(Span::new(self.begin, at));
                        }
                        2 => {
                            self.section = 4;
                            self.path = Some(Span::new(self.begin, at));
                        }
                        3 => {
                            self.section = 4;
                            self.query = Some(Span::new(self.begin, at));
                        }
                        _ => {}
                    }
                }

                b'?' => {
                    if self.section != 2 {
                        return false;
                    }
                    self.path = Some(Span::new(self.begin, at));
                    self.section = 3;
                    self.begin = at + 1;
                }

                b'\r' | b'\n' => {
                    if self.section == 4 {
                        self.protocol = Some(Span::new(self.begin, at));
                        self.first = Some(Span::new(0, at));
                        self.section = 5;
                    }
                    return false;
                }

                _ => {
                    if !self.in_section {
                        self.begin = at;
                        self.in_section = true;
                    }
                }
            }
        }
        self.offset += buf.len();
        true
    }

    #[allow(clippy::type_complexity, reason = "one-shot internal tuple")]
    fn finish(self) -> Result<(Span, Span, Span, Option<Span>, Span), ParseError> {
        match (self.first, self.method, self.path, self.protocol) {
            (Some(first), Some(method), Some(path), Some(protocol)) => {
                Ok((first, method, path, self.query, protocol))
            }
            _ => Err(ParseError::invalid_request_line(self.section)),
        }
    }
}

/// Pass 3 states. A header line is `name ':' [spaces] value line-break`;
/// the machine records the name span at the `:` and the value span at the
/// line break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    /// Before the first line break (still on the request line's tail).
    Plain,
    /// Saw `\r` while `Plain`.
    Cr,
    /// Inside a header name.
    Name,
    /// Inside a header value.
    Value,
    /// Saw `\r` after a value.
    ValueCr,
    /// At the start of a line.
    LineOpen,
    /// After `:`, before the value starts.
    ValueOpen,
    /// Saw `\r` on an empty line.
    EndCr,
    /// Blank line reached.
    Done,
}

/// Pass 3: split header lines into name/value span pairs.
#[derive(Debug)]
struct HeaderScan {
    offset: usize,
    begin: usize,
    state: HeaderState,
    pairs: Vec<Span>,
}

impl HeaderScan {
    fn new(start: usize) -> Self {
        Self { offset: start, begin: start, state: HeaderState::Plain, pairs: Vec::new() }
    }

    /// Visitor for [`ChunkStream::each`]; `false` stops the visit.
    fn feed(&mut self, buf: &[u8]) -> bool {
        use HeaderState::{Cr, Done, EndCr, LineOpen, Name, Plain, Value, ValueCr, ValueOpen};

        for (i, &c) in buf.iter().enumerate() {
            let at = self.offset + i;
            match c {
                b'\r' => {
                    self.state = match self.state {
                        Plain => Cr,
                        Value => ValueCr,
                        LineOpen => EndCr,
                        _ => return false,
                    };
                }

                b'\n' => match self.state {
                    Plain | Cr => self.state = LineOpen,
                    Value | ValueCr => {
                        let trim = usize::from(self.state == ValueCr);
                        self.pairs.push(Span::new(self.begin, at - trim));
                        self.state = LineOpen;
                    }
                    LineOpen | EndCr => {
                        self.state = Done;
                        return false;
                    }
                    _ => return false,
                },

                b':' if self.state == Name => {
                    self.pairs.push(Span::new(self.begin, at));
                    self.state = ValueOpen;
                    self.begin = at + 1;
                }
                // inside a value `:` is plain content, anywhere else it is
                // misplaced
                b':' if self.state != Value => return false,

                // leading spaces of a value are skipped
                b' ' if self.state == ValueOpen => {}

                _ => match self.state {
                    LineOpen => {
                        self.begin = at;
                        self.state = Name;
                    }
                    ValueOpen => {
                        self.begin = at;
                        self.state = Value;
                    }
                    _ => {}
                },
            }
        }
        self.offset += buf.len();
        true
    }

    /// 1-based index of the header line being scanned.
    fn line(&self) -> usize {
        self.pairs.len() / 2 + 1
    }

    fn finish(self) -> Result<Vec<(Span, Span)>, ParseError> {
        if self.state != HeaderState::Done || self.pairs.len() % 2 != 0 {
            return Err(ParseError::invalid_header_line(self.line()));
        }

        let mut headers = Vec::with_capacity(self.pairs.len() / 2);
        let mut pairs = self.pairs.into_iter();
        while let (Some(name), Some(value)) = (pairs.next(), pairs.next()) {
            headers.push((name, value));
        }
        Ok(headers)
    }
}
