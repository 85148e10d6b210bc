//! Decoded request model.
//!
//! [`Request::materialize`] turns a scanned [`Preamble`] into owned text:
//! method, path, query parameters and headers. The body is not read ahead —
//! it is exposed as a [`Body`] reader that starts with the bytes the scan
//! buffered past the preamble and continues on the connection, capped by
//! `Content-Length` when one is present.

use std::io::{self, Cursor, Read};

use bytes::Bytes;
use percent_encoding::percent_decode;

use crate::codec::Preamble;
use crate::ensure;
use crate::protocol::error::ParseError;
use crate::protocol::fields::{FieldMap, FieldValue};
use crate::protocol::query;

/// Content type whose body doubles as extra request parameters.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A fully decoded request preamble plus the not-yet-read body.
#[derive(Debug)]
pub struct Request {
    method: String,
    path: String,
    params: FieldMap,
    headers: FieldMap,
    body: Option<Body>,
}

impl Request {
    /// Decodes `preamble` into a request, wiring the body to `connection`.
    ///
    /// Any body bytes already buffered by the scan come first, then the
    /// connection itself; `Content-Length`, when present and valid, caps the
    /// total. Requests with method `GET` carry no body at all.
    pub fn materialize<R>(preamble: Preamble, connection: R) -> Result<Self, ParseError>
    where
        R: Read + Send + 'static,
    {
        let method = decode_method(&preamble)?;
        let path = decode_path(&preamble)?;
        let headers = decode_headers(&preamble)?;

        let mut params = FieldMap::new();
        if let Some(span) = preamble.query {
            let raw = preamble.bytes.to_vec(span.begin, span.len())?;
            query::decode_pairs(&raw, &mut params);
        }

        let body = if method == "GET" {
            None
        } else {
            Some(Body::new(&preamble, &headers, connection)?)
        };

        Ok(Self { method, path, params, headers, body })
    }

    /// Uppercase request method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Decoded path: percent-decoded segments joined by single `/`, always
    /// starting with one.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of a query (or merged form) parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.names()
    }

    /// Every value of a parameter, in arrival order.
    pub fn params_of<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.params.all(name)
    }

    /// First value of a header; `name` may be in any case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    /// Lowercase header names in arrival order.
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers.names()
    }

    pub fn headers_of<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.headers.all(&name.to_ascii_lowercase())
    }

    /// The body reader, absent for `GET` and after it was taken.
    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }

    /// Takes the body reader out of the request.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Reads a form-encoded body and merges its pairs into the parameters.
    ///
    /// Does nothing unless `Content-Type` contains
    /// [`FORM_CONTENT_TYPE`] and the body yields at least one pair; returns
    /// whether parameters were added. The body is consumed either way once
    /// the content type matches.
    pub fn decode_body(&mut self) -> Result<bool, ParseError> {
        let form = self
            .headers
            .get("content-type")
            .is_some_and(|ct| ct.contains(FORM_CONTENT_TYPE));
        if !form {
            return Ok(false);
        }
        let Some(mut body) = self.body.take() else {
            return Ok(false);
        };

        let mut raw = Vec::new();
        body.read_to_end(&mut raw)?;

        let mut decoded = FieldMap::new();
        if query::decode_pairs(&raw, &mut decoded) == 0 {
            return Ok(false);
        }

        for (name, value) in decoded {
            match value {
                FieldValue::One(v) => self.params.insert(name, v),
                FieldValue::List(vs) => {
                    for v in vs {
                        self.params.insert(name.clone(), v);
                    }
                }
            }
        }
        Ok(true)
    }
}

/// Request body reader: buffered remainder first, then the connection.
pub struct Body {
    reader: Box<dyn Read + Send>,
}

impl Body {
    fn new<R>(preamble: &Preamble, headers: &FieldMap, connection: R) -> Result<Self, ParseError>
    where
        R: Read + Send + 'static,
    {
        let offset = preamble.body_offset();
        let buffered = preamble.bytes.to_vec(offset, preamble.bytes.len() - offset)?;
        let joined = Cursor::new(Bytes::from(buffered)).chain(connection);

        let reader: Box<dyn Read + Send> = match headers.get("content-length") {
            Some(text) => {
                let length: u64 = text
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ParseError::invalid_content_length(e))?;
                Box::new(joined.take(length))
            }
            None => Box::new(joined),
        };
        Ok(Self { reader })
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}

fn decode_method(preamble: &Preamble) -> Result<String, ParseError> {
    let raw = preamble.bytes.to_vec(preamble.method.begin, preamble.method.len())?;
    ensure!(!raw.is_empty(), ParseError::InvalidMethod);

    let mut method = String::with_capacity(raw.len());
    for &c in &raw {
        ensure!(c.is_ascii_alphabetic(), ParseError::InvalidMethod);
        method.push(c.to_ascii_uppercase() as char);
    }
    Ok(method)
}

/// Splits on `/`, percent-decodes every segment, then joins with single
/// separators. Runs of `/` collapse, a leading one is ensured and a trailing
/// one survives.
fn decode_path(preamble: &Preamble) -> Result<String, ParseError> {
    let raw = preamble.bytes.to_vec(preamble.path.begin, preamble.path.len())?;

    let mut parts: Vec<String> = Vec::with_capacity(8);
    let mut segment: Vec<u8> = Vec::new();

    // the synthetic trailing separator flushes the last segment
    for &c in raw.iter().chain(std::iter::once(&b'/')) {
        if c != b'/' {
            segment.push(c);
            continue;
        }

        if parts.last().map(String::as_str) != Some("/") {
            parts.push("/".to_string());
        }
        if !segment.is_empty() {
            let decoded = percent_decode(&segment)
                .decode_utf8()
                .map_err(|_utf8| ParseError::InvalidEncoding)?;
            parts.push(decoded.into_owned());
            segment.clear();
        }
    }

    if parts.is_empty() {
        return Err(ParseError::InvalidPath);
    }
    Ok(parts.concat())
}

fn decode_headers(preamble: &Preamble) -> Result<FieldMap, ParseError> {
    let mut headers = FieldMap::new();

    for &(name, value) in &preamble.headers {
        if name.is_empty() || value.is_empty() {
            return Err(ParseError::invalid_header("empty header name or value"));
        }

        let raw = preamble.bytes.to_vec(name.begin, name.len())?;
        let mut lower = String::with_capacity(raw.len());
        for &c in &raw {
            let c = c.to_ascii_lowercase();
            if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'-') {
                let ch = c as char;
                return Err(ParseError::invalid_header(format!("character {ch:?} in header name")));
            }
            lower.push(c as char);
        }

        let raw = preamble.bytes.to_vec(value.begin, value.len())?;
        let text = String::from_utf8(raw).map_err(|_utf8| ParseError::InvalidEncoding)?;
        headers.insert(lower, text);
    }
    Ok(headers)
}
