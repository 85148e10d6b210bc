use std::io;
use thiserror::Error;

/// Failures while reading or decoding a request preamble.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("preamble ended before the blank line")]
    InvalidPreamble,

    #[error("preamble exceeds the limit {limit}")]
    PreambleTooLarge { limit: usize },

    #[error("invalid request line at section {section}")]
    InvalidRequestLine { section: usize },

    #[error("invalid header at line {line}")]
    InvalidHeaderLine { line: usize },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid request path")]
    InvalidPath,

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("malformed percent-encoded or non-utf8 text")]
    InvalidEncoding,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn preamble_too_large(limit: usize) -> Self {
        Self::PreambleTooLarge { limit }
    }

    pub fn invalid_request_line(section: usize) -> Self {
        Self::InvalidRequestLine { section }
    }

    pub fn invalid_header_line(line: usize) -> Self {
        Self::InvalidHeaderLine { line }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Whether the connection is beyond salvage (no error response is owed).
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Failures while sending a response.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("response preamble already committed")]
    AlreadyCommitted,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Failures of the server lifecycle and of task placement.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot bind listener: {source}")]
    Bind {
        #[source]
        source: io::Error,
    },

    #[error("all worker slots are busy")]
    Exhausted,

    #[error("server is paused")]
    Paused,

    #[error("server is already started")]
    AlreadyStarted,

    #[error("server is not started")]
    NotStarted,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ServerError {
    pub fn bind(source: io::Error) -> Self {
        Self::Bind { source }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
