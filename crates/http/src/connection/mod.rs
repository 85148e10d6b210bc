//! Per-connection worker body.

use std::net::TcpStream;
use std::panic::{catch_unwind, AssertUnwindSafe};

use http::StatusCode;
use tracing::{debug, error};

use crate::codec::Preamble;
use crate::protocol::error::ParseError;
use crate::protocol::response::{self, Response};
use crate::protocol::Request;
use crate::server::config::ServerConfig;

/// Handles one accepted connection: parse, hook, fallback statuses.
///
/// Never panics and never returns an error — every failure either maps to a
/// canned status or is logged and swallowed, so one bad connection cannot
/// take anything else down. The caller closes the stream afterwards.
pub fn process(stream: &TcpStream, config: &ServerConfig) {
    if let Some(timeout) = config.so_timeout() {
        if let Err(e) = stream.set_read_timeout(Some(timeout)) {
            debug!(error = %e, "cannot set the read timeout");
        }
    }

    let Some(handler) = config.execute() else {
        respond_status(stream, StatusCode::NOT_IMPLEMENTED);
        return;
    };

    let preamble = match Preamble::read_from(&mut (&*stream), config.preamble_limit()) {
        Ok(preamble) => preamble,
        Err(e) if e.is_disconnect() => {
            debug!(error = %e, "connection dropped while reading the preamble");
            return;
        }
        Err(e @ ParseError::PreambleTooLarge { .. }) => {
            debug!(error = %e, "preamble over the limit");
            respond_status(stream, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
            return;
        }
        Err(e) => {
            debug!(error = %e, "malformed preamble");
            respond_status(stream, StatusCode::BAD_REQUEST);
            return;
        }
    };

    let (body_input, output) = match (stream.try_clone(), stream.try_clone()) {
        (Ok(input), Ok(output)) => (input, output),
        (Err(e), _) | (_, Err(e)) => {
            debug!(error = %e, "cannot clone the connection stream");
            return;
        }
    };

    let mut request = match Request::materialize(preamble, body_input) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "request decode failed");
            respond_status(stream, StatusCode::BAD_REQUEST);
            return;
        }
    };
    let mut response = Response::new(output);

    let outcome =
        catch_unwind(AssertUnwindSafe(|| handler.call(&mut request, &mut response, stream)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "handler failed");
            if !response.is_dirty() {
                respond_status(stream, StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
        Err(_panic) => {
            error!("handler panicked");
            if !response.is_dirty() {
                respond_status(stream, StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }
}

/// Best-effort canned status line; write failures are dropped.
fn respond_status(stream: &TcpStream, status: StatusCode) {
    if let Err(e) = response::write_status_line(&mut (&*stream), status) {
        debug!(error = %e, status = status.as_u16(), "cannot write the status line");
    }
}
