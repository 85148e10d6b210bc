use std::error::Error;
use std::net::TcpStream;

use crate::protocol::{Request, Response};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// The execution hook: called once per accepted request on a worker thread.
///
/// The raw stream is the accepted connection itself, handed over for
/// protocol upgrades or socket tuning; normal handlers only touch the
/// request and the response.
pub trait Handler: Send + Sync {
    fn call(
        &self,
        request: &mut Request,
        response: &mut Response<TcpStream>,
        raw: &TcpStream,
    ) -> Result<(), BoxError>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Err> Handler for HandlerFn<F>
where
    F: Fn(&mut Request, &mut Response<TcpStream>, &TcpStream) -> Result<(), Err> + Send + Sync,
    Err: Into<BoxError>,
{
    fn call(
        &self,
        request: &mut Request,
        response: &mut Response<TcpStream>,
        raw: &TcpStream,
    ) -> Result<(), BoxError> {
        (self.f)(request, response, raw).map_err(Into::into)
    }
}

pub fn make_handler<F, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut Request, &mut Response<TcpStream>, &TcpStream) -> Result<(), Err> + Send + Sync,
    Err: Into<BoxError>,
{
    HandlerFn { f }
}
