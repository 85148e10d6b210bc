//! Server settings.

use std::fmt;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::DEFAULT_PREAMBLE_LIMIT;
use crate::handler::Handler;
use crate::protocol::error::ServerError;

/// Capacity-exhaustion hook: called with the raw connection and the placement
/// error instead of a parsed request, so refusing costs nothing.
pub type DenyFn = dyn Fn(&TcpStream, &ServerError) + Send + Sync;

/// Server configuration, frozen once the server starts (start consumes it).
pub struct ServerConfig {
    address: String,
    port: u16,
    /// Listen backlog; 0 means the default.
    backlog: u32,
    so_timeout: Option<Duration>,
    preamble_limit: usize,
    max_workers: usize,
    thread_prefix: String,
    execute: Option<Arc<dyn Handler>>,
    deny: Option<Arc<DenyFn>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            backlog: 0,
            so_timeout: None,
            preamble_limit: DEFAULT_PREAMBLE_LIMIT,
            max_workers: 4,
            thread_prefix: "nano-http-".to_string(),
            execute: None,
            deny: None,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Port 0 asks the system for a free one; see
    /// [`HttpServer::local_addr`](crate::server::HttpServer::local_addr).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Per-connection read timeout applied to worker sockets.
    pub fn with_so_timeout(mut self, timeout: Duration) -> Self {
        self.so_timeout = Some(timeout);
        self
    }

    pub fn with_preamble_limit(mut self, limit: usize) -> Self {
        self.preamble_limit = limit;
        self
    }

    /// Upper bound of concurrently live worker threads, pre-warmed idle slot
    /// included.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_prefix = prefix.into();
        self
    }

    /// The execution hook. Without one every request gets `501`.
    pub fn with_execute(mut self, handler: impl Handler + 'static) -> Self {
        self.execute = Some(Arc::new(handler));
        self
    }

    /// The deny hook. Without one refused connections get a bare `503`.
    pub fn with_deny<F>(mut self, deny: F) -> Self
    where
        F: Fn(&TcpStream, &ServerError) + Send + Sync + 'static,
    {
        self.deny = Some(Arc::new(deny));
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    pub fn so_timeout(&self) -> Option<Duration> {
        self.so_timeout
    }

    pub fn preamble_limit(&self) -> usize {
        self.preamble_limit
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn thread_prefix(&self) -> &str {
        &self.thread_prefix
    }

    pub fn execute(&self) -> Option<&Arc<dyn Handler>> {
        self.execute.as_ref()
    }

    pub fn deny(&self) -> Option<&Arc<DenyFn>> {
        self.deny.as_ref()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("backlog", &self.backlog)
            .field("so_timeout", &self.so_timeout)
            .field("preamble_limit", &self.preamble_limit)
            .field("max_workers", &self.max_workers)
            .field("thread_prefix", &self.thread_prefix)
            .field("execute", &self.execute.is_some())
            .field("deny", &self.deny.is_some())
            .finish()
    }
}
