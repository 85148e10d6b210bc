//! An embeddable blocking nano HTTP/1.1 server
//!
//! This crate provides a tiny HTTP/1.1 server meant to be embedded into a
//! larger application: a handful of threads, one blocking socket per request,
//! and pooled buffers so a steady request load allocates next to nothing.
//! There is no async runtime underneath — the concurrency unit is a worker
//! thread that serves exactly one connection and exits.
//!
//! # Features
//!
//! - Zero-copy preamble parsing: the scanner records byte ranges, decoding
//!   happens lazily per accessed field
//! - Pooled 512-byte buffers shared by all connections
//! - One pre-warmed idle worker so the common dispatch never waits on spawn
//! - Backpressure built in: a full pool triggers the deny hook (or `503`)
//! - `hangup`/`resume` to drain in-flight requests without unbinding
//! - Clean error handling with fallback status responses
//!
//!
//! # Example
//!
//! ```no_run
//! use tracing::{info, Level};
//! use tracing_subscriber::FmtSubscriber;
//! use nano_http::handler::make_handler;
//! use nano_http::protocol::SendError;
//! use nano_http::server::{HttpServer, ServerConfig};
//!
//! fn main() {
//!     // Initialize logging
//!     let subscriber = FmtSubscriber::builder()
//!         .with_max_level(Level::INFO)
//!         .finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     let handler = make_handler(|request, response, _raw| -> Result<(), SendError> {
//!         info!(path = request.path(), "incoming request");
//!         response.add_header("Content-Type", "text/plain")?;
//!         response.write(b"Hello World!\r\n")?;
//!         Ok(())
//!     });
//!
//!     let config = ServerConfig::new()
//!         .with_port(8080)
//!         .with_max_workers(8)
//!         .with_execute(handler);
//!
//!     let server = HttpServer::new();
//!     if let Err(e) = server.start(config) {
//!         tracing::error!(cause = %e, "cannot start the server");
//!         return;
//!     }
//!     info!(addr = %server.local_addr().expect("started"), "serving");
//!
//!     // ... the accept loop runs on its own thread; close() when done
//!     std::thread::park();
//! }
//! ```
//!
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`buffer`]: Pooled chunk storage and the append-only byte stream
//! - [`codec`]: Byte-level preamble scanning into offset ranges
//! - [`protocol`]: Request/response model and error types
//! - [`handler`]: Request handler traits and utilities
//! - [`connection`]: Per-connection worker body
//! - [`server`]: Configuration, worker pool and the server lifecycle
//!
//!
//! # Core Components
//!
//! ## Server Lifecycle
//!
//! [`server::HttpServer`] binds, accepts and dispatches. `start` returns once
//! the accept loop is live; `hangup` pauses dispatch and waits for in-flight
//! requests to drain; `resume` lifts the pause; `close` unbinds. A closed
//! server can be started again with a fresh configuration.
//!
//! ## Request Processing
//!
//! Handlers implement [`handler::Handler`] (usually through
//! [`handler::make_handler`]) and receive the decoded
//! [`protocol::Request`], a [`protocol::Response`] writing straight to the
//! socket, and the raw [`std::net::TcpStream`]. Without a configured handler
//! every request answers `501`.
//!
//! ## Error Handling
//!
//! The crate uses custom error types that implement `std::error::Error`:
//!
//! - [`protocol::ParseError`]: Request parsing errors
//! - [`protocol::SendError`]: Response sending errors
//! - [`protocol::ServerError`]: Lifecycle and capacity errors
//!
//! # Limitations
//!
//! - HTTP/1.1 only, one request per connection (no keep-alive)
//! - No TLS support (use a reverse proxy for HTTPS)
//! - Bodies are length-delimited or raw; no chunked transfer decoding
//! - Default preamble limit: 128 KiB

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
