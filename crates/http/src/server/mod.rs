//! The concurrency engine: configuration, worker pool and the server
//! lifecycle.

pub mod config;
pub mod pool;
pub mod server;
pub mod sync;

pub use config::{DenyFn, ServerConfig};
pub use server::HttpServer;
