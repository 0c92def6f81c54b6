//! Webproxy - Forwarding HTTP Proxy
//!
//! A forward proxy that serves a fixed number of client connections on a
//! bounded pool of worker threads.
//!
//! ## Features
//!
//! - Fixed-size worker pool with a FIFO job queue and draining shutdown
//! - GET-only HTTP/1.0 and HTTP/1.1 request validation
//! - Static host blocklist loaded from a file
//! - Streaming relay of origin responses
//! - Fixed HTML error documents for every rejection

pub mod config;
pub mod error;
pub mod pool;
pub mod proxy;

pub use config::{Cli, ProxyConfig};
pub use error::{ProxyError, Result};
pub use pool::WorkerPool;
pub use proxy::{HostFilter, ProxyServer};
