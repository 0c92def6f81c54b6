//! Forward proxy implementation
//!
//! This module provides the per-connection pipeline:
//! - Request parsing and validation
//! - Host blocklist enforcement
//! - Error documents for rejected requests
//! - Forwarding to the origin and relaying its response
//! - The bounded accept loop feeding the worker pool

pub mod filter;
pub mod forward;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use filter::HostFilter;
pub use forward::{Forwarder, ForwarderConfig};
pub use handler::{ConnectionHandler, ConnectionHandlerConfig, ConnectionOutcome};
pub use request::{parse_request, ForwardRequest, ParsedRequest, Rejection};
pub use response::ErrorStatus;
pub use server::{ProxyServer, ServeSummary};
