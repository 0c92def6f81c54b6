use std::path::PathBuf;

use thiserror::Error;

use crate::proxy::response::ErrorStatus;

/// Unified error type for the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    // Pool errors
    #[error("Invalid worker count {requested} (expected 1..={max})")]
    InvalidPoolSize { requested: usize, max: usize },

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    // Configuration errors
    #[error("Failed to read filter file {path}: {source}")]
    FilterLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Origin errors
    #[error("Could not resolve origin host {host}")]
    OriginResolve { host: String },

    #[error("Failed to create origin socket: {0}")]
    SocketCreate(#[source] std::io::Error),

    #[error("Failed to connect to origin {host}:{port}: {source}")]
    OriginConnect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    /// The error document a client should receive for this error, if any.
    ///
    /// `None` means the connection is closed without a response body, which
    /// is the case for transport failures once relaying has begun.
    pub fn status(&self) -> Option<ErrorStatus> {
        match self {
            // 404 Not Found
            ProxyError::OriginResolve { .. } | ProxyError::OriginConnect { .. } => {
                Some(ErrorStatus::NotFound)
            }

            // 500 Internal Server Error
            ProxyError::SocketCreate(_) => Some(ErrorStatus::InternalServerError),

            ProxyError::Io(_)
            | ProxyError::InvalidPoolSize { .. }
            | ProxyError::WorkerSpawn(_)
            | ProxyError::FilterLoad { .. }
            | ProxyError::InvalidConfig(_) => None,
        }
    }
}
