//! Bounded accept loop
//!
//! Accepts a fixed number of client connections and hands each one to the
//! worker pool, then drains the pool and returns.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::pool::WorkerPool;
use crate::proxy::filter::HostFilter;
use crate::proxy::forward::{Forwarder, ForwarderConfig};
use crate::proxy::handler::{ConnectionHandler, ConnectionHandlerConfig};

/// Counters reported when the accept loop finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Connections handed to the pool
    pub accepted: usize,
    /// Accept attempts that failed (each still consumed a slot)
    pub failed_accepts: usize,
}

/// Forward proxy server
pub struct ProxyServer {
    listener: TcpListener,
    pool: WorkerPool,
    handler: Arc<ConnectionHandler>,
    max_requests: usize,
}

impl ProxyServer {
    /// Bind the listening socket, then start the worker pool.
    pub fn bind(config: &ProxyConfig, filter: Arc<HostFilter>) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))?;
        info!("Proxy server listening on {}", listener.local_addr()?);

        let pool = WorkerPool::new(config.pool_size)?;

        let forwarder = Forwarder::new(ForwarderConfig {
            connect_timeout: config.connect_timeout,
        });
        let handler = Arc::new(ConnectionHandler::new(
            filter,
            forwarder,
            ConnectionHandlerConfig {
                client_timeout: config.client_timeout,
            },
        ));

        Ok(Self {
            listener,
            pool,
            handler,
            max_requests: config.max_requests,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept `max_requests` connections, dispatch them, and wait for every
    /// dispatched connection to finish.
    #[instrument(skip(self), fields(max_requests = self.max_requests))]
    pub fn run(self) -> ServeSummary {
        let mut summary = ServeSummary::default();

        for seq in 0..self.max_requests {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(seq, %peer, "Accepted connection");
                    summary.accepted += 1;

                    let handler = self.handler.clone();
                    self.pool.submit(move || {
                        if let Err(e) = handler.handle(stream, peer) {
                            debug!(%peer, "Connection closed with error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!(seq, "Accept error: {}", e);
                    summary.failed_accepts += 1;
                }
            }
        }

        info!(
            accepted = summary.accepted,
            failed = summary.failed_accepts,
            "Request limit reached, shutting down"
        );
        self.pool.shutdown();
        summary
    }
}
