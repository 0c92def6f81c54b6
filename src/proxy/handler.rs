//! Per-connection request handling
//!
//! Reads one request from the client, decides what to do with it and either
//! answers with an error document or hands the connection to the forwarder.
//! The client socket is closed on every path once handling finishes.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::proxy::filter::HostFilter;
use crate::proxy::forward::Forwarder;
use crate::proxy::request::{parse_request, ParsedRequest};
use crate::proxy::response::{self, ErrorStatus};

const READ_CHUNK_SIZE: usize = 1024;
/// A line break followed by an empty line ends the header block. Bare LF
/// line breaks are accepted, matching the parser's line splitting.
const HEADER_TERMINATORS: [&[u8]; 2] = [b"\n\r\n", b"\n\n"];
const LONGEST_TERMINATOR: usize = 3;

/// Configuration for connection handling
#[derive(Debug, Clone, Default)]
pub struct ConnectionHandlerConfig {
    /// Read/write timeout applied to client sockets
    pub client_timeout: Option<Duration>,
}

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The request was answered with an error document by the proxy itself
    Rejected(ErrorStatus),
    /// The origin response was relayed
    Forwarded { bytes: u64 },
    /// Forwarding failed before any origin data was relayed
    OriginFailed(ErrorStatus),
}

/// Handles client connections end to end
pub struct ConnectionHandler {
    filter: Arc<HostFilter>,
    forwarder: Forwarder,
    config: ConnectionHandlerConfig,
}

impl ConnectionHandler {
    pub fn new(
        filter: Arc<HostFilter>,
        forwarder: Forwarder,
        config: ConnectionHandlerConfig,
    ) -> Self {
        Self {
            filter,
            forwarder,
            config,
        }
    }

    /// Handle one accepted client connection and close it.
    #[instrument(skip(self, stream))]
    pub fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<ConnectionOutcome> {
        let mut client = ClientConnection(stream);
        if let Some(timeout) = self.config.client_timeout {
            client.0.set_read_timeout(Some(timeout))?;
            client.0.set_write_timeout(Some(timeout))?;
        }

        let outcome = self.serve(&mut client.0)?;
        match outcome {
            ConnectionOutcome::Rejected(status) => {
                info!(status = status.code(), "Request rejected")
            }
            ConnectionOutcome::OriginFailed(status) => {
                warn!(status = status.code(), "Origin unavailable")
            }
            ConnectionOutcome::Forwarded { bytes } => info!(bytes, "Request forwarded"),
        }
        Ok(outcome)
    }

    /// Run the request pipeline over any byte stream.
    pub fn serve<S: Read + Write>(&self, client: &mut S) -> Result<ConnectionOutcome> {
        let raw = read_request(client);

        let request = match parse_request(&raw, &self.filter) {
            ParsedRequest::Rejected(rejection) => {
                client.write_all(&response::render(rejection.status, &rejection.protocol))?;
                return Ok(ConnectionOutcome::Rejected(rejection.status));
            }
            ParsedRequest::Forwardable(request) => request,
        };

        debug!(
            host = %request.host,
            port = request.port,
            path = %request.path,
            "Forwarding request"
        );
        match self.forwarder.forward(&request, client) {
            Ok(bytes) => Ok(ConnectionOutcome::Forwarded { bytes }),
            Err(e) => match e.status() {
                Some(status) => {
                    debug!("Forwarding failed: {}", e);
                    client.write_all(&response::render(status, &request.protocol))?;
                    Ok(ConnectionOutcome::OriginFailed(status))
                }
                None => Err(e),
            },
        }
    }
}

/// Read until the blank line ending the header block, EOF, or a read error.
pub fn read_request<R: Read>(client: &mut R) -> BytesMut {
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = match client.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Client read ended: {}", e);
                break;
            }
        };

        // Only the new bytes plus a possible split terminator need scanning.
        let scan_from = buf.len().saturating_sub(LONGEST_TERMINATOR - 1);
        buf.extend_from_slice(&chunk[..n]);
        if contains_terminator(&buf[scan_from..]) {
            break;
        }
    }

    buf
}

fn contains_terminator(bytes: &[u8]) -> bool {
    HEADER_TERMINATORS
        .iter()
        .any(|terminator| bytes.windows(terminator.len()).any(|w| w == *terminator))
}

/// Client socket, shut down in both directions when dropped.
struct ClientConnection(TcpStream);

impl Drop for ClientConnection {
    fn drop(&mut self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}
