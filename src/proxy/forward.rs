//! Origin forwarding
//!
//! Resolves the origin, opens a single connection to it, sends the rewritten
//! request and relays the response to the client chunk by chunk.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, instrument};

use crate::error::{ProxyError, Result};
use crate::proxy::request::ForwardRequest;

const RELAY_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration for the forwarding engine
#[derive(Debug, Clone, Default)]
pub struct ForwarderConfig {
    /// Timeout for establishing the origin connection (OS default when unset)
    pub connect_timeout: Option<Duration>,
}

/// Forwards validated requests to their origin
#[derive(Debug, Clone, Default)]
pub struct Forwarder {
    config: ForwarderConfig,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Self {
        Self { config }
    }

    /// Forward `request` and stream the origin's response into `client`.
    ///
    /// Errors returned before anything was written to the client carry a
    /// status (see [`ProxyError::status`]); the caller answers with it.
    /// Returns the number of bytes relayed.
    #[instrument(skip(self, request, client), fields(host = %request.host, port = request.port))]
    pub fn forward<W: Write>(&self, request: &ForwardRequest, client: &mut W) -> Result<u64> {
        let addr = resolve(&request.host, request.port)?;
        let mut origin = OriginConnection(self.connect(addr, request)?);

        origin.0.write_all(&request.outbound)?;
        debug!("Request sent to origin {}", addr);

        let relayed = relay(&mut origin.0, client)?;
        debug!(bytes = relayed, "Origin closed the connection");
        Ok(relayed)
    }

    fn connect(&self, addr: SocketAddr, request: &ForwardRequest) -> Result<TcpStream> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(ProxyError::SocketCreate)?;

        let target = SockAddr::from(addr);
        let connected = match self.config.connect_timeout {
            Some(timeout) => socket.connect_timeout(&target, timeout),
            None => socket.connect(&target),
        };
        connected.map_err(|source| ProxyError::OriginConnect {
            host: request.host.clone(),
            port: request.port,
            source,
        })?;

        Ok(socket.into())
    }
}

/// First IPv4 address for `host`.
fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let not_found = || ProxyError::OriginResolve {
        host: host.to_string(),
    };

    if host.is_empty() {
        return Err(not_found());
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|_| not_found())?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(not_found)
}

/// Copy everything from `origin` to `client` until the origin closes.
///
/// Each chunk is written out before the next read. A read error ends the
/// relay quietly, like an orderly close; a client write error is returned.
pub fn relay<R: Read, W: Write>(origin: &mut R, client: &mut W) -> Result<u64> {
    let mut buf = [0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match origin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Origin read ended: {}", e);
                break;
            }
        };
        client.write_all(&buf[..n])?;
        total += n as u64;
    }

    client.flush()?;
    Ok(total)
}

/// Origin socket, shut down in both directions when dropped.
struct OriginConnection(TcpStream);

impl Drop for OriginConnection {
    fn drop(&mut self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}
