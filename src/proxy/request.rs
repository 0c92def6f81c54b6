//! Client request parsing
//!
//! Turns the raw bytes read from a client into either a request that can be
//! forwarded or a rejection carrying the status to answer with. Validation is
//! sequential and the first failing check decides the outcome.

use bytes::Bytes;

use crate::proxy::filter::HostFilter;
use crate::proxy::response::{ErrorStatus, DEFAULT_PROTOCOL};

const DEFAULT_PORT: u16 = 80;
const SUPPORTED_PROTOCOLS: [&str; 2] = ["HTTP/1.0", "HTTP/1.1"];

/// A validated request ready to be sent to the origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub path: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    /// Rewritten request line and headers sent to the origin
    pub outbound: Bytes,
}

/// A request the proxy answers itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: ErrorStatus,
    pub protocol: String,
}

/// Outcome of parsing one client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRequest {
    Forwardable(ForwardRequest),
    Rejected(Rejection),
}

impl ParsedRequest {
    fn reject(status: ErrorStatus, protocol: &str) -> Self {
        ParsedRequest::Rejected(Rejection {
            status,
            protocol: protocol.to_string(),
        })
    }
}

/// Parse `raw` and check it against `filter`.
pub fn parse_request(raw: &[u8], filter: &HostFilter) -> ParsedRequest {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_start_matches(is_line_break);

    // Request line, plus whatever follows its terminator.
    let (request_line, rest) = match text.find(is_line_break) {
        Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
        None => (text, None),
    };
    if request_line.is_empty() {
        return ParsedRequest::reject(ErrorStatus::BadRequest, DEFAULT_PROTOCOL);
    }

    let mut tokens = request_line.split(' ').filter(|t| !t.is_empty());
    let (Some(method), Some(path), Some(protocol)) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return ParsedRequest::reject(ErrorStatus::BadRequest, DEFAULT_PROTOCOL);
    };

    if !SUPPORTED_PROTOCOLS.contains(&protocol) {
        return ParsedRequest::reject(ErrorStatus::BadRequest, protocol);
    }

    let headers = match rest {
        Some(rest) if !rest.is_empty() => rest,
        _ => return ParsedRequest::reject(ErrorStatus::BadRequest, protocol),
    };

    let Some(host_value) = find_host(headers) else {
        return ParsedRequest::reject(ErrorStatus::NotFound, protocol);
    };

    let (host, port) = match host_value.split_once(':') {
        Some((host, port)) => match parse_port(port) {
            Some(port) => (host, port),
            None => return ParsedRequest::reject(ErrorStatus::NotFound, protocol),
        },
        None => (host_value, DEFAULT_PORT),
    };

    if method != "GET" {
        return ParsedRequest::reject(ErrorStatus::NotSupported, protocol);
    }

    if filter.is_blocked(host) {
        return ParsedRequest::reject(ErrorStatus::Forbidden, protocol);
    }

    ParsedRequest::Forwardable(ForwardRequest {
        outbound: build_outbound(path, protocol, host),
        path: path.to_string(),
        host: host.to_string(),
        port,
        protocol: protocol.to_string(),
    })
}

/// The request sent to the origin. Client headers other than the host are
/// dropped and the origin is always asked to close the connection.
pub fn build_outbound(path: &str, protocol: &str, host: &str) -> Bytes {
    Bytes::from(format!(
        "GET {path} {protocol}\r\nHost: {host}\r\nConnection: close\r\n\r\n"
    ))
}

fn is_line_break(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// Value of the last `Host:` header, with leading spaces removed.
fn find_host(headers: &str) -> Option<&str> {
    headers
        .split(is_line_break)
        .filter_map(|line| line.strip_prefix("Host:"))
        .last()
        .map(|value| value.trim_start_matches(' '))
}

fn parse_port(raw: &str) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}
