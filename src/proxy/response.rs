//! Error documents sent to clients
//!
//! Every rejection the proxy produces is one of five fixed HTML documents.
//! The header block and body are reproduced byte-for-byte, including the
//! historical `Content-Length` values, so existing clients and test harnesses
//! see exactly what they expect.

use std::fmt;

use bytes::Bytes;

/// Protocol version used when the request line could not be parsed
pub const DEFAULT_PROTOCOL: &str = "HTTP/1.0";

const SERVER_NAME: &str = "webserver/1.0";

/// Status codes the proxy can answer with on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotSupported,
}

impl ErrorStatus {
    pub fn code(self) -> u16 {
        match self {
            ErrorStatus::BadRequest => 400,
            ErrorStatus::Forbidden => 403,
            ErrorStatus::NotFound => 404,
            ErrorStatus::InternalServerError => 500,
            ErrorStatus::NotSupported => 501,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            ErrorStatus::BadRequest => "Bad Request",
            ErrorStatus::Forbidden => "Forbidden",
            ErrorStatus::NotFound => "Not Found",
            ErrorStatus::InternalServerError => "Internal Server Error",
            ErrorStatus::NotSupported => "Not supported",
        }
    }

    /// One-line description shown in the document body
    pub fn description(self) -> &'static str {
        match self {
            ErrorStatus::BadRequest => "Bad Request.",
            ErrorStatus::Forbidden => "Access denied.",
            ErrorStatus::NotFound => "File not found.",
            ErrorStatus::InternalServerError => "Some server side error.",
            ErrorStatus::NotSupported => "Method is not supported.",
        }
    }

    /// The advertised `Content-Length`, fixed per status.
    pub fn content_length(self) -> usize {
        match self {
            ErrorStatus::BadRequest => 113,
            ErrorStatus::Forbidden => 111,
            ErrorStatus::NotFound => 112,
            ErrorStatus::InternalServerError => 144,
            ErrorStatus::NotSupported => 129,
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Render the complete error response for `status`, using `protocol` in the
/// status line.
pub fn render(status: ErrorStatus, protocol: &str) -> Bytes {
    Bytes::from(format!(
        "{protocol} {status}\r\n\
         Server: {SERVER_NAME}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {length}\r\n\
         Connection: close\r\n\
         \r\n\
         <HTML><HEAD><TITLE>{status}</TITLE></HEAD>\r\n\
         <BODY><H4>{status}<H4>\r\n\
         {description}\r\n\
         </BODY></HTML>\r\n\
         \r\n",
        length = status.content_length(),
        description = status.description(),
    ))
}
