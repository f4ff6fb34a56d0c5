//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The
//! request builder produces `HttpRequest` values and the response parser
//! consumes `HttpResponse` values without ever touching the network. Actual
//! I/O happens behind the `Transport` trait, which the caller supplies when
//! constructing an `SdbClient`. Connection pooling, TLS, timeouts and retries
//! all belong to the transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP method for a request. The query protocol only uses GET and POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// A signed request described as plain data.
///
/// For GET the canonical query string is already appended to `url`; for POST
/// it is carried in `body` with a form content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request did not complete before the transport's deadline.
    Timeout,
    /// The connection could not be established or was dropped.
    Connect,
    Other,
}

impl TransportErrorKind {
    fn prefix(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timed out: ",
            TransportErrorKind::Connect => "connection failed: ",
            TransportErrorKind::Other => "",
        }
    }
}

/// A failure below the protocol layer. Carries no service code, message or
/// request id because no response document was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", .kind.prefix())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

/// Executes one HTTP exchange.
///
/// Implementations must return non-2xx responses as `Ok` so the parser can
/// read the service's error document.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(HttpRequest) -> Result<HttpResponse, TransportError>,
{
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self(request)
    }
}
