//! HTTP transport contract.
//!
//! # Responsibility
//! - Define the request/response shapes records exchange with a backend.
//! - Let callers inject any transport (real client, test double).
//!
//! # Invariants
//! - Transports report failures through `TransportError`; records never
//!   rewrite them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// JSON body; `None` for bodiless verbs.
    pub data: Option<Value>,
}

/// Incoming response with its decoded JSON body (`Value::Null` when empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub data: Value,
}

impl HttpResponse {
    pub fn ok(data: Value) -> Self {
        Self { status: 200, data }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            data: Value::Null,
        }
    }
}

/// Transport-level failure.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The request never produced a response.
    Network(String),
    /// The backend answered with a non-success status.
    Status { status: u16, body: Value },
    /// The response body could not be decoded.
    Decode(String),
    /// The client itself could not be configured.
    Config(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(message) => write!(f, "network error: {message}"),
            Self::Status { status, .. } => write!(f, "backend responded with status {status}"),
            Self::Decode(message) => write!(f, "invalid response body: {message}"),
            Self::Config(message) => write!(f, "invalid http client configuration: {message}"),
        }
    }
}

impl Error for TransportError {}

/// Injected HTTP client.
pub trait HttpClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<C: HttpClient + ?Sized> HttpClient for &C {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

impl<C: HttpClient + ?Sized> HttpClient for Box<C> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}
