//! CRUD request shaping and dispatch.
//!
//! # Responsibility
//! - Map record operations onto HTTP verbs.
//! - Build request URLs, including query-string filter extensions.
//! - Dispatch through the injected client with timing/status logging.
//!
//! # Invariants
//! - An explicit `SyncOptions::method` or `SyncOptions::url` always wins over
//!   the derived one.
//! - Logged events carry metadata only, never request or response bodies.

use crate::error::RecordResult;
use crate::sync::http::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use log::{debug, error};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;

/// Characters `encodeURIComponent`-style encoding leaves untouched.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Record lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn method(self) -> Method {
        match self {
            Self::Create => Method::Post,
            Self::Read => Method::Get,
            Self::Update => Method::Put,
            Self::Delete => Method::Delete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Per-call sync options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Overrides the verb derived from the operation.
    pub method: Option<Method>,
    /// Overrides the record/model URL.
    pub url: Option<String>,
    /// Query extensions: arrays become `key[]=v` pairs, scalars `key=v`.
    pub filters: Map<String, Value>,
    /// Request body; filled by `save` when left empty.
    pub data: Option<Value>,
}

impl SyncOptions {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn filter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.filters.insert(key.into(), value);
        self
    }
}

/// Builds the request for `operation`, deriving the URL lazily.
pub fn build_request(
    operation: Operation,
    options: &SyncOptions,
    default_url: impl FnOnce() -> RecordResult<String>,
) -> RecordResult<HttpRequest> {
    let method = options.method.unwrap_or_else(|| operation.method());
    let mut url = match &options.url {
        Some(url) => url.clone(),
        None => default_url()?,
    };

    let extensions = query_extensions(&options.filters);
    if !extensions.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&extensions.join("&"));
    }

    Ok(HttpRequest {
        method,
        url,
        data: options.data.clone(),
    })
}

/// Sends `request` through `client`.
pub fn send<C: HttpClient + ?Sized>(
    client: &C,
    operation: Operation,
    request: &HttpRequest,
) -> Result<HttpResponse, TransportError> {
    let started_at = Instant::now();
    debug!(
        "event=record_sync module=sync status=start operation={} method={} url={}",
        operation.as_str(),
        request.method,
        request.url
    );

    match client.send(request) {
        Ok(response) => {
            debug!(
                "event=record_sync module=sync status=ok operation={} method={} \
                 http_status={} duration_ms={}",
                operation.as_str(),
                request.method,
                response.status,
                started_at.elapsed().as_millis()
            );
            Ok(response)
        }
        Err(err) => {
            error!(
                "event=record_sync module=sync status=error operation={} method={} \
                 url={} duration_ms={} error={}",
                operation.as_str(),
                request.method,
                request.url,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Percent-encodes one URL path component.
pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Renders a JSON scalar the way it appears inside a URL.
pub(crate) fn value_to_url_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn query_extensions(filters: &Map<String, Value>) -> Vec<String> {
    let mut extensions = Vec::new();
    for (key, filter) in filters {
        match filter {
            Value::Array(values) => {
                for value in values {
                    extensions.push(format!("{key}[]={}", encode_query_value(value)));
                }
            }
            other => extensions.push(format!("{key}={}", encode_query_value(other))),
        }
    }
    extensions
}

fn encode_query_value(value: &Value) -> String {
    form_urlencoded::byte_serialize(value_to_url_text(value).as_bytes()).collect()
}
