//! Blocking `reqwest` transport.
//!
//! Available with the `reqwest-client` feature.

use crate::sync::http::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Transport configuration, loadable from any serde source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReqwestClientConfig {
    /// Prefix for relative request URLs.
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for ReqwestClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            headers: BTreeMap::new(),
        }
    }
}

/// `HttpClient` backed by `reqwest::blocking::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
    base_url: Option<String>,
}

impl ReqwestClient {
    pub fn new(config: ReqwestClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| TransportError::Config(format!("header `{name}`: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| TransportError::Config(format!("header `{name}`: {err}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|err| TransportError::Config(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    fn absolute_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!("{}{url}", base.trim_end_matches('/'))
            }
            _ => url.to_string(),
        }
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, self.absolute_url(&request.url));
        if let Some(data) = &request.data {
            builder = builder.json(data);
        }

        let response = builder
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| TransportError::Decode(err.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: decode_body(false, text)?,
            });
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            data: decode_body(true, text)?,
        })
    }
}

/// Empty bodies decode to `null`. Error bodies that are not JSON (HTML error
/// pages, plain text) are kept as a string so the status still surfaces.
fn decode_body(success: bool, text: String) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str(&text) {
        Ok(data) => Ok(data),
        Err(_) if !success => Ok(Value::String(text)),
        Err(err) => Err(TransportError::Decode(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_body, ReqwestClient, ReqwestClientConfig};
    use crate::sync::http::{HttpClient, HttpRequest, Method, TransportError};
    use serde_json::{json, Value};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serves one raw HTTP response on a local port and returns its base URL.
    fn serve_once(response: String) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind local listener");
        let addr = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buf).expect("read request");
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            stream
                .write_all(response.as_bytes())
                .expect("write response");
        });
        (format!("http://{addr}"), handle)
    }

    fn raw_response(status_line: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn get(client: &ReqwestClient, url: String) -> Result<Value, TransportError> {
        client
            .send(&HttpRequest {
                method: Method::Get,
                url,
                data: None,
            })
            .map(|response| response.data)
    }

    #[test]
    fn html_error_pages_surface_as_status_errors() {
        let body = "<html>Internal Server Error</html>";
        let (base_url, server) =
            serve_once(raw_response("500 Internal Server Error", "text/html", body));
        let client = ReqwestClient::new(ReqwestClientConfig {
            base_url: Some(base_url),
            ..ReqwestClientConfig::default()
        })
        .expect("client should build");

        let err = get(&client, "/api/users/1".to_string()).expect_err("500 should fail");
        server.join().expect("server thread");
        match err {
            TransportError::Status { status, body: Value::String(text) } => {
                assert_eq!(status, 500);
                assert_eq!(text, body);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn json_error_bodies_are_decoded() {
        let (base_url, server) = serve_once(raw_response(
            "422 Unprocessable Entity",
            "application/json",
            r#"{"name":["taken"]}"#,
        ));
        let client = ReqwestClient::new(ReqwestClientConfig::default()).expect("client");

        let err = get(&client, format!("{base_url}/api/users")).expect_err("422 should fail");
        server.join().expect("server thread");
        assert!(matches!(
            err,
            TransportError::Status { status: 422, ref body } if *body == json!({"name": ["taken"]})
        ));
    }

    #[test]
    fn success_bodies_must_be_json() {
        assert_eq!(decode_body(true, "  ".to_string()).unwrap(), Value::Null);
        assert_eq!(decode_body(true, r#"{"id":1}"#.to_string()).unwrap(), json!({"id": 1}));
        assert!(matches!(
            decode_body(true, "<html/>".to_string()),
            Err(TransportError::Decode(_))
        ));
        assert_eq!(
            decode_body(false, "Bad Gateway".to_string()).unwrap(),
            json!("Bad Gateway")
        );
    }

    #[test]
    fn relative_urls_are_prefixed_with_base_url() {
        let client = ReqwestClient::new(ReqwestClientConfig {
            base_url: Some("https://api.example.com/".to_string()),
            ..ReqwestClientConfig::default()
        })
        .expect("client should build");

        assert_eq!(client.absolute_url("/users/1"), "https://api.example.com/users/1");
        assert_eq!(client.absolute_url("http://other/x"), "http://other/x");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ReqwestClientConfig =
            serde_json::from_str(r#"{"base_url": "http://localhost"}"#).expect("config");
        assert_eq!(config.timeout_ms, 30_000);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn invalid_header_is_a_config_error() {
        let mut config = ReqwestClientConfig::default();
        config
            .headers
            .insert("bad header".to_string(), "x".to_string());
        let err = ReqwestClient::new(config).expect_err("invalid header name");
        assert!(matches!(err, TransportError::Config(_)));
    }
}
