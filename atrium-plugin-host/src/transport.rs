//! HTTP transport behind the scoped request capability.
//!
//! The broker validates paths before anything reaches a transport, so
//! implementations see only targets inside the plugin API namespace.
//! HTTP status codes are data (plugins branch on them); only connection
//! and protocol failures surface as [`SandboxError::Transport`].

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::SandboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated request leaving the sandbox. `path` is host-relative and
/// has already passed the broker's namespace check.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Where scoped requests actually go. Tests substitute in-memory fakes;
/// production wires [`HttpApiTransport`].
pub trait ApiTransport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, SandboxError>;
}

/// Blocking HTTP transport against the host's own API server.
pub struct HttpApiTransport {
    base_url: String,
    timeout: Duration,
}

impl HttpApiTransport {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn transport_err(context: &str, err: impl fmt::Display) -> SandboxError {
        SandboxError::Transport {
            message: format!("{context}: {err}"),
        }
    }
}

impl ApiTransport for HttpApiTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, SandboxError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("atrium-plugin-host/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Self::transport_err("http client", e))?;

        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            HttpMethod::Get => client.get(&url),
            HttpMethod::Post => client.post(&url),
            HttpMethod::Put => client.put(&url),
            HttpMethod::Delete => client.delete(&url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .header("Accept", "application/json")
            .send()
            .map_err(|e| Self::transport_err(&format!("{} {url}", request.method), e))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| Self::transport_err("read body", e))?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }
}
