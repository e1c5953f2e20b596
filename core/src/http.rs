//! HTTP transport types and the blocking executor.
//!
//! # Design
//! Requests and responses are plain data. `DdClient` builds `HttpRequest`
//! values without touching the network and hands them to a `Transport`,
//! which performs the round-trip and returns the status and body as data.
//! Status interpretation stays in the client, so a transport only fails on
//! I/O problems.

use std::time::Duration;

use tracing::debug;

use crate::error::DdError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
///
/// `url` is absolute. `query` holds the parameters of GET and DELETE calls;
/// `body` holds the JSON payload of PUT and POST calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one request and blocks until the response or a failure.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, DdError>;
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Agent whose every call is bounded by `timeout` end to end.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, DdError> {
        debug!(method = request.method.as_str(), url = %request.url, "sending request");

        let HttpRequest {
            method,
            url,
            query,
            headers,
            body,
        } = request;
        let query = query.iter().map(|(k, v)| (k.as_str(), v.as_str()));

        let result = match method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&url).query_pairs(query);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Delete => {
                let mut builder = self.agent.delete(&url).query_pairs(query);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post | HttpMethod::Put => {
                let builder = match method {
                    HttpMethod::Post => self.agent.post(&url),
                    _ => self.agent.put(&url),
                };
                let mut builder = builder.query_pairs(query);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // ureq caps string bodies at 10 MiB by default; predictions over a
        // large batch can exceed that.
        let body = response.body_mut().with_config().limit(u64::MAX).read_to_string()?;

        debug!(status, "received response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
