//! HTTP client seam used by virtual users.

use crate::error::{HarnessError, HarnessResult, NetworkError};
use crate::request::RequestSpec;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Response of a completed HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub latency: Duration,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Sends one request and waits for the full response.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &RequestSpec) -> Result<Response, NetworkError>;
}

/// `reqwest`-backed client with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Build the shared client. A failure here aborts the run; it is not a call failure.
    pub fn new(timeout: Duration, pool_size: usize) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_size)
            .build()
            .map_err(HarnessError::ClientSetup)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &RequestSpec) -> Result<Response, NetworkError> {
        let start = Instant::now();

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| NetworkError::Request(e.to_string()))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify)?;
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
        let body = response.bytes().await.map_err(classify)?;

        Ok(Response {
            status,
            headers,
            body,
            latency: start.elapsed(),
        })
    }
}

fn classify(error: reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout
    } else if error.is_connect() {
        NetworkError::Connect(error.to_string())
    } else {
        NetworkError::Request(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_returns_harness_result() {
        let client: HarnessResult<ReqwestClient> = ReqwestClient::new(Duration::from_secs(1), 4);
        assert!(client.is_ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = Response::new(200).with_header("X-Cache", "HIT");
        assert_eq!(response.header("x-cache"), Some("HIT"));
        assert_eq!(response.header("X-CACHE"), Some("HIT"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_text_is_lossy() {
        let response = Response::new(200).with_body(vec![b'o', b'k', 0xff]);
        assert!(response.text().starts_with("ok"));
    }
}
