use crate::workflow::{
    errors::{FlowrunError, Result, TimeoutScope},
    models::HttpMethod,
};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// A fully resolved outbound request, ready to send.
#[derive(Debug, Clone)]
pub struct HttpRequestSpec {
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
    pub verify_ssl: bool,
}

/// Response as observed on the wire. Transport failures never produce one
/// of these; they surface as `FlowrunError::Transport`.
#[derive(Debug, Clone)]
pub struct HttpResponseData {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// HTTP collaborator seam; tests substitute deterministic stubs.
#[async_trait]
pub trait HttpSend: Send + Sync {
    async fn send(&self, request: HttpRequestSpec) -> Result<HttpResponseData>;
}

/// Production sender backed by reqwest. Two clients are built up front so
/// per-request `verify_ssl` selection never rebuilds a connection pool.
pub struct ReqwestSender {
    client: Client,
    permissive_client: Client,
}

impl ReqwestSender {
    pub fn new() -> Result<Self> {
        let client = Client::builder().build()?;
        let permissive_client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            permissive_client,
        })
    }
}

#[async_trait]
impl HttpSend for ReqwestSender {
    async fn send(&self, request: HttpRequestSpec) -> Result<HttpResponseData> {
        let client = if request.verify_ssl {
            &self.client
        } else {
            &self.permissive_client
        };

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
            HttpMethod::Put => client.put(&request.url),
            HttpMethod::Delete => client.delete(&request.url),
            HttpMethod::Patch => client.patch(&request.url),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FlowrunError::Timeout {
                    scope: TimeoutScope::Node,
                    seconds: request.timeout.map(|t| t.as_secs_f64()).unwrap_or_default(),
                }
            } else {
                FlowrunError::Transport(e.to_string())
            }
        })?;

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| FlowrunError::Transport(e.to_string()))?;

        Ok(HttpResponseData {
            status_code,
            headers,
            body,
        })
    }
}
