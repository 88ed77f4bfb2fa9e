//! HTTP collaborator backed by reqwest

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::session::{HttpClient, HttpResponse};
use crate::spec::HttpMethod;

/// Configuration for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Follow redirects (up to 10)
    pub follow_redirects: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("sitecheck/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            follow_redirects: true,
        }
    }
}

/// reqwest client with a per-instance cookie store
pub struct ReqwestClient {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl ReqwestClient {
    pub fn new(config: &HttpConfig) -> E2eResult<Self> {
        let redirects = if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .redirect(redirects)
            .cookie_store(true)
            .build()?;

        Ok(Self { client, timeout_ms: config.request_timeout_ms })
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&serde_json::Value>,
    ) -> E2eResult<HttpResponse> {
        debug!("{} {}", method.as_str(), url);

        let mut req = self.client.request(to_method(method), url);
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                E2eError::Timeout {
                    what: format!("{} {}", method.as_str(), url),
                    ms: self.timeout_ms,
                }
            } else {
                E2eError::Transport(format!("{} {}: {}", method.as_str(), url, e))
            }
        })?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| E2eError::Transport(format!("reading body of {}: {}", url, e)))?
            .to_vec();

        Ok(HttpResponse { status, headers, body })
    }
}
