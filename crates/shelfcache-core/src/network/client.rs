//! HTTP implementation of the network capability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{NetworkError, NetworkResult};
use crate::models::{ResourceRequest, ResourceResponse};

use super::Network;

/// Default HTTP request timeout in seconds.
/// A timed out request is treated like any other network failure.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Network capability backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    origin: Option<Url>,
}

impl HttpNetwork {
    /// Create a client. Relative resource identifiers such as `/index.html`
    /// are resolved against `origin`.
    pub fn new(origin: Option<&str>, timeout: Duration) -> NetworkResult<Self> {
        let origin = origin
            .map(|o| {
                Url::parse(o).map_err(|e| NetworkError::InvalidUrl {
                    url: o.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    /// Resolve a resource identifier to an absolute URL.
    pub fn resolve(&self, resource: &str) -> NetworkResult<Url> {
        if let Ok(url) = Url::parse(resource) {
            return Ok(url);
        }

        let origin = self.origin.as_ref().ok_or_else(|| NetworkError::InvalidUrl {
            url: resource.to_string(),
            reason: "relative URL and no origin configured".to_string(),
        })?;
        origin.join(resource).map_err(|e| NetworkError::InvalidUrl {
            url: resource.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &ResourceRequest) -> NetworkResult<ResourceResponse> {
        let url = self.resolve(&request.url)?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|_| NetworkError::InvalidMethod(request.method.to_string()))?;

        let mut builder = self.client.request(method, url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status, bytes = body.len(), "Network fetch complete");

        Ok(ResourceResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }
}
