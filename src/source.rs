//! Fetching the router list from the Traefik API.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::Settings;
use crate::error::{DnsError, FetchError};
use crate::router::HttpRouter;

/// Source of routing rules for the reconciler.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Fetch the current router list. No retries; the caller decides when
    /// to try again.
    async fn fetch(&self) -> Result<Vec<HttpRouter>, FetchError>;
}

/// HTTP client for `GET {api_url}/http/routers`.
#[derive(Debug, Clone)]
pub struct TraefikClient {
    client: Client,
    routers_url: Url,
}

impl TraefikClient {
    /// Build a client from validated settings.
    pub fn new(settings: &Settings) -> Result<Self, DnsError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .danger_accept_invalid_certs(settings.insecure_skip_verify)
            .build()?;

        Ok(Self {
            client,
            routers_url: settings.routers_url.clone(),
        })
    }
}

#[async_trait]
impl RuleSource for TraefikClient {
    async fn fetch(&self) -> Result<Vec<HttpRouter>, FetchError> {
        let url = self.routers_url.as_str();
        debug!(url, "fetching Traefik HTTP routers");

        let response = self
            .client
            .get(self.routers_url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let routers: Vec<HttpRouter> =
            serde_json::from_str(&body).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })?;

        debug!(url, routers = routers.len(), "fetched Traefik HTTP routers");
        Ok(routers)
    }
}
