//! Route resolution against the external route-assignment service.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::config::ResolverConfig;
use super::error::{ResolverError, ResolverResult};

/// Path appended to the service base URL.
pub const ROUTE_REQUEST_PATH: &str = "/route-request";

/// Decides which backend a player should use.
///
/// Only called on a routing-table miss.
#[async_trait]
pub trait RouteResolver: Send + Sync {
    /// Resolve a player IP to a backend `host:port` string.
    async fn resolve(&self, player_ip: IpAddr) -> ResolverResult<String>;
}

/// Request body sent to the service.
#[derive(Debug, Serialize)]
struct RouteRequest {
    player_ip: String,
}

/// Response body expected from the service.
#[derive(Debug, Deserialize)]
struct RouteResponse {
    backend: String,
}

/// Resolver that POSTs to `{base_url}/route-request`.
#[derive(Debug, Clone)]
pub struct HttpRouteResolver {
    endpoint: Option<String>,
    timeout: Duration,
    client: Client,
}

impl HttpRouteResolver {
    /// Build a resolver from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ResolverConfig) -> ResolverResult<Self> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("peel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResolverError::Unreachable(format!("cannot build HTTP client: {e}")))?;

        let endpoint = config
            .endpoint()
            .map(|base| format!("{}{ROUTE_REQUEST_PATH}", base.trim_end_matches('/')));

        Ok(Self {
            endpoint,
            timeout,
            client,
        })
    }

    /// Full URL requests are sent to, if configured.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn classify(&self, err: reqwest::Error) -> ResolverError {
        if err.is_timeout() {
            ResolverError::Timeout(self.timeout)
        } else if err.is_decode() {
            ResolverError::BadResponse(err.to_string())
        } else {
            ResolverError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl RouteResolver for HttpRouteResolver {
    async fn resolve(&self, player_ip: IpAddr) -> ResolverResult<String> {
        let endpoint = self.endpoint.as_deref().ok_or(ResolverError::Unconfigured)?;

        debug!(player = %player_ip, endpoint, "Requesting route");

        let response = self
            .client
            .post(endpoint)
            .json(&RouteRequest {
                player_ip: player_ip.to_string(),
            })
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ResolverError::BadResponse(format!("status {status}")));
        }

        let body: RouteResponse = response.json().await.map_err(|e| self.classify(e))?;
        let backend = body.backend.trim();
        if backend.is_empty() {
            return Err(ResolverError::BadResponse("empty backend".to_string()));
        }

        info!(player = %player_ip, backend, "Route assigned");
        Ok(backend.to_string())
    }
}
