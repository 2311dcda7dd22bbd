//! OCI Client
//!
//! Main client for interacting with OCI APIs, combining credentials and HTTP
//! functionality with per-service, per-region endpoint construction.

use super::auth::Credentials;
use super::http::{HttpResponse, OciHttpClient};
use crate::config::Connection;
use crate::error::RemoteError;
use anyhow::{Context, Result};
use url::Url;

/// Public endpoint layout; `{service}` and `{region}` are substituted
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{service}.{region}.oci.oraclecloud.com";

/// Main OCI client
#[derive(Clone)]
pub struct OciClient {
    pub credentials: Credentials,
    pub http: OciHttpClient,
    endpoint_template: String,
}

impl OciClient {
    /// Create a new OCI client for a connection
    pub fn new(connection: &Connection) -> Result<Self> {
        let http = OciHttpClient::new().context("Failed to initialize HTTP client")?;

        Ok(Self {
            credentials: connection.credentials.clone(),
            http,
            endpoint_template: connection
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT_TEMPLATE.to_string()),
        })
    }

    /// Base URL of a service in a region
    pub fn service_base(&self, service: &str, region: &str) -> Result<Url, RemoteError> {
        let base = self
            .endpoint_template
            .replace("{service}", service)
            .replace("{region}", region);
        Url::parse(&base).map_err(|e| RemoteError::Invalid {
            status: 0,
            message: format!("invalid endpoint {}: {}", base, e),
        })
    }

    /// Build an API URL: `<base>/<api_version>/<path>?<params>`
    pub fn api_url(
        &self,
        service: &str,
        region: &str,
        api_version: &str,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Url, RemoteError> {
        let mut url = self.service_base(service, region)?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| RemoteError::Invalid {
                status: 0,
                message: "endpoint cannot be a base URL".to_string(),
            })?;
            segments.pop_if_empty();
            segments.push(api_version);
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }

        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Make a GET request to an OCI API
    pub async fn get(&self, url: &Url) -> Result<HttpResponse, RemoteError> {
        self.http.get(url, &self.credentials).await
    }
}
