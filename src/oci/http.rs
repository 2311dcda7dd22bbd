//! HTTP utilities for OCI REST API calls

use super::auth::{self, Credentials};
use crate::error::RemoteError;
use reqwest::header::{AUTHORIZATION, DATE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header carrying the opaque next-page token
pub const NEXT_PAGE_HEADER: &str = "opc-next-page";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull the service's error message out of an OCI error body
/// (`{"code": "...", "message": "..."}`)
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let code = v.get("code").and_then(|c| c.as_str()).map(String::from);
            let message = v.get("message").and_then(|m| m.as_str()).map(String::from);
            match (code, message) {
                (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
                (code, message) => code.or(message),
            }
        })
        .map(|m| sanitize_for_log(&m))
        .unwrap_or_default()
}

/// Successful response: JSON body plus the next-page token, if any
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub body: Value,
    pub next_page: Option<String>,
}

/// HTTP client wrapper for OCI API calls
#[derive(Clone)]
pub struct OciHttpClient {
    client: Client,
}

impl OciHttpClient {
    /// Create a new HTTP client
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ocirows/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client })
    }

    /// Make a GET request to an OCI API
    pub async fn get(&self, url: &Url, credentials: &Credentials) -> Result<HttpResponse, RemoteError> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url.clone());
        match credentials {
            Credentials::Anonymous => {}
            Credentials::Bearer(token) => request = request.bearer_auth(token),
            Credentials::ApiKey(signer) => {
                let date = auth::http_date(chrono::Utc::now());
                let authorization = signer.authorization("get", url, &date)?;
                request = request.header(DATE, date).header(AUTHORIZATION, authorization);
            }
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        let next_page = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from);

        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::warn!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(status_error(status, &body));
        }

        if body.is_empty() {
            return Ok(HttpResponse {
                body: Value::Null,
                next_page,
            });
        }

        let body = serde_json::from_str(&body)
            .map_err(|e| RemoteError::Decode(format!("invalid response JSON: {}", e)))?;

        Ok(HttpResponse { body, next_page })
    }
}

fn status_error(status: StatusCode, body: &str) -> RemoteError {
    RemoteError::from_status(status.as_u16(), error_message(body))
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else {
        "request"
    };
    RemoteError::Transport(format!("{}: {}", kind, err))
}

/// Format a remote error for display
/// Security: Generic messages avoid echoing API details back to the terminal
pub fn format_oci_error(error: &RemoteError) -> String {
    match error {
        RemoteError::NotFound => "Resource not found.".to_string(),
        RemoteError::Unauthorized { status: 401, .. } => {
            "Authentication failed. Check the connection's credentials.".to_string()
        }
        RemoteError::Unauthorized { .. } => {
            "Permission denied. Check your IAM policies.".to_string()
        }
        RemoteError::Throttled { .. } => {
            "Rate limit exceeded. Please try again later.".to_string()
        }
        RemoteError::Invalid { status: 409, .. } => {
            "Resource conflict. The resource may be in an incompatible state.".to_string()
        }
        RemoteError::Invalid { .. } => "Invalid request. Check your filters.".to_string(),
        RemoteError::Server { .. } => {
            "OCI service temporarily unavailable. Please try again.".to_string()
        }
        RemoteError::Decode(_) => {
            "Unexpected response from the OCI service.".to_string()
        }
        RemoteError::Transport(_) => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        RemoteError::Cancelled => "Cancelled.".to_string(),
    }
}
