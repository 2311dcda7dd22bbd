//! Configuration Management
//!
//! Named connections are stored in `<config_dir>/ocirows/config.json`.
//! Environment variables override the file so a connection can be described
//! without one.

use crate::oci::auth;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Default number of attempts for a remote call
pub const DEFAULT_MAX_ERROR_RETRY_ATTEMPTS: u32 = 9;

/// Default delay before the first retry, in milliseconds
pub const DEFAULT_MIN_ERROR_RETRY_DELAY_MS: u64 = 25;

/// One connection as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    /// Tenancy (root compartment) OCID
    #[serde(default)]
    pub tenancy_id: Option<String>,
    /// Regions to enumerate, in order. The first one is the primary region.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Restrict enumeration to these compartments
    #[serde(default)]
    pub compartments: Option<Vec<String>>,
    /// Bearer token used for API calls
    #[serde(default)]
    pub auth_token: Option<String>,
    /// User OCID owning the API signing key
    #[serde(default)]
    pub user_id: Option<String>,
    /// Fingerprint of the uploaded public key
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// PEM private key used to sign requests
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Endpoint template, `{service}` and `{region}` are substituted
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub max_error_retry_attempts: Option<u32>,
    /// Milliseconds
    #[serde(default)]
    pub min_error_retry_delay: Option<u64>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub default_connection: Option<String>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

/// Immutable per-query connection settings
#[derive(Clone)]
pub struct Connection {
    pub name: String,
    pub tenancy_id: String,
    pub regions: Vec<String>,
    pub compartments: Option<Vec<String>>,
    pub credentials: auth::Credentials,
    pub endpoint: Option<String>,
    pub max_error_retry_attempts: Option<u32>,
    pub min_error_retry_delay_ms: Option<u64>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("tenancy_id", &self.tenancy_id)
            .field("regions", &self.regions)
            .field("compartments", &self.compartments)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connection with default retry tuning and no compartment restriction
    pub fn new(name: &str, tenancy_id: &str, regions: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            tenancy_id: tenancy_id.to_string(),
            regions,
            compartments: None,
            credentials: auth::Credentials::anonymous(),
            endpoint: None,
            max_error_retry_attempts: None,
            min_error_retry_delay_ms: None,
        }
    }

    /// Identity used to scope hydrate cache keys
    pub fn identity(&self) -> String {
        format!("{}@{}", self.name, self.tenancy_id)
    }

    /// The first configured region
    pub fn primary_region(&self) -> Option<&str> {
        self.regions.first().map(|s| s.as_str())
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl ConnectionConfig {
    /// Apply `OCI_*` environment overrides
    fn with_env_overrides(mut self) -> Self {
        if let Ok(tenancy) = std::env::var("OCI_TENANCY_ID") {
            self.tenancy_id = Some(tenancy);
        }
        if let Ok(regions) = std::env::var("OCI_REGIONS") {
            self.regions = parse_region_list(&regions);
        }
        if let Ok(token) = std::env::var("OCI_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Ok(user) = std::env::var("OCI_USER_ID") {
            self.user_id = Some(user);
        }
        if let Ok(fingerprint) = std::env::var("OCI_FINGERPRINT") {
            self.fingerprint = Some(fingerprint);
        }
        if let Ok(key_file) = std::env::var("OCI_KEY_FILE") {
            self.key_file = Some(PathBuf::from(key_file));
        }
        if let Ok(endpoint) = std::env::var("OCI_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        self
    }

    /// Validate and freeze into a [`Connection`]
    pub fn into_connection(self, name: &str) -> Result<Connection> {
        let tenancy_id = self
            .tenancy_id
            .context("No tenancy configured. Set tenancy_id or OCI_TENANCY_ID")?;

        if !auth::validate_ocid(&tenancy_id) {
            anyhow::bail!("Invalid tenancy OCID: {}", tenancy_id);
        }

        if let Some(compartments) = &self.compartments {
            if compartments.is_empty() {
                anyhow::bail!("Compartment restriction is empty; omit it to use every compartment");
            }
            if let Some(bad) = compartments.iter().find(|c| !auth::validate_ocid(c)) {
                anyhow::bail!("Invalid compartment OCID: {}", bad);
            }
        }

        let credentials = match (&self.user_id, &self.fingerprint, &self.key_file) {
            (Some(user_id), Some(fingerprint), Some(key_file)) => {
                if !auth::validate_ocid(user_id) {
                    anyhow::bail!("Invalid user OCID: {}", user_id);
                }
                let pem = std::fs::read_to_string(key_file)
                    .with_context(|| format!("Failed to read API key file {}", key_file.display()))?;
                auth::Credentials::api_key(auth::ApiKeySigner::from_pem(&tenancy_id, user_id, fingerprint, &pem)?)
            }
            (None, None, None) => match &self.auth_token {
                Some(token) => auth::Credentials::bearer(token),
                None => auth::Credentials::anonymous(),
            },
            _ => anyhow::bail!("API key signing needs user_id, fingerprint and key_file together"),
        };

        Ok(Connection {
            name: name.to_string(),
            tenancy_id,
            regions: self.regions,
            compartments: self.compartments,
            credentials,
            endpoint: self.endpoint,
            max_error_retry_attempts: self.max_error_retry_attempts,
            min_error_retry_delay_ms: self.min_error_retry_delay,
        })
    }
}

/// Split a comma separated region list, dropping blanks and duplicates
pub fn parse_region_list(value: &str) -> Vec<String> {
    let mut regions: Vec<String> = Vec::new();
    for region in value.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        if !regions.iter().any(|r| r == region) {
            regions.push(region.to_string());
        }
    }
    regions
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ocirows").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid configuration JSON")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Resolve a connection (CLI > config default > "default"), env overrides applied
    pub fn connection(&self, name: Option<&str>) -> Result<Connection> {
        let name = name
            .map(|s| s.to_string())
            .or_else(|| self.default_connection.clone())
            .unwrap_or_else(|| "default".to_string());

        let base = self.connections.get(&name).cloned().unwrap_or_default();
        base.with_env_overrides().into_connection(&name)
    }
}
