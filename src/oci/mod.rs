//! OCI API interaction module
//!
//! This module provides the core functionality for talking to Oracle Cloud
//! Infrastructure REST APIs: credentials, HTTP transport, endpoint construction
//! and the identity lookups the enumeration engine depends on.
//!
//! # Module Structure
//!
//! - [`auth`] - Credential material and OCID validation
//! - [`client`] - Main OCI client, endpoint construction per service and region
//! - [`http`] - HTTP transport, error classification, `opc-next-page` handling
//! - [`identity`] - Tenancy, compartment and availability domain lookups
//!
//! # Example
//!
//! ```ignore
//! use ocirows::oci::client::OciClient;
//!
//! async fn example(connection: &ocirows::config::Connection) -> anyhow::Result<()> {
//!     let client = OciClient::new(connection)?;
//!     let url = client.api_url("iaas", "us-ashburn-1", "20160918", "instances", &[])?;
//!     let response = client.get(&url).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod identity;
