//! OCI Identity lookups
//!
//! Tenancy record, compartment subtree and availability domains: the
//! topology the dimension enumerator expands over.

use super::client::OciClient;
use crate::engine::lister::{ListRequest, Page};
use crate::engine::matrix::{Compartment, Tenancy, Topology};
use crate::error::RemoteError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

const IDENTITY_SERVICE: &str = "identity";
const IDENTITY_API_VERSION: &str = "20160918";

fn decode<T: DeserializeOwned>(body: Value, what: &str) -> Result<T, RemoteError> {
    serde_json::from_value(body)
        .map_err(|e| RemoteError::Decode(format!("unexpected {} payload: {}", what, e)))
}

#[async_trait]
impl Topology for OciClient {
    async fn tenancy(&self, tenancy_id: &str, region: &str) -> Result<Tenancy, RemoteError> {
        let url = self.api_url(
            IDENTITY_SERVICE,
            region,
            IDENTITY_API_VERSION,
            &format!("tenancies/{}", tenancy_id),
            &[],
        )?;
        let response = self.get(&url).await?;
        decode(response.body, "tenancy")
    }

    async fn compartment_page(
        &self,
        tenancy_id: &str,
        region: &str,
        request: ListRequest<'_>,
    ) -> Result<Page<Compartment>, RemoteError> {
        let mut params = vec![
            ("compartmentId".to_string(), tenancy_id.to_string()),
            ("compartmentIdInSubtree".to_string(), "true".to_string()),
            ("accessLevel".to_string(), "ANY".to_string()),
            ("limit".to_string(), request.page_size.to_string()),
        ];
        if let Some(token) = request.page_token {
            params.push(("page".to_string(), token.to_string()));
        }

        let url = self.api_url(
            IDENTITY_SERVICE,
            region,
            IDENTITY_API_VERSION,
            "compartments",
            &params,
        )?;
        let response = self.get(&url).await?;
        let items: Vec<Compartment> = match response.body {
            Value::Null => Vec::new(),
            body => decode(body, "compartment list")?,
        };

        Ok(Page {
            items,
            next_page_token: response.next_page,
        })
    }

    async fn availability_domains(
        &self,
        tenancy_id: &str,
        region: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let url = self.api_url(
            IDENTITY_SERVICE,
            region,
            IDENTITY_API_VERSION,
            "availabilityDomains",
            &[("compartmentId".to_string(), tenancy_id.to_string())],
        )?;
        let response = self.get(&url).await?;

        let names = response
            .body
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|ad| ad.get("name").and_then(|n| n.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(names)
    }
}
