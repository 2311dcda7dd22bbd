//! Resource Registry - Load resource definitions from JSON
//!
//! This module loads all OCI resource definitions from embedded JSON files
//! and provides lookup functions for the rest of the crate.

use crate::engine::matrix::ResourceScope;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/core.json"),
    include_str!("../resources/identity.json"),
    include_str!("../resources/certificates.json"),
];

fn default_compartment_param() -> Option<String> {
    Some("compartmentId".to_string())
}

fn default_max_page_size() -> usize {
    1000
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    /// Endpoint service name (`iaas`, `identity`, ...)
    pub service: String,
    pub api_version: String,
    pub list_path: String,
    /// Path of the single-item get, `{id}` is replaced by the OCID
    #[serde(default)]
    pub get_path: Option<String>,
    /// Dot path to the item array in list responses, empty for a bare array
    #[serde(default)]
    pub response_path: String,
    pub scope: ResourceScope,
    /// Query parameter carrying the cell's compartment
    #[serde(default = "default_compartment_param")]
    pub compartment_param: Option<String>,
    /// Query parameter carrying the cell's availability domain
    #[serde(default)]
    pub zone_param: Option<String>,
    /// OCID type segment of this resource kind
    #[serde(default)]
    pub ocid_type: Option<String>,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// List summaries carry every field the get would return
    #[serde(default)]
    pub summary_is_complete: bool,
    /// Fixed query parameters added to every list call
    #[serde(default)]
    pub list_params: BTreeMap<String, String>,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig::default();

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// Get all resource keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(
            !registry.resources.is_empty(),
            "Registry should have resources"
        );
    }

    #[test]
    fn test_core_instance_resource_exists() {
        let resource = get_resource("core_instance").expect("core_instance should exist");
        assert_eq!(resource.display_name, "Compute Instances");
        assert_eq!(resource.service, "iaas");
        assert_eq!(resource.scope, ResourceScope::RegionalCompartment);
        assert_eq!(resource.compartment_param.as_deref(), Some("compartmentId"));
        assert_eq!(resource.max_page_size, 1000);
    }

    #[test]
    fn test_zonal_resources_name_zone_param() {
        for key in get_all_resource_keys() {
            let def = get_resource(key).unwrap();
            if def.scope == ResourceScope::Zonal {
                assert!(def.zone_param.is_some(), "{} is zonal without zone_param", key);
            }
        }
    }

    #[test]
    fn test_get_paths_take_an_id() {
        for key in get_all_resource_keys() {
            if let Some(path) = &get_resource(key).unwrap().get_path {
                assert!(path.contains("{id}"), "{} get_path lacks {{id}}", key);
            }
        }
    }

    #[test]
    fn test_get_all_resource_keys() {
        let keys = get_all_resource_keys();
        assert!(keys.contains(&"core_instance"));
        assert!(keys.contains(&"identity_user"));
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
