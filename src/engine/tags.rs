//! Tag Normalizer
//!
//! Resources carry up to three tag maps: free-form tags (`key -> string`),
//! defined tags and system tags (`namespace -> key -> value`). They are
//! flattened into one presentation map keyed by tag key, namespaces dropped.
//! On collisions system tags win over defined tags, which win over free-form
//! tags. Within defined (or system) tags, namespaces are applied in name order,
//! so the last namespace alphabetically wins a collision.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Tag maps of one resource item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagBundle {
    pub freeform: BTreeMap<String, String>,
    pub defined: BTreeMap<String, Map<String, Value>>,
    pub system: Option<BTreeMap<String, Map<String, Value>>>,
}

/// Capability of any resource representation (summary or full) that carries tags
pub trait HasTags {
    fn tags(&self) -> TagBundle;
}

impl TagBundle {
    pub fn is_empty(&self) -> bool {
        self.freeform.is_empty()
            && self.defined.is_empty()
            && self.system.as_ref().map_or(true, |s| s.is_empty())
    }

    /// Read `freeformTags`, `definedTags` and `systemTags` off a JSON item
    pub fn from_json(item: &Value) -> Self {
        let freeform = item
            .get("freeformTags")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            freeform,
            defined: namespaced(item.get("definedTags")).unwrap_or_default(),
            system: namespaced(item.get("systemTags")),
        }
    }
}

fn namespaced(value: Option<&Value>) -> Option<BTreeMap<String, Map<String, Value>>> {
    let map = value?.as_object()?;
    Some(
        map.iter()
            .filter_map(|(ns, tags)| tags.as_object().map(|t| (ns.clone(), t.clone())))
            .collect(),
    )
}

impl HasTags for Value {
    fn tags(&self) -> TagBundle {
        TagBundle::from_json(self)
    }
}

impl HasTags for TagBundle {
    fn tags(&self) -> TagBundle {
        self.clone()
    }
}

/// Merge a bundle into one map. Never returns null: no tags gives an empty map.
pub fn merge(bundle: &TagBundle) -> Map<String, Value> {
    let mut merged = Map::new();

    for (key, value) in &bundle.freeform {
        merged.insert(key.clone(), Value::String(value.clone()));
    }

    for tags in bundle.defined.values() {
        for (key, value) in tags {
            merged.insert(key.clone(), value.clone());
        }
    }

    if let Some(system) = &bundle.system {
        for tags in system.values() {
            for (key, value) in tags {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    merged
}

/// [`merge`] for anything that exposes its tags
pub fn merge_tags<T: HasTags + ?Sized>(item: &T) -> Map<String, Value> {
    merge(&item.tags())
}
