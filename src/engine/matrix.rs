//! Dimension Enumerator
//!
//! Expands a connection's regions and the tenancy's compartment tree into the
//! ordered set of matrix cells a list or get is replayed over.
//!
//! Order is region (as configured), then compartment (root first, then
//! depth-first with siblings sorted by OCID), then availability domain
//! (sorted by name).

use super::lister::{ListCall, ListRequest, Page, PaginatedLister};
use super::query::{QueryContext, RowBudget};
use super::hydrate::HydrateKey;
use crate::error::{EngineError, RemoteError};
use async_trait::async_trait;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// One fan-out unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MatrixCell {
    pub region: String,
    pub compartment: String,
    pub zone: Option<String>,
}

impl MatrixCell {
    pub fn new(region: &str, compartment: &str, zone: Option<&str>) -> Self {
        Self {
            region: region.to_string(),
            compartment: compartment.to_string(),
            zone: zone.map(|z| z.to_string()),
        }
    }
}

impl fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region={} compartment={}", self.region, self.compartment)?;
        if let Some(zone) = &self.zone {
            write!(f, " zone={}", zone)?;
        }
        Ok(())
    }
}

/// Which dimensions a resource kind fans out over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceScope {
    /// One cell: primary region, root compartment
    Global,
    /// Every region, root compartment
    Regional,
    /// Primary region, every compartment
    Compartment,
    /// Every region crossed with every compartment
    RegionalCompartment,
    /// Every region, compartment and availability domain
    Zonal,
}

impl ResourceScope {
    pub fn is_zonal(self) -> bool {
        matches!(self, Self::Zonal)
    }

    fn spans_regions(self) -> bool {
        matches!(self, Self::Regional | Self::RegionalCompartment | Self::Zonal)
    }

    fn spans_compartments(self) -> bool {
        matches!(self, Self::Compartment | Self::RegionalCompartment | Self::Zonal)
    }
}

/// Tenancy record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenancy {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub home_region_key: Option<String>,
}

/// Compartment summary as returned by the compartment listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compartment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub compartment_id: Option<String>,
    #[serde(default)]
    pub lifecycle_state: Option<String>,
}

impl Compartment {
    fn is_active(&self) -> bool {
        self.lifecycle_state.as_deref().map_or(true, |s| s == "ACTIVE")
    }
}

/// Remote lookups the enumerator depends on
#[async_trait]
pub trait Topology: Send + Sync {
    async fn tenancy(&self, tenancy_id: &str, region: &str) -> Result<Tenancy, RemoteError>;

    /// One page of the compartments under `tenancy_id` (whole subtree)
    async fn compartment_page(
        &self,
        tenancy_id: &str,
        region: &str,
        request: ListRequest<'_>,
    ) -> Result<Page<Compartment>, RemoteError>;

    async fn availability_domains(
        &self,
        tenancy_id: &str,
        region: &str,
    ) -> Result<Vec<String>, RemoteError>;
}

pub type SharedTopology = Arc<dyn Topology>;

/// The cell point lookups are anchored to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalAnchor {
    /// The root compartment, or the first enumerated compartment when a
    /// restriction leaves the root out
    pub compartment: String,
    pub primary_region: String,
    /// First availability domain of each region (zonal scopes only)
    pub primary_zones: BTreeMap<String, String>,
}

/// Result of one enumeration
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub scope: ResourceScope,
    pub cells: Vec<MatrixCell>,
    pub anchor: CanonicalAnchor,
}

/// Build cells from already-resolved dimensions. Pure and deterministic.
///
/// `compartments` must already be in enumeration order; zones are sorted here.
pub fn build_matrix(
    scope: ResourceScope,
    regions: &[String],
    root: &str,
    compartments: &[String],
    zones: &BTreeMap<String, Vec<String>>,
) -> Result<Matrix, EngineError> {
    let Some(primary) = regions.first() else {
        return Err(EngineError::NoRegions);
    };

    let regions: &[String] = if scope.spans_regions() {
        regions
    } else {
        std::slice::from_ref(primary)
    };

    let root_only = [root.to_string()];
    let compartments: &[String] = if scope.spans_compartments() && !compartments.is_empty() {
        compartments
    } else {
        &root_only
    };

    let anchor_compartment = if compartments.iter().any(|c| c == root) {
        root
    } else {
        compartments[0].as_str()
    };

    let mut anchor = CanonicalAnchor {
        compartment: anchor_compartment.to_string(),
        primary_region: primary.clone(),
        primary_zones: BTreeMap::new(),
    };

    let mut cells = IndexSet::new();
    for region in regions {
        if scope.is_zonal() {
            let mut region_zones = zones.get(region).cloned().unwrap_or_default();
            region_zones.sort();
            region_zones.dedup();
            if let Some(first) = region_zones.first() {
                anchor.primary_zones.insert(region.clone(), first.clone());
            }
            for compartment in compartments {
                for zone in &region_zones {
                    cells.insert(MatrixCell::new(region, compartment, Some(zone)));
                }
            }
        } else {
            for compartment in compartments {
                cells.insert(MatrixCell::new(region, compartment, None));
            }
        }
    }

    Ok(Matrix {
        scope,
        cells: cells.into_iter().collect(),
        anchor,
    })
}

/// Order a flat compartment listing: root first, then depth-first with
/// siblings sorted by id. Inactive compartments are dropped. Subtrees whose
/// parent is unknown follow the root's subtree, in id order.
pub fn order_compartments(root: &str, listing: &[Compartment]) -> Vec<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let active: Vec<&Compartment> = listing
        .iter()
        .filter(|c| c.is_active() && c.id != root)
        .collect();
    let known: IndexSet<&str> = active.iter().map(|c| c.id.as_str()).collect();

    let mut orphans = Vec::new();
    for compartment in &active {
        match compartment.compartment_id.as_deref() {
            Some(parent) if parent == root || known.contains(parent) => {
                children.entry(parent).or_default().push(compartment.id.as_str());
            }
            _ => orphans.push(compartment.id.as_str()),
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_unstable();
    }
    orphans.sort_unstable();

    let mut ordered: IndexSet<String> = IndexSet::new();
    for start in std::iter::once(root).chain(orphans) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !ordered.insert(id.to_string()) {
                continue;
            }
            if let Some(kids) = children.get(id) {
                stack.extend(kids.iter().rev().copied());
            }
        }
    }
    ordered.into_iter().collect()
}

/// Apply a connection's compartment restriction to an ordered list
fn restrict(ordered: Vec<String>, allowed: &[String]) -> Vec<String> {
    let mut kept: IndexSet<String> = ordered
        .into_iter()
        .filter(|id| allowed.contains(id))
        .collect();
    for id in allowed {
        kept.insert(id.clone());
    }
    kept.into_iter().collect()
}

struct CompartmentListing {
    topology: SharedTopology,
}

#[async_trait]
impl ListCall for CompartmentListing {
    type Item = Compartment;

    fn service_max_page_size(&self) -> usize {
        1000
    }

    async fn list_page(
        &self,
        cell: &MatrixCell,
        request: ListRequest<'_>,
    ) -> Result<Page<Compartment>, RemoteError> {
        self.topology
            .compartment_page(&cell.compartment, &cell.region, request)
            .await
    }
}

/// Tenancy record, resolved once per query
pub async fn tenancy(ctx: &QueryContext, topology: &SharedTopology) -> Result<Tenancy, EngineError> {
    let connection = ctx.connection();
    let region = connection.primary_region().ok_or(EngineError::NoRegions)?.to_string();
    let tenancy_id = connection.tenancy_id.clone();
    let key = HydrateKey::new("tenancy", &connection.identity());
    let cell = MatrixCell::new(&region, &tenancy_id, None);

    ctx.hydrate()
        .get_or_compute(key, || {
            let ctx = ctx.clone();
            let topology = topology.clone();
            async move {
                ctx.retry()
                    .run("tenancy", ctx.cancel_token(), || topology.tenancy(&tenancy_id, &region))
                    .await
                    .map_err(|e| EngineError::remote_for("tenancy", &cell, &tenancy_id, e))
            }
        })
        .await
}

/// Ordered compartment ids (root first). Falls back to the root compartment
/// alone when the tree can't be read.
pub async fn compartments(
    ctx: &QueryContext,
    topology: &SharedTopology,
) -> Result<Vec<String>, EngineError> {
    let connection = ctx.connection();
    let region = connection.primary_region().ok_or(EngineError::NoRegions)?.to_string();
    let root = connection.tenancy_id.clone();
    let key = HydrateKey::new("compartments", &connection.identity());

    let tree = ctx
        .hydrate()
        .get_or_compute(key, || {
            let ctx = ctx.clone();
            let listing = CompartmentListing {
                topology: topology.clone(),
            };
            async move {
                let cell = MatrixCell::new(&region, &root, None);
                let budget = RowBudget::unlimited();
                let (items, _) = PaginatedLister::new(&ctx, &listing)
                    .with_budget(&budget)
                    .collect(&cell, &[])
                    .await?;
                Ok(order_compartments(&root, &items))
            }
        })
        .await;

    let ordered = match tree {
        Ok(ordered) => ordered,
        Err(err) if err.is_cancelled() => return Err(err),
        Err(err) => {
            tracing::warn!(
                query_id = %ctx.query_id,
                "compartment tree unavailable, using root compartment only: {}",
                err
            );
            vec![connection.tenancy_id.clone()]
        }
    };

    Ok(match &connection.compartments {
        Some(allowed) => restrict(ordered, allowed),
        None => ordered,
    })
}

/// Availability domains of a region
pub async fn zones(
    ctx: &QueryContext,
    topology: &SharedTopology,
    region: &str,
) -> Result<Vec<String>, EngineError> {
    let connection = ctx.connection();
    let root = connection.tenancy_id.clone();
    let region = region.to_string();
    let key = HydrateKey::new("availability_domains", &connection.identity()).with_argument(&region);

    ctx.hydrate()
        .get_or_compute(key, || {
            let ctx = ctx.clone();
            let topology = topology.clone();
            async move {
                let cell = MatrixCell::new(&region, &root, None);
                ctx.retry()
                    .run("availability_domains", ctx.cancel_token(), || {
                        topology.availability_domains(&root, &region)
                    })
                    .await
                    .map_err(|e| EngineError::remote("availability_domains", &cell, e))
            }
        })
        .await
}

/// Enumerate the matrix for a resource scope
pub async fn enumerate(
    ctx: &QueryContext,
    topology: &SharedTopology,
    scope: ResourceScope,
) -> Result<Matrix, EngineError> {
    let connection = ctx.connection();
    if connection.regions.is_empty() {
        return Err(EngineError::NoRegions);
    }

    let compartment_ids = if scope.spans_compartments() {
        compartments(ctx, topology).await?
    } else {
        Vec::new()
    };

    let mut zone_map = BTreeMap::new();
    if scope.is_zonal() {
        for region in &connection.regions {
            zone_map.insert(region.clone(), zones(ctx, topology, region).await?);
        }
    }

    let matrix = build_matrix(
        scope,
        &connection.regions,
        &connection.tenancy_id,
        &compartment_ids,
        &zone_map,
    )?;
    tracing::debug!(
        query_id = %ctx.query_id,
        ?scope,
        cells = matrix.cells.len(),
        "matrix enumerated"
    );
    Ok(matrix)
}
