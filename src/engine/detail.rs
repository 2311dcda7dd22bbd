//! Detail Resolver
//!
//! Resolves a single resource by OCID. A list summary already in hand is
//! reused when it carries everything the table needs. Direct point lookups
//! only go out from the canonical cell, so replaying a lookup across the whole
//! matrix costs one remote call rather than one per cell.

use super::matrix::{CanonicalAnchor, MatrixCell, ResourceScope};
use super::query::QueryContext;
use super::region;
use crate::error::{EngineError, RemoteError};
use async_trait::async_trait;
use std::fmt;

/// Parsed OCID: `ocid1.<type>.<realm>.<region>[.<future>].<unique>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    raw: String,
    pub resource_type: String,
    pub realm: String,
    /// Region key or name, empty for region-less resources
    pub region: String,
    pub unique: String,
}

impl ResourceIdentity {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() < 5 || parts.len() > 6 || parts[0] != "ocid1" {
            return None;
        }

        let segment_ok = |s: &str| {
            s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        };
        if !parts.iter().skip(1).all(|s| segment_ok(*s)) {
            return None;
        }

        let unique = parts[parts.len() - 1];
        if parts[1].is_empty() || parts[2].is_empty() || unique.is_empty() {
            return None;
        }

        Some(Self {
            raw: raw.to_string(),
            resource_type: parts[1].to_string(),
            realm: parts[2].to_string(),
            region: parts[3].to_string(),
            unique: unique.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this resource can live in the cell's region
    pub fn matches_region(&self, region: &str) -> bool {
        region::segment_matches_region(&self.region, region)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Whether `cell` is the designated cell for point lookups of a resource kind:
/// the anchor compartment (the root unless restricted away), the primary
/// region for scopes that don't span regions, and the region's first
/// availability domain for zonal scopes.
pub fn is_canonical_cell(cell: &MatrixCell, scope: ResourceScope, anchor: &CanonicalAnchor) -> bool {
    if cell.compartment != anchor.compartment {
        return false;
    }

    match scope {
        ResourceScope::Global | ResourceScope::Compartment => cell.region == anchor.primary_region,
        ResourceScope::Regional | ResourceScope::RegionalCompartment => true,
        ResourceScope::Zonal => match (&cell.zone, anchor.primary_zones.get(&cell.region)) {
            (Some(zone), Some(primary)) => zone == primary,
            _ => false,
        },
    }
}

/// A resource-specific remote get call
#[async_trait]
pub trait GetCall: Send + Sync {
    /// List representation that may already satisfy a lookup
    type Summary: Sync;
    type Item: Send;

    /// Expected OCID type segment (`instance`, `volume`, ...)
    fn resource_type(&self) -> Option<&str> {
        None
    }

    /// Build the item from a list summary, when the summary is enough
    fn from_summary(&self, _summary: &Self::Summary) -> Option<Self::Item> {
        None
    }

    async fn get(
        &self,
        cell: &MatrixCell,
        identity: &ResourceIdentity,
    ) -> Result<Self::Item, RemoteError>;
}

pub struct DetailResolver<'a, G: GetCall + ?Sized> {
    ctx: &'a QueryContext,
    call: &'a G,
    scope: ResourceScope,
    anchor: &'a CanonicalAnchor,
}

impl<'a, G: GetCall + ?Sized> DetailResolver<'a, G> {
    pub fn new(
        ctx: &'a QueryContext,
        call: &'a G,
        scope: ResourceScope,
        anchor: &'a CanonicalAnchor,
    ) -> Self {
        Self {
            ctx,
            call,
            scope,
            anchor,
        }
    }

    /// Resolve `id` from `cell`.
    ///
    /// `Ok(None)` means absent: malformed or foreign identifier, non-canonical
    /// cell for a direct lookup, or not found remotely.
    pub async fn resolve(
        &self,
        cell: &MatrixCell,
        id: &str,
        ambient: Option<&G::Summary>,
    ) -> Result<Option<G::Item>, EngineError> {
        if self.ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let Some(identity) = ResourceIdentity::parse(id) else {
            tracing::debug!(id, "malformed identifier, skipping lookup");
            return Ok(None);
        };

        if let Some(expected) = self.call.resource_type() {
            if identity.resource_type != expected {
                return Ok(None);
            }
        }

        match ambient {
            Some(summary) => {
                if let Some(item) = self.call.from_summary(summary) {
                    return Ok(Some(item));
                }
            }
            None => {
                if !is_canonical_cell(cell, self.scope, self.anchor)
                    || !identity.matches_region(&cell.region)
                {
                    return Ok(None);
                }
            }
        }

        self.fetch(cell, &identity).await
    }

    async fn fetch(
        &self,
        cell: &MatrixCell,
        identity: &ResourceIdentity,
    ) -> Result<Option<G::Item>, EngineError> {
        tracing::debug!(
            query_id = %self.ctx.query_id,
            region = %cell.region,
            id = %identity,
            "get"
        );

        let result = self
            .ctx
            .retry()
            .run("get", self.ctx.cancel_token(), || self.call.get(cell, identity))
            .await;

        match result {
            Ok(item) => Ok(Some(item)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(EngineError::remote_for("get", cell, identity.as_str(), err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Connection;
    use crate::engine::retry::RetryPolicy;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ROOT: &str = "ocid1.tenancy.oc1..root";
    const INSTANCE: &str = "ocid1.instance.oc1.iad.anuwcljexample";

    #[derive(Clone, Debug, PartialEq)]
    struct Summary {
        id: String,
        complete: bool,
    }

    struct GetStub {
        calls: AtomicUsize,
        result: Result<&'static str, RemoteError>,
    }

    impl GetStub {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Ok("full"),
            }
        }

        fn failing(err: RemoteError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Err(err),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GetCall for GetStub {
        type Summary = Summary;
        type Item = String;

        fn resource_type(&self) -> Option<&str> {
            Some("instance")
        }

        fn from_summary(&self, summary: &Summary) -> Option<String> {
            summary.complete.then(|| format!("summary:{}", summary.id))
        }

        async fn get(
            &self,
            _cell: &MatrixCell,
            identity: &ResourceIdentity,
        ) -> Result<String, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map(|kind| format!("{}:{}", kind, identity))
        }
    }

    fn ctx() -> QueryContext {
        let connection = Connection::new(
            "test",
            ROOT,
            vec!["us-ashburn-1".to_string(), "us-phoenix-1".to_string()],
        )
        .into_shared();
        QueryContext::new(connection, None).with_retry(RetryPolicy {
            max_attempts: 3,
            min_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        })
    }

    fn anchor() -> CanonicalAnchor {
        CanonicalAnchor {
            compartment: ROOT.to_string(),
            primary_region: "us-ashburn-1".to_string(),
            primary_zones: BTreeMap::from([
                ("us-ashburn-1".to_string(), "AD-1".to_string()),
                ("us-phoenix-1".to_string(), "PHX-AD-1".to_string()),
            ]),
        }
    }

    #[test]
    fn test_parse_identity() {
        let identity = ResourceIdentity::parse(INSTANCE).unwrap();
        assert_eq!(identity.resource_type, "instance");
        assert_eq!(identity.realm, "oc1");
        assert_eq!(identity.region, "iad");
        assert_eq!(identity.unique, "anuwcljexample");
        assert!(identity.matches_region("us-ashburn-1"));
        assert!(!identity.matches_region("us-phoenix-1"));

        let tenancy = ResourceIdentity::parse(ROOT).unwrap();
        assert_eq!(tenancy.region, "");
        assert!(tenancy.matches_region("us-phoenix-1"));

        assert!(ResourceIdentity::parse("").is_none());
        assert!(ResourceIdentity::parse("i-12345").is_none());
        assert!(ResourceIdentity::parse("ocid1.instance.oc1.iad.").is_none());
    }

    #[test]
    fn test_canonical_predicate() {
        let anchor = anchor();
        let root_ad1 = MatrixCell::new("us-ashburn-1", ROOT, Some("AD-1"));
        let root_ad2 = MatrixCell::new("us-ashburn-1", ROOT, Some("AD-2"));
        let child = MatrixCell::new("us-ashburn-1", "ocid1.compartment.oc1..child", Some("AD-1"));
        let phx = MatrixCell::new("us-phoenix-1", ROOT, None);

        assert!(is_canonical_cell(&root_ad1, ResourceScope::Zonal, &anchor));
        assert!(!is_canonical_cell(&root_ad2, ResourceScope::Zonal, &anchor));
        assert!(!is_canonical_cell(&child, ResourceScope::Zonal, &anchor));
        assert!(is_canonical_cell(&phx, ResourceScope::Regional, &anchor));
        assert!(!is_canonical_cell(&phx, ResourceScope::Global, &anchor));
        assert!(!is_canonical_cell(
            &MatrixCell::new("us-phoenix-1", ROOT, None),
            ResourceScope::Zonal,
            &anchor
        ));
    }

    #[tokio::test]
    async fn test_non_canonical_cell_skips_call() {
        let ctx = ctx();
        let stub = GetStub::ok();
        let anchor = anchor();
        let resolver = DetailResolver::new(&ctx, &stub, ResourceScope::Zonal, &anchor);

        let cell = MatrixCell::new("us-ashburn-1", ROOT, Some("AD-2"));
        assert_eq!(resolver.resolve(&cell, INSTANCE, None).await.unwrap(), None);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_canonical_cell_calls_once() {
        let ctx = ctx();
        let stub = GetStub::ok();
        let anchor = anchor();
        let resolver = DetailResolver::new(&ctx, &stub, ResourceScope::Zonal, &anchor);

        let cell = MatrixCell::new("us-ashburn-1", ROOT, Some("AD-1"));
        let item = resolver.resolve(&cell, INSTANCE, None).await.unwrap();
        assert_eq!(item.as_deref(), Some(format!("full:{INSTANCE}").as_str()));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_region_segment_mismatch_skips_call() {
        let ctx = ctx();
        let stub = GetStub::ok();
        let anchor = anchor();
        let resolver = DetailResolver::new(&ctx, &stub, ResourceScope::Regional, &anchor);

        let phx = MatrixCell::new("us-phoenix-1", ROOT, None);
        assert_eq!(resolver.resolve(&phx, INSTANCE, None).await.unwrap(), None);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_ambient_summary_reused() {
        let ctx = ctx();
        let stub = GetStub::ok();
        let anchor = anchor();
        let resolver = DetailResolver::new(&ctx, &stub, ResourceScope::Zonal, &anchor);
        let cell = MatrixCell::new("us-ashburn-1", "ocid1.compartment.oc1..child", Some("AD-3"));

        let complete = Summary {
            id: INSTANCE.to_string(),
            complete: true,
        };
        let item = resolver.resolve(&cell, INSTANCE, Some(&complete)).await.unwrap();
        assert_eq!(item, Some(format!("summary:{INSTANCE}")));
        assert_eq!(stub.calls(), 0);

        // a partial summary needs the remote call, from whatever cell produced it
        let partial = Summary {
            complete: false,
            ..complete
        };
        let item = resolver.resolve(&cell, INSTANCE, Some(&partial)).await.unwrap();
        assert_eq!(item, Some(format!("full:{INSTANCE}")));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_foreign_ids_are_absent() {
        let ctx = ctx();
        let stub = GetStub::ok();
        let anchor = anchor();
        let resolver = DetailResolver::new(&ctx, &stub, ResourceScope::Zonal, &anchor);
        let cell = MatrixCell::new("us-ashburn-1", ROOT, Some("AD-1"));

        assert_eq!(resolver.resolve(&cell, "", None).await.unwrap(), None);
        assert_eq!(resolver.resolve(&cell, "not-an-ocid", None).await.unwrap(), None);
        assert_eq!(
            resolver
                .resolve(&cell, "ocid1.volume.oc1.iad.abc", None)
                .await
                .unwrap(),
            None
        );
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_absent() {
        let ctx = ctx();
        let stub = GetStub::failing(RemoteError::NotFound);
        let anchor = anchor();
        let resolver = DetailResolver::new(&ctx, &stub, ResourceScope::Regional, &anchor);
        let cell = MatrixCell::new("us-ashburn-1", ROOT, None);

        assert_eq!(resolver.resolve(&cell, INSTANCE, None).await.unwrap(), None);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let ctx = ctx();
        let stub = GetStub::failing(RemoteError::Transport("connection reset".to_string()));
        let anchor = anchor();
        let resolver = DetailResolver::new(&ctx, &stub, ResourceScope::Regional, &anchor);
        let cell = MatrixCell::new("us-ashburn-1", ROOT, None);

        let err = resolver.resolve(&cell, INSTANCE, None).await.unwrap_err();
        assert!(matches!(err.remote_source(), Some(RemoteError::Transport(_))));
        assert!(err.to_string().contains(INSTANCE));
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_query_is_not_a_failure() {
        let ctx = ctx();
        ctx.cancel();
        let stub = GetStub::ok();
        let anchor = anchor();
        let resolver = DetailResolver::new(&ctx, &stub, ResourceScope::Regional, &anchor);
        let cell = MatrixCell::new("us-ashburn-1", ROOT, None);

        let err = resolver.resolve(&cell, INSTANCE, None).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(stub.calls(), 0);
    }
}
