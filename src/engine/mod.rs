//! Resource enumeration engine
//!
//! Shared by every table: fans one logical list out over regions,
//! compartments and availability domains, walks pagination per cell, resolves
//! point lookups from a single canonical cell and memoizes query-wide lookups.
//!
//! # Module Structure
//!
//! - [`matrix`] - Dimension enumeration into [`matrix::MatrixCell`]s
//! - [`lister`] - Opaque-token pagination under a shared row budget
//! - [`detail`] - Point lookups and the canonical-cell predicate
//! - [`hydrate`] - Single-flight, query-scoped memoization
//! - [`retry`] - Bounded exponential backoff around remote calls
//! - [`tags`] - Free-form / defined / system tag merging
//! - [`query`] - Per-query context and row budget

pub mod detail;
pub mod hydrate;
pub mod lister;
pub mod matrix;
pub mod query;
pub mod region;
pub mod retry;
pub mod tags;

pub use detail::{is_canonical_cell, DetailResolver, GetCall, ResourceIdentity};
pub use hydrate::{HydrateCache, HydrateKey};
pub use lister::{
    ListCall, ListRequest, ListSummary, Page, PaginatedLister, ResourceFilter, RowSink, StopReason,
};
pub use matrix::{
    enumerate, CanonicalAnchor, Compartment, Matrix, MatrixCell, ResourceScope, SharedTopology,
    Tenancy, Topology,
};
pub use query::{QueryContext, RowBudget};
pub use retry::RetryPolicy;
pub use tags::{merge, merge_tags, HasTags, TagBundle};
