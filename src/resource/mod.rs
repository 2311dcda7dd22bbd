//! Resource tables
//!
//! This module provides a data-driven approach to OCI resource tables.
//! Table definitions are loaded from JSON files at compile time, so a new
//! list/get pair on an existing service needs no code changes.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches table definitions from embedded JSON
//! - [`fetcher`] - Generic list/get calls and the table runner
//!
//! # Resource Definitions
//!
//! Tables are defined in JSON files under `src/resources/`:
//! - `core.json` - Compute and networking (instances, volumes, VCNs)
//! - `identity.json` - Identity (users, policies, availability domains)
//! - `certificates.json` - Certificates management
//!
//! # Example
//!
//! ```ignore
//! use ocirows::resource::{run_table, TableOptions};
//!
//! async fn list_instances(ctx: &QueryContext, client: &Arc<OciClient>) -> ocirows::error::Result<Vec<Value>> {
//!     let mut rows = Vec::new();
//!     run_table(ctx, client, "core_instance", &TableOptions::default(), &mut rows).await?;
//!     Ok(rows)
//! }
//! ```

mod fetcher;
mod registry;

pub use fetcher::{get_row, run_table, RestTable, TableOptions, TableSummary};
pub use registry::*;
