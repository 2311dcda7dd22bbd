//! Resource Fetcher
//!
//! Generic REST-backed list and get calls driven by [`ResourceDef`]s, plus the
//! table runner that replays a table over its matrix cells.

use super::registry::{get_resource, ResourceDef};
use crate::engine::detail::{DetailResolver, GetCall, ResourceIdentity};
use crate::engine::lister::{ListCall, ListRequest, Page, PaginatedLister, ResourceFilter, RowSink, StopReason};
use crate::engine::matrix::{self, MatrixCell, SharedTopology, Tenancy};
use crate::engine::query::QueryContext;
use crate::engine::tags::merge_tags;
use crate::error::{EngineError, RemoteError};
use crate::oci::client::OciClient;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// List and get calls for one resource definition
pub struct RestTable<'a> {
    client: &'a OciClient,
    def: &'a ResourceDef,
}

impl<'a> RestTable<'a> {
    pub fn new(client: &'a OciClient, def: &'a ResourceDef) -> Self {
        Self { client, def }
    }

    fn list_params(&self, cell: &MatrixCell, request: &ListRequest<'_>) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .def
            .list_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(param) = &self.def.compartment_param {
            params.push((param.clone(), cell.compartment.clone()));
        }
        if let (Some(param), Some(zone)) = (&self.def.zone_param, &cell.zone) {
            params.push((param.clone(), zone.clone()));
        }
        for filter in request.filters {
            for value in &filter.values {
                params.push((filter.param.clone(), value.clone()));
            }
        }

        params.push(("limit".to_string(), request.page_size.to_string()));
        if let Some(token) = request.page_token {
            params.push(("page".to_string(), token.to_string()));
        }
        params
    }
}

#[async_trait]
impl ListCall for RestTable<'_> {
    type Item = Value;

    fn service_max_page_size(&self) -> usize {
        self.def.max_page_size
    }

    async fn list_page(
        &self,
        cell: &MatrixCell,
        request: ListRequest<'_>,
    ) -> Result<Page<Value>, RemoteError> {
        let params = self.list_params(cell, &request);
        let url = self.client.api_url(
            &self.def.service,
            &cell.region,
            &self.def.api_version,
            &self.def.list_path,
            &params,
        )?;
        let response = self.client.get(&url).await?;

        let items = extract_items(&response.body, &self.def.response_path)
            .into_iter()
            .map(|item| post_process_item(item, cell))
            .collect();

        Ok(Page {
            items,
            next_page_token: response.next_page,
        })
    }
}

#[async_trait]
impl GetCall for RestTable<'_> {
    type Summary = Value;
    type Item = Value;

    fn resource_type(&self) -> Option<&str> {
        self.def.ocid_type.as_deref()
    }

    fn from_summary(&self, summary: &Value) -> Option<Value> {
        self.def.summary_is_complete.then(|| summary.clone())
    }

    async fn get(&self, cell: &MatrixCell, identity: &ResourceIdentity) -> Result<Value, RemoteError> {
        let Some(path) = &self.def.get_path else {
            return Err(RemoteError::Invalid {
                status: 0,
                message: format!("{} has no get operation", self.def.display_name),
            });
        };

        let url = self.client.api_url(
            &self.def.service,
            &cell.region,
            &self.def.api_version,
            &path.replace("{id}", identity.as_str()),
            &[],
        )?;
        let response = self.client.get(&url).await?;
        Ok(post_process_item(response.body, cell))
    }
}

/// Extract items from response using the response_path
fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return response.as_array().cloned().unwrap_or_default();
    }

    let mut current = response;
    for part in path.split('.') {
        current = match current.get(part) {
            Some(v) => v,
            None => return vec![],
        };
    }

    current.as_array().cloned().unwrap_or_default()
}

/// Add the location and tag columns every table shares
fn post_process_item(mut item: Value, cell: &MatrixCell) -> Value {
    let tags = merge_tags(&item);

    if let Value::Object(ref mut map) = item {
        let compartment = map
            .get("compartmentId")
            .and_then(|v| v.as_str())
            .unwrap_or(&cell.compartment)
            .to_string();

        let title = map
            .get("displayName")
            .or_else(|| map.get("name"))
            .cloned()
            .unwrap_or(Value::Null);

        map.insert("region".to_string(), Value::String(cell.region.clone()));
        map.insert("compartment_id".to_string(), Value::String(compartment));
        map.insert("tags".to_string(), Value::Object(tags));
        map.insert("title".to_string(), title);

        if let Some(created) = map.get("timeCreated").and_then(|v| v.as_str()) {
            let short = format_timestamp_short(created);
            map.insert("timeCreated_short".to_string(), Value::String(short));
        }
    }

    item
}

/// Format timestamp to short form
fn format_timestamp_short(timestamp: &str) -> String {
    // RFC3339 format: 2023-01-15T10:30:00.000Z
    match timestamp.get(..10) {
        Some(date) => date.to_string(),
        None => timestamp.to_string(),
    }
}

/// Attach tenancy columns to a row
fn add_common_columns(mut row: Value, tenancy: &Tenancy) -> Value {
    if let Value::Object(ref mut map) = row {
        map.insert("tenant_id".to_string(), Value::String(tenancy.id.clone()));
        map.insert(
            "tenant_name".to_string(),
            tenancy.name.clone().map(Value::String).unwrap_or(Value::Null),
        );
    }
    row
}

/// Sink adapter that adds the common columns before forwarding
struct CommonColumns<'s, S: RowSink<Value> + ?Sized> {
    tenancy: &'s Tenancy,
    inner: &'s mut S,
}

impl<S: RowSink<Value> + ?Sized> RowSink<Value> for CommonColumns<'_, S> {
    fn emit(&mut self, item: Value) {
        self.inner.emit(add_common_columns(item, self.tenancy));
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

/// Replace a listed row by its full resource. Rows without an id pass
/// through unchanged; rows gone between list and get are dropped.
async fn detail_row(
    resolver: &DetailResolver<'_, RestTable<'_>>,
    cell: &MatrixCell,
    row: Value,
) -> Result<Option<Value>, EngineError> {
    let Some(id) = row.get("id").and_then(|v| v.as_str()).map(String::from) else {
        return Ok(Some(row));
    };
    resolver.resolve(cell, &id, Some(&row)).await
}

/// Options for [`run_table`]
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    pub filters: Vec<ResourceFilter>,
    /// Hydrate every listed row through the get call (skipped when the
    /// list summary is already complete)
    pub detail: bool,
}

/// Outcome of a table run
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub cells: usize,
    pub cells_listed: usize,
    pub emitted: u64,
    pub pages: u32,
    pub stop: StopReason,
}

fn lookup(key: &str) -> Result<&'static ResourceDef, EngineError> {
    get_resource(key).ok_or_else(|| EngineError::Config(format!("Unknown table: {}", key)))
}

/// List a table across its matrix, one cell after the other, sharing the
/// query's row budget
pub async fn run_table<S>(
    ctx: &QueryContext,
    client: &Arc<OciClient>,
    key: &str,
    options: &TableOptions,
    sink: &mut S,
) -> Result<TableSummary, EngineError>
where
    S: RowSink<Value> + ?Sized,
{
    let def = lookup(key)?;
    let topology: SharedTopology = client.clone();
    let tenancy = matrix::tenancy(ctx, &topology).await?;
    let matrix = matrix::enumerate(ctx, &topology, def.scope).await?;
    let table = RestTable::new(client, def);
    let lister = PaginatedLister::new(ctx, &table);
    let resolver = DetailResolver::new(ctx, &table, def.scope, &matrix.anchor);

    let mut summary = TableSummary {
        table: key.to_string(),
        cells: matrix.cells.len(),
        cells_listed: 0,
        emitted: 0,
        pages: 0,
        stop: StopReason::Exhausted,
    };

    let mut sink = CommonColumns {
        tenancy: &tenancy,
        inner: sink,
    };

    for cell in &matrix.cells {
        let cell_summary = if options.detail && !def.summary_is_complete {
            lister
                .list_mapped(cell, &options.filters, &mut sink, |row| {
                    detail_row(&resolver, cell, row)
                })
                .await?
        } else {
            lister.list(cell, &options.filters, &mut sink).await?
        };

        summary.cells_listed += 1;
        summary.emitted += cell_summary.emitted;
        summary.pages += cell_summary.pages;

        if cell_summary.stop != StopReason::Exhausted {
            summary.stop = cell_summary.stop;
            break;
        }
    }

    tracing::info!(
        query_id = %ctx.query_id,
        table = key,
        cells = summary.cells,
        cells_listed = summary.cells_listed,
        emitted = summary.emitted,
        stop = ?summary.stop,
        "table listed"
    );
    Ok(summary)
}

/// Point lookup by OCID, replayed over the table's matrix the way a host
/// would. Only the canonical cell issues the remote get.
pub async fn get_row(
    ctx: &QueryContext,
    client: &Arc<OciClient>,
    key: &str,
    id: &str,
) -> Result<Option<Value>, EngineError> {
    let def = lookup(key)?;
    if def.get_path.is_none() {
        return Err(EngineError::Config(format!("{} has no get operation", key)));
    }

    let topology: SharedTopology = client.clone();
    let tenancy = matrix::tenancy(ctx, &topology).await?;
    let matrix = matrix::enumerate(ctx, &topology, def.scope).await?;
    let table = RestTable::new(client, def);
    let resolver = DetailResolver::new(ctx, &table, def.scope, &matrix.anchor);

    for cell in &matrix.cells {
        if let Some(row) = resolver.resolve(cell, id, None).await? {
            return Ok(Some(add_common_columns(row, &tenancy)));
        }
    }
    Ok(None)
}
