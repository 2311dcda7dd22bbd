//! Paginated Lister
//!
//! Walks opaque-token pagination for one matrix cell, streaming items to a
//! [`RowSink`] while honouring the query's row budget and cancellation.
//!
//! Budget and cancellation are checked after every page fetch and after every
//! emitted item. Once the budget is spent no further page is requested. A
//! cancelled query abandons the in-flight page request.

use super::matrix::MatrixCell;
use super::query::{QueryContext, RowBudget};
use crate::error::{EngineError, RemoteError};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;

/// Filter passed through to the remote list call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFilter {
    pub param: String,
    pub values: Vec<String>,
}

impl ResourceFilter {
    pub fn new(param: &str, values: Vec<String>) -> Self {
        Self {
            param: param.to_string(),
            values,
        }
    }

    /// Parse `param=value[,value...]`
    pub fn parse(expr: &str) -> Option<Self> {
        let (param, values) = expr.split_once('=')?;
        let param = param.trim();
        if param.is_empty() {
            return None;
        }
        let values = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
        Some(Self::new(param, values))
    }
}

/// One page request
#[derive(Debug, Clone, Copy)]
pub struct ListRequest<'a> {
    pub filters: &'a [ResourceFilter],
    pub page_token: Option<&'a str>,
    pub page_size: usize,
}

/// One page of results
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }

    pub fn with_next(items: Vec<T>, token: &str) -> Self {
        Self {
            items,
            next_page_token: Some(token.to_string()),
        }
    }
}

/// A resource-specific remote list call
#[async_trait]
pub trait ListCall: Send + Sync {
    type Item: Send;

    /// Largest page the service accepts
    fn service_max_page_size(&self) -> usize;

    async fn list_page(
        &self,
        cell: &MatrixCell,
        request: ListRequest<'_>,
    ) -> Result<Page<Self::Item>, RemoteError>;
}

/// Host-side receiver of listed rows
pub trait RowSink<T>: Send {
    fn emit(&mut self, item: T);

    /// Host-side stop signal, polled after every item
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<T: Send> RowSink<T> for Vec<T> {
    fn emit(&mut self, item: T) {
        self.push(item);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The remote returned no next-page token
    Exhausted,
    /// The row budget reached zero
    BudgetReached,
    /// The query or the sink was cancelled
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListSummary {
    pub emitted: u64,
    pub pages: u32,
    pub stop: StopReason,
}

pub struct PaginatedLister<'a, C: ListCall + ?Sized> {
    ctx: &'a QueryContext,
    call: &'a C,
    budget: &'a RowBudget,
}

impl<'a, C: ListCall + ?Sized> PaginatedLister<'a, C> {
    /// Lister drawing on the query's shared row budget
    pub fn new(ctx: &'a QueryContext, call: &'a C) -> Self {
        Self {
            ctx,
            call,
            budget: ctx.budget(),
        }
    }

    /// Use a separate budget (internal lookups that must not consume query rows)
    pub fn with_budget(mut self, budget: &'a RowBudget) -> Self {
        self.budget = budget;
        self
    }

    fn stopped<T, S: RowSink<T> + ?Sized>(&self, sink: &S) -> bool {
        self.ctx.is_cancelled() || sink.is_cancelled()
    }

    fn page_size(&self, remaining: Option<u64>) -> usize {
        let max = self.call.service_max_page_size().max(1);
        match remaining {
            Some(n) => (n.min(max as u64) as usize).max(1),
            None => max,
        }
    }

    /// List one cell into `sink`
    pub async fn list<S>(
        &self,
        cell: &MatrixCell,
        filters: &[ResourceFilter],
        sink: &mut S,
    ) -> Result<ListSummary, EngineError>
    where
        S: RowSink<C::Item> + ?Sized,
    {
        self.list_mapped(cell, filters, sink, |item| async move {
            Ok::<_, EngineError>(Some(item))
        })
        .await
    }

    /// List one cell, passing every item through `map` before it is emitted.
    ///
    /// A budget row is only taken for items `map` keeps, so dropped items
    /// don't count against the query and aren't reported as emitted.
    pub async fn list_mapped<T, S, M, Fut>(
        &self,
        cell: &MatrixCell,
        filters: &[ResourceFilter],
        sink: &mut S,
        mut map: M,
    ) -> Result<ListSummary, EngineError>
    where
        S: RowSink<T> + ?Sized,
        M: FnMut(C::Item) -> Fut,
        Fut: Future<Output = Result<Option<T>, EngineError>>,
    {
        let mut summary = ListSummary {
            emitted: 0,
            pages: 0,
            stop: StopReason::Exhausted,
        };
        let mut token: Option<String> = None;

        loop {
            if self.stopped(sink) {
                summary.stop = StopReason::Cancelled;
                return Ok(summary);
            }

            let remaining = self.budget.remaining();
            if remaining == Some(0) {
                summary.stop = StopReason::BudgetReached;
                return Ok(summary);
            }

            let request = ListRequest {
                filters,
                page_token: token.as_deref(),
                page_size: self.page_size(remaining),
            };

            tracing::debug!(
                query_id = %self.ctx.query_id,
                region = %cell.region,
                compartment = %cell.compartment,
                zone = ?cell.zone,
                page = summary.pages + 1,
                page_size = request.page_size,
                "list page"
            );

            let page = match self
                .ctx
                .retry()
                .run("list", self.ctx.cancel_token(), || self.call.list_page(cell, request))
                .await
            {
                Ok(page) => page,
                Err(RemoteError::Cancelled) => {
                    summary.stop = StopReason::Cancelled;
                    return Ok(summary);
                }
                Err(err) => return Err(EngineError::remote("list", cell, err)),
            };
            summary.pages += 1;

            if self.stopped(sink) {
                summary.stop = StopReason::Cancelled;
                return Ok(summary);
            }

            for item in page.items {
                if self.budget.is_exhausted() {
                    summary.stop = StopReason::BudgetReached;
                    return Ok(summary);
                }

                let kept = match map(item).await {
                    Ok(kept) => kept,
                    Err(err) if err.is_cancelled() => {
                        summary.stop = StopReason::Cancelled;
                        return Ok(summary);
                    }
                    Err(err) => return Err(err),
                };

                if let Some(kept) = kept {
                    // another cell may have taken the last row meanwhile
                    if !self.budget.try_take() {
                        summary.stop = StopReason::BudgetReached;
                        return Ok(summary);
                    }
                    sink.emit(kept);
                    summary.emitted += 1;
                }

                if self.stopped(sink) {
                    summary.stop = StopReason::Cancelled;
                    return Ok(summary);
                }
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => {
                    if self.budget.is_exhausted() {
                        summary.stop = StopReason::BudgetReached;
                        return Ok(summary);
                    }
                    token = Some(next);
                }
                _ => {
                    summary.stop = StopReason::Exhausted;
                    return Ok(summary);
                }
            }
        }
    }

    /// List one cell into a `Vec`
    pub async fn collect(
        &self,
        cell: &MatrixCell,
        filters: &[ResourceFilter],
    ) -> Result<(Vec<C::Item>, ListSummary), EngineError> {
        let mut items = Vec::new();
        let summary = self.list(cell, filters, &mut items).await?;
        Ok((items, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Connection;
    use crate::engine::retry::RetryPolicy;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Serves fixed pages of sequential integers and records each request
    struct PagedStub {
        pages: Vec<usize>,
        max_page_size: usize,
        requests: Mutex<Vec<(Option<String>, usize)>>,
    }

    impl PagedStub {
        fn new(pages: Vec<usize>) -> Self {
            Self {
                pages,
                max_page_size: 1000,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ListCall for PagedStub {
        type Item = usize;

        fn service_max_page_size(&self) -> usize {
            self.max_page_size
        }

        async fn list_page(
            &self,
            _cell: &MatrixCell,
            request: ListRequest<'_>,
        ) -> Result<Page<usize>, RemoteError> {
            self.requests
                .lock()
                .push((request.page_token.map(String::from), request.page_size));
            let index: usize = request.page_token.map_or(0, |t| t.parse().unwrap());
            let start: usize = self.pages[..index].iter().sum();
            let items = (start..start + self.pages[index]).collect();
            if index + 1 < self.pages.len() {
                Ok(Page::with_next(items, &(index + 1).to_string()))
            } else {
                Ok(Page::last(items))
            }
        }
    }

    struct FailingStub;

    #[async_trait]
    impl ListCall for FailingStub {
        type Item = usize;

        fn service_max_page_size(&self) -> usize {
            100
        }

        async fn list_page(
            &self,
            _cell: &MatrixCell,
            _request: ListRequest<'_>,
        ) -> Result<Page<usize>, RemoteError> {
            Err(RemoteError::from_status(403, "NotAuthorizedOrNotFound"))
        }
    }

    struct CancellingSink {
        items: Vec<usize>,
        stop_after: usize,
    }

    impl RowSink<usize> for CancellingSink {
        fn emit(&mut self, item: usize) {
            self.items.push(item);
        }

        fn is_cancelled(&self) -> bool {
            self.items.len() >= self.stop_after
        }
    }

    fn ctx(limit: Option<u64>) -> QueryContext {
        let connection = Connection::new(
            "test",
            "ocid1.tenancy.oc1..root",
            vec!["us-ashburn-1".to_string()],
        )
        .into_shared();
        QueryContext::new(connection, limit).with_retry(RetryPolicy {
            max_attempts: 2,
            min_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        })
    }

    fn cell() -> MatrixCell {
        MatrixCell::new("us-ashburn-1", "ocid1.tenancy.oc1..root", None)
    }

    #[tokio::test]
    async fn test_pagination_completeness() {
        let stub = PagedStub::new(vec![3, 5, 2]);
        let ctx = ctx(None);
        let (items, summary) = PaginatedLister::new(&ctx, &stub)
            .collect(&cell(), &[])
            .await
            .unwrap();

        assert_eq!(items, (0..10).collect::<Vec<_>>());
        assert_eq!(summary.pages, 3);
        assert_eq!(summary.stop, StopReason::Exhausted);
    }

    #[tokio::test]
    async fn test_budget_truncates_mid_page() {
        let stub = PagedStub::new(vec![4, 4, 4]);
        let ctx = ctx(Some(6));
        let (items, summary) = PaginatedLister::new(&ctx, &stub)
            .collect(&cell(), &[])
            .await
            .unwrap();

        assert_eq!(items, (0..6).collect::<Vec<_>>());
        assert_eq!(summary.stop, StopReason::BudgetReached);
        // no third page after the budget ran out in the second
        assert_eq!(stub.requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_page_size_capped_by_budget() {
        let mut stub = PagedStub::new(vec![2, 2, 2]);
        stub.max_page_size = 50;
        let ctx = ctx(Some(5));
        PaginatedLister::new(&ctx, &stub)
            .collect(&cell(), &[])
            .await
            .unwrap();

        let sizes: Vec<usize> = stub.requests.lock().iter().map(|(_, s)| *s).collect();
        assert_eq!(sizes, vec![5, 3, 1]);
    }

    #[tokio::test]
    async fn test_budget_spent_at_page_end_stops() {
        let stub = PagedStub::new(vec![3, 3]);
        let ctx = ctx(Some(3));
        let (items, summary) = PaginatedLister::new(&ctx, &stub)
            .collect(&cell(), &[])
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(summary.stop, StopReason::BudgetReached);
        assert_eq!(stub.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_cancellation_between_items() {
        let stub = PagedStub::new(vec![10, 10]);
        let ctx = ctx(None);
        let mut sink = CancellingSink {
            items: Vec::new(),
            stop_after: 4,
        };
        let summary = PaginatedLister::new(&ctx, &stub)
            .list(&cell(), &[], &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.items, vec![0, 1, 2, 3]);
        assert_eq!(summary.stop, StopReason::Cancelled);
        assert_eq!(stub.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_query_issues_no_request() {
        let stub = PagedStub::new(vec![1]);
        let ctx = ctx(None);
        ctx.cancel();
        let (items, summary) = PaginatedLister::new(&ctx, &stub)
            .collect(&cell(), &[])
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(summary.stop, StopReason::Cancelled);
        assert!(stub.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_attributed_to_cell() {
        let ctx = ctx(None);
        let err = PaginatedLister::new(&ctx, &FailingStub)
            .collect(&cell(), &[])
            .await
            .unwrap_err();

        match err {
            EngineError::Remote { cell: failed, operation, source, .. } => {
                assert_eq!(failed, cell());
                assert_eq!(operation, "list");
                assert!(matches!(source, RemoteError::Unauthorized { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let stub = PagedStub::new(vec![2, 3]);
        let ctx = ctx(None);
        let lister = PaginatedLister::new(&ctx, &stub);
        let (first, _) = lister.collect(&cell(), &[]).await.unwrap();
        let (second, _) = lister.collect(&cell(), &[]).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_dropped_items_keep_their_budget() {
        let stub = PagedStub::new(vec![3, 3]);
        let ctx = ctx(Some(2));
        let mut out: Vec<usize> = Vec::new();
        let summary = PaginatedLister::new(&ctx, &stub)
            .list_mapped(&cell(), &[], &mut out, |item| async move {
                Ok::<_, EngineError>((item % 2 == 1).then_some(item))
            })
            .await
            .unwrap();

        assert_eq!(out, vec![1, 3]);
        assert_eq!(summary.emitted, 2);
        assert_eq!(summary.stop, StopReason::BudgetReached);
        assert_eq!(ctx.budget().remaining(), Some(0));
    }

    #[tokio::test]
    async fn test_map_failure_aborts_cell() {
        let stub = PagedStub::new(vec![3]);
        let ctx = ctx(None);
        let mut out: Vec<usize> = Vec::new();
        let err = PaginatedLister::new(&ctx, &stub)
            .list_mapped(&cell(), &[], &mut out, |item| async move {
                if item == 1 {
                    Err(EngineError::Config("boom".to_string()))
                } else {
                    Ok(Some(item))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(out, vec![0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cells_share_budget() {
        let ctx = ctx(Some(25));
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let ctx = ctx.clone();
                let stub = PagedStub::new(vec![4, 4, 4]);
                let cell = MatrixCell::new(
                    "us-ashburn-1",
                    &format!("ocid1.compartment.oc1..c{i}"),
                    None,
                );
                tokio::spawn(async move { PaginatedLister::new(&ctx, &stub).collect(&cell, &[]).await })
            })
            .collect();
        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let mut total = 0;
        for result in results {
            let (items, summary) = result.unwrap();
            assert_eq!(items.len() as u64, summary.emitted);
            total += summary.emitted;
        }
        assert_eq!(total, 25);
        assert_eq!(ctx.budget().remaining(), Some(0));
    }

    #[test]
    fn test_filter_parse() {
        let filter = ResourceFilter::parse("lifecycleState=RUNNING, STOPPED").unwrap();
        assert_eq!(filter.param, "lifecycleState");
        assert_eq!(filter.values, vec!["RUNNING", "STOPPED"]);
        assert!(ResourceFilter::parse("novalue").is_none());
        assert!(ResourceFilter::parse("=x").is_none());
    }
}
