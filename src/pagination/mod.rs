//! Cursor-based pagination for list endpoints.
//!
//! List endpoints return `{data, meta: {result_count, next_token}}`. The next
//! page is requested by repeating the original request with the cursor in the
//! configured query parameter (`pagination_token` on most endpoints,
//! `next_token` on search). Pages are fetched strictly in sequence.
//!
//! Drain-all mode stops when the server omits the cursor or reports
//! `result_count == 0`. A page without items but with a cursor is followed.
//! It is unbounded unless a page cap is set; a capped drain returns the
//! outstanding cursor in [`PageMeta::next_cursor`].

use crate::client::{ApiHost, RequestExecutor, RequestOptions};
use crate::errors::{TwitterError, TwitterResult};
use crate::resilience::ensure_not_cancelled;
use crate::transport::HttpMethod;
use crate::types::{ListMeta, ListResponse};
use futures::stream::{self, Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Query parameter carrying the page size.
pub const MAX_RESULTS_PARAM: &str = "max_results";

/// A paginated list request.
#[derive(Debug, Clone)]
pub struct PaginateRequest {
    /// Endpoint path, relative to the host's base URL.
    pub path: String,
    /// Query parameters repeated on every page.
    pub params: Vec<(String, String)>,
    /// Requested page size; clamped to the server maximum.
    pub max_results: Option<u32>,
    /// Follow cursors until the listing is exhausted.
    pub all: bool,
    /// Cursor parameter name; defaults to the configured one.
    pub cursor_param: Option<String>,
    /// Cursor to start from.
    pub cursor: Option<String>,
    /// Cap on pages fetched in drain-all mode; overrides the configured cap.
    pub max_pages: Option<u32>,
    /// Target host.
    pub host: ApiHost,
    /// Cancellation signal checked before every page.
    pub cancel: Option<CancellationToken>,
}

impl PaginateRequest {
    /// Creates a single-page request for a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
            max_results: None,
            all: false,
            cursor_param: None,
            cursor: None,
            max_pages: None,
            host: ApiHost::Api,
            cancel: None,
        }
    }

    /// Adds a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Sets the page size.
    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Enables or disables drain-all mode.
    pub fn all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    /// Sets the cursor parameter name.
    pub fn cursor_param(mut self, name: impl Into<String>) -> Self {
        self.cursor_param = Some(name.into());
        self
    }

    /// Starts from a previously returned cursor.
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Caps the number of pages fetched in drain-all mode.
    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Sets the cancellation token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Continuation state after a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    /// Server-issued cursor, valid only for the request that produced it.
    pub token: Option<String>,
    /// Whether another page may be fetched.
    pub has_more: bool,
    /// Items fetched so far, including this page.
    pub total_so_far: usize,
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in server order.
    pub items: Vec<T>,
    /// Server page metadata.
    pub meta: ListMeta,
    /// Expanded objects.
    pub includes: Option<Value>,
    /// Partial errors.
    pub errors: Vec<Value>,
    /// Continuation state.
    pub cursor: PageCursor,
}

impl<T> Page<T> {
    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if this page is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Metadata of a paginated result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    /// Number of items returned.
    pub total: usize,
    /// Cursor for the remaining items, when the listing was not exhausted.
    pub next_cursor: Option<String>,
    /// Pages fetched.
    pub pages: u32,
}

/// Result of [`paginate`].
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    /// Items in server order, pages concatenated in fetch order.
    pub data: Vec<T>,
    /// Result metadata.
    pub meta: PageMeta,
}

/// Sequential page-by-page reader over a list endpoint.
pub struct CursorPager<T> {
    executor: Arc<RequestExecutor>,
    path: String,
    params: Vec<(String, String)>,
    host: ApiHost,
    cursor_param: String,
    max_pages: Option<u32>,
    cancel: Option<CancellationToken>,
    next: Option<String>,
    done: bool,
    pages: u32,
    total: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> CursorPager<T> {
    /// Creates a pager. Caller-supplied cursor and page-size parameters are
    /// replaced by the request's own.
    pub fn new(executor: Arc<RequestExecutor>, request: PaginateRequest) -> Self {
        let settings = &executor.config().pagination;
        let cursor_param = request
            .cursor_param
            .unwrap_or_else(|| settings.default_cursor_param.clone());
        let page_size = request
            .max_results
            .unwrap_or(settings.server_max_results)
            .clamp(1, settings.server_max_results);
        let max_pages = if request.all {
            request.max_pages.or(settings.max_pages)
        } else {
            Some(1)
        };

        let mut params: Vec<(String, String)> = request
            .params
            .into_iter()
            .filter(|(k, _)| k != &cursor_param && k != MAX_RESULTS_PARAM)
            .collect();
        params.push((MAX_RESULTS_PARAM.to_string(), page_size.to_string()));

        Self {
            executor,
            path: request.path,
            params,
            host: request.host,
            cursor_param,
            max_pages,
            cancel: request.cancel,
            next: request.cursor,
            done: false,
            pages: 0,
            total: 0,
            _marker: PhantomData,
        }
    }

    /// Returns true if another page can be fetched.
    pub fn has_next(&self) -> bool {
        !self.done && !self.capped()
    }

    /// Cursor the next fetch would use.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next.as_deref()
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> u32 {
        self.pages
    }

    fn capped(&self) -> bool {
        self.max_pages.map_or(false, |cap| self.pages >= cap)
    }

    /// Fetches the next page, or `None` once the listing is exhausted or the cap is hit.
    pub async fn next_page(&mut self) -> TwitterResult<Option<Page<T>>> {
        if !self.has_next() {
            return Ok(None);
        }

        ensure_not_cancelled(self.cancel.as_ref(), "pagination cancelled")?;

        let mut options = RequestOptions::new()
            .queries(self.params.iter().cloned())
            .host(self.host)
            .cancel(self.cancel.clone());
        if let Some(cursor) = &self.next {
            options = options.query(self.cursor_param.clone(), cursor);
        }

        let response: Option<ListResponse<T>> = self
            .executor
            .execute(HttpMethod::Get, &self.path, options)
            .await?;
        let response = response.unwrap_or_else(|| ListResponse {
            data: Vec::new(),
            meta: ListMeta::default(),
            includes: None,
            errors: Vec::new(),
        });

        self.pages += 1;
        self.total += response.data.len();

        let token = response.meta.next_token.clone().filter(|t| !t.is_empty());
        let exhausted = token.is_none() || response.meta.is_exhausted();
        self.next = if exhausted { None } else { token };
        self.done = exhausted;

        debug!(
            page = self.pages,
            items = response.data.len(),
            has_cursor = self.next.is_some(),
            "Fetched page"
        );

        Ok(Some(Page {
            items: response.data,
            meta: response.meta,
            includes: response.includes,
            errors: response.errors,
            cursor: PageCursor {
                token: self.next.clone(),
                has_more: !self.done,
                total_so_far: self.total,
            },
        }))
    }

    /// Fetches every remaining page and concatenates the items.
    ///
    /// A failure on any page discards everything fetched so far.
    pub async fn collect_all(mut self) -> TwitterResult<Paginated<T>> {
        let mut data = Vec::new();

        while let Some(page) = self.next_page().await? {
            data.extend(page.items);
        }

        let next_cursor = if self.done { None } else { self.next.clone() };
        if next_cursor.is_some() && self.max_pages.map_or(false, |cap| cap > 1) {
            warn!(
                pages = self.pages,
                items = data.len(),
                "Page cap reached before the listing was exhausted"
            );
        }

        Ok(Paginated {
            meta: PageMeta {
                total: data.len(),
                next_cursor,
                pages: self.pages,
            },
            data,
        })
    }

    /// Converts the pager into a stream of pages.
    pub fn into_stream(self) -> impl Stream<Item = TwitterResult<Page<T>>> {
        stream::try_unfold(self, |mut pager| async move {
            Ok::<_, TwitterError>(pager.next_page().await?.map(|page| (page, pager)))
        })
    }

    /// Converts the pager into a stream of items.
    pub fn into_item_stream(self) -> impl Stream<Item = TwitterResult<T>> {
        self.into_stream()
            .map_ok(|page| stream::iter(page.items.into_iter().map(Ok::<T, TwitterError>)))
            .try_flatten()
    }
}

/// Fetches one page, or every page in drain-all mode.
pub async fn paginate<T: DeserializeOwned>(
    executor: Arc<RequestExecutor>,
    request: PaginateRequest,
) -> TwitterResult<Paginated<T>> {
    CursorPager::new(executor, request).collect_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::config::{PaginationConfig, TwitterConfig};
    use crate::mocks::{MockResponse, MockTransport};
    use serde_json::json;

    fn executor(transport: Arc<MockTransport>, pagination: PaginationConfig) -> Arc<RequestExecutor> {
        let config = TwitterConfig::builder()
            .credentials(Credentials::bearer("AAAA"))
            .pagination(pagination)
            .build()
            .unwrap();
        Arc::new(RequestExecutor::new(config, transport).unwrap())
    }

    fn query(request: &crate::transport::HttpRequest) -> Vec<(String, String)> {
        request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[tokio::test]
    async fn test_page_size_clamped_and_params_replaced() {
        let transport = Arc::new(MockTransport::with_responses(vec![MockResponse::json(
            json!({"data": [1, 2], "meta": {"result_count": 2}}),
        )]));
        let exec = executor(transport.clone(), PaginationConfig::default());

        let request = PaginateRequest::new("users/1/followers")
            .param("max_results", 7)
            .param("pagination_token", "stale")
            .param("user.fields", "id")
            .max_results(500);
        let result: Paginated<u32> = paginate(exec, request).await.unwrap();
        assert_eq!(result.data, vec![1, 2]);

        let sent = query(&transport.requests()[0]);
        assert_eq!(
            sent,
            vec![
                ("user.fields".to_string(), "id".to_string()),
                ("max_results".to_string(), "100".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_page_size_clamped_to_one() {
        let transport = Arc::new(MockTransport::with_responses(vec![MockResponse::json(
            json!({"meta": {"result_count": 0}}),
        )]));
        let exec = executor(transport.clone(), PaginationConfig::default());

        let result: Paginated<u32> = paginate(exec, PaginateRequest::new("x").max_results(0))
            .await
            .unwrap();
        assert!(result.data.is_empty());
        assert_eq!(query(&transport.requests()[0]), vec![("max_results".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn test_empty_page_with_cursor_ends_drain() {
        let transport = Arc::new(MockTransport::with_responses(vec![
            MockResponse::json(json!({"data": [1], "meta": {"result_count": 1, "next_token": "A"}})),
            MockResponse::json(json!({"meta": {"result_count": 0, "next_token": "B"}})),
        ]));
        let exec = executor(transport.clone(), PaginationConfig::default());

        let result: Paginated<u32> = paginate(exec, PaginateRequest::new("x").all(true))
            .await
            .unwrap();
        assert_eq!(result.data, vec![1]);
        assert_eq!(result.meta.next_cursor, None);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_configured_cursor_param_and_cap() {
        let transport = Arc::new(MockTransport::with_responses(vec![
            MockResponse::json(json!({"data": [1], "meta": {"next_token": "A"}})),
            MockResponse::json(json!({"data": [2], "meta": {"next_token": "B"}})),
        ]));
        let exec = executor(
            transport.clone(),
            PaginationConfig {
                default_cursor_param: "next_token".to_string(),
                max_pages: Some(2),
                ..Default::default()
            },
        );

        let result: Paginated<u32> = paginate(exec, PaginateRequest::new("tweets/search/recent").all(true))
            .await
            .unwrap();
        assert_eq!(result.data, vec![1, 2]);
        assert_eq!(result.meta.pages, 2);
        assert_eq!(result.meta.next_cursor.as_deref(), Some("B"));

        let second = query(&transport.requests()[1]);
        assert!(second.contains(&("next_token".to_string(), "A".to_string())));
    }
}
