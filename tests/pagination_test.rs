//! Integration tests for cursor pagination.

use futures::TryStreamExt;
use integrations_twitter::mocks::{MockResponse, MockTransport};
use integrations_twitter::prelude::*;
use integrations_twitter::transport::HttpRequest;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn client_with(transport: Arc<MockTransport>) -> TwitterClient {
    TwitterClient::builder()
        .credentials(Credentials::bearer("AAAA"))
        .with_transport(transport)
        .build()
        .unwrap()
}

fn page(ids: &[&str], next_token: Option<&str>) -> MockResponse {
    let data: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
    let mut meta = json!({"result_count": ids.len()});
    if let Some(token) = next_token {
        meta["next_token"] = json!(token);
    }
    MockResponse::json(json!({"data": data, "meta": meta}))
}

fn param(request: &HttpRequest, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn ids(items: &[Value]) -> Vec<&str> {
    items.iter().filter_map(|v| v["id"].as_str()).collect()
}

#[tokio::test]
async fn test_drain_all_follows_cursors() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1", "2", "3"], Some("A")),
        page(&["4", "5"], Some("B")),
        page(&["6"], None),
    ]));
    let client = client_with(transport.clone());

    let result: Paginated<Value> = client
        .paginate(
            PaginateRequest::new("users/12/followers")
                .max_results(1000)
                .all(true),
        )
        .await
        .unwrap();

    assert_eq!(ids(&result.data), vec!["1", "2", "3", "4", "5", "6"]);
    assert_eq!(result.meta.total, 6);
    assert_eq!(result.meta.pages, 3);
    assert_eq!(result.meta.next_cursor, None);

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(param(&requests[0], "pagination_token"), None);
    assert_eq!(param(&requests[1], "pagination_token").as_deref(), Some("A"));
    assert_eq!(param(&requests[2], "pagination_token").as_deref(), Some("B"));
    for request in &requests {
        assert_eq!(param(request, "max_results").as_deref(), Some("100"));
        assert_eq!(request.url.path(), "/2/users/12/followers");
    }
}

#[tokio::test]
async fn test_single_page_returns_cursor() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1", "2"], Some("A")),
        page(&["3"], None),
    ]));
    let client = client_with(transport.clone());

    let result: Paginated<Value> = client
        .paginate(PaginateRequest::new("users/12/following").max_results(2))
        .await
        .unwrap();

    assert_eq!(ids(&result.data), vec!["1", "2"]);
    assert_eq!(result.meta.next_cursor.as_deref(), Some("A"));
    assert_eq!(transport.request_count(), 1);
    assert_eq!(param(&transport.requests()[0], "max_results").as_deref(), Some("2"));

    let resumed: Paginated<Value> = client
        .paginate(PaginateRequest::new("users/12/following").cursor("A"))
        .await
        .unwrap();
    assert_eq!(ids(&resumed.data), vec!["3"]);
    assert_eq!(resumed.meta.next_cursor, None);
    assert_eq!(
        param(&transport.requests()[1], "pagination_token").as_deref(),
        Some("A")
    );
}

#[tokio::test]
async fn test_search_cursor_param() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1"], Some("next-1")),
        page(&["2"], None),
    ]));
    let client = client_with(transport.clone());

    let result: Paginated<Value> = client
        .paginate(
            PaginateRequest::new("tweets/search/recent")
                .param("query", "from:rustlang")
                .cursor_param("next_token")
                .all(true),
        )
        .await
        .unwrap();

    assert_eq!(result.meta.total, 2);
    let second = &transport.requests()[1];
    assert_eq!(param(second, "next_token").as_deref(), Some("next-1"));
    assert_eq!(param(second, "pagination_token"), None);
    assert_eq!(param(second, "query").as_deref(), Some("from:rustlang"));
}

#[tokio::test]
async fn test_empty_page_ends_drain() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1"], Some("A")),
        MockResponse::json(json!({"meta": {"result_count": 0, "next_token": "B"}})),
        page(&["never"], None),
    ]));
    let client = client_with(transport.clone());

    let result: Paginated<Value> = client
        .paginate(PaginateRequest::new("users/12/followers").all(true))
        .await
        .unwrap();

    assert_eq!(ids(&result.data), vec!["1"]);
    assert_eq!(result.meta.next_cursor, None);
    assert_eq!(transport.request_count(), 2);
    assert_eq!(transport.remaining(), 1);
}

#[tokio::test]
async fn test_itemless_page_with_cursor_is_followed() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1"], Some("A")),
        MockResponse::json(json!({"meta": {"next_token": "B"}})),
        page(&["2"], None),
    ]));
    let client = client_with(transport.clone());

    let result: Paginated<Value> = client
        .paginate(PaginateRequest::new("users/12/followers").all(true))
        .await
        .unwrap();

    assert_eq!(ids(&result.data), vec!["1", "2"]);
    assert_eq!(result.meta.total, 2);
    assert_eq!(result.meta.pages, 3);
    assert_eq!(result.meta.next_cursor, None);
    assert_eq!(
        param(&transport.requests()[2], "pagination_token").as_deref(),
        Some("B")
    );
}

#[tokio::test]
async fn test_error_mid_drain_discards_partial_results() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1", "2"], Some("A")),
        MockResponse::json_status(
            400,
            json!({"errors": [{"message": "Invalid pagination token"}], "title": "Invalid Request"}),
        ),
    ]));
    let client = client_with(transport.clone());

    let error = client
        .paginate::<Value>(PaginateRequest::new("users/12/followers").all(true))
        .await
        .unwrap_err();

    assert_eq!(error.status_code(), Some(400));
    assert_eq!(
        error.api_detail().unwrap().message,
        "Invalid pagination token"
    );
}

#[tokio::test]
async fn test_page_cap_returns_outstanding_cursor() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1"], Some("A")),
        page(&["2"], Some("B")),
        page(&["3"], None),
    ]));
    let client = client_with(transport.clone());

    let result: Paginated<Value> = client
        .paginate(
            PaginateRequest::new("users/12/followers")
                .all(true)
                .max_pages(2),
        )
        .await
        .unwrap();

    assert_eq!(ids(&result.data), vec!["1", "2"]);
    assert_eq!(result.meta.pages, 2);
    assert_eq!(result.meta.next_cursor.as_deref(), Some("B"));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn test_pager_reports_cursor_per_page() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1", "2"], Some("A")),
        page(&["3"], None),
    ]));
    let client = client_with(transport.clone());

    let mut pager = client.pager::<Value>(PaginateRequest::new("lists/9/members").all(true));
    assert!(pager.has_next());

    let first = pager.next_page().await.unwrap().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first.cursor.token.as_deref(), Some("A"));
    assert!(first.cursor.has_more);
    assert_eq!(first.cursor.total_so_far, 2);
    assert_eq!(pager.next_cursor(), Some("A"));

    let second = pager.next_page().await.unwrap().unwrap();
    assert_eq!(second.cursor.token, None);
    assert!(!second.cursor.has_more);
    assert_eq!(second.cursor.total_so_far, 3);

    assert!(!pager.has_next());
    assert!(pager.next_page().await.unwrap().is_none());
    assert_eq!(pager.pages(), 2);
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn test_item_stream() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1", "2"], Some("A")),
        page(&["3"], Some("B")),
        page(&["4"], None),
    ]));
    let client = client_with(transport.clone());

    let items: Vec<Value> = client
        .pager::<Value>(PaginateRequest::new("users/12/liked_tweets").all(true))
        .into_item_stream()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(ids(&items), vec!["1", "2", "3", "4"]);
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test]
async fn test_includes_and_partial_errors_kept() {
    let transport = Arc::new(MockTransport::with_responses(vec![MockResponse::json(
        json!({
            "data": [{"id": "1", "author_id": "12"}],
            "includes": {"users": [{"id": "12", "username": "jack"}]},
            "errors": [{"title": "Not Found Error", "resource_id": "99"}],
            "meta": {"result_count": 1, "newest_id": "1", "oldest_id": "1"}
        }),
    )]));
    let client = client_with(transport.clone());

    let mut pager = client.pager::<Value>(PaginateRequest::new("users/12/tweets"));
    let page = pager.next_page().await.unwrap().unwrap();

    assert_eq!(page.meta.newest_id.as_deref(), Some("1"));
    assert_eq!(page.includes.unwrap()["users"][0]["username"], "jack");
    assert_eq!(page.errors.len(), 1);
    assert!(!pager.has_next());
}

#[tokio::test]
async fn test_cancelled_drain_stops_before_next_page() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        page(&["1"], Some("A")),
        page(&["2"], None),
    ]));
    let client = client_with(transport.clone());
    let token = CancellationToken::new();

    let mut pager = client.pager::<Value>(
        PaginateRequest::new("users/12/followers")
            .all(true)
            .cancel(token.clone()),
    );
    pager.next_page().await.unwrap();
    token.cancel();

    let error = pager.next_page().await.unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(transport.request_count(), 1);
}
