//! Integration tests for `DiscoveryClient` and the keyword executor using
//! wiremock HTTP mocks.

use cscout_core::Platform;
use cscout_discovery::{search_keyword, DiscoveryClient, DiscoveryError, HandlerRegistry};
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> DiscoveryClient {
    DiscoveryClient::with_base_url(Some("test-key"), 30, base_url)
        .expect("client construction should not fail")
}

fn tiktok_item(id: u32, username: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id.to_string(),
        "unique_id": username,
        "nickname": format!("Creator {username}"),
        "follower_count": 1000 + i64::from(id),
        "verified": false
    })
}

#[tokio::test]
async fn fetch_page_parses_items_and_sends_auth() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "items": [tiktok_item(1, "a"), tiktok_item(2, "b")],
        "has_more": true
    });

    Mock::given(method("GET"))
        .and(path("/tiktok/creators/search"))
        .and(query_param("q", "coffee roaster"))
        .and(query_param("page", "1"))
        .and(bearer_token("test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let page = client
        .fetch_page("tiktok/creators/search", "coffee roaster", 1, 50)
        .await
        .expect("should parse page");

    assert_eq!(page.items.len(), 2);
    assert!(page.has_more);
}

#[tokio::test]
async fn non_success_status_carries_page_index() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .fetch_page("tiktok/creators/search", "coffee", 3, 50)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DiscoveryError::UnexpectedStatus { status: 429, page: 3 }
    ));
}

#[tokio::test]
async fn api_error_body_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "error": "keyword too broad" })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .fetch_page("tiktok/creators/search", "a", 1, 50)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DiscoveryError::Api { page: 1, message } if message == "keyword too broad"
    ));
}

#[tokio::test]
async fn executor_paginates_until_target_reached() {
    let server = MockServer::start().await;
    let registry = HandlerRegistry::with_defaults();
    let handler = registry.get(Platform::TikTok).unwrap();

    let page1 = serde_json::json!({
        "items": (0..50).map(|i| tiktok_item(i, &format!("user{i}"))).collect::<Vec<_>>(),
        "has_more": true
    });
    let page2 = serde_json::json!({
        "items": (50..100).map(|i| tiktok_item(i, &format!("user{i}"))).collect::<Vec<_>>(),
        "has_more": true
    });

    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&page1))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&page2))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = search_keyword(&client, handler, "coffee", 75)
        .await
        .expect("search should succeed");

    assert_eq!(result.creators.len(), 75);
    assert_eq!(result.api_calls, 2);
    assert!(result.creators.iter().all(|c| c.source_keyword == "coffee"));
}

#[tokio::test]
async fn executor_stops_on_empty_page() {
    let server = MockServer::start().await;
    let registry = HandlerRegistry::with_defaults();
    let handler = registry.get(Platform::TikTok).unwrap();

    let page1 = serde_json::json!({
        "items": [tiktok_item(1, "only")],
        "has_more": true
    });
    let empty = serde_json::json!({ "items": [], "has_more": true });

    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&page1))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&empty))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = search_keyword(&client, handler, "coffee", 100)
        .await
        .expect("search should succeed");

    assert_eq!(result.creators.len(), 1);
    assert_eq!(result.api_calls, 2);
}

#[tokio::test]
async fn executor_stops_when_no_more_pages() {
    let server = MockServer::start().await;
    let registry = HandlerRegistry::with_defaults();
    let handler = registry.get(Platform::TikTok).unwrap();

    let page1 = serde_json::json!({
        "items": [tiktok_item(1, "a"), tiktok_item(2, "b")],
        "has_more": false
    });

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&page1))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = search_keyword(&client, handler, "coffee", 100)
        .await
        .expect("search should succeed");

    assert_eq!(result.creators.len(), 2);
    assert_eq!(result.api_calls, 1);
}

#[tokio::test]
async fn executor_propagates_typed_failure() {
    let server = MockServer::start().await;
    let registry = HandlerRegistry::with_defaults();
    let handler = registry.get(Platform::TikTok).unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = search_keyword(&client, handler, "coffee", 10)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DiscoveryError::UnexpectedStatus { status: 500, page: 1 }
    ));
}
