//! Facebook Graph adapter against a mocked Graph API

use serde_json::json;
use social_publisher::core::config::FacebookConfig;
use social_publisher::{
    Channel, ErrorKind, Existence, FacebookPlugin, FieldSet, IdentifierResolver, MemoryStore,
    Platform, Post, PostContent, ProviderAdapter, PublishError, ResolutionStrategy,
    StatusReconciler,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn plugin(server: &MockServer) -> FacebookPlugin {
    let config = FacebookConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    FacebookPlugin::new(&config, Duration::from_secs(5)).unwrap()
}

fn channel() -> Channel {
    Channel::new("facebook-PAGE42", Platform::Facebook, "PAGE42", "fb-token-123456")
}

fn post(text: &str) -> Post {
    Post::new(
        PostContent {
            text: text.to_string(),
            ..Default::default()
        },
        [Platform::Facebook],
    )
}

fn graph_error(code: i64, subcode: Option<i64>) -> serde_json::Value {
    json!({
        "error": {
            "message": "graph error",
            "type": "OAuthException",
            "code": code,
            "error_subcode": subcode,
        }
    })
}

#[tokio::test]
async fn test_publish_status_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/PAGE42/feed"))
        .and(header("authorization", "Bearer fb-token-123456"))
        .and(body_partial_json(json!({ "message": "hello world" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "PAGE42_1001" })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = plugin(&server)
        .publish(&post("hello world"), &channel())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.canonical_id, "PAGE42_1001");
    assert_eq!(outcome.post_type, "status");
    assert_eq!(
        outcome.url.as_deref(),
        Some("https://www.facebook.com/PAGE42_1001")
    );
}

#[tokio::test]
async fn test_expired_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(graph_error(190, Some(463))))
        .mount(&server)
        .await;

    let error = plugin(&server)
        .publish(&post("hello"), &channel())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Auth);
    assert!(!error.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("Retry-After", "120")
                .set_body_json(graph_error(32, None)),
        )
        .mount(&server)
        .await;

    let error = plugin(&server)
        .publish(&post("hello"), &channel())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::RateLimit);
    assert!(error.is_retryable());
    assert_eq!(error.retry_after(), Some(Duration::from_secs(120)));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let error = plugin(&server)
        .publish(&post("hello"), &channel())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::TransientNetwork);
}

#[tokio::test]
async fn test_missing_or_denied_object_is_ambiguous_on_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v19.0/PAGE42_404"))
        .respond_with(ResponseTemplate::new(400).set_body_json(graph_error(100, Some(33))))
        .mount(&server)
        .await;

    let error = plugin(&server)
        .fetch_by_id("PAGE42_404", &channel(), FieldSet::Standard)
        .await
        .unwrap_err();

    assert!(matches!(error, PublishError::AmbiguousState { .. }));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v19.0/PAGE42_1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v19.0/PAGE42_1001"))
        .respond_with(ResponseTemplate::new(400).set_body_json(graph_error(100, Some(33))))
        .mount(&server)
        .await;

    let plugin = plugin(&server);
    let first = plugin.delete_by_id("PAGE42_1001", &channel()).await.unwrap();
    let second = plugin.delete_by_id("PAGE42_1001", &channel()).await.unwrap();

    assert!(first.deleted);
    assert!(!first.already_absent);
    assert!(second.deleted);
    assert!(second.already_absent);
}

#[tokio::test]
async fn test_analytics_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v19.0/PAGE42_1001/insights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "name": "post_impressions", "values": [{ "value": 1000 }] },
                { "name": "post_impressions_unique", "values": [{ "value": 800 }] },
                { "name": "post_clicks", "values": [{ "value": 40 }] }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v19.0/PAGE42_1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "PAGE42_1001",
            "shares": { "count": 5 },
            "reactions": { "summary": { "total_count": 30 } },
            "comments": { "summary": { "total_count": 12 } }
        })))
        .mount(&server)
        .await;

    let analytics = plugin(&server)
        .get_analytics("PAGE42_1001", &channel())
        .await
        .unwrap();

    let metrics = analytics.metrics;
    assert_eq!(metrics.impressions, 1000);
    assert_eq!(metrics.reach, 800);
    assert_eq!(metrics.likes, 30);
    assert_eq!(metrics.comments, 12);
    assert_eq!(metrics.shares, 5);
    assert_eq!(metrics.clicks, 40);
    assert!(metrics.engagement_rate > 0.0);
}

#[tokio::test]
async fn test_bare_post_id_resolves_to_compound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v19.0/1001"))
        .respond_with(ResponseTemplate::new(400).set_body_json(graph_error(100, Some(33))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v19.0/PAGE42_1001"))
        .and(query_param("fields", "id,message,permalink_url,created_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "PAGE42_1001",
            "message": "hello world"
        })))
        .mount(&server)
        .await;

    let resolution = IdentifierResolver::default()
        .resolve(&plugin(&server), "1001", &channel())
        .await
        .unwrap();

    assert_eq!(resolution.canonical_id, "PAGE42_1001");
    assert_eq!(resolution.strategy, ResolutionStrategy::CompoundPrefixed);
}

#[tokio::test]
async fn test_permission_loss_reconciles_as_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let reconciler = StatusReconciler::new(IdentifierResolver::default(), store);
    let record = reconciler
        .check(&plugin(&server), "PAGE42_77", &channel())
        .await
        .unwrap();

    assert_eq!(record.state, Existence::Unknown);
}
