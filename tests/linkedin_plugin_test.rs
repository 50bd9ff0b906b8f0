//! LinkedIn REST adapter against a mocked API

use serde_json::json;
use social_publisher::core::config::LinkedInConfig;
use social_publisher::{
    Channel, ErrorKind, Existence, FieldSet, IdentifierResolver, LinkedInPlugin, MemoryStore,
    Platform, Post, PostContent, ProviderAdapter, PublishError, ResolutionStrategy,
    StatusReconciler,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHARE: &str = "urn:li:share:7001";

fn plugin(server: &MockServer) -> LinkedInPlugin {
    let config = LinkedInConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    LinkedInPlugin::new(&config, Duration::from_secs(5)).unwrap()
}

fn channel() -> Channel {
    Channel::new("linkedin-9001", Platform::LinkedIn, "9001", "li-token-abcdef")
}

fn post(text: &str) -> Post {
    Post::new(
        PostContent {
            text: text.to_string(),
            ..Default::default()
        },
        [Platform::LinkedIn],
    )
}

#[tokio::test]
async fn test_publish_reads_restli_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/posts"))
        .and(header("authorization", "Bearer li-token-abcdef"))
        .and(header("LinkedIn-Version", "202405"))
        .and(header("X-Restli-Protocol-Version", "2.0.0"))
        .and(body_partial_json(json!({
            "author": "urn:li:organization:9001",
            "commentary": "quarterly update",
            "lifecycleState": "PUBLISHED"
        })))
        .respond_with(ResponseTemplate::new(201).insert_header("x-restli-id", SHARE))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = plugin(&server)
        .publish(&post("quarterly update"), &channel())
        .await
        .unwrap();

    assert_eq!(outcome.canonical_id, SHARE);
    assert_eq!(outcome.post_type, "text");
    assert_eq!(
        outcome.url.as_deref(),
        Some("https://www.linkedin.com/feed/update/urn:li:share:7001")
    );
}

#[tokio::test]
async fn test_publish_without_id_header_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/posts"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let error = plugin(&server)
        .publish(&post("hello"), &channel())
        .await
        .unwrap_err();

    assert!(matches!(error, PublishError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid access token" })),
        )
        .mount(&server)
        .await;

    let error = plugin(&server)
        .publish(&post("hello"), &channel())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Auth);
    assert!(error.to_string().contains("Invalid access token"));
}

#[tokio::test]
async fn test_forbidden_read_is_ambiguous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/posts/urn:li:share:7001"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "message": "Not enough permissions" })))
        .mount(&server)
        .await;

    let error = plugin(&server)
        .fetch_by_id(SHARE, &channel(), FieldSet::Standard)
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AmbiguousState);
}

#[tokio::test]
async fn test_bare_number_resolves_to_share_urn() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/posts/7001"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/posts/urn:li:share:7001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": SHARE,
            "commentary": "quarterly update",
            "lifecycleState": "PUBLISHED"
        })))
        .mount(&server)
        .await;

    let resolution = IdentifierResolver::default()
        .resolve(&plugin(&server), "7001", &channel())
        .await
        .unwrap();

    assert_eq!(resolution.canonical_id, SHARE);
    assert_eq!(resolution.strategy, ResolutionStrategy::CompoundPrefixed);
    assert_eq!(
        resolution.object.extra.get("lifecycleState"),
        Some(&json!("PUBLISHED"))
    );
}

#[tokio::test]
async fn test_deleted_post_reconciles_as_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "elements": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let reconciler = StatusReconciler::new(IdentifierResolver::default(), Arc::new(MemoryStore::new()));
    let record = reconciler
        .check(&plugin(&server), SHARE, &channel())
        .await
        .unwrap();

    assert_eq!(record.state, Existence::Deleted);
}

#[tokio::test]
async fn test_analytics_from_share_statistics() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/organizationalEntityShareStatistics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "elements": [{
                "totalShareStatistics": {
                    "impressionCount": 2000,
                    "uniqueImpressionsCount": 1500,
                    "clickCount": 60,
                    "likeCount": 45,
                    "commentCount": 9,
                    "shareCount": 4,
                    "engagement": 0.059
                }
            }]
        })))
        .mount(&server)
        .await;

    let analytics = plugin(&server)
        .get_analytics(SHARE, &channel())
        .await
        .unwrap();

    let metrics = analytics.metrics;
    assert_eq!(metrics.impressions, 2000);
    assert_eq!(metrics.reach, 1500);
    assert_eq!(metrics.likes, 45);
    assert_eq!(metrics.comments, 9);
    assert_eq!(metrics.shares, 4);
    assert_eq!(metrics.clicks, 60);
}

#[tokio::test]
async fn test_analytics_falls_back_to_social_actions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/organizationalEntityShareStatistics"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/socialActions/urn:li:share:7001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "likesSummary": { "totalLikes": 7 },
            "commentsSummary": { "aggregatedTotalComments": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let analytics = plugin(&server)
        .get_analytics(SHARE, &channel())
        .await
        .unwrap();

    assert_eq!(analytics.metrics.likes, 7);
    assert_eq!(analytics.metrics.comments, 3);
    assert_eq!(analytics.metrics.impressions, 0);
}

#[tokio::test]
async fn test_delete_twice() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/posts/urn:li:share:7001"))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/posts/urn:li:share:7001"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let plugin = plugin(&server);
    let first = plugin.delete_by_id(SHARE, &channel()).await.unwrap();
    let second = plugin.delete_by_id(SHARE, &channel()).await.unwrap();

    assert!(first.deleted && !first.already_absent);
    assert!(second.deleted && second.already_absent);
}
