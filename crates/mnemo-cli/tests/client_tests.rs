//! Admin client tests against a mocked daemon

use mnemo_cli::AdminClient;
use mnemo_retention::memory::types::StorageTier;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn metrics_body() -> serde_json::Value {
    json!({
        "total_items": 3,
        "per_tier_counts": {"hot": 1, "warm": 1, "cold": 1},
        "cache_hit_rate": 0.5,
        "avg_retrieval_latency_ms": 8.0,
        "passes_run": 2,
        "passes_failed": 0,
        "passes_skipped": 1,
        "items_examined": 6,
        "migrations_performed": 2,
        "migrations_failed": 0,
        "rollbacks": 0,
        "capacity_fallbacks": 0,
        "classifier_unavailable": 0,
        "last_pass": null
    })
}

#[tokio::test]
async fn test_metrics_parses_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metrics_body()))
        .mount(&server)
        .await;

    let client = AdminClient::new(&server.uri()).unwrap();
    let metrics = client.metrics().await.unwrap();

    assert_eq!(metrics.total_items, 3);
    assert_eq!(metrics.per_tier_counts[&StorageTier::Cold], 1);
    assert_eq!(metrics.passes_skipped, 1);
}

#[tokio::test]
async fn test_trailing_slash_in_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/owners/alice/distribution"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"hot": 2, "warm": 0, "cold": 5})),
        )
        .mount(&server)
        .await;

    let client = AdminClient::new(&format!("{}/", server.uri())).unwrap();
    let counts = client.distribution("alice").await.unwrap();

    assert_eq!(counts[&StorageTier::Hot], 2);
    assert_eq!(counts[&StorageTier::Cold], 5);
}

#[tokio::test]
async fn test_optimize_sends_owner_scope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/optimize"))
        .and(body_json(json!({"owner_id": "alice"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run_id": Uuid::new_v4(),
            "owner_id": "alice",
            "trigger": "manual",
            "started_at": "2025-01-01T00:00:00Z",
            "duration_ms": 4,
            "items_examined": 10,
            "stale_scores": 0,
            "decayed": 3,
            "demotions": 1,
            "promotions": 0,
            "migrations_performed": 1,
            "migrations_failed": 0,
            "status": {"outcome": "completed"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AdminClient::new(&server.uri()).unwrap();
    let report = client.optimize(Some("alice")).await.unwrap();

    assert_eq!(report.owner_id.as_deref(), Some("alice"));
    assert_eq!(report.demotions, 1);
}

#[tokio::test]
async fn test_protect_posts_reason() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path(format!("/items/{id}/protection")))
        .and(body_json(json!({"reason": "anniversary"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "item_id": id,
            "owner_id": "alice",
            "reason": "anniversary",
            "protected_since": "2025-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = AdminClient::new(&server.uri()).unwrap();
    let entry = client.protect(id, "anniversary").await.unwrap();

    assert_eq!(entry.item_id, id);
    assert_eq!(entry.reason, "anniversary");
}

#[tokio::test]
async fn test_unprotect_and_list() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("DELETE"))
        .and(path(format!("/items/{id}/protection")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"item_id": id, "was_protected": true})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/owners/alice/protected"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"owner_id": "alice", "items": []})),
        )
        .mount(&server)
        .await;

    let client = AdminClient::new(&server.uri()).unwrap();
    assert!(client.unprotect(id).await.unwrap().was_protected);
    assert!(client.protected("alice").await.unwrap().items.is_empty());
}

#[tokio::test]
async fn test_error_envelope_becomes_message() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path(format!("/items/{id}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"type": "item_not_found", "message": format!("Item not found: {id}")}
        })))
        .mount(&server)
        .await;

    let client = AdminClient::new(&server.uri()).unwrap();
    let err = client.item(id).await.unwrap_err();

    assert!(err.0.contains("404"));
    assert!(err.0.contains("item_not_found"));
    assert!(err.0.contains(&id.to_string()));
}

#[tokio::test]
async fn test_non_json_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = AdminClient::new(&server.uri()).unwrap();
    let err = client.metrics().await.unwrap_err();

    assert!(err.0.contains("502"));
    assert!(err.0.contains("bad gateway"));
}
