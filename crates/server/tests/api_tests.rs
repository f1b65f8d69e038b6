//! In-process API tests over memory backends.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use solvd_core::protocol::topics;

use common::{eventually, TestConfig, TestFixture};

fn api_key_config() -> TestConfig {
    TestConfig {
        api_key: true,
        ..Default::default()
    }
}

// =============================================================================
// Health and Config
// =============================================================================

#[tokio::test]
async fn test_healthcheck_summary_for_anonymous_caller() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/healthcheck").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"status": "Healthy"}));
}

#[tokio::test]
async fn test_healthcheck_requires_key_when_configured() {
    let fixture = TestFixture::with_config(api_key_config()).await;

    let response = fixture.get("/api/v1/healthcheck").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_healthcheck_details_for_admin() {
    let fixture = TestFixture::with_config(api_key_config()).await;

    let response = fixture.get_as_admin("/api/v1/healthcheck").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "Healthy");
    assert!(response.body["uptime"].is_u64());
    let components = response.body["components"].as_array().unwrap();
    assert_eq!(components[0], json!({"name": "Store", "status": "Connected"}));
    assert_eq!(components[1], json!({"name": "Bus", "status": "Connected"}));
}

#[tokio::test]
async fn test_config_forbidden_for_non_admin() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_config_is_sanitized_for_admin() {
    let fixture = TestFixture::with_config(api_key_config()).await;

    let response = fixture.get_as_admin("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["auth"]["method"], "api_key");
    assert_eq!(response.body["auth"]["api_key_configured"], true);
    assert_eq!(response.body["orchestrator"]["workers"], 1);
    assert!(!response.body.to_string().contains(common::API_KEY));
}

// =============================================================================
// Problem Ingress
// =============================================================================

#[tokio::test]
async fn test_submit_publishes_submission_untouched() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/problems",
            json!({
                "problemId": "p1",
                "modelId": "LP",
                "metadata": {"objective": "max"},
                "inputData": {"constraints": []},
                "priority": "high"
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body, json!({"problemId": "p1"}));

    let published = fixture.bus.json_messages(topics::PROBLEM_EXECUTE_REQ);
    assert_eq!(
        published,
        vec![json!({
            "problemId": "p1",
            "modelId": "LP",
            "metadata": {"objective": "max"},
            "inputData": {"constraints": []},
            "priority": "high"
        })]
    );
}

#[tokio::test]
async fn test_submit_generates_problem_id_when_absent() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/problems", json!({"modelId": "VRP", "inputData": {}}))
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    let problem_id = response.body["problemId"].as_str().unwrap().to_string();
    assert_eq!(problem_id.len(), 36);

    let published = fixture.bus.json_messages(topics::PROBLEM_EXECUTE_REQ);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["problemId"], problem_id.as_str());
}

#[tokio::test]
async fn test_submit_rejects_blank_problem_id() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/problems", json!({"problemId": "  ", "modelId": "LP"}))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(fixture.bus.json_messages(topics::PROBLEM_EXECUTE_REQ).is_empty());
}

#[tokio::test]
async fn test_delete_publishes_deletion_notice() {
    let fixture = TestFixture::new().await;

    let response = fixture.delete("/api/v1/problems/p9").await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(
        fixture.bus.json_messages(topics::PROBLEM_DELETED),
        vec![json!({"problemId": "p9"})]
    );
}

#[tokio::test]
async fn test_ingress_requires_key_when_configured() {
    let fixture = TestFixture::with_config(api_key_config()).await;

    let response = fixture.post("/api/v1/problems", json!({"problemId": "p1"})).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(fixture.bus.history().is_empty());
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn test_metrics_endpoint_is_unauthenticated() {
    let fixture = TestFixture::with_config(api_key_config()).await;
    fixture.get_as_admin("/api/v1/healthcheck").await;

    let (status, body) = fixture.get_text("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("solvd_http_requests_total"));
    assert!(body.contains("solvd_orchestrator_running"));
}

// =============================================================================
// End to End
// =============================================================================

#[tokio::test]
async fn test_submitted_problem_is_solved() {
    let fixture = TestFixture::with_config(TestConfig {
        api_key: true,
        with_orchestrator: true,
    })
    .await;

    let response = fixture
        .post_as_admin(
            "/api/v1/problems",
            json!({
                "problemId": "e2e-1",
                "modelId": "LP",
                "metadata": {"objective": "max"},
                "inputData": {"constraints": []}
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    assert!(
        eventually(|| {
            fixture
                .bus
                .json_messages(topics::PROBLEM_RESULT)
                .iter()
                .any(|result| result["problemId"] == "e2e-1")
        })
        .await
    );

    // The worker reports back in and shows as idle
    let mut idle = false;
    for _ in 0..250 {
        let health = fixture.get_as_admin("/api/v1/healthcheck").await;
        let components = health.body["components"].as_array().cloned().unwrap_or_default();
        if components.contains(&json!({"name": "Solver 1", "status": "IDLE"})) {
            idle = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(idle);

    fixture.shutdown().await;
}
