//! HTTP tests for the receipt desk router.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use axum_test::TestServer;
use receipt_desk_service::messages::HtmlReceiptRenderer;
use receipt_desk_service::server::{AppState, build_router};
use receipt_desk_service::{ServiceSettings, TicketService};
use receipt_desk_testing::{InMemoryDatastore, ScriptedGateway, fixtures, test_clock};
use serde_json::{Value, json};
use std::sync::Arc;

const PHONE: &str = "+255700000001";

fn server_with(gateway: ScriptedGateway) -> (TestServer, InMemoryDatastore) {
    let store = InMemoryDatastore::new();
    store.insert_agent(fixtures::issuing_agent("Amina", 1, 10));
    store.insert_customer(fixtures::customer("Jo", PHONE));

    let service = TicketService::new(
        Arc::new(store.clone()),
        Arc::new(gateway),
        Arc::new(HtmlReceiptRenderer),
        Arc::new(test_clock()),
        &ServiceSettings::default(),
    );
    let app = build_router(AppState::new(Arc::new(service), None));
    (TestServer::new(app).unwrap(), store)
}

fn server() -> (TestServer, InMemoryDatastore) {
    server_with(ScriptedGateway::new())
}

fn issue_body() -> Value {
    json!({
        "customer_phone": PHONE,
        "agent_name": "Amina",
        "amount": "500.00",
        "payment_mode": "cash",
        "reason_for_payment": "School fees"
    })
}

async fn issue(server: &TestServer) -> String {
    let response = server.post("/api/tickets").json(&issue_body()).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    body["data"]["ticket"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_gateway_configuration() {
    let (server, _) = server_with(ScriptedGateway::unconfigured());

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sms_configured"], false);
}

#[tokio::test]
async fn test_metrics_endpoint_is_404_when_disabled() {
    let (server, _) = server();
    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_issue_returns_created_envelope() {
    let (server, store) = server();

    let response = server.post("/api/tickets").json(&issue_body()).await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["ticket"]["ticket_number"], "000001");
    assert_eq!(body["data"]["delivery_succeeded"], true);
    assert!(body["data"]["receipt_html"].as_str().unwrap().contains("000001"));
    assert!(body.get("code").is_none());
    assert_eq!(store.tickets().len(), 1);
}

#[tokio::test]
async fn test_issue_validation_failures_are_422() {
    let (server, store) = server();

    let mut bad_amount = issue_body();
    bad_amount["amount"] = json!("five hundred");
    let response = server.post("/api/tickets").json(&bad_amount).await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let mut unknown_customer = issue_body();
    unknown_customer["customer_phone"] = json!("+255799999999");
    let response = server.post("/api/tickets").json(&unknown_customer).await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_REGISTERED");

    assert!(store.tickets().is_empty());
}

#[tokio::test]
async fn test_audit_flow_over_http() {
    let (server, _) = server();
    let id = issue(&server).await;

    let response = server
        .post(&format!("/api/tickets/{id}/reject"))
        .json(&json!({ "auditor": "Grace", "note": "bad photo" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["audit_status"], "rejected");

    let response = server.post(&format!("/api/tickets/{id}/resend")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["audit_status"], "pending");

    let response = server
        .post(&format!("/api/tickets/{id}/approve"))
        .json(&json!({ "auditor": "Grace" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .post(&format!("/api/tickets/{id}/void"))
        .json(&json!({ "auditor": "Grace", "note": "duplicate" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["audit_status"], "voided");
}

#[tokio::test]
async fn test_resend_of_pending_ticket_is_409() {
    let (server, _) = server();
    let id = issue(&server).await;

    let response = server.post(&format!("/api/tickets/{id}/resend")).await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_unknown_ticket_is_404() {
    let (server, _) = server();

    let response = server
        .post(&format!("/api/tickets/{}/approve", uuid::Uuid::new_v4()))
        .json(&json!({ "auditor": "Grace" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "TICKET_NOT_FOUND");
}
