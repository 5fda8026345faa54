//! Drives the axum router in-process with `tower::ServiceExt::oneshot`.

mod common;

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::Fixture;
use rego_exchange::{
    api::{self, AppState, auth::{CONSUMER_HEADER, PROVIDER_HEADER}},
    config::AppConfig,
};
use serde_json::{Value, json};
use tower::ServiceExt;

enum Caller {
    Anonymous,
    Provider(u64),
    Consumer(u64),
}

fn router(fx: &Fixture) -> Router {
    api::create_router(AppState::new(fx.service.clone(), &AppConfig::default()))
}

async fn call(app: &Router, method: Method, uri: &str, caller: Caller, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    request = match caller {
        Caller::Anonymous => request,
        Caller::Provider(id) => request.header(PROVIDER_HEADER, id.to_string()),
        Caller::Consumer(id) => request.header(CONSUMER_HEADER, id.to_string()),
    };
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_ok() {
    let fx = Fixture::new().unwrap();
    let (status, body) = call(&router(&fx), Method::GET, "/health", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "data": "OK" }));
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let fx = Fixture::new().unwrap();
    let app = router(&fx);
    let provider = fx.generator.provider_id;
    let consumer = fx.consumer.consumer_id;

    let (status, body) = call(
        &app,
        Method::POST,
        "/power-generation",
        Caller::Provider(provider),
        Some(json!({
            "plantId": fx.plant.plant_id,
            "electricityProductionPeriod": "2024-03",
            "powerGenerationAmount": 100.555
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["powerGenerationAmount"], "100.555");
    assert_eq!(body["data"]["issuedStatus"], "n");
    let generation_id = body["data"]["powerGenerationId"].as_u64().unwrap();

    let (_, body) = call(&app, Method::GET, "/power-generation?issuedStatus=n", Caller::Provider(provider), None).await;
    assert_eq!(body["data"][0]["selfIssuable"], 60);
    assert_eq!(body["data"][0]["nationIssuable"], 30);
    assert_eq!(body["data"][0]["localGovernmentIssuable"], 10);

    let (status, body) = call(
        &app,
        Method::POST,
        "/rego/issue",
        Caller::Provider(provider),
        Some(json!({ "powerGenerationIds": [generation_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    let owner_share = &body["data"]["issued"][0]["shares"][0];
    assert_eq!(owner_share["stakeholder"], "owner");
    assert_eq!(owner_share["issuedGenerationAmount"], 60);
    assert_eq!(owner_share["carriedAfter"], "0.333");
    let group_id = owner_share["regoGroupId"].as_u64().unwrap();

    let uri = format!("/provider/carried-over-power-gen-amount?plantId={}", fx.plant.plant_id);
    let (_, body) = call(&app, Method::GET, &uri, Caller::Provider(provider), None).await;
    assert_eq!(body["data"]["nationCarriedOverPowerGenAmount"], "0.166");

    let (status, _) = call(
        &app,
        Method::POST,
        "/rego/sell",
        Caller::Provider(provider),
        Some(json!({ "regoIds": [group_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, Method::GET, "/rego?tradingStatus=trading", Caller::Anonymous, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["regoGroupId"], group_id);

    let (status, body) = call(
        &app,
        Method::POST,
        "/rego-trade-info/buying",
        Caller::Consumer(consumer),
        Some(json!({ "regoGroupId": group_id, "buyingAmount": 10, "buyingPrice": 900 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["tradingApplicationStatus"], "pending");
    let trade_id = body["data"]["regoTradeInfoId"].as_u64().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/rego-trade-info/accept",
        Caller::Provider(provider),
        Some(json!({ "regoTradeInfoId": trade_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["regoGroup"]["remainingGenerationAmount"], 50);
    let buying_rego_id = body["data"]["buyingRego"]["buyingRegoId"].as_u64().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/rego-trade-info/accept",
        Caller::Provider(provider),
        Some(json!({ "regoTradeInfoId": trade_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("approved"));

    let (status, body) = call(
        &app,
        Method::POST,
        "/rego-confirmation/issue",
        Caller::Consumer(consumer),
        Some(json!({
            "selectedRegos": [{ "buyingRegoId": buying_rego_id, "regoUsageAmount": 3 }],
            "usageRecognitionPeriod": "2024-01 ~ 2024-06"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["confirmation"]["regoUsageAmount"], 3);
    let confirmation_id = body["data"]["confirmation"]["regoConfirmationId"].as_u64().unwrap();

    let (_, body) = call(&app, Method::GET, "/buying-rego", Caller::Consumer(consumer), None).await;
    let amounts: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["buyingAmount"].as_u64().unwrap())
        .collect();
    assert_eq!(amounts.iter().sum::<u64>(), 10);
    assert!(amounts.contains(&7) && amounts.contains(&3));

    let uri = format!("/rego-confirmation/{confirmation_id}");
    let (status, body) = call(&app, Method::GET, &uri, Caller::Consumer(consumer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["lines"][0]["usageApplicationAmount"], 3);

    let (_, body) = call(&app, Method::GET, "/rego-trade-info", Caller::Consumer(consumer), None).await;
    assert_eq!(body["data"][0]["tradingApplicationStatus"], "approve");
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let fx = Fixture::new().unwrap();
    let app = router(&fx);

    // no caller identity
    let (status, body) = call(
        &app,
        Method::POST,
        "/rego/issue",
        Caller::Anonymous,
        Some(json!({ "powerGenerationIds": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    // empty selection
    let (status, _) = call(
        &app,
        Method::POST,
        "/rego/issue",
        Caller::Provider(fx.generator.provider_id),
        Some(json!({ "powerGenerationIds": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // unknown record
    let (status, body) = call(
        &app,
        Method::POST,
        "/rego/issue",
        Caller::Provider(fx.generator.provider_id),
        Some(json!({ "powerGenerationIds": [999_999] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("999999"));

    // malformed body stays inside the envelope
    let (status, body) = call(
        &app,
        Method::PUT,
        "/rego-trade-info/cancel",
        Caller::Consumer(fx.consumer.consumer_id),
        Some(json!({ "wrong": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(
        &app,
        Method::POST,
        "/rego-trade-info/refuse",
        Caller::Provider(fx.generator.provider_id),
        Some(json!({ "regoTradeInfoId": 1, "rejectedReason": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn exhausted_sessions_answer_503() {
    let fx = Fixture::new().unwrap();
    let config = AppConfig {
        max_sessions: 1,
        session_timeout: Duration::from_millis(20),
        ..AppConfig::default()
    };
    let state = AppState::new(fx.service.clone(), &config);
    let held = state.sessions.acquire().await.unwrap();
    let app = api::create_router(state);

    let (status, body) = call(&app, Method::GET, "/buying-rego", Caller::Consumer(fx.consumer.consumer_id), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);

    drop(held);
    let (status, _) = call(&app, Method::GET, "/buying-rego", Caller::Consumer(fx.consumer.consumer_id), None).await;
    assert_eq!(status, StatusCode::OK);
}
