#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the registrar handlers
//!
//! Drives the real router with an in-process registry actor; the replica's
//! role is forced by hand instead of waiting on the peer poller.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use canopy::{unpack, Form, MessageLevel, SignalA, SystemMessage};
use canopy_registrar::handlers::AppState;
use canopy_registrar::{server, Registry};

const SYSTEM: &str = "serviceregistrar";

async fn test_app(leading: bool) -> (Router, Arc<AppState>) {
    let cancel = CancellationToken::new();
    let (registry, _task) = Registry::spawn(cancel);
    let role = canopy_registrar::role::shared();
    {
        let mut state = role.write().await;
        state.leading = leading;
        if leading {
            state.leading_since = Some(chrono::Utc::now());
        } else {
            state.leading_registrar = Some("http://10.0.0.3:20102/serviceregistrar".to_string());
        }
    }
    let state = Arc::new(AppState {
        registry,
        role,
        system_name: SYSTEM.to_string(),
    });
    (server::create_router(state.clone()), state)
}

fn registration_body() -> String {
    r#"{
        "version": "ServiceRecord_v1",
        "serviceDefinition": "temperature",
        "systemName": "sensor1",
        "subPath": "temp",
        "ipAddresses": ["10.0.0.1"],
        "protoPort": {"http": 8081},
        "regLife": 30
    }"#
    .to_string()
}

fn json_post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn response_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

// ==================== Register ====================

#[tokio::test]
async fn test_registration_round_trip() {
    let (app, _) = test_app(true).await;

    let response = app
        .clone()
        .oneshot(json_post("/serviceregistrar/register", registration_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = match unpack(&response_bytes(response).await).unwrap() {
        Form::ServiceRecord(record) => record,
        other => panic!("expected ServiceRecord, got {}", other.tag()),
    };
    assert_ne!(stored.id, 0);
    assert!(stored.created.is_some());
    let updated = stored.updated.unwrap();
    assert_eq!(
        stored.end_of_validity.unwrap(),
        updated + chrono::Duration::seconds(30)
    );

    // The record is immediately visible on the human-readable listing.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/serviceregistrar/query")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = String::from_utf8(response_bytes(response).await).unwrap();
    assert!(page.contains("temperature"));
}

#[tokio::test]
async fn test_register_accepts_put() {
    let (app, _) = test_app(true).await;

    let request = Request::builder()
        .method("PUT")
        .uri("/serviceregistrar/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(registration_body()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_standby_rejects_writes() {
    let (app, _) = test_app(false).await;

    let response = app
        .oneshot(json_post("/serviceregistrar/register", registration_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_register_rejects_wrong_form() {
    let (app, _) = test_app(true).await;

    let wrong = serde_json::to_string(&Form::SignalA(SignalA {
        value: 21.5,
        unit: "Celsius".to_string(),
        timestamp: None,
    }))
    .unwrap();
    let response = app
        .oneshot(json_post("/serviceregistrar/register", wrong))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_rejects_unknown_tag() {
    let (app, _) = test_app(true).await;

    let response = app
        .oneshot(json_post(
            "/serviceregistrar/register",
            r#"{"version":"NoSuchForm_v1"}"#.to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_rejects_wrong_media_type() {
    let (app, _) = test_app(true).await;

    let request = Request::builder()
        .method("POST")
        .uri("/serviceregistrar/register")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(registration_body()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_rejects_missing_definition() {
    let (app, _) = test_app(true).await;

    let response = app
        .oneshot(json_post(
            "/serviceregistrar/register",
            r#"{"version":"ServiceRecord_v1","regLife":30}"#.to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ==================== Query ====================

#[tokio::test]
async fn test_query_filters_by_definition() {
    let (app, state) = test_app(true).await;

    let temperature = match unpack(registration_body().as_bytes()).unwrap() {
        Form::ServiceRecord(record) => record,
        _ => unreachable!(),
    };
    let mut humidity = temperature.clone();
    humidity.service_definition = "humidity".to_string();
    humidity.sub_path = "hum".to_string();
    state.registry.add(temperature).await.unwrap();
    state.registry.add(humidity).await.unwrap();

    let quest = r#"{"version":"ServiceQuest_v1","serviceDefinition":"temperature"}"#;
    let response = app
        .oneshot(json_post("/serviceregistrar/query", quest.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let list = match unpack(&response_bytes(response).await).unwrap() {
        Form::ServiceRecordList(list) => list.list,
        other => panic!("expected ServiceRecordList, got {}", other.tag()),
    };
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].service_definition, "temperature");
}

#[tokio::test]
async fn test_query_answers_on_standby() {
    let (app, _) = test_app(false).await;

    let quest = r#"{"version":"ServiceQuest_v1","serviceDefinition":"temperature"}"#;
    let response = app
        .oneshot(json_post("/serviceregistrar/query", quest.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_query_rejects_wrong_form() {
    let (app, _) = test_app(true).await;

    let wrong = serde_json::to_string(&Form::SystemMessage(SystemMessage {
        level: MessageLevel::Info,
        system: "x".to_string(),
        body: "hello".to_string(),
    }))
    .unwrap();
    let response = app
        .oneshot(json_post("/serviceregistrar/query", wrong))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ==================== Unregister ====================

#[tokio::test]
async fn test_unregister_removes_record() {
    let (app, state) = test_app(true).await;

    let record = match unpack(registration_body().as_bytes()).unwrap() {
        Form::ServiceRecord(record) => record,
        _ => unreachable!(),
    };
    let stored = state.registry.add(record).await.unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/serviceregistrar/unregister/{}", stored.id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.registry.read(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unregister_rejects_bad_id() {
    let (app, _) = test_app(true).await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/serviceregistrar/unregister/notanumber")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unregister_requires_lead() {
    let (app, _) = test_app(false).await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/serviceregistrar/unregister/1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ==================== Status ====================

#[tokio::test]
async fn test_status_when_leading() {
    let (app, _) = test_app(true).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/serviceregistrar/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = String::from_utf8(response_bytes(response).await).unwrap();
    assert!(body.starts_with("lead Service Registrar since"));
}

#[tokio::test]
async fn test_status_when_standing_by() {
    let (app, _) = test_app(false).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/serviceregistrar/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = String::from_utf8(response_bytes(response).await).unwrap();
    assert!(body.contains("On standby, leading registrar is"));
}

// ==================== Syslist ====================

#[tokio::test]
async fn test_syslist_returns_unique_system_urls() {
    let (app, state) = test_app(true).await;

    let record = match unpack(registration_body().as_bytes()).unwrap() {
        Form::ServiceRecord(record) => record,
        _ => unreachable!(),
    };
    // Two services from the same system collapse to one URL.
    let mut second = record.clone();
    second.service_definition = "humidity".to_string();
    second.sub_path = "hum".to_string();
    state.registry.add(record).await.unwrap();
    state.registry.add(second).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/serviceregistrar/syslist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let urls = match unpack(&response_bytes(response).await).unwrap() {
        Form::SystemRecordList(list) => list.system_urls,
        other => panic!("expected SystemRecordList, got {}", other.tag()),
    };
    assert_eq!(urls, vec!["http://10.0.0.1:8081/sensor1".to_string()]);
}
