use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use pollroom::authority::{Authority, AuthorityConfig};
use pollroom::routes::create_routes;
use pollroom::store::MemoryStore;

async fn test_app() -> Router {
    let authority = Authority::spawn(Arc::new(MemoryStore::default()), AuthorityConfig::default())
        .await
        .unwrap();
    create_routes(authority)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_poll(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/poll",
        Some(json!({
            "question": "Tea or coffee?",
            "options": ["Tea", "Coffee"],
            "actor": "alice"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn create_then_vote_then_switch() {
    let app = test_app().await;
    let id = create_poll(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/poll/{id}/vote"),
        Some(json!({ "option_index": 0, "actor": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, poll) = send(
        &app,
        "POST",
        &format!("/api/poll/{id}/vote"),
        Some(json!({ "option_index": 1, "actor": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["options"][0]["voters"], json!([]));
    assert_eq!(poll["options"][1]["voters"], json!(["bob"]));
    assert_eq!(poll["version"], json!(2));

    let (status, current) = send(&app, "GET", "/api/poll", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current, poll);
}

#[tokio::test]
async fn poll_endpoints_reject_bad_requests() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/poll",
        Some(json!({ "question": "", "options": ["Tea", "Coffee"], "actor": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid input"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/poll",
        Some(json!({ "question": "Tea or coffee?", "options": ["Tea"], "actor": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/poll", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn vote_errors_map_to_statuses() {
    let app = test_app().await;
    let id = create_poll(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/poll/{id}/vote"),
        Some(json!({ "option_index": 9, "actor": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/poll/stale-id/vote",
        Some(json!({ "option_index": 0, "actor": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unvote_is_idempotent_over_http() {
    let app = test_app().await;
    let id = create_poll(&app).await;

    let (status, poll) = send(
        &app,
        "POST",
        &format!("/api/poll/{id}/unvote"),
        Some(json!({ "option_index": 0, "actor": "nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["version"], json!(0));
}

#[tokio::test]
async fn removal_requires_the_creator() {
    let app = test_app().await;
    let id = create_poll(&app).await;

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/poll/{id}"),
        Some(json!({ "actor": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/api/poll/{id}"),
        Some(json!({ "actor": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("poll removed"));

    let (status, _) = send(&app, "GET", "/api/poll", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn messages_round_trip_in_order() {
    let app = test_app().await;

    for i in 0..3 {
        let (status, entry) = send(
            &app,
            "POST",
            "/api/messages",
            Some(json!({
                "text": format!("msg {i}"),
                "actor": "bob",
                "nickname": "Bob",
                "avatar": null
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entry["seq"], json!(i));
    }

    let (status, messages) = send(&app, "GET", "/api/messages", None).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<_> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(texts, vec!["msg 0", "msg 1", "msg 2"]);

    let (status, _) = send(
        &app,
        "POST",
        "/api/messages",
        Some(json!({ "text": "   ", "actor": "bob", "nickname": "Bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscribe_is_an_event_stream() {
    let app = test_app().await;
    let request = Request::builder()
        .method("GET")
        .uri("/api/subscribe")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}
