mod common;

use axum::{
    body::Body,
    http::{self, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt; // for `collect`
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use booking_notifier::dispatch::Dispatcher;
use booking_notifier::webhook::add_routes;
use common::{ack, due_record, test_config, Events, InMemoryStore, RecordingSender};

fn app(store: &InMemoryStore, sender: &RecordingSender) -> Router {
    let dispatcher = Dispatcher::new(
        Arc::new(store.clone()),
        Arc::new(sender.clone()),
        &test_config(),
    );
    add_routes(Router::new(), Arc::new(dispatcher))
}

async fn post_notify(app: Router, body: String) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/notify")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn index_reports_running() {
    let events = Events::default();
    let store = InMemoryStore::new(vec![], events.clone());
    let sender = RecordingSender::new(events);

    let response = app(&store, &sender)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"booking notifier is running");
}

#[tokio::test]
async fn notify_success() {
    let events = Events::default();
    let store = InMemoryStore::new(
        vec![due_record("rec1", json!("12345"), "First Aid", "2024-05-01")],
        events.clone(),
    );
    let sender = RecordingSender::new(events);

    let payload = json!({
        "record_id": "rec1",
        "course": "First Aid",
        "date": "2024-05-01",
        "instructor": ["Jane Doe"],
        "telegram_id": ["12345"]
    });
    let (status, body) = post_notify(app(&store, &sender), payload.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "record_updated": true}));
    assert_eq!(sender.calls().await.len(), 1);
    assert!(!store.is_due("rec1").await);
}

#[tokio::test]
async fn notify_missing_recipient_is_bad_request() {
    let events = Events::default();
    let store = InMemoryStore::new(vec![], events.clone());
    let sender = RecordingSender::new(events);

    let payload = json!({ "course": "First Aid", "date": "2024-05-01" });
    let (status, body) = post_notify(app(&store, &sender), payload.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("missing telegram chat id"));
    assert!(sender.calls().await.is_empty());
}

#[tokio::test]
async fn notify_rejected_by_telegram_is_bad_request() {
    let events = Events::default();
    let store = InMemoryStore::new(vec![], events.clone());
    let sender = RecordingSender::with_responses(vec![Ok(ack(false))], events);

    let payload = json!({ "record_id": "rec1", "telegram_id": "12345" });
    let (status, body) = post_notify(app(&store, &sender), payload.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(store.update_calls().await.is_empty());
}

#[tokio::test]
async fn notify_update_failure_is_internal_error() {
    let events = Events::default();
    let mut store = InMemoryStore::new(
        vec![due_record("rec1", json!("12345"), "First Aid", "2024-05-01")],
        events.clone(),
    );
    store.fail_updates = true;
    let sender = RecordingSender::new(events);

    let payload = json!({ "record_id": "rec1", "telegram_id": "12345" });
    let (status, body) = post_notify(app(&store, &sender), payload.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("message delivered"));
    assert!(message.contains("not marked as notified"));
    assert_eq!(sender.calls().await.len(), 1);
    assert!(store.is_due("rec1").await);
}

#[tokio::test]
async fn malformed_payload_is_internal_error() {
    let events = Events::default();
    let store = InMemoryStore::new(vec![], events.clone());
    let sender = RecordingSender::new(events);

    let (status, body) = post_notify(app(&store, &sender), "{not json".into()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");

    let (status, _) = post_notify(app(&store, &sender), "[1, 2]".into()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(sender.calls().await.is_empty());
}
