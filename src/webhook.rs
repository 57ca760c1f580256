use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::dispatch::{Dispatcher, TriggerError};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct NotifyResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_updated: Option<bool>,
}

impl NotifyResponse {
    fn success(record_updated: Option<bool>) -> Self {
        Self {
            status: "success".into(),
            message: None,
            record_updated,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: Some(message.into()),
            record_updated: None,
        }
    }
}

pub fn add_routes(router: Router, dispatcher: Arc<Dispatcher>) -> Router {
    router.route("/", routing::get(index)).route(
        "/notify",
        routing::post(post_notify).with_state(dispatcher),
    )
}

pub async fn index() -> &'static str {
    "booking notifier is running"
}

pub async fn post_notify(
    State(dispatcher): State<Arc<Dispatcher>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<NotifyResponse>) {
    let payload = match payload {
        Ok(Json(Value::Object(map))) => map,
        Ok(Json(other)) => {
            error!(payload = %other, "trigger payload is not a JSON object");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(NotifyResponse::error("payload must be a JSON object")),
            );
        }
        Err(rejection) => {
            error!(error = %rejection, "unreadable trigger payload");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(NotifyResponse::error(rejection.body_text())),
            );
        }
    };
    debug!(?payload, "incoming trigger payload");

    match dispatcher.dispatch_trigger(&payload).await {
        Ok(result) => {
            info!(record_updated = ?result.record_updated, "trigger handled");
            (
                StatusCode::OK,
                Json(NotifyResponse::success(result.record_updated)),
            )
        }
        Err(err) => {
            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let message = match &err {
                TriggerError::Internal(inner) => format!("{:#}", inner),
                other => other.to_string(),
            };
            error!(status = status.as_u16(), %message, "trigger failed");
            (status, Json(NotifyResponse::error(message)))
        }
    }
}
