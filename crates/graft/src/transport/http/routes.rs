//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::loader::LoadStatus;
use crate::service::{HostService, StatusSnapshot};

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: LoadStatus,
    pub version: &'static str,
}

impl From<StatusSnapshot> for HealthCheckResponse {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            status: snapshot.status,
            version: snapshot.version,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
struct SendMessageResponse {
    status: &'static str,
    /// Load status at the time of the send, so callers can tell an
    /// unobservable send ("the fragment is not there yet") from a normal one.
    fragment: LoadStatus,
}

async fn health_check(State(service): State<Arc<HostService>>) -> Json<HealthCheckResponse> {
    Json(service.status().into())
}

async fn send_message(
    State(service): State<Arc<HostService>>,
    Json(request): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let fragment = service.status().status;
    service.send(&request.message);

    // 202: the write happened, but the channel has no delivery confirmation
    (
        StatusCode::ACCEPTED,
        Json(SendMessageResponse {
            status: "accepted",
            fragment,
        }),
    )
}

async fn shutdown(State(service): State<Arc<HostService>>) -> impl IntoResponse {
    service.shutdown();
    StatusCode::OK
}

pub fn routes(service: Arc<HostService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/messages", post(send_message))
        .route("/shutdown", post(shutdown))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use super::*;
    use crate::channel::MESSAGE_NODE_ID;
    use crate::dom::Document;
    use crate::loader::{DEFAULT_MOUNT_ID, FragmentDescriptor, FragmentLoader};

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn test_service(status: LoadStatus) -> (Document, Arc<HostService>) {
        let document = Document::new();
        let loader = FragmentLoader::new(FragmentDescriptor::new("http://localhost:5003"));
        let handle = loader.mount(&document, DEFAULT_MOUNT_ID);
        let (_tx, rx) = watch::channel(status);
        (document, Arc::new(HostService::new(handle, rx)))
    }

    #[tokio::test]
    async fn health_check_reports_status_and_version() {
        let (_document, service) = test_service(LoadStatus::Loading);
        let app = routes(service);

        let response = app
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "loading");
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn send_message_writes_into_the_tree() {
        let (document, service) = test_service(LoadStatus::Mounted);
        let app = routes(service);

        let response = app
            .oneshot(
                Request::post("/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message":"from the button"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = response_json(response).await;
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["fragment"], "mounted");

        let node = document.element_by_id(MESSAGE_NODE_ID).unwrap();
        assert!(document.text_content(node).contains("from the button"));
    }

    #[tokio::test]
    async fn send_message_accepted_even_before_mount() {
        let (_document, service) = test_service(LoadStatus::Loading);
        let app = routes(service);

        let response = app
            .oneshot(
                Request::post("/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message":"early"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = response_json(response).await;
        assert_eq!(json["fragment"], "loading");
    }

    #[tokio::test]
    async fn send_message_rejects_missing_body() {
        let (_document, service) = test_service(LoadStatus::Mounted);
        let app = routes(service);

        let response = app
            .oneshot(
                Request::post("/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn shutdown_triggers_service_shutdown() {
        let (_document, service) = test_service(LoadStatus::Mounted);
        let mut rx = service.shutdown_rx();
        let app = routes(service);

        assert!(!*rx.borrow());

        let response = app
            .oneshot(Request::post("/shutdown").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
