//! HTTP API endpoints
//!
//! Bodies are protobuf. Handlers log identifiers and sizes, never bodies.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use prost::Message;
use tracing::{debug, error, info, warn};

use hush_proto::v1::{KeyHistoryV1, PublishKeyRequestV1};
use hush_proto::validation::validate_identifier;

use crate::registry::{KeyRegistry, PublishOutcome, RegistryError};
use crate::store::RecordStore;

const PROTOBUF: &str = "application/x-protobuf";

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<KeyRegistry>,
    pub store: Arc<dyn RecordStore>,
    pub max_key_request_size: usize,
    pub max_blob_size: usize,
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    let body_limit = state.max_blob_size;
    Router::new()
        .route("/keys/:user_id", get(get_current))
        .route("/keys/:user_id/:device_id", put(put_key).get(get_device_current))
        .route("/keys/:user_id/:device_id/history", get(get_history))
        .route("/blobs/:blob_id", put(put_blob).get(get_blob))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn protobuf<M: Message>(status: StatusCode, message: &M) -> Response {
    (status, [(header::CONTENT_TYPE, PROTOBUF)], message.encode_to_vec()).into_response()
}

fn registry_error(e: RegistryError) -> Response {
    match e {
        RegistryError::Invalid(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        RegistryError::Store(e) => {
            error!("Store error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Storage error").into_response()
        }
    }
}

/// PUT /keys/{user_id}/{device_id} - Publish a device key
async fn put_key(
    State(state): State<ApiState>,
    Path((user_id, device_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    if body.len() > state.max_key_request_size {
        return (StatusCode::PAYLOAD_TOO_LARGE, "Key request too large").into_response();
    }

    let request = match PublishKeyRequestV1::decode(&body[..]) {
        Ok(r) => r,
        Err(e) => {
            warn!(user_id = %user_id, "Failed to parse PublishKeyRequestV1: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid key request").into_response();
        }
    };

    match state.registry.publish(&user_id, &device_id, &request.public_key).await {
        Ok((record, PublishOutcome::Created)) => protobuf(StatusCode::CREATED, &record),
        Ok((record, PublishOutcome::Unchanged)) => protobuf(StatusCode::OK, &record),
        Err(e) => registry_error(e),
    }
}

/// GET /keys/{user_id} - Most recent current record across the user's devices
async fn get_current(State(state): State<ApiState>, Path(user_id): Path<String>) -> Response {
    match state.registry.current(&user_id).await {
        Ok(Some(record)) => protobuf(StatusCode::OK, &record),
        Ok(None) => (StatusCode::NOT_FOUND, "No key published").into_response(),
        Err(e) => registry_error(e),
    }
}

/// GET /keys/{user_id}/{device_id} - Current record of one device
async fn get_device_current(
    State(state): State<ApiState>,
    Path((user_id, device_id)): Path<(String, String)>,
) -> Response {
    match state.registry.device_current(&user_id, &device_id).await {
        Ok(Some(record)) => protobuf(StatusCode::OK, &record),
        Ok(None) => (StatusCode::NOT_FOUND, "No key published").into_response(),
        Err(e) => registry_error(e),
    }
}

/// GET /keys/{user_id}/{device_id}/history - Every record of one device
async fn get_history(
    State(state): State<ApiState>,
    Path((user_id, device_id)): Path<(String, String)>,
) -> Response {
    match state.registry.history(&user_id, &device_id).await {
        Ok(records) => protobuf(StatusCode::OK, &KeyHistoryV1 { records }),
        Err(e) => registry_error(e),
    }
}

/// PUT /blobs/{blob_id} - Store an opaque envelope
async fn put_blob(
    State(state): State<ApiState>,
    Path(blob_id): Path<String>,
    body: Bytes,
) -> Response {
    if validate_identifier("blob_id", &blob_id).is_err() {
        return (StatusCode::BAD_REQUEST, "Invalid blob_id").into_response();
    }
    if body.len() > state.max_blob_size {
        return (StatusCode::PAYLOAD_TOO_LARGE, "Blob too large").into_response();
    }

    match state.store.put_blob(&blob_id, &body).await {
        Ok(()) => {
            info!(blob_id = %blob_id, size = body.len(), "Stored blob");
            StatusCode::CREATED.into_response()
        }
        Err(e) => {
            error!("Store error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Storage error").into_response()
        }
    }
}

/// GET /blobs/{blob_id} - Fetch an opaque envelope
async fn get_blob(State(state): State<ApiState>, Path(blob_id): Path<String>) -> Response {
    if validate_identifier("blob_id", &blob_id).is_err() {
        return (StatusCode::BAD_REQUEST, "Invalid blob_id").into_response();
    }

    match state.store.get_blob(&blob_id).await {
        Ok(Some(data)) => {
            debug!(blob_id = %blob_id, size = data.len(), "Serving blob");
            (StatusCode::OK, [(header::CONTENT_TYPE, "application/octet-stream")], data).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Blob not found").into_response(),
        Err(e) => {
            error!("Store error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Storage error").into_response()
        }
    }
}

/// GET /health
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
