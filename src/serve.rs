use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::error;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::db::MetadataStore;
use crate::error::SplitError;
use crate::segmenter::Segmenter;
use crate::split::{SplitOptions, SplitOrchestrator};
use crate::storage::StorageProvider;

/// State shared by all request handlers
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub storage: Arc<dyn StorageProvider>,
    pub segmenter: Arc<dyn Segmenter>,
    pub split_options: SplitOptions,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/recordings/{id}/split", post(split_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind and run the API server
pub async fn serve(state: Arc<AppState>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", port);
    println!("Endpoints:");
    println!("  POST /recordings/{{id}}/split[?force=true]  - Split a recording into segments");
    println!("  GET /health  - Liveness probe");

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("[::]:{}", port))
        .await
        .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Deserialize)]
struct SplitQuery {
    #[serde(default)]
    force: bool,
}

/// Caller identity resolved by the fronting auth layer and passed through as
/// a header. Session handling itself lives outside this service.
fn caller_id(headers: &HeaderMap) -> Option<i64> {
    headers.get("x-user-id")?.to_str().ok()?.parse().ok()
}

async fn split_handler(
    State(state): State<Arc<AppState>>,
    Path(recording_id): Path<i64>,
    Query(query): Query<SplitQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(requested_by) = caller_id(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"error": "missing caller identity"})),
        )
            .into_response();
    };

    let blobs = match state.storage.for_owner(requested_by) {
        Ok(blobs) => blobs,
        Err(e) => {
            error!("No storage backend for owner {}: {}", requested_by, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Storage error: {}", e)})),
            )
                .into_response();
        }
    };

    let orchestrator = SplitOrchestrator::new(
        state.store.clone(),
        blobs,
        state.segmenter.clone(),
        state.split_options.clone(),
    );

    match orchestrator.split(recording_id, requested_by, query.force).await {
        Ok(outcome) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "success": true,
                "segmentCount": outcome.segment_count,
                "recordingIds": outcome.recording_ids,
            })),
        )
            .into_response(),
        Err(err) => split_error_response(recording_id, err),
    }
}

/// Map pipeline errors onto the response contract
fn split_error_response(recording_id: i64, err: SplitError) -> Response {
    match err {
        SplitError::NotFound => (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({"error": "recording not found"})),
        )
            .into_response(),
        SplitError::Conflict { existing } => (
            StatusCode::CONFLICT,
            axum::Json(serde_json::json!({
                "error": "existing_splits",
                "existingCount": existing,
            })),
        )
            .into_response(),
        SplitError::TooShort => (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({"error": "recording too short to split"})),
        )
            .into_response(),
        err => {
            error!("Split of recording {} failed: {}", recording_id, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("{}", err)})),
            )
                .into_response()
        }
    }
}
