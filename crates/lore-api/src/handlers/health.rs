use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use utoipa::OpenApi;

use crate::{ApiDoc, AppState};

/// Liveness plus dependency status.
///
/// GET /health
#[utoipa::path(get, path = "/health", tag = "System",
    responses(
        (status = 200, description = "Database reachable"),
        (status = 503, description = "Database unreachable")))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.db.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(subsystem = "api", component = "health", error = %e, "Database ping failed");
            "unavailable"
        }
    };
    lore_db::log_pool_metrics(state.db.pool());

    let tagger = match state.tagger.as_ref() {
        None => "disabled",
        Some(tagger) => match tagger.health_check().await {
            Ok(true) => "ok",
            _ => "unavailable",
        },
    };

    let status = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let overall = if status == StatusCode::OK {
        "healthy"
    } else {
        "degraded"
    };

    (
        status,
        Json(json!({
            "status": overall,
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "tagger": tagger,
        })),
    )
}

/// GET /openapi.json
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
