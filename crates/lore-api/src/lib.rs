//! # lore-api
//!
//! HTTP surface for lorekeep: notes with tagger ingestion, node and mention
//! editing, and the consolidation operations (type change with merge,
//! retag-everywhere).
//!
//! Every request acts for the owner named in the `X-User-Id` header, which an
//! upstream gateway is trusted to set.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod logging;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use governor::RateLimiter;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use uuid::Uuid;

use config::{RateLimitConfig, ServerConfig};
use handlers::{entities, health, mentions, nodes, notes};
use lore_core::Tagger;
use lore_db::Database;

pub use error::ApiError;

/// Generates request ids as UUIDv7 so they sort by arrival time.
#[derive(Clone, Copy, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Build the process-wide limiter: `requests` per `period_secs`, bursting
/// up to `requests`.
pub fn build_rate_limiter(config: RateLimitConfig) -> Option<Arc<GlobalRateLimiter>> {
    let burst = std::num::NonZeroU32::new(config.requests)?;
    let period = Duration::from_secs(config.period_secs) / config.requests;
    let quota = governor::Quota::with_period(period)?.allow_burst(burst);
    Some(Arc::new(RateLimiter::direct(quota)))
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// `None` when tagging is disabled.
    pub tagger: Option<Arc<dyn Tagger>>,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            tagger: None,
            rate_limiter: None,
        }
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn Tagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<GlobalRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "lorekeep API", description = "Campaign notes, entities and mentions"),
    paths(
        health::health_check,
        notes::create_note,
        notes::list_notes,
        notes::get_note,
        notes::update_note,
        notes::delete_note,
        notes::list_note_mentions,
        notes::list_note_corrections,
        nodes::create_node,
        nodes::get_node,
        nodes::get_node_by_name,
        nodes::list_node_mentions,
        nodes::list_node_links,
        nodes::change_node_type,
        nodes::add_node_tag,
        nodes::remove_node_tag,
        entities::list_by_type,
        entities::list_player_characters_detailed,
        entities::retag_everywhere,
        mentions::add_mention,
        mentions::correct_mention,
        mentions::confirm_mention,
        mentions::delete_mention,
    ),
    components(schemas(
        lore_core::Note,
        lore_core::Node,
        lore_core::NodeType,
        lore_core::NodeFlags,
        lore_core::Mention,
        lore_core::MentionDetail,
        lore_core::MentionWithSnippet,
        lore_core::PlayerCharacterDetail,
        lore_core::Link,
        lore_core::CorrectionLogEntry,
        lore_core::CorrectionAction,
        lore_core::TagChange,
        lore_core::ProposedMention,
        handlers::FlagFields,
        notes::CreateNoteBody,
        notes::UpdateNoteBody,
        nodes::CreateNodeBody,
        nodes::ChangeTypeBody,
        nodes::TagBody,
        entities::RetagBody,
        mentions::AddMentionBody,
        mentions::CorrectMentionBody,
        mentions::DeleteMentionBody,
    )),
    tags(
        (name = "Notes", description = "Notes and tagger ingestion"),
        (name = "Nodes", description = "Canonical entities and consolidation"),
        (name = "Mentions", description = "Manual mention lifecycle"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            tracing::warn!(subsystem = "api", component = "rate_limit", "Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

/// Routes with the rate limiter, without transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/openapi.json", get(health::openapi_json))
        // Notes
        .route("/notes", get(notes::list_notes).post(notes::create_note))
        .route(
            "/notes/:id",
            get(notes::get_note)
                .put(notes::update_note)
                .delete(notes::delete_note),
        )
        .route("/notes/:id/mentions", get(notes::list_note_mentions))
        .route("/notes/:id/mentions/add", post(mentions::add_mention))
        .route("/notes/:id/corrections", get(notes::list_note_corrections))
        // Nodes
        .route("/nodes", post(nodes::create_node))
        .route("/nodes/by-name/:name", get(nodes::get_node_by_name))
        .route("/nodes/:id", get(nodes::get_node))
        .route("/nodes/:id/mentions", get(nodes::list_node_mentions))
        .route("/nodes/:id/links", get(nodes::list_node_links))
        .route("/nodes/:id/type", patch(nodes::change_node_type))
        .route(
            "/nodes/:id/tags",
            post(nodes::add_node_tag).delete(nodes::remove_node_tag),
        )
        .route("/entities/by-type/:type", get(entities::list_by_type))
        .route(
            "/entities/player-characters-detailed",
            get(entities::list_player_characters_detailed),
        )
        .route(
            "/retag-entity-everywhere",
            post(entities::retag_everywhere),
        )
        // Mentions
        .route("/mentions/:id", axum::routing::delete(mentions::delete_mention))
        .route("/mentions/:id/correct", post(mentions::correct_mention))
        .route("/mentions/:id/confirm", post(mentions::confirm_mention))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(extract::OWNER_HEADER),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// The full application: routes plus tracing, request ids, CORS, body
/// limit and panic recovery.
pub fn build_app(state: AppState, config: &ServerConfig) -> Router {
    router(state)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors_layer(&config.allowed_origins))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(CatchPanicLayer::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_allows_burst_then_blocks() {
        let limiter = build_rate_limiter(RateLimitConfig {
            requests: 3,
            period_secs: 60,
        })
        .unwrap();
        for _ in 0..3 {
            assert!(limiter.check().is_ok());
        }
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_rate_limiter_rejects_zero_requests() {
        assert!(build_rate_limiter(RateLimitConfig {
            requests: 0,
            period_secs: 60,
        })
        .is_none());
    }

    #[test]
    fn test_openapi_lists_consolidation_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/nodes/{id}/type"));
        assert!(paths.iter().any(|p| p.as_str() == "/retag-entity-everywhere"));
        assert!(paths.iter().any(|p| p.as_str() == "/notes/{note_id}/mentions/add"));
    }
}
