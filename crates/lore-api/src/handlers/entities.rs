//! Entity-wide handlers: listing by type and retag-everywhere.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{parse_node_type, require_text, FlagFields};
use crate::extract::{Owner, ValidJson, ValidPath};
use crate::{ApiError, AppState};
use lore_core::{Node, NodeRepository, PlayerCharacterDetail, RetagRequest};

/// GET /entities/by-type/:type
#[utoipa::path(get, path = "/entities/by-type/{type}", tag = "Nodes",
    params(("type" = String, Path, description = "Node type label, e.g. PERSON")),
    responses((status = 200, body = Vec<Node>), (status = 400, description = "Unknown type")))]
pub async fn list_by_type(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(raw_type): ValidPath<String>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let node_type = parse_node_type(&raw_type)?;
    Ok(Json(state.db.nodes.list_by_type(owner_id, node_type).await?))
}

/// GET /entities/player-characters-detailed
#[utoipa::path(get, path = "/entities/player-characters-detailed", tag = "Nodes",
    responses((status = 200, body = Vec<PlayerCharacterDetail>)))]
pub async fn list_player_characters_detailed(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
) -> Result<Json<Vec<PlayerCharacterDetail>>, ApiError> {
    Ok(Json(
        state
            .db
            .nodes
            .list_player_characters_detailed(owner_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RetagBody {
    pub name: String,
    #[serde(rename = "type", alias = "newType")]
    pub node_type: String,
    #[serde(flatten)]
    pub flags: FlagFields,
}

/// Make every occurrence of a name resolve to one node of the given type.
///
/// POST /retag-entity-everywhere
#[utoipa::path(post, path = "/retag-entity-everywhere", tag = "Nodes",
    request_body = RetagBody,
    responses(
        (status = 200, description = "Retag complete"),
        (status = 400, description = "Missing name or unknown type")))]
pub async fn retag_everywhere(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidJson(body): ValidJson<RetagBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = require_text(&body.name, "name")?;
    let node_type = parse_node_type(&body.node_type)?;

    let outcome = state
        .db
        .engine
        .retag_everywhere(RetagRequest {
            owner_id,
            name: name.clone(),
            node_type,
            flags: body.flags.into(),
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Entity '{}' re-tagged as '{}'. {} mentions reassigned. {} new mentions created.",
            name, node_type, outcome.mentions_reassigned, outcome.new_mentions_created
        ),
        "targetNodeId": outcome.target_node_id,
        "targetNodeIsNew": outcome.target_node_is_new,
        "mentionsReassigned": outcome.mentions_reassigned,
        "mentionsDiscarded": outcome.mentions_discarded,
        "newMentionsCreated": outcome.new_mentions_created,
        "obsoleteNodeIds": outcome.obsolete_node_ids,
    })))
}
