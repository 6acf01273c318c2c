//! Node HTTP handlers.
//!
//! - `POST /nodes` direct creation (identity collisions are 409)
//! - `GET /nodes/:id`, `GET /nodes/by-name/:name`
//! - `GET /nodes/:id/mentions`, `GET /nodes/:id/links`
//! - `PATCH /nodes/:id/type` type change, merging on identity collision
//! - `POST|DELETE /nodes/:id/tags`

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{parse_node_type, require_text, FlagFields};
use crate::extract::{Owner, ValidJson, ValidPath};
use crate::{ApiError, AppState};
use lore_core::{
    ChangeNodeTypeOutcome, ChangeNodeTypeRequest, CreateNodeRequest, Link, LinkRepository,
    MentionRepository, MentionWithSnippet, Node, NodeRepository, TagChange,
};

/// Fetch one of the owner's nodes or fail with 404.
async fn owned_node(state: &AppState, owner_id: i64, id: i64) -> Result<Node, ApiError> {
    state
        .db
        .nodes
        .get(owner_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Node not found".to_string()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNodeBody {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(flatten)]
    pub flags: FlagFields,
}

/// Create a node directly.
///
/// POST /nodes
#[utoipa::path(post, path = "/nodes", tag = "Nodes",
    request_body = CreateNodeBody,
    responses(
        (status = 201, description = "Created", body = Node),
        (status = 409, description = "A node with this name and type already exists")))]
pub async fn create_node(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidJson(body): ValidJson<CreateNodeBody>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    let node = state
        .db
        .nodes
        .create(CreateNodeRequest {
            owner_id,
            name: require_text(&body.name, "name")?,
            node_type: parse_node_type(&body.node_type)?,
            sub_type: body.sub_type.filter(|s| !s.trim().is_empty()),
            flags: body.flags.into(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// GET /nodes/:id
#[utoipa::path(get, path = "/nodes/{id}", tag = "Nodes",
    params(("id" = i64, Path, description = "Node id")),
    responses((status = 200, body = Node), (status = 404, description = "Not found")))]
pub async fn get_node(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Node>, ApiError> {
    Ok(Json(owned_node(&state, owner_id, id).await?))
}

/// GET /nodes/by-name/:name
#[utoipa::path(get, path = "/nodes/by-name/{name}", tag = "Nodes",
    params(("name" = String, Path, description = "Node name, case-insensitive")),
    responses((status = 200, body = Node), (status = 404, description = "Not found")))]
pub async fn get_node_by_name(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(name): ValidPath<String>,
) -> Result<Json<Node>, ApiError> {
    state
        .db
        .nodes
        .find_by_name(owner_id, &name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No node named '{}'", name)))
}

/// Mentions of a node with the text each covers.
///
/// GET /nodes/:id/mentions
#[utoipa::path(get, path = "/nodes/{id}/mentions", tag = "Nodes",
    params(("id" = i64, Path, description = "Node id")),
    responses((status = 200, body = Vec<MentionWithSnippet>)))]
pub async fn list_node_mentions(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Vec<MentionWithSnippet>>, ApiError> {
    let node = owned_node(&state, owner_id, id).await?;
    Ok(Json(state.db.mentions.list_for_node(node.id).await?))
}

/// GET /nodes/:id/links
#[utoipa::path(get, path = "/nodes/{id}/links", tag = "Nodes",
    params(("id" = i64, Path, description = "Node id")),
    responses((status = 200, body = Vec<Link>)))]
pub async fn list_node_links(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Vec<Link>>, ApiError> {
    let node = owned_node(&state, owner_id, id).await?;
    Ok(Json(state.db.links.list_for_node(node.id).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTypeBody {
    #[serde(alias = "new_type")]
    pub new_type: String,
    #[serde(flatten)]
    pub flags: FlagFields,
}

/// Change a node's type, merging into an existing node of that name and type.
///
/// PATCH /nodes/:id/type
#[utoipa::path(patch, path = "/nodes/{id}/type", tag = "Nodes",
    params(("id" = i64, Path, description = "Node id")),
    request_body = ChangeTypeBody,
    responses(
        (status = 200, description = "Updated in place or merged"),
        (status = 403, description = "Node belongs to another user"),
        (status = 404, description = "Not found")))]
pub async fn change_node_type(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<ChangeTypeBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let new_type = parse_node_type(&body.new_type)?;
    let outcome = state
        .db
        .engine
        .change_node_type(ChangeNodeTypeRequest {
            owner_id,
            node_id: id,
            new_type,
            flags: body.flags.into(),
        })
        .await?;

    let response = match outcome {
        ChangeNodeTypeOutcome::Updated { node_id } => json!({
            "success": true,
            "merged": false,
            "updated_node_id": node_id,
            "message": format!("Node type changed to {}", new_type),
        }),
        ChangeNodeTypeOutcome::Merged {
            target_node_id,
            absorbed_node_id,
            mentions_moved,
            links_repointed,
            links_dropped,
        } => json!({
            "success": true,
            "merged": true,
            "target_node_id": target_node_id,
            "absorbed_node_id": absorbed_node_id,
            "mentions_moved": mentions_moved,
            "links_repointed": links_repointed,
            "links_dropped": links_dropped,
            "message": format!(
                "Merged into existing {} node {}",
                new_type, target_node_id
            ),
        }),
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TagBody {
    pub tag: String,
}

fn tag_response(change: TagChange) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "tags_changed": change.tags_changed,
        "current_tags": change.current_tags,
        "is_player_character": change.flags.is_player_character,
        "is_party_member": change.flags.is_party_member,
    }))
}

/// POST /nodes/:id/tags
#[utoipa::path(post, path = "/nodes/{id}/tags", tag = "Nodes",
    params(("id" = i64, Path, description = "Node id")),
    request_body = TagBody,
    responses((status = 200, body = TagChange)))]
pub async fn add_node_tag(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<TagBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tag = require_text(&body.tag, "tag")?;
    let change = state.db.nodes.add_tag(owner_id, id, &tag).await?;
    Ok(tag_response(change))
}

/// Remove a tag; the reserved tags also clear their flag.
///
/// DELETE /nodes/:id/tags
#[utoipa::path(delete, path = "/nodes/{id}/tags", tag = "Nodes",
    params(("id" = i64, Path, description = "Node id")),
    request_body = TagBody,
    responses((status = 200, body = TagChange)))]
pub async fn remove_node_tag(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<TagBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tag = require_text(&body.tag, "tag")?;
    let change = state.db.nodes.remove_tag(owner_id, id, &tag).await?;
    Ok(tag_response(change))
}
