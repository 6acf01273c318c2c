//! Manual mention lifecycle handlers.
//!
//! Every write goes through the consolidation engine so the change and its
//! correction log entry commit together.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{parse_node_type, require_text, FlagFields};
use crate::extract::{Owner, ValidJson, ValidPath};
use crate::{ApiError, AppState};
use lore_core::{
    AddMentionRequest, ConfirmMentionRequest, CorrectMentionRequest, DeleteMentionRequest,
    TextSpan,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMentionBody {
    pub name_segment: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub start_pos: i32,
    pub end_pos: i32,
    #[serde(flatten)]
    pub flags: FlagFields,
}

/// Tag a span of a note by hand.
///
/// POST /notes/:note_id/mentions/add
#[utoipa::path(post, path = "/notes/{note_id}/mentions/add", tag = "Mentions",
    params(("note_id" = i64, Path, description = "Note id")),
    request_body = AddMentionBody,
    responses(
        (status = 201, description = "Mention added, or the identical one returned"),
        (status = 400, description = "Invalid span or type"),
        (status = 403, description = "Note belongs to another user")))]
pub async fn add_mention(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(note_id): ValidPath<i64>,
    ValidJson(body): ValidJson<AddMentionBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let name_segment = require_text(&body.name_segment, "name_segment")?;
    let node_type = parse_node_type(&body.node_type)?;
    let span = TextSpan::new(body.start_pos, body.end_pos)?;

    let outcome = state
        .db
        .engine
        .add_mention(AddMentionRequest {
            owner_id,
            note_id,
            name_segment,
            node_type,
            span,
            flags: body.flags.into(),
        })
        .await?;

    let message = if outcome.created {
        "Mention added successfully"
    } else {
        "Mention already existed"
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": message,
            "created": outcome.created,
            "new_mention": outcome.mention,
        })),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CorrectMentionBody {
    #[serde(default)]
    pub new_name_segment: Option<String>,
    pub new_type: String,
    pub note_id: i64,
    #[serde(default)]
    pub original_text_segment: Option<String>,
    /// Accepted for compatibility; the stored type is what gets logged.
    #[serde(default)]
    pub original_mention_type: Option<String>,
    #[serde(default)]
    pub start_pos: Option<i32>,
    #[serde(default)]
    pub end_pos: Option<i32>,
}

fn optional_span(start: Option<i32>, end: Option<i32>) -> Result<Option<TextSpan>, ApiError> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(Some(TextSpan::new(start, end)?)),
        (None, None) => Ok(None),
        _ => Err(ApiError::BadRequest(
            "start_pos and end_pos must be given together".to_string(),
        )),
    }
}

/// Point a mention at a different name, type, or span.
///
/// POST /mentions/:id/correct
#[utoipa::path(post, path = "/mentions/{id}/correct", tag = "Mentions",
    params(("id" = i64, Path, description = "Mention id")),
    request_body = CorrectMentionBody,
    responses(
        (status = 200, description = "Mention corrected"),
        (status = 404, description = "Mention not found")))]
pub async fn correct_mention(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(mention_id): ValidPath<i64>,
    ValidJson(body): ValidJson<CorrectMentionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let new_type = parse_node_type(&body.new_type)?;
    let span = optional_span(body.start_pos, body.end_pos)?;

    let updated = state
        .db
        .engine
        .correct_mention(CorrectMentionRequest {
            owner_id,
            mention_id,
            note_id: body.note_id,
            new_name_segment: body.new_name_segment,
            new_type,
            original_text_segment: body.original_text_segment,
            span,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Mention updated successfully",
        "updated_mention": updated,
    })))
}

/// Mark a mention as reviewed.
///
/// POST /mentions/:id/confirm
#[utoipa::path(post, path = "/mentions/{id}/confirm", tag = "Mentions",
    params(("id" = i64, Path, description = "Mention id")),
    responses(
        (status = 200, description = "Mention confirmed"),
        (status = 404, description = "Mention not found")))]
pub async fn confirm_mention(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(mention_id): ValidPath<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .db
        .engine
        .confirm_mention(ConfirmMentionRequest {
            owner_id,
            mention_id,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Mention confirmed successfully",
        "updated_mention": updated,
    })))
}

/// Optional delete body; the stored mention always takes precedence.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DeleteMentionBody {
    #[serde(default)]
    pub original_text_segment: Option<String>,
}

/// DELETE /mentions/:id
#[utoipa::path(delete, path = "/mentions/{id}", tag = "Mentions",
    params(("id" = i64, Path, description = "Mention id")),
    request_body = DeleteMentionBody,
    responses(
        (status = 200, description = "Mention deleted"),
        (status = 404, description = "Mention not found, nothing logged")))]
pub async fn delete_mention(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(mention_id): ValidPath<i64>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body: DeleteMentionBody = if body.iter().all(u8::is_ascii_whitespace) {
        DeleteMentionBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    state
        .db
        .engine
        .delete_mention(DeleteMentionRequest {
            owner_id,
            mention_id,
            original_text_segment: body.original_text_segment,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Mention deleted successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_span() {
        assert_eq!(optional_span(None, None).unwrap(), None);
        assert_eq!(
            optional_span(Some(2), Some(5)).unwrap(),
            Some(TextSpan { start: 2, end: 5 })
        );
        assert!(matches!(
            optional_span(Some(2), None),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            optional_span(Some(5), Some(5)),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_correct_body_accepts_legacy_fields() {
        let body: CorrectMentionBody = serde_json::from_value(serde_json::json!({
            "new_type": "PERSON",
            "note_id": 42,
            "original_text_segment": "Aria",
            "original_mention_type": "LOCATION"
        }))
        .unwrap();
        assert_eq!(body.new_name_segment, None);
        assert_eq!(body.original_mention_type.as_deref(), Some("LOCATION"));
        assert_eq!(body.start_pos, None);
    }
}
