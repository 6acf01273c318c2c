//! Note handlers, including tagger ingestion.
//!
//! Create and update commit the note first. The tagger runs afterwards and
//! its proposals are ingested in a second transaction, so a tagger outage
//! degrades the response but never loses the note.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::extract::{Owner, ValidJson, ValidPath};
use crate::{ApiError, AppState};
use lore_core::{
    CorrectionLogEntry, CorrectionLogRepository, CreateNoteRequest, MentionDetail,
    MentionRepository, Note, NoteRepository, TagRequest, UpdateNoteRequest,
};
use lore_db::ensure_note_owner;

/// What happened when the tagger was asked about a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaggingReport {
    Completed {
        proposals: usize,
        nodes_created: u64,
        mentions_created: u64,
        links_created: u64,
        proposals_skipped: u64,
    },
    Failed {
        error: String,
    },
    Disabled,
}

/// Ask the tagger about a committed note and persist what it proposes.
pub async fn run_tagging(state: &AppState, note: &Note) -> TaggingReport {
    let Some(tagger) = state.tagger.as_ref() else {
        return TaggingReport::Disabled;
    };
    let start = Instant::now();

    let request = TagRequest {
        note_id: note.id,
        text: note.content.clone(),
        user_id: note.owner_id,
    };
    let proposals = match tagger.tag(&request).await {
        Ok(proposals) => proposals,
        Err(e) => {
            warn!(
                subsystem = "api",
                component = "tagging",
                note_id = note.id,
                tagger = tagger.name(),
                error = %e,
                "Tagger failed, note kept untagged"
            );
            return TaggingReport::Failed {
                error: e.to_string(),
            };
        }
    };

    match state
        .db
        .engine
        .ingest_proposals(note.owner_id, note.id, &proposals)
        .await
    {
        Ok(outcome) => {
            info!(
                subsystem = "api",
                component = "tagging",
                note_id = note.id,
                proposal_count = proposals.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Note tagged"
            );
            TaggingReport::Completed {
                proposals: proposals.len(),
                nodes_created: outcome.nodes_created,
                mentions_created: outcome.mentions_created,
                links_created: outcome.links_created,
                proposals_skipped: outcome.proposals_skipped,
            }
        }
        Err(e) => {
            warn!(
                subsystem = "api",
                component = "tagging",
                note_id = note.id,
                error = %e,
                "Failed to store tagger proposals"
            );
            TaggingReport::Failed {
                error: e.to_string(),
            }
        }
    }
}

async fn owned_note(state: &AppState, owner_id: i64, id: i64) -> Result<Note, ApiError> {
    let note = state.db.notes.fetch(id).await?;
    Ok(ensure_note_owner(note, id, owner_id)?)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNoteBody {
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// POST /notes
#[utoipa::path(post, path = "/notes", tag = "Notes",
    request_body = CreateNoteBody,
    responses((status = 201, description = "Note created; see `tagging` for tagger status")))]
pub async fn create_note(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidJson(body): ValidJson<CreateNoteBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing note content".to_string()));
    }
    let note = state
        .db
        .notes
        .insert(CreateNoteRequest {
            owner_id,
            title: body.title,
            content: body.content,
        })
        .await?;

    let tagging = run_tagging(&state, &note).await;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "note": note,
            "tagging": tagging,
        })),
    ))
}

/// GET /notes
#[utoipa::path(get, path = "/notes", tag = "Notes",
    responses((status = 200, body = Vec<Note>)))]
pub async fn list_notes(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
) -> Result<Json<Vec<Note>>, ApiError> {
    Ok(Json(state.db.notes.list(owner_id).await?))
}

/// GET /notes/:id
#[utoipa::path(get, path = "/notes/{id}", tag = "Notes",
    params(("id" = i64, Path, description = "Note id")),
    responses((status = 200, body = Note), (status = 403), (status = 404)))]
pub async fn get_note(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Note>, ApiError> {
    Ok(Json(owned_note(&state, owner_id, id).await?))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateNoteBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Update a note, clear its mentions and links, then re-tag it.
///
/// PUT /notes/:id
#[utoipa::path(put, path = "/notes/{id}", tag = "Notes",
    params(("id" = i64, Path, description = "Note id")),
    request_body = UpdateNoteBody,
    responses((status = 200, description = "Note updated; see `tagging` for tagger status")))]
pub async fn update_note(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<UpdateNoteBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.title.is_none() && body.content.is_none() {
        return Err(ApiError::BadRequest(
            "No fields provided for update. Send at least title or content.".to_string(),
        ));
    }
    owned_note(&state, owner_id, id).await?;

    let note = state
        .db
        .notes
        .update(
            id,
            UpdateNoteRequest {
                title: body.title,
                content: body.content,
            },
        )
        .await?;

    let tagging = run_tagging(&state, &note).await;
    Ok(Json(json!({
        "success": true,
        "note": note,
        "tagging": tagging,
    })))
}

/// DELETE /notes/:id
#[utoipa::path(delete, path = "/notes/{id}", tag = "Notes",
    params(("id" = i64, Path, description = "Note id")),
    responses((status = 200, description = "Deleted"), (status = 403), (status = 404)))]
pub async fn delete_note(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    owned_note(&state, owner_id, id).await?;
    if !state.db.notes.delete(id).await? {
        return Err(ApiError::NotFound("Note not found".to_string()));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Note deleted successfully",
    })))
}

/// Mentions in a note, in text order.
///
/// GET /notes/:id/mentions
#[utoipa::path(get, path = "/notes/{id}/mentions", tag = "Notes",
    params(("id" = i64, Path, description = "Note id")),
    responses((status = 200, body = Vec<MentionDetail>)))]
pub async fn list_note_mentions(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Vec<MentionDetail>>, ApiError> {
    let note = owned_note(&state, owner_id, id).await?;
    Ok(Json(state.db.mentions.list_for_note(note.id).await?))
}

/// Correction history for a note, newest first.
///
/// GET /notes/:id/corrections
#[utoipa::path(get, path = "/notes/{id}/corrections", tag = "Notes",
    params(("id" = i64, Path, description = "Note id")),
    responses((status = 200, body = Vec<CorrectionLogEntry>)))]
pub async fn list_note_corrections(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Vec<CorrectionLogEntry>>, ApiError> {
    let note = owned_note(&state, owner_id, id).await?;
    Ok(Json(state.db.corrections.list_for_note(note.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagging_report_shapes() {
        let failed = serde_json::to_value(TaggingReport::Failed {
            error: "Tagger error: connection refused".to_string(),
        })
        .unwrap();
        assert_eq!(
            failed,
            json!({"status": "failed", "error": "Tagger error: connection refused"})
        );

        let disabled = serde_json::to_value(TaggingReport::Disabled).unwrap();
        assert_eq!(disabled, json!({"status": "disabled"}));

        let completed = serde_json::to_value(TaggingReport::Completed {
            proposals: 3,
            nodes_created: 2,
            mentions_created: 3,
            links_created: 2,
            proposals_skipped: 0,
        })
        .unwrap();
        assert_eq!(completed["status"], "completed");
        assert_eq!(completed["links_created"], 2);
    }
}
