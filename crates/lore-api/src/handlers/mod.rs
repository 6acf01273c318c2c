//! HTTP handlers for lore-api.

pub mod entities;
pub mod health;
pub mod mentions;
pub mod nodes;
pub mod notes;

use lore_core::{NodeType, PersonFlags};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::ApiError;

/// Optional person flags as sent by the front end.
#[derive(Debug, Default, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlagFields {
    pub is_player_character: Option<bool>,
    pub is_party_member: Option<bool>,
}

impl From<FlagFields> for PersonFlags {
    fn from(f: FlagFields) -> Self {
        PersonFlags::new(f.is_player_character, f.is_party_member)
    }
}

pub(crate) fn parse_node_type(raw: &str) -> Result<NodeType, ApiError> {
    Ok(NodeType::parse(raw)?)
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}
