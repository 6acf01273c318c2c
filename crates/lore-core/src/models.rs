//! Core data models for lorekeep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// ENUMS
// =============================================================================

/// Classification of a canonical entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    Person,
    Location,
    Item,
    Spell,
    Monster,
    Other,
}

impl NodeType {
    /// Storage and wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Location => "LOCATION",
            Self::Item => "ITEM",
            Self::Spell => "SPELL",
            Self::Monster => "MONSTER",
            Self::Other => "OTHER",
        }
    }

    /// Parse a label, mapping failure to [`Error::InvalidInput`].
    pub fn parse(s: &str) -> Result<Self> {
        s.parse().map_err(Error::InvalidInput)
    }

    pub fn is_person(&self) -> bool {
        matches!(self, Self::Person)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PERSON" => Ok(Self::Person),
            "LOCATION" => Ok(Self::Location),
            "ITEM" => Ok(Self::Item),
            "SPELL" => Ok(Self::Spell),
            "MONSTER" => Ok(Self::Monster),
            "OTHER" => Ok(Self::Other),
            _ => Err(format!("Unknown node type: {}", s)),
        }
    }
}

/// Provenance of a mention.
///
/// Anything that is not one of the user-driven labels is kept verbatim as a
/// machine label (whatever the tagger reported).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MentionSource {
    UserAdded,
    UserModified,
    UserConfirmed,
    RetagEverywhere,
    Machine(String),
}

impl MentionSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::UserAdded => "USER_ADDED",
            Self::UserModified => "USER_MODIFIED",
            Self::UserConfirmed => "USER_CONFIRMED",
            Self::RetagEverywhere => "USER_RETAGGED_EVERYWHERE",
            Self::Machine(label) => label,
        }
    }

    /// True for sources that record a human decision.
    pub fn is_user(&self) -> bool {
        !matches!(self, Self::Machine(_))
    }
}

impl From<String> for MentionSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "USER_ADDED" => Self::UserAdded,
            "USER_MODIFIED" => Self::UserModified,
            "USER_CONFIRMED" => Self::UserConfirmed,
            "USER_RETAGGED_EVERYWHERE" => Self::RetagEverywhere,
            _ => Self::Machine(s),
        }
    }
}

impl From<MentionSource> for String {
    fn from(s: MentionSource) -> Self {
        match s {
            MentionSource::Machine(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for MentionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of manual action recorded in the correction log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionAction {
    AddTag,
    Modify,
    DeleteTag,
    ConfirmTag,
}

impl CorrectionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddTag => "ADD_TAG",
            Self::Modify => "MODIFY",
            Self::DeleteTag => "DELETE_TAG",
            Self::ConfirmTag => "CONFIRM_TAG",
        }
    }
}

impl std::fmt::Display for CorrectionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CorrectionAction {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ADD_TAG" => Ok(Self::AddTag),
            "MODIFY" => Ok(Self::Modify),
            "DELETE_TAG" => Ok(Self::DeleteTag),
            "CONFIRM_TAG" => Ok(Self::ConfirmTag),
            _ => Err(format!("Unknown correction action: {}", s)),
        }
    }
}

// =============================================================================
// IDENTITY & FLAGS
// =============================================================================

/// Normalise an entity name into its identity key.
///
/// Identity is `(owner, name_key, type)`; every lookup and insert goes
/// through this function so the store's collation never matters.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Stored person flags of a node.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
pub struct NodeFlags {
    pub is_player_character: bool,
    pub is_party_member: bool,
}

/// Caller-supplied person flags; `None` means "not specified".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonFlags {
    pub is_player_character: Option<bool>,
    pub is_party_member: Option<bool>,
}

impl PersonFlags {
    pub fn new(is_player_character: Option<bool>, is_party_member: Option<bool>) -> Self {
        Self {
            is_player_character,
            is_party_member,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_player_character.is_none() && self.is_party_member.is_none()
    }

    /// Resolve the flags a node of `node_type` ends up with.
    ///
    /// PERSON nodes take each explicit value and keep the current one
    /// otherwise. Every other type has both flags cleared.
    pub fn resolve(&self, node_type: NodeType, current: NodeFlags) -> NodeFlags {
        if !node_type.is_person() {
            return NodeFlags::default();
        }
        NodeFlags {
            is_player_character: self
                .is_player_character
                .unwrap_or(current.is_player_character),
            is_party_member: self.is_party_member.unwrap_or(current.is_party_member),
        }
    }
}

// =============================================================================
// SPANS
// =============================================================================

/// Half-open character span `[start, end)` inside a note's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: i32,
    pub end: i32,
}

impl TextSpan {
    /// Build a span, rejecting negative or empty ranges.
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if start < 0 {
            return Err(Error::InvalidInput(format!(
                "Span start must be non-negative, got {}",
                start
            )));
        }
        if end <= start {
            return Err(Error::InvalidInput(format!(
                "Span end ({}) must be greater than start ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Check the span fits inside a text of `text_len` characters.
    pub fn check_within(&self, text_len: usize) -> Result<()> {
        if self.end as usize > text_len {
            return Err(Error::InvalidInput(format!(
                "Span [{}, {}) exceeds note length {}",
                self.start, self.end, text_len
            )));
        }
        Ok(())
    }

    /// Extract the span's text, or `None` if it falls outside `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.start < 0 || self.end <= self.start {
            return None;
        }
        let start = self.start as usize;
        let end = self.end as usize;
        let mut indices = text.char_indices().map(|(i, _)| i).chain(Some(text.len()));
        let byte_start = indices.nth(start)?;
        let byte_end = if end == start {
            byte_start
        } else {
            indices.nth(end - start - 1)?
        };
        text.get(byte_start..byte_end)
    }

    pub fn len(&self) -> i32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Character length of a note's text, the unit all spans are measured in.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

// =============================================================================
// ENTITIES
// =============================================================================

/// A free-text note owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Note {
    pub id: i64,
    pub owner_id: i64,
    pub title: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A canonical entity.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Node {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub sub_type: Option<String>,
    pub is_player_character: bool,
    pub is_party_member: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn flags(&self) -> NodeFlags {
        NodeFlags {
            is_player_character: self.is_player_character,
            is_party_member: self.is_party_member,
        }
    }
}

/// A player character with where it was last seen.
///
/// The location is the first LOCATION mention, in mention order, of the
/// newest note that mentions the character.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PlayerCharacterDetail {
    #[serde(flatten)]
    pub node: Node,
    pub last_location_id: Option<i64>,
    pub last_location_name: Option<String>,
}

/// A span of note text pointing at a node.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Mention {
    pub id: i64,
    pub node_id: i64,
    pub note_id: i64,
    pub start_pos: i32,
    pub end_pos: i32,
    pub mention_type: NodeType,
    #[schema(value_type = String)]
    pub source: MentionSource,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

impl Mention {
    pub fn span(&self) -> TextSpan {
        TextSpan {
            start: self.start_pos,
            end: self.end_pos,
        }
    }
}

/// A mention together with the name of the node it points at.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MentionDetail {
    #[serde(flatten)]
    pub mention: Mention,
    pub node_name: String,
}

/// A mention with the text it covers, for node pages.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MentionWithSnippet {
    #[serde(flatten)]
    pub mention: Mention,
    pub snippet: String,
}

/// Directed relationship between two nodes asserted by a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Link {
    pub id: i64,
    pub source_node_id: i64,
    pub target_node_id: i64,
    pub note_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit record of a manual mention edit.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CorrectionLogEntry {
    pub id: i64,
    pub note_id: i64,
    pub mention_id: Option<i64>,
    pub original_text_segment: Option<String>,
    pub original_mention_type: Option<String>,
    pub original_source: Option<String>,
    pub original_confidence: Option<f32>,
    pub corrected_text_segment: Option<String>,
    pub corrected_mention_type: Option<String>,
    pub action: CorrectionAction,
    pub actor_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Values for a new correction log row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCorrection {
    pub note_id: i64,
    pub mention_id: Option<i64>,
    pub original_text_segment: Option<String>,
    pub original_mention_type: Option<String>,
    pub original_source: Option<String>,
    pub original_confidence: Option<f32>,
    pub corrected_text_segment: Option<String>,
    pub corrected_mention_type: Option<String>,
    pub action: CorrectionAction,
    pub actor_id: i64,
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Direct node creation (no find-or-create; a duplicate identity conflicts).
#[derive(Debug, Clone)]
pub struct CreateNodeRequest {
    pub owner_id: i64,
    pub name: String,
    pub node_type: NodeType,
    pub sub_type: Option<String>,
    pub flags: PersonFlags,
}

/// Values for a new mention row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMention {
    pub node_id: i64,
    pub note_id: i64,
    pub span: TextSpan,
    pub mention_type: NodeType,
    pub source: MentionSource,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct ChangeNodeTypeRequest {
    pub owner_id: i64,
    pub node_id: i64,
    pub new_type: NodeType,
    pub flags: PersonFlags,
}

#[derive(Debug, Clone)]
pub struct RetagRequest {
    pub owner_id: i64,
    pub name: String,
    pub node_type: NodeType,
    pub flags: PersonFlags,
}

#[derive(Debug, Clone)]
pub struct AddMentionRequest {
    pub owner_id: i64,
    pub note_id: i64,
    pub name_segment: String,
    pub node_type: NodeType,
    pub span: TextSpan,
    pub flags: PersonFlags,
}

#[derive(Debug, Clone)]
pub struct CorrectMentionRequest {
    pub owner_id: i64,
    pub mention_id: i64,
    pub note_id: i64,
    pub new_name_segment: Option<String>,
    pub new_type: NodeType,
    /// Caller's copy of the mention text, used when the stored span no
    /// longer fits the note.
    pub original_text_segment: Option<String>,
    pub span: Option<TextSpan>,
}

#[derive(Debug, Clone)]
pub struct ConfirmMentionRequest {
    pub owner_id: i64,
    pub mention_id: i64,
}

#[derive(Debug, Clone)]
pub struct DeleteMentionRequest {
    pub owner_id: i64,
    pub mention_id: i64,
    /// Logged when the stored span no longer fits the note.
    pub original_text_segment: Option<String>,
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of a type change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNodeTypeOutcome {
    /// The node kept its identity and id.
    Updated { node_id: i64 },
    /// The node was absorbed into an existing node of the new type.
    Merged {
        target_node_id: i64,
        absorbed_node_id: i64,
        mentions_moved: u64,
        links_repointed: u64,
        links_dropped: u64,
    },
}

impl ChangeNodeTypeOutcome {
    /// Id callers should treat as canonical from now on.
    pub fn canonical_node_id(&self) -> i64 {
        match self {
            Self::Updated { node_id } => *node_id,
            Self::Merged { target_node_id, .. } => *target_node_id,
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }
}

/// Result of a retag-everywhere run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RetagOutcome {
    pub target_node_id: i64,
    pub target_node_is_new: bool,
    pub mentions_reassigned: u64,
    pub mentions_discarded: u64,
    pub new_mentions_created: u64,
    pub obsolete_node_ids: Vec<i64>,
}

/// Result of adding a free-form tag to, or removing one from, a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TagChange {
    pub tags_changed: bool,
    pub current_tags: Vec<String>,
    pub flags: NodeFlags,
}

// =============================================================================
// TAGGER
// =============================================================================

/// Payload sent to the tagger collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRequest {
    pub note_id: i64,
    pub text: String,
    pub user_id: i64,
}

/// A mention proposed by the tagger collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProposedMention {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub start: i32,
    pub end: i32,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Result of persisting tagger proposals for one note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct IngestOutcome {
    pub nodes_created: u64,
    pub mentions_created: u64,
    pub links_created: u64,
    pub proposals_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_roundtrip_labels() {
        for t in [
            NodeType::Person,
            NodeType::Location,
            NodeType::Item,
            NodeType::Spell,
            NodeType::Monster,
            NodeType::Other,
        ] {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
        }
    }

    #[test]
    fn test_node_type_parse_is_case_insensitive() {
        assert_eq!("person".parse::<NodeType>().unwrap(), NodeType::Person);
        assert_eq!(" Location ".parse::<NodeType>().unwrap(), NodeType::Location);
    }

    #[test]
    fn test_node_type_parse_unknown_is_invalid_input() {
        let err = NodeType::parse("DRAGONISH").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_node_type_serializes_uppercase() {
        let json = serde_json::to_string(&NodeType::Monster).unwrap();
        assert_eq!(json, "\"MONSTER\"");
    }

    #[test]
    fn test_mention_source_known_labels() {
        assert_eq!(
            MentionSource::from("USER_ADDED".to_string()),
            MentionSource::UserAdded
        );
        assert_eq!(
            MentionSource::from("USER_RETAGGED_EVERYWHERE".to_string()),
            MentionSource::RetagEverywhere
        );
        assert_eq!(MentionSource::UserConfirmed.as_str(), "USER_CONFIRMED");
    }

    #[test]
    fn test_mention_source_keeps_machine_label() {
        let src = MentionSource::from("PHRASEMATCHER_EXACT".to_string());
        assert_eq!(src, MentionSource::Machine("PHRASEMATCHER_EXACT".to_string()));
        assert!(!src.is_user());
        assert_eq!(String::from(src), "PHRASEMATCHER_EXACT");
    }

    #[test]
    fn test_mention_source_serde_as_string() {
        let json = serde_json::to_string(&MentionSource::UserModified).unwrap();
        assert_eq!(json, "\"USER_MODIFIED\"");
        let back: MentionSource = serde_json::from_str("\"SPACY_NER\"").unwrap();
        assert_eq!(back, MentionSource::Machine("SPACY_NER".to_string()));
    }

    #[test]
    fn test_correction_action_labels() {
        assert_eq!(CorrectionAction::AddTag.as_str(), "ADD_TAG");
        assert_eq!(
            "CONFIRM_TAG".parse::<CorrectionAction>().unwrap(),
            CorrectionAction::ConfirmTag
        );
        assert!("UNDO".parse::<CorrectionAction>().is_err());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Gandalf The Grey "), "gandalf the grey");
        assert_eq!(normalize_name("ARIA"), normalize_name("aria"));
    }

    #[test]
    fn test_flags_explicit_value_wins_for_person() {
        let current = NodeFlags {
            is_player_character: true,
            is_party_member: false,
        };
        let resolved = PersonFlags::new(None, Some(true)).resolve(NodeType::Person, current);
        assert!(resolved.is_player_character);
        assert!(resolved.is_party_member);

        let resolved = PersonFlags::new(Some(false), None).resolve(NodeType::Person, current);
        assert!(!resolved.is_player_character);
        assert!(!resolved.is_party_member);
    }

    #[test]
    fn test_flags_cleared_for_non_person() {
        let current = NodeFlags {
            is_player_character: true,
            is_party_member: true,
        };
        let resolved = PersonFlags::new(Some(true), Some(true)).resolve(NodeType::Monster, current);
        assert_eq!(resolved, NodeFlags::default());
    }

    #[test]
    fn test_span_validation() {
        assert!(TextSpan::new(10, 15).is_ok());
        assert!(matches!(TextSpan::new(5, 5), Err(Error::InvalidInput(_))));
        assert!(matches!(TextSpan::new(7, 3), Err(Error::InvalidInput(_))));
        assert!(matches!(TextSpan::new(-1, 3), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_span_within_note() {
        let span = TextSpan::new(0, 5).unwrap();
        assert!(span.check_within(5).is_ok());
        assert!(span.check_within(4).is_err());
    }

    #[test]
    fn test_span_slice_uses_character_offsets() {
        let text = "Café de Aria";
        let span = TextSpan::new(8, 12).unwrap();
        assert_eq!(span.slice(text), Some("Aria"));
        let span = TextSpan::new(0, 4).unwrap();
        assert_eq!(span.slice(text), Some("Café"));
        let span = TextSpan::new(10, 20).unwrap();
        assert_eq!(span.slice(text), None);
    }

    #[test]
    fn test_change_outcome_canonical_id() {
        let updated = ChangeNodeTypeOutcome::Updated { node_id: 9 };
        assert_eq!(updated.canonical_node_id(), 9);
        assert!(!updated.is_merge());

        let merged = ChangeNodeTypeOutcome::Merged {
            target_node_id: 5,
            absorbed_node_id: 9,
            mentions_moved: 2,
            links_repointed: 1,
            links_dropped: 0,
        };
        assert_eq!(merged.canonical_node_id(), 5);
        assert!(merged.is_merge());
    }

    #[test]
    fn test_proposed_mention_optional_fields() {
        let p: ProposedMention =
            serde_json::from_str(r#"{"name":"torch","type":"ITEM","start":10,"end":15}"#).unwrap();
        assert_eq!(p.node_type, "ITEM");
        assert_eq!(p.confidence, None);
        assert_eq!(p.source, None);
    }
}
