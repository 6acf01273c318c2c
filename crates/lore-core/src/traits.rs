//! Core traits for lorekeep abstractions.
//!
//! Storage backends and the tagger collaborator implement these so the
//! HTTP layer and tests can swap them.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// NOTE REPOSITORY TRAITS
// =============================================================================

/// Request for creating a new note.
#[derive(Debug, Clone)]
pub struct CreateNoteRequest {
    pub owner_id: i64,
    pub title: Option<String>,
    pub content: String,
}

/// Request for updating a note. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Repository for note CRUD operations.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note.
    async fn insert(&self, req: CreateNoteRequest) -> Result<Note>;

    /// Fetch a note regardless of owner; callers check ownership.
    async fn fetch(&self, id: i64) -> Result<Option<Note>>;

    /// List an owner's notes, most recently updated first.
    async fn list(&self, owner_id: i64) -> Result<Vec<Note>>;

    /// Update a note and clear its mentions and links in one transaction.
    async fn update(&self, id: i64, req: UpdateNoteRequest) -> Result<Note>;

    /// Delete a note with its mentions and links. Returns false if absent.
    async fn delete(&self, id: i64) -> Result<bool>;
}

// =============================================================================
// NODE REPOSITORY TRAITS
// =============================================================================

/// Repository for canonical entities.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Insert a node; an existing identity is a conflict.
    async fn create(&self, req: CreateNodeRequest) -> Result<Node>;

    /// Fetch one of the owner's nodes.
    async fn get(&self, owner_id: i64, id: i64) -> Result<Option<Node>>;

    /// First node of the owner with this name, any type.
    async fn find_by_name(&self, owner_id: i64, name: &str) -> Result<Option<Node>>;

    /// All of the owner's nodes of one type, ordered by name.
    async fn list_by_type(&self, owner_id: i64, node_type: NodeType) -> Result<Vec<Node>>;

    /// The owner's player characters with their last known location.
    async fn list_player_characters_detailed(
        &self,
        owner_id: i64,
    ) -> Result<Vec<PlayerCharacterDetail>>;

    /// Append a free-form tag if absent.
    async fn add_tag(&self, owner_id: i64, id: i64, tag: &str) -> Result<TagChange>;

    /// Remove a free-form tag, clearing the flag a reserved tag mirrors.
    async fn remove_tag(&self, owner_id: i64, id: i64, tag: &str) -> Result<TagChange>;
}

// =============================================================================
// MENTION / LINK / CORRECTION REPOSITORY TRAITS
// =============================================================================

/// Read access to mentions. Writes go through the consolidation engine.
#[async_trait]
pub trait MentionRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Mention>>;

    /// Mentions in a note with their node names, in text order.
    async fn list_for_note(&self, note_id: i64) -> Result<Vec<MentionDetail>>;

    /// Mentions of a node with the text each one covers.
    async fn list_for_node(&self, node_id: i64) -> Result<Vec<MentionWithSnippet>>;
}

/// Read access to node links.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Links with the node at either end.
    async fn list_for_node(&self, node_id: i64) -> Result<Vec<Link>>;
}

/// Read access to the correction log.
#[async_trait]
pub trait CorrectionLogRepository: Send + Sync {
    /// Entries for a note, newest first.
    async fn list_for_note(&self, note_id: i64) -> Result<Vec<CorrectionLogEntry>>;
}

// =============================================================================
// TAGGER TRAITS
// =============================================================================

/// External collaborator that proposes mentions for raw note text.
#[async_trait]
pub trait Tagger: Send + Sync {
    /// Propose mentions for a note's text.
    async fn tag(&self, req: &TagRequest) -> Result<Vec<ProposedMention>>;

    /// Check if the tagger is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
