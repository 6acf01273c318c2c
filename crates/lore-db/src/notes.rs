//! Note repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;

use lore_core::{CreateNoteRequest, Error, Note, NoteRepository, Result, UpdateNoteRequest};

const NOTE_COLUMNS: &str = "id, owner_id, title, content, created_at, updated_at";

fn note_from_row(row: &PgRow) -> Note {
    Note {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Check that `owner_id` owns the note.
///
/// A missing note is `NotFound`; someone else's note is `Forbidden`.
pub fn ensure_note_owner(note: Option<Note>, note_id: i64, owner_id: i64) -> Result<Note> {
    let note = note.ok_or_else(|| Error::NotFound(format!("Note {}", note_id)))?;
    if note.owner_id != owner_id {
        return Err(Error::Forbidden(format!(
            "Note {} belongs to another user",
            note_id
        )));
    }
    Ok(note)
}

/// PostgreSQL implementation of NoteRepository.
#[derive(Clone)]
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    /// Create a new PgNoteRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn insert(&self, req: CreateNoteRequest) -> Result<Note> {
        let row = sqlx::query(&format!(
            "INSERT INTO note (owner_id, title, content) VALUES ($1, $2, $3) RETURNING {}",
            NOTE_COLUMNS
        ))
        .bind(req.owner_id)
        .bind(&req.title)
        .bind(&req.content)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(note_from_row(&row))
    }

    async fn fetch(&self, id: i64) -> Result<Option<Note>> {
        let row = sqlx::query(&format!("SELECT {} FROM note WHERE id = $1", NOTE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(note_from_row))
    }

    async fn list(&self, owner_id: i64) -> Result<Vec<Note>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM note WHERE owner_id = $1 ORDER BY updated_at DESC, id DESC",
            NOTE_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn update(&self, id: i64, req: UpdateNoteRequest) -> Result<Note> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "UPDATE note
             SET title = COALESCE($2, title), content = COALESCE($3, content), updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            NOTE_COLUMNS
        ))
        .bind(id)
        .bind(&req.title)
        .bind(&req.content)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("Note {}", id)))?;

        // Offsets are meaningless once the text changes.
        let mentions = sqlx::query("DELETE FROM note_mention WHERE note_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let links = sqlx::query("DELETE FROM node_link WHERE note_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "notes",
            op = "update",
            note_id = id,
            mentions_cleared = mentions.rows_affected(),
            links_cleared = links.rows_affected(),
            "Note updated, derived mentions cleared"
        );

        Ok(note_from_row(&row))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM note WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Transaction-aware variants used by the consolidation engine.
impl PgNoteRepository {
    pub async fn fetch_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<Option<Note>> {
        let row = sqlx::query(&format!("SELECT {} FROM note WHERE id = $1", NOTE_COLUMNS))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(note_from_row))
    }

    /// The note a mention belongs to, read in one round trip.
    pub async fn fetch_for_mention_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mention_id: i64,
    ) -> Result<Option<Note>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM note
             WHERE id = (SELECT note_id FROM note_mention WHERE id = $1)",
            NOTE_COLUMNS
        ))
        .bind(mention_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(note_from_row))
    }

    /// Owner's notes whose text-search vector matches `term`.
    ///
    /// This is a coarse pre-filter; callers confirm exact matches. A term
    /// with no searchable lexemes matches every note of the owner.
    pub async fn search_candidates_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: i64,
        term: &str,
    ) -> Result<Vec<Note>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM note
             WHERE owner_id = $1
               AND (numnode(websearch_to_tsquery('simple', $2)) = 0
                    OR content_tsv @@ websearch_to_tsquery('simple', $2))
             ORDER BY id",
            NOTE_COLUMNS
        ))
        .bind(owner_id)
        .bind(term)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(note_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn note(owner_id: i64) -> Note {
        Note {
            id: 42,
            owner_id,
            title: None,
            content: "The torch flickers.".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_note_is_not_found() {
        assert!(matches!(
            ensure_note_owner(None, 42, 1),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_foreign_note_is_forbidden() {
        assert!(matches!(
            ensure_note_owner(Some(note(2)), 42, 1),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_own_note_passes() {
        let n = ensure_note_owner(Some(note(1)), 42, 1).unwrap();
        assert_eq!(n.id, 42);
    }
}
