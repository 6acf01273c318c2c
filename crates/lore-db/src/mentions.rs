//! Mention repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};

use lore_core::{
    Error, Mention, MentionDetail, MentionRepository, MentionSource, MentionWithSnippet,
    NewMention, NodeType, Result, SpanKey, TextSpan,
};

use crate::nodes::stored_node_type;

pub(crate) const MENTION_COLUMNS: &str =
    "id, node_id, note_id, start_pos, end_pos, mention_type, source, confidence, created_at";

/// Same columns qualified with the `m` alias, for joins.
const MENTION_COLUMNS_M: &str = "m.id, m.node_id, m.note_id, m.start_pos, m.end_pos, \
     m.mention_type, m.source, m.confidence, m.created_at";

pub(crate) fn mention_from_row(row: &PgRow) -> Result<Mention> {
    let label: String = row.get("mention_type");
    let source: String = row.get("source");
    Ok(Mention {
        id: row.get("id"),
        node_id: row.get("node_id"),
        note_id: row.get("note_id"),
        start_pos: row.get("start_pos"),
        end_pos: row.get("end_pos"),
        mention_type: stored_node_type(&label)?,
        source: MentionSource::from(source),
        confidence: row.get("confidence"),
        created_at: row.get("created_at"),
    })
}

/// Text covered by a mention, or empty when the span no longer fits.
pub fn snippet(content: &str, mention: &Mention) -> String {
    mention
        .span()
        .slice(content)
        .map(str::to_string)
        .unwrap_or_default()
}

/// PostgreSQL implementation of MentionRepository.
#[derive(Clone)]
pub struct PgMentionRepository {
    pool: Pool<Postgres>,
}

impl PgMentionRepository {
    /// Create a new PgMentionRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MentionRepository for PgMentionRepository {
    async fn get(&self, id: i64) -> Result<Option<Mention>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM note_mention WHERE id = $1",
            MENTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(mention_from_row).transpose()
    }

    async fn list_for_note(&self, note_id: i64) -> Result<Vec<MentionDetail>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, n.name AS node_name
             FROM note_mention m
             JOIN node n ON n.id = m.node_id
             WHERE m.note_id = $1
             ORDER BY m.start_pos, m.end_pos, m.id",
            MENTION_COLUMNS_M
        ))
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(MentionDetail {
                    mention: mention_from_row(row)?,
                    node_name: row.get("node_name"),
                })
            })
            .collect()
    }

    async fn list_for_node(&self, node_id: i64) -> Result<Vec<MentionWithSnippet>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, t.content AS note_content
             FROM note_mention m
             JOIN note t ON t.id = m.note_id
             WHERE m.node_id = $1
             ORDER BY m.note_id DESC, m.start_pos",
            MENTION_COLUMNS_M
        ))
        .bind(node_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                let mention = mention_from_row(row)?;
                let content: String = row.get("note_content");
                Ok(MentionWithSnippet {
                    snippet: snippet(&content, &mention),
                    mention,
                })
            })
            .collect()
    }
}

/// Transaction-aware variants used by the consolidation engine.
impl PgMentionRepository {
    /// Fetch a mention and lock it until the transaction ends.
    pub async fn lock_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<Option<Mention>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM note_mention WHERE id = $1 FOR UPDATE",
            MENTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(mention_from_row).transpose()
    }

    /// Insert a mention unless the exact `(note, node, start, end)` exists.
    ///
    /// Returns `None` when the row already existed.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        new: &NewMention,
    ) -> Result<Option<Mention>> {
        let row = sqlx::query(&format!(
            "INSERT INTO note_mention
                 (node_id, note_id, start_pos, end_pos, mention_type, source, confidence)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (note_id, node_id, start_pos, end_pos) DO NOTHING
             RETURNING {}",
            MENTION_COLUMNS
        ))
        .bind(new.node_id)
        .bind(new.note_id)
        .bind(new.span.start)
        .bind(new.span.end)
        .bind(new.mention_type.as_str())
        .bind(new.source.as_str())
        .bind(new.confidence)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(mention_from_row).transpose()
    }

    /// The mention of `node_id` at exactly this span, if any.
    pub async fn find_at_span_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        note_id: i64,
        node_id: i64,
        span: TextSpan,
    ) -> Result<Option<Mention>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM note_mention
             WHERE note_id = $1 AND node_id = $2 AND start_pos = $3 AND end_pos = $4",
            MENTION_COLUMNS
        ))
        .bind(note_id)
        .bind(node_id)
        .bind(span.start)
        .bind(span.end)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(mention_from_row).transpose()
    }

    /// Lock and return every mention of the given nodes, in id order.
    pub async fn lock_for_nodes_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        node_ids: &[i64],
    ) -> Result<Vec<Mention>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM note_mention WHERE node_id = ANY($1) ORDER BY id FOR UPDATE",
            MENTION_COLUMNS
        ))
        .bind(node_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(mention_from_row).collect()
    }

    /// Spans already covered by a node.
    pub async fn span_keys_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        node_id: i64,
    ) -> Result<Vec<SpanKey>> {
        let rows = sqlx::query(
            "SELECT note_id, start_pos, end_pos FROM note_mention WHERE node_id = $1",
        )
        .bind(node_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|row| SpanKey {
                note_id: row.get("note_id"),
                start: row.get("start_pos"),
                end: row.get("end_pos"),
            })
            .collect())
    }

    /// Point mentions at another node and rewrite their type.
    pub async fn reassign_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
        node_id: i64,
        mention_type: NodeType,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE note_mention SET node_id = $2, mention_type = $3 WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(node_id)
        .bind(mention_type.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| Error::from_db(e, "Reassigned mention duplicates an existing span"))?;
        Ok(result.rows_affected())
    }

    pub async fn delete_many_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM note_mention WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    /// Rewrite a mention in place after a user correction.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        node_id: i64,
        mention_type: NodeType,
        span: TextSpan,
        source: &MentionSource,
        confidence: f32,
    ) -> Result<Mention> {
        let row = sqlx::query(&format!(
            "UPDATE note_mention
             SET node_id = $2, mention_type = $3, start_pos = $4, end_pos = $5,
                 source = $6, confidence = $7
             WHERE id = $1
             RETURNING {}",
            MENTION_COLUMNS
        ))
        .bind(id)
        .bind(node_id)
        .bind(mention_type.as_str())
        .bind(span.start)
        .bind(span.end)
        .bind(source.as_str())
        .bind(confidence)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| Error::from_db(e, format!("Mention {} duplicates an existing span", id)))?;

        mention_from_row(&row)
    }

    /// Change only provenance and confidence.
    pub async fn set_source_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        source: &MentionSource,
        confidence: f32,
    ) -> Result<Mention> {
        let row = sqlx::query(&format!(
            "UPDATE note_mention SET source = $2, confidence = $3 WHERE id = $1 RETURNING {}",
            MENTION_COLUMNS
        ))
        .bind(id)
        .bind(source.as_str())
        .bind(confidence)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        mention_from_row(&row)
    }

    /// Delete one mention. Returns false if it was already gone.
    pub async fn delete_tx(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM note_mention WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
