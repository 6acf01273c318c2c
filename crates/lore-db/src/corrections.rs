//! Correction log repository implementation.
//!
//! The log is insert-only: there is no update or delete path.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};

use lore_core::{
    CorrectionAction, CorrectionLogEntry, CorrectionLogRepository, Error, NewCorrection, Result,
};

const CORRECTION_COLUMNS: &str = "id, note_id, mention_id, original_text_segment, \
     original_mention_type, original_source, original_confidence, corrected_text_segment, \
     corrected_mention_type, correction_action, actor_id, created_at";

fn correction_from_row(row: &PgRow) -> Result<CorrectionLogEntry> {
    let action: String = row.get("correction_action");
    Ok(CorrectionLogEntry {
        id: row.get("id"),
        note_id: row.get("note_id"),
        mention_id: row.get("mention_id"),
        original_text_segment: row.get("original_text_segment"),
        original_mention_type: row.get("original_mention_type"),
        original_source: row.get("original_source"),
        original_confidence: row.get("original_confidence"),
        corrected_text_segment: row.get("corrected_text_segment"),
        corrected_mention_type: row.get("corrected_mention_type"),
        action: action
            .parse::<CorrectionAction>()
            .map_err(|e| Error::Internal(format!("Corrupt correction_action column: {}", e)))?,
        actor_id: row.get("actor_id"),
        created_at: row.get("created_at"),
    })
}

/// PostgreSQL implementation of CorrectionLogRepository.
#[derive(Clone)]
pub struct PgCorrectionLogRepository {
    pool: Pool<Postgres>,
}

impl PgCorrectionLogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Append an entry inside the caller's transaction.
    pub async fn append_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewCorrection,
    ) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO tagging_correction
                 (note_id, mention_id, original_text_segment, original_mention_type,
                  original_source, original_confidence, corrected_text_segment,
                  corrected_mention_type, correction_action, actor_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING id",
        )
        .bind(entry.note_id)
        .bind(entry.mention_id)
        .bind(&entry.original_text_segment)
        .bind(&entry.original_mention_type)
        .bind(&entry.original_source)
        .bind(entry.original_confidence)
        .bind(&entry.corrected_text_segment)
        .bind(&entry.corrected_mention_type)
        .bind(entry.action.as_str())
        .bind(entry.actor_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("id"))
    }
}

#[async_trait]
impl CorrectionLogRepository for PgCorrectionLogRepository {
    async fn list_for_note(&self, note_id: i64) -> Result<Vec<CorrectionLogEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tagging_correction
             WHERE note_id = $1
             ORDER BY created_at DESC, id DESC",
            CORRECTION_COLUMNS
        ))
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(correction_from_row).collect()
    }
}
