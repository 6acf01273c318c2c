//! Node link repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};

use lore_core::{Error, Link, LinkRepoint, LinkRepository, Result};

const LINK_COLUMNS: &str = "id, source_node_id, target_node_id, note_id, created_at";

fn link_from_row(row: &PgRow) -> Link {
    Link {
        id: row.get("id"),
        source_node_id: row.get("source_node_id"),
        target_node_id: row.get("target_node_id"),
        note_id: row.get("note_id"),
        created_at: row.get("created_at"),
    }
}

/// PostgreSQL implementation of LinkRepository.
#[derive(Clone)]
pub struct PgLinkRepository {
    pool: Pool<Postgres>,
}

impl PgLinkRepository {
    /// Create a new PgLinkRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn list_for_node(&self, node_id: i64) -> Result<Vec<Link>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM node_link
             WHERE source_node_id = $1 OR target_node_id = $1
             ORDER BY id",
            LINK_COLUMNS
        ))
        .bind(node_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(link_from_row).collect())
    }
}

/// Transaction-aware variants used by the consolidation engine.
impl PgLinkRepository {
    /// Lock every link with any of `node_ids` at either end.
    pub async fn lock_touching_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        node_ids: &[i64],
    ) -> Result<Vec<Link>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM node_link
             WHERE source_node_id = ANY($1) OR target_node_id = ANY($1)
             ORDER BY id
             FOR UPDATE",
            LINK_COLUMNS
        ))
        .bind(node_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(link_from_row).collect())
    }

    /// Insert a link unless the same edge already exists for the note.
    ///
    /// Returns true when a row was written.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        source_node_id: i64,
        target_node_id: i64,
        note_id: Option<i64>,
    ) -> Result<bool> {
        if source_node_id == target_node_id {
            return Err(Error::InvalidInput(format!(
                "Node {} cannot link to itself",
                source_node_id
            )));
        }
        let result = sqlx::query(
            "INSERT INTO node_link (source_node_id, target_node_id, note_id)
             VALUES ($1, $2, $3)
             ON CONFLICT (source_node_id, target_node_id, note_id) DO NOTHING",
        )
        .bind(source_node_id)
        .bind(target_node_id)
        .bind(note_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn repoint_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        repoint: &LinkRepoint,
    ) -> Result<()> {
        sqlx::query("UPDATE node_link SET source_node_id = $2, target_node_id = $3 WHERE id = $1")
            .bind(repoint.link_id)
            .bind(repoint.source_node_id)
            .bind(repoint.target_node_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn delete_many_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM node_link WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
