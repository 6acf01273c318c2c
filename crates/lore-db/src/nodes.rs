//! Node repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;

use lore_core::{
    defaults, normalize_name, CreateNodeRequest, Error, Node, NodeFlags, NodeRepository,
    NodeType, PlayerCharacterDetail, Result, TagChange,
};

pub(crate) const NODE_COLUMNS: &str = "id, owner_id, name, node_type, sub_type, \
     is_player_character, is_party_member, tags, created_at, updated_at";

/// `NODE_COLUMNS` qualified for queries that join other tables.
const PC_NODE_COLUMNS: &str = "node.id, node.owner_id, node.name, node.node_type, \
     node.sub_type, node.is_player_character, node.is_party_member, node.tags, \
     node.created_at, node.updated_at";

/// Decode a stored type label.
pub(crate) fn stored_node_type(label: &str) -> Result<NodeType> {
    label
        .parse()
        .map_err(|e| Error::Internal(format!("Corrupt node_type column: {}", e)))
}

pub(crate) fn node_from_row(row: &PgRow) -> Result<Node> {
    let label: String = row.get("node_type");
    Ok(Node {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        node_type: stored_node_type(&label)?,
        sub_type: row.get("sub_type"),
        is_player_character: row.get("is_player_character"),
        is_party_member: row.get("is_party_member"),
        tags: row.get("tags"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Reject nodes that belong to someone else.
pub(crate) fn ensure_owner(node: Node, owner_id: i64) -> Result<Node> {
    if node.owner_id != owner_id {
        return Err(Error::Forbidden(format!(
            "Node {} belongs to another user",
            node.id
        )));
    }
    Ok(node)
}

/// Advisory-lock key for one identity; equal identities give equal keys.
fn identity_lock_key(owner_id: i64, name: &str, node_type: NodeType) -> String {
    format!("node:{}:{}:{}", owner_id, normalize_name(name), node_type.as_str())
}

fn normalize_tag(tag: &str) -> Result<String> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(Error::InvalidInput("Tag must not be empty".to_string()));
    }
    Ok(tag.to_string())
}

/// PostgreSQL implementation of NodeRepository.
#[derive(Clone)]
pub struct PgNodeRepository {
    pool: Pool<Postgres>,
}

impl PgNodeRepository {
    /// Create a new PgNodeRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn change_tags(
        &self,
        owner_id: i64,
        id: i64,
        tag: &str,
        add: bool,
    ) -> Result<TagChange> {
        let tag = normalize_tag(tag)?;
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let node = self
            .lock_tx(&mut tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Node {}", id)))?;
        let node = ensure_owner(node, owner_id)?;

        let mut tags = node.tags.clone();
        let mut flags = node.flags();
        let tags_changed = if add {
            if tags.contains(&tag) {
                false
            } else {
                tags.push(tag.clone());
                true
            }
        } else {
            let before = tags.len();
            tags.retain(|t| t != &tag);
            match tag.as_str() {
                defaults::TAG_PLAYER_CHARACTER => flags.is_player_character = false,
                defaults::TAG_PARTY_MEMBER => flags.is_party_member = false,
                _ => {}
            }
            tags.len() != before || flags != node.flags()
        };

        if tags_changed {
            sqlx::query(
                "UPDATE node
                 SET tags = $2, is_player_character = $3, is_party_member = $4, updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(id)
            .bind(&tags)
            .bind(flags.is_player_character)
            .bind(flags.is_party_member)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        let op = if add { "add_tag" } else { "remove_tag" };
        debug!(
            subsystem = "db",
            component = "nodes",
            op,
            node_id = id,
            tags_changed,
            "Node tags updated"
        );

        Ok(TagChange {
            tags_changed,
            current_tags: tags,
            flags,
        })
    }
}

#[async_trait]
impl NodeRepository for PgNodeRepository {
    async fn create(&self, req: CreateNodeRequest) -> Result<Node> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let node = self.create_tx(&mut tx, &req).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(node)
    }

    async fn get(&self, owner_id: i64, id: i64) -> Result<Option<Node>> {
        let row = sqlx::query(&format!("SELECT {} FROM node WHERE id = $1", NODE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(Some(ensure_owner(node_from_row(&row)?, owner_id)?)),
            None => Ok(None),
        }
    }

    async fn find_by_name(&self, owner_id: i64, name: &str) -> Result<Option<Node>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM node WHERE owner_id = $1 AND name_key = $2 ORDER BY id LIMIT 1",
            NODE_COLUMNS
        ))
        .bind(owner_id)
        .bind(normalize_name(name))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(node_from_row).transpose()
    }

    async fn list_by_type(&self, owner_id: i64, node_type: NodeType) -> Result<Vec<Node>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM node WHERE owner_id = $1 AND node_type = $2 ORDER BY name, id",
            NODE_COLUMNS
        ))
        .bind(owner_id)
        .bind(node_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(node_from_row).collect()
    }

    async fn list_player_characters_detailed(
        &self,
        owner_id: i64,
    ) -> Result<Vec<PlayerCharacterDetail>> {
        let rows = sqlx::query(&format!(
            "WITH latest_note AS (
                 SELECT DISTINCT ON (m.node_id) m.node_id AS pc_id, n.id AS note_id
                 FROM note_mention m
                 JOIN note n ON n.id = m.note_id
                 JOIN node pc ON pc.id = m.node_id
                 WHERE pc.owner_id = $1 AND pc.is_player_character AND n.owner_id = $1
                 ORDER BY m.node_id, n.created_at DESC, n.id DESC
             ),
             last_location AS (
                 SELECT DISTINCT ON (ln.pc_id) ln.pc_id, loc.id AS location_id,
                        loc.name AS location_name
                 FROM latest_note ln
                 JOIN note_mention lm ON lm.note_id = ln.note_id
                 JOIN node loc ON loc.id = lm.node_id
                 WHERE loc.node_type = 'LOCATION'
                 ORDER BY ln.pc_id, lm.id
             )
             SELECT {}, ll.location_id, ll.location_name
             FROM node
             LEFT JOIN last_location ll ON ll.pc_id = node.id
             WHERE node.owner_id = $1 AND node.is_player_character
             ORDER BY node.name, node.id",
            PC_NODE_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(PlayerCharacterDetail {
                    node: node_from_row(row)?,
                    last_location_id: row.get("location_id"),
                    last_location_name: row.get("location_name"),
                })
            })
            .collect()
    }

    async fn add_tag(&self, owner_id: i64, id: i64, tag: &str) -> Result<TagChange> {
        self.change_tags(owner_id, id, tag, true).await
    }

    async fn remove_tag(&self, owner_id: i64, id: i64, tag: &str) -> Result<TagChange> {
        self.change_tags(owner_id, id, tag, false).await
    }
}

/// Transaction-aware variants used by the consolidation engine.
impl PgNodeRepository {
    /// Insert a node with an explicit identity; a duplicate is a conflict.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: &CreateNodeRequest,
    ) -> Result<Node> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Node name must not be empty".to_string()));
        }
        let flags = req.flags.resolve(req.node_type, NodeFlags::default());

        let row = sqlx::query(&format!(
            "INSERT INTO node (owner_id, name, name_key, node_type, sub_type,
                               is_player_character, is_party_member)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            NODE_COLUMNS
        ))
        .bind(req.owner_id)
        .bind(name)
        .bind(normalize_name(name))
        .bind(req.node_type.as_str())
        .bind(&req.sub_type)
        .bind(flags.is_player_character)
        .bind(flags.is_party_member)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            Error::from_db(
                e,
                format!("A {} node named '{}' already exists", req.node_type, name),
            )
        })?;

        node_from_row(&row)
    }

    /// Fetch a node by id without locking it.
    pub async fn fetch_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<Option<Node>> {
        let row = sqlx::query(&format!("SELECT {} FROM node WHERE id = $1", NODE_COLUMNS))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(node_from_row).transpose()
    }

    /// Fetch a node by id and hold a row lock until the transaction ends.
    pub async fn lock_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<Option<Node>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM node WHERE id = $1 FOR UPDATE",
            NODE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(node_from_row).transpose()
    }

    /// Serialize every decision about one identity until the transaction
    /// ends, whether or not a node with that identity exists yet.
    pub async fn lock_identity_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: i64,
        name: &str,
        node_type: NodeType,
    ) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(identity_lock_key(owner_id, name, node_type))
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Lock the node with this identity, if it exists.
    pub async fn lock_by_identity_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: i64,
        name: &str,
        node_type: NodeType,
    ) -> Result<Option<Node>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM node
             WHERE owner_id = $1 AND name_key = $2 AND node_type = $3
             FOR UPDATE",
            NODE_COLUMNS
        ))
        .bind(owner_id)
        .bind(normalize_name(name))
        .bind(node_type.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(node_from_row).transpose()
    }

    /// Find the node with this identity or create it, returning it locked.
    ///
    /// The boolean is true when the node was created by this call. A
    /// concurrent creator of the same identity makes the insert wait for
    /// that transaction, after which the existing row is returned.
    pub async fn find_or_create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: i64,
        name: &str,
        node_type: NodeType,
    ) -> Result<(Node, bool)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Entity name must not be empty".to_string()));
        }
        self.lock_identity_tx(tx, owner_id, name, node_type).await?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO node (owner_id, name, name_key, node_type)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (owner_id, name_key, node_type) DO NOTHING
             RETURNING {}",
            NODE_COLUMNS
        ))
        .bind(owner_id)
        .bind(name)
        .bind(normalize_name(name))
        .bind(node_type.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = inserted {
            return Ok((node_from_row(&row)?, true));
        }

        let node = self
            .lock_by_identity_tx(tx, owner_id, name, node_type)
            .await?
            .ok_or_else(|| {
                Error::Internal(format!(
                    "Node '{}' ({}) vanished between insert and lookup",
                    name, node_type
                ))
            })?;
        Ok((node, false))
    }

    /// Lock every node sharing this name but not this type.
    pub async fn lock_other_types_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: i64,
        name: &str,
        exclude: NodeType,
    ) -> Result<Vec<Node>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM node
             WHERE owner_id = $1 AND name_key = $2 AND node_type <> $3
             ORDER BY id
             FOR UPDATE",
            NODE_COLUMNS
        ))
        .bind(owner_id)
        .bind(normalize_name(name))
        .bind(exclude.as_str())
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(node_from_row).collect()
    }

    /// Change a node's type and flags in place.
    pub async fn update_type_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        node_type: NodeType,
        flags: NodeFlags,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE node
             SET node_type = $2, is_player_character = $3, is_party_member = $4,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(node_type.as_str())
        .bind(flags.is_player_character)
        .bind(flags.is_party_member)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            Error::from_db(
                e,
                format!("Node {} collides with an existing {} node", id, node_type),
            )
        })?;
        Ok(())
    }

    /// Store flags; skips the write when nothing changes.
    pub async fn set_flags_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        node: &Node,
        flags: NodeFlags,
    ) -> Result<()> {
        if node.flags() == flags {
            return Ok(());
        }
        sqlx::query(
            "UPDATE node
             SET is_player_character = $2, is_party_member = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(node.id)
        .bind(flags.is_player_character)
        .bind(flags.is_party_member)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn delete_tx(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM node WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(owner_id: i64) -> Node {
        Node {
            id: 5,
            owner_id,
            name: "Aria".to_string(),
            node_type: NodeType::Person,
            sub_type: None,
            is_player_character: false,
            is_party_member: false,
            tags: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_ensure_owner() {
        assert!(ensure_owner(node(1), 1).is_ok());
        assert!(matches!(ensure_owner(node(1), 2), Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_identity_lock_key_follows_identity() {
        assert_eq!(
            identity_lock_key(7, "  Aria ", NodeType::Person),
            identity_lock_key(7, "ARIA", NodeType::Person)
        );
        assert_ne!(
            identity_lock_key(7, "Aria", NodeType::Person),
            identity_lock_key(7, "Aria", NodeType::Monster)
        );
        assert_ne!(
            identity_lock_key(7, "Aria", NodeType::Person),
            identity_lock_key(8, "Aria", NodeType::Person)
        );
    }

    #[test]
    fn test_stored_node_type_rejects_garbage() {
        assert_eq!(stored_node_type("SPELL").unwrap(), NodeType::Spell);
        assert!(matches!(stored_node_type("???"), Err(Error::Internal(_))));
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  ally ").unwrap(), "ally");
        assert!(normalize_tag("   ").is_err());
    }
}
