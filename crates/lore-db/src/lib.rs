//! # lore-db
//!
//! PostgreSQL database layer for lorekeep.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for notes, nodes, mentions, links and the
//!   correction log
//! - The [`ConsolidationEngine`], which runs every multi-step node and
//!   mention edit inside a single transaction
//!
//! ## Example
//!
//! ```rust,ignore
//! use lore_db::{Database, NodeType, RetagRequest, PersonFlags};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/lorekeep").await?;
//!
//!     let outcome = db.engine.retag_everywhere(RetagRequest {
//!         owner_id: 1,
//!         name: "Gandalf".to_string(),
//!         node_type: NodeType::Person,
//!         flags: PersonFlags::default(),
//!     }).await?;
//!
//!     println!("Gandalf is now node {}", outcome.target_node_id);
//!     Ok(())
//! }
//! ```
pub mod corrections;
pub mod engine;
pub mod links;
pub mod mentions;
pub mod nodes;
pub mod notes;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use lore_core::*;

// Re-export repository implementations
pub use corrections::PgCorrectionLogRepository;
pub use engine::{AddMentionOutcome, ConsolidationEngine};
pub use links::PgLinkRepository;
pub use mentions::PgMentionRepository;
pub use nodes::PgNodeRepository;
pub use notes::{ensure_note_owner, PgNoteRepository};
pub use pool::{
    create_lazy_pool, create_pool, create_pool_with_config, log_pool_metrics, PoolConfig,
};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub notes: PgNoteRepository,
    pub nodes: PgNodeRepository,
    pub mentions: PgMentionRepository,
    pub links: PgLinkRepository,
    /// Read side of the append-only correction log.
    pub corrections: PgCorrectionLogRepository,
    /// Multi-step consolidation operations.
    pub engine: ConsolidationEngine,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notes: PgNoteRepository::new(pool.clone()),
            nodes: PgNodeRepository::new(pool.clone()),
            mentions: PgMentionRepository::new(pool.clone()),
            links: PgLinkRepository::new(pool.clone()),
            corrections: PgCorrectionLogRepository::new(pool.clone()),
            engine: ConsolidationEngine::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Round-trip to the database.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
