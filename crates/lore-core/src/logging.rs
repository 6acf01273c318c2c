//! Structured logging field names shared by every lorekeep crate.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, fallback applied (skipped proposal, tagger down) |
//! | INFO  | Lifecycle events, completed consolidation operations |
//! | DEBUG | Decision points (merge vs. update, reassign vs. discard) |
//! | TRACE | Per-row iteration (individual mentions and links) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID attached to every request. Format: UUIDv7.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "engine", "tagger"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "consolidation", "http_tagger"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "change_node_type", "retag_everywhere", "ingest_proposals"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Owner (user) the operation runs on behalf of.
pub const OWNER_ID: &str = "owner_id";

pub const NOTE_ID: &str = "note_id";

pub const NODE_ID: &str = "node_id";

pub const MENTION_ID: &str = "mention_id";

/// Node type label involved in the operation.
pub const NODE_TYPE: &str = "node_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of mentions moved to another node.
pub const MENTIONS_MOVED: &str = "mentions_moved";

/// Number of mentions deleted as duplicates.
pub const MENTIONS_DISCARDED: &str = "mentions_discarded";

/// Number of mentions created by rescanning.
pub const MENTIONS_CREATED: &str = "mentions_created";

/// Number of links pointed at a new endpoint.
pub const LINKS_REPOINTED: &str = "links_repointed";

/// Number of links dropped (duplicate or self-loop).
pub const LINKS_DROPPED: &str = "links_dropped";

/// Number of proposals returned by the tagger.
pub const PROPOSAL_COUNT: &str = "proposal_count";

// ─── Database fields ───────────────────────────────────────────────────────

pub const POOL_SIZE: &str = "pool_size";

pub const POOL_IDLE: &str = "pool_idle";

/// Database table affected.
pub const DB_TABLE: &str = "db_table";

// ─── Outcome fields ────────────────────────────────────────────────────────

pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Whether a type change turned into a merge.
pub const MERGED: &str = "merged";
