//! Default values shared across lorekeep crates.
//!
//! Crates reference these constants instead of repeating magic numbers.

// =============================================================================
// SERVER
// =============================================================================

pub const SERVER_HOST: &str = "0.0.0.0";

pub const SERVER_PORT: u16 = 3000;

/// Maximum accepted request body (notes can be long session logs).
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// DATABASE
// =============================================================================

pub const DB_MAX_CONNECTIONS: u32 = 10;

pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Seconds to wait for a pooled connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// TAGGER
// =============================================================================

/// Environment variable holding the tagger endpoint.
pub const ENV_TAGGER_URL: &str = "TAGGER_URL";

/// Environment variable holding the tagger timeout in seconds.
pub const ENV_TAGGER_TIMEOUT_SECS: &str = "TAGGER_TIMEOUT_SECS";

/// Environment variable that turns tagging off when set to `false`.
pub const ENV_TAGGER_ENABLED: &str = "TAGGER_ENABLED";

/// Endpoint of the external entity tagger.
pub const TAGGER_URL: &str = "http://localhost:5001/tag";

/// Request timeout for the tagger, in seconds.
pub const TAGGER_TIMEOUT_SECS: u64 = 30;

/// Confidence stored for proposals that omit one.
pub const TAGGER_CONFIDENCE: f32 = 1.0;

/// Source label stored for proposals that omit one.
pub const TAGGER_SOURCE: &str = "TAGGER";

// =============================================================================
// MENTIONS
// =============================================================================

/// Confidence recorded for every user-driven mention.
pub const USER_CONFIDENCE: f32 = 1.0;

// =============================================================================
// RESERVED TAGS
// =============================================================================

/// Free-form tag mirrored by the `is_player_character` flag.
pub const TAG_PLAYER_CHARACTER: &str = "player_character";

/// Free-form tag mirrored by the `is_party_member` flag.
pub const TAG_PARTY_MEMBER: &str = "party_member";

// =============================================================================
// RATE LIMITING
// =============================================================================

pub const RATE_LIMIT_REQUESTS: u32 = 100;

pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;
