//! # lore-tagger
//!
//! Client for the external entity tagger.
//!
//! The tagger reads raw note text and proposes `(name, type, span)` mentions.
//! lorekeep never computes these itself; it persists them through
//! `ConsolidationEngine::ingest_proposals` and reconciles them later.
//!
//! # Feature Flags
//!
//! - `mock`: expose [`mock::MockTagger`] for tests in other crates
//!
//! # Example
//!
//! ```rust,no_run
//! use lore_tagger::{HttpTagger, TagRequest, Tagger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     if let Some(tagger) = HttpTagger::from_env()? {
//!         let proposals = tagger
//!             .tag(&TagRequest { note_id: 1, text: "Aria met Bree".into(), user_id: 1 })
//!             .await?;
//!         println!("{} proposals", proposals.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod http;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use lore_core::{Error, ProposedMention, Result, TagRequest, Tagger};

pub use http::{HttpTagger, TaggerConfig};
