//! # lore-core
//!
//! Core types, traits, and pure consolidation logic for lorekeep.
//!
//! Everything here is free of I/O: the storage layer in `lore-db` and the
//! HTTP layer in `lore-api` build on these definitions.

pub mod consolidation;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod rescan;
pub mod traits;

// Re-export commonly used types at crate root
pub use consolidation::{
    cooccurrence_pairs, plan_link_rewire, plan_reattribution, LinkRepoint, LinkRewirePlan,
    ReattributionPlan, SpanKey,
};
pub use error::{Error, Result};
pub use models::*;
pub use rescan::{find_word_spans, WordMatcher};
pub use traits::*;
