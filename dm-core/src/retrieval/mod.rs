//! Context retrieval for the Dungeon Master.
//!
//! - [`intent`] classifies what a query is after
//! - [`progression`] hides content the party has not reached and ranks the rest
//! - [`context`] holds retrieved items and renders them for the prompt
//! - [`retriever`] runs the three retrieval tiers under a chunk budget

pub mod context;
pub mod intent;
pub mod progression;
pub mod retriever;

pub use context::{format_context, merge_items, ContextItem, ContextSource, Priority};
pub use intent::QueryIntent;
pub use progression::{filter_by_progression, is_visible, rank_content, score_content_priority, ActNumber};
pub use retriever::{campaign_prefilter, ContextRetriever, RetrievalError, TierBudget};
