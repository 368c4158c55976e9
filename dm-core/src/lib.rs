//! Campaign retrieval engine and AI Dungeon Master.
//!
//! This crate provides:
//! - Three-tier context retrieval with spoiler-safe progression filtering
//! - A persistent world state for story position, quests and flags
//! - Session logging, dice and character tools for the model
//! - An AI Dungeon Master that talks to any OpenAI-compatible server
//!
//! # Quick Start
//!
//! ```ignore
//! use dm_core::{DmConfig, DungeonMaster, HttpEmbedder, MemoryVectorStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DmConfig::new().with_data_dir("data").apply_env()?;
//!     let client = config.llm_client();
//!     let store = Arc::new(MemoryVectorStore::new());
//!     let embedder = Arc::new(HttpEmbedder::new(client.clone(), &config.ai.embedding_model_name));
//!
//!     let mut dm = DungeonMaster::new(Arc::new(client), store, embedder, config);
//!     dm.start_session(|text| print!("{text}")).await?;
//!     dm.process_input("I knock on the door of the Burgomaster's mansion", |text| print!("{text}"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dm;
pub mod embedding;
pub mod game;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod testing;
pub mod world_state;

// Re-export for convenience
pub use dm_macros::Tool;

// Primary public API
pub use config::{ConfigError, DmConfig};
pub use dm::{ChatModel, DmError, DmResponse, DungeonMaster};
pub use embedding::{Embedder, EmbeddingError, HashingEmbedder, HttpEmbedder};
pub use retrieval::{ContextItem, ContextRetriever, QueryIntent, RetrievalError};
pub use session::{SessionError, SessionLog};
pub use store::{clear_collections, ChunkMetadata, MemoryVectorStore, MetadataFilter, StoreError, VectorStore};
pub use testing::{MockModel, MockResponse, TestHarness};
pub use world_state::{QuestStatus, StoryRelevanceContext, WorldState, WorldStateError, WorldStateStore};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// Look up a location in the campaign gazetteer
    #[derive(Tool, Deserialize)]
    #[tool(name = "find_location")]
    struct FindLocation {
        /// Location name, e.g. "Vallaki"
        name: String,
        /// Optional region to narrow the search
        region: Option<String>,
        /// How many results to return
        #[tool(optional, min = 1, max = 5)]
        #[serde(default)]
        limit: u32,
    }

    #[test]
    fn test_tool_derive() {
        assert_eq!(FindLocation::tool_name(), "find_location");
        assert_eq!(
            FindLocation::tool_description(),
            "Look up a location in the campaign gazetteer"
        );
    }

    #[test]
    fn test_tool_schema() {
        let schema = FindLocation::parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["name"]["type"], "string");
        assert_eq!(schema["properties"]["region"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["minimum"], 1);

        // name is required; region is an Option and limit is marked optional
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "name"));
        assert!(!required.iter().any(|v| v == "region"));
        assert!(!required.iter().any(|v| v == "limit"));
    }

    #[test]
    fn test_tool_from_arguments() {
        let args = FindLocation::from_arguments(&serde_json::json!({"name": "Krezk"})).unwrap();
        assert_eq!(args.name, "Krezk");
        assert!(args.region.is_none());
        assert_eq!(args.limit, 0);
    }
}
