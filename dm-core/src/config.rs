//! Runtime configuration.
//!
//! Every field has a default so a partial TOML file (or none at all) is a
//! valid configuration. Environment overrides are applied last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Top-level configuration for the Dungeon Master.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DmConfig {
    pub database: DatabaseConfig,
    pub content: ContentConfig,
    pub ai: AiConfig,
    pub game: GameConfig,
    pub retrieval: RetrievalConfig,
}

/// Vector store location and collection names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the store snapshot. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub campaign_collection: String,
    pub session_history_collection: String,
    pub current_session_collection: String,
    pub character_collection: String,
    pub world_state_collection: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            campaign_collection: "curse_of_strahd_content".to_string(),
            session_history_collection: "session_history".to_string(),
            current_session_collection: "campaign_history".to_string(),
            character_collection: "character_data".to_string(),
            world_state_collection: "world_state".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Path of the store snapshot file, if persistence is enabled.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("vector_store.json"))
    }

    /// Collections holding play progress. Campaign content is not among them.
    pub fn progress_collections(&self) -> [&str; 4] {
        [
            &self.session_history_collection,
            &self.current_session_collection,
            &self.character_collection,
            &self.world_state_collection,
        ]
    }
}

/// Retrieval budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Default number of context items per query.
    pub max_context_chunks: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_context_chunks: 5,
        }
    }
}

/// Language model and embedding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub embedding_model_name: String,
    pub enable_streaming: bool,
    /// Use a plain completion whenever tools are offered to the model.
    pub streaming_fallback_on_tools: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: llm::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model_name: llm::DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 500,
            embedding_model_name: "all-MiniLM-L6-v2".to_string(),
            enable_streaming: true,
            streaming_fallback_on_tools: true,
        }
    }
}

/// Game rules limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub max_dice_count: u32,
    pub valid_dice_types: Vec<u32>,
    /// Conversation turns kept in the prompt.
    pub conversation_history_limit: usize,
    /// Upper bound on model/tool round trips per player input.
    pub max_tool_rounds: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_dice_count: 20,
            valid_dice_types: vec![4, 6, 8, 10, 12, 20, 100],
            conversation_history_limit: 10,
            max_tool_rounds: 5,
        }
    }
}

/// Tunable constants of the ranking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Sessions after which the Tier 2 recency boost saturates.
    pub recency_session_horizon: f32,
    /// Largest recency boost a session summary can earn.
    pub max_recency_boost: f32,
    pub current_session_factor: f32,
    pub session_history_base_factor: f32,
    pub session_recall_boost: f32,
    pub focus_boost: f32,
    /// Cap on the summed Tier 2 boosts.
    pub max_total_boost: f32,
    pub current_act_factor: f32,
    pub current_arc_factor: f32,
    pub player_content_factor: f32,
    pub spoiler_penalty: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            recency_session_horizon: 10.0,
            max_recency_boost: 0.2,
            current_session_factor: 0.5,
            session_history_base_factor: 0.7,
            session_recall_boost: 0.1,
            focus_boost: 0.05,
            max_total_boost: 0.3,
            current_act_factor: 0.6,
            current_arc_factor: 0.5,
            player_content_factor: 0.8,
            spoiler_penalty: 1.5,
        }
    }
}

impl DmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document. Missing sections and fields take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    /// Apply `DM_*` environment overrides.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("DM_BASE_URL") {
            self.ai.base_url = v;
        }
        if let Some(v) = lookup("DM_API_KEY").filter(|v| !v.is_empty()) {
            self.ai.api_key = Some(v);
        }
        if let Some(v) = lookup("DM_MODEL") {
            self.ai.model_name = v;
        }
        if let Some(v) = lookup("DM_EMBEDDING_MODEL") {
            self.ai.embedding_model_name = v;
        }
        if let Some(v) = lookup("DM_DATA_DIR") {
            self.database.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DM_MAX_CONTEXT_CHUNKS") {
            self.content.max_context_chunks =
                v.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "DM_MAX_CONTEXT_CHUNKS".to_string(),
                    value: v.clone(),
                })?;
        }
        Ok(self)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.database.data_dir = Some(dir.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.ai.model_name = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.ai.base_url = base_url.into();
        self
    }

    pub fn with_max_context_chunks(mut self, n: usize) -> Self {
        self.content.max_context_chunks = n;
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.ai.enable_streaming = enabled;
        self
    }

    /// Build a chat client from the AI section.
    pub fn llm_client(&self) -> llm::Client {
        let client = llm::Client::new(&self.ai.base_url).with_model(&self.ai.model_name);
        match &self.ai.api_key {
            Some(key) => client.with_api_key(key),
            None => client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DmConfig::default();
        assert_eq!(config.content.max_context_chunks, 5);
        assert_eq!(config.ai.base_url, "http://localhost:11434/v1");
        assert_eq!(config.ai.max_tokens, 500);
        assert!(config.ai.enable_streaming);
        assert_eq!(config.game.valid_dice_types, vec![4, 6, 8, 10, 12, 20, 100]);
        assert_eq!(config.database.world_state_collection, "world_state");
        assert!(config.database.snapshot_path().is_none());
    }

    #[test]
    fn test_progress_collections_spare_campaign() {
        let db = DatabaseConfig::default();
        let progress = db.progress_collections();
        assert!(!progress.contains(&db.campaign_collection.as_str()));
        assert_eq!(
            progress,
            ["session_history", "campaign_history", "character_data", "world_state"]
        );
    }

    #[test]
    fn test_partial_toml() {
        let config = DmConfig::from_toml_str(
            r#"
            [ai]
            model_name = "mistral-7b"

            [retrieval]
            recency_session_horizon = 20.0
            "#,
        )
        .unwrap();
        assert_eq!(config.ai.model_name, "mistral-7b");
        assert_eq!(config.ai.temperature, 0.7);
        assert_eq!(config.retrieval.recency_session_horizon, 20.0);
        assert_eq!(config.retrieval.current_session_factor, 0.5);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            DmConfig::from_toml_str("[ai\nmodel_name = 3"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DM_MODEL", "qwen"),
            ("DM_DATA_DIR", "/tmp/dm"),
            ("DM_MAX_CONTEXT_CHUNKS", "8"),
            ("DM_API_KEY", ""),
        ]
        .into_iter()
        .collect();
        let config = DmConfig::default()
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.ai.model_name, "qwen");
        assert_eq!(config.content.max_context_chunks, 8);
        assert!(config.ai.api_key.is_none());
        assert_eq!(
            config.database.snapshot_path(),
            Some(PathBuf::from("/tmp/dm/vector_store.json"))
        );
    }

    #[test]
    fn test_bad_env_number() {
        let result =
            DmConfig::default().apply_overrides(|k| (k == "DM_MAX_CONTEXT_CHUNKS").then(|| "many".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
