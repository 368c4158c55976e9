//! Persistent story position, quests, relationships and flags.
//!
//! There is one [`WorldState`] per campaign, stored as JSON under a fixed id
//! in the world-state collection. Every mutator loads lazily and saves
//! immediately, so each change is durable on its own.

use crate::embedding::Embedder;
use crate::retrieval::ActNumber;
use crate::store::{ChunkMetadata, Record, StoreError, VectorStore};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Id of the singleton world state record.
pub const WORLD_STATE_ID: &str = "current_world_state";

/// Important events kept before the oldest is evicted.
pub const MAX_IMPORTANT_EVENTS: usize = 20;

/// Relationship statuses worth surfacing in prompts.
const KEY_RELATIONSHIPS: &[&str] = &["friendly", "hostile", "romantic", "enemy"];

#[derive(Debug, Error)]
pub enum WorldStateError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown quest status: {0}")]
    UnknownQuestStatus(String),
}

/// Where a quest stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
}

impl FromStr for QuestStatus {
    type Err = WorldStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(QuestStatus::Active),
            "completed" | "complete" => Ok(QuestStatus::Completed),
            "failed" => Ok(QuestStatus::Failed),
            other => Err(WorldStateError::UnknownQuestStatus(other.to_string())),
        }
    }
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
            QuestStatus::Failed => "failed",
        })
    }
}

/// The state of the game world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldState {
    // Story progression
    pub current_act: String,
    pub current_arc: String,
    pub current_location: String,
    pub last_significant_location: String,

    // Quests; a quest is in at most one list
    pub active_quests: Vec<String>,
    pub completed_quests: Vec<String>,
    pub failed_quests: Vec<String>,

    pub character_relationships: BTreeMap<String, String>,
    pub faction_reputation: BTreeMap<String, i32>,

    pub story_flags: BTreeMap<String, bool>,
    /// Oldest first, each prefixed with `[YYYY-MM-DD HH:MM]`.
    pub important_events: Vec<String>,

    pub current_session_number: u32,
    pub total_sessions_played: u32,
    pub last_updated: String,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            current_act: "Act I".to_string(),
            current_arc: "Arc A".to_string(),
            current_location: "Unknown".to_string(),
            last_significant_location: "Unknown".to_string(),
            active_quests: Vec::new(),
            completed_quests: Vec::new(),
            failed_quests: Vec::new(),
            character_relationships: BTreeMap::new(),
            faction_reputation: BTreeMap::new(),
            story_flags: BTreeMap::new(),
            important_events: Vec::new(),
            current_session_number: 0,
            total_sessions_played: 0,
            last_updated: Local::now().to_rfc3339(),
        }
    }
}

impl WorldState {
    /// Numeric act, falling back to Act 1 when the label cannot be read.
    pub fn current_act_number(&self) -> u32 {
        ActNumber::parse(&self.current_act).known().unwrap_or(1)
    }

    pub fn move_to(&mut self, location: &str, is_significant: bool) {
        if is_significant && self.current_location != "Unknown" {
            self.last_significant_location = self.current_location.clone();
        }
        self.current_location = location.to_string();
    }

    pub fn set_quest(&mut self, name: &str, status: QuestStatus) {
        for list in [
            &mut self.active_quests,
            &mut self.completed_quests,
            &mut self.failed_quests,
        ] {
            list.retain(|q| q != name);
        }
        let target = match status {
            QuestStatus::Active => &mut self.active_quests,
            QuestStatus::Completed => &mut self.completed_quests,
            QuestStatus::Failed => &mut self.failed_quests,
        };
        target.push(name.to_string());
    }

    pub fn quest_status(&self, name: &str) -> Option<QuestStatus> {
        let has = |list: &Vec<String>| list.iter().any(|q| q == name);
        if has(&self.active_quests) {
            Some(QuestStatus::Active)
        } else if has(&self.completed_quests) {
            Some(QuestStatus::Completed)
        } else if has(&self.failed_quests) {
            Some(QuestStatus::Failed)
        } else {
            None
        }
    }

    pub fn record_event(&mut self, description: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M");
        self.important_events
            .push(format!("[{timestamp}] {description}"));
        if self.important_events.len() > MAX_IMPORTANT_EVENTS {
            let excess = self.important_events.len() - MAX_IMPORTANT_EVENTS;
            self.important_events.drain(..excess);
        }
    }

    pub fn begin_session(&mut self, session_number: u32) {
        self.current_session_number = session_number;
        self.total_sessions_played = self.total_sessions_played.max(session_number);
    }

    /// One-line blurb stored next to the record for similarity search.
    pub fn summary_blurb(&self) -> String {
        let mut parts = vec![
            format!("Current story: {} {}", self.current_act, self.current_arc),
            format!("Location: {}", self.current_location),
            format!("Session: {}", self.current_session_number),
        ];
        if !self.active_quests.is_empty() {
            parts.push(format!("Active quests: {}", self.active_quests.join(", ")));
        }
        if !self.important_events.is_empty() {
            let start = self.important_events.len().saturating_sub(2);
            parts.push(format!(
                "Recent events: {}",
                self.important_events[start..].join("; ")
            ));
        }
        parts.join(" | ")
    }

    /// Multi-line summary for the system prompt.
    pub fn context_summary(&self) -> String {
        let mut lines = vec![
            format!(
                "**Current Story Position**: {}, {}",
                self.current_act, self.current_arc
            ),
            format!("**Current Location**: {}", self.current_location),
        ];

        if !self.active_quests.is_empty() {
            lines.push(format!("**Active Quests**: {}", self.active_quests.join(", ")));
        }

        if !self.important_events.is_empty() {
            lines.push("**Recent Important Events**:".to_string());
            let start = self.important_events.len().saturating_sub(3);
            for event in &self.important_events[start..] {
                lines.push(format!("  - {event}"));
            }
        }

        let key_relationships: Vec<_> = self
            .character_relationships
            .iter()
            .filter(|(_, status)| KEY_RELATIONSHIPS.contains(&status.as_str()))
            .collect();
        if !key_relationships.is_empty() {
            lines.push("**Key Character Relationships**:".to_string());
            for (name, status) in key_relationships {
                lines.push(format!("  - {name}: {status}"));
            }
        }

        let active_flags: Vec<&str> = self
            .story_flags
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
            .collect();
        if !active_flags.is_empty() {
            lines.push(format!("**Active Story Flags**: {}", active_flags.join(", ")));
        }

        lines.join("\n")
    }

    pub fn relevance_context(&self) -> StoryRelevanceContext {
        StoryRelevanceContext {
            current_act: self.current_act.clone(),
            current_act_number: self.current_act_number(),
            current_arc: self.current_arc.clone(),
            current_location: self.current_location.clone(),
            active_quests: self.active_quests.clone(),
            story_flags: self.story_flags.clone(),
            session_number: self.current_session_number,
            character_relationships: self.character_relationships.clone(),
        }
    }
}

/// Read-only snapshot of story position used to rank and gate retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryRelevanceContext {
    pub current_act: String,
    pub current_act_number: u32,
    pub current_arc: String,
    pub current_location: String,
    pub active_quests: Vec<String>,
    pub story_flags: BTreeMap<String, bool>,
    pub session_number: u32,
    pub character_relationships: BTreeMap<String, String>,
}

impl Default for StoryRelevanceContext {
    fn default() -> Self {
        WorldState::default().relevance_context()
    }
}

/// Loads, mutates and saves the campaign's [`WorldState`].
pub struct WorldStateStore {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    state: Option<WorldState>,
}

impl WorldStateStore {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
            state: None,
        }
    }

    /// Read the state from the store, creating and saving a default when it
    /// is missing or unreadable.
    pub async fn load(&mut self) -> Result<&WorldState, WorldStateError> {
        let records = self
            .store
            .get(&self.collection, &[WORLD_STATE_ID.to_string()])
            .await?;

        let parsed = match records.into_iter().next() {
            Some(record) => match serde_json::from_str::<WorldState>(&record.document) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(error = %e, "world state unreadable, starting fresh");
                    None
                }
            },
            None => None,
        };

        match parsed {
            Some(state) => {
                info!(
                    location = %state.current_location,
                    act = %state.current_act,
                    "loaded world state"
                );
                self.state = Some(state);
            }
            None => {
                self.state = Some(WorldState::default());
                self.save().await?;
                info!("created new world state");
            }
        }

        Ok(self.state.get_or_insert_with(WorldState::default))
    }

    /// The current state, loading it on first use.
    pub async fn state(&mut self) -> Result<&WorldState, WorldStateError> {
        let state: &WorldState = self.state_mut().await?;
        Ok(state)
    }

    async fn state_mut(&mut self) -> Result<&mut WorldState, WorldStateError> {
        if self.state.is_none() {
            self.load().await?;
        }
        Ok(self.state.get_or_insert_with(WorldState::default))
    }

    /// Persist the in-memory state. A no-op before the first load.
    pub async fn save(&mut self) -> Result<(), WorldStateError> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        state.last_updated = Local::now().to_rfc3339();

        let document = serde_json::to_string(state)?;
        let metadata = ChunkMetadata {
            act: Some(state.current_act.clone()),
            session_number: Some(state.current_session_number),
            content_type: Some("world_state".to_string()),
            timestamp: Some(state.last_updated.clone()),
            ..Default::default()
        }
        .with_extra("state_id", WORLD_STATE_ID)
        .with_extra("current_location", state.current_location.clone());

        let mut record = Record::new(WORLD_STATE_ID, document, metadata);
        match self.embedder.embed_query(&state.summary_blurb()).await {
            Ok(embedding) => record = record.with_embedding(embedding),
            Err(e) => warn!(error = %e, "saving world state without embedding"),
        }

        self.store.add(&self.collection, vec![record]).await?;
        debug!("world state saved");
        Ok(())
    }

    async fn mutate(&mut self, f: impl FnOnce(&mut WorldState)) -> Result<(), WorldStateError> {
        f(self.state_mut().await?);
        self.save().await
    }

    pub async fn update_location(
        &mut self,
        location: &str,
        is_significant: bool,
    ) -> Result<(), WorldStateError> {
        self.mutate(|s| s.move_to(location, is_significant)).await?;
        info!(%location, "location updated");
        Ok(())
    }

    pub async fn update_story_progression(
        &mut self,
        act: Option<&str>,
        arc: Option<&str>,
    ) -> Result<(), WorldStateError> {
        self.mutate(|s| {
            if let Some(act) = act.filter(|a| !a.is_empty()) {
                s.current_act = act.to_string();
            }
            if let Some(arc) = arc.filter(|a| !a.is_empty()) {
                s.current_arc = arc.to_string();
            }
        })
        .await
    }

    pub async fn add_quest(&mut self, name: &str, status: QuestStatus) -> Result<(), WorldStateError> {
        self.mutate(|s| s.set_quest(name, status)).await?;
        info!(quest = %name, %status, "quest updated");
        Ok(())
    }

    pub async fn update_character_relationship(
        &mut self,
        character: &str,
        status: &str,
    ) -> Result<(), WorldStateError> {
        self.mutate(|s| {
            s.character_relationships
                .insert(character.to_string(), status.to_string());
        })
        .await
    }

    /// Shift a faction's reputation by `delta`, starting from zero.
    pub async fn update_faction_reputation(
        &mut self,
        faction: &str,
        delta: i32,
    ) -> Result<(), WorldStateError> {
        self.mutate(|s| {
            *s.faction_reputation.entry(faction.to_string()).or_insert(0) += delta;
        })
        .await
    }

    pub async fn set_story_flag(&mut self, flag: &str, value: bool) -> Result<(), WorldStateError> {
        self.mutate(|s| {
            s.story_flags.insert(flag.to_string(), value);
        })
        .await
    }

    pub async fn add_important_event(&mut self, description: &str) -> Result<(), WorldStateError> {
        self.mutate(|s| s.record_event(description)).await
    }

    pub async fn start_new_session(&mut self, session_number: u32) -> Result<(), WorldStateError> {
        self.mutate(|s| s.begin_session(session_number)).await?;
        info!(session_number, "session started");
        Ok(())
    }

    pub async fn get_current_context_summary(&mut self) -> Result<String, WorldStateError> {
        Ok(self.state().await?.context_summary())
    }

    /// Snapshot for ranking. The query does not influence it today.
    pub async fn get_story_relevance_context(
        &mut self,
        _query: &str,
    ) -> Result<StoryRelevanceContext, WorldStateError> {
        Ok(self.state().await?.relevance_context())
    }
}
