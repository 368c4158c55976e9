//! Live session log.
//!
//! Every player input, DM response and dice roll of the running session is
//! stored as an immutable, embedded entry in the current-session collection.
//! Ending a session writes a summary into the session-history collection.

use crate::embedding::Embedder;
use crate::game::DiceRoll;
use crate::store::{ChunkMetadata, MetadataFilter, Record, StoreError, VectorStore};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Characters of each entry kept in a session summary.
const SUMMARY_EXCERPT_CHARS: usize = 240;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No active session to end")]
    NoActiveSession,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    SessionStart,
    PlayerInput,
    DmResponse,
    DiceRoll,
    SessionSummary,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::SessionStart => "session_start",
            EntryType::PlayerInput => "player_input",
            EntryType::DmResponse => "dm_response",
            EntryType::DiceRoll => "dice_roll",
            EntryType::SessionSummary => "session_summary",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged event. Never modified after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    pub timestamp: String,
    pub entry_id: String,
    pub entry_type: EntryType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice_data: Option<DiceRoll>,
}

impl SessionEntry {
    fn new(session_id: &str, entry_type: EntryType, content: String) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: Local::now().to_rfc3339(),
            entry_id: Uuid::new_v4().to_string(),
            entry_type,
            content,
            dice_data: None,
        }
    }

    /// Store id of this entry.
    pub fn record_id(&self) -> String {
        format!("entry_{}", self.entry_id)
    }
}

#[derive(Debug, Clone)]
struct ActiveSession {
    id: String,
    number: Option<u32>,
}

/// Records the running session.
pub struct SessionLog {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    current_collection: String,
    history_collection: String,
    active: Option<ActiveSession>,
}

impl SessionLog {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        current_collection: impl Into<String>,
        history_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            current_collection: current_collection.into(),
            history_collection: history_collection.into(),
            active: None,
        }
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.id.as_str())
    }

    /// Begin a session and log its start. Returns the session id.
    pub async fn start_session(&mut self, session_number: Option<u32>) -> String {
        let id = Local::now().format("session_%Y%m%d_%H%M%S").to_string();
        self.active = Some(ActiveSession {
            id: id.clone(),
            number: session_number,
        });
        self.log(EntryType::SessionStart, format!("Started new D&D session: {id}"))
            .await;
        info!(session_id = %id, "session started");
        id
    }

    /// Append an entry to the active session. Without one this does nothing.
    /// Store failures are logged, never returned.
    pub async fn log(&self, entry_type: EntryType, content: impl Into<String>) -> Option<SessionEntry> {
        self.log_entry(entry_type, content.into(), None).await
    }

    pub async fn log_player_input(&self, input: &str) {
        self.log(EntryType::PlayerInput, input).await;
    }

    pub async fn log_dm_response(&self, response: &str) {
        self.log(EntryType::DmResponse, response).await;
    }

    pub async fn log_dice_roll(&self, roll: &DiceRoll) {
        self.log_entry(EntryType::DiceRoll, roll.to_string(), Some(roll.clone()))
            .await;
    }

    async fn log_entry(
        &self,
        entry_type: EntryType,
        content: String,
        dice_data: Option<DiceRoll>,
    ) -> Option<SessionEntry> {
        let session = self.active.as_ref()?;
        let mut entry = SessionEntry::new(&session.id, entry_type, content);
        entry.dice_data = dice_data;

        match self.write_entry(&entry).await {
            Ok(()) => Some(entry),
            Err(e) => {
                warn!(error = %e, entry_type = %entry_type, "failed to log session entry");
                None
            }
        }
    }

    async fn write_entry(&self, entry: &SessionEntry) -> Result<(), SessionError> {
        let metadata = ChunkMetadata {
            session_id: Some(entry.session_id.clone()),
            entry_type: Some(entry.entry_type.as_str().to_string()),
            timestamp: Some(entry.timestamp.clone()),
            ..Default::default()
        };
        let mut record = Record::new(entry.record_id(), serde_json::to_string(entry)?, metadata);
        match self.embedder.embed_query(&entry.content).await {
            Ok(embedding) => record = record.with_embedding(embedding),
            Err(e) => warn!(error = %e, "session entry stored without embedding"),
        }
        self.store.add(&self.current_collection, vec![record]).await?;
        Ok(())
    }

    /// All entries logged under `session_id`, oldest first.
    pub async fn entries(&self, session_id: &str) -> Result<Vec<SessionEntry>, SessionError> {
        let records = self
            .store
            .find(
                &self.current_collection,
                &MetadataFilter::eq("session_id", session_id),
                None,
            )
            .await?;

        let mut entries: Vec<SessionEntry> = records
            .iter()
            .filter_map(|r| serde_json::from_str(&r.document).ok())
            .collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(entries)
    }

    /// Close the active session, saving a summary to session history.
    pub async fn end_session(&mut self) -> Result<String, SessionError> {
        let session = self.active.clone().ok_or(SessionError::NoActiveSession)?;
        let entries = self.entries(&session.id).await?;

        let summary = render_summary(&session.id, &entries);
        let dice_rolls = count_type(&entries, EntryType::DiceRoll);
        let key_events = entries
            .iter()
            .filter(|e| matches!(e.entry_type, EntryType::PlayerInput | EntryType::DmResponse))
            .count();

        let metadata = ChunkMetadata {
            session_id: Some(session.id.clone()),
            session_number: session.number,
            section_type: Some("session_summary".to_string()),
            entry_type: Some(EntryType::SessionSummary.as_str().to_string()),
            timestamp: Some(Local::now().to_rfc3339()),
            ..Default::default()
        }
        .with_extra("total_entries", entries.len())
        .with_extra("dice_rolls", dice_rolls)
        .with_extra("key_events", key_events);

        let mut record = Record::new(format!("summary_{}", session.id), summary.clone(), metadata);
        match self.embedder.embed_query(&summary).await {
            Ok(embedding) => record = record.with_embedding(embedding),
            Err(e) => warn!(error = %e, "session summary stored without embedding"),
        }
        self.store.add(&self.history_collection, vec![record]).await?;

        self.active = None;
        info!(session_id = %session.id, entries = entries.len(), "session ended");
        Ok(format!(
            "Session {} ended. Summary saved with {} entries.",
            session.id,
            entries.len()
        ))
    }
}

fn count_type(entries: &[SessionEntry], entry_type: EntryType) -> usize {
    entries.iter().filter(|e| e.entry_type == entry_type).count()
}

fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SUMMARY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn render_summary(session_id: &str, entries: &[SessionEntry]) -> String {
    let mut lines = vec![format!(
        "Session {session_id} summary: {} entries, {} dice rolls.",
        entries.len(),
        count_type(entries, EntryType::DiceRoll)
    )];

    for entry in entries {
        let speaker = match entry.entry_type {
            EntryType::PlayerInput => "Player",
            EntryType::DmResponse => "DM",
            EntryType::DiceRoll => "Roll",
            EntryType::SessionStart | EntryType::SessionSummary => continue,
        };
        lines.push(format!("- {speaker}: {}", excerpt(&entry.content)));
    }
    lines.join("\n")
}
