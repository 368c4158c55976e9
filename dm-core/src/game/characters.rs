//! Character sheets for players and NPCs.

use crate::store::{ChunkMetadata, Record, StoreError, VectorStore};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CharacterError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown update type: {0}")]
    UnknownUpdateType(String),

    #[error("Invalid {update_type} update: {reason}")]
    InvalidUpdate {
        update_type: UpdateType,
        reason: String,
    },
}

/// Which part of a character an update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Hp,
    Inventory,
    Status,
    Relationship,
    Location,
}

impl FromStr for UpdateType {
    type Err = CharacterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hp" => Ok(UpdateType::Hp),
            "inventory" => Ok(UpdateType::Inventory),
            "status" => Ok(UpdateType::Status),
            "relationship" => Ok(UpdateType::Relationship),
            "location" => Ok(UpdateType::Location),
            other => Err(CharacterError::UnknownUpdateType(other.to_string())),
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateType::Hp => "hp",
            UpdateType::Inventory => "inventory",
            UpdateType::Status => "status",
            UpdateType::Relationship => "relationship",
            UpdateType::Location => "location",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i64,
    pub maximum: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_points: Option<HitPoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armor_class: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CharacterAttributes {
    fn is_empty(&self) -> bool {
        self.hit_points.is_none()
            && self.armor_class.is_none()
            && self.level.is_none()
            && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub timestamp: String,
    pub change: String,
    pub session: Option<String>,
}

/// A tracked character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub character_id: String,
    pub name: String,
    #[serde(default = "unknown_type")]
    pub character_type: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub session_last_seen: Option<String>,
    #[serde(default)]
    pub attributes: CharacterAttributes,
    #[serde(default)]
    pub inventory: Map<String, Value>,
    #[serde(default)]
    pub personality: Map<String, Value>,
    #[serde(default)]
    pub relationships: Map<String, Value>,
    #[serde(default)]
    pub campaign_data: Map<String, Value>,
    #[serde(default)]
    pub change_log: Vec<ChangeLogEntry>,
}

fn unknown_type() -> String {
    "unknown".to_string()
}

/// `"Ireena Kolyana"` becomes `"char_ireena_kolyana"`.
pub fn character_id(name: &str) -> String {
    format!("char_{}", name.trim().to_lowercase().replace(' ', "_"))
}

impl CharacterRecord {
    pub fn new(name: &str, session: Option<&str>) -> Self {
        Self {
            character_id: character_id(name),
            name: name.to_string(),
            character_type: unknown_type(),
            last_updated: Local::now().to_rfc3339(),
            session_last_seen: session.map(str::to_string),
            attributes: CharacterAttributes::default(),
            inventory: Map::new(),
            personality: Map::new(),
            relationships: Map::new(),
            campaign_data: Map::new(),
            change_log: Vec::new(),
        }
    }

    /// Apply one update and record it in the change log.
    pub fn apply(
        &mut self,
        update_type: UpdateType,
        data: &Map<String, Value>,
        session: Option<&str>,
    ) -> Result<(), CharacterError> {
        match update_type {
            UpdateType::Hp => {
                let hp = self.attributes.hit_points.get_or_insert_with(HitPoints::default);
                if let Some(current) = data.get("current") {
                    hp.current = as_int(current, update_type, "current")?;
                }
                if let Some(maximum) = data.get("maximum") {
                    hp.maximum = as_int(maximum, update_type, "maximum")?;
                }
            }
            UpdateType::Inventory => merge(&mut self.inventory, data),
            UpdateType::Status => merge(&mut self.campaign_data, data),
            UpdateType::Relationship => merge(&mut self.relationships, data),
            UpdateType::Location => {
                let location = data.get("location").and_then(Value::as_str).unwrap_or("");
                self.campaign_data
                    .insert("current_location".to_string(), Value::from(location));
            }
        }

        let now = Local::now().to_rfc3339();
        self.change_log.push(ChangeLogEntry {
            timestamp: now.clone(),
            change: format!("Updated {update_type}: {}", Value::Object(data.clone())),
            session: session.map(str::to_string),
        });
        self.last_updated = now;
        self.session_last_seen = session.map(str::to_string);
        Ok(())
    }

    pub fn location(&self) -> Option<&str> {
        self.campaign_data.get("current_location").and_then(Value::as_str)
    }

    /// Short sheet for the model.
    pub fn summary(&self) -> String {
        let mut info = format!("**{}**\n", self.name);

        if !self.attributes.is_empty() {
            let mut stats = Vec::new();
            if let Some(hp) = self.attributes.hit_points {
                stats.push(format!("HP: {}/{}", hp.current, hp.maximum));
            }
            if let Some(ac) = self.attributes.armor_class {
                stats.push(format!("AC: {ac}"));
            }
            if let Some(level) = self.attributes.level {
                stats.push(format!("Level: {level}"));
            }
            if !stats.is_empty() {
                info.push_str(&format!("**Stats:** {}\n", stats.join(" ")));
            }
        }

        if let Some(location) = self.location() {
            info.push_str(&format!("**Location:** {location}\n"));
        }

        if !self.inventory.is_empty() {
            info.push_str(&format!("**Inventory:** {}\n", render_map(&self.inventory)));
        }

        info
    }
}

fn as_int(value: &Value, update_type: UpdateType, field: &str) -> Result<i64, CharacterError> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| CharacterError::InvalidUpdate {
            update_type,
            reason: format!("{field} must be a number, got {value}"),
        })
}

fn merge(target: &mut Map<String, Value>, data: &Map<String, Value>) {
    for (key, value) in data {
        target.insert(key.clone(), value.clone());
    }
}

fn render_map(map: &Map<String, Value>) -> String {
    map.iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}: {s}"),
            other => format!("{k}: {other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Loads and saves character records.
pub struct CharacterManager {
    store: Arc<dyn VectorStore>,
    collection: String,
    session_id: Option<String>,
}

impl CharacterManager {
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            session_id: None,
        }
    }

    /// Session stamped onto subsequent changes.
    pub fn set_session_id(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    pub async fn load(&self, name: &str) -> Result<Option<CharacterRecord>, CharacterError> {
        let records = self.store.get(&self.collection, &[character_id(name)]).await?;
        match records.into_iter().next() {
            Some(record) => Ok(Some(serde_json::from_str(&record.document)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, character: &CharacterRecord) -> Result<(), CharacterError> {
        let metadata = ChunkMetadata {
            timestamp: Some(character.last_updated.clone()),
            ..Default::default()
        }
        .with_extra("character_id", character.character_id.clone())
        .with_extra("character_name", character.name.clone())
        .with_extra("character_type", character.character_type.clone());

        let record = Record::new(
            character.character_id.clone(),
            serde_json::to_string(character)?,
            metadata,
        );
        self.store.add(&self.collection, vec![record]).await?;
        Ok(())
    }

    /// Apply an update, creating the character if it does not exist yet.
    pub async fn update_character(
        &self,
        name: &str,
        update_type: UpdateType,
        data: &Map<String, Value>,
    ) -> Result<CharacterRecord, CharacterError> {
        let session = self.session_id.as_deref();
        let mut character = match self.load(name).await? {
            Some(character) => character,
            None => CharacterRecord::new(name, session),
        };
        character.apply(update_type, data, session)?;
        self.save(&character).await?;
        info!(character = %name, %update_type, "character updated");
        Ok(character)
    }

    /// Rendered sheet, or a not-found notice.
    pub async fn get_character_info(&self, name: &str) -> Result<String, CharacterError> {
        Ok(match self.load(name).await? {
            Some(character) => character.summary(),
            None => format!("Character '{name}' not found"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryVectorStore;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_character_id() {
        assert_eq!(character_id("Ireena Kolyana"), "char_ireena_kolyana");
        assert_eq!(character_id(" Ezmerelda "), "char_ezmerelda");
    }

    #[test]
    fn test_update_type_parse() {
        assert_eq!("HP".parse::<UpdateType>().unwrap(), UpdateType::Hp);
        assert!("mood".parse::<UpdateType>().is_err());
    }

    #[test]
    fn test_apply_hp_and_log() {
        let mut c = CharacterRecord::new("Thorin", Some("session_1"));
        c.apply(UpdateType::Hp, &data(json!({"current": 12, "maximum": "20"})), Some("session_1"))
            .unwrap();
        assert_eq!(c.attributes.hit_points, Some(HitPoints { current: 12, maximum: 20 }));
        assert_eq!(c.change_log.len(), 1);
        assert!(c.change_log[0].change.starts_with("Updated hp:"));
    }

    #[test]
    fn test_apply_bad_hp() {
        let mut c = CharacterRecord::new("Thorin", None);
        let err = c
            .apply(UpdateType::Hp, &data(json!({"current": "lots"})), None)
            .unwrap_err();
        assert!(matches!(err, CharacterError::InvalidUpdate { .. }));
        assert!(c.change_log.is_empty());
    }

    #[test]
    fn test_summary() {
        let mut c = CharacterRecord::new("Ismark", None);
        c.apply(UpdateType::Hp, &data(json!({"current": 30, "maximum": 35})), None)
            .unwrap();
        c.apply(UpdateType::Location, &data(json!({"location": "Village of Barovia"})), None)
            .unwrap();
        c.apply(UpdateType::Inventory, &data(json!({"longsword": 1, "note": "from Kolyan"})), None)
            .unwrap();
        let summary = c.summary();
        assert!(summary.starts_with("**Ismark**\n"));
        assert!(summary.contains("**Stats:** HP: 30/35"));
        assert!(summary.contains("**Location:** Village of Barovia"));
        assert!(summary.contains("longsword: 1"));
        assert!(summary.contains("note: from Kolyan"));
    }

    #[tokio::test]
    async fn test_manager_round_trip() {
        let store = Arc::new(MemoryVectorStore::new());
        let mut manager = CharacterManager::new(store, "character_data");
        manager.set_session_id(Some("session_2".to_string()));

        assert_eq!(
            manager.get_character_info("Ireena").await.unwrap(),
            "Character 'Ireena' not found"
        );

        manager
            .update_character("Ireena", UpdateType::Status, &data(json!({"mood": "wary"})))
            .await
            .unwrap();
        let updated = manager
            .update_character("Ireena", UpdateType::Relationship, &data(json!({"Ismark": "brother"})))
            .await
            .unwrap();

        assert_eq!(updated.change_log.len(), 2);
        assert_eq!(updated.session_last_seen.as_deref(), Some("session_2"));
        let loaded = manager.load("ireena").await.unwrap().unwrap();
        assert_eq!(loaded.campaign_data["mood"], "wary");
        assert_eq!(loaded.relationships["Ismark"], "brother");
    }
}
