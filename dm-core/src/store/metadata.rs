use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Provenance metadata attached to every stored chunk.
///
/// Content chunks, session-history sections, session entries and state
/// records all share this shape; each kind fills the fields it needs.
/// Fields this type does not name are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    // Campaign content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub act_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_relevance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_spoilers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dm_guide: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_player_content: Option<bool>,

    // Session history and session entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub characters_mentioned: Vec<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub locations_mentioned: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

pub const FUTURE_POSSIBILITIES: &str = "future_possibilities";

impl ChunkMetadata {
    pub fn is_dm_guide(&self) -> bool {
        self.is_dm_guide.unwrap_or(false)
    }

    pub fn contains_spoilers(&self) -> bool {
        self.contains_spoilers.unwrap_or(false)
    }

    pub fn is_player_content(&self) -> bool {
        self.is_player_content.unwrap_or(false)
    }

    pub fn is_future_possibility(&self) -> bool {
        self.story_relevance.as_deref() == Some(FUTURE_POSSIBILITIES)
    }

    /// Look up a field by name, as a filter sees it.
    ///
    /// List fields are exposed comma-joined; empty lists count as absent.
    pub fn field(&self, name: &str) -> Option<Value> {
        let text = |v: &Option<String>| v.clone().map(Value::String);
        let flag = |v: &Option<bool>| v.map(Value::Bool);
        let list = |v: &Vec<String>| (!v.is_empty()).then(|| Value::String(v.join(", ")));

        match name {
            "source" => text(&self.source),
            "filename" => text(&self.filename),
            "act" => text(&self.act),
            "act_number" => text(&self.act_number),
            "content_type" => text(&self.content_type),
            "content_subtype" => text(&self.content_subtype),
            "document_type" => text(&self.document_type),
            "story_relevance" => text(&self.story_relevance),
            "contains_spoilers" => flag(&self.contains_spoilers),
            "is_dm_guide" => flag(&self.is_dm_guide),
            "is_player_content" => flag(&self.is_player_content),
            "session_number" => self.session_number.map(Value::from),
            "session_id" => text(&self.session_id),
            "section_type" => text(&self.section_type),
            "section_title" => text(&self.section_title),
            "entry_type" => text(&self.entry_type),
            "timestamp" => text(&self.timestamp),
            "characters_mentioned" => list(&self.characters_mentioned),
            "locations_mentioned" => list(&self.locations_mentioned),
            other => self.extra.get(other).cloned(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .collect(),
        _ => Vec::new(),
    };
    Ok(items.into_iter().filter(|s: &String| !s.is_empty()).collect())
}
