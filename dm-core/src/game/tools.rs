//! Function tools offered to the model.
//!
//! Each tool is a plain struct whose schema comes from `#[derive(Tool)]`.
//! [`GameTools::execute`] dispatches a model tool call to the dice roller,
//! the character sheets or the session log.

use super::characters::{CharacterManager, UpdateType};
use super::dice::DiceRoller;
use crate::session::SessionLog;
use dm_macros::Tool;
use llm::{ToolCall, ToolResult};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Roll dice for D&D gameplay. Use this when players need to make ability checks, attack rolls, damage rolls, or any other dice-based mechanics.
#[derive(Debug, Tool, Deserialize)]
#[tool(name = "roll_dice")]
pub struct RollDice {
    /// Number of dice to roll (1-20)
    #[tool(min = 1, max = 20)]
    pub number_of_dice: u32,
    /// Type of dice (4, 6, 8, 10, 12, 20, 100)
    #[tool(choices = "4,6,8,10,12,20,100")]
    pub dice_type: u32,
    /// Modifier to add or subtract from the roll (default 0)
    #[tool(optional, min = -1000, max = 1000)]
    #[serde(default)]
    pub modification_int: i32,
}

/// Update character stats, inventory, status, or other information
#[derive(Debug, Tool, Deserialize)]
#[tool(name = "update_character")]
pub struct UpdateCharacter {
    /// Name of the character to update
    pub character_name: String,
    /// Type of update to perform
    #[tool(choices = "hp,inventory,status,relationship,location")]
    pub update_type: String,
    /// Data to update (structure depends on update_type)
    #[serde(default)]
    pub update_data: Map<String, Value>,
}

/// Retrieve current information about a character or NPC
#[derive(Debug, Tool, Deserialize)]
#[tool(name = "get_character_info")]
pub struct GetCharacterInfo {
    /// Name of the character to look up
    pub character_name: String,
}

/// End the current D&D session and create a summary
#[derive(Debug, Tool, Deserialize)]
#[tool(name = "end_session")]
pub struct EndSession {}

/// Executes tool calls against live game state.
pub struct GameTools {
    roller: DiceRoller,
}

impl GameTools {
    pub fn new(roller: DiceRoller) -> Self {
        Self { roller }
    }

    /// Definitions sent with every tool-enabled request.
    pub fn definitions() -> Vec<llm::Tool> {
        vec![
            RollDice::as_tool(),
            UpdateCharacter::as_tool(),
            GetCharacterInfo::as_tool(),
            EndSession::as_tool(),
        ]
    }

    /// Run one tool call. Failures come back as error results for the model.
    pub async fn execute(
        &self,
        call: &ToolCall,
        session: &mut SessionLog,
        characters: &mut CharacterManager,
    ) -> ToolResult {
        debug!(tool = %call.name, arguments = %call.arguments, "executing tool");
        let result = match call.name.as_str() {
            "roll_dice" => self.roll_dice(&call.arguments, session).await,
            "update_character" => update_character(&call.arguments, characters).await,
            "get_character_info" => get_character_info(&call.arguments, characters).await,
            "end_session" => {
                let result = session.end_session().await.map_err(|e| e.to_string());
                if result.is_ok() {
                    characters.set_session_id(None);
                }
                result
            }
            other => Err(format!("Unknown function: {other}")),
        };

        match result {
            Ok(content) => ToolResult::success(content),
            Err(message) => {
                warn!(tool = %call.name, error = %message, "tool call failed");
                ToolResult::error(format!("Error executing {}: {message}", call.name))
            }
        }
    }

    async fn roll_dice(&self, arguments: &Value, session: &SessionLog) -> Result<String, String> {
        let args = RollDice::from_arguments(arguments).map_err(|e| e.to_string())?;
        let roll = self
            .roller
            .roll(args.number_of_dice, args.dice_type, args.modification_int)
            .map_err(|e| e.to_string())?;
        session.log_dice_roll(&roll).await;
        Ok(roll.to_string())
    }
}

async fn update_character(
    arguments: &Value,
    characters: &CharacterManager,
) -> Result<String, String> {
    let args = UpdateCharacter::from_arguments(arguments).map_err(|e| e.to_string())?;
    let update_type = args
        .update_type
        .parse::<UpdateType>()
        .map_err(|e| e.to_string())?;
    characters
        .update_character(&args.character_name, update_type, &args.update_data)
        .await
        .map_err(|e| e.to_string())?;
    Ok(format!(
        "Updated {}: {} = {}",
        args.character_name,
        update_type,
        Value::Object(args.update_data)
    ))
}

async fn get_character_info(
    arguments: &Value,
    characters: &CharacterManager,
) -> Result<String, String> {
    let args = GetCharacterInfo::from_arguments(arguments).map_err(|e| e.to_string())?;
    characters
        .get_character_info(&args.character_name)
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::session::EntryType;
    use crate::store::{MemoryVectorStore, VectorStore};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryVectorStore>,
        session: SessionLog,
        characters: CharacterManager,
        tools: GameTools,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryVectorStore::new());
        Fixture {
            session: SessionLog::new(
                store.clone(),
                Arc::new(HashingEmbedder::new(32)),
                "campaign_history",
                "session_history",
            ),
            characters: CharacterManager::new(store.clone(), "character_data"),
            tools: GameTools::new(DiceRoller::default()),
            store,
        }
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_definitions() {
        let tools = GameTools::definitions();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["roll_dice", "update_character", "get_character_info", "end_session"]
        );

        let roll = &tools[0].parameters;
        assert_eq!(roll["properties"]["dice_type"]["enum"], json!([4, 6, 8, 10, 12, 20, 100]));
        assert_eq!(roll["properties"]["number_of_dice"]["maximum"], 20);
        assert_eq!(roll["required"], json!(["number_of_dice", "dice_type"]));
        assert_eq!(roll["properties"]["modification_int"]["minimum"], -1000);
        assert_eq!(roll["properties"]["modification_int"]["maximum"], 1000);

        let update = &tools[1].parameters;
        assert_eq!(update["properties"]["update_data"]["type"], "object");
        assert_eq!(tools[3].parameters["properties"], json!({}));
    }

    #[tokio::test]
    async fn test_roll_dice_logs_to_session() {
        let mut f = fixture();
        let id = f.session.start_session(None).await;

        let result = f
            .tools
            .execute(
                &call("roll_dice", json!({"number_of_dice": 2, "dice_type": 6, "modification_int": 3})),
                &mut f.session,
                &mut f.characters,
            )
            .await;
        assert!(!result.is_error, "{}", result.content);
        assert!(result.content.starts_with("Rolling 2d6+3: ["));

        let entries = f.session.entries(&id).await.unwrap();
        let roll = entries
            .iter()
            .find(|e| e.entry_type == EntryType::DiceRoll)
            .unwrap();
        assert_eq!(roll.content, result.content);
        assert_eq!(roll.dice_data.as_ref().unwrap().rolls.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_roll_is_error_result() {
        let mut f = fixture();
        let result = f
            .tools
            .execute(
                &call("roll_dice", json!({"number_of_dice": 1, "dice_type": 7})),
                &mut f.session,
                &mut f.characters,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Invalid dice type: d7"));

        let result = f
            .tools
            .execute(
                &call(
                    "roll_dice",
                    json!({"number_of_dice": 1, "dice_type": 20, "modification_int": i32::MAX}),
                ),
                &mut f.session,
                &mut f.characters,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Invalid modifier"));
    }

    #[tokio::test]
    async fn test_update_and_get_character() {
        let mut f = fixture();
        let result = f
            .tools
            .execute(
                &call(
                    "update_character",
                    json!({
                        "character_name": "Ismark",
                        "update_type": "location",
                        "update_data": {"location": "Vallaki"}
                    }),
                ),
                &mut f.session,
                &mut f.characters,
            )
            .await;
        assert_eq!(result.content, r#"Updated Ismark: location = {"location":"Vallaki"}"#);

        let info = f
            .tools
            .execute(
                &call("get_character_info", json!({"character_name": "Ismark"})),
                &mut f.session,
                &mut f.characters,
            )
            .await;
        assert!(info.content.contains("**Location:** Vallaki"));
        assert_eq!(f.store.count("character_data").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_update_type() {
        let mut f = fixture();
        let result = f
            .tools
            .execute(
                &call(
                    "update_character",
                    json!({"character_name": "Ismark", "update_type": "mood", "update_data": {}}),
                ),
                &mut f.session,
                &mut f.characters,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Unknown update type"));
    }

    #[tokio::test]
    async fn test_end_session_tool() {
        let mut f = fixture();
        let without = f
            .tools
            .execute(&call("end_session", json!({})), &mut f.session, &mut f.characters)
            .await;
        assert!(without.is_error);

        f.session.start_session(Some(1)).await;
        let ended = f
            .tools
            .execute(&call("end_session", json!({})), &mut f.session, &mut f.characters)
            .await;
        assert!(!ended.is_error);
        assert!(ended.content.contains("ended"));
        assert!(f.session.current_session_id().is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_calls() {
        let mut f = fixture();
        let unknown = f
            .tools
            .execute(&call("cast_fireball", json!({})), &mut f.session, &mut f.characters)
            .await;
        assert!(unknown.is_error);
        assert!(unknown.content.contains("Unknown function: cast_fireball"));

        let malformed = f
            .tools
            .execute(
                &call("get_character_info", Value::String("{not json".into())),
                &mut f.session,
                &mut f.characters,
            )
            .await;
        assert!(malformed.is_error);
    }
}
