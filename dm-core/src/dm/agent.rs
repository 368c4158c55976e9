//! The AI Dungeon Master.
//!
//! [`DungeonMaster`] ties one play session together: it logs each player
//! turn, retrieves context for it, asks the model for a reply, and runs any
//! tool calls the model makes before it answers in prose.

use super::model::ChatModel;
use crate::config::DmConfig;
use crate::embedding::Embedder;
use crate::game::{CharacterManager, DiceRoller, GameTools};
use crate::retrieval::ContextRetriever;
use crate::session::{SessionError, SessionLog};
use crate::store::VectorStore;
use crate::world_state::{WorldStateError, WorldStateStore};
use llm::{Message, Request, Response, Role, ToolChoice, ToolResult};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = include_str!("prompts/system.txt");
const OPENING_NEW: &str = include_str!("prompts/opening_new.txt");
const OPENING_RETURNING: &str = include_str!("prompts/opening_returning.txt");

const ROLL_NUDGE: &str = "Consider whether the player has been asked to roll recently and whether a roll now would improve the scene.";

const RECAP_QUERY: &str = "What happened in our last session?";

const FALLBACK_OPENING: &str =
    "Welcome to Barovia. The mists part before you and the road runs on into the dark. What would you like to do first?";

/// Errors from the DM agent.
#[derive(Debug, Error)]
pub enum DmError {
    #[error("Model error: {0}")]
    Model(#[from] llm::Error),

    #[error("World state error: {0}")]
    WorldState(#[from] WorldStateError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Input is empty")]
    EmptyInput,
}

/// Result of one player turn.
#[derive(Debug, Clone)]
pub struct DmResponse {
    pub narrative: String,
    pub tool_results: Vec<ToolResult>,
    /// Set when the model ended the session through its tool.
    pub session_ended: bool,
}

/// The AI Dungeon Master.
pub struct DungeonMaster {
    model: Arc<dyn ChatModel>,
    config: DmConfig,
    retriever: ContextRetriever,
    world: Arc<Mutex<WorldStateStore>>,
    session: SessionLog,
    characters: CharacterManager,
    tools: GameTools,
    history: Vec<Message>,
}

impl DungeonMaster {
    pub fn new(
        model: Arc<dyn ChatModel>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: DmConfig,
    ) -> Self {
        let db = &config.database;
        let world = Arc::new(Mutex::new(WorldStateStore::new(
            store.clone(),
            embedder.clone(),
            db.world_state_collection.clone(),
        )));
        let retriever = ContextRetriever::new(store.clone(), embedder.clone(), world.clone(), &config);
        let session = SessionLog::new(
            store.clone(),
            embedder,
            db.current_session_collection.clone(),
            db.session_history_collection.clone(),
        );
        let characters = CharacterManager::new(store, db.character_collection.clone());
        let tools = GameTools::new(DiceRoller::new(
            config.game.max_dice_count,
            config.game.valid_dice_types.clone(),
        ));

        Self {
            model,
            config,
            retriever,
            world,
            session,
            characters,
            tools,
            history: Vec::new(),
        }
    }

    pub fn retriever(&self) -> &ContextRetriever {
        &self.retriever
    }

    /// Shared handle to the world state.
    pub fn world(&self) -> Arc<Mutex<WorldStateStore>> {
        self.world.clone()
    }

    pub fn session(&self) -> &SessionLog {
        &self.session
    }

    pub fn characters(&self) -> &CharacterManager {
        &self.characters
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.current_session_id()
    }

    /// Conversation sent to the model, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Start a session and narrate the opening scene.
    ///
    /// The opening is a recap when earlier sessions exist and an introduction
    /// otherwise. A model failure falls back to a stock greeting.
    pub async fn start_session<F>(&mut self, mut on_text: F) -> Result<String, DmError>
    where
        F: FnMut(&str) + Send,
    {
        let (session_number, world_summary, returning) = {
            let mut world = self.world.lock().await;
            let previous = world.state().await?.total_sessions_played;
            let number = previous + 1;
            world.start_new_session(number).await?;
            (number, world.get_current_context_summary().await?, previous > 0)
        };

        let session_id = self.session.start_session(Some(session_number)).await;
        self.characters.set_session_id(Some(session_id.clone()));
        self.history.clear();

        let recap = self
            .retriever
            .get_relevant_context(RECAP_QUERY, Some(3), None)
            .await;
        let prompt = if returning || !recap.is_empty() {
            format!("{OPENING_RETURNING}\n\n{world_summary}\n\n{recap}")
        } else {
            format!("{OPENING_NEW}\n\n{world_summary}")
        };

        let request = self.request(vec![Message::user(prompt)], false);
        let opening = match self.send(request, &mut on_text).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => {
                on_text(FALLBACK_OPENING);
                FALLBACK_OPENING.to_string()
            }
            Err(e) => {
                warn!(error = %e, "opening narration failed");
                on_text(FALLBACK_OPENING);
                FALLBACK_OPENING.to_string()
            }
        };

        self.session.log_dm_response(&opening).await;
        self.history.push(Message::assistant(&opening));
        info!(%session_id, session_number, "session opened");
        Ok(opening)
    }

    /// Run one player turn.
    ///
    /// Narrative text is handed to `on_text` as it is produced, streamed when
    /// streaming is enabled.
    pub async fn process_input<F>(&mut self, input: &str, mut on_text: F) -> Result<DmResponse, DmError>
    where
        F: FnMut(&str) + Send,
    {
        let input = input.trim();
        if input.is_empty() {
            return Err(DmError::EmptyInput);
        }

        self.session.log_player_input(input).await;

        let context = self
            .retriever
            .get_relevant_context(input, None, self.session.current_session_id())
            .await;
        debug!(context_chars = context.len(), "context attached to turn");

        self.history.push(Message::user(compose_turn(input, &context)));
        self.trim_history();

        let mut narrative = String::new();
        let mut tool_results = Vec::new();
        let mut session_ended = false;
        let max_rounds = self.config.game.max_tool_rounds;

        for round in 0..=max_rounds {
            let offer_tools = round < max_rounds;
            let request = self.request(self.history.clone(), offer_tools);
            let response = self.send(request, &mut on_text).await?;

            if !response.content.trim().is_empty() {
                if !narrative.is_empty() {
                    narrative.push('\n');
                }
                narrative.push_str(&response.content);
            }

            if !response.has_tool_calls() {
                break;
            }

            self.history.push(Message::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                let result = self
                    .tools
                    .execute(call, &mut self.session, &mut self.characters)
                    .await;
                if call.name == "end_session" && !result.is_error {
                    session_ended = true;
                }
                self.history.push(Message::tool(call.id.clone(), result.content.clone()));
                tool_results.push(result);
            }
        }

        self.session.log_dm_response(&narrative).await;
        self.history.push(Message::assistant(&narrative));

        Ok(DmResponse {
            narrative,
            tool_results,
            session_ended,
        })
    }

    /// End the session from outside the model, e.g. on quit.
    pub async fn end_session(&mut self) -> Result<String, DmError> {
        let message = self.session.end_session().await?;
        self.characters.set_session_id(None);
        Ok(message)
    }

    fn request(&self, messages: Vec<Message>, with_tools: bool) -> Request {
        let ai = &self.config.ai;
        let mut request = Request::new(messages)
            .with_model(&ai.model_name)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(ai.max_tokens)
            .with_temperature(ai.temperature);
        if with_tools {
            request = request
                .with_tools(GameTools::definitions())
                .with_tool_choice(ToolChoice::Auto);
        }
        request
    }

    /// Stream when allowed, otherwise complete and emit the text at once.
    async fn send<F>(&self, request: Request, on_text: &mut F) -> Result<Response, DmError>
    where
        F: FnMut(&str) + Send,
    {
        let ai = &self.config.ai;
        let stream = ai.enable_streaming && !(request.has_tools() && ai.streaming_fallback_on_tools);

        if stream {
            Ok(self.model.stream_complete(request, on_text).await?)
        } else {
            let response = self.model.complete(request).await?;
            if !response.content.is_empty() {
                on_text(&response.content);
            }
            Ok(response)
        }
    }

    /// Keep the most recent turns, never starting on an orphaned tool reply.
    fn trim_history(&mut self) {
        let limit = self.config.game.conversation_history_limit.max(1);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
        while self.history.first().is_some_and(|m| m.role == Role::Tool) {
            self.history.remove(0);
        }
    }
}

fn compose_turn(input: &str, context: &str) -> String {
    if context.is_empty() {
        format!("{input}\n\n{ROLL_NUDGE}")
    } else {
        format!("{input}\n\nRelevant information:\n{context}\n\n{ROLL_NUDGE}")
    }
}
