//! Testing utilities for the Dungeon Master.
//!
//! This module provides tools for integration testing:
//! - `MockModel` for deterministic testing without a model server
//! - `TestHarness` for scripted play sessions over an in-memory store
//! - Assertion helpers for verifying prompts and tool use

use crate::config::DmConfig;
use crate::dm::{ChatModel, DmError, DmResponse, DungeonMaster};
use crate::embedding::{Embedder, HashingEmbedder};
use crate::store::{ChunkMetadata, MemoryVectorStore, Record, VectorStore};
use async_trait::async_trait;
use llm::{FinishReason, Request, Response, ToolCall};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A scripted model reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl MockResponse {
    /// A plain text reply.
    pub fn narrative(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A reply that calls one tool.
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self::narrative("").with_tool_call(name, arguments)
    }

    pub fn with_tool_call(mut self, name: impl Into<String>, arguments: Value) -> Self {
        let id = format!("call_{}", self.tool_calls.len() + 1);
        self.tool_calls.push(ToolCall {
            id,
            name: name.into(),
            arguments,
        });
        self
    }

    fn into_response(self) -> Response {
        let finish_reason = if self.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        Response {
            id: "mock".to_string(),
            model: "mock".to_string(),
            content: self.text,
            tool_calls: self.tool_calls,
            finish_reason,
            usage: None,
        }
    }
}

/// A model that replays scripted responses and records every request.
///
/// Once the script runs out it answers with a fixed line.
#[derive(Default)]
pub struct MockModel {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<Request>>,
}

impl MockModel {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, response: MockResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next(&self, request: Request) -> Response {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| MockResponse::narrative("The DM has no more scripted responses."))
            .into_response()
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn complete(&self, request: Request) -> Result<Response, llm::Error> {
        Ok(self.next(request))
    }

    async fn stream_complete(
        &self,
        request: Request,
        on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Response, llm::Error> {
        let response = self.next(request);
        for word in response.content.split_inclusive(' ') {
            on_text(word);
        }
        Ok(response)
    }
}

/// Test harness for running scripted sessions.
pub struct TestHarness {
    pub dm: DungeonMaster,
    pub model: Arc<MockModel>,
    pub store: Arc<MemoryVectorStore>,
    pub embedder: Arc<HashingEmbedder>,
    pub config: DmConfig,
}

impl TestHarness {
    /// In-memory store, hashing embedder and default configuration.
    pub fn new() -> Self {
        Self::with_config(DmConfig::default())
    }

    pub fn with_config(config: DmConfig) -> Self {
        let model = Arc::new(MockModel::default());
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(HashingEmbedder::default());
        let dm = DungeonMaster::new(model.clone(), store.clone(), embedder.clone(), config.clone());
        Self {
            dm,
            model,
            store,
            embedder,
            config,
        }
    }

    /// Queue a narrative response.
    pub fn expect_narrative(&mut self, text: impl Into<String>) -> &mut Self {
        self.model.queue(MockResponse::narrative(text));
        self
    }

    /// Queue a response.
    pub fn expect_response(&mut self, response: MockResponse) -> &mut Self {
        self.model.queue(response);
        self
    }

    /// Embed and store a campaign chunk.
    pub async fn add_campaign_chunk(&self, id: &str, text: &str, metadata: ChunkMetadata) {
        let collection = self.config.database.campaign_collection.clone();
        self.add(&collection, id, text, metadata).await;
    }

    /// Embed and store a past-session summary section.
    pub async fn add_session_history(&self, id: &str, text: &str, metadata: ChunkMetadata) {
        let collection = self.config.database.session_history_collection.clone();
        self.add(&collection, id, text, metadata).await;
    }

    async fn add(&self, collection: &str, id: &str, text: &str, metadata: ChunkMetadata) {
        let embedding = self.embedder.embed_text(text);
        let record = Record::new(id, text, metadata).with_embedding(embedding);
        if let Err(e) = self.store.add(collection, vec![record]).await {
            panic!("failed to seed {collection}: {e}");
        }
    }

    /// Start a session, collecting the opening narration.
    pub async fn start(&mut self) -> String {
        match self.dm.start_session(|_| {}).await {
            Ok(opening) => opening,
            Err(e) => panic!("session failed to start: {e}"),
        }
    }

    /// Send player input, collecting the streamed text as well.
    pub async fn input(&mut self, text: &str) -> Result<(DmResponse, String), DmError> {
        let mut streamed = String::new();
        let response = self
            .dm
            .process_input(text, |chunk| streamed.push_str(chunk))
            .await?;
        Ok((response, streamed))
    }

    /// The user message of the most recent request.
    pub fn last_prompt(&self) -> Option<String> {
        self.model.requests().last().and_then(|request| {
            request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == llm::Role::User)
                .map(|m| m.content.clone())
        })
    }

    /// Embedder shared with the DM.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert the latest prompt sent to the model contains `needle`.
#[track_caller]
pub fn assert_prompt_contains(harness: &TestHarness, needle: &str) {
    let prompt = harness.last_prompt().unwrap_or_default();
    assert!(
        prompt.contains(needle),
        "Expected prompt to contain '{needle}', got:\n{prompt}"
    );
}

/// Assert the latest prompt sent to the model does NOT contain `needle`.
#[track_caller]
pub fn assert_prompt_lacks(harness: &TestHarness, needle: &str) {
    let prompt = harness.last_prompt().unwrap_or_default();
    assert!(
        !prompt.contains(needle),
        "Expected prompt to not contain '{needle}', got:\n{prompt}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_model_replays_script() {
        let model = MockModel::new(vec![
            MockResponse::tool_call("roll_dice", json!({"number_of_dice": 1, "dice_type": 20})),
            MockResponse::narrative("The door creaks open."),
        ]);

        let first = model.complete(Request::new(Vec::new())).await.unwrap();
        assert_eq!(first.finish_reason, FinishReason::ToolCalls);
        assert_eq!(first.tool_calls[0].id, "call_1");

        let mut streamed = String::new();
        let second = model
            .stream_complete(Request::new(Vec::new()), &mut |t: &str| streamed.push_str(t))
            .await
            .unwrap();
        assert_eq!(second.content, "The door creaks open.");
        assert_eq!(streamed, second.content);

        let exhausted = model.complete(Request::new(Vec::new())).await.unwrap();
        assert!(exhausted.content.contains("no more scripted"));
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_harness_turn() {
        let mut harness = TestHarness::new();
        harness
            .expect_narrative("Mist curls around the gates of Barovia.")
            .expect_narrative("The innkeeper eyes you warily.");

        let opening = harness.start().await;
        assert!(opening.contains("Barovia"));

        let (response, streamed) = harness.input("I enter the Blood of the Vine tavern").await.unwrap();
        assert_eq!(response.narrative, "The innkeeper eyes you warily.");
        assert_eq!(streamed, response.narrative);
        assert_prompt_contains(&harness, "I enter the Blood of the Vine tavern");
    }
}
