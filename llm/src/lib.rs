//! Minimal OpenAI-compatible API client.
//!
//! This crate provides a focused client for servers speaking the OpenAI
//! chat completions protocol (llama.cpp, Ollama, vLLM, OpenAI itself) with:
//! - Non-streaming and streaming completions
//! - Function tool calls, including streamed tool-call deltas
//! - Proper SSE parsing for streaming responses
//! - The embeddings endpoint

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL: &str = "llama.cpp";

/// Errors that can occur when using the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Chat completions and embeddings client.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl Client {
    /// Create a client for the server at `base_url` (e.g. `http://localhost:11434/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a completion request and return the full response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let api_request = self.build_api_request(&request, false);
        let response = self.post("chat/completions", &api_request).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        parse_response(api_response)
    }

    /// Send a completion request and stream the response.
    pub async fn stream(
        &self,
        request: Request,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>, Error> {
        let api_request = self.build_api_request(&request, true);
        let response = self.post("chat/completions", &api_request).await?;

        // Bytes are buffered until a full line arrives; a chunk may end inside
        // a multibyte character
        let stream = response
            .bytes_stream()
            .scan(Vec::new(), |buffer: &mut Vec<u8>, result| {
                let events = match result {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        parse_sse_events_buffered(buffer)
                    }
                    Err(e) => vec![Err(Error::Network(e.to_string()))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    /// Stream a completion and fold it back into a full [`Response`],
    /// handing each text fragment to `on_text` as it arrives.
    pub async fn stream_collect<F>(&self, request: Request, mut on_text: F) -> Result<Response, Error>
    where
        F: FnMut(&str),
    {
        let mut stream = self.stream(request).await?;
        let mut acc = StreamAccumulator::default();
        while let Some(event) = stream.next().await {
            let event = event?;
            if let StreamEvent::Error { message } = &event {
                return Err(Error::Api {
                    status: 0,
                    message: message.clone(),
                });
            }
            if let StreamEvent::TextDelta { text } = &event {
                on_text(text);
            }
            let done = matches!(event, StreamEvent::Done);
            acc.push(event);
            if done {
                break;
            }
        }
        Ok(acc.finish())
    }

    /// Embed a batch of inputs, returning one vector per input in order.
    pub async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let api_request = ApiEmbeddingRequest {
            model: model.to_string(),
            input: inputs.to_vec(),
        };
        let response = self.post("embeddings", &api_request).await?;
        let api_response: ApiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        let mut data = api_response.data;
        data.sort_by_key(|d| d.index);
        if data.len() != inputs.len() {
            return Err(Error::Parse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                data.len()
            )));
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response, Error> {
        let headers = self.build_headers()?;
        let url = format!("{}/{path}", self.base_url);
        tracing::debug!(%url, "sending request");

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }
        Ok(response)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
            );
        }
        Ok(headers)
    }

    fn build_api_request(&self, request: &Request, stream: bool) -> ApiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system",
                content: Some(system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        messages.extend(request.messages.iter().map(ApiMessage::from));

        let tools: Option<Vec<ApiTool>> = request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| ApiTool {
                    r#type: "function",
                    function: ApiFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect()
        });

        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            max_tokens: request.max_tokens,
            messages,
            temperature: request.temperature,
            tools,
            tool_choice: request.tool_choice.as_ref().map(|tc| match tc {
                ToolChoice::Auto => serde_json::json!("auto"),
                ToolChoice::None => serde_json::json!("none"),
                ToolChoice::Required => serde_json::json!("required"),
                ToolChoice::Function { name } => serde_json::json!({
                    "type": "function",
                    "function": { "name": name }
                }),
            }),
            stream,
        }
    }
}

fn parse_response(api_response: ApiResponse) -> Result<Response, Error> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("response contained no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| ToolCall {
            id: c.id,
            name: c.function.name,
            arguments: parse_arguments(&c.function.arguments),
        })
        .collect();

    Ok(Response {
        id: api_response.id.unwrap_or_default(),
        model: api_response.model.unwrap_or_default(),
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        finish_reason: choice
            .finish_reason
            .as_deref()
            .map(FinishReason::from_api)
            .unwrap_or(FinishReason::Stop),
        usage: api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
    })
}

/// Tool arguments arrive as a JSON-encoded string. Malformed arguments are
/// kept as a raw string so the executor can report them.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

// ============================================================================
// Public types
// ============================================================================

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<ToolChoice>,
}

impl Request {
    /// Create a new request with the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            max_tokens: 500,
            system: None,
            messages,
            temperature: None,
            tools: None,
            tool_choice: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool calls requested by the assistant in this turn.
    pub tool_calls: Vec<ToolCall>,
    /// Set on [`Role::Tool`] messages: the call this message answers.
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// Create a user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Create an assistant message with text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// An assistant turn that requested tool calls.
    pub fn assistant_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// The result of a tool call, answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A function tool definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// Tool choice configuration.
#[derive(Debug, Clone)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Function { name: String },
}

/// A completion response.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

impl Response {
    /// Get the text content.
    pub fn text(&self) -> &str {
        &self.content
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

impl FinishReason {
    fn from_api(s: &str) -> Self {
        match s {
            "length" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

// ============================================================================
// Streaming types
// ============================================================================

/// Events from a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start {
        id: String,
        model: String,
    },
    TextDelta {
        text: String,
    },
    /// A fragment of a tool call. `id` and `name` usually arrive only on the
    /// first fragment for a given `index`; `arguments` is concatenated.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    Finish {
        finish_reason: FinishReason,
    },
    Done,
    Error {
        message: String,
    },
}

/// Folds stream events into a complete [`Response`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    id: String,
    model: String,
    content: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAccumulator {
    pub fn push(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Start { id, model } => {
                if self.id.is_empty() {
                    self.id = id;
                    self.model = model;
                }
            }
            StreamEvent::TextDelta { text } => self.content.push_str(&text),
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let call = self.tool_calls.entry(index).or_default();
                if let Some(id) = id {
                    call.id = id;
                }
                if let Some(name) = name {
                    call.name.push_str(&name);
                }
                call.arguments.push_str(&arguments);
            }
            StreamEvent::Finish { finish_reason } => self.finish_reason = Some(finish_reason),
            StreamEvent::Done | StreamEvent::Error { .. } => {}
        }
    }

    pub fn finish(self) -> Response {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .filter(|(_, c)| !c.name.is_empty())
            .map(|(index, c)| ToolCall {
                id: if c.id.is_empty() {
                    format!("call_{index}")
                } else {
                    c.id
                },
                name: c.name,
                arguments: parse_arguments(&c.arguments),
            })
            .collect();
        let finish_reason = match self.finish_reason {
            Some(reason) => reason,
            None if !tool_calls.is_empty() => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };
        Response {
            id: self.id,
            model: self.model,
            content: self.content,
            tool_calls,
            finish_reason,
            usage: None,
        }
    }
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for ApiMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|c| ApiToolCallOut {
                        id: c.id.clone(),
                        r#type: "function",
                        function: ApiFunctionCallOut {
                            name: c.name.clone(),
                            arguments: c.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };
        ApiMessage {
            role: message.role.as_str(),
            content: Some(message.content.clone()),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiToolCallOut {
    id: String,
    r#type: &'static str,
    function: ApiFunctionCallOut,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCallOut {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    r#type: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCallIn>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallIn {
    id: String,
    function: ApiFunctionCallIn,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCallIn {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ApiEmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbeddingResponse {
    data: Vec<ApiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedding {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

// Streaming types
#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ApiFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Parse SSE events from a buffer, consuming complete lines and leaving incomplete data.
///
/// Each `data:` line carries one JSON chunk (or the `[DONE]` sentinel). Complete
/// lines are parsed and removed from the buffer; a trailing partial line is left
/// for the next network chunk.
fn parse_sse_events_buffered(buffer: &mut Vec<u8>) -> Vec<Result<StreamEvent, Error>> {
    let mut events = Vec::new();

    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\n', '\r']);

        if let Some(json_str) = line.strip_prefix("data:").map(str::trim_start) {
            if json_str == "[DONE]" {
                events.push(Ok(StreamEvent::Done));
            } else if !json_str.is_empty() {
                match serde_json::from_str::<ApiStreamChunk>(json_str) {
                    Ok(chunk) => events.extend(convert_stream_chunk(chunk).into_iter().map(Ok)),
                    Err(e) => events.push(Err(Error::Parse(format!("SSE parse error: {e}")))),
                }
            }
        }
        // Skip event: lines, comments, and other SSE metadata
    }

    events
}

fn convert_stream_chunk(chunk: ApiStreamChunk) -> Vec<StreamEvent> {
    if let Some(error) = chunk.error {
        return vec![StreamEvent::Error {
            message: error.message,
        }];
    }

    let mut events = Vec::new();
    if let (Some(id), Some(model)) = (chunk.id, chunk.model) {
        events.push(StreamEvent::Start { id, model });
    }

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextDelta { text });
        }
        for call in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            events.push(StreamEvent::ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            });
        }
        if let Some(reason) = choice.finish_reason {
            events.push(StreamEvent::Finish {
                finish_reason: FinishReason::from_api(&reason),
            });
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Client::new("http://localhost:8080/v1/");
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert!(client.api_key.is_none());
    }

    #[test]
    fn test_client_with_model() {
        let client = Client::new(DEFAULT_BASE_URL).with_model("mistral");
        assert_eq!(client.model(), "mistral");
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new(vec![Message::user("Hello")])
            .with_system("You are a helpful assistant")
            .with_max_tokens(1000)
            .with_temperature(0.7);

        assert_eq!(request.max_tokens, 1000);
        assert!(request.system.is_some());
        assert_eq!(request.temperature, Some(0.7));
        assert!(!request.has_tools());
    }

    #[test]
    fn test_system_prompt_is_first_message() {
        let client = Client::new(DEFAULT_BASE_URL);
        let request = Request::new(vec![Message::user("Hi")]).with_system("Be terse");
        let api = client.build_api_request(&request, false);
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hi");
        assert_eq!(json["model"], DEFAULT_MODEL);
    }

    #[test]
    fn test_tool_serialization() {
        let client = Client::new(DEFAULT_BASE_URL);
        let tool = Tool {
            name: "roll_dice".to_string(),
            description: "Roll dice".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        };
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "roll_dice".to_string(),
            arguments: serde_json::json!({"count": 2}),
        };
        let request = Request::new(vec![
            Message::user("roll"),
            Message::assistant_tool_calls("", vec![call]),
            Message::tool("call_1", "7"),
        ])
        .with_tools(vec![tool])
        .with_tool_choice(ToolChoice::Auto);

        let json = serde_json::to_value(client.build_api_request(&request, true)).unwrap();
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "roll_dice");
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(
            json["messages"][1]["tool_calls"][0]["function"]["arguments"],
            "{\"count\":2}"
        );
        assert_eq!(json["messages"][2]["tool_call_id"], "call_1");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let raw = r#"{
            "id": "abc",
            "model": "local",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "roll_dice", "arguments": "{\"sides\": 20}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let response = parse_response(api).unwrap();
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls[0].arguments["sides"], 20);
        assert_eq!(response.text(), "");
    }

    #[test]
    fn test_malformed_arguments_kept_raw() {
        assert_eq!(
            parse_arguments("{not json"),
            serde_json::Value::String("{not json".to_string())
        );
        assert!(parse_arguments("").is_object());
    }

    #[test]
    fn test_sse_buffering_waits_for_complete_line() {
        let mut buffer = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel".to_vec();
        assert!(parse_sse_events_buffered(&mut buffer).is_empty());

        buffer.extend_from_slice(b"lo\"}}]}\n\ndata: [DONE]\n");
        let events: Vec<_> = parse_sse_events_buffered(&mut buffer)
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta {
                    text: "Hello".to_string()
                },
                StreamEvent::Done
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_sse_multibyte_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"Ireena \u{2014} Kolyana\"}}]}\n";
        let bytes = line.as_bytes();
        let dash = line.find('\u{2014}').unwrap();

        // Split inside the three-byte dash
        let mut buffer = bytes[..dash + 1].to_vec();
        assert!(parse_sse_events_buffered(&mut buffer).is_empty());
        buffer.extend_from_slice(&bytes[dash + 1..]);

        let events: Vec<_> = parse_sse_events_buffered(&mut buffer)
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta {
                text: "Ireena \u{2014} Kolyana".to_string()
            }]
        );
    }

    #[test]
    fn test_accumulator_joins_tool_call_fragments() {
        let mut acc = StreamAccumulator::default();
        acc.push(StreamEvent::ToolCallDelta {
            index: 0,
            id: Some("call_a".to_string()),
            name: Some("roll_dice".to_string()),
            arguments: "{\"co".to_string(),
        });
        acc.push(StreamEvent::ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: "unt\": 3}".to_string(),
        });
        acc.push(StreamEvent::TextDelta {
            text: "Rolling".to_string(),
        });
        let response = acc.finish();
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "call_a");
        assert_eq!(response.tool_calls[0].arguments["count"], 3);
        assert_eq!(response.content, "Rolling");
    }

    #[test]
    fn test_tool_result() {
        let success = ToolResult::success("worked");
        assert!(!success.is_error);
        assert_eq!(success.content, "worked");

        let error = ToolResult::error("failed");
        assert!(error.is_error);
        assert_eq!(error.content, "failed");
    }
}
