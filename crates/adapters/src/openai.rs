//! OpenAI Chat Completions adapter.
//!
//! Works with OpenAI and any server exposing an OpenAI-compatible
//! `/chat/completions` endpoint (Ollama, vLLM, OpenRouter, ...).
//!
//! Supports:
//! - Streaming chat with function calling
//! - Summarization through a non-streaming completion
//! - Embeddings via `/embeddings`

use async_trait::async_trait;
use chatrelay_core::{
    Adapter, AdapterError, ChatOptions, ChunkStream, EmbeddingOptions, EmbeddingResult, Envelope,
    ModelMessage, Role, SummarizationOptions, SummarizationResult, Tool, Usage, generate_id,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::AdapterConfig;
use crate::http::{check_status, error_stream, map_send_error, spawn_stream};
use crate::stream::OpenAiStreamConverter;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini", "o4-mini"];
const EMBEDDING_MODELS: &[&str] = &[
    "text-embedding-3-small",
    "text-embedding-3-large",
    "text-embedding-ada-002",
];

/// An OpenAI-compatible chat adapter.
pub struct OpenAiAdapter {
    name: String,
    base_url: String,
    config: AdapterConfig,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self::named("openai", config)
    }

    /// An adapter for an OpenAI-compatible server under another name.
    pub fn named(name: impl Into<String>, config: AdapterConfig) -> Self {
        Self {
            name: name.into(),
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            client: config.build_client(),
            config,
        }
    }

    fn post(&self, path: &str, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json");
        if !self.config.api_key.is_empty() {
            req = req.bearer_auth(&self.config.api_key);
        }
        for (name, value) in &self.config.headers {
            req = req.header(name, value);
        }
        req.json(body)
    }

    /// Build the streaming request body for one round.
    pub fn build_body(options: &ChatOptions) -> Value {
        let generation = &options.generation;
        let mut body = serde_json::json!({
            "model": options.model,
            "messages": format_messages(&options.messages_with_system()),
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if let Some(temperature) = generation.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = generation.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(max_tokens) = generation.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !generation.stop.is_empty() {
            body["stop"] = serde_json::json!(generation.stop);
        }
        if !options.tools.is_empty() {
            body["tools"] = serde_json::json!(format_tools(&options.tools));
        }
        if let Value::Object(map) = &mut body {
            for (key, value) in &options.provider_options {
                map.insert(key.clone(), value.clone());
            }
        }
        body
    }
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn embedding_models(&self) -> Vec<String> {
        EMBEDDING_MODELS.iter().map(|m| m.to_string()).collect()
    }

    async fn chat_stream(&self, options: &ChatOptions) -> ChunkStream {
        let envelope = Envelope::new(generate_id(&self.name), &options.model);
        let body = Self::build_body(options);

        debug!(
            adapter = %self.name,
            model = %options.model,
            messages = options.messages.len(),
            tools = options.tools.len(),
            "Sending streaming request"
        );

        let response = match self
            .post("/chat/completions", &body)
            .header("Accept", "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return error_stream(&envelope, &map_send_error(e)),
        };
        let response = match check_status(&self.name, response).await {
            Ok(response) => response,
            Err(err) => return error_stream(&envelope, &err),
        };

        spawn_stream(
            response,
            OpenAiStreamConverter::new(envelope),
            options.cancel.clone(),
        )
    }

    async fn summarize(
        &self,
        options: &SummarizationOptions,
    ) -> Result<SummarizationResult, AdapterError> {
        let body = serde_json::json!({
            "model": options.model,
            "messages": [
                {"role": "system", "content": options.instruction()},
                {"role": "user", "content": options.text},
            ],
            "max_tokens": options.max_tokens(),
        });

        debug!(adapter = %self.name, model = %options.model, "Sending summarize request");

        let response = self
            .post("/chat/completions", &body)
            .send()
            .await
            .map_err(map_send_error)?;
        let response = check_status(&self.name, response).await?;
        let api_resp: CompletionResponse = response.json().await.map_err(|e| {
            AdapterError::InvalidResponse(format!("Failed to parse completion response: {e}"))
        })?;

        let summary = api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        let usage = api_resp
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(SummarizationResult {
            id: api_resp.id.unwrap_or_else(|| generate_id(&self.name)),
            model: api_resp.model.unwrap_or_else(|| options.model.clone()),
            summary,
            usage,
        })
    }

    async fn create_embeddings(
        &self,
        options: &EmbeddingOptions,
    ) -> Result<EmbeddingResult, AdapterError> {
        let mut body = serde_json::json!({
            "model": options.model,
            "input": options.input,
            "encoding_format": "float",
        });
        if let Some(dimensions) = options.dimensions {
            body["dimensions"] = serde_json::json!(dimensions);
        }

        debug!(
            adapter = %self.name,
            model = %options.model,
            count = options.input.len(),
            "Sending embedding request"
        );

        let response = self
            .post("/embeddings", &body)
            .send()
            .await
            .map_err(map_send_error)?;
        let response = check_status(&self.name, response).await?;
        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            AdapterError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        let mut data = api_resp.data;
        data.sort_by_key(|d| d.index);

        Ok(EmbeddingResult {
            id: generate_id(&self.name),
            model: api_resp.model,
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
            usage: api_resp
                .usage
                .map(|u| Usage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: 0,
                    total_tokens: u.total_tokens,
                })
                .unwrap_or_default(),
        })
    }
}

/// Convert messages to OpenAI format.
pub fn format_messages(messages: &[ModelMessage]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
                Role::System => "system".into(),
                Role::Tool => "tool".into(),
            },
            content: match (m.role, m.content.as_ref()) {
                (Role::Assistant, None) if !m.tool_calls.is_empty() => None,
                (_, content) => Some(content.cloned().unwrap_or_default()),
            },
            name: m.name.clone(),
            tool_calls: (!m.tool_calls.is_empty()).then(|| {
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.function.name.clone(),
                            arguments: tc.function.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

/// Convert tools to OpenAI function-tool format.
pub fn format_tools(tools: &[Tool]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|tool| {
            let def = tool.definition();
            ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: def.name,
                    description: def.description,
                    parameters: def.parameters,
                },
            }
        })
        .collect()
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiToolCall {
    pub id: String,
    pub r#type: String,
    pub function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiToolDefinition {
    pub r#type: String,
    pub function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
    #[serde(default)]
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}
