//! Anthropic Messages API adapter.
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE, normalized by [`AnthropicStreamConverter`]

use async_trait::async_trait;
use chatrelay_core::{
    Adapter, AdapterError, ChatOptions, ChunkStream, Envelope, ModelMessage, Role,
    SummarizationOptions, SummarizationResult, Tool, Usage, generate_id,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::AdapterConfig;
use crate::http::{check_status, error_stream, map_send_error, spawn_stream};
use crate::stream::AnthropicStreamConverter;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

const MODELS: &[&str] = &[
    "claude-sonnet-4-5",
    "claude-opus-4-1",
    "claude-haiku-4-5",
    "claude-sonnet-4-20250514",
    "claude-3-5-haiku-20241022",
];

/// Anthropic native Messages API adapter.
pub struct AnthropicAdapter {
    base_url: String,
    config: AdapterConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            client: config.build_client(),
            config,
        }
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json");
        for (name, value) in &self.config.headers {
            req = req.header(name, value);
        }
        req.json(body)
    }

    /// Build the streaming request body for one round.
    pub fn build_body(options: &ChatOptions) -> Value {
        let (system, messages) = format_messages(&options.messages_with_system());
        let generation = &options.generation;

        let mut body = serde_json::json!({
            "model": options.model,
            "messages": messages,
            "max_tokens": generation.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        if let Some(temperature) = generation.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = generation.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if !generation.stop.is_empty() {
            body["stop_sequences"] = serde_json::json!(generation.stop);
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
impl Adapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }

    async fn chat_stream(&self, options: &ChatOptions) -> ChunkStream {
        let envelope = Envelope::new(generate_id("anthropic"), &options.model);
        let body = Self::build_body(options);

        debug!(
            adapter = "anthropic",
            model = %options.model,
            messages = options.messages.len(),
            tools = options.tools.len(),
            "Sending streaming request"
        );

        let response = match self
            .request(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return error_stream(&envelope, &map_send_error(e)),
        };
        let response = match check_status("anthropic", response).await {
            Ok(response) => response,
            Err(err) => return error_stream(&envelope, &err),
        };

        spawn_stream(
            response,
            AnthropicStreamConverter::new(envelope),
            options.cancel.clone(),
        )
    }

    async fn summarize(
        &self,
        options: &SummarizationOptions,
    ) -> Result<SummarizationResult, AdapterError> {
        let body = serde_json::json!({
            "model": options.model,
            "messages": [{"role": "user", "content": options.prompt()}],
            "max_tokens": options.max_tokens(),
        });

        debug!(adapter = "anthropic", model = %options.model, "Sending summarize request");

        let response = self.request(&body).send().await.map_err(map_send_error)?;
        let response = check_status("anthropic", response).await?;
        let api_resp: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("Failed to parse Anthropic response: {e}")))?;

        let summary = api_resp
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string();

        Ok(SummarizationResult {
            id: api_resp.id,
            model: api_resp.model,
            summary,
            usage: Usage::new(api_resp.usage.input_tokens, api_resp.usage.output_tokens),
        })
    }
}

/// Split system text out of the conversation and convert the rest to
/// Anthropic messages. System texts are joined with a blank line; consecutive tool
/// results collapse into one user message of `tool_result` blocks.
pub fn format_messages(messages: &[ModelMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut result: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.text()),
            Role::User => result.push(AnthropicMessage {
                role: "user".into(),
                content: AnthropicContent::Text(msg.text().to_string()),
            }),
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Text(msg.text().to_string()),
                    });
                    continue;
                }
                let mut blocks: Vec<ContentBlock> = Vec::new();
                if !msg.text().is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: msg.text().to_string(),
                    });
                }
                for call in &msg.tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.function.name.clone(),
                        input: call
                            .parse_arguments()
                            .unwrap_or_else(|_| Value::Object(Default::default())),
                    });
                }
                result.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Blocks(blocks),
                });
            }
            Role::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.text().to_string(),
                };
                if let Some(AnthropicMessage {
                    role,
                    content: AnthropicContent::Blocks(blocks),
                }) = result.last_mut()
                    && role.as_str() == "user"
                    && blocks
                        .iter()
                        .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
                {
                    blocks.push(block);
                    continue;
                }
                result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Blocks(vec![block]),
                });
            }
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, result)
}

/// Convert tools to Anthropic format.
pub fn format_tools(tools: &[Tool]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|tool| {
            let def = tool.definition();
            AnthropicTool {
                name: def.name,
                description: def.description,
                input_schema: def.parameters,
            }
        })
        .collect()
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: String,
    model: String,
    content: Vec<ResponseBlock>,
    usage: ResponseUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    input_tokens: u32,
    output_tokens: u32,
}
