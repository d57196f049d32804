//! Per-request option structures.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::chunk::Usage;
use crate::message::ModelMessage;
use crate::strategy::AgentLoopStrategy;
use crate::tool::Tool;

/// Provider-neutral sampling options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// Everything one chat request needs. The tool list travels with the
/// request; there is no global registry.
#[derive(Clone, Default)]
pub struct ChatOptions {
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<Tool>,

    /// Prepended as system messages for every adapter call
    pub system_prompts: Vec<String>,

    /// Falls back to [`crate::strategy::default_strategy`]
    pub strategy: Option<AgentLoopStrategy>,

    pub generation: GenerationOptions,

    /// Merged verbatim into the provider request body
    pub provider_options: serde_json::Map<String, Value>,

    /// Approval decisions keyed by tool call id
    pub approvals: HashMap<String, bool>,

    /// Results of client-side tools keyed by tool call id
    pub client_tool_results: HashMap<String, Value>,

    pub cancel: Option<CancellationToken>,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>, messages: Vec<ModelMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompts.push(prompt.into());
        self
    }

    pub fn with_strategy(mut self, strategy: AgentLoopStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_provider_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.provider_options.insert(key.into(), value);
        self
    }

    pub fn with_approval(mut self, tool_call_id: impl Into<String>, approved: bool) -> Self {
        self.approvals.insert(tool_call_id.into(), approved);
        self
    }

    pub fn with_client_result(mut self, tool_call_id: impl Into<String>, result: Value) -> Self {
        self.client_tool_results.insert(tool_call_id.into(), result);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// System prompts as messages followed by the conversation.
    pub fn messages_with_system(&self) -> Vec<ModelMessage> {
        self.system_prompts
            .iter()
            .map(ModelMessage::system)
            .chain(self.messages.iter().cloned())
            .collect()
    }
}

impl fmt::Debug for ChatOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOptions")
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .field("system_prompts", &self.system_prompts.len())
            .field("strategy", &self.strategy.as_ref().map(|_| "<strategy>"))
            .field("generation", &self.generation)
            .field("approvals", &self.approvals)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Output format for [`SummarizationOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryStyle {
    BulletPoints,
    #[default]
    Paragraph,
    Concise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizationOptions {
    pub model: String,
    pub text: String,

    /// Upper bound on summary tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    #[serde(default)]
    pub style: SummaryStyle,

    /// Topics the summary should emphasize
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus: Vec<String>,
}

impl SummarizationOptions {
    pub const DEFAULT_MAX_TOKENS: u32 = 1024;

    pub fn new(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            text: text.into(),
            max_length: None,
            style: SummaryStyle::default(),
            focus: Vec::new(),
        }
    }

    /// Instruction placed in front of the text.
    pub fn instruction(&self) -> String {
        let mut prompt = match self.style {
            SummaryStyle::BulletPoints => "Summarize the following text as bullet points:",
            SummaryStyle::Paragraph => "Summarize the following text in a single paragraph:",
            SummaryStyle::Concise => "Provide a concise summary of the following text:",
        }
        .to_string();
        if !self.focus.is_empty() {
            prompt.push_str("\nFocus on: ");
            prompt.push_str(&self.focus.join(", "));
        }
        prompt
    }

    /// Instruction and text as one user prompt.
    pub fn prompt(&self) -> String {
        format!("{}\n\n{}", self.instruction(), self.text)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_length.unwrap_or(Self::DEFAULT_MAX_TOKENS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizationResult {
    pub id: String,
    pub model: String,
    pub summary: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingOptions {
    pub model: String,
    pub input: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub id: String,
    pub model: String,
    pub embeddings: Vec<Vec<f32>>,
    pub usage: Usage,
}
