//! Anthropic Messages API stream events.
//!
//! Per content-block index:
//! - `content_block_start` (text) opens a text block; each `text_delta`
//!   yields a `content` chunk right away
//! - `content_block_start` (tool_use) opens a tool call; `input_json_delta`
//!   fragments are concatenated, never parsed
//! - `content_block_stop` closes a tool block and yields one `tool_call`
//! - `message_stop` yields `done` with usage and the mapped finish reason

use chatrelay_core::{AdapterError, ChunkKind, Envelope, FinishReason, StreamChunk, Usage};
use serde::Deserialize;
use tracing::{debug, trace};

use super::{PendingToolCall, RoundState, StreamConverter};
use crate::sse_lines::SseEvent;

/// Raw streaming event, tagged by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: BlockStart,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDelta,
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct MessageStart {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub usage: Option<DeltaUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeltaUsage {
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Map an Anthropic `stop_reason` to a normalized finish reason.
pub fn map_stop_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        "refusal" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

pub struct AnthropicStreamConverter {
    state: RoundState,
    input_tokens: u32,
    output_tokens: u32,
    finish_reason: Option<FinishReason>,
}

impl AnthropicStreamConverter {
    pub fn new(envelope: Envelope) -> Self {
        Self {
            state: RoundState::new(envelope),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: None,
        }
    }

    fn record_usage(&mut self, usage: Option<DeltaUsage>) {
        let Some(usage) = usage else { return };
        if let Some(input) = usage.input_tokens {
            self.input_tokens = input;
        }
        if let Some(output) = usage.output_tokens {
            self.output_tokens = output;
        }
    }

    /// Apply one typed event.
    pub fn handle(&mut self, event: AnthropicEvent) -> Vec<StreamChunk> {
        if self.state.finished {
            return Vec::new();
        }
        match event {
            AnthropicEvent::MessageStart { message } => {
                trace!(message_id = ?message.id, "Anthropic message started");
                self.record_usage(message.usage);
                Vec::new()
            }
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                BlockStart::ToolUse { id, name } => {
                    debug!(index, tool = %name, "Tool use block opened");
                    self.state
                        .tool_calls
                        .insert(index, PendingToolCall::new(id, name));
                    Vec::new()
                }
                BlockStart::Text { text } => self.state.text_delta(&text).into_iter().collect(),
                BlockStart::Thinking { thinking } => {
                    self.state.thinking_delta(&thinking).into_iter().collect()
                }
                BlockStart::Other => Vec::new(),
            },
            AnthropicEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    self.state.text_delta(&text).into_iter().collect()
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(call) = self.state.tool_calls.get_mut(&index) {
                        call.arguments.push_str(&partial_json);
                    }
                    Vec::new()
                }
                BlockDelta::ThinkingDelta { thinking } => {
                    self.state.thinking_delta(&thinking).into_iter().collect()
                }
                BlockDelta::Other => Vec::new(),
            },
            AnthropicEvent::ContentBlockStop { index } => {
                self.state.close_tool_call(index).into_iter().collect()
            }
            AnthropicEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref() {
                    self.finish_reason = map_stop_reason(reason);
                }
                self.record_usage(usage);
                Vec::new()
            }
            AnthropicEvent::MessageStop => {
                let mut chunks = self.state.close_all_tool_calls();
                chunks.push(self.state.terminate(ChunkKind::Done {
                    finish_reason: self.finish_reason,
                    usage: Some(Usage::new(self.input_tokens, self.output_tokens)),
                }));
                chunks
            }
            AnthropicEvent::Error { error } => {
                vec![self.state.error(
                    error.message,
                    Some(error.kind.as_deref().unwrap_or("api_error")),
                )]
            }
            AnthropicEvent::Ping | AnthropicEvent::Unknown => Vec::new(),
        }
    }
}

impl StreamConverter for AnthropicStreamConverter {
    fn convert(&mut self, event: &SseEvent) -> Vec<StreamChunk> {
        if self.state.finished {
            return Vec::new();
        }
        let data = event.data.trim();
        if data.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<AnthropicEvent>(data) {
            Ok(parsed) => self.handle(parsed),
            // Unknown event types parse as `Unknown`; anything failing here
            // is a known event with a broken shape, or not JSON at all.
            Err(e) => {
                let err = AdapterError::InvalidResponse(format!("malformed stream event: {e}"));
                self.state.fail(&err).into_iter().collect()
            }
        }
    }

    fn finish(&mut self) -> Vec<StreamChunk> {
        let err = AdapterError::StreamInterrupted("stream ended before message_stop".into());
        self.state.fail(&err).into_iter().collect()
    }

    fn fail(&mut self, err: &AdapterError) -> Option<StreamChunk> {
        self.state.fail(err)
    }

    fn is_finished(&self) -> bool {
        self.state.finished
    }
}
