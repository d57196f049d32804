//! OpenAI Chat Completions stream events.
//!
//! Tool calls arrive as deltas keyed by `index`: the first delta for an
//! index carries `id` and `function.name`, later ones only argument
//! fragments. Calls are complete once a choice reports `finish_reason`;
//! `done` is emitted at `[DONE]` so a trailing usage chunk is included.

use chatrelay_core::{AdapterError, ChunkKind, Envelope, FinishReason, StreamChunk, Usage};
use serde::Deserialize;
use tracing::trace;

use super::{PendingToolCall, RoundState, StreamConverter};
use crate::sse_lines::SseEvent;

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
pub struct StreamResponse {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta. Arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
pub struct StreamToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
pub struct StreamFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Map an OpenAI `finish_reason` to a normalized finish reason.
pub fn map_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

pub struct OpenAiStreamConverter {
    state: RoundState,
    finish_reason: Option<FinishReason>,
    saw_finish: bool,
    usage: Option<Usage>,
}

impl OpenAiStreamConverter {
    pub fn new(envelope: Envelope) -> Self {
        Self {
            state: RoundState::new(envelope),
            finish_reason: None,
            saw_finish: false,
            usage: None,
        }
    }

    /// Apply one parsed chunk.
    pub fn handle(&mut self, response: StreamResponse) -> Vec<StreamChunk> {
        if self.state.finished {
            return Vec::new();
        }
        if let Some(error) = response.error {
            return vec![self.state.error(
                error.message,
                Some(error.kind.as_deref().unwrap_or("api_error")),
            )];
        }
        if let Some(usage) = response.usage {
            self.usage = Some(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        let mut chunks = Vec::new();
        // Only the first choice is surfaced; n > 1 is not requested.
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(text) = choice.delta.content.as_deref() {
                chunks.extend(self.state.text_delta(text));
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let entry = self
                    .state
                    .tool_calls
                    .entry(delta.index)
                    .or_insert_with(PendingToolCall::default);
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    entry.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        entry.name = name;
                    }
                    if let Some(fragment) = function.arguments {
                        entry.arguments.push_str(&fragment);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.saw_finish = true;
                self.finish_reason = map_finish_reason(reason);
                chunks.extend(self.state.close_all_tool_calls());
            }
        }
        chunks
    }

    fn done(&mut self) -> Vec<StreamChunk> {
        let mut chunks = self.state.close_all_tool_calls();
        chunks.push(self.state.terminate(ChunkKind::Done {
            finish_reason: self.finish_reason,
            usage: self.usage,
        }));
        chunks
    }
}

impl StreamConverter for OpenAiStreamConverter {
    fn convert(&mut self, event: &SseEvent) -> Vec<StreamChunk> {
        if self.state.finished {
            return Vec::new();
        }
        let data = event.data.trim();
        if data.is_empty() {
            return Vec::new();
        }
        if data == "[DONE]" {
            return self.done();
        }
        match serde_json::from_str::<StreamResponse>(data) {
            Ok(parsed) => self.handle(parsed),
            Err(e) => {
                trace!(error = %e, data = %data, "Unparseable OpenAI stream chunk");
                let err = AdapterError::InvalidResponse(format!("malformed stream chunk: {e}"));
                self.state.fail(&err).into_iter().collect()
            }
        }
    }

    fn finish(&mut self) -> Vec<StreamChunk> {
        if self.state.finished {
            return Vec::new();
        }
        // Some compatible servers close the connection without [DONE].
        if self.saw_finish {
            return self.done();
        }
        let err = AdapterError::StreamInterrupted("stream ended before finish_reason".into());
        self.state.fail(&err).into_iter().collect()
    }

    fn fail(&mut self, err: &AdapterError) -> Option<StreamChunk> {
        self.state.fail(err)
    }

    fn is_finished(&self) -> bool {
        self.state.finished
    }
}
