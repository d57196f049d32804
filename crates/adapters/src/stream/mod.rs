//! Raw provider events to normalized chunks.
//!
//! A converter is a small state machine scoped to one model round. It owns
//! the in-flight tool calls keyed by block/choice index, the cumulative text,
//! and the terminal flag. Nothing survives past the round.

pub mod anthropic;
pub mod openai;

use std::collections::BTreeMap;

use chatrelay_core::{AdapterError, ChunkKind, Envelope, Role, StreamChunk, ToolCall};

use crate::sse_lines::SseEvent;

pub use anthropic::AnthropicStreamConverter;
pub use openai::OpenAiStreamConverter;

pub trait StreamConverter {
    /// Convert one raw SSE event. Returns nothing once the round has ended.
    fn convert(&mut self, event: &SseEvent) -> Vec<StreamChunk>;

    /// The byte stream ended. Emits a terminal chunk if none was sent yet.
    fn finish(&mut self) -> Vec<StreamChunk>;

    /// Transport failure mid-stream. Returns the terminal `error` chunk, or
    /// nothing if the round already ended.
    fn fail(&mut self, err: &AdapterError) -> Option<StreamChunk>;

    fn is_finished(&self) -> bool;
}

/// A tool call whose arguments are still arriving.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl PendingToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
        }
    }

    /// Close the call. A call that streamed no arguments gets `{}`.
    pub fn into_tool_call(self) -> ToolCall {
        let arguments = if self.arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            self.arguments
        };
        ToolCall::new(self.id, self.name, arguments)
    }
}

/// State every converter shares: envelope, cumulative text, open tool calls,
/// and whether a terminal chunk went out.
#[derive(Debug)]
pub(crate) struct RoundState {
    pub envelope: Envelope,
    pub content: String,
    pub thinking: String,
    pub tool_calls: BTreeMap<u32, PendingToolCall>,
    pub finished: bool,
}

impl RoundState {
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            content: String::new(),
            thinking: String::new(),
            tool_calls: BTreeMap::new(),
            finished: false,
        }
    }

    pub fn text_delta(&mut self, delta: &str) -> Option<StreamChunk> {
        if delta.is_empty() {
            return None;
        }
        self.content.push_str(delta);
        Some(self.envelope.wrap(ChunkKind::Content {
            delta: delta.to_string(),
            content: self.content.clone(),
            role: Some(Role::Assistant),
        }))
    }

    pub fn thinking_delta(&mut self, delta: &str) -> Option<StreamChunk> {
        if delta.is_empty() {
            return None;
        }
        self.thinking.push_str(delta);
        Some(self.envelope.wrap(ChunkKind::Thinking {
            delta: Some(delta.to_string()),
            content: self.thinking.clone(),
        }))
    }

    /// Close the call at `index`, if one is open.
    pub fn close_tool_call(&mut self, index: u32) -> Option<StreamChunk> {
        let pending = self.tool_calls.remove(&index)?;
        Some(self.envelope.wrap(ChunkKind::ToolCall {
            tool_call: pending.into_tool_call(),
            index,
        }))
    }

    /// Close every open call in index order.
    pub fn close_all_tool_calls(&mut self) -> Vec<StreamChunk> {
        let indices: Vec<u32> = self.tool_calls.keys().copied().collect();
        indices
            .into_iter()
            .filter_map(|i| self.close_tool_call(i))
            .collect()
    }

    pub fn terminate(&mut self, kind: ChunkKind) -> StreamChunk {
        self.finished = true;
        self.tool_calls.clear();
        self.envelope.wrap(kind)
    }

    pub fn error(&mut self, message: impl Into<String>, code: Option<&str>) -> StreamChunk {
        self.finished = true;
        self.tool_calls.clear();
        self.envelope.error(message, code)
    }

    pub fn fail(&mut self, err: &AdapterError) -> Option<StreamChunk> {
        if self.finished {
            return None;
        }
        Some(self.error(err.to_string(), Some(err.code())))
    }
}
