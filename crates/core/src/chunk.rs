//! The normalized stream-chunk protocol.
//!
//! Every provider stream is converted into a sequence of [`StreamChunk`]
//! values. Each chunk carries a shared envelope (`type`, `id`, `model`,
//! `timestamp`) plus variant-specific fields, and serializes to the same
//! flat JSON object the browser client consumes:
//!
//! ```json
//! {"type":"content","delta":"Hi","content":"Hi","role":"assistant","id":"msg-1","model":"m","timestamp":1700000000000}
//! ```
//!
//! For one message id, exactly one `done` or one `error` chunk terminates
//! the sequence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdapterError;
use crate::message::{Role, ToolCall};

/// Normalized classification of why a model round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage for one model round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Payload of an `error` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&AdapterError> for ErrorInfo {
    fn from(err: &AdapterError) -> Self {
        Self {
            message: err.to_string(),
            code: Some(err.code().to_string()),
        }
    }
}

/// Approval handle attached to an `approval-requested` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalInfo {
    pub id: String,
    pub needs_approval: bool,
}

/// Variant-specific part of a chunk. The `type` tag is shared with the
/// envelope so the wire form stays flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ChunkKind {
    /// Incremental assistant text plus the cumulative text so far.
    #[serde(rename = "content")]
    Content {
        delta: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },

    /// Model reasoning text.
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        content: String,
    },

    /// A fully assembled tool call.
    #[serde(rename = "tool_call")]
    ToolCall { tool_call: ToolCall, index: u32 },

    /// A client-side tool is ready for the client to execute.
    #[serde(rename = "tool-input-available")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },

    /// A tool call is suspended until someone approves it.
    #[serde(rename = "approval-requested")]
    ApprovalRequested {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        approval: ApprovalInfo,
    },

    /// Output of a tool call, JSON encoded.
    #[serde(rename = "tool_result")]
    ToolResult { tool_call_id: String, content: String },

    /// Successful end of a round.
    #[serde(rename = "done")]
    Done {
        finish_reason: Option<FinishReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// Failed end of a round.
    #[serde(rename = "error")]
    Error { error: ErrorInfo },
}

/// One discrete, typed event in the normalized output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(flatten)]
    pub kind: ChunkKind,

    /// Request / message identifier
    pub id: String,

    /// Model that produced the chunk
    pub model: String,

    /// Unix epoch milliseconds
    pub timestamp: i64,
}

impl StreamChunk {
    /// The wire `type` tag of this chunk.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ChunkKind::Content { .. } => "content",
            ChunkKind::Thinking { .. } => "thinking",
            ChunkKind::ToolCall { .. } => "tool_call",
            ChunkKind::ToolInputAvailable { .. } => "tool-input-available",
            ChunkKind::ApprovalRequested { .. } => "approval-requested",
            ChunkKind::ToolResult { .. } => "tool_result",
            ChunkKind::Done { .. } => "done",
            ChunkKind::Error { .. } => "error",
        }
    }

    /// `done` and `error` end a round.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ChunkKind::Done { .. } | ChunkKind::Error { .. })
    }
}

/// Stamps chunks with a fixed id and model and the current time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: String,
    pub model: String,
}

impl Envelope {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
        }
    }

    pub fn wrap(&self, kind: ChunkKind) -> StreamChunk {
        StreamChunk {
            kind,
            id: self.id.clone(),
            model: self.model.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn error(&self, message: impl Into<String>, code: Option<&str>) -> StreamChunk {
        self.wrap(ChunkKind::Error {
            error: ErrorInfo {
                message: message.into(),
                code: code.map(str::to_string),
            },
        })
    }

    pub fn adapter_error(&self, err: &AdapterError) -> StreamChunk {
        self.wrap(ChunkKind::Error { error: err.into() })
    }
}

/// Generate an identifier of the form `<prefix>-<unix ms>-<8 hex>`.
pub fn generate_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{millis}-{}", &suffix[..8])
}
