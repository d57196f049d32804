//! # chatrelay core
//!
//! Domain types and traits shared by every chatrelay crate: the normalized
//! stream-chunk protocol, conversation messages, tool definitions, agent-loop
//! strategies, and the [`Adapter`] contract that provider integrations
//! implement.
//!
//! Nothing in here performs I/O. Provider clients live in
//! `chatrelay-adapters`, the orchestration loop lives in `chatrelay-engine`.

pub mod adapter;
pub mod chunk;
pub mod error;
pub mod message;
pub mod options;
pub mod sse;
pub mod strategy;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use adapter::{Adapter, ChunkStream};
pub use chunk::{
    ApprovalInfo, ChunkKind, Envelope, ErrorInfo, FinishReason, StreamChunk, Usage,
    generate_id,
};
pub use error::{AdapterError, Error, Result, ToolError};
pub use message::{FunctionCall, ModelMessage, Role, ToolCall};
pub use options::{
    ChatOptions, EmbeddingOptions, EmbeddingResult, GenerationOptions, SummarizationOptions,
    SummarizationResult, SummaryStyle,
};
pub use strategy::{AgentLoopState, AgentLoopStrategy};
pub use tool::{Tool, ToolDefinition, ToolExecutor};
