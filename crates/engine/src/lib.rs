//! Chat orchestration: the tool-call manager and the agent-loop engine.
//!
//! The engine drives one adapter round at a time, forwards every chunk to
//! the caller as it arrives, hands completed tool calls to the
//! [`ToolCallManager`], appends the results to the conversation, and asks
//! the agent-loop strategy whether another round may start.

pub mod engine;
pub mod tool_manager;

pub use engine::{ChatEngine, ChatOutcome, HaltReason, chat};
pub use tool_manager::{ToolBatch, ToolCallManager, approval_id};
