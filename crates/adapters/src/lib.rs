//! Provider adapters for chatrelay.
//!
//! Each adapter implements `chatrelay_core::Adapter`: it builds the
//! provider request, reads the provider's SSE stream, and runs it through a
//! [`stream::StreamConverter`] that turns raw provider events into
//! normalized chunks. The router builds adapters from configuration.

pub mod anthropic;
pub mod config;
mod http;
pub mod openai;
pub mod router;
pub mod sse_lines;
pub mod stream;

pub use anthropic::AnthropicAdapter;
pub use config::AdapterConfig;
pub use openai::OpenAiAdapter;
pub use router::{AdapterRouter, build_from_config};
