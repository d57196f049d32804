//! Adapter trait: the abstraction over chat model providers.
//!
//! Every provider (Anthropic, OpenAI, OpenAI-compatible servers) implements
//! this trait. The engine depends only on it, so adapters are swapped by
//! composition.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chunk::StreamChunk;
use crate::error::AdapterError;
use crate::options::{
    ChatOptions, EmbeddingOptions, EmbeddingResult, SummarizationOptions, SummarizationResult,
};

/// Lazy sequence of normalized chunks for one model round. The sender side
/// ends with exactly one terminal chunk (`done` or `error`) unless the
/// round was cancelled.
pub type ChunkStream = mpsc::Receiver<StreamChunk>;

/// Channel capacity used by adapters for [`ChunkStream`].
pub const CHUNK_CHANNEL_CAPACITY: usize = 128;

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Human-readable adapter name (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Chat models this adapter knows about.
    fn models(&self) -> Vec<String>;

    /// Embedding models, empty when embeddings are unsupported.
    fn embedding_models(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run one model round. Transport and provider failures arrive as a
    /// terminal `error` chunk, never as a Rust error.
    async fn chat_stream(&self, options: &ChatOptions) -> ChunkStream;

    /// One-shot summarization.
    async fn summarize(
        &self,
        options: &SummarizationOptions,
    ) -> Result<SummarizationResult, AdapterError>;

    /// Create embeddings for each input string.
    async fn create_embeddings(
        &self,
        _options: &EmbeddingOptions,
    ) -> Result<EmbeddingResult, AdapterError> {
        Err(AdapterError::NotSupported(format!(
            "{} does not provide embeddings",
            self.name()
        )))
    }
}
