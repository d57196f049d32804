//! The chat engine: one task per request, driving the agent loop.
//!
//! ```text
//! start → streaming → (tool calls? → executing → streaming) | done | error
//! ```
//!
//! Chunks are forwarded as they arrive. The conversation only ever grows;
//! nothing already in it is rewritten.

use std::fmt;
use std::sync::Arc;

use chatrelay_core::adapter::CHUNK_CHANNEL_CAPACITY;
use chatrelay_core::message::pending_tool_calls;
use chatrelay_core::strategy::default_strategy;
use chatrelay_core::{
    Adapter, AdapterError, AgentLoopState, AgentLoopStrategy, ChatOptions, ChunkKind,
    ChunkStream, Envelope, FinishReason, ModelMessage, StreamChunk, ToolCall, generate_id,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tool_manager::{ToolBatch, ToolCallManager};

/// Why the engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A round finished without tool calls
    Completed,
    /// The agent-loop strategy declined another round
    StrategyStopped,
    /// A tool call waits for an approval decision
    AwaitingApproval,
    /// A client-side tool waits for the client's result
    AwaitingClientTool,
    /// The round ended with an `error` chunk
    Failed,
    /// Cancelled, or the consumer went away
    Cancelled,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::StrategyStopped => "strategy_stopped",
            Self::AwaitingApproval => "awaiting_approval",
            Self::AwaitingClientTool => "awaiting_client_tool",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of one engine run.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// The conversation including everything appended during the run
    pub messages: Vec<ModelMessage>,

    /// Completed model rounds
    pub iterations: u32,

    pub halt: HaltReason,
}

/// What one adapter round produced.
#[derive(Default)]
struct Round {
    envelope: Option<Envelope>,
    content: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    terminal: Option<Terminal>,
}

enum Terminal {
    Done,
    Error,
}

impl Round {
    fn observe(&mut self, chunk: &StreamChunk) {
        if self.envelope.is_none() {
            self.envelope = Some(Envelope::new(&chunk.id, &chunk.model));
        }
        match &chunk.kind {
            ChunkKind::Content { content, .. } => self.content.clone_from(content),
            ChunkKind::ToolCall { tool_call, .. } => self.tool_calls.push(tool_call.clone()),
            ChunkKind::Done { finish_reason, .. } => {
                self.finish_reason = *finish_reason;
                self.terminal = Some(Terminal::Done);
            }
            ChunkKind::Error { .. } => self.terminal = Some(Terminal::Error),
            _ => {}
        }
    }
}

/// Whether the loop may go on after a batch was delivered.
enum Flow {
    Continue,
    Halt(HaltReason),
}

pub struct ChatEngine {
    adapter: Arc<dyn Adapter>,
    options: ChatOptions,
    strategy: AgentLoopStrategy,
    cancel: CancellationToken,
}

impl ChatEngine {
    pub fn new(adapter: Arc<dyn Adapter>, options: ChatOptions) -> Self {
        let strategy = options.strategy.clone().unwrap_or_else(default_strategy);
        let cancel = options.cancel.clone().unwrap_or_default();
        Self {
            adapter,
            options,
            strategy,
            cancel,
        }
    }

    /// Run on a new task. The receiver yields every chunk of every round.
    pub fn spawn(self) -> (ChunkStream, JoinHandle<ChatOutcome>) {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move { self.run(&tx).await });
        (rx, handle)
    }

    /// Drive the agent loop to completion, sending chunks into `tx`.
    pub async fn run(self, tx: &mpsc::Sender<StreamChunk>) -> ChatOutcome {
        let mut messages = self.options.messages.clone();
        let mut iterations = 0u32;

        info!(
            adapter = %self.adapter.name(),
            model = %self.options.model,
            messages = messages.len(),
            tools = self.options.tools.len(),
            "Starting chat"
        );

        let halt = 'run: {
            // ── Resume tool calls left open by a previous request ──
            let pending = pending_tool_calls(&messages);
            if !pending.is_empty() {
                debug!(count = pending.len(), "Resuming pending tool calls");
                let envelope = Envelope::new(generate_id("resume"), &self.options.model);
                let batch = match self.execute_tools(&pending, &envelope).await {
                    Some(batch) => batch,
                    None => break 'run HaltReason::Cancelled,
                };
                if let Flow::Halt(reason) = self.deliver(tx, &batch, &mut messages).await {
                    break 'run reason;
                }
            }

            loop {
                if self.cancel.is_cancelled() {
                    break 'run HaltReason::Cancelled;
                }

                // ── Model round ──
                debug!(round = iterations + 1, messages = messages.len(), "Starting model round");
                let round = match self.stream_round(tx, &messages).await {
                    Ok(round) => round,
                    Err(reason) => break 'run reason,
                };
                if let Some(Terminal::Error) = round.terminal {
                    break 'run HaltReason::Failed;
                }
                if round.tool_calls.is_empty() {
                    iterations += 1;
                    if !round.content.is_empty() {
                        messages.push(ModelMessage::assistant(round.content));
                    }
                    break 'run HaltReason::Completed;
                }

                // ── Tool execution ──
                let envelope = round
                    .envelope
                    .clone()
                    .unwrap_or_else(|| Envelope::new(generate_id("round"), &self.options.model));
                messages.push(ModelMessage::assistant_tool_calls(
                    round.content,
                    round.tool_calls.clone(),
                ));
                let batch = match self.execute_tools(&round.tool_calls, &envelope).await {
                    Some(batch) => batch,
                    None => break 'run HaltReason::Cancelled,
                };
                iterations += 1;
                if let Flow::Halt(reason) = self.deliver(tx, &batch, &mut messages).await {
                    break 'run reason;
                }

                // ── Strategy ──
                let state = AgentLoopState {
                    iteration_count: iterations,
                    messages: &messages,
                    finish_reason: round.finish_reason,
                };
                if !(self.strategy)(&state) {
                    break 'run HaltReason::StrategyStopped;
                }
            }
        };

        info!(halt = %halt, iterations, messages = messages.len(), "Chat finished");
        ChatOutcome {
            messages,
            iterations,
            halt,
        }
    }

    /// Stream one adapter round, forwarding every chunk. Guarantees the
    /// consumer sees a terminal chunk unless the run was cancelled.
    async fn stream_round(
        &self,
        tx: &mpsc::Sender<StreamChunk>,
        messages: &[ModelMessage],
    ) -> Result<Round, HaltReason> {
        let mut options = self.options.clone();
        options.messages = messages.to_vec();
        options.cancel = Some(self.cancel.clone());

        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(HaltReason::Cancelled),
            stream = self.adapter.chat_stream(&options) => stream,
        };

        let mut round = Round::default();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(HaltReason::Cancelled),
                chunk = stream.recv() => chunk,
            };
            let Some(chunk) = chunk else { break };
            round.observe(&chunk);
            let terminal = chunk.is_terminal();
            self.forward(tx, chunk).await?;
            if terminal {
                return Ok(round);
            }
        }

        if self.cancel.is_cancelled() {
            return Err(HaltReason::Cancelled);
        }
        warn!(adapter = %self.adapter.name(), "Adapter stream closed without a terminal chunk");
        let envelope = round
            .envelope
            .clone()
            .unwrap_or_else(|| Envelope::new(generate_id("round"), &self.options.model));
        let err = AdapterError::StreamInterrupted("adapter stream closed early".into());
        // A closed receiver here means there is nobody left to tell.
        let _ = tx.send(envelope.adapter_error(&err)).await;
        Err(HaltReason::Failed)
    }

    /// Run the manager unless cancellation wins first.
    async fn execute_tools(&self, calls: &[ToolCall], envelope: &Envelope) -> Option<ToolBatch> {
        let manager = ToolCallManager::new(&self.options.tools)
            .with_approvals(&self.options.approvals)
            .with_client_results(&self.options.client_tool_results);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            batch = manager.execute(calls, envelope) => Some(batch),
        }
    }

    /// Send one chunk to the consumer. Nothing goes out once cancelled,
    /// including a send still waiting on a full channel.
    async fn forward(
        &self,
        tx: &mpsc::Sender<StreamChunk>,
        chunk: StreamChunk,
    ) -> Result<(), HaltReason> {
        if self.cancel.is_cancelled() {
            return Err(HaltReason::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HaltReason::Cancelled),
            sent = tx.send(chunk) => sent.map_err(|_| {
                debug!("Consumer dropped the stream");
                HaltReason::Cancelled
            }),
        }
    }

    /// Forward a batch's chunks and append its messages.
    async fn deliver(
        &self,
        tx: &mpsc::Sender<StreamChunk>,
        batch: &ToolBatch,
        messages: &mut Vec<ModelMessage>,
    ) -> Flow {
        for chunk in &batch.chunks {
            if let Err(reason) = self.forward(tx, chunk.clone()).await {
                return Flow::Halt(reason);
            }
        }
        messages.extend(batch.messages.iter().cloned());

        if !batch.needs_approval.is_empty() {
            Flow::Halt(HaltReason::AwaitingApproval)
        } else if !batch.needs_client_execution.is_empty() {
            Flow::Halt(HaltReason::AwaitingClientTool)
        } else {
            Flow::Continue
        }
    }
}

/// Start a chat on a new task and return its chunk stream.
pub fn chat(adapter: Arc<dyn Adapter>, options: ChatOptions) -> ChunkStream {
    let (rx, _handle) = ChatEngine::new(adapter, options).spawn();
    rx
}
