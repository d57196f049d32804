//! `chatrelay chat`: Interactive or single-message chat.
//!
//! Runs the same engine as the gateway, with the demo tools, and renders
//! the chunk stream to the terminal as it arrives.

use std::io::Write;

use chatrelay_core::sse::format_sse_chunk;
use chatrelay_core::strategy::max_iterations;
use chatrelay_core::{ChatOptions, ChunkKind, ModelMessage, StreamChunk};
use chatrelay_engine::{ChatEngine, HaltReason};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{load_config, resolve_adapter};

pub async fn run(
    message: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let adapter = resolve_adapter(&config, provider.as_deref())?;
    let model = model.unwrap_or_else(|| config.default_model.clone());
    let tools = chatrelay_gateway::tools::demo_tools();

    let base = {
        let mut options = ChatOptions::new(&model, Vec::new())
            .with_tools(tools)
            .with_strategy(max_iterations(config.agent.max_iterations));
        options.system_prompts = config.agent.system_prompts.clone();
        options.generation.temperature = Some(config.default_temperature);
        options.generation.max_tokens = Some(config.default_max_tokens);
        options
    };

    if let Some(msg) = message {
        // Single message mode
        let mut options = base;
        options.messages = vec![ModelMessage::user(msg)];
        let (halt, _) = turn(ChatEngine::new(adapter, options), raw).await?;
        if halt == HaltReason::Failed {
            return Err("chat failed".into());
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  chatrelay interactive chat");
    println!("  Adapter:  {}", adapter.name());
    println!("  Model:    {model}");
    println!("  Tools:    get_weather, get_time");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut conversation: Vec<ModelMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        conversation.push(ModelMessage::user(line));
        let mut options = base.clone();
        options.messages = conversation.clone();

        let (halt, messages) = turn(ChatEngine::new(adapter.clone(), options), raw).await?;
        match halt {
            // Keep the user turn out of the history so it can be retried.
            HaltReason::Failed => {
                conversation.pop();
            }
            _ => conversation = messages,
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one engine invocation, printing chunks as they arrive.
async fn turn(
    engine: ChatEngine,
    raw: bool,
) -> Result<(HaltReason, Vec<ModelMessage>), Box<dyn std::error::Error>> {
    let (mut rx, handle) = engine.spawn();
    let mut stdout = std::io::stdout();

    while let Some(chunk) = rx.recv().await {
        let text = if raw {
            format_sse_chunk(&chunk)?
        } else {
            render(&chunk)
        };
        write!(stdout, "{text}")?;
        stdout.flush()?;
    }

    let outcome = handle.await?;
    if !raw {
        match outcome.halt {
            HaltReason::StrategyStopped => eprintln!("  [stopped after {} rounds]", outcome.iterations),
            HaltReason::AwaitingApproval => eprintln!("  [waiting for tool approval]"),
            HaltReason::AwaitingClientTool => eprintln!("  [waiting for a client-side tool]"),
            _ => {}
        }
    }
    Ok((outcome.halt, outcome.messages))
}

/// Terminal rendering of one chunk. Text deltas print inline; everything
/// else gets its own bracketed line.
pub fn render(chunk: &StreamChunk) -> String {
    match &chunk.kind {
        ChunkKind::Content { delta, .. } => delta.clone(),
        ChunkKind::Thinking { .. } => String::new(),
        ChunkKind::ToolCall { tool_call, .. } => format!(
            "\n  [tool] {}({})\n",
            tool_call.name(),
            tool_call.function.arguments
        ),
        ChunkKind::ToolResult { content, .. } => format!("  [result] {content}\n"),
        ChunkKind::ApprovalRequested { tool_name, .. } => {
            format!("  [approval needed] {tool_name}\n")
        }
        ChunkKind::ToolInputAvailable { tool_name, .. } => {
            format!("  [client tool] {tool_name}\n")
        }
        ChunkKind::Done { .. } => "\n".to_string(),
        ChunkKind::Error { error } => format!("\n  [Error] {}\n", error.message),
    }
}
