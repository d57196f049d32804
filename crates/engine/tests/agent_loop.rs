//! End-to-end agent loop tests against a scripted adapter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatrelay_core::strategy::{combine_strategies, max_iterations, until_finish_reason};
use chatrelay_core::{
    Adapter, AdapterError, ChatOptions, ChunkKind, ChunkStream, Envelope, FinishReason,
    ModelMessage, Role, StreamChunk, SummarizationOptions, SummarizationResult, Tool, ToolCall,
};
use chatrelay_engine::{ChatEngine, HaltReason, chat};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Plays back one scripted round per `chat_stream` call and records the
/// conversation it was given.
struct ScriptedAdapter {
    rounds: Mutex<VecDeque<Vec<ChunkKind>>>,
    seen: Mutex<Vec<Vec<ModelMessage>>>,
}

impl ScriptedAdapter {
    fn new(rounds: Vec<Vec<ChunkKind>>) -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(rounds.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn seen(&self, round: usize) -> Vec<ModelMessage> {
        self.seen.lock().unwrap()[round].clone()
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn models(&self) -> Vec<String> {
        vec!["script-1".into()]
    }

    async fn chat_stream(&self, options: &ChatOptions) -> ChunkStream {
        let round = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(options.messages.clone());
            seen.len()
        };
        let kinds = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| text_round("fallback"));

        let envelope = Envelope::new(format!("round-{round}"), &options.model);
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        for kind in kinds {
            tx.try_send(envelope.wrap(kind)).unwrap();
        }
        rx
    }

    async fn summarize(
        &self,
        _options: &SummarizationOptions,
    ) -> Result<SummarizationResult, AdapterError> {
        Err(AdapterError::NotSupported("scripted".into()))
    }
}

fn text_round(text: &str) -> Vec<ChunkKind> {
    vec![
        ChunkKind::Content {
            delta: text.into(),
            content: text.into(),
            role: Some(Role::Assistant),
        },
        ChunkKind::Done {
            finish_reason: Some(FinishReason::Stop),
            usage: None,
        },
    ]
}

fn tool_round(calls: &[(&str, &str, &str)], finish_reason: FinishReason) -> Vec<ChunkKind> {
    let mut kinds: Vec<ChunkKind> = calls
        .iter()
        .enumerate()
        .map(|(i, (id, name, args))| ChunkKind::ToolCall {
            tool_call: ToolCall::new(*id, *name, *args),
            index: i as u32,
        })
        .collect();
    kinds.push(ChunkKind::Done {
        finish_reason: Some(finish_reason),
        usage: None,
    });
    kinds
}

fn weather_tool() -> Tool {
    Tool::new("get_weather", "Current weather").with_sync(|args: Value| -> Result<Value, String> {
        Ok(json!({ "city": args["city"], "sky": "clear" }))
    })
}

fn options(tools: Vec<Tool>) -> ChatOptions {
    ChatOptions::new("script-1", vec![ModelMessage::user("What's the weather?")]).with_tools(tools)
}

async fn drain(mut rx: ChunkStream) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    chunks
}

fn kinds(chunks: &[StreamChunk]) -> Vec<&'static str> {
    chunks.iter().map(|c| c.kind_name()).collect()
}

#[tokio::test]
async fn text_only_round_completes() {
    let adapter = ScriptedAdapter::new(vec![text_round("Sunny.")]);
    let (rx, handle) = ChatEngine::new(adapter.clone(), options(vec![])).spawn();

    let chunks = drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(kinds(&chunks), vec!["content", "done"]);
    assert_eq!(outcome.halt, HaltReason::Completed);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.messages[1].text(), "Sunny.");
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn tool_round_then_answer() {
    let adapter = ScriptedAdapter::new(vec![
        tool_round(&[("c1", "get_weather", r#"{"city":"Oslo"}"#)], FinishReason::ToolCalls),
        text_round("Clear skies in Oslo."),
    ]);
    let (rx, handle) = ChatEngine::new(adapter.clone(), options(vec![weather_tool()])).spawn();

    let chunks = drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(
        kinds(&chunks),
        vec!["tool_call", "done", "tool_result", "content", "done"]
    );
    // Tool results share the id of the round that requested them.
    assert_eq!(chunks[2].id, chunks[0].id);
    assert_eq!(outcome.halt, HaltReason::Completed);
    assert_eq!(outcome.iterations, 2);

    let second = adapter.seen(1);
    assert_eq!(second.len(), 3);
    assert_eq!(second[1].role, Role::Assistant);
    assert_eq!(second[1].tool_calls[0].id, "c1");
    assert_eq!(second[2].role, Role::Tool);
    assert_eq!(second[2].tool_call_id.as_deref(), Some("c1"));
    assert!(second[2].text().contains("Oslo"));
}

#[tokio::test]
async fn max_iterations_runs_exactly_n_rounds() {
    let rounds = (0..10)
        .map(|i| {
            let id = format!("c{i}");
            tool_round(&[(id.as_str(), "get_weather", r#"{"city":"Lima"}"#)], FinishReason::ToolCalls)
        })
        .collect();
    let adapter = ScriptedAdapter::new(rounds);
    let opts = options(vec![weather_tool()]).with_strategy(max_iterations(3));
    let (rx, handle) = ChatEngine::new(adapter.clone(), opts).spawn();

    let chunks = drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(adapter.calls(), 3);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.halt, HaltReason::StrategyStopped);
    let results = chunks.iter().filter(|c| c.kind_name() == "tool_result").count();
    assert_eq!(results, 3);
    // user + 3 × (assistant tool calls + tool result)
    assert_eq!(outcome.messages.len(), 7);
}

#[tokio::test]
async fn zero_max_iterations_still_delivers_first_results() {
    let adapter = ScriptedAdapter::new(vec![tool_round(
        &[("c1", "get_weather", r#"{"city":"Kyiv"}"#)],
        FinishReason::ToolCalls,
    )]);
    let opts = options(vec![weather_tool()]).with_strategy(max_iterations(0));
    let (rx, handle) = ChatEngine::new(adapter.clone(), opts).spawn();

    let chunks = drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(kinds(&chunks), vec!["tool_call", "done", "tool_result"]);
    assert_eq!(outcome.halt, HaltReason::StrategyStopped);
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn until_finish_reason_stops_on_listed_reason() {
    let adapter = ScriptedAdapter::new(vec![
        tool_round(&[("c1", "get_weather", "{}")], FinishReason::ToolCalls),
        tool_round(&[("c2", "get_weather", "{}")], FinishReason::Stop),
        text_round("never reached"),
    ]);
    let opts = options(vec![weather_tool()]).with_strategy(combine_strategies(vec![
        until_finish_reason([FinishReason::Stop]),
        max_iterations(10),
    ]));
    let (tx, _rx) = tokio::sync::mpsc::channel(64);
    let outcome = ChatEngine::new(adapter.clone(), opts).run(&tx).await;

    assert_eq!(adapter.calls(), 2);
    assert_eq!(outcome.halt, HaltReason::StrategyStopped);
}

#[tokio::test]
async fn unknown_tool_feeds_error_back_and_continues() {
    let adapter = ScriptedAdapter::new(vec![
        tool_round(&[("c1", "foo", r#"{"x":1}"#)], FinishReason::ToolCalls),
        text_round("Sorry, I cannot do that."),
    ]);
    let chunks = drain(chat(adapter.clone(), options(vec![weather_tool()]))).await;

    let result = chunks
        .iter()
        .find_map(|c| match &c.kind {
            ChunkKind::ToolResult { content, .. } => Some(content.clone()),
            _ => None,
        })
        .unwrap();
    let parsed: Value = serde_json::from_str(&result).unwrap();
    assert!(parsed.get("error").is_some());
    assert_eq!(adapter.calls(), 2);
    assert_eq!(chunks.last().unwrap().kind_name(), "done");
}

#[tokio::test]
async fn error_round_halts_without_strategy() {
    let adapter = ScriptedAdapter::new(vec![
        vec![
            ChunkKind::Content {
                delta: "Par".into(),
                content: "Par".into(),
                role: None,
            },
            ChunkKind::Error {
                error: chatrelay_core::ErrorInfo {
                    message: "overloaded".into(),
                    code: Some("overloaded_error".into()),
                },
            },
        ],
        text_round("never reached"),
    ]);
    let (rx, handle) = ChatEngine::new(adapter.clone(), options(vec![])).spawn();
    let chunks = drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(kinds(&chunks), vec!["content", "error"]);
    assert_eq!(outcome.halt, HaltReason::Failed);
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn truncated_round_gets_an_error_chunk() {
    let adapter = ScriptedAdapter::new(vec![vec![ChunkKind::Content {
        delta: "Half".into(),
        content: "Half".into(),
        role: None,
    }]]);
    let chunks = drain(chat(adapter, options(vec![]))).await;

    assert_eq!(kinds(&chunks), vec!["content", "error"]);
    match &chunks[1].kind {
        ChunkKind::Error { error } => assert_eq!(error.code.as_deref(), Some("stream_interrupted")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(chunks[1].id, chunks[0].id);
}

#[tokio::test]
async fn approval_suspends_then_resumes() {
    let gated = weather_tool().requiring_approval();
    let adapter = ScriptedAdapter::new(vec![tool_round(
        &[("c1", "get_weather", r#"{"city":"Quito"}"#)],
        FinishReason::ToolCalls,
    )]);
    let (rx, handle) = ChatEngine::new(adapter.clone(), options(vec![gated.clone()])).spawn();
    let chunks = drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(kinds(&chunks), vec!["tool_call", "done", "approval-requested"]);
    assert_eq!(outcome.halt, HaltReason::AwaitingApproval);
    // The assistant turn is kept; no tool message answers it yet.
    assert_eq!(outcome.messages.len(), 2);

    // Next request: same conversation plus the decision.
    let adapter = ScriptedAdapter::new(vec![text_round("It is clear in Quito.")]);
    let opts = ChatOptions::new("script-1", outcome.messages)
        .with_tools(vec![gated])
        .with_approval("c1", true);
    let (rx, handle) = ChatEngine::new(adapter.clone(), opts).spawn();
    let chunks = drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(kinds(&chunks), vec!["tool_result", "content", "done"]);
    assert_eq!(outcome.halt, HaltReason::Completed);
    let seen = adapter.seen(0);
    assert_eq!(seen.last().unwrap().role, Role::Tool);
    assert!(seen.last().unwrap().text().contains("Quito"));
}

#[tokio::test]
async fn declined_approval_reports_to_model() {
    let gated = weather_tool().requiring_approval();
    let messages = vec![
        ModelMessage::user("Weather?"),
        ModelMessage::assistant_tool_calls("", vec![ToolCall::new("c9", "get_weather", "{}")]),
    ];
    let adapter = ScriptedAdapter::new(vec![text_round("Okay, I won't check.")]);
    let opts = ChatOptions::new("script-1", messages)
        .with_tools(vec![gated])
        .with_approval("c9", false);
    let chunks = drain(chat(adapter.clone(), opts)).await;

    match &chunks[0].kind {
        ChunkKind::ToolResult { content, .. } => {
            assert_eq!(content, r#"{"error":"User declined tool execution"}"#)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn client_tool_round_trip() {
    let picker = Tool::new("pick_color", "Let the user pick a color");
    let adapter = ScriptedAdapter::new(vec![tool_round(
        &[("c1", "pick_color", "{}")],
        FinishReason::ToolCalls,
    )]);
    let (rx, handle) = ChatEngine::new(adapter, options(vec![picker.clone()])).spawn();
    let chunks = drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(kinds(&chunks), vec!["tool_call", "done", "tool-input-available"]);
    assert_eq!(outcome.halt, HaltReason::AwaitingClientTool);

    let adapter = ScriptedAdapter::new(vec![text_round("Teal it is.")]);
    let opts = ChatOptions::new("script-1", outcome.messages)
        .with_tools(vec![picker])
        .with_client_result("c1", json!({ "color": "teal" }));
    let chunks = drain(chat(adapter, opts)).await;
    assert_eq!(kinds(&chunks), vec!["tool_result", "content", "done"]);
}

#[tokio::test]
async fn cancellation_before_start_emits_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let adapter = ScriptedAdapter::new(vec![text_round("hi")]);
    let (rx, handle) =
        ChatEngine::new(adapter.clone(), options(vec![]).with_cancellation(token)).spawn();

    assert!(drain(rx).await.is_empty());
    assert_eq!(handle.await.unwrap().halt, HaltReason::Cancelled);
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn cancellation_stops_inflight_tools() {
    let stuck = Tool::new("stuck", "Never finishes")
        .with_async(|_: Value| async { std::future::pending::<Result<Value, String>>().await });
    let adapter = ScriptedAdapter::new(vec![tool_round(&[("c1", "stuck", "{}")], FinishReason::ToolCalls)]);
    let token = CancellationToken::new();
    let opts = options(vec![stuck]).with_cancellation(token.clone());
    let (mut rx, handle) = ChatEngine::new(adapter, opts).spawn();

    let mut seen = Vec::new();
    while let Some(chunk) = rx.recv().await {
        let done = chunk.kind_name() == "done";
        seen.push(chunk);
        if done {
            token.cancel();
        }
    }

    assert_eq!(kinds(&seen), vec!["tool_call", "done"]);
    assert_eq!(handle.await.unwrap().halt, HaltReason::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancellation_drops_a_chunk_waiting_on_a_full_channel() {
    let mut round = text_round("one");
    round.insert(
        1,
        ChunkKind::Content {
            delta: " two".into(),
            content: "one two".into(),
            role: None,
        },
    );
    let adapter = ScriptedAdapter::new(vec![round]);
    let token = CancellationToken::new();
    let engine = ChatEngine::new(adapter, options(vec![]).with_cancellation(token.clone()));

    // Room for one chunk; the engine blocks sending the second.
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    let handle = tokio::spawn(async move { engine.run(&tx).await });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    token.cancel();

    let seen = drain(rx).await;
    assert_eq!(kinds(&seen), vec!["content"]);
    assert_eq!(handle.await.unwrap().halt, HaltReason::Cancelled);
}

#[tokio::test]
async fn system_prompts_reach_the_adapter_but_not_the_conversation() {
    struct PromptRecorder(Mutex<Vec<String>>);

    #[async_trait]
    impl Adapter for PromptRecorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn models(&self) -> Vec<String> {
            Vec::new()
        }
        async fn chat_stream(&self, options: &ChatOptions) -> ChunkStream {
            self.0.lock().unwrap().extend(options.system_prompts.iter().cloned());
            let envelope = Envelope::new("rec-1", &options.model);
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            for kind in text_round("ok") {
                tx.try_send(envelope.wrap(kind)).unwrap();
            }
            rx
        }
        async fn summarize(
            &self,
            _options: &SummarizationOptions,
        ) -> Result<SummarizationResult, AdapterError> {
            Err(AdapterError::NotSupported("recorder".into()))
        }
    }

    let recorder = Arc::new(PromptRecorder(Mutex::new(Vec::new())));
    let opts = options(vec![]).with_system_prompt("Be brief.");
    let (rx, handle) = ChatEngine::new(recorder.clone(), opts).spawn();
    drain(rx).await;
    let outcome = handle.await.unwrap();

    assert_eq!(*recorder.0.lock().unwrap(), vec!["Be brief.".to_string()]);
    assert!(outcome.messages.iter().all(|m| m.role != Role::System));
}
