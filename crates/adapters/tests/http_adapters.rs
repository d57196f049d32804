//! HTTP-level adapter tests against a mock provider server.

use chatrelay_adapters::{AdapterConfig, AnthropicAdapter, OpenAiAdapter};
use chatrelay_core::{
    Adapter, AdapterError, ChatOptions, ChunkKind, EmbeddingOptions, FinishReason, ModelMessage,
    StreamChunk, SummarizationOptions, SummaryStyle,
};

async fn collect(mut rx: chatrelay_core::ChunkStream) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    chunks
}

fn sse(events: &[(&str, &str)]) -> String {
    events
        .iter()
        .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n"))
        .collect()
}

#[tokio::test]
async fn anthropic_stream_with_tool_call() {
    let mut server = mockito::Server::new_async().await;
    let body = sse(&[
        ("message_start", r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":20,"output_tokens":1}}}"#),
        ("content_block_start", r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Checking"}}"#),
        ("content_block_stop", r#"{"type":"content_block_stop","index":0}"#),
        ("content_block_start", r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_9","name":"get_weather","input":{}}}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}"#),
        ("content_block_delta", r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"Paris\"}"}}"#),
        ("content_block_stop", r#"{"type":"content_block_stop","index":1}"#),
        ("message_delta", r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":15}}"#),
        ("message_stop", r#"{"type":"message_stop"}"#),
    ]);
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "sk-ant-test")
        .match_header("anthropic-version", "2023-06-01")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let adapter = AnthropicAdapter::new(AdapterConfig::new("sk-ant-test").with_base_url(server.url()));
    let options = ChatOptions::new("claude-test", vec![ModelMessage::user("Weather in Paris?")]);
    let chunks = collect(adapter.chat_stream(&options).await).await;
    mock.assert_async().await;

    let kinds: Vec<&str> = chunks.iter().map(|c| c.kind_name()).collect();
    assert_eq!(kinds, vec!["content", "tool_call", "done"]);
    match &chunks[1].kind {
        ChunkKind::ToolCall { tool_call, index } => {
            assert_eq!(*index, 1);
            assert_eq!(tool_call.function.arguments, r#"{"city":"Paris"}"#);
        }
        other => panic!("unexpected {other:?}"),
    }
    match &chunks[2].kind {
        ChunkKind::Done { finish_reason, usage } => {
            assert_eq!(*finish_reason, Some(FinishReason::ToolCalls));
            assert_eq!(usage.unwrap().total_tokens, 35);
        }
        other => panic!("unexpected {other:?}"),
    }
    let id = &chunks[0].id;
    assert!(id.starts_with("anthropic-"));
    assert!(chunks.iter().all(|c| &c.id == id && c.model == "claude-test"));
}

#[tokio::test]
async fn anthropic_auth_failure_is_single_error_chunk() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(401)
        .with_body(r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
        .create_async()
        .await;

    let adapter = AnthropicAdapter::new(AdapterConfig::new("bad").with_base_url(server.url()));
    let chunks = collect(adapter.chat_stream(&ChatOptions::new("claude-test", vec![])).await).await;
    assert_eq!(chunks.len(), 1);
    match &chunks[0].kind {
        ChunkKind::Error { error } => {
            assert_eq!(error.code.as_deref(), Some("authentication_failed"))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn anthropic_truncated_body_ends_with_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(sse(&[(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Half"}}"#,
        )]))
        .create_async()
        .await;

    let adapter = AnthropicAdapter::new(AdapterConfig::new("k").with_base_url(server.url()));
    let chunks = collect(adapter.chat_stream(&ChatOptions::new("m", vec![])).await).await;
    let kinds: Vec<&str> = chunks.iter().map(|c| c.kind_name()).collect();
    assert_eq!(kinds, vec!["content", "error"]);
}

#[tokio::test]
async fn anthropic_summarize() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_body(mockito::Matcher::Regex("bullet points".into()))
        .with_status(200)
        .with_body(
            r#"{"id":"msg_s","model":"claude-test","content":[{"type":"text","text":"\n- one\n- two\n"}],"usage":{"input_tokens":50,"output_tokens":6}}"#,
        )
        .create_async()
        .await;

    let adapter = AnthropicAdapter::new(AdapterConfig::new("k").with_base_url(server.url()));
    let mut opts = SummarizationOptions::new("claude-test", "A long article.");
    opts.style = SummaryStyle::BulletPoints;
    let result = adapter.summarize(&opts).await.unwrap();
    mock.assert_async().await;
    assert_eq!(result.id, "msg_s");
    assert_eq!(result.summary, "- one\n- two");
    assert_eq!(result.usage.total_tokens, 56);
}

#[tokio::test]
async fn anthropic_has_no_embeddings() {
    let adapter = AnthropicAdapter::new(AdapterConfig::new("k"));
    let err = adapter
        .create_embeddings(&EmbeddingOptions {
            model: "any".into(),
            input: vec!["text".into()],
            dimensions: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::NotSupported(_)));
}

#[tokio::test]
async fn openai_stream_with_parallel_tool_calls() {
    let mut server = mockito::Server::new_async().await;
    let lines = [
        r#"{"choices":[{"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"get_weather","arguments":""}}]},"finish_reason":null}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","type":"function","function":{"name":"get_time","arguments":"{}"}}]},"finish_reason":null}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":\"Rome\"}"}}]},"finish_reason":null}]}"#,
        r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        r#"{"choices":[],"usage":{"prompt_tokens":30,"completion_tokens":12,"total_tokens":42}}"#,
        "[DONE]",
    ];
    let body: String = lines.iter().map(|l| format!("data: {l}\n\n")).collect();
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let adapter = OpenAiAdapter::new(AdapterConfig::new("sk-test").with_base_url(server.url()));
    let chunks = collect(
        adapter
            .chat_stream(&ChatOptions::new("gpt-test", vec![ModelMessage::user("hi")]))
            .await,
    )
    .await;
    mock.assert_async().await;

    let kinds: Vec<&str> = chunks.iter().map(|c| c.kind_name()).collect();
    assert_eq!(kinds, vec!["tool_call", "tool_call", "done"]);
    match &chunks[2].kind {
        ChunkKind::Done { usage, .. } => assert_eq!(usage.unwrap().total_tokens, 42),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn openai_rate_limit_maps_to_error_chunk() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("retry-after", "12")
        .with_body("slow down")
        .create_async()
        .await;

    let adapter = OpenAiAdapter::new(AdapterConfig::new("k").with_base_url(server.url()));
    let chunks = collect(adapter.chat_stream(&ChatOptions::new("gpt-test", vec![])).await).await;
    assert_eq!(chunks.len(), 1);
    match &chunks[0].kind {
        ChunkKind::Error { error } => {
            assert_eq!(error.code.as_deref(), Some("rate_limited"));
            assert!(error.message.contains("12"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn openai_embeddings() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/embeddings")
        .with_status(200)
        .with_body(
            r#"{"object":"list","data":[{"index":1,"embedding":[0.3,0.4]},{"index":0,"embedding":[0.1,0.2]}],"model":"text-embedding-3-small","usage":{"prompt_tokens":4,"total_tokens":4}}"#,
        )
        .create_async()
        .await;

    let adapter = OpenAiAdapter::new(AdapterConfig::new("k").with_base_url(server.url()));
    let result = adapter
        .create_embeddings(&EmbeddingOptions {
            model: "text-embedding-3-small".into(),
            input: vec!["a".into(), "b".into()],
            dimensions: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(result.embeddings, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    assert_eq!(result.usage.prompt_tokens, 4);
}

#[tokio::test]
async fn openai_summarize() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::Regex("in a single paragraph".into()))
        .with_status(200)
        .with_body(
            r#"{"id":"chatcmpl-1","model":"gpt-test","choices":[{"message":{"role":"assistant","content":"  Short.\n"}}],"usage":{"prompt_tokens":40,"completion_tokens":2,"total_tokens":42}}"#,
        )
        .create_async()
        .await;

    let adapter = OpenAiAdapter::new(AdapterConfig::new("k").with_base_url(server.url()));
    let result = adapter
        .summarize(&SummarizationOptions::new("gpt-test", "Long text here."))
        .await
        .unwrap();
    assert_eq!(result.summary, "Short.");
    assert_eq!(result.id, "chatcmpl-1");
    assert_eq!(result.usage.total_tokens, 42);
}
