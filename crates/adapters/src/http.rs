//! Shared HTTP plumbing: status mapping and the stream pump task.

use chatrelay_core::adapter::CHUNK_CHANNEL_CAPACITY;
use chatrelay_core::{AdapterError, ChunkStream, Envelope, StreamChunk};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sse_lines::SseLineReader;
use crate::stream::StreamConverter;

/// Map a non-success response to an [`AdapterError`].
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }

    let retry_after_secs = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    let body = response.text().await.unwrap_or_default();
    warn!(provider, status, body = %body, "Provider API error");

    Err(match status {
        429 => AdapterError::RateLimited { retry_after_secs },
        401 | 403 => AdapterError::AuthenticationFailed(format!("Invalid {provider} API key")),
        404 => AdapterError::ModelNotFound(body),
        _ => AdapterError::ApiError {
            status_code: status,
            message: body,
        },
    })
}

pub(crate) fn map_send_error(err: reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout(err.to_string())
    } else {
        AdapterError::Network(err.to_string())
    }
}

/// A stream holding a single `error` chunk.
pub(crate) fn error_stream(envelope: &Envelope, err: &AdapterError) -> ChunkStream {
    let (tx, rx) = mpsc::channel(1);
    // Capacity 1 and a fresh channel: try_send cannot fail here.
    let _ = tx.try_send(envelope.adapter_error(err));
    rx
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn forward(tx: &mpsc::Sender<StreamChunk>, chunks: Vec<StreamChunk>) -> bool {
    for chunk in chunks {
        if tx.send(chunk).await.is_err() {
            return false;
        }
    }
    true
}

/// Spawn a task that reads the SSE body and feeds it through `converter`.
///
/// The task stops when the converter emits a terminal chunk, the receiver is
/// dropped, or `cancel` fires. Cancellation emits nothing further.
pub(crate) fn spawn_stream<C>(
    response: reqwest::Response,
    mut converter: C,
    cancel: Option<CancellationToken>,
) -> ChunkStream
where
    C: StreamConverter + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut byte_stream = response.bytes_stream();
        let mut reader = SseLineReader::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel.as_ref()) => {
                    debug!("Provider stream cancelled");
                    return;
                }
                next = byte_stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    for event in reader.push(&bytes) {
                        if !forward(&tx, converter.convert(&event)).await {
                            return;
                        }
                        if converter.is_finished() {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    let err = AdapterError::StreamInterrupted(e.to_string());
                    let _ = forward(&tx, converter.fail(&err).into_iter().collect()).await;
                    return;
                }
                None => break,
            }
        }

        for event in reader.finish() {
            if !forward(&tx, converter.convert(&event)).await || converter.is_finished() {
                return;
            }
        }
        let _ = forward(&tx, converter.finish()).await;
    });

    rx
}
