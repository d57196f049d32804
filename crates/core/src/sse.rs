//! Server-sent-events framing for chunk streams.
//!
//! Each chunk is one `data: <json>\n\n` frame and the stream ends with a
//! single `data: [DONE]\n\n` sentinel. Errors travel as ordinary `error`
//! chunks.

use crate::chunk::{Envelope, StreamChunk};

/// Sentinel payload marking the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Frame one chunk.
pub fn format_sse_chunk(chunk: &StreamChunk) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(chunk)?))
}

/// The end-of-stream frame.
pub fn format_sse_done() -> String {
    format!("data: {DONE_SENTINEL}\n\n")
}

/// Frame an error raised outside any adapter round.
pub fn format_sse_error(message: &str, model: &str) -> String {
    let chunk = Envelope::new(crate::chunk::generate_id("error"), model).error(message, None);
    // Serializing a chunk built from plain strings cannot fail.
    format_sse_chunk(&chunk).unwrap_or_else(|_| format_sse_done())
}

/// One decoded SSE payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Chunk(StreamChunk),
    Done,
}

/// Decode a single frame produced by [`format_sse_chunk`] or
/// [`format_sse_done`]. Returns `None` for frames without a `data:` line.
pub fn parse_sse_chunk(frame: &str) -> Option<Result<SseFrame, serde_json::Error>> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        return None;
    }
    let payload = data.join("\n");
    if payload.trim() == DONE_SENTINEL {
        return Some(Ok(SseFrame::Done));
    }
    Some(serde_json::from_str(&payload).map(SseFrame::Chunk))
}

/// Incremental frame splitter for a byte stream of SSE text.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more text, returning every frame completed by it.
    pub fn push(&mut self, text: &str) -> Vec<Result<SseFrame, serde_json::Error>> {
        self.buffer.push_str(&text.replace("\r\n", "\n"));
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..pos + 2).collect();
            if let Some(decoded) = parse_sse_chunk(&frame) {
                frames.push(decoded);
            }
        }
        frames
    }
}
