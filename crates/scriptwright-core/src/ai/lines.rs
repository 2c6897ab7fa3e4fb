//! Line framing for streamed HTTP bodies (NDJSON and server-sent events).

use anyhow::Result;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;

/// Accumulates raw body chunks and hands back complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line without its `\n` / `\r\n` terminator
    pub fn next_line(&mut self) -> Option<String> {
        let newline_index = self.pending.iter().position(|byte| *byte == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=newline_index).collect();
        line.pop();
        if matches!(line.last(), Some(b'\r')) {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

struct LineState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: LineBuffer,
    ended: bool,
}

/// Split a streaming response body into lines. A transport error is yielded
/// once and ends the stream.
pub fn response_lines(response: reqwest::Response) -> BoxStream<'static, Result<String>> {
    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
        .boxed();
    let state = LineState {
        body,
        buffer: LineBuffer::new(),
        ended: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.buffer.next_line() {
                return Some((Ok(line), state));
            }
            if state.ended {
                return state.buffer.finish().map(|line| (Ok(line), state));
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.buffer.extend(&chunk),
                Some(Err(error)) => {
                    state.ended = true;
                    state.buffer = LineBuffer::new();
                    return Some((Err(error.into()), state));
                }
                None => state.ended = true,
            }
        }
    })
    .boxed()
}

/// Payload of an SSE `data:` line, if this line is one
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}
