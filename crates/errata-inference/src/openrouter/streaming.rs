//! SSE stream parsing for streaming chat completions.

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::pin::Pin;
use tracing::trace;

use errata_core::{CompletionBackend, CompletionOptions, Error, PromptMessage, Result};

use super::types::ChatCompletionChunk;

/// Stream of generation tokens.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A completion backend that can also stream chat replies.
#[async_trait::async_trait]
pub trait StreamingCompletion: CompletionBackend {
    /// Stream the reply to `messages` as content deltas.
    async fn chat_completion_stream(
        &self,
        messages: &[PromptMessage],
        model: &str,
        options: CompletionOptions,
    ) -> Result<TokenStream>;
}

/// What one SSE `data:` line carried.
#[derive(Debug, PartialEq)]
enum SseLine {
    Content(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            let content: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if content.is_empty() {
                SseLine::Skip
            } else {
                SseLine::Content(content)
            }
        }
        Err(e) => {
            trace!(error = %e, "Skipping malformed SSE data line");
            SseLine::Skip
        }
    }
}

/// Line buffer that reassembles SSE lines split across network chunks.
#[derive(Default)]
struct SseDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Feed bytes and collect the content of every completed line.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while !self.done {
            let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.take_line(&line, &mut out);
        }
        out
    }

    /// Flush a trailing line without a newline.
    fn finish(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.done && !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            self.take_line(&line, &mut out);
        }
        out
    }

    fn take_line(&mut self, line: &[u8], out: &mut Vec<String>) {
        match parse_sse_line(&String::from_utf8_lossy(line)) {
            SseLine::Content(c) => out.push(c),
            SseLine::Done => self.done = true,
            SseLine::Skip => {}
        }
    }
}

/// Parse an SSE byte stream into content deltas.
///
/// Ends at `data: [DONE]` or when the body ends. Malformed JSON lines are
/// skipped; transport errors are yielded once and end the stream.
pub fn parse_sse_stream(
    body: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
) -> TokenStream {
    let state = (Box::pin(body), SseDecoder::default(), false);
    let tokens = stream::unfold(state, |(mut body, mut decoder, finished)| async move {
        if finished || decoder.done {
            return None;
        }
        match body.next().await {
            Some(Ok(bytes)) => {
                let items: Vec<Result<String>> = decoder.push(&bytes).into_iter().map(Ok).collect();
                Some((items, (body, decoder, false)))
            }
            Some(Err(e)) => {
                let err = Error::Inference(format!("Stream error: {}", e));
                Some((vec![Err(err)], (body, decoder, true)))
            }
            None => {
                let items: Vec<Result<String>> = decoder.finish().into_iter().map(Ok).collect();
                Some((items, (body, decoder, true)))
            }
        }
    })
    .flat_map(stream::iter);

    Box::pin(tokens)
}
