//! Streaming response handling

use std::pin::Pin;

use futures::Stream;
use futures::StreamExt;

use crate::errors::RepChatError;
use crate::errors::Result;

/// Boxed stream of text deltas from an LLM provider
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Streaming completion from an LLM provider. Tokens are delivered strictly
/// in provider order; the only buffering is the accumulation the caller
/// performs itself.
pub struct StreamingResponse {
    stream: TokenStream,
}

impl StreamingResponse {
    pub fn new(stream: TokenStream) -> Self {
        Self { stream }
    }

    /// Next text delta, bounded by the remaining overall deadline
    pub async fn next_token(
        &mut self,
        remaining: std::time::Duration,
    ) -> Option<Result<String>> {
        match tokio::time::timeout(remaining, self.stream.next()).await {
            Ok(item) => item,
            Err(_) => Some(Err(RepChatError::StreamTimeout(remaining.as_secs()))),
        }
    }

    /// Collect all deltas into a single string
    pub async fn collect_all(mut self) -> Result<String> {
        let mut result = String::new();
        while let Some(chunk) = self.stream.next().await {
            result.push_str(&chunk?);
        }
        Ok(result)
    }
}

/// Byte-accurate line framing for SSE response bodies.
///
/// Network chunks are buffered raw and decoded only at line boundaries, so a
/// multibyte character split across two chunks is reassembled instead of
/// turning into replacement characters.
#[derive(Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, trimmed, without the newline. `None` until a full
    /// line has been buffered.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_all_concatenates_in_order() {
        let stream = futures::stream::iter(vec![
            Ok("Hello".to_string()),
            Ok(", ".to_string()),
            Ok("world".to_string()),
        ]);
        let response = StreamingResponse::new(Box::pin(stream));
        assert_eq!(response.collect_all().await.unwrap(), "Hello, world");
    }

    #[test]
    fn multibyte_character_split_across_chunks_survives() {
        let mut lines = LineBuffer::new();
        // The two bytes of 'é' arrive in different network chunks
        lines.push(b"data: caf\xC3");
        assert!(lines.next_line().is_none());
        lines.push(b"\xA9\ndata: [DONE]\n");
        assert_eq!(lines.next_line().as_deref(), Some("data: café"));
        assert_eq!(lines.next_line().as_deref(), Some("data: [DONE]"));
        assert!(lines.next_line().is_none());
    }

    #[test]
    fn partial_line_is_held_until_its_newline_arrives() {
        let mut lines = LineBuffer::new();
        lines.push(b"data: hel");
        assert!(lines.next_line().is_none());
        lines.push(b"lo\n");
        assert_eq!(lines.next_line().as_deref(), Some("data: hello"));
    }

    #[tokio::test]
    async fn next_token_times_out_on_stalled_stream() {
        let stream = futures::stream::pending::<Result<String>>();
        let mut response = StreamingResponse::new(Box::pin(stream));
        let item = response
            .next_token(std::time::Duration::from_millis(10))
            .await;
        assert!(matches!(item, Some(Err(RepChatError::StreamTimeout(_)))));
    }
}
