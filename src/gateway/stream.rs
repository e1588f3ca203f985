//! Transparent stream forwarding.
//!
//! The pass-through path hands backend bytes to the client exactly as
//! they arrive. The tap sits in the middle for observability only: it
//! counts bytes and chunks, keeps a bounded preview for the summary
//! log, and passes errors through untouched. Dropping the tap drops the
//! upstream response with it, which cancels the backend request when
//! the client goes away.

use bytes::Bytes;
use futures_util::Stream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Bytes of body kept for the summary log.
const DEFAULT_PREVIEW_BYTES: usize = 512;

/// A forwarding tap over a byte stream.
pub struct TapStream<E> {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send + 'static>>,
    label: &'static str,
    preview: Vec<u8>,
    preview_limit: usize,
    bytes: u64,
    chunks: u64,
    errored: bool,
    finished: bool,
}

impl<E> TapStream<E> {
    /// Wraps a stream with the default preview size.
    #[must_use]
    pub fn new(
        label: &'static str,
        inner: impl Stream<Item = Result<Bytes, E>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(inner),
            label,
            preview: Vec::new(),
            preview_limit: DEFAULT_PREVIEW_BYTES,
            bytes: 0,
            chunks: 0,
            errored: false,
            finished: false,
        }
    }

    /// Sets the preview buffer size. Zero disables the preview.
    #[must_use]
    pub fn with_preview_limit(mut self, limit: usize) -> Self {
        self.preview_limit = limit;
        self.preview.truncate(limit);
        self
    }

    fn absorb(&mut self, chunk: &Bytes) {
        self.bytes += chunk.len() as u64;
        self.chunks += 1;
        let room = self.preview_limit.saturating_sub(self.preview.len());
        if room > 0 {
            let take = room.min(chunk.len());
            self.preview.extend_from_slice(&chunk[..take]);
        }
    }

    fn log_summary(&mut self, outcome: &str) {
        if self.finished {
            return;
        }
        self.finished = true;
        tracing::info!(
            label = self.label,
            outcome,
            bytes = self.bytes,
            chunks = self.chunks,
            errored = self.errored,
            preview = %String::from_utf8_lossy(&self.preview),
            "forwarded stream"
        );
    }
}

impl<E: fmt::Display> Stream for TapStream<E> {
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.absorb(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.errored = true;
                tracing::warn!(label = this.label, error = %err, "stream error passed through");
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.log_summary("complete");
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<E> Drop for TapStream<E> {
    fn drop(&mut self) {
        // Reached when the client disconnects mid-stream; the inner
        // stream (and with it the backend request) is dropped next.
        self.log_summary("cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn chunks(parts: &[&str]) -> Vec<Result<Bytes, String>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    #[tokio::test]
    async fn test_bytes_forwarded_verbatim() {
        let tap = TapStream::new(
            "test",
            futures_util::stream::iter(chunks(&["hello ", "world"])),
        );
        let collected: Vec<_> = tap.collect().await;
        let body: Vec<u8> = collected
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(body, b"hello world");
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let items: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err("connection reset".to_string()),
        ];
        let mut tap = TapStream::new("test", futures_util::stream::iter(items));

        assert_eq!(tap.next().await.unwrap().unwrap(), Bytes::from_static(b"partial"));
        assert_eq!(tap.next().await.unwrap().unwrap_err(), "connection reset");
        assert!(tap.next().await.is_none());
        assert!(tap.errored);
    }

    #[tokio::test]
    async fn test_preview_is_bounded() {
        let big = "x".repeat(4096);
        let mut tap = TapStream::new("test", futures_util::stream::iter(chunks(&[&big])))
            .with_preview_limit(16);
        let chunk = tap.next().await.unwrap().unwrap();
        assert_eq!(chunk.len(), 4096, "forwarded chunk must not be truncated");
        assert_eq!(tap.preview.len(), 16);
        assert_eq!(tap.bytes, 4096);
    }

    #[tokio::test]
    async fn test_counts() {
        let mut tap = TapStream::new("test", futures_util::stream::iter(chunks(&["ab", "cd", "e"])));
        while tap.next().await.is_some() {}
        assert_eq!(tap.bytes, 5);
        assert_eq!(tap.chunks, 3);
        assert!(tap.finished);
    }
}
