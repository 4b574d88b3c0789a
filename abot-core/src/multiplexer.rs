// ABOUTME: Fan-in of many independent async streams into one arrival-ordered stream
// ABOUTME: Built on futures SelectAll: one pending poll per live source, ended sources dropped

use futures_util::stream::{BoxStream, SelectAll, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Merges a dynamic set of sources.
///
/// Each source keeps its own order; sources interleave in first-ready
/// order. Nothing is buffered beyond the item currently being handed out, so
/// a fast source waits for the consumer. The merged stream ends once every
/// source has ended; sources may still be pushed afterwards.
pub struct StreamMultiplexer<T> {
    sources: SelectAll<BoxStream<'static, T>>,
}

impl<T> StreamMultiplexer<T> {
    pub fn new() -> Self {
        Self {
            sources: SelectAll::new(),
        }
    }

    /// Add a source. It is polled starting with the next pull.
    pub fn push(&mut self, source: BoxStream<'static, T>) {
        self.sources.push(source);
    }

    /// Number of sources that have not ended yet
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<T> Default for StreamMultiplexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<BoxStream<'static, T>> for StreamMultiplexer<T> {
    fn from_iter<I: IntoIterator<Item = BoxStream<'static, T>>>(iter: I) -> Self {
        let mut mux = Self::new();
        for source in iter {
            mux.push(source);
        }
        mux
    }
}

impl<T> Stream for StreamMultiplexer<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.sources).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.sources.size_hint()
    }
}
