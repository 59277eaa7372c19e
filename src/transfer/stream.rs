//! Completion-tracking stream wrapper

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;

/// Passes items through and fires a callback once the inner stream ends
/// cleanly. An error item disarms the callback.
pub struct CompletionStream<S> {
    inner: S,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl<S> CompletionStream<S> {
    pub fn new<F>(inner: S, on_complete: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner,
            on_complete: Some(Box::new(on_complete)),
        }
    }
}

impl<S, T, E> Stream for CompletionStream<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
{
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(None) => {
                if let Some(callback) = this.on_complete.take() {
                    callback();
                }
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.on_complete = None;
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}
