// ── Reactive resource streams ──
//
// Subscription types for observing a resource's state as it changes.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A subscription to one resource's state.
///
/// Gives both the snapshot taken at subscription time and change
/// notification, either through [`changed`](Self::changed) or by converting
/// into a `Stream`.
pub struct ResourceStream<S: Clone + Send + Sync + 'static> {
    current: S,
    receiver: watch::Receiver<S>,
}

impl<S: Clone + Send + Sync + 'static> ResourceStream<S> {
    pub(crate) fn new(mut receiver: watch::Receiver<S>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or by the last `changed()`.
    pub fn current(&self) -> &S {
        &self.current
    }

    /// The latest state, which may be newer than `current()`.
    pub fn latest(&self) -> S {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change and return the new state.
    /// Returns `None` once the resource has been dropped.
    pub async fn changed(&mut self) -> Option<S> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Wait until `pred` holds for the state and return that state.
    /// Returns `None` if the resource is dropped first.
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&S) -> bool) -> Option<S> {
        let snap = self.receiver.wait_for(|s| pred(s)).await.ok()?.clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> ResourceWatchStream<S> {
        ResourceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current state first, then a new state each time the resource
/// is mutated. Intermediate states may be skipped.
pub struct ResourceWatchStream<S: Clone + Send + Sync + 'static> {
    inner: WatchStream<S>,
}

impl<S: Clone + Send + Sync + 'static> Stream for ResourceWatchStream<S> {
    type Item = S;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
