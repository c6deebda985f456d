// ── Shared remote-resource plumbing ──
//
// Every resource keeps its whole state in one `watch` channel. The channel's
// write lock is the serialization point for all mutations: stream messages,
// page writes and resets all go through `send_modify` / `send_if_modified`,
// so a guard checked inside the closure is atomic with the write it guards.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::meta::{HasMeta, ResourceMeta};
use crate::stream::ResourceStream;

/// Lock a std mutex, ignoring poisoning. Critical sections never panic
/// half-way through an update.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── StreamHandle ─────────────────────────────────────────────────────

/// Something holding a transport stream that can be dropped on demand.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self);
}

/// Owning reference to one open server stream.
///
/// Closing is synchronous and idempotent: the cancellation token fires and
/// the transport stream is dropped before [`close`](Self::close) returns.
pub struct StreamHandle {
    label: String,
    cancel: CancellationToken,
    source: Arc<dyn Detach>,
}

impl StreamHandle {
    pub(crate) fn new(label: impl Into<String>, source: Arc<dyn Detach>) -> Self {
        Self {
            label: label.into(),
            cancel: CancellationToken::new(),
            source,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn close(&self) {
        self.cancel.cancel();
        self.source.detach();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ── RemoteCell ───────────────────────────────────────────────────────

/// Reactive state plus the stream slot of one resource.
///
/// The stream slot holds at most one handle. Dropping the cell closes
/// whatever stream is still registered.
pub struct RemoteCell<S> {
    pub(crate) state: watch::Sender<S>,
    stream: Mutex<Option<Arc<StreamHandle>>>,
}

impl<S> RemoteCell<S> {
    pub(crate) fn new(initial: S) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            stream: Mutex::new(None),
        }
    }

    /// Install `handle` as the resource's stream, but only while
    /// `current()` holds. A still-open previous stream is closed so a
    /// resource never owns two.
    ///
    /// `current()` runs under the slot lock that [`take_stream`](Self::take_stream)
    /// also takes. A caller that invalidates its guard and then takes the
    /// stream therefore either takes this handle or makes the install fail.
    pub(crate) fn register_if(&self, handle: &Arc<StreamHandle>, current: impl Fn() -> bool) -> bool {
        let previous = {
            let mut slot = lock(&self.stream);
            if !current() {
                return false;
            }
            slot.replace(Arc::clone(handle))
        };
        if let Some(old) = previous.filter(|old| !Arc::ptr_eq(old, handle) && !old.is_closed()) {
            tracing::warn!(label = %old.label(), "replacing a stream that was never closed");
            old.close();
        }
        true
    }

    /// Remove and return the registered stream, if any.
    pub(crate) fn take_stream(&self) -> Option<Arc<StreamHandle>> {
        lock(&self.stream).take()
    }

    /// Clear the slot, but only if it still holds `handle`.
    pub(crate) fn release(&self, handle: &Arc<StreamHandle>) {
        let mut slot = lock(&self.stream);
        if slot.as_ref().is_some_and(|registered| Arc::ptr_eq(registered, handle)) {
            *slot = None;
        }
    }

    pub(crate) fn stream(&self) -> Option<Arc<StreamHandle>> {
        lock(&self.stream).clone()
    }
}

impl<S> Drop for RemoteCell<S> {
    fn drop(&mut self) {
        let slot = self.stream.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.close();
        }
    }
}

// ── RemoteResource ───────────────────────────────────────────────────

/// A piece of reactive client state kept in sync with server data.
///
/// Implemented by [`ResourceValue`](super::ResourceValue) and
/// [`ResourceCollection`](super::ResourceCollection); the stream and
/// scheduler primitives are generic over it.
pub trait RemoteResource: Send + Sync {
    type State: HasMeta + Clone + Send + Sync + 'static;

    fn remote(&self) -> &Arc<RemoteCell<Self::State>>;

    /// Current loading/error/update-time state.
    fn meta(&self) -> ResourceMeta {
        self.remote().state.borrow().meta().clone()
    }

    /// Whether an open stream is registered.
    fn is_streaming(&self) -> bool {
        self.remote().stream().is_some_and(|h| !h.is_closed())
    }

    /// Subscribe to state changes.
    fn subscribe(&self) -> ResourceStream<Self::State> {
        ResourceStream::new(self.remote().state.subscribe())
    }
}
