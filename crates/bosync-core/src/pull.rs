// ── Stream lifecycle ──
//
// `pull_resource` opens one server stream for a resource and pumps its
// messages into the resource's state; `close_resource` tears it down. The
// transport stream lives in a slot shared between the reader task and the
// stream handle, so closing drops the transport stream synchronously
// instead of waiting for the reader to notice.

use std::future::poll_fn;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use bosync_api::{Endpoint, EndpointResolver, MessageStream};
use futures_util::StreamExt;

use crate::error::CoreError;
use crate::store::remote::{Detach, lock};
use crate::store::{HasMeta, RemoteCell, RemoteResource, ResourceError, StreamHandle};

/// Holder for the transport stream of one pull.
struct StreamSlot<M> {
    stream: Mutex<Option<MessageStream<M>>>,
}

impl<M> StreamSlot<M> {
    fn empty() -> Self {
        Self {
            stream: Mutex::new(None),
        }
    }

    /// Install the opened stream, unless the handle was closed while the
    /// stream was being opened.
    fn fill(&self, stream: MessageStream<M>, handle: &StreamHandle) -> bool {
        let mut slot = lock(&self.stream);
        if handle.is_closed() {
            return false;
        }
        *slot = Some(stream);
        true
    }

    fn poll_next(&self, cx: &mut Context<'_>) -> Poll<Option<Result<M, bosync_api::Error>>> {
        match lock(&self.stream).as_mut() {
            Some(stream) => stream.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl<M: Send> Detach for StreamSlot<M> {
    fn detach(&self) {
        // Drop outside the lock; a transport's drop glue may be slow.
        let stream = lock(&self.stream).take();
        drop(stream);
    }
}

/// Open a server stream and keep `resource` in sync with it.
///
/// `apply` folds one message into the state and returns whether anything
/// changed; every change marks the resource fresh. The stream handle is
/// registered on the resource before the stream is opened, so no message
/// can arrive for an unregistered stream. On stream error the error is
/// recorded as `stream_error` and the stream is not reopened.
///
/// Returns the handle of the new stream. Fails only when the endpoint
/// cannot be resolved, in which case the failure is also recorded on the
/// resource.
pub async fn pull_resource<R, M, O, A>(
    label: &str,
    resource: &R,
    resolver: &dyn EndpointResolver,
    open: O,
    apply: A,
) -> Result<Arc<StreamHandle>, CoreError>
where
    R: RemoteResource + ?Sized,
    M: Send + 'static,
    O: FnOnce(Endpoint) -> MessageStream<M>,
    A: FnMut(&mut R::State, M) -> bool + Send + 'static,
{
    pull_guarded(label, resource, resolver, open, apply, || true).await
}

/// [`pull_resource`] for callers that may be superseded while the endpoint
/// resolves. Nothing is written to the resource and no stream is opened
/// once `current()` turns false; the returned handle is then already
/// closed.
pub(crate) async fn pull_guarded<R, M, O, A, G>(
    label: &str,
    resource: &R,
    resolver: &dyn EndpointResolver,
    open: O,
    apply: A,
    current: G,
) -> Result<Arc<StreamHandle>, CoreError>
where
    R: RemoteResource + ?Sized,
    M: Send + 'static,
    O: FnOnce(Endpoint) -> MessageStream<M>,
    A: FnMut(&mut R::State, M) -> bool + Send + 'static,
    G: Fn() -> bool,
{
    let cell = resource.remote();
    cell.state.send_if_modified(|s| {
        if !current() {
            return false;
        }
        let meta = s.meta_mut();
        meta.loading = true;
        meta.stream_error = None;
        true
    });

    let endpoint = match resolver.resolve().await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            let recorded = cell.state.send_if_modified(|s| {
                if !current() {
                    return false;
                }
                let meta = s.meta_mut();
                meta.loading = false;
                meta.stream_error = Some(ResourceError::new(label, e.clone()));
                true
            });
            if recorded {
                tracing::warn!(label, error = %e, "cannot resolve endpoint for stream");
            }
            return Err(e.into());
        }
    };

    let slot = Arc::new(StreamSlot::<M>::empty());
    let handle = Arc::new(StreamHandle::new(label, Arc::clone(&slot) as Arc<dyn Detach>));
    if !cell.register_if(&handle, &current) {
        tracing::debug!(label, "superseded before the stream opened");
        handle.close();
        return Ok(handle);
    }

    if !slot.fill(open(endpoint), &handle) {
        tracing::debug!(label, "stream closed while opening");
        return Ok(handle);
    }
    tracing::debug!(label, "stream opened");

    tokio::spawn(read_stream(
        label.to_owned(),
        Arc::downgrade(cell),
        Arc::clone(&handle),
        slot,
        apply,
    ));

    Ok(handle)
}

/// Close the resource's stream, if any, and clear its stream error.
///
/// Synchronous: no message is applied after this returns. The last known
/// value is kept.
pub fn close_resource<R: RemoteResource + ?Sized>(resource: &R) {
    let cell = resource.remote();
    if let Some(handle) = cell.take_stream() {
        handle.close();
        tracing::debug!(label = %handle.label(), "stream closed");
    }
    // Waits for an in-flight apply to finish.
    cell.state.send_if_modified(|s| {
        let meta = s.meta_mut();
        let changed = meta.loading || meta.stream_error.is_some();
        meta.loading = false;
        meta.stream_error = None;
        changed
    });
}

async fn read_stream<S, M, A>(
    label: String,
    cell: Weak<RemoteCell<S>>,
    handle: Arc<StreamHandle>,
    slot: Arc<StreamSlot<M>>,
    mut apply: A,
) where
    S: HasMeta + Send + Sync,
    M: Send,
    A: FnMut(&mut S, M) -> bool + Send,
{
    loop {
        let next = tokio::select! {
            biased;
            () = handle.cancelled() => break,
            next = poll_fn(|cx| slot.poll_next(cx)) => next,
        };

        let Some(cell) = cell.upgrade() else {
            break;
        };

        match next {
            Some(Ok(message)) => {
                cell.state.send_if_modified(|state| {
                    if handle.is_closed() {
                        return false;
                    }
                    if apply(state, message) {
                        state.meta_mut().touch();
                        return true;
                    }
                    // First message clears loading even if it changed nothing.
                    std::mem::replace(&mut state.meta_mut().loading, false)
                });
            }
            Some(Err(e)) => {
                let recorded = cell.state.send_if_modified(|state| {
                    if handle.is_closed() {
                        return false;
                    }
                    let meta = state.meta_mut();
                    meta.loading = false;
                    meta.stream_error = Some(ResourceError::new(&label, e.clone()));
                    true
                });
                if recorded {
                    tracing::warn!(label = %label, error = %e, "stream failed");
                }
                cell.release(&handle);
                handle.close();
                break;
            }
            None => {
                if !handle.is_closed() {
                    tracing::debug!(label = %label, "stream ended by server");
                    cell.state.send_if_modified(|state| {
                        std::mem::replace(&mut state.meta_mut().loading, false)
                    });
                }
                cell.release(&handle);
                handle.close();
                break;
            }
        }
    }
}
