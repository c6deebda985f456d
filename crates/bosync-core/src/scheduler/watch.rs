// ── Reactive watchers ──
//
// Bind a resource (or tracker) to a key that may change at any rate. Each
// key change goes through a `TaskQueue`, so exactly one operation runs at a
// time and only the newest key is acted on.

use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex};

use bosync_api::{Endpoint, EndpointResolver, MessageStream};
use tokio_util::sync::CancellationToken;

use super::queue::{TaskQueue, Ticket};
use crate::action::{ActionTracker, track_guarded};
use crate::error::CoreError;
use crate::pull::{close_resource, pull_guarded};
use crate::store::RemoteResource;
use crate::store::remote::lock;

/// The key plus the pause flag, as seen by the queue.
#[derive(Debug, Clone, PartialEq)]
struct Keyed<K> {
    key: K,
    paused: bool,
}

/// Owner of one running watcher.
///
/// Dropping the handle disposes it: the worker stops and any open stream
/// is closed.
pub struct WatchHandle<K> {
    queue: TaskQueue<Keyed<K>>,
    cancel: CancellationToken,
    input: Mutex<Keyed<K>>,
    close: Box<dyn Fn() + Send + Sync>,
}

impl<K> WatchHandle<K>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
{
    /// Point the watcher at a new key. Equal keys are ignored.
    pub fn set_key(&self, key: K) -> bool {
        let mut input = lock(&self.input);
        if input.key == key {
            return false;
        }
        input.key = key;
        self.queue.push(input.clone())
    }

    /// Pause or resume. Pausing closes the open stream before returning;
    /// resuming schedules a fresh operation through the queue.
    pub fn set_paused(&self, paused: bool) -> bool {
        let mut input = lock(&self.input);
        if input.paused == paused {
            return false;
        }
        input.paused = paused;
        // Move the tip first so an operation still in flight sees itself
        // superseded and cannot register a stream after the close below.
        self.queue.push(input.clone());
        if paused {
            (self.close)();
        } else {
            // The worker may never have seen the pause.
            self.queue.rerun();
        }
        true
    }

    /// Run the current key again, e.g. to recover from a stream error.
    pub fn rerun(&self) -> bool {
        self.queue.rerun()
    }

    pub fn key(&self) -> K {
        lock(&self.input).key.clone()
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.input).paused
    }

    /// Whether an operation is running right now.
    pub fn is_busy(&self) -> bool {
        self.queue.active().is_some()
    }
}

impl<K> WatchHandle<K> {
    /// Stop the worker and close the stream. Idempotent.
    pub fn dispose(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            // Invalidates the ticket of an operation still in flight.
            self.queue.rerun();
            (self.close)();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<K> Drop for WatchHandle<K> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn start<K, F, Fut>(
    label: &str,
    initial: Keyed<K>,
    close: Box<dyn Fn() + Send + Sync>,
    run: F,
) -> WatchHandle<K>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    F: FnMut(Keyed<K>, Ticket<Keyed<K>>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
{
    let queue = TaskQueue::new(label);
    let cancel = CancellationToken::new();
    queue.push(initial.clone());
    queue.spawn(cancel.clone(), run);
    WatchHandle {
        queue,
        cancel,
        input: Mutex::new(initial),
        close,
    }
}

/// Keep `resource` streaming for the current key.
///
/// Every time the key (or pause flag) changes, the worker closes the
/// resource's stream and, unless paused, opens a new one with `open`.
/// Requires a tokio runtime.
pub fn watch_resource<R, K, M, O, A>(
    label: impl Into<String>,
    resource: Arc<R>,
    resolver: Arc<dyn EndpointResolver>,
    initial: K,
    open: O,
    apply: A,
) -> WatchHandle<K>
where
    R: RemoteResource + 'static,
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    M: Send + 'static,
    O: Fn(Endpoint, &K) -> MessageStream<M> + Send + Sync + 'static,
    A: FnMut(&mut R::State, M) -> bool + Clone + Send + 'static,
{
    let label: Arc<str> = Arc::from(label.into());
    let open = Arc::new(open);

    let closer = Arc::clone(&resource);
    let close = Box::new(move || close_resource(&*closer));

    let run = {
        let label = Arc::clone(&label);
        move |keyed: Keyed<K>, ticket: Ticket<Keyed<K>>| {
            let label = Arc::clone(&label);
            let resource = Arc::clone(&resource);
            let resolver = Arc::clone(&resolver);
            let open = Arc::clone(&open);
            let apply = apply.clone();
            async move {
                close_resource(&*resource);
                if keyed.paused {
                    return Ok(());
                }
                pull_guarded(
                    &label,
                    &*resource,
                    &*resolver,
                    |endpoint| open(endpoint, &keyed.key),
                    apply,
                    || ticket.is_current(),
                )
                .await
                .map(drop)
            }
        }
    };

    start(
        &label,
        Keyed {
            key: initial,
            paused: false,
        },
        close,
        run,
    )
}

/// Keep `tracker` holding the response for the current request.
///
/// A `None` request clears the response. A response that arrives after the
/// request changed is dropped. Pausing stops new requests but keeps the
/// last response. Requires a tokio runtime.
pub fn watch_action<K, V, F, Fut>(
    label: impl Into<String>,
    tracker: Arc<ActionTracker<V>>,
    resolver: Arc<dyn EndpointResolver>,
    initial: Option<K>,
    action: F,
) -> WatchHandle<Option<K>>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn(Endpoint, K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, bosync_api::Error>> + Send + 'static,
{
    let label: Arc<str> = Arc::from(label.into());
    let action = Arc::new(action);

    let run = {
        let label = Arc::clone(&label);
        move |keyed: Keyed<Option<K>>, ticket: Ticket<Keyed<Option<K>>>| {
            let label = Arc::clone(&label);
            let tracker = Arc::clone(&tracker);
            let resolver = Arc::clone(&resolver);
            let action = Arc::clone(&action);
            async move {
                if keyed.paused {
                    return Ok(());
                }
                let Some(request) = keyed.key else {
                    tracker.clear_response();
                    return Ok(());
                };
                track_guarded(
                    &label,
                    &tracker,
                    &*resolver,
                    |endpoint| action(endpoint, request),
                    || ticket.is_current(),
                )
                .await
                .map(drop)
            }
        }
    };

    start(
        &label,
        Keyed {
            key: initial,
            paused: false,
        },
        Box::new(|| {}),
        run,
    )
}
