// ── Tip-only task queue ──
//
// A single worker runs one operation at a time for the newest key. Keys
// pushed while an operation is running overwrite each other in the `next`
// slot; only the tip is acted on once the worker is free again.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

#[derive(Debug, Clone)]
struct Slot<K> {
    key: K,
    /// Bumped by [`TaskQueue::rerun`] so an unchanged key runs again.
    /// Carried over by `push`, never reset.
    rerun: u64,
}

struct Shared<K> {
    label: String,
    next: watch::Sender<Option<Slot<K>>>,
    active: watch::Sender<Option<K>>,
}

/// Proof that an operation was started for a particular queue tip.
///
/// Operations check [`is_current`](Self::is_current) before committing
/// anything that a newer key would invalidate.
pub struct Ticket<K> {
    shared: Arc<Shared<K>>,
    key: K,
    rerun: u64,
}

impl<K: PartialEq> Ticket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Whether the queue tip is still the key this operation runs for.
    pub fn is_current(&self) -> bool {
        self.shared
            .next
            .borrow()
            .as_ref()
            .is_some_and(|tip| tip.key == self.key && tip.rerun == self.rerun)
    }
}

/// Serializes operations keyed by `K`, collapsing superseded keys.
pub struct TaskQueue<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for TaskQueue<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> TaskQueue<K> {
    /// Run the tip again even though it has not changed, e.g. after a
    /// failure. Returns `false` if nothing was ever pushed.
    pub fn rerun(&self) -> bool {
        self.shared.next.send_if_modified(|slot| match slot {
            Some(tip) => {
                tip.rerun += 1;
                true
            }
            None => false,
        })
    }
}

impl<K> TaskQueue<K>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
{
    pub fn new(label: impl Into<String>) -> Self {
        let (next, _) = watch::channel(None);
        let (active, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                label: label.into(),
                next,
                active,
            }),
        }
    }

    /// Make `key` the tip. Returns `false` (and does nothing) if it equals
    /// the current tip.
    pub fn push(&self, key: K) -> bool {
        self.shared.next.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|tip| tip.key == key) {
                return false;
            }
            let rerun = slot.as_ref().map_or(0, |tip| tip.rerun);
            *slot = Some(Slot { key, rerun });
            true
        })
    }

    /// The newest key, processed or not.
    pub fn latest(&self) -> Option<K> {
        self.shared.next.borrow().as_ref().map(|tip| tip.key.clone())
    }

    /// The key of the operation currently running.
    pub fn active(&self) -> Option<K> {
        self.shared.active.borrow().clone()
    }

    pub fn subscribe_active(&self) -> watch::Receiver<Option<K>> {
        self.shared.active.subscribe()
    }

    /// Start the worker. It runs until `cancel` fires; a running operation
    /// is dropped at its next suspension point when that happens.
    /// Operation failures are logged and never stop the worker.
    pub fn spawn<F, Fut>(&self, cancel: CancellationToken, run: F) -> JoinHandle<()>
    where
        F: FnMut(K, Ticket<K>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        tokio::spawn(work(Arc::clone(&self.shared), cancel, run))
    }
}

async fn work<K, F, Fut>(shared: Arc<Shared<K>>, cancel: CancellationToken, mut run: F)
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    F: FnMut(K, Ticket<K>) -> Fut,
    Fut: Future<Output = Result<(), CoreError>>,
{
    let mut next = shared.next.subscribe();
    let mut done: Option<(K, u64)> = None;

    loop {
        let tip = next
            .borrow_and_update()
            .as_ref()
            .map(|tip| (tip.key.clone(), tip.rerun))
            .filter(|tip| done.as_ref() != Some(tip));

        if let Some((key, rerun)) = tip {
            done = Some((key.clone(), rerun));
            shared.active.send_replace(Some(key.clone()));
            tracing::debug!(label = %shared.label, ?key, "running");

            let ticket = Ticket {
                shared: Arc::clone(&shared),
                key: key.clone(),
                rerun,
            };
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = run(key, ticket) => Some(result),
            };
            shared.active.send_replace(None);

            match outcome {
                None => break,
                Some(Err(e)) => {
                    tracing::warn!(label = %shared.label, error = %e, "operation failed");
                }
                Some(Ok(())) => {}
            }
        } else {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = next.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(label = %shared.label, "worker stopped");
}
