//! One-shot request tracking.
//!
//! [`track_action`] runs a single request against an [`ActionTracker`] and
//! records loading, error, response and duration. Each call is a new
//! attempt; only the newest attempt is allowed to write to the tracker, so
//! overlapping calls never interleave their writes and a slow, superseded
//! response never overwrites a newer one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bosync_api::{Endpoint, EndpointResolver};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CoreError;
use crate::store::ResourceError;

/// Observable state of an [`ActionTracker`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActionState<V> {
    pub loading: bool,
    pub error: Option<ResourceError>,
    pub response: Option<V>,
    /// Wall-clock time of the last completed attempt.
    pub duration: Option<Duration>,
}

impl<V> Default for ActionState<V> {
    fn default() -> Self {
        Self {
            loading: false,
            error: None,
            response: None,
            duration: None,
        }
    }
}

/// Identity of one attempt on a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempt(u64);

/// Tracks the progress and outcome of one logical request.
pub struct ActionTracker<V> {
    state: watch::Sender<ActionState<V>>,
    attempt: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> ActionTracker<V> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ActionState::default());
        Self {
            state,
            attempt: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ActionState<V> {
        self.state.borrow().clone()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn response(&self) -> Option<V> {
        self.state.borrow().response.clone()
    }

    pub fn error(&self) -> Option<ResourceError> {
        self.state.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActionState<V>> {
        self.state.subscribe()
    }

    /// The newest attempt started on this tracker.
    pub fn current_attempt(&self) -> Attempt {
        Attempt(self.attempt.load(Ordering::SeqCst))
    }

    /// Start a new attempt, superseding any attempt still in flight.
    pub fn begin(&self) -> Attempt {
        let attempt = Attempt(self.attempt.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
        attempt
    }

    /// Record the outcome of `attempt`. Returns `false` if the attempt was
    /// superseded and nothing was written.
    pub fn finish(
        &self,
        attempt: Attempt,
        label: &str,
        elapsed: Duration,
        result: &Result<V, bosync_api::Error>,
    ) -> bool {
        self.finish_if(attempt, label, elapsed, result, || true, |_| {})
    }

    /// Like [`finish`](Self::finish), but only the loading flag is cleared
    /// when `current()` is false. `commit` sees a recorded success under
    /// the tracker's write lock.
    fn finish_if(
        &self,
        attempt: Attempt,
        label: &str,
        elapsed: Duration,
        result: &Result<V, bosync_api::Error>,
        current: impl Fn() -> bool,
        commit: impl FnOnce(&V),
    ) -> bool {
        let mut recorded = false;
        self.state.send_if_modified(|s| {
            if self.current_attempt() != attempt {
                return false;
            }
            s.loading = false;
            if !current() {
                return true;
            }
            s.duration = Some(elapsed);
            match result {
                Ok(value) => {
                    commit(value);
                    s.response = Some(value.clone());
                    s.error = None;
                }
                Err(e) => s.error = Some(ResourceError::new(label, e.clone())),
            }
            recorded = true;
            true
        });
        recorded
    }

    /// Forget the last response, e.g. when the request became empty.
    /// Supersedes any attempt in flight.
    pub fn clear_response(&self) {
        self.attempt.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|s| {
            let changed = s.loading || s.response.is_some() || s.error.is_some();
            s.loading = false;
            s.response = None;
            s.error = None;
            changed
        });
    }

    /// Back to the initial state. Supersedes any attempt in flight.
    pub fn reset(&self) {
        self.attempt.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(ActionState::default());
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ActionTracker<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `action` once against `tracker`.
///
/// Resolves the endpoint, invokes the action, and records the outcome. A
/// failure is recorded as `{name: label, error}`, logged, and returned; the
/// previous response is kept. No retries.
pub async fn track_action<V, F, Fut>(
    label: &str,
    tracker: &ActionTracker<V>,
    resolver: &dyn EndpointResolver,
    action: F,
) -> Result<V, CoreError>
where
    V: Clone + Send + Sync + 'static,
    F: FnOnce(Endpoint) -> Fut,
    Fut: Future<Output = Result<V, bosync_api::Error>>,
{
    track_guarded(label, tracker, resolver, action, || true).await
}

/// [`track_action`] for callers that may be superseded while the request
/// is in flight. The result is still returned, but it is only recorded if
/// `current()` holds when it arrives.
pub(crate) async fn track_guarded<V, F, Fut, G>(
    label: &str,
    tracker: &ActionTracker<V>,
    resolver: &dyn EndpointResolver,
    action: F,
    current: G,
) -> Result<V, CoreError>
where
    V: Clone + Send + Sync + 'static,
    F: FnOnce(Endpoint) -> Fut,
    Fut: Future<Output = Result<V, bosync_api::Error>>,
    G: Fn() -> bool,
{
    track_committed(label, tracker, resolver, action, current, |_| {}).await
}

/// [`track_guarded`] that also hands a recorded success to `commit`.
///
/// `commit` runs only for the newest attempt, and only while `current()`
/// holds, so a write that lost to a newer one never applies its response
/// anywhere else either.
pub(crate) async fn track_committed<V, F, Fut, G, C>(
    label: &str,
    tracker: &ActionTracker<V>,
    resolver: &dyn EndpointResolver,
    action: F,
    current: G,
    commit: C,
) -> Result<V, CoreError>
where
    V: Clone + Send + Sync + 'static,
    F: FnOnce(Endpoint) -> Fut,
    Fut: Future<Output = Result<V, bosync_api::Error>>,
    G: Fn() -> bool,
    C: FnOnce(&V),
{
    let attempt = tracker.begin();
    let started = Instant::now();

    let result = match resolver.resolve().await {
        Ok(endpoint) => action(endpoint).await,
        Err(e) => Err(e),
    };

    if !tracker.finish_if(attempt, label, started.elapsed(), &result, current, commit) {
        tracing::debug!(label, "discarding result of superseded attempt");
        return result.map_err(CoreError::from);
    }

    result.map_err(|e| {
        tracing::warn!(label, error = %e, "action failed");
        CoreError::from(e)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bosync_api::{Code, Error, StaticEndpoint};
    use tokio::sync::oneshot;

    use super::*;

    fn resolver() -> StaticEndpoint {
        StaticEndpoint::new(Endpoint::parse("https://bos.test").unwrap())
    }

    #[tokio::test]
    async fn success_records_response_and_duration() {
        let tracker = ActionTracker::new();
        let value = track_action("get", &tracker, &resolver(), |_| async { Ok(42) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        let state = tracker.state();
        assert!(!state.loading);
        assert_eq!(state.response, Some(42));
        assert!(state.error.is_none());
        assert!(state.duration.is_some());
    }

    #[tokio::test]
    async fn failure_keeps_previous_response() {
        let tracker = ActionTracker::new();
        track_action("get", &tracker, &resolver(), |_| async { Ok(1) })
            .await
            .unwrap();

        let err = track_action("get", &tracker, &resolver(), |_| async {
            Err::<i32, _>(Error::status(Code::Internal, "boom"))
        })
        .await
        .unwrap_err();

        assert_eq!(err, CoreError::Api(Error::status(Code::Internal, "boom")));
        let state = tracker.state();
        assert_eq!(state.response, Some(1));
        assert_eq!(state.error.as_ref().unwrap().name, "get");
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn success_after_failure_clears_error() {
        let tracker = ActionTracker::new();
        let _ = track_action("update", &tracker, &resolver(), |_| async {
            Err::<&str, _>(Error::Unavailable("down".into()))
        })
        .await;
        assert!(tracker.error().is_some());

        track_action("update", &tracker, &resolver(), |_| async { Ok("done") })
            .await
            .unwrap();

        assert!(tracker.error().is_none());
        assert_eq!(tracker.response(), Some("done"));
    }

    #[tokio::test]
    async fn loading_is_set_while_in_flight() {
        let tracker = ActionTracker::new();
        let (tx, rx) = oneshot::channel::<u8>();
        let resolver = resolver();

        let call = track_action("slow", &tracker, &resolver, |_| async move {
            Ok(rx.await.unwrap())
        });
        tokio::pin!(call);

        assert!(tokio_test::task::spawn(&mut call).poll().is_pending());
        assert!(tracker.loading());

        tx.send(7).unwrap();
        assert_eq!(call.await.unwrap(), 7);
        assert!(!tracker.loading());
    }

    #[tokio::test]
    async fn superseded_attempt_does_not_overwrite() {
        let tracker = ActionTracker::new();

        let stale = tracker.begin();
        let fresh = tracker.begin();

        assert!(tracker.finish(fresh, "x", Duration::ZERO, &Ok(2)));
        assert!(!tracker.finish(stale, "x", Duration::ZERO, &Ok(1)));
        assert_eq!(tracker.response(), Some(2));
    }

    #[tokio::test]
    async fn clear_response_supersedes_in_flight() {
        let tracker = ActionTracker::new();
        let attempt = tracker.begin();
        tracker.clear_response();

        assert!(!tracker.finish(attempt, "x", Duration::ZERO, &Ok(5)));
        let state = tracker.state();
        assert!(state.response.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn guarded_result_is_returned_but_not_recorded() {
        let tracker = ActionTracker::new();
        let value = track_guarded("get", &tracker, &resolver(), |_| async { Ok(9) }, || false)
            .await
            .unwrap();

        assert_eq!(value, 9);
        let state = tracker.state();
        assert!(state.response.is_none());
        assert!(state.duration.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn commit_sees_only_the_newest_attempt() {
        let tracker = ActionTracker::new();
        let resolver = resolver();
        let committed = std::sync::Mutex::new(Vec::new());
        let (release, gate) = oneshot::channel::<()>();

        let slow = track_committed(
            "update",
            &tracker,
            &resolver,
            |_| async move {
                gate.await.unwrap();
                Ok(1)
            },
            || true,
            |v| committed.lock().unwrap().push(*v),
        );
        let fast = async {
            let value = track_committed(
                "update",
                &tracker,
                &resolver,
                |_| async { Ok(2) },
                || true,
                |v| committed.lock().unwrap().push(*v),
            )
            .await;
            release.send(()).unwrap();
            value
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert_eq!(slow.unwrap(), 1);
        assert_eq!(fast.unwrap(), 2);
        assert_eq!(*committed.lock().unwrap(), vec![2]);
        assert_eq!(tracker.response(), Some(2));
    }

    #[tokio::test]
    async fn endpoint_failure_is_an_attempt_failure() {
        struct Broken;
        impl EndpointResolver for Broken {
            fn resolve(
                &self,
            ) -> futures_util::future::BoxFuture<'_, Result<Endpoint, Error>> {
                Box::pin(async { Err(Error::Endpoint("no config".into())) })
            }
        }

        let tracker: ActionTracker<u8> = ActionTracker::new();
        let err = track_action("get", &tracker, &Broken, |_| async { Ok(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Api(Error::Endpoint(_))));
        assert!(tracker.error().is_some());
    }
}
