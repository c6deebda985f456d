// ── Paginated collection with live merge ──
//
// A `Collection` fills a `ResourceCollection` from a paged list call while a
// change stream for the same query keeps it current. Every `query()` starts
// a new generation and `reset()` retires the current one; page writes and
// streamed changes check this inside the resource's write lock, so nothing
// from an old or reset query can land in the map after it was cleared.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bosync_api::{
    Change, Endpoint, EndpointResolver, ListPage, MessageStream, PageRequest, UnaryFuture,
};
use tokio::sync::watch;

use super::collection::{CollectionState, ResourceCollection, set_collection};
use super::remote::{RemoteCell, RemoteResource};
use crate::action::{ActionTracker, track_action};
use crate::config::SyncOptions;
use crate::pull::{close_resource, pull_guarded};
use crate::store::ResourceError;
use crate::stream::ResourceStream;

/// Where a [`Collection`] gets its pages and live changes from.
pub trait PageSource<Q, V>: Send + Sync {
    /// Fetch one page of items matching `query`.
    fn list(&self, endpoint: Endpoint, query: &Q, page: PageRequest) -> UnaryFuture<ListPage<V>>;

    /// Stream changes to items matching `query`. Each message is applied as
    /// one batch.
    fn pull(&self, endpoint: Endpoint, query: &Q) -> MessageStream<Vec<Change<V>>>;

    /// Map key of an item.
    fn id(&self, item: &V) -> String;
}

/// Identity of one `query()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryToken(u64);

/// Paging progress for the current query.
#[derive(Debug, Clone, PartialEq)]
pub struct PageState<Q> {
    pub token: QueryToken,
    pub query: Option<Q>,
    /// Cursor for the next page; `None` before the first page and after
    /// the last.
    pub next_page_token: Option<String>,
    pub total_size: Option<u32>,
    /// Demand signal from the consumer. Paging stops while false.
    pub needs_more_pages: bool,
    /// The last page had no continuation.
    pub exhausted: bool,
    /// Paging stopped at the page limit.
    pub truncated: bool,
    pub pages_fetched: u32,
    /// A pager loop is active for `token`.
    pub running: bool,
    /// The change stream for `token` has been requested.
    pub streaming: bool,
}

impl<Q> Default for PageState<Q> {
    fn default() -> Self {
        Self {
            token: QueryToken::default(),
            query: None,
            next_page_token: None,
            total_size: None,
            needs_more_pages: true,
            exhausted: false,
            truncated: false,
            pages_fetched: 0,
            running: false,
            streaming: false,
        }
    }
}

struct Inner<Q, V: Send + Sync + 'static> {
    label: String,
    options: SyncOptions,
    resolver: Arc<dyn EndpointResolver>,
    source: Arc<dyn PageSource<Q, V>>,
    items: ResourceCollection<V>,
    fetching: ActionTracker<ListPage<V>>,
    generation: Arc<AtomicU64>,
    pager: watch::Sender<PageState<Q>>,
}

/// A paged, live-updated collection for one query at a time.
///
/// Cheap to clone; clones share state. Dropping the last clone closes the
/// change stream.
pub struct Collection<Q, V: Send + Sync + 'static> {
    inner: Arc<Inner<Q, V>>,
}

impl<Q, V: Send + Sync + 'static> Clone for Collection<Q, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Q, V> Collection<Q, V>
where
    Q: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        label: impl Into<String>,
        source: Arc<dyn PageSource<Q, V>>,
        resolver: Arc<dyn EndpointResolver>,
        options: SyncOptions,
    ) -> Self {
        let ids = Arc::clone(&source);
        let (pager, _) = watch::channel(PageState::default());
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                options,
                resolver,
                source,
                items: ResourceCollection::new(move |item| ids.id(item)),
                fetching: ActionTracker::new(),
                generation: Arc::new(AtomicU64::new(0)),
                pager,
            }),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start over with `query`: drop all items, close the stream and begin
    /// paging in the background. Requires a tokio runtime.
    pub fn query(&self, query: Q) -> QueryToken {
        let inner = &self.inner;
        let token = QueryToken(inner.generation.fetch_add(1, Ordering::SeqCst) + 1);

        close_resource(&inner.items);
        inner.fetching.reset();

        let mut needs_more = true;
        inner.pager.send_modify(|p| {
            needs_more = p.needs_more_pages;
            *p = PageState {
                token,
                query: Some(query),
                needs_more_pages: needs_more,
                ..PageState::default()
            };
        });
        inner.items.remote().state.send_modify(|s| {
            s.clear();
            s.meta.loading = needs_more;
        });

        tracing::debug!(label = %inner.label, ?token, "new query");
        self.spawn_pager(token);
        token
    }

    /// Run the pager for the current query on the calling task, until the
    /// last page, the page limit, or a `false` demand signal. Returns at
    /// once if a pager is already running for this query.
    pub async fn fetch_pages(&self) {
        let token = self.query_token();
        if self.inner.claim_pager(token) {
            self.inner.run_pager(token).await;
        }
    }

    /// Set the demand signal. Turning it on resumes paging where it
    /// stopped and marks the collection loading if there is anything left
    /// to fetch; turning it off clears the loading flag. Requires a tokio
    /// runtime.
    pub fn set_needs_more_pages(&self, needs_more: bool) {
        let mut pending = false;
        let flipped = self.inner.pager.send_if_modified(|p| {
            if p.needs_more_pages == needs_more {
                return false;
            }
            p.needs_more_pages = needs_more;
            pending = p.query.is_some() && !p.exhausted && !p.truncated;
            true
        });
        if !flipped {
            return;
        }

        let loading = needs_more && pending;
        self.inner.items.remote().state.send_if_modified(|s| {
            if s.meta.loading == loading {
                return false;
            }
            s.meta.loading = loading;
            true
        });
        if needs_more {
            self.spawn_pager(self.query_token());
        }
    }

    /// Close the stream and drop all items and paging progress. The query
    /// token is kept, but nothing started for it before the reset lands
    /// afterwards: neither a page in flight nor a stream still opening.
    pub fn reset(&self) {
        let inner = &self.inner;
        inner.pager.send_modify(|p| {
            p.query = None;
            p.next_page_token = None;
            p.total_size = None;
            p.exhausted = false;
            p.truncated = false;
            p.pages_fetched = 0;
            p.streaming = false;
        });
        close_resource(&inner.items);
        inner.items.clear();
        tracing::debug!(label = %inner.label, "reset");
    }

    fn spawn_pager(&self, token: QueryToken) {
        if self.inner.claim_pager(token) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_pager(token).await });
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn query_token(&self) -> QueryToken {
        self.inner.pager.borrow().token
    }

    pub fn current_query(&self) -> Option<Q> {
        self.inner.pager.borrow().query.clone()
    }

    pub fn items(&self) -> Vec<Arc<V>> {
        self.inner.items.items()
    }

    pub fn get(&self, id: &str) -> Option<Arc<V>> {
        self.inner.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }

    pub fn total_size(&self) -> Option<u32> {
        self.inner.pager.borrow().total_size
    }

    pub fn next_page_token(&self) -> Option<String> {
        self.inner.pager.borrow().next_page_token.clone()
    }

    pub fn needs_more_pages(&self) -> bool {
        self.inner.pager.borrow().needs_more_pages
    }

    pub fn page_state(&self) -> PageState<Q> {
        self.inner.pager.borrow().clone()
    }

    /// Whether a page request is in flight.
    pub fn loading_next_page(&self) -> bool {
        self.inner.fetching.loading()
    }

    /// Failure of the last page request, if it failed.
    pub fn fetch_error(&self) -> Option<ResourceError> {
        self.inner.fetching.error()
    }

    /// The underlying keyed collection.
    pub fn resource(&self) -> &ResourceCollection<V> {
        &self.inner.items
    }

    pub fn subscribe_pages(&self) -> ResourceStream<PageState<Q>> {
        ResourceStream::new(self.inner.pager.subscribe())
    }

    /// Wait until no pager loop is running for the current query.
    pub async fn settled(&self) -> PageState<Q> {
        let mut pages = self.inner.pager.subscribe();
        match pages.wait_for(|p| !p.running).await {
            Ok(state) => state.clone(),
            // The sender lives as long as `self`.
            Err(_) => self.page_state(),
        }
    }
}

impl<Q, V> RemoteResource for Collection<Q, V>
where
    Q: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type State = CollectionState<V>;

    fn remote(&self) -> &Arc<RemoteCell<CollectionState<V>>> {
        self.inner.items.remote()
    }
}

// ── Pager loop ───────────────────────────────────────────────────────

impl<Q, V> Inner<Q, V>
where
    Q: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn is_current(&self, token: QueryToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }

    /// `token` is current and has not been reset. Must not be called while
    /// the pager's write lock is held.
    fn is_live(&self, token: QueryToken) -> bool {
        if !self.is_current(token) {
            return false;
        }
        let p = self.pager.borrow();
        p.token == token && p.query.is_some()
    }

    /// Become the one pager loop for `token`.
    fn claim_pager(&self, token: QueryToken) -> bool {
        self.pager.send_if_modified(|p| {
            if p.token != token || p.running {
                return false;
            }
            p.running = true;
            true
        })
    }

    fn release_pager(&self, token: QueryToken) {
        self.pager.send_if_modified(|p| {
            if p.token != token || !p.running {
                return false;
            }
            p.running = false;
            true
        });
    }

    async fn run_pager(&self, token: QueryToken) {
        loop {
            self.fetch_while_needed(token).await;
            self.release_pager(token);
            // A resume may have come in after the loop decided to stop.
            if self.next_request(token).is_none() || !self.claim_pager(token) {
                break;
            }
        }
    }

    async fn fetch_while_needed(&self, token: QueryToken) {
        while let Some((query, page)) = self.next_request(token) {
            self.pull_if_needed(token, &query).await;

            let source = &self.source;
            let fetched = track_action(&self.label, &self.fetching, &*self.resolver, |endpoint| {
                source.list(endpoint, &query, page)
            })
            .await;

            // Failures are recorded on `fetching`; the cursor is kept so
            // the next resume retries the same page.
            let Ok(fetched) = fetched else {
                break;
            };
            if !self.record_page(token, fetched) {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    /// The next page to request, or `None` if paging should stop.
    fn next_request(&self, token: QueryToken) -> Option<(Q, PageRequest)> {
        let p = self.pager.borrow();
        if p.token != token
            || !self.is_current(token)
            || !p.needs_more_pages
            || p.exhausted
            || p.truncated
        {
            return None;
        }
        let query = p.query.clone()?;
        let page = PageRequest {
            page_token: p.next_page_token.clone(),
            page_size: self.options.page_size,
        };
        Some((query, page))
    }

    /// Open the change stream for `token` unless it was already requested.
    async fn pull_if_needed(&self, token: QueryToken, query: &Q) {
        let claimed = self.pager.send_if_modified(|p| {
            if p.token != token || p.streaming {
                return false;
            }
            p.streaming = true;
            true
        });
        if !claimed {
            return;
        }

        let generation = Arc::clone(&self.generation);
        let id_fn = Arc::clone(self.items.id_fn());
        let apply = move |state: &mut CollectionState<V>, changes: Vec<Change<V>>| {
            if generation.load(Ordering::SeqCst) != token.0 {
                return false;
            }
            let mut changed = false;
            for change in changes {
                changed |= set_collection(state, change, |item| id_fn(item));
            }
            changed
        };

        let source = &self.source;
        let opened = pull_guarded(
            &self.label,
            &self.items,
            &*self.resolver,
            |endpoint| source.pull(endpoint, query),
            apply,
            || self.is_live(token),
        )
        .await;
        if opened.is_err() {
            tracing::debug!(label = %self.label, "paging without live updates");
        }
    }

    /// Write one page. Returns whether another page should be fetched.
    fn record_page(&self, token: QueryToken, page: ListPage<V>) -> bool {
        let next = page.continuation().map(str::to_owned);
        let ListPage {
            items, total_size, ..
        } = page;

        let id_fn = self.items.id_fn();
        let written = self.items.remote().state.send_if_modified(|s| {
            if !self.is_live(token) {
                return false;
            }
            for item in items {
                s.upsert(id_fn(&item), item);
            }
            s.meta.touch();
            true
        });
        if !written {
            tracing::debug!(label = %self.label, ?token, "dropping page for a superseded or reset query");
            return false;
        }

        let max_pages = self.options.max_pages;
        let mut more = false;
        let mut truncated = false;
        self.pager.send_if_modified(|p| {
            if p.token != token || p.query.is_none() {
                return false;
            }
            p.pages_fetched += 1;
            if total_size.is_some() {
                p.total_size = total_size;
            }
            p.exhausted = next.is_none();
            p.next_page_token = next;
            if !p.exhausted && p.pages_fetched >= max_pages {
                p.truncated = true;
                truncated = true;
            }
            more = !p.exhausted && !p.truncated;
            true
        });

        if truncated {
            tracing::warn!(label = %self.label, max_pages, "page limit reached, stopping");
        }
        more
    }
}
