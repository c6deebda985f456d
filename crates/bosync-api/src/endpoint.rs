//! Connection endpoint resolution.
//!
//! Every call made by the sync layer starts by asking an
//! [`EndpointResolver`] where the server lives. Resolution is async because
//! dashboards typically discover the endpoint from runtime configuration
//! served alongside the UI.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::OnceCell;
use url::Url;

use crate::error::Error;

/// Base URL of the RPC server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    /// Parse an endpoint from a URL string.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        Ok(Self(Url::parse(raw)?))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<Url> for Endpoint {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

// ── Resolvers ────────────────────────────────────────────────────────

/// Resolves the endpoint calls should be sent to.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self) -> BoxFuture<'_, Result<Endpoint, Error>>;
}

/// An endpoint known up front.
#[derive(Debug, Clone)]
pub struct StaticEndpoint(Endpoint);

impl StaticEndpoint {
    pub fn new(endpoint: Endpoint) -> Self {
        Self(endpoint)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.0
    }
}

impl EndpointResolver for StaticEndpoint {
    fn resolve(&self) -> BoxFuture<'_, Result<Endpoint, Error>> {
        futures_util::future::ready(Ok(self.0.clone())).boxed()
    }
}

type Loader = dyn Fn() -> BoxFuture<'static, Result<Endpoint, Error>> + Send + Sync;

/// An endpoint discovered lazily, at most once.
///
/// The loader runs on first use; a successful result is cached for the
/// lifetime of the resolver. Failures are not cached, so the next call
/// tries again.
pub struct LazyEndpoint {
    cell: OnceCell<Endpoint>,
    loader: Arc<Loader>,
}

impl LazyEndpoint {
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Endpoint, Error>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Arc::new(move || loader().boxed()),
        }
    }

    /// The cached endpoint, if it has been resolved.
    pub fn get(&self) -> Option<&Endpoint> {
        self.cell.get()
    }
}

impl fmt::Debug for LazyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyEndpoint")
            .field("resolved", &self.cell.get())
            .finish_non_exhaustive()
    }
}

impl EndpointResolver for LazyEndpoint {
    fn resolve(&self) -> BoxFuture<'_, Result<Endpoint, Error>> {
        async move {
            let endpoint = self
                .cell
                .get_or_try_init(|| {
                    tracing::debug!("resolving endpoint");
                    (self.loader)()
                })
                .await?;
            Ok(endpoint.clone())
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn static_endpoint_resolves_immediately() {
        let ep = Endpoint::parse("https://bos.example:23557").unwrap();
        let resolver = StaticEndpoint::new(ep.clone());
        assert_eq!(resolver.resolve().await.unwrap(), ep);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Endpoint::parse("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn lazy_endpoint_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolver = LazyEndpoint::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Endpoint::parse("https://localhost:8443") }
        });

        assert!(resolver.get().is_none());
        resolver.resolve().await.unwrap();
        resolver.resolve().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.get().unwrap().as_str(), "https://localhost:8443/");
    }

    #[tokio::test]
    async fn lazy_endpoint_retries_after_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolver = LazyEndpoint::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::Endpoint("config not served yet".into()))
                } else {
                    Endpoint::parse("https://localhost:8443")
                }
            }
        });

        assert!(resolver.resolve().await.is_err());
        assert!(resolver.resolve().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
