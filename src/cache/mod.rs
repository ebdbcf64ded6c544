//! Response caching — serve repeated requests from a shared store.
//!
//! [`ResponseCache`] owns the connection-scoped state (store handle, key
//! prefix, exclusion rule) and hands out per-route [`CacheRoute`] middleware
//! via [`route`](ResponseCache::route). Each request then walks a small state
//! machine: passthrough when the store is unavailable, replay on a hit, and
//! on a miss run the downstream handler, inspect the response it returned,
//! and persist it with a TTL when the cacheability policy allows.
//!
//! The store write happens on a detached task after the response has been
//! handed back up the chain, so client-visible latency never includes it and
//! a failing write can only ever cost a log line.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::middleware::{Middleware, Next};
use crate::store::{CacheRecord, RedisStore, Store};
use crate::{Request, Response, StatusCode};

pub mod config;
pub mod options;
pub mod policy;

pub use config::CacheConfig;
pub use options::{DEFAULT_TTL_SECS, KeySpec, RouteOptions, TtlSpec};
pub use policy::ExcludeRule;

// Connection-scoped state shared by every route built from one cache.
// Replaces ambient globals so independently configured caches can coexist.
struct CacheInner {
    store: Option<Arc<dyn Store>>,
    prefix: String,
    exclude: Option<ExcludeRule>,
}

/// A configured response cache.
///
/// Constructed once at startup and shared by reference; [`route`](Self::route)
/// produces the middleware placed in front of a handler.
///
/// # Examples
///
/// ```rust,no_run
/// use rescache::cache::{CacheConfig, ResponseCache, RouteOptions};
///
/// # async fn demo() {
/// let cache = ResponseCache::connect(CacheConfig::new().prefix("api")).await;
/// let weather = cache.route(RouteOptions::new().expire(30));
/// # }
/// ```
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<CacheInner>,
}

impl ResponseCache {
    /// Connects to Redis using `config` and returns the cache handle.
    ///
    /// A disabled config, or a Redis that cannot be reached at startup, does
    /// not fail: the cache comes up with no store and every route behaves as
    /// a passthrough. Request processing is never blocked on cache
    /// infrastructure.
    pub async fn connect(config: CacheConfig) -> Self {
        let store: Option<Arc<dyn Store>> = if config.enabled {
            match RedisStore::connect(&config.host, config.port, config.auth_pass.as_deref()).await
            {
                Ok(store) => Some(Arc::new(store)),
                Err(err) => {
                    error!(error = %err, "redis unreachable — responses will not be cached");
                    None
                }
            }
        } else {
            info!("response cache disabled");
            None
        };

        Self::assemble(store, config)
    }

    /// Builds a cache over any [`Store`] implementation.
    ///
    /// Connection parameters in `config` are ignored; `prefix`, `exclude`,
    /// and `enabled` still apply.
    pub fn with_store(store: Arc<dyn Store>, config: CacheConfig) -> Self {
        let store = config.enabled.then_some(store);
        Self::assemble(store, config)
    }

    fn assemble(store: Option<Arc<dyn Store>>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                prefix: config.prefix,
                exclude: config.exclude,
            }),
        }
    }

    /// Returns `true` when a store handle exists and reports itself reachable.
    pub fn is_active(&self) -> bool {
        self.inner
            .store
            .as_ref()
            .is_some_and(|store| store.is_connected())
    }

    /// Creates the caching middleware for one route.
    pub fn route(&self, options: RouteOptions) -> CacheRoute {
        CacheRoute {
            inner: Arc::clone(&self.inner),
            options,
        }
    }
}

/// Per-route caching middleware produced by [`ResponseCache::route`].
pub struct CacheRoute {
    inner: Arc<CacheInner>,
    options: RouteOptions,
}

impl Middleware for CacheRoute {
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let inner = Arc::clone(&self.inner);
        let options = self.options.clone();

        Box::pin(async move {
            // Unavailable store: unconditional passthrough, zero store calls.
            let Some(store) = inner.store.clone() else {
                return next.run(req).await;
            };
            if !store.is_connected() {
                return next.run(req).await;
            }

            // Both strategies resolve before the lookup; only the miss path
            // consumes the TTL.
            let key = options.resolve_key(&req, &inner.prefix);
            let ttl = options.resolve_ttl(&req);

            let record = match store.get_record(&key).await {
                Ok(record) => record,
                Err(err) => {
                    // Fail closed: a broken store must not be masked by
                    // silently recomputing fresh responses.
                    error!(key = %key, error = %err, "cache read failed");
                    return Response::new(StatusCode::InternalServerError);
                }
            };

            match record {
                Some(record) => {
                    debug!(key = %key, "cache hit");
                    replay(record)
                }
                None => {
                    debug!(key = %key, "cache miss");
                    let response = next.run(req).await;
                    store_response(store, key, ttl, inner.exclude.as_ref(), &response);
                    response
                }
            }
        })
    }
}

/// Reconstructs a response from a stored record: captured status (200 when
/// none was captured), captured `Content-Type` (omitted when none was
/// captured), body verbatim.
fn replay(record: CacheRecord) -> Response {
    let status = record
        .status
        .and_then(StatusCode::from_u16)
        .unwrap_or(StatusCode::Ok);
    let mut response = Response::new(status);
    if let Some(content_type) = record.content_type {
        response = response.header("Content-Type", content_type);
    }
    response.body_bytes(record.body)
}

/// Persists a freshly produced response when the policy allows, on a
/// detached task. Failures are logged and swallowed — the client already has
/// its response.
fn store_response(
    store: Arc<dyn Store>,
    key: String,
    ttl: i64,
    exclude: Option<&ExcludeRule>,
    response: &Response,
) {
    let status = response.status().as_u16();
    if !policy::is_cacheable(exclude, status) {
        debug!(key = %key, status, "status excluded from cache");
        return;
    }
    // A record without a body is never written.
    if response.body_ref().is_empty() {
        return;
    }
    if ttl <= 0 {
        warn!(key = %key, ttl, "non-positive ttl — response not cached");
        return;
    }

    let record = CacheRecord {
        body: response.body_ref().clone(),
        content_type: response.content_type().map(str::to_owned),
        status: Some(status),
    };

    tokio::spawn(async move {
        if let Err(err) = store.set_record(&key, &record).await {
            warn!(key = %key, error = %err, "cache write failed");
            return;
        }
        if let Err(err) = store.set_expiry(&key, ttl).await {
            warn!(key = %key, error = %err, "cache expiry failed");
            return;
        }
        debug!(key = %key, ttl, "response cached");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use crate::middleware::from_handler;
    use crate::store::{MemoryStore, StoreError};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Store double: delegates to a MemoryStore while recording every call,
    /// with toggles for connectivity and read failures.
    #[derive(Clone, Default)]
    struct SpyStore {
        backing: MemoryStore,
        connected: Arc<AtomicBool>,
        fail_reads: Arc<AtomicBool>,
        reads: Arc<AtomicUsize>,
        writes: Arc<Mutex<Vec<String>>>,
        expiries: Arc<Mutex<Vec<(String, i64)>>>,
    }

    impl SpyStore {
        fn new() -> Self {
            let spy = Self::default();
            spy.connected.store(true, Ordering::SeqCst);
            spy
        }

        fn written_keys(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }

        fn expiries(&self) -> Vec<(String, i64)> {
            self.expiries.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Store for SpyStore {
        async fn get_record(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable);
            }
            self.backing.get_record(key).await
        }

        async fn set_record(&self, key: &str, record: &CacheRecord) -> Result<(), StoreError> {
            self.writes.lock().unwrap().push(key.to_owned());
            self.backing.set_record(key, record).await
        }

        async fn set_expiry(&self, key: &str, seconds: i64) -> Result<(), StoreError> {
            self.expiries.lock().unwrap().push((key.to_owned(), seconds));
            self.backing.set_expiry(key, seconds).await
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn cache_over(spy: &SpyStore) -> ResponseCache {
        ResponseCache::with_store(Arc::new(spy.clone()), CacheConfig::new().prefix("test"))
    }

    fn counting_handler(
        hits: Arc<AtomicUsize>,
        status: StatusCode,
        body: &'static str,
        content_type: &'static str,
    ) -> crate::middleware::MiddlewareHandler {
        from_handler(move |_req| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Response::new(status)
                    .header("Content-Type", content_type)
                    .body(body)
            }
        })
    }

    /// Polls until `cond` holds, giving the detached write task room to run.
    async fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached in time");
    }

    async fn run_route(
        cache: &ResponseCache,
        options: RouteOptions,
        handler: crate::middleware::MiddlewareHandler,
        target: &str,
    ) -> Response {
        let stack = vec![
            crate::middleware::from_middleware(Arc::new(cache.route(options))),
            handler,
        ];
        Next::new(stack)
            .run(Request::builder().method(Method::Get).uri(target).build())
            .await
    }

    #[tokio::test]
    async fn disconnected_store_is_pure_passthrough() {
        let spy = SpyStore::new();
        spy.connected.store(false, Ordering::SeqCst);
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));

        let response = run_route(
            &cache,
            RouteOptions::new(),
            counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain"),
            "/a",
        )
        .await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(spy.reads.load(Ordering::SeqCst), 0);
        assert!(spy.written_keys().is_empty());
    }

    #[tokio::test]
    async fn disabled_cache_is_pure_passthrough() {
        let spy = SpyStore::new();
        let cache = ResponseCache::with_store(
            Arc::new(spy.clone()),
            CacheConfig::new().enabled(false),
        );
        let hits = Arc::new(AtomicUsize::new(0));

        let response = run_route(
            &cache,
            RouteOptions::new(),
            counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain"),
            "/a",
        )
        .await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(spy.reads.load(Ordering::SeqCst), 0);
        assert!(!cache.is_active());
    }

    #[tokio::test]
    async fn miss_then_hit_serves_identical_response_without_handler() {
        let spy = SpyStore::new();
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain");

        let first = run_route(&cache, RouteOptions::new(), handler.clone(), "/greeting").await;
        assert_eq!(first.status(), StatusCode::Ok);
        assert_eq!(&first.body_ref()[..], b"ok");
        assert_eq!(first.content_type(), Some("text/plain"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let spy2 = spy.clone();
        wait_until(move || !spy2.written_keys().is_empty()).await;
        assert_eq!(spy.written_keys(), vec!["test:route:GET:/greeting"]);

        let second = run_route(&cache, RouteOptions::new(), handler, "/greeting").await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "handler re-invoked on a hit");
        assert_eq!(second.status(), StatusCode::Ok);
        assert_eq!(&second.body_ref()[..], b"ok");
        assert_eq!(second.content_type(), Some("text/plain"));
    }

    #[tokio::test]
    async fn read_error_fails_closed_with_500() {
        let spy = SpyStore::new();
        spy.fail_reads.store(true, Ordering::SeqCst);
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));

        let response = run_route(
            &cache,
            RouteOptions::new(),
            counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain"),
            "/a",
        )
        .await;

        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert_eq!(hits.load(Ordering::SeqCst), 0, "handler must not run");
        assert!(spy.written_keys().is_empty());
    }

    #[tokio::test]
    async fn server_error_is_not_stored_under_default_rule() {
        let spy = SpyStore::new();
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(
            Arc::clone(&hits),
            StatusCode::InternalServerError,
            "boom",
            "text/plain",
        );

        run_route(&cache, RouteOptions::new(), handler.clone(), "/flaky").await;
        // Give a would-be write every chance to land before asserting.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(spy.written_keys().is_empty());

        run_route(&cache, RouteOptions::new(), handler, "/flaky").await;
        assert_eq!(hits.load(Ordering::SeqCst), 2, "second request must miss again");
    }

    #[tokio::test]
    async fn explicit_code_list_excludes_only_members() {
        let spy = SpyStore::new();
        let cache = ResponseCache::with_store(
            Arc::new(spy.clone()),
            CacheConfig::new()
                .prefix("test")
                .exclude(ExcludeRule::Codes(vec![404])),
        );
        let hits = Arc::new(AtomicUsize::new(0));

        let not_found =
            counting_handler(Arc::clone(&hits), StatusCode::NotFound, "gone", "text/plain");
        run_route(&cache, RouteOptions::new(), not_found, "/missing").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(spy.written_keys().is_empty());

        let forbidden =
            counting_handler(Arc::clone(&hits), StatusCode::Forbidden, "nope", "text/plain");
        run_route(&cache, RouteOptions::new(), forbidden, "/secret").await;
        let spy2 = spy.clone();
        wait_until(move || !spy2.written_keys().is_empty()).await;
        assert_eq!(spy.written_keys(), vec!["test:route:GET:/secret"]);
    }

    #[tokio::test]
    async fn literal_ttl_reaches_the_store_exactly() {
        let spy = SpyStore::new();
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain");

        run_route(&cache, RouteOptions::new().expire(30), handler, "/t").await;
        let spy2 = spy.clone();
        wait_until(move || !spy2.expiries().is_empty()).await;
        assert_eq!(spy.expiries(), vec![("test:route:GET:/t".to_owned(), 30)]);
    }

    #[tokio::test]
    async fn computed_ttl_resolves_from_the_request() {
        let spy = SpyStore::new();
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain");
        let options = RouteOptions::new().expire_fn(|req| {
            req.query_param("ttl")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TTL_SECS)
        });

        run_route(&cache, options, handler, "/t?ttl=45").await;
        let spy2 = spy.clone();
        wait_until(move || !spy2.expiries().is_empty()).await;
        assert_eq!(spy.expiries()[0].1, 45);
    }

    #[tokio::test]
    async fn non_positive_ttl_skips_the_write() {
        let spy = SpyStore::new();
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain");

        run_route(&cache, RouteOptions::new().expire(0), handler, "/t").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(spy.written_keys().is_empty());
        assert!(spy.expiries().is_empty());
    }

    #[tokio::test]
    async fn empty_body_is_never_written() {
        let spy = SpyStore::new();
        let cache = cache_over(&spy);
        let handler = from_handler(|_req| async { Response::new(StatusCode::NoContent) });

        run_route(&cache, RouteOptions::new(), handler, "/empty").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(spy.written_keys().is_empty());
    }

    #[tokio::test]
    async fn literal_key_is_used_verbatim() {
        let spy = SpyStore::new();
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain");

        run_route(&cache, RouteOptions::new().key("pinned-key"), handler, "/x").await;
        let spy2 = spy.clone();
        wait_until(move || !spy2.written_keys().is_empty()).await;
        assert_eq!(spy.written_keys(), vec!["pinned-key"]);
    }

    #[tokio::test]
    async fn bare_record_replays_with_defaults() {
        let spy = SpyStore::new();
        spy.backing
            .set_record("test:route:GET:/seeded", &CacheRecord::new(&b"raw"[..]))
            .await
            .unwrap();
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&hits), StatusCode::Ok, "new", "text/plain");

        let response = run_route(&cache, RouteOptions::new(), handler, "/seeded").await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(response.status(), StatusCode::Ok, "missing code defaults to 200");
        assert_eq!(response.content_type(), None, "missing type stays absent");
        assert_eq!(&response.body_ref()[..], b"raw");
    }

    #[tokio::test]
    async fn hit_issues_no_writes() {
        let spy = SpyStore::new();
        let cache = cache_over(&spy);
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&hits), StatusCode::Ok, "ok", "text/plain");

        run_route(&cache, RouteOptions::new(), handler.clone(), "/once").await;
        let spy2 = spy.clone();
        wait_until(move || !spy2.written_keys().is_empty()).await;

        run_route(&cache, RouteOptions::new(), handler, "/once").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(spy.written_keys().len(), 1, "a hit must not write");
        assert_eq!(spy.reads.load(Ordering::SeqCst), 2, "exactly one read per request");
    }
}
