//! # rescache
//!
//! Redis-backed HTTP response caching middleware for async Rust services.
//!
//! A [`ResponseCache`] sits in front of a request handler and replays stored
//! responses for repeated requests: on a hit the handler never runs; on a
//! miss the handler's response is captured and persisted with a TTL, subject
//! to a status-code cacheability policy. When the store is unreachable the
//! middleware steps aside entirely.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rescache::cache::{CacheConfig, ResponseCache, RouteOptions};
//! use rescache::middleware::{Next, from_handler, from_middleware};
//! use rescache::server::Server;
//! use rescache::{Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = ResponseCache::connect(CacheConfig::new().prefix("api")).await;
//!
//!     let stack = vec![
//!         from_middleware(Arc::new(cache.route(RouteOptions::new().expire(30)))),
//!         from_handler(|_req| async {
//!             Response::new(StatusCode::Ok).body("Hello, World!")
//!         }),
//!     ];
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server
//!         .run(move |req| Next::new(stack.clone()).run(req))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod http;
pub mod middleware;
pub mod server;
pub mod store;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheConfig, ExcludeRule, ResponseCache, RouteOptions};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
pub use store::{CacheRecord, MemoryStore, RedisStore, Store, StoreError};
