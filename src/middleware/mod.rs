//! Middleware pipeline — composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, enabling request inspection,
//! short-circuit responses, and response decoration without coupling handlers
//! to infrastructure concerns. A middleware receives the downstream
//! [`Response`] as a plain return value from [`Next::run`], so decorating a
//! response (the cache does this to capture it) is ordinary code — no
//! patching of emission primitives anywhere.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] — converts a [`Middleware`] trait object into a handler.
//! - [`from_handler`] — wraps a plain async request handler as the terminal
//!   element of a chain.
//! - [`RequestLog`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so it cannot be invoked more than
/// once per middleware. When the chain is exhausted without any layer
/// producing a response, a fallback `500` is returned.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Which handler to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so [`Next`] can advance
/// through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |req: Request, next: Next| middleware.handle(req, next))
}

/// Wraps a plain async handler as a terminal [`MiddlewareHandler`].
///
/// The handler never sees the rest of the chain; place it last. This is the
/// "downstream handler" that cache middleware guards.
///
/// # Examples
///
/// ```rust,no_run
/// use rescache::{Response, StatusCode};
/// use rescache::middleware::from_handler;
///
/// let terminal = from_handler(|_req| async {
///     Response::new(StatusCode::Ok).body("hello")
/// });
/// ```
pub fn from_handler<H, F>(handler: H) -> MiddlewareHandler
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |req: Request, _next: Next| {
        let handler = Arc::clone(&handler);
        Box::pin(async move { handler(req).await })
    })
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given stack.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// Advances the cursor by one and awaits the handler at the previous
    /// position. An exhausted chain yields `500 Internal Server Error`.
    pub async fn run(mut self, req: Request) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(req, self).await
        } else {
            Response::new(crate::StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Request`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(req).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`.
/// - **Decorate** — call `next.run(req).await`, inspect the response, and
///   return a modified copy.
///
/// Implementations must be `Send + Sync` because middleware is shared across
/// Tokio tasks, and `handle` must return a pinned `Send` future.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Built-in middleware that logs each request's method, path, status, and
/// duration with a single `tracing::info!` line after the downstream handler
/// completes. Never short-circuits.
pub struct RequestLog;

impl Middleware for RequestLog {
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().as_str().to_string();
            let path = req.path().to_string();

            let response = next.run(req).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();

            tracing::info!("{} {} - {} ({:?})", method, path, status, duration);

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;

    #[tokio::test]
    async fn exhausted_chain_returns_500() {
        let next = Next::new(vec![]);
        let req = Request::builder().uri("/").build();
        let response = next.run(req).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn terminal_handler_runs() {
        let stack = vec![from_handler(|req: Request| async move {
            Response::new(StatusCode::Ok).body(format!("saw {}", req.path()))
        })];
        let response = Next::new(stack)
            .run(Request::builder().uri("/ping").build())
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(&response.body_ref()[..], b"saw /ping");
    }

    #[tokio::test]
    async fn decorating_middleware_wraps_downstream() {
        struct Tag;
        impl Middleware for Tag {
            fn handle(
                &self,
                req: Request,
                next: Next,
            ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
                Box::pin(async move {
                    let mut response = next.run(req).await;
                    response.add_header("X-Tagged", "yes");
                    response
                })
            }
        }

        let stack = vec![
            from_middleware(Arc::new(Tag)),
            from_handler(|_req| async { Response::new(StatusCode::Ok).body("ok") }),
        ];
        let response = Next::new(stack)
            .run(Request::builder().uri("/").build())
            .await;
        assert_eq!(response.headers().get("x-tagged"), Some("yes"));
    }
}
