//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the place for
//! cross-cutting concerns. A middleware receives the request and a [`Next`]
//! continuation; it may answer on its own (short-circuit) or call
//! `next.run(req).await` and post-process the response.
//!
//! The gateway's chain, outermost first:
//!
//! | Step | Type | Scope |
//! |---|---|---|
//! | Panic recovery | [`Recover`] | global |
//! | CORS | [`Cors`] | global |
//! | Trace id + route signature | [`TraceContext`] | global |
//! | Access log with body capture | [`AccessLog`] | global |
//! | Bearer credential check | [`Authenticate`] | per route group |
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .layer(Recover::new())
//!     .layer(Cors::default())
//!     .layer(TraceContext::new())
//!     .layer(AccessLog::new(config.access_log.clone()))
//!     .on(Method::Get, "/ping", ping)
//!     .group(Group::new().layer(Authenticate::new(users)).on(Method::Get, "/me", me));
//! ```

pub mod access_log;
pub mod auth;
pub mod capture;
pub mod cors;
pub mod recover;
pub mod trace;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

pub use access_log::{AccessLog, AccessRecord, AccessSink, TracingSink};
pub use auth::{Authenticate, UserLookup};
pub use capture::{CaptureBody, Captured};
pub use cors::Cors;
pub use recover::Recover;
pub use trace::TraceContext;

/// One step of the request chain.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next) -> Response;
}

pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered list of middleware ending in an endpoint handler.
#[derive(Clone)]
pub struct Chain {
    layers: Arc<[BoxedMiddleware]>,
    endpoint: BoxedHandler,
}

impl Chain {
    pub(crate) fn new(layers: Vec<BoxedMiddleware>, endpoint: BoxedHandler) -> Self {
        Self { layers: layers.into(), endpoint }
    }

    pub async fn run(&self, req: Request) -> Response {
        Next { chain: self.clone(), index: 0 }.run(req).await
    }
}

impl ErasedHandler for Chain {
    fn call(&self, req: Request) -> BoxFuture {
        let chain = self.clone();
        Box::pin(async move { chain.run(req).await })
    }
}

/// The remainder of the chain after the current middleware.
pub struct Next {
    chain: Chain,
    index: usize,
}

impl Next {
    /// Runs the next middleware, or the endpoint if none are left.
    pub async fn run(mut self, req: Request) -> Response {
        match self.chain.layers.get(self.index).cloned() {
            Some(layer) => {
                self.index += 1;
                layer.handle(req, self).await
            }
            None => self.chain.endpoint.call(req).await,
        }
    }
}

/// Middleware from an async closure or function.
///
/// ```rust,ignore
/// let tag = from_fn(|req: Request, next: Next| async move {
///     let mut res = next.run(req).await;
///     res.headers_mut().insert("x-served-by", HeaderValue::from_static("gatehouse"));
///     res
/// });
/// ```
pub fn from_fn<F, Fut, R>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FromFn(f)
}

pub struct FromFn<F>(F);

#[async_trait]
impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    async fn handle(&self, req: Request, next: Next) -> Response {
        (self.0)(req, next).await.into_response()
    }
}
