//! Radix-tree request router with global and per-group middleware.
//!
//! One tree per HTTP method. Global layers run for every request, matched or
//! not, so preflights and 404s still get CORS headers, a trace id and an
//! access log line. Group layers run only for the routes of that group; this
//! is how authentication is made opt-in per route.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::method::Method;
use crate::middleware::{BoxedMiddleware, Chain, Middleware};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve),
/// or call [`Router::build`] to drive it in-process.
pub struct Router {
    table: RouteTable,
    layers: Vec<BoxedMiddleware>,
}

impl Router {
    pub fn new() -> Self {
        Self { table: RouteTable::default(), layers: Vec::new() }
    }

    /// Appends a global middleware. The first layer added is the outermost.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the path is malformed or conflicts with an existing route.
    /// Routes are registered at startup, so this fails fast before serving.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.table.insert(method, path, handler.into_boxed_handler());
        self
    }

    /// Mounts every route of `group` behind the group's middleware.
    pub fn group(mut self, group: Group) -> Self {
        let layers = group.layers;
        for (method, path, handler) in group.routes {
            let chain = Chain::new(layers.clone(), handler);
            self.table.insert(method, &path, Arc::new(chain));
        }
        self
    }

    /// Freezes the router into a cheaply clonable [`App`].
    pub fn build(self) -> App {
        App { chain: Chain::new(self.layers, Arc::new(self.table)) }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Routes that share route-level middleware.
///
/// ```rust,ignore
/// Group::new()
///     .layer(Authenticate::new(users))
///     .on(Method::Get, "/me", me)
///     .on(Method::Put, "/me", update_me)
/// ```
#[derive(Default)]
pub struct Group {
    layers: Vec<BoxedMiddleware>,
    routes: Vec<(Method, String, BoxedHandler)>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes.push((method, path.to_owned(), handler.into_boxed_handler()));
        self
    }
}

/// A built router: the global chain ending in route dispatch.
#[derive(Clone)]
pub struct App {
    chain: Chain,
}

impl App {
    /// Runs one request through the full chain.
    pub async fn handle(&self, req: Request) -> Response {
        self.chain.run(req).await
    }
}

// ── Route table ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct RouteTable {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl RouteTable {
    fn insert(&mut self, method: Method, path: &str, handler: BoxedHandler) {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
    }

    fn lookup(&self, method: &http::Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let method: Method = method.as_str().parse().ok()?;
        let matched = self.routes.get(&method)?.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl ErasedHandler for RouteTable {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req)
            }
            None => Box::pin(async { Response::error(Status::NotFound, "not found") }),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};

    use super::*;
    use crate::middleware::{Next, from_fn};

    fn get(path: &str) -> Request {
        Request::new(http::Request::get(path).body(Full::new(Bytes::new())).unwrap())
    }

    async fn user(req: Request) -> String {
        format!("user {}", req.param("id").unwrap_or("?"))
    }

    #[tokio::test]
    async fn path_params_reach_the_handler() {
        let app = Router::new().on(Method::Get, "/users/{id}", user).build();
        let res = app.handle(get("/users/42")).await;
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"user 42");
    }

    #[tokio::test]
    async fn unmatched_route_is_404_envelope() {
        let app = Router::new().on(Method::Get, "/users/{id}", user).build();
        let res = app.handle(get("/nope")).await;
        assert_eq!(res.status_code(), http::StatusCode::NOT_FOUND);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"msg":"not found"}"#);
    }

    #[tokio::test]
    async fn group_layers_apply_only_to_group_routes() {
        let deny = from_fn(|_req: Request, _next: Next| async { Status::Forbidden });
        let app = Router::new()
            .on(Method::Get, "/open", |_req: Request| async { "open" })
            .group(Group::new().layer(deny).on(Method::Get, "/closed", |_req: Request| async { "closed" }))
            .build();

        assert_eq!(app.handle(get("/open")).await.status_code(), http::StatusCode::OK);
        assert_eq!(app.handle(get("/closed")).await.status_code(), http::StatusCode::FORBIDDEN);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic_at_startup() {
        let _ = Router::new()
            .on(Method::Get, "/a/{x}", user)
            .on(Method::Get, "/a/{y}", user);
    }
}
