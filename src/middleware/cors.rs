//! CORS negotiation.
//!
//! Every response carries the allow-origin, allow-headers and allow-methods
//! headers. Preflight `OPTIONS` requests are answered here with 204 and
//! never reach authentication or a handler.

use async_trait::async_trait;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    HeaderMap, HeaderValue,
};

use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

#[derive(Clone, Debug)]
pub struct Cors {
    origin: HeaderValue,
    headers: HeaderValue,
    methods: HeaderValue,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            origin: HeaderValue::from_static("*"),
            headers: HeaderValue::from_static("Content-Type, Authorization, X-Trace-Id"),
            methods: HeaderValue::from_static("GET, POST, PUT, DELETE"),
        }
    }
}

impl Cors {
    pub fn allow_origin(mut self, origin: HeaderValue) -> Self {
        self.origin = origin;
        self
    }

    pub fn allow_headers(mut self, headers: HeaderValue) -> Self {
        self.headers = headers;
        self
    }

    pub fn allow_methods(mut self, methods: HeaderValue) -> Self {
        self.methods = methods;
        self
    }

    fn annotate(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.headers.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
    }
}

#[async_trait]
impl Middleware for Cors {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let mut res = if *req.method() == http::Method::OPTIONS {
            Response::status(Status::NoContent)
        } else {
            next.run(req).await
        };
        self.annotate(res.headers_mut());
        res
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http_body_util::Full;

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{BoxedMiddleware, Chain};

    fn chain(calls: Arc<AtomicUsize>) -> Chain {
        let endpoint = (move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { "handled" }
        })
        .into_boxed_handler();
        let layer: BoxedMiddleware = Arc::new(Cors::default());
        Chain::new(vec![layer], endpoint)
    }

    fn request(method: http::Method) -> Request {
        Request::new(
            http::Request::builder()
                .method(method)
                .uri("/anything")
                .body(Full::new(Bytes::new()))
                .unwrap(),
        )
    }

    fn assert_cors(res: &Response) {
        let h = res.headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, Authorization, X-Trace-Id");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, PUT, DELETE");
    }

    #[tokio::test]
    async fn preflight_short_circuits_with_204() {
        let calls = Arc::new(AtomicUsize::new(0));
        let res = chain(Arc::clone(&calls)).run(request(http::Method::OPTIONS)).await;
        assert_eq!(res.status_code(), http::StatusCode::NO_CONTENT);
        assert_cors(&res);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_methods_pass_through_annotated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let res = chain(Arc::clone(&calls)).run(request(http::Method::POST)).await;
        assert_eq!(res.status_code(), http::StatusCode::OK);
        assert_cors(&res);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn allow_lists_are_configurable() {
        let cors = Cors::default().allow_origin(HeaderValue::from_static("https://app.example.com"));
        let mut headers = HeaderMap::new();
        cors.annotate(&mut headers);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example.com");
    }
}
