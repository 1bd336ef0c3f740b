//! Trace id assignment and route signature.
//!
//! The inbound `X-Trace-Id` is adopted as is. Without one, a fresh id is
//! minted: the 16 bytes of a random UUID v4, base64url-encoded without
//! padding (22 URL-safe characters). The id is echoed back in the response
//! header of the same name.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::HeaderValue;
use uuid::Uuid;

use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Clone, Copy, Debug, Default)]
pub struct TraceContext;

impl TraceContext {
    pub fn new() -> Self {
        Self
    }
}

/// A new random, URL-safe trace id.
pub fn generate_trace_id() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

#[async_trait]
impl Middleware for TraceContext {
    async fn handle(&self, mut req: Request, next: Next) -> Response {
        let trace_id = req
            .header(TRACE_ID_HEADER)
            .filter(|v| !v.is_empty())
            .map_or_else(generate_trace_id, str::to_owned);
        let route = format!("{}{}", req.method(), req.path());

        let ctx = req.context_mut();
        ctx.set_trace_id(trace_id);
        ctx.set_route(route);
        // Whatever id won, that is the one to echo.
        let echo = ctx.trace_id().and_then(|id| HeaderValue::from_str(id).ok());

        let mut res = next.run(req).await;
        if let Some(value) = echo {
            res.headers_mut().insert(TRACE_ID_HEADER, value);
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use http_body_util::Full;

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{BoxedMiddleware, Chain};

    /// Runs the trace step and returns (context trace id, context route, echoed header).
    async fn run(req: Request) -> (String, String, Option<String>) {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let endpoint = (move |req: Request| {
            let sink = Arc::clone(&sink);
            async move {
                let ctx = req.context();
                *sink.lock().unwrap() = Some((
                    ctx.trace_id().unwrap().to_owned(),
                    ctx.route().unwrap().to_owned(),
                ));
                "ok"
            }
        })
        .into_boxed_handler();
        let layer: BoxedMiddleware = Arc::new(TraceContext::new());

        let res = Chain::new(vec![layer], endpoint).run(req).await;
        let echoed = res.headers().get(TRACE_ID_HEADER).map(|v| v.to_str().unwrap().to_owned());
        let (id, route) = seen.lock().unwrap().take().unwrap();
        (id, route, echoed)
    }

    fn get(path: &str, trace: Option<&str>) -> Request {
        let mut builder = http::Request::get(path);
        if let Some(t) = trace {
            builder = builder.header("X-Trace-Id", t);
        }
        Request::new(builder.body(Full::new(Bytes::new())).unwrap())
    }

    #[tokio::test]
    async fn supplied_id_is_echoed_unchanged() {
        for supplied in ["abc-123", "another_one"] {
            let (id, route, echoed) = run(get("/orders/9", Some(supplied))).await;
            assert_eq!(id, supplied);
            assert_eq!(echoed.as_deref(), Some(supplied));
            assert_eq!(route, "GET/orders/9");
        }
    }

    #[tokio::test]
    async fn empty_header_counts_as_absent() {
        let (id, _, _) = run(get("/", Some(""))).await;
        assert_eq!(id.len(), 22);
    }

    #[tokio::test]
    async fn generated_id_is_echoed() {
        let (id, _, echoed) = run(get("/", None)).await;
        assert_eq!(echoed, Some(id));
    }

    #[test]
    fn generated_ids_are_url_safe_and_unique() {
        let ids: HashSet<String> = (0..10_000).map(|_| generate_trace_id()).collect();
        assert_eq!(ids.len(), 10_000);
        for id in ids.iter().take(100) {
            assert_eq!(id.len(), 22);
            assert!(id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        }
    }
}
