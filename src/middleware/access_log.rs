//! Access log with request and response body capture.
//!
//! One [`AccessRecord`] per request, emitted when the response body has been
//! fully sent (or abandoned by the client). The inbound body is buffered and
//! put back before the handler runs, so handlers read exactly what the
//! client sent.
//!
//! Bodies are rendered for the log by [`compress`]; what goes over the wire
//! is never touched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use http_body_util::BodyExt;
use serde::Serialize;
use serde::de::IgnoredAny;

use crate::config::AccessLogConfig;
use crate::middleware::capture::CaptureBody;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Debug, Serialize)]
pub struct AccessRecord {
    pub trace_id: String,
    pub route: String,
    pub begin: DateTime<Utc>,
    pub latency_ms: u64,
    pub request: InboundRecord,
    pub response: OutboundRecord,
}

#[derive(Clone, Debug, Serialize)]
pub struct InboundRecord {
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub client_ip: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct OutboundRecord {
    pub body: String,
    pub status: u16,
}

/// Destination for access records. Must tolerate concurrent calls.
pub trait AccessSink: Send + Sync + 'static {
    fn record(&self, record: AccessRecord);
}

/// Emits each record as a trace-level event on target `access`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl AccessSink for TracingSink {
    fn record(&self, record: AccessRecord) {
        let request = serde_json::to_string(&record.request).unwrap_or_default();
        tracing::trace!(
            target: "access",
            trace_id = %record.trace_id,
            route = %record.route,
            begin = %record.begin.to_rfc3339(),
            latency_ms = record.latency_ms,
            status = record.response.status,
            request = %request,
            response_body = %record.response.body,
            "access"
        );
    }
}

pub struct AccessLog {
    config: AccessLogConfig,
    sink: Arc<dyn AccessSink>,
}

impl AccessLog {
    pub fn new(config: AccessLogConfig) -> Self {
        Self { config, sink: Arc::new(TracingSink) }
    }

    pub fn with_sink(mut self, sink: impl AccessSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }
}

#[async_trait]
impl Middleware for AccessLog {
    async fn handle(&self, mut req: Request, next: Next) -> Response {
        let begin = Utc::now();
        let started = Instant::now();
        let limit = self.config.max_body_bytes;

        let body = match req.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                req.context().logger().warn("inbound body unreadable", &e);
                Bytes::new()
            }
        };

        let ctx = req.context();
        let trace_id = ctx.trace_id().unwrap_or_default().to_owned();
        let route = ctx.route().unwrap_or_default().to_owned();
        let inbound = InboundRecord {
            query: spread_pairs(req.query_pairs()),
            headers: spread_headers(req.headers()),
            body: compress(&body, limit),
            client_ip: req.client_ip().unwrap_or_default(),
        };
        drop(body);

        let res = next.run(req).await;
        let status = res.status_code();
        let sink = Arc::clone(&self.sink);

        res.map_body(move |body| {
            CaptureBody::new(body, status, limit, move |captured| {
                let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                sink.record(AccessRecord {
                    trace_id,
                    route,
                    begin,
                    latency_ms,
                    request: inbound,
                    response: OutboundRecord {
                        body: render(&captured.body, captured.total_len, limit),
                        status: captured.status.as_u16(),
                    },
                });
            })
            .boxed_unsync()
        })
    }
}

// ── Body rendering ────────────────────────────────────────────────────────────

/// Renders a body for the log.
///
/// - empty: `""`
/// - JSON: insignificant whitespace removed
/// - other UTF-8: as is
/// - anything else: `<binary N bytes>`
///
/// Renderings longer than `limit` bytes are cut on a char boundary and end
/// with `...(N bytes)`, N being the original length.
pub fn compress(body: &[u8], limit: usize) -> String {
    render(body, body.len(), limit)
}

/// Like [`compress`], for a `head` that may be only the first bytes of a
/// `total_len`-byte body.
fn render(head: &[u8], total_len: usize, limit: usize) -> String {
    if total_len == 0 {
        return String::new();
    }
    let partial = head.len() < total_len;

    if !partial && serde_json::from_slice::<IgnoredAny>(head).is_ok() {
        return cut(&minify(head), false, total_len, limit);
    }

    match std::str::from_utf8(head) {
        Ok(text) => cut(text, partial, total_len, limit),
        // The capture boundary split a multi-byte char.
        Err(e) if partial && e.error_len().is_none() => {
            let text = std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default();
            cut(text, true, total_len, limit)
        }
        Err(_) => format!("<binary {total_len} bytes>"),
    }
}

/// Drops insignificant whitespace from a valid JSON document. Keys, key
/// order, numbers and escapes are kept byte for byte.
fn minify(json: &[u8]) -> String {
    let mut out = Vec::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    for &b in json {
        if in_string {
            out.push(b);
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if !matches!(b, b' ' | b'\t' | b'\n' | b'\r') {
            in_string = b == b'"';
            out.push(b);
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn cut(text: &str, partial: bool, total_len: usize, limit: usize) -> String {
    if !partial && text.len() <= limit {
        return text.to_owned();
    }
    let mut end = limit.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...({total_len} bytes)", &text[..end])
}

fn spread_pairs(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in pairs {
        out.entry(k)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&v);
            })
            .or_insert(v);
    }
    out
}

fn spread_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            (name.as_str().to_owned(), joined)
        })
        .collect()
}
