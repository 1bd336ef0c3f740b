//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::body::{self, Body};
use crate::classify::{BoxError, Failure};
use crate::context::RequestContext;

/// An incoming HTTP request plus the state the middleware chain attaches to it.
///
/// The body is a stream. [`Request::bytes`] buffers it and puts an equivalent
/// body back, so several steps (the access log, then the handler) can each
/// read the full content.
pub struct Request {
    head: http::request::Parts,
    body: Body,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    ctx: RequestContext,
}

impl Request {
    /// Wraps an `http::Request` with any body type.
    pub fn new<B>(req: http::Request<B>) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (head, b) = req.into_parts();
        Self {
            head,
            body: body::boxed(b),
            params: HashMap::new(),
            remote_addr: None,
            ctx: RequestContext::new(),
        }
    }

    /// Records the TCP peer address.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn query(&self) -> Option<&str> { self.head.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    pub fn context(&self) -> &RequestContext { &self.ctx }
    pub fn context_mut(&mut self) -> &mut RequestContext { &mut self.ctx }

    /// Case-insensitive header lookup. Non-ASCII values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Percent-decoded query pairs in request order. Keys may repeat.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.query() else {
            return Vec::new();
        };
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(k), decode_component(v))
            })
            .collect()
    }

    /// Best guess at the originating client address.
    ///
    /// Behind the edge proxy the peer is the proxy itself, so the first
    /// `X-Forwarded-For` hop wins, then `X-Real-Ip`, then the peer address.
    pub fn client_ip(&self) -> Option<String> {
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real = self.header("x-real-ip").map(str::trim).filter(|v| !v.is_empty());

        forwarded
            .or(real)
            .map(str::to_owned)
            .or_else(|| self.remote_addr.map(|a| a.ip().to_string()))
    }

    /// Reads the whole body and restores an equivalent one.
    ///
    /// On a read error the body is left empty; the partial content is lost.
    pub async fn bytes(&mut self) -> Result<Bytes, BoxError> {
        let stream = std::mem::replace(&mut self.body, body::empty());
        let bytes = stream.collect().await?.to_bytes();
        self.body = body::full(bytes.clone());
        Ok(bytes)
    }

    /// Reads the body as JSON. Undecodable input is a parameter error.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, Failure> {
        let bytes = self.bytes().await.map_err(Failure::Unclassified)?;
        serde_json::from_slice(&bytes).map_err(|e| Failure::validation(e.to_string()))
    }

    /// Takes the body stream, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, body::empty())
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::Full;

    use super::*;

    fn request(uri: &str, body: &'static [u8]) -> Request {
        Request::new(
            http::Request::builder()
                .uri(uri)
                .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
                .body(Full::new(Bytes::from_static(body)))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn body_can_be_read_twice() {
        let mut req = request("/", br#"{"a":1}"#);
        let first = req.bytes().await.unwrap();
        let second = req.bytes().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(&first[..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn json_rejects_garbage_as_parameter_error() {
        let mut req = request("/", b"{nope");
        let err = req.json::<serde_json::Value>().await.unwrap_err();
        assert!(matches!(err, Failure::Validation(_)));
    }

    #[test]
    fn query_pairs_are_decoded() {
        let req = request("/search?q=hello+world&tag=a%2Fb&tag=c&flag", b"");
        assert_eq!(
            req.query_pairs(),
            vec![
                ("q".to_owned(), "hello world".to_owned()),
                ("tag".to_owned(), "a/b".to_owned()),
                ("tag".to_owned(), "c".to_owned()),
                ("flag".to_owned(), String::new()),
            ]
        );
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let req = request("/", b"").with_remote_addr("10.0.0.1:5000".parse().unwrap());
        assert_eq!(req.client_ip().as_deref(), Some("203.0.113.9"));

        let bare = Request::new(http::Request::new(Full::new(Bytes::new())))
            .with_remote_addr("192.0.2.4:1234".parse().unwrap());
        assert_eq!(bare.client_ip().as_deref(), Some("192.0.2.4"));
    }
}
