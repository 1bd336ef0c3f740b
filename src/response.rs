//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. Middleware may read
//! the status, add headers, or wrap the body stream before it is sent.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use crate::body::{self, Body};
use crate::envelope::Envelope;
use crate::status::Status;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts
///
/// ```rust
/// use gatehouse::{Response, Status};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(Status::NoContent);
/// Response::error(Status::Forbidden, "not your order");
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use gatehouse::{Response, Status};
///
/// Response::builder()
///     .status(Status::Conflict)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// `200 OK` with `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: Status) -> Self {
        Self::builder().status(code).no_body()
    }

    /// Envelope response `{"msg": msg}` with the given status.
    pub fn error(code: Status, msg: impl Into<String>) -> Self {
        Self::envelope(code, &Envelope::new(msg))
    }

    /// Envelope response with the given status.
    pub fn envelope(code: Status, envelope: &Envelope) -> Self {
        Self::builder().status(code).json(envelope.to_vec())
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Replaces the body stream, keeping status and headers.
    pub fn map_body(self, f: impl FnOnce(Body) -> Body) -> Self {
        Self { status: self.status, headers: self.headers, body: f(self.body) }
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub(crate) fn into_inner(self) -> http::Response<Body> {
        let mut res = http::Response::new(self.body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `Status::Ok` (200).
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: Status) -> Self {
        self.status = code.into();
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::debug!("dropping invalid response header"),
        }
        self
    }

    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(JSON, body::full(body))
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT, body::full(body.into()))
    }

    /// Terminate with no body (e.g. `Status::NoContent`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: body::empty() }
    }

    /// Terminate with a caller-supplied body stream.
    pub fn body(self, body: Body) -> Response {
        Response { status: self.status, headers: self.headers, body }
    }

    fn finish(mut self, content_type: &'static str, body: Body) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response { status: self.status, headers: self.headers, body }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implemented for [`Response`], strings, [`Status`], [`Failure`](crate::Failure)
/// and `Result<T, E>` where both sides convert. The last one lets handlers
/// use `?` on collaborator calls:
///
/// ```rust,ignore
/// async fn profile(req: Request) -> Result<Response, Failure> {
///     let user = service.load(req.param("id")).await?;
///     Ok(Response::json(serde_json::to_vec(&user)?))
/// }
/// ```
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a [`Status`] directly from a handler: `return Status::NotFound`
impl IntoResponse for Status {
    fn into_response(self) -> Response { Response::status(self) }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn bytes_of(res: Response) -> Bytes {
        res.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn error_builds_envelope_json() {
        let res = Response::error(Status::Forbidden, "nope");
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.headers()[CONTENT_TYPE], JSON);
        assert_eq!(bytes_of(res).await, Bytes::from_static(br#"{"msg":"nope"}"#));
    }

    #[tokio::test]
    async fn builder_keeps_custom_headers() {
        let res = Response::builder()
            .status(Status::Conflict)
            .header("location", "/users/42")
            .header("bad header", "x")
            .text("exists");
        assert_eq!(res.status_code(), StatusCode::CONFLICT);
        assert_eq!(res.headers()["location"], "/users/42");
        assert_eq!(res.headers().len(), 2);
        assert_eq!(bytes_of(res).await, Bytes::from_static(b"exists"));
    }

    #[tokio::test]
    async fn result_converts_either_side() {
        let ok: Result<&'static str, Status> = Ok("fine");
        let err: Result<&'static str, Status> = Err(Status::Locked);
        assert_eq!(ok.into_response().status_code(), StatusCode::OK);
        assert_eq!(err.into_response().status_code(), StatusCode::LOCKED);
    }
}
