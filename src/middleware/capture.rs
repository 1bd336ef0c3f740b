//! Body-capturing response writer.
//!
//! [`CaptureBody`] wraps an outbound body stream. Each data frame is copied
//! into a side buffer and then handed to the client unchanged, in that
//! order. The buffer is bounded; the byte count is not.
//!
//! When the stream finishes (end, error, or drop on client disconnect) the
//! completion callback runs exactly once with the [`Captured`] bytes.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes, BytesMut};
use http::StatusCode;
use http_body::{Body, Frame, SizeHint};

use crate::classify::BoxError;

/// What the client was sent.
#[derive(Clone, Debug)]
pub struct Captured {
    pub status: StatusCode,
    /// At most the capture limit of leading bytes.
    pub body: Bytes,
    /// Bytes actually yielded to the client.
    pub total_len: usize,
}

type OnComplete = Box<dyn FnOnce(Captured) + Send + 'static>;

pub struct CaptureBody<B> {
    inner: B,
    status: StatusCode,
    buf: BytesMut,
    limit: usize,
    total_len: usize,
    on_complete: Option<OnComplete>,
}

impl<B> CaptureBody<B> {
    pub fn new(
        inner: B,
        status: StatusCode,
        limit: usize,
        on_complete: impl FnOnce(Captured) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            status,
            buf: BytesMut::new(),
            limit,
            total_len: 0,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn mirror(&mut self, chunk: &[u8]) {
        self.total_len += chunk.len();
        let room = self.limit.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(Captured {
                status: self.status,
                body: std::mem::take(&mut self.buf).freeze(),
                total_len: self.total_len,
            });
        }
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes, Error = BoxError> + Unpin,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.mirror(data.chunk());
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                this.complete();
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.complete();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

// hyper stops polling once `is_end_stream` is true, so the final `None` may
// never be observed. Dropping the body is the one event that always happens.
impl<B> Drop for CaptureBody<B> {
    fn drop(&mut self) {
        self.complete();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::stream;
    use http_body_util::{BodyExt, StreamBody};

    use super::*;
    use crate::body::{self, Body as AnyBody};

    fn chunked(parts: &[&'static [u8]]) -> AnyBody {
        let frames = parts
            .iter()
            .map(|p| Ok::<_, BoxError>(Frame::data(Bytes::from_static(p))))
            .collect::<Vec<_>>();
        body::boxed(StreamBody::new(stream::iter(frames)))
    }

    fn recorder() -> (Arc<Mutex<Vec<Captured>>>, impl FnOnce(Captured) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |c| sink.lock().unwrap().push(c))
    }

    #[tokio::test]
    async fn client_bytes_are_identical_and_mirrored() {
        let (seen, done) = recorder();
        let body = CaptureBody::new(chunked(&[b"hel", b"lo ", b"world"]), StatusCode::OK, 1024, done);

        let delivered = body.collect().await.unwrap().to_bytes();

        assert_eq!(&delivered[..], b"hello world");
        let captured = seen.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].body, delivered);
        assert_eq!(captured[0].total_len, delivered.len());
        assert_eq!(captured[0].status, StatusCode::OK);
    }

    #[tokio::test]
    async fn capture_limit_never_truncates_delivery() {
        let (seen, done) = recorder();
        let body = CaptureBody::new(chunked(&[b"0123456789", b"abcdef"]), StatusCode::CREATED, 4, done);

        let delivered = body.collect().await.unwrap().to_bytes();

        assert_eq!(&delivered[..], b"0123456789abcdef");
        let captured = seen.lock().unwrap();
        assert_eq!(&captured[0].body[..], b"0123");
        assert_eq!(captured[0].total_len, 16);
    }

    #[tokio::test]
    async fn dropping_mid_stream_completes_once() {
        let (seen, done) = recorder();
        let mut body = CaptureBody::new(chunked(&[b"first", b"second"]), StatusCode::OK, 64, done);

        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"first"));
        drop(body);

        let captured = seen.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(&captured[0].body[..], b"first");
    }

    #[tokio::test]
    async fn full_body_completes_on_drop_after_end() {
        let (seen, done) = recorder();
        let body = CaptureBody::new(body::full("ok"), StatusCode::ACCEPTED, 64, done);
        let delivered = body.collect().await.unwrap().to_bytes();
        assert_eq!(&delivered[..], b"ok");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
