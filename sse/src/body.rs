//! [`ResponseSink`] backed by a streaming axum response body.
//!
//! The HTTP handler returns a response before the stream has produced
//! anything, so the sink and the response are connected through channels:
//! headers travel once, on the first flush, and every flush after that ships
//! the buffered bytes as one body frame.

use crate::writer::ResponseSink;
use async_stream::stream;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use std::convert::Infallible;
use std::future::Future;
use std::io;
use tokio::sync::{mpsc, oneshot};

/// Creates a connected sink/response pair. `capacity` bounds how many frames
/// may be queued ahead of the client.
pub fn channel(capacity: usize) -> (BodySink, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (frames_tx, frames_rx) = mpsc::channel(capacity.max(1));

    (
        BodySink {
            headers: HeaderMap::new(),
            head: Some(head_tx),
            buffer: BytesMut::new(),
            frames: frames_tx,
        },
        PendingResponse {
            head: head_rx,
            frames: frames_rx,
        },
    )
}

pub struct BodySink {
    headers: HeaderMap,
    head: Option<oneshot::Sender<HeaderMap>>,
    buffer: BytesMut,
    frames: mpsc::Sender<Bytes>,
}

impl BodySink {
    /// Resolves once the HTTP layer has dropped the response body.
    ///
    /// The returned future keeps the body open until it completes or is dropped.
    pub fn disconnected(&self) -> impl Future<Output = ()> + Send + 'static {
        let frames = self.frames.clone();
        async move { frames.closed().await }
    }
}

fn gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped")
}

#[async_trait]
impl ResponseSink for BodySink {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn supports_flush(&self) -> bool {
        true
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.frames.is_closed() {
            return Err(gone());
        }
        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if let Some(head) = self.head.take() {
            head.send(std::mem::take(&mut self.headers))
                .map_err(|_| gone())?;
        }
        if !self.buffer.is_empty() {
            let frame = self.buffer.split().freeze();
            self.frames.send(frame).await.map_err(|_| gone())?;
        }
        Ok(())
    }
}

/// The response half of [`channel`].
pub struct PendingResponse {
    head: oneshot::Receiver<HeaderMap>,
    frames: mpsc::Receiver<Bytes>,
}

impl PendingResponse {
    /// Waits for the sink to commit the response head.
    ///
    /// Returns `None` if the sink was dropped without ever flushing.
    pub async fn into_response(self) -> Option<Response> {
        let headers = self.head.await.ok()?;

        let mut frames = self.frames;
        let body = Body::from_stream(stream! {
            while let Some(frame) = frames.recv().await {
                yield Ok::<_, Infallible>(frame);
            }
        });

        let mut response = Response::new(body);
        *response.headers_mut() = headers;
        Some(response)
    }
}
