use crate::error::{Error, Result};
use crate::message::{Comment, Event, Retry};
use async_trait::async_trait;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue};
use std::io;
use std::time::Duration;

/// Media type of a Server-Sent Events response.
pub const EVENT_STREAM: &str = "text/event-stream";

/// The per-connection byte sink an SSE stream is written to.
///
/// Headers may be set until the first successful `flush`, which commits the
/// response head.
#[async_trait]
pub trait ResponseSink: Send {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Whether written bytes can be pushed to the client before the response ends.
    fn supports_flush(&self) -> bool;

    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;
}

/// Writes SSE wire artifacts to a flushing [`ResponseSink`].
///
/// Each artifact is rendered in full before a single write followed by a
/// flush, so a client never sees half an event unless the transport fails.
pub struct SseWriter<W> {
    sink: W,
}

impl<W: ResponseSink> SseWriter<W> {
    /// Fails with `StreamingUnsupported` if the sink cannot flush.
    pub fn new(sink: W) -> Result<Self> {
        if !sink.supports_flush() {
            return Err(Error::streaming_unsupported());
        }
        Ok(Self { sink })
    }

    pub fn set_stream_headers(&mut self) {
        self.sink
            .set_header(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
        self.sink
            .set_header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }

    pub async fn write_event(&mut self, event: &Event) -> Result<()> {
        self.send(event.to_string()).await
    }

    pub async fn write_comment(&mut self, comment: &Comment) -> Result<()> {
        self.send(comment.to_string()).await
    }

    pub async fn write_retry(&mut self, retry: Duration) -> Result<()> {
        self.send(Retry(retry).to_string()).await
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    async fn send(&mut self, block: String) -> Result<()> {
        self.sink.write(block.as_bytes()).await?;
        self.sink.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use axum::http::HeaderMap;
    use std::sync::{Arc, Mutex};

    /// What a [`RecordingSink`] has seen, shared with the test body.
    #[derive(Default)]
    pub(crate) struct Recording {
        pub headers: HeaderMap,
        pub written: Vec<u8>,
        pub flushed: Vec<u8>,
        pub flushes: usize,
    }

    impl Recording {
        pub fn flushed_text(&self) -> String {
            String::from_utf8(self.flushed.clone()).unwrap()
        }
    }

    /// In-memory sink whose flush support and write failures are switchable.
    #[derive(Clone)]
    pub(crate) struct RecordingSink {
        pub recording: Arc<Mutex<Recording>>,
        pub flushable: bool,
        pub fail_writes: Arc<Mutex<bool>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self {
                recording: Arc::new(Mutex::new(Recording::default())),
                flushable: true,
                fail_writes: Arc::new(Mutex::new(false)),
            }
        }

        pub fn without_flush() -> Self {
            Self {
                flushable: false,
                ..Self::new()
            }
        }

        pub fn break_pipe(&self) {
            *self.fail_writes.lock().unwrap() = true;
        }

        pub fn flushed_text(&self) -> String {
            self.recording.lock().unwrap().flushed_text()
        }
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
            self.recording.lock().unwrap().headers.insert(name, value);
        }

        fn supports_flush(&self) -> bool {
            self.flushable
        }

        async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
            if *self.fail_writes.lock().unwrap() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
            }
            self.recording.lock().unwrap().written.extend_from_slice(buf);
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            let mut recording = self.recording.lock().unwrap();
            let pending = std::mem::take(&mut recording.written);
            recording.flushed.extend_from_slice(&pending);
            recording.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_sink_without_flush_is_rejected_before_writing() {
        let sink = RecordingSink::without_flush();
        let err = SseWriter::new(sink.clone()).err().unwrap();

        assert_eq!(err.error_kind, ErrorKind::StreamingUnsupported);
        let recording = sink.recording.lock().unwrap();
        assert!(recording.written.is_empty());
        assert!(recording.headers.is_empty());
    }

    #[tokio::test]
    async fn test_each_artifact_is_flushed_immediately() {
        let sink = RecordingSink::new();
        let mut writer = SseWriter::new(sink.clone()).unwrap();

        writer.set_stream_headers();
        writer.write_retry(Duration::from_secs(5)).await.unwrap();
        writer.write_comment(&Comment::keep_alive()).await.unwrap();
        writer
            .write_event(&Event::new("a\nb").with_id("7").unwrap())
            .await
            .unwrap();

        let recording = sink.recording.lock().unwrap();
        assert_eq!(recording.headers[CONTENT_TYPE], EVENT_STREAM);
        assert_eq!(recording.headers[CACHE_CONTROL], "no-cache");
        assert_eq!(recording.flushes, 3);
        assert!(recording.written.is_empty());
        assert_eq!(
            recording.flushed_text(),
            "retry: 5000\n\n: keep-alive\n\nid: 7\ndata: a\ndata: b\n\n"
        );
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_as_write_error() {
        let sink = RecordingSink::new();
        let mut writer = SseWriter::new(sink.clone()).unwrap();
        sink.break_pipe();

        let err = writer.write_event(&Event::new("lost")).await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Write);
        assert_eq!(sink.flushed_text(), "");
    }
}
