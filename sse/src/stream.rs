use crate::connection::ConnectionId;
use crate::error::Result;
use crate::message::{Comment, Event};
use crate::writer::{ResponseSink, SseWriter};
use async_trait::async_trait;
use events::{Broadcaster, Subscription, Unsubscribe};
use log::*;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_KEEP_ALIVE: Duration = Duration::from_millis(1);

/// Anything a stream can subscribe to for the lifetime of one connection.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self) -> (Subscription<Event>, Unsubscribe<Event>);
}

#[async_trait]
impl EventSource for Broadcaster<Event> {
    async fn subscribe(&self) -> (Subscription<Event>, Unsubscribe<Event>) {
        Broadcaster::subscribe(self).await
    }
}

/// How a stream that ran to completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The connection was cancelled (client went away or the server is shutting down).
    ClientDisconnected,
    /// The source closed the subscription.
    SourceClosed,
}

/// Adapts an [`EventSource`] subscription into an SSE response stream.
#[derive(Clone)]
pub struct StreamHandler<S> {
    source: S,
    retry: Duration,
    keep_alive: Duration,
}

impl<S: EventSource> StreamHandler<S> {
    pub fn new(source: S, retry: Duration, keep_alive: Duration) -> Self {
        Self {
            source,
            retry,
            keep_alive: keep_alive.max(MIN_KEEP_ALIVE),
        }
    }

    /// Streams events to `sink` until `cancel` fires, the source closes, or a
    /// write fails.
    ///
    /// The subscription taken for this connection is released on every path
    /// that gets as far as subscribing.
    pub async fn serve<W: ResponseSink>(
        &self,
        sink: W,
        cancel: CancellationToken,
    ) -> Result<StreamEnd> {
        let connection_id = ConnectionId::new();

        let mut writer = SseWriter::new(sink)?;
        writer.set_stream_headers();
        writer.write_retry(self.retry).await?;

        let (mut subscription, unsubscribe) = self.source.subscribe().await;
        debug!(
            "SSE connection {connection_id} subscribed ({})",
            subscription.id()
        );

        let outcome = self
            .pump(&connection_id, &mut writer, &mut subscription, &cancel)
            .await;

        unsubscribe.unsubscribe().await;
        debug!("SSE connection {connection_id} released its subscription");
        outcome
    }

    async fn pump<W: ResponseSink>(
        &self,
        connection_id: &ConnectionId,
        writer: &mut SseWriter<W>,
        subscription: &mut Subscription<Event>,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd> {
        let keep_alive_comment = Comment::keep_alive();
        let mut keep_alive = interval_at(Instant::now() + self.keep_alive, self.keep_alive);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("SSE connection {connection_id}: client disconnected");
                    return Ok(StreamEnd::ClientDisconnected);
                }
                _ = keep_alive.tick() => {
                    if let Err(e) = writer.write_comment(&keep_alive_comment).await {
                        warn!("SSE connection {connection_id}: keep-alive error: {e}");
                        return Err(e);
                    }
                }
                received = subscription.recv() => {
                    let Some(event) = received else {
                        info!("SSE connection {connection_id}: event source closed");
                        return Ok(StreamEnd::SourceClosed);
                    };
                    if let Err(e) = writer.write_event(&event).await {
                        warn!("SSE connection {connection_id}: event write error: {e}");
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::writer::tests::RecordingSink;
    use events::{BroadcasterBuilder, SubscriptionId};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(5);
    const RETRY: Duration = Duration::from_secs(5);
    const NEVER: Duration = Duration::from_secs(3600);

    struct Harness {
        broadcaster: Broadcaster<Event>,
        subscribed: mpsc::UnboundedReceiver<SubscriptionId>,
        unsubscribed: mpsc::UnboundedReceiver<SubscriptionId>,
    }

    impl Harness {
        fn new() -> Self {
            let (sub_tx, subscribed) = mpsc::unbounded_channel();
            let (unsub_tx, unsubscribed) = mpsc::unbounded_channel();
            let broadcaster = BroadcasterBuilder::new()
                .on_subscribe(move |id| {
                    let _ = sub_tx.send(id);
                })
                .on_unsubscribe(move |id| {
                    let _ = unsub_tx.send(id);
                })
                .build();
            broadcaster.start();
            Self {
                broadcaster,
                subscribed,
                unsubscribed,
            }
        }

        fn handler(&self, keep_alive: Duration) -> StreamHandler<Broadcaster<Event>> {
            StreamHandler::new(self.broadcaster.clone(), RETRY, keep_alive)
        }

        /// Starts a stream and waits until its subscription is registered.
        async fn connect(
            &mut self,
            keep_alive: Duration,
        ) -> (
            RecordingSink,
            CancellationToken,
            JoinHandle<Result<StreamEnd>>,
            SubscriptionId,
        ) {
            let sink = RecordingSink::new();
            let cancel = CancellationToken::new();
            let handler = self.handler(keep_alive);
            let stream = tokio::spawn({
                let sink = sink.clone();
                let cancel = cancel.clone();
                async move { handler.serve(sink, cancel).await }
            });
            let id = timeout(WAIT, self.subscribed.recv())
                .await
                .expect("stream never subscribed")
                .unwrap();
            (sink, cancel, stream, id)
        }
    }

    async fn wait_for_text(sink: &RecordingSink, expected: &str) {
        timeout(WAIT, async {
            while !sink.flushed_text().contains(expected) {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never saw {expected:?} in {:?}", sink.flushed_text()));
    }

    #[tokio::test]
    async fn test_stream_writes_headers_retry_then_events() {
        let mut harness = Harness::new();
        let (sink, _cancel, stream, _) = harness.connect(NEVER).await;

        let event = Event::new("a\nb")
            .with_id("7")
            .unwrap()
            .with_event("update")
            .unwrap();
        harness.broadcaster.publish(event).await;
        wait_for_text(&sink, "data: b\n\n").await;

        harness.broadcaster.close();
        let end = timeout(WAIT, stream).await.unwrap().unwrap().unwrap();

        assert_eq!(end, StreamEnd::SourceClosed);
        assert_eq!(
            sink.flushed_text(),
            "retry: 5000\n\nid: 7\nevent: update\ndata: a\ndata: b\n\n"
        );
        let recording = sink.recording.lock().unwrap();
        assert_eq!(
            recording.headers[axum::http::header::CONTENT_TYPE],
            crate::writer::EVENT_STREAM
        );
    }

    #[tokio::test]
    async fn test_sink_without_flush_fails_before_subscribing() {
        let mut harness = Harness::new();
        let sink = RecordingSink::without_flush();

        let err = harness
            .handler(NEVER)
            .serve(sink.clone(), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::StreamingUnsupported);
        assert_eq!(sink.flushed_text(), "");
        assert!(sink.recording.lock().unwrap().headers.is_empty());
        assert!(harness.subscribed.try_recv().is_err());
        assert_eq!(harness.broadcaster.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_is_written_while_idle() {
        let mut harness = Harness::new();
        let (sink, cancel, stream, _) = harness.connect(Duration::from_millis(10)).await;

        sleep(Duration::from_millis(25)).await;
        wait_for_text(&sink, ": keep-alive\n\n").await;

        harness.broadcaster.publish(Event::new("after")).await;
        wait_for_text(&sink, "data: after\n\n").await;

        let text = sink.flushed_text();
        assert!(text.starts_with("retry: 5000\n\n: keep-alive\n\n"));
        assert!(text.find(": keep-alive").unwrap() < text.find("data: after").unwrap());

        cancel.cancel();
        let end = timeout(WAIT, stream).await.unwrap().unwrap().unwrap();
        assert_eq!(end, StreamEnd::ClientDisconnected);
    }

    #[tokio::test]
    async fn test_cancellation_releases_subscription() {
        let mut harness = Harness::new();
        let (_sink, cancel, stream, id) = harness.connect(NEVER).await;
        assert_eq!(harness.broadcaster.subscriber_count(), 1);

        cancel.cancel();
        let end = timeout(WAIT, stream).await.unwrap().unwrap().unwrap();

        assert_eq!(end, StreamEnd::ClientDisconnected);
        let released = timeout(WAIT, harness.unsubscribed.recv()).await.unwrap();
        assert_eq!(released, Some(id));
        assert_eq!(harness.broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_ends_stream_and_releases_subscription() {
        let mut harness = Harness::new();
        let (sink, _cancel, stream, id) = harness.connect(NEVER).await;

        sink.break_pipe();
        harness.broadcaster.publish(Event::new("lost")).await;

        let err = timeout(WAIT, stream).await.unwrap().unwrap().unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Write);

        let released = timeout(WAIT, harness.unsubscribed.recv()).await.unwrap();
        assert_eq!(released, Some(id));
        assert_eq!(sink.flushed_text(), "retry: 5000\n\n");
    }

    #[tokio::test]
    async fn test_disconnected_client_stops_receiving_while_others_continue() {
        let mut harness = Harness::new();
        let (first, _first_cancel, first_stream, _) = harness.connect(NEVER).await;
        let (second, second_cancel, second_stream, second_id) = harness.connect(NEVER).await;

        harness.broadcaster.publish(Event::new("hello")).await;
        harness.broadcaster.publish(Event::new("world")).await;
        wait_for_text(&first, "data: world\n\n").await;
        wait_for_text(&second, "data: world\n\n").await;

        second_cancel.cancel();
        let end = timeout(WAIT, second_stream).await.unwrap().unwrap().unwrap();
        assert_eq!(end, StreamEnd::ClientDisconnected);
        let released = timeout(WAIT, harness.unsubscribed.recv()).await.unwrap();
        assert_eq!(released, Some(second_id));

        harness.broadcaster.publish(Event::new("goodbye")).await;
        wait_for_text(&first, "data: goodbye\n\n").await;
        harness.broadcaster.close();

        let end = timeout(WAIT, first_stream).await.unwrap().unwrap().unwrap();
        assert_eq!(end, StreamEnd::SourceClosed);
        assert_eq!(
            first.flushed_text(),
            "retry: 5000\n\ndata: hello\n\ndata: world\n\ndata: goodbye\n\n"
        );
        assert_eq!(
            second.flushed_text(),
            "retry: 5000\n\ndata: hello\n\ndata: world\n\n"
        );
    }

    #[tokio::test]
    async fn test_stream_against_closed_source_ends_immediately() {
        let harness = Harness::new();
        harness.broadcaster.close();

        let sink = RecordingSink::new();
        let end = timeout(
            WAIT,
            harness
                .handler(NEVER)
                .serve(sink.clone(), CancellationToken::new()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(end, StreamEnd::SourceClosed);
        assert_eq!(sink.flushed_text(), "retry: 5000\n\n");
    }
}
