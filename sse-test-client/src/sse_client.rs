use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Event {
    pub id: Option<String>,
    pub event_type: String,
    pub data: String,
}

pub struct Connection {
    pub label: String,
    event_rx: mpsc::UnboundedReceiver<Event>,
    handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub fn establish(stream_url: &str, label: String) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(stream_url)?
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        let task_label = label.clone();
        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        let sse_event = Event {
                            id: event.id,
                            event_type: event.event_type,
                            data: event.data,
                        };

                        if tx.send(sse_event).is_err() {
                            debug!("SSE receiver dropped for {}", task_label);
                            break;
                        }
                    }
                    Some(Ok(es::SSE::Comment(comment))) => {
                        trace!("Comment for {}: {}", task_label, comment);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("SSE error for {}: {}", task_label, e);
                        break;
                    }
                    None => {
                        debug!("SSE stream ended for {}", task_label);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            label,
            event_rx: rx,
            handle,
        })
    }

    /// Waits for the event carrying `id`, skipping anything published by other runs.
    pub async fn wait_for_event(&mut self, id: &str, timeout: Duration) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for event: {}", id);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(event)) if event.id.as_deref() == Some(id) => {
                    return Ok(event);
                }
                Ok(Some(_)) => {
                    // Someone else's event, keep waiting
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("SSE connection closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for event: {}", id);
                }
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
