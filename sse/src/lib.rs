//! Server-Sent Events (SSE) infrastructure for real-time updates.
//!
//! This crate turns a subscription to an [`events::Broadcaster`] into a
//! long-lived `text/event-stream` HTTP response.
//!
//! # Architecture
//!
//! - **One subscription per connection**: every stream subscribes when it
//!   opens and releases the subscription on every exit path.
//! - **Validated events**: `id`, `event` and comments reject embedded line
//!   breaks at construction, so a rendered event can never corrupt the stream.
//! - **Flush per artifact**: each event, comment and retry directive is written
//!   whole and flushed immediately. Sinks that cannot flush are refused before
//!   anything is written.
//! - **Keep-alive**: an idle stream writes a `: keep-alive` comment every
//!   keep-alive interval.
//! - **Ephemeral messages**: a client that is offline, or too slow to drain
//!   its queue, misses events and reconnects after the advertised `retry:`.
//!
//! # Stream lifecycle
//!
//! 1. `StreamHandler::serve` checks the sink can flush, sets the SSE headers and
//!    writes the `retry:` directive
//! 2. The handler subscribes to its `EventSource`
//! 3. Each iteration waits for the first of: cancellation, keep-alive tick,
//!    next event
//! 4. The stream ends when the connection is cancelled, the source closes, or
//!    a write fails; the subscription is then released
//!
//! # Example: serving a stream
//!
//! ```rust,ignore
//! use sse::{body, Event, StreamHandler};
//!
//! let handler = StreamHandler::new(broadcaster.clone(), retry, keep_alive);
//! let (sink, pending) = body::channel(16);
//! tokio::spawn(async move { handler.serve(sink, cancel).await });
//! let response = pending.into_response().await;
//!
//! broadcaster.publish(Event::new("hello").with_event("greeting")?).await;
//! ```
//!
//! # Modules
//!
//! - `body`: `ResponseSink` implementation over a streaming axum body
//! - `connection`: per-connection identifiers used in logs
//! - `error`: error and error kind types
//! - `message`: `Event`, `Comment` and `Retry` wire values
//! - `stream`: `EventSource` and the per-connection `StreamHandler` loop
//! - `writer`: `ResponseSink` and the flushing `SseWriter`

pub mod body;
pub mod connection;
pub mod error;
pub mod message;
pub mod stream;
pub mod writer;

pub use error::{Error, ErrorKind, Field, Result};
pub use message::{Comment, Event, Retry};
pub use stream::{EventSource, StreamEnd, StreamHandler};
pub use writer::{ResponseSink, SseWriter, EVENT_STREAM};
