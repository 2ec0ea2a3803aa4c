use crate::Error;
use axum::extract::State;
use axum::response::Response;
use log::*;
use service::AppState;
use sse::{body, StreamEnd, StreamHandler};
use tokio_util::sync::CancellationToken;

/// Frames that may queue in the response body ahead of a slow client.
const BODY_FRAME_CAPACITY: usize = 16;

/// GET a long-lived event stream of everything published to the broadcaster
#[utoipa::path(
    get,
    path = "/events/stream",
    responses(
        (status = 200, description = "Event stream opened", content_type = "text/event-stream", body = String),
        (status = 500, description = "Internal Server Error")
    )
)]
pub(crate) async fn sse_handler(State(app_state): State<AppState>) -> Result<Response, Error> {
    let handler = StreamHandler::new(
        app_state.broadcaster.clone(),
        app_state.config.sse_retry(),
        app_state.config.sse_keep_alive(),
    );
    let (sink, pending) = body::channel(BODY_FRAME_CAPACITY);
    let cancel = CancellationToken::new();

    // The watcher keeps the body channel observable until the stream ends.
    let disconnected = sink.disconnected();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = disconnected => {
                debug!("SSE client went away");
                watcher.cancel();
            }
            _ = watcher.cancelled() => {}
        }
    });

    let stream = tokio::spawn(async move {
        let outcome = handler.serve(sink, cancel.clone()).await;
        cancel.cancel();
        match &outcome {
            Ok(StreamEnd::ClientDisconnected) => debug!("SSE stream ended: client disconnected"),
            Ok(StreamEnd::SourceClosed) => debug!("SSE stream ended: broadcaster closed"),
            Err(e) => warn!("SSE stream ended with error: {e}"),
        }
        outcome
    });

    if let Some(response) = pending.into_response().await {
        return Ok(response);
    }

    // The stream never committed a response head, so it failed during setup.
    match stream.await {
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(_)) => Err(sse::Error::other("stream ended before opening").into()),
        Err(e) => Err(sse::Error::other(format!("stream task failed: {e}")).into()),
    }
}
