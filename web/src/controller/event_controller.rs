use crate::controller::ApiResponse;
use crate::params::event::PublishParams;
use crate::Error;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use events::BroadcasterStats;
use serde::Serialize;
use service::AppState;
use utoipa::ToSchema;

use log::*;

/// Broadcaster counters as reported by `GET /events/stats`.
#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct StatsResponse {
    /// Currently registered subscribers.
    subscribers: usize,
    /// Messages accepted by the control loop.
    published: u64,
    /// Deliveries skipped because a subscriber's buffer was full.
    dropped: u64,
    /// Whether the broadcaster has been closed.
    closed: bool,
}

impl StatsResponse {
    fn new(stats: BroadcasterStats, closed: bool) -> Self {
        Self {
            subscribers: stats.subscribers,
            published: stats.published,
            dropped: stats.dropped,
            closed,
        }
    }
}

/// POST publish an event to every connected stream
#[utoipa::path(
    post,
    path = "/events",
    request_body = PublishParams,
    responses(
        (status = 202, description = "Event accepted for delivery to connected streams"),
        (status = 422, description = "Unprocessable Entity"),
        (status = 405, description = "Method not allowed")
    )
)]
pub async fn publish(
    State(app_state): State<AppState>,
    Json(params): Json<PublishParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Publish event from: {params:?}");

    let event = sse::Event::try_from(params)?;
    app_state.broadcaster.publish(event).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::no_content(StatusCode::ACCEPTED.into())),
    ))
}

/// GET broadcaster delivery counters
#[utoipa::path(
    get,
    path = "/events/stats",
    responses(
        (status = 200, description = "Successfully retrieved broadcaster counters", body = StatsResponse),
        (status = 405, description = "Method not allowed")
    )
)]
pub async fn stats(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let broadcaster = &app_state.broadcaster;
    let stats = StatsResponse::new(broadcaster.stats(), broadcaster.is_closed());

    debug!("Broadcaster stats: {stats:?}");

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), stats)))
}
