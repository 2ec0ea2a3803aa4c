use crate::controller::{event_controller, health_check_controller};
use crate::middleware::request_logger::log_requests;
use crate::params;
use crate::sse::handler::sse_handler;
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service::AppState;

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "SSE Hub API"
        ),
        paths(
            event_controller::publish,
            event_controller::stats,
            health_check_controller::health_check,
            crate::sse::handler::sse_handler,
        ),
        components(
            schemas(
                params::event::PublishParams,
                event_controller::StatsResponse,
            )
        ),
        tags(
            (name = "sse_hub", description = "Server-Sent Events publish/subscribe hub")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(event_routes(app_state.clone()))
        .merge(sse_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
        .layer(from_fn(log_requests))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", post(event_controller::publish))
        .route("/events/stats", get(event_controller::stats))
        .with_state(app_state)
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events/stream", get(sse_handler))
        .with_state(app_state)
}
