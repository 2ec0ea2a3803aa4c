use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use log::*;
use service::AppState;
use std::future::{Future, IntoFuture};
use std::io;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

mod controller;
mod error;
mod middleware;
mod params;
pub mod router;
mod sse;

pub use error::{Error, Result};

/// Binds the configured address and serves the API until the shutdown token fires.
pub async fn init_server(app_state: AppState) -> io::Result<()> {
    let server_url = app_state.config.server_address();
    let listener = TcpListener::bind(&server_url).await?;

    serve(listener, app_state).await
}

/// Serves the API on `listener` until the shutdown token fires.
///
/// On shutdown the broadcaster is closed, which ends every open event stream,
/// and the listener stops accepting. Connections that have not drained within
/// the configured timeout are abandoned.
pub async fn serve(listener: TcpListener, app_state: AppState) -> io::Result<()> {
    info!(
        "Server starting... listening for connections on http://{}",
        listener.local_addr()?
    );

    let cors_layer = cors_layer(&app_state.config.allowed_origins);
    let router = router::define_routes(app_state.clone()).layer(cors_layer);

    let shutdown = app_state.shutdown.clone();
    let broadcaster = app_state.broadcaster.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Shutdown requested, closing event streams");
            broadcaster.close();
        })
        .into_future();

    wait_for_drain(
        server,
        app_state.shutdown.clone(),
        app_state.config.shutdown_timeout(),
    )
    .await
}

/// Runs `server` to completion, or gives up `drain_timeout` after `shutdown` fires.
async fn wait_for_drain<F>(
    server: F,
    shutdown: CancellationToken,
    drain_timeout: Duration,
) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        result = server => {
            info!("Server stopped");
            result
        }
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            warn!("Connections did not drain within {drain_timeout:?}, forcing shutdown");
            Ok(())
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(origins)
}
