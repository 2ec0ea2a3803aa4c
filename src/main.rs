use log::*;
use service::{config::Config, logging::Logger, AppState};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    info!(
        "Starting sse_hub_rs v{} [{}]",
        env!("CARGO_PKG_VERSION"),
        config.runtime_env()
    );

    let broadcaster = service::init_broadcaster(&config);
    let app_state = AppState::new(config, broadcaster.clone());

    tokio::spawn(shutdown_signal(app_state.shutdown.clone()));

    if let Err(e) = web::init_server(app_state).await {
        error!("Failed to start server: {e}");
        broadcaster.close();
        std::process::exit(1);
    }

    broadcaster.close();
    info!("sse_hub_rs stopped");
}

/// Cancels `shutdown` on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }

    shutdown.cancel();
}
