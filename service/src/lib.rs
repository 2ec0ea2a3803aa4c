use config::Config;
use events::{Broadcaster, BroadcasterBuilder};
use log::debug;
use sse::Event;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod logging;

/// Builds the application-wide event broadcaster from configuration and
/// starts its control loop.
pub fn init_broadcaster(config: &Config) -> Broadcaster<Event> {
    let broadcaster = BroadcasterBuilder::new()
        .capacity(config.subscriber_buffer_size)
        .on_subscribe(|id| debug!("Subscriber {id} joined"))
        .on_unsubscribe(|id| debug!("Subscriber {id} left"))
        .build();
    broadcaster.start();
    broadcaster
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub broadcaster: Broadcaster<Event>,
    /// Cancelled once the server begins shutting down. Streams are ended by closing
    /// the broadcaster, not through this token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(app_config: Config, broadcaster: Broadcaster<Event>) -> Self {
        Self {
            config: app_config,
            broadcaster,
            shutdown: CancellationToken::new(),
        }
    }
}
