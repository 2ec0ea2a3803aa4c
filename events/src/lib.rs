//! In-process publish/subscribe infrastructure.
//!
//! This crate provides the [`Broadcaster`], a generic hub that decouples
//! producers of messages from a changing set of consumers.
//!
//! # Architecture
//!
//! - **Single control loop**: the subscriber registry is owned by one task.
//!   `subscribe`, `unsubscribe` and `publish` are commands sent to it over
//!   one bounded queue and applied in hand-off order, never lock-protected
//!   mutations.
//! - **Bounded subscriptions**: each subscriber gets its own queue
//!   (5 messages by default).
//! - **Drop-on-full fan-out**: a message is offered to every subscriber with a
//!   non-blocking send. A full queue loses that message for that subscriber
//!   only, the producer and every other subscriber are unaffected.
//! - **Shutdown**: `close` makes the control loop close every subscription
//!   exactly once; later operations degrade to no-ops.
//!
//! This crate has no dependencies on other workspace crates.
//!
//! # Example
//!
//! ```rust,ignore
//! let broadcaster = Broadcaster::<String>::new();
//! broadcaster.start();
//!
//! let (mut subscription, release) = broadcaster.subscribe().await;
//! broadcaster.publish("hello".to_string()).await;
//! assert_eq!(subscription.recv().await.as_deref(), Some("hello"));
//!
//! release.unsubscribe().await;
//! broadcaster.close();
//! ```

pub mod broadcaster;
pub mod subscription;

pub use broadcaster::{
    Broadcaster, BroadcasterBuilder, BroadcasterStats, Hook, DEFAULT_SUBSCRIBER_CAPACITY,
};
pub use subscription::{Subscription, SubscriptionId, Unsubscribe};
