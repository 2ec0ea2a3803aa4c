use crate::broadcaster::Command;
use log::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Unique identifier for a subscription (server-generated)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The receiving half of one subscriber's bounded queue.
///
/// Only the broadcaster's control loop ever writes to or closes the queue.
/// Once `recv` returns `None` the source is gone and no further messages
/// will arrive.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(id: SubscriptionId, receiver: mpsc::Receiver<T>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next message. `None` means the subscription was closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Release handle returned alongside a [`Subscription`].
///
/// Calling [`Unsubscribe::unsubscribe`] more than once is a no-op. Dropping a
/// handle that was never released hands the release to the control loop in
/// the background, so a subscription cannot leak past its owner's scope.
///
/// The handle does not keep the control loop alive: once every `Broadcaster`
/// handle is gone there is nothing left to release from.
pub struct Unsubscribe<T: Send + 'static> {
    id: SubscriptionId,
    commands: mpsc::WeakSender<Command<T>>,
    stop: CancellationToken,
    released: AtomicBool,
}

impl<T: Send + 'static> fmt::Debug for Unsubscribe<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

impl<T: Send + 'static> Unsubscribe<T> {
    pub(crate) fn new(
        id: SubscriptionId,
        commands: mpsc::WeakSender<Command<T>>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            id,
            commands,
            stop,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the subscription from the broadcaster and closes its queue.
    ///
    /// Returns immediately if the broadcaster has already stopped.
    pub async fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(commands) = self.commands.upgrade() else {
            trace!("Control loop gone, nothing to release for {}", self.id);
            return;
        };

        tokio::select! {
            biased;
            _ = self.stop.cancelled() => {
                trace!("Broadcaster already stopped, nothing to release for {}", self.id);
            }
            sent = commands.send(Command::Unsubscribe(self.id)) => {
                if sent.is_err() {
                    trace!("Control loop gone, nothing to release for {}", self.id);
                }
            }
        }
    }
}

impl<T: Send + 'static> Drop for Unsubscribe<T> {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) || self.stop.is_cancelled() {
            return;
        }
        let Some(commands) = self.commands.upgrade() else {
            return;
        };

        match commands.try_send(Command::Unsubscribe(self.id)) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                // Queue depth is 1; finish the hand-off on the runtime if there is one.
                let id = self.id;
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    warn!("Dropped subscription {id} outside a runtime, it stays registered until shutdown");
                    return;
                };
                let commands = commands.downgrade();
                let stop = self.stop.clone();
                runtime.spawn(async move {
                    let Some(commands) = commands.upgrade() else {
                        return;
                    };
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => {}
                        _ = commands.send(Command::Unsubscribe(id)) => {}
                    }
                });
            }
        }
    }
}
