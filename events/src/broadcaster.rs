use crate::subscription::{Subscription, SubscriptionId, Unsubscribe};
use log::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Default number of messages buffered per subscriber before messages are dropped.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 5;

// Every command is handed off to a single control loop, depth 1 is enough.
const CONTROL_QUEUE_DEPTH: usize = 1;

/// Observation hook invoked from inside the control loop.
pub type Hook = Box<dyn Fn(SubscriptionId) + Send + Sync>;

/// Requests to the control loop. All three share one queue, so the loop
/// applies them in the order callers handed them off.
pub(crate) enum Command<T> {
    Subscribe(SubscriptionId, mpsc::Sender<T>),
    Unsubscribe(SubscriptionId),
    Publish(T),
}

/// Point-in-time counters describing a broadcaster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcasterStats {
    /// Subscriptions currently registered with the control loop
    pub subscribers: usize,
    /// Messages the control loop has fanned out
    pub published: u64,
    /// Per-subscriber deliveries discarded because that subscriber's queue was full
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    subscribers: AtomicUsize,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// In-process publish/subscribe hub.
///
/// All registry mutation happens on one control loop, reached through a single
/// bounded command queue, so subscribe, unsubscribe and publish take effect
/// in the order they were handed off. Publishing never waits on a subscriber: a subscriber whose queue is
/// full simply misses that message.
///
/// The handle is cheap to clone; all clones talk to the same control loop.
pub struct Broadcaster<T> {
    stop: CancellationToken,
    commands: mpsc::Sender<Command<T>>,
    control: Arc<Mutex<Option<ControlLoop<T>>>>,
    counters: Arc<Counters>,
    capacity: usize,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            stop: self.stop.clone(),
            commands: self.commands.clone(),
            control: Arc::clone(&self.control),
            counters: Arc::clone(&self.counters),
            capacity: self.capacity,
        }
    }
}

/// Configures a [`Broadcaster`] before its control loop exists.
pub struct BroadcasterBuilder {
    capacity: usize,
    on_subscribe: Option<Hook>,
    on_unsubscribe: Option<Hook>,
}

impl BroadcasterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-subscriber queue capacity. Values below 1 are raised to 1.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn on_subscribe(mut self, hook: impl Fn(SubscriptionId) + Send + Sync + 'static) -> Self {
        self.on_subscribe = Some(Box::new(hook));
        self
    }

    pub fn on_unsubscribe(
        mut self,
        hook: impl Fn(SubscriptionId) + Send + Sync + 'static,
    ) -> Self {
        self.on_unsubscribe = Some(Box::new(hook));
        self
    }

    pub fn build<T: Clone + Send + 'static>(self) -> Broadcaster<T> {
        let stop = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let (commands, commands_rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);

        let control = ControlLoop {
            stop: stop.clone(),
            commands: commands_rx,
            on_subscribe: self.on_subscribe,
            on_unsubscribe: self.on_unsubscribe,
            counters: Arc::clone(&counters),
        };

        Broadcaster {
            stop,
            commands,
            control: Arc::new(Mutex::new(Some(control))),
            counters,
            capacity: self.capacity,
        }
    }
}

impl Default for BroadcasterBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            on_subscribe: None,
            on_unsubscribe: None,
        }
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    pub fn new() -> Self {
        BroadcasterBuilder::new().build()
    }

    /// Spawns the control loop onto the current tokio runtime.
    ///
    /// Only the first call (of `start` or `run`) has any effect.
    pub fn start(&self) {
        if let Some(control) = self.take_control() {
            tokio::spawn(control.run());
        }
    }

    /// Runs the control loop on the calling task until the broadcaster closes.
    pub async fn run(&self) {
        if let Some(control) = self.take_control() {
            control.run().await;
        }
    }

    fn take_control(&self) -> Option<ControlLoop<T>> {
        let control = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if control.is_none() {
            warn!("Broadcaster control loop already started, ignoring");
        }
        control
    }

    /// Registers a new subscriber and returns its queue and release handle.
    ///
    /// After shutdown this still returns, handing back an already closed
    /// subscription.
    pub async fn subscribe(&self) -> (Subscription<T>, Unsubscribe<T>) {
        let id = SubscriptionId::new();
        let (sender, receiver) = mpsc::channel(self.capacity);

        // A registration that loses the race against `stop` drops `sender`,
        // which leaves `receiver` closed.
        let registered = tokio::select! {
            biased;
            _ = self.stop.cancelled() => false,
            sent = self.commands.send(Command::Subscribe(id, sender)) => sent.is_ok(),
        };
        if !registered {
            debug!("Broadcaster closed, subscription {id} starts closed");
        }

        (
            Subscription::new(id, receiver),
            Unsubscribe::new(id, self.commands.downgrade(), self.stop.clone()),
        )
    }

    /// Hands a message to the control loop for fan-out.
    ///
    /// A no-op once the broadcaster is closed.
    pub async fn publish(&self, message: T) {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => {
                debug!("Broadcaster closed, discarding published message");
            }
            sent = self.commands.send(Command::Publish(message)) => {
                if sent.is_err() {
                    debug!("Control loop gone, discarding published message");
                }
            }
        }
    }

    /// Signals shutdown. Repeated calls are no-ops.
    pub fn close(&self) {
        if !self.stop.is_cancelled() {
            info!("Closing broadcaster");
            self.stop.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn subscriber_count(&self) -> usize {
        self.counters.subscribers.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            subscribers: self.counters.subscribers.load(Ordering::Acquire),
            published: self.counters.published.load(Ordering::Acquire),
            dropped: self.counters.dropped.load(Ordering::Acquire),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sole owner of the subscriber registry.
struct ControlLoop<T> {
    stop: CancellationToken,
    commands: mpsc::Receiver<Command<T>>,
    on_subscribe: Option<Hook>,
    on_unsubscribe: Option<Hook>,
    counters: Arc<Counters>,
}

impl<T: Clone + Send + 'static> ControlLoop<T> {
    async fn run(mut self) {
        let mut subscribers: HashMap<SubscriptionId, mpsc::Sender<T>> = HashMap::new();
        debug!("Broadcaster control loop started");

        loop {
            let command = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                command = self.commands.recv() => command,
            };
            // Unsubscribe handles hold weak senders, so this means every
            // Broadcaster handle is gone.
            let Some(command) = command else {
                debug!("All broadcaster handles dropped");
                break;
            };

            match command {
                Command::Subscribe(id, sender) => {
                    if let Some(hook) = &self.on_subscribe {
                        hook(id);
                    }
                    subscribers.insert(id, sender);
                    self.counters.subscribers.store(subscribers.len(), Ordering::Release);
                    debug!("Registered subscription {id} ({} total)", subscribers.len());
                }
                Command::Unsubscribe(id) => {
                    // Removing the sender closes the subscriber's queue.
                    if subscribers.remove(&id).is_some() {
                        self.counters.subscribers.store(subscribers.len(), Ordering::Release);
                        if let Some(hook) = &self.on_unsubscribe {
                            hook(id);
                        }
                        debug!("Unregistered subscription {id} ({} remaining)", subscribers.len());
                    }
                }
                Command::Publish(message) => self.fan_out(&subscribers, message),
            }
        }

        let closed = subscribers.len();
        subscribers.clear();
        self.counters.subscribers.store(0, Ordering::Release);
        self.stop.cancel();
        info!("Broadcaster stopped, closed {closed} subscription(s)");
    }

    fn fan_out(&self, subscribers: &HashMap<SubscriptionId, mpsc::Sender<T>>, message: T) {
        self.counters.published.fetch_add(1, Ordering::AcqRel);

        for (id, sender) in subscribers {
            match sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.counters.dropped.fetch_add(1, Ordering::AcqRel);
                    trace!("Subscription {id} is full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    trace!("Subscription {id} receiver is gone, awaiting release");
                }
            }
        }
    }
}
