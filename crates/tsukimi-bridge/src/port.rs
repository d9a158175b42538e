use serde_json::Value;

use tsukimi_core::listeners::{Listener, ListenerSet};

/// A message as delivered by the host, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct PortMessage {
    /// Origin the host attributes the message to.
    pub origin: String,
    pub data: Value,
}

pub type PortHandler = Listener<PortMessage>;

/// Source of raw cross-origin messages (e.g. the browser window).
pub trait MessagePort {
    /// Start delivering messages to `handler` until the returned
    /// subscription is dropped.
    fn subscribe(&self, handler: PortHandler) -> PortSubscription;
}

/// Disposer for a port subscription. Dropping it detaches the handler.
#[must_use = "dropping the subscription detaches the handler"]
pub struct PortSubscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl PortSubscription {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Detach now instead of at drop.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for PortSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PortSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSubscription")
            .field("attached", &self.dispose.is_some())
            .finish()
    }
}

/// In-process port. Messages posted here are delivered synchronously, in
/// order, to every subscribed handler.
#[derive(Clone, Default)]
pub struct ChannelPort {
    handlers: ListenerSet<PortMessage>,
}

impl ChannelPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, origin: impl Into<String>, data: Value) {
        self.handlers.emit(&PortMessage {
            origin: origin.into(),
            data,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

impl MessagePort for ChannelPort {
    fn subscribe(&self, handler: PortHandler) -> PortSubscription {
        let subscription = self.handlers.subscribe(handler);
        PortSubscription::new(move || subscription.dispose())
    }
}
