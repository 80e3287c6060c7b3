//! Broker engine
//!
//! `Broker` ties the subscription registry, the notification pipeline and the
//! wire codec together. It is a cheap, cloneable handle: every connection
//! task holds one, and the single dispatcher task runs until the last clone
//! is dropped.
//!
//! Concurrency and usage notes:
//! - `subscribe`, `unsubscribe` and `cleanup_client` only touch the
//!   registry's in-memory maps; no lock is held across network I/O.
//! - `publish` enqueues and returns immediately. Delivery happens later on
//!   the dispatcher task, in publish order.

use std::sync::Arc;

use tracing::debug;

use crate::broker::dispatch::{DispatchStats, NotificationEngine, pipeline};
use crate::broker::message::Message;
use crate::broker::registry::SubscriptionRegistry;
use crate::client::Subscriber;
use crate::transport::codec::{JsonCodec, WireCodec};
use crate::transport::connection::FrameDelivery;
use crate::utils::Result;

#[derive(Clone)]
pub struct Broker {
    registry: Arc<SubscriptionRegistry<Subscriber>>,
    engine: NotificationEngine,
    codec: Arc<dyn WireCodec>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Start a broker using the JSON body codec. Must be called from within
    /// a tokio runtime, since it spawns the dispatcher task.
    pub fn new() -> Self {
        Self::with_codec(Arc::new(JsonCodec))
    }

    pub fn with_codec(codec: Arc<dyn WireCodec>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (engine, dispatcher) = pipeline(registry.clone(), FrameDelivery::new(codec.clone()));
        tokio::spawn(dispatcher.run());

        Self {
            registry,
            engine,
            codec,
        }
    }

    pub fn subscribe(&self, topic: &str, subscriber: &Subscriber) {
        if self.registry.add(topic, subscriber.clone()) {
            debug!(%subscriber, topic, "subscribed");
        }
    }

    pub fn unsubscribe(&self, topic: &str, subscriber: &Subscriber) {
        if self.registry.remove(topic, subscriber) {
            debug!(%subscriber, topic, "unsubscribed");
        }
    }

    pub fn publish(&self, message: Message) -> Result<()> {
        debug!(topic = message.topic(), "publish queued");
        self.engine.publish(message)
    }

    /// Drop every subscription held by `subscriber`. Returns the topics it
    /// was removed from.
    pub fn cleanup_client(&self, subscriber: &Subscriber) -> Vec<String> {
        let topics = self.registry.remove_all(subscriber);
        for topic in &topics {
            debug!(%subscriber, %topic, "unsubscribed on teardown");
        }
        topics
    }

    pub fn registry(&self) -> &SubscriptionRegistry<Subscriber> {
        &self.registry
    }

    pub fn codec(&self) -> &dyn WireCodec {
        self.codec.as_ref()
    }

    pub fn stats(&self) -> DispatchStats {
        self.engine.stats()
    }
}
