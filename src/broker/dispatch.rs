//! Notification pipeline
//!
//! Publishers push messages into an unbounded FIFO queue through a cloneable
//! `NotificationEngine`. Exactly one `Dispatcher` drains it: for every message
//! it resolves a snapshot of the topic's subscribers and hands the message to
//! each of them through the `Deliver` seam, finishing one message before
//! pulling the next.
//!
//! Delivery is best-effort. A failed delivery is counted and logged, then the
//! dispatcher moves on to the next subscriber; nothing is retried.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use crate::broker::message::Message;
use crate::broker::registry::SubscriptionRegistry;
use crate::utils::{DeliveryError, Error, Result};

/// Hands one message to one subscriber.
pub trait Deliver<S>: Send + Sync + 'static {
    fn deliver(&self, subscriber: &S, message: &Message) -> std::result::Result<(), DeliveryError>;
}

impl<S, F> Deliver<S> for F
where
    F: Fn(&S, &Message) -> std::result::Result<(), DeliveryError> + Send + Sync + 'static,
{
    fn deliver(&self, subscriber: &S, message: &Message) -> std::result::Result<(), DeliveryError> {
        self(subscriber, message)
    }
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dispatched: AtomicU64,
    deliveries: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages accepted by `publish`.
    pub published: u64,
    /// Messages the dispatcher has finished processing.
    pub dispatched: u64,
    /// Delivery attempts, successful or not.
    pub deliveries: u64,
    /// Delivery attempts that failed.
    pub failed: u64,
}

/// Outcome of dispatching a single message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Producer side of the pipeline.
#[derive(Debug, Clone)]
pub struct NotificationEngine {
    queue: UnboundedSender<Message>,
    counters: Arc<Counters>,
}

impl NotificationEngine {
    /// Enqueue `message` for dispatch. Never blocks; fails only when the
    /// dispatcher has gone away.
    pub fn publish(&self, message: Message) -> Result<()> {
        self.counters.published.fetch_add(1, Ordering::SeqCst);
        self.queue.send(message).map_err(|_| {
            self.counters.published.fetch_sub(1, Ordering::SeqCst);
            Error::PipelineClosed
        })
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            published: self.counters.published.load(Ordering::SeqCst),
            dispatched: self.counters.dispatched.load(Ordering::SeqCst),
            deliveries: self.counters.deliveries.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }
}

/// Single consumer of the pipeline queue.
pub struct Dispatcher<S, D> {
    queue: UnboundedReceiver<Message>,
    registry: Arc<SubscriptionRegistry<S>>,
    deliver: D,
    counters: Arc<Counters>,
}

/// Create a connected engine/dispatcher pair resolving through `registry`.
pub fn pipeline<S, D>(
    registry: Arc<SubscriptionRegistry<S>>,
    deliver: D,
) -> (NotificationEngine, Dispatcher<S, D>)
where
    S: Eq + Hash + Clone + fmt::Display,
    D: Deliver<S>,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let counters = Arc::new(Counters::default());
    let engine = NotificationEngine {
        queue: tx,
        counters: counters.clone(),
    };
    let dispatcher = Dispatcher {
        queue: rx,
        registry,
        deliver,
        counters,
    };
    (engine, dispatcher)
}

impl<S, D> Dispatcher<S, D>
where
    S: Eq + Hash + Clone + fmt::Display,
    D: Deliver<S>,
{
    /// Deliver `message` to every subscriber currently registered for its
    /// topic. Failures are isolated per subscriber.
    pub fn dispatch(&self, message: &Message) -> DispatchReport {
        let subscribers = self.registry.resolve(message.topic());
        let mut report = DispatchReport::default();

        for subscriber in &subscribers {
            report.attempted += 1;
            if let Err(e) = self.deliver.deliver(subscriber, message) {
                report.failed += 1;
                debug!(topic = message.topic(), %subscriber, error = %e, "delivery dropped");
            }
        }

        self.counters
            .deliveries
            .fetch_add(report.attempted as u64, Ordering::SeqCst);
        self.counters
            .failed
            .fetch_add(report.failed as u64, Ordering::SeqCst);
        self.counters.dispatched.fetch_add(1, Ordering::SeqCst);
        report
    }

    /// Drain the queue until every engine handle is dropped.
    pub async fn run(mut self) {
        trace!("dispatcher idle");
        while let Some(message) = self.queue.recv().await {
            let report = self.dispatch(&message);
            trace!(
                topic = message.topic(),
                attempted = report.attempted,
                failed = report.failed,
                "message dispatched"
            );
            if self.queue.is_empty() {
                trace!("dispatcher idle");
            }
        }
        debug!("notification pipeline closed");
    }
}
