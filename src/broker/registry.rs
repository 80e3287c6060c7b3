//! Subscription registry
//!
//! Maps topic names to the set of subscribers registered for them. A topic
//! key exists only while its set is non-empty; removing the last subscriber
//! prunes the entry. Adding a present subscriber and removing an absent one
//! are both no-ops.
//!
//! Concurrency note: one mutex guards both the forward map and the reverse
//! index (subscriber -> topics). It is held only for the in-memory update
//! and is never held while a caller performs I/O. `resolve` hands out a copy
//! so the dispatcher can iterate it while subscriptions keep changing.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Inner<S> {
    topics: HashMap<String, HashSet<S>>,
    memberships: HashMap<S, HashSet<String>>,
}

#[derive(Debug)]
pub struct SubscriptionRegistry<S> {
    inner: Mutex<Inner<S>>,
}

impl<S> Default for SubscriptionRegistry<S> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                topics: HashMap::new(),
                memberships: HashMap::new(),
            }),
        }
    }
}

impl<S: Eq + Hash + Clone> SubscriptionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves both maps consistent, so a poisoned lock
    // still guards valid state.
    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `subscriber` under `topic`. Returns `true` if it was not
    /// already registered there.
    pub fn add(&self, topic: &str, subscriber: S) -> bool {
        let mut inner = self.lock();
        let added = inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(subscriber.clone());
        if added {
            inner
                .memberships
                .entry(subscriber)
                .or_default()
                .insert(topic.to_string());
        }
        added
    }

    /// Deregister `subscriber` from `topic`. Returns `true` if it was
    /// registered there.
    pub fn remove(&self, topic: &str, subscriber: &S) -> bool {
        let mut inner = self.lock();
        let Some(set) = inner.topics.get_mut(topic) else {
            return false;
        };
        if !set.remove(subscriber) {
            return false;
        }
        if set.is_empty() {
            inner.topics.remove(topic);
        }
        if let Some(topics) = inner.memberships.get_mut(subscriber) {
            topics.remove(topic);
            if topics.is_empty() {
                inner.memberships.remove(subscriber);
            }
        }
        true
    }

    /// Deregister `subscriber` from every topic in one critical section and
    /// return the topics it was removed from.
    pub fn remove_all(&self, subscriber: &S) -> Vec<String> {
        let mut inner = self.lock();
        let Some(topics) = inner.memberships.remove(subscriber) else {
            return Vec::new();
        };
        for topic in &topics {
            if let Some(set) = inner.topics.get_mut(topic) {
                set.remove(subscriber);
                if set.is_empty() {
                    inner.topics.remove(topic);
                }
            }
        }
        topics.into_iter().collect()
    }

    /// Snapshot of the subscribers currently registered under `topic`.
    pub fn resolve(&self, topic: &str) -> Vec<S> {
        self.lock()
            .topics
            .get(topic)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of all topics that currently have at least one subscriber.
    pub fn topics(&self) -> Vec<String> {
        self.lock().topics.keys().cloned().collect()
    }

    /// Topics `subscriber` is currently registered under.
    pub fn topics_of(&self, subscriber: &S) -> Vec<String> {
        self.lock()
            .memberships
            .get(subscriber)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, HashSet::len)
    }
}
