//! # Publisher Registry
//!
//! Process-wide index from tag hash to the live publishers carrying that tag,
//! plus the two broadcasts that let independently initialized publishers and
//! subscribers find each other:
//!
//! - **publisher set changed** - fired after a publisher is registered or unregistered
//! - **subscriber loaded / unloaded** - fired when a subscriber becomes active or is cleared
//!
//! Every query hands out a snapshot, and observers run with no registry lock
//! held, so observers may freely register, unregister, or add observers.

use crate::ids::{ObserverId, SubscriberId};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Callback for publisher registrations (`true`) and removals (`false`).
pub type PublisherObserver = Arc<dyn Fn(&Publisher, bool) + Send + Sync>;

/// Callback for subscriber load broadcasts.
pub type SubscriberObserver = Arc<dyn Fn(&Subscriber, SubscriberEvent) + Send + Sync>;

/// What happened to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberEvent {
    Loaded,
    Unloaded,
}

/// Registry counters for monitoring.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Successful registrations since creation
    pub registrations: u64,
    /// Successful unregistrations since creation
    pub unregistrations: u64,
    /// Observer callbacks fired, across both broadcasts
    pub notifications: u64,
    /// Publishers currently registered
    pub live_publishers: usize,
    /// Distinct tag hashes currently registered
    pub live_tags: usize,
    /// Subscribers currently announced as loaded
    pub loaded_subscribers: usize,
}

static GLOBAL_REGISTRY: Lazy<Arc<PublisherRegistry>> =
    Lazy::new(|| Arc::new(PublisherRegistry::new()));

/// Tag-hash index of live publishers with change notification.
pub struct PublisherRegistry {
    /// Tag hash to publishers; empty sets are removed
    publishers: DashMap<u32, SmallVec<[Publisher; 4]>>,
    /// Subscribers announced as loaded, in load order
    subscribers: Mutex<Vec<Subscriber>>,
    publisher_observers: Mutex<Vec<(ObserverId, PublisherObserver)>>,
    subscriber_observers: Mutex<Vec<(ObserverId, SubscriberObserver)>>,
    stats: Mutex<RegistryStats>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self {
            publishers: DashMap::new(),
            subscribers: Mutex::new(Vec::new()),
            publisher_observers: Mutex::new(Vec::new()),
            subscriber_observers: Mutex::new(Vec::new()),
            stats: Mutex::new(RegistryStats::default()),
        }
    }

    /// The lazily created process-wide registry.
    pub fn global() -> Arc<PublisherRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    /// Adds `publisher` under its current tag hash.
    ///
    /// Returns `false`, without notifying, when the publisher has an empty tag
    /// or is already registered.
    pub fn register(&self, publisher: &Publisher) -> bool {
        let tag = publisher.tag();
        if tag.is_empty() {
            trace!("Publisher {} has no tag, not registering", publisher.id());
            return false;
        }

        {
            let mut entry = self.publishers.entry(tag.hash()).or_default();
            if entry.iter().any(|existing| existing.id() == publisher.id()) {
                return false;
            }
            entry.push(publisher.clone());
        }

        self.stats.lock().registrations += 1;
        debug!("📝 Registered publisher {} under tag '{}'", publisher.id(), tag);
        self.notify_publishers(publisher, true);
        true
    }

    /// Removes `publisher` from under its current tag hash.
    pub fn unregister(&self, publisher: &Publisher) -> bool {
        let hash = publisher.tag_hash();
        let removed = match self.publishers.get_mut(&hash) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|existing| existing.id() != publisher.id());
                entry.len() != before
            }
            None => false,
        };
        if !removed {
            return false;
        }
        self.publishers.remove_if(&hash, |_, remaining| remaining.is_empty());

        self.stats.lock().unregistrations += 1;
        debug!("🗑️ Unregistered publisher {} (tag hash {:#010x})", publisher.id(), hash);
        self.notify_publishers(publisher, false);
        true
    }

    /// Snapshot of the publishers registered under `tag_hash`.
    pub fn lookup(&self, tag_hash: u32) -> Option<Vec<Publisher>> {
        self.publishers
            .get(&tag_hash)
            .map(|entry| entry.iter().cloned().collect())
    }

    /// Snapshot of the publishers whose tag is exactly `tag`.
    pub fn lookup_tag(&self, tag: &str) -> Vec<Publisher> {
        self.lookup(crate::tag::tag_hash(tag))
            .unwrap_or_default()
            .into_iter()
            .filter(|publisher| publisher.tag().name() == tag)
            .collect()
    }

    pub fn contains(&self, publisher: &Publisher) -> bool {
        self.publishers
            .get(&publisher.tag_hash())
            .map(|entry| entry.iter().any(|existing| existing.id() == publisher.id()))
            .unwrap_or(false)
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.iter().map(|entry| entry.len()).sum()
    }

    pub fn tag_count(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = self.stats.lock().clone();
        stats.live_publishers = self.publisher_count();
        stats.live_tags = self.tag_count();
        stats.loaded_subscribers = self.subscribers.lock().len();
        stats
    }

    // ------------------------------------------------------------------------
    // Subscriber broadcast
    // ------------------------------------------------------------------------

    /// Records `subscriber` as loaded and notifies subscriber observers.
    pub fn announce_loaded(&self, subscriber: &Subscriber) -> bool {
        {
            let mut subscribers = self.subscribers.lock();
            if subscribers.iter().any(|existing| existing.id() == subscriber.id()) {
                return false;
            }
            subscribers.push(subscriber.clone());
        }
        self.notify_subscribers(subscriber, SubscriberEvent::Loaded);
        true
    }

    /// Forgets `subscriber` and notifies subscriber observers.
    pub fn announce_unloaded(&self, subscriber: &Subscriber) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.lock();
            let before = subscribers.len();
            subscribers.retain(|existing| existing.id() != subscriber.id());
            subscribers.len() != before
        };
        if removed {
            self.notify_subscribers(subscriber, SubscriberEvent::Unloaded);
        }
        removed
    }

    /// Snapshot of the loaded subscribers, in load order.
    pub fn loaded_subscribers(&self) -> Vec<Subscriber> {
        self.subscribers.lock().clone()
    }

    pub fn is_loaded(&self, subscriber: SubscriberId) -> bool {
        self.subscribers.lock().iter().any(|existing| existing.id() == subscriber)
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    pub fn observe_publishers<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&Publisher, bool) + Send + Sync + 'static,
    {
        let id = ObserverId::new();
        self.publisher_observers.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn observe_subscribers<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&Subscriber, SubscriberEvent) + Send + Sync + 'static,
    {
        let id = ObserverId::new();
        self.subscriber_observers.lock().push((id, Arc::new(observer)));
        id
    }

    /// Removes an observer of either broadcast.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut removed = false;
        self.publisher_observers.lock().retain(|(existing, _)| {
            let keep = *existing != id;
            removed |= !keep;
            keep
        });
        self.subscriber_observers.lock().retain(|(existing, _)| {
            let keep = *existing != id;
            removed |= !keep;
            keep
        });
        removed
    }

    fn notify_publishers(&self, publisher: &Publisher, added: bool) {
        let observers: Vec<PublisherObserver> = self
            .publisher_observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        self.stats.lock().notifications += observers.len() as u64;
        for observer in observers {
            observer(publisher, added);
        }
    }

    fn notify_subscribers(&self, subscriber: &Subscriber, event: SubscriberEvent) {
        let observers: Vec<SubscriberObserver> = self
            .subscriber_observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        self.stats.lock().notifications += observers.len() as u64;
        for observer in observers {
            observer(subscriber, event);
        }
    }
}

impl Default for PublisherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PublisherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherRegistry")
            .field("publishers", &self.publisher_count())
            .field("tags", &self.tag_count())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
