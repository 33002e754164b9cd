//! # Subscriber
//!
//! An event sink holding requests ("bind this callable to publishers tagged
//! X or Y") and the subscriptions those requests produced. Matching runs in
//! both directions: when the subscriber initializes it scans the registry,
//! and while it is active it listens for publishers that register later.

use crate::context::{EventContext, LifecycleState};
use crate::error::EventError;
use crate::ids::{ObserverId, RequestId, SubscriberId};
use crate::publisher::Publisher;
use crate::raw::RawRequest;
use crate::request::Request;
use crate::subscription::Subscription;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

struct SubscriberState {
    lifecycle: LifecycleState,
    raw_requests: Vec<RawRequest>,
    requests: Vec<Request>,
    subscriptions: Vec<Subscription>,
    observer: Option<ObserverId>,
}

struct SubscriberInner {
    id: SubscriberId,
    context: EventContext,
    state: Mutex<SubscriberState>,
}

/// Shared handle to a subscriber. Clones refer to the same subscriber.
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<SubscriberInner>,
}

/// Non-owning subscriber handle.
#[derive(Clone, Default)]
pub struct WeakSubscriber {
    inner: Weak<SubscriberInner>,
}

impl WeakSubscriber {
    pub fn upgrade(&self) -> Option<Subscriber> {
        self.inner.upgrade().map(|inner| Subscriber { inner })
    }
}

impl fmt::Debug for WeakSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakSubscriber")
    }
}

impl Subscriber {
    pub fn new(context: EventContext) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                id: SubscriberId::new(),
                context,
                state: Mutex::new(SubscriberState {
                    lifecycle: LifecycleState::Uninitialized,
                    raw_requests: Vec::new(),
                    requests: Vec::new(),
                    subscriptions: Vec::new(),
                    observer: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn context(&self) -> &EventContext {
        &self.inner.context
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.lock().lifecycle
    }

    pub fn downgrade(&self) -> WeakSubscriber {
        WeakSubscriber {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Activates the subscriber.
    ///
    /// Authored requests are resolved into live [`Request`]s; ones whose
    /// member token is malformed or does not bind are logged and dropped.
    /// Every request is then matched against the publishers registered right
    /// now, and the subscriber keeps matching publishers that register later.
    ///
    /// # Errors
    ///
    /// [`EventError::Consistency`] if the subscriber was already initialized or cleared.
    pub fn initialize(&self) -> Result<(), EventError> {
        let raw_requests = {
            let mut state = self.inner.state.lock();
            if state.lifecycle != LifecycleState::Uninitialized {
                return Err(EventError::Consistency(format!(
                    "subscriber {} cannot initialize from {:?}",
                    self.inner.id, state.lifecycle
                )));
            }
            state.lifecycle = LifecycleState::Active;
            std::mem::take(&mut state.raw_requests)
        };

        for raw in raw_requests {
            self.add_raw_request(raw);
        }

        let registry = self.inner.context.registry().clone();
        let weak = self.downgrade();
        let observer = registry.observe_publishers(move |publisher, added| {
            if !added {
                return;
            }
            if let Some(subscriber) = weak.upgrade() {
                subscriber.match_publisher(publisher);
            }
        });
        self.inner.state.lock().observer = Some(observer);
        registry.announce_loaded(self);

        let mut matched = 0;
        for request in self.requests() {
            matched += self.match_request_against_registry(&request);
        }
        info!(
            "📥 Subscriber {} active with {} request(s), {} new subscription(s)",
            self.inner.id,
            self.inner.state.lock().requests.len(),
            matched
        );
        Ok(())
    }

    /// Unlinks every subscription on both sides, drops every request, and
    /// stops listening for publishers. Further calls are no-ops.
    pub fn clear(&self) {
        let observer = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == LifecycleState::Cleared {
                return;
            }
            state.lifecycle = LifecycleState::Cleared;
            state.observer.take()
        };

        let registry = self.inner.context.registry();
        if let Some(observer) = observer {
            registry.remove_observer(observer);
        }
        registry.announce_unloaded(self);

        self.clear_subscriptions();
        for request in self.requests().iter().rev() {
            self.remove_request(request.id());
        }
        self.inner.state.lock().raw_requests.clear();
        info!("🧹 Subscriber {} cleared", self.inner.id);
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    pub fn requests(&self) -> Vec<Request> {
        self.inner.state.lock().requests.clone()
    }

    pub fn request(&self, id: RequestId) -> Option<Request> {
        self.inner
            .state
            .lock()
            .requests
            .iter()
            .find(|request| request.id() == id)
            .cloned()
    }

    pub fn has_request(&self, id: RequestId) -> bool {
        self.inner.state.lock().requests.iter().any(|request| request.id() == id)
    }

    /// Adds a request. On an active subscriber it is matched against the
    /// registered publishers straight away.
    ///
    /// Returns `false` on a cleared subscriber or for a request already held.
    pub fn add_request(&self, request: Request) -> bool {
        let active = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == LifecycleState::Cleared
                || state.requests.iter().any(|existing| existing.id() == request.id())
            {
                return false;
            }
            state.requests.push(request.clone());
            state.lifecycle == LifecycleState::Active
        };
        if active {
            self.match_request_against_registry(&request);
        }
        true
    }

    /// Adds an authored request.
    ///
    /// Before initialization it is stored and resolved at
    /// [`initialize`](Subscriber::initialize). On an active subscriber it is
    /// resolved now; a request that fails to resolve is logged and dropped.
    pub fn add_raw_request(&self, raw: RawRequest) -> bool {
        match self.state() {
            LifecycleState::Cleared => false,
            LifecycleState::Uninitialized => {
                self.inner.state.lock().raw_requests.push(raw);
                true
            }
            LifecycleState::Active => match raw.create_request(self.inner.context.factory()) {
                Ok(request) => self.add_request(request),
                Err(error) => {
                    self.inner
                        .context
                        .report_dropped("request", raw.delegate.member(), &error);
                    false
                }
            },
        }
    }

    /// Drops a request and unlinks every subscription it produced.
    pub fn remove_request(&self, id: RequestId) -> bool {
        let request = {
            let mut state = self.inner.state.lock();
            let Some(position) = state.requests.iter().position(|request| request.id() == id) else {
                return false;
            };
            state.requests.remove(position)
        };

        let produced: Vec<Subscription> = self
            .subscriptions()
            .into_iter()
            .filter(|subscription| subscription.request() == Some(id))
            .collect();
        for subscription in produced.iter().rev() {
            self.remove_subscription(subscription);
        }
        request.clear_publishers();
        true
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    /// Links every request that accepts `publisher` and is not yet linked to
    /// it. Returns the number of subscriptions created.
    pub fn match_publisher(&self, publisher: &Publisher) -> usize {
        if self.state() != LifecycleState::Active {
            return 0;
        }
        self.requests()
            .iter()
            .filter(|request| self.match_request(request, publisher))
            .count()
    }

    fn match_request_against_registry(&self, request: &Request) -> usize {
        let registry = self.inner.context.registry();
        let mut candidates: Vec<Publisher> = Vec::new();
        for tag in request.tags() {
            if tag.is_empty() {
                continue;
            }
            for publisher in registry.lookup_tag(tag.name()) {
                if !candidates.contains(&publisher) {
                    candidates.push(publisher);
                }
            }
        }
        candidates
            .iter()
            .filter(|publisher| self.match_request(request, publisher))
            .count()
    }

    fn match_request(&self, request: &Request, publisher: &Publisher) -> bool {
        if publisher.state() != LifecycleState::Active
            || request.is_fulfilled_by(publisher.id())
            || !request.validate_publisher(publisher)
        {
            return false;
        }
        let subscription =
            Subscription::for_request(self, publisher, request.id(), request.callable().clone());
        let added = self.add_subscription(&subscription, false);
        if added {
            debug!(
                "🎯 Request {} matched publisher {} ('{}')",
                request.id(),
                publisher.id(),
                publisher.tag()
            );
        }
        added
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.state.lock().subscriptions.clone()
    }

    pub fn has_subscription(&self, subscription: &Subscription) -> bool {
        self.inner.state.lock().subscriptions.contains(subscription)
    }

    /// Whether `subscription` may be attached here: it names this subscriber
    /// and the subscriber is not cleared. With `check_publisher`, the
    /// publisher must accept it too.
    pub fn validate_subscription(&self, subscription: &Subscription, check_publisher: bool) -> bool {
        if subscription.subscriber_id() != self.inner.id
            || self.state() == LifecycleState::Cleared
        {
            return false;
        }
        if !check_publisher {
            return true;
        }
        subscription
            .publisher()
            .map(|publisher| publisher.validate_subscription(subscription, false))
            .unwrap_or(false)
    }

    /// Attaches `subscription` here and on its publisher.
    ///
    /// Returns `false` when already attached or when validation fails.
    pub fn add_subscription(&self, subscription: &Subscription, pre_validated: bool) -> bool {
        if subscription.subscriber_id() != self.inner.id {
            warn!(
                "⚠️ Subscription {} belongs to subscriber {}, not {}",
                subscription.id(),
                subscription.subscriber_id(),
                self.inner.id
            );
            return false;
        }
        if !pre_validated && !self.validate_subscription(subscription, true) {
            debug!("Subscription {} rejected by subscriber {}", subscription.id(), self.inner.id);
            return false;
        }

        {
            let mut state = self.inner.state.lock();
            if state.subscriptions.contains(subscription) {
                return false;
            }
            state.subscriptions.push(subscription.clone());
            if let Some(request) = subscription
                .request()
                .and_then(|id| state.requests.iter().find(|request| request.id() == id))
            {
                request.add_publisher(subscription.publisher_id());
            }
        }

        if let Some(publisher) = subscription.publisher() {
            publisher.add_subscription(subscription, true);
        }
        true
    }

    /// Detaches `subscription` from this subscriber and from its publisher.
    pub fn remove_subscription(&self, subscription: &Subscription) -> bool {
        {
            let mut state = self.inner.state.lock();
            let Some(position) = state.subscriptions.iter().position(|s| s == subscription) else {
                return false;
            };
            state.subscriptions.remove(position);
            if let Some(request) = subscription
                .request()
                .and_then(|id| state.requests.iter().find(|request| request.id() == id))
            {
                request.remove_publisher(subscription.publisher_id());
            }
        }

        if let Some(publisher) = subscription.publisher() {
            publisher.remove_subscription(subscription);
        }
        true
    }

    /// Unlinks every subscription, newest first, and forgets which
    /// publishers each request was fulfilled by.
    pub fn clear_subscriptions(&self) {
        for subscription in self.subscriptions().iter().rev() {
            self.remove_subscription(subscription);
        }
        for request in self.requests() {
            request.clear_publishers();
        }
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Subscriber {}

impl std::hash::Hash for Subscriber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Subscriber")
            .field("id", &self.inner.id)
            .field("lifecycle", &state.lifecycle)
            .field("requests", &state.requests.len())
            .field("subscriptions", &state.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::Callable;
    use crate::types::Signature;

    #[test]
    fn matching_follows_tag_and_signature() {
        let context = EventContext::isolated();
        let damage = Publisher::typed::<(i32,)>("damage", context.clone());
        let score = Publisher::typed::<(i32,)>("score", context.clone());
        damage.initialize().unwrap();
        score.initialize().unwrap();

        let subscriber = Subscriber::new(context);
        subscriber.add_request(Request::new(["damage", "heal"], Callable::from_fn(|_: i32| ())));
        subscriber.initialize().unwrap();

        let subscriptions = subscriber.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].publisher_id(), damage.id());
        assert!(score.subscriptions().is_empty());
    }

    #[test]
    fn late_publishers_are_matched() {
        let context = EventContext::isolated();
        let subscriber = Subscriber::new(context.clone());
        let request = Request::new(["damage"], Callable::from_fn(|| ()));
        subscriber.add_request(request.clone());
        subscriber.initialize().unwrap();
        assert!(subscriber.subscriptions().is_empty());

        let publisher = Publisher::new("damage", Signature::of::<(f32, String)>(), context);
        publisher.initialize().unwrap();
        assert_eq!(subscriber.subscriptions().len(), 1);
        assert!(request.is_fulfilled_by(publisher.id()));
    }

    #[test]
    fn uninitialized_publishers_are_not_matched() {
        let context = EventContext::isolated();
        let publisher = Publisher::new("damage", Signature::empty(), context.clone());
        let subscriber = Subscriber::new(context.clone());
        subscriber.add_request(Request::new(["damage"], Callable::from_fn(|| ())));
        subscriber.initialize().unwrap();

        context.registry().register(&publisher);
        assert_eq!(subscriber.match_publisher(&publisher), 0);
    }

    #[test]
    fn removing_a_request_unlinks_its_subscriptions() {
        let context = EventContext::isolated();
        let publisher = Publisher::new("heal", Signature::empty(), context.clone());
        publisher.initialize().unwrap();

        let subscriber = Subscriber::new(context);
        subscriber.initialize().unwrap();
        let request = Request::new(["heal"], Callable::from_fn(|| ()));
        assert!(subscriber.add_request(request.clone()));
        assert!(!subscriber.add_request(request.clone()));
        assert_eq!(publisher.subscriptions().len(), 1);

        assert!(subscriber.remove_request(request.id()));
        assert!(publisher.subscriptions().is_empty());
        assert!(subscriber.subscriptions().is_empty());
        assert!(request.publishers().is_empty());
    }

    #[test]
    fn foreign_subscriptions_are_refused() {
        let context = EventContext::isolated();
        let publisher = Publisher::new("a", Signature::empty(), context.clone());
        let owner = Subscriber::new(context.clone());
        let stranger = Subscriber::new(context);
        publisher.initialize().unwrap();
        owner.initialize().unwrap();
        stranger.initialize().unwrap();

        let subscription = Subscription::new(&owner, &publisher, Callable::from_fn(|| ()));
        assert!(!stranger.add_subscription(&subscription, false));
        assert!(owner.add_subscription(&subscription, false));
        assert!(publisher.has_subscription(&subscription));
        assert!(!owner.add_subscription(&subscription, false));
    }

    #[test]
    fn clear_is_terminal() {
        let context = EventContext::isolated();
        let subscriber = Subscriber::new(context.clone());
        subscriber.initialize().unwrap();
        assert!(context.registry().is_loaded(subscriber.id()));

        subscriber.clear();
        subscriber.clear();
        assert!(!context.registry().is_loaded(subscriber.id()));
        assert!(!subscriber.add_request(Request::new(["a"], Callable::from_fn(|| ()))));
        assert!(matches!(subscriber.initialize(), Err(EventError::Consistency(_))));
    }
}
