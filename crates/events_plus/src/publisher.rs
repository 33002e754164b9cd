//! # Publisher
//!
//! An event source identified by a [`Tag`]. A publisher dispatches each
//! [`publish`](Publisher::publish) to three kinds of bound callables:
//!
//! - **subscriptions** - links to a [`Subscriber`], usually created by tag matching
//! - **delegates** - callables attached directly, forwarding the event arguments
//! - **calls** - members invoked with arguments fixed at authoring time
//!
//! Callables declaring the publisher's full signature run first, in binding
//! order, followed by zero-argument callables. The dispatch list is
//! snapshotted at entry, so callables may subscribe or unsubscribe anything
//! while a publish is in flight.

use crate::context::{EventContext, LifecycleState};
use crate::delegate::Callable;
use crate::error::EventError;
use crate::ids::{CallableId, ObserverId, PublisherId, SubscriberId, SubscriptionId};
use crate::raw::{RawCall, RawSubscription};
use crate::registry::SubscriberEvent;
use crate::subscriber::Subscriber;
use crate::subscription::Subscription;
use crate::tag::Tag;
use crate::types::{ArgumentList, Signature, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Subscription(SubscriptionId),
    Delegate(CallableId),
    Call(CallableId),
}

#[derive(Clone)]
struct DispatchEntry {
    origin: Origin,
    callable: Callable,
}

struct CallSlot {
    raw: RawCall,
    /// `None` until the publisher initializes
    callable: Option<Callable>,
}

struct PublisherState {
    lifecycle: LifecycleState,
    tag: Tag,
    dispatch: Vec<DispatchEntry>,
    subscriptions: Vec<Subscription>,
    delegates: Vec<Callable>,
    calls: Vec<CallSlot>,
    raw_subscriptions: Vec<RawSubscription>,
    observer: Option<ObserverId>,
}

struct PublisherInner {
    id: PublisherId,
    context: EventContext,
    signature: Signature,
    state: Mutex<PublisherState>,
}

/// Shared handle to a publisher. Clones refer to the same publisher.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

/// Non-owning publisher handle.
#[derive(Clone, Default)]
pub struct WeakPublisher {
    inner: Weak<PublisherInner>,
}

impl WeakPublisher {
    pub fn upgrade(&self) -> Option<Publisher> {
        self.inner.upgrade().map(|inner| Publisher { inner })
    }
}

impl fmt::Debug for WeakPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakPublisher")
    }
}

impl Publisher {
    /// Creates an uninitialized publisher whose events carry `signature`.
    pub fn new(tag: impl Into<Tag>, signature: Signature, context: EventContext) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                id: PublisherId::new(),
                context,
                signature,
                state: Mutex::new(PublisherState {
                    lifecycle: LifecycleState::Uninitialized,
                    tag: tag.into(),
                    dispatch: Vec::new(),
                    subscriptions: Vec::new(),
                    delegates: Vec::new(),
                    calls: Vec::new(),
                    raw_subscriptions: Vec::new(),
                    observer: None,
                }),
            }),
        }
    }

    /// Publisher whose signature is the tuple type `L`.
    ///
    /// ```rust
    /// use events_plus::{EventContext, Publisher, Signature};
    ///
    /// let damage = Publisher::typed::<(i32, String)>("damage", EventContext::isolated());
    /// assert_eq!(damage.signature(), &Signature::of::<(i32, String)>());
    /// ```
    pub fn typed<L: ArgumentList>(tag: impl Into<Tag>, context: EventContext) -> Self {
        Self::new(tag, Signature::of::<L>(), context)
    }

    pub fn id(&self) -> PublisherId {
        self.inner.id
    }

    pub fn tag(&self) -> Tag {
        self.inner.state.lock().tag.clone()
    }

    pub fn tag_hash(&self) -> u32 {
        self.inner.state.lock().tag.hash()
    }

    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    pub fn context(&self) -> &EventContext {
        &self.inner.context
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.lock().lifecycle
    }

    pub fn downgrade(&self) -> WeakPublisher {
        WeakPublisher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Activates the publisher.
    ///
    /// Binds authored calls and subscriptions, registers under the tag, and
    /// matches against subscribers that loaded before this publisher as well
    /// as any that load later. Calls or subscriptions that fail to bind are
    /// logged and dropped.
    ///
    /// # Errors
    ///
    /// [`EventError::Consistency`] if the publisher was already initialized or cleared.
    pub fn initialize(&self) -> Result<(), EventError> {
        let (pending_calls, raw_subscriptions) = {
            let mut state = self.inner.state.lock();
            if state.lifecycle != LifecycleState::Uninitialized {
                return Err(EventError::Consistency(format!(
                    "publisher {} cannot initialize from {:?}",
                    self.inner.id, state.lifecycle
                )));
            }
            state.lifecycle = LifecycleState::Active;
            let calls: Vec<RawCall> = state.calls.drain(..).map(|slot| slot.raw).collect();
            (calls, std::mem::take(&mut state.raw_subscriptions))
        };

        for call in pending_calls {
            self.add_call(call);
        }
        for raw in raw_subscriptions {
            if let Err(error) = raw.create_and_register(self) {
                self.inner
                    .context
                    .report_dropped("subscription", raw.delegate.member(), &error);
            }
        }

        let registry = self.inner.context.registry().clone();
        let weak = self.downgrade();
        let observer = registry.observe_subscribers(move |subscriber, event| {
            if let Some(publisher) = weak.upgrade() {
                publisher.on_subscriber_event(subscriber, event);
            }
        });
        self.inner.state.lock().observer = Some(observer);

        registry.register(self);
        for subscriber in registry.loaded_subscribers() {
            subscriber.match_publisher(self);
        }

        info!(
            "📢 Publisher {} active under tag '{}' with {} callable(s)",
            self.inner.id,
            self.tag(),
            self.callable_count()
        );
        Ok(())
    }

    /// Unregisters the publisher, tears down every subscription on both
    /// sides, and releases every bound callable. Further calls are no-ops.
    pub fn clear(&self) {
        let (subscriptions, observer) = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == LifecycleState::Cleared {
                return;
            }
            state.lifecycle = LifecycleState::Cleared;
            (state.subscriptions.clone(), state.observer.take())
        };

        let registry = self.inner.context.registry();
        registry.unregister(self);
        if let Some(observer) = observer {
            registry.remove_observer(observer);
        }

        for subscription in subscriptions.iter().rev() {
            self.remove_subscription(subscription);
        }

        {
            let mut state = self.inner.state.lock();
            state.subscriptions.clear();
            state.dispatch.clear();
            state.delegates.clear();
            state.calls.clear();
            state.raw_subscriptions.clear();
        }
        info!("🧹 Publisher {} cleared", self.inner.id);
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Invokes every bound callable with `args`.
    ///
    /// Publishing with nothing bound is a no-op.
    ///
    /// # Errors
    ///
    /// [`EventError::ArgumentMismatch`] when `args` does not fit the publisher's
    /// signature. The first error returned by a callable stops the dispatch and
    /// is handed back unchanged; callables after it are not invoked.
    pub fn publish(&self, args: &[Value]) -> Result<(), EventError> {
        self.inner.signature.check(args)?;

        let snapshot: Vec<Callable> = self
            .inner
            .state
            .lock()
            .dispatch
            .iter()
            .map(|entry| entry.callable.clone())
            .collect();
        trace!("Publishing '{}' to {} callable(s)", self.tag(), snapshot.len());

        for callable in snapshot.iter().filter(|callable| !callable.is_void()) {
            callable.invoke(args)?;
        }
        for callable in snapshot.iter().filter(|callable| callable.is_void()) {
            callable.invoke(&[])?;
        }
        Ok(())
    }

    /// Typed convenience over [`Publisher::publish`].
    pub fn publish_typed<L: ArgumentList>(&self, args: L) -> Result<(), EventError> {
        self.publish(&args.into_values())
    }

    /// Number of callables the next publish would invoke.
    pub fn callable_count(&self) -> usize {
        self.inner.state.lock().dispatch.len()
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

    /// Whether `subscription` may be attached here: it names this publisher,
    /// the publisher is not cleared, and its callable fits the signature.
    /// With `check_subscriber`, the subscriber must accept it too.
    pub fn validate_subscription(&self, subscription: &Subscription, check_subscriber: bool) -> bool {
        if subscription.publisher_id() != self.inner.id
            || self.state() == LifecycleState::Cleared
            || !subscription.callable().is_compatible_with(&self.inner.signature)
        {
            return false;
        }
        if !check_subscriber {
            return true;
        }
        subscription
            .subscriber()
            .map(|subscriber| subscriber.validate_subscription(subscription, false))
            .unwrap_or(false)
    }

    /// Attaches `subscription` and binds its callable for dispatch. The
    /// subscriber side is attached too.
    ///
    /// Returns `false` when already attached or when validation fails.
    pub fn add_subscription(&self, subscription: &Subscription, pre_validated: bool) -> bool {
        if subscription.publisher_id() != self.inner.id {
            warn!(
                "⚠️ Subscription {} belongs to publisher {}, not {}",
                subscription.id(),
                subscription.publisher_id(),
                self.inner.id
            );
            return false;
        }
        if !pre_validated && !self.validate_subscription(subscription, true) {
            debug!("Subscription {} rejected by publisher {}", subscription.id(), self.inner.id);
            return false;
        }

        {
            let mut state = self.inner.state.lock();
            if state.subscriptions.contains(subscription) {
                return false;
            }
            state.subscriptions.push(subscription.clone());
            state.dispatch.push(DispatchEntry {
                origin: Origin::Subscription(subscription.id()),
                callable: subscription.callable().clone(),
            });
        }

        if let Some(subscriber) = subscription.subscriber() {
            subscriber.add_subscription(subscription, true);
        }
        debug!(
            "🔗 Publisher {} ({}) linked to subscriber {}",
            self.inner.id,
            self.tag(),
            subscription.subscriber_id()
        );
        true
    }

    /// Detaches `subscription` from this publisher and from its subscriber.
    pub fn remove_subscription(&self, subscription: &Subscription) -> bool {
        {
            let mut state = self.inner.state.lock();
            let Some(position) = state.subscriptions.iter().position(|s| s == subscription) else {
                return false;
            };
            state.subscriptions.remove(position);
            let origin = Origin::Subscription(subscription.id());
            state.dispatch.retain(|entry| entry.origin != origin);
        }

        if let Some(subscriber) = subscription.subscriber() {
            subscriber.remove_subscription(subscription);
        }
        debug!(
            "✂️ Publisher {} unlinked from subscriber {}",
            self.inner.id,
            subscription.subscriber_id()
        );
        true
    }

    fn detach_subscriber(&self, subscriber: SubscriberId) {
        let owned: Vec<Subscription> = self
            .subscriptions()
            .into_iter()
            .filter(|subscription| subscription.subscriber_id() == subscriber)
            .collect();
        for subscription in owned.iter().rev() {
            self.remove_subscription(subscription);
        }
    }

    fn on_subscriber_event(&self, subscriber: &Subscriber, event: SubscriberEvent) {
        match event {
            SubscriberEvent::Loaded => {
                subscriber.match_publisher(self);
            }
            SubscriberEvent::Unloaded => self.detach_subscriber(subscriber.id()),
        }
    }

    // ------------------------------------------------------------------------
    // Direct delegates
    // ------------------------------------------------------------------------

    /// Binds `callable` for dispatch without a subscriber.
    ///
    /// Returns `false` when the publisher is cleared, the callable is already
    /// bound, or its signature neither matches the event nor is empty.
    pub fn add_delegate(&self, callable: Callable) -> bool {
        if !callable.is_compatible_with(&self.inner.signature) {
            debug!(
                "Delegate {} does not fit publisher signature {}",
                callable.signature(),
                self.inner.signature
            );
            return false;
        }
        let mut state = self.inner.state.lock();
        if state.lifecycle == LifecycleState::Cleared
            || state.delegates.iter().any(|existing| existing == &callable)
        {
            return false;
        }
        state.dispatch.push(DispatchEntry {
            origin: Origin::Delegate(callable.id()),
            callable: callable.clone(),
        });
        state.delegates.push(callable);
        true
    }

    pub fn remove_delegate(&self, id: CallableId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.delegates.len();
        state.delegates.retain(|callable| callable.id() != id);
        if state.delegates.len() == before {
            return false;
        }
        state.dispatch.retain(|entry| entry.origin != Origin::Delegate(id));
        true
    }

    pub fn delegates(&self) -> Vec<Callable> {
        self.inner.state.lock().delegates.clone()
    }

    // ------------------------------------------------------------------------
    // Predefined calls
    // ------------------------------------------------------------------------

    /// Adds a call with fixed arguments.
    ///
    /// Before initialization the call is stored and bound at
    /// [`initialize`](Publisher::initialize); on an active publisher it is
    /// bound now. A call that fails to bind is logged and dropped.
    pub fn add_call(&self, call: RawCall) -> bool {
        let member = call.delegate.member().to_string();
        match self.insert_call(call) {
            Ok(added) => added,
            Err(error) => {
                self.inner.context.report_dropped("call", &member, &error);
                false
            }
        }
    }

    pub(crate) fn insert_call(&self, call: RawCall) -> Result<bool, EventError> {
        match self.state() {
            LifecycleState::Cleared => return Ok(false),
            LifecycleState::Uninitialized => {
                self.inner.state.lock().calls.push(CallSlot {
                    raw: call,
                    callable: None,
                });
                return Ok(true);
            }
            LifecycleState::Active => {}
        }

        let callable = call.create_call(self.inner.context.factory())?;
        let mut state = self.inner.state.lock();
        state.dispatch.push(DispatchEntry {
            origin: Origin::Call(callable.id()),
            callable: callable.clone(),
        });
        state.calls.push(CallSlot {
            raw: call,
            callable: Some(callable),
        });
        Ok(true)
    }

    /// Removes the call at `index`, in the order calls were added.
    pub fn remove_call(&self, index: usize) -> bool {
        let mut state = self.inner.state.lock();
        if index >= state.calls.len() {
            return false;
        }
        let slot = state.calls.remove(index);
        if let Some(callable) = slot.callable {
            state.dispatch.retain(|entry| entry.origin != Origin::Call(callable.id()));
        }
        true
    }

    /// Authored forms of the current calls.
    pub fn calls(&self) -> Vec<RawCall> {
        self.inner
            .state
            .lock()
            .calls
            .iter()
            .map(|slot| slot.raw.clone())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Authored subscriptions
    // ------------------------------------------------------------------------

    /// Queues an authored subscription for [`initialize`](Publisher::initialize),
    /// or applies it immediately on an active publisher.
    pub fn add_raw_subscription(&self, raw: RawSubscription) -> bool {
        match self.state() {
            LifecycleState::Cleared => false,
            LifecycleState::Uninitialized => {
                self.inner.state.lock().raw_subscriptions.push(raw);
                true
            }
            LifecycleState::Active => match raw.create_and_register(self) {
                Ok(()) => true,
                Err(error) => {
                    self.inner
                        .context
                        .report_dropped("subscription", raw.delegate.member(), &error);
                    false
                }
            },
        }
    }

    // ------------------------------------------------------------------------
    // Tag
    // ------------------------------------------------------------------------

    /// Renames the publisher.
    ///
    /// On an active publisher this moves the registration to the new tag,
    /// unlinks subscriptions made for requests that do not list the new tag,
    /// and matches the loaded subscribers again.
    pub fn set_tag(&self, tag: impl Into<Tag>) {
        let tag = tag.into();
        let active = {
            let state = self.inner.state.lock();
            if state.tag == tag {
                return;
            }
            state.lifecycle == LifecycleState::Active
        };

        let registry = self.inner.context.registry().clone();
        if active {
            registry.unregister(self);
        }
        let previous = std::mem::replace(&mut self.inner.state.lock().tag, tag);
        if !active {
            return;
        }

        for subscription in self.subscriptions().iter().rev() {
            let Some(request) = subscription.request() else {
                continue;
            };
            let still_wanted = subscription
                .subscriber()
                .and_then(|subscriber| subscriber.request(request))
                .map(|request| request.validate_publisher(self))
                .unwrap_or(false);
            if !still_wanted {
                self.remove_subscription(subscription);
            }
        }

        registry.register(self);
        for subscriber in registry.loaded_subscribers() {
            subscriber.match_publisher(self);
        }
        info!(
            "🏷️ Publisher {} retagged '{}' -> '{}'",
            self.inner.id,
            previous,
            self.tag()
        );
    }
}

impl PartialEq for Publisher {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Publisher {}

impl std::hash::Hash for Publisher {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Publisher")
            .field("id", &self.inner.id)
            .field("tag", &state.tag.name())
            .field("signature", &self.inner.signature.to_string())
            .field("lifecycle", &state.lifecycle)
            .field("subscriptions", &state.subscriptions.len())
            .field("callables", &state.dispatch.len())
            .finish()
    }
}
