//! Realized links between one publisher and one subscriber's callable.

use crate::delegate::Callable;
use crate::ids::{PublisherId, RequestId, SubscriberId, SubscriptionId};
use crate::publisher::{Publisher, WeakPublisher};
use crate::subscriber::{Subscriber, WeakSubscriber};
use std::fmt;
use std::sync::Arc;

struct SubscriptionInner {
    id: SubscriptionId,
    publisher_id: PublisherId,
    subscriber_id: SubscriberId,
    publisher: WeakPublisher,
    subscriber: WeakSubscriber,
    request: Option<RequestId>,
    callable: Callable,
}

/// Immutable pairing of a publisher, a subscriber and the callable the
/// publisher invokes on the subscriber's behalf.
///
/// Both ends are held weakly, so a subscription never keeps either side
/// alive. Clones refer to the same subscription; equality is by id.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Creates an unattached subscription. Attach it with
    /// [`Publisher::add_subscription`] or [`Subscriber::add_subscription`].
    pub fn new(subscriber: &Subscriber, publisher: &Publisher, callable: Callable) -> Self {
        Self::build(subscriber, publisher, None, callable)
    }

    pub(crate) fn for_request(
        subscriber: &Subscriber,
        publisher: &Publisher,
        request: RequestId,
        callable: Callable,
    ) -> Self {
        Self::build(subscriber, publisher, Some(request), callable)
    }

    fn build(
        subscriber: &Subscriber,
        publisher: &Publisher,
        request: Option<RequestId>,
        callable: Callable,
    ) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                id: SubscriptionId::new(),
                publisher_id: publisher.id(),
                subscriber_id: subscriber.id(),
                publisher: publisher.downgrade(),
                subscriber: subscriber.downgrade(),
                request,
                callable,
            }),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    pub fn publisher_id(&self) -> PublisherId {
        self.inner.publisher_id
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// The publisher, while it is still alive.
    pub fn publisher(&self) -> Option<Publisher> {
        self.inner.publisher.upgrade()
    }

    /// The subscriber, while it is still alive.
    pub fn subscriber(&self) -> Option<Subscriber> {
        self.inner.subscriber.upgrade()
    }

    /// The request this subscription fulfils, if it was produced by matching.
    pub fn request(&self) -> Option<RequestId> {
        self.inner.request
    }

    pub fn callable(&self) -> &Callable {
        &self.inner.callable
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Subscription {}

impl std::hash::Hash for Subscription {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("publisher", &self.inner.publisher_id)
            .field("subscriber", &self.inner.subscriber_id)
            .field("request", &self.inner.request)
            .field("callable", &self.inner.callable)
            .finish()
    }
}
