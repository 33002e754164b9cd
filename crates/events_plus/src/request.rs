//! Subscriber requests: "bind this callable to any publisher tagged one of these".

use crate::delegate::Callable;
use crate::descriptor::MemberDescriptor;
use crate::ids::{PublisherId, RequestId};
use crate::publisher::Publisher;
use crate::tag::Tag;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct RequestInner {
    id: RequestId,
    tags: Vec<Tag>,
    callable: Callable,
    member: Option<MemberDescriptor>,
    /// Publishers this request currently has a subscription with
    fulfilled: Mutex<Vec<PublisherId>>,
}

/// A subscriber's declared intent to bind `callable` to matching publishers.
///
/// Clones share the same fulfilment record.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    /// Request with a hand-built callable. Empty tags are kept as placeholders
    /// but never match.
    pub fn new<I, T>(tags: I, callable: Callable) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        Self::build(tags.into_iter().map(Into::into).collect(), callable, None)
    }

    pub(crate) fn for_member(tags: Vec<Tag>, callable: Callable, member: MemberDescriptor) -> Self {
        Self::build(tags, callable, Some(member))
    }

    fn build(tags: Vec<Tag>, callable: Callable, member: Option<MemberDescriptor>) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                id: RequestId::new(),
                tags,
                callable,
                member,
                fulfilled: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    pub fn tags(&self) -> &[Tag] {
        &self.inner.tags
    }

    pub fn callable(&self) -> &Callable {
        &self.inner.callable
    }

    /// Target member, when the request came from a persisted form.
    pub fn member(&self) -> Option<&MemberDescriptor> {
        self.inner.member.as_ref()
    }

    /// Exact, case-sensitive tag membership. The empty tag never matches.
    pub fn has_tag(&self, tag: &str) -> bool {
        !tag.is_empty() && self.inner.tags.iter().any(|candidate| candidate.name() == tag)
    }

    /// Whether `publisher`'s tag is requested and its event signature fits
    /// this request's callable.
    pub fn validate_publisher(&self, publisher: &Publisher) -> bool {
        self.has_tag(publisher.tag().name())
            && self.inner.callable.is_compatible_with(publisher.signature())
    }

    pub fn is_fulfilled_by(&self, publisher: PublisherId) -> bool {
        self.inner.fulfilled.lock().contains(&publisher)
    }

    /// Publishers this request is currently subscribed to.
    pub fn publishers(&self) -> Vec<PublisherId> {
        self.inner.fulfilled.lock().clone()
    }

    /// Records a fulfilling publisher; `false` when already recorded.
    pub(crate) fn add_publisher(&self, publisher: PublisherId) -> bool {
        let mut fulfilled = self.inner.fulfilled.lock();
        if fulfilled.contains(&publisher) {
            return false;
        }
        fulfilled.push(publisher);
        true
    }

    pub(crate) fn remove_publisher(&self, publisher: PublisherId) -> bool {
        let mut fulfilled = self.inner.fulfilled.lock();
        let before = fulfilled.len();
        fulfilled.retain(|existing| *existing != publisher);
        fulfilled.len() != before
    }

    pub(crate) fn clear_publishers(&self) {
        self.inner.fulfilled.lock().clear();
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Request {}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("tags", &self.inner.tags)
            .field("member", &self.inner.member)
            .field("callable", &self.inner.callable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EventContext;
    use crate::types::Signature;

    #[test]
    fn tags_match_exactly_and_never_on_empty() {
        let request = Request::new(["damage", "", "heal"], Callable::from_fn(|| ()));
        assert!(request.has_tag("damage"));
        assert!(!request.has_tag("Damage"));
        assert!(!request.has_tag(""));
        assert_eq!(request.tags().len(), 3);
    }

    #[test]
    fn publisher_validation_checks_tag_and_signature() {
        let context = EventContext::isolated();
        let request = Request::new(["damage"], Callable::from_fn(|_: i32| ()));

        let matching = Publisher::new("damage", Signature::of::<(i32,)>(), context.clone());
        let wrong_type = Publisher::new("damage", Signature::of::<(f32,)>(), context.clone());
        let wrong_tag = Publisher::new("score", Signature::of::<(i32,)>(), context);

        assert!(request.validate_publisher(&matching));
        assert!(!request.validate_publisher(&wrong_type));
        assert!(!request.validate_publisher(&wrong_tag));
    }

    #[test]
    fn fulfilment_is_recorded_once_per_publisher() {
        let request = Request::new(["a"], Callable::from_fn(|| ()));
        let publisher = PublisherId::new();
        assert!(request.add_publisher(publisher));
        assert!(!request.clone().add_publisher(publisher));
        assert!(request.is_fulfilled_by(publisher));
        assert!(request.remove_publisher(publisher));
        assert!(request.publishers().is_empty());
    }
}
