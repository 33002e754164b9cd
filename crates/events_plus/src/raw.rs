//! # Authored Forms
//!
//! Serializable descriptions of bindings, as an authoring tool stores them:
//! a member token, tag lists and predefined arguments. They become live
//! callables, requests and subscriptions when their owner initializes.
//!
//! Runtime handles (the target object, a linked subscriber) cannot be
//! persisted. Serde skips them; whoever loads the form attaches them again.

use crate::argument::ArgumentValue;
use crate::delegate::{Callable, DelegateFactory};
use crate::descriptor::MemberDescriptor;
use crate::error::EventError;
use crate::publisher::Publisher;
use crate::reflect::ObjectRef;
use crate::request::Request;
use crate::subscriber::Subscriber;
use crate::subscription::Subscription;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};

/// A target object plus the token of one of its members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDelegate {
    #[serde(skip)]
    target: Option<ObjectRef>,
    member: String,
}

impl RawDelegate {
    pub fn new(target: ObjectRef, member: impl Into<String>) -> Self {
        Self {
            target: Some(target),
            member: member.into(),
        }
    }

    /// A member token with no target attached yet.
    pub fn unbound(member: impl Into<String>) -> Self {
        Self {
            target: None,
            member: member.into(),
        }
    }

    pub fn with_target(mut self, target: ObjectRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn set_target(&mut self, target: Option<ObjectRef>) {
        self.target = target;
    }

    pub fn target(&self) -> Option<&ObjectRef> {
        self.target.as_ref()
    }

    /// The stored member token, verbatim.
    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn descriptor(&self) -> Result<MemberDescriptor, EventError> {
        MemberDescriptor::parse(&self.member)
    }

    fn require_target(&self) -> Result<&ObjectRef, EventError> {
        self.target
            .as_ref()
            .ok_or_else(|| EventError::Binding(format!("'{}' has no target object", self.member)))
    }

    /// Accessor or delegate for the member.
    pub fn create_callable(&self, factory: &DelegateFactory) -> Result<Callable, EventError> {
        let descriptor = self.descriptor()?;
        factory.create_callable(self.require_target()?, &descriptor)
    }

    /// Zero-argument callable invoking the member with `arguments`.
    pub fn create_call(
        &self,
        factory: &DelegateFactory,
        arguments: &[ArgumentValue],
    ) -> Result<Callable, EventError> {
        let descriptor = self.descriptor()?;
        factory.create_call(self.require_target()?, &descriptor, arguments)
    }
}

/// A member call whose arguments are fixed when authored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCall {
    pub delegate: RawDelegate,
    #[serde(default)]
    pub arguments: Vec<ArgumentValue>,
}

impl RawCall {
    pub fn new(delegate: RawDelegate, arguments: Vec<ArgumentValue>) -> Self {
        Self { delegate, arguments }
    }

    pub fn create_call(&self, factory: &DelegateFactory) -> Result<Callable, EventError> {
        self.delegate.create_call(factory, &self.arguments)
    }
}

/// Subscriber-side request: bind the member to publishers carrying any of `tags`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRequest {
    pub delegate: RawDelegate,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RawRequest {
    pub fn new<I, S>(delegate: RawDelegate, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            delegate,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn create_request(&self, factory: &DelegateFactory) -> Result<Request, EventError> {
        let descriptor = self.delegate.descriptor()?;
        let callable = self.delegate.create_callable(factory)?;
        let tags = self.tags.iter().map(|tag| Tag::new(tag)).collect();
        Ok(Request::for_member(tags, callable, descriptor))
    }
}

/// Publisher-side binding.
///
/// With a subscriber attached it becomes a [`Subscription`] to that
/// subscriber. Without one it is bound on the publisher itself: dynamic
/// forms forward the event arguments to the member, the others call it with
/// `arguments`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSubscription {
    pub delegate: RawDelegate,
    #[serde(skip)]
    pub subscriber: Option<Subscriber>,
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub arguments: Vec<ArgumentValue>,
}

impl RawSubscription {
    /// Forwards the publisher's event arguments to the member.
    pub fn dynamic(delegate: RawDelegate) -> Self {
        Self {
            delegate,
            is_dynamic: true,
            ..Self::default()
        }
    }

    /// Calls the member with fixed arguments.
    pub fn with_arguments(delegate: RawDelegate, arguments: Vec<ArgumentValue>) -> Self {
        Self {
            delegate,
            arguments,
            ..Self::default()
        }
    }

    pub fn for_subscriber(mut self, subscriber: &Subscriber) -> Self {
        self.subscriber = Some(subscriber.clone());
        self
    }

    /// Binds this form on `publisher`.
    ///
    /// # Errors
    ///
    /// Parse or binding errors from the member token, or
    /// [`EventError::Binding`] when the publisher refuses the result.
    pub fn create_and_register(&self, publisher: &Publisher) -> Result<(), EventError> {
        let factory = publisher.context().factory();
        let refused = || {
            EventError::Binding(format!(
                "publisher {} ({}) refused '{}'",
                publisher.id(),
                publisher.signature(),
                self.delegate.member()
            ))
        };

        if let Some(subscriber) = &self.subscriber {
            let callable = if self.is_dynamic {
                self.delegate.create_callable(factory)?
            } else {
                self.delegate.create_call(factory, &self.arguments)?
            };
            let subscription = Subscription::new(subscriber, publisher, callable);
            return if publisher.add_subscription(&subscription, false) {
                Ok(())
            } else {
                Err(refused())
            };
        }

        if self.is_dynamic {
            let callable = self.delegate.create_callable(factory)?;
            return if publisher.add_delegate(callable) {
                Ok(())
            } else {
                Err(refused())
            };
        }

        let call = RawCall::new(self.delegate.clone(), self.arguments.clone());
        if publisher.insert_call(call)? {
            Ok(())
        } else {
            Err(refused())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingSettings;
    use crate::context::EventContext;
    use crate::reflect::{Reflect, Target, TypeBuilder, TypeRegistry};
    use crate::registry::PublisherRegistry;
    use crate::types::Value;
    use std::sync::Arc;

    #[derive(Default)]
    struct Lamp {
        lit: bool,
        brightness: f32,
    }

    impl Reflect for Lamp {
        fn type_name() -> &'static str {
            "Test.Lamp"
        }

        fn describe(builder: &mut TypeBuilder<Self>) {
            builder
                .field("brightness", |lamp: &mut Lamp| &mut lamp.brightness)
                .method("Toggle", |lamp: &mut Lamp| lamp.lit = !lamp.lit);
        }
    }

    fn context() -> EventContext {
        let types = Arc::new(TypeRegistry::new());
        types.register::<Lamp>().unwrap();
        EventContext::new(Arc::new(PublisherRegistry::new()), types, BindingSettings::default())
    }

    #[test]
    fn missing_target_is_a_binding_error() {
        let context = context();
        let delegate = RawDelegate::unbound("mToggle");
        assert!(matches!(
            delegate.create_callable(context.factory()),
            Err(EventError::Binding(_))
        ));
    }

    #[test]
    fn malformed_token_is_a_parse_error() {
        let context = context();
        let lamp = Target::new(Lamp::default());
        let delegate = RawDelegate::new(lamp.object(), "xBadKind");
        assert!(matches!(
            delegate.create_callable(context.factory()),
            Err(EventError::Parse(_))
        ));
    }

    #[test]
    fn request_keeps_its_member() {
        let context = context();
        let lamp = Target::new(Lamp::default());
        let raw = RawRequest::new(RawDelegate::new(lamp.object(), "fbrightness"), ["dim", ""]);

        let request = raw.create_request(context.factory()).unwrap();
        assert_eq!(request.member().map(|member| member.name()), Some("brightness"));
        assert!(request.has_tag("dim"));
        request.callable().call((0.5f32,)).unwrap();
        assert_eq!(lamp.lock().brightness, 0.5);
    }

    #[test]
    fn dynamic_forms_become_delegates_and_others_calls() {
        let context = context();
        let lamp = Target::new(Lamp::default());
        let publisher = Publisher::typed::<(f32,)>("light", context);
        publisher.initialize().unwrap();

        RawSubscription::dynamic(RawDelegate::new(lamp.object(), "fbrightness"))
            .create_and_register(&publisher)
            .unwrap();
        RawSubscription::with_arguments(RawDelegate::new(lamp.object(), "mToggle"), Vec::new())
            .create_and_register(&publisher)
            .unwrap();
        assert_eq!(publisher.delegates().len(), 1);
        assert_eq!(publisher.calls().len(), 1);

        publisher.publish(&[Value::Float(0.75)]).unwrap();
        let state = lamp.lock();
        assert_eq!((state.lit, state.brightness), (true, 0.75));
    }

    #[test]
    fn persisted_forms_skip_runtime_handles() {
        let lamp = Target::new(Lamp::default());
        let raw = RawRequest::new(RawDelegate::new(lamp.object(), "mToggle"), ["on"]);

        let json = serde_json::to_string(&raw).unwrap();
        assert_eq!(json, r#"{"delegate":{"member":"mToggle"},"tags":["on"]}"#);

        let restored: RawRequest = serde_json::from_str(&json).unwrap();
        assert!(restored.delegate.target().is_none());
        assert_eq!(restored.delegate.with_target(lamp.object()).target(), Some(&lamp.object()));
    }
}
