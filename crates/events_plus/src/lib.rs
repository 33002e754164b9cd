//! # Events Plus
//!
//! Tag-matched publisher/subscriber wiring between live objects, driven by
//! serializable member references.
//!
//! ## Core Features
//!
//! - **Member Tokens**: fields, properties and methods are stored as compact
//!   strings such as `mSetSpeed,System.Single`
//! - **Registered Member Tables**: types describe their members once through
//!   [`TypeBuilder`]; binding a token never needs runtime code generation
//! - **Uniform Callables**: every bound member, closure and predefined call is a
//!   [`Callable`] over an untyped argument vector with a checked signature
//! - **Late Binding**: publishers and subscribers find each other by tag no
//!   matter which one initializes first
//! - **Safe Re-entrancy**: dispatch and registry queries work on snapshots, so
//!   callables may subscribe and unsubscribe while an event is in flight
//!
//! ## Architecture Overview
//!
//! - **Descriptors** ([`descriptor`]): encode and decode member tokens
//! - **Resolver** ([`reflect`]): per-type member tables keyed by descriptor
//! - **Delegate Factory** ([`delegate`]): accessors, delegates and calls
//! - **Arguments** ([`argument`]): persisted predefined argument values
//! - **Registry** ([`registry`]): tag-hash index of live publishers plus load broadcasts
//! - **Publisher / Subscriber** ([`publisher`], [`subscriber`]): the two ends of an event
//! - **Authored Forms** ([`raw`]): the serde shapes an authoring tool persists
//!
//! ## Quick Start Example
//!
//! ```rust
//! use events_plus::*;
//!
//! #[derive(Default)]
//! struct Health {
//!     value: i32,
//! }
//!
//! impl Reflect for Health {
//!     fn type_name() -> &'static str {
//!         "Game.Health"
//!     }
//!
//!     fn describe(builder: &mut TypeBuilder<Self>) {
//!         builder.method("SetHealth", |health: &mut Health, value: i32| health.value = value);
//!     }
//! }
//!
//! fn main() -> Result<(), EventError> {
//!     let context = EventContext::isolated();
//!     context.types().register::<Health>()?;
//!
//!     let health = Target::new(Health::default());
//!     let subscriber = Subscriber::new(context.clone());
//!     subscriber.add_raw_request(RawRequest::new(
//!         RawDelegate::new(health.object(), "mSetHealth,System.Int32"),
//!         ["damage"],
//!     ));
//!     subscriber.initialize()?;
//!
//!     let damage = Publisher::typed::<(i32,)>("damage", context.clone());
//!     damage.initialize()?;
//!     damage.publish_typed((42,))?;
//!
//!     assert_eq!(health.lock().value, 42);
//!     Ok(())
//! }
//! ```

mod macros;

#[cfg(test)]
mod tests;

pub mod argument;
pub mod config;
pub mod context;
pub mod delegate;
pub mod descriptor;
pub mod error;
pub mod ids;
pub mod logging;
pub mod publisher;
pub mod raw;
pub mod reflect;
pub mod registry;
pub mod request;
pub mod subscriber;
pub mod subscription;
pub mod tag;
pub mod types;

// Re-export commonly used items for convenience
pub use argument::ArgumentValue;
pub use config::{BindingSettings, EventsPlusConfig, LoggingSettings};
pub use context::{EventContext, LifecycleState};
pub use delegate::{AccessorStrategy, Callable, CallableShape, DelegateFactory, IntoCallable, MAX_ARITY};
pub use descriptor::{MemberDescriptor, MemberKind};
pub use error::EventError;
pub use ids::{CallableId, ObserverId, PublisherId, RequestId, SubscriberId, SubscriptionId};
pub use logging::setup_logging;
pub use publisher::{Publisher, WeakPublisher};
pub use raw::{RawCall, RawDelegate, RawRequest, RawSubscription};
pub use reflect::{MemberAccess, MemberInfo, ObjectRef, Reflect, Target, TypeBuilder, TypeRegistry};
pub use registry::{PublisherRegistry, RegistryStats, SubscriberEvent};
pub use request::Request;
pub use subscriber::{Subscriber, WeakSubscriber};
pub use subscription::Subscription;
pub use tag::{tag_hash, Tag};
pub use types::{
    ArgumentList, ArgumentType, Bounds, Color, Curve, EnumType, Keyframe, Quaternion, Rect,
    ReturnValue, Signature, TypeRef, Value, Vector2, Vector3, Vector4,
};
