//! Authoring scenarios, from member token to published event.

use super::fixtures::{context, context_with, Avatar, Stance};
use crate::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn raw_request(avatar: &Target<Avatar>, member: &str, tags: &[&str]) -> RawRequest {
    RawRequest::new(RawDelegate::new(avatar.object(), member), tags.iter().copied())
}

#[test]
fn published_damage_reaches_set_health_once() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let subscriber = Subscriber::new(context.clone());
    subscriber.add_raw_request(raw_request(&avatar, "mSetHealth,System.Int32", &["damage"]));
    subscriber.initialize().unwrap();

    let damage = Publisher::typed::<(i32,)>("damage", context);
    damage.initialize().unwrap();
    assert_eq!(damage.subscriptions().len(), 1);

    damage.publish(&[Value::Int(42)]).unwrap();
    assert_eq!(avatar.lock().health_calls, vec![42]);
}

#[test]
fn dynamic_publisher_subscription_forwards_event_arguments() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let damage = Publisher::typed::<(i32,)>("damage", context);
    damage.add_raw_subscription(RawSubscription::dynamic(RawDelegate::new(
        avatar.object(),
        "mSetHealth,System.Int32",
    )));
    damage.initialize().unwrap();

    damage.publish_typed((42,)).unwrap();
    assert_eq!(avatar.lock().health_calls, vec![42]);
}

#[test]
fn requests_match_only_their_listed_tags() {
    let context = context();
    let damage = Publisher::typed::<(i32,)>("damage", context.clone());
    let score = Publisher::typed::<(i32,)>("score", context.clone());
    damage.initialize().unwrap();
    score.initialize().unwrap();

    let avatar = Target::new(Avatar::default());
    let subscriber = Subscriber::new(context);
    subscriber.add_raw_request(raw_request(&avatar, "mSetHealth,System.Int32", &["damage", "heal"]));
    subscriber.initialize().unwrap();

    let subscriptions = subscriber.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].publisher(), Some(damage.clone()));
    assert!(score.subscriptions().is_empty());
}

#[test]
fn unresolvable_requests_are_dropped_and_siblings_still_bind() {
    let context = context();
    let publisher = Publisher::typed::<(i32,)>("damage", context.clone());
    publisher.initialize().unwrap();

    let avatar = Target::new(Avatar::default());
    let subscriber = Subscriber::new(context);
    for member in [
        "xBadKind",
        "mSetHealth,System.Single",
        "flevel",
        "mSetHealth,System.Int32",
    ] {
        subscriber.add_raw_request(raw_request(&avatar, member, &["damage"]));
    }
    subscriber.initialize().unwrap();

    let requests = subscriber.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].member().map(|member| member.to_token()).as_deref(), Some("mSetHealth,System.Int32"));
    assert_eq!(subscriber.subscriptions().len(), 1);
    assert!(matches!(MemberDescriptor::parse("xBadKind"), Err(EventError::Parse(_))));
}

#[test]
fn unresolvable_calls_are_dropped_and_siblings_still_bind() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let publisher = Publisher::new("tick", Signature::empty(), context);
    publisher.add_call(RawCall::new(RawDelegate::new(avatar.object(), "xBadKind"), Vec::new()));
    publisher.add_call(RawCall::new(RawDelegate::new(avatar.object(), "mPing"), Vec::new()));
    publisher.add_call(RawCall::new(RawDelegate::unbound("mPing"), Vec::new()));
    publisher.initialize().unwrap();

    assert_eq!(publisher.calls().len(), 1);
    publisher.publish(&[]).unwrap();
    assert_eq!(avatar.lock().pings, 1);
}

#[test]
fn predefined_call_arguments_are_fixed_at_binding() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let publisher = Publisher::new("move", Signature::empty(), context);
    let call = RawCall::new(
        RawDelegate::new(avatar.object(), "mMove,System.Int32,System.String"),
        vec![ArgumentValue::of(5), ArgumentValue::of("go".to_string())],
    );
    assert!(publisher.add_call(call));
    publisher.initialize().unwrap();

    publisher.publish(&[]).unwrap();
    assert_eq!(avatar.lock().moves, vec![(5, "go".to_string())]);

    let mut authored = publisher.calls();
    authored[0].arguments[0].set(9).unwrap();
    publisher.publish(&[]).unwrap();
    assert_eq!(
        avatar.lock().moves,
        vec![(5, "go".to_string()), (5, "go".to_string())]
    );
}

#[test]
fn calls_added_to_an_active_publisher_bind_immediately() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let publisher = Publisher::new("move", Signature::empty(), context);
    publisher.initialize().unwrap();

    let short = RawCall::new(
        RawDelegate::new(avatar.object(), "mMove,System.Int32,System.String"),
        vec![ArgumentValue::of(5)],
    );
    assert!(!publisher.add_call(short));
    assert!(publisher.add_call(RawCall::new(RawDelegate::new(avatar.object(), "mPing"), Vec::new())));
    assert_eq!(publisher.callable_count(), 1);

    publisher.publish(&[]).unwrap();
    assert!(publisher.remove_call(0));
    assert!(!publisher.remove_call(0));
    publisher.publish(&[]).unwrap();
    assert_eq!(avatar.lock().pings, 1);
}

#[test]
fn void_requests_fire_on_typed_publishers() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let subscriber = Subscriber::new(context.clone());
    subscriber.add_raw_request(raw_request(&avatar, "mPing", &["damage"]));
    subscriber.add_raw_request(raw_request(&avatar, "mSetHealth,System.Int32", &["damage"]));
    subscriber.initialize().unwrap();

    let publisher = Publisher::typed::<(i32,)>("damage", context);
    publisher.initialize().unwrap();
    assert_eq!(publisher.subscriptions().len(), 2);

    publisher.publish_typed((7,)).unwrap();
    let state = avatar.lock();
    assert_eq!((state.health, state.pings), (7, 1));
}

#[test]
fn publish_uses_the_dispatch_list_from_entry() {
    let publisher = Publisher::typed::<(i32,)>("tick", context());
    let victim_calls = Arc::new(AtomicUsize::new(0));
    let late_calls = Arc::new(AtomicUsize::new(0));
    let remover_calls = Arc::new(AtomicUsize::new(0));
    let to_remove: Arc<Mutex<Vec<CallableId>>> = Arc::new(Mutex::new(Vec::new()));

    let remover = {
        let weak = publisher.downgrade();
        let to_remove = to_remove.clone();
        let remover_calls = remover_calls.clone();
        let late_calls = late_calls.clone();
        Callable::from_fn(move |_: i32| {
            remover_calls.fetch_add(1, Ordering::SeqCst);
            let Some(publisher) = weak.upgrade() else {
                return;
            };
            for id in to_remove.lock().drain(..) {
                publisher.remove_delegate(id);
            }
            let late_calls = late_calls.clone();
            publisher.add_delegate(Callable::from_fn(move |_: i32| {
                late_calls.fetch_add(1, Ordering::SeqCst);
            }));
        })
    };
    let victim = {
        let victim_calls = victim_calls.clone();
        Callable::from_fn(move |_: i32| {
            victim_calls.fetch_add(1, Ordering::SeqCst);
        })
    };
    to_remove.lock().extend([remover.id(), victim.id()]);
    publisher.add_delegate(remover);
    publisher.add_delegate(victim);

    publisher.publish_typed((1,)).unwrap();
    assert_eq!(remover_calls.load(Ordering::SeqCst), 1);
    assert_eq!(victim_calls.load(Ordering::SeqCst), 1);
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    publisher.publish_typed((2,)).unwrap();
    assert_eq!(remover_calls.load(Ordering::SeqCst), 1);
    assert_eq!(victim_calls.load(Ordering::SeqCst), 1);
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn subscriber_code_may_unsubscribe_during_publish() {
    let context = context();
    let publisher = Publisher::new("once", Signature::empty(), context.clone());
    publisher.initialize().unwrap();

    let subscriber = Subscriber::new(context);
    subscriber.initialize().unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let callable = {
        let weak = subscriber.downgrade();
        let fired = fired.clone();
        Callable::from_fn(move || {
            fired.fetch_add(1, Ordering::SeqCst);
            if let Some(subscriber) = weak.upgrade() {
                subscriber.clear_subscriptions();
            }
        })
    };
    subscriber.add_request(Request::new(["once"], callable));
    assert_eq!(publisher.subscriptions().len(), 1);

    publisher.publish(&[]).unwrap();
    publisher.publish(&[]).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(publisher.subscriptions().is_empty());
}

#[test]
fn invocation_errors_reach_the_publisher_caller() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let subscriber = Subscriber::new(context.clone());
    subscriber.add_raw_request(raw_request(&avatar, "mExplode", &["boom"]));
    subscriber.initialize().unwrap();

    let publisher = Publisher::typed::<(i32,)>("boom", context);
    publisher.initialize().unwrap();
    assert!(matches!(publisher.publish_typed((1,)), Err(EventError::Invocation(_))));
}

#[test]
fn both_accessor_strategies_drive_the_same_bindings() {
    for strategy in [AccessorStrategy::Reflective, AccessorStrategy::Trampoline] {
        let context = context_with(strategy);
        let avatar = Target::new(Avatar::default());
        let subscriber = Subscriber::new(context.clone());
        subscriber.add_raw_request(raw_request(&avatar, "fspeed", &["speed"]));
        subscriber.add_raw_request(raw_request(&avatar, "pStance", &["stance"]));
        subscriber.initialize().unwrap();

        let speed = Publisher::typed::<(f32,)>("speed", context.clone());
        let stance = Publisher::typed::<(Stance,)>("stance", context.clone());
        speed.initialize().unwrap();
        stance.initialize().unwrap();
        speed.publish_typed((2.5f32,)).unwrap();
        stance.publish_typed((Stance::Prone,)).unwrap();

        {
            let state = avatar.lock();
            assert_eq!((state.speed, state.stance), (2.5, Stance::Prone), "{:?}", strategy);
        }

        let accessor = context
            .factory()
            .create_accessor(&avatar.object(), &MemberDescriptor::parse("fspeed").unwrap())
            .unwrap();
        assert!(
            matches!(accessor.invoke(&[Value::Int(1)]), Err(EventError::ArgumentMismatch(_))),
            "{:?}",
            strategy
        );
        assert_eq!(avatar.lock().speed, 2.5, "{:?}", strategy);
    }
}

/// Fires `echo` from inside one of its own members.
#[derive(Default)]
struct Relay {
    echo: Option<Publisher>,
    echoes: usize,
    failure: Option<String>,
}

impl Reflect for Relay {
    fn type_name() -> &'static str {
        "Game.Relay"
    }

    fn describe(builder: &mut TypeBuilder<Self>) {
        builder
            .method("Fire", |relay: &mut Relay| {
                if let Some(echo) = relay.echo.clone() {
                    relay.failure = echo.publish(&[]).err().map(|error| error.to_string());
                }
            })
            .method("Echo", |relay: &mut Relay| relay.echoes += 1);
    }
}

fn relay_context() -> EventContext {
    let types = Arc::new(TypeRegistry::new());
    types.register::<Relay>().unwrap();
    EventContext::new(Arc::new(PublisherRegistry::new()), types, BindingSettings::default())
}

fn echo_listener(context: &EventContext, relay: &Target<Relay>) -> Subscriber {
    let subscriber = Subscriber::new(context.clone());
    subscriber.add_raw_request(RawRequest::new(RawDelegate::new(relay.object(), "mEcho"), ["echo"]));
    subscriber.initialize().unwrap();
    subscriber
}

#[test]
fn members_publishing_into_their_own_target_fail_instead_of_blocking() {
    let context = relay_context();
    let echo = Publisher::new("echo", Signature::empty(), context.clone());
    echo.initialize().unwrap();
    let firing = Target::new(Relay {
        echo: Some(echo.clone()),
        ..Relay::default()
    });
    let other = Target::new(Relay::default());
    let _other_listener = echo_listener(&context, &other);

    let fire = Publisher::new("fire", Signature::empty(), context.clone());
    assert!(fire.add_call(RawCall::new(RawDelegate::new(firing.object(), "mFire"), Vec::new())));
    fire.initialize().unwrap();

    fire.publish(&[]).unwrap();
    assert_eq!(other.lock().echoes, 1);
    assert_eq!(firing.lock().failure, None);

    let _own_listener = echo_listener(&context, &firing);
    fire.publish(&[]).unwrap();
    assert_eq!(other.lock().echoes, 2);
    {
        let state = firing.lock();
        assert_eq!(state.echoes, 0);
        let failure = state.failure.clone().unwrap_or_default();
        assert!(failure.contains("already running a member"), "{}", failure);
    }

    echo.publish(&[]).unwrap();
    assert_eq!(firing.lock().echoes, 1);
    assert_eq!(other.lock().echoes, 3);
}

#[test]
fn other_threads_wait_for_a_running_member() {
    let context = relay_context();
    let relay = Target::new(Relay::default());
    let echo = Publisher::new("echo", Signature::empty(), context.clone());
    echo.initialize().unwrap();
    let _listener = echo_listener(&context, &relay);

    let guard = relay.lock();
    let worker = {
        let echo = echo.clone();
        std::thread::spawn(move || echo.publish(&[]))
    };
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(guard.echoes, 0);
    drop(guard);

    worker.join().unwrap().unwrap();
    assert_eq!(relay.lock().echoes, 1);
}
