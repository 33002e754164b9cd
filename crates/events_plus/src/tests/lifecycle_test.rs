//! Initialization order, teardown and retagging across publishers and subscribers.

use super::fixtures::{context, Avatar};
use crate::*;

fn health_subscriber(context: &EventContext, avatar: &Target<Avatar>, tags: &[&str]) -> Subscriber {
    let subscriber = Subscriber::new(context.clone());
    subscriber.add_raw_request(RawRequest::new(
        RawDelegate::new(avatar.object(), "mSetHealth,System.Int32"),
        tags.iter().copied(),
    ));
    subscriber
}

fn assert_linked_once(publisher: &Publisher, subscriber: &Subscriber) {
    let from_publisher = publisher.subscriptions();
    let from_subscriber = subscriber.subscriptions();
    assert_eq!(from_publisher.len(), 1);
    assert_eq!(from_publisher, from_subscriber);
    assert_eq!(from_publisher[0].subscriber_id(), subscriber.id());
}

#[test]
fn initialization_order_does_not_matter() {
    for subscriber_first in [true, false] {
        let context = context();
        let avatar = Target::new(Avatar::default());
        let subscriber = health_subscriber(&context, &avatar, &["damage"]);
        let publisher = Publisher::typed::<(i32,)>("damage", context.clone());

        if subscriber_first {
            subscriber.initialize().unwrap();
            publisher.initialize().unwrap();
        } else {
            publisher.initialize().unwrap();
            subscriber.initialize().unwrap();
        }

        assert_linked_once(&publisher, &subscriber);
        publisher.publish_typed((3,)).unwrap();
        assert_eq!(avatar.lock().health_calls, vec![3], "subscriber first: {}", subscriber_first);
    }
}

#[test]
fn clearing_a_publisher_unlinks_both_sides() {
    let context = context();
    let first = Target::new(Avatar::default());
    let second = Target::new(Avatar::default());
    let subscribers = [
        health_subscriber(&context, &first, &["damage"]),
        health_subscriber(&context, &second, &["damage"]),
    ];
    for subscriber in &subscribers {
        subscriber.initialize().unwrap();
    }

    let publisher = Publisher::typed::<(i32,)>("damage", context.clone());
    publisher.initialize().unwrap();
    assert_eq!(publisher.subscriptions().len(), 2);

    publisher.clear();
    assert!(publisher.subscriptions().is_empty());
    assert_eq!(publisher.callable_count(), 0);
    assert!(!context.registry().contains(&publisher));
    for subscriber in &subscribers {
        assert!(subscriber.subscriptions().is_empty());
        assert!(subscriber.requests()[0].publishers().is_empty());
    }

    let replacement = Publisher::typed::<(i32,)>("damage", context);
    replacement.initialize().unwrap();
    for subscriber in &subscribers {
        assert_linked_once(&replacement, subscriber);
    }
}

#[test]
fn clearing_a_subscriber_unlinks_both_sides() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let publisher = Publisher::typed::<(i32,)>("damage", context.clone());
    publisher.initialize().unwrap();
    let subscriber = health_subscriber(&context, &avatar, &["damage"]);
    subscriber.initialize().unwrap();
    assert_linked_once(&publisher, &subscriber);

    subscriber.clear();
    assert_eq!(subscriber.state(), LifecycleState::Cleared);
    assert!(publisher.subscriptions().is_empty());
    assert!(subscriber.requests().is_empty());
    assert!(!context.registry().is_loaded(subscriber.id()));

    publisher.publish_typed((9,)).unwrap();
    assert!(avatar.lock().health_calls.is_empty());

    let late = Publisher::typed::<(i32,)>("damage", context);
    late.initialize().unwrap();
    assert!(late.subscriptions().is_empty());
}

#[test]
fn removing_a_subscription_from_either_side_keeps_both_in_sync() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let publisher = Publisher::typed::<(i32,)>("damage", context.clone());
    let subscriber = health_subscriber(&context, &avatar, &["damage"]);
    publisher.initialize().unwrap();
    subscriber.initialize().unwrap();

    let subscription = publisher.subscriptions().remove(0);
    assert!(publisher.remove_subscription(&subscription));
    assert!(!subscriber.has_subscription(&subscription));
    assert!(!subscriber.remove_subscription(&subscription));
    assert!(!subscriber.requests()[0].is_fulfilled_by(publisher.id()));

    assert_eq!(subscriber.match_publisher(&publisher), 1);
    let subscription = subscriber.subscriptions().remove(0);
    assert!(subscriber.remove_subscription(&subscription));
    assert!(!publisher.has_subscription(&subscription));
}

#[test]
fn retagging_rematches_requests() {
    let context = context();
    let hurt = Target::new(Avatar::default());
    let healed = Target::new(Avatar::default());
    let damage_listener = health_subscriber(&context, &hurt, &["damage"]);
    let heal_listener = health_subscriber(&context, &healed, &["heal"]);
    damage_listener.initialize().unwrap();
    heal_listener.initialize().unwrap();

    let publisher = Publisher::typed::<(i32,)>("damage", context.clone());
    publisher.initialize().unwrap();
    assert_linked_once(&publisher, &damage_listener);

    publisher.set_tag("heal");
    assert_eq!(publisher.tag().name(), "heal");
    assert_linked_once(&publisher, &heal_listener);
    assert!(damage_listener.subscriptions().is_empty());

    publisher.publish_typed((5,)).unwrap();
    assert_eq!(healed.lock().health_calls, vec![5]);
    assert!(hurt.lock().health_calls.is_empty());

    publisher.set_tag("damage");
    assert_linked_once(&publisher, &damage_listener);
    assert!(heal_listener.subscriptions().is_empty());
    assert_eq!(context.registry().lookup_tag("damage"), vec![publisher.clone()]);
}

#[test]
fn retagging_keeps_direct_subscriptions() {
    let context = context();
    let subscriber = Subscriber::new(context.clone());
    subscriber.initialize().unwrap();
    let publisher = Publisher::new("damage", Signature::empty(), context);
    publisher.initialize().unwrap();

    let subscription = Subscription::new(&subscriber, &publisher, Callable::from_fn(|| ()));
    assert!(publisher.add_subscription(&subscription, false));
    assert_eq!(subscription.request(), None);

    publisher.set_tag("elsewhere");
    assert!(publisher.has_subscription(&subscription));
    assert!(subscriber.has_subscription(&subscription));
}

#[test]
fn authored_subscription_links_a_named_subscriber() {
    let context = context();
    let avatar = Target::new(Avatar::default());
    let subscriber = Subscriber::new(context.clone());
    subscriber.initialize().unwrap();

    let publisher = Publisher::typed::<(i32,)>("", context.clone());
    publisher.add_raw_subscription(
        RawSubscription::dynamic(RawDelegate::new(avatar.object(), "mSetHealth,System.Int32"))
            .for_subscriber(&subscriber),
    );
    publisher.initialize().unwrap();
    assert!(context.registry().is_empty());

    let subscriptions = subscriber.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert!(publisher.has_subscription(&subscriptions[0]));

    publisher.publish_typed((3,)).unwrap();
    assert_eq!(avatar.lock().health, 3);
}

#[test]
fn registry_stats_follow_the_lifecycle() {
    let context = context();
    let publisher = Publisher::new("score", Signature::empty(), context.clone());
    let subscriber = Subscriber::new(context.clone());
    publisher.initialize().unwrap();
    subscriber.initialize().unwrap();

    let stats = context.registry().stats();
    assert_eq!((stats.registrations, stats.live_publishers, stats.loaded_subscribers), (1, 1, 1));

    publisher.clear();
    subscriber.clear();
    let stats = context.registry().stats();
    assert_eq!(stats.unregistrations, 1);
    assert_eq!((stats.live_publishers, stats.live_tags, stats.loaded_subscribers), (0, 0, 0));
}
