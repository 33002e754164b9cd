//! Shared reflectable types for the cross-module tests.

use crate::{argument_enum, BindingSettings, EventContext, EventError, PublisherRegistry};
use crate::{AccessorStrategy, Reflect, Target, TypeBuilder, TypeRegistry};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Stance {
    #[default]
    Standing,
    Crouching,
    Prone,
}

argument_enum!(Stance, "Game.Stance", { Standing = 0, Crouching = 1, Prone = 2 });

/// A game character with one member of every shape the factory binds.
#[derive(Debug, Default)]
pub struct Avatar {
    pub health: i32,
    pub health_calls: Vec<i32>,
    pub speed: f32,
    pub moves: Vec<(i32, String)>,
    pub pings: usize,
    pub stance: Stance,
    pub carried: usize,
    pub equipped: Option<bool>,
}

/// Object-typed argument for [`Avatar`]'s `Carry` and `Equip`.
#[derive(Debug, Default)]
pub struct Pack;

impl Reflect for Pack {
    fn type_name() -> &'static str {
        "Game.Pack"
    }

    fn describe(_: &mut TypeBuilder<Self>) {}
}

impl Reflect for Avatar {
    fn type_name() -> &'static str {
        "Game.Avatar"
    }

    fn describe(builder: &mut TypeBuilder<Self>) {
        builder
            .field("speed", |avatar: &mut Avatar| &mut avatar.speed)
            .readonly_field::<i32>("level")
            .property("Stance", |avatar: &mut Avatar, stance: Stance| avatar.stance = stance)
            .method("SetHealth", |avatar: &mut Avatar, health: i32| {
                avatar.health = health;
                avatar.health_calls.push(health);
            })
            .method("Move", |avatar: &mut Avatar, steps: i32, direction: String| {
                avatar.moves.push((steps, direction))
            })
            .method("Ping", |avatar: &mut Avatar| -> bool {
                avatar.pings += 1;
                true
            })
            .method("Carry", |avatar: &mut Avatar, _: Target<Pack>| avatar.carried += 1)
            .method("Equip", |avatar: &mut Avatar, pack: Option<Target<Pack>>| {
                avatar.equipped = Some(pack.is_some())
            })
            .method("Explode", |_: &mut Avatar| -> Result<(), EventError> {
                Err(EventError::Invocation("avatar exploded".into()))
            });
    }
}

/// Fresh registries with [`Avatar`], [`Pack`] and [`Stance`] registered.
pub fn context() -> EventContext {
    context_with(AccessorStrategy::default())
}

pub fn context_with(strategy: AccessorStrategy) -> EventContext {
    let types = Arc::new(TypeRegistry::new());
    types.register::<Avatar>().unwrap();
    types.register::<Pack>().unwrap();
    types.register_enum::<Stance>();
    let settings = BindingSettings {
        accessor_strategy: strategy,
        ..BindingSettings::default()
    };
    EventContext::new(Arc::new(PublisherRegistry::new()), types, settings)
}
