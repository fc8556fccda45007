//! A pluggable, rulebook-agnostic effects engine for tabletop-style games: an event bus,
//! status conditions that subscribe to it, durations that expire them, relationships that tie
//! several conditions to one source, and a spell-casting layer built on top. The engine owns
//! mechanism (how an effect attaches to and detaches from the game's event stream); a host
//! supplies policy (what a given condition's effects actually mean for a given rulebook).

pub mod capabilities;
pub mod condition;
pub mod duration;
pub mod effect;
pub mod entity;
pub mod error;
pub mod event;
pub mod ids;
pub mod metadata;
pub mod persistence;
pub mod relationship;
pub mod spell;

pub mod prelude {
    pub use crate::capabilities::{PositionProvider, Roller};
    pub use crate::condition::manager::{ConditionManager, ExhaustionManager};
    pub use crate::condition::registry::{ConditionDefinition, ConditionRegistry};
    pub use crate::condition::{Condition, ConditionEffect, ConditionSource, EffectKind, EffectTarget};
    pub use crate::duration::Duration;
    pub use crate::effect::EffectCore;
    pub use crate::entity::{Entity, SimpleEntity};
    pub use crate::error::{Aggregated, EngineError, Result};
    pub use crate::event::bus::EventBus;
    pub use crate::event::{Event, Modifier, ModifierKind, Value};
    pub use crate::ids::{cross_process_id, ConditionId, EntityId, IdGenerator, Ref, RelationshipId, SubscriptionId};
    pub use crate::metadata::{MetaValue, Metadata};
    pub use crate::relationship::{Relationship, RelationshipKind, RelationshipManager};
    pub use crate::spell::engine::SpellCastEngine;
    pub use crate::spell::list::{PreparationStyle, SpellList};
    pub use crate::spell::slots::SpellSlotPool;
    pub use crate::spell::{CastContext, CastFn, CastSpell, Spell};
}
