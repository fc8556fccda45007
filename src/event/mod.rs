//! Typed events and the modifiers/context they carry. See [`bus`] for the publish/subscribe
//! machinery that moves these around.

pub mod bus;

use std::collections::HashMap;

use crate::entity::Entity;
use crate::ids::EntityId;

/// The kind of a [`Modifier`]. The bus only aggregates these; it is up to the consuming
/// engine (a rulebook resolving a roll) to interpret e.g. "advantage and disadvantage both
/// present cancels out", a 5e-style rule, not a bus rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKind {
    Advantage,
    Disadvantage,
    NumericBonus,
    Resistance,
    Vulnerability,
    ImmunityFlag,
    Dice,
}

/// An annotated value appended to an event's context for downstream consumers to aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Modifier {
    pub source: String,
    pub kind: ModifierKind,
    pub value: f64,
    pub priority: i32,
}

impl Modifier {
    pub fn new(source: impl Into<String>, kind: ModifierKind, value: f64, priority: i32) -> Self {
        Self { source: source.into(), kind, value, priority }
    }
}

/// A single value stored in an event's [`EventContext`]. Modeled as a closed, tagged variant
/// rather than an untyped `any`/`interface{}`, per the re-architecture note on heterogeneous
/// map values: the key enumeration used by the core (`save_type`, `speed_multiplier`,
/// `auto_fail`, `damage`, ...) is the public surface; undocumented keys stay opaque game data
/// carried in whichever variant fits.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Entity(EntityId),
    List(Vec<Modifier>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityId> {
        match self {
            Value::Entity(v) => Some(v),
            _ => None,
        }
    }
}

/// Mutable typed key/value map carried by an [`Event`]. Handlers read and write it during
/// dispatch; once dispatch completes the owning event (and therefore its context) is handed
/// back to the publisher and is immutable to anyone downstream of that.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventContext(HashMap<String, Value>);

impl EventContext {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_float)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// A single occurrence of something happening in the game, dispatched through the
/// [`bus::EventBus`] to every handler subscribed to its `event_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    pub context: EventContext,
    pub modifiers: Vec<Modifier>,
    pub cancelled: bool,
    pub cancel_reason: Option<String>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: None,
            target: None,
            context: EventContext::new(),
            modifiers: Vec::new(),
            cancelled: false,
            cancel_reason: None,
        }
    }

    pub fn with_source(mut self, source: &dyn Entity) -> Self {
        self.source = Some(source.id());
        self
    }

    pub fn with_source_id(mut self, source: EntityId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_target(mut self, target: &dyn Entity) -> Self {
        self.target = Some(target.id());
        self
    }

    pub fn with_target_id(mut self, target: EntityId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.set(key, value);
        self
    }

    pub fn add_modifier(&mut self, modifier: Modifier) {
        self.modifiers.push(modifier);
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.cancelled = true;
        self.cancel_reason = Some(reason.into());
    }

    pub fn source_is(&self, id: &EntityId) -> bool {
        self.source.as_ref() == Some(id)
    }

    pub fn target_is(&self, id: &EntityId) -> bool {
        self.target.as_ref() == Some(id)
    }
}
