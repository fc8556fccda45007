//! Spells: the highest-level artifact in the engine, built by casters and executed through
//! [`engine::SpellCastEngine`]. A [`Spell`] carries its own game logic as an opaque `cast`
//! closure rather than a trait object, since the set of spells is open-ended host data, not a
//! closed enum the engine pattern-matches over (unlike [`crate::condition::EffectKind`]).

pub mod engine;
pub mod list;
pub mod slots;

use crate::capabilities::Roller;
use crate::condition::manager::ConditionManager;
use crate::condition::registry::ConditionRegistry;
use crate::error::Result;
use crate::event::bus::EventBus;
use crate::ids::{ConditionId, EntityId};
use crate::relationship::RelationshipManager;

/// A spell's game logic. Boxed as `Fn` rather than `FnMut` so a single [`Spell`] value can be
/// cast repeatedly (and shared behind an `Arc`) without requiring interior mutability; any
/// state a cast needs to carry between its own steps lives on [`CastContext`], not captured in
/// the closure.
pub type CastFn = Box<dyn Fn(&mut CastContext) -> Result<()>>;

/// Everything a spell's `cast` closure, and [`engine::SpellCastEngine::cast`] itself, need.
/// Every manager handle lives here rather than as a separate argument to `cast` precisely so
/// there is only ever one mutable borrow of each manager in flight: a closure's `ctx.bus` and
/// the engine's own post-cast `ctx.bus` use are the same reborrow of one reference, never two
/// independent ones. `bus` is mandatory (every cast publishes lifecycle events regardless of
/// what the spell itself does); the rest are optional because a given spell might not touch
/// dice, conditions, or relationships at all (a pure-damage cantrip needs none of them).
pub struct CastContext<'a> {
    pub caster: EntityId,
    pub targets: Vec<EntityId>,
    pub slot_level: u32,
    pub bus: &'a mut EventBus,
    pub roller: Option<&'a mut dyn Roller>,
    pub conditions: Option<&'a mut ConditionManager>,
    pub registry: Option<&'a ConditionRegistry>,
    pub relationships: Option<&'a mut RelationshipManager>,
    concentration_condition: Option<ConditionId>,
}

impl<'a> CastContext<'a> {
    pub fn new(caster: impl Into<EntityId>, targets: Vec<EntityId>, slot_level: u32, bus: &'a mut EventBus) -> Self {
        Self {
            caster: caster.into(),
            targets,
            slot_level,
            bus,
            roller: None,
            conditions: None,
            registry: None,
            relationships: None,
            concentration_condition: None,
        }
    }

    pub fn with_roller(mut self, roller: &'a mut dyn Roller) -> Self {
        self.roller = Some(roller);
        self
    }

    pub fn with_conditions(mut self, conditions: &'a mut ConditionManager, registry: &'a ConditionRegistry) -> Self {
        self.conditions = Some(conditions);
        self.registry = Some(registry);
        self
    }

    pub fn with_relationships(mut self, relationships: &'a mut RelationshipManager) -> Self {
        self.relationships = Some(relationships);
        self
    }

    pub fn roll(&mut self, count: u32, sides: u32) -> Vec<i64> {
        self.roller.as_deref_mut().map(|r| r.roll(count, sides)).unwrap_or_default()
    }

    /// Called by a spell's own `cast` closure after it applies the condition that carries
    /// `metadata["concentration"]=true`, so [`engine::SpellCastEngine`] can start the
    /// concentration relationship once `cast` returns (see `Spell::requires_concentration`).
    pub fn bind_concentration(&mut self, id: ConditionId) {
        self.concentration_condition = Some(id);
    }

    pub fn concentration_condition(&self) -> Option<ConditionId> {
        self.concentration_condition
    }
}

/// Fixed set of component types a spell's area of effect or target selection might use.
/// Free-form strings (`target_type`, `aoe`) are host/rulebook vocabulary the core doesn't
/// interpret, matching `casting_time`/`range`/`components` below. Not `Debug`: `duration` may
/// carry an `UntilEvent` predicate closure, which isn't.
#[derive(Clone)]
pub struct Spell {
    pub id: String,
    pub level: u32,
    pub casting_time: String,
    pub range: String,
    pub duration: crate::duration::Duration,
    pub components: Vec<String>,
    pub target_type: String,
    pub aoe: Option<String>,
    pub max_targets: Option<u32>,
    pub is_ritual: bool,
    pub requires_concentration: bool,
    pub upcastable: bool,
}

impl Spell {
    pub fn builder(id: impl Into<String>, level: u32) -> SpellBuilder {
        SpellBuilder::new(id, level)
    }
}

/// `cast` is kept out of `Spell`'s `Debug`/`Clone` derive by living alongside it rather than
/// inside it: [`CastSpell`] pairs a `Spell` with its closure, since a boxed `Fn` can't derive
/// either trait.
pub struct CastSpell {
    pub spell: Spell,
    pub cast: CastFn,
}

pub struct SpellBuilder {
    id: String,
    level: u32,
    casting_time: String,
    range: String,
    duration: crate::duration::Duration,
    components: Vec<String>,
    target_type: String,
    aoe: Option<String>,
    max_targets: Option<u32>,
    is_ritual: bool,
    requires_concentration: bool,
    upcastable: bool,
}

impl SpellBuilder {
    fn new(id: impl Into<String>, level: u32) -> Self {
        Self {
            id: id.into(),
            level,
            casting_time: "action".to_string(),
            range: "self".to_string(),
            duration: crate::duration::Duration::Permanent,
            components: Vec::new(),
            target_type: "single".to_string(),
            aoe: None,
            max_targets: None,
            is_ritual: false,
            requires_concentration: false,
            upcastable: false,
        }
    }

    pub fn casting_time(mut self, v: impl Into<String>) -> Self {
        self.casting_time = v.into();
        self
    }

    pub fn range(mut self, v: impl Into<String>) -> Self {
        self.range = v.into();
        self
    }

    pub fn duration(mut self, v: crate::duration::Duration) -> Self {
        self.duration = v;
        self
    }

    pub fn components(mut self, v: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.components = v.into_iter().map(Into::into).collect();
        self
    }

    pub fn target_type(mut self, v: impl Into<String>) -> Self {
        self.target_type = v.into();
        self
    }

    pub fn aoe(mut self, v: impl Into<String>) -> Self {
        self.aoe = Some(v.into());
        self
    }

    pub fn max_targets(mut self, v: u32) -> Self {
        self.max_targets = Some(v);
        self
    }

    pub fn ritual(mut self) -> Self {
        self.is_ritual = true;
        self
    }

    pub fn requires_concentration(mut self) -> Self {
        self.requires_concentration = true;
        self
    }

    pub fn upcastable(mut self) -> Self {
        self.upcastable = true;
        self
    }

    pub fn build(self, cast: CastFn) -> CastSpell {
        CastSpell {
            spell: Spell {
                id: self.id,
                level: self.level,
                casting_time: self.casting_time,
                range: self.range,
                duration: self.duration,
                components: self.components,
                target_type: self.target_type,
                aoe: self.aoe,
                max_targets: self.max_targets,
                is_ritual: self.is_ritual,
                requires_concentration: self.requires_concentration,
                upcastable: self.upcastable,
            },
            cast,
        }
    }
}
