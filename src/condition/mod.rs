//! Conditions: durable statuses on an entity that modify gameplay by subscribing to the
//! event bus. A [`Condition`] is pure data plus an [`EffectCore`] for lifecycle tracking;
//! [`engine`] is what translates a condition's declared effects (from its
//! [`registry::ConditionDefinition`]) into actual subscriptions, and [`manager`] is what
//! entities and games talk to.

pub mod engine;
pub mod manager;
pub mod registry;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::duration::Duration;
use crate::effect::EffectCore;
use crate::error::{EngineError, Result};
use crate::ids::{ConditionId, EntityId, Ref};
use crate::metadata::Metadata;

/// Where a condition came from. Most conditions are sourced by the entity that caused them
/// (a caster, a trap, the environment); a condition synthesized because its parent's
/// [`registry::ConditionDefinition::includes`] named it is instead sourced by the parent
/// condition, so the manager can tell "my own copy of incapacitated" from "incapacitated
/// inherited from paralyzed" apart when deciding replacement semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionSource {
    Entity(EntityId),
    Condition(ConditionId),
}

impl ConditionSource {
    pub fn entity(id: impl Into<EntityId>) -> Self {
        ConditionSource::Entity(id.into())
    }

    pub fn as_entity(&self) -> Option<&EntityId> {
        match self {
            ConditionSource::Entity(e) => Some(e),
            ConditionSource::Condition(_) => None,
        }
    }
}

impl std::fmt::Display for ConditionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionSource::Entity(e) => write!(f, "{e}"),
            ConditionSource::Condition(c) => write!(f, "{c}_include"),
        }
    }
}

/// The effect kinds a [`registry::ConditionEffect`] can declare. Closed enum matched by the
/// condition engine rather than dispatched through a trait object, per the spec's
/// re-architecture note on dynamic effect-handler dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Advantage,
    Disadvantage,
    AutoFail,
    SpeedZero,
    SpeedReduction,
    Incapacitated,
    NoReactions,
    Resistance,
    Vulnerability,
    Immunity,
    MaxHpReduction,
    DropItems,
    CantSpeak,
    CantHear,
    CantSee,
}

impl EffectKind {
    /// Priority a handler installed for this kind runs at: `auto_fail` first (50) so it
    /// precedes roll computation, `immunity` last (200) so it overrides resistance, and
    /// everything else in the middle (100).
    pub fn priority(&self) -> i32 {
        match self {
            EffectKind::AutoFail => 50,
            EffectKind::Immunity => 200,
            _ => 100,
        }
    }
}

/// Which event class/role an effect applies to. `AttacksAgainst` and `AttackRolls` both
/// watch `attack.roll` but check opposite roles (target vs. source); `StrSaves`/`DexSaves`
/// additionally gate on the event's `save_type` context key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectTarget {
    AttackRolls,
    AttacksAgainst,
    Saves,
    StrSaves,
    DexSaves,
    AbilityChecks,
    Movement,
    Actions,
    Reactions,
    Damage,
    Sight,
    Hearing,
}

/// A single declared modification a [`registry::ConditionDefinition`] wants installed when
/// one of its conditions is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionEffect {
    pub kind: EffectKind,
    pub target: EffectTarget,
    /// Used by `speed_reduction` (multiplicative factor) and `max_hp_reduction` (flat
    /// amount); ignored by kinds that don't carry a magnitude.
    pub value: Option<f64>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ConditionEffect {
    pub fn new(kind: EffectKind, target: EffectTarget) -> Self {
        Self { kind, target, value: None, metadata: Metadata::new() }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

/// A durable status on an entity. Built through [`ConditionBuilder`] or restored from JSON
/// via [`ConditionRecord`]; applied and removed only through [`manager::ConditionManager`],
/// which is the sole owner of its subscription lifetime (via the embedded [`EffectCore`]).
#[derive(Debug)]
pub struct Condition {
    pub id: ConditionId,
    pub reference: Ref,
    pub type_tag: String,
    pub target: EntityId,
    pub source: ConditionSource,
    pub duration: Duration,
    pub save_dc: Option<i32>,
    pub level: Option<i32>,
    pub metadata: Metadata,
    pub(crate) core: EffectCore,
}

impl Condition {
    pub fn builder(id: ConditionId, reference: Ref, target: impl Into<EntityId>) -> ConditionBuilder {
        ConditionBuilder::new(id, reference, target)
    }

    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    pub fn subscription_count(&self) -> usize {
        self.core.subscription_count()
    }

    pub fn is_concentration(&self) -> bool {
        self.metadata.get_bool("concentration").unwrap_or(false)
    }

    /// Serializes this condition to the JSON shape described by the load/save contract:
    /// `ref` plus the optional fields a persisted blob may carry.
    pub fn to_record(&self) -> ConditionRecord {
        ConditionRecord {
            reference: self.reference.to_string(),
            name: None,
            description: None,
            source: match &self.source {
                ConditionSource::Entity(e) => Some(e.to_string()),
                ConditionSource::Condition(c) => Some(c.to_string()),
            },
            target_id: Some(self.target.to_string()),
            is_active: self.is_active(),
            level: self.level,
            metadata: self.metadata.clone(),
        }
    }
}

/// Builder for [`Condition`]. `id` is caller-supplied (minted by whichever
/// [`crate::ids::IdGenerator`] owns condition ids, normally
/// [`manager::ConditionManager::next_id`]) rather than generated implicitly, so tests and
/// hosts control identity explicitly.
pub struct ConditionBuilder {
    id: ConditionId,
    reference: Ref,
    target: EntityId,
    source: Option<ConditionSource>,
    duration: Duration,
    save_dc: Option<i32>,
    level: Option<i32>,
    metadata: Metadata,
}

impl ConditionBuilder {
    fn new(id: ConditionId, reference: Ref, target: impl Into<EntityId>) -> Self {
        Self {
            id,
            reference,
            target: target.into(),
            source: None,
            duration: Duration::Permanent,
            save_dc: None,
            level: None,
            metadata: Metadata::new(),
        }
    }

    pub fn source(mut self, source: ConditionSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn source_entity(mut self, entity: impl Into<EntityId>) -> Self {
        self.source = Some(ConditionSource::Entity(entity.into()));
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn save_dc(mut self, dc: i32) -> Self {
        self.save_dc = Some(dc);
        self
    }

    pub fn level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn build(self) -> Result<Condition> {
        let Some(source) = self.source else {
            return Err(EngineError::validation("condition requires a source"));
        };
        if let Some(level) = self.level {
            if !(1..=6).contains(&level) {
                return Err(EngineError::validation(format!(
                    "condition level must be in 1..=6, got {level}"
                )));
            }
        }
        let type_tag = self.reference.id.clone();
        Ok(Condition {
            id: self.id,
            reference: self.reference,
            type_tag: type_tag.clone(),
            target: self.target,
            source,
            duration: self.duration,
            save_dc: self.save_dc,
            level: self.level,
            metadata: self.metadata,
            core: EffectCore::new(self.id.0, type_tag, None),
        })
    }
}

/// The JSON shape a persisted condition round-trips through (§6.4). Required: `ref`.
/// Everything else is optional and free-form; an implementation never invents fields it
/// doesn't recognise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRecord {
    #[serde(rename = "ref")]
    pub reference: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub target_id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub level: Option<i32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ConditionRecord {
    pub fn to_json(&self) -> Result<Json> {
        serde_json::to_value(self).map_err(|e| EngineError::InvalidJson(e.to_string()))
    }

    pub fn from_json(value: Json) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| EngineError::InvalidJson(e.to_string()))
    }

    pub fn parsed_ref(&self) -> Result<Ref> {
        Ref::parse(&self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConditionId;

    fn poisoned_ref() -> Ref {
        Ref::new("dnd5e", "condition", "poisoned")
    }

    #[test]
    fn builder_requires_a_source() {
        let err = Condition::builder(ConditionId(1), poisoned_ref(), "hero").build();
        assert!(matches!(err, Err(EngineError::ValidationError { .. })));
    }

    #[test]
    fn builder_rejects_out_of_range_level() {
        let err = Condition::builder(ConditionId(1), poisoned_ref(), "hero")
            .source_entity("villain")
            .level(9)
            .build();
        assert!(matches!(err, Err(EngineError::ValidationError { .. })));
    }

    #[test]
    fn record_round_trips_the_ref_and_metadata() {
        let condition = Condition::builder(ConditionId(1), poisoned_ref(), "hero")
            .source_entity("villain")
            .metadata(Metadata::new().with("escape_dc", 12_i64))
            .build()
            .unwrap();

        let record = condition.to_record();
        let json = record.to_json().unwrap();
        let back = ConditionRecord::from_json(json).unwrap();
        assert_eq!(back.parsed_ref().unwrap(), poisoned_ref());
        assert_eq!(back.metadata.get_int("escape_dc"), Some(12));
    }
}
