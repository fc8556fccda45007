//! The static, process-wide registry of [`ConditionDefinition`]s (component D). Read-mostly
//! after startup; tests construct their own isolated [`ConditionRegistry`] instead of
//! sharing the crate-level default so fixtures don't bleed between test functions.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

use crate::condition::{ConditionEffect, EffectKind, EffectTarget};
use crate::error::{EngineError, Result};

/// Static rules for a `type_tag`: what effects it installs, what it implies (`includes`),
/// what it blocks (`immunities`), and what it silences (`suppresses`).
#[derive(Debug, Clone, Default)]
pub struct ConditionDefinition {
    pub type_tag: String,
    pub name: String,
    pub description: String,
    pub effects: Vec<ConditionEffect>,
    pub includes: Vec<String>,
    pub immunities: Vec<String>,
    pub suppresses: Vec<String>,
}

impl ConditionDefinition {
    pub fn new(type_tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            name: name.into(),
            description: String::new(),
            effects: Vec::new(),
            includes: Vec::new(),
            immunities: Vec::new(),
            suppresses: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_effect(mut self, effect: ConditionEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn includes(mut self, type_tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.includes.extend(type_tags.into_iter().map(Into::into));
        self
    }

    pub fn immune_to(mut self, type_tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.immunities.extend(type_tags.into_iter().map(Into::into));
        self
    }

    pub fn suppresses(mut self, type_tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suppresses.extend(type_tags.into_iter().map(Into::into));
        self
    }
}

/// The dynamic effect table for the level-based `exhaustion` composite (§3.8). Levels 1-6,
/// cumulative; level 5 overrides the level-2 half-speed with speed-zero, level 6 is a
/// terminal signal the core never acts on beyond exposing it via
/// `ExhaustionManager::check_death`.
pub fn exhaustion_effects(level: i32) -> Vec<ConditionEffect> {
    let mut effects = Vec::new();
    if level >= 1 {
        effects.push(ConditionEffect::new(EffectKind::Disadvantage, EffectTarget::AbilityChecks));
    }
    if level >= 2 && level < 5 {
        effects.push(ConditionEffect::new(EffectKind::SpeedReduction, EffectTarget::Movement).with_value(0.5));
    }
    if level >= 3 {
        effects.push(ConditionEffect::new(EffectKind::Disadvantage, EffectTarget::AttackRolls));
        effects.push(ConditionEffect::new(EffectKind::Disadvantage, EffectTarget::Saves));
    }
    if level >= 4 {
        effects.push(ConditionEffect::new(EffectKind::MaxHpReduction, EffectTarget::Damage).with_value(0.5));
    }
    if level >= 5 {
        effects.push(ConditionEffect::new(EffectKind::SpeedZero, EffectTarget::Movement));
    }
    if level >= 6 {
        effects.push(ConditionEffect::new(EffectKind::AutoFail, EffectTarget::Saves));
    }
    effects
}

/// Process-wide map `type_tag -> ConditionDefinition`. `register` rejects a definition whose
/// `includes` would introduce a cycle (including self-inclusion) without mutating the table.
#[derive(Debug, Default)]
pub struct ConditionRegistry {
    definitions: HashMap<String, ConditionDefinition>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: ConditionDefinition) -> Result<()> {
        let type_tag = def.type_tag.clone();
        let mut probe = self.definitions.clone();
        probe.insert(type_tag.clone(), def.clone());
        if has_cycle(&probe, &type_tag) {
            return Err(EngineError::validation(format!(
                "registering `{type_tag}` would introduce a cycle in `includes`"
            )));
        }
        self.definitions.insert(type_tag, def);
        Ok(())
    }

    pub fn get(&self, type_tag: &str) -> Option<&ConditionDefinition> {
        self.definitions.get(type_tag)
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.definitions.contains_key(type_tag)
    }

    /// The effects a condition of `type_tag` at `level` should install. `exhaustion` is
    /// computed dynamically from its level; every other condition uses its definition's
    /// static effect list verbatim.
    pub fn effects_for(&self, type_tag: &str, level: Option<i32>) -> Vec<ConditionEffect> {
        if type_tag == "exhaustion" {
            return exhaustion_effects(level.unwrap_or(0));
        }
        self.get(type_tag).map(|def| def.effects.clone()).unwrap_or_default()
    }
}

fn has_cycle(defs: &HashMap<String, ConditionDefinition>, start: &str) -> bool {
    fn visit(
        defs: &HashMap<String, ConditionDefinition>,
        node: &str,
        visiting: &mut HashSet<String>,
        done: &mut HashSet<String>,
    ) -> bool {
        if done.contains(node) {
            return false;
        }
        if !visiting.insert(node.to_string()) {
            return true;
        }
        if let Some(def) = defs.get(node) {
            for child in &def.includes {
                if visit(defs, child, visiting, done) {
                    return true;
                }
            }
        }
        visiting.remove(node);
        done.insert(node.to_string());
        false
    }

    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    visit(defs, start, &mut visiting, &mut done)
}

/// The crate-level default registry, used by convenience constructors that don't care about
/// test isolation. Hosts that need isolated fixtures should build their own
/// [`ConditionRegistry`] instead of reaching for this.
static DEFAULT_REGISTRY: OnceLock<Mutex<ConditionRegistry>> = OnceLock::new();

pub fn default_registry() -> &'static Mutex<ConditionRegistry> {
    DEFAULT_REGISTRY.get_or_init(|| Mutex::new(ConditionRegistry::new()))
}
