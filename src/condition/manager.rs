//! The Condition Manager (component F): the per-entity condition set, immunity and
//! suppression bookkeeping, included-composite handling, and the `exhaustion` level helper.
//! This is the component most callers talk to; it owns [`Condition`] records and is the only
//! thing allowed to mutate them (callers get `&Condition` back from queries).

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::condition::engine;
use crate::condition::registry::ConditionRegistry;
use crate::condition::{Condition, ConditionSource};
use crate::error::{Aggregated, EngineError, Result};
use crate::event::bus::EventBus;
use crate::event::{Event, Value};
use crate::ids::{ConditionId, EntityId, IdGenerator};

/// Reported to a [`ConditionLifecycleObserver`] after a condition is removed, so a loosely
/// coupled component (the relationship manager) can react without the condition manager
/// needing to own or know about it.
#[derive(Debug, Clone)]
pub struct ConditionRemoval {
    pub id: ConditionId,
    pub target: EntityId,
    pub type_tag: String,
    pub reason: String,
}

/// Observer notified when a condition is removed, regardless of why (explicit removal,
/// duration expiry, replacement, included-child cleanup). The relationship manager
/// implements this to keep concentration/aura/linked bookkeeping in sync without the
/// condition manager needing a dependency on it.
pub trait ConditionLifecycleObserver {
    fn on_condition_removed(&mut self, removal: &ConditionRemoval);
}

/// Per-entity condition bookkeeping, process-local. `suppressed` maps a suppressor's id to
/// the set of condition ids it is currently silencing; `included_children` maps a parent
/// condition's id to the ids it synthesized via its definition's `includes` list, so removal
/// can tear the whole tree down.
#[derive(Default)]
pub struct ConditionManager {
    conditions: HashMap<EntityId, HashMap<ConditionId, Condition>>,
    immunities: HashMap<EntityId, HashSet<String>>,
    suppressed: HashMap<ConditionId, HashSet<ConditionId>>,
    included_children: HashMap<ConditionId, Vec<ConditionId>>,
    ids: IdGenerator,
}

impl ConditionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> ConditionId {
        ConditionId(self.ids.next())
    }

    pub fn has(&self, target: &EntityId, type_tag: &str) -> bool {
        self.conditions
            .get(target)
            .map(|m| m.values().any(|c| c.type_tag == type_tag))
            .unwrap_or(false)
    }

    pub fn get_all(&self, target: &EntityId) -> Vec<&Condition> {
        self.conditions.get(target).map(|m| m.values().collect()).unwrap_or_default()
    }

    pub fn get_by_type(&self, target: &EntityId, type_tag: &str) -> Vec<&Condition> {
        self.get_all(target).into_iter().filter(|c| c.type_tag == type_tag).collect()
    }

    pub fn get(&self, target: &EntityId, id: ConditionId) -> Option<&Condition> {
        self.conditions.get(target)?.get(&id)
    }

    /// True if `target` is immune to `type_tag`, either by an explicitly recorded immunity
    /// or because an active condition's own definition declares `type_tag` among its
    /// `immunities` (a stronger condition blocking a weaker one, e.g. `paralyzed` blocking
    /// `frightened`).
    pub fn is_immune(&self, registry: &ConditionRegistry, target: &EntityId, type_tag: &str) -> bool {
        if self.immunities.get(target).map(|s| s.contains(type_tag)).unwrap_or(false) {
            return true;
        }
        self.get_all(target).iter().any(|c| {
            c.is_active()
                && registry
                    .get(&c.type_tag)
                    .map(|def| def.immunities.iter().any(|t| t == type_tag))
                    .unwrap_or(false)
        })
    }

    pub fn add_immunity(&mut self, target: EntityId, type_tag: impl Into<String>) {
        self.immunities.entry(target).or_default().insert(type_tag.into());
    }

    pub fn remove_immunity(&mut self, target: &EntityId, type_tag: &str) {
        if let Some(set) = self.immunities.get_mut(target) {
            set.remove(type_tag);
        }
    }

    pub fn get_exhaustion_level(&self, target: &EntityId) -> Option<i32> {
        self.get_by_type(target, "exhaustion").first().and_then(|c| c.level)
    }

    pub fn is_suppressed(&self, id: ConditionId) -> bool {
        self.suppressed.values().any(|set| set.contains(&id))
    }

    /// Finds which entity owns condition `id`, for callers (the relationship manager) that
    /// only have the id on hand. Not indexed: acceptable because relationship teardown only
    /// ever does this for a handful of conditions per call.
    pub fn owner_of(&self, id: ConditionId) -> Option<EntityId> {
        self.conditions
            .iter()
            .find(|(_, conditions)| conditions.contains_key(&id))
            .map(|(entity, _)| entity.clone())
    }

    /// Applies `condition`, following the spec's six-step protocol: immunity checks,
    /// same-type replacement, suppression of weaker conditions, synthesis of `includes`
    /// children, subscription installation, and the `condition.applied` event.
    pub fn apply_condition(
        &mut self,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        condition: Condition,
    ) -> Result<ConditionId> {
        let target = condition.target.clone();
        let type_tag = condition.type_tag.clone();

        if self.is_immune(registry, &target, &type_tag) {
            warn!(target = %target, type_tag = %type_tag, "application refused: target is immune");
            return Err(EngineError::Immune { type_tag });
        }

        if let Some(existing) = self
            .conditions
            .get(&target)
            .and_then(|m| m.values().find(|c| c.type_tag == type_tag))
        {
            if existing.id == condition.id && existing.source == condition.source {
                return Ok(existing.id);
            }
            if existing.source != condition.source {
                let existing_id = existing.id;
                self.remove_condition(registry, bus, &target, existing_id, "replaced");
            }
        }

        let id = condition.id;
        let definition = registry.get(&type_tag).cloned();

        if let Some(def) = &definition {
            for suppressed_tag in &def.suppresses {
                let victims: Vec<ConditionId> = self
                    .get_by_type(&target, suppressed_tag)
                    .iter()
                    .filter(|c| c.is_active())
                    .map(|c| c.id)
                    .collect();
                for victim_id in victims {
                    if let Some(c) = self.conditions.get_mut(&target).and_then(|m| m.get_mut(&victim_id)) {
                        engine::remove(c, bus);
                    }
                    self.suppressed.entry(id).or_default().insert(victim_id);
                }
            }
        }

        let mut condition = condition;
        engine::apply(&mut condition, definition.as_ref(), bus);
        self.conditions.entry(target.clone()).or_default().insert(id, condition);

        if let Some(def) = &definition {
            let mut children = Vec::new();
            for include_tag in def.includes.clone() {
                // An included type_tag already active on the target (from any source) is
                // left alone rather than replaced: the composing condition (e.g. `paralyzed`
                // including `incapacitated`) is satisfied by the condition that's already
                // there, so no duplicate is created and no parent-child link is recorded for
                // it. Removing the composing condition later therefore never touches it.
                if self.has(&target, &include_tag) {
                    continue;
                }
                let child_id = ConditionId(self.ids.next());
                let child_ref = crate::ids::Ref::new("core", "condition", &include_tag);
                let build = crate::condition::Condition::builder(child_id, child_ref, target.clone())
                    .source(ConditionSource::Condition(id))
                    .build();
                if let Ok(child) = build {
                    if let Ok(child_id) = self.apply_condition(registry, bus, child) {
                        children.push(child_id);
                    }
                }
            }
            if !children.is_empty() {
                self.included_children.insert(id, children);
            }
        }

        info!(target = %target, type_tag = %type_tag, condition = ?id, "condition applied");
        bus.publish_and_discard(
            Event::new("condition.applied")
                .with_target_id(target)
                .with_context("type_tag", Value::String(type_tag)),
        )
        .ok();

        Ok(id)
    }

    /// Removes `id` from `target`: unsubscribes its handlers, tears down any children it
    /// synthesized via `includes`, reactivates anything it was suppressing, publishes
    /// `condition.removed`, and (if `observer` is supplied) notifies it so relationships can
    /// react. Best-effort: failures during the sweep are collected, not fatal.
    pub fn remove_condition(
        &mut self,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        target: &EntityId,
        id: ConditionId,
        reason: &str,
    ) -> Aggregated<()> {
        self.remove_condition_observed(registry, bus, target, id, reason, None)
    }

    pub fn remove_condition_observed(
        &mut self,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        target: &EntityId,
        id: ConditionId,
        reason: &str,
        mut observer: Option<&mut dyn ConditionLifecycleObserver>,
    ) -> Aggregated<()> {
        let mut errors = Vec::new();

        let Some(mut condition) = self.conditions.get_mut(target).and_then(|m| m.remove(&id)) else {
            return Aggregated::ok(());
        };
        let type_tag = condition.type_tag.clone();

        let result = engine::remove(&mut condition, bus);
        errors.extend(result.errors);

        if let Some(children) = self.included_children.remove(&id) {
            for child_id in children {
                let sub = self.remove_condition(registry, bus, target, child_id, "parent removed");
                errors.extend(sub.errors);
            }
        }

        if let Some(victims) = self.suppressed.remove(&id) {
            for victim_id in victims {
                if let Some(c) = self.conditions.get_mut(target).and_then(|m| m.get_mut(&victim_id)) {
                    let definition = registry.get(&c.type_tag).cloned();
                    engine::apply(c, definition.as_ref(), bus);
                }
            }
        }

        info!(target = %target, type_tag = %type_tag, condition = ?id, reason, "condition removed");
        bus.publish_and_discard(
            Event::new("condition.removed")
                .with_target_id(target.clone())
                .with_context("type_tag", Value::String(type_tag.clone()))
                .with_context("reason", Value::String(reason.to_string())),
        )
        .ok();

        if let Some(observer) = observer.as_deref_mut() {
            observer.on_condition_removed(&ConditionRemoval {
                id,
                target: target.clone(),
                type_tag,
                reason: reason.to_string(),
            });
        }

        Aggregated { value: (), errors }
    }

    /// Consults every active condition's [`crate::duration::Duration`] against `event` and
    /// removes whichever ones report expiry, completing the data flow in §2: "Durations →
    /// expire → Condition Manager.remove". The host is responsible for calling this once per
    /// dispatched event (typically right after `bus.publish`), matching the explicit,
    /// host-driven style used for concentration checks elsewhere in this crate rather than a
    /// self-subscribed handler: a condition's own duration expiring must be able to remove
    /// that same condition without re-entering the dispatch that is still unwinding.
    pub fn check_durations(
        &mut self,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        event: &Event,
        mut observer: Option<&mut dyn ConditionLifecycleObserver>,
    ) -> Aggregated<()> {
        let mut expired: Vec<(EntityId, ConditionId)> = Vec::new();
        for (target, conditions) in self.conditions.iter_mut() {
            for (id, condition) in conditions.iter_mut() {
                if condition.duration.is_expired(event) {
                    expired.push((target.clone(), *id));
                }
            }
        }

        let mut errors = Vec::new();
        for (target, id) in expired {
            let result = self.remove_condition_observed(
                registry,
                bus,
                &target,
                id,
                "duration expired",
                observer.as_deref_mut(),
            );
            errors.extend(result.errors);
        }
        Aggregated { value: (), errors }
    }
}

/// Adjusts exhaustion levels for a target. Level is clamped to `0..=6`; re-application
/// always removes the active exhaustion condition and re-applies a fresh one at the new
/// level rather than mutating it in place, per §3.8 (mutation would leave stale
/// subscriptions installed for the old level's effect set).
pub struct ExhaustionManager;

impl ExhaustionManager {
    /// Adds `levels` to `target`'s exhaustion (clamped to 6; a no-op if already at 6) and
    /// records `source` for bookkeeping.
    pub fn add(
        manager: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        target: impl Into<EntityId>,
        levels: i32,
        source: impl Into<String>,
    ) -> Result<ConditionId> {
        let target = target.into();
        let current = manager.get_exhaustion_level(&target).unwrap_or(0);
        if current >= 6 {
            let id = manager
                .get_by_type(&target, "exhaustion")
                .first()
                .map(|c| c.id)
                .expect("level 6 implies an active exhaustion condition");
            return Ok(id);
        }
        let new_level = (current + levels).clamp(0, 6);
        Self::set_level(manager, registry, bus, target, new_level, source)
    }

    /// Removes `levels` from `target`'s exhaustion, clamped to 0.
    pub fn remove(
        manager: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        target: impl Into<EntityId>,
        levels: i32,
    ) -> Result<Option<ConditionId>> {
        let target = target.into();
        let current = manager.get_exhaustion_level(&target).unwrap_or(0);
        let new_level = (current - levels).max(0);
        if new_level == 0 {
            if let Some(existing) = manager.get_by_type(&target, "exhaustion").first().map(|c| c.id) {
                manager.remove_condition(registry, bus, &target, existing, "exhaustion cleared");
            }
            return Ok(None);
        }
        Self::set_level(manager, registry, bus, target, new_level, "exhaustion_removed").map(Some)
    }

    pub fn clear(manager: &mut ConditionManager, registry: &ConditionRegistry, bus: &mut EventBus, target: &EntityId) {
        if let Some(existing) = manager.get_by_type(target, "exhaustion").first().map(|c| c.id) {
            manager.remove_condition(registry, bus, target, existing, "exhaustion cleared");
        }
    }

    /// `long_rest` reduces exhaustion by one level; `short_rest` does nothing, matching the
    /// 5e-style rest rules this core is agnostic to but whose trigger vocabulary it shares
    /// with the spell slot pool's restoration triggers.
    pub fn apply_on_rest(
        manager: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        target: impl Into<EntityId>,
        kind: &str,
    ) -> Result<Option<ConditionId>> {
        match kind {
            "long_rest" => Self::remove(manager, registry, bus, target, 1),
            _ => Ok(None),
        }
    }

    /// Whether `target` has reached the terminal exhaustion level. Reaching it raises no
    /// signal beyond the normal `condition.applied` event; a `death` consequence is the
    /// consuming game's responsibility, per the out-of-scope boundary around rulebook logic.
    pub fn check_death(manager: &ConditionManager, target: &EntityId) -> bool {
        manager.get_exhaustion_level(target) == Some(6)
    }

    fn set_level(
        manager: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        target: EntityId,
        level: i32,
        source: impl Into<String>,
    ) -> Result<ConditionId> {
        if let Some(existing) = manager.get_by_type(&target, "exhaustion").first().map(|c| c.id) {
            manager.remove_condition(registry, bus, &target, existing, "exhaustion level changed");
        }
        let id = manager.next_id();
        let condition = crate::condition::Condition::builder(
            id,
            crate::ids::Ref::new("core", "condition", "exhaustion"),
            target,
        )
        .source_entity(source.into())
        .level(level)
        .build()?;
        manager.apply_condition(registry, bus, condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::registry::ConditionDefinition;
    use crate::condition::{ConditionEffect, EffectKind, EffectTarget};
    use crate::ids::Ref;

    fn poisoned_def() -> ConditionDefinition {
        ConditionDefinition::new("poisoned", "Poisoned")
            .with_effect(ConditionEffect::new(EffectKind::Disadvantage, EffectTarget::AttackRolls))
    }

    #[test]
    fn immunity_blocks_application_and_leaves_condition_absent() {
        let mut registry = ConditionRegistry::new();
        registry.register(poisoned_def()).unwrap();
        let mut manager = ConditionManager::new();
        let mut bus = EventBus::new();
        let hero = EntityId::new("hero");
        manager.add_immunity(hero.clone(), "poisoned");

        let id = manager.next_id();
        let condition = crate::condition::Condition::builder(id, Ref::new("dnd5e", "condition", "poisoned"), hero.clone())
            .source_entity("villain")
            .build()
            .unwrap();

        let err = manager.apply_condition(&registry, &mut bus, condition);
        assert!(matches!(err, Err(EngineError::Immune { .. })));
        assert!(!manager.has(&hero, "poisoned"));
    }

    #[test]
    fn unconscious_composes_incapacitated_and_prone() {
        let mut registry = ConditionRegistry::new();
        registry.register(ConditionDefinition::new("incapacitated", "Incapacitated")).unwrap();
        registry.register(ConditionDefinition::new("prone", "Prone")).unwrap();
        registry
            .register(ConditionDefinition::new("unconscious", "Unconscious").includes(["incapacitated", "prone"]))
            .unwrap();

        let mut manager = ConditionManager::new();
        let mut bus = EventBus::new();
        let hero = EntityId::new("hero");

        let id = manager.next_id();
        let condition = crate::condition::Condition::builder(id, Ref::new("dnd5e", "condition", "unconscious"), hero.clone())
            .source_entity("spell")
            .build()
            .unwrap();
        manager.apply_condition(&registry, &mut bus, condition).unwrap();

        assert!(manager.has(&hero, "unconscious"));
        assert!(manager.has(&hero, "incapacitated"));
        assert!(manager.has(&hero, "prone"));
        assert_eq!(manager.get_all(&hero).len(), 3);
    }

    #[test]
    fn paralyzed_suppresses_duplicate_incapacitated() {
        let mut registry = ConditionRegistry::new();
        registry.register(ConditionDefinition::new("incapacitated", "Incapacitated")).unwrap();
        registry
            .register(ConditionDefinition::new("paralyzed", "Paralyzed").includes(["incapacitated"]))
            .unwrap();

        let mut manager = ConditionManager::new();
        let mut bus = EventBus::new();
        let hero = EntityId::new("hero");

        let first_id = manager.next_id();
        let first = crate::condition::Condition::builder(first_id, Ref::new("dnd5e", "condition", "incapacitated"), hero.clone())
            .source_entity("effect_a")
            .build()
            .unwrap();
        manager.apply_condition(&registry, &mut bus, first).unwrap();

        let paralyzed_id = manager.next_id();
        let paralyzed = crate::condition::Condition::builder(paralyzed_id, Ref::new("dnd5e", "condition", "paralyzed"), hero.clone())
            .source_entity("effect_b")
            .build()
            .unwrap();
        manager.apply_condition(&registry, &mut bus, paralyzed).unwrap();

        assert_eq!(manager.get_by_type(&hero, "incapacitated").len(), 1);

        manager.remove_condition(&registry, &mut bus, &hero, paralyzed_id, "test");
        assert!(manager.has(&hero, "incapacitated"));
        let remaining = manager.get_by_type(&hero, "incapacitated");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, first_id);
    }

    #[test]
    fn exhaustion_progresses_to_six_and_reports_death() {
        let registry = ConditionRegistry::new();
        let mut manager = ConditionManager::new();
        let mut bus = EventBus::new();
        let hero = EntityId::new("hero");

        ExhaustionManager::add(&mut manager, &registry, &mut bus, hero.clone(), 5, "torture").unwrap();
        assert_eq!(manager.get_exhaustion_level(&hero), Some(5));

        ExhaustionManager::add(&mut manager, &registry, &mut bus, hero.clone(), 1, "last straw").unwrap();
        assert_eq!(manager.get_exhaustion_level(&hero), Some(6));
        assert!(ExhaustionManager::check_death(&manager, &hero));

        ExhaustionManager::add(&mut manager, &registry, &mut bus, hero.clone(), 5, "overkill").unwrap();
        assert_eq!(manager.get_exhaustion_level(&hero), Some(6));
    }

    #[test]
    fn check_durations_removes_a_condition_once_its_rounds_duration_expires() {
        let mut registry = ConditionRegistry::new();
        registry.register(poisoned_def()).unwrap();
        let mut manager = ConditionManager::new();
        let mut bus = EventBus::new();
        let hero = EntityId::new("hero");

        let id = manager.next_id();
        let condition = crate::condition::Condition::builder(id, Ref::new("dnd5e", "condition", "poisoned"), hero.clone())
            .source_entity("snake")
            .duration(crate::duration::Duration::rounds_from(2, 5))
            .build()
            .unwrap();
        manager.apply_condition(&registry, &mut bus, condition).unwrap();
        assert!(manager.has(&hero, "poisoned"));

        let round_end = |round: i64| crate::event::Event::new("round.end").with_context("round", crate::event::Value::Int(round));

        manager.check_durations(&registry, &mut bus, &round_end(6), None);
        assert!(manager.has(&hero, "poisoned"));

        manager.check_durations(&registry, &mut bus, &round_end(7), None);
        assert!(!manager.has(&hero, "poisoned"));
    }

    #[test]
    fn check_durations_removes_until_damaged_condition_only_for_its_own_target() {
        let mut registry = ConditionRegistry::new();
        registry.register(poisoned_def()).unwrap();
        let mut manager = ConditionManager::new();
        let mut bus = EventBus::new();
        let hero = EntityId::new("hero");
        let bystander = EntityId::new("bystander");

        let id = manager.next_id();
        let condition = crate::condition::Condition::builder(id, Ref::new("dnd5e", "condition", "poisoned"), hero.clone())
            .source_entity("snake")
            .duration(crate::duration::Duration::until_damaged(hero.clone()))
            .build()
            .unwrap();
        manager.apply_condition(&registry, &mut bus, condition).unwrap();

        let mut miss = crate::event::Event::new("damage.taken");
        miss.target = Some(bystander);
        manager.check_durations(&registry, &mut bus, &miss, None);
        assert!(manager.has(&hero, "poisoned"));

        let mut hit = crate::event::Event::new("damage.taken");
        hit.target = Some(hero.clone());
        manager.check_durations(&registry, &mut bus, &hit, None);
        assert!(!manager.has(&hero, "poisoned"));
    }
}
