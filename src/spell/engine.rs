//! The Spell Cast Engine (component J): orchestrates a single `cast`, threading the
//! publish/run/publish sequence of §4.10 and, for concentration spells, handing off to the
//! Relationship Manager. Concentration checks are exposed as explicit methods the host calls
//! when it forwards `damage.taken`/`concentration.broken` through its own dispatch loop,
//! rather than the engine subscribing itself: a `'static` closure capturing long-lived
//! `&mut ConditionManager`/`&mut RelationshipManager` references isn't expressible without
//! `Rc<RefCell<_>>`, which is foreign to this crate's ownership style.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::condition::manager::ConditionManager;
use crate::condition::registry::ConditionRegistry;
use crate::condition::{Condition, ConditionSource};
use crate::duration::Duration;
use crate::error::{EngineError, Result};
use crate::event::bus::EventBus;
use crate::event::{Event, Value};
use crate::ids::{ConditionId, EntityId};
use crate::metadata::Metadata;
use crate::relationship::{RelationshipKind, RelationshipManager};
use crate::spell::slots::SpellSlotPool;
use crate::spell::{CastContext, CastFn, Spell};

/// Tracks which caster is currently concentrating on which condition, so
/// [`SpellCastEngine::on_damage_taken`] knows whether a victim of damage is a concentrator
/// worth checking at all.
#[derive(Default)]
pub struct SpellCastEngine {
    concentrators: HashMap<EntityId, ConditionId>,
}

impl SpellCastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_concentrating(&self, caster: &EntityId) -> bool {
        self.concentrators.contains_key(caster)
    }

    /// Runs the §4.10 cast sequence: validate slot level, consume a slot if a pool was
    /// supplied, publish attempt/start, run the spell's own logic, publish complete or failed,
    /// and (if `requires_concentration`) start the concentration relationship the spell's
    /// closure bound via [`CastContext::bind_concentration`]. All manager handles the engine
    /// needs beyond `spell`/`cast_fn`/`slots` come from `ctx` itself (see its doc comment for
    /// why), so this never needs a separate `conditions`/`bus` argument.
    pub fn cast(
        &mut self,
        spell: &Spell,
        cast_fn: &CastFn,
        ctx: &mut CastContext,
        slots: Option<&mut SpellSlotPool>,
    ) -> Result<()> {
        if ctx.slot_level < spell.level {
            return Err(EngineError::validation(format!(
                "slot level {} is below spell level {}",
                ctx.slot_level, spell.level
            )));
        }

        if let Some(slots) = slots {
            slots.use_slot(ctx.slot_level, ctx.bus)?;
        }

        ctx.bus
            .publish_and_discard(
                Event::new("spell.cast.attempt")
                    .with_source_id(ctx.caster.clone())
                    .with_context("spell", Value::String(spell.id.clone()))
                    .with_context("slot_level", Value::Int(ctx.slot_level as i64)),
            )
            .ok();
        ctx.bus
            .publish_and_discard(
                Event::new("spell.cast.start")
                    .with_source_id(ctx.caster.clone())
                    .with_context("spell", Value::String(spell.id.clone())),
            )
            .ok();

        if let Err(e) = cast_fn(ctx) {
            warn!(spell = %spell.id, caster = %ctx.caster, error = %e, "spell cast failed");
            ctx.bus
                .publish_and_discard(
                    Event::new("spell.cast.failed")
                        .with_source_id(ctx.caster.clone())
                        .with_context("spell", Value::String(spell.id.clone()))
                        .with_context("reason", Value::String(e.to_string())),
                )
                .ok();
            return Err(e);
        }

        info!(spell = %spell.id, caster = %ctx.caster, "spell cast");
        ctx.bus
            .publish_and_discard(
                Event::new("spell.cast.complete")
                    .with_source_id(ctx.caster.clone())
                    .with_context("spell", Value::String(spell.id.clone())),
            )
            .ok();

        if spell.requires_concentration {
            if let Some(condition_id) = ctx.concentration_condition() {
                let caster = ctx.caster.clone();
                if let (Some(conditions), Some(registry), Some(relationships)) =
                    (ctx.conditions.as_deref_mut(), ctx.registry, ctx.relationships.as_deref_mut())
                {
                    relationships.create(
                        conditions,
                        registry,
                        ctx.bus,
                        RelationshipKind::Concentration,
                        caster.clone(),
                        vec![condition_id],
                        Metadata::new(),
                    )?;
                    self.concentrators.insert(caster, condition_id);
                }
            }
        }

        Ok(())
    }

    /// Host calls this when forwarding a `damage.taken` event through its own dispatch: if the
    /// event's target is concentrating, publishes `concentration.check { dc = max(10,
    /// damage/2) }` per §8 scenario S5.
    pub fn on_damage_taken(&self, event: &Event, bus: &mut EventBus) {
        let Some(target) = &event.target else { return };
        if !self.is_concentrating(target) {
            return;
        }
        let damage = event.context.get_int("damage").unwrap_or(0);
        let dc = std::cmp::max(10, damage / 2);
        bus.publish_and_discard(
            Event::new("concentration.check")
                .with_source_id(target.clone())
                .with_context("dc", Value::Int(dc)),
        )
        .ok();
    }

    /// Host calls this when forwarding a `concentration.broken` event: tears down the
    /// concentrator's relationship (and therefore its dependent conditions) and clears the
    /// bookkeeping.
    pub fn on_concentration_broken(
        &mut self,
        caster: &EntityId,
        conditions: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        relationships: &mut RelationshipManager,
    ) {
        self.concentrators.remove(caster);
        if let Some(rel) = relationships.concentration_for(caster).map(|r| r.id) {
            relationships.break_relationship(conditions, registry, bus, rel);
        }
    }
}

/// Convenience for the common "concentration condition applied, then bound" sequence a
/// concentration spell's `cast` closure follows: build a condition tagged
/// `metadata["concentration"]=true`, apply it, and bind it to the context so the engine can
/// start the relationship once `cast` returns.
pub fn apply_concentration_condition(
    ctx: &mut CastContext,
    type_tag: &str,
    duration: Duration,
) -> Result<ConditionId> {
    let Some(target) = ctx.targets.first().cloned() else {
        return Err(EngineError::validation("concentration spell has no target to apply its condition to"));
    };
    let caster = ctx.caster.clone();

    let conditions = ctx
        .conditions
        .as_deref_mut()
        .ok_or_else(|| EngineError::validation("concentration spells require CastContext::with_conditions"))?;
    let registry = ctx
        .registry
        .ok_or_else(|| EngineError::validation("concentration spells require CastContext::with_conditions"))?;

    let id = conditions.next_id();
    let condition = Condition::builder(id, crate::ids::Ref::new("core", "condition", type_tag), target)
        .source(ConditionSource::Entity(caster))
        .duration(duration)
        .metadata(Metadata::new().with("concentration", true))
        .build()?;

    let id = conditions.apply_condition(registry, ctx.bus, condition)?;
    ctx.bind_concentration(id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::registry::ConditionDefinition;
    use crate::spell::CastContext;

    #[test]
    fn casting_below_slot_level_fails_validation() {
        let mut engine = SpellCastEngine::new();
        let spell = Spell::builder("fireball", 3).build(Box::new(|_ctx| Ok(()))).spell;
        let mut bus = EventBus::new();
        let cast_fn: CastFn = Box::new(|_ctx| Ok(()));
        let mut ctx = CastContext::new("wizard", vec![EntityId::new("dummy")], 1, &mut bus);

        let result = engine.cast(&spell, &cast_fn, &mut ctx, None);
        assert!(result.is_err());
    }

    #[test]
    fn concentration_spell_starts_relationship_and_damage_check_reports_dc() {
        let mut registry = ConditionRegistry::new();
        registry.register(ConditionDefinition::new("hold_person", "Hold Person")).unwrap();
        let mut conditions = ConditionManager::new();
        let mut relationships = RelationshipManager::new();
        let mut bus = EventBus::new();
        let mut engine = SpellCastEngine::new();

        let spell = Spell::builder("hold_person", 2).requires_concentration().build(Box::new(|_ctx| Ok(()))).spell;
        let cast_fn: CastFn = Box::new(|ctx: &mut CastContext| {
            apply_concentration_condition(ctx, "hold_person", Duration::Permanent)?;
            Ok(())
        });

        let caster = EntityId::new("wizard");
        let target = EntityId::new("goblin");
        {
            let mut ctx = CastContext::new(caster.clone(), vec![target.clone()], 2, &mut bus)
                .with_conditions(&mut conditions, &registry)
                .with_relationships(&mut relationships);

            engine.cast(&spell, &cast_fn, &mut ctx, None).unwrap();
        }

        assert!(engine.is_concentrating(&caster));
        assert!(relationships.concentration_for(&caster).is_some());

        let damage_event = Event::new("damage.taken").with_target_id(caster.clone()).with_context("damage", Value::Int(12));
        engine.on_damage_taken(&damage_event, &mut bus);

        engine.on_concentration_broken(&caster, &mut conditions, &registry, &mut bus, &mut relationships);
        assert!(!engine.is_concentrating(&caster));
        assert!(relationships.concentration_for(&caster).is_none());
        assert!(!conditions.has(&target, "hold_person"));
    }
}
