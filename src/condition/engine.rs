//! The Condition Engine (component E): given a [`Condition`] and the
//! [`ConditionDefinition`] that governs it, installs one bus subscription per declared
//! effect. This is the "enhanced condition" of the spec's re-architecture note, expressed as
//! a function over `(Condition, ConditionDefinition)` rather than an embedding hierarchy.

use tracing::trace;

use crate::condition::registry::ConditionDefinition;
use crate::condition::{Condition, ConditionEffect, EffectKind, EffectTarget};
use crate::error::Aggregated;
use crate::event::bus::EventBus;
use crate::event::{Event, Modifier, ModifierKind, Value};
use crate::ids::EntityId;

/// Installs every effect `definition` declares (or, for `exhaustion`, every effect its level
/// implies) as a subscription tracked by `condition`'s embedded [`crate::effect::EffectCore`].
/// No-op if the condition is already active, per the Effect Core's own idempotence.
pub fn apply(condition: &mut Condition, definition: Option<&ConditionDefinition>, bus: &mut EventBus) {
    let type_tag = condition.type_tag.clone();
    let target = condition.target.clone();
    let effects = if type_tag == "exhaustion" {
        super::registry::exhaustion_effects(condition.level.unwrap_or(0))
    } else {
        definition.map(|d| d.effects.clone()).unwrap_or_default()
    };

    condition.core.apply(bus, |core, bus| {
        for effect in &effects {
            install_effect(core, bus, &type_tag, &target, effect);
        }
    });
}

/// Tears down every subscription the last [`apply`] installed. No-op if already inactive.
pub fn remove(condition: &mut Condition, bus: &mut EventBus) -> Aggregated<()> {
    condition.core.remove(bus, |_core, _bus| {})
}

fn install_effect(
    core: &mut crate::effect::EffectCore,
    bus: &mut EventBus,
    type_tag: &str,
    target: &EntityId,
    effect: &ConditionEffect,
) {
    let priority = effect.kind.priority();
    let tag = type_tag.to_string();
    let tgt = target.clone();
    let value = effect.value;

    match effect.kind {
        EffectKind::Incapacitated => {
            let tgt2 = tgt.clone();
            core.subscribe(bus, "before.action", priority, move |e: &mut Event| {
                if e.source_is(&tgt) {
                    e.cancel(tag.clone());
                }
                Ok(())
            });
            let tag2 = type_tag.to_string();
            core.subscribe(bus, "before.reaction", priority, move |e: &mut Event| {
                if e.source_is(&tgt2) {
                    e.cancel(tag2.clone());
                }
                Ok(())
            });
            return;
        }
        EffectKind::NoReactions => {
            core.subscribe(bus, "before.reaction", priority, move |e: &mut Event| {
                if e.source_is(&tgt) {
                    e.cancel(tag.clone());
                }
                Ok(())
            });
            return;
        }
        _ => {}
    }

    let (event_type, role): (&'static str, RoleCheck) = match effect.target {
        EffectTarget::AttackRolls => ("attack.roll", RoleCheck::Source),
        EffectTarget::AttacksAgainst => ("attack.roll", RoleCheck::Target),
        EffectTarget::Saves => ("save.roll", RoleCheck::Source),
        EffectTarget::StrSaves => ("save.roll", RoleCheck::SourceAndSaveType("str")),
        EffectTarget::DexSaves => ("save.roll", RoleCheck::SourceAndSaveType("dex")),
        EffectTarget::AbilityChecks => ("ability.check", RoleCheck::Source),
        EffectTarget::Movement => ("movement", RoleCheck::Source),
        EffectTarget::Actions => ("before.action", RoleCheck::Source),
        EffectTarget::Reactions => ("before.reaction", RoleCheck::Source),
        EffectTarget::Damage => ("damage.taken", RoleCheck::Target),
        EffectTarget::Sight => ("ability.check", RoleCheck::SourceAndCheckType("sight")),
        EffectTarget::Hearing => ("ability.check", RoleCheck::SourceAndCheckType("hearing")),
    };

    let kind = effect.kind;
    core.subscribe(bus, event_type, priority, move |e: &mut Event| {
        if !role.matches(e, &tgt) {
            return Ok(());
        }
        trace!(type_tag = %tag, ?kind, event_type = %e.event_type, "condition effect matched");
        apply_action(e, &tag, kind, value);
        Ok(())
    });
}

#[derive(Clone, Copy)]
enum RoleCheck {
    Source,
    Target,
    SourceAndSaveType(&'static str),
    SourceAndCheckType(&'static str),
}

impl RoleCheck {
    fn matches(&self, event: &Event, target: &EntityId) -> bool {
        match self {
            RoleCheck::Source => event.source_is(target),
            RoleCheck::Target => event.target_is(target),
            RoleCheck::SourceAndSaveType(expected) => {
                event.source_is(target) && event.context.get_str("save_type") == Some(expected)
            }
            RoleCheck::SourceAndCheckType(expected) => {
                event.source_is(target) && event.context.get_str("check_type") == Some(expected)
            }
        }
    }
}

fn apply_action(event: &mut Event, type_tag: &str, kind: EffectKind, value: Option<f64>) {
    match kind {
        EffectKind::Advantage => event.add_modifier(Modifier::new(
            format!("{type_tag}_advantage"),
            ModifierKind::Advantage,
            1.0,
            kind.priority(),
        )),
        EffectKind::Disadvantage => event.add_modifier(Modifier::new(
            format!("{type_tag}_disadvantage"),
            ModifierKind::Disadvantage,
            1.0,
            kind.priority(),
        )),
        EffectKind::Resistance => event.add_modifier(Modifier::new(
            format!("{type_tag}_resistance"),
            ModifierKind::Resistance,
            1.0,
            kind.priority(),
        )),
        EffectKind::Vulnerability => event.add_modifier(Modifier::new(
            format!("{type_tag}_vulnerability"),
            ModifierKind::Vulnerability,
            1.0,
            kind.priority(),
        )),
        EffectKind::AutoFail => {
            event.context.set("auto_fail", Value::Bool(true));
            event.context.set("auto_fail_reason", Value::String(type_tag.to_string()));
        }
        EffectKind::SpeedZero => {
            event.context.set("speed_multiplier", Value::Float(0.0));
        }
        EffectKind::SpeedReduction => {
            let factor = value.unwrap_or(1.0);
            let current = event.context.get_float("speed_multiplier").unwrap_or(1.0);
            event.context.set("speed_multiplier", Value::Float(current * factor));
        }
        EffectKind::Immunity => {
            event.context.set("damage_immunity", Value::Bool(true));
        }
        EffectKind::MaxHpReduction => {
            event.context.set("max_hp_reduction", Value::Float(value.unwrap_or(0.0)));
        }
        EffectKind::DropItems => {
            event.context.set("drop_items", Value::Bool(true));
        }
        EffectKind::CantSpeak => {
            event.context.set("cant_speak", Value::Bool(true));
        }
        EffectKind::CantHear => {
            event.context.set("cant_hear", Value::Bool(true));
        }
        EffectKind::CantSee => {
            event.context.set("cant_see", Value::Bool(true));
        }
        EffectKind::Incapacitated | EffectKind::NoReactions => unreachable!("handled before role dispatch"),
    }
}
