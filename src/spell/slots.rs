//! The Spell Slot Pool (component H): a per-owner resource set keyed by spell level. Agnostic
//! to any particular class's progression table, since a progression is just a `(class_level,
//! spell_level) -> u32` function supplied at construction.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::event::bus::EventBus;
use crate::event::{Event, Value};
use crate::ids::EntityId;

/// `-1` in a trigger's restoration amount means "restore to maximum"; any other value is a
/// flat amount added (clamped to `maximum`).
const TO_MAXIMUM: i32 = -1;

#[derive(Debug, Clone)]
struct SlotResource {
    current: u32,
    maximum: u32,
    triggers: HashMap<String, i32>,
}

/// Per-owner set of spell-slot resources, one per level `>=1` that the owner has any of.
/// Levels with zero maximum are simply absent from the map.
pub struct SpellSlotPool {
    owner: EntityId,
    levels: HashMap<u32, SlotResource>,
}

impl SpellSlotPool {
    pub fn new(owner: impl Into<EntityId>) -> Self {
        Self { owner: owner.into(), levels: HashMap::new() }
    }

    /// Builds a pool from a progression function, querying levels 1..=9 and keeping only the
    /// ones with a nonzero maximum. `default_trigger` is installed for every kept level (e.g.
    /// `("long_rest", TO_MAXIMUM)` for full-caster classes, `("short_rest", TO_MAXIMUM)` for
    /// warlock-style pact magic).
    pub fn from_progression(
        owner: impl Into<EntityId>,
        class_level: u32,
        progression: impl Fn(u32, u32) -> u32,
        default_trigger: (&str, i32),
    ) -> Self {
        let mut pool = Self::new(owner);
        for spell_level in 1..=9 {
            let maximum = progression(class_level, spell_level);
            if maximum == 0 {
                continue;
            }
            pool.levels.insert(
                spell_level,
                SlotResource {
                    current: maximum,
                    maximum,
                    triggers: HashMap::from([(default_trigger.0.to_string(), default_trigger.1)]),
                },
            );
        }
        pool
    }

    pub fn with_level(mut self, level: u32, maximum: u32, triggers: impl IntoIterator<Item = (&'static str, i32)>) -> Self {
        self.levels.insert(
            level,
            SlotResource {
                current: maximum,
                maximum,
                triggers: triggers.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            },
        );
        self
    }

    pub fn has(&self, level: u32) -> bool {
        self.levels.get(&level).map(|r| r.current > 0).unwrap_or(false)
    }

    pub fn current(&self, level: u32) -> u32 {
        self.levels.get(&level).map(|r| r.current).unwrap_or(0)
    }

    pub fn maximum(&self, level: u32) -> u32 {
        self.levels.get(&level).map(|r| r.maximum).unwrap_or(0)
    }

    /// Consumes one slot of `level`, publishing `resource.consumed`. Fails
    /// `ResourceExhausted` if none remain; the invariant this preserves (`current` never
    /// drives negative) holds across any sequence of `use_slot`/`restore` calls.
    pub fn use_slot(&mut self, level: u32, bus: &mut EventBus) -> Result<()> {
        let resource = self
            .levels
            .get_mut(&level)
            .ok_or(EngineError::ResourceExhausted { level })?;
        if resource.current == 0 {
            return Err(EngineError::ResourceExhausted { level });
        }
        resource.current -= 1;
        debug!(owner = %self.owner, level, remaining = resource.current, "spell slot consumed");
        bus.publish_and_discard(
            Event::new("resource.consumed")
                .with_source_id(self.owner.clone())
                .with_context("key", Value::String(format!("spell_slot_{level}")))
                .with_context("amount", Value::Int(1)),
        )
        .ok();
        Ok(())
    }

    /// Applies every level's `trigger` entry, if present, publishing one `resource.restored`
    /// per level actually changed.
    pub fn restore(&mut self, trigger: &str, bus: &mut EventBus) {
        let levels: Vec<u32> = self.levels.keys().copied().collect();
        for level in levels {
            let resource = self.levels.get_mut(&level).unwrap();
            let Some(&amount) = resource.triggers.get(trigger) else { continue };
            let before = resource.current;
            resource.current = if amount == TO_MAXIMUM {
                resource.maximum
            } else {
                (resource.current + amount as u32).min(resource.maximum)
            };
            if resource.current == before {
                continue;
            }
            debug!(owner = %self.owner, level, trigger, restored_to = resource.current, "spell slots restored");
            bus.publish_and_discard(
                Event::new("resource.restored")
                    .with_source_id(self.owner.clone())
                    .with_context("key", Value::String(format!("spell_slot_{level}")))
                    .with_context("amount", Value::Int((resource.current - before) as i64)),
            )
            .ok();
        }
    }
}
