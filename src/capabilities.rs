//! Host-supplied capability objects. The engine calls into these synchronously (see the
//! concurrency model: no suspension points are permitted) but never implements them itself.
//! Dice evaluation and positional math are rulebook/game concerns, not core concerns.

use crate::ids::EntityId;

/// Deterministic dice evaluator, consulted by spell `cast` closures. Not used by the core
/// itself; exposed here purely so spell implementations have a stable interface to depend
/// on without each rulebook inventing its own.
pub trait Roller: Send + Sync {
    /// Rolls `count` dice of `sides` sides and returns the individual results.
    fn roll(&mut self, count: u32, sides: u32) -> Vec<i64>;
}

/// Positional lookup used by the relationship manager to evaluate aura range. When a host
/// doesn't supply one, auras behave as if every target is always in range (see
/// `RelationshipManager::update_auras`).
pub trait PositionProvider: Send + Sync {
    /// Distance between two entities in host-defined units (usually feet or grid squares).
    /// Returns `None` if either entity has no known position (treated as out of range).
    fn distance(&self, a: &EntityId, b: &EntityId) -> Option<i64>;
}
