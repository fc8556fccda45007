//! Durations: pure, event-driven expiry predicates. Every variant's `is_expired` is a
//! function of its own private state plus the event handed to it; nothing here touches the
//! bus or a manager directly (see [`crate::condition::manager`] for how expiry checks get
//! wired to actual condition removal without re-entrant mutation).

use std::rc::Rc;

use crate::event::Event;
use crate::ids::EntityId;

/// A one-shot predicate used by [`Duration::UntilEvent`]. Boxed so callers can close over
/// arbitrary game state; `Rc` (not `Box`) because a `Duration` is cloned into both the
/// condition record a manager queries and the handler closure that watches for its expiry.
pub type EventPredicate = Rc<dyn Fn(&Event) -> bool>;

/// The six duration shapes a condition or spell can declare. Closed enum, matched rather
/// than dispatched through a trait object, since the set is fixed and small.
#[derive(Clone)]
pub enum Duration {
    Permanent,

    /// Expires once a `round.end` event reports a round number `>= start_round + n`.
    /// `start_round` is captured from the first `round.end` observed if not preset at
    /// construction.
    Rounds { n: i64, start_round: Option<i64> },

    /// Expires once `taken >= n` turn-end events sourced by `entity_id` have been observed.
    Turns { n: u32, entity_id: EntityId, taken: u32 },

    /// Expires once a `clock.tick` event's `elapsed_seconds` context value shows `n` minutes
    /// have passed since `start` (captured from the first tick if not preset).
    Minutes { n: f64, start: Option<f64> },

    /// Expires the first time a `damage.taken` event targets `entity_id`.
    UntilDamaged { entity_id: EntityId },

    /// Expires on the first event of `event_type` for which `predicate` returns true.
    UntilEvent { event_type: String, predicate: EventPredicate },
}

impl Duration {
    pub fn rounds(n: i64) -> Self {
        Duration::Rounds { n, start_round: None }
    }

    pub fn rounds_from(n: i64, start_round: i64) -> Self {
        Duration::Rounds { n, start_round: Some(start_round) }
    }

    pub fn turns(n: u32, entity_id: EntityId) -> Self {
        Duration::Turns { n, entity_id, taken: 0 }
    }

    pub fn minutes(n: f64) -> Self {
        Duration::Minutes { n, start: None }
    }

    pub fn until_damaged(entity_id: EntityId) -> Self {
        Duration::UntilDamaged { entity_id }
    }

    pub fn until_event(event_type: impl Into<String>, predicate: EventPredicate) -> Self {
        Duration::UntilEvent { event_type: event_type.into(), predicate }
    }

    /// The event type this duration cares about, used to decide which bus subscription to
    /// install. `Permanent` never expires and subscribes to nothing.
    pub fn watched_event_type(&self) -> Option<&str> {
        match self {
            Duration::Permanent => None,
            Duration::Rounds { .. } => Some("round.end"),
            Duration::Turns { .. } => Some("turn.end"),
            Duration::Minutes { .. } => Some("clock.tick"),
            Duration::UntilDamaged { .. } => Some("damage.taken"),
            Duration::UntilEvent { event_type, .. } => Some(event_type.as_str()),
        }
    }

    /// Evaluates `event` against this duration's expiry rule, mutating any private counters
    /// (turns taken, captured baseline round/time) along the way.
    pub fn is_expired(&mut self, event: &Event) -> bool {
        match self {
            Duration::Permanent => false,

            Duration::Rounds { n, start_round } => {
                if event.event_type != "round.end" {
                    return false;
                }
                let Some(round) = event.context.get_int("round") else { return false };
                match start_round {
                    None => {
                        *start_round = Some(round);
                        false
                    }
                    Some(start) => round >= *start + *n,
                }
            }

            Duration::Turns { n, entity_id, taken } => {
                if event.event_type != "turn.end" || !event.source_is(entity_id) {
                    return false;
                }
                *taken += 1;
                *taken >= *n
            }

            Duration::Minutes { n, start } => {
                if event.event_type != "clock.tick" {
                    return false;
                }
                let Some(now) = event.context.get_float("elapsed_seconds") else { return false };
                match start {
                    None => {
                        *start = Some(now);
                        false
                    }
                    Some(base) => now - *base >= *n * 60.0,
                }
            }

            Duration::UntilDamaged { entity_id } => {
                event.event_type == "damage.taken" && event.target_is(entity_id)
            }

            Duration::UntilEvent { event_type, predicate } => {
                event.event_type == *event_type && predicate(event)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Duration::Permanent => "permanent".to_string(),
            Duration::Rounds { n, .. } => format!("{n} round(s)"),
            Duration::Turns { n, entity_id, .. } => format!("{n} of {entity_id}'s turn(s)"),
            Duration::Minutes { n, .. } => format!("{n} minute(s)"),
            Duration::UntilDamaged { entity_id } => format!("until {entity_id} takes damage"),
            Duration::UntilEvent { event_type, .. } => format!("until next {event_type}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Value;

    fn round_end(round: i64) -> Event {
        Event::new("round.end").with_context("round", Value::Int(round))
    }

    #[test]
    fn rounds_expires_strictly_after_nth_subsequent_round_end() {
        let mut d = Duration::rounds_from(2, 5);
        assert!(!d.is_expired(&round_end(6)));
        assert!(d.is_expired(&round_end(7)));
    }

    #[test]
    fn rounds_captures_baseline_from_first_round_end_when_unset() {
        let mut d = Duration::rounds(2);
        assert!(!d.is_expired(&round_end(10))); // establishes baseline, does not itself count
        assert!(!d.is_expired(&round_end(11)));
        assert!(d.is_expired(&round_end(12)));
    }

    #[test]
    fn turns_counts_only_the_matching_entitys_turn_end() {
        let hero = EntityId::new("hero");
        let other = EntityId::new("other");
        let mut d = Duration::turns(2, hero.clone());

        let mut e = Event::new("turn.end");
        e.source = Some(other);
        assert!(!d.is_expired(&e));

        let mut e = Event::new("turn.end");
        e.source = Some(hero.clone());
        assert!(!d.is_expired(&e));
        assert!(d.is_expired(&e));
    }

    #[test]
    fn until_damaged_expires_only_for_the_matching_target() {
        let victim = EntityId::new("victim");
        let mut d = Duration::until_damaged(victim.clone());

        let mut other = Event::new("damage.taken");
        other.target = Some(EntityId::new("someone-else"));
        assert!(!d.is_expired(&other));

        let mut e = Event::new("damage.taken");
        e.target = Some(victim);
        assert!(d.is_expired(&e));
    }

    #[test]
    fn permanent_never_expires() {
        let mut d = Duration::Permanent;
        assert!(!d.is_expired(&round_end(1_000_000)));
    }
}
