//! The Effect Core: the lifecycle and subscription-tracking discipline shared by every
//! stateful thing that hooks into the event bus (conditions today; anything else a host
//! builds on top of the same primitives tomorrow).

use tracing::debug;

use crate::error::Aggregated;
use crate::event::bus::{EventBus, Handler};
use crate::ids::{EntityId, SubscriptionId};

/// Apply/Remove lifecycle plus the subscription tracker that makes Remove exhaustive.
///
/// The tracker is the *sole* owner of the effect's subscription lifetimes: nothing outside
/// of `apply`/`remove` should call `bus.subscribe`/`bus.unsubscribe` on this effect's behalf,
/// or the accounting here (and therefore the "Apply;Remove yields zero net subscriptions"
/// property) breaks.
pub struct EffectCore {
    pub id: u64,
    pub kind: String,
    pub source: Option<EntityId>,
    active: bool,
    subscriptions: Vec<SubscriptionId>,
}

impl EffectCore {
    pub fn new(id: u64, kind: impl Into<String>, source: Option<EntityId>) -> Self {
        Self { id, kind: kind.into(), source, active: false, subscriptions: Vec::new() }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Subscribes to `event_type` and records the resulting id in the tracker. Only
    /// meaningful when called from inside an `apply_fn` passed to [`EffectCore::apply`].
    pub fn subscribe(
        &mut self,
        bus: &mut EventBus,
        event_type: impl Into<String>,
        priority: i32,
        handler: impl Handler + 'static,
    ) {
        let id = bus.subscribe(event_type, priority, handler);
        self.subscriptions.push(id);
    }

    /// Installs the effect's subscriptions by running `apply_fn`. No-op if already active:
    /// a second `apply` without an intervening `remove` must not re-subscribe.
    pub fn apply(&mut self, bus: &mut EventBus, apply_fn: impl FnOnce(&mut Self, &mut EventBus)) {
        if self.active {
            debug!(effect = self.id, kind = %self.kind, "apply is a no-op, already active");
            return;
        }
        apply_fn(self, bus);
        self.active = true;
        debug!(effect = self.id, kind = %self.kind, subscriptions = self.subscriptions.len(), "applied");
    }

    /// Tears down every tracked subscription (in reverse insertion order) and runs
    /// `remove_fn` for any extra cleanup the effect needs. No-op if already inactive.
    pub fn remove(
        &mut self,
        bus: &mut EventBus,
        remove_fn: impl FnOnce(&mut Self, &mut EventBus),
    ) -> Aggregated<()> {
        if !self.active {
            return Aggregated::ok(());
        }
        let mut errors = Vec::new();
        for id in self.subscriptions.drain(..).rev().collect::<Vec<_>>() {
            if let Err(e) = bus.unsubscribe(id) {
                errors.push(e);
            }
        }
        remove_fn(self, bus);
        self.active = false;
        debug!(effect = self.id, kind = %self.kind, "removed");
        Aggregated { value: (), errors }
    }
}
