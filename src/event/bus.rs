use std::collections::HashMap;

use tracing::{debug, error, trace};

use crate::error::{EngineError, Result};
use crate::ids::{IdGenerator, SubscriptionId};

use super::Event;

/// A handler subscribed to an event type. Handlers are synchronous (the engine has no
/// suspension points, see the concurrency model) and may mutate the event's context and
/// modifier list and set `cancelled`. Returning `Err` isolates the failure the way a caught
/// panic would in a host language with panic recovery: the dispatcher records it and keeps
/// invoking the handlers that have not run yet.
pub trait Handler: FnMut(&mut Event) -> Result<()> {}
impl<F: FnMut(&mut Event) -> Result<()>> Handler for F {}

struct Subscription {
    id: SubscriptionId,
    priority: i32,
    seq: u64,
    handler: Box<dyn Handler>,
}

/// Synchronous, single-threaded, priority-ordered pub/sub bus. See the spec's dispatch
/// algorithm: handlers are snapshotted (by id, in priority/insertion order) at the start of
/// a publish, so subscriptions made by a handler during dispatch only take effect for later
/// events, while unsubscriptions made during dispatch are honored immediately for any
/// not-yet-invoked handler in the same dispatch.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<String, Vec<Subscription>>,
    index: HashMap<SubscriptionId, String>,
    ids: IdGenerator,
    seq: u64,
}

/// The event, once dispatch has finished, together with the first non-recoverable handler
/// error encountered (if any). Remaining handlers still ran; this is purely a report.
pub struct Dispatched {
    pub event: Event,
    pub error: Option<EngineError>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to `event_type` at the given `priority` (lower runs earlier).
    /// Ties are broken by subscription insertion order.
    pub fn subscribe(
        &mut self,
        event_type: impl Into<String>,
        priority: i32,
        handler: impl Handler + 'static,
    ) -> SubscriptionId {
        let event_type = event_type.into();
        let id = SubscriptionId(self.ids.next());
        self.seq += 1;
        let sub = Subscription { id, priority, seq: self.seq, handler: Box::new(handler) };

        let bucket = self.handlers.entry(event_type.clone()).or_default();
        let insert_at = bucket.partition_point(|s| (s.priority, s.seq) <= (sub.priority, sub.seq));
        bucket.insert(insert_at, sub);
        self.index.insert(id, event_type.clone());
        debug!(subscription = ?id, event_type = %event_type, priority, "subscribed handler");
        id
    }

    /// Removes a subscription. Idempotent-on-error: calling this twice for the same id
    /// returns `NotFound` the second time rather than panicking.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let Some(event_type) = self.index.remove(&id) else {
            return Err(EngineError::NotFound(id));
        };
        if let Some(bucket) = self.handlers.get_mut(&event_type) {
            if let Some(pos) = bucket.iter().position(|s| s.id == id) {
                bucket.remove(pos);
                debug!(subscription = ?id, event_type = %event_type, "unsubscribed handler");
                return Ok(());
            }
        }
        Err(EngineError::NotFound(id))
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.index.contains_key(&id)
    }

    /// Dispatches `event` to every handler subscribed to its `event_type`, in ascending
    /// priority order (ties by insertion order). See the module docs for the exact
    /// snapshot/visibility semantics around concurrent subscribe/unsubscribe.
    pub fn publish(&mut self, mut event: Event) -> Dispatched {
        let event_type = event.event_type.clone();
        trace!(event_type = %event_type, "publishing event");

        let order: Vec<SubscriptionId> = self
            .handlers
            .get(&event_type)
            .map(|bucket| bucket.iter().map(|s| s.id).collect())
            .unwrap_or_default();

        let mut first_error = None;

        for id in order {
            let Some(bucket) = self.handlers.get_mut(&event_type) else { break };
            let Some(pos) = bucket.iter().position(|s| s.id == id) else {
                // unsubscribed by an earlier handler in this same dispatch
                continue;
            };
            let mut sub = bucket.remove(pos);

            let outcome = (sub.handler)(&mut event);

            if let Err(cause) = outcome {
                error!(subscription = ?id, event_type = %event_type, %cause, "handler failed");
                if first_error.is_none() {
                    first_error = Some(EngineError::HandlerError {
                        source_id: id,
                        cause: cause.to_string(),
                    });
                }
            }

            // re-insert, maintaining sorted order, so the subscription is live again for the
            // next publish of this event type
            let bucket = self.handlers.entry(event_type.clone()).or_default();
            let insert_at = bucket.partition_point(|s| (s.priority, s.seq) <= (sub.priority, sub.seq));
            bucket.insert(insert_at, sub);
        }

        Dispatched { event, error: first_error }
    }

    /// Convenience for callers that only care whether dispatch produced a handler error, not
    /// the event's final state.
    pub fn publish_and_discard(&mut self, event: Event) -> Result<()> {
        let dispatched = self.publish(event);
        match dispatched.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
