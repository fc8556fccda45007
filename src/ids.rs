use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Opaque, host-supplied stable identifier for a game entity. The engine never interprets
/// its contents; it is only ever used as a map key and as an equality check between events
/// and condition targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

id_newtype!(SubscriptionId);
id_newtype!(ConditionId);
id_newtype!(RelationshipId);

/// Monotonic id generator. Every manager that mints its own kind of id (the bus mints
/// `SubscriptionId`s, the condition manager mints `ConditionId`s, ...) owns one of these
/// rather than sharing a single process-wide counter, so tests can reset or seed generation
/// without cross-contaminating unrelated components.
///
/// The counter is an `AtomicU64` rather than a plain `Cell<u64>`: the engine's dispatch loop
/// is single-threaded by design (see the concurrency model), but nothing stops a host from
/// constructing managers on one thread and driving them from another over the program's
/// lifetime, so the generator itself stays thread-safe even though no two threads are meant
/// to call into the same manager concurrently.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    /// Construct a generator seeded at a specific starting value, for tests that need
    /// deterministic, reproducible ids.
    pub fn seeded(start: u64) -> Self {
        Self { next: AtomicU64::new(start) }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Mints a process-independent identifier. `IdGenerator`'s monotonic counters are scoped to
/// one process and reset on restart; a host that persists conditions across restarts and
/// needs an id that survives that boundary (stamped into a condition's free-form `metadata`,
/// not into the core's own `ConditionId`) should use this instead, per §9's ID-generation
/// note: a monotonic counter is the default, UUIDs are for when cross-process identity is
/// actually needed.
pub fn cross_process_id() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}

/// A structured identifier `{ module, type, id }`, e.g. `dnd5e:condition:poisoned`, used to
/// route persisted data to the implementation that registered under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    pub module: String,
    pub kind: String,
    pub id: String,
}

impl Ref {
    pub fn new(module: impl Into<String>, kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self { module: module.into(), kind: kind.into(), id: id.into() }
    }

    /// Parses the canonical `module:type:id` string form. Exactly three non-empty,
    /// colon-separated segments are accepted; anything else (including a trailing `:v2`
    /// style evolution marker) is rejected unless a host extends the parser itself.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(EngineError::UnparseableRef(raw.to_string()));
        }
        Ok(Ref::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module, self.kind, self.id)
    }
}
