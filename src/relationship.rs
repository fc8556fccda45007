//! The Relationship Manager (component G): concentration, aura, channeled, maintained,
//! linked and dependent links between a source entity and the conditions it's responsible
//! for. Breaking a relationship tears down every condition it names; a condition belongs to
//! at most one relationship at a time.

use std::collections::HashMap;

use tracing::info;

use crate::capabilities::PositionProvider;
use crate::condition::manager::{ConditionLifecycleObserver, ConditionManager, ConditionRemoval};
use crate::condition::registry::ConditionRegistry;
use crate::error::{Aggregated, EngineError, Result};
use crate::event::bus::EventBus;
use crate::ids::{ConditionId, EntityId, IdGenerator, RelationshipId};
use crate::metadata::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    Concentration,
    Aura,
    Channeled,
    Maintained,
    Linked,
    Dependent,
}

#[derive(Debug, Clone)]
pub struct Relationship {
    pub id: RelationshipId,
    pub kind: RelationshipKind,
    pub source_entity: EntityId,
    pub conditions: Vec<ConditionId>,
    pub metadata: Metadata,
}

/// `by_source` indexes relationships for `break_all`/concentration lookups; `by_condition`
/// enforces "a condition belongs to at most one relationship" and is how a removed
/// condition's relationship gets found when [`ConditionManager`] notifies this manager via
/// [`ConditionLifecycleObserver`].
#[derive(Default)]
pub struct RelationshipManager {
    relationships: HashMap<RelationshipId, Relationship>,
    by_source: HashMap<EntityId, Vec<RelationshipId>>,
    by_condition: HashMap<ConditionId, RelationshipId>,
    ids: IdGenerator,
}

impl RelationshipManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RelationshipId) -> Option<&Relationship> {
        self.relationships.get(&id)
    }

    pub fn concentration_for(&self, source: &EntityId) -> Option<&Relationship> {
        self.by_source
            .get(source)?
            .iter()
            .filter_map(|id| self.relationships.get(id))
            .find(|r| r.kind == RelationshipKind::Concentration)
    }

    pub fn for_source(&self, source: &EntityId) -> Vec<&Relationship> {
        self.by_source
            .get(source)
            .map(|ids| ids.iter().filter_map(|id| self.relationships.get(id)).collect())
            .unwrap_or_default()
    }

    /// Creates a relationship. `concentration` breaks any prior concentration relationship
    /// owned by `source_entity` first; `aura` requires a numeric `range` in `metadata`; every
    /// condition named must not already belong to another relationship.
    pub fn create(
        &mut self,
        conditions: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        kind: RelationshipKind,
        source_entity: impl Into<EntityId>,
        condition_ids: Vec<ConditionId>,
        metadata: Metadata,
    ) -> Result<RelationshipId> {
        let source_entity = source_entity.into();

        if kind == RelationshipKind::Aura && metadata.get_float("range").is_none() {
            return Err(EngineError::validation("aura relationships require a numeric `range` in metadata"));
        }

        for cid in &condition_ids {
            if self.by_condition.contains_key(cid) {
                return Err(EngineError::validation(format!(
                    "condition {cid:?} already belongs to a relationship"
                )));
            }
        }

        if kind == RelationshipKind::Concentration {
            if let Some(prior) = self.concentration_for(&source_entity).map(|r| r.id) {
                self.break_relationship(conditions, registry, bus, prior);
            }
        }

        let id = RelationshipId(self.ids.next());
        for cid in &condition_ids {
            self.by_condition.insert(*cid, id);
        }
        self.by_source.entry(source_entity.clone()).or_default().push(id);
        self.relationships.insert(
            id,
            Relationship { id, kind, source_entity: source_entity.clone(), conditions: condition_ids, metadata },
        );
        info!(relationship = ?id, ?kind, source = %source_entity, "relationship created");
        Ok(id)
    }

    /// Removes every condition the relationship names, in insertion order, collecting
    /// failures rather than aborting the sweep; then deletes the relationship record itself.
    pub fn break_relationship(
        &mut self,
        conditions: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        id: RelationshipId,
    ) -> Aggregated<()> {
        let Some(rel) = self.relationships.remove(&id) else {
            return Aggregated::ok(());
        };
        if let Some(list) = self.by_source.get_mut(&rel.source_entity) {
            list.retain(|r| *r != id);
        }

        let mut errors = Vec::new();
        for cid in &rel.conditions {
            self.by_condition.remove(cid);
            // the condition's target entity isn't tracked on the relationship record, so we
            // ask every entity this manager knows the condition under; in practice a
            // relationship's conditions all target the same handful of entities reachable
            // from the manager's own bookkeeping, so this is a cheap scan in the common case.
            if let Some(target) = find_condition_owner(conditions, *cid) {
                let result = conditions.remove_condition(registry, bus, &target, *cid, "relationship broken");
                errors.extend(result.errors);
            }
        }
        info!(relationship = ?id, ?rel.kind, "relationship broken");
        Aggregated { value: (), errors }
    }

    /// Sweeps every relationship sourced by `source`.
    pub fn break_all(
        &mut self,
        conditions: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        source: &EntityId,
    ) -> Aggregated<()> {
        let ids: Vec<RelationshipId> = self.by_source.get(source).cloned().unwrap_or_default();
        let mut errors = Vec::new();
        for id in ids {
            let result = self.break_relationship(conditions, registry, bus, id);
            errors.extend(result.errors);
        }
        Aggregated { value: (), errors }
    }

    /// Re-evaluates every aura's in-range conditions. Without a [`PositionProvider`],
    /// behavior is "always in range" per §4.7; with one, any named condition whose target is
    /// now out of range (or has no known position) is removed, and an aura left with no
    /// in-range conditions is broken entirely.
    pub fn update_auras(
        &mut self,
        conditions: &mut ConditionManager,
        registry: &ConditionRegistry,
        bus: &mut EventBus,
        positions: Option<&dyn PositionProvider>,
    ) -> Aggregated<()> {
        let Some(positions) = positions else {
            return Aggregated::ok(());
        };

        let aura_ids: Vec<RelationshipId> = self
            .relationships
            .values()
            .filter(|r| r.kind == RelationshipKind::Aura)
            .map(|r| r.id)
            .collect();

        let mut errors = Vec::new();
        for id in aura_ids {
            let Some(range) = self.relationships.get(&id).and_then(|r| r.metadata.get_float("range")) else {
                continue;
            };
            let source_entity = self.relationships.get(&id).unwrap().source_entity.clone();
            let mut out_of_range = Vec::new();
            for cid in self.relationships.get(&id).unwrap().conditions.clone() {
                let Some(target) = find_condition_owner(conditions, cid) else { continue };
                let in_range = positions
                    .distance(&source_entity, &target)
                    .map(|d| (d as f64) <= range)
                    .unwrap_or(false);
                if !in_range {
                    out_of_range.push((cid, target));
                }
            }
            for (cid, target) in out_of_range {
                let result = conditions.remove_condition(registry, bus, &target, cid, "out of aura range");
                errors.extend(result.errors);
                self.by_condition.remove(&cid);
                if let Some(rel) = self.relationships.get_mut(&id) {
                    rel.conditions.retain(|c| *c != cid);
                }
            }
            let empty = self.relationships.get(&id).map(|r| r.conditions.is_empty()).unwrap_or(false);
            if empty {
                self.relationships.remove(&id);
                if let Some(list) = self.by_source.get_mut(&source_entity) {
                    list.retain(|r| *r != id);
                }
            }
        }
        Aggregated { value: (), errors }
    }
}

/// A condition removed elsewhere (duration expiry, suppression cleanup, direct removal)
/// needs its relationship bookkeeping cleared even though this manager never initiated the
/// removal. Implementing [`ConditionLifecycleObserver`] lets [`ConditionManager`] notify this
/// manager without either owning the other.
impl ConditionLifecycleObserver for RelationshipManager {
    fn on_condition_removed(&mut self, removal: &ConditionRemoval) {
        let Some(rel_id) = self.by_condition.remove(&removal.id) else { return };
        if let Some(rel) = self.relationships.get_mut(&rel_id) {
            rel.conditions.retain(|c| *c != removal.id);
            if rel.conditions.is_empty() {
                let source = rel.source_entity.clone();
                self.relationships.remove(&rel_id);
                if let Some(list) = self.by_source.get_mut(&source) {
                    list.retain(|r| *r != rel_id);
                }
            }
        }
    }
}

fn find_condition_owner(conditions: &ConditionManager, id: ConditionId) -> Option<EntityId> {
    conditions.owner_of(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::ids::Ref;

    fn setup() -> (ConditionManager, ConditionRegistry, EventBus, RelationshipManager) {
        (ConditionManager::new(), ConditionRegistry::new(), EventBus::new(), RelationshipManager::new())
    }

    fn apply_dummy_condition(manager: &mut ConditionManager, registry: &ConditionRegistry, bus: &mut EventBus, target: &EntityId, type_tag: &str) -> ConditionId {
        let id = manager.next_id();
        let condition = Condition::builder(id, Ref::new("dnd5e", "condition", type_tag), target.clone())
            .source_entity("caster")
            .build()
            .unwrap();
        manager.apply_condition(registry, bus, condition).unwrap()
    }

    #[test]
    fn creating_a_second_concentration_breaks_the_first() {
        let (mut conditions, registry, mut bus, mut relationships) = setup();
        let caster = EntityId::new("caster");
        let target = EntityId::new("target");

        let c1 = apply_dummy_condition(&mut conditions, &registry, &mut bus, &target, "hold_person");
        let rel1 = relationships
            .create(&mut conditions, &registry, &mut bus, RelationshipKind::Concentration, caster.clone(), vec![c1], Metadata::new())
            .unwrap();

        let c2 = apply_dummy_condition(&mut conditions, &registry, &mut bus, &target, "hold_monster");
        let rel2 = relationships
            .create(&mut conditions, &registry, &mut bus, RelationshipKind::Concentration, caster.clone(), vec![c2], Metadata::new())
            .unwrap();

        assert!(relationships.get(rel1).is_none());
        assert!(relationships.get(rel2).is_some());
        assert!(!conditions.has(&target, "hold_person"));
        assert!(conditions.has(&target, "hold_monster"));
    }

    #[test]
    fn aura_requires_numeric_range() {
        let (mut conditions, registry, mut bus, mut relationships) = setup();
        let err = relationships.create(
            &mut conditions,
            &registry,
            &mut bus,
            RelationshipKind::Aura,
            "caster",
            Vec::new(),
            Metadata::new(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn breaking_a_relationship_removes_all_its_conditions() {
        let (mut conditions, registry, mut bus, mut relationships) = setup();
        let target = EntityId::new("target");
        let c1 = apply_dummy_condition(&mut conditions, &registry, &mut bus, &target, "charmed");
        let rel = relationships
            .create(&mut conditions, &registry, &mut bus, RelationshipKind::Channeled, "caster", vec![c1], Metadata::new())
            .unwrap();

        relationships.break_relationship(&mut conditions, &registry, &mut bus, rel);
        assert!(!conditions.has(&target, "charmed"));
    }
}
