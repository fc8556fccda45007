//! The Spell List (component I): a caster's three disjoint spell sets (cantrips, known,
//! prepared) plus the preparation style governing what's castable.

use std::collections::HashSet;

use crate::error::{EngineError, Result};

/// `Known` casters (sorcerers, bards, warlocks) implicitly prepare everything they know;
/// `Prepared` casters (wizards, clerics) choose a subset of `known` up to `max_prepared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparationStyle {
    Known,
    Prepared,
}

#[derive(Debug)]
pub struct SpellList {
    cantrips: HashSet<String>,
    known: HashSet<String>,
    prepared: HashSet<String>,
    style: PreparationStyle,
    max_prepared: usize,
}

impl SpellList {
    pub fn new(style: PreparationStyle, max_prepared: usize) -> Self {
        Self { cantrips: HashSet::new(), known: HashSet::new(), prepared: HashSet::new(), style, max_prepared }
    }

    pub fn style(&self) -> PreparationStyle {
        self.style
    }

    /// `level` must be `>= 1`; cantrips go through [`add_cantrip`] instead. In `Known` style
    /// the spell is also immediately prepared, since that style has no separate preparation
    /// step.
    pub fn add_known(&mut self, spell_id: impl Into<String>, level: u32) -> Result<()> {
        if level == 0 {
            return Err(EngineError::validation("add_known requires level >= 1; use add_cantrip for level 0"));
        }
        let spell_id = spell_id.into();
        self.known.insert(spell_id.clone());
        if self.style() == PreparationStyle::Known {
            self.prepared.insert(spell_id);
        }
        Ok(())
    }

    pub fn add_cantrip(&mut self, spell_id: impl Into<String>) -> Result<()> {
        let spell_id = spell_id.into();
        if self.cantrips.contains(&spell_id) {
            return Err(EngineError::validation(format!("{spell_id} is already a known cantrip")));
        }
        self.cantrips.insert(spell_id);
        Ok(())
    }

    /// Only valid for `Prepared` style: the spell must already be known, and preparing it must
    /// not push `prepared` past `max_prepared`.
    pub fn prepare(&mut self, spell_id: &str) -> Result<()> {
        if self.style() != PreparationStyle::Prepared {
            return Err(EngineError::validation("prepare is only meaningful for Prepared-style casters"));
        }
        if !self.known.contains(spell_id) {
            return Err(EngineError::validation(format!("{spell_id} is not known")));
        }
        if self.prepared.len() >= self.max_prepared && !self.prepared.contains(spell_id) {
            return Err(EngineError::validation(format!(
                "cannot prepare {spell_id}: already at max_prepared ({})",
                self.max_prepared
            )));
        }
        self.prepared.insert(spell_id.to_string());
        Ok(())
    }

    pub fn unprepare(&mut self, spell_id: &str) -> Result<()> {
        if self.style() != PreparationStyle::Prepared {
            return Err(EngineError::validation("unprepare is only meaningful for Prepared-style casters"));
        }
        self.prepared.remove(spell_id);
        Ok(())
    }

    pub fn can_cast(&self, spell_id: &str) -> bool {
        self.cantrips.contains(spell_id) || self.prepared.contains(spell_id)
    }

    pub fn known(&self) -> impl Iterator<Item = &String> {
        self.known.iter()
    }

    pub fn prepared(&self) -> impl Iterator<Item = &String> {
        self.prepared.iter()
    }

    pub fn cantrips(&self) -> impl Iterator<Item = &String> {
        self.cantrips.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_style_implicitly_prepares_everything_known() {
        let mut list = SpellList::new(PreparationStyle::Known, 0);
        list.add_known("eldritch_blast", 0).unwrap_err();
        list.add_cantrip("eldritch_blast").unwrap();
        list.add_known("hex", 1).unwrap();
        assert!(list.can_cast("hex"));
        assert!(list.can_cast("eldritch_blast"));
    }

    #[test]
    fn prepared_style_enforces_known_subset_and_max() {
        let mut list = SpellList::new(PreparationStyle::Prepared, 1);
        list.add_known("magic_missile", 1).unwrap();
        list.add_known("shield", 1).unwrap();
        assert!(!list.can_cast("magic_missile"));

        list.prepare("magic_missile").unwrap();
        assert!(list.can_cast("magic_missile"));

        let err = list.prepare("shield");
        assert!(err.is_err());

        list.unprepare("magic_missile").unwrap();
        list.prepare("shield").unwrap();
        assert!(list.can_cast("shield"));
        assert!(!list.can_cast("magic_missile"));
    }

    #[test]
    fn prepare_rejects_spells_not_known() {
        let mut list = SpellList::new(PreparationStyle::Prepared, 4);
        let err = list.prepare("fireball");
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_cantrip_is_an_error() {
        let mut list = SpellList::new(PreparationStyle::Known, 0);
        list.add_cantrip("light").unwrap();
        assert!(list.add_cantrip("light").is_err());
    }
}
