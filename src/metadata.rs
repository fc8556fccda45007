//! The free-form key/value bag carried by conditions and relationships (`charmer`,
//! `grappler`, `fear_source`, `escape_dc`, aura `range`, ...). Modeled as a closed, tagged
//! variant rather than an untyped `any`/`interface{}` map, per the re-architecture note on
//! heterogeneous map values: the key enumeration the core itself reads forms the public
//! surface, everything else stays opaque game data the host round-trips through JSON.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// `Entity` is a one-field struct variant, not a bare newtype, so its serialized shape (a
/// JSON object with an `entity` key) never collides with `String`'s (a bare JSON string).
/// Under `#[serde(untagged)]` variants are tried top to bottom and the first one whose shape
/// matches wins; since `EntityId` is itself a newtype around `String`, an untagged
/// `Entity(EntityId)` variant would serialize identically to `String(String)` and the two
/// would become indistinguishable on the way back in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Entity { entity: EntityId },
    String(String),
    List(Vec<MetaValue>),
}

impl MetaValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            MetaValue::Float(v) => Some(*v),
            MetaValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityId> {
        match self {
            MetaValue::Entity { entity } => Some(entity),
            _ => None,
        }
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::String(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::String(v)
    }
}

impl From<EntityId> for MetaValue {
    fn from(v: EntityId) -> Self {
        MetaValue::Entity { entity: v }
    }
}

/// A condition or relationship's metadata bag. Keys are plain strings; undocumented keys
/// are never interpreted by the core, only carried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata(HashMap<String, MetaValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(MetaValue::as_int)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetaValue::as_float)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(MetaValue::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_str)
    }

    pub fn get_entity(&self, key: &str) -> Option<&EntityId> {
        self.get(key).and_then(MetaValue::as_entity)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let meta = Metadata::new()
            .with("charmer", EntityId::new("hero"))
            .with("escape_dc", 15_i64)
            .with("concentration", true);

        let json = serde_json::to_value(&meta).unwrap();
        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.get_entity("charmer"), Some(&EntityId::new("hero")));
        assert_eq!(back.get_int("escape_dc"), Some(15));
        assert_eq!(back.get_bool("concentration"), Some(true));
    }
}
