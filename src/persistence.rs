//! The Load/Save contract (component K, §4.11/§6.4): peek at a persisted blob's top-level
//! `ref` field, parse it, and hand the opaque JSON back to whatever implementation is
//! registered under that `Ref`. The core never deserializes a condition's (or anything
//! else's) fields itself, since it doesn't know what fields a given `type_tag` carries.

use serde_json::Value as Json;

use crate::error::{EngineError, Result};
use crate::ids::Ref;

/// One persisted blob, routed but not yet interpreted: `reference` says which implementation
/// should deserialize `raw_json`, and `raw_json` is the untouched payload (including the
/// `ref` field itself) so a round trip through `to_json`/`load` is byte-for-byte faithful.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub reference: Ref,
    pub raw_json: Json,
}

/// Parses a single JSON object from `bytes`, extracts and parses its top-level `ref` field,
/// and returns both the parsed `Ref` and the untouched JSON payload.
pub fn load(bytes: &[u8]) -> Result<Loaded> {
    let raw_json: Json = serde_json::from_slice(bytes).map_err(|e| EngineError::InvalidJson(e.to_string()))?;
    load_value(raw_json)
}

fn load_value(raw_json: Json) -> Result<Loaded> {
    let reference_str = raw_json.get("ref").and_then(Json::as_str).ok_or(EngineError::MissingRef)?;
    let reference = Ref::parse(reference_str)?;
    Ok(Loaded { reference, raw_json })
}

/// Parses a JSON array of persisted blobs, routing each independently. A single malformed
/// element fails the whole call (unlike the best-effort aggregation used by manager-level
/// operations): a batch load is a startup-time operation where a mangled save file should
/// stop the load rather than silently drop an entity's conditions.
pub fn load_all(bytes: &[u8]) -> Result<Vec<Loaded>> {
    let raw_json: Json = serde_json::from_slice(bytes).map_err(|e| EngineError::InvalidJson(e.to_string()))?;
    let Json::Array(items) = raw_json else {
        return Err(EngineError::InvalidJson("expected a top-level JSON array".to_string()));
    };
    items.into_iter().map(load_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, ConditionSource};
    use crate::ids::{ConditionId, EntityId};

    fn sample_condition_json() -> Json {
        let condition = Condition::builder(ConditionId(1), Ref::new("dnd5e", "condition", "poisoned"), EntityId::new("hero"))
            .source(ConditionSource::entity(EntityId::new("villain")))
            .build()
            .unwrap();
        condition.to_record().to_json().unwrap()
    }

    #[test]
    fn load_round_trips_ref_and_raw_json_byte_for_byte() {
        let original = sample_condition_json();
        let bytes = serde_json::to_vec(&original).unwrap();

        let loaded = load(&bytes).unwrap();
        assert_eq!(loaded.reference, Ref::new("dnd5e", "condition", "poisoned"));
        assert_eq!(loaded.raw_json, original);
    }

    #[test]
    fn load_rejects_missing_ref() {
        let bytes = br#"{"name": "mystery"}"#;
        assert!(matches!(load(bytes), Err(EngineError::MissingRef)));
    }

    #[test]
    fn load_rejects_unparseable_ref() {
        let bytes = br#"{"ref": "not-a-valid-ref"}"#;
        assert!(matches!(load(bytes), Err(EngineError::UnparseableRef(_))));
    }

    #[test]
    fn load_all_routes_every_element() {
        let a = sample_condition_json();
        let mut b = sample_condition_json();
        b["ref"] = Json::String("dnd5e:condition:prone".to_string());

        let bytes = serde_json::to_vec(&Json::Array(vec![a, b])).unwrap();
        let loaded = load_all(&bytes).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].reference, Ref::new("dnd5e", "condition", "prone"));
    }
}
