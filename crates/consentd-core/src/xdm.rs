//! XDM wire codec: the nested JSON shape consents travel in
//!
//! Event data / shared state / persisted blob:
//!   { "consents": { "collect": { "val": "y" },
//!                   "personalize": { "content": { "val": "n" } },
//!                   "metadata": { "time": "2019-09-23T18:15:45Z" } } }
//!
//! Edge consent preference response:
//!   { "payload": [ { "collect": { "val": "y" } } ], "type": "consent:preferences" }
//!
//! Decoding is lenient: anything that does not fit the shape is dropped at the
//! smallest granularity possible (one category), never an error.

use crate::types::{Category, ConsentValue, Consents, MetadataTime};
use crate::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const CONSENTS: &str = "consents";
pub const METADATA: &str = "metadata";
pub const TIME: &str = "time";
pub const VAL: &str = "val";
pub const PAYLOAD: &str = "payload";

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode `{ "consents": {...} }` event data.
pub fn from_event_data(data: &Value) -> Consents {
    match data.get(CONSENTS).and_then(Value::as_object) {
        Some(map) => from_consents_map(map),
        None => Consents::new(),
    }
}

/// Decode an edge consent preference response. Only the first payload entry is used.
pub fn from_edge_response(data: &Value) -> Consents {
    let first = data
        .get(PAYLOAD)
        .and_then(Value::as_array)
        .and_then(|payload| payload.first())
        .and_then(Value::as_object);
    match first {
        Some(map) => from_consents_map(map),
        None => {
            debug!("edge response carries no usable payload");
            Consents::new()
        }
    }
}

/// Decode the inner consents map (the object under `"consents"`).
pub fn from_consents_map(map: &Map<String, Value>) -> Consents {
    let mut consents = Consents::new();

    for (key, value) in map {
        if key == METADATA {
            let time = value.get(TIME).and_then(Value::as_str);
            consents.set_metadata_time(time.map(MetadataTime::new));
            continue;
        }

        // A dotted top-level key would read back as a nested category.
        if key.contains('.') {
            debug!(category = %key, "dropping consent entry with dotted key");
            continue;
        }

        let Some(obj) = value.as_object() else {
            debug!(category = %key, "dropping non-object consent entry");
            continue;
        };

        // An entry may carry its own `val` and nested children side by side.
        if obj.contains_key(VAL) {
            if let Some(v) = decode_val(key, obj) {
                consents.set(key.as_str(), v);
            }
        }

        for (child, child_value) in obj {
            if child == VAL {
                continue;
            }
            let Some(child_obj) = child_value.as_object() else {
                continue;
            };
            let category = Category::nested(key, child);
            if let Some(v) = decode_val(category.as_str(), child_obj) {
                consents.set(category, v);
            }
        }
    }

    consents
}

fn decode_val(category: &str, obj: &Map<String, Value>) -> Option<ConsentValue> {
    let code = obj.get(VAL).and_then(Value::as_str);
    let value = code.and_then(ConsentValue::from_code);
    if value.is_none() {
        debug!(category, value = ?obj.get(VAL), "dropping consent category with unsupported value");
    }
    value
}

/// Decode a persisted blob. Unlike event data, unparseable JSON is reported.
pub fn from_json_str(s: &str) -> Result<Consents> {
    let value: Value = serde_json::from_str(s)?;
    Ok(from_event_data(&value))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode the inner consents map. A top-level category and the nested
/// categories beneath it share one object: `{ "val": .., "content": {..} }`.
pub fn to_consents_map(consents: &Consents) -> Map<String, Value> {
    let mut entries: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();

    for (category, value) in consents.iter() {
        let (key, child) = category.path();
        let entry = entries.entry(key).or_default();
        match child {
            None => {
                entry.insert(VAL.to_string(), Value::String(value.code().to_string()));
            }
            Some(child) => {
                entry.insert(child.to_string(), val_object(value));
            }
        }
    }

    let mut map: Map<String, Value> = entries
        .into_iter()
        .map(|(key, entry)| (key.to_string(), Value::Object(entry)))
        .collect();

    if let Some(time) = consents.metadata_time() {
        let mut meta = Map::new();
        meta.insert(TIME.to_string(), Value::String(time.as_str().to_string()));
        map.insert(METADATA.to_string(), Value::Object(meta));
    }

    map
}

fn val_object(value: ConsentValue) -> Value {
    let mut obj = Map::new();
    obj.insert(VAL.to_string(), Value::String(value.code().to_string()));
    Value::Object(obj)
}

/// Encode as `{ "consents": {...} }` event data.
pub fn to_event_data(consents: &Consents) -> Value {
    let mut data = Map::new();
    data.insert(CONSENTS.to_string(), Value::Object(to_consents_map(consents)));
    Value::Object(data)
}

/// Encode as the persisted blob.
pub fn to_json_string(consents: &Consents) -> Result<String> {
    Ok(serde_json::to_string(&to_event_data(consents))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_full_shape() {
        let data = json!({
            "consents": {
                "collect": { "val": "p" },
                "adID": { "val": "n" },
                "personalize": { "content": { "val": "y" } },
                "metadata": { "time": "2019-09-23T18:15:45Z" }
            }
        });
        let c = from_event_data(&data);
        assert_eq!(c.len(), 3);
        assert_eq!(c.get("collect"), Some(ConsentValue::Pending));
        assert_eq!(c.get("adID"), Some(ConsentValue::No));
        assert_eq!(c.get("personalize.content"), Some(ConsentValue::Yes));
        assert_eq!(c.metadata_time().map(|t| t.as_str()), Some("2019-09-23T18:15:45Z"));
    }

    #[test]
    fn decode_drops_only_bad_categories() {
        let data = json!({
            "consents": {
                "collect": { "val": "maybe" },
                "adID": { "val": "y" },
                "share": { "val": 1 },
                "personalize": { "content": { "val": "vi" } },
                "junk": "string"
            }
        });
        let c = from_event_data(&data);
        assert_eq!(c.len(), 1);
        assert_eq!(c.get("adID"), Some(ConsentValue::Yes));
    }

    #[test]
    fn decode_non_xdm_is_empty() {
        assert!(from_event_data(&json!({ "non-XDMKey": 344 })).is_empty());
        assert!(from_event_data(&Value::Null).is_empty());
        assert!(from_event_data(&json!({ "consents": "optedin" })).is_empty());
    }

    #[test]
    fn decode_edge_response_first_entry() {
        let data = json!({
            "payload": [
                { "collect": { "val": "n" }, "metadata": { "time": "t1" } },
                { "collect": { "val": "y" } }
            ],
            "type": "consent:preferences"
        });
        let c = from_edge_response(&data);
        assert_eq!(c.get("collect"), Some(ConsentValue::No));
        assert_eq!(c.metadata_time().map(|t| t.as_str()), Some("t1"));
    }

    #[test]
    fn decode_edge_response_invalid_payload() {
        let data = json!({ "payload": "not what I expect" });
        assert!(from_edge_response(&data).is_empty());
        assert!(from_edge_response(&json!({ "payload": [] })).is_empty());
    }

    #[test]
    fn encode_nested_and_metadata() {
        let c = Consents::new()
            .with(Category::COLLECT, ConsentValue::Yes)
            .with(Category::PERSONALIZE_CONTENT, ConsentValue::No)
            .with_time("2019-09-23T18:15:45Z");
        assert_eq!(
            to_event_data(&c),
            json!({
                "consents": {
                    "collect": { "val": "y" },
                    "personalize": { "content": { "val": "n" } },
                    "metadata": { "time": "2019-09-23T18:15:45Z" }
                }
            })
        );
    }

    #[test]
    fn parent_value_and_nested_child_share_an_entry() {
        let c = Consents::new()
            .with("personalize", ConsentValue::Yes)
            .with(Category::PERSONALIZE_CONTENT, ConsentValue::No);
        let data = to_event_data(&c);
        assert_eq!(
            data,
            json!({
                "consents": {
                    "personalize": { "val": "y", "content": { "val": "n" } }
                }
            })
        );
        assert_eq!(from_event_data(&data), c);
    }

    #[test]
    fn decode_drops_dotted_top_level_keys() {
        let data = json!({
            "consents": {
                "a.b": { "val": "y" },
                "collect": { "val": "n" }
            }
        });
        let c = from_event_data(&data);
        assert_eq!(c, Consents::new().with(Category::COLLECT, ConsentValue::No));
    }

    #[test]
    fn encode_empty_is_present_but_empty() {
        assert_eq!(to_event_data(&Consents::new()), json!({ "consents": {} }));
    }

    #[test]
    fn persisted_blob_parse_error() {
        assert!(from_json_str("{not json").is_err());
        let c = from_json_str(r#"{"consents":{"collect":{"val":"n"}}}"#).unwrap();
        assert_eq!(c.get("collect"), Some(ConsentValue::No));
    }
}
