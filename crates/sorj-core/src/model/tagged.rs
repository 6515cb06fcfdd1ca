// ── JSON form of YAML tags ──
//
// JSON has no tags. A tagged node travels as `{"$tag": "!secret",
// "value": ...}` and comes back as the same tagged node, so untyped
// regions of a config survive a trip through the HTTP API. Use these
// modules with `#[serde(with = ...)]` on every field holding raw YAML.

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};

const TAG_KEY: &str = "$tag";
const VALUE_KEY: &str = "value";

/// Borrowed node that writes tags in their JSON form, at any depth.
struct Encoded<'a>(&'a Value);

impl Serialize for Encoded<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Tagged(tagged) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(TAG_KEY, &tagged.tag.to_string())?;
                map.serialize_entry(VALUE_KEY, &Encoded(&tagged.value))?;
                map.end()
            }
            Value::Mapping(mapping) => serialize_mapping(mapping, serializer),
            Value::Sequence(items) => serializer.collect_seq(items.iter().map(Encoded)),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                self.0.serialize(serializer)
            }
        }
    }
}

fn serialize_mapping<S: Serializer>(mapping: &Mapping, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(mapping.iter().map(|(k, v)| (Encoded(k), Encoded(v))))
}

/// Restore tagged nodes from their JSON form, at any depth.
fn decode(node: Value) -> Value {
    match node {
        Value::Mapping(mapping) => decode_mapping_node(mapping),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(decode).collect()),
        other => other,
    }
}

fn decode_mapping_node(mut mapping: Mapping) -> Value {
    let tag = match mapping.get(TAG_KEY) {
        Some(Value::String(tag))
            if !tag.is_empty() && mapping.len() == 2 && mapping.contains_key(VALUE_KEY) =>
        {
            Some(tag.clone())
        }
        _ => None,
    };
    match tag {
        Some(tag) => {
            let value = mapping.remove(VALUE_KEY).unwrap_or(Value::Null);
            Value::Tagged(Box::new(TaggedValue {
                tag: Tag::new(tag),
                value: decode(value),
            }))
        }
        None => Value::Mapping(decode_entries(mapping)),
    }
}

fn decode_entries(mapping: Mapping) -> Mapping {
    mapping
        .into_iter()
        .map(|(key, value)| (decode(key), decode(value)))
        .collect()
}

/// `with` module for a single [`Value`].
pub mod value {
    use super::{Deserialize, Deserializer, Encoded, Serialize, Serializer, Value, decode};

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        Encoded(value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer).map(decode)
    }
}

/// `with` module for a [`Mapping`].
pub mod mapping {
    use super::{Deserialize, Deserializer, Mapping, Serializer, decode_entries, serialize_mapping};

    pub fn serialize<S: Serializer>(mapping: &Mapping, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_mapping(mapping, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mapping, D::Error> {
        Mapping::deserialize(deserializer).map(decode_entries)
    }
}

/// `with` module for string-keyed maps such as substitutions and vars.
pub mod map {
    use super::{Deserialize, Deserializer, Encoded, IndexMap, Serializer, Value, decode};

    pub fn serialize<S: Serializer>(
        map: &IndexMap<String, Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(map.iter().map(|(k, v)| (k, Encoded(v))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<String, Value>, D::Error> {
        let map = IndexMap::<String, Value>::deserialize(deserializer)?;
        Ok(map.into_iter().map(|(k, v)| (k, decode(v))).collect())
    }
}
