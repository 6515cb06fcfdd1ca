// ── Monitored entities ──
//
// Expands managed device names into the binary_sensor entity ids to
// watch. One template render per call; failures degrade to an empty list.

use std::collections::BTreeSet;

use serde_json::Value;
use sorj_api::RestClient;
use tracing::{debug, warn};

const ENTITY_PREFIX: &str = "binary_sensor.";

const EXPANSION_TEMPLATE: &str = r"
{% set esphome_devices = integration_entities('esphome') | map('device_id') | unique | list %}
{% set ns = namespace(devices=[]) %}
{% for name in devices %}
  {% set parent = device_id(name) %}
  {% if parent %}
    {% set children = esphome_devices | select('is_device_attr', 'via_device_id', parent) | list %}
    {% set ns.devices = ns.devices + [parent] + children %}
  {% endif %}
{% endfor %}
{% set out = namespace(entities=[]) %}
{% for did in ns.devices %}
  {% set out.entities = out.entities + (device_entities(did) | select('match', 'binary_sensor') | list) %}
{% endfor %}
{{ out.entities | unique | list | tojson }}
";

/// Template that maps each device to its own and its children's binary sensors.
pub fn expansion_template(device_names: &BTreeSet<String>) -> String {
    let devices = serde_json::to_string(device_names).unwrap_or_else(|_| "[]".into());
    format!("{{% set devices = {devices} %}}{EXPANSION_TEMPLATE}")
}

/// Entity ids to watch for `device_names`. Never fails; see module docs.
pub async fn resolve_entities(client: &RestClient, device_names: &BTreeSet<String>) -> Vec<String> {
    if device_names.is_empty() {
        debug!("no managed devices, skipping entity expansion");
        return Vec::new();
    }

    let rendered = match client.render_template(&expansion_template(device_names)).await {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to expand monitored entities");
            return Vec::new();
        }
    };

    let entities = binary_sensors(rendered);
    debug!(
        device_count = device_names.len(),
        entity_count = entities.len(),
        "resolved monitored entities"
    );
    entities
}

/// Keep only `binary_sensor.` ids, first occurrence wins.
fn binary_sensors(rendered: Value) -> Vec<String> {
    let items = match rendered {
        Value::Array(items) => items,
        // double-encoded by the template endpoint
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(Value::Array(items)) => items,
            _ => {
                warn!(body = %text, "Unexpected entity expansion result");
                return Vec::new();
            }
        },
        other => {
            warn!(body = %other, "Unexpected entity expansion result");
            return Vec::new();
        }
    };

    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id),
            _ => None,
        })
        .filter(|id| id.starts_with(ENTITY_PREFIX))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_embeds_device_list() {
        let names: BTreeSet<String> = ["kitchen".to_owned(), "hall".to_owned()].into();
        let template = expansion_template(&names);
        assert!(template.starts_with(r#"{% set devices = ["hall","kitchen"] %}"#));
        assert!(template.contains("via_device_id"));
    }

    #[test]
    fn filters_to_binary_sensors() {
        let out = binary_sensors(json!(["binary_sensor.kitchen_pi1", "sensor.kitchen_pid"]));
        assert_eq!(out, ["binary_sensor.kitchen_pi1"]);
    }

    #[test]
    fn parses_double_encoded_result_and_dedupes() {
        let out = binary_sensors(json!(
            r#"["binary_sensor.a","binary_sensor.a","light.b","binary_sensor.c"]"#
        ));
        assert_eq!(out, ["binary_sensor.a", "binary_sensor.c"]);
    }

    #[test]
    fn unexpected_shapes_are_empty() {
        assert!(binary_sensors(json!({"error": "x"})).is_empty());
        assert!(binary_sensors(json!("not json")).is_empty());
    }
}
