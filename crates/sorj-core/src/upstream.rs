// ── Upstream facade ──
//
// The only place the credential policy is applied. Live mode talks to the
// platform; mock mode serves fixed sample data; unavailable mode fails
// every call with `MissingCredential`.

use std::collections::BTreeSet;

use secrecy::SecretString;
use serde_json::{Value, json};
use sorj_api::RestClient;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CredentialPolicy, ManagerConfig};
use crate::error::CoreError;
use crate::monitored;

/// Ports probed when exporting `text.<name>_pi<i>action` states.
pub const EXPORT_PORT_RANGE: std::ops::RangeInclusive<u8> = 1..=32;

const SAMPLE_AREAS: [&str; 4] = ["living_room", "kitchen", "bedroom", "garage"];

/// Connected upstream: REST client plus what the relay needs.
#[derive(Debug, Clone)]
pub struct LiveUpstream {
    pub(crate) rest: RestClient,
    pub(crate) websocket_url: Url,
    pub(crate) token: SecretString,
}

#[derive(Debug, Clone)]
pub enum Upstream {
    Live(LiveUpstream),
    Mock,
    Unavailable,
}

impl Upstream {
    /// Resolve the credential policy once.
    pub fn from_config(config: &ManagerConfig) -> Result<Self, CoreError> {
        match (&config.upstream, config.credential_policy) {
            (Some(upstream), _) => {
                let rest = RestClient::new(
                    upstream.base_url.clone(),
                    &upstream.token,
                    &upstream.transport(),
                )?;
                Ok(Self::Live(LiveUpstream {
                    rest,
                    websocket_url: upstream.websocket_url.clone(),
                    token: upstream.token.clone(),
                }))
            }
            (None, CredentialPolicy::MockData) => {
                info!("No upstream credential, serving mock data");
                Ok(Self::Mock)
            }
            (None, CredentialPolicy::Error) => {
                warn!("No upstream credential, upstream-backed endpoints are disabled");
                Ok(Self::Unavailable)
            }
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    pub(crate) fn live(&self) -> Result<Option<&LiveUpstream>, CoreError> {
        match self {
            Self::Live(live) => Ok(Some(live)),
            Self::Mock => Ok(None),
            Self::Unavailable => Err(CoreError::MissingCredential),
        }
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Area ids known to the platform.
    pub async fn areas(&self) -> Result<Vec<String>, CoreError> {
        let Some(live) = self.live()? else {
            return Ok(SAMPLE_AREAS.iter().map(|&a| a.to_owned()).collect());
        };
        let rendered = live.rest.render_template("{{ areas() }}").await?;
        parse_areas(rendered)
    }

    /// Binary sensors belonging to `device_names`.
    pub async fn monitored_entities(
        &self,
        device_names: &BTreeSet<String>,
    ) -> Result<Vec<String>, CoreError> {
        match self.live()? {
            Some(live) => Ok(monitored::resolve_entities(&live.rest, device_names).await),
            None => Ok(Vec::new()),
        }
    }

    /// `text.<name>_pi<i>action;"<value>"` lines for every known port state.
    pub async fn export_port_states(&self, device_name: &str) -> Result<String, CoreError> {
        if device_name.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: "device name is required".into(),
            });
        }
        let Some(live) = self.live()? else {
            return Ok(String::new());
        };

        let safe_name = sanitize_device_name(device_name.trim());
        let rendered = live.rest.render_template(&export_template(&safe_name)).await?;
        let csv = match rendered {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let csv = csv.trim().to_owned();
        debug!(device_name = %safe_name, lines = csv.lines().count(), "exported port states");
        Ok(csv)
    }

    /// Write one exported value back through `text.set_value`.
    pub async fn restore_port_state(&self, entity_id: &str, value: &str) -> Result<(), CoreError> {
        if entity_id.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: "entity_id is required".into(),
            });
        }
        let Some(live) = self.live()? else {
            info!(entity_id, "Mock mode, ignoring restore");
            return Ok(());
        };
        live.rest
            .call_service(
                "text",
                "set_value",
                &json!({ "entity_id": entity_id, "value": value }),
            )
            .await?;
        info!(entity_id, "Restored port state");
        Ok(())
    }
}

/// Lowercase and collapse whitespace runs into `_`.
pub fn sanitize_device_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.extend(c.to_lowercase());
            in_space = false;
        }
    }
    out
}

/// The name goes in as a JSON string, which Jinja reads as a literal.
fn export_template(safe_name: &str) -> String {
    let name = Value::from(safe_name).to_string();
    format!(
        r#"{{% set name = {name} %}}
{{% set result = namespace(lines=[]) %}}
{{% for i in range({start}, {end}) %}}
  {{% set entity_id = 'text.' ~ name ~ '_pi' ~ i ~ 'action' %}}
  {{% if states[entity_id] is defined %}}
    {{% set val = states(entity_id) %}}
    {{% if val != 'unknown' and val != 'unavailable' %}}
      {{% set result.lines = result.lines + [entity_id ~ ';"' ~ val ~ '"'] %}}
    {{% endif %}}
  {{% endif %}}
{{% endfor %}}
{{{{ result.lines | join('\n') }}}}"#,
        start = EXPORT_PORT_RANGE.start(),
        end = EXPORT_PORT_RANGE.end() + 1,
    )
}

/// `{{ areas() }}` renders a Python list repr; normalise quotes first.
fn parse_areas(rendered: Value) -> Result<Vec<String>, CoreError> {
    let parsed = match rendered {
        Value::String(text) => serde_json::from_str::<Value>(&text.replace('\'', "\"")).map_err(|e| {
            CoreError::Upstream {
                message: format!("unexpected areas() result: {e}"),
                status: None,
            }
        })?,
        other => other,
    };

    match parsed {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(area) => Some(area),
                _ => None,
            })
            .collect()),
        other => Err(CoreError::Upstream {
            message: format!("unexpected areas() result: {other}"),
            status: None,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_matches_export_naming() {
        assert_eq!(sanitize_device_name("My Device"), "my_device");
        assert_eq!(sanitize_device_name("Hall   Lights\t2"), "hall_lights_2");
        assert_eq!(sanitize_device_name("kitchen"), "kitchen");
    }

    #[test]
    fn export_template_covers_all_ports() {
        let t = export_template("kitchen");
        assert!(t.starts_with(r#"{% set name = "kitchen" %}"#));
        assert!(t.contains("range(1, 33)"));
        assert!(t.ends_with("{{ result.lines | join('\\n') }}"));
    }

    #[test]
    fn export_template_escapes_quotes_in_name() {
        let t = export_template(&sanitize_device_name("Kid's \"Den\""));
        assert!(t.starts_with(r#"{% set name = "kid's_\"den\"" %}"#));
    }

    #[test]
    fn areas_from_python_repr() {
        let areas = parse_areas(Value::String("['kitchen', 'living_room']".into())).unwrap();
        assert_eq!(areas, ["kitchen", "living_room"]);
    }

    #[test]
    fn areas_from_json_array() {
        let areas = parse_areas(json!(["garage"])).unwrap();
        assert_eq!(areas, ["garage"]);
    }

    #[test]
    fn areas_garbage_is_upstream_error() {
        assert!(matches!(
            parse_areas(Value::String("<html>".into())),
            Err(CoreError::Upstream { .. })
        ));
    }

    #[tokio::test]
    async fn unavailable_fails_with_missing_credential() {
        let upstream = Upstream::from_config(&ManagerConfig::default()).unwrap();
        assert!(matches!(upstream.areas().await, Err(CoreError::MissingCredential)));
        assert!(matches!(
            upstream.restore_port_state("text.a", "on").await,
            Err(CoreError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn mock_serves_samples() {
        let config = ManagerConfig {
            credential_policy: CredentialPolicy::MockData,
            ..ManagerConfig::default()
        };
        let upstream = Upstream::from_config(&config).unwrap();
        assert_eq!(upstream.areas().await.unwrap().len(), SAMPLE_AREAS.len());
        assert!(upstream
            .monitored_entities(&BTreeSet::from(["kitchen".to_owned()]))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(upstream.export_port_states("kitchen").await.unwrap(), "");
        upstream.restore_port_state("text.kitchen_pi1action", "on").await.unwrap();
    }

    #[tokio::test]
    async fn input_errors_win_over_credential_errors() {
        let upstream = Upstream::Unavailable;
        assert!(matches!(
            upstream.export_port_states("   ").await,
            Err(CoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            upstream.restore_port_state("", "x").await,
            Err(CoreError::InvalidInput { .. })
        ));
    }
}
