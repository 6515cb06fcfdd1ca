// Platform REST client
//
// Wraps `reqwest::Client` with URL construction against the platform API
// root and the two endpoints this tool needs: template rendering and
// service invocation.

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for the platform's REST API.
///
/// `base_url` is the API root, e.g. `http://supervisor/core/api` behind the
/// add-on supervisor proxy or `http://homeassistant.local:8123/api` directly.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Serialize)]
struct TemplateRequest<'a> {
    template: &'a str,
}

impl RestClient {
    /// Create a client that authenticates every request with `token`.
    pub fn new(base_url: Url, token: &SecretString, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_bearer_client(token)?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/{path}` without `Url::join`'s last-segment replacement.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Render a template on the platform.
    ///
    /// The endpoint answers with plain text. When that text is valid JSON
    /// (the usual case for `| tojson` templates) the parsed value is
    /// returned; otherwise the raw text comes back as a JSON string.
    pub async fn render_template(&self, template: &str) -> Result<serde_json::Value, Error> {
        let url = self.api_url("template")?;
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(&TemplateRequest { template })
            .send()
            .await
            .map_err(Error::Transport)?;

        let body = check_status(resp).await?;
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }

    /// Invoke `{domain}.{service}` with a JSON body.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        body: &impl Serialize,
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("services/{domain}/{service}"))?;
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        check_status(resp).await.map(drop)
    }
}

/// Return the body on 2xx, map 401 to `Authentication`, everything else to `Api`.
async fn check_status(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::Transport)?;

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "platform rejected the bearer token".into(),
        });
    }
    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown status").to_owned()
            } else {
                body
            },
        });
    }
    Ok(body)
}
