// Integration tests for `RestClient` using wiremock.
#![allow(clippy::unwrap_used)]

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sorj_api::{Error, RestClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&format!("{}/core/api", server.uri())).unwrap();
    let client = RestClient::new(
        base,
        &SecretString::from("test-token"),
        &TransportConfig::default(),
    )
    .unwrap();
    (server, client)
}

// ── Template rendering ──────────────────────────────────────────────

#[tokio::test]
async fn test_render_template_parses_json_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/core/api/template"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({ "template": "{{ 1 + 1 }}" })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"["binary_sensor.a","binary_sensor.b"]"#))
        .expect(1)
        .mount(&server)
        .await;

    let value = client.render_template("{{ 1 + 1 }}").await.unwrap();
    assert_eq!(value, json!(["binary_sensor.a", "binary_sensor.b"]));
}

#[tokio::test]
async fn test_render_template_falls_back_to_string() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/core/api/template"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[{'area_id': 'kitchen'}]"))
        .mount(&server)
        .await;

    let value = client.render_template("{{ areas() }}").await.unwrap();
    assert_eq!(value, json!("[{'area_id': 'kitchen'}]"));
}

// ── Service calls ───────────────────────────────────────────────────

#[tokio::test]
async fn test_call_service_posts_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/core/api/services/text/set_value"))
        .and(body_json(json!({ "entity_id": "text.kitchen_pi1action", "value": "off" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    client
        .call_service(
            "text",
            "set_value",
            &json!({ "entity_id": "text.kitchen_pi1action", "value": "off" }),
        )
        .await
        .unwrap();
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/core/api/template"))
        .respond_with(ResponseTemplate::new(401).set_body_string("401: Unauthorized"))
        .mount(&server)
        .await;

    let err = client.render_template("{{ 1 }}").await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn test_server_error_maps_to_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/core/api/services/text/set_value"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client
        .call_service("text", "set_value", &json!({}))
        .await
        .unwrap_err();
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let client = RestClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:1/api").unwrap(),
    );
    let err = client.render_template("{{ 1 }}").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
