//! End-to-end tests for the OAuth flow endpoints.
//!
//! These tests spawn the full application against a mock identity
//! provider and walk install → callback → status → refresh, including the
//! portal-binding security check and forced-expiry behavior.

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{sample_token, spawn_test_app, test_config};

fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client builds")
}

async fn mount_token_grant(server: &MockServer, grant_type: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/v1/token"))
        .and(body_string_contains(format!("grant_type={}", grant_type)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "granted-access",
            "refresh_token": "granted-refresh",
            "expires_in": 1800
        })))
        .mount(server)
        .await;
}

async fn mount_portal_info(server: &MockServer, access_token: &str, hub_id: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/oauth/v1/access-tokens/{}", access_token)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hub_id": hub_id,
            "hub_domain": "example.hubspot.com"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_install_redirects_to_consent_url() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, _state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let response = no_redirect_client()
        .get(format!("{}/api/auth/install?portalId=12345", base))
        .send()
        .await?;

    assert_eq!(response.status(), 302);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header present");

    assert!(location.starts_with(&format!("{}/oauth/authorize", hubspot.uri())));
    assert!(location.contains("client_id=test-client-id"));
    assert!(location.contains("redirect_uri="));
    assert!(location.contains("portalId=12345"));
    assert!(location.contains("state=12345_"));
    assert!(location.contains("response_type=code"));

    Ok(())
}

#[tokio::test]
async fn test_install_requires_portal_id() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, _state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let response = no_redirect_client()
        .get(format!("{}/api/auth/install", base))
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_FAILED"));
    assert!(body["requestId"].is_string());
    assert!(body["timestamp"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_callback_stores_token_and_redirects_to_success() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    mount_token_grant(&hubspot, "authorization_code").await;
    mount_portal_info(&hubspot, "granted-access", 12345).await;

    let response = no_redirect_client()
        .get(format!(
            "{}/api/auth/callback?code=auth-code&state=12345_1700000000000",
            base
        ))
        .send()
        .await?;

    assert_eq!(response.status(), 302);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header present");
    assert_eq!(
        location,
        "https://bridge.example.com/auth/success?portalId=12345"
    );

    let token = state
        .token_store
        .get("12345")
        .await?
        .expect("token stored");
    assert_eq!(token.access_token, "granted-access");
    assert_eq!(token.refresh_token, "granted-refresh");
    assert!(token.expires_at > Utc::now());
    assert_eq!(
        token.scopes,
        vec![
            "crm.objects.contacts.read".to_string(),
            "crm.objects.companies.read".to_string()
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_callback_portal_mismatch_stores_nothing() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    mount_token_grant(&hubspot, "authorization_code").await;
    // Provider reports a different portal than the one bound in the state
    mount_portal_info(&hubspot, "granted-access", 111).await;

    let response = no_redirect_client()
        .get(format!(
            "{}/api/auth/callback?code=auth-code&state=999_1700000000000",
            base
        ))
        .send()
        .await?;

    assert_eq!(response.status(), 302);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header present");
    assert_eq!(
        location,
        "https://bridge.example.com/auth/error?error=portal_mismatch"
    );

    assert!(state.token_store.get("111").await?.is_none());
    assert!(state.token_store.get("999").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_callback_parameter_and_provider_errors_redirect() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, _state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let client = no_redirect_client();

    let cases = [
        (
            format!("{}/api/auth/callback?state=12345_1", base),
            "missing_code",
        ),
        (
            format!("{}/api/auth/callback?code=auth-code", base),
            "missing_state",
        ),
        (
            format!("{}/api/auth/callback?error=access_denied", base),
            "access_denied",
        ),
    ];

    for (url, reason) in cases {
        let response = client.get(&url).send().await?;
        assert_eq!(response.status(), 302);
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .expect("location header present");
        assert_eq!(
            location,
            format!("https://bridge.example.com/auth/error?error={}", reason)
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_callback_exchange_failure_redirects() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, _state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    Mock::given(method("POST"))
        .and(path("/oauth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_code"})))
        .mount(&hubspot)
        .await;

    let response = no_redirect_client()
        .get(format!(
            "{}/api/auth/callback?code=bad-code&state=12345_1",
            base
        ))
        .send()
        .await?;

    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header present");
    assert_eq!(
        location,
        "https://bridge.example.com/auth/error?error=callback_failed"
    );

    Ok(())
}

#[tokio::test]
async fn test_status_reports_valid_token() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let token = sample_token("12345", 60);
    state.token_store.store(&token).await?;
    mount_portal_info(&hubspot, &token.access_token, 12345).await;

    let response = reqwest::get(format!("{}/api/auth/status?portalId=12345", base)).await?;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["isValid"], json!(true));
    assert_eq!(body["data"]["portalId"], json!("12345"));
    assert_eq!(body["data"]["isExpiringSoon"], json!(false));
    assert_eq!(
        body["data"]["scopes"],
        json!(["crm.objects.contacts.read", "crm.objects.companies.read"])
    );
    assert!(body["data"]["expiresAt"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_status_absent_token_reports_invalid() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, _state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let response = reqwest::get(format!("{}/api/auth/status?portalId=12345", base)).await?;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["data"]["isValid"], json!(false));
    assert!(body["data"].get("expiresAt").is_none());

    Ok(())
}

#[tokio::test]
async fn test_status_forced_expiry_reports_invalid_and_removes_entry() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let mut token = sample_token("12345", 60);
    token.expires_at = Utc::now() - Duration::seconds(1);
    state.token_store.store(&token).await?;

    let response = reqwest::get(format!("{}/api/auth/status?portalId=12345", base)).await?;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["data"]["isValid"], json!(false));

    // The expired entry is gone, not just reported invalid
    assert!(state.token_store.get("12345").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_status_provider_invalid_token_is_deleted() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let token = sample_token("12345", 60);
    state.token_store.store(&token).await?;

    Mock::given(method("GET"))
        .and(path(format!(
            "/oauth/v1/access-tokens/{}",
            token.access_token
        )))
        .respond_with(ResponseTemplate::new(401))
        .mount(&hubspot)
        .await;

    let response = reqwest::get(format!("{}/api/auth/status?portalId=12345", base)).await?;
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["isValid"], json!(false));

    assert!(state.token_store.get("12345").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_refresh_without_token_is_unauthorized() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, _state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/refresh", base))
        .json(&json!({"portalId": "12345"}))
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], json!("UNAUTHORIZED"));

    Ok(())
}

#[tokio::test]
async fn test_refresh_rotates_stored_token() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    state.token_store.store(&sample_token("12345", 10)).await?;
    mount_token_grant(&hubspot, "refresh_token").await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/refresh", base))
        .json(&json!({"portalId": "12345"}))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], json!(true));
    assert!(body["data"]["expiresAt"].is_string());
    assert_eq!(
        body["data"]["scopes"],
        json!(["crm.objects.contacts.read", "crm.objects.companies.read"])
    );

    let token = state
        .token_store
        .get("12345")
        .await?
        .expect("token still present");
    assert_eq!(token.access_token, "granted-access");
    assert_eq!(token.refresh_token, "granted-refresh");

    Ok(())
}

#[tokio::test]
async fn test_refresh_grant_rejection_deletes_token() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    state.token_store.store(&sample_token("12345", 10)).await?;

    Mock::given(method("POST"))
        .and(path("/oauth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&hubspot)
        .await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/refresh", base))
        .json(&json!({"portalId": "12345"}))
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], json!("TOKEN_EXPIRED"));

    assert!(state.token_store.get("12345").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_full_flow_install_callback_status_expiry() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    mount_token_grant(&hubspot, "authorization_code").await;
    mount_portal_info(&hubspot, "granted-access", 12345).await;

    let client = no_redirect_client();

    // Install points the browser at the consent screen, state bound to the portal
    let response = client
        .get(format!("{}/api/auth/install?portalId=12345", base))
        .send()
        .await?;
    assert_eq!(response.status(), 302);
    let consent_url = url::Url::parse(
        response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .expect("location header present"),
    )?;
    let state_param = consent_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter present");
    assert!(state_param.starts_with("12345_"));

    // The provider redirects back with the code and the same state
    let response = client
        .get(format!(
            "{}/api/auth/callback?code=auth-code&state={}",
            base, state_param
        ))
        .send()
        .await?;
    assert_eq!(response.status(), 302);
    assert_eq!(
        response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok()),
        Some("https://bridge.example.com/auth/success?portalId=12345")
    );

    // Status now reports the stored token as valid
    let body: Value = reqwest::get(format!("{}/api/auth/status?portalId=12345", base))
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["isValid"], json!(true));
    assert_eq!(
        body["data"]["scopes"],
        json!(["crm.objects.contacts.read", "crm.objects.companies.read"])
    );

    // Force the stored expiry into the past; status flips to invalid and
    // the entry is gone afterwards
    let mut expired = state
        .token_store
        .get("12345")
        .await?
        .expect("token stored");
    expired.expires_at = Utc::now() - Duration::seconds(1);
    state.token_store.store(&expired).await?;

    let body: Value = reqwest::get(format!("{}/api/auth/status?portalId=12345", base))
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["isValid"], json!(false));
    assert!(state.token_store.get("12345").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_refresh_requires_portal_id() -> anyhow::Result<()> {
    let hubspot = MockServer::start().await;
    let intel = MockServer::start().await;
    let (base, _state, _server) = spawn_test_app(test_config(&hubspot.uri(), &intel.uri())).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/refresh", base))
        .json(&json!({}))
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], json!("VALIDATION_FAILED"));

    Ok(())
}
