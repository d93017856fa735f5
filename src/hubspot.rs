//! HubSpot identity provider client
//!
//! Pure HTTP client for the OAuth authorization-code flow: consent URL
//! construction, code exchange, token refresh, and portal metadata lookup.
//! Holds no local state; the token store owns persistence.

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::HubSpotConfig;

/// HubSpot client specific errors
#[derive(Debug, Error)]
pub enum HubSpotError {
    #[error("incomplete HubSpot configuration: missing {0}")]
    Config(&'static str),

    #[error("token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("token refresh failed with status {status}: {body}")]
    TokenRefresh {
        status: u16,
        /// Provider-reported OAuth error code, parsed from the response
        /// body at the point of failure (e.g. `invalid_grant`).
        error_code: Option<String>,
        body: String,
    },

    #[error("failed to retrieve portal information: {0}")]
    PortalInfo(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl HubSpotError {
    /// Whether this failure is a provider-side rejection of the refresh
    /// grant itself. Terminal: the portal must re-authorize, and the stored
    /// token is useless.
    pub fn grant_rejected(&self) -> bool {
        matches!(
            self,
            HubSpotError::TokenRefresh {
                error_code: Some(code),
                ..
            } if code == "invalid_grant"
        )
    }
}

/// Token material returned by the provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
}

/// Portal metadata resolved from an access token.
#[derive(Debug, Clone)]
pub struct PortalInfo {
    pub portal_id: u64,
    pub domain: String,
    pub time_zone: String,
}

/// Access-token introspection payload from the provider.
#[derive(Debug, Deserialize)]
struct AccessTokenInfo {
    hub_id: Option<u64>,
    hub_domain: Option<String>,
}

/// OAuth error payload shape returned by the provider's token endpoint.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
}

/// HubSpot OAuth + metadata client
#[derive(Clone)]
pub struct HubSpotClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    authorize_base: String,
    api_base: String,
}

impl HubSpotClient {
    /// Build a client from validated application configuration.
    pub fn from_config(config: &HubSpotConfig) -> Result<Self, HubSpotError> {
        let client_id = config
            .client_id
            .clone()
            .ok_or(HubSpotError::Config("client_id"))?;
        let client_secret = config
            .client_secret
            .clone()
            .ok_or(HubSpotError::Config("client_secret"))?;
        let redirect_uri = config
            .redirect_uri
            .clone()
            .ok_or(HubSpotError::Config("redirect_uri"))?;

        Ok(Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            redirect_uri,
            scopes: config.scopes.clone(),
            authorize_base: config.authorize_base.clone(),
            api_base: config.api_base.clone(),
        })
    }

    /// Scopes requested during install, in order.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Redirect URI registered with the provider.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the provider consent URL for a portal.
    pub fn generate_auth_url(
        &self,
        portal_id: &str,
        state: Option<&str>,
    ) -> Result<Url, HubSpotError> {
        let mut url = Url::parse(&format!("{}/oauth/authorize", self.authorize_base))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("response_type", "code");

        if !portal_id.is_empty() {
            url.query_pairs_mut().append_pair("portalId", portal_id);
        }

        if let Some(state) = state {
            url.query_pairs_mut().append_pair("state", state);
        }

        info!(portal_id = %portal_id, scopes = ?self.scopes, "Generated auth URL");

        Ok(url)
    }

    /// Exchange an authorization code for a token grant.
    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, HubSpotError> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code".to_string());
        params.insert("client_id", self.client_id.clone());
        params.insert("client_secret", self.client_secret.clone());
        params.insert("redirect_uri", redirect_uri.to_string());
        params.insert("code", code.to_string());

        let response = self
            .http
            .post(format!("{}/oauth/v1/token", self.api_base))
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            let grant: TokenGrant = response.json().await?;
            info!(expires_in = grant.expires_in, "Token exchange successful");
            Ok(grant)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status = status, "Token exchange failed");
            Err(HubSpotError::TokenExchange { status, body })
        }
    }

    /// Refresh an access token using the stored refresh token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, HubSpotError> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token".to_string());
        params.insert("client_id", self.client_id.clone());
        params.insert("client_secret", self.client_secret.clone());
        params.insert("refresh_token", refresh_token.to_string());

        let response = self
            .http
            .post(format!("{}/oauth/v1/token", self.api_base))
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            let grant: TokenGrant = response.json().await?;
            info!(expires_in = grant.expires_in, "Token refresh successful");
            Ok(grant)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let error_code = serde_json::from_str::<ProviderErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.error);
            warn!(status = status, error_code = ?error_code, "Token refresh failed");
            Err(HubSpotError::TokenRefresh {
                status,
                error_code,
                body,
            })
        }
    }

    /// Resolve portal metadata from an access token.
    pub async fn get_portal_info(&self, access_token: &str) -> Result<PortalInfo, HubSpotError> {
        let response = self
            .http
            .get(format!(
                "{}/oauth/v1/access-tokens/{}",
                self.api_base, access_token
            ))
            .send()
            .await
            .map_err(|e| HubSpotError::PortalInfo(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(HubSpotError::PortalInfo(format!(
                "provider returned status {}",
                status
            )));
        }

        let info: AccessTokenInfo = response
            .json()
            .await
            .map_err(|e| HubSpotError::PortalInfo(e.to_string()))?;

        Ok(PortalInfo {
            portal_id: info.hub_id.unwrap_or(0),
            domain: info.hub_domain.unwrap_or_default(),
            time_zone: "UTC".to_string(),
        })
    }

    /// Liveness probe for an access token. Never errors.
    pub async fn validate_token(&self, access_token: &str) -> bool {
        match self.get_portal_info(access_token).await {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "Token validation failed");
                false
            }
        }
    }
}
