//! # Authentication Handlers
//!
//! OAuth flow endpoints: install (consent redirect), callback (code
//! exchange + portal binding check), refresh, and status. The callback is
//! redirect-only; the rest speak the standard JSON envelope.

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use crate::error::{ApiError, ErrorType, validation_error};
use crate::handlers::types::{
    ApiResponse, CallbackQuery, InstallQuery, RefreshData, RefreshRequest, StatusQuery,
    TokenStatusData, is_valid_crm_id,
};
use crate::hubspot::TokenGrant;
use crate::models::oauth_token::{OAuthToken, TokenUpdate};
use crate::server::AppState;
use crate::token_store::DEFAULT_EXPIRY_THRESHOLD_MINUTES;

/// Build a 302 redirect response.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn error_redirect(base_url: &str, reason: &str) -> Response {
    let encoded: String = url::form_urlencoded::byte_serialize(reason.as_bytes()).collect();
    found(&format!("{}/auth/error?error={}", base_url, encoded))
}

fn success_redirect(base_url: &str, portal_id: &str) -> Response {
    found(&format!("{}/auth/success?portalId={}", base_url, portal_id))
}

/// Start the OAuth install flow for a portal
///
/// Redirects the browser to the provider's consent screen with an
/// anti-forgery state value bound to the portal.
#[utoipa::path(
    get,
    path = "/api/auth/install",
    params(InstallQuery),
    responses(
        (status = 302, description = "Redirect to the provider consent screen"),
        (status = 400, description = "Missing or invalid portalId", body = crate::error::ErrorEnvelope),
        (status = 500, description = "Internal server error", body = crate::error::ErrorEnvelope)
    ),
    tag = "auth"
)]
pub async fn install(
    State(state): State<AppState>,
    Query(query): Query<InstallQuery>,
) -> Result<Response, ApiError> {
    let Some(portal_id) = query.portal_id.filter(|p| !p.is_empty()) else {
        warn!("Missing portalId parameter on install");
        return Err(ErrorType::Validation.with_message("Portal ID is required"));
    };

    if !is_valid_crm_id(&portal_id) {
        warn!(portal_id = %portal_id, "Invalid portalId format on install");
        return Err(ErrorType::Validation.with_message("Invalid Portal ID format"));
    }

    // Anti-forgery state bound to the portal; the callback cross-checks the
    // prefix against the provider-reported portal id.
    let state_param = query
        .state
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{}_{}", portal_id, Utc::now().timestamp_millis()));

    let auth_url = state
        .hubspot
        .generate_auth_url(&portal_id, Some(&state_param))
        .map_err(|err| {
            error!(error = %err, portal_id = %portal_id, "Failed to build authorization URL");
            ErrorType::Internal.with_message("Installation failed. Please try again.")
        })?;

    info!(portal_id = %portal_id, state = %state_param, "OAuth installation initiated");

    Ok(found(auth_url.as_str()))
}

/// Complete the OAuth flow after the provider redirects back
///
/// Always responds with a redirect: to the success page once the token is
/// stored, or to the error page with a machine-readable reason.
#[utoipa::path(
    get,
    path = "/api/auth/callback",
    params(CallbackQuery),
    responses(
        (status = 302, description = "Redirect to the success or error page")
    ),
    tag = "auth"
)]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let base_url = state.config.public_base_url.trim_end_matches('/').to_string();

    if let Some(provider_error) = query.error.filter(|e| !e.is_empty()) {
        error!(error = %provider_error, "Provider reported an OAuth error");
        return error_redirect(&base_url, &provider_error);
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        warn!("Missing authorization code on callback");
        return error_redirect(&base_url, "missing_code");
    };

    let Some(state_param) = query.state.filter(|s| !s.is_empty()) else {
        warn!("Missing state parameter on callback");
        return error_redirect(&base_url, "missing_state");
    };

    info!(state = %state_param, "Processing OAuth callback");

    let grant = match state
        .hubspot
        .exchange_code_for_tokens(&code, state.hubspot.redirect_uri())
        .await
    {
        Ok(grant) => grant,
        Err(err) => {
            error!(error = %err, "Token exchange failed during callback");
            return error_redirect(&base_url, "callback_failed");
        }
    };

    let portal_info = match state.hubspot.get_portal_info(&grant.access_token).await {
        Ok(info) => info,
        Err(err) => {
            error!(error = %err, "Portal info lookup failed during callback");
            return error_redirect(&base_url, "callback_failed");
        }
    };

    // Cross-check the portal id embedded in the state value against the
    // portal the provider actually issued the token for. A mismatch means
    // the callback was not produced by our install redirect; abort without
    // storing anything.
    let expected_portal = state_param.split('_').next().unwrap_or_default();
    let actual_portal = portal_info.portal_id.to_string();
    if expected_portal != actual_portal {
        error!(
            expected_portal = %expected_portal,
            actual_portal = %actual_portal,
            "Portal ID mismatch on callback"
        );
        return error_redirect(&base_url, "portal_mismatch");
    }

    let token = build_token(&actual_portal, &grant, state.hubspot.scopes());

    if let Err(err) = state.token_store.store(&token).await {
        error!(error = %err, portal_id = %actual_portal, "Failed to store token");
        return error_redirect(&base_url, "callback_failed");
    }

    info!(
        portal_id = %actual_portal,
        expires_at = %token.expires_at,
        scopes = ?token.scopes,
        "OAuth flow completed"
    );

    success_redirect(&base_url, &actual_portal)
}

fn build_token(portal_id: &str, grant: &TokenGrant, scopes: &[String]) -> OAuthToken {
    let now = Utc::now();
    OAuthToken {
        portal_id: portal_id.to_string(),
        access_token: grant.access_token.clone(),
        refresh_token: grant.refresh_token.clone(),
        expires_at: now + Duration::seconds(grant.expires_in as i64),
        scopes: scopes.to_vec(),
        created_at: now,
        updated_at: now,
    }
}

/// Refresh a portal's access token
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed; payload carries expiry and scopes"),
        (status = 400, description = "Missing portalId", body = crate::error::ErrorEnvelope),
        (status = 401, description = "No stored token, or the provider rejected the refresh grant", body = crate::error::ErrorEnvelope),
        (status = 500, description = "Internal server error", body = crate::error::ErrorEnvelope)
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<RefreshData>>, ApiError> {
    let Some(portal_id) = body.portal_id.filter(|p| !p.is_empty()) else {
        warn!("Missing portalId parameter on refresh");
        return Err(ErrorType::Validation.with_message("Portal ID is required"));
    };

    info!(portal_id = %portal_id, "Token refresh requested");

    let Some(existing) = state.token_store.get(&portal_id).await? else {
        warn!(portal_id = %portal_id, "Token not found for refresh");
        return Err(ErrorType::Authentication
            .with_message("No authentication token found. Please reconnect your account."));
    };

    let grant = match state.hubspot.refresh_token(&existing.refresh_token).await {
        Ok(grant) => grant,
        Err(err) if err.grant_rejected() => {
            // The provider will never accept this refresh token again; drop
            // the credential so status reports unauthenticated.
            warn!(portal_id = %portal_id, "Refresh grant rejected, removing stored token");
            if let Err(delete_err) = state.token_store.delete(&portal_id).await {
                warn!(portal_id = %portal_id, error = %delete_err, "Failed to remove rejected token");
            }
            return Err(ErrorType::TokenExpired.with_message(
                "Refresh token is invalid or expired. Please reconnect your account.",
            ));
        }
        Err(err) => {
            error!(portal_id = %portal_id, error = %err, "Token refresh failed");
            return Err(
                ErrorType::Internal.with_message("Failed to refresh authentication token")
            );
        }
    };

    let update = TokenUpdate {
        access_token: Some(grant.access_token.clone()),
        refresh_token: Some(grant.refresh_token.clone()),
        expires_at: Some(Utc::now() + Duration::seconds(grant.expires_in as i64)),
        scopes: None,
    };

    let Some(updated) = state.token_store.update(&portal_id, update).await? else {
        // The stored token expired between the read and the rewrite.
        warn!(portal_id = %portal_id, "Token disappeared during refresh");
        return Err(ErrorType::Authentication
            .with_message("No authentication token found. Please reconnect your account."));
    };

    info!(portal_id = %portal_id, expires_at = %updated.expires_at, "Token refreshed");

    Ok(Json(ApiResponse::ok(RefreshData {
        expires_at: updated.expires_at,
        scopes: updated.scopes,
    })))
}

/// Report the authentication status for a portal
#[utoipa::path(
    get,
    path = "/api/auth/status",
    params(StatusQuery),
    responses(
        (status = 200, description = "Token status; isValid false when absent, expired, or rejected by the provider"),
        (status = 400, description = "Missing portalId", body = crate::error::ErrorEnvelope),
        (status = 500, description = "Internal server error", body = crate::error::ErrorEnvelope)
    ),
    tag = "auth"
)]
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<TokenStatusData>>, ApiError> {
    let Some(portal_id) = query.portal_id.filter(|p| !p.is_empty()) else {
        warn!("Missing portalId parameter on status");
        return Err(validation_error(
            "Portal ID is required",
            serde_json::json!(["Portal ID is required"]),
        ));
    };

    // Lazy expiry inside `get` already removes an expired-but-present row.
    let Some(token) = state.token_store.get(&portal_id).await? else {
        return Ok(Json(ApiResponse::ok(TokenStatusData::invalid())));
    };

    if !state.hubspot.validate_token(&token.access_token).await {
        warn!(portal_id = %portal_id, "Token failed provider validation, removing");
        state.token_store.delete(&portal_id).await?;
        return Ok(Json(ApiResponse::ok(TokenStatusData::invalid())));
    }

    let is_expiring_soon = state
        .token_store
        .is_expiring_soon(&portal_id, DEFAULT_EXPIRY_THRESHOLD_MINUTES)
        .await;

    Ok(Json(ApiResponse::ok(TokenStatusData {
        is_valid: true,
        expires_at: Some(token.expires_at),
        scopes: Some(token.scopes),
        portal_id: Some(token.portal_id),
        is_expiring_soon: Some(is_expiring_soon),
    })))
}
