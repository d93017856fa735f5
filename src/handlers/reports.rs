//! # Report Handlers
//!
//! Report discovery and access-URL generation. Discovery failures degrade
//! to an empty list; only this endpoint's own validation and auth failures
//! surface as errors.

use axum::{
    Json,
    extract::{Query, State},
};
use tracing::{error, info, warn};
use url::Url;

use crate::error::{ApiError, ErrorType, validation_error};
use crate::handlers::types::{
    ApiResponse, AvailabilityParams, GenerateUrlData, GenerateUrlRequest, ReportAvailabilityData,
    validate_report_query,
};
use crate::server::AppState;
use crate::telemetry;
use crate::token_store::DEFAULT_EXPIRY_THRESHOLD_MINUTES;

/// List reports discoverable for a contact or company record
#[utoipa::path(
    get,
    path = "/api/reports/available",
    params(AvailabilityParams),
    responses(
        (status = 200, description = "Discoverable reports; an empty list when the upstream search fails"),
        (status = 400, description = "Invalid record identifiers", body = crate::error::ErrorEnvelope),
        (status = 401, description = "No stored token for the portal", body = crate::error::ErrorEnvelope),
        (status = 500, description = "Internal server error", body = crate::error::ErrorEnvelope)
    ),
    tag = "reports"
)]
pub async fn available(
    State(state): State<AppState>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<ApiResponse<ReportAvailabilityData>>, ApiError> {
    let query = validate_report_query(params.contact_id, params.company_id, params.portal_id)
        .map_err(|errors| {
            warn!(errors = ?errors, "Invalid report discovery parameters");
            validation_error(&errors.join(", "), serde_json::json!(errors))
        })?;

    info!(
        contact_id = ?query.contact_id,
        company_id = ?query.company_id,
        portal_id = %query.portal_id,
        "Checking report availability"
    );

    if state.token_store.get(&query.portal_id).await?.is_none() {
        warn!(portal_id = %query.portal_id, "No valid token for report discovery");
        return Err(ErrorType::Authentication
            .with_message("Authentication required. Please reconnect your HubSpot account."));
    }

    if state
        .token_store
        .is_expiring_soon(&query.portal_id, DEFAULT_EXPIRY_THRESHOLD_MINUTES)
        .await
    {
        // Discovery still proceeds with the current token; the UI drives
        // refresh through the dedicated endpoint.
        info!(portal_id = %query.portal_id, "Token expiring soon");
    }

    let reports = state.intel.check_report_availability(&query).await;

    info!(
        portal_id = %query.portal_id,
        total = reports.len(),
        "Report availability checked"
    );

    Ok(Json(ApiResponse::ok(ReportAvailabilityData { reports })))
}

/// Generate a signed access URL for one report
#[utoipa::path(
    post,
    path = "/api/reports/generate-url",
    request_body = GenerateUrlRequest,
    responses(
        (status = 200, description = "Signed access URL with a 24-hour expiry"),
        (status = 400, description = "Missing slug", body = crate::error::ErrorEnvelope),
        (status = 401, description = "No stored token for the portal", body = crate::error::ErrorEnvelope),
        (status = 404, description = "Report not found", body = crate::error::ErrorEnvelope),
        (status = 500, description = "Internal server error", body = crate::error::ErrorEnvelope)
    ),
    tag = "reports"
)]
pub async fn generate_url(
    State(state): State<AppState>,
    Json(body): Json<GenerateUrlRequest>,
) -> Result<Json<ApiResponse<GenerateUrlData>>, ApiError> {
    let Some(slug) = body.slug.filter(|s| !s.is_empty()) else {
        warn!("Missing slug parameter on generate-url");
        return Err(ErrorType::Validation.with_message("Report slug is required"));
    };

    info!(
        slug = %slug,
        contact_id = ?body.contact_id,
        company_id = ?body.company_id,
        portal_id = ?body.portal_id,
        "Generating report URL"
    );

    // Portal binding is optional for this endpoint, but when a portal is
    // named its token must exist.
    if let Some(portal_id) = body.portal_id.as_deref().filter(|p| !p.is_empty())
        && state.token_store.get(portal_id).await?.is_none()
    {
        warn!(portal_id = %portal_id, "No valid token for report URL generation");
        return Err(ErrorType::Authentication
            .with_message("Authentication required. Please reconnect your HubSpot account."));
    }

    // A 404 from the record fetch maps to REPORT_NOT_FOUND through the
    // tagged upstream error kind.
    let record = state.intel.get_report(&slug).await.map_err(ApiError::from)?;

    let request_id =
        telemetry::current_request_id().unwrap_or_else(telemetry::generate_request_id);

    let (link_token, expires_at) = state
        .link_signer
        .issue(
            &record.slug,
            &record.id,
            body.contact_id.clone(),
            body.company_id.clone(),
            body.portal_id.clone(),
            &request_id,
        )
        .map_err(|err| {
            error!(error = %err, slug = %record.slug, "Failed to sign report link");
            ErrorType::Internal.with_message("Failed to generate report URL. Please try again.")
        })?;

    let mut url = Url::parse(&state.intel.report_url(&record.slug, None)).map_err(|err| {
        error!(error = %err, slug = %record.slug, "Report URL is not parseable");
        ErrorType::Internal.with_message("Failed to generate report URL. Please try again.")
    })?;
    url.query_pairs_mut().append_pair("token", &link_token);

    info!(
        slug = %record.slug,
        report_id = %record.id,
        expires_at = %expires_at,
        "Report URL generated"
    );

    Ok(Json(ApiResponse::ok(GenerateUrlData {
        url: url.to_string(),
        expires_at,
        report_id: record.id,
        slug: record.slug,
    })))
}
