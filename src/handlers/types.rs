//! # Common API Types
//!
//! Shared request/response types for the API handlers: the standard
//! success envelope, endpoint payloads, and record-id validation helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::intel::{AvailabilityQuery, ReportDescriptor};
use crate::telemetry;

/// Success response envelope shared by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    /// ISO-8601 response timestamp
    pub timestamp: String,
    /// Opaque per-request correlation string
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    /// Wrap `data` in the success envelope, stamping the active request id.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
            request_id: telemetry::current_request_id()
                .unwrap_or_else(telemetry::generate_request_id),
        }
    }
}

/// Health endpoint payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub status: String,
    pub database: String,
}

/// Install endpoint query parameters
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct InstallQuery {
    /// Portal (tenant) identifier
    pub portal_id: Option<String>,
    /// Anti-forgery state; generated when absent
    pub state: Option<String>,
}

/// Callback endpoint query parameters, as sent by the provider
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Refresh endpoint request body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub portal_id: Option<String>,
}

/// Refresh endpoint payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

/// Status endpoint query parameters
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub portal_id: Option<String>,
}

/// Status endpoint payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatusData {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expiring_soon: Option<bool>,
}

impl TokenStatusData {
    /// The invalid-token shape: every optional field absent.
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            expires_at: None,
            scopes: None,
            portal_id: None,
            is_expiring_soon: None,
        }
    }
}

/// Report discovery query parameters
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityParams {
    pub contact_id: Option<String>,
    pub company_id: Option<String>,
    pub portal_id: Option<String>,
}

/// Report discovery payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportAvailabilityData {
    pub reports: Vec<ReportDescriptor>,
}

/// Generate-url endpoint request body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateUrlRequest {
    pub slug: Option<String>,
    pub contact_id: Option<String>,
    pub company_id: Option<String>,
    pub portal_id: Option<String>,
}

/// Generate-url endpoint payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateUrlData {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub report_id: String,
    pub slug: String,
}

/// Whether a string looks like a CRM record/portal id: digits only, non-zero.
pub fn is_valid_crm_id(id: &str) -> bool {
    !id.is_empty()
        && id.chars().all(|c| c.is_ascii_digit())
        && id.chars().any(|c| c != '0')
}

/// Validate the report discovery parameters, producing either the upstream
/// search query or the list of field errors.
pub fn validate_report_query(
    contact_id: Option<String>,
    company_id: Option<String>,
    portal_id: Option<String>,
) -> Result<AvailabilityQuery, Vec<String>> {
    let mut errors = Vec::new();

    let portal_id = portal_id.filter(|p| !p.is_empty());
    match &portal_id {
        None => errors.push("Portal ID is required".to_string()),
        Some(portal) if !is_valid_crm_id(portal) => {
            errors.push("Invalid Portal ID format".to_string());
        }
        Some(_) => {}
    }

    let contact_id = contact_id.filter(|c| !c.is_empty());
    let company_id = company_id.filter(|c| !c.is_empty());

    if contact_id.is_none() && company_id.is_none() {
        errors.push("Either Contact ID or Company ID is required".to_string());
    }
    if let Some(contact) = &contact_id
        && !is_valid_crm_id(contact)
    {
        errors.push("Invalid Contact ID format".to_string());
    }
    if let Some(company) = &company_id
        && !is_valid_crm_id(company)
    {
        errors.push("Invalid Company ID format".to_string());
    }

    if errors.is_empty() {
        Ok(AvailabilityQuery {
            contact_id,
            company_id,
            portal_id: portal_id.unwrap_or_default(),
        })
    } else {
        Err(errors)
    }
}
