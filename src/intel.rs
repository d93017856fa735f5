//! Sales-intel report backend client
//!
//! Generic request executor over the upstream `{success, data, error}`
//! envelope with a hard per-request timeout, bearer-key auth, and bounded
//! retry with linearly increasing backoff. Failure kinds are tagged when
//! the failure is observed; only network conditions, timeouts, and 5xx
//! responses are retryable — client errors fail immediately.

use metrics::counter;
use reqwest::{Method, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::config::IntelConfig;

/// Classification of an upstream request failure, assigned at the point
/// where the failure is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The 30-second request deadline elapsed
    Timeout,
    /// Connection-level failure before a response arrived
    Network,
    /// Upstream returned a 5xx status
    Server { status: u16 },
    /// Upstream returned 429
    RateLimited,
    /// Upstream returned 401 or 403
    Unauthorized,
    /// Upstream returned 404
    NotFound,
    /// Any other 4xx status
    Client { status: u16 },
    /// A 2xx response whose envelope reported failure or could not be decoded
    Envelope,
}

/// Upstream request failure with its tagged kind.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new<S: Into<String>>(kind: UpstreamErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the failure may be transient and worth re-attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            UpstreamErrorKind::Timeout
                | UpstreamErrorKind::Network
                | UpstreamErrorKind::Server { .. }
        )
    }
}

/// Metadata describing one discoverable report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportDescriptor {
    /// Stable report identifier
    pub id: String,
    /// Human-readable report type/name
    pub name: String,
    pub description: String,
    /// Whether the report has generated data for this record
    pub has_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Stable opaque identifier for the generated report content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Direct access URL, present when the report content exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

/// One stored report record, as returned by the record-fetch endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Record identifiers used to search for reports.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityQuery {
    pub contact_id: Option<String>,
    pub company_id: Option<String>,
    pub portal_id: String,
}

/// Upstream response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// HTTP client for the sales-intel report backend.
#[derive(Clone)]
pub struct IntelClient {
    http: reqwest::Client,
    base_url: String,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl IntelClient {
    /// Build a client from validated application configuration.
    pub fn from_config(config: &IntelConfig) -> anyhow::Result<Self> {
        let base_url = config
            .api_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("intel API URL is not configured"))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("intel API key is not configured"))?;

        let mut auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| anyhow::anyhow!("intel API key contains invalid header characters"))?;
        auth_value.set_sensitive(true);
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_attempts: config.retry_attempts.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    /// Check which reports exist for a contact/company in a portal.
    ///
    /// Never fails: an empty list is a valid, recoverable UI state, so any
    /// failure of the underlying search is logged and normalized to `[]`.
    pub async fn check_report_availability(&self, query: &AvailabilityQuery) -> Vec<ReportDescriptor> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(contact_id) = &query.contact_id {
            params.push(("contactId", contact_id.clone()));
        }
        if let Some(company_id) = &query.company_id {
            params.push(("companyId", company_id.clone()));
        }
        params.push(("portalId", query.portal_id.clone()));

        debug!(
            contact_id = ?query.contact_id,
            company_id = ?query.company_id,
            portal_id = %query.portal_id,
            "Checking report availability"
        );

        let reports: Vec<ReportDescriptor> = match self
            .request(Method::GET, "/api/reports/availability", &params, None)
            .await
        {
            Ok(reports) => reports,
            Err(err) => {
                warn!(kind = ?err.kind, error = %err, "Report availability check failed, degrading to empty");
                counter!("intel_availability_degraded_total").increment(1);
                return Vec::new();
            }
        };

        let reports: Vec<ReportDescriptor> = reports
            .into_iter()
            .map(|mut report| {
                if report.report_url.is_none() {
                    report.report_url = report.slug.as_deref().map(|slug| self.report_url(slug, None));
                }
                report
            })
            .collect();

        info!(
            portal_id = %query.portal_id,
            total = reports.len(),
            with_data = reports.iter().filter(|r| r.has_data).count(),
            "Report availability checked"
        );

        reports
    }

    /// Fetch one report record by slug. A 404 surfaces as the distinct
    /// `NotFound` kind; every other failure follows the taxonomy.
    pub async fn get_report(&self, slug: &str) -> Result<ReportRecord, UpstreamError> {
        debug!(slug = %slug, "Fetching report record");
        self.request(Method::GET, &format!("/api/reports/{}", slug), &[], None)
            .await
    }

    /// Build the public access URL for a report. Pure string construction.
    pub fn report_url(&self, slug: &str, base_url: Option<&str>) -> String {
        let base = base_url.unwrap_or(&self.base_url).trim_end_matches('/');
        format!("{}/r/{}", base, slug)
    }

    /// Issue a request with retry-with-backoff for transient failures.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, UpstreamError> {
        let mut attempt = 1u32;
        loop {
            match self.execute(method.clone(), path, query, body).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry_attempts => {
                    let delay = self.retry_base_delay * attempt;
                    warn!(
                        attempt = attempt,
                        max_attempts = self.retry_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient upstream failure, backing off"
                    );
                    counter!("intel_request_retries_total").increment(1);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Single request execution with envelope enforcement.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status().as_u16();

        if !(200..300).contains(&status) {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body_text));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            UpstreamError::new(
                UpstreamErrorKind::Envelope,
                format!("undecodable response body: {}", e),
            )
        })?;

        if !envelope.success {
            return Err(UpstreamError::new(
                UpstreamErrorKind::Envelope,
                envelope
                    .error
                    .unwrap_or_else(|| "upstream reported failure".to_string()),
            ));
        }

        envelope.data.ok_or_else(|| {
            UpstreamError::new(
                UpstreamErrorKind::Envelope,
                "successful response is missing data".to_string(),
            )
        })
    }
}

fn classify_transport_error(error: reqwest::Error) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::new(
            UpstreamErrorKind::Timeout,
            format!("request timed out: {}", error),
        )
    } else {
        UpstreamError::new(
            UpstreamErrorKind::Network,
            format!("network error: {}", error),
        )
    }
}

fn classify_status(status: u16, body: String) -> UpstreamError {
    let kind = match status {
        401 | 403 => UpstreamErrorKind::Unauthorized,
        404 => UpstreamErrorKind::NotFound,
        429 => UpstreamErrorKind::RateLimited,
        500..=599 => UpstreamErrorKind::Server { status },
        _ => UpstreamErrorKind::Client { status },
    };

    UpstreamError::new(kind, format!("upstream returned status {}: {}", status, body))
}
