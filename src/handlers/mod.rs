//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the Intel
//! Bridge API.

use axum::{extract::State, response::Json};

use crate::db;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod auth;
pub mod reports;
pub mod types;

use types::{ApiResponse, HealthData};

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health handler reporting service and database liveness
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health", body = HealthData)
    ),
    tag = "root"
)]
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthData>> {
    let database = match db::health_check(&state.db).await {
        Ok(()) => "ok".to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "Database health check failed");
            "unavailable".to_string()
        }
    };

    let status = if database == "ok" { "ok" } else { "degraded" };

    Json(ApiResponse::ok(HealthData {
        status: status.to_string(),
        database,
    }))
}
